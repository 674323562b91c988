use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use rescue_assignment::{Assignment, AssignmentError, NewCase};
use rescue_core::{
    CaseStatus, EmergencyCase, EmergencyResponder, Hospital, Location, ResponderStatus, Severity,
    StaffRole, VerificationCode,
};
use rescue_storage::Entity;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::error::{ApiError, ErrorDetail};
use crate::geocoding;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    time: OffsetDateTime,
    dispatcher_running: bool,
}

pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            time: OffsetDateTime::now_utc(),
            dispatcher_running: state.dispatcher.is_running(),
        }),
    )
}

// ---- Cases ----

/// Incoming case report. Either `location` or a geocodable `address` is
/// required.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseRequest {
    pub patient_id: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub case: EmergencyCase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryResponse {
    pub case_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

fn split_outcome(
    outcome: Result<Assignment, AssignmentError>,
) -> (Option<Assignment>, Option<ErrorDetail>) {
    match outcome {
        Ok(assignment) => (Some(assignment), None),
        Err(e) => (None, Some(ApiError::from(e).body().error)),
    }
}

async fn resolve_location(state: &AppState, req: &CaseRequest) -> Result<Location, ApiError> {
    match (&req.location, &req.address) {
        (Some(location), address) => {
            let mut location = location.clone();
            if location.address.is_none() {
                if let Some(address) = address {
                    location.address = Some(address.clone());
                } else if let Some(geocoder) = &state.geocoder {
                    match geocoder.reverse(location.coordinate()).await {
                        Ok(name) => location.address = Some(name),
                        Err(e) => warn!(error = %e, "Reverse geocoding failed"),
                    }
                }
            }
            Ok(location)
        }
        (None, Some(address)) => {
            let Some(geocoder) = &state.geocoder else {
                return Err(ApiError::bad_request(
                    "location is required when geocoding is disabled",
                ));
            };
            let found = geocoding::locate(geocoder.as_ref(), address).await?;
            Ok(Location::new(found.latitude, found.longitude).with_address(found.display_name))
        }
        (None, None) => Err(ApiError::bad_request("location or address is required")),
    }
}

pub async fn submit_case(
    State(state): State<AppState>,
    Json(req): Json<CaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let location = resolve_location(&state, &req).await?;
    let submission = state
        .lifecycle
        .submit(NewCase {
            patient_id: req.patient_id,
            description: req.description,
            severity: req.severity,
            location,
        })
        .await?;

    let (assignment, error) = split_outcome(submission.outcome);
    Ok((
        StatusCode::CREATED,
        Json(SubmissionResponse {
            case: submission.case,
            assignment,
            error,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CaseListQuery {
    pub status: Option<String>,
}

pub async fn list_cases(
    State(state): State<AppState>,
    Query(query): Query<CaseListQuery>,
) -> Result<Json<Vec<EmergencyCase>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<CaseStatus>)
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(state.cases.list_cases(status).await?))
}

pub async fn get_case(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EmergencyCase>, ApiError> {
    Ok(Json(state.lifecycle.get_case(&id).await?))
}

pub async fn assign_case(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Assignment>, ApiError> {
    Ok(Json(state.lifecycle.assign_case(&id).await?))
}

pub async fn retry_pending(
    State(state): State<AppState>,
) -> Result<Json<Vec<RetryResponse>>, ApiError> {
    let outcomes = state.lifecycle.retry_pending().await?;
    Ok(Json(
        outcomes
            .into_iter()
            .map(|o| {
                let (assignment, error) = split_outcome(o.outcome);
                RetryResponse {
                    case_id: o.case_id,
                    assignment,
                    error,
                }
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CaseStatusRequest {
    pub expected: CaseStatus,
    pub status: CaseStatus,
}

pub async fn update_case_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CaseStatusRequest>,
) -> Result<Json<EmergencyCase>, ApiError> {
    Ok(Json(
        state
            .lifecycle
            .advance_case(&id, req.expected, req.status)
            .await?,
    ))
}

// ---- Hospitals ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalListQuery {
    #[serde(default, alias = "min_available")]
    pub min_available: u32,
}

pub async fn list_hospitals(
    State(state): State<AppState>,
    Query(query): Query<HospitalListQuery>,
) -> Result<Json<Vec<Hospital>>, ApiError> {
    Ok(Json(
        state
            .capacity
            .list_hospitals_with_availability(query.min_available)
            .await?,
    ))
}

pub async fn get_hospital(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Hospital>, ApiError> {
    state
        .capacity
        .get_hospital(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("{} {id}", Entity::Hospital)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityRequest {
    #[serde(alias = "expected_available")]
    pub expected_available: u32,
    pub available: u32,
}

pub async fn update_capacity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CapacityRequest>,
) -> Result<Json<Hospital>, ApiError> {
    Ok(Json(
        state
            .lifecycle
            .adjust_capacity(&id, req.expected_available, req.available)
            .await?,
    ))
}

// ---- Responders ----

#[derive(Debug, Deserialize)]
pub struct ResponderListQuery {
    pub status: Option<String>,
}

pub async fn list_responders(
    State(state): State<AppState>,
    Query(query): Query<ResponderListQuery>,
) -> Result<Json<Vec<EmergencyResponder>>, ApiError> {
    let statuses = match query.status.as_deref() {
        Some(raw) => vec![
            raw.parse::<ResponderStatus>()
                .map_err(|e| ApiError::bad_request(e.to_string()))?,
        ],
        None => vec![
            ResponderStatus::Available,
            ResponderStatus::Assigned,
            ResponderStatus::Busy,
        ],
    };

    let mut responders = Vec::new();
    for status in statuses {
        responders.extend(state.capacity.list_responders(status).await?);
    }
    responders.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(Json(responders))
}

#[derive(Debug, Deserialize)]
pub struct ResponderStatusRequest {
    pub expected: ResponderStatus,
    pub status: ResponderStatus,
}

pub async fn update_responder_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ResponderStatusRequest>,
) -> Result<Json<EmergencyResponder>, ApiError> {
    Ok(Json(
        state
            .lifecycle
            .update_responder_status(&id, req.expected, req.status)
            .await?,
    ))
}

// ---- Verification codes ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCodeRequest {
    pub code: String,
    pub role: StaffRole,
    #[serde(default)]
    pub created_by: Option<String>,
}

pub async fn create_code(
    State(state): State<AppState>,
    Json(req): Json<CreateCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut code =
        VerificationCode::new(req.code, req.role).map_err(|e| ApiError::bad_request(e.to_string()))?;
    if let Some(admin) = req.created_by {
        code = code.created_by(admin);
    }
    let code = state.codes.create_code(code).await?;
    info!(code_id = %code.id, role = %code.role, "Verification code issued");
    Ok((StatusCode::CREATED, Json(code)))
}

pub async fn list_codes(
    State(state): State<AppState>,
) -> Result<Json<Vec<VerificationCode>>, ApiError> {
    Ok(Json(state.codes.list_codes().await?))
}

#[derive(Debug, Deserialize)]
pub struct ConsumeCodeRequest {
    pub code: String,
    pub role: StaffRole,
}

#[derive(Debug, Serialize)]
pub struct ConsumeCodeResponse {
    pub consumed: bool,
    pub role: StaffRole,
}

/// Redeems a code once. Any later attempt, or an unknown code, is a conflict.
pub async fn consume_code(
    State(state): State<AppState>,
    Json(req): Json<ConsumeCodeRequest>,
) -> Result<Json<ConsumeCodeResponse>, ApiError> {
    if !state.codes.consume_code(&req.code, req.role).await? {
        return Err(ApiError::conflict(format!(
            "verification code is invalid or already used for role {}",
            req.role
        )));
    }
    info!(role = %req.role, "Verification code consumed");
    Ok(Json(ConsumeCodeResponse {
        consumed: true,
        role: req.role,
    }))
}
