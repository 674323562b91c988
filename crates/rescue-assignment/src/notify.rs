use std::sync::Arc;

use rescue_core::{EmergencyCase, EmergencyResponder, Hospital};
use rescue_notifications::{EventType, Notification, NotificationDispatcher};
use serde::Serialize;
use tracing::warn;

use crate::engine::Assignment;

/// Best-effort publisher for assignment and lifecycle events.
///
/// Every method swallows dispatcher errors after logging them; a missing
/// dispatcher turns them into no-ops.
#[derive(Clone, Default)]
pub struct Notifier {
    dispatcher: Option<Arc<NotificationDispatcher>>,
}

impl Notifier {
    pub fn new(dispatcher: Option<Arc<NotificationDispatcher>>) -> Self {
        Self { dispatcher }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn case_assigned(&self, assignment: &Assignment) {
        let case = &assignment.case;
        let message = format!(
            "{} is expecting you; ambulance {} is on its way",
            assignment.hospital.name, assignment.responder.vehicle_id
        );
        self.send(EventType::CaseAssigned, assignment, message, |n| {
            n.to_users([
                case.patient_id.as_str(),
                assignment.hospital.id.as_str(),
                assignment.responder.user_id.as_str(),
            ])
        });
        self.status_update(case, &[]);
        self.resource_update(
            &assignment.hospital,
            format!(
                "{} now has {} beds available",
                assignment.hospital.name, assignment.hospital.capacity.available
            ),
        );
    }

    /// Status change for the case's patient plus `also` (hospital account,
    /// responder user).
    pub fn status_update(&self, case: &EmergencyCase, also: &[&str]) {
        let message = format!("Case status updated to {}", case.status);
        self.send(EventType::StatusUpdate, case, message, |n| {
            n.to_users(std::iter::once(case.patient_id.as_str()).chain(also.iter().copied()))
        });
    }

    pub fn hospital_update(&self, hospital: &Hospital) {
        self.resource_update(
            hospital,
            format!(
                "{} now has {} beds available",
                hospital.name, hospital.capacity.available
            ),
        );
    }

    pub fn responder_update(&self, responder: &EmergencyResponder) {
        self.resource_update(
            responder,
            format!("Vehicle {} is {}", responder.vehicle_id, responder.status),
        );
    }

    fn resource_update<T: Serialize>(&self, payload: &T, message: String) {
        self.send(EventType::ResourceUpdate, payload, message, |n| n);
    }

    fn send<T: Serialize>(
        &self,
        event_type: EventType,
        payload: &T,
        message: String,
        target: impl FnOnce(Notification) -> Notification,
    ) {
        let Some(dispatcher) = &self.dispatcher else {
            return;
        };
        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(event_type = %event_type, error = %e, "Could not encode notification payload");
                return;
            }
        };
        if let Err(e) = dispatcher.publish(target(Notification::new(event_type, payload, message))) {
            warn!(event_type = %event_type, error = %e, "Notification not published");
        }
    }
}
