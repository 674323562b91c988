use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Kind of event pushed to live clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CaseAssigned,
    StatusUpdate,
    ResourceUpdate,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CaseAssigned => "case_assigned",
            EventType::StatusUpdate => "status_update",
            EventType::ResourceUpdate => "resource_update",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "case_assigned" => Ok(EventType::CaseAssigned),
            "status_update" => Ok(EventType::StatusUpdate),
            "resource_update" => Ok(EventType::ResourceUpdate),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// Which connected users a notification is meant for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    Users(Vec<String>),
}

impl Audience {
    pub fn includes(&self, user_id: &str) -> bool {
        match self {
            Audience::Everyone => true,
            Audience::Users(users) => users.iter().any(|u| u == user_id),
        }
    }
}

/// An event waiting in the dispatch queue
#[derive(Debug, Clone)]
pub struct Notification {
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub message: String,
    pub audience: Audience,
    pub timestamp: OffsetDateTime,
}

impl Notification {
    /// Broadcast notification; narrow it with [`Notification::to_users`].
    pub fn new(event_type: EventType, payload: serde_json::Value, message: impl Into<String>) -> Self {
        Self {
            event_type,
            payload,
            message: message.into(),
            audience: Audience::Everyone,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn to_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut users: Vec<String> = users.into_iter().map(Into::into).collect();
        users.sort();
        users.dedup();
        self.audience = Audience::Users(users);
        self
    }

    pub fn envelope(&self) -> Envelope {
        Envelope {
            event_type: self.event_type,
            payload: self.payload.clone(),
            message: self.message.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Wire form of a notification as seen by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(
            serde_json::to_value(EventType::CaseAssigned).unwrap(),
            json!("case_assigned")
        );
        assert_eq!("resource_update".parse::<EventType>(), Ok(EventType::ResourceUpdate));
        assert!("case_closed".parse::<EventType>().is_err());
    }

    #[test]
    fn test_audience_includes() {
        assert!(Audience::Everyone.includes("anyone"));
        let n = Notification::new(EventType::StatusUpdate, json!({}), "x").to_users(["b", "a", "b"]);
        assert_eq!(n.audience, Audience::Users(vec!["a".into(), "b".into()]));
        assert!(n.audience.includes("a"));
        assert!(!n.audience.includes("c"));
    }

    #[test]
    fn test_envelope_serializes_type_field() {
        let n = Notification::new(
            EventType::CaseAssigned,
            json!({"caseId": "c-1"}),
            "Ambulance dispatched",
        );
        let value = serde_json::to_value(n.envelope()).unwrap();
        assert_eq!(value["type"], "case_assigned");
        assert_eq!(value["payload"]["caseId"], "c-1");
        assert_eq!(value["message"], "Ambulance dispatched");
        assert!(value["timestamp"].is_string());
    }
}
