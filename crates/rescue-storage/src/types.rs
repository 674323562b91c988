//! Value types shared by the store traits.

use std::fmt;

/// Kind of record a storage error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Case,
    Hospital,
    Responder,
    VerificationCode,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Case => "case",
            Entity::Hospital => "hospital",
            Entity::Responder => "responder",
            Entity::VerificationCode => "verification code",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a conditional write.
///
/// A conflict is a normal outcome, not an error: the stored value no longer
/// matches the caller's expectation and nothing was written.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum WriteOutcome {
    /// The expectation held and the new value was stored.
    Applied,
    /// The stored value changed since it was read.
    Conflict {
        /// Value currently stored, rendered for logs.
        actual: String,
    },
}

impl WriteOutcome {
    pub fn conflict(actual: impl ToString) -> Self {
        Self::Conflict {
            actual: actual.to_string(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_outcome_predicates() {
        assert!(WriteOutcome::Applied.is_applied());
        let conflict = WriteOutcome::conflict(3);
        assert!(conflict.is_conflict());
        assert_eq!(
            conflict,
            WriteOutcome::Conflict {
                actual: "3".to_string()
            }
        );
    }

    #[test]
    fn test_entity_display() {
        assert_eq!(Entity::VerificationCode.to_string(), "verification code");
    }
}
