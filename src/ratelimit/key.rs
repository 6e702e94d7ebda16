//! Storage key derivation.

use super::policy::Action;
use crate::error::{Result, SlidegateError};

/// A key that uniquely identifies one request log.
///
/// The key pairs an action with a caller-chosen subject (user id, IP
/// address, or any composite of those), so two actions never share quota.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey {
    /// The throttled action
    pub action: Action,
    /// Who or what is being throttled
    pub subject: String,
}

impl LimitKey {
    /// Create a key, rejecting blank subjects.
    pub fn new(action: Action, subject: &str) -> Result<Self> {
        if subject.trim().is_empty() {
            return Err(SlidegateError::InvalidArgument(format!(
                "subject for {} must not be empty",
                action
            )));
        }

        Ok(Self {
            action,
            subject: subject.to_string(),
        })
    }

    /// The string form stored in the request log, e.g. `note_write:user-42`.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.action.key_prefix(), self.subject)
    }
}

impl std::fmt::Display for LimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}
