//! Named actions and the policies that govern them.
//!
//! Every throttled operation is an [`Action`]. Each action maps to exactly one
//! [`Policy`] in the [`PolicyTable`], which is built once at startup and never
//! mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, SlidegateError};

/// A sliding-window limit: at most `limit` admissions per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Policy {
    /// Maximum admissions inside one window
    pub limit: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl Policy {
    /// Create a validated policy.
    pub fn new(limit: u32, window_ms: u64) -> Result<Self> {
        let policy = Self { limit, window_ms };
        policy.validate()?;
        Ok(policy)
    }

    /// Shorthand for a policy whose window is given in seconds.
    pub fn per_seconds(limit: u32, secs: u64) -> Result<Self> {
        Self::new(limit, secs.saturating_mul(1000))
    }

    /// Reject zero limits and zero windows.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(SlidegateError::InvalidArgument(
                "limit must be greater than 0".to_string(),
            ));
        }
        if self.window_ms == 0 {
            return Err(SlidegateError::InvalidArgument(
                "window must be greater than 0 ms".to_string(),
            ));
        }
        Ok(())
    }

    /// The window as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} per {}ms", self.limit, self.window_ms)
    }
}

/// A throttled operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Creating or editing a note
    NoteWrite,
    /// Posting a comment
    CommentWrite,
    /// Uploading an image
    ImageUpload,
    /// Running a search
    Search,
    /// Editing a profile
    ProfileUpdate,
    /// Attempting to log in
    LoginAttempt,
}

impl Action {
    /// Every action, in table order.
    pub const ALL: [Action; 6] = [
        Action::NoteWrite,
        Action::CommentWrite,
        Action::ImageUpload,
        Action::Search,
        Action::ProfileUpdate,
        Action::LoginAttempt,
    ];

    /// The canonical upper-case name, e.g. `NOTE_WRITE`.
    pub fn name(&self) -> &'static str {
        match self {
            Action::NoteWrite => "NOTE_WRITE",
            Action::CommentWrite => "COMMENT_WRITE",
            Action::ImageUpload => "IMAGE_UPLOAD",
            Action::Search => "SEARCH",
            Action::ProfileUpdate => "PROFILE_UPDATE",
            Action::LoginAttempt => "LOGIN_ATTEMPT",
        }
    }

    /// The prefix used when deriving storage keys, e.g. `note_write`.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Action::NoteWrite => "note_write",
            Action::CommentWrite => "comment_write",
            Action::ImageUpload => "image_upload",
            Action::Search => "search",
            Action::ProfileUpdate => "profile_update",
            Action::LoginAttempt => "login_attempt",
        }
    }

    /// The policy shipped for this action.
    pub fn default_policy(&self) -> Policy {
        let (limit, window_ms) = match self {
            Action::NoteWrite => (5, 60_000),
            Action::CommentWrite => (10, 60_000),
            Action::ImageUpload => (3, 60_000),
            Action::Search => (30, 60_000),
            Action::ProfileUpdate => (3, 300_000),
            Action::LoginAttempt => (5, 300_000),
        };
        Policy { limit, window_ms }
    }

    fn index(&self) -> usize {
        match self {
            Action::NoteWrite => 0,
            Action::CommentWrite => 1,
            Action::ImageUpload => 2,
            Action::Search => 3,
            Action::ProfileUpdate => 4,
            Action::LoginAttempt => 5,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = SlidegateError;

    /// Accepts `NOTE_WRITE`, `note_write` and `note-write`.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        Action::ALL
            .into_iter()
            .find(|action| action.name() == normalized)
            .ok_or_else(|| SlidegateError::UnknownPolicy(s.to_string()))
    }
}

/// The startup-time registry of action policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    policies: [Policy; 6],
}

impl PolicyTable {
    /// The table with every action at its shipped default.
    pub fn new() -> Self {
        Self {
            policies: Action::ALL.map(|action| action.default_policy()),
        }
    }

    /// The default table with `overrides` applied.
    ///
    /// Every override is validated; one bad entry rejects the whole table.
    pub fn with_overrides(overrides: &HashMap<Action, Policy>) -> Result<Self> {
        let mut table = Self::new();
        for (action, policy) in overrides {
            policy.validate().map_err(|e| {
                SlidegateError::Config(format!("policy override for {}: {}", action, e))
            })?;
            table.policies[action.index()] = *policy;
        }
        Ok(table)
    }

    /// The policy for an action.
    pub fn get(&self, action: Action) -> Policy {
        self.policies[action.index()]
    }

    /// Resolve a policy by its action name.
    pub fn lookup(&self, name: &str) -> Result<(Action, Policy)> {
        let action: Action = name.parse()?;
        Ok((action, self.get(action)))
    }

    /// Iterate over `(action, policy)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (Action, Policy)> + '_ {
        Action::ALL.into_iter().map(move |action| (action, self.get(action)))
    }

    /// The longest window of any registered policy.
    pub fn max_window(&self) -> Duration {
        self.policies
            .iter()
            .map(Policy::window)
            .max()
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new()
    }
}
