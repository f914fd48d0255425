//! Shared types for session and sync state.

use serde::{Deserialize, Serialize};

pub use bookmark_sync_protocol::{ChangeEvent, NewRecord, Record};

/// Identity returned by the auth collaborator for an existing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Whether a user is currently authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Session {
    /// Before the one-shot session check resolves.
    #[default]
    Unknown,
    Anonymous,
    Authenticated {
        user_id: String,
        email: Option<String>,
    },
}

impl Session {
    pub fn from_user(user: Option<AuthUser>) -> Self {
        match user {
            Some(user) => Session::Authenticated {
                user_id: user.user_id,
                email: user.email,
            },
            None => Session::Anonymous,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated { .. })
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Session::Authenticated { user_id, .. } => Some(user_id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Session::Unknown => "unknown",
            Session::Anonymous => "anonymous",
            Session::Authenticated { .. } => "authenticated",
        }
    }
}

/// Health of the live feed, as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// No session, no subscription.
    Idle,
    /// Subscribed and receiving events.
    Live,
    /// Subscription could not be opened; the list may go stale.
    Degraded,
}

/// Caller-held input draft for a new bookmark.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub title: String,
    pub url: String,
}

impl Draft {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }

    pub fn clear(&mut self) {
        self.title.clear();
        self.url.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.url.is_empty()
    }
}
