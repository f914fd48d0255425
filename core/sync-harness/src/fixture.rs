//! Starting state for the loopback backend, read from a JSON file.
//!
//! ```json
//! {
//!   "user": { "user_id": "u-1", "email": "me@example.com" },
//!   "signed_in": true,
//!   "bookmarks": [
//!     { "id": "1", "title": "Go", "url": "https://go.dev", "user_id": "u-1" }
//!   ]
//! }
//! ```

use std::path::Path;

use bookmark_sync::{AuthUser, LoopbackBackend, Record};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fixture is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Fixture record {id} is invalid: {message}")]
    InvalidRecord { id: String, message: String },
}

#[derive(Debug, Deserialize)]
pub struct Fixture {
    #[serde(default = "default_user")]
    pub user: AuthUser,
    #[serde(default)]
    pub signed_in: bool,
    #[serde(default)]
    pub bookmarks: Vec<Record>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            user: default_user(),
            signed_in: false,
            bookmarks: Vec::new(),
        }
    }
}

fn default_user() -> AuthUser {
    AuthUser {
        user_id: "local-user".to_string(),
        email: None,
    }
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let content = fs_err::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, FixtureError> {
        let fixture: Fixture = serde_json::from_str(content)?;
        for record in &fixture.bookmarks {
            record
                .validate()
                .map_err(|err| FixtureError::InvalidRecord {
                    id: record.id.clone(),
                    message: err.to_string(),
                })?;
        }
        Ok(fixture)
    }

    pub fn apply(&self, backend: &LoopbackBackend, collection: &str) {
        backend.seed_remote(collection, self.bookmarks.clone());
        if self.signed_in {
            backend.set_session(Some(self.user.clone()));
        }
    }
}
