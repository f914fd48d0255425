//! User-initiated create/delete requests.
//!
//! The gateway never writes to the local store. A successful mutation becomes
//! visible locally only when the change feed echoes it back.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::backend::DataStore;
use crate::error::{Result, SyncError};
use crate::types::{Draft, NewRecord, Session};

pub struct MutationGateway {
    store: Arc<dyn DataStore>,
    collection: String,
}

impl MutationGateway {
    pub fn new(store: Arc<dyn DataStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub async fn create(&self, session: &Session, title: &str, url: &str) -> Result<()> {
        let user_id = require_user(session, "create")?;
        let title = require_field(title, "title")?;
        let url = require_field(url, "url")?;

        let record = NewRecord {
            title: title.to_string(),
            url: url.to_string(),
            user_id: user_id.to_string(),
        };
        self.store
            .insert(&self.collection, record)
            .await
            .map_err(|source| {
                warn!(collection = %self.collection, error = %source, "Insert rejected");
                SyncError::Mutation {
                    action: "create",
                    source,
                }
            })?;
        info!(collection = %self.collection, user_id, "Bookmark create submitted");
        Ok(())
    }

    /// Submits the draft and clears it on success. On failure the draft is
    /// left as the user typed it.
    pub async fn submit_draft(&self, session: &Session, draft: &mut Draft) -> Result<()> {
        self.create(session, &draft.title, &draft.url).await?;
        draft.clear();
        Ok(())
    }

    pub async fn delete(&self, session: &Session, id: &str) -> Result<()> {
        require_user(session, "delete")?;
        let id = require_field(id, "id")?;

        self.store
            .delete_where(&self.collection, id)
            .await
            .map_err(|source| {
                warn!(collection = %self.collection, id, error = %source, "Delete rejected");
                SyncError::Mutation {
                    action: "delete",
                    source,
                }
            })?;
        info!(collection = %self.collection, id, "Bookmark delete submitted");
        Ok(())
    }
}

fn require_user<'a>(session: &'a Session, action: &str) -> Result<&'a str> {
    match session.user_id() {
        Some(user_id) => Ok(user_id),
        None => {
            // Callers gate on the session before reaching here.
            error!(action, session = session.as_str(), "Mutation attempted without a session");
            Err(SyncError::NotAuthenticated)
        }
    }
}

fn require_field<'a>(value: &'a str, field: &'static str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SyncError::Validation { field });
    }
    Ok(trimmed)
}
