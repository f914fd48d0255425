//! Collaborator traits for the auth provider, the remote data store and the
//! realtime channel.
//!
//! All three are opaque to the engine. Implementations report failures as
//! [`BackendError`]; components map them onto [`crate::SyncError`] at their
//! boundary.

use std::sync::Arc;

use async_trait::async_trait;
use bookmark_sync_protocol::EventFilter;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::BackendError;
use crate::types::{AuthUser, NewRecord, Record};

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns the user for an existing session, if any.
    async fn get_current_session(&self) -> BackendResult<Option<AuthUser>>;

    /// Starts the redirect-based login flow. Completion happens out of band.
    async fn sign_in_with_provider(&self, provider: &str, redirect_url: &str)
        -> BackendResult<()>;

    async fn sign_out(&self) -> BackendResult<()>;
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn select_all(&self, collection: &str) -> BackendResult<Vec<Record>>;

    async fn insert(&self, collection: &str, record: NewRecord) -> BackendResult<()>;

    async fn delete_where(&self, collection: &str, id: &str) -> BackendResult<()>;
}

/// Opaque handle to an open realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(pub u64);

#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn open_channel(&self, name: &str) -> BackendResult<ChannelHandle>;

    /// Registers for table events on an open channel. Raw JSON payloads are
    /// pushed into `sink` until the channel is closed.
    async fn on_table_event(
        &self,
        handle: ChannelHandle,
        collection: &str,
        filter: EventFilter,
        sink: mpsc::Sender<Value>,
    ) -> BackendResult<()>;

    /// Closes the channel. Closing an unknown handle is not an error.
    async fn close_channel(&self, handle: ChannelHandle) -> BackendResult<()>;
}

/// The explicitly constructed collaborator set handed to the engine.
#[derive(Clone)]
pub struct Backends {
    pub auth: Arc<dyn AuthProvider>,
    pub store: Arc<dyn DataStore>,
    pub realtime: Arc<dyn RealtimeTransport>,
}

impl Backends {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn DataStore>,
        realtime: Arc<dyn RealtimeTransport>,
    ) -> Self {
        Self {
            auth,
            store,
            realtime,
        }
    }
}
