//! Sync engine: wires the session monitor, bulk loader, change feed,
//! reconciler and mutation gateway together.
//!
//! # Activation
//!
//! On a transition into `Authenticated` the engine starts a new reconciler
//! generation, subscribes to the change feed, and only then runs the bulk
//! load, so nothing emitted during the load is missed. The seed replaces the
//! collection and the reconciler then replays whatever the feed delivered
//! since the reset, so changes made after the remote snapshot survive.
//!
//! # Teardown
//!
//! Logout resets the reconciler before anything else. From that point any
//! event or load result from the old subscription carries a stale generation
//! and is discarded, even if it is still in flight.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::Backends;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::feed::{ChangeFeedSubscriber, SubscriptionToken};
use crate::gateway::MutationGateway;
use crate::loader::BulkLoader;
use crate::reconciler::{Generation, Reconciler};
use crate::session::SessionMonitor;
use crate::types::{Draft, Record, Session, SyncStatus};

/// Everything the engine needs, constructed by the process entry point.
#[derive(Clone)]
pub struct SyncContext {
    pub backends: Backends,
    pub config: SyncConfig,
}

impl SyncContext {
    pub fn new(backends: Backends, config: SyncConfig) -> Self {
        Self { backends, config }
    }
}

pub struct SyncEngine {
    collection: String,
    session: SessionMonitor,
    loader: BulkLoader,
    feed: ChangeFeedSubscriber,
    gateway: MutationGateway,
    reconciler: Reconciler,
    status: Mutex<SyncStatus>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl SyncEngine {
    pub fn new(context: SyncContext) -> Self {
        let SyncContext { backends, config } = context;
        let reconciler = Reconciler::new(config.store.delete_policy);
        let collection = config.sync.collection.clone();

        Self {
            session: SessionMonitor::new(backends.auth, config.session.clone()),
            loader: BulkLoader::new(backends.store.clone(), config.bulk_load.clone()),
            feed: ChangeFeedSubscriber::new(
                backends.realtime,
                reconciler.clone(),
                config.sync.channel_name.clone(),
                config.feed.channel_capacity,
            ),
            gateway: MutationGateway::new(backends.store, collection.clone()),
            reconciler,
            collection,
            status: Mutex::new(SyncStatus::Idle),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Runs the one-shot session check and activates sync if a session exists.
    pub async fn start(&self) -> Session {
        let session = self.session.check_existing_session().await;
        info!(session = session.as_str(), "Sync engine started");
        if session.is_authenticated() {
            self.activate(&session).await;
        }
        session
    }

    pub async fn login(&self) -> Result<()> {
        self.session.login().await
    }

    /// Handles the provider's redirect back into the app.
    pub async fn complete_login(&self) -> Session {
        let session = self.session.complete_login().await;
        if session.is_authenticated() {
            self.activate(&session).await;
        }
        session
    }

    pub async fn logout(&self) -> Session {
        let _guard = self.lifecycle.lock().await;
        let generation = self.reconciler.reset("logout");
        self.reconciler.close_load_window(generation);
        self.feed.unsubscribe().await;
        self.set_status(SyncStatus::Idle);
        self.session.logout().await
    }

    /// Releases the live subscription without touching the session.
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;
        if self.feed.unsubscribe().await {
            info!("Sync engine shut down");
        }
        self.set_status(SyncStatus::Idle);
    }

    async fn activate(&self, session: &Session) {
        let Some(generation) = self.begin_activation(session).await else {
            return;
        };

        match self.loader.load_all(&self.collection).await {
            Ok(records) => {
                self.reconciler.seed(generation, records);
            }
            Err(err) => {
                self.reconciler.close_load_window(generation);
                warn!(error = %err, "Bulk load failed; showing an empty list until the feed delivers");
            }
        }
    }

    /// Starts a new generation and subscribes. Returns `None` when an
    /// equivalent activation is already live.
    async fn begin_activation(&self, session: &Session) -> Option<Generation> {
        let user_id = session.user_id()?;
        let _guard = self.lifecycle.lock().await;

        if !self.session.current().is_authenticated() {
            debug!("Session ended before activation");
            return None;
        }

        if let Some(token) = self.feed.current_token().await {
            if token.user_id == user_id
                && token.collection == self.collection
                && token.generation == self.reconciler.generation()
            {
                debug!(user_id, "Sync already active for session");
                return None;
            }
        }

        let generation = self.reconciler.reset("activate");
        let token = SubscriptionToken {
            user_id: user_id.to_string(),
            collection: self.collection.clone(),
            generation,
        };
        match self.feed.subscribe(token).await {
            Ok(_) => self.set_status(SyncStatus::Live),
            Err(err) => {
                warn!(error = %err, "Change feed unavailable; sync degraded");
                self.set_status(SyncStatus::Degraded);
            }
        }
        Some(generation)
    }

    pub async fn add_bookmark(&self, title: &str, url: &str) -> Result<()> {
        self.gateway
            .create(&self.session.current(), title, url)
            .await
    }

    pub async fn submit_draft(&self, draft: &mut Draft) -> Result<()> {
        self.gateway
            .submit_draft(&self.session.current(), draft)
            .await
    }

    pub async fn delete_bookmark(&self, id: &str) -> Result<()> {
        self.gateway.delete(&self.session.current(), id).await
    }

    /// Snapshot for rendering. Always empty without a session.
    pub fn bookmarks(&self) -> Vec<Record> {
        if !self.session.current().is_authenticated() {
            return Vec::new();
        }
        self.reconciler.read_all()
    }

    pub fn session(&self) -> Session {
        self.session.current()
    }

    pub fn watch_session(&self) -> watch::Receiver<Session> {
        self.session.watch()
    }

    pub fn watch_revisions(&self) -> watch::Receiver<u64> {
        self.reconciler.watch()
    }

    pub fn status(&self) -> SyncStatus {
        *self.lock_status()
    }

    pub async fn subscription_active(&self) -> bool {
        self.feed.is_active().await
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn lock_status(&self) -> MutexGuard<'_, SyncStatus> {
        self.status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_status(&self, status: SyncStatus) {
        let mut current = self.lock_status();
        if *current != status {
            debug!(from = ?*current, to = ?status, "Sync status changed");
            *current = status;
        }
    }
}
