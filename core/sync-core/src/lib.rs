//! # bookmark-sync
//!
//! Keeps a local, in-memory bookmark list consistent with a remote,
//! multi-writer store, gated by an authenticated session.
//!
//! ## Design Principles
//!
//! - **Single writer**: only the [`Reconciler`] mutates the local collection,
//!   fed by the bulk load and the change feed. Mutations go to the remote
//!   store and come back through the feed.
//! - **Fail closed**: anything that prevents confirming a session resolves to
//!   `Anonymous`, and no data is visible without a session.
//! - **Graceful degradation**: bulk-load and channel failures leave a stale or
//!   empty view, never duplicate or ghost records.
//! - **Explicit context**: collaborators are passed in through
//!   [`SyncContext`]; there is no global client.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bookmark_sync::{LoopbackBackend, SyncConfig, SyncContext, SyncEngine};
//!
//! let backend = LoopbackBackend::new();
//! let engine = SyncEngine::new(SyncContext::new(backend.backends(), SyncConfig::default()));
//! let session = engine.start().await;
//! let bookmarks = engine.bookmarks();
//! ```

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod loader;
pub mod loopback;
pub mod reconciler;
pub mod session;
pub mod store;
pub mod types;

pub use backend::{AuthProvider, Backends, ChannelHandle, DataStore, RealtimeTransport};
pub use config::*;
pub use engine::{SyncContext, SyncEngine};
pub use error::{BackendError, Result, SyncError};
pub use feed::{ChangeFeedSubscriber, SubscriptionToken};
pub use gateway::MutationGateway;
pub use loader::BulkLoader;
pub use loopback::LoopbackBackend;
pub use reconciler::{Generation, Reconciler};
pub use session::{next_session, SessionMonitor, SessionTransition};
pub use store::{LocalStore, SkipReason, StoreUpdate};
pub use types::*;
