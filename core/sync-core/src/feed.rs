//! Live change-feed subscription.
//!
//! At most one realtime channel is open at a time. The transport pushes raw
//! payloads into an mpsc channel; a pump task decodes them and hands typed
//! events to the [`Reconciler`], tagged with the generation the subscription
//! was opened under.

use std::sync::Arc;
use std::time::Duration;

use bookmark_sync_protocol::{parse_change, EventFilter};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::backend::{ChannelHandle, RealtimeTransport};
use crate::error::{BackendError, Result, SyncError};
use crate::reconciler::{Generation, Reconciler};

const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Identity of a subscription. Two subscribe calls with equal tokens
/// describe the same subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionToken {
    pub user_id: String,
    pub collection: String,
    pub generation: Generation,
}

struct ActiveSubscription {
    token: SubscriptionToken,
    handle: ChannelHandle,
    pump: JoinHandle<()>,
}

pub struct ChangeFeedSubscriber {
    realtime: Arc<dyn RealtimeTransport>,
    reconciler: Reconciler,
    channel_name: String,
    capacity: usize,
    active: Mutex<Option<ActiveSubscription>>,
}

impl ChangeFeedSubscriber {
    pub fn new(
        realtime: Arc<dyn RealtimeTransport>,
        reconciler: Reconciler,
        channel_name: impl Into<String>,
        capacity: usize,
    ) -> Self {
        Self {
            realtime,
            reconciler,
            channel_name: channel_name.into(),
            capacity: capacity.max(1),
            active: Mutex::new(None),
        }
    }

    /// Opens the subscription described by `token`.
    ///
    /// No-op if an equal subscription is already live. A different live
    /// subscription is released before the new channel is opened.
    pub async fn subscribe(&self, token: SubscriptionToken) -> Result<SubscriptionToken> {
        let mut active = self.active.lock().await;

        if let Some(current) = active.as_ref() {
            if current.token == token {
                debug!(collection = %token.collection, "Subscription already live");
                return Ok(token);
            }
        }

        if let Some(previous) = active.take() {
            self.release(previous).await;
        }

        let handle = self
            .realtime
            .open_channel(&self.channel_name)
            .await
            .map_err(|source| self.channel_error(source))?;

        let (sink, events) = mpsc::channel(self.capacity);
        if let Err(source) = self
            .realtime
            .on_table_event(handle, &token.collection, EventFilter::All, sink)
            .await
        {
            if let Err(err) = self.realtime.close_channel(handle).await {
                warn!(error = %err, "Failed to close channel after registration failure");
            }
            return Err(self.channel_error(source));
        }

        let pump = tokio::spawn(
            pump_events(events, self.reconciler.clone(), token.generation).instrument(info_span!(
                "feed",
                collection = %token.collection,
                generation = token.generation.0
            )),
        );

        info!(
            channel = %self.channel_name,
            collection = %token.collection,
            user_id = %token.user_id,
            "Change feed subscribed"
        );
        *active = Some(ActiveSubscription {
            token: token.clone(),
            handle,
            pump,
        });
        Ok(token)
    }

    /// Releases the live subscription. Returns `false` if there was none.
    pub async fn unsubscribe(&self) -> bool {
        let previous = self.active.lock().await.take();
        match previous {
            Some(subscription) => {
                self.release(subscription).await;
                true
            }
            None => false,
        }
    }

    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    pub async fn current_token(&self) -> Option<SubscriptionToken> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|subscription| subscription.token.clone())
    }

    /// Closes the channel, then lets the pump drain what the transport had
    /// already queued. Drained events carry the subscription's generation, so
    /// after a reset they are discarded by the reconciler.
    async fn release(&self, subscription: ActiveSubscription) {
        let ActiveSubscription {
            token,
            handle,
            mut pump,
        } = subscription;
        if let Err(err) = self.realtime.close_channel(handle).await {
            warn!(error = %err, "Failed to close realtime channel");
        }
        if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, &mut pump).await.is_err() {
            debug!("Transport kept the event sink open; aborting pump");
            pump.abort();
        }
        info!(
            channel = %self.channel_name,
            collection = %token.collection,
            "Change feed unsubscribed"
        );
    }

    fn channel_error(&self, source: BackendError) -> SyncError {
        warn!(channel = %self.channel_name, error = %source, "Realtime channel failed");
        SyncError::Channel {
            channel: self.channel_name.clone(),
            source,
        }
    }
}

async fn pump_events(
    mut events: mpsc::Receiver<Value>,
    reconciler: Reconciler,
    generation: Generation,
) {
    while let Some(payload) = events.recv().await {
        match parse_change(payload) {
            Ok(Some(event)) => {
                reconciler.apply(generation, event);
            }
            Ok(None) => debug!("Ignoring unmodeled change event"),
            Err(err) => {
                warn!(code = %err.code, message = %err.message, "Dropping malformed change payload");
            }
        }
    }
    debug!("Change feed closed by transport");
}
