//! In-process implementation of every collaborator.
//!
//! Behaves like a multi-writer remote store: it assigns ids, keeps one table
//! per collection, and pushes a change payload to every open channel
//! listening on that collection, whoever made the write. Faults can be
//! injected per call type so the engine's degraded paths can be exercised.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bookmark_sync_protocol::{ChangePayload, EventFilter, PayloadEventType};
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::backend::{
    AuthProvider, BackendResult, Backends, ChannelHandle, DataStore, RealtimeTransport,
};
use crate::error::BackendError;
use crate::types::{AuthUser, NewRecord, Record};

struct Listener {
    collection: String,
    filter: EventFilter,
    sink: mpsc::Sender<Value>,
}

struct Channel {
    name: String,
    listeners: Vec<Listener>,
}

#[derive(Default)]
struct Faults {
    session_check: bool,
    hang_session_check: bool,
    sign_in: bool,
    sign_out: bool,
    selects: u32,
    inserts: u32,
    deletes: u32,
    open_channel: bool,
    duplicate_delivery: bool,
    drop_delivery: bool,
}

#[derive(Default)]
struct Counters {
    session_checks: usize,
    select_calls: usize,
    insert_calls: usize,
    delete_calls: usize,
    channels_opened: usize,
    sign_ins: Vec<(String, String)>,
}

#[derive(Default)]
struct Inner {
    session: Option<AuthUser>,
    tables: HashMap<String, Vec<Record>>,
    channels: HashMap<u64, Channel>,
    next_channel: u64,
    faults: Faults,
    counters: Counters,
}

#[derive(Clone, Default)]
pub struct LoopbackBackend {
    inner: Arc<Mutex<Inner>>,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backends(&self) -> Backends {
        Backends::new(
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
        )
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Auth controls
    // ─────────────────────────────────────────────────────────────────────

    /// Sets the session the provider reports, e.g. after a redirect returns.
    pub fn set_session(&self, user: Option<AuthUser>) {
        self.lock().session = user;
    }

    pub fn fail_session_check(&self, fail: bool) {
        self.lock().faults.session_check = fail;
    }

    pub fn hang_session_check(&self, hang: bool) {
        self.lock().faults.hang_session_check = hang;
    }

    pub fn fail_sign_in(&self, fail: bool) {
        self.lock().faults.sign_in = fail;
    }

    pub fn fail_sign_out(&self, fail: bool) {
        self.lock().faults.sign_out = fail;
    }

    pub fn session_checks(&self) -> usize {
        self.lock().counters.session_checks
    }

    pub fn sign_ins(&self) -> Vec<(String, String)> {
        self.lock().counters.sign_ins.clone()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Data controls
    // ─────────────────────────────────────────────────────────────────────

    /// Replaces a table's rows without emitting change events.
    pub fn seed_remote(&self, collection: &str, records: Vec<Record>) {
        self.lock().tables.insert(collection.to_string(), records);
    }

    pub fn remote_rows(&self, collection: &str) -> Vec<Record> {
        self.lock()
            .tables
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn fail_next_selects(&self, count: u32) {
        self.lock().faults.selects = count;
    }

    pub fn fail_next_inserts(&self, count: u32) {
        self.lock().faults.inserts = count;
    }

    pub fn fail_next_deletes(&self, count: u32) {
        self.lock().faults.deletes = count;
    }

    pub fn select_calls(&self) -> usize {
        self.lock().counters.select_calls
    }

    pub fn insert_calls(&self) -> usize {
        self.lock().counters.insert_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.lock().counters.delete_calls
    }

    /// A write from another device: stored and broadcast like any insert.
    pub fn remote_insert(&self, collection: &str, record: NewRecord) -> Record {
        let mut inner = self.lock();
        insert_row(&mut inner, collection, record)
    }

    pub fn remote_delete(&self, collection: &str, id: &str) -> bool {
        let mut inner = self.lock();
        delete_row(&mut inner, collection, id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Realtime controls
    // ─────────────────────────────────────────────────────────────────────

    pub fn fail_open_channel(&self, fail: bool) {
        self.lock().faults.open_channel = fail;
    }

    /// Delivers every payload twice.
    pub fn duplicate_delivery(&self, enabled: bool) {
        self.lock().faults.duplicate_delivery = enabled;
    }

    /// Silently drops payloads, as a flaky channel would.
    pub fn drop_delivery(&self, enabled: bool) {
        self.lock().faults.drop_delivery = enabled;
    }

    /// Pushes a raw payload to every listener on `collection`.
    pub fn emit(&self, collection: &str, payload: Value) -> usize {
        let mut inner = self.lock();
        broadcast(&mut inner, collection, payload)
    }

    pub fn open_channels(&self) -> usize {
        self.lock().channels.len()
    }

    pub fn channels_opened(&self) -> usize {
        self.lock().counters.channels_opened
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.lock()
            .channels
            .values()
            .map(|channel| channel.name.clone())
            .collect()
    }
}

fn take_fault(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

fn insert_row(inner: &mut Inner, collection: &str, record: NewRecord) -> Record {
    let row = Record {
        id: ulid::Ulid::new().to_string(),
        title: record.title,
        url: record.url,
        owner_id: record.user_id,
        created_at: Some(Utc::now().to_rfc3339()),
    };
    inner
        .tables
        .entry(collection.to_string())
        .or_default()
        .push(row.clone());
    let payload = ChangePayload::insert(collection, &row);
    broadcast(inner, collection, payload.to_value());
    row
}

fn delete_row(inner: &mut Inner, collection: &str, id: &str) -> bool {
    let removed = match inner.tables.get_mut(collection) {
        Some(rows) => {
            let before = rows.len();
            rows.retain(|row| row.id != id);
            rows.len() != before
        }
        None => false,
    };
    if removed {
        let payload = ChangePayload::delete(collection, id);
        broadcast(inner, collection, payload.to_value());
    }
    removed
}

fn payload_event_type(payload: &Value) -> Option<PayloadEventType> {
    payload
        .get("eventType")
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

fn broadcast(inner: &mut Inner, collection: &str, payload: Value) -> usize {
    if inner.faults.drop_delivery {
        debug!(collection, "Dropping change payload");
        return 0;
    }

    let copies = if inner.faults.duplicate_delivery { 2 } else { 1 };
    let event_type = payload_event_type(&payload);
    let mut delivered = 0;

    for channel in inner.channels.values_mut() {
        channel.listeners.retain(|listener| !listener.sink.is_closed());
        for listener in &channel.listeners {
            if listener.collection != collection {
                continue;
            }
            if let Some(event_type) = event_type {
                if !listener.filter.matches(event_type) {
                    continue;
                }
            }
            for _ in 0..copies {
                match listener.sink.try_send(payload.clone()) {
                    Ok(()) => delivered += 1,
                    Err(err) => {
                        warn!(channel = %channel.name, error = %err, "Change payload not delivered");
                    }
                }
            }
        }
    }
    delivered
}

#[async_trait]
impl AuthProvider for LoopbackBackend {
    async fn get_current_session(&self) -> BackendResult<Option<AuthUser>> {
        let hang = {
            let mut inner = self.lock();
            inner.counters.session_checks += 1;
            if inner.faults.session_check {
                return Err(BackendError::new("network_error", "session check failed"));
            }
            inner.faults.hang_session_check
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(self.lock().session.clone())
    }

    async fn sign_in_with_provider(
        &self,
        provider: &str,
        redirect_url: &str,
    ) -> BackendResult<()> {
        let mut inner = self.lock();
        if inner.faults.sign_in {
            return Err(BackendError::new("provider_error", "sign-in unavailable"));
        }
        inner
            .counters
            .sign_ins
            .push((provider.to_string(), redirect_url.to_string()));
        Ok(())
    }

    async fn sign_out(&self) -> BackendResult<()> {
        let mut inner = self.lock();
        if inner.faults.sign_out {
            return Err(BackendError::new("network_error", "sign-out failed"));
        }
        inner.session = None;
        Ok(())
    }
}

#[async_trait]
impl DataStore for LoopbackBackend {
    async fn select_all(&self, collection: &str) -> BackendResult<Vec<Record>> {
        let mut inner = self.lock();
        inner.counters.select_calls += 1;
        if take_fault(&mut inner.faults.selects) {
            return Err(BackendError::new("network_error", "select failed"));
        }
        if inner.session.is_none() {
            return Err(BackendError::new("unauthorized", "no active session"));
        }
        Ok(inner.tables.get(collection).cloned().unwrap_or_default())
    }

    async fn insert(&self, collection: &str, record: NewRecord) -> BackendResult<()> {
        let mut inner = self.lock();
        inner.counters.insert_calls += 1;
        if take_fault(&mut inner.faults.inserts) {
            return Err(BackendError::new("network_error", "insert failed"));
        }
        match inner.session.as_ref() {
            Some(user) if user.user_id == record.user_id => {}
            Some(_) => return Err(BackendError::new("forbidden", "user_id mismatch")),
            None => return Err(BackendError::new("unauthorized", "no active session")),
        }
        insert_row(&mut inner, collection, record);
        Ok(())
    }

    async fn delete_where(&self, collection: &str, id: &str) -> BackendResult<()> {
        let mut inner = self.lock();
        inner.counters.delete_calls += 1;
        if take_fault(&mut inner.faults.deletes) {
            return Err(BackendError::new("network_error", "delete failed"));
        }
        if inner.session.is_none() {
            return Err(BackendError::new("unauthorized", "no active session"));
        }
        delete_row(&mut inner, collection, id);
        Ok(())
    }
}

#[async_trait]
impl RealtimeTransport for LoopbackBackend {
    async fn open_channel(&self, name: &str) -> BackendResult<ChannelHandle> {
        let mut inner = self.lock();
        if inner.faults.open_channel {
            return Err(BackendError::new("channel_error", "could not open channel"));
        }
        inner.next_channel += 1;
        let id = inner.next_channel;
        inner.channels.insert(
            id,
            Channel {
                name: name.to_string(),
                listeners: Vec::new(),
            },
        );
        inner.counters.channels_opened += 1;
        Ok(ChannelHandle(id))
    }

    async fn on_table_event(
        &self,
        handle: ChannelHandle,
        collection: &str,
        filter: EventFilter,
        sink: mpsc::Sender<Value>,
    ) -> BackendResult<()> {
        let mut inner = self.lock();
        let channel = inner
            .channels
            .get_mut(&handle.0)
            .ok_or_else(|| BackendError::new("unknown_channel", "channel is not open"))?;
        channel.listeners.push(Listener {
            collection: collection.to_string(),
            filter,
            sink,
        });
        Ok(())
    }

    async fn close_channel(&self, handle: ChannelHandle) -> BackendResult<()> {
        self.lock().channels.remove(&handle.0);
        Ok(())
    }
}
