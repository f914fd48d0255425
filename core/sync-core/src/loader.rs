//! One-shot bulk fetch used to seed the local store.

use std::cmp;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::backend::DataStore;
use crate::config::BulkLoadConfig;
use crate::error::{Result, SyncError};
use crate::types::Record;

pub struct BulkLoader {
    store: Arc<dyn DataStore>,
    config: BulkLoadConfig,
}

impl BulkLoader {
    pub fn new(store: Arc<dyn DataStore>, config: BulkLoadConfig) -> Self {
        Self { store, config }
    }

    /// Fetches the whole collection, retrying up to `max_attempts` times.
    pub async fn load_all(&self, collection: &str) -> Result<Vec<Record>> {
        let attempts = cmp::max(self.config.max_attempts, 1);
        let mut attempt = 1;

        loop {
            match self.store.select_all(collection).await {
                Ok(records) => {
                    info!(collection, records = records.len(), attempt, "Bulk load complete");
                    return Ok(records);
                }
                Err(err) if attempt < attempts => {
                    let delay = retry_delay(&self.config, attempt);
                    warn!(
                        collection,
                        attempt,
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "Bulk load failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(SyncError::Fetch {
                        collection: collection.to_string(),
                        source: err,
                    });
                }
            }
        }
    }
}

/// Linear backoff, capped at `retry_max_ms`.
fn retry_delay(config: &BulkLoadConfig, attempt: u32) -> Duration {
    let step = config.retry_step_ms.saturating_mul(attempt as u64);
    Duration::from_millis(cmp::min(step, config.retry_max_ms))
}
