//! Object metadata cache
//!
//! Head metadata is fetched at most once per object and shared by every
//! block manager reading that object. Objects are immutable, so a populated
//! entry never changes.

use std::sync::Arc;

use dashmap::DashMap;
use s3accel_common::{ObjectMetadata, ObjectUri, Result};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::client::ObjectClient;
use crate::telemetry::{self, NoOpTelemetryReporter, Operation, TelemetryReporter};

/// Cache of head-request results keyed by object
pub struct MetadataStore {
    client: Arc<dyn ObjectClient>,
    telemetry: Arc<dyn TelemetryReporter>,
    entries: DashMap<ObjectUri, Arc<OnceCell<ObjectMetadata>>>,
}

impl MetadataStore {
    /// Create a metadata store without telemetry
    pub fn new(client: Arc<dyn ObjectClient>) -> Self {
        Self::with_telemetry(client, Arc::new(NoOpTelemetryReporter))
    }

    pub fn with_telemetry(
        client: Arc<dyn ObjectClient>,
        telemetry: Arc<dyn TelemetryReporter>,
    ) -> Self {
        Self {
            client,
            telemetry,
            entries: DashMap::new(),
        }
    }

    /// Get the metadata for `uri`, issuing a head request on first use.
    ///
    /// Concurrent callers for the same object share one request. A failed
    /// request leaves the entry empty and the error goes to the callers that
    /// were waiting on it.
    pub async fn get(&self, uri: &ObjectUri) -> Result<ObjectMetadata> {
        let cell = Arc::clone(&self.entries.entry(uri.clone()).or_default());

        let metadata = cell
            .get_or_try_init(|| async {
                debug!("Fetching metadata for {}", uri);
                let operation = Operation::new("object.head").with_attribute("uri", uri);
                telemetry::measure(
                    self.telemetry.as_ref(),
                    operation,
                    self.client.head_object(uri),
                )
                .await
            })
            .await?;

        Ok(metadata.clone())
    }

    /// Metadata for `uri` if it has already been fetched
    #[must_use]
    pub fn get_cached(&self, uri: &ObjectUri) -> Option<ObjectMetadata> {
        self.entries.get(uri).and_then(|cell| cell.get().cloned())
    }

    /// Seed the cache with metadata obtained elsewhere (e.g. from a listing).
    ///
    /// An entry that is already populated is left untouched.
    pub fn insert(&self, uri: ObjectUri, metadata: ObjectMetadata) {
        let cell = Arc::clone(&self.entries.entry(uri).or_default());
        let _ = cell.set(metadata);
    }

    /// Forget the metadata for `uri`
    pub fn evict(&self, uri: &ObjectUri) {
        self.entries.remove(uri);
    }

    /// Number of populated entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
