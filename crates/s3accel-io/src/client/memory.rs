//! In-memory object client
//!
//! Serves objects from a map. Used by tests and demos, with knobs for
//! delaying and failing requests and counters for observing the requests
//! the cache actually made.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use s3accel_common::{Error, ObjectMetadata, ObjectUri, Result};

use super::{ObjectClient, ObjectContent};
use crate::range::Range;

/// Decrements the live stream counter when the body is dropped
struct StreamGuard(Arc<AtomicUsize>);

impl StreamGuard {
    fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(live))
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Object client backed by a `HashMap`
#[derive(Default)]
pub struct InMemoryObjectClient {
    objects: RwLock<HashMap<ObjectUri, Bytes>>,
    head_requests: AtomicU64,
    get_requests: AtomicU64,
    requested_ranges: Mutex<Vec<Range>>,
    live_streams: Arc<AtomicUsize>,
    fail_heads: AtomicBool,
    fail_gets: AtomicBool,
    get_delay: Mutex<Option<Duration>>,
    chunk_size: Mutex<Option<usize>>,
}

impl InMemoryObjectClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object, replacing any previous content
    pub fn put(&self, uri: ObjectUri, data: impl Into<Bytes>) {
        self.objects.write().insert(uri, data.into());
    }

    /// Number of head requests served so far
    pub fn head_requests(&self) -> u64 {
        self.head_requests.load(Ordering::SeqCst)
    }

    /// Number of get requests served so far
    pub fn get_requests(&self) -> u64 {
        self.get_requests.load(Ordering::SeqCst)
    }

    /// Ranges of every get request, in arrival order
    pub fn requested_ranges(&self) -> Vec<Range> {
        self.requested_ranges.lock().clone()
    }

    /// Response bodies handed out and not yet dropped
    pub fn live_streams(&self) -> usize {
        self.live_streams.load(Ordering::SeqCst)
    }

    /// Make every head request fail
    pub fn set_fail_heads(&self, fail: bool) {
        self.fail_heads.store(fail, Ordering::SeqCst);
    }

    /// Make every get request fail
    pub fn set_fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Hold each response body for `delay` before its first chunk
    pub fn set_get_delay(&self, delay: Option<Duration>) {
        *self.get_delay.lock() = delay;
    }

    /// Split response bodies into chunks of `size` bytes
    pub fn set_chunk_size(&self, size: Option<usize>) {
        *self.chunk_size.lock() = size.filter(|s| *s > 0);
    }

    fn object(&self, uri: &ObjectUri) -> Result<Bytes> {
        self.objects
            .read()
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::ObjectNotFound {
                bucket: uri.bucket().to_string(),
                key: uri.key().to_string(),
            })
    }
}

/// Slice `data` the way a ranged GET does: the end is clipped to the object,
/// a start past the end is unsatisfiable.
fn slice_range(data: &Bytes, range: Range) -> Result<Bytes> {
    let len = data.len() as u64;
    if range.start() >= len {
        return Err(Error::transport(format!(
            "range {range} not satisfiable for object of {len} bytes"
        )));
    }
    let end = range.end().min(len - 1);
    let start = usize::try_from(range.start()).map_err(|e| Error::internal(e.to_string()))?;
    let end = usize::try_from(end).map_err(|e| Error::internal(e.to_string()))?;
    Ok(data.slice(start..=end))
}

#[async_trait]
impl ObjectClient for InMemoryObjectClient {
    async fn head_object(&self, uri: &ObjectUri) -> Result<ObjectMetadata> {
        self.head_requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_heads.load(Ordering::SeqCst) {
            return Err(Error::transport(format!("injected head failure for {uri}")));
        }
        let data = self.object(uri)?;
        Ok(ObjectMetadata::new(data.len() as u64))
    }

    async fn get_object(&self, uri: &ObjectUri, range: Option<Range>) -> Result<ObjectContent> {
        self.get_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(range) = range {
            self.requested_ranges.lock().push(range);
        }
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(Error::transport(format!("injected get failure for {uri}")));
        }

        let data = self.object(uri)?;
        let body = match range {
            Some(range) => slice_range(&data, range)?,
            None => data,
        };

        let chunks: Vec<Bytes> = match *self.chunk_size.lock() {
            Some(size) => (0..body.len())
                .step_by(size)
                .map(|start| body.slice(start..(start + size).min(body.len())))
                .collect(),
            None => vec![body],
        };

        let delay = *self.get_delay.lock();
        let guard = StreamGuard::new(&self.live_streams);
        let stream = stream::once(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            chunks
        })
        .flat_map(|chunks| stream::iter(chunks.into_iter().map(Ok)))
        .map(move |chunk| {
            let _held = &guard;
            chunk
        });

        Ok(ObjectContent::new(stream.boxed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri() -> ObjectUri {
        ObjectUri::of("bucket", "key").unwrap()
    }

    fn client_with(data: &'static [u8]) -> InMemoryObjectClient {
        let client = InMemoryObjectClient::new();
        client.put(uri(), Bytes::from_static(data));
        client
    }

    #[tokio::test]
    async fn test_head_reports_length() {
        let client = client_with(b"0123456789");
        let meta = client.head_object(&uri()).await.unwrap();
        assert_eq!(meta.content_length, 10);
        assert_eq!(client.head_requests(), 1);
    }

    #[tokio::test]
    async fn test_head_missing_object() {
        let client = InMemoryObjectClient::new();
        let err = client.head_object(&uri()).await.unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn test_ranged_get_clips_end() {
        let client = client_with(b"0123456789");
        let content = client
            .get_object(&uri(), Some(Range::new(7, 20).unwrap()))
            .await
            .unwrap();
        assert_eq!(&content.collect(None).await.unwrap()[..], b"789");
        assert_eq!(client.requested_ranges(), vec![Range::new(7, 20).unwrap()]);
    }

    #[tokio::test]
    async fn test_ranged_get_past_end_fails() {
        let client = client_with(b"0123456789");
        let result = client
            .get_object(&uri(), Some(Range::new(10, 12).unwrap()))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_chunked_body_and_live_streams() {
        let client = client_with(b"0123456789");
        client.set_chunk_size(Some(3));

        let content = client.get_object(&uri(), None).await.unwrap();
        assert_eq!(client.live_streams(), 1);
        assert_eq!(&content.collect(None).await.unwrap()[..], b"0123456789");
        assert_eq!(client.live_streams(), 0);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let client = client_with(b"abc");
        client.set_fail_gets(true);
        assert!(client.get_object(&uri(), None).await.is_err());
        client.set_fail_heads(true);
        assert!(client.head_object(&uri()).await.is_err());
    }
}
