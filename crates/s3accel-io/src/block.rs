//! Cached byte blocks
//!
//! A [`Block`] covers one contiguous range of an object. Its content is
//! fetched by a task spawned when the block is created; readers wait on that
//! task only when they first need a byte from it.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use s3accel_common::{Error, ObjectUri, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::client::ObjectClient;
use crate::eviction::Close;
use crate::range::Range;
use crate::telemetry::{self, Operation, TelemetryReporter};

enum Content {
    /// Fetch still running, or finished but not yet consumed
    Pending(JoinHandle<Result<Bytes>>),
    Ready(Bytes),
    /// Fetch failed; every read reports the same failure
    Failed(String),
    Closed,
}

/// One contiguous, immutable range of an object and its content
pub struct Block {
    range: Range,
    content: Content,
    cancel: CancellationToken,
    cursor: u64,
}

impl Block {
    /// Start fetching `range` of `uri` in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn fetch(
        client: Arc<dyn ObjectClient>,
        uri: ObjectUri,
        range: Range,
        telemetry: Arc<dyn TelemetryReporter>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.child_token();

        let handle = tokio::spawn(async move {
            let operation = Operation::new("block.get")
                .with_attribute("uri", &uri)
                .with_attribute("range", range);

            let fetch = telemetry::measure(telemetry.as_ref(), operation, async {
                let content = client.get_object(&uri, Some(range)).await?;
                content.collect(Some(range.len())).await
            });

            tokio::select! {
                biased;
                () = token.cancelled() => Err(Error::Cancelled),
                result = fetch => result,
            }
        });

        debug!("Created block {}", range);
        Self {
            range,
            content: Content::Pending(handle),
            cancel,
            cursor: range.start(),
        }
    }

    /// Create a block whose content is already available
    pub fn ready(range: Range, data: Bytes) -> Result<Self> {
        if data.len() as u64 != range.len() {
            return Err(Error::invalid_argument(format!(
                "block {range} needs {} bytes, got {}",
                range.len(),
                data.len()
            )));
        }
        Ok(Self {
            range,
            content: Content::Ready(data),
            cancel: CancellationToken::new(),
            cursor: range.start(),
        })
    }

    #[must_use]
    pub const fn range(&self) -> Range {
        self.range
    }

    #[must_use]
    pub const fn start(&self) -> u64 {
        self.range.start()
    }

    #[must_use]
    pub const fn end(&self) -> u64 {
        self.range.end()
    }

    #[must_use]
    pub const fn contains(&self, pos: u64) -> bool {
        self.range.contains(pos)
    }

    /// Position following the last bulk copy out of this block
    #[must_use]
    pub const fn cursor(&self) -> u64 {
        self.cursor
    }

    /// True once the content can be read without waiting
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        match &self.content {
            Content::Pending(handle) => handle.is_finished(),
            Content::Ready(_) => true,
            Content::Failed(_) | Content::Closed => false,
        }
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.content, Content::Closed)
    }

    /// Wait for the fetch if needed and return the block's bytes
    async fn data(&mut self) -> Result<&Bytes> {
        if let Content::Pending(handle) = &mut self.content {
            let outcome = handle.await;
            match outcome {
                Ok(Ok(data)) => self.content = Content::Ready(data),
                Ok(Err(e)) => {
                    self.content = Content::Failed(e.to_string());
                    return Err(e);
                }
                Err(e) if e.is_cancelled() => self.content = Content::Closed,
                Err(e) => {
                    let msg = format!("block fetch task failed: {e}");
                    self.content = Content::Failed(msg.clone());
                    return Err(Error::Transport(msg));
                }
            }
        }

        match &self.content {
            Content::Ready(data) => Ok(data),
            Content::Failed(msg) => Err(Error::Transport(msg.clone())),
            Content::Closed => Err(Error::Cancelled),
            Content::Pending(_) => Err(Error::internal("block content still pending")),
        }
    }

    fn check_contains(&self, pos: u64) -> Result<()> {
        if self.contains(pos) {
            Ok(())
        } else {
            Err(Error::invalid_argument(format!(
                "position {pos} is outside block {}",
                self.range
            )))
        }
    }

    /// Read the byte at `pos`
    pub async fn get_byte(&mut self, pos: u64) -> Result<u8> {
        self.check_contains(pos)?;
        let start = self.start();
        let data = self.data().await?;
        let offset = usize::try_from(pos - start).map_err(|e| Error::internal(e.to_string()))?;
        data.get(offset)
            .copied()
            .ok_or_else(|| Error::internal(format!("block {start} is shorter than its range")))
    }

    /// Copy bytes starting at `pos` into `buf`.
    ///
    /// Copies `min(buf.len(), end - pos + 1)` bytes and returns the count.
    pub async fn read_into(&mut self, buf: &mut [u8], pos: u64) -> Result<usize> {
        self.check_contains(pos)?;
        let start = self.start();
        let data = self.data().await?;

        let offset = usize::try_from(pos - start).map_err(|e| Error::internal(e.to_string()))?;
        let available = data.len().saturating_sub(offset);
        let n = buf.len().min(available);
        buf[..n].copy_from_slice(&data[offset..offset + n]);

        self.cursor = pos + n as u64;
        trace!(pos, n, "Copied from block {}", self.range);
        Ok(n)
    }

    /// Cancel the fetch and drop the content. Idempotent.
    pub fn close(&mut self) {
        self.release();
    }

    fn release(&mut self) {
        if matches!(self.content, Content::Closed) {
            return;
        }
        self.cancel.cancel();
        if let Content::Pending(handle) = &self.content {
            handle.abort();
        }
        self.content = Content::Closed;
        debug!("Closed block {}", self.range);
    }
}

impl Close for Block {
    fn close(&mut self) -> Result<()> {
        self.release();
        Ok(())
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.content {
            Content::Pending(_) => "pending",
            Content::Ready(_) => "ready",
            Content::Failed(_) => "failed",
            Content::Closed => "closed",
        };
        f.debug_struct("Block")
            .field("range", &self.range)
            .field("state", &state)
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryObjectClient;
    use crate::telemetry::NoOpTelemetryReporter;
    use std::time::Duration;

    fn uri() -> ObjectUri {
        ObjectUri::of("bucket", "object").unwrap()
    }

    fn client() -> Arc<InMemoryObjectClient> {
        let client = Arc::new(InMemoryObjectClient::new());
        client.put(uri(), (0u8..100).collect::<Vec<_>>());
        client
    }

    fn fetch(client: &Arc<InMemoryObjectClient>, start: u64, end: u64) -> Block {
        Block::fetch(
            client.clone(),
            uri(),
            Range::new(start, end).unwrap(),
            Arc::new(NoOpTelemetryReporter),
        )
    }

    #[tokio::test]
    async fn test_get_byte() {
        let client = client();
        let mut block = fetch(&client, 10, 19);

        assert_eq!(block.get_byte(10).await.unwrap(), 10);
        assert_eq!(block.get_byte(19).await.unwrap(), 19);
        assert!(block.is_loaded());
        assert_eq!(client.get_requests(), 1);
    }

    #[tokio::test]
    async fn test_get_byte_outside_range() {
        let client = client();
        let mut block = fetch(&client, 10, 19);
        assert!(block.get_byte(20).await.unwrap_err().is_invalid_argument());
        assert!(block.get_byte(9).await.unwrap_err().is_invalid_argument());
    }

    #[tokio::test]
    async fn test_read_into_is_bounded_by_block_end() {
        let client = client();
        let mut block = fetch(&client, 10, 19);

        let mut buf = [0u8; 8];
        assert_eq!(block.read_into(&mut buf, 15).await.unwrap(), 5);
        assert_eq!(&buf[..5], &[15, 16, 17, 18, 19]);
        assert_eq!(block.cursor(), 20);

        let mut small = [0u8; 2];
        assert_eq!(block.read_into(&mut small, 11).await.unwrap(), 2);
        assert_eq!(small, [11, 12]);
        assert_eq!(block.cursor(), 13);
    }

    #[tokio::test]
    async fn test_failed_fetch_reported_on_every_read() {
        let client = client();
        client.set_fail_gets(true);
        let mut block = fetch(&client, 0, 9);

        assert!(block.get_byte(0).await.unwrap_err().is_transport());
        assert!(block.get_byte(1).await.unwrap_err().is_transport());
        assert!(!block.is_loaded());
    }

    #[tokio::test]
    async fn test_short_body_is_an_error() {
        let client = client();
        // Object is 100 bytes, so the client clips this range to 90..=99
        let mut block = fetch(&client, 90, 109);
        let err = block.get_byte(95).await.unwrap_err();
        assert!(matches!(err, Error::ShortRead { expected: 20, actual: 10 }));
    }

    #[tokio::test]
    async fn test_close_cancels_in_flight_fetch() {
        let client = client();
        client.set_get_delay(Some(Duration::from_secs(3600)));
        let mut block = fetch(&client, 0, 9);

        // Let the task open the response body
        while client.live_streams() == 0 {
            tokio::task::yield_now().await;
        }

        block.close();
        assert!(block.is_closed());
        while client.live_streams() != 0 {
            tokio::task::yield_now().await;
        }
        assert!(matches!(block.get_byte(0).await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = client();
        let mut block = fetch(&client, 0, 9);
        block.close();
        block.close();
        assert!(Close::close(&mut block).is_ok());
        assert!(block.is_closed());
    }

    #[tokio::test]
    async fn test_ready_block() {
        let range = Range::new(5, 7).unwrap();
        let mut block = Block::ready(range, Bytes::from_static(b"abc")).unwrap();
        assert_eq!(block.get_byte(6).await.unwrap(), b'b');
        assert!(Block::ready(range, Bytes::from_static(b"ab")).is_err());
    }
}
