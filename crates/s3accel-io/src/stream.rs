//! Positioned reader over a [`BlockManager`]

use s3accel_common::{Error, ObjectUri, Result};

use crate::manager::{BlockManager, BlockManagerStats};
use crate::plan::IoPlan;

/// Seekable, forward-reading view of one object.
///
/// Holds a read position on top of the manager's positional API. Seeking past
/// the end of the object is allowed; reads from there report end of stream.
#[derive(Debug)]
pub struct SeekableStream {
    manager: BlockManager,
    position: u64,
}

impl SeekableStream {
    #[must_use]
    pub const fn new(manager: BlockManager) -> Self {
        Self {
            manager,
            position: 0,
        }
    }

    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    #[must_use]
    pub const fn uri(&self) -> &ObjectUri {
        self.manager.uri()
    }

    #[must_use]
    pub const fn stats(&self) -> BlockManagerStats {
        self.manager.stats()
    }

    #[must_use]
    pub const fn manager(&self) -> &BlockManager {
        &self.manager
    }

    pub async fn content_length(&mut self) -> Result<u64> {
        self.manager.content_length().await
    }

    /// Move the read position to `pos`
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.ensure_open()?;
        self.position = pos;
        Ok(())
    }

    /// Read one byte and advance, `None` at end of stream
    pub async fn read_byte(&mut self) -> Result<Option<u8>> {
        self.ensure_open()?;
        if self.position >= self.manager.content_length().await? {
            return Ok(None);
        }

        let byte = self.manager.read_byte(self.position).await?;
        self.position += 1;
        Ok(Some(byte))
    }

    /// Read up to `buf.len()` bytes and advance by the number read.
    /// Returns 0 at end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.manager.read(buf, self.position).await?;
        self.position += n as u64;
        Ok(n)
    }

    /// Fill `buf` from `pos` without moving the read position.
    ///
    /// Fails with `InvalidArgument` if the object ends before `buf` is full.
    pub async fn read_fully(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        self.ensure_open()?;
        let content_length = self.manager.content_length().await?;
        let end = pos.checked_add(buf.len() as u64);
        if end.is_none_or(|end| end > content_length) {
            return Err(Error::invalid_argument(format!(
                "cannot read {} bytes at {pos} from a {content_length} byte object",
                buf.len()
            )));
        }

        let n = self.manager.read(buf, pos).await?;
        if n != buf.len() {
            return Err(Error::ShortRead {
                expected: buf.len() as u64,
                actual: n as u64,
            });
        }
        Ok(())
    }

    /// Fill `buf` with the end of the object without moving the read position
    pub async fn read_tail(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.manager.read_tail(buf).await
    }

    /// Start background fetches for ranges the caller is about to read
    pub async fn prefetch(&mut self, plan: IoPlan) -> Result<IoPlan> {
        self.manager.prefetch(plan).await
    }

    /// Release every cached block. Idempotent.
    pub fn close(&mut self) {
        self.manager.close();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.manager.is_closed() {
            return Err(Error::StreamClosed(self.manager.uri().to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use s3accel_common::BlockManagerConfig;

    use super::*;
    use crate::client::InMemoryObjectClient;
    use crate::metadata::MetadataStore;

    fn stream_over(data: Vec<u8>) -> SeekableStream {
        let uri = ObjectUri::of("bucket", "stream").unwrap();
        let client = Arc::new(InMemoryObjectClient::new());
        client.put(uri.clone(), data);
        let metadata = Arc::new(MetadataStore::new(client.clone()));
        let config = BlockManagerConfig {
            block_size_bytes: 8,
            read_ahead_bytes: 4,
            capacity_blocks: 2,
            prefetch_tolerance_bytes: 0,
        };
        SeekableStream::new(BlockManager::new(client, metadata, uri, config).unwrap())
    }

    #[tokio::test]
    async fn test_sequential_reads_advance_position() {
        let mut stream = stream_over(b"hello, block cache".to_vec());

        let mut buf = [0u8; 5];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(stream.position(), 5);

        assert_eq!(stream.read_byte().await.unwrap(), Some(b','));
        assert_eq!(stream.position(), 6);

        let mut rest = Vec::new();
        let mut chunk = [0u8; 3];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            rest.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(rest, b" block cache");
        assert_eq!(stream.read_byte().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_seek_past_end_reads_nothing() {
        let mut stream = stream_over(vec![7u8; 10]);
        stream.seek(50).unwrap();
        assert_eq!(stream.position(), 50);

        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
        assert_eq!(stream.read_byte().await.unwrap(), None);
        assert_eq!(stream.position(), 50);
    }

    #[tokio::test]
    async fn test_read_fully_keeps_position() {
        let data: Vec<u8> = (0u8..40).collect();
        let mut stream = stream_over(data);
        stream.seek(3).unwrap();

        let mut buf = [0u8; 12];
        stream.read_fully(20, &mut buf).await.unwrap();
        assert_eq!(buf.to_vec(), (20u8..32).collect::<Vec<_>>());
        assert_eq!(stream.position(), 3);

        let err = stream.read_fully(30, &mut buf).await.unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[tokio::test]
    async fn test_read_tail_keeps_position() {
        let data: Vec<u8> = (0u8..40).collect();
        let mut stream = stream_over(data);

        let mut footer = [0u8; 4];
        assert_eq!(stream.read_tail(&mut footer).await.unwrap(), 4);
        assert_eq!(footer, [36, 37, 38, 39]);
        assert_eq!(stream.position(), 0);
    }

    #[tokio::test]
    async fn test_closed_stream_rejects_reads() {
        let mut stream = stream_over(vec![1u8; 10]);
        stream.close();
        stream.close();

        assert!(matches!(stream.seek(1), Err(Error::StreamClosed(_))));
        assert!(matches!(
            stream.read(&mut [0u8; 2]).await,
            Err(Error::StreamClosed(_))
        ));
        assert!(matches!(stream.read_byte().await, Err(Error::StreamClosed(_))));
    }
}
