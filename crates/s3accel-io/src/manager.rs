//! Block manager
//!
//! Turns byte reads against one object into block lookups and block fetches.
//! On a miss a new block is sized by the read-ahead policy, its fetch is
//! started in the background, and it is admitted to the [`BlockStore`],
//! evicting the oldest block once `capacity_blocks` is reached.

use std::sync::Arc;

use s3accel_common::{BlockManagerConfig, Error, ObjectUri, Result};
use tracing::{debug, info};

use crate::block::Block;
use crate::block_store::BlockStore;
use crate::client::ObjectClient;
use crate::metadata::MetadataStore;
use crate::plan::IoPlan;
use crate::range::Range;
use crate::telemetry::{NoOpTelemetryReporter, TelemetryReporter};

/// Counters describing how reads were served
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockManagerStats {
    /// Reads served by a block that was already resident or in flight
    pub hits: u64,
    /// Reads that had to create a block
    pub misses: u64,
    /// Blocks evicted to make room for new ones
    pub evictions: u64,
    /// Blocks created by prefetching
    pub prefetched_blocks: u64,
    /// Total bytes requested from the object client
    pub bytes_requested: u64,
}

/// Read façade over the block cache of one object.
///
/// A manager serves one logical reader at a time; share it behind a lock or
/// create one per reader.
pub struct BlockManager {
    uri: ObjectUri,
    client: Arc<dyn ObjectClient>,
    metadata: Arc<MetadataStore>,
    telemetry: Arc<dyn TelemetryReporter>,
    config: BlockManagerConfig,
    store: BlockStore,
    content_length: Option<u64>,
    stats: BlockManagerStats,
    closed: bool,
}

impl BlockManager {
    /// Create a manager for `uri`. Nothing is fetched until the first read.
    pub fn new(
        client: Arc<dyn ObjectClient>,
        metadata: Arc<MetadataStore>,
        uri: ObjectUri,
        config: BlockManagerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let store = BlockStore::new(uri.clone(), Arc::clone(&metadata), config.capacity_blocks);
        Ok(Self {
            uri,
            client,
            metadata,
            telemetry: Arc::new(NoOpTelemetryReporter),
            config,
            store,
            content_length: None,
            stats: BlockManagerStats::default(),
            closed: false,
        })
    }

    /// Report block fetches to `telemetry`
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetryReporter>) -> Self {
        self.telemetry = telemetry;
        self
    }

    #[must_use]
    pub const fn uri(&self) -> &ObjectUri {
        &self.uri
    }

    #[must_use]
    pub const fn config(&self) -> &BlockManagerConfig {
        &self.config
    }

    #[must_use]
    pub const fn stats(&self) -> BlockManagerStats {
        self.stats
    }

    #[must_use]
    pub const fn block_store(&self) -> &BlockStore {
        &self.store
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Size of the object. The first call waits for the head request.
    pub async fn content_length(&mut self) -> Result<u64> {
        if let Some(len) = self.content_length {
            return Ok(len);
        }
        let len = self.metadata.get(&self.uri).await?.content_length;
        self.content_length = Some(len);
        Ok(len)
    }

    /// Position of the last byte, `None` for an empty object
    pub async fn last_object_byte(&mut self) -> Result<Option<u64>> {
        Ok(self.content_length().await?.checked_sub(1))
    }

    /// Read the byte at `pos`
    pub async fn read_byte(&mut self, pos: u64) -> Result<u8> {
        self.ensure_open()?;
        let content_length = self.content_length().await?;
        if pos >= content_length {
            return Err(Error::invalid_argument(format!(
                "position {pos} is beyond the end of {} ({content_length} bytes)",
                self.uri
            )));
        }

        let block = self.block_for(pos, None, content_length)?;
        block.get_byte(pos).await
    }

    /// Read into `buf` starting at `pos`.
    ///
    /// Returns the number of bytes copied, which is less than `buf.len()` only
    /// when the end of the object is reached. Reading at or past the end
    /// returns 0.
    pub async fn read(&mut self, buf: &mut [u8], pos: u64) -> Result<usize> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let content_length = self.content_length().await?;
        let mut num_read = 0;
        let mut next_pos = pos;

        while num_read < buf.len() && next_pos < content_length {
            let remaining = (buf.len() - num_read) as u64;
            let block = self.block_for(next_pos, Some(remaining), content_length)?;
            let n = block.read_into(&mut buf[num_read..], next_pos).await?;
            if n == 0 {
                return Err(Error::internal(format!(
                    "block {} returned no bytes at {next_pos}",
                    block.range()
                )));
            }

            num_read += n;
            next_pos += n as u64;
        }

        Ok(num_read)
    }

    /// Fill `buf` with the last `buf.len()` bytes of the object
    pub async fn read_tail(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        let n = buf.len() as u64;
        let content_length = self.content_length().await?;
        if n > content_length {
            return Err(Error::invalid_argument(format!(
                "cannot request {n} bytes from the tail of a {content_length} byte object"
            )));
        }

        self.read(buf, content_length - n).await
    }

    /// Start fetching the parts of `plan` that no block covers yet.
    ///
    /// The plan is coalesced with the configured tolerance first. Gaps are
    /// fetched in blocks of at most `block_size_bytes`. Issuing stops before a
    /// new block would evict one that overlaps the plan, whether it was
    /// already resident or issued by this call. Returns the ranges that were
    /// requested; fetches are not awaited.
    pub async fn prefetch(&mut self, mut plan: IoPlan) -> Result<IoPlan> {
        self.ensure_open()?;
        let content_length = self.content_length().await?;
        plan.coalesce(self.config.prefetch_tolerance_bytes);

        let mut issued = IoPlan::default();
        for range in plan.ranges() {
            if range.start() >= content_length {
                continue;
            }
            let end = range.end().min(content_length - 1);
            let mut pos = range.start();

            while pos <= end {
                if self.would_evict_plan(&plan) {
                    debug!("Prefetch of {} stopped at store capacity", plan);
                    return Ok(issued);
                }

                let Some(missing) = self.store.find_next_missing_byte(pos).await? else {
                    break;
                };
                if missing > end {
                    break;
                }

                let gap_end = self
                    .store
                    .find_next_loaded_byte(missing)
                    .map_or(end, |loaded| (loaded - 1).min(end));
                let block_end = gap_end.min(
                    missing.saturating_add(self.config.block_size_bytes - 1),
                );

                let block_range = Range::new(missing, block_end)?;
                self.create_block(block_range);
                self.stats.prefetched_blocks += 1;
                issued.push(block_range);

                match block_end.checked_add(1) {
                    Some(next) => pos = next,
                    None => break,
                }
            }
        }

        debug!("Prefetch of {} issued {}", plan, issued);
        Ok(issued)
    }

    /// Close every block and refuse further reads. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.store.close();
        self.closed = true;
        info!(
            hits = self.stats.hits,
            misses = self.stats.misses,
            evictions = self.stats.evictions,
            "Closed block manager for {}",
            self.uri
        );
    }

    /// True when admitting one more block evicts a block covering part of `plan`
    fn would_evict_plan(&self, plan: &IoPlan) -> bool {
        self.store.len() >= self.store.capacity()
            && self.store.oldest().is_some_and(|oldest| {
                plan.ranges()
                    .iter()
                    .any(|range| range.overlaps(&oldest.range()))
            })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::StreamClosed(self.uri.to_string()));
        }
        Ok(())
    }

    /// The block covering `pos`, created if none is resident.
    ///
    /// `requested` is the number of bytes the caller still wants; `None` means
    /// a single-byte read.
    fn block_for(
        &mut self,
        pos: u64,
        requested: Option<u64>,
        content_length: u64,
    ) -> Result<&mut Block> {
        if self.store.get_block(pos).is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
            let range = self.fetch_range(pos, requested, content_length)?;
            self.create_block(range);
        }

        self.store
            .get_block_mut(pos)
            .ok_or_else(|| Error::internal(format!("no block covers {pos} after creation")))
    }

    /// Range of the block to create for a miss at `pos`, clipped to the
    /// object's last byte
    fn fetch_range(&self, pos: u64, requested: Option<u64>, content_length: u64) -> Result<Range> {
        let last_byte = content_length
            .checked_sub(1)
            .ok_or_else(|| Error::invalid_argument(format!("{} is empty", self.uri)))?;

        let span = match requested {
            None => self.config.block_size_bytes,
            Some(len) if len > self.config.read_ahead_bytes => len,
            Some(_) => self.config.read_ahead_bytes,
        };

        let end = pos.saturating_add(span.saturating_sub(1)).min(last_byte);
        Range::new(pos, end)
    }

    fn create_block(&mut self, range: Range) {
        let block = Block::fetch(
            Arc::clone(&self.client),
            self.uri.clone(),
            range,
            Arc::clone(&self.telemetry),
        );
        self.stats.bytes_requested += range.len();

        if self.store.add(block).is_some() {
            self.stats.evictions += 1;
        }
    }
}

impl std::fmt::Debug for BlockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockManager")
            .field("uri", &self.uri)
            .field("blocks", &self.store.len())
            .field("stats", &self.stats)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
