//! Per-object block store
//!
//! Holds the resident and in-flight blocks of one object. Blocks live in an
//! [`EvictionRing`], which is their only owner, so admitting a block and
//! evicting the oldest one happen in the same call and a block can never be
//! closed twice from two places.

use std::sync::Arc;

use s3accel_common::{ObjectUri, Result};
use tracing::debug;

use crate::block::Block;
use crate::eviction::EvictionRing;
use crate::metadata::MetadataStore;

/// The blocks cached for one object
pub struct BlockStore {
    uri: ObjectUri,
    metadata: Arc<MetadataStore>,
    blocks: EvictionRing<Block>,
}

impl BlockStore {
    /// Create an empty store holding at most `capacity` blocks
    pub fn new(uri: ObjectUri, metadata: Arc<MetadataStore>, capacity: usize) -> Self {
        Self {
            uri,
            metadata,
            blocks: EvictionRing::new(capacity),
        }
    }

    #[must_use]
    pub const fn uri(&self) -> &ObjectUri {
        &self.uri
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.blocks.capacity()
    }

    /// Blocks from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// The block the next admission into a full store evicts
    #[must_use]
    pub fn oldest(&self) -> Option<&Block> {
        self.blocks.iter().next()
    }

    /// The first block holding the byte at `pos`
    #[must_use]
    pub fn get_block(&self, pos: u64) -> Option<&Block> {
        self.blocks.iter().find(|b| b.contains(pos))
    }

    pub fn get_block_mut(&mut self, pos: u64) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.contains(pos))
    }

    /// Position of the next byte at or after `pos` that a block has loaded or
    /// is loading, or `None` if no block starts after `pos`
    #[must_use]
    pub fn find_next_loaded_byte(&self, pos: u64) -> Option<u64> {
        if self.get_block(pos).is_some() {
            return Some(pos);
        }

        self.blocks
            .iter()
            .map(Block::start)
            .filter(|start| pos < *start)
            .min()
    }

    /// Position of the next byte at or after `pos` that no block covers, or
    /// `None` if everything from `pos` to the end of the object is covered
    pub async fn find_next_missing_byte(&self, pos: u64) -> Result<Option<u64>> {
        let mut next_missing = Some(pos);

        while let Some(block) = next_missing.and_then(|candidate| self.get_block(candidate)) {
            next_missing = block.end().checked_add(1);
        }

        let content_length = self.metadata.get(&self.uri).await?.content_length;
        Ok(next_missing.filter(|candidate| *candidate < content_length))
    }

    /// Admit `block`. When the store is full the oldest block is closed and
    /// returned.
    pub fn add(&mut self, block: Block) -> Option<Block> {
        let evicted = self.blocks.insert(block);
        if let Some(evicted) = &evicted {
            debug!("Evicted block {} of {}", evicted.range(), self.uri);
        }
        evicted
    }

    /// Close and drop every block. Failures are logged, never raised.
    pub fn close(&mut self) {
        self.blocks.clear();
    }
}
