//! Configuration types for s3accel
//!
//! Sizes used by the block cache are configuration inputs rather than
//! constants; the defaults below match the reference deployment.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default block size: 8 MiB
pub const DEFAULT_BLOCK_SIZE_BYTES: u64 = 8 * 1024 * 1024;

/// Default read-ahead: 64 KiB
pub const DEFAULT_READ_AHEAD_BYTES: u64 = 64 * 1024;

/// Default number of blocks kept alive per object stream
pub const DEFAULT_CAPACITY_BLOCKS: usize = 10;

/// Root configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Block cache configuration
    pub block_manager: BlockManagerConfig,
    /// Object transport configuration
    pub object_client: ObjectClientConfig,
}

impl Config {
    /// Check every section for values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        self.block_manager.validate()
    }
}

/// Block cache configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockManagerConfig {
    /// Size of a block created for a single-byte read miss
    pub block_size_bytes: u64,
    /// Minimum span of a block created for a bulk read miss
    pub read_ahead_bytes: u64,
    /// Maximum number of resident or in-flight blocks per object
    pub capacity_blocks: usize,
    /// Gap under which prefetch ranges are merged into one request
    pub prefetch_tolerance_bytes: u64,
}

impl Default for BlockManagerConfig {
    fn default() -> Self {
        Self {
            block_size_bytes: DEFAULT_BLOCK_SIZE_BYTES,
            read_ahead_bytes: DEFAULT_READ_AHEAD_BYTES,
            capacity_blocks: DEFAULT_CAPACITY_BLOCKS,
            prefetch_tolerance_bytes: 0,
        }
    }
}

impl BlockManagerConfig {
    /// Reject configurations that would create empty blocks or an empty ring
    pub fn validate(&self) -> Result<()> {
        if self.block_size_bytes == 0 {
            return Err(Error::configuration("block_size_bytes must be positive"));
        }
        if self.read_ahead_bytes == 0 {
            return Err(Error::configuration("read_ahead_bytes must be positive"));
        }
        if self.capacity_blocks == 0 {
            return Err(Error::configuration("capacity_blocks must be positive"));
        }
        Ok(())
    }
}

/// Configuration for the object transport client
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectClientConfig {
    /// Prefix prepended to the client's user agent
    pub user_agent_prefix: Option<String>,
}

impl ObjectClientConfig {
    /// User agent sent with every request
    #[must_use]
    pub fn user_agent(&self) -> String {
        let base = concat!("s3accel/", env!("CARGO_PKG_VERSION"));
        match &self.user_agent_prefix {
            Some(prefix) => format!("{prefix} {base}"),
            None => base.to_string(),
        }
    }
}
