//! s3accel I/O
//!
//! Block cache and I/O planning engine for random-access reads of large,
//! immutable objects held in a remote object store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  SeekableStream  │  (position + read/seek front-end)
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │   BlockManager   │  read / read_tail / prefetch
//! │  - BlockStore    │  position lookup, gap queries
//! │  - EvictionRing  │  FIFO memory bound
//! │  - MetadataStore │  head metadata, fetched once
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │   ObjectClient   │  (head / ranged get, external)
//! └──────────────────┘
//! ```
//!
//! Every cached [`Block`] owns a spawned fetch task started at creation time.
//! Readers only wait on that task the first time they need one of its bytes,
//! and evicting or closing the block cancels the task.

pub mod block;
pub mod block_store;
pub mod client;
pub mod eviction;
pub mod manager;
pub mod metadata;
pub mod plan;
pub mod range;
pub mod stream;
pub mod telemetry;

pub use block::Block;
pub use block_store::BlockStore;
pub use client::{ObjectClient, ObjectContent};
pub use eviction::{Close, EvictionRing};
pub use manager::{BlockManager, BlockManagerStats};
pub use metadata::MetadataStore;
pub use plan::IoPlan;
pub use range::Range;
pub use stream::SeekableStream;
pub use telemetry::{
    LoggingTelemetryReporter, NoOpTelemetryReporter, Operation, OperationMeasurement,
    TelemetryReporter,
};
