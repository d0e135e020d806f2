//! s3accel bench
//!
//! Serves a local directory as a bucket, replays a read pattern against one
//! object through the block cache and checks the bytes against a direct read
//! of the file.

mod fs_client;
mod pattern;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use s3accel_common::{BucketName, ObjectUri};
use s3accel_io::{
    BlockManager, LoggingTelemetryReporter, MetadataStore, SeekableStream, TelemetryReporter,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::fs_client::FsObjectClient;
use crate::pattern::{PatternParams, ReadPattern};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "s3accel-bench",
    about = "Replay read patterns through the s3accel block cache"
)]
struct Args {
    /// Directory served as the bucket
    #[arg(long)]
    root: PathBuf,

    /// Object key, relative to the root directory
    #[arg(long)]
    key: String,

    /// Bucket name the directory is served under
    #[arg(long, default_value = "local")]
    bucket: String,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read pattern to replay
    #[arg(long, value_enum, default_value_t = ReadPattern::Sequential)]
    pattern: ReadPattern,

    /// Bytes per positioned read
    #[arg(long, default_value_t = 1024 * 1024)]
    read_size: u64,

    /// Bytes read from the end of the object by tail-then-sequential
    #[arg(long, default_value_t = 64 * 1024)]
    tail_size: u64,

    /// Number of reads issued by the random pattern
    #[arg(long, default_value_t = 100)]
    random_reads: usize,

    /// Seed for the random pattern
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Hand the positioned reads to the cache as a prefetch plan first
    #[arg(long)]
    prefetch: bool,

    /// Override block_manager.block_size_bytes
    #[arg(long)]
    block_size: Option<u64>,

    /// Override block_manager.read_ahead_bytes
    #[arg(long)]
    read_ahead: Option<u64>,

    /// Override block_manager.capacity_blocks
    #[arg(long)]
    capacity: Option<usize>,

    /// Override block_manager.prefetch_tolerance_bytes
    #[arg(long)]
    prefetch_tolerance: Option<u64>,

    /// Log level (trace / debug / info / warn / error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    uri: String,
    pattern: ReadPattern,
    content_length: u64,
    reads: usize,
    prefetched_ranges: usize,
    prefetched_bytes: u64,
    elapsed_ms: f64,
    checksum: String,
    verified: bool,
    hits: u64,
    misses: u64,
    evictions: u64,
    bytes_requested: u64,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Tracing
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    // ── Configuration ─────────────────────────────────────────────────────────
    let mut config = settings::load(args.config.as_deref()).context("load configuration")?;
    let block_config = &mut config.block_manager;
    if let Some(v) = args.block_size {
        block_config.block_size_bytes = v;
    }
    if let Some(v) = args.read_ahead {
        block_config.read_ahead_bytes = v;
    }
    if let Some(v) = args.capacity {
        block_config.capacity_blocks = v;
    }
    if let Some(v) = args.prefetch_tolerance {
        block_config.prefetch_tolerance_bytes = v;
    }
    config.validate().context("validate configuration")?;

    info!(
        user_agent = %config.object_client.user_agent(),
        block_size = config.block_manager.block_size_bytes,
        read_ahead = config.block_manager.read_ahead_bytes,
        capacity = config.block_manager.capacity_blocks,
        "Starting s3accel bench"
    );

    // ── Cache over the local directory ────────────────────────────────────────
    let bucket = BucketName::new(args.bucket.as_str()).context("parse bucket name")?;
    let uri = ObjectUri::of(args.bucket.as_str(), args.key.as_str()).context("build object uri")?;
    let telemetry: Arc<dyn TelemetryReporter> = Arc::new(LoggingTelemetryReporter);
    let client = Arc::new(FsObjectClient::new(&args.root, bucket));
    let metadata = Arc::new(MetadataStore::with_telemetry(
        client.clone(),
        Arc::clone(&telemetry),
    ));
    let manager = BlockManager::new(client, metadata, uri.clone(), config.block_manager.clone())
        .context("create block manager")?
        .with_telemetry(telemetry);
    let mut stream = SeekableStream::new(manager);

    // ── Replay ────────────────────────────────────────────────────────────────
    let content_length = stream.content_length().await.context("head object")?;
    let params = PatternParams {
        read_size: args.read_size,
        tail_size: args.tail_size,
        random_reads: args.random_reads,
        seed: args.seed,
    };
    let ops = pattern::plan_reads(args.pattern, content_length, &params);

    let started = Instant::now();
    let (prefetched_ranges, prefetched_bytes) = if args.prefetch {
        let issued = stream
            .prefetch(pattern::prefetch_plan(&ops))
            .await
            .context("prefetch")?;
        info!("Prefetched {}", issued);
        (issued.len(), issued.total_bytes())
    } else {
        (0, 0)
    };
    let cached = pattern::replay(&mut stream, &ops)
        .await
        .with_context(|| format!("replay {:?} against {uri}", args.pattern))?;
    let elapsed = started.elapsed();
    stream.close();

    // ── Verify ────────────────────────────────────────────────────────────────
    let path = args.root.join(&args.key);
    let direct = pattern::checksum_file(&path, &ops)
        .with_context(|| format!("read {} directly", path.display()))?;

    let stats = stream.stats();
    let report = Report {
        uri: uri.to_string(),
        pattern: args.pattern,
        content_length,
        reads: ops.len(),
        prefetched_ranges,
        prefetched_bytes,
        elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        checksum: format!("{cached:08x}"),
        verified: cached == direct,
        hits: stats.hits,
        misses: stats.misses,
        evictions: stats.evictions,
        bytes_requested: stats.bytes_requested,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.verified {
        bail!("checksum mismatch: cache {cached:08x}, file {direct:08x}");
    }
    Ok(())
}
