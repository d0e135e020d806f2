//! Read patterns replayed against the cache and against the file directly

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use s3accel_common::{Error, Result};
use s3accel_io::{IoPlan, Range, SeekableStream};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReadPattern {
    /// Front to back in `read_size` chunks
    Sequential,
    /// A footer read, then a sequential scan (columnar file layout)
    TailThenSequential,
    /// `random_reads` reads at uniformly random offsets
    Random,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOp {
    /// The last `n` bytes of the object
    Tail(u64),
    At(Range),
}

#[derive(Clone, Copy, Debug)]
pub struct PatternParams {
    pub read_size: u64,
    pub tail_size: u64,
    pub random_reads: usize,
    pub seed: u64,
}

/// Expand `pattern` into concrete reads against an object of `content_length` bytes
pub fn plan_reads(
    pattern: ReadPattern,
    content_length: u64,
    params: &PatternParams,
) -> Vec<ReadOp> {
    let Some(last_byte) = content_length.checked_sub(1) else {
        return Vec::new();
    };
    let read_size = params.read_size.max(1);

    let sequential = || {
        (0..content_length)
            .step_by(usize::try_from(read_size).unwrap_or(usize::MAX))
            .filter_map(move |start| {
                Range::new(start, start.saturating_add(read_size - 1).min(last_byte)).ok()
            })
            .map(ReadOp::At)
    };

    match pattern {
        ReadPattern::Sequential => sequential().collect(),
        ReadPattern::TailThenSequential => {
            let tail = params.tail_size.clamp(1, content_length);
            std::iter::once(ReadOp::Tail(tail)).chain(sequential()).collect()
        }
        ReadPattern::Random => {
            let mut rng = StdRng::seed_from_u64(params.seed);
            (0..params.random_reads)
                .filter_map(|_| {
                    let start = rng.gen_range(0..content_length);
                    Range::new(start, start.saturating_add(read_size - 1).min(last_byte)).ok()
                })
                .map(ReadOp::At)
                .collect()
        }
    }
}

/// Positioned reads of `ops`, for handing to the cache as a prefetch plan
pub fn prefetch_plan(ops: &[ReadOp]) -> IoPlan {
    ops.iter()
        .filter_map(|op| match op {
            ReadOp::At(range) => Some(*range),
            ReadOp::Tail(_) => None,
        })
        .collect()
}

fn buffer_for(len: u64) -> Result<Vec<u8>> {
    let len = usize::try_from(len).map_err(|_| {
        Error::invalid_argument(format!("read of {len} bytes does not fit in memory"))
    })?;
    Ok(vec![0u8; len])
}

/// Replay `ops` through `stream`, returning the CRC32C of everything read
pub async fn replay(stream: &mut SeekableStream, ops: &[ReadOp]) -> Result<u32> {
    let mut crc = 0;

    for op in ops {
        match *op {
            ReadOp::Tail(n) => {
                let mut buf = buffer_for(n)?;
                stream.read_tail(&mut buf).await?;
                crc = crc32c::crc32c_append(crc, &buf);
            }
            ReadOp::At(range) => {
                let mut buf = buffer_for(range.len())?;
                stream.seek(range.start())?;

                let mut filled = 0;
                while filled < buf.len() {
                    let n = stream.read(&mut buf[filled..]).await?;
                    if n == 0 {
                        return Err(Error::ShortRead {
                            expected: range.len(),
                            actual: filled as u64,
                        });
                    }
                    filled += n;
                }
                crc = crc32c::crc32c_append(crc, &buf);
            }
        }
    }

    Ok(crc)
}

/// CRC32C of `ops` read straight from the file at `path`
pub fn checksum_file(path: &Path, ops: &[ReadOp]) -> Result<u32> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let mut crc = 0;

    for op in ops {
        let (start, len) = match *op {
            ReadOp::Tail(n) => (size.saturating_sub(n), n),
            ReadOp::At(range) => (range.start(), range.len()),
        };
        let mut buf = buffer_for(len)?;
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut buf)?;
        crc = crc32c::crc32c_append(crc, &buf);
    }

    Ok(crc)
}
