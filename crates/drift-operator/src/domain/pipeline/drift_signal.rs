//! Drift signal reader
//!
//! The drift monitor appends one line per drifted sample to an artifact on the
//! shared volume. The number of lines is the sample count compared against the
//! retraining threshold.

use std::io;
use std::io::ErrorKind;
use std::path::Path;

use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::BufReader;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Result of reading the drift artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftSignal {
    Absent,
    Present { sample_count: u64 },
    Unknown { reason: String },
}

/// Classification of a [`DriftSignal`] against a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum DriftLevel {
    Absent,
    BelowThreshold,
    AboveThreshold,
    Unknown,
}

impl DriftSignal {
    /// Samples strictly above `threshold` trigger retraining.
    pub fn level(&self, threshold: u64) -> DriftLevel {
        match self {
            Self::Absent => DriftLevel::Absent,
            Self::Present { sample_count } if *sample_count > threshold => {
                DriftLevel::AboveThreshold
            }
            Self::Present { .. } => DriftLevel::BelowThreshold,
            Self::Unknown { .. } => DriftLevel::Unknown,
        }
    }

    pub fn sample_count(&self) -> Option<u64> {
        match self {
            Self::Present { sample_count } => Some(*sample_count),
            _ => None,
        }
    }
}

/// Number of newline-separated segments, counting the trailing empty segment.
///
/// `"a\nb\n"` counts 3 and an empty artifact counts 1. The input is streamed
/// through a fixed buffer.
pub async fn count_samples<R>(reader: R) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, reader);
    let mut newlines = 0u64;
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            break;
        }
        let len = chunk.len();
        newlines += chunk.iter().filter(|&&b| b == b'\n').count() as u64;
        reader.consume(len);
    }
    Ok(newlines + 1)
}

async fn count_artifact(path: &Path) -> io::Result<u64> {
    let file = tokio::fs::File::open(path).await?;
    if !file.metadata().await?.is_file() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            "not a regular file",
        ));
    }
    count_samples(file).await
}

/// Read the drift artifact at `path`.
pub async fn read_drift_signal(path: &Path) -> DriftSignal {
    match count_artifact(path).await {
        Ok(sample_count) => DriftSignal::Present { sample_count },
        Err(e) if e.kind() == ErrorKind::NotFound => DriftSignal::Absent,
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to read drift artifact: {e}");
            DriftSignal::Unknown {
                reason: format!("failed to read {}: {e}", path.display()),
            }
        }
    }
}
