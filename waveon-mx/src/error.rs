//! Error types for waveon-mx
//!
//! Every error is raised at the operation that exposes it and is never
//! retried. The library only distinguishes kinds; the binary turns them into
//! messages and exit codes.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for waveon-mx
#[derive(Error, Debug)]
pub enum MixError {
    /// File missing, unreadable, unwritable or unmappable
    #[error("File I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Container header unusable (bad RIFF layout, unsupported encoding,
    /// header size not aligned to the sample size, format mismatch)
    #[error("Format error in {path:?}: {reason}")]
    Format { path: PathBuf, reason: String },

    /// File has more than one interleaved channel
    #[error("{path:?} has {channels} interleaved channels, expected mono")]
    NotMono { path: PathBuf, channels: u16 },

    /// Auxiliary index outside the configured channel list
    #[error("Auxiliary channel {index} not found ({count} configured)")]
    ChannelNotFound { index: usize, count: usize },

    /// Sample or byte range past the end of the mapped data
    #[error("Range {start}..{end} exceeds available length {available}")]
    OutOfRange {
        start: usize,
        end: usize,
        available: usize,
    },

    /// Channel sample count differs from the primary's
    #[error("{path:?} has {found} samples, primary has {expected}")]
    LengthMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    /// Operation needs a mapping mode that is not currently active
    #[error("No {expected} mapping is active")]
    NotMapped { expected: &'static str },

    /// Write attempted before an output file was set up
    #[error("No output file has been set up")]
    OutputNotSet,

    /// Invalid mixing settings
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MixError {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        MixError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn format(path: &Path, reason: impl Into<String>) -> Self {
        MixError::Format {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

impl From<waveon_common::Error> for MixError {
    fn from(err: waveon_common::Error) -> Self {
        MixError::Config(err.to_string())
    }
}

/// Convenience Result type using waveon-mx MixError
pub type Result<T> = std::result::Result<T, MixError>;
