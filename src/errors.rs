//src/errors.rs

use std::path::PathBuf;
use thiserror::Error;

use crate::types::TaxId;

pub type Result<T> = std::result::Result<T, TaxError>;

/// Failure reported by a lineage resolver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    /// The lookup may succeed if tried again (e.g. a flaky disk or connection).
    #[error("transient lookup failure for taxid {taxid}: {reason}")]
    Transient { taxid: TaxId, reason: String },

    /// The taxonomy backend cannot answer at all.
    #[error("taxonomy lookup unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum TaxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}:{line}: {msg}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        msg: String,
    },

    #[error("cannot tell what kind of hit table {} is (underscores in target column: {counts:?})", path.display())]
    UnknownHitFormat { path: PathBuf, counts: Vec<usize> },

    #[error("aggregation group '{0}' has no member rows")]
    EmptyGroup(String),

    #[error("taxonomy string '{0}' has {1} ranks, expected 7")]
    MalformedTaxonomyString(String, usize),

    #[error("no scaffolds in the scaffold-to-bin table map to a bin")]
    NoScaffoldsBinned,

    #[error("minimum percent must be within 0..=100, got {0}")]
    InvalidThreshold(u8),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl TaxError {
    pub(crate) fn parse(path: impl Into<PathBuf>, line: usize, msg: impl Into<String>) -> Self {
        TaxError::Parse {
            path: path.into(),
            line,
            msg: msg.into(),
        }
    }
}
