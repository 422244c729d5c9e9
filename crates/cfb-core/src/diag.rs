//! Diagnostics: the warning taxonomy, fatal errors, and the emission sink.
//!
//! Two axes: severity (warning vs. error) and category. Warnings flow through
//! one sink that records them, forwards them to `tracing`, and promotes any
//! kind listed in [`OpenOptions`] to a fatal [`Error::Promoted`].

use cfb_types::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::io;
use thiserror::Error;
use tracing::warn;

/// Category of a recoverable anomaly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum WarningKind {
    /// Header fields that are anomalous but usable (CLSID, reserved bytes,
    /// transaction signature, directory sector count).
    Header,
    /// Sector size differs from what the version prescribes.
    SectorSize,
    /// Mini sector size differs from the prescribed 64 bytes.
    MiniSectorSize,
    /// Mini-stream cutoff differs from the prescribed 4096 bytes.
    Cutoff,
    /// DIFAT truncation, overrun, or unexpected terminator.
    Difat,
    /// FAT bookkeeping anomalies (marking, count mismatches).
    Fat,
    /// Mini-FAT bookkeeping anomalies.
    MiniFat,
    /// Directory-entry anomalies: sort violations, red-black violations,
    /// oversize names, non-empty "empty" slots, orphan entries.
    Directory,
    /// A stream chain's capacity disagrees with its declared size.
    StreamSizeMismatch,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Header => "header",
            Self::SectorSize => "sector-size",
            Self::MiniSectorSize => "mini-sector-size",
            Self::Cutoff => "cutoff",
            Self::Difat => "difat",
            Self::Fat => "fat",
            Self::MiniFat => "mini-fat",
            Self::Directory => "directory",
            Self::StreamSizeMismatch => "stream-size-mismatch",
        };
        f.write_str(name)
    }
}

/// A recoverable anomaly observed while reading the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    /// Byte offset in the container, when one is meaningful.
    pub offset: Option<u64>,
    pub detail: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{} at offset {}: {}", self.kind, offset, self.detail),
            None => write!(f, "{}: {}", self.kind, self.detail),
        }
    }
}

/// Fatal failure while opening a container or reading a stream.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not a compound file: {0}")]
    NotCfb(String),

    #[error("unsupported version {0}")]
    InvalidVersion(u16),

    #[error("unsupported byte order mark {0:#06x}")]
    InvalidByteOrder(u16),

    #[error("corrupt header: {0}")]
    HeaderCorrupt(#[from] ParseError),

    #[error("malformed FAT: {0}")]
    MalformedFat(String),

    #[error("FAT too large ({0} bytes)")]
    FatTooLarge(u64),

    #[error("mini-FAT too large ({0} bytes)")]
    MiniFatTooLarge(u64),

    #[error("malformed chain: {detail} (sector {sector} at step {step})")]
    MalformedChain {
        sector: u32,
        step: usize,
        detail: String,
    },

    #[error("cycle detected in sector chain at sector {0}")]
    CycleDetected(u32),

    #[error("cycle detected in directory tree at entry {0}")]
    DirectoryCycle(u32),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a stream: {0}")]
    NotAStream(String),

    #[error("stream is closed")]
    StreamClosed,

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("promoted warning: {0}")]
    Promoted(Warning),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(inner) => inner,
            Error::StreamClosed => io::Error::new(io::ErrorKind::NotConnected, err.to_string()),
            Error::OutOfRange(_) => io::Error::new(io::ErrorKind::InvalidInput, err.to_string()),
            Error::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, err.to_string()),
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}

/// Per-open configuration: which warning kinds abort instead of warn.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    promoted: BTreeSet<WarningKind>,
}

impl OpenOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `kind` as fatal.
    #[must_use]
    pub fn promote(mut self, kind: WarningKind) -> Self {
        self.promoted.insert(kind);
        self
    }

    #[must_use]
    pub fn is_promoted(&self, kind: WarningKind) -> bool {
        self.promoted.contains(&kind)
    }

    pub(crate) fn into_promoted(self) -> BTreeSet<WarningKind> {
        self.promoted
    }
}

/// Emission seam shared by open-time and stream-open paths.
pub(crate) trait WarnSink {
    fn warn(&mut self, kind: WarningKind, offset: Option<u64>, detail: String) -> Result<()>;
}

/// Open-time sink: records warnings on the container under construction.
#[derive(Debug)]
pub(crate) struct DiagSink {
    promoted: BTreeSet<WarningKind>,
    pub(crate) warnings: Vec<Warning>,
}

impl DiagSink {
    pub(crate) fn new(promoted: BTreeSet<WarningKind>) -> Self {
        Self {
            promoted,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<Warning>, BTreeSet<WarningKind>) {
        (self.warnings, self.promoted)
    }
}

impl WarnSink for DiagSink {
    fn warn(&mut self, kind: WarningKind, offset: Option<u64>, detail: String) -> Result<()> {
        let warning = Warning {
            kind,
            offset,
            detail,
        };
        warn!(
            event = "container_warning",
            kind = %warning.kind,
            offset = warning.offset,
            "{}",
            warning.detail
        );
        if self.promoted.contains(&kind) {
            return Err(Error::Promoted(warning));
        }
        self.warnings.push(warning);
        Ok(())
    }
}

/// Post-open sink: the container is immutable, so stream-open anomalies are
/// traced and promotion-checked without being recorded.
#[derive(Debug)]
pub(crate) struct RuntimeSink<'a> {
    promoted: &'a BTreeSet<WarningKind>,
}

impl<'a> RuntimeSink<'a> {
    pub(crate) fn new(promoted: &'a BTreeSet<WarningKind>) -> Self {
        Self { promoted }
    }
}

impl WarnSink for RuntimeSink<'_> {
    fn warn(&mut self, kind: WarningKind, offset: Option<u64>, detail: String) -> Result<()> {
        let warning = Warning {
            kind,
            offset,
            detail,
        };
        warn!(
            event = "stream_warning",
            kind = %warning.kind,
            offset = warning.offset,
            "{}",
            warning.detail
        );
        if self.promoted.contains(&kind) {
            return Err(Error::Promoted(warning));
        }
        Ok(())
    }
}
