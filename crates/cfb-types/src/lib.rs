#![forbid(unsafe_code)]
//! Shared on-disk vocabulary for the compound file binary format.
//!
//! Sector-id sentinels, bounds-checked little-endian read helpers,
//! `ParseError`, the CFB name comparator, and FILETIME conversion.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Magic bytes at offset 0 of every compound file.
pub const CFB_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Size of the fixed file header.
pub const HEADER_SIZE: usize = 512;

/// Size of one directory entry record.
pub const DIR_ENTRY_SIZE: usize = 128;

/// Number of DIFAT entries embedded in the header.
pub const HEADER_DIFAT_ENTRIES: usize = 109;

/// Byte-order mark required at header offset 0x1C (little-endian).
pub const BYTE_ORDER_LE: u16 = 0xFFFE;

// ── Sector-id sentinels ─────────────────────────────────────────────────────

/// Unallocated sector.
pub const FREE_SECTOR: u32 = 0xFFFF_FFFF;
/// Terminates a sector chain.
pub const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
/// Sector occupied by the FAT itself.
pub const FAT_SECTOR: u32 = 0xFFFF_FFFD;
/// Sector occupied by the DIFAT.
pub const DIFAT_SECTOR: u32 = 0xFFFF_FFFC;
/// Largest valid regular sector number.
pub const MAX_REGULAR_SECTOR: u32 = 0xFFFF_FFFA;

/// Unallocated directory-entry link.
pub const NO_STREAM: u32 = 0xFFFF_FFFF;
/// Largest valid directory-entry id.
pub const MAX_REGULAR_DIR_ID: u32 = 0xFFFF_FFFA;

/// A sector number in the container, including the reserved sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SectorId(pub u32);

impl SectorId {
    pub const FREE: Self = Self(FREE_SECTOR);
    pub const END_OF_CHAIN: Self = Self(END_OF_CHAIN);

    /// Whether this id addresses an actual sector (not a sentinel).
    #[must_use]
    pub fn is_regular(self) -> bool {
        self.0 <= MAX_REGULAR_SECTOR
    }

    #[must_use]
    pub fn is_end_of_chain(self) -> bool {
        self.0 == END_OF_CHAIN
    }

    #[must_use]
    pub fn is_free(self) -> bool {
        self.0 == FREE_SECTOR
    }

    /// Narrow to `usize` for table indexing.
    ///
    /// Only meaningful for regular ids; sentinels index nothing.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            FREE_SECTOR => write!(f, "FREE"),
            END_OF_CHAIN => write!(f, "END_OF_CHAIN"),
            FAT_SECTOR => write!(f, "FAT"),
            DIFAT_SECTOR => write!(f, "DIFAT"),
            id => write!(f, "{id}"),
        }
    }
}

// ── Parse errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
}

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_le_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = ensure_slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn read_le_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_le_u64(data: &[u8], offset: usize) -> Result<u64, ParseError> {
    let bytes = ensure_slice(data, offset, 8)?;
    Ok(u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]))
}

#[inline]
pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let bytes = ensure_slice(data, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

/// Narrow a `u64` to `usize` with an explicit error path.
pub fn u64_to_usize(value: u64, field: &'static str) -> Result<usize, ParseError> {
    usize::try_from(value).map_err(|_| ParseError::IntegerConversion { field })
}

// ── Name comparison ─────────────────────────────────────────────────────────

/// Uppercase-fold a single UTF-16 code unit.
///
/// Simple one-to-one mapping only: multi-char expansions and mappings outside
/// the BMP leave the unit unchanged, and surrogate halves compare raw. No
/// locale input.
#[must_use]
pub fn fold_code_unit(unit: u16) -> u16 {
    if unit < 0x80 {
        return if (u16::from(b'a')..=u16::from(b'z')).contains(&unit) {
            unit - 0x20
        } else {
            unit
        };
    }
    let Some(ch) = char::from_u32(u32::from(unit)) else {
        return unit;
    };
    let mut upper = ch.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(mapped), None) => u16::try_from(u32::from(mapped)).unwrap_or(unit),
        _ => unit,
    }
}

/// Directory-entry name ordering: UTF-16 code-unit length first, then
/// code-unit-wise uppercase fold.
///
/// This is the ordering the directory red-black tree is sorted by, and the
/// equivalence used for name lookup.
#[must_use]
pub fn cmp_names(a: &str, b: &str) -> Ordering {
    let len_a = a.encode_utf16().count();
    let len_b = b.encode_utf16().count();
    match len_a.cmp(&len_b) {
        Ordering::Equal => {}
        unequal => return unequal,
    }
    for (ua, ub) in a.encode_utf16().zip(b.encode_utf16()) {
        match fold_code_unit(ua).cmp(&fold_code_unit(ub)) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
    }
    Ordering::Equal
}

/// Case-insensitive name equality per [`cmp_names`].
#[must_use]
pub fn names_equal(a: &str, b: &str) -> bool {
    cmp_names(a, b) == Ordering::Equal
}

// ── FILETIME ────────────────────────────────────────────────────────────────

/// Seconds between 1601-01-01 and 1970-01-01.
pub const FILETIME_UNIX_DIFF_SECS: u64 = 11_644_473_600;

/// Convert a raw FILETIME (100 ns units since 1601-01-01 UTC) to
/// `SystemTime`. Zero means "not set" and converts to `None`.
#[must_use]
pub fn filetime_to_system_time(filetime: u64) -> Option<SystemTime> {
    if filetime == 0 {
        return None;
    }
    let secs = filetime / 10_000_000;
    #[allow(clippy::cast_possible_truncation)] // remainder * 100 < 1e9
    let nanos = (filetime % 10_000_000) as u32 * 100;
    let since_1601 = Duration::new(secs, nanos);
    let epoch_gap = Duration::from_secs(FILETIME_UNIX_DIFF_SECS);
    if since_1601 >= epoch_gap {
        UNIX_EPOCH.checked_add(since_1601 - epoch_gap)
    } else {
        UNIX_EPOCH.checked_sub(epoch_gap - since_1601)
    }
}
