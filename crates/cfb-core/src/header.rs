//! Header parse and validation.
//!
//! The first 512 bytes carry the magic, version, byte order, sector
//! geometry, allocation-table bookkeeping, and the first 109 DIFAT entries.

use crate::diag::{Error, Result, WarnSink, WarningKind};
use cfb_types::{
    BYTE_ORDER_LE, CFB_MAGIC, END_OF_CHAIN, HEADER_DIFAT_ENTRIES, HEADER_SIZE, SectorId,
    read_fixed, read_le_u16, read_le_u32,
};
use serde::{Deserialize, Serialize};

/// Prescribed mini-stream cutoff.
pub const STANDARD_CUTOFF: u32 = 4096;

const MAX_SANE_SECTOR_SIZE: u64 = 1 << 20;
const MIN_SANE_SECTOR_SIZE: u64 = 128;

/// Parsed and sanitized file header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub minor_version: u16,
    pub major_version: u16,
    pub sector_size: u64,
    pub mini_sector_size: u64,
    pub clsid: [u8; 16],
    pub directory_sector_count: u32,
    pub fat_sector_count: u32,
    pub first_directory_sector: SectorId,
    pub transaction_signature: u32,
    pub mini_stream_cutoff: u32,
    pub first_mini_fat_sector: SectorId,
    pub mini_fat_sector_count: u32,
    pub first_difat_sector: SectorId,
    pub difat_sector_count: u32,
    /// The 109 DIFAT entries embedded in the header.
    pub difat_head: Vec<u32>,
}

impl Header {
    /// Parse the 512-byte header region.
    pub(crate) fn parse(region: &[u8], sink: &mut dyn WarnSink) -> Result<Self> {
        if region.len() < HEADER_SIZE {
            return Err(Error::NotCfb(format!(
                "truncated header: {} bytes",
                region.len()
            )));
        }
        let magic = read_fixed::<8>(region, 0x00)?;
        if magic != CFB_MAGIC {
            return Err(Error::NotCfb(format!("bad magic {magic:02X?}")));
        }

        let clsid = read_fixed::<16>(region, 0x08)?;
        if clsid != [0_u8; 16] {
            sink.warn(
                WarningKind::Header,
                Some(0x08),
                format!("container CLSID is non-zero ({clsid:02X?})"),
            )?;
        }

        let minor_version = read_le_u16(region, 0x18)?;
        let major_version = read_le_u16(region, 0x1A)?;
        if !matches!(major_version, 3 | 4) {
            return Err(Error::InvalidVersion(major_version));
        }

        let byte_order = read_le_u16(region, 0x1C)?;
        if byte_order != BYTE_ORDER_LE {
            return Err(Error::InvalidByteOrder(byte_order));
        }

        let sector_shift = read_le_u16(region, 0x1E)?;
        let mut sector_size = 1_u64.checked_shl(u32::from(sector_shift)).unwrap_or(0);
        if !(MIN_SANE_SECTOR_SIZE..=MAX_SANE_SECTOR_SIZE).contains(&sector_size) {
            sink.warn(
                WarningKind::SectorSize,
                Some(0x1E),
                format!("sector size is unusable ({sector_size} bytes), assuming 512"),
            )?;
            sector_size = 512;
        } else {
            let expected = match major_version {
                3 => 9,
                _ => 12,
            };
            if sector_shift != expected {
                sink.warn(
                    WarningKind::SectorSize,
                    Some(0x1E),
                    format!(
                        "unexpected sector size in v{major_version} file ({sector_size} bytes)"
                    ),
                )?;
            }
        }

        let mini_sector_shift = read_le_u16(region, 0x20)?;
        let mut mini_sector_size = 1_u64.checked_shl(u32::from(mini_sector_shift)).unwrap_or(0);
        if mini_sector_size < 8 || mini_sector_size >= sector_size {
            sink.warn(
                WarningKind::MiniSectorSize,
                Some(0x20),
                format!("mini sector size is unusable ({mini_sector_size} bytes), assuming 64"),
            )?;
            mini_sector_size = 64;
        } else if mini_sector_shift != 6 {
            sink.warn(
                WarningKind::MiniSectorSize,
                Some(0x20),
                format!("unexpected mini sector size ({mini_sector_size} bytes)"),
            )?;
        }

        let reserved = read_fixed::<6>(region, 0x22)?;
        if reserved != [0_u8; 6] {
            sink.warn(
                WarningKind::Header,
                Some(0x22),
                "reserved header bytes are non-zero".to_owned(),
            )?;
        }

        let directory_sector_count = read_le_u32(region, 0x28)?;
        if major_version == 3 && directory_sector_count != 0 {
            sink.warn(
                WarningKind::Header,
                Some(0x28),
                format!("directory sector count is non-zero in v3 file ({directory_sector_count})"),
            )?;
        }

        let fat_sector_count = read_le_u32(region, 0x2C)?;
        let first_directory_sector = SectorId(read_le_u32(region, 0x30)?);

        let transaction_signature = read_le_u32(region, 0x34)?;
        if transaction_signature != 0 {
            sink.warn(
                WarningKind::Header,
                Some(0x34),
                format!("transaction signature is non-zero ({transaction_signature})"),
            )?;
        }

        let mini_stream_cutoff = read_le_u32(region, 0x38)?;
        if mini_stream_cutoff != STANDARD_CUTOFF {
            sink.warn(
                WarningKind::Cutoff,
                Some(0x38),
                format!("unexpected mini stream cutoff ({mini_stream_cutoff})"),
            )?;
        }

        let first_mini_fat_sector = SectorId(read_le_u32(region, 0x3C)?);
        let mini_fat_sector_count = read_le_u32(region, 0x40)?;
        let first_difat_sector = SectorId(read_le_u32(region, 0x44)?);
        let difat_sector_count = read_le_u32(region, 0x48)?;

        let mut difat_head = Vec::with_capacity(HEADER_DIFAT_ENTRIES);
        for i in 0..HEADER_DIFAT_ENTRIES {
            difat_head.push(read_le_u32(region, 0x4C + i * 4)?);
        }

        Ok(Self {
            minor_version,
            major_version,
            sector_size,
            mini_sector_size,
            clsid,
            directory_sector_count,
            fat_sector_count,
            first_directory_sector,
            transaction_signature,
            mini_stream_cutoff,
            first_mini_fat_sector,
            mini_fat_sector_count,
            first_difat_sector,
            difat_sector_count,
            difat_head,
        })
    }

    /// Number of whole sectors the container holds after the header.
    #[must_use]
    pub fn sector_count(&self, file_len: u64) -> u64 {
        file_len.saturating_sub(HEADER_SIZE as u64) / self.sector_size
    }

    /// Byte offset of a regular sector.
    #[must_use]
    pub fn sector_offset(&self, sector: u32) -> u64 {
        HEADER_SIZE as u64 + u64::from(sector) * self.sector_size
    }

    /// Allocation-table entries held by one sector.
    #[must_use]
    pub fn entries_per_sector(&self) -> usize {
        (self.sector_size / 4) as usize
    }

    /// Whether this is a 512-byte-sector (v3) file for size-masking purposes.
    #[must_use]
    pub fn is_v3(&self) -> bool {
        self.major_version == 3
    }
}
