#![allow(dead_code)] // shared between test binaries with different coverage
//! Synthetic compound-file image builder for integration tests.
//!
//! Allocates sectors sequentially: content chains first, then the mini-FAT,
//! the mini-stream, the directory, and finally the FAT itself. Tests corrupt
//! the returned bytes in place to model hostile files.

use cfb_core::{CompoundFile, MemorySource, OpenOptions, Result};

pub const FREE_SECTOR: u32 = 0xFFFF_FFFF;
pub const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
pub const FAT_SECTOR: u32 = 0xFFFF_FFFD;
pub const NO_STREAM: u32 = 0xFFFF_FFFF;

pub const KIND_STORAGE: u8 = 1;
pub const KIND_STREAM: u8 = 2;
pub const KIND_ROOT: u8 = 5;

pub const RED: u8 = 0;
pub const BLACK: u8 = 1;

/// Build one 128-byte directory record.
#[allow(clippy::too_many_arguments)]
pub fn record(
    name: &str,
    kind: u8,
    color: u8,
    left: u32,
    right: u32,
    child: u32,
    start: u32,
    size: u64,
) -> Vec<u8> {
    let mut buf = vec![0_u8; 128];
    let units: Vec<u16> = name.encode_utf16().collect();
    assert!(units.len() <= 31, "name too long for a directory entry");
    for (i, unit) in units.iter().enumerate() {
        buf[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    let name_len = if name.is_empty() {
        0_u16
    } else {
        ((units.len() + 1) * 2) as u16
    };
    buf[0x40..0x42].copy_from_slice(&name_len.to_le_bytes());
    buf[0x42] = kind;
    buf[0x43] = color;
    buf[0x44..0x48].copy_from_slice(&left.to_le_bytes());
    buf[0x48..0x4C].copy_from_slice(&right.to_le_bytes());
    buf[0x4C..0x50].copy_from_slice(&child.to_le_bytes());
    buf[0x74..0x78].copy_from_slice(&start.to_le_bytes());
    buf[0x78..0x80].copy_from_slice(&size.to_le_bytes());
    buf
}

fn empty_record() -> Vec<u8> {
    let mut buf = vec![0_u8; 128];
    buf[0x44..0x48].copy_from_slice(&NO_STREAM.to_le_bytes());
    buf[0x48..0x4C].copy_from_slice(&NO_STREAM.to_le_bytes());
    buf[0x4C..0x50].copy_from_slice(&NO_STREAM.to_le_bytes());
    buf
}

pub struct ImageBuilder {
    version: u16,
    sector_shift: u16,
    sector_size: usize,
    cutoff: u32,
    sectors: Vec<Vec<u8>>,
    fat: Vec<u32>,
    mini_fat: Vec<u32>,
    mini_stream: Vec<u8>,
    entries: Vec<Vec<u8>>,
    root_child: u32,
}

impl ImageBuilder {
    pub fn v3() -> Self {
        Self::with_shift(3, 9)
    }

    pub fn v4() -> Self {
        Self::with_shift(4, 12)
    }

    pub fn with_shift(version: u16, sector_shift: u16) -> Self {
        let mut builder = Self {
            version,
            sector_shift,
            sector_size: 1 << sector_shift,
            cutoff: 4096,
            sectors: Vec::new(),
            fat: Vec::new(),
            mini_fat: Vec::new(),
            mini_stream: Vec::new(),
            entries: Vec::new(),
            root_child: NO_STREAM,
        };
        // Root entry placeholder, patched in finish()
        builder.entries.push(empty_record());
        builder
    }

    pub fn cutoff(mut self, cutoff: u32) -> Self {
        self.cutoff = cutoff;
        self
    }

    /// Append a sector chain holding `data`, returning its start sector.
    fn alloc(&mut self, data: &[u8]) -> u32 {
        if data.is_empty() {
            return END_OF_CHAIN;
        }
        let start = self.sectors.len() as u32;
        let count = data.len().div_ceil(self.sector_size);
        for i in 0..count {
            let begin = i * self.sector_size;
            let end = (begin + self.sector_size).min(data.len());
            let mut sector = vec![0_u8; self.sector_size];
            sector[..end - begin].copy_from_slice(&data[begin..end]);
            self.sectors.push(sector);
            self.fat.push(if i + 1 == count {
                END_OF_CHAIN
            } else {
                start + i as u32 + 1
            });
        }
        start
    }

    /// Store `data` as a FAT-allocated chain; returns its start sector.
    pub fn add_stream(&mut self, data: &[u8]) -> u32 {
        self.alloc(data)
    }

    /// Store `data` in the mini-stream; returns its start mini-sector.
    pub fn add_mini_stream(&mut self, data: &[u8]) -> u32 {
        if data.is_empty() {
            return END_OF_CHAIN;
        }
        let start = self.mini_fat.len() as u32;
        let count = data.len().div_ceil(64);
        for i in 0..count {
            let begin = i * 64;
            let end = (begin + 64).min(data.len());
            let mut chunk = vec![0_u8; 64];
            chunk[..end - begin].copy_from_slice(&data[begin..end]);
            self.mini_stream.extend_from_slice(&chunk);
            self.mini_fat.push(if i + 1 == count {
                END_OF_CHAIN
            } else {
                start + i as u32 + 1
            });
        }
        start
    }

    /// Append a directory record; returns its entry id.
    pub fn add_record(&mut self, bytes: Vec<u8>) -> u32 {
        let id = self.entries.len() as u32;
        self.entries.push(bytes);
        id
    }

    pub fn set_root_child(&mut self, id: u32) {
        self.root_child = id;
    }

    fn serialize_table(table: &[u32], len: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(len * 4);
        for i in 0..len {
            let value = table.get(i).copied().unwrap_or(FREE_SECTOR);
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    pub fn finish(mut self) -> Image {
        // Mini-FAT sectors
        let mini_fat_sectors = if self.mini_fat.is_empty() {
            0
        } else {
            (self.mini_fat.len() * 4).div_ceil(self.sector_size)
        };
        let mini_fat_start = if mini_fat_sectors == 0 {
            END_OF_CHAIN
        } else {
            let bytes = Self::serialize_table(
                &self.mini_fat,
                mini_fat_sectors * self.sector_size / 4,
            );
            self.alloc(&bytes)
        };

        // Mini-stream (the root entry's payload)
        let mini_stream = std::mem::take(&mut self.mini_stream);
        let mini_stream_start = self.alloc(&mini_stream);

        // Directory
        self.entries[0] = record(
            "Root Entry",
            KIND_ROOT,
            BLACK,
            NO_STREAM,
            NO_STREAM,
            self.root_child,
            mini_stream_start,
            mini_stream.len() as u64,
        );
        let per_sector = self.sector_size / 128;
        while self.entries.len() % per_sector != 0 {
            self.entries.push(empty_record());
        }
        let dir_data: Vec<u8> = self.entries.concat();
        let dir_sectors = dir_data.len() / self.sector_size;
        let dir_start = self.alloc(&dir_data);

        // FAT sectors cover every sector including themselves
        let entries_per_sector = self.sector_size / 4;
        let mut fat_sector_count = 1;
        while fat_sector_count * entries_per_sector < self.sectors.len() + fat_sector_count {
            fat_sector_count += 1;
        }
        let fat_start = self.sectors.len() as u32;
        for _ in 0..fat_sector_count {
            self.fat.push(FAT_SECTOR);
        }
        let fat_bytes =
            Self::serialize_table(&self.fat, fat_sector_count * entries_per_sector);
        for chunk in fat_bytes.chunks(self.sector_size) {
            self.sectors.push(chunk.to_vec());
        }
        let fat_sectors: Vec<u32> =
            (fat_start..fat_start + fat_sector_count as u32).collect();
        assert!(fat_sectors.len() <= 109, "DIFAT extension not modeled here");

        // Header
        let mut bytes = vec![0_u8; 512];
        bytes[0x00..0x08].copy_from_slice(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]);
        bytes[0x18..0x1A].copy_from_slice(&0x3E_u16.to_le_bytes());
        bytes[0x1A..0x1C].copy_from_slice(&self.version.to_le_bytes());
        bytes[0x1C..0x1E].copy_from_slice(&0xFFFE_u16.to_le_bytes());
        bytes[0x1E..0x20].copy_from_slice(&self.sector_shift.to_le_bytes());
        bytes[0x20..0x22].copy_from_slice(&6_u16.to_le_bytes());
        let header_dir_count = if self.version == 3 { 0 } else { dir_sectors as u32 };
        bytes[0x28..0x2C].copy_from_slice(&header_dir_count.to_le_bytes());
        bytes[0x2C..0x30].copy_from_slice(&(fat_sector_count as u32).to_le_bytes());
        bytes[0x30..0x34].copy_from_slice(&dir_start.to_le_bytes());
        bytes[0x38..0x3C].copy_from_slice(&self.cutoff.to_le_bytes());
        bytes[0x3C..0x40].copy_from_slice(&mini_fat_start.to_le_bytes());
        bytes[0x40..0x44].copy_from_slice(&(mini_fat_sectors as u32).to_le_bytes());
        bytes[0x44..0x48].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
        bytes[0x48..0x4C].copy_from_slice(&0_u32.to_le_bytes());
        for i in 0..109 {
            let value = fat_sectors.get(i).copied().unwrap_or(FREE_SECTOR);
            let at = 0x4C + i * 4;
            bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }

        for sector in &self.sectors {
            bytes.extend_from_slice(sector);
        }

        Image {
            bytes,
            sector_size: self.sector_size,
            fat_sectors,
            dir_start,
        }
    }
}

/// A finished image plus enough geometry to corrupt it surgically.
pub struct Image {
    pub bytes: Vec<u8>,
    pub sector_size: usize,
    pub fat_sectors: Vec<u32>,
    pub dir_start: u32,
}

impl Image {
    pub fn sector_offset(&self, sector: u32) -> usize {
        512 + sector as usize * self.sector_size
    }

    /// Byte offset of the FAT entry for `sector`.
    pub fn fat_entry_offset(&self, sector: u32) -> usize {
        let entries_per_sector = self.sector_size / 4;
        let host = self.fat_sectors[sector as usize / entries_per_sector];
        self.sector_offset(host) + (sector as usize % entries_per_sector) * 4
    }

    pub fn set_fat_entry(&mut self, sector: u32, value: u32) {
        let at = self.fat_entry_offset(sector);
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Byte offset of directory record `id` (the directory chain is laid out
    /// contiguously by the builder).
    pub fn dir_entry_offset(&self, id: u32) -> usize {
        self.sector_offset(self.dir_start) + id as usize * 128
    }

    pub fn open(&self) -> Result<CompoundFile> {
        self.open_with(OpenOptions::default())
    }

    pub fn open_with(&self, options: OpenOptions) -> Result<CompoundFile> {
        CompoundFile::open(Box::new(MemorySource::new(self.bytes.clone())), options)
    }
}
