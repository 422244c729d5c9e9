//! Stream views: independently positioned, read-only, seekable cursors over
//! one stream's sector chain.
//!
//! A view materializes its chain once at construction and owns its position,
//! so interleaved reads through sibling views never interfere. Streams below
//! the header cutoff are addressed through the mini-FAT and resolved twice:
//! mini-sector to mini-stream offset, then mini-stream offset to container
//! sector.

use crate::CompoundFile;
use crate::diag::{Error, Result, RuntimeSink, WarnSink, WarningKind};
use crate::dir::EntryKind;
use crate::fat::follow_chain;
use cfb_source::ByteSource;
use std::io;
use std::io::SeekFrom;

/// Read-only seekable view over one stream (or the root mini-stream).
#[derive(Debug)]
pub struct StreamReader<'a> {
    file: &'a CompoundFile,
    /// Sector ids (FAT mode) or mini-sector ids (mini mode), in chain order.
    chain: Vec<u32>,
    mini: bool,
    size: u64,
    position: u64,
    closed: bool,
}

impl<'a> StreamReader<'a> {
    pub(crate) fn new(file: &'a CompoundFile, id: u32) -> Result<Self> {
        let entry = &file.entries[id as usize];
        if !matches!(entry.kind, EntryKind::Stream | EntryKind::Root) {
            return Err(Error::NotAStream(entry.name.clone()));
        }

        let is_root = entry.kind == EntryKind::Root;
        let mini = !is_root && entry.size < u64::from(file.header.mini_stream_cutoff);
        let mut size = entry.size;
        let mut chain = Vec::new();

        if size > 0 {
            let mut sink = RuntimeSink::new(&file.promoted);
            let (table, unit, limit, warn_kind) = if mini {
                (
                    file.mini_fat.as_slice(),
                    file.header.mini_sector_size,
                    file.mini_fat.len() as u64,
                    WarningKind::MiniFat,
                )
            } else {
                (
                    file.fat.as_slice(),
                    file.header.sector_size,
                    file.sector_count,
                    WarningKind::Fat,
                )
            };
            chain = follow_chain(entry.start_sector, table, limit, warn_kind, &mut sink)?;

            let capacity = chain.len() as u64 * unit;
            if capacity < size {
                sink.warn(
                    WarningKind::StreamSizeMismatch,
                    None,
                    format!(
                        "declared size {size} exceeds chain capacity {capacity} for '{}'",
                        entry.name
                    ),
                )?;
                size = capacity;
            }
            let needed = cfb_types::u64_to_usize(size.div_ceil(unit), "chain_length")?;
            chain.truncate(needed);
        }

        Ok(Self {
            file,
            chain,
            mini,
            size,
            position: 0,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::StreamClosed);
        }
        Ok(())
    }

    /// Stream length in bytes (clamped to chain capacity).
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current position.
    pub fn tell(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.position)
    }

    /// Read up to `buf.len()` bytes at the current position, advancing it by
    /// the number read. Returns short only at end of stream; errors leave
    /// the position untouched.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        if buf.is_empty() || self.position >= self.size {
            return Ok(0);
        }
        #[allow(clippy::cast_possible_truncation)] // min with buf.len() fits usize
        let total = (buf.len() as u64).min(self.size - self.position) as usize;

        let mut done = 0;
        let mut position = self.position;
        while done < total {
            let (physical, span) = self.segment(position)?;
            #[allow(clippy::cast_possible_truncation)] // min with usize remainder
            let take = span.min((total - done) as u64) as usize;
            self.file
                .source
                .read_exact_at(physical, &mut buf[done..done + take])?;
            done += take;
            position += take as u64;
        }
        self.position = position;
        Ok(done)
    }

    /// Read from the current position to end of stream.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let remaining = cfb_types::u64_to_usize(self.size - self.position, "stream_length")?;
        let mut buf = vec![0_u8; remaining];
        let n = self.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Reposition the cursor. Negative targets are rejected; targets past the
    /// end clamp to the stream size (reads then return empty).
    pub fn seek(&mut self, target: SeekFrom) -> Result<u64> {
        self.ensure_open()?;
        let wanted: i128 = match target {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.position) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.size) + i128::from(delta),
        };
        if wanted < 0 {
            return Err(Error::OutOfRange(format!(
                "seek before start of stream ({wanted})"
            )));
        }
        let position = u64::try_from(wanted).unwrap_or(u64::MAX).min(self.size);
        self.position = position;
        Ok(position)
    }

    /// Close the view. Idempotent; later operations fail with
    /// [`Error::StreamClosed`].
    pub fn close(&mut self) {
        self.closed = true;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Resolve a stream position to a physical offset and the number of
    /// contiguous bytes readable there.
    fn segment(&self, position: u64) -> Result<(u64, u64)> {
        let header = &self.file.header;
        if self.mini {
            let unit = header.mini_sector_size;
            let index = cfb_types::u64_to_usize(position / unit, "mini_chain_index")?;
            let within = position % unit;
            let Some(&mini_sector) = self.chain.get(index) else {
                return Err(Error::OutOfRange(format!(
                    "position {position} beyond materialized mini chain"
                )));
            };

            let mini_offset = u64::from(mini_sector) * unit + within;
            if mini_offset >= self.file.mini_stream_len {
                return Err(Error::OutOfRange(format!(
                    "mini-sector {mini_sector} beyond the mini-stream"
                )));
            }
            let sector_index =
                cfb_types::u64_to_usize(mini_offset / header.sector_size, "mini_stream_index")?;
            let within_sector = mini_offset % header.sector_size;
            let Some(&sector) = self.file.mini_stream_chain.get(sector_index) else {
                return Err(Error::OutOfRange(format!(
                    "mini-stream offset {mini_offset} beyond its chain"
                )));
            };
            // Stay inside both the mini-sector and the hosting sector.
            let span = (unit - within).min(header.sector_size - within_sector);
            Ok((header.sector_offset(sector) + within_sector, span))
        } else {
            let unit = header.sector_size;
            let index = cfb_types::u64_to_usize(position / unit, "chain_index")?;
            let within = position % unit;
            let Some(&sector) = self.chain.get(index) else {
                return Err(Error::OutOfRange(format!(
                    "position {position} beyond materialized chain"
                )));
            };
            Ok((header.sector_offset(sector) + within, unit - within))
        }
    }
}

impl io::Read for StreamReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        StreamReader::read(self, buf).map_err(Into::into)
    }
}

impl io::Seek for StreamReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        StreamReader::seek(self, pos).map_err(Into::into)
    }
}
