#![deny(unsafe_code)]
//! Byte-source seam for the compound file reader.
//!
//! The reader core only ever sees [`ByteSource`]: a length and a positional
//! `read_at` that never disturbs a shared cursor. Three adapters are
//! provided: [`MmapSource`] (one shared read-only mapping), [`WindowedSource`]
//! (rolling power-of-two window for hosts where a full mapping is
//! infeasible), and [`MemorySource`] (owned bytes).

use parking_lot::Mutex;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

/// Random-access byte source with pread semantics.
///
/// `read_at` fills as much of `buf` as the source allows and returns short
/// only at end of source. Implementations must not rely on any shared seek
/// position, so interleaved reads from independent stream views cannot
/// interfere.
pub trait ByteSource: Send + Sync {
    /// Total length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read up to `buf.len()` bytes at `offset`; returns the number read,
    /// short only at end of source.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Read exactly `buf.len()` bytes at `offset`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "short read at offset {}: wanted {} bytes, got {}",
                        offset,
                        buf.len(),
                        filled
                    ),
                ));
            }
            filled += n;
        }
        Ok(())
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn len_bytes(&self) -> u64 {
        (**self).len_bytes()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_at(offset, buf)
    }
}

// ── In-memory adapter ───────────────────────────────────────────────────────

/// Byte source over an owned buffer.
#[derive(Debug, Clone)]
pub struct MemorySource {
    bytes: Arc<[u8]>,
}

impl MemorySource {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl ByteSource for MemorySource {
    fn len_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.bytes.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.bytes.len() - start);
        buf[..n].copy_from_slice(&self.bytes[start..start + n]);
        Ok(n)
    }
}

// ── Memory-mapped adapter ───────────────────────────────────────────────────

/// Byte source backed by one shared read-only mapping of a file.
#[derive(Debug)]
pub struct MmapSource {
    map: memmap2::Mmap,
}

impl MmapSource {
    /// Map `path` read-only.
    ///
    /// The mapping stays valid as long as this source is alive; the reader
    /// never mutates the file, and callers are expected not to either.
    #[allow(unsafe_code)] // mapping a file is inherently a raw-OS contract
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path.as_ref())?;
        let map = unsafe { memmap2::MmapOptions::new().map(&file) }?;
        Ok(Self { map })
    }
}

impl ByteSource for MmapSource {
    fn len_bytes(&self) -> u64 {
        self.map.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.map.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.map.len() - start);
        buf[..n].copy_from_slice(&self.map[start..start + n]);
        Ok(n)
    }
}

// ── Windowed adapter ────────────────────────────────────────────────────────

/// Default window size exponent (1 MiB windows).
pub const DEFAULT_WINDOW_BITS: u32 = 20;

const MIN_WINDOW_BITS: u32 = 12;
const MAX_WINDOW_BITS: u32 = 30;

#[derive(Debug)]
struct Window {
    /// Absolute offset of the first buffered byte; aligned to the window size.
    start: u64,
    buf: Vec<u8>,
    /// Bytes of `buf` that hold file content (short at end of file).
    valid: usize,
}

/// Byte source that emulates a full mapping with a rolling window.
///
/// Serves reads from a 2^k-byte buffer refilled with positional file reads.
/// Requests larger than the window bypass it entirely. The window is behind a
/// mutex so positional reads from interleaved stream views stay safe.
#[derive(Debug)]
pub struct WindowedSource {
    file: File,
    len: u64,
    window_size: u64,
    window: Mutex<Window>,
}

impl WindowedSource {
    /// Open `path` with the default 1 MiB window.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::with_window_bits(path, DEFAULT_WINDOW_BITS)
    }

    /// Open `path` with a 2^`bits`-byte window; `bits` is clamped to
    /// [12, 30].
    pub fn with_window_bits(path: impl AsRef<Path>, bits: u32) -> io::Result<Self> {
        let bits = bits.clamp(MIN_WINDOW_BITS, MAX_WINDOW_BITS);
        let file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            len,
            window_size: 1_u64 << bits,
            window: Mutex::new(Window {
                start: 0,
                buf: Vec::new(),
                valid: 0,
            }),
        })
    }

    fn refill(&self, window: &mut Window, start: u64) -> io::Result<()> {
        trace!(event = "window_refill", start, size = self.window_size);
        let size = usize::try_from(self.window_size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "window size overflow"))?;
        window.buf.resize(size, 0);
        let mut valid = 0;
        while valid < size {
            let n = self.file.read_at(&mut window.buf[valid..], start + valid as u64)?;
            if n == 0 {
                break;
            }
            valid += n;
        }
        window.start = start;
        window.valid = valid;
        Ok(())
    }
}

impl ByteSource for WindowedSource {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        let wanted = buf.len().min(usize::try_from(self.len - offset).unwrap_or(usize::MAX));
        if wanted as u64 > self.window_size {
            // Oversized request: bypass the window.
            let mut filled = 0;
            while filled < wanted {
                let n = self
                    .file
                    .read_at(&mut buf[filled..wanted], offset + filled as u64)?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            return Ok(filled);
        }

        let mut window = self.window.lock();
        let mut filled = 0;
        while filled < wanted {
            let pos = offset + filled as u64;
            let aligned = pos & !(self.window_size - 1);
            if window.buf.is_empty() || window.start != aligned {
                self.refill(&mut window, aligned)?;
            }
            let within = (pos - window.start) as usize;
            if within >= window.valid {
                break;
            }
            let n = (window.valid - within).min(wanted - filled);
            buf[filled..filled + n].copy_from_slice(&window.buf[within..within + n]);
            filled += n;
        }
        Ok(filled)
    }
}
