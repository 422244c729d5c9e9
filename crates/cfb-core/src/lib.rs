#![forbid(unsafe_code)]
//! Read-only reader for the compound file binary format (OLE compound
//! document / structured storage).
//!
//! A compound file is a miniature FAT filesystem inside one file: sectors
//! chained through allocation tables, small streams packed into a dedicated
//! mini-stream, and directory entries forming a red-black tree rooted at the
//! "Root Entry". [`CompoundFile::open`] validates the header, walks the DIFAT
//! to materialize the FAT, loads the mini-FAT, parses the directory tree, and
//! exposes storages and streams through [`Entity`] views and
//! [`StreamReader`] cursors.
//!
//! Recoverable anomalies surface as [`Warning`]s (recorded on the container
//! and forwarded to `tracing`); any warning kind can be promoted to a fatal
//! error through [`OpenOptions`].

mod diag;
mod dir;
mod fat;
mod header;
mod stream;

pub use cfb_source::{ByteSource, MemorySource, MmapSource, WindowedSource};
pub use cfb_types::{ParseError, SectorId, cmp_names, filetime_to_system_time, names_equal};
pub use diag::{Error, OpenOptions, Result, Warning, WarningKind};
pub use dir::{Color, DirEntry, EntryKind};
pub use header::Header;
pub use stream::StreamReader;

use crate::diag::{DiagSink, WarnSink};
use cfb_types::HEADER_SIZE;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::SystemTime;
use tracing::debug;

/// An opened compound file: immutable after construction.
///
/// Owns the byte source, the materialized allocation tables, and the flat
/// directory-entry array; entities and stream views borrow from it.
pub struct CompoundFile {
    pub(crate) source: Box<dyn ByteSource>,
    pub(crate) header: Header,
    pub(crate) sector_count: u64,
    pub(crate) fat: Vec<u32>,
    pub(crate) mini_fat: Vec<u32>,
    pub(crate) mini_stream_chain: Vec<u32>,
    pub(crate) mini_stream_len: u64,
    pub(crate) entries: Vec<DirEntry>,
    /// Per-entry children in CFB order; empty for streams.
    pub(crate) children: Vec<Vec<u32>>,
    pub(crate) warnings: Vec<Warning>,
    pub(crate) promoted: BTreeSet<WarningKind>,
}

impl std::fmt::Debug for CompoundFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompoundFile")
            .field("header", &self.header)
            .field("sector_count", &self.sector_count)
            .field("entries", &self.entries.len())
            .field("warnings", &self.warnings.len())
            .finish_non_exhaustive()
    }
}

impl CompoundFile {
    /// Open a container over any byte source.
    ///
    /// On any fatal error the partially constructed state (including the
    /// source) is dropped before returning.
    pub fn open(source: Box<dyn ByteSource>, options: OpenOptions) -> Result<Self> {
        let mut sink = DiagSink::new(options.into_promoted());
        let len = source.len_bytes();
        if len < HEADER_SIZE as u64 {
            return Err(Error::NotCfb(format!("file too small ({len} bytes)")));
        }
        let mut region = vec![0_u8; HEADER_SIZE];
        source.read_exact_at(0, &mut region)?;
        let header = Header::parse(&region, &mut sink)?;
        let sector_count = header.sector_count(len);

        let load = fat::load_fat(source.as_ref(), &header, sector_count, &mut sink)?;
        debug!(
            event = "fat_loaded",
            fat_sectors = load.fat_sectors.len(),
            difat_sectors = load.difat_sectors.len(),
            entries = load.fat.len()
        );
        let mini_fat =
            fat::load_mini_fat(source.as_ref(), &header, sector_count, &load.fat, &mut sink)?;
        let entries = dir::load_directory(source.as_ref(), &header, sector_count, &load.fat, &mut sink)?;
        let children = dir::build_children(&entries, &mut sink)?;

        // The root entry's payload is the mini-stream that backs mini-sector
        // addressing.
        let root = &entries[0];
        let mut mini_stream_chain = Vec::new();
        let mut mini_stream_len = root.size;
        if root.size > 0 {
            if root.start_sector.is_regular() {
                mini_stream_chain = fat::follow_chain(
                    root.start_sector,
                    &load.fat,
                    sector_count,
                    WarningKind::MiniFat,
                    &mut sink,
                )?;
                let capacity = mini_stream_chain.len() as u64 * header.sector_size;
                if capacity < mini_stream_len {
                    sink.warn(
                        WarningKind::StreamSizeMismatch,
                        None,
                        format!(
                            "mini-stream chain capacity {capacity} is less than the root \
                             entry size {mini_stream_len}"
                        ),
                    )?;
                    mini_stream_len = capacity;
                }
            } else {
                sink.warn(
                    WarningKind::MiniFat,
                    None,
                    format!(
                        "root entry start sector is not regular ({})",
                        root.start_sector
                    ),
                )?;
                mini_stream_len = 0;
            }
        }

        let (warnings, promoted) = sink.into_parts();
        Ok(Self {
            source,
            header,
            sector_count,
            fat: load.fat,
            mini_fat,
            mini_stream_chain,
            mini_stream_len,
            entries,
            children,
            warnings,
            promoted,
        })
    }

    /// Open a file through a shared memory mapping.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_path_with(path, OpenOptions::default())
    }

    /// Open a file through a shared memory mapping with explicit options.
    pub fn open_path_with(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let source = MmapSource::open(path)?;
        Self::open(Box::new(source), options)
    }

    /// The parsed header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Warnings recorded while opening.
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// The root storage.
    #[must_use]
    pub fn root(&self) -> Entity<'_> {
        Entity { file: self, id: 0 }
    }

    /// Look up an entity by `/`-separated path from the root.
    ///
    /// Empty components are skipped, so `"/a/b"`, `"a/b"` and `"a//b"` are
    /// equivalent. Name matching is case-insensitive per the CFB rule.
    pub fn entity(&self, path: &str) -> Result<Entity<'_>> {
        let mut current = self.root();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current = current
                .child(component)
                .ok_or_else(|| Error::NotFound(path.to_owned()))?;
        }
        Ok(current)
    }

    /// Open a stream by `/`-separated path.
    pub fn open_stream(&self, path: &str) -> Result<StreamReader<'_>> {
        let entity = self.entity(path)?;
        if !entity.is_file() {
            return Err(Error::NotAStream(path.to_owned()));
        }
        entity.open()
    }
}

/// What an [`Entity`] is: directory-like or file-like.
///
/// The root entry surfaces as [`EntityKind::Storage`]; the raw on-disk entry
/// type stays on [`DirEntry::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Storage,
    Stream,
}

/// Borrowed view over one directory entry (a storage or a stream).
#[derive(Clone, Copy)]
pub struct Entity<'a> {
    file: &'a CompoundFile,
    id: u32,
}

impl<'a> Entity<'a> {
    fn entry(&self) -> &'a DirEntry {
        &self.file.entries[self.id as usize]
    }

    /// Directory-entry id of this entity.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &'a str {
        &self.entry().name
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        if self.entry().is_stream() {
            EntityKind::Stream
        } else {
            EntityKind::Storage
        }
    }

    /// Whether this entity is a stream (file-like).
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.entry().is_stream()
    }

    /// Whether this entity is a storage (directory-like).
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.entry().is_storage()
    }

    #[must_use]
    pub fn clsid(&self) -> &'a [u8; 16] {
        &self.entry().clsid
    }

    /// Raw creation FILETIME (100 ns units since 1601-01-01; 0 = unset).
    #[must_use]
    pub fn created_raw(&self) -> u64 {
        self.entry().created
    }

    /// Raw modification FILETIME.
    #[must_use]
    pub fn modified_raw(&self) -> u64 {
        self.entry().modified
    }

    #[must_use]
    pub fn created(&self) -> Option<SystemTime> {
        filetime_to_system_time(self.entry().created)
    }

    #[must_use]
    pub fn modified(&self) -> Option<SystemTime> {
        filetime_to_system_time(self.entry().modified)
    }

    /// Declared stream size (0 for storages).
    #[must_use]
    pub fn size(&self) -> u64 {
        self.entry().size
    }

    /// Number of children (0 for streams).
    #[must_use]
    pub fn len(&self) -> usize {
        self.file.children[self.id as usize].len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Children in CFB order.
    #[must_use]
    pub fn iter(&self) -> Children<'a> {
        Children {
            file: self.file,
            ids: self.file.children[self.id as usize].iter(),
        }
    }

    /// Case-insensitive child lookup per the CFB name rule.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<Entity<'a>> {
        self.iter().find(|child| names_equal(child.name(), name))
    }

    /// Open this entity as a stream. Works for streams and for the root
    /// entry (whose payload is the mini-stream).
    pub fn open(&self) -> Result<StreamReader<'a>> {
        StreamReader::new(self.file, self.id)
    }
}

impl std::fmt::Debug for Entity<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("size", &self.size())
            .finish()
    }
}

impl<'a> IntoIterator for Entity<'a> {
    type Item = Entity<'a>;
    type IntoIter = Children<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a storage's children in CFB order.
pub struct Children<'a> {
    file: &'a CompoundFile,
    ids: std::slice::Iter<'a, u32>,
}

impl<'a> Iterator for Children<'a> {
    type Item = Entity<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.ids.next().map(|&id| Entity {
            file: self.file,
            id,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for Children<'_> {}
