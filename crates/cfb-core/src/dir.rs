//! Directory parsing: 128-byte entry records, the red-black sibling tree,
//! and per-storage children in CFB name order.
//!
//! Entries live in a flat array indexed by directory-entry id; each storage's
//! children are derived as the in-order traversal of its sibling tree. The
//! tree structure, not the names, is the source of truth; ordering and
//! red-black violations only warn.

use crate::diag::{Error, Result, WarnSink, WarningKind};
use crate::fat::{follow_chain, read_sector};
use crate::header::Header;
use cfb_source::ByteSource;
use cfb_types::{
    DIR_ENTRY_SIZE, MAX_REGULAR_DIR_ID, NO_STREAM, ParseError, SectorId, cmp_names, read_fixed,
    read_le_u16, read_le_u32, read_le_u64,
};
use serde::{Deserialize, Serialize};
use std::char::{REPLACEMENT_CHARACTER, decode_utf16};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Directory entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Empty,
    Storage,
    Stream,
    Root,
}

/// Red-black tree node color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    Red,
    Black,
}

/// One parsed and sanitized 128-byte directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub color: Color,
    pub left: u32,
    pub right: u32,
    pub child: u32,
    pub clsid: [u8; 16],
    pub state_bits: u32,
    pub created: u64,
    pub modified: u64,
    pub start_sector: SectorId,
    pub size: u64,
}

impl DirEntry {
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self.kind, EntryKind::Storage | EntryKind::Root)
    }

    #[must_use]
    pub fn is_stream(&self) -> bool {
        self.kind == EntryKind::Stream
    }
}

/// Whether a sibling/child link addresses an entry at all.
#[must_use]
fn is_link(id: u32) -> bool {
    id <= MAX_REGULAR_DIR_ID
}

/// Parse one directory entry record.
pub(crate) fn parse_entry(
    record: &[u8],
    index: u32,
    v3: bool,
    base_offset: u64,
    sink: &mut dyn WarnSink,
) -> Result<DirEntry> {
    debug_assert_eq!(record.len(), DIR_ENTRY_SIZE);

    let mut units = [0_u16; 32];
    for (i, unit) in units.iter_mut().enumerate() {
        *unit = read_le_u16(record, i * 2)?;
    }
    let mut name_len = read_le_u16(record, 0x40)?;
    let kind_raw = record[0x42];
    let color_raw = record[0x43];
    let mut left = read_le_u32(record, 0x44)?;
    let mut right = read_le_u32(record, 0x48)?;
    let mut child = read_le_u32(record, 0x4C)?;
    let mut clsid = read_fixed::<16>(record, 0x50)?;
    let mut state_bits = read_le_u32(record, 0x60)?;
    let mut created = read_le_u64(record, 0x64)?;
    let mut modified = read_le_u64(record, 0x6C)?;
    let mut start_sector = SectorId(read_le_u32(record, 0x74)?);
    let mut size = read_le_u64(record, 0x78)?;

    let warn = |sink: &mut dyn WarnSink, detail: String| {
        sink.warn(WarningKind::Directory, Some(base_offset), detail)
    };

    let kind = match kind_raw {
        0 => EntryKind::Empty,
        1 => EntryKind::Storage,
        2 => EntryKind::Stream,
        5 => EntryKind::Root,
        other => {
            warn(
                sink,
                format!("invalid type {other} in dir entry {index}, treating as empty"),
            )?;
            EntryKind::Empty
        }
    };
    let kind = if index == 0 && kind != EntryKind::Root {
        warn(sink, format!("dir entry 0 is not the root entry ({kind_raw})"))?;
        EntryKind::Root
    } else if index != 0 && kind == EntryKind::Root {
        warn(sink, format!("secondary root entry at dir entry {index}"))?;
        EntryKind::Empty
    } else {
        kind
    };

    let color = match color_raw {
        0 => Color::Red,
        1 => Color::Black,
        other => {
            warn(
                sink,
                format!("invalid color {other} in dir entry {index}"),
            )?;
            Color::Black
        }
    };

    if name_len > 64 || name_len % 2 != 0 {
        warn(
            sink,
            format!("invalid name length ({name_len}) in dir entry {index}"),
        )?;
        name_len = (name_len & !1).min(64);
    }

    let nul = units.iter().position(|&u| u == 0);
    let decoded_units = match nul {
        Some(position) => &units[..position],
        None => {
            warn(
                sink,
                format!("missing NUL terminator in name of dir entry {index}"),
            )?;
            &units[..usize::from(name_len / 2).min(32)]
        }
    };
    let mut name: String = decode_utf16(decoded_units.iter().copied())
        .map(|r| r.unwrap_or(REPLACEMENT_CHARACTER))
        .collect();

    if kind == EntryKind::Empty {
        if !name.is_empty() {
            warn(sink, format!("non-empty name in empty dir entry {index}"))?;
            name.clear();
        }
        if name_len != 0 {
            warn(
                sink,
                format!("non-zero name length ({name_len}) in empty dir entry {index}"),
            )?;
        }
        if state_bits != 0 {
            warn(sink, format!("non-zero state bits in empty dir entry {index}"))?;
            state_bits = 0;
        }
    } else {
        let unit_count = decoded_units.len() as u16;
        if nul.is_some() && (unit_count + 1) * 2 != name_len {
            warn(
                sink,
                format!("name length mismatch ({name_len}) in dir entry {index}"),
            )?;
        }
    }

    if matches!(kind, EntryKind::Empty | EntryKind::Root) {
        if left != NO_STREAM {
            warn(sink, format!("invalid left sibling in dir entry {index}"))?;
            left = NO_STREAM;
        }
        if right != NO_STREAM {
            warn(sink, format!("invalid right sibling in dir entry {index}"))?;
            right = NO_STREAM;
        }
    }

    if matches!(kind, EntryKind::Empty | EntryKind::Stream) {
        if child != NO_STREAM {
            warn(sink, format!("invalid child link in dir entry {index}"))?;
            child = NO_STREAM;
        }
        if clsid != [0_u8; 16] {
            warn(sink, format!("non-zero CLSID in dir entry {index}"))?;
            clsid = [0_u8; 16];
        }
        if created != 0 {
            warn(
                sink,
                format!("non-zero creation timestamp in dir entry {index}"),
            )?;
            created = 0;
        }
        if modified != 0 {
            warn(
                sink,
                format!("non-zero modification timestamp in dir entry {index}"),
            )?;
            modified = 0;
        }
    }

    if matches!(kind, EntryKind::Empty | EntryKind::Storage) {
        if start_sector != SectorId(0) {
            warn(
                sink,
                format!("non-zero start sector ({start_sector}) in dir entry {index}"),
            )?;
            start_sector = SectorId(0);
        }
        if size != 0 {
            warn(sink, format!("non-zero size ({size}) in dir entry {index}"))?;
            size = 0;
        }
    }

    if v3 {
        if size >> 32 != 0 {
            warn(
                sink,
                format!("non-zero high size bits in dir entry {index}, masking"),
            )?;
            size &= 0xFFFF_FFFF;
        }
        if size >= 1 << 31 {
            warn(
                sink,
                format!("size too large for a 512-byte-sector file in dir entry {index}"),
            )?;
        }
    }

    Ok(DirEntry {
        name,
        kind,
        color,
        left,
        right,
        child,
        clsid,
        state_bits,
        created,
        modified,
        start_sector,
        size,
    })
}

/// Read the directory chain and parse every entry.
pub(crate) fn load_directory(
    source: &dyn ByteSource,
    header: &Header,
    sector_count: u64,
    fat: &[u32],
    sink: &mut dyn WarnSink,
) -> Result<Vec<DirEntry>> {
    let first = header.first_directory_sector;
    if !first.is_regular() {
        return Err(Error::HeaderCorrupt(ParseError::InvalidField {
            field: "first_directory_sector",
            reason: "not a regular sector",
        }));
    }
    let chain = follow_chain(first, fat, sector_count, WarningKind::Directory, sink)?;
    if chain.is_empty() {
        return Err(Error::HeaderCorrupt(ParseError::InvalidField {
            field: "first_directory_sector",
            reason: "empty directory chain",
        }));
    }

    let per_sector = (header.sector_size as usize) / DIR_ENTRY_SIZE;
    let mut entries = Vec::with_capacity(chain.len() * per_sector);
    for &sid in &chain {
        let buf = read_sector(source, header, sector_count, sid)?;
        for slot in 0..per_sector {
            let index = entries.len() as u32;
            let base = header.sector_offset(sid) + (slot * DIR_ENTRY_SIZE) as u64;
            let record = &buf[slot * DIR_ENTRY_SIZE..(slot + 1) * DIR_ENTRY_SIZE];
            entries.push(parse_entry(record, index, header.is_v3(), base, sink)?);
        }
    }
    Ok(entries)
}

/// Derive each storage's children (in-order sibling-tree traversal) and
/// report anomalies: cycles are fatal; ordering, red-black, and orphan
/// violations warn.
pub(crate) fn build_children(
    entries: &[DirEntry],
    sink: &mut dyn WarnSink,
) -> Result<Vec<Vec<u32>>> {
    let mut children = vec![Vec::new(); entries.len()];
    let mut visited = vec![false; entries.len()];
    visited[0] = true;

    let mut pending: Vec<u32> = vec![0];
    while let Some(storage) = pending.pop() {
        let order = walk_siblings(entries, storage, &mut visited, sink)?;
        check_red_black(entries, entries[storage as usize].child, storage, sink)?;
        check_name_order(entries, &order, sink)?;

        let mut kept = Vec::with_capacity(order.len());
        for &id in &order {
            let entry = &entries[id as usize];
            if entry.kind == EntryKind::Empty {
                sink.warn(
                    WarningKind::Directory,
                    None,
                    format!("empty dir entry {id} linked under storage {storage}"),
                )?;
                continue;
            }
            if entry.is_storage() {
                pending.push(id);
            }
            kept.push(id);
        }
        children[storage as usize] = kept;
    }

    for (id, entry) in entries.iter().enumerate() {
        if !visited[id] && entry.kind != EntryKind::Empty {
            sink.warn(
                WarningKind::Directory,
                None,
                format!("orphaned dir entry {id} ('{}')", entry.name),
            )?;
        }
    }

    Ok(children)
}

/// In-order traversal of one storage's sibling tree.
fn walk_siblings(
    entries: &[DirEntry],
    storage: u32,
    visited: &mut [bool],
    sink: &mut dyn WarnSink,
) -> Result<Vec<u32>> {
    let mut order = Vec::new();
    let mut stack: Vec<u32> = Vec::new();
    let mut current = entries[storage as usize].child;

    loop {
        while is_link(current) {
            let index = current as usize;
            if index >= entries.len() {
                sink.warn(
                    WarningKind::Directory,
                    None,
                    format!("sibling link {current} beyond directory in storage {storage}"),
                )?;
                current = NO_STREAM;
                break;
            }
            if visited[index] {
                return Err(Error::DirectoryCycle(current));
            }
            visited[index] = true;
            stack.push(current);
            current = entries[index].left;
        }
        let Some(node) = stack.pop() else {
            break;
        };
        order.push(node);
        current = entries[node as usize].right;
    }
    Ok(order)
}

/// Verify the CFB ordering between consecutive siblings; violations warn and
/// traversal order stands.
fn check_name_order(entries: &[DirEntry], order: &[u32], sink: &mut dyn WarnSink) -> Result<()> {
    for pair in order.windows(2) {
        let (a, b) = (&entries[pair[0] as usize], &entries[pair[1] as usize]);
        if a.kind == EntryKind::Empty || b.kind == EntryKind::Empty {
            continue;
        }
        match cmp_names(&a.name, &b.name) {
            Ordering::Less => {}
            Ordering::Equal => {
                sink.warn(
                    WarningKind::Directory,
                    None,
                    format!("duplicate name '{}' in directory", a.name),
                )?;
            }
            Ordering::Greater => {
                sink.warn(
                    WarningKind::Directory,
                    None,
                    format!("directory entries out of order ('{}' > '{}')", a.name, b.name),
                )?;
            }
        }
    }
    Ok(())
}

/// Red-black invariants, checked per storage subtree: no two consecutive
/// reds, and equal black-height on both sides of every node. At most one
/// warning of each kind per storage.
fn check_red_black(
    entries: &[DirEntry],
    subtree: u32,
    storage: u32,
    sink: &mut dyn WarnSink,
) -> Result<()> {
    if !is_link(subtree) || subtree as usize >= entries.len() {
        return Ok(());
    }

    let mut two_reds = false;
    let mut height_mismatch = false;
    let mut heights: HashMap<u32, u64> = HashMap::new();
    let mut stack: Vec<(u32, bool)> = vec![(subtree, false)];

    let side_height = |heights: &HashMap<u32, u64>, link: u32| -> u64 {
        if is_link(link) && (link as usize) < entries.len() {
            heights.get(&link).copied().unwrap_or(1)
        } else {
            1
        }
    };

    while let Some((node, processed)) = stack.pop() {
        let entry = &entries[node as usize];
        let sides = [entry.left, entry.right];
        if processed {
            let left = side_height(&heights, sides[0]);
            let right = side_height(&heights, sides[1]);
            if left != right {
                height_mismatch = true;
            }
            let own = u64::from(entry.color == Color::Black);
            heights.insert(node, left.max(right) + own);
        } else {
            stack.push((node, true));
            for side in sides {
                if is_link(side) && (side as usize) < entries.len() {
                    stack.push((side, false));
                    if entry.color == Color::Red && entries[side as usize].color == Color::Red {
                        two_reds = true;
                    }
                }
            }
        }
    }

    if two_reds {
        sink.warn(
            WarningKind::Directory,
            None,
            format!("consecutive red nodes in directory tree of storage {storage}"),
        )?;
    }
    if height_mismatch {
        sink.warn(
            WarningKind::Directory,
            None,
            format!("unbalanced black height in directory tree of storage {storage}"),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::{DiagSink, Warning};
    use std::collections::BTreeSet;

    fn sink() -> DiagSink {
        DiagSink::new(BTreeSet::new())
    }

    fn record(
        name: &str,
        kind: u8,
        color: u8,
        left: u32,
        right: u32,
        child: u32,
        start: u32,
        size: u64,
    ) -> [u8; DIR_ENTRY_SIZE] {
        let mut buf = [0_u8; DIR_ENTRY_SIZE];
        let units: Vec<u16> = name.encode_utf16().collect();
        assert!(units.len() <= 31);
        for (i, unit) in units.iter().enumerate() {
            buf[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        let name_len = ((units.len() + 1) * 2) as u16;
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

    fn parse(record: &[u8], index: u32) -> (Result<DirEntry>, Vec<Warning>) {
        let mut sink = sink();
        let parsed = parse_entry(record, index, true, 0, &mut sink);
        (parsed, sink.warnings)
    }

    #[test]
    fn parses_stream_entry() {
        let rec = record("Book", 2, 1, NO_STREAM, NO_STREAM, NO_STREAM, 7, 900);
        let (parsed, warnings) = parse(&rec, 1);
        let entry = parsed.expect("entry");
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(entry.name, "Book");
        assert_eq!(entry.kind, EntryKind::Stream);
        assert_eq!(entry.color, Color::Black);
        assert_eq!(entry.start_sector, SectorId(7));
        assert_eq!(entry.size, 900);
        assert!(entry.is_stream());
        assert!(!entry.is_storage());
    }

    #[test]
    fn parses_root_entry() {
        let rec = record("Root Entry", 5, 1, NO_STREAM, NO_STREAM, 1, 3, 192);
        let (parsed, warnings) = parse(&rec, 0);
        let entry = parsed.expect("entry");
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(entry.kind, EntryKind::Root);
        assert_eq!(entry.child, 1);
        assert!(entry.is_storage());
    }

    #[test]
    fn coerces_non_root_first_entry() {
        let rec = record("Root Entry", 1, 1, NO_STREAM, NO_STREAM, NO_STREAM, 0, 0);
        let (parsed, warnings) = parse(&rec, 0);
        assert_eq!(parsed.expect("entry").kind, EntryKind::Root);
        assert!(!warnings.is_empty());
    }

    #[test]
    fn unknown_type_becomes_empty() {
        let rec = record("", 4, 1, NO_STREAM, NO_STREAM, NO_STREAM, 0, 0);
        let (parsed, warnings) = parse(&rec, 3);
        assert_eq!(parsed.expect("entry").kind, EntryKind::Empty);
        assert!(warnings.iter().any(|w| w.kind == WarningKind::Directory));
    }

    #[test]
    fn warns_on_missing_nul_terminator() {
        let mut rec = record("abc", 2, 1, NO_STREAM, NO_STREAM, NO_STREAM, 0, 10);
        // Fill the whole name field so no NUL remains
        for i in 0..32 {
            rec[i * 2..i * 2 + 2].copy_from_slice(&u16::from(b'x').to_le_bytes());
        }
        rec[0x40..0x42].copy_from_slice(&8_u16.to_le_bytes());
        let (parsed, warnings) = parse(&rec, 2);
        let entry = parsed.expect("entry");
        assert_eq!(entry.name, "xxxx");
        assert!(warnings.iter().any(|w| w.detail.contains("NUL")));
    }

    #[test]
    fn warns_on_odd_name_length() {
        let mut rec = record("ab", 2, 1, NO_STREAM, NO_STREAM, NO_STREAM, 0, 10);
        rec[0x40..0x42].copy_from_slice(&7_u16.to_le_bytes());
        let (parsed, warnings) = parse(&rec, 2);
        parsed.expect("entry");
        assert!(warnings.iter().any(|w| w.detail.contains("name length")));
    }

    #[test]
    fn empty_entry_with_links_is_coerced() {
        let mut rec = record("", 0, 1, 4, 5, 6, 0, 0);
        rec[0x40..0x42].copy_from_slice(&0_u16.to_le_bytes());
        let (parsed, warnings) = parse(&rec, 9);
        let entry = parsed.expect("entry");
        assert_eq!(entry.left, NO_STREAM);
        assert_eq!(entry.right, NO_STREAM);
        assert_eq!(entry.child, NO_STREAM);
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn v3_high_size_bits_are_masked() {
        let rec = record(
            "big",
            2,
            1,
            NO_STREAM,
            NO_STREAM,
            NO_STREAM,
            1,
            (1_u64 << 40) | 1234,
        );
        let (parsed, warnings) = parse(&rec, 1);
        let entry = parsed.expect("entry");
        assert_eq!(entry.size, 1234);
        assert!(warnings.iter().any(|w| w.detail.contains("high size bits")));
    }

    // ── Tree construction ───────────────────────────────────────────────

    fn entry(name: &str, kind: EntryKind, left: u32, right: u32, child: u32) -> DirEntry {
        DirEntry {
            name: name.to_owned(),
            kind,
            color: Color::Black,
            left,
            right,
            child,
            clsid: [0; 16],
            state_bits: 0,
            created: 0,
            modified: 0,
            start_sector: SectorId(0),
            size: 0,
        }
    }

    fn build(entries: &[DirEntry]) -> (Result<Vec<Vec<u32>>>, Vec<Warning>) {
        let mut sink = sink();
        let children = build_children(entries, &mut sink);
        (children, sink.warnings)
    }

    #[test]
    fn builds_nested_children() {
        // root -> storage "A" -> stream "B"
        let entries = vec![
            entry("Root Entry", EntryKind::Root, NO_STREAM, NO_STREAM, 1),
            entry("A", EntryKind::Storage, NO_STREAM, NO_STREAM, 2),
            entry("B", EntryKind::Stream, NO_STREAM, NO_STREAM, NO_STREAM),
        ];
        let (children, warnings) = build(&entries);
        let children = children.expect("children");
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(children[0], vec![1]);
        assert_eq!(children[1], vec![2]);
        assert!(children[2].is_empty());
    }

    #[test]
    fn in_order_traversal_yields_cfb_order() {
        // Balanced tree: "bb" root with "a" left, "ccc" right
        let entries = vec![
            entry("Root Entry", EntryKind::Root, NO_STREAM, NO_STREAM, 2),
            entry("a", EntryKind::Stream, NO_STREAM, NO_STREAM, NO_STREAM),
            entry("bb", EntryKind::Stream, 1, 3, NO_STREAM),
            entry("ccc", EntryKind::Stream, NO_STREAM, NO_STREAM, NO_STREAM),
        ];
        let (children, warnings) = build(&entries);
        assert_eq!(children.expect("children")[0], vec![1, 2, 3]);
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn warns_on_unsorted_siblings() {
        let entries = vec![
            entry("Root Entry", EntryKind::Root, NO_STREAM, NO_STREAM, 2),
            entry("zz", EntryKind::Stream, NO_STREAM, NO_STREAM, NO_STREAM),
            entry("aa", EntryKind::Stream, 1, NO_STREAM, NO_STREAM),
        ];
        let (children, warnings) = build(&entries);
        // Traversal order stands even though names disagree
        assert_eq!(children.expect("children")[0], vec![1, 2]);
        assert!(warnings.iter().any(|w| w.detail.contains("out of order")));
    }

    #[test]
    fn reports_orphaned_entries() {
        let entries = vec![
            entry("Root Entry", EntryKind::Root, NO_STREAM, NO_STREAM, NO_STREAM),
            entry("lost", EntryKind::Stream, NO_STREAM, NO_STREAM, NO_STREAM),
        ];
        let (children, warnings) = build(&entries);
        assert!(children.expect("children")[0].is_empty());
        assert!(warnings.iter().any(|w| w.detail.contains("orphaned")));
    }

    #[test]
    fn shared_subtree_is_a_cycle() {
        // Both storages claim entry 3 as their child
        let entries = vec![
            entry("Root Entry", EntryKind::Root, NO_STREAM, NO_STREAM, 1),
            entry("a", EntryKind::Storage, NO_STREAM, 2, 3),
            entry("b", EntryKind::Storage, NO_STREAM, NO_STREAM, 3),
            entry("x", EntryKind::Stream, NO_STREAM, NO_STREAM, NO_STREAM),
        ];
        let (children, _) = build(&entries);
        assert!(matches!(children, Err(Error::DirectoryCycle(3))));
    }

    #[test]
    fn sibling_self_loop_is_a_cycle() {
        let mut loop_entry = entry("x", EntryKind::Stream, NO_STREAM, NO_STREAM, NO_STREAM);
        loop_entry.right = 1;
        let entries = vec![
            entry("Root Entry", EntryKind::Root, NO_STREAM, NO_STREAM, 1),
            loop_entry,
        ];
        let (children, _) = build(&entries);
        assert!(matches!(children, Err(Error::DirectoryCycle(1))));
    }

    #[test]
    fn out_of_bounds_link_warns_and_stops() {
        let entries = vec![
            entry("Root Entry", EntryKind::Root, NO_STREAM, NO_STREAM, 9),
        ];
        let (children, warnings) = build(&entries);
        assert!(children.expect("children")[0].is_empty());
        assert!(warnings.iter().any(|w| w.detail.contains("beyond directory")));
    }

    #[test]
    fn warns_on_consecutive_red_nodes() {
        let mut parent = entry("bb", EntryKind::Stream, 1, NO_STREAM, NO_STREAM);
        parent.color = Color::Red;
        let mut left = entry("a", EntryKind::Stream, NO_STREAM, NO_STREAM, NO_STREAM);
        left.color = Color::Red;
        let entries = vec![
            entry("Root Entry", EntryKind::Root, NO_STREAM, NO_STREAM, 2),
            left,
            parent,
        ];
        let (children, warnings) = build(&entries);
        assert_eq!(children.expect("children")[0], vec![1, 2]);
        assert!(warnings.iter().any(|w| w.detail.contains("consecutive red")));
    }

    #[test]
    fn warns_on_unbalanced_black_height() {
        // "cc" has a black left child and a nil right child
        let entries = vec![
            entry("Root Entry", EntryKind::Root, NO_STREAM, NO_STREAM, 2),
            entry("a", EntryKind::Stream, NO_STREAM, NO_STREAM, NO_STREAM),
            entry("cc", EntryKind::Stream, 1, NO_STREAM, NO_STREAM),
        ];
        let (children, warnings) = build(&entries);
        children.expect("children");
        assert!(warnings.iter().any(|w| w.detail.contains("black height")));
    }
}
