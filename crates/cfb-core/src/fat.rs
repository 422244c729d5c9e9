//! Allocation tables: DIFAT walk, FAT materialization, mini-FAT load, and
//! sector-chain traversal.
//!
//! The DIFAT lists the sectors holding the FAT (first 109 entries in the
//! header, the rest in a linked list of DIFAT sectors). The FAT maps each
//! sector to its successor; the mini-FAT does the same for mini-sectors
//! hosted inside the root entry's mini-stream.

use crate::diag::{Error, Result, WarnSink, WarningKind};
use crate::header::Header;
use cfb_source::ByteSource;
use cfb_types::{DIFAT_SECTOR, FAT_SECTOR, SectorId, read_le_u32, u64_to_usize};
use std::collections::BTreeSet;

/// In-memory cap for either allocation table (malicious-file guard).
const MAX_TABLE_BYTES: u64 = 100 * 1024 * 1024;

/// Read one whole sector.
pub(crate) fn read_sector(
    source: &dyn ByteSource,
    header: &Header,
    sector_count: u64,
    sector: u32,
) -> Result<Vec<u8>> {
    if u64::from(sector) >= sector_count {
        return Err(Error::OutOfRange(format!(
            "sector {sector} beyond end of container ({sector_count} sectors)"
        )));
    }
    let size = u64_to_usize(header.sector_size, "sector_size")?;
    let mut buf = vec![0_u8; size];
    source.read_exact_at(header.sector_offset(sector), &mut buf)?;
    Ok(buf)
}

/// Follow a sector chain through an allocation table.
///
/// Serves both the FAT (`sector_limit` = container sector count) and the
/// mini-FAT (`sector_limit` = mini-sector count). `END_OF_CHAIN` terminates;
/// any other reserved id mid-chain is fatal, as is a sector beyond
/// `sector_limit` or a revisit. A chain that runs off the end of the table
/// without a terminator warns and truncates.
pub(crate) fn follow_chain(
    start: SectorId,
    table: &[u32],
    sector_limit: u64,
    warn_kind: WarningKind,
    sink: &mut dyn WarnSink,
) -> Result<Vec<u32>> {
    let mut chain = Vec::new();
    let mut visited = vec![false; table.len()];
    let mut current = start;

    for step in 0..=table.len() {
        if current.is_end_of_chain() {
            return Ok(chain);
        }
        if !current.is_regular() {
            return Err(Error::MalformedChain {
                sector: current.0,
                step,
                detail: "reserved sector id inside chain".to_owned(),
            });
        }
        if u64::from(current.0) >= sector_limit {
            return Err(Error::MalformedChain {
                sector: current.0,
                step,
                detail: format!("sector beyond bounds ({sector_limit})"),
            });
        }
        let index = current.index();
        if index >= table.len() {
            sink.warn(
                warn_kind,
                None,
                format!("missing end of chain for sequence starting at sector {start}"),
            )?;
            return Ok(chain);
        }
        if visited[index] {
            return Err(Error::CycleDetected(current.0));
        }
        visited[index] = true;
        chain.push(current.0);
        current = SectorId(table[index]);
    }

    // Every step either terminated, errored, or marked a new sector, so the
    // table must be exhausted before we get here.
    Err(Error::CycleDetected(current.0))
}

/// Materialized FAT plus the sectors the DIFAT and FAT themselves occupy.
#[derive(Debug)]
pub(crate) struct FatLoad {
    pub(crate) fat: Vec<u32>,
    pub(crate) fat_sectors: Vec<u32>,
    pub(crate) difat_sectors: Vec<u32>,
}

/// Walk the DIFAT and materialize the FAT.
pub(crate) fn load_fat(
    source: &dyn ByteSource,
    header: &Header,
    sector_count: u64,
    sink: &mut dyn WarnSink,
) -> Result<FatLoad> {
    let declared_fat = u64_to_usize(u64::from(header.fat_sector_count), "fat_sector_count")?;
    let mut fat_ids: Vec<u32> = Vec::new();
    let mut terminated = false;

    for &value in &header.difat_head {
        if fat_ids.len() == declared_fat {
            break;
        }
        let sid = SectorId(value);
        if sid.is_free() || sid.is_end_of_chain() {
            terminated = true;
            break;
        }
        fat_ids.push(value);
    }
    if terminated && fat_ids.len() < declared_fat {
        sink.warn(
            WarningKind::Difat,
            Some(0x4C),
            format!(
                "DIFAT terminated early (expected {} more FAT sectors)",
                declared_fat - fat_ids.len()
            ),
        )?;
    }

    let mut difat_sectors = Vec::new();
    if !terminated {
        walk_difat_extension(
            source,
            header,
            sector_count,
            declared_fat,
            &mut fat_ids,
            &mut difat_sectors,
            sink,
        )?;
    }

    if (fat_ids.len() as u64) * header.sector_size > MAX_TABLE_BYTES {
        return Err(Error::FatTooLarge(fat_ids.len() as u64 * header.sector_size));
    }

    let mut unique = BTreeSet::new();
    for &sid in &fat_ids {
        if !SectorId(sid).is_regular() {
            return Err(Error::MalformedFat(format!(
                "reserved sector id {sid:#010X} listed as a FAT sector"
            )));
        }
        if u64::from(sid) >= sector_count {
            return Err(Error::MalformedFat(format!(
                "FAT sector {sid} beyond end of container ({sector_count} sectors)"
            )));
        }
        if !unique.insert(sid) {
            return Err(Error::MalformedFat(format!(
                "FAT sector {sid} listed twice in the DIFAT"
            )));
        }
    }

    if fat_ids.len() != declared_fat {
        sink.warn(
            WarningKind::Fat,
            Some(0x2C),
            format!(
                "DIFAT length does not match FAT sector count ({} != {})",
                fat_ids.len(),
                declared_fat
            ),
        )?;
    }

    let mut fat = Vec::with_capacity(fat_ids.len() * header.entries_per_sector());
    for &sid in &fat_ids {
        let buf = read_sector(source, header, sector_count, sid)?;
        for entry in 0..header.entries_per_sector() {
            fat.push(read_le_u32(&buf, entry * 4)?);
        }
    }

    // Cross-check: the FAT must mark its own sectors and the DIFAT's.
    for &sid in &difat_sectors {
        verify_marking(&mut fat, sid, DIFAT_SECTOR, "DIFAT", sink)?;
    }
    for &sid in &fat_ids {
        verify_marking(&mut fat, sid, FAT_SECTOR, "FAT", sink)?;
    }

    Ok(FatLoad {
        fat,
        fat_sectors: fat_ids,
        difat_sectors,
    })
}

#[allow(clippy::too_many_arguments)]
fn walk_difat_extension(
    source: &dyn ByteSource,
    header: &Header,
    sector_count: u64,
    declared_fat: usize,
    fat_ids: &mut Vec<u32>,
    difat_sectors: &mut Vec<u32>,
    sink: &mut dyn WarnSink,
) -> Result<()> {
    let declared_difat = header.difat_sector_count;
    let mut next = header.first_difat_sector;

    if declared_difat == 0 && next.is_free() {
        sink.warn(
            WarningKind::Difat,
            Some(0x44),
            "DIFAT extension pointer is FREE_SECTOR, assuming no extension".to_owned(),
        )?;
        next = SectorId::END_OF_CHAIN;
    } else if declared_difat == 0 && next.is_regular() {
        sink.warn(
            WarningKind::Difat,
            Some(0x44),
            "DIFAT extension pointer with zero sector count".to_owned(),
        )?;
    } else if declared_difat != 0 && next.is_end_of_chain() {
        sink.warn(
            WarningKind::Difat,
            Some(0x48),
            format!("DIFAT sector count is {declared_difat} but no extension chain is present"),
        )?;
    }

    let entries = header.entries_per_sector();
    let mut seen = BTreeSet::new();
    let mut used: u32 = 0;

    'sectors: while next.is_regular() {
        if u64::from(next.0) >= sector_count {
            return Err(Error::MalformedFat(format!(
                "DIFAT sector {next} beyond end of container"
            )));
        }
        if !seen.insert(next.0) {
            return Err(Error::CycleDetected(next.0));
        }
        if used == declared_difat {
            sink.warn(
                WarningKind::Difat,
                None,
                format!("DIFAT chain overran the declared count ({declared_difat}), truncating"),
            )?;
            break;
        }
        used += 1;

        let buf = read_sector(source, header, sector_count, next.0)?;
        difat_sectors.push(next.0);

        for entry in 0..entries - 1 {
            let value = SectorId(read_le_u32(&buf, entry * 4)?);
            if value.is_free() || value.is_end_of_chain() {
                if fat_ids.len() < declared_fat {
                    sink.warn(
                        WarningKind::Difat,
                        None,
                        format!(
                            "DIFAT terminated early (expected {} more FAT sectors)",
                            declared_fat - fat_ids.len()
                        ),
                    )?;
                }
                break 'sectors;
            }
            fat_ids.push(value.0);
            if (fat_ids.len() as u64) * header.sector_size > MAX_TABLE_BYTES {
                return Err(Error::FatTooLarge(fat_ids.len() as u64 * header.sector_size));
            }
        }

        let pointer = SectorId(read_le_u32(&buf, (entries - 1) * 4)?);
        if pointer.is_free() {
            sink.warn(
                WarningKind::Difat,
                None,
                "DIFAT chain terminated by FREE_SECTOR".to_owned(),
            )?;
            next = SectorId::END_OF_CHAIN;
        } else if !pointer.is_regular() && !pointer.is_end_of_chain() {
            return Err(Error::MalformedFat(format!(
                "reserved sector id {pointer} as DIFAT chain pointer"
            )));
        } else {
            next = pointer;
        }
    }

    if used < declared_difat {
        sink.warn(
            WarningKind::Difat,
            Some(0x48),
            format!(
                "DIFAT chain ended early (expected {} more sectors)",
                declared_difat - used
            ),
        )?;
    }
    Ok(())
}

fn verify_marking(
    fat: &mut [u32],
    sector: u32,
    expected: u32,
    role: &str,
    sink: &mut dyn WarnSink,
) -> Result<()> {
    let Some(slot) = fat.get_mut(sector as usize) else {
        sink.warn(
            WarningKind::Fat,
            None,
            format!("{role} sector {sector} is not covered by the FAT"),
        )?;
        return Ok(());
    };
    if *slot != expected {
        sink.warn(
            WarningKind::Fat,
            None,
            format!(
                "{role} sector {sector} marked incorrectly in FAT ({:#010X} != {expected:#010X})",
                *slot
            ),
        )?;
        *slot = expected;
    }
    Ok(())
}

/// Load the mini-FAT from its FAT chain.
pub(crate) fn load_mini_fat(
    source: &dyn ByteSource,
    header: &Header,
    sector_count: u64,
    fat: &[u32],
    sink: &mut dyn WarnSink,
) -> Result<Vec<u32>> {
    let declared = header.mini_fat_sector_count;
    if u64::from(declared) * header.sector_size > MAX_TABLE_BYTES {
        return Err(Error::MiniFatTooLarge(
            u64::from(declared) * header.sector_size,
        ));
    }

    let mut first = header.first_mini_fat_sector;
    if first.is_free() {
        sink.warn(
            WarningKind::MiniFat,
            Some(0x3C),
            "mini-FAT first sector set to FREE_SECTOR".to_owned(),
        )?;
        first = SectorId::END_OF_CHAIN;
    } else if first.is_regular() && u64::from(first.0) >= sector_count {
        sink.warn(
            WarningKind::MiniFat,
            Some(0x3C),
            format!("mini-FAT first sector beyond end of container ({first})"),
        )?;
        first = SectorId::END_OF_CHAIN;
    }
    if !first.is_regular() {
        return Ok(Vec::new());
    }

    let chain = follow_chain(first, fat, sector_count, WarningKind::MiniFat, sink)?;
    if chain.len() != declared as usize {
        sink.warn(
            WarningKind::MiniFat,
            Some(0x40),
            format!(
                "mini-FAT chain length does not match declared count ({} != {declared})",
                chain.len()
            ),
        )?;
    }

    let used = chain.len().min(declared as usize);
    let mut mini_fat = Vec::with_capacity(used * header.entries_per_sector());
    for &sid in &chain[..used] {
        let buf = read_sector(source, header, sector_count, sid)?;
        for entry in 0..header.entries_per_sector() {
            mini_fat.push(read_le_u32(&buf, entry * 4)?);
        }
    }
    Ok(mini_fat)
}
