//! Partition engine: creates, deletes, lists and resizes primary, extended
//! and logical partitions on a disk image, backed by the MBR and an EBR
//! chain inside the extended partition (if any).

use crate::alloc::{self, Gap};
use crate::disk::Disk;
use crate::ebr::Ebr;
use crate::error::{Error, Result};
use crate::mbr::{Fit, Mbr, PartitionType, PARTITION_COUNT};

const MBR_OFFSET: u64 = 0;

/// A partition as seen from the outside, regardless of whether it is
/// primary, extended or logical.
#[derive(Debug, Clone)]
pub struct PartitionInfo {
    pub name: String,
    pub start: i64,
    pub size: i64,
    pub logical: bool,
    pub extended: bool,
}

pub struct PartitionEngine;

impl PartitionEngine {
    /// Initializes a fresh disk image with a zeroed MBR.
    pub fn init_disk(disk: &mut Disk, signature: i64, fit: Fit) -> Result<()> {
        let mbr = Mbr::new(disk.size() as i64, signature, fit);
        disk.write_at(MBR_OFFSET, &mbr.encode())
    }

    fn read_mbr(disk: &mut Disk) -> Result<Mbr> {
        let buf = disk.read_at(MBR_OFFSET, Mbr::SIZE)?;
        Mbr::decode(&buf)
    }

    fn write_mbr(disk: &mut Disk, mbr: &Mbr) -> Result<()> {
        disk.write_at(MBR_OFFSET, &mbr.encode())
    }

    /// Gaps of free space among the disk's primary/extended slots, measured
    /// from just after the MBR header to the end of the disk.
    fn primary_gaps(mbr: &Mbr) -> Vec<Gap> {
        let mut used: Vec<(i64, i64)> = mbr
            .partitions
            .iter()
            .filter(|p| !p.is_free())
            .map(|p| (p.start, p.size))
            .collect();
        used.sort_by_key(|&(start, _)| start);

        let mut gaps = Vec::new();
        let mut cursor = Mbr::SIZE as i64;
        for (start, size) in used {
            if start > cursor {
                gaps.push(Gap {
                    start: cursor,
                    size: start - cursor,
                });
            }
            cursor = cursor.max(start + size);
        }
        let end = mbr.disk_size;
        if end > cursor {
            gaps.push(Gap {
                start: cursor,
                size: end - cursor,
            });
        }
        gaps
    }

    fn free_slot(mbr: &Mbr) -> Option<usize> {
        mbr.partitions.iter().position(|p| p.is_free())
    }

    pub fn create_primary(
        disk: &mut Disk,
        name: &str,
        size: i64,
        fit: Fit,
    ) -> Result<()> {
        if size <= 0 {
            return Err(Error::validation("partition size must be positive"));
        }
        let mut mbr = Self::read_mbr(disk)?;
        if mbr.partitions.iter().any(|p| !p.is_free() && p.name_str() == name) {
            return Err(Error::conflict(format!("partition {name} already exists")));
        }
        let slot_idx = Self::free_slot(&mbr)
            .ok_or_else(|| Error::capacity("no free primary/extended slot"))?;
        let gaps = Self::primary_gaps(&mbr);
        let gap_idx = alloc::choose(&gaps, size, fit)
            .ok_or_else(|| Error::capacity("no free space large enough"))?;
        let gap = gaps[gap_idx];

        let correlative = mbr.partitions.iter().filter(|p| !p.is_free()).count() as i64 + 1;
        let slot = &mut mbr.partitions[slot_idx];
        slot.status = b'1';
        slot.part_type = PartitionType::Primary;
        slot.fit = fit;
        slot.start = gap.start;
        slot.size = size;
        slot.set_name(name);
        slot.correlative = correlative;
        slot.mount_id = [0u8; 4];

        Self::write_mbr(disk, &mbr)
    }

    pub fn create_extended(disk: &mut Disk, name: &str, size: i64, fit: Fit) -> Result<()> {
        if size <= 0 {
            return Err(Error::validation("partition size must be positive"));
        }
        let mbr = Self::read_mbr(disk)?;
        if mbr.partitions.iter().any(|p| !p.is_free() && p.part_type == PartitionType::Extended) {
            return Err(Error::conflict("an extended partition already exists"));
        }
        Self::create_primary(disk, name, size, fit)?;
        let mut mbr = Self::read_mbr(disk)?;
        let slot = mbr
            .partitions
            .iter_mut()
            .find(|p| !p.is_free() && p.name_str() == name)
            .expect("just created");
        slot.part_type = PartitionType::Extended;
        Self::write_mbr(disk, &mbr)
    }

    fn find_extended(mbr: &Mbr) -> Option<usize> {
        mbr.partitions
            .iter()
            .position(|p| !p.is_free() && p.part_type == PartitionType::Extended)
    }

    fn ebr_gaps(disk: &mut Disk, ext_start: i64, ext_size: i64) -> Result<Vec<Gap>> {
        let mut used: Vec<(i64, i64)> = Vec::new();
        let mut offset = ext_start;
        loop {
            let buf = disk.read_at(offset as u64, Ebr::SIZE)?;
            let ebr = Ebr::decode(&buf)?;
            if !ebr.is_free() {
                // The head EBR's own header lives at `ext_start` and is
                // accounted for by the initial cursor below; every other
                // EBR's header sits directly before its data at `offset`
                // and must be reserved too, or a later allocation could
                // overwrite it.
                if offset == ext_start {
                    used.push((ebr.start, ebr.size));
                } else {
                    used.push((offset, Ebr::SIZE as i64 + ebr.size));
                }
            }
            if ebr.next < 0 {
                break;
            }
            offset = ebr.next;
        }
        used.sort_by_key(|&(start, _)| start);
        let mut gaps = Vec::new();
        let mut cursor = ext_start + Ebr::SIZE as i64;
        for (start, size) in used {
            if start > cursor {
                gaps.push(Gap {
                    start: cursor,
                    size: start - cursor,
                });
            }
            cursor = cursor.max(start + size);
        }
        let end = ext_start + ext_size;
        if end > cursor {
            gaps.push(Gap {
                start: cursor,
                size: end - cursor,
            });
        }
        Ok(gaps)
    }

    /// Finds the offset and decoded record of the last EBR in the chain.
    fn last_ebr(disk: &mut Disk, ext_start: i64) -> Result<(i64, Ebr)> {
        let mut offset = ext_start;
        loop {
            let buf = disk.read_at(offset as u64, Ebr::SIZE)?;
            let ebr = Ebr::decode(&buf)?;
            if ebr.next < 0 {
                return Ok((offset, ebr));
            }
            offset = ebr.next;
        }
    }

    pub fn create_logical(disk: &mut Disk, name: &str, size: i64, fit: Fit) -> Result<()> {
        if size <= 0 {
            return Err(Error::validation("partition size must be positive"));
        }
        let mbr = Self::read_mbr(disk)?;
        let ext_idx = Self::find_extended(&mbr)
            .ok_or_else(|| Error::not_found("no extended partition to hold logical partitions"))?;
        let ext = &mbr.partitions[ext_idx];
        let (ext_start, ext_size) = (ext.start, ext.size);

        // First logical partition: the extended partition holds no EBR yet.
        let first_offset = ext_start;
        let first_buf = disk.read_at(first_offset as u64, Ebr::SIZE)?;
        let is_bootstrapped = first_buf.iter().any(|&b| b != 0);

        if !is_bootstrapped {
            let needed = size + Ebr::SIZE as i64;
            if needed > ext_size {
                return Err(Error::capacity("extended partition too small"));
            }
            let mut ebr = Ebr::empty();
            ebr.status = b'1';
            ebr.fit = fit;
            ebr.start = ext_start + Ebr::SIZE as i64;
            ebr.size = size;
            ebr.next = -1;
            ebr.set_name(name);
            disk.write_at(first_offset as u64, &ebr.encode())?;
            return Ok(());
        }

        // Reject duplicate names among existing logical partitions.
        let mut offset = ext_start;
        loop {
            let buf = disk.read_at(offset as u64, Ebr::SIZE)?;
            let ebr = Ebr::decode(&buf)?;
            if !ebr.is_free() && ebr.name_str() == name {
                return Err(Error::conflict(format!("logical partition {name} already exists")));
            }
            if ebr.next < 0 {
                break;
            }
            offset = ebr.next;
        }

        let gaps = Self::ebr_gaps(disk, ext_start, ext_size)?;
        let gap_idx = alloc::choose(&gaps, size + Ebr::SIZE as i64, fit)
            .ok_or_else(|| Error::capacity("no free space large enough inside extended partition"))?;
        let gap = gaps[gap_idx];

        let (tail_offset, mut tail) = Self::last_ebr(disk, ext_start)?;
        let new_offset = gap.start;
        let mut new_ebr = Ebr::empty();
        new_ebr.status = b'1';
        new_ebr.fit = fit;
        new_ebr.start = gap.start + Ebr::SIZE as i64;
        new_ebr.size = size;
        new_ebr.next = -1;
        new_ebr.set_name(name);
        disk.write_at(new_offset as u64, &new_ebr.encode())?;

        tail.next = new_offset;
        disk.write_at(tail_offset as u64, &tail.encode())?;
        Ok(())
    }

    pub fn list(disk: &mut Disk) -> Result<Vec<PartitionInfo>> {
        let mbr = Self::read_mbr(disk)?;
        let mut out = Vec::new();
        for p in mbr.partitions.iter().filter(|p| !p.is_free()) {
            out.push(PartitionInfo {
                name: p.name_str(),
                start: p.start,
                size: p.size,
                logical: false,
                extended: p.part_type == PartitionType::Extended,
            });
            if p.part_type == PartitionType::Extended {
                let mut offset = p.start;
                loop {
                    let buf = disk.read_at(offset as u64, Ebr::SIZE)?;
                    let ebr = Ebr::decode(&buf)?;
                    if !ebr.is_free() {
                        out.push(PartitionInfo {
                            name: ebr.name_str(),
                            start: ebr.start,
                            size: ebr.size,
                            logical: true,
                            extended: false,
                        });
                    }
                    if ebr.next < 0 {
                        break;
                    }
                    offset = ebr.next;
                }
            }
        }
        Ok(out)
    }

    /// Removes the single logical partition whose header sits at `offset`
    /// from the EBR chain that starts at `ext_start`, relinking around it.
    fn unlink_logical(disk: &mut Disk, ext_start: i64, offset: i64) -> Result<()> {
        let mut prev_offset: Option<i64> = None;
        let mut cur = ext_start;
        loop {
            let buf = disk.read_at(cur as u64, Ebr::SIZE)?;
            let ebr = Ebr::decode(&buf)?;
            if cur == offset {
                let next = ebr.next;
                if let Some(prev_off) = prev_offset {
                    let prev_buf = disk.read_at(prev_off as u64, Ebr::SIZE)?;
                    let mut prev = Ebr::decode(&prev_buf)?;
                    prev.next = next;
                    disk.write_at(prev_off as u64, &prev.encode())?;
                    disk.zero_fill(cur as u64, Ebr::SIZE as u64)?;
                } else if next >= 0 {
                    let next_buf = disk.read_at(next as u64, Ebr::SIZE)?;
                    disk.write_at(cur as u64, &next_buf)?;
                    disk.zero_fill(next as u64, Ebr::SIZE as u64)?;
                } else {
                    disk.write_at(cur as u64, &Ebr::empty().encode())?;
                }
                return Ok(());
            }
            if ebr.next < 0 {
                return Err(Error::integrity("logical partition vanished from chain"));
            }
            prev_offset = Some(cur);
            cur = ebr.next;
        }
    }

    /// Deletes every logical partition inside the extended partition at
    /// `ext_start`, zero-filling each one's payload first when `mode` is
    /// `Full`. Used when the extended partition itself is deleted.
    fn delete_all_logicals(disk: &mut Disk, ext_start: i64, mode: DeleteMode) -> Result<()> {
        loop {
            let buf = disk.read_at(ext_start as u64, Ebr::SIZE)?;
            let ebr = Ebr::decode(&buf)?;
            if ebr.is_free() {
                return Ok(());
            }
            if mode == DeleteMode::Full {
                disk.zero_fill(ebr.start as u64, ebr.size as u64)?;
            }
            Self::unlink_logical(disk, ext_start, ext_start)?;
        }
    }

    /// Deletes the named partition. `DeleteMode::Full` zero-fills the
    /// partition's data region before reclaiming the slot; `Fast` only
    /// updates the bookkeeping structures. Deleting an extended partition
    /// recursively deletes every logical partition it holds.
    pub fn delete(disk: &mut Disk, name: &str, mode: DeleteMode) -> Result<()> {
        let mut mbr = Self::read_mbr(disk)?;
        if let Some(idx) = mbr
            .partitions
            .iter()
            .position(|p| !p.is_free() && p.name_str() == name)
        {
            let slot = mbr.partitions[idx].clone();
            if slot.part_type == PartitionType::Extended {
                Self::delete_all_logicals(disk, slot.start, mode)?;
            }
            if mode == DeleteMode::Full {
                disk.zero_fill(slot.start as u64, slot.size as u64)?;
            }
            mbr.partitions[idx] = crate::mbr::PartitionSlot::empty();
            return Self::write_mbr(disk, &mbr);
        }

        if let Some(ext_idx) = Self::find_extended(&mbr) {
            let ext_start = mbr.partitions[ext_idx].start;
            let mut offset = ext_start;
            loop {
                let buf = disk.read_at(offset as u64, Ebr::SIZE)?;
                let ebr = Ebr::decode(&buf)?;
                if !ebr.is_free() && ebr.name_str() == name {
                    if mode == DeleteMode::Full {
                        disk.zero_fill(ebr.start as u64, ebr.size as u64)?;
                    }
                    return Self::unlink_logical(disk, ext_start, offset);
                }
                if ebr.next < 0 {
                    break;
                }
                offset = ebr.next;
            }
        }

        Err(Error::not_found(format!("partition {name} not found")))
    }

    /// Grows or shrinks a primary or extended partition in place. Growth
    /// requires the immediately following space to be free and contiguous.
    /// Falls back to searching the EBR chain for a matching logical
    /// partition if no primary/extended slot matches.
    pub fn resize(disk: &mut Disk, name: &str, new_size: i64) -> Result<()> {
        if new_size <= 0 {
            return Err(Error::validation("partition size must be positive"));
        }
        let mut mbr = Self::read_mbr(disk)?;
        let gaps = Self::primary_gaps(&mbr);
        if let Some(slot) = mbr
            .partitions
            .iter_mut()
            .find(|p| !p.is_free() && p.name_str() == name)
        {
            if new_size < slot.size {
                slot.size = new_size;
                return Self::write_mbr(disk, &mbr);
            }
            let growth = new_size - slot.size;
            let after_end = slot.start + slot.size;
            let contiguous = gaps.iter().any(|g| g.start == after_end && g.size >= growth);
            if !contiguous {
                return Err(Error::capacity(
                    "growth requires contiguous free space immediately after the partition",
                ));
            }
            slot.size = new_size;
            return Self::write_mbr(disk, &mbr);
        }

        let ext_idx = Self::find_extended(&mbr)
            .ok_or_else(|| Error::not_found(format!("partition {name} not found")))?;
        let (ext_start, ext_size) = (mbr.partitions[ext_idx].start, mbr.partitions[ext_idx].size);
        let ebr_gaps = Self::ebr_gaps(disk, ext_start, ext_size)?;

        let mut offset = ext_start;
        loop {
            let buf = disk.read_at(offset as u64, Ebr::SIZE)?;
            let mut ebr = Ebr::decode(&buf)?;
            if !ebr.is_free() && ebr.name_str() == name {
                if new_size < ebr.size {
                    ebr.size = new_size;
                    return disk.write_at(offset as u64, &ebr.encode());
                }
                let growth = new_size - ebr.size;
                let after_end = ebr.start + ebr.size;
                let contiguous = ebr_gaps.iter().any(|g| g.start == after_end && g.size >= growth);
                if !contiguous {
                    return Err(Error::capacity(
                        "growth requires contiguous free space immediately after the logical partition",
                    ));
                }
                ebr.size = new_size;
                return disk.write_at(offset as u64, &ebr.encode());
            }
            if ebr.next < 0 {
                break;
            }
            offset = ebr.next;
        }

        Err(Error::not_found(format!("partition {name} not found")))
    }

    /// Finds a non-extended, non-free partition slot by name, for `mount`'s
    /// use. Returns an error for an extended partition: it cannot be
    /// mounted itself, only its logicals can.
    fn locate_mountable(mbr: &Mbr, name: &str) -> Result<usize> {
        let idx = mbr
            .partitions
            .iter()
            .position(|p| !p.is_free() && p.name_str() == name)
            .ok_or_else(|| Error::not_found(format!("partition {name} not found")))?;
        if mbr.partitions[idx].part_type == PartitionType::Extended {
            return Err(Error::validation("cannot mount an extended partition directly"));
        }
        Ok(idx)
    }

    /// Reads the partition's `start`/`size` and current `mount_id`, refusing
    /// an extended partition. Logical partitions are not addressable here;
    /// mounting is only offered for primary partitions, matching the base
    /// MBR-only mount model.
    pub fn locate(disk: &mut Disk, name: &str) -> Result<(i64, i64, String)> {
        let mbr = Self::read_mbr(disk)?;
        let idx = Self::locate_mountable(&mbr, name)?;
        let slot = &mbr.partitions[idx];
        let end = slot.mount_id.iter().position(|&b| b == 0).unwrap_or(4);
        Ok((slot.start, slot.size, String::from_utf8_lossy(&slot.mount_id[..end]).into_owned()))
    }

    /// Writes `mount_id` into the named partition's MBR slot.
    pub fn set_mount_id(disk: &mut Disk, name: &str, mount_id: &str) -> Result<()> {
        let mut mbr = Self::read_mbr(disk)?;
        let idx = Self::locate_mountable(&mbr, name)?;
        let mut bytes = [0u8; 4];
        let src = mount_id.as_bytes();
        let n = src.len().min(4);
        bytes[..n].copy_from_slice(&src[..n]);
        mbr.partitions[idx].mount_id = bytes;
        Self::write_mbr(disk, &mbr)
    }

    /// Clears the named partition's on-disk mount id.
    pub fn clear_mount_id(disk: &mut Disk, name: &str) -> Result<()> {
        let mut mbr = Self::read_mbr(disk)?;
        let idx = Self::locate_mountable(&mbr, name)?;
        mbr.partitions[idx].mount_id = [0u8; 4];
        Self::write_mbr(disk, &mbr)
    }
}

/// `Fast` only updates bookkeeping (MBR/EBR slots); `Full` additionally
/// zero-fills the deleted partition's data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    Fast,
    Full,
}

#[cfg(test)]
mod test {
    use super::*;
    use std::env::temp_dir;
    use std::path::PathBuf;

    fn tmp_path(name: &str) -> PathBuf {
        let mut p = temp_dir();
        p.push(format!("vfdisk-part-test-{}-{}", std::process::id(), name));
        p
    }

    #[test]
    fn create_and_list_primary() {
        let path = tmp_path("primary");
        let mut disk = Disk::create(&path, 1_000_000).unwrap();
        PartitionEngine::init_disk(&mut disk, 1, Fit::First).unwrap();
        PartitionEngine::create_primary(&mut disk, "p1", 10_000, Fit::First).unwrap();
        let list = PartitionEngine::list(&mut disk).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "p1");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn duplicate_name_is_conflict() {
        let path = tmp_path("dup");
        let mut disk = Disk::create(&path, 1_000_000).unwrap();
        PartitionEngine::init_disk(&mut disk, 1, Fit::First).unwrap();
        PartitionEngine::create_primary(&mut disk, "p1", 10_000, Fit::First).unwrap();
        let err = PartitionEngine::create_primary(&mut disk, "p1", 10_000, Fit::First).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn logical_partitions_chain() {
        let path = tmp_path("logical");
        let mut disk = Disk::create(&path, 1_000_000).unwrap();
        PartitionEngine::init_disk(&mut disk, 1, Fit::First).unwrap();
        PartitionEngine::create_extended(&mut disk, "ext", 500_000, Fit::First).unwrap();
        PartitionEngine::create_logical(&mut disk, "l1", 10_000, Fit::First).unwrap();
        PartitionEngine::create_logical(&mut disk, "l2", 10_000, Fit::First).unwrap();
        let list = PartitionEngine::list(&mut disk).unwrap();
        let logicals: Vec<_> = list.iter().filter(|p| p.logical).collect();
        assert_eq!(logicals.len(), 2);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn resize_requires_contiguous_growth() {
        let path = tmp_path("resize");
        let mut disk = Disk::create(&path, 1_000_000).unwrap();
        PartitionEngine::init_disk(&mut disk, 1, Fit::First).unwrap();
        PartitionEngine::create_primary(&mut disk, "p1", 10_000, Fit::First).unwrap();
        PartitionEngine::create_primary(&mut disk, "p2", 10_000, Fit::First).unwrap();
        let err = PartitionEngine::resize(&mut disk, "p1", 50_000).unwrap_err();
        assert!(matches!(err, Error::Capacity(_)));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn delete_primary_frees_slot() {
        let path = tmp_path("delete");
        let mut disk = Disk::create(&path, 1_000_000).unwrap();
        PartitionEngine::init_disk(&mut disk, 1, Fit::First).unwrap();
        PartitionEngine::create_primary(&mut disk, "p1", 10_000, Fit::First).unwrap();
        PartitionEngine::delete(&mut disk, "p1", DeleteMode::Fast).unwrap();
        assert_eq!(PartitionEngine::list(&mut disk).unwrap().len(), 0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn delete_full_zero_fills_payload() {
        let path = tmp_path("delete-full");
        let mut disk = Disk::create(&path, 1_000_000).unwrap();
        PartitionEngine::init_disk(&mut disk, 1, Fit::First).unwrap();
        PartitionEngine::create_primary(&mut disk, "p1", 10_000, Fit::First).unwrap();
        let list = PartitionEngine::list(&mut disk).unwrap();
        let start = list[0].start;
        disk.write_at(start as u64, &[0xFFu8; 16]).unwrap();
        PartitionEngine::delete(&mut disk, "p1", DeleteMode::Full).unwrap();
        let payload = disk.read_at(start as u64, 16).unwrap();
        assert_eq!(payload, vec![0u8; 16]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn delete_extended_removes_its_logicals() {
        let path = tmp_path("delete-ext");
        let mut disk = Disk::create(&path, 1_000_000).unwrap();
        PartitionEngine::init_disk(&mut disk, 1, Fit::First).unwrap();
        PartitionEngine::create_extended(&mut disk, "ext", 500_000, Fit::First).unwrap();
        PartitionEngine::create_logical(&mut disk, "l1", 10_000, Fit::First).unwrap();
        PartitionEngine::create_logical(&mut disk, "l2", 10_000, Fit::First).unwrap();
        PartitionEngine::delete(&mut disk, "ext", DeleteMode::Fast).unwrap();
        assert_eq!(PartitionEngine::list(&mut disk).unwrap().len(), 0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn resize_logical_partition_shrinks() {
        let path = tmp_path("resize-logical");
        let mut disk = Disk::create(&path, 1_000_000).unwrap();
        PartitionEngine::init_disk(&mut disk, 1, Fit::First).unwrap();
        PartitionEngine::create_extended(&mut disk, "ext", 500_000, Fit::First).unwrap();
        PartitionEngine::create_logical(&mut disk, "l1", 10_000, Fit::First).unwrap();
        PartitionEngine::resize(&mut disk, "l1", 5_000).unwrap();
        let list = PartitionEngine::list(&mut disk).unwrap();
        let l1 = list.iter().find(|p| p.name == "l1").unwrap();
        assert_eq!(l1.size, 5_000);
        std::fs::remove_file(&path).ok();
    }
}
