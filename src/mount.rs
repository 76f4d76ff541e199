//! Process-wide mount registry: tracks which partitions are currently
//! mounted and hands out mount IDs of the form `<prefix><partition
//! number><disk letter>`.
//!
//! This is an explicit, owned struct rather than a global — callers create
//! one `MountRegistry` per session and pass it to every command that needs
//! it, matching the rest of this crate's "no hidden statics" design.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::partition::PartitionEngine;

#[derive(Debug, Clone)]
pub struct Mount {
    pub id: String,
    pub disk_path: PathBuf,
    pub partition_name: String,
    pub start: i64,
    pub size: i64,
}

pub struct MountRegistry {
    /// Two-character prefix composed into every mount ID (see spec note on
    /// the student-code field this replaces).
    id_prefix: String,
    mounts: HashMap<String, Mount>,
    /// Disk path -> assigned letter, in first-mounted-gets-`A` order.
    disk_letters: HashMap<PathBuf, char>,
    next_letter: char,
    /// Disk path -> next partition number to hand out for that disk.
    partition_counters: HashMap<PathBuf, u32>,
}

impl MountRegistry {
    pub fn new(id_prefix: impl Into<String>) -> Self {
        Self {
            id_prefix: id_prefix.into(),
            mounts: HashMap::new(),
            disk_letters: HashMap::new(),
            next_letter: 'A',
            partition_counters: HashMap::new(),
        }
    }

    fn letter_for(&mut self, disk_path: &PathBuf) -> Result<char> {
        if let Some(&c) = self.disk_letters.get(disk_path) {
            return Ok(c);
        }
        if self.next_letter > 'Z' {
            return Err(Error::capacity("no more disk letters available"));
        }
        let c = self.next_letter;
        self.disk_letters.insert(disk_path.clone(), c);
        self.next_letter = ((self.next_letter as u8) + 1) as char;
        Ok(c)
    }

    fn next_partition_number(&mut self, disk_path: &PathBuf) -> u32 {
        let counter = self.partition_counters.entry(disk_path.clone()).or_insert(1);
        let n = *counter;
        *counter += 1;
        n
    }

    /// Mounts `partition_name` on `disk_path`, reading its start/size from
    /// the on-disk MBR and writing the freshly assigned mount id back into
    /// the partition's `mount_id` field. Refuses an already-mounted
    /// partition and an extended partition (only `PartitionEngine::locate`
    /// exposes mountable slots).
    pub fn mount(&mut self, disk: &mut Disk, disk_path: PathBuf, partition_name: &str) -> Result<String> {
        if self
            .mounts
            .values()
            .any(|m| m.disk_path == disk_path && m.partition_name == partition_name)
        {
            return Err(Error::conflict(format!(
                "{partition_name} on {} is already mounted",
                disk_path.display()
            )));
        }
        let (start, size, existing_mount_id) = PartitionEngine::locate(disk, partition_name)?;
        if !existing_mount_id.is_empty() {
            return Err(Error::conflict(format!(
                "{partition_name} on {} is already mounted",
                disk_path.display()
            )));
        }

        let letter = self.letter_for(&disk_path)?;
        let number = self.next_partition_number(&disk_path);
        let id = format!("{}{}{}", self.id_prefix, number, letter);
        PartitionEngine::set_mount_id(disk, partition_name, &id)?;
        self.mounts.insert(
            id.clone(),
            Mount {
                id: id.clone(),
                disk_path,
                partition_name: partition_name.to_string(),
                start,
                size,
            },
        );
        Ok(id)
    }

    /// Unmounts `id`, clearing its on-disk `mount_id` field.
    pub fn unmount(&mut self, disk: &mut Disk, id: &str) -> Result<()> {
        let mount = self
            .mounts
            .get(id)
            .ok_or_else(|| Error::not_found(format!("mount id {id} not found")))?;
        PartitionEngine::clear_mount_id(disk, &mount.partition_name)?;
        self.mounts.remove(id);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Mount> {
        self.mounts
            .get(id)
            .ok_or_else(|| Error::not_found(format!("mount id {id} not found")))
    }

    pub fn list(&self) -> impl Iterator<Item = &Mount> {
        self.mounts.values()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mbr::Fit;
    use std::env::temp_dir;

    fn tmp_disk(name: &str) -> (Disk, PathBuf) {
        let mut path = temp_dir();
        path.push(format!("vfdisk-mount-test-{}-{}", std::process::id(), name));
        let mut disk = Disk::create(&path, 1_000_000).unwrap();
        PartitionEngine::init_disk(&mut disk, 1, Fit::First).unwrap();
        (disk, path)
    }

    #[test]
    fn first_disk_gets_letter_a() {
        let (mut disk, path) = tmp_disk("a");
        PartitionEngine::create_primary(&mut disk, "p1", 10_000, Fit::First).unwrap();
        let mut reg = MountRegistry::new("99");
        let id = reg.mount(&mut disk, path.clone(), "p1").unwrap();
        assert_eq!(id, "991A");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn second_disk_gets_letter_b() {
        let (mut disk1, path1) = tmp_disk("b1");
        let (mut disk2, path2) = tmp_disk("b2");
        PartitionEngine::create_primary(&mut disk1, "p1", 10_000, Fit::First).unwrap();
        PartitionEngine::create_primary(&mut disk2, "p1", 10_000, Fit::First).unwrap();
        let mut reg = MountRegistry::new("99");
        reg.mount(&mut disk1, path1.clone(), "p1").unwrap();
        let id2 = reg.mount(&mut disk2, path2.clone(), "p1").unwrap();
        assert_eq!(id2, "991B");
        std::fs::remove_file(&path1).ok();
        std::fs::remove_file(&path2).ok();
    }

    #[test]
    fn partition_numbers_increase_per_disk() {
        let (mut disk, path) = tmp_disk("c");
        PartitionEngine::create_primary(&mut disk, "p1", 10_000, Fit::First).unwrap();
        PartitionEngine::create_primary(&mut disk, "p2", 10_000, Fit::First).unwrap();
        let mut reg = MountRegistry::new("99");
        reg.mount(&mut disk, path.clone(), "p1").unwrap();
        let id2 = reg.mount(&mut disk, path.clone(), "p2").unwrap();
        assert_eq!(id2, "992A");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn double_mount_is_conflict() {
        let (mut disk, path) = tmp_disk("d");
        PartitionEngine::create_primary(&mut disk, "p1", 10_000, Fit::First).unwrap();
        let mut reg = MountRegistry::new("99");
        reg.mount(&mut disk, path.clone(), "p1").unwrap();
        let err = reg.mount(&mut disk, path.clone(), "p1").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unmount_then_remount_ok() {
        let (mut disk, path) = tmp_disk("e");
        PartitionEngine::create_primary(&mut disk, "p1", 10_000, Fit::First).unwrap();
        let mut reg = MountRegistry::new("99");
        let id = reg.mount(&mut disk, path.clone(), "p1").unwrap();
        reg.unmount(&mut disk, &id).unwrap();
        reg.mount(&mut disk, path.clone(), "p1").unwrap();
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn mounting_extended_partition_is_rejected() {
        let (mut disk, path) = tmp_disk("f");
        PartitionEngine::create_extended(&mut disk, "ext", 500_000, Fit::First).unwrap();
        let mut reg = MountRegistry::new("99");
        let err = reg.mount(&mut disk, path.clone(), "ext").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        std::fs::remove_file(&path).ok();
    }
}
