//! Filesystem core: superblock-backed inode/block allocation over a
//! formatted partition. The directory/file-level operations built on top of
//! this live in [`ops`].

pub mod bitmap;
pub mod block;
pub mod format;
pub mod inode;
pub mod journal;
pub mod ops;
pub mod path;
pub mod perm;
pub mod superblock;

use crate::disk::Disk;
use crate::error::{Error, Result};
use inode::Inode;
use superblock::Superblock;

pub struct Filesystem {
    pub partition_start: i64,
    pub sb: Superblock,
}

impl Filesystem {
    pub fn open(disk: &mut Disk, partition_start: i64) -> Result<Self> {
        let buf = disk.read_at(partition_start as u64, Superblock::SIZE)?;
        let sb = Superblock::decode(&buf)?;
        Ok(Self { partition_start, sb })
    }

    fn flush_sb(&self, disk: &mut Disk) -> Result<()> {
        disk.write_at(self.partition_start as u64, &self.sb.encode())
    }

    /// Number of journal slots reserved between the superblock and the
    /// inode bitmap; 0 on an FS2 partition.
    pub fn journal_slot_count(&self) -> i32 {
        let area = self.sb.bm_inode_start as i64 - self.partition_start - Superblock::SIZE as i64;
        if area <= 0 {
            0
        } else {
            (area / journal::JournalEntry::SIZE as i64) as i32
        }
    }

    /// Appends a journal entry describing a mutating operation, a no-op on
    /// FS2 partitions. Fails with `Error::Capacity` if the journal is full.
    pub fn log(&self, disk: &mut Disk, operation: &str, path: &str, content: &str) -> Result<()> {
        if self.sb.fs_type != superblock::FS3 {
            return Ok(());
        }
        journal::append(
            disk,
            self.partition_start,
            self.journal_slot_count(),
            operation,
            path,
            content,
        )
    }

    fn read_bitmap(&self, disk: &mut Disk, start: i32, count: i32) -> Result<Vec<u8>> {
        disk.read_at(start as u64, bitmap::byte_len(count))
    }

    fn write_bitmap(&self, disk: &mut Disk, start: i32, bm: &[u8]) -> Result<()> {
        disk.write_at(start as u64, bm)
    }

    pub fn read_inode(&self, disk: &mut Disk, idx: i32) -> Result<Inode> {
        if idx < 0 || idx >= self.sb.inodes_count {
            return Err(Error::not_found(format!("inode {idx} out of range")));
        }
        let off = self.sb.inode_start as i64 + idx as i64 * self.sb.inode_size as i64;
        let buf = disk.read_at(off as u64, Inode::SIZE)?;
        Inode::decode(&buf)
    }

    pub fn write_inode(&self, disk: &mut Disk, idx: i32, inode: &Inode) -> Result<()> {
        let off = self.sb.inode_start as i64 + idx as i64 * self.sb.inode_size as i64;
        disk.write_at(off as u64, &inode.encode())
    }

    pub fn read_block(&self, disk: &mut Disk, idx: i32) -> Result<Vec<u8>> {
        if idx < 0 || idx >= self.sb.blocks_count {
            return Err(Error::not_found(format!("block {idx} out of range")));
        }
        let off = self.sb.block_start as i64 + idx as i64 * self.sb.block_size as i64;
        disk.read_at(off as u64, self.sb.block_size as usize)
    }

    pub fn write_block(&self, disk: &mut Disk, idx: i32, data: &[u8]) -> Result<()> {
        let off = self.sb.block_start as i64 + idx as i64 * self.sb.block_size as i64;
        let mut padded = data.to_vec();
        padded.resize(self.sb.block_size as usize, 0);
        disk.write_at(off as u64, &padded)
    }

    pub fn alloc_inode(&mut self, disk: &mut Disk) -> Result<i32> {
        let mut bm = self.read_bitmap(disk, self.sb.bm_inode_start, self.sb.inodes_count)?;
        let idx = bitmap::first_free(&bm, self.sb.inodes_count)
            .ok_or_else(|| Error::capacity("no free inodes"))?;
        bitmap::set(&mut bm, idx, true);
        self.write_bitmap(disk, self.sb.bm_inode_start, &bm)?;
        self.sb.free_inodes_count -= 1;
        self.sb.first_ino = bitmap::first_free(&bm, self.sb.inodes_count).unwrap_or(self.sb.inodes_count);
        self.flush_sb(disk)?;
        Ok(idx)
    }

    pub fn alloc_block(&mut self, disk: &mut Disk) -> Result<i32> {
        let mut bm = self.read_bitmap(disk, self.sb.bm_block_start, self.sb.blocks_count)?;
        let idx = bitmap::first_free(&bm, self.sb.blocks_count)
            .ok_or_else(|| Error::capacity("no free blocks"))?;
        bitmap::set(&mut bm, idx, true);
        self.write_bitmap(disk, self.sb.bm_block_start, &bm)?;
        self.sb.free_blocks_count -= 1;
        self.sb.first_blo = bitmap::first_free(&bm, self.sb.blocks_count).unwrap_or(self.sb.blocks_count);
        self.flush_sb(disk)?;
        self.write_block(disk, idx, &[])?;
        Ok(idx)
    }

    pub fn free_inode(&mut self, disk: &mut Disk, idx: i32) -> Result<()> {
        let mut bm = self.read_bitmap(disk, self.sb.bm_inode_start, self.sb.inodes_count)?;
        bitmap::set(&mut bm, idx, false);
        self.write_bitmap(disk, self.sb.bm_inode_start, &bm)?;
        self.write_inode(disk, idx, &Inode::free())?;
        self.sb.free_inodes_count += 1;
        self.sb.first_ino = self.sb.first_ino.min(idx);
        self.flush_sb(disk)
    }

    pub fn free_block(&mut self, disk: &mut Disk, idx: i32) -> Result<()> {
        let mut bm = self.read_bitmap(disk, self.sb.bm_block_start, self.sb.blocks_count)?;
        bitmap::set(&mut bm, idx, false);
        self.write_bitmap(disk, self.sb.bm_block_start, &bm)?;
        self.sb.free_blocks_count += 1;
        self.sb.first_blo = self.sb.first_blo.min(idx);
        self.flush_sb(disk)
    }
}
