//! `mkfs`: lays out and bootstraps a fresh FS2/FS3 filesystem inside an
//! already-created partition.

use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::fs::bitmap;
use crate::fs::block::DirBlock;
use crate::fs::inode::{Inode, TYPE_DIR, TYPE_FILE};
use crate::fs::journal::JournalEntry;
use crate::fs::superblock::{Superblock, BLOCK_SIZE, FS3, MAGIC, ROOT_INODE, USERS_INODE};
use crate::users::SEED_USERS_FILE;

/// Root and `users.txt` take the first two inode/block slots; a formatted
/// partition must have room for at least one more of each, so `n` must be
/// strictly greater than 2.
const MIN_STRUCTURES: i32 = 2;

pub struct Layout {
    pub inodes_count: i32,
    pub blocks_count: i32,
    pub journal_slots: i32,
    pub sb: Superblock,
}

/// Computes a layout for `partition_size` bytes starting at `partition_start`
/// and writes it out, bootstrapping the root directory and `users.txt`.
pub fn format(
    disk: &mut Disk,
    partition_start: i64,
    partition_size: i64,
    fs_type: i32,
) -> Result<Layout> {
    if fs_type != crate::fs::superblock::FS2 && fs_type != FS3 {
        return Err(Error::validation("fs_type must be 2 or 3"));
    }

    let size_superblock = Superblock::SIZE as i64;
    let size_inode = Inode::SIZE as i64;
    let size_block = BLOCK_SIZE as i64;
    let size_journal = JournalEntry::SIZE as i64;

    let structure_unit = if fs_type == FS3 {
        size_journal + size_inode + 3 * size_block
    } else {
        size_inode + 3 * size_block
    };

    let available = partition_size - size_superblock;
    if available <= 0 {
        return Err(Error::capacity("partition too small for a superblock"));
    }
    let mut n = (available / structure_unit) as i32;

    // The structure-unit estimate above budgets 3 blocks per inode as
    // headroom but does not account for the two bitmaps, whose combined
    // size grows with n. Shrink n until the real layout actually fits.
    let real_total = |n: i32| -> i64 {
        let bm = bitmap::byte_len(n) as i64;
        let journal = if fs_type == FS3 { n as i64 * size_journal } else { 0 };
        size_superblock + journal + 2 * bm + n as i64 * size_inode + n as i64 * size_block
    };
    while n > 0 && real_total(n) > partition_size {
        n -= 1;
    }
    if n <= MIN_STRUCTURES {
        return Err(Error::capacity(
            "partition too small to hold a usable filesystem",
        ));
    }

    let journal_slots = if fs_type == FS3 { n } else { 0 };
    let bm_inode_start = partition_start + size_superblock + journal_slots as i64 * size_journal;
    let bm_len = bitmap::byte_len(n) as i64;
    let bm_block_start = bm_inode_start + bm_len;
    let inode_start = bm_block_start + bm_len;
    let block_start = inode_start + n as i64 * size_inode;

    let mut sb = Superblock {
        fs_type,
        inodes_count: n,
        blocks_count: n,
        free_blocks_count: n,
        free_inodes_count: n,
        mtime: crate::util::timestamp(),
        umtime: 0,
        mnt_count: 0,
        magic: MAGIC,
        inode_size: Inode::SIZE as i32,
        block_size: BLOCK_SIZE,
        first_ino: 0,
        first_blo: 0,
        bm_inode_start: bm_inode_start as i32,
        bm_block_start: bm_block_start as i32,
        inode_start: inode_start as i32,
        block_start: block_start as i32,
    };

    // Zero the whole region up front so unused slots read back as free.
    disk.zero_fill(bm_inode_start as u64, bm_len as u64)?;
    disk.zero_fill(bm_block_start as u64, bm_len as u64)?;
    disk.zero_fill(inode_start as u64, n as u64 * size_inode as u64)?;
    disk.zero_fill(block_start as u64, n as u64 * size_block as u64)?;
    if fs_type == FS3 {
        for i in 0..journal_slots {
            let off = partition_start + size_superblock + i as i64 * size_journal;
            disk.write_at(off as u64, &JournalEntry::unused().encode())?;
        }
    }

    let now = crate::util::timestamp();

    let mut root = Inode::free();
    root.uid = 1;
    root.gid = 1;
    root.inode_type = TYPE_DIR;
    root.perm = 664;
    root.atime = now;
    root.ctime = now;
    root.mtime = now;
    root.block[0] = 0;
    root.size = crate::fs::superblock::BLOCK_SIZE;

    let seed = SEED_USERS_FILE.as_bytes();
    let mut users_inode = Inode::free();
    users_inode.uid = 1;
    users_inode.gid = 1;
    users_inode.inode_type = TYPE_FILE;
    users_inode.perm = 664;
    users_inode.atime = now;
    users_inode.ctime = now;
    users_inode.mtime = now;
    users_inode.block[0] = 1;
    users_inode.size = seed.len() as i32;

    disk.write_at(
        (inode_start + ROOT_INODE as i64 * size_inode) as u64,
        &root.encode(),
    )?;
    disk.write_at(
        (inode_start + USERS_INODE as i64 * size_inode) as u64,
        &users_inode.encode(),
    )?;

    let mut root_dir = DirBlock::empty();
    root_dir.entries[0].set_name(".")?;
    root_dir.entries[0].inode = ROOT_INODE;
    root_dir.entries[1].set_name("..")?;
    root_dir.entries[1].inode = ROOT_INODE;
    root_dir.entries[2].set_name("users.txt")?;
    root_dir.entries[2].inode = USERS_INODE;
    disk.write_at(block_start as u64, &root_dir.encode())?;

    let mut users_block = vec![0u8; BLOCK_SIZE as usize];
    let n_seed = seed.len().min(BLOCK_SIZE as usize);
    users_block[..n_seed].copy_from_slice(&seed[..n_seed]);
    disk.write_at((block_start + size_block) as u64, &users_block)?;

    let mut bm_inode = vec![0u8; bm_len as usize];
    bitmap::set(&mut bm_inode, 0, true);
    bitmap::set(&mut bm_inode, 1, true);
    disk.write_at(bm_inode_start as u64, &bm_inode)?;

    let mut bm_block = vec![0u8; bm_len as usize];
    bitmap::set(&mut bm_block, 0, true);
    bitmap::set(&mut bm_block, 1, true);
    disk.write_at(bm_block_start as u64, &bm_block)?;

    sb.free_inodes_count = n - 2;
    sb.free_blocks_count = n - 2;
    sb.first_ino = 2;
    sb.first_blo = 2;
    disk.write_at(partition_start as u64, &sb.encode())?;

    Ok(Layout {
        inodes_count: n,
        blocks_count: n,
        journal_slots,
        sb,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::env::temp_dir;
    use std::path::PathBuf;

    fn tmp_path(name: &str) -> PathBuf {
        let mut p = temp_dir();
        p.push(format!("vfdisk-format-test-{}-{}", std::process::id(), name));
        p
    }

    #[test]
    fn format_fs3_bootstraps_root_and_users() {
        let path = tmp_path("fs3");
        let mut disk = Disk::create(&path, 200_000).unwrap();
        let layout = format(&mut disk, 0, 200_000, FS3).unwrap();
        assert!(layout.inodes_count > MIN_STRUCTURES);
        assert_eq!(layout.sb.free_inodes_count, layout.inodes_count - 2);

        let root_buf = disk
            .read_at(layout.sb.inode_start as u64, Inode::SIZE)
            .unwrap();
        let root = Inode::decode(&root_buf).unwrap();
        assert!(root.is_dir());

        let dir_buf = disk
            .read_at(layout.sb.block_start as u64, BLOCK_SIZE as usize)
            .unwrap();
        let dir = DirBlock::decode(&dir_buf).unwrap();
        assert_eq!(dir.find("users.txt"), Some(USERS_INODE));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn too_small_partition_rejected() {
        let path = tmp_path("tiny");
        let mut disk = Disk::create(&path, 256).unwrap();
        let err = format(&mut disk, 0, 256, FS3).unwrap_err();
        assert!(matches!(err, Error::Capacity(_)));
        std::fs::remove_file(&path).ok();
    }
}
