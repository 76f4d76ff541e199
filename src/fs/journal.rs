//! FS3 journaling: a fixed number of fixed-size entries living right after
//! the superblock. `recovery` replays survivable state from the journal and
//! the inode graph; `loss` simulates catastrophic bitmap/table damage.

use crate::disk::Disk;
use crate::error::{Error, Result};
use crate::fs::bitmap;
use crate::fs::inode::{Inode, DIRECT_POINTERS};
use crate::fs::superblock::Superblock;

const OP_LEN: usize = 10;
const PATH_LEN: usize = 32;
const CONTENT_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Sequence count; 0 means this slot is unused.
    pub count: i32,
    pub operation: String,
    pub path: String,
    pub content: String,
    pub timestamp: f64,
}

impl JournalEntry {
    pub const SIZE: usize = 4 + OP_LEN + PATH_LEN + CONTENT_LEN + 8;

    fn pack(s: &str, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        let bytes = s.as_bytes();
        let n = bytes.len().min(len);
        out[..n].copy_from_slice(&bytes[..n]);
        out
    }

    fn unpack(buf: &[u8]) -> String {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        String::from_utf8_lossy(&buf[..end]).into_owned()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.count.to_be_bytes());
        out.extend(Self::pack(&self.operation, OP_LEN));
        out.extend(Self::pack(&self.path, PATH_LEN));
        out.extend(Self::pack(&self.content, CONTENT_LEN));
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::integrity("journal entry buffer too short"));
        }
        let mut off = 0;
        let count = i32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let operation = Self::unpack(&buf[off..off + OP_LEN]);
        off += OP_LEN;
        let path = Self::unpack(&buf[off..off + PATH_LEN]);
        off += PATH_LEN;
        let content = Self::unpack(&buf[off..off + CONTENT_LEN]);
        off += CONTENT_LEN;
        let timestamp = f64::from_be_bytes(buf[off..off + 8].try_into().unwrap());
        Ok(Self {
            count,
            operation,
            path,
            content,
            timestamp,
        })
    }

    pub fn unused() -> Self {
        Self {
            count: 0,
            operation: String::new(),
            path: String::new(),
            content: String::new(),
            timestamp: 0.0,
        }
    }
}

/// Byte offset of the journal area, right after the superblock.
fn journal_offset(partition_start: i64) -> i64 {
    partition_start + Superblock::SIZE as i64
}

/// Appends an entry into the first unused journal slot.
pub fn append(
    disk: &mut Disk,
    partition_start: i64,
    journal_slots: i32,
    operation: &str,
    path: &str,
    content: &str,
) -> Result<()> {
    let base = journal_offset(partition_start);
    for i in 0..journal_slots {
        let offset = base + i as i64 * JournalEntry::SIZE as i64;
        let buf = disk.read_at(offset as u64, JournalEntry::SIZE)?;
        let entry = JournalEntry::decode(&buf)?;
        if entry.count == 0 {
            let new_entry = JournalEntry {
                count: i + 1,
                operation: operation.to_string(),
                path: path.to_string(),
                content: content.to_string(),
                timestamp: crate::util::timestamp_f64(),
            };
            disk.write_at(offset as u64, &new_entry.encode())?;
            return Ok(());
        }
    }
    Err(Error::capacity("journal is full"))
}

pub fn read_all(disk: &mut Disk, partition_start: i64, journal_slots: i32) -> Result<Vec<JournalEntry>> {
    let base = journal_offset(partition_start);
    let mut out = Vec::new();
    for i in 0..journal_slots {
        let offset = base + i as i64 * JournalEntry::SIZE as i64;
        let buf = disk.read_at(offset as u64, JournalEntry::SIZE)?;
        let entry = JournalEntry::decode(&buf)?;
        if entry.count != 0 {
            out.push(entry);
        }
    }
    Ok(out)
}

/// Renders the journal as a minimal HTML report, suitable for a caller to
/// write to a file or serve as-is.
pub fn report_html(entries: &[JournalEntry]) -> String {
    let mut html = String::from("<html><body><table border=\"1\">\n");
    html.push_str("<tr><th>#</th><th>op</th><th>path</th><th>content</th><th>time</th></tr>\n");
    for e in entries {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            e.count, e.operation, e.path, e.content, e.timestamp
        ));
    }
    html.push_str("</table></body></html>\n");
    html
}

/// Zero-fills both bitmaps and both tables, preserving the superblock and
/// journal area.
pub fn loss(disk: &mut Disk, sb: &Superblock) -> Result<()> {
    let bm_inode_len = bitmap::byte_len(sb.inodes_count) as u64;
    let bm_block_len = bitmap::byte_len(sb.blocks_count) as u64;
    let inode_table_len = sb.inodes_count as u64 * sb.inode_size as u64;
    let block_table_len = sb.blocks_count as u64 * sb.block_size as u64;

    disk.zero_fill(sb.bm_inode_start as u64, bm_inode_len)?;
    disk.zero_fill(sb.bm_block_start as u64, bm_block_len)?;
    disk.zero_fill(sb.inode_start as u64, inode_table_len)?;
    disk.zero_fill(sb.block_start as u64, block_table_len)?;

    let mut new_sb = sb.clone();
    new_sb.umtime = crate::util::timestamp();
    disk.write_at(0, &new_sb.encode())?;
    Ok(())
}

/// Rebuilds both bitmaps and recomputes free counts / first-free hints by
/// scanning every inode index in the table, not just the ones reachable from
/// the root: a mutation that allocated an inode but failed before linking it
/// into a directory must still come back marked used, or a later allocation
/// would hand it out a second time and corrupt whatever the failed mutation
/// left behind.
pub fn recovery(disk: &mut Disk, partition_start: i64, sb: &Superblock) -> Result<Superblock> {
    if sb.fs_type != crate::fs::superblock::FS3 {
        return Err(Error::validation("recovery requires an FS3 partition"));
    }

    let mut bm_inode = vec![0u8; bitmap::byte_len(sb.inodes_count)];
    let mut bm_block = vec![0u8; bitmap::byte_len(sb.blocks_count)];

    for idx in 0..sb.inodes_count {
        let offset = sb.inode_start as i64 + idx as i64 * sb.inode_size as i64;
        let buf = disk.read_at(offset as u64, crate::fs::inode::Inode::SIZE)?;
        let inode = Inode::decode(&buf)?;
        let has_block = inode.block.iter().take(DIRECT_POINTERS).any(|&b| b >= 0);
        if inode.is_free() && inode.size <= 0 && !has_block {
            continue;
        }
        bitmap::set(&mut bm_inode, idx, true);
        for &blk in inode.block.iter().take(DIRECT_POINTERS) {
            if blk >= 0 && blk < sb.blocks_count {
                bitmap::set(&mut bm_block, blk, true);
            }
        }
    }

    disk.write_at(sb.bm_inode_start as u64, &bm_inode)?;
    disk.write_at(sb.bm_block_start as u64, &bm_block)?;

    let used_inodes = (0..sb.inodes_count).filter(|&i| bitmap::get(&bm_inode, i)).count() as i32;
    let used_blocks = (0..sb.blocks_count).filter(|&i| bitmap::get(&bm_block, i)).count() as i32;

    let mut new_sb = sb.clone();
    new_sb.free_inodes_count = sb.inodes_count - used_inodes;
    new_sb.free_blocks_count = sb.blocks_count - used_blocks;
    new_sb.first_ino = bitmap::first_free(&bm_inode, sb.inodes_count).unwrap_or(sb.inodes_count);
    new_sb.first_blo = bitmap::first_free(&bm_block, sb.blocks_count).unwrap_or(sb.blocks_count);
    new_sb.umtime = crate::util::timestamp();
    disk.write_at(partition_start as u64, &new_sb.encode())?;
    Ok(new_sb)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn entry_roundtrip() {
        let e = JournalEntry {
            count: 1,
            operation: "mkfile".to_string(),
            path: "/a/b.txt".to_string(),
            content: "hi".to_string(),
            timestamp: 123.5,
        };
        let encoded = e.encode();
        assert_eq!(encoded.len(), JournalEntry::SIZE);
        let decoded = JournalEntry::decode(&encoded).unwrap();
        assert_eq!(e, decoded);
    }

    #[test]
    fn recovery_marks_unlinked_inode_used() {
        use crate::fs::format;
        use crate::fs::inode::TYPE_FILE;
        use crate::fs::superblock::FS3;
        use std::env::temp_dir;

        let mut path = temp_dir();
        path.push(format!("vfdisk-journal-test-{}-recovery", std::process::id()));
        let mut disk = Disk::create(&path, 300_000).unwrap();
        let layout = format::format(&mut disk, 0, 300_000, FS3).unwrap();
        let mut fs = crate::fs::Filesystem {
            partition_start: 0,
            sb: layout.sb,
        };

        // A mutation that allocated an inode and a block but crashed before
        // linking the inode into any directory: never reachable from root,
        // but its on-disk record is still a live file.
        let orphan_idx = fs.alloc_inode(&mut disk).unwrap();
        let orphan_blk = fs.alloc_block(&mut disk).unwrap();
        let mut orphan = Inode::free();
        orphan.inode_type = TYPE_FILE;
        orphan.uid = 1;
        orphan.gid = 1;
        orphan.perm = 664;
        orphan.size = 5;
        orphan.block[0] = orphan_blk;
        fs.write_inode(&mut disk, orphan_idx, &orphan).unwrap();

        // Corrupt just the bitmaps, as if the crash happened before the
        // bookkeeping step that would have set these bits.
        let bm_inode_len = bitmap::byte_len(fs.sb.inodes_count) as u64;
        let bm_block_len = bitmap::byte_len(fs.sb.blocks_count) as u64;
        disk.zero_fill(fs.sb.bm_inode_start as u64, bm_inode_len).unwrap();
        disk.zero_fill(fs.sb.bm_block_start as u64, bm_block_len).unwrap();

        let new_sb = recovery(&mut disk, 0, &fs.sb).unwrap();

        let bm_inode = disk
            .read_at(new_sb.bm_inode_start as u64, bitmap::byte_len(new_sb.inodes_count))
            .unwrap();
        let bm_block = disk
            .read_at(new_sb.bm_block_start as u64, bitmap::byte_len(new_sb.blocks_count))
            .unwrap();
        assert!(bitmap::get(&bm_inode, orphan_idx));
        assert!(bitmap::get(&bm_block, orphan_blk));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn report_contains_entries() {
        let entries = vec![JournalEntry {
            count: 1,
            operation: "mkdir".to_string(),
            path: "/x".to_string(),
            content: String::new(),
            timestamp: 1.0,
        }];
        let html = report_html(&entries);
        assert!(html.contains("mkdir"));
        assert!(html.contains("/x"));
    }
}
