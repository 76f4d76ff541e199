//! Directory and file blocks. Both occupy exactly `BLOCK_SIZE` (272) bytes
//! so either can live behind any direct block pointer.

use crate::error::{Error, Result};
use crate::fs::superblock::BLOCK_SIZE;

pub const NAME_MAX: usize = 64;
pub const ENTRIES_PER_BLOCK: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; NAME_MAX],
    /// Inode index, or -1 if this slot is free.
    pub inode: i32,
}

impl DirEntry {
    pub const SIZE: usize = NAME_MAX + 4;

    pub fn free() -> Self {
        Self {
            name: [0u8; NAME_MAX],
            inode: -1,
        }
    }

    pub fn is_free(&self) -> bool {
        self.inode < 0
    }

    pub fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let bytes = name.as_bytes();
        if bytes.len() > NAME_MAX {
            return Err(Error::validation(format!("name {name} too long")));
        }
        self.name = [0u8; NAME_MAX];
        self.name[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..NAME_MAX].copy_from_slice(&self.name);
        out[NAME_MAX..].copy_from_slice(&self.inode.to_be_bytes());
        out
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::integrity("dir entry buffer too short"));
        }
        let mut name = [0u8; NAME_MAX];
        name.copy_from_slice(&buf[..NAME_MAX]);
        let inode = i32::from_be_bytes(buf[NAME_MAX..Self::SIZE].try_into().unwrap());
        Ok(Self { name, inode })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirBlock {
    pub entries: [DirEntry; ENTRIES_PER_BLOCK],
}

impl DirBlock {
    pub fn empty() -> Self {
        Self {
            entries: std::array::from_fn(|_| DirEntry::free()),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BLOCK_SIZE as usize);
        for e in &self.entries {
            out.extend_from_slice(&e.encode());
        }
        out.resize(BLOCK_SIZE as usize, 0);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < BLOCK_SIZE as usize {
            return Err(Error::integrity("dir block buffer too short"));
        }
        let mut entries = std::array::from_fn(|_| DirEntry::free());
        let mut off = 0;
        for e in entries.iter_mut() {
            *e = DirEntry::decode(&buf[off..off + DirEntry::SIZE])?;
            off += DirEntry::SIZE;
        }
        Ok(Self { entries })
    }

    pub fn find(&self, name: &str) -> Option<i32> {
        self.entries
            .iter()
            .find(|e| !e.is_free() && e.name_str() == name)
            .map(|e| e.inode)
    }

    pub fn free_slot(&self) -> Option<usize> {
        self.entries.iter().position(|e| e.is_free())
    }
}

/// A file block's raw payload: up to `BLOCK_SIZE` bytes of file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlock {
    pub data: Vec<u8>,
}

impl FileBlock {
    pub fn from_content(content: &[u8]) -> Self {
        let mut data = content.to_vec();
        data.resize(BLOCK_SIZE as usize, 0);
        Self { data }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        out.resize(BLOCK_SIZE as usize, 0);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < BLOCK_SIZE as usize {
            return Err(Error::integrity("file block buffer too short"));
        }
        Ok(Self {
            data: buf[..BLOCK_SIZE as usize].to_vec(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dir_block_roundtrip() {
        let mut block = DirBlock::empty();
        block.entries[0].set_name(".").unwrap();
        block.entries[0].inode = 0;
        block.entries[1].set_name("..").unwrap();
        block.entries[1].inode = 0;
        let encoded = block.encode();
        assert_eq!(encoded.len(), BLOCK_SIZE as usize);
        let decoded = DirBlock::decode(&encoded).unwrap();
        assert_eq!(decoded.find("."), Some(0));
        assert_eq!(decoded.find("nope"), None);
    }

    #[test]
    fn file_block_roundtrip() {
        let block = FileBlock::from_content(b"hello world");
        let encoded = block.encode();
        let decoded = FileBlock::decode(&encoded).unwrap();
        assert!(decoded.data.starts_with(b"hello world"));
    }
}
