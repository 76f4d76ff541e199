//! Master Boot Record: the fixed header at the start of a disk image,
//! holding up to four partition slots. All fields are little-endian.

use crate::error::{Error, Result};

pub const PARTITION_COUNT: usize = 4;
pub const NAME_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    First,
    Best,
    Worst,
}

impl Fit {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Fit::First => b'F',
            Fit::Best => b'B',
            Fit::Worst => b'W',
        }
    }

    pub(crate) fn from_byte(b: u8) -> Result<Self> {
        match b {
            b'F' => Ok(Fit::First),
            b'B' => Ok(Fit::Best),
            b'W' => Ok(Fit::Worst),
            _ => Err(Error::integrity(format!("unknown fit byte {b:#x}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionType {
    Primary,
    Extended,
}

impl PartitionType {
    fn to_byte(self) -> u8 {
        match self {
            PartitionType::Primary => b'P',
            PartitionType::Extended => b'E',
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            b'P' => Ok(PartitionType::Primary),
            b'E' => Ok(PartitionType::Extended),
            _ => Err(Error::integrity(format!("unknown partition type byte {b:#x}"))),
        }
    }
}

/// A single MBR partition slot. `status == 0` means the slot is free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSlot {
    pub status: u8,
    pub part_type: PartitionType,
    pub fit: Fit,
    pub start: i64,
    pub size: i64,
    pub name: [u8; NAME_LEN],
    pub correlative: i64,
    pub mount_id: [u8; 4],
}

impl PartitionSlot {
    pub const SIZE: usize = 1 + 1 + 1 + 8 + 8 + NAME_LEN + 8 + 4;

    pub fn empty() -> Self {
        Self {
            status: 0,
            part_type: PartitionType::Primary,
            fit: Fit::First,
            start: -1,
            size: 0,
            name: [0u8; NAME_LEN],
            correlative: -1,
            mount_id: [0u8; 4],
        }
    }

    pub fn is_free(&self) -> bool {
        self.status == 0
    }

    pub fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = [0u8; NAME_LEN];
        let bytes = name.as_bytes();
        let n = bytes.len().min(NAME_LEN);
        self.name[..n].copy_from_slice(&bytes[..n]);
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut off = 0;
        out[off] = self.status;
        off += 1;
        out[off] = self.part_type.to_byte();
        off += 1;
        out[off] = self.fit.to_byte();
        off += 1;
        out[off..off + 8].copy_from_slice(&self.start.to_le_bytes());
        off += 8;
        out[off..off + 8].copy_from_slice(&self.size.to_le_bytes());
        off += 8;
        out[off..off + NAME_LEN].copy_from_slice(&self.name);
        off += NAME_LEN;
        out[off..off + 8].copy_from_slice(&self.correlative.to_le_bytes());
        off += 8;
        out[off..off + 4].copy_from_slice(&self.mount_id);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::integrity("partition slot buffer too short"));
        }
        let mut off = 0;
        let status = buf[off];
        off += 1;
        let part_type = if status == 0 {
            PartitionType::Primary
        } else {
            PartitionType::from_byte(buf[off])?
        };
        off += 1;
        let fit = if status == 0 { Fit::First } else { Fit::from_byte(buf[off])? };
        off += 1;
        let start = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let size = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&buf[off..off + NAME_LEN]);
        off += NAME_LEN;
        let correlative = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let mut mount_id = [0u8; 4];
        mount_id.copy_from_slice(&buf[off..off + 4]);
        Ok(Self {
            status,
            part_type,
            fit,
            start,
            size,
            name,
            correlative,
            mount_id,
        })
    }
}

/// The fixed-size MBR header itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mbr {
    pub disk_size: i64,
    pub creation_time: i64,
    pub signature: i64,
    pub fit: Fit,
    pub partitions: [PartitionSlot; PARTITION_COUNT],
}

impl Mbr {
    pub const SIZE: usize = 8 + 8 + 8 + 1 + PartitionSlot::SIZE * PARTITION_COUNT;

    pub fn new(disk_size: i64, signature: i64, fit: Fit) -> Self {
        Self {
            disk_size,
            creation_time: crate::util::timestamp(),
            signature,
            fit,
            partitions: std::array::from_fn(|_| PartitionSlot::empty()),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.disk_size.to_le_bytes());
        out.extend_from_slice(&self.creation_time.to_le_bytes());
        out.extend_from_slice(&self.signature.to_le_bytes());
        out.push(self.fit.to_byte());
        for p in &self.partitions {
            out.extend_from_slice(&p.encode());
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(Error::integrity("mbr buffer too short"));
        }
        let mut off = 0;
        let disk_size = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let creation_time = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let signature = i64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let fit = Fit::from_byte(buf[off])?;
        off += 1;
        let mut partitions = std::array::from_fn(|_| PartitionSlot::empty());
        for p in partitions.iter_mut() {
            *p = PartitionSlot::decode(&buf[off..off + PartitionSlot::SIZE])?;
            off += PartitionSlot::SIZE;
        }
        Ok(Self {
            disk_size,
            creation_time,
            signature,
            fit,
            partitions,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mbr_roundtrip() {
        let mut mbr = Mbr::new(4096, 12345, Fit::Best);
        mbr.partitions[0].status = b'1';
        mbr.partitions[0].start = 150;
        mbr.partitions[0].size = 1024;
        mbr.partitions[0].set_name("part1");
        let encoded = mbr.encode();
        let decoded = Mbr::decode(&encoded).unwrap();
        assert_eq!(mbr, decoded);
        assert_eq!(decoded.partitions[0].name_str(), "part1");
    }

    #[test]
    fn empty_slot_is_free() {
        let slot = PartitionSlot::empty();
        assert!(slot.is_free());
    }
}
