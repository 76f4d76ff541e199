//! A user-space virtual filesystem hosted inside a single disk-image file:
//! MBR/EBR partitioning, an ext2/ext3-inspired on-disk filesystem with
//! journaling and crash recovery, and a plain-text users/groups layer with
//! UNIX-like permissions.

pub mod alloc;
pub mod disk;
pub mod ebr;
pub mod error;
pub mod fs;
pub mod mbr;
pub mod mount;
pub mod partition;
pub mod session;
pub mod users;
pub mod util;

pub use error::{Error, Result};
