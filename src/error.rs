//! Error taxonomy shared by every component of the virtual filesystem.
//!
//! The categories mirror the failure classes a caller needs to branch on:
//! a malformed request (`Validation`), a missing name (`NotFound`), a name
//! collision (`Conflict`), exhausted space (`Capacity`), an unauthorized
//! actor (`Permission`), on-disk corruption (`Integrity`) and failures of the
//! underlying disk image itself (`Io`).

use std::fmt;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("capacity exceeded: {0}")]
    Capacity(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("disk i/o: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn validation(msg: impl fmt::Display) -> Self {
        Error::Validation(msg.to_string())
    }

    pub fn not_found(msg: impl fmt::Display) -> Self {
        Error::NotFound(msg.to_string())
    }

    pub fn conflict(msg: impl fmt::Display) -> Self {
        Error::Conflict(msg.to_string())
    }

    pub fn capacity(msg: impl fmt::Display) -> Self {
        Error::Capacity(msg.to_string())
    }

    pub fn permission(msg: impl fmt::Display) -> Self {
        Error::Permission(msg.to_string())
    }

    pub fn integrity(msg: impl fmt::Display) -> Self {
        Error::Integrity(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
