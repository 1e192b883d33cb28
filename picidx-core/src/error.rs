//! Typed errors for the bucket pool and signature/duplicate pipeline.
//!
//! Hand-rolled `std::error::Error` impls rather than `thiserror`, matching
//! the teacher's own `ErrnoError` pattern (see `src/bcachefs.rs` in the
//! reference repo this crate grew out of).

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum PoolError {
    /// Structural corruption: bad magic, bad backlink, missing trailer,
    /// misaligned offset. Carries the byte offset at which it was detected.
    Corrupt { msg: &'static str, pos: u64 },
    Io(io::Error),
    /// A create() was attempted while another writer is still open.
    WriterBusy,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Corrupt { msg, pos } => {
                write!(f, "object pool corrupted: {} (pos={:#x})", msg, pos)
            }
            PoolError::Io(e) => write!(f, "i/o error: {}", e),
            PoolError::WriterBusy => write!(f, "a bucket writer is already open"),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PoolError {
    fn from(e: io::Error) -> Self {
        PoolError::Io(e)
    }
}

#[derive(Debug)]
pub enum SignatureError {
    /// Image smaller than the minimum 4x4 block size.
    TooSmall { cols: u32, rows: u32 },
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureError::TooSmall { cols, rows } => {
                write!(f, "image too small for a signature: {}x{}", cols, rows)
            }
        }
    }
}

impl std::error::Error for SignatureError {}

#[derive(Debug)]
pub enum DupError {
    CacheFull,
}

impl fmt::Display for DupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DupError::CacheFull => write!(f, "buffer too small"),
        }
    }
}

impl std::error::Error for DupError {}
