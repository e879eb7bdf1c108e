//! Little-endian binary buffer primitives.
//!
//! [`Reader`] is a bounds-checked cursor over a borrowed byte slice;
//! [`Writer`] owns a growable buffer. Both speak the wire primitives of
//! the scene file format: little-endian integers and floats, and the
//! unsigned LEB128 varuint.

mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;

use thiserror::Error;

/// Errors produced by the buffer layer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// A read would cross the end of the buffer. The cursor does not
    /// advance when this is returned.
    #[error("unexpected end of buffer")]
    EndOfBuffer,
    /// String bytes were not valid UTF-8.
    #[error("invalid utf-8 in buffer")]
    InvalidUtf8,
    /// A varuint kept continuing past 64 bits of payload.
    #[error("varuint does not fit in 64 bits")]
    VaruintOverflow,
    /// A seek target was outside the written region.
    #[error("seek position {0} out of bounds")]
    SeekOutOfBounds(usize),
}
