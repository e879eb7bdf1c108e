use rmlines_buffers::BufferError;
use thiserror::Error;

use crate::crdt_id::CrdtId;

/// Errors surfaced by the scene codec and the tree builder.
///
/// Inside a block, most of these are recovered from by capturing the
/// payload as an [`UnreadableBlock`](crate::blocks::UnreadableBlock);
/// outside a block they abort the stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The 43-byte file header did not match.
    #[error("not a reMarkable v6 .lines file")]
    BadHeader,

    /// A read crossed the end of the input.
    #[error("unexpected end of input")]
    EndOfInput,

    /// A tag's field index or wire type did not match what the grammar
    /// expected. The cursor is restored to before the tag.
    #[error(
        "expected tag index {expected_index} type {expected_type:#x}, \
         found index {found_index} type {found_type:#x}"
    )]
    UnexpectedTag {
        expected_index: u8,
        expected_type: u8,
        found_index: u8,
        found_type: u8,
    },

    /// More bytes were consumed than a block or sub-block declared.
    #[error("read {pos} bytes past declared end {end}")]
    BlockOverflow { end: usize, pos: usize },

    /// A block envelope was malformed or a block was started inside
    /// another block.
    #[error("unexpected block: {0}")]
    UnexpectedBlock(&'static str),

    /// A value violated the wire grammar (non-ASCII string flag, bad
    /// magic byte, unknown discriminator, ...).
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// The left/right relation of a CRDT sequence contains a cycle.
    #[error("crdt sequence order contains a cycle")]
    CyclicOrder,

    /// An unrecognised tool code in a line block.
    #[error("unknown pen tool code {0}")]
    UnknownPen(u32),

    /// An unrecognised colour code.
    #[error("unknown pen colour code {0}")]
    UnknownColor(u32),

    /// An item with this id is already present in the sequence.
    #[error("duplicate crdt sequence item {0}")]
    DuplicateItem(CrdtId),

    /// A scene item referenced a parent group that does not exist.
    #[error("parent group {0} missing from scene tree")]
    ParentMissing(CrdtId),
}

impl From<BufferError> for SceneError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::EndOfBuffer | BufferError::SeekOutOfBounds(_) => SceneError::EndOfInput,
            BufferError::InvalidUtf8 => {
                SceneError::InvalidEncoding("string bytes are not valid utf-8".into())
            }
            BufferError::VaruintOverflow => {
                SceneError::InvalidEncoding("varuint does not fit in 64 bits".into())
            }
        }
    }
}
