//! Reader and writer for reMarkable v6 `.lines` scene files.
//!
//! A scene file is a tagged, self-describing binary container whose
//! payload is a concurrent document: strokes, groups, highlights and
//! rich text assembled as CRDT sequences. This crate provides the
//! tagged block codec, the scene-item schema, and the scene tree that
//! rebuilds the document's logical structure, including the
//! topological ordering of concurrently authored items.
//!
//! The core performs no I/O: readers consume a byte slice, writers
//! return owned bytes.
//!
//! ```
//! use rmlines_core::{read_tree, simple_text_document, write_blocks, WriteOptions};
//! use uuid::Uuid;
//!
//! let blocks = simple_text_document("hi", Uuid::nil()).unwrap();
//! let bytes = write_blocks(&blocks, &WriteOptions::default()).unwrap();
//! let tree = read_tree(&bytes).unwrap();
//! assert!(tree.root_text.is_some());
//! ```

pub mod blocks;
pub mod crdt_id;
pub mod crdt_sequence;
pub mod error;
pub mod scene_items;
pub mod scene_tree;
pub mod tagged;
pub mod text;

use std::collections::BTreeMap;

use uuid::Uuid;

pub use blocks::{
    AuthorIdsBlock, Block, BlockIterator, MigrationInfoBlock, PageInfoBlock, RootTextBlock,
    SceneInfoBlock, SceneItemBlock, SceneTreeBlock, TreeNodeBlock, UnreadableBlock, WriteOptions,
    write_blocks,
};
pub use crdt_id::{CrdtId, LwwValue};
pub use crdt_sequence::{CrdtSequence, CrdtSequenceItem, ItemPayload};
pub use error::SceneError;
pub use scene_items::{
    GlyphRange, Group, Line, ParagraphStyle, Pen, PenColor, Point, Rectangle, SceneItem, Text,
    TextItem,
};
pub use scene_tree::{SceneTree, SceneWalk};
pub use tagged::{TagType, TaggedBlockReader, TaggedBlockWriter, FILE_HEADER_V6};
pub use text::{expand_text_items, simple_text_document, Paragraph, TextDocument};

/// Opens a scene file: checks the header and returns an iterator over
/// its blocks.
pub fn read_blocks(data: &[u8]) -> Result<BlockIterator<'_>, SceneError> {
    let mut reader = TaggedBlockReader::new(data);
    reader.read_header()?;
    Ok(BlockIterator::new(reader))
}

/// Reads a scene file and rebuilds its scene tree.
pub fn read_tree(data: &[u8]) -> Result<SceneTree, SceneError> {
    let blocks: Result<Vec<Block>, SceneError> = read_blocks(data)?.collect();
    SceneTree::from_blocks(blocks?)
}

/// Serialises a scene tree into a complete scene file.
pub fn write_tree(
    tree: &SceneTree,
    authors: &BTreeMap<u16, Uuid>,
    options: &WriteOptions,
) -> Result<Vec<u8>, SceneError> {
    let blocks = tree.to_blocks(authors)?;
    write_blocks(&blocks, options)
}

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
