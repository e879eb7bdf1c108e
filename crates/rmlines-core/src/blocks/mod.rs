//! Top-level blocks of a scene file and their (de)serialisation.

mod decoder;
mod encoder;

pub use decoder::BlockIterator;
pub use encoder::{write_block, write_blocks};

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::crdt_id::{CrdtId, LwwValue};
use crate::crdt_sequence::CrdtSequenceItem;
use crate::scene_items::{Group, SceneItem, Text};

/// Wire codes of the block types.
pub(crate) mod block_type {
    pub const MIGRATION_INFO: u8 = 0x00;
    pub const SCENE_TREE: u8 = 0x01;
    pub const TREE_NODE: u8 = 0x02;
    pub const SCENE_GLYPH_ITEM: u8 = 0x03;
    pub const SCENE_GROUP_ITEM: u8 = 0x04;
    pub const SCENE_LINE_ITEM: u8 = 0x05;
    pub const SCENE_TEXT_ITEM: u8 = 0x06;
    pub const ROOT_TEXT: u8 = 0x07;
    pub const SCENE_TOMBSTONE_ITEM: u8 = 0x08;
    pub const AUTHOR_IDS: u8 = 0x09;
    pub const PAGE_INFO: u8 = 0x0a;
    pub const SCENE_INFO: u8 = 0x0d;
}

/// Options for the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Point encoding emitted for line blocks: 1 or 2.
    pub line_version: u8,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { line_version: 2 }
    }
}

/// Maps author ids used in CRDT ids to device UUIDs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorIdsBlock {
    pub author_uuids: BTreeMap<u16, Uuid>,
}

/// Records how the document was migrated between firmware versions.
/// The `unknown` flag is an undocumented pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationInfoBlock {
    pub migration_id: CrdtId,
    pub is_device: bool,
    pub unknown: Option<bool>,
}

/// Page bookkeeping counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageInfoBlock {
    pub loads_count: u32,
    pub merges_count: u32,
    pub text_chars_count: u32,
    pub text_lines_count: u32,
    pub type_folio_use_count: u32,
}

/// Declares a group node and its parent edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneTreeBlock {
    pub tree_id: CrdtId,
    pub node_id: CrdtId,
    pub is_update: bool,
    pub parent_id: CrdtId,
}

/// Carries a group's LWW registers. The group's children are not part
/// of this block; they arrive as scene item blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNodeBlock {
    pub group: Group,
}

/// Document-level display state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneInfoBlock {
    pub current_layer: LwwValue<CrdtId>,
    pub background_visible: Option<LwwValue<bool>>,
    pub root_document_visible: Option<LwwValue<bool>>,
    pub paper_size: Option<(u32, u32)>,
}

/// A CRDT sequence entry of some parent group: a stroke, a highlight,
/// a group reference, or a tombstone.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneItemBlock {
    pub parent_id: CrdtId,
    pub item: CrdtSequenceItem<SceneItem>,
}

/// The page's root text.
#[derive(Debug, Clone, PartialEq)]
pub struct RootTextBlock {
    pub block_id: CrdtId,
    pub value: Text,
}

/// A block whose payload could not be decoded, preserved as raw bytes
/// so the stream round-trips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableBlock {
    pub block_type: u8,
    pub min_version: u8,
    pub current_version: u8,
    pub error: String,
    pub data: Vec<u8>,
}

/// A decoded top-level block.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    MigrationInfo(MigrationInfoBlock),
    SceneTree(SceneTreeBlock),
    TreeNode(TreeNodeBlock),
    SceneGlyphItem(SceneItemBlock),
    SceneGroupItem(SceneItemBlock),
    SceneLineItem(SceneItemBlock),
    SceneTextItem(SceneItemBlock),
    RootText(RootTextBlock),
    SceneTombstoneItem(SceneItemBlock),
    AuthorIds(AuthorIdsBlock),
    PageInfo(PageInfoBlock),
    SceneInfo(SceneInfoBlock),
    Unreadable(UnreadableBlock),
}

impl Block {
    /// The wire code this block is framed with.
    pub fn block_type(&self) -> u8 {
        match self {
            Block::MigrationInfo(_) => block_type::MIGRATION_INFO,
            Block::SceneTree(_) => block_type::SCENE_TREE,
            Block::TreeNode(_) => block_type::TREE_NODE,
            Block::SceneGlyphItem(_) => block_type::SCENE_GLYPH_ITEM,
            Block::SceneGroupItem(_) => block_type::SCENE_GROUP_ITEM,
            Block::SceneLineItem(_) => block_type::SCENE_LINE_ITEM,
            Block::SceneTextItem(_) => block_type::SCENE_TEXT_ITEM,
            Block::RootText(_) => block_type::ROOT_TEXT,
            Block::SceneTombstoneItem(_) => block_type::SCENE_TOMBSTONE_ITEM,
            Block::AuthorIds(_) => block_type::AUTHOR_IDS,
            Block::PageInfo(_) => block_type::PAGE_INFO,
            Block::SceneInfo(_) => block_type::SCENE_INFO,
            Block::Unreadable(b) => b.block_type,
        }
    }

    /// The `(min_version, current_version)` pair written with this
    /// block. Only line blocks vary: their current version selects the
    /// point encoding.
    pub(crate) fn version_info(&self, options: &WriteOptions) -> (u8, u8) {
        match self {
            Block::SceneLineItem(_) => (1, options.line_version),
            Block::Unreadable(b) => (b.min_version, b.current_version),
            _ => (1, 1),
        }
    }
}
