//! Block-level decoding: dispatches on the block type and composes
//! tagged reads into domain objects.

use std::collections::BTreeMap;

use uuid::Uuid;

use super::block_type;
use super::{
    AuthorIdsBlock, Block, MigrationInfoBlock, PageInfoBlock, RootTextBlock, SceneInfoBlock,
    SceneItemBlock, SceneTreeBlock, TreeNodeBlock, UnreadableBlock,
};
use crate::crdt_id::{CrdtId, LwwValue};
use crate::crdt_sequence::{CrdtSequence, CrdtSequenceItem, ItemPayload};
use crate::error::SceneError;
use crate::scene_items::{
    GlyphRange, Group, Line, ParagraphStyle, Pen, PenColor, Point, Rectangle, SceneItem, Text,
    TextItem,
};
use crate::tagged::{BlockHeader, TaggedBlockReader};

/// Iterates the blocks of a scene stream.
///
/// Failures inside a block's payload are downgraded to
/// [`Block::Unreadable`] values carrying the raw bytes; failures of the
/// envelope itself (truncation, nonzero reserved byte, overflow) end
/// the iteration with an error.
pub struct BlockIterator<'a> {
    reader: TaggedBlockReader<'a>,
    done: bool,
}

impl<'a> BlockIterator<'a> {
    pub(crate) fn new(reader: TaggedBlockReader<'a>) -> Self {
        Self {
            reader,
            done: false,
        }
    }
}

impl Iterator for BlockIterator<'_> {
    type Item = Result<Block, SceneError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let header = match self.reader.read_block_header() {
            Ok(Some(header)) => header,
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };
        match read_block(&mut self.reader, &header) {
            Ok(block) => Some(Ok(block)),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Decodes the active block, downgrading payload errors to
/// [`Block::Unreadable`]. Sub-block overflow stays fatal.
fn read_block(reader: &mut TaggedBlockReader, header: &BlockHeader) -> Result<Block, SceneError> {
    match read_block_body(reader, header) {
        Ok(block) => {
            reader.end_block()?;
            Ok(block)
        }
        Err(err @ SceneError::BlockOverflow { .. }) => Err(err),
        Err(err) => {
            tracing::debug!(
                block_type = header.block_type,
                error = %err,
                "capturing unreadable block"
            );
            let data = reader.capture_block()?;
            Ok(Block::Unreadable(UnreadableBlock {
                block_type: header.block_type,
                min_version: header.min_version,
                current_version: header.current_version,
                error: err.to_string(),
                data,
            }))
        }
    }
}

/// Highest block schema version this reader understands.
const READER_VERSION: u8 = 2;

fn read_block_body(
    reader: &mut TaggedBlockReader,
    header: &BlockHeader,
) -> Result<Block, SceneError> {
    if header.min_version > READER_VERSION {
        return Err(SceneError::InvalidEncoding(format!(
            "block requires reader version {}, this reader supports {READER_VERSION}",
            header.min_version
        )));
    }
    Ok(match header.block_type {
        block_type::MIGRATION_INFO => Block::MigrationInfo(read_migration_info(reader)?),
        block_type::SCENE_TREE => Block::SceneTree(read_scene_tree(reader)?),
        block_type::TREE_NODE => Block::TreeNode(read_tree_node(reader)?),
        block_type::SCENE_GLYPH_ITEM => Block::SceneGlyphItem(read_item_block(
            reader,
            block_type::SCENE_GLYPH_ITEM,
            |r| Ok(SceneItem::GlyphRange(read_glyph_range(r)?)),
        )?),
        block_type::SCENE_GROUP_ITEM => Block::SceneGroupItem(read_item_block(
            reader,
            block_type::SCENE_GROUP_ITEM,
            |r| Ok(SceneItem::Group(r.read_id(2)?)),
        )?),
        block_type::SCENE_LINE_ITEM => {
            let version = header.current_version;
            Block::SceneLineItem(read_item_block(reader, block_type::SCENE_LINE_ITEM, |r| {
                Ok(SceneItem::Line(read_line(r, version)?))
            })?)
        }
        block_type::SCENE_TEXT_ITEM => {
            Block::SceneTextItem(read_valueless_item_block(reader, block_type::SCENE_TEXT_ITEM)?)
        }
        block_type::SCENE_TOMBSTONE_ITEM => Block::SceneTombstoneItem(read_valueless_item_block(
            reader,
            block_type::SCENE_TOMBSTONE_ITEM,
        )?),
        block_type::ROOT_TEXT => Block::RootText(read_root_text(reader)?),
        block_type::AUTHOR_IDS => Block::AuthorIds(read_author_ids(reader)?),
        block_type::PAGE_INFO => Block::PageInfo(read_page_info(reader)?),
        block_type::SCENE_INFO => Block::SceneInfo(read_scene_info(reader)?),
        other => {
            return Err(SceneError::InvalidEncoding(format!(
                "unknown block type {other:#04x}"
            )))
        }
    })
}

fn read_author_ids(reader: &mut TaggedBlockReader) -> Result<AuthorIdsBlock, SceneError> {
    let count = reader.data.varuint()?;
    let mut author_uuids = BTreeMap::new();
    for _ in 0..count {
        let scope = reader.subblock(0)?;
        let uuid_length = reader.data.varuint()? as usize;
        if uuid_length != 16 {
            return Err(SceneError::InvalidEncoding(format!(
                "author uuid length {uuid_length}, expected 16"
            )));
        }
        let mut raw = [0u8; 16];
        raw.copy_from_slice(reader.data.bytes(16)?);
        let author_id = reader.data.u16()?;
        reader.end_subblock(&scope)?;
        author_uuids.insert(author_id, Uuid::from_bytes_le(raw));
    }
    Ok(AuthorIdsBlock { author_uuids })
}

fn read_migration_info(reader: &mut TaggedBlockReader) -> Result<MigrationInfoBlock, SceneError> {
    let migration_id = reader.read_id(1)?;
    let is_device = reader.read_bool(2)?;
    let unknown = reader.optional(|r| r.read_bool(3))?;
    Ok(MigrationInfoBlock {
        migration_id,
        is_device,
        unknown,
    })
}

fn read_page_info(reader: &mut TaggedBlockReader) -> Result<PageInfoBlock, SceneError> {
    let loads_count = reader.read_u32(1)?;
    let merges_count = reader.read_u32(2)?;
    let text_chars_count = reader.read_u32(3)?;
    let text_lines_count = reader.read_u32(4)?;
    let type_folio_use_count = reader.optional(|r| r.read_u32(5))?.unwrap_or(0);
    Ok(PageInfoBlock {
        loads_count,
        merges_count,
        text_chars_count,
        text_lines_count,
        type_folio_use_count,
    })
}

fn read_scene_tree(reader: &mut TaggedBlockReader) -> Result<SceneTreeBlock, SceneError> {
    let tree_id = reader.read_id(1)?;
    let node_id = reader.read_id(2)?;
    let is_update = reader.read_bool(3)?;
    let scope = reader.subblock(4)?;
    let parent_id = reader.read_id(1)?;
    reader.end_subblock(&scope)?;
    Ok(SceneTreeBlock {
        tree_id,
        node_id,
        is_update,
        parent_id,
    })
}

fn read_tree_node(reader: &mut TaggedBlockReader) -> Result<TreeNodeBlock, SceneError> {
    let node_id = reader.read_id(1)?;
    let mut group = Group::new(node_id);
    group.label = reader.read_lww_string(2)?;
    group.visible = reader.read_lww_bool(3)?;
    // The anchor registers travel as a quartet: presence is keyed on
    // the block carrying more bytes.
    if reader.remaining_in_block() > 0 {
        group.anchor_id = Some(reader.read_lww_id(7)?);
        group.anchor_type = Some(reader.read_lww_u8(8)?);
        group.anchor_threshold = Some(reader.read_lww_f32(9)?);
        group.anchor_origin_x = Some(reader.read_lww_f32(10)?);
    }
    Ok(TreeNodeBlock { group })
}

fn read_scene_info(reader: &mut TaggedBlockReader) -> Result<SceneInfoBlock, SceneError> {
    let current_layer = reader.read_lww_id(1)?;
    let background_visible = reader.optional(|r| r.read_lww_bool(2))?;
    let root_document_visible = reader.optional(|r| r.read_lww_bool(3))?;
    let paper_size = if reader.has_subblock(5) {
        let scope = reader.subblock(5)?;
        let width = reader.data.u32()?;
        let height = reader.data.u32()?;
        reader.end_subblock(&scope)?;
        Some((width, height))
    } else {
        None
    };
    Ok(SceneInfoBlock {
        current_layer,
        background_visible,
        root_document_visible,
        paper_size,
    })
}

/// Common prefix and value sub-block of the scene item block family.
fn read_item_block(
    reader: &mut TaggedBlockReader,
    discriminator: u8,
    read_value: impl FnOnce(&mut TaggedBlockReader) -> Result<SceneItem, SceneError>,
) -> Result<SceneItemBlock, SceneError> {
    let parent_id = reader.read_id(1)?;
    let item_id = reader.read_id(2)?;
    let left_id = reader.read_id(3)?;
    let right_id = reader.read_id(4)?;
    let deleted_length = reader.read_u32(5)?;
    let payload = if reader.has_subblock(6) {
        let scope = reader.subblock(6)?;
        check_discriminator(reader, discriminator)?;
        let value = read_value(reader)?;
        reader.end_subblock(&scope)?;
        ItemPayload::Value(value)
    } else {
        ItemPayload::Tombstone {
            length: deleted_length,
        }
    };
    Ok(SceneItemBlock {
        parent_id,
        item: CrdtSequenceItem {
            item_id,
            left_id,
            right_id,
            payload,
        },
    })
}

/// Item blocks that never carry a value: tombstones and scene text
/// placeholders. Their sub-block, when present, holds only the
/// discriminator.
fn read_valueless_item_block(
    reader: &mut TaggedBlockReader,
    discriminator: u8,
) -> Result<SceneItemBlock, SceneError> {
    let parent_id = reader.read_id(1)?;
    let item_id = reader.read_id(2)?;
    let left_id = reader.read_id(3)?;
    let right_id = reader.read_id(4)?;
    let deleted_length = reader.read_u32(5)?;
    if reader.has_subblock(6) {
        let scope = reader.subblock(6)?;
        check_discriminator(reader, discriminator)?;
        reader.end_subblock(&scope)?;
    }
    Ok(SceneItemBlock {
        parent_id,
        item: CrdtSequenceItem {
            item_id,
            left_id,
            right_id,
            payload: ItemPayload::Tombstone {
                length: deleted_length,
            },
        },
    })
}

fn check_discriminator(reader: &mut TaggedBlockReader, expected: u8) -> Result<(), SceneError> {
    let found = reader.data.u8()?;
    if found != expected {
        return Err(SceneError::InvalidEncoding(format!(
            "item discriminator {found:#04x} does not match block type {expected:#04x}"
        )));
    }
    Ok(())
}

fn read_line(reader: &mut TaggedBlockReader, version: u8) -> Result<Line, SceneError> {
    let tool = Pen::from_u32(reader.read_u32(1)?)?;
    let color = PenColor::from_u32(reader.read_u32(2)?)?;
    let thickness_scale = reader.read_f64(3)?;
    let starting_length = reader.read_f32(4)?;

    let scope = reader.subblock(5)?;
    let point_size = point_size_for(version)?;
    if scope.length % point_size != 0 {
        return Err(SceneError::InvalidEncoding(format!(
            "point data of {} bytes is not a multiple of the {point_size}-byte point",
            scope.length
        )));
    }
    let count = scope.length / point_size;
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        points.push(read_point(reader, version)?);
    }
    reader.end_subblock(&scope)?;

    // Stroke timestamp, not preserved in the model.
    let _timestamp = reader.read_id(6)?;
    let move_id = if reader.remaining_in_block() >= 3 {
        reader.optional(|r| r.read_id(7))?
    } else {
        None
    };
    Ok(Line {
        color,
        tool,
        points,
        thickness_scale,
        starting_length,
        move_id,
    })
}

pub(super) fn point_size_for(version: u8) -> Result<usize, SceneError> {
    match version {
        1 => Ok(24),
        2 => Ok(14),
        other => Err(SceneError::InvalidEncoding(format!(
            "unsupported line block version {other}"
        ))),
    }
}

fn read_point(reader: &mut TaggedBlockReader, version: u8) -> Result<Point, SceneError> {
    let x = reader.data.f32()?;
    let y = reader.data.f32()?;
    if version == 1 {
        let speed = reader.data.f32()? * 4.0;
        let direction = 255.0 / std::f32::consts::TAU * reader.data.f32()?;
        let width = reader.data.f32()? * 4.0;
        let pressure = reader.data.f32()? * 255.0;
        Ok(Point {
            x,
            y,
            speed: speed.round() as u16,
            direction: direction.round() as u8,
            width: width.round() as u16,
            pressure: pressure.round() as u8,
        })
    } else {
        let speed = reader.data.u16()?;
        let width = reader.data.u16()?;
        let direction = reader.data.u8()?;
        let pressure = reader.data.u8()?;
        Ok(Point {
            x,
            y,
            speed,
            direction,
            width,
            pressure,
        })
    }
}

fn read_glyph_range(reader: &mut TaggedBlockReader) -> Result<GlyphRange, SceneError> {
    let start = reader.optional(|r| r.read_u32(2))?;
    let length = match start {
        Some(_) => Some(reader.read_u32(3)?),
        None => None,
    };
    let color = PenColor::from_u32(reader.read_u32(4)?)?;
    let text = reader.read_string(5)?;

    let scope = reader.subblock(6)?;
    let count = reader.data.varuint()?;
    let mut rectangles = Vec::with_capacity(count as usize);
    for _ in 0..count {
        rectangles.push(Rectangle {
            x: reader.data.f64()?,
            y: reader.data.f64()?,
            w: reader.data.f64()?,
            h: reader.data.f64()?,
        });
    }
    reader.end_subblock(&scope)?;

    let length = length.unwrap_or_else(|| text.chars().count() as u32);
    Ok(GlyphRange {
        start,
        length,
        text,
        color,
        rectangles,
    })
}

fn read_root_text(reader: &mut TaggedBlockReader) -> Result<RootTextBlock, SceneError> {
    let block_id = reader.read_id(1)?;

    let mut items = CrdtSequence::new();
    let mut styles = BTreeMap::new();
    let outer = reader.subblock(2)?;
    {
        let shell = reader.subblock(1)?;
        let inner = reader.subblock(1)?;
        let count = reader.data.varuint()?;
        for _ in 0..count {
            items.insert(read_text_item(reader)?)?;
        }
        reader.end_subblock(&inner)?;
        reader.end_subblock(&shell)?;
    }
    {
        let shell = reader.subblock(2)?;
        let inner = reader.subblock(1)?;
        let count = reader.data.varuint()?;
        for _ in 0..count {
            let (key, style) = read_text_format(reader)?;
            styles.insert(key, style);
        }
        reader.end_subblock(&inner)?;
        reader.end_subblock(&shell)?;
    }
    reader.end_subblock(&outer)?;

    let scope = reader.subblock(3)?;
    let pos_x = reader.data.f64()?;
    let pos_y = reader.data.f64()?;
    reader.end_subblock(&scope)?;
    let width = reader.read_f32(4)?;

    Ok(RootTextBlock {
        block_id,
        value: Text {
            items,
            styles,
            pos_x,
            pos_y,
            width,
        },
    })
}

fn read_text_item(
    reader: &mut TaggedBlockReader,
) -> Result<CrdtSequenceItem<TextItem>, SceneError> {
    let scope = reader.subblock(0)?;
    let item_id = reader.read_id(2)?;
    let left_id = reader.read_id(3)?;
    let right_id = reader.read_id(4)?;
    let deleted_length = reader.read_u32(5)?;
    let payload = if reader.has_subblock(6) {
        let (text, format) = reader.read_string_with_format(6)?;
        ItemPayload::Value(TextItem { text, format })
    } else {
        ItemPayload::Tombstone {
            length: deleted_length,
        }
    };
    reader.end_subblock(&scope)?;
    Ok(CrdtSequenceItem {
        item_id,
        left_id,
        right_id,
        payload,
    })
}

fn read_text_format(
    reader: &mut TaggedBlockReader,
) -> Result<(CrdtId, LwwValue<ParagraphStyle>), SceneError> {
    let key = reader.read_id_raw()?;
    let timestamp = reader.read_id(1)?;
    let scope = reader.subblock(2)?;
    let magic = reader.data.u8()?;
    if magic != 17 {
        return Err(SceneError::InvalidEncoding(format!(
            "unexpected format magic byte {magic}"
        )));
    }
    let style = ParagraphStyle::from_u8(reader.data.u8()?)?;
    reader.end_subblock(&scope)?;
    Ok((key, LwwValue::new(timestamp, style)))
}
