//! Block-level encoding, symmetric to the decoder.

use super::block_type;
use super::{
    AuthorIdsBlock, Block, MigrationInfoBlock, PageInfoBlock, RootTextBlock, SceneInfoBlock,
    SceneItemBlock, SceneTreeBlock, TreeNodeBlock, WriteOptions,
};
use crate::crdt_id::CrdtId;
use crate::crdt_sequence::ItemPayload;
use crate::error::SceneError;
use crate::scene_items::{GlyphRange, Line, Point, SceneItem, Text};
use crate::tagged::TaggedBlockWriter;

/// Encodes a block stream, header included.
pub fn write_blocks(blocks: &[Block], options: &WriteOptions) -> Result<Vec<u8>, SceneError> {
    super::decoder::point_size_for(options.line_version)?;
    let mut writer = TaggedBlockWriter::new();
    writer.write_header();
    for block in blocks {
        write_block(&mut writer, block, options)?;
    }
    Ok(writer.into_bytes())
}

/// Encodes one block with its envelope.
pub fn write_block(
    writer: &mut TaggedBlockWriter,
    block: &Block,
    options: &WriteOptions,
) -> Result<(), SceneError> {
    let (min_version, current_version) = block.version_info(options);
    if let Block::Unreadable(b) = block {
        return writer.raw_block(b.block_type, b.min_version, b.current_version, &b.data);
    }
    writer.block(block.block_type(), min_version, current_version, |w| {
        match block {
            Block::MigrationInfo(b) => write_migration_info(w, b),
            Block::SceneTree(b) => write_scene_tree(w, b),
            Block::TreeNode(b) => write_tree_node(w, b),
            Block::SceneGlyphItem(b) => write_item_block(w, block_type::SCENE_GLYPH_ITEM, b, options),
            Block::SceneGroupItem(b) => write_item_block(w, block_type::SCENE_GROUP_ITEM, b, options),
            Block::SceneLineItem(b) => write_item_block(w, block_type::SCENE_LINE_ITEM, b, options),
            Block::SceneTextItem(b) => write_item_block(w, block_type::SCENE_TEXT_ITEM, b, options),
            Block::SceneTombstoneItem(b) => {
                write_item_block(w, block_type::SCENE_TOMBSTONE_ITEM, b, options)
            }
            Block::RootText(b) => write_root_text(w, b),
            Block::AuthorIds(b) => write_author_ids(w, b),
            Block::PageInfo(b) => write_page_info(w, b),
            Block::SceneInfo(b) => write_scene_info(w, b),
            Block::Unreadable(_) => unreachable!("handled above"),
        }
    })
}

fn write_author_ids(w: &mut TaggedBlockWriter, b: &AuthorIdsBlock) -> Result<(), SceneError> {
    w.data.varuint(b.author_uuids.len() as u64);
    for (author_id, uuid) in &b.author_uuids {
        w.subblock(0, |w| {
            let raw = uuid.to_bytes_le();
            w.data.varuint(raw.len() as u64);
            w.data.bytes(&raw);
            w.data.u16(*author_id);
            Ok(())
        })?;
    }
    Ok(())
}

fn write_migration_info(w: &mut TaggedBlockWriter, b: &MigrationInfoBlock) -> Result<(), SceneError> {
    w.write_id(1, b.migration_id);
    w.write_bool(2, b.is_device);
    if let Some(unknown) = b.unknown {
        w.write_bool(3, unknown);
    }
    Ok(())
}

fn write_page_info(w: &mut TaggedBlockWriter, b: &PageInfoBlock) -> Result<(), SceneError> {
    w.write_u32(1, b.loads_count);
    w.write_u32(2, b.merges_count);
    w.write_u32(3, b.text_chars_count);
    w.write_u32(4, b.text_lines_count);
    if b.type_folio_use_count != 0 {
        w.write_u32(5, b.type_folio_use_count);
    }
    Ok(())
}

fn write_scene_tree(w: &mut TaggedBlockWriter, b: &SceneTreeBlock) -> Result<(), SceneError> {
    w.write_id(1, b.tree_id);
    w.write_id(2, b.node_id);
    w.write_bool(3, b.is_update);
    w.subblock(4, |w| {
        w.write_id(1, b.parent_id);
        Ok(())
    })
}

fn write_tree_node(w: &mut TaggedBlockWriter, b: &TreeNodeBlock) -> Result<(), SceneError> {
    let group = &b.group;
    w.write_id(1, group.node_id);
    w.write_lww_string(2, group.label.clone())?;
    w.write_lww_bool(3, group.visible)?;
    if let (Some(anchor_id), Some(anchor_type), Some(anchor_threshold), Some(anchor_origin_x)) = (
        group.anchor_id,
        group.anchor_type,
        group.anchor_threshold,
        group.anchor_origin_x,
    ) {
        w.write_lww_id(7, anchor_id)?;
        w.write_lww_u8(8, anchor_type)?;
        w.write_lww_f32(9, anchor_threshold)?;
        w.write_lww_f32(10, anchor_origin_x)?;
    }
    Ok(())
}

fn write_scene_info(w: &mut TaggedBlockWriter, b: &SceneInfoBlock) -> Result<(), SceneError> {
    w.write_lww_id(1, b.current_layer)?;
    if let Some(background_visible) = b.background_visible {
        w.write_lww_bool(2, background_visible)?;
    }
    if let Some(root_document_visible) = b.root_document_visible {
        w.write_lww_bool(3, root_document_visible)?;
    }
    if let Some((width, height)) = b.paper_size {
        w.subblock(5, |w| {
            w.data.u32(width);
            w.data.u32(height);
            Ok(())
        })?;
    }
    Ok(())
}

fn write_item_block(
    w: &mut TaggedBlockWriter,
    discriminator: u8,
    b: &SceneItemBlock,
    options: &WriteOptions,
) -> Result<(), SceneError> {
    w.write_id(1, b.parent_id);
    w.write_id(2, b.item.item_id);
    w.write_id(3, b.item.left_id);
    w.write_id(4, b.item.right_id);
    w.write_u32(5, b.item.payload.deleted_length());
    if let ItemPayload::Value(value) = &b.item.payload {
        let expected = match value {
            SceneItem::GlyphRange(_) => block_type::SCENE_GLYPH_ITEM,
            SceneItem::Group(_) => block_type::SCENE_GROUP_ITEM,
            SceneItem::Line(_) => block_type::SCENE_LINE_ITEM,
        };
        if expected != discriminator {
            return Err(SceneError::InvalidEncoding(format!(
                "scene item value {expected:#04x} does not belong in block type {discriminator:#04x}"
            )));
        }
        w.subblock(6, |w| {
            w.data.u8(discriminator);
            match value {
                SceneItem::Line(line) => write_line(w, line, options.line_version),
                SceneItem::Group(child_id) => {
                    w.write_id(2, *child_id);
                    Ok(())
                }
                SceneItem::GlyphRange(glyph) => write_glyph_range(w, glyph),
            }
        })?;
    }
    Ok(())
}

fn write_line(w: &mut TaggedBlockWriter, line: &Line, version: u8) -> Result<(), SceneError> {
    super::decoder::point_size_for(version)?;
    w.write_u32(1, line.tool.as_u32());
    w.write_u32(2, line.color.as_u32());
    w.write_f64(3, line.thickness_scale);
    w.write_f32(4, line.starting_length);
    w.subblock(5, |w| {
        for point in &line.points {
            write_point(w, point, version);
        }
        Ok(())
    })?;
    // Stroke timestamp is not modelled; the writer emits a constant.
    w.write_id(6, CrdtId::new(0, 1));
    if let Some(move_id) = line.move_id {
        w.write_id(7, move_id);
    }
    Ok(())
}

fn write_point(w: &mut TaggedBlockWriter, point: &Point, version: u8) {
    w.data.f32(point.x);
    w.data.f32(point.y);
    if version == 1 {
        w.data.f32(point.speed as f32 / 4.0);
        w.data.f32(point.direction as f32 * std::f32::consts::TAU / 255.0);
        w.data.f32(point.width as f32 / 4.0);
        w.data.f32(point.pressure as f32 / 255.0);
    } else {
        w.data.u16(point.speed);
        w.data.u16(point.width);
        w.data.u8(point.direction);
        w.data.u8(point.pressure);
    }
}

fn write_glyph_range(w: &mut TaggedBlockWriter, glyph: &GlyphRange) -> Result<(), SceneError> {
    if let Some(start) = glyph.start {
        w.write_u32(2, start);
        w.write_u32(3, glyph.length);
    }
    w.write_u32(4, glyph.color.as_u32());
    w.write_string(5, &glyph.text)?;
    w.subblock(6, |w| {
        w.data.varuint(glyph.rectangles.len() as u64);
        for rect in &glyph.rectangles {
            w.data.f64(rect.x);
            w.data.f64(rect.y);
            w.data.f64(rect.w);
            w.data.f64(rect.h);
        }
        Ok(())
    })
}

fn write_root_text(w: &mut TaggedBlockWriter, b: &RootTextBlock) -> Result<(), SceneError> {
    let text: &Text = &b.value;
    w.write_id(1, b.block_id);
    w.subblock(2, |w| {
        w.subblock(1, |w| {
            w.subblock(1, |w| {
                let ids = text.items.sorted_ids()?;
                w.data.varuint(ids.len() as u64);
                for id in ids {
                    let item = text.items.item(&id).ok_or_else(|| {
                        SceneError::InvalidEncoding("text item vanished during write".into())
                    })?;
                    w.subblock(0, |w| {
                        w.write_id(2, item.item_id);
                        w.write_id(3, item.left_id);
                        w.write_id(4, item.right_id);
                        w.write_u32(5, item.payload.deleted_length());
                        if let ItemPayload::Value(value) = &item.payload {
                            w.write_string_with_format(6, &value.text, value.format)?;
                        }
                        Ok(())
                    })?;
                }
                Ok(())
            })
        })?;
        w.subblock(2, |w| {
            w.subblock(1, |w| {
                w.data.varuint(text.styles.len() as u64);
                for (key, style) in &text.styles {
                    w.write_id_raw(*key);
                    w.write_id(1, style.timestamp);
                    w.subblock(2, |w| {
                        w.data.u8(17);
                        w.data.u8(style.value.as_u8());
                        Ok(())
                    })?;
                }
                Ok(())
            })
        })
    })?;
    w.subblock(3, |w| {
        w.data.f64(text.pos_x);
        w.data.f64(text.pos_y);
        Ok(())
    })?;
    w.write_f32(4, text.width);
    Ok(())
}
