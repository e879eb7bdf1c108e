//! End-to-end scenarios over complete scene files.

use std::collections::BTreeMap;

use rmlines_core::{
    read_blocks, read_tree, simple_text_document, write_blocks, write_tree, AuthorIdsBlock, Block,
    CrdtId, CrdtSequenceItem, Group, ItemPayload, Line, LwwValue, PageInfoBlock, Pen, PenColor,
    Point, SceneError, SceneItem, SceneItemBlock, SceneTree, SceneTreeBlock, TaggedBlockWriter,
    TreeNodeBlock, UnreadableBlock, WriteOptions, FILE_HEADER_V6,
};
use uuid::Uuid;

fn end() -> CrdtId {
    CrdtId::END_MARKER
}

fn read_all(data: &[u8]) -> Vec<Block> {
    read_blocks(data)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn empty_document_round_trips() {
    let bytes = write_blocks(&[], &WriteOptions::default()).unwrap();
    assert_eq!(bytes, FILE_HEADER_V6);

    assert!(read_all(&bytes).is_empty());

    let tree = read_tree(&bytes).unwrap();
    assert!(tree.root().children.is_empty());
    assert!(tree.root_text.is_none());
}

#[test]
fn truncated_header_is_rejected() {
    assert_eq!(read_blocks(&FILE_HEADER_V6[..20]).err(), Some(SceneError::BadHeader));
    let mut corrupted = FILE_HEADER_V6.to_vec();
    corrupted[0] = b'x';
    assert_eq!(read_blocks(&corrupted).err(), Some(SceneError::BadHeader));
}

fn single_stroke_blocks() -> Vec<Block> {
    let mut author_uuids = BTreeMap::new();
    author_uuids.insert(
        1u16,
        Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap(),
    );
    let layer_id = CrdtId::new(0, 2);
    let mut layer = Group::new(layer_id);
    layer.label = LwwValue::new(CrdtId::new(0, 3), "L1".to_owned());
    layer.visible = LwwValue::new(CrdtId::new(0, 4), true);

    let line = Line {
        color: PenColor::Blue,
        tool: Pen::Fineliner1,
        points: vec![
            Point {
                x: 10.0,
                y: 20.0,
                speed: 100,
                direction: 128,
                width: 40,
                pressure: 200,
            },
            Point {
                x: 11.0,
                y: 21.0,
                speed: 120,
                direction: 130,
                width: 40,
                pressure: 210,
            },
        ],
        thickness_scale: 2.0,
        starting_length: 0.0,
        move_id: None,
    };

    vec![
        Block::AuthorIds(AuthorIdsBlock { author_uuids }),
        Block::PageInfo(PageInfoBlock {
            loads_count: 1,
            merges_count: 0,
            text_chars_count: 0,
            text_lines_count: 0,
            type_folio_use_count: 0,
        }),
        Block::SceneTree(SceneTreeBlock {
            tree_id: layer_id,
            node_id: layer_id,
            is_update: false,
            parent_id: CrdtId::new(0, 1),
        }),
        Block::TreeNode(TreeNodeBlock { group: layer }),
        Block::SceneLineItem(SceneItemBlock {
            parent_id: layer_id,
            item: CrdtSequenceItem {
                item_id: CrdtId::new(1, 1),
                left_id: end(),
                right_id: end(),
                payload: ItemPayload::Value(SceneItem::Line(line)),
            },
        }),
    ]
}

#[test]
fn single_stroke_round_trips_as_blocks() {
    let blocks = single_stroke_blocks();
    let bytes = write_blocks(&blocks, &WriteOptions::default()).unwrap();
    assert_eq!(read_all(&bytes), blocks);
}

#[test]
fn single_stroke_round_trips_in_v1_encoding() {
    // v1 stores floats; the integer model's units divide evenly, so
    // the round trip is exact here too.
    let blocks = single_stroke_blocks();
    let bytes = write_blocks(&blocks, &WriteOptions { line_version: 1 }).unwrap();
    assert_eq!(read_all(&bytes), blocks);
}

#[test]
fn single_stroke_tree_has_one_line() {
    let blocks = single_stroke_blocks();
    let bytes = write_blocks(&blocks, &WriteOptions::default()).unwrap();
    let tree = read_tree(&bytes).unwrap();

    let layer = tree.node(CrdtId::new(0, 2)).unwrap();
    assert_eq!(layer.label.value, "L1");
    assert!(layer.visible.value);

    let items: Vec<(CrdtId, SceneItem)> = tree
        .walk()
        .map(|entry| {
            let (id, item) = entry.unwrap();
            (id, item.clone())
        })
        .collect();
    assert_eq!(items.len(), 1);
    let (id, item) = &items[0];
    assert_eq!(*id, CrdtId::new(1, 1));
    let SceneItem::Line(line) = item else {
        panic!("expected a line, got {item:?}");
    };
    assert_eq!(line.color, PenColor::Blue);
    assert_eq!(line.tool, Pen::Fineliner1);
    assert_eq!(line.thickness_scale, 2.0);
    assert_eq!(line.points.len(), 2);
    assert_eq!(line.points[0].x, 10.0);
    assert_eq!(line.points[0].pressure, 200);
    assert_eq!(line.points[1].speed, 120);
}

#[test]
fn scene_tree_round_trips_through_bytes() {
    let mut tree = SceneTree::new();
    let layer_id = CrdtId::new(0, 2);
    tree.add_node(layer_id, SceneTree::ROOT_ID);
    tree.attach_item(
        CrdtSequenceItem {
            item_id: CrdtId::new(0, 9),
            left_id: end(),
            right_id: end(),
            payload: ItemPayload::Value(SceneItem::Group(layer_id)),
        },
        SceneTree::ROOT_ID,
    )
    .unwrap();
    tree.attach_item(
        CrdtSequenceItem {
            item_id: CrdtId::new(1, 1),
            left_id: end(),
            right_id: end(),
            payload: ItemPayload::Value(SceneItem::Line(Line {
                color: PenColor::Red,
                tool: Pen::Ballpoint2,
                points: vec![Point {
                    x: 1.0,
                    y: 2.0,
                    speed: 10,
                    direction: 20,
                    width: 30,
                    pressure: 40,
                }],
                thickness_scale: 1.0,
                starting_length: 0.5,
                move_id: Some(CrdtId::new(1, 7)),
            })),
        },
        layer_id,
    )
    .unwrap();

    let bytes = write_tree(&tree, &BTreeMap::new(), &WriteOptions::default()).unwrap();
    let rebuilt = read_tree(&bytes).unwrap();
    assert_eq!(rebuilt, tree);
}

#[test]
fn unknown_block_round_trips_as_unreadable() {
    let mut writer = TaggedBlockWriter::new();
    writer.write_header();
    writer.raw_block(0xfe, 1, 1, &[0xde, 0xad, 0xbe, 0xef]).unwrap();
    let bytes = writer.into_bytes();

    let blocks = read_all(&bytes);
    assert_eq!(blocks.len(), 1);
    let Block::Unreadable(unreadable) = &blocks[0] else {
        panic!("expected unreadable block, got {:?}", blocks[0]);
    };
    assert_eq!(unreadable.block_type, 0xfe);
    assert_eq!(unreadable.data, vec![0xde, 0xad, 0xbe, 0xef]);
    assert!(unreadable.error.contains("unknown block type"));

    // The opaque block survives a write/read cycle unchanged.
    let rewritten = write_blocks(&blocks, &WriteOptions::default()).unwrap();
    assert_eq!(rewritten, bytes);
    assert_eq!(read_all(&rewritten), blocks);
}

#[test]
fn unknown_block_leaves_rest_of_stream_readable() {
    let known = single_stroke_blocks();
    let mut writer = TaggedBlockWriter::new();
    writer.write_header();
    rmlines_core::blocks::write_block(&mut writer, &known[1], &WriteOptions::default()).unwrap();
    writer.raw_block(0xfe, 1, 1, &[0xde, 0xad, 0xbe, 0xef]).unwrap();
    rmlines_core::blocks::write_block(&mut writer, &known[2], &WriteOptions::default()).unwrap();
    let bytes = writer.into_bytes();

    let blocks = read_all(&bytes);
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0], known[1]);
    assert!(matches!(blocks[1], Block::Unreadable(_)));
    assert_eq!(blocks[2], known[2]);
}

#[test]
fn malformed_payload_is_captured_not_fatal() {
    // A page info block whose payload is a lone truncated tag.
    let mut writer = TaggedBlockWriter::new();
    writer.write_header();
    writer.raw_block(0x0a, 1, 1, &[0x14]).unwrap();
    let bytes = writer.into_bytes();

    let blocks = read_all(&bytes);
    assert_eq!(blocks.len(), 1);
    let Block::Unreadable(UnreadableBlock { data, .. }) = &blocks[0] else {
        panic!("expected unreadable block");
    };
    assert_eq!(data, &vec![0x14]);
}

#[test]
fn nonzero_reserved_byte_aborts_stream() {
    let mut bytes = FILE_HEADER_V6.to_vec();
    bytes.extend_from_slice(&4u32.to_le_bytes());
    bytes.extend_from_slice(&[0x01, 1, 1, 0x0a]);
    bytes.extend_from_slice(&[0, 0, 0, 0]);

    let result: Result<Vec<Block>, SceneError> = read_blocks(&bytes).unwrap().collect();
    assert!(matches!(result, Err(SceneError::InvalidEncoding(_))));
}

#[test]
fn truncated_envelope_aborts_stream() {
    let mut bytes = FILE_HEADER_V6.to_vec();
    bytes.extend_from_slice(&100u32.to_le_bytes());
    bytes.extend_from_slice(&[0x00, 1, 1, 0x0a]);
    bytes.extend_from_slice(&[0, 0, 0, 0]);

    let result: Result<Vec<Block>, SceneError> = read_blocks(&bytes).unwrap().collect();
    assert_eq!(result, Err(SceneError::EndOfInput));
}

#[test]
fn v1_point_scaling_matches_documented_factors() {
    // Hand-encoded v1 line block: floats on the wire, integer units in
    // the model.
    let mut writer = TaggedBlockWriter::new();
    writer.write_header();
    writer
        .block(0x05, 1, 1, |w| {
            w.write_id(1, CrdtId::new(0, 1));
            w.write_id(2, CrdtId::new(1, 1));
            w.write_id(3, CrdtId::new(0, 0));
            w.write_id(4, CrdtId::new(0, 0));
            w.write_u32(5, 0);
            w.subblock(6, |w| {
                w.data.u8(0x05);
                w.write_u32(1, Pen::Fineliner1.as_u32());
                w.write_u32(2, PenColor::Blue.as_u32());
                w.write_f64(3, 2.0);
                w.write_f32(4, 0.0);
                w.subblock(5, |w| {
                    w.data.f32(10.0);
                    w.data.f32(20.0);
                    w.data.f32(25.0); // speed
                    w.data.f32(std::f32::consts::PI); // direction
                    w.data.f32(10.0); // width
                    w.data.f32(0.5); // pressure
                    Ok(())
                })?;
                w.write_id(6, CrdtId::new(0, 1));
                Ok(())
            })
        })
        .unwrap();
    let bytes = writer.into_bytes();

    let blocks = read_all(&bytes);
    let Block::SceneLineItem(block) = &blocks[0] else {
        panic!("expected line item, got {:?}", blocks[0]);
    };
    let Some(SceneItem::Line(line)) = block.item.payload.value() else {
        panic!("expected line value");
    };
    assert_eq!(line.points.len(), 1);
    let point = line.points[0];
    assert_eq!(point.speed, 100);
    assert_eq!(point.width, 40);
    assert!(point.direction == 127 || point.direction == 128);
    assert!(point.pressure == 127 || point.pressure == 128);
}

#[test]
fn simple_text_document_round_trips() {
    let author = Uuid::parse_str("9a5fc2df-0f07-4b05-a58b-17b4b60b7b3a").unwrap();
    let blocks = simple_text_document("Hello\nworld", author).unwrap();
    let bytes = write_blocks(&blocks, &WriteOptions::default()).unwrap();
    assert_eq!(read_all(&bytes), blocks);

    let tree = read_tree(&bytes).unwrap();
    let text = tree.root_text.as_ref().unwrap();
    let doc = rmlines_core::TextDocument::from_text(text).unwrap();
    assert_eq!(doc.plain_text(), "Hello\nworld");
}
