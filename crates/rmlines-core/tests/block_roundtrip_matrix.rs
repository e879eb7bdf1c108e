//! Per-block-type round trips through the codec.

use std::collections::BTreeMap;

use rmlines_core::{
    read_blocks, write_blocks, AuthorIdsBlock, Block, CrdtId, CrdtSequence, CrdtSequenceItem,
    GlyphRange, Group, ItemPayload, Line, LwwValue, MigrationInfoBlock, PageInfoBlock,
    ParagraphStyle, Pen, PenColor, Point, Rectangle, RootTextBlock, SceneInfoBlock, SceneItem,
    SceneItemBlock, SceneTreeBlock, Text, TextItem, TreeNodeBlock, WriteOptions,
};
use uuid::Uuid;

fn end() -> CrdtId {
    CrdtId::END_MARKER
}

fn assert_round_trips(block: Block) {
    let bytes = write_blocks(std::slice::from_ref(&block), &WriteOptions::default()).unwrap();
    let decoded: Vec<Block> = read_blocks(&bytes)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(decoded, vec![block]);
}

#[test]
fn author_ids_round_trip() {
    let mut author_uuids = BTreeMap::new();
    author_uuids.insert(1u16, Uuid::parse_str("f6b5b6a0-3e8d-4a1f-9c2b-6f1e5d4c3b2a").unwrap());
    author_uuids.insert(7u16, Uuid::nil());
    assert_round_trips(Block::AuthorIds(AuthorIdsBlock { author_uuids }));
}

#[test]
fn migration_info_round_trip() {
    assert_round_trips(Block::MigrationInfo(MigrationInfoBlock {
        migration_id: CrdtId::new(1, 1),
        is_device: true,
        unknown: None,
    }));
    assert_round_trips(Block::MigrationInfo(MigrationInfoBlock {
        migration_id: CrdtId::new(3, 99),
        is_device: false,
        unknown: Some(true),
    }));
}

#[test]
fn page_info_round_trip() {
    assert_round_trips(Block::PageInfo(PageInfoBlock {
        loads_count: 5,
        merges_count: 2,
        text_chars_count: 110,
        text_lines_count: 6,
        type_folio_use_count: 0,
    }));
    assert_round_trips(Block::PageInfo(PageInfoBlock {
        loads_count: 1,
        merges_count: 0,
        text_chars_count: 0,
        text_lines_count: 0,
        type_folio_use_count: 3,
    }));
}

#[test]
fn scene_tree_round_trip() {
    assert_round_trips(Block::SceneTree(SceneTreeBlock {
        tree_id: CrdtId::new(0, 11),
        node_id: end(),
        is_update: true,
        parent_id: CrdtId::new(0, 1),
    }));
}

#[test]
fn tree_node_round_trip_without_anchors() {
    let mut group = Group::new(CrdtId::new(0, 11));
    group.label = LwwValue::new(CrdtId::new(1, 20), "Layer 2".to_owned());
    group.visible = LwwValue::new(CrdtId::new(1, 21), false);
    assert_round_trips(Block::TreeNode(TreeNodeBlock { group }));
}

#[test]
fn tree_node_round_trip_with_anchors() {
    let mut group = Group::new(CrdtId::new(0, 11));
    group.anchor_id = Some(LwwValue::new(CrdtId::new(1, 30), CrdtId::new(1, 16)));
    group.anchor_type = Some(LwwValue::new(CrdtId::new(1, 31), 2));
    group.anchor_threshold = Some(LwwValue::new(CrdtId::new(1, 32), 100.5));
    group.anchor_origin_x = Some(LwwValue::new(CrdtId::new(1, 33), -468.0));
    assert_round_trips(Block::TreeNode(TreeNodeBlock { group }));
}

#[test]
fn scene_info_round_trip_minimal() {
    assert_round_trips(Block::SceneInfo(SceneInfoBlock {
        current_layer: LwwValue::new(CrdtId::new(1, 40), CrdtId::new(0, 11)),
        background_visible: None,
        root_document_visible: None,
        paper_size: None,
    }));
}

#[test]
fn scene_info_round_trip_full() {
    assert_round_trips(Block::SceneInfo(SceneInfoBlock {
        current_layer: LwwValue::new(CrdtId::new(1, 40), CrdtId::new(0, 11)),
        background_visible: Some(LwwValue::new(CrdtId::new(1, 41), true)),
        root_document_visible: Some(LwwValue::new(CrdtId::new(1, 42), false)),
        paper_size: Some((1404, 1872)),
    }));
}

#[test]
fn line_item_round_trip_with_move_id() {
    let line = Line {
        color: PenColor::Highlight,
        tool: Pen::Shader,
        points: vec![
            Point {
                x: -10.5,
                y: 0.25,
                speed: 65535,
                direction: 255,
                width: 1024,
                pressure: 0,
            },
            Point {
                x: 0.0,
                y: -0.0,
                speed: 0,
                direction: 0,
                width: 0,
                pressure: 255,
            },
        ],
        thickness_scale: 1.5,
        starting_length: 12.25,
        move_id: Some(CrdtId::new(2, 77)),
    };
    assert_round_trips(Block::SceneLineItem(SceneItemBlock {
        parent_id: CrdtId::new(0, 11),
        item: CrdtSequenceItem {
            item_id: CrdtId::new(1, 50),
            left_id: CrdtId::new(1, 49),
            right_id: end(),
            payload: ItemPayload::Value(SceneItem::Line(line)),
        },
    }));
}

#[test]
fn line_item_round_trip_empty_points() {
    let line = Line {
        color: PenColor::Black,
        tool: Pen::Eraser,
        points: Vec::new(),
        thickness_scale: 1.0,
        starting_length: 0.0,
        move_id: None,
    };
    assert_round_trips(Block::SceneLineItem(SceneItemBlock {
        parent_id: CrdtId::new(0, 11),
        item: CrdtSequenceItem {
            item_id: CrdtId::new(1, 50),
            left_id: end(),
            right_id: end(),
            payload: ItemPayload::Value(SceneItem::Line(line)),
        },
    }));
}

#[test]
fn group_item_round_trip() {
    assert_round_trips(Block::SceneGroupItem(SceneItemBlock {
        parent_id: CrdtId::new(0, 1),
        item: CrdtSequenceItem {
            item_id: CrdtId::new(0, 12),
            left_id: end(),
            right_id: end(),
            payload: ItemPayload::Value(SceneItem::Group(CrdtId::new(0, 11))),
        },
    }));
}

#[test]
fn glyph_item_round_trip_with_start() {
    let glyph = GlyphRange {
        start: Some(12),
        length: 5,
        text: "hello".to_owned(),
        color: PenColor::Yellow,
        rectangles: vec![
            Rectangle {
                x: 10.0,
                y: 20.0,
                w: 100.0,
                h: 14.5,
            },
            Rectangle {
                x: 10.0,
                y: 40.0,
                w: 60.0,
                h: 14.5,
            },
        ],
    };
    assert_round_trips(Block::SceneGlyphItem(SceneItemBlock {
        parent_id: CrdtId::new(0, 11),
        item: CrdtSequenceItem {
            item_id: CrdtId::new(1, 60),
            left_id: end(),
            right_id: end(),
            payload: ItemPayload::Value(SceneItem::GlyphRange(glyph)),
        },
    }));
}

#[test]
fn glyph_item_round_trip_without_start() {
    // With no explicit start, the length falls back to the character
    // count of the text; zero rectangles are permitted.
    let glyph = GlyphRange {
        start: None,
        length: 4,
        text: "mark".to_owned(),
        color: PenColor::Highlight,
        rectangles: Vec::new(),
    };
    assert_round_trips(Block::SceneGlyphItem(SceneItemBlock {
        parent_id: CrdtId::new(0, 11),
        item: CrdtSequenceItem {
            item_id: CrdtId::new(1, 61),
            left_id: end(),
            right_id: end(),
            payload: ItemPayload::Value(SceneItem::GlyphRange(glyph)),
        },
    }));
}

#[test]
fn tombstone_item_round_trip() {
    assert_round_trips(Block::SceneTombstoneItem(SceneItemBlock {
        parent_id: CrdtId::new(0, 11),
        item: CrdtSequenceItem {
            item_id: CrdtId::new(1, 70),
            left_id: CrdtId::new(1, 69),
            right_id: CrdtId::new(1, 75),
            payload: ItemPayload::Tombstone { length: 4 },
        },
    }));
}

#[test]
fn deleted_line_item_round_trips_as_valueless() {
    assert_round_trips(Block::SceneLineItem(SceneItemBlock {
        parent_id: CrdtId::new(0, 11),
        item: CrdtSequenceItem {
            item_id: CrdtId::new(1, 71),
            left_id: end(),
            right_id: end(),
            payload: ItemPayload::Tombstone { length: 1 },
        },
    }));
}

#[test]
fn root_text_round_trip() {
    let mut items = CrdtSequence::new();
    items
        .insert(CrdtSequenceItem {
            item_id: CrdtId::new(1, 16),
            left_id: end(),
            right_id: CrdtId::new(1, 21),
            payload: ItemPayload::Value(TextItem::plain("Hello")),
        })
        .unwrap();
    items
        .insert(CrdtSequenceItem {
            item_id: CrdtId::new(1, 21),
            left_id: CrdtId::new(1, 16),
            right_id: CrdtId::new(1, 22),
            payload: ItemPayload::Value(TextItem {
                text: "\n".to_owned(),
                format: Some(ParagraphStyle::Heading.as_u8() as u32),
            }),
        })
        .unwrap();
    items
        .insert(CrdtSequenceItem {
            item_id: CrdtId::new(1, 22),
            left_id: CrdtId::new(1, 21),
            right_id: end(),
            payload: ItemPayload::Tombstone { length: 2 },
        })
        .unwrap();

    let mut styles = BTreeMap::new();
    styles.insert(
        end(),
        LwwValue::new(CrdtId::new(1, 15), ParagraphStyle::Plain),
    );
    styles.insert(
        CrdtId::new(1, 21),
        LwwValue::new(CrdtId::new(1, 23), ParagraphStyle::Heading),
    );

    assert_round_trips(Block::RootText(RootTextBlock {
        block_id: CrdtId::new(0, 0),
        value: Text {
            items,
            styles,
            pos_x: -468.0,
            pos_y: 234.0,
            width: 936.0,
        },
    }));
}

#[test]
fn block_sequence_round_trips_together() {
    let blocks = vec![
        Block::AuthorIds(AuthorIdsBlock {
            author_uuids: BTreeMap::new(),
        }),
        Block::MigrationInfo(MigrationInfoBlock {
            migration_id: CrdtId::new(1, 1),
            is_device: true,
            unknown: None,
        }),
        Block::PageInfo(PageInfoBlock {
            loads_count: 1,
            merges_count: 0,
            text_chars_count: 1,
            text_lines_count: 1,
            type_folio_use_count: 0,
        }),
        Block::SceneTree(SceneTreeBlock {
            tree_id: CrdtId::new(0, 11),
            node_id: end(),
            is_update: true,
            parent_id: CrdtId::new(0, 1),
        }),
        Block::TreeNode(TreeNodeBlock {
            group: Group::new(CrdtId::new(0, 11)),
        }),
    ];
    let bytes = write_blocks(&blocks, &WriteOptions::default()).unwrap();
    let decoded: Vec<Block> = read_blocks(&bytes)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(decoded, blocks);
}
