//! Root-text helpers: per-character expansion of the CRDT items and a
//! paragraph-level document view.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::blocks::{
    AuthorIdsBlock, Block, MigrationInfoBlock, PageInfoBlock, RootTextBlock, SceneItemBlock,
    SceneTreeBlock, TreeNodeBlock,
};
use crate::crdt_id::{CrdtId, LwwValue};
use crate::crdt_sequence::{CrdtSequence, CrdtSequenceItem, ItemPayload};
use crate::error::SceneError;
use crate::scene_items::{Group, ParagraphStyle, SceneItem, Text, TextItem};

/// Expands multi-character items into unit items with consecutive
/// counters, and deleted runs into unit tombstones.
///
/// A span inserted as one item occupies one id per character; glyph
/// highlights and style keys address those per-character ids, so
/// consumers work on the expanded sequence. Format-carrying items are
/// kept whole.
pub fn expand_text_items(
    items: &CrdtSequence<TextItem>,
) -> Result<CrdtSequence<TextItem>, SceneError> {
    let mut expanded = CrdtSequence::new();
    for item in items.iter() {
        match &item.payload {
            ItemPayload::Tombstone { length } if *length > 1 => {
                expand_run(&mut expanded, item, *length as u64, |_| ItemPayload::Tombstone {
                    length: 1,
                })?;
            }
            ItemPayload::Value(value) if value.format.is_none() && value.text.chars().count() > 1 => {
                let chars: Vec<char> = value.text.chars().collect();
                expand_run(&mut expanded, item, chars.len() as u64, |i| {
                    ItemPayload::Value(TextItem::plain(chars[i as usize].to_string()))
                })?;
            }
            _ => expanded.insert(item.clone())?,
        }
    }
    Ok(expanded)
}

fn expand_run(
    expanded: &mut CrdtSequence<TextItem>,
    item: &CrdtSequenceItem<TextItem>,
    count: u64,
    payload_at: impl Fn(u64) -> ItemPayload<TextItem>,
) -> Result<(), SceneError> {
    let base = item.item_id;
    for i in 0..count {
        let item_id = CrdtId::new(base.author, base.counter + i);
        let left_id = if i == 0 {
            item.left_id
        } else {
            CrdtId::new(base.author, base.counter + i - 1)
        };
        let right_id = if i + 1 == count {
            item.right_id
        } else {
            CrdtId::new(base.author, base.counter + i + 1)
        };
        expanded.insert(CrdtSequenceItem {
            item_id,
            left_id,
            right_id,
            payload: payload_at(i),
        })?;
    }
    Ok(())
}

/// One paragraph of root text.
#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    /// The id of the item the paragraph starts at: the end-marker for
    /// the first paragraph, the break item's id otherwise. This is the
    /// key used by the styles map.
    pub start_id: CrdtId,
    pub contents: String,
    pub style: LwwValue<ParagraphStyle>,
}

/// Paragraph-level view of a [`Text`], derived from the expanded
/// character sequence and the styles map.
#[derive(Debug, Clone, PartialEq)]
pub struct TextDocument {
    pub paragraphs: Vec<Paragraph>,
}

impl TextDocument {
    pub fn from_text(text: &Text) -> Result<Self, SceneError> {
        let style_at = |id: CrdtId| {
            text.styles
                .get(&id)
                .copied()
                .unwrap_or(LwwValue::unset(ParagraphStyle::default()))
        };
        let expanded = expand_text_items(&text.items)?;
        let mut paragraphs = vec![Paragraph {
            start_id: CrdtId::END_MARKER,
            contents: String::new(),
            style: style_at(CrdtId::END_MARKER),
        }];
        for (id, value) in expanded.sorted_pairs()? {
            // Paragraph breaks are newline characters; items carrying
            // a format code are breaks too, and their character
            // content does not join the text.
            if value.format.is_some() || value.text == "\n" {
                paragraphs.push(Paragraph {
                    start_id: id,
                    contents: String::new(),
                    style: style_at(id),
                });
            } else if let Some(paragraph) = paragraphs.last_mut() {
                paragraph.contents.push_str(&value.text);
            }
        }
        Ok(Self { paragraphs })
    }

    /// The document's text with paragraphs joined by newlines.
    pub fn plain_text(&self) -> String {
        let contents: Vec<&str> = self.paragraphs.iter().map(|p| p.contents.as_str()).collect();
        contents.join("\n")
    }
}

/// Character and line counts the page info block records for a text.
pub(crate) fn text_counts(text: &Text) -> Result<(u32, u32), SceneError> {
    let doc = TextDocument::from_text(text)?;
    let chars: usize = doc
        .paragraphs
        .iter()
        .map(|p| p.contents.chars().count() + 1)
        .sum();
    Ok((chars as u32, doc.paragraphs.len() as u32))
}

/// Builds the minimal block list for a fresh document whose only
/// content is root text: one author, migration and page info, the
/// root-child group, and the text itself.
pub fn simple_text_document(text: &str, author_uuid: Uuid) -> Result<Vec<Block>, SceneError> {
    let mut author_uuids = BTreeMap::new();
    author_uuids.insert(1u16, author_uuid);

    let mut items = CrdtSequence::new();
    if !text.is_empty() {
        items.insert(CrdtSequenceItem {
            item_id: CrdtId::new(1, 16),
            left_id: CrdtId::END_MARKER,
            right_id: CrdtId::END_MARKER,
            payload: ItemPayload::Value(TextItem::plain(text)),
        })?;
    }
    let mut styles = BTreeMap::new();
    styles.insert(
        CrdtId::END_MARKER,
        LwwValue::new(CrdtId::new(1, 15), ParagraphStyle::Plain),
    );

    let group_id = CrdtId::new(0, 11);
    Ok(vec![
        Block::AuthorIds(AuthorIdsBlock { author_uuids }),
        Block::MigrationInfo(MigrationInfoBlock {
            migration_id: CrdtId::new(1, 1),
            is_device: true,
            unknown: None,
        }),
        Block::PageInfo(PageInfoBlock {
            loads_count: 1,
            merges_count: 0,
            text_chars_count: text.chars().count() as u32 + 1,
            text_lines_count: text.matches('\n').count() as u32 + 1,
            type_folio_use_count: 0,
        }),
        Block::SceneTree(SceneTreeBlock {
            tree_id: group_id,
            node_id: CrdtId::END_MARKER,
            is_update: true,
            parent_id: CrdtId::new(0, 1),
        }),
        Block::RootText(RootTextBlock {
            block_id: CrdtId::new(0, 0),
            value: Text {
                items,
                styles,
                pos_x: -468.0,
                pos_y: 234.0,
                width: 936.0,
            },
        }),
        Block::TreeNode(TreeNodeBlock {
            group: Group::new(group_id),
        }),
        Block::SceneGroupItem(SceneItemBlock {
            parent_id: CrdtId::new(0, 1),
            item: CrdtSequenceItem {
                item_id: CrdtId::new(0, 12),
                left_id: CrdtId::END_MARKER,
                right_id: CrdtId::END_MARKER,
                payload: ItemPayload::Value(SceneItem::Group(group_id)),
            },
        }),
    ])
}
