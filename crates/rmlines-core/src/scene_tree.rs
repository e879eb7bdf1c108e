//! In-memory scene graph rebuilt from a block stream.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::blocks::{
    AuthorIdsBlock, Block, MigrationInfoBlock, PageInfoBlock, RootTextBlock, SceneItemBlock,
    SceneTreeBlock, TreeNodeBlock,
};
use crate::crdt_id::CrdtId;
use crate::crdt_sequence::{CrdtSequence, CrdtSequenceItem};
use crate::error::SceneError;
use crate::scene_items::{Group, SceneItem, Text};
use crate::text::text_counts;

/// The scene graph: group nodes keyed by id, rooted at `(0, 1)`, plus
/// the page's root text.
///
/// Group children reference child groups by id; [`SceneTree::node`]
/// materialises the referent, so the tree holds no back references and
/// cannot form reference cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneTree {
    nodes: BTreeMap<CrdtId, Group>,
    parents: BTreeMap<CrdtId, CrdtId>,
    pub root_text: Option<Text>,
}

impl Default for SceneTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneTree {
    /// Id of the implicit root group.
    pub const ROOT_ID: CrdtId = CrdtId::new(0, 1);

    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(Self::ROOT_ID, Group::new(Self::ROOT_ID));
        Self {
            nodes,
            parents: BTreeMap::new(),
            root_text: None,
        }
    }

    /// The root group.
    pub fn root(&self) -> &Group {
        self.nodes
            .get(&Self::ROOT_ID)
            .expect("root group is created in new() and never removed")
    }

    /// Looks up a group node by id.
    pub fn node(&self, id: CrdtId) -> Option<&Group> {
        self.nodes.get(&id)
    }

    /// The parent edge recorded for a group, if any.
    pub fn parent_of(&self, id: CrdtId) -> Option<CrdtId> {
        self.parents.get(&id).copied()
    }

    /// Registers a group node under a parent. Idempotent: re-adding an
    /// existing node only updates its parent edge.
    pub fn add_node(&mut self, node_id: CrdtId, parent_id: CrdtId) {
        self.nodes
            .entry(node_id)
            .or_insert_with(|| Group::new(node_id));
        self.parents.insert(node_id, parent_id);
    }

    /// Appends an item to a parent's child sequence.
    pub fn attach_item(
        &mut self,
        item: CrdtSequenceItem<SceneItem>,
        parent_id: CrdtId,
    ) -> Result<(), SceneError> {
        let parent = self
            .nodes
            .get_mut(&parent_id)
            .ok_or(SceneError::ParentMissing(parent_id))?;
        parent.children.insert(item)
    }

    /// Rebuilds a tree from a block stream in one pass.
    ///
    /// Consumes scene-tree, tree-node, scene-item and root-text
    /// blocks; everything else is metadata for other consumers. An
    /// item whose parent group is unknown is
    /// [`SceneError::ParentMissing`].
    pub fn from_blocks(blocks: impl IntoIterator<Item = Block>) -> Result<Self, SceneError> {
        let mut tree = SceneTree::new();
        for block in blocks {
            match block {
                Block::SceneTree(b) => tree.add_node(b.tree_id, b.parent_id),
                Block::TreeNode(b) => {
                    // Property blocks may arrive before the node is
                    // declared; create it with default children.
                    let group = tree
                        .nodes
                        .entry(b.group.node_id)
                        .or_insert_with(|| Group::new(b.group.node_id));
                    group.label = b.group.label;
                    group.visible = b.group.visible;
                    group.anchor_id = b.group.anchor_id;
                    group.anchor_type = b.group.anchor_type;
                    group.anchor_threshold = b.group.anchor_threshold;
                    group.anchor_origin_x = b.group.anchor_origin_x;
                }
                Block::SceneGroupItem(b) | Block::SceneLineItem(b) | Block::SceneGlyphItem(b) => {
                    tree.attach_item(b.item, b.parent_id)?;
                }
                Block::SceneTombstoneItem(b) => {
                    // Tombstones are not kept in the tree, but an
                    // orphan one still corrupts the topology.
                    if !tree.nodes.contains_key(&b.parent_id) {
                        return Err(SceneError::ParentMissing(b.parent_id));
                    }
                }
                Block::RootText(b) => tree.root_text = Some(b.value),
                _ => {}
            }
        }
        Ok(tree)
    }

    /// Depth-first traversal of all live items, starting at the root.
    ///
    /// Yields `(id, item)` pairs in child-sequence order; group items
    /// are yielded and then descended into. Tombstones are skipped.
    /// Groups declared with a parent edge but never attached as a
    /// child item are descended into after the parent's sequence.
    pub fn walk(&self) -> SceneWalk<'_> {
        let mut visited = std::collections::BTreeSet::new();
        visited.insert(Self::ROOT_ID);
        match self.frame_for(Self::ROOT_ID) {
            Ok(frame) => SceneWalk {
                tree: self,
                stack: vec![frame],
                visited,
                pending_error: None,
                failed: false,
            },
            Err(err) => SceneWalk {
                tree: self,
                stack: Vec::new(),
                visited,
                pending_error: Some(err),
                failed: false,
            },
        }
    }

    /// Child groups reachable only through their parent edge: declared
    /// by a scene-tree block but not present in the child sequence.
    fn declared_only_children(&self, group: &Group) -> Vec<CrdtId> {
        let referenced: std::collections::BTreeSet<CrdtId> = group
            .children
            .iter()
            .filter_map(|entry| match entry.payload.value() {
                Some(SceneItem::Group(child_id)) => Some(*child_id),
                _ => None,
            })
            .collect();
        self.parents
            .iter()
            .filter(|(child_id, parent_id)| {
                **parent_id == group.node_id
                    && !referenced.contains(child_id)
                    && **child_id != group.node_id
            })
            .map(|(child_id, _)| *child_id)
            .collect()
    }

    fn frame_for(&self, group_id: CrdtId) -> Result<WalkFrame, SceneError> {
        let group = self
            .nodes
            .get(&group_id)
            .ok_or(SceneError::ParentMissing(group_id))?;
        Ok(WalkFrame {
            group_id,
            items: group.children.sorted_ids()?.into_iter(),
            declared: self.declared_only_children(group).into_iter(),
        })
    }

    /// Serialises the tree as a block list in dependency order:
    /// author table, migration info, page info, then each group in
    /// pre-order (scene-tree and tree-node blocks before the group's
    /// item blocks), and finally the root text.
    pub fn to_blocks(&self, authors: &BTreeMap<u16, Uuid>) -> Result<Vec<Block>, SceneError> {
        let mut blocks = Vec::new();
        blocks.push(Block::AuthorIds(AuthorIdsBlock {
            author_uuids: authors.clone(),
        }));
        blocks.push(Block::MigrationInfo(MigrationInfoBlock {
            migration_id: CrdtId::new(0, 1),
            is_device: true,
            unknown: None,
        }));
        let (text_chars_count, text_lines_count) = match &self.root_text {
            Some(text) => text_counts(text)?,
            None => (0, 0),
        };
        blocks.push(Block::PageInfo(PageInfoBlock {
            loads_count: 1,
            merges_count: 0,
            text_chars_count,
            text_lines_count,
            type_folio_use_count: 0,
        }));
        let mut visited = std::collections::BTreeSet::new();
        self.emit_group(Self::ROOT_ID, &mut blocks, &mut visited)?;
        if let Some(text) = &self.root_text {
            blocks.push(Block::RootText(RootTextBlock {
                block_id: CrdtId::new(0, 0),
                value: text.clone(),
            }));
        }
        Ok(blocks)
    }

    fn emit_group(
        &self,
        group_id: CrdtId,
        blocks: &mut Vec<Block>,
        visited: &mut std::collections::BTreeSet<CrdtId>,
    ) -> Result<(), SceneError> {
        if !visited.insert(group_id) {
            return Ok(());
        }
        let group = self
            .nodes
            .get(&group_id)
            .ok_or(SceneError::ParentMissing(group_id))?;
        if group_id != Self::ROOT_ID {
            let parent_id = self.parent_of(group_id).unwrap_or(Self::ROOT_ID);
            blocks.push(Block::SceneTree(SceneTreeBlock {
                tree_id: group_id,
                node_id: CrdtId::END_MARKER,
                is_update: true,
                parent_id,
            }));
        }
        let mut registers = group.clone();
        registers.children = CrdtSequence::new();
        blocks.push(Block::TreeNode(TreeNodeBlock { group: registers }));

        let mut child_groups = Vec::new();
        for id in group.children.sorted_ids()? {
            let Some(entry) = group.children.item(&id) else {
                continue;
            };
            let block = SceneItemBlock {
                parent_id: group_id,
                item: entry.clone(),
            };
            match entry.payload.value() {
                Some(SceneItem::Group(child_id)) => {
                    child_groups.push(*child_id);
                    blocks.push(Block::SceneGroupItem(block));
                }
                Some(SceneItem::Line(_)) => blocks.push(Block::SceneLineItem(block)),
                Some(SceneItem::GlyphRange(_)) => blocks.push(Block::SceneGlyphItem(block)),
                None => blocks.push(Block::SceneTombstoneItem(block)),
            }
        }
        child_groups.extend(self.declared_only_children(group));
        for child_id in child_groups {
            if self.nodes.contains_key(&child_id) {
                self.emit_group(child_id, blocks, visited)?;
            }
        }
        Ok(())
    }
}

struct WalkFrame {
    group_id: CrdtId,
    items: std::vec::IntoIter<CrdtId>,
    declared: std::vec::IntoIter<CrdtId>,
}

/// Lazy depth-first iterator over a [`SceneTree`].
pub struct SceneWalk<'a> {
    tree: &'a SceneTree,
    stack: Vec<WalkFrame>,
    visited: std::collections::BTreeSet<CrdtId>,
    pending_error: Option<SceneError>,
    failed: bool,
}

impl<'a> SceneWalk<'a> {
    fn descend(&mut self, child_id: CrdtId) -> Result<(), SceneError> {
        if self.tree.node(child_id).is_some() && self.visited.insert(child_id) {
            let frame = self.tree.frame_for(child_id)?;
            self.stack.push(frame);
        }
        Ok(())
    }
}

impl<'a> Iterator for SceneWalk<'a> {
    type Item = Result<(CrdtId, &'a SceneItem), SceneError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some(err) = self.pending_error.take() {
            self.failed = true;
            return Some(Err(err));
        }
        let tree = self.tree;
        loop {
            enum Step {
                Item(CrdtId, CrdtId),
                Descend(CrdtId),
                Pop,
            }
            let step = {
                let frame = self.stack.last_mut()?;
                if let Some(item_id) = frame.items.next() {
                    Step::Item(frame.group_id, item_id)
                } else if let Some(child_id) = frame.declared.next() {
                    Step::Descend(child_id)
                } else {
                    Step::Pop
                }
            };
            match step {
                Step::Pop => {
                    self.stack.pop();
                }
                Step::Descend(child_id) => {
                    if let Err(err) = self.descend(child_id) {
                        self.failed = true;
                        return Some(Err(err));
                    }
                }
                Step::Item(group_id, item_id) => {
                    let Some(group) = tree.node(group_id) else {
                        continue;
                    };
                    let Some(entry) = group.children.item(&item_id) else {
                        continue;
                    };
                    let Some(item) = entry.payload.value() else {
                        continue;
                    };
                    if let SceneItem::Group(child_id) = item {
                        if let Err(err) = self.descend(*child_id) {
                            self.failed = true;
                            return Some(Err(err));
                        }
                    }
                    return Some(Ok((item_id, item)));
                }
            }
        }
    }
}
