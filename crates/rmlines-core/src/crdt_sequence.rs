//! Ordered CRDT container and its topological linearisation.

use std::collections::{BTreeMap, BTreeSet};

use crate::crdt_id::CrdtId;
use crate::error::SceneError;

/// The payload of a sequence entry.
///
/// A deleted run and a live value are mutually exclusive by
/// construction: a tombstone has no value, a value has no deleted
/// length. Valueless non-deleted entries (scene text items) are
/// modelled as tombstones of length zero.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemPayload<T> {
    Value(T),
    Tombstone { length: u32 },
}

impl<T> ItemPayload<T> {
    /// Returns the live value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            ItemPayload::Value(v) => Some(v),
            ItemPayload::Tombstone { .. } => None,
        }
    }

    /// Length of the deleted run; zero for live values.
    pub fn deleted_length(&self) -> u32 {
        match self {
            ItemPayload::Value(_) => 0,
            ItemPayload::Tombstone { length } => *length,
        }
    }
}

/// One entry of a [`CrdtSequence`]: a payload anchored between the
/// entries that were its neighbours at insertion time.
///
/// `left_id` and `right_id` refer either to another entry of the same
/// sequence or to [`CrdtId::END_MARKER`].
#[derive(Debug, Clone, PartialEq)]
pub struct CrdtSequenceItem<T> {
    pub item_id: CrdtId,
    pub left_id: CrdtId,
    pub right_id: CrdtId,
    pub payload: ItemPayload<T>,
}

impl<T> CrdtSequenceItem<T> {
    /// Maps the payload value, keeping ids and tombstones intact.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CrdtSequenceItem<U> {
        CrdtSequenceItem {
            item_id: self.item_id,
            left_id: self.left_id,
            right_id: self.right_id,
            payload: match self.payload {
                ItemPayload::Value(v) => ItemPayload::Value(f(v)),
                ItemPayload::Tombstone { length } => ItemPayload::Tombstone { length },
            },
        }
    }
}

/// Sort graph node: the start sentinel, a concrete id, or the end
/// sentinel. Derived `Ord` places `Start` before every id and `End`
/// after, with ids in ascending lexicographic order between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Start,
    Id(CrdtId),
    End,
}

/// An ordered container keyed by CRDT ids.
///
/// Entries are stored by id; the canonical order is recovered on demand
/// by a layered topological sort over the left/right relation (see
/// [`CrdtSequence::sorted_ids`]).
#[derive(Debug, Clone, PartialEq)]
pub struct CrdtSequence<T> {
    items: BTreeMap<CrdtId, CrdtSequenceItem<T>>,
}

impl<T> Default for CrdtSequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CrdtSequence<T> {
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }

    /// Builds a sequence from items, rejecting duplicate ids.
    pub fn from_items(
        items: impl IntoIterator<Item = CrdtSequenceItem<T>>,
    ) -> Result<Self, SceneError> {
        let mut seq = Self::new();
        for item in items {
            seq.insert(item)?;
        }
        Ok(seq)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Inserts an entry. Ids are unique within a sequence; a second
    /// entry with the same id is rejected.
    pub fn insert(&mut self, item: CrdtSequenceItem<T>) -> Result<(), SceneError> {
        if self.items.contains_key(&item.item_id) {
            return Err(SceneError::DuplicateItem(item.item_id));
        }
        self.items.insert(item.item_id, item);
        Ok(())
    }

    /// Returns the live value stored under `id`, if any.
    pub fn lookup(&self, id: &CrdtId) -> Option<&T> {
        self.items.get(id).and_then(|item| item.payload.value())
    }

    /// Returns the full entry stored under `id`.
    pub fn item(&self, id: &CrdtId) -> Option<&CrdtSequenceItem<T>> {
        self.items.get(id)
    }

    /// Iterates entries in id order (not sequence order).
    pub fn iter(&self) -> impl Iterator<Item = &CrdtSequenceItem<T>> {
        self.items.values()
    }

    /// Returns the ids in canonical sequence order.
    ///
    /// The order is the layered (Kahn) topological sort of the
    /// `comes_after` relation induced by each entry's left/right
    /// references, with start/end sentinels and ascending-id
    /// tie-breaking within a layer. The result is deterministic for
    /// equal inputs. Fails with [`SceneError::CyclicOrder`] when the
    /// relation contains a cycle.
    pub fn sorted_ids(&self) -> Result<Vec<CrdtId>, SceneError> {
        if self.items.is_empty() {
            return Ok(Vec::new());
        }

        // comes_after[n] is the set of nodes that must precede n.
        let mut comes_after: BTreeMap<SortKey, BTreeSet<SortKey>> = BTreeMap::new();
        comes_after.entry(SortKey::Start).or_default();
        comes_after.entry(SortKey::End).or_default();

        for item in self.items.values() {
            let left = if item.left_id.is_end_marker() || self.items.contains_key(&item.left_id) {
                SortKey::Id(item.left_id)
            } else {
                SortKey::Start
            };
            comes_after.entry(left).or_default();
            comes_after
                .entry(SortKey::Id(item.item_id))
                .or_default()
                .insert(left);

            let right = if self.items.contains_key(&item.right_id) {
                SortKey::Id(item.right_id)
            } else {
                SortKey::End
            };
            comes_after.entry(right).or_default().insert(SortKey::Id(item.item_id));
        }

        let mut result = Vec::with_capacity(self.items.len());
        while !comes_after.is_empty() {
            let mut layer: Vec<SortKey> = comes_after
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(key, _)| *key)
                .collect();

            if layer == [SortKey::End] && comes_after.len() == 1 {
                break;
            }
            // The end sentinel is only peeled once it stands alone.
            layer.retain(|key| *key != SortKey::End);
            if layer.is_empty() {
                return Err(SceneError::CyclicOrder);
            }

            for key in &layer {
                comes_after.remove(key);
            }
            for deps in comes_after.values_mut() {
                for key in &layer {
                    deps.remove(key);
                }
            }
            for key in layer {
                if let SortKey::Id(id) = key {
                    if self.items.contains_key(&id) {
                        result.push(id);
                    }
                }
            }
        }
        Ok(result)
    }

    /// Live values in canonical order; tombstones are skipped.
    pub fn sorted_values(&self) -> Result<Vec<&T>, SceneError> {
        Ok(self
            .sorted_ids()?
            .into_iter()
            .filter_map(|id| self.lookup(&id))
            .collect())
    }

    /// `(id, value)` pairs for live values in canonical order.
    pub fn sorted_pairs(&self) -> Result<Vec<(CrdtId, &T)>, SceneError> {
        Ok(self
            .sorted_ids()?
            .into_iter()
            .filter_map(|id| self.lookup(&id).map(|value| (id, value)))
            .collect())
    }
}
