// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Handle-indexed identity map.

use std::collections::BTreeMap;

use scenelink_proto::Handle;

use crate::node::NodeRecord;

/// Deduplicating map from handle to mirrored record.
///
/// Children refer to records by handle, so every place that mentions a handle
/// resolves to the single record stored here. Iteration order is by handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMap {
    records: BTreeMap<Handle, NodeRecord>,
}

impl IdentityMap {
    /// Record for `handle`.
    pub fn get(&self, handle: Handle) -> Option<&NodeRecord> {
        self.records.get(&handle)
    }

    pub(crate) fn get_mut(&mut self, handle: Handle) -> Option<&mut NodeRecord> {
        self.records.get_mut(&handle)
    }

    /// Whether `handle` is mirrored.
    pub fn contains(&self, handle: Handle) -> bool {
        self.records.contains_key(&handle)
    }

    /// Number of mirrored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing is mirrored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &NodeRecord)> + '_ {
        self.records.iter().map(|(h, r)| (*h, r))
    }

    /// Insert a fresh record. An existing record under the same handle is kept.
    ///
    /// Returns `false` when the handle was already present.
    pub(crate) fn insert(&mut self, record: NodeRecord) -> bool {
        use std::collections::btree_map::Entry;
        match self.records.entry(record.handle) {
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub(crate) fn remove(&mut self, handle: Handle) -> Option<NodeRecord> {
        self.records.remove(&handle)
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut NodeRecord> + '_ {
        self.records.values_mut()
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(raw: u64) -> Handle {
        Handle::from_raw(raw).unwrap()
    }

    #[test]
    fn insert_keeps_first_record() {
        let mut map = IdentityMap::default();
        assert!(map.insert(NodeRecord::new(
            h(3),
            "first".into(),
            "geo".into(),
            1,
            false,
            None
        )));
        assert!(!map.insert(NodeRecord::new(
            h(3),
            "second".into(),
            "geo".into(),
            2,
            false,
            None
        )));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(h(3)).unwrap().name, "first");
        assert_eq!(map.get(h(3)).unwrap().level, 1);
    }

    #[test]
    fn iterates_in_handle_order() {
        let mut map = IdentityMap::default();
        for raw in [9, 2, 5] {
            map.insert(NodeRecord::new(
                h(raw),
                String::new(),
                String::new(),
                1,
                false,
                None,
            ));
        }
        let order: Vec<u64> = map.iter().map(|(h, _)| h.get()).collect();
        assert_eq!(order, vec![2, 5, 9]);
    }
}
