// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scene aggregate: top-level tree, identity map and derived queries.

use std::collections::BTreeSet;

use scenelink_proto::{Handle, PinInfo};

use crate::identity::IdentityMap;
use crate::node::{Child, NodeRecord};

/// Pin connection derived from the mirrored child slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Connection {
    /// Node feeding the pin.
    pub source: Handle,
    /// Node owning the pin.
    pub target: Handle,
    /// Pin index on `target`.
    pub pin_index: u32,
}

/// Local mirror of the remote graph.
///
/// Observers receive `&Scene` after each event; it is mutated in place by the
/// next operation and is not a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scene {
    pub(crate) root: Option<Handle>,
    pub(crate) tree: Vec<Handle>,
    pub(crate) map: IdentityMap,
    pub(crate) stale: bool,
}

impl Scene {
    /// Root graph handle from the last full build.
    pub fn root(&self) -> Option<Handle> {
        self.root
    }

    /// Ordered top-level handles.
    pub fn tree(&self) -> &[Handle] {
        &self.tree
    }

    /// Identity map.
    pub fn map(&self) -> &IdentityMap {
        &self.map
    }

    /// Record for `handle`.
    pub fn lookup(&self, handle: Handle) -> Option<&NodeRecord> {
        self.map.get(handle)
    }

    /// True when a post-write reconciliation failed; a full rebuild clears it.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Pin connections currently mirrored, in handle order of the target.
    pub fn connections(&self) -> impl Iterator<Item = Connection> + '_ {
        self.map.iter().flat_map(|(target, record)| {
            record.children.iter().filter_map(move |child| match child {
                Child::Linked {
                    handle,
                    pin: Some(pin),
                } => Some(Connection {
                    source: *handle,
                    target,
                    pin_index: pin.index,
                }),
                _ => None,
            })
        })
    }

    /// Handles reachable from the tree through graph ownership only.
    ///
    /// Anything mirrored but absent from this set is collapsed: it exists only
    /// as the value of some node's pin.
    pub fn expanded(&self) -> BTreeSet<Handle> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<Handle> = self.tree.iter().rev().copied().collect();
        while let Some(handle) = stack.pop() {
            if !seen.insert(handle) {
                continue;
            }
            if let Some(record) = self.map.get(handle) {
                for child in record.children.iter().rev() {
                    if let Child::Linked { handle, pin: None } = child {
                        stack.push(*handle);
                    }
                }
            }
        }
        seen
    }

    /// Whether `handle` is independently visible (not only a pin default).
    pub fn is_expanded(&self, handle: Handle) -> bool {
        self.map.contains(handle) && self.expanded().contains(&handle)
    }

    /// Collapsed descendants that the remote engine destroys along with
    /// `handle`.
    ///
    /// Items owned by a graph inside the subtree are included; pin targets are
    /// included only when they are collapsed. Expanded pin targets end the walk.
    /// `handle` itself is not part of the result.
    pub fn collapsed_cascade(&self, handle: Handle) -> Vec<Handle> {
        let expanded = self.expanded();
        let mut visited = BTreeSet::from([handle]);
        let mut out = Vec::new();
        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            let Some(record) = self.map.get(current) else {
                continue;
            };
            let mut next = Vec::new();
            for child in &record.children {
                let Child::Linked { handle: child, pin } = child else {
                    continue;
                };
                if visited.contains(child) {
                    continue;
                }
                if pin.is_none() || !expanded.contains(child) {
                    visited.insert(*child);
                    out.push(*child);
                    next.push(*child);
                }
            }
            stack.extend(next.into_iter().rev());
        }
        out
    }

    pub(crate) fn reset(&mut self, root: Handle) {
        self.root = Some(root);
        self.tree.clear();
        self.map.clear();
        self.stale = false;
    }

    pub(crate) fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub(crate) fn push_top_level(&mut self, handle: Handle) {
        if !self.tree.contains(&handle) {
            self.tree.push(handle);
        }
    }

    /// Drop records, forget them at top level and detach every slot that
    /// referenced them (owned slots vanish, pin slots become unconnected).
    pub(crate) fn purge(&mut self, handles: &[Handle]) {
        if handles.is_empty() {
            return;
        }
        let gone: BTreeSet<Handle> = handles.iter().copied().collect();
        for handle in &gone {
            self.map.remove(*handle);
        }
        self.tree.retain(|h| !gone.contains(h));
        for record in self.map.values_mut() {
            record.children.retain(|child| {
                !matches!(child, Child::Linked { handle, pin: None } if gone.contains(handle))
            });
            for child in &mut record.children {
                if let Child::Linked {
                    handle,
                    pin: Some(pin),
                } = child
                {
                    if gone.contains(handle) {
                        *child = Child::Unconnected(pin.clone());
                    }
                }
            }
        }
    }

    /// Take records out of the mirror for items the remote engine moved.
    ///
    /// Unlike `purge`, pin slots that referenced the items stay
    /// linked: the connections still exist remotely and are valid again once
    /// the items are mirrored at their new place.
    pub(crate) fn detach(&mut self, handles: &[Handle]) {
        let gone: BTreeSet<Handle> = handles.iter().copied().collect();
        for handle in &gone {
            self.map.remove(*handle);
        }
        self.tree.retain(|h| !gone.contains(h));
        for record in self.map.values_mut() {
            record.children.retain(|child| {
                !matches!(child, Child::Linked { handle, pin: None } if gone.contains(handle))
            });
        }
    }

    /// First mirrored pin slot linked to `source`, with the consumer's level.
    pub(crate) fn pin_consumer(&self, source: Handle) -> Option<(u32, PinInfo)> {
        self.map.iter().find_map(|(_, record)| {
            record.children.iter().find_map(|child| match child {
                Child::Linked {
                    handle,
                    pin: Some(pin),
                } if *handle == source => Some((record.level, pin.clone())),
                _ => None,
            })
        })
    }

    /// Whether pin `index` of `target` is part of the mirror.
    pub(crate) fn has_pin_slot(&self, target: Handle, index: u32) -> bool {
        self.map.get(target).is_some_and(|record| {
            record
                .children
                .iter()
                .any(|child| child.pin().is_some_and(|pin| pin.index == index))
        })
    }

    /// Re-point pin `index` of `target`; returns the pin metadata when the
    /// slot is mirrored.
    pub(crate) fn set_pin_slot(
        &mut self,
        target: Handle,
        index: u32,
        source: Option<Handle>,
    ) -> Option<PinInfo> {
        let record = self.map.get_mut(target)?;
        let slot = record
            .children
            .iter_mut()
            .find(|child| child.pin().is_some_and(|pin| pin.index == index))?;
        let pin = slot.pin()?.clone();
        *slot = match source {
            Some(handle) => Child::Linked {
                handle,
                pin: Some(pin.clone()),
            },
            None => Child::Unconnected(pin.clone()),
        };
        if let Some(handle) = source {
            if let Some(source) = self.map.get_mut(handle) {
                source.pin_info = Some(pin.clone());
            }
        }
        Some(pin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ItemKind, NodeInfo};

    fn h(raw: u64) -> Handle {
        Handle::from_raw(raw).unwrap()
    }

    fn pin(index: u32) -> PinInfo {
        PinInfo {
            index,
            label: format!("in{index}"),
            color: [255, 255, 255, 255],
            value_type: "geometry".into(),
        }
    }

    fn node(scene: &mut Scene, raw: u64, level: u32, graph: bool, children: Vec<Child>) {
        let mut record = NodeRecord::new(
            h(raw),
            format!("n{raw}"),
            if graph { "graph" } else { "geo" }.into(),
            level,
            graph,
            None,
        );
        record.children = children;
        scene.map.insert(record);
    }

    fn linked(raw: u64, index: u32) -> Child {
        Child::Linked {
            handle: h(raw),
            pin: Some(pin(index)),
        }
    }

    fn owned(raw: u64) -> Child {
        Child::Linked {
            handle: h(raw),
            pin: None,
        }
    }

    // 1, 2 top level; 2 pin0 -> 1 (expanded), 2 pin1 -> 3 (default) -> pin0 -> 4 (default)
    // 5 top-level graph owning 6; 6 pin0 -> 7 (default)
    fn fixture() -> Scene {
        let mut scene = Scene::default();
        node(&mut scene, 1, 1, false, vec![]);
        node(&mut scene, 2, 1, false, vec![linked(1, 0), linked(3, 1)]);
        node(&mut scene, 3, 2, false, vec![linked(4, 0)]);
        node(&mut scene, 4, 3, false, vec![]);
        node(&mut scene, 5, 1, true, vec![owned(6)]);
        node(&mut scene, 6, 2, false, vec![linked(7, 0)]);
        node(&mut scene, 7, 3, false, vec![]);
        scene.tree = vec![h(1), h(2), h(5)];
        scene
    }

    #[test]
    fn expanded_follows_ownership_only() {
        let scene = fixture();
        let expanded: Vec<u64> = scene.expanded().iter().map(|h| h.get()).collect();
        assert_eq!(expanded, vec![1, 2, 5, 6]);
        assert!(!scene.is_expanded(h(3)));
        assert!(!scene.is_expanded(h(99)));
    }

    #[test]
    fn cascade_stops_at_expanded_pin_targets() {
        let scene = fixture();
        assert_eq!(scene.collapsed_cascade(h(2)), vec![h(3), h(4)]);
        assert!(scene.collapsed_cascade(h(1)).is_empty());
    }

    #[test]
    fn cascade_of_graph_includes_owned_items() {
        let scene = fixture();
        assert_eq!(scene.collapsed_cascade(h(5)), vec![h(6), h(7)]);
    }

    #[test]
    fn cascade_survives_cycles() {
        let mut scene = Scene::default();
        node(&mut scene, 1, 1, false, vec![linked(2, 0)]);
        node(&mut scene, 2, 2, false, vec![linked(1, 0)]);
        scene.tree = vec![h(1)];
        assert_eq!(scene.collapsed_cascade(h(1)), vec![h(2)]);
    }

    #[test]
    fn purge_detaches_referencing_slots() {
        let mut scene = fixture();
        scene.purge(&[h(1), h(6)]);
        assert!(scene.lookup(h(1)).is_none());
        assert_eq!(scene.tree(), &[h(2), h(5)]);
        let two = scene.lookup(h(2)).unwrap();
        assert_eq!(two.children[0], Child::Unconnected(pin(0)));
        assert!(scene.lookup(h(5)).unwrap().children.is_empty());
    }

    #[test]
    fn detach_keeps_pin_links_to_moved_items() {
        let mut scene = fixture();
        scene.detach(&[h(1), h(6), h(7)]);
        assert!(scene.lookup(h(1)).is_none());
        assert_eq!(scene.tree(), &[h(2), h(5)]);
        assert_eq!(scene.lookup(h(2)).unwrap().pin_source(0), Some(h(1)));
        assert!(scene.lookup(h(5)).unwrap().children.is_empty());
        assert_eq!(scene.pin_consumer(h(1)), Some((1, pin(0))));
        assert_eq!(scene.pin_consumer(h(5)), None);
    }

    #[test]
    fn pin_slots_exist_only_where_mirrored() {
        let scene = fixture();
        assert!(scene.has_pin_slot(h(2), 1));
        assert!(!scene.has_pin_slot(h(2), 2));
        assert!(!scene.has_pin_slot(h(4), 0));
        assert!(!scene.has_pin_slot(h(99), 0));
    }

    #[test]
    fn set_pin_slot_rewires_and_tags_source() {
        let mut scene = fixture();
        let info = scene.set_pin_slot(h(2), 1, Some(h(1))).unwrap();
        assert_eq!(info.index, 1);
        assert_eq!(scene.lookup(h(2)).unwrap().pin_source(1), Some(h(1)));
        assert_eq!(scene.lookup(h(1)).unwrap().pin_info, Some(pin(1)));
        scene.set_pin_slot(h(2), 1, None);
        assert_eq!(scene.lookup(h(2)).unwrap().pin_source(1), None);
        assert!(scene.set_pin_slot(h(2), 9, None).is_none());
    }

    #[test]
    fn connections_are_derived_from_pin_slots() {
        let scene = fixture();
        let edges: Vec<(u64, u64, u32)> = scene
            .connections()
            .map(|c| (c.source.get(), c.target.get(), c.pin_index))
            .collect();
        assert_eq!(edges, vec![(1, 2, 0), (3, 2, 1), (4, 3, 0), (7, 6, 0)]);
    }

    #[test]
    fn leaf_records_start_without_attribute() {
        let scene = fixture();
        assert_eq!(
            scene.lookup(h(4)).unwrap().kind,
            ItemKind::Node(NodeInfo::default())
        );
    }
}
