// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scriptable in-memory render graph implementing [`RemoteGraph`].
//!
//! The fake keeps the remote engine's side effects that the mirror has to
//! follow: destroying a node takes its collapsed defaults with it, connecting
//! over a default destroys the default, groups move ownership. Unowned nodes
//! (no parent graph) play the role of collapsed defaults.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use scenelink_proto::{
    AttrInfo, AttrValue, ConnectOptions, Handle, PinInfo, RemoteError, RemoteGraph,
};

/// Error code for injected failures.
pub const INJECTED_FAILURE: u32 = 1;
/// Error code for calls naming an item that does not exist.
pub const NO_SUCH_ITEM: u32 = 2;
/// Error code for calls that do not apply to the item.
pub const WRONG_KIND: u32 = 3;
/// Error code for a rejected cyclic connection.
pub const WOULD_CYCLE: u32 = 4;

#[derive(Debug, Clone)]
struct FakePin {
    info: PinInfo,
    source: Option<Handle>,
}

#[derive(Debug, Clone)]
enum Body {
    Graph {
        owned: Vec<Handle>,
    },
    Node {
        pins: Vec<FakePin>,
        attr: Option<(AttrInfo, AttrValue)>,
    },
}

#[derive(Debug, Clone)]
struct FakeItem {
    name: String,
    type_tag: String,
    parent: Option<Handle>,
    body: Body,
}

#[derive(Debug)]
struct FakeState {
    items: BTreeMap<Handle, FakeItem>,
    root: Handle,
    next: Handle,
    calls: HashMap<&'static str, usize>,
    name_fetches: HashMap<Handle, usize>,
    failures: Vec<(&'static str, Option<Handle>)>,
}

/// In-memory remote graph. Clones share state.
#[derive(Debug, Clone)]
pub struct FakeRemote {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

fn call_error(op: &str, code: u32, message: impl Into<String>) -> RemoteError {
    RemoteError::Call {
        op: op.to_string(),
        code,
        message: message.into(),
    }
}

impl FakeState {
    fn alloc(&mut self, item: FakeItem) -> Handle {
        let handle = self.next;
        self.next = handle.successor();
        self.items.insert(handle, item);
        handle
    }

    fn enter(&mut self, op: &'static str, target: Option<Handle>) -> Result<(), RemoteError> {
        *self.calls.entry(op).or_default() += 1;
        let injected = self
            .failures
            .iter()
            .any(|(fop, fh)| *fop == op && (fh.is_none() || *fh == target));
        if injected {
            return Err(call_error(op, INJECTED_FAILURE, "injected failure"));
        }
        Ok(())
    }

    fn item(&self, op: &str, handle: Handle) -> Result<&FakeItem, RemoteError> {
        self.items
            .get(&handle)
            .ok_or_else(|| call_error(op, NO_SUCH_ITEM, format!("no item {handle}")))
    }

    fn item_mut(&mut self, op: &str, handle: Handle) -> Result<&mut FakeItem, RemoteError> {
        self.items
            .get_mut(&handle)
            .ok_or_else(|| call_error(op, NO_SUCH_ITEM, format!("no item {handle}")))
    }

    fn owned_mut(&mut self, op: &str, graph: Handle) -> Result<&mut Vec<Handle>, RemoteError> {
        match &mut self.item_mut(op, graph)?.body {
            Body::Graph { owned } => Ok(owned),
            Body::Node { .. } => Err(call_error(op, WRONG_KIND, format!("{graph} is not a graph"))),
        }
    }

    fn pins(&self, op: &str, node: Handle) -> Result<&[FakePin], RemoteError> {
        match &self.item(op, node)?.body {
            Body::Node { pins, .. } => Ok(pins),
            Body::Graph { .. } => Err(call_error(op, WRONG_KIND, format!("{node} is not a node"))),
        }
    }

    fn pin_mut(&mut self, op: &str, node: Handle, index: u32) -> Result<&mut FakePin, RemoteError> {
        match &mut self.item_mut(op, node)?.body {
            Body::Node { pins, .. } => pins.get_mut(index as usize).ok_or_else(|| {
                call_error(op, NO_SUCH_ITEM, format!("{node} has no pin {index}"))
            }),
            Body::Graph { .. } => Err(call_error(op, WRONG_KIND, format!("{node} is not a node"))),
        }
    }

    fn is_collapsed(&self, handle: Handle) -> bool {
        handle != self.root
            && self
                .items
                .get(&handle)
                .is_some_and(|item| item.parent.is_none())
    }

    /// Items destroyed along with `handle`: owned items and collapsed pin
    /// sources, transitively.
    fn destruction_set(&self, handle: Handle) -> BTreeSet<Handle> {
        let mut doomed = BTreeSet::new();
        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            if !doomed.insert(current) {
                continue;
            }
            let Some(item) = self.items.get(&current) else {
                continue;
            };
            match &item.body {
                Body::Graph { owned } => stack.extend(owned.iter().copied()),
                Body::Node { pins, .. } => stack.extend(
                    pins.iter()
                        .filter_map(|pin| pin.source)
                        .filter(|source| self.is_collapsed(*source)),
                ),
            }
        }
        doomed
    }

    fn destroy_all(&mut self, doomed: &BTreeSet<Handle>) {
        for handle in doomed {
            self.items.remove(handle);
        }
        for item in self.items.values_mut() {
            match &mut item.body {
                Body::Graph { owned } => owned.retain(|h| !doomed.contains(h)),
                Body::Node { pins, .. } => {
                    for pin in pins {
                        if pin.source.is_some_and(|s| doomed.contains(&s)) {
                            pin.source = None;
                        }
                    }
                }
            }
        }
    }

    /// Whether `from` reaches `to` through pin sources.
    fn depends_on(&self, from: Handle, to: Handle) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(FakeItem {
                body: Body::Node { pins, .. },
                ..
            }) = self.items.get(&current)
            {
                stack.extend(pins.iter().filter_map(|pin| pin.source));
            }
        }
        false
    }

    /// Deep copy of `handle` into `parent`; collapsed sources are copied too.
    fn clone_item(&mut self, handle: Handle, parent: Option<Handle>) -> Option<Handle> {
        let mut item = self.items.get(&handle)?.clone();
        item.parent = parent;
        if parent.is_some() {
            item.name = format!("{} copy", item.name);
        }
        let copy = self.alloc(item.clone());
        let body = match item.body {
            Body::Graph { owned } => Body::Graph {
                owned: owned
                    .into_iter()
                    .filter_map(|child| self.clone_item(child, Some(copy)))
                    .collect(),
            },
            Body::Node { pins, attr } => Body::Node {
                pins: pins
                    .into_iter()
                    .map(|mut pin| {
                        if let Some(source) = pin.source {
                            if self.is_collapsed(source) {
                                pin.source = self.clone_item(source, None);
                            }
                        }
                        pin
                    })
                    .collect(),
                attr,
            },
        };
        if let Some(slot) = self.items.get_mut(&copy) {
            slot.body = body;
        }
        Some(copy)
    }
}

impl FakeRemote {
    /// Empty project: one root graph.
    pub fn new() -> Self {
        let root = Handle::MIN;
        let mut items = BTreeMap::new();
        items.insert(
            root,
            FakeItem {
                name: "root".into(),
                type_tag: "graph".into(),
                parent: None,
                body: Body::Graph { owned: Vec::new() },
            },
        );
        Self {
            state: Arc::new(Mutex::new(FakeState {
                items,
                root,
                next: root.successor(),
                calls: HashMap::new(),
                name_fetches: HashMap::new(),
                failures: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Root graph handle.
    pub fn root(&self) -> Handle {
        self.lock().root
    }

    fn add_owned(&self, parent: Handle, name: &str, type_tag: &str, body: Body) -> Handle {
        let mut state = self.lock();
        let handle = state.alloc(FakeItem {
            name: name.into(),
            type_tag: type_tag.into(),
            parent: Some(parent),
            body,
        });
        if let Some(FakeItem {
            body: Body::Graph { owned },
            ..
        }) = state.items.get_mut(&parent)
        {
            owned.push(handle);
        }
        handle
    }

    /// Add a sub-graph owned by `parent`.
    pub fn add_graph(&self, parent: Handle, name: &str) -> Handle {
        self.add_owned(parent, name, "graph", Body::Graph { owned: Vec::new() })
    }

    /// Add a pinless node owned by `parent`.
    pub fn add_node(&self, parent: Handle, name: &str, type_tag: &str) -> Handle {
        self.add_owned(
            parent,
            name,
            type_tag,
            Body::Node {
                pins: Vec::new(),
                attr: None,
            },
        )
    }

    /// Append an unconnected input pin to `node`; returns its index.
    pub fn add_pin(&self, node: Handle, label: &str) -> u32 {
        let mut state = self.lock();
        let Some(FakeItem {
            body: Body::Node { pins, .. },
            ..
        }) = state.items.get_mut(&node)
        else {
            return 0;
        };
        let index = u32::try_from(pins.len()).unwrap_or(u32::MAX);
        pins.push(FakePin {
            info: PinInfo {
                index,
                label: label.into(),
                color: [200, 200, 200, 255],
                value_type: "any".into(),
            },
            source: None,
        });
        index
    }

    /// Feed pin `index` of `target` from `source` without side effects.
    pub fn link(&self, target: Handle, index: u32, source: Handle) {
        if let Ok(pin) = self.lock().pin_mut("link", target, index) {
            pin.source = Some(source);
        }
    }

    /// Create an unowned node feeding pin `index` of `target`.
    pub fn add_default(&self, target: Handle, index: u32, name: &str, type_tag: &str) -> Handle {
        let handle = self.lock().alloc(FakeItem {
            name: name.into(),
            type_tag: type_tag.into(),
            parent: None,
            body: Body::Node {
                pins: Vec::new(),
                attr: None,
            },
        });
        self.link(target, index, handle);
        handle
    }

    /// Give `node` a value attribute with id `attr_id`.
    pub fn set_value_attr(&self, node: Handle, attr_id: u32, value: AttrValue) {
        let mut state = self.lock();
        if let Some(FakeItem {
            body: Body::Node { attr, .. },
            ..
        }) = state.items.get_mut(&node)
        {
            let info = AttrInfo {
                attr_id,
                attr_type: value.attr_type(),
            };
            *attr = Some((info, value));
        }
    }

    /// Current value attribute of `node`.
    pub fn value_of(&self, node: Handle) -> Option<AttrValue> {
        match &self.lock().items.get(&node)?.body {
            Body::Node { attr, .. } => attr.as_ref().map(|(_, value)| value.clone()),
            Body::Graph { .. } => None,
        }
    }

    /// Whether `handle` still exists remotely.
    pub fn contains(&self, handle: Handle) -> bool {
        self.lock().items.contains_key(&handle)
    }

    /// Source currently feeding pin `index` of `node`.
    pub fn pin_source(&self, node: Handle, index: u32) -> Option<Handle> {
        let state = self.lock();
        state
            .pins("pin_source", node)
            .ok()?
            .get(index as usize)?
            .source
    }

    /// Items owned by `graph`.
    pub fn owned(&self, graph: Handle) -> Vec<Handle> {
        match self.lock().items.get(&graph).map(|item| &item.body) {
            Some(Body::Graph { owned }) => owned.clone(),
            _ => Vec::new(),
        }
    }

    /// Number of calls made to `op` since the last reset.
    pub fn call_count(&self, op: &str) -> usize {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    /// Number of `item_name` calls made for `handle`.
    pub fn name_fetches(&self, handle: Handle) -> usize {
        self.lock().name_fetches.get(&handle).copied().unwrap_or(0)
    }

    /// Forget all call counters.
    pub fn reset_counts(&self) {
        let mut state = self.lock();
        state.calls.clear();
        state.name_fetches.clear();
    }

    /// Fail every `op` call, or only those addressing `target`.
    pub fn fail_on(&self, op: &'static str, target: Option<Handle>) {
        self.lock().failures.push((op, target));
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }
}

impl RemoteGraph for FakeRemote {
    async fn root_graph(&mut self) -> Result<Handle, RemoteError> {
        let mut state = self.lock();
        state.enter("root_graph", None)?;
        Ok(state.root)
    }

    async fn owned_items(&mut self, graph: Handle) -> Result<Vec<Handle>, RemoteError> {
        let mut state = self.lock();
        state.enter("owned_items", Some(graph))?;
        Ok(state.owned_mut("owned_items", graph)?.clone())
    }

    async fn item_name(&mut self, item: Handle) -> Result<String, RemoteError> {
        let mut state = self.lock();
        state.enter("item_name", Some(item))?;
        *state.name_fetches.entry(item).or_default() += 1;
        Ok(state.item("item_name", item)?.name.clone())
    }

    async fn item_type(&mut self, item: Handle) -> Result<String, RemoteError> {
        let mut state = self.lock();
        state.enter("item_type", Some(item))?;
        Ok(state.item("item_type", item)?.type_tag.clone())
    }

    async fn is_graph(&mut self, item: Handle) -> Result<bool, RemoteError> {
        let mut state = self.lock();
        state.enter("is_graph", Some(item))?;
        Ok(matches!(state.item("is_graph", item)?.body, Body::Graph { .. }))
    }

    async fn destroy(&mut self, item: Handle) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter("destroy", Some(item))?;
        state.item("destroy", item)?;
        if item == state.root {
            return Err(call_error("destroy", WRONG_KIND, "cannot destroy the root graph"));
        }
        let doomed = state.destruction_set(item);
        state.destroy_all(&doomed);
        Ok(())
    }

    async fn pin_count(&mut self, node: Handle) -> Result<u32, RemoteError> {
        let mut state = self.lock();
        state.enter("pin_count", Some(node))?;
        let count = state.pins("pin_count", node)?.len();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn pin_info(&mut self, node: Handle, index: u32) -> Result<PinInfo, RemoteError> {
        let mut state = self.lock();
        state.enter("pin_info", Some(node))?;
        Ok(state.pin_mut("pin_info", node, index)?.info.clone())
    }

    async fn connected_node(
        &mut self,
        node: Handle,
        index: u32,
    ) -> Result<Option<Handle>, RemoteError> {
        let mut state = self.lock();
        state.enter("connected_node", Some(node))?;
        Ok(state.pin_mut("connected_node", node, index)?.source)
    }

    async fn connect_pin(
        &mut self,
        node: Handle,
        index: u32,
        source: Option<Handle>,
        options: ConnectOptions,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter("connect_pin", Some(node))?;
        if let Some(source) = source {
            state.item("connect_pin", source)?;
            if options.check_cycles && state.depends_on(source, node) {
                return Err(call_error(
                    "connect_pin",
                    WOULD_CYCLE,
                    format!("{source} depends on {node}"),
                ));
            }
        }
        let previous = state.pin_mut("connect_pin", node, index)?.source;
        state.pin_mut("connect_pin", node, index)?.source = source;
        if let Some(previous) = previous {
            if Some(previous) != source && state.is_collapsed(previous) {
                let doomed = state.destruction_set(previous);
                state.destroy_all(&doomed);
            }
        }
        Ok(())
    }

    async fn value_attribute(&mut self, node: Handle) -> Result<Option<AttrInfo>, RemoteError> {
        let mut state = self.lock();
        state.enter("value_attribute", Some(node))?;
        match &state.item("value_attribute", node)?.body {
            Body::Node { attr, .. } => Ok(attr.as_ref().map(|(info, _)| *info)),
            Body::Graph { .. } => Ok(None),
        }
    }

    async fn get_attribute(
        &mut self,
        item: Handle,
        attr_id: u32,
    ) -> Result<AttrValue, RemoteError> {
        let mut state = self.lock();
        state.enter("get_attribute", Some(item))?;
        match &state.item("get_attribute", item)?.body {
            Body::Node {
                attr: Some((info, value)),
                ..
            } if info.attr_id == attr_id => Ok(value.clone()),
            _ => Err(call_error(
                "get_attribute",
                NO_SUCH_ITEM,
                format!("{item} has no attribute {attr_id}"),
            )),
        }
    }

    async fn set_attribute(
        &mut self,
        item: Handle,
        attr_id: u32,
        value: AttrValue,
        _evaluate: bool,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter("set_attribute", Some(item))?;
        match &mut state.item_mut("set_attribute", item)?.body {
            Body::Node {
                attr: Some((info, slot)),
                ..
            } if info.attr_id == attr_id => {
                if info.attr_type != value.attr_type() {
                    return Err(call_error("set_attribute", WRONG_KIND, "type mismatch"));
                }
                *slot = value;
                Ok(())
            }
            _ => Err(call_error(
                "set_attribute",
                NO_SUCH_ITEM,
                format!("{item} has no attribute {attr_id}"),
            )),
        }
    }

    async fn create_node(&mut self, graph: Handle, type_tag: &str) -> Result<Handle, RemoteError> {
        {
            let mut state = self.lock();
            state.enter("create_node", Some(graph))?;
            state.owned_mut("create_node", graph)?;
        }
        Ok(self.add_node(graph, type_tag, type_tag))
    }

    async fn copy_items(
        &mut self,
        graph: Handle,
        items: &[Handle],
    ) -> Result<Vec<Handle>, RemoteError> {
        let mut state = self.lock();
        state.enter("copy_items", Some(graph))?;
        state.owned_mut("copy_items", graph)?;
        for item in items {
            state.item("copy_items", *item)?;
        }
        let copies: Vec<Handle> = items
            .iter()
            .filter_map(|item| state.clone_item(*item, Some(graph)))
            .collect();
        state.owned_mut("copy_items", graph)?.extend(copies.iter().copied());
        Ok(copies)
    }

    async fn group_items(
        &mut self,
        graph: Handle,
        items: &[Handle],
    ) -> Result<Handle, RemoteError> {
        let mut state = self.lock();
        state.enter("group_items", Some(graph))?;
        let owned = state.owned_mut("group_items", graph)?.clone();
        if let Some(stray) = items.iter().find(|item| !owned.contains(*item)) {
            return Err(call_error(
                "group_items",
                WRONG_KIND,
                format!("{stray} is not owned by {graph}"),
            ));
        }
        let group = state.alloc(FakeItem {
            name: "group".into(),
            type_tag: "graph".into(),
            parent: Some(graph),
            body: Body::Graph {
                owned: items.to_vec(),
            },
        });
        for item in items {
            if let Some(moved) = state.items.get_mut(item) {
                moved.parent = Some(group);
            }
        }
        let owned = state.owned_mut("group_items", graph)?;
        owned.retain(|h| !items.contains(h));
        owned.push(group);
        Ok(group)
    }

    async fn ungroup(&mut self, group: Handle) -> Result<Vec<Handle>, RemoteError> {
        let mut state = self.lock();
        state.enter("ungroup", Some(group))?;
        let parent = state
            .item("ungroup", group)?
            .parent
            .ok_or_else(|| call_error("ungroup", WRONG_KIND, format!("{group} has no owner")))?;
        let released = state.owned_mut("ungroup", group)?.clone();
        for item in &released {
            if let Some(moved) = state.items.get_mut(item) {
                moved.parent = Some(parent);
            }
        }
        state.items.remove(&group);
        let owned = state.owned_mut("ungroup", parent)?;
        owned.retain(|h| *h != group);
        owned.extend(released.iter().copied());
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn destroy_takes_collapsed_defaults_along() {
        let mut fake = FakeRemote::new();
        let root = fake.root();
        let mesh = fake.add_node(root, "mesh", "geometry");
        fake.add_pin(mesh, "material");
        let default = fake.add_default(mesh, 0, "mat", "material");
        let shared = fake.add_node(root, "shared", "material");
        fake.add_pin(mesh, "extra");
        fake.link(mesh, 1, shared);

        fake.destroy(mesh).await.unwrap();
        assert!(!fake.contains(default));
        assert!(fake.contains(shared));
        assert_eq!(fake.owned(root), vec![shared]);
    }

    #[tokio::test]
    async fn connect_over_default_destroys_it() {
        let mut fake = FakeRemote::new();
        let root = fake.root();
        let mesh = fake.add_node(root, "mesh", "geometry");
        fake.add_pin(mesh, "material");
        let default = fake.add_default(mesh, 0, "mat", "material");
        let other = fake.add_node(root, "other", "material");

        fake.connect_pin(mesh, 0, Some(other), ConnectOptions::default())
            .await
            .unwrap();
        assert!(!fake.contains(default));
        assert_eq!(fake.pin_source(mesh, 0), Some(other));
    }

    #[tokio::test]
    async fn cycle_check_rejects_loops() {
        let mut fake = FakeRemote::new();
        let root = fake.root();
        let a = fake.add_node(root, "a", "geometry");
        let b = fake.add_node(root, "b", "geometry");
        fake.add_pin(a, "in");
        fake.add_pin(b, "in");
        fake.link(b, 0, a);
        let err = fake
            .connect_pin(a, 0, Some(b), ConnectOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Call { code: WOULD_CYCLE, .. }));
    }

    #[tokio::test]
    async fn injected_failures_are_scoped_and_counted() {
        let mut fake = FakeRemote::new();
        let root = fake.root();
        let a = fake.add_node(root, "a", "geometry");
        let b = fake.add_node(root, "b", "geometry");
        fake.fail_on("item_name", Some(a));
        assert!(fake.item_name(a).await.is_err());
        assert_eq!(fake.item_name(b).await.unwrap(), "b");
        assert_eq!(fake.call_count("item_name"), 2);
        fake.clear_failures();
        assert_eq!(fake.item_name(a).await.unwrap(), "a");
    }

    #[tokio::test]
    async fn group_and_ungroup_move_ownership() {
        let mut fake = FakeRemote::new();
        let root = fake.root();
        let a = fake.add_node(root, "a", "geometry");
        let b = fake.add_node(root, "b", "geometry");
        let group = fake.group_items(root, &[a]).await.unwrap();
        assert_eq!(fake.owned(root), vec![b, group]);
        assert_eq!(fake.owned(group), vec![a]);
        let released = fake.ungroup(group).await.unwrap();
        assert_eq!(released, vec![a]);
        assert_eq!(fake.owned(root), vec![b, a]);
        assert!(!fake.contains(group));
    }
}
