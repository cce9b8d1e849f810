// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Mirrored node records.

use scenelink_proto::{AttrInfo, Handle, PinInfo};

/// Metadata carried by a sub-graph record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphInfo {
    /// Number of owned items seen at the last expansion.
    pub item_count: usize,
}

/// Metadata carried by a leaf node record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    /// Number of input pins reported at the last expansion.
    pub pin_count: u32,
    /// Directly editable value; only set on nodes without children.
    pub attr: Option<AttrInfo>,
}

/// Graph xor leaf node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    /// Sub-graph whose children are its owned items.
    Graph(GraphInfo),
    /// Leaf node whose children are its input pin slots.
    Node(NodeInfo),
}

impl ItemKind {
    /// True for sub-graphs.
    pub const fn is_graph(&self) -> bool {
        matches!(self, ItemKind::Graph(_))
    }
}

/// One entry of a record's ordered child list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Child {
    /// Reference to another mirrored record.
    ///
    /// `pin` is `None` for graph-owned items and `Some` when the referenced
    /// node feeds one of this node's input pins.
    Linked {
        /// Referenced record.
        handle: Handle,
        /// Pin slot through which the record is referenced.
        pin: Option<PinInfo>,
    },
    /// Input pin with nothing connected; no remote item exists for it.
    Unconnected(PinInfo),
}

impl Child {
    /// Referenced handle, `None` for an unconnected pin.
    pub const fn handle(&self) -> Option<Handle> {
        match self {
            Child::Linked { handle, .. } => Some(*handle),
            Child::Unconnected(_) => None,
        }
    }

    /// Pin metadata, `None` for graph-owned items.
    pub const fn pin(&self) -> Option<&PinInfo> {
        match self {
            Child::Linked { pin, .. } => pin.as_ref(),
            Child::Unconnected(pin) => Some(pin),
        }
    }

    /// True when this entry is an item owned by a graph.
    pub const fn is_owned(&self) -> bool {
        matches!(self, Child::Linked { pin: None, .. })
    }
}

/// Local mirror of one remote item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// Remote identity.
    pub handle: Handle,
    /// Display name.
    pub name: String,
    /// Remote type discriminator.
    pub type_tag: String,
    /// Depth at first discovery (top level is 1).
    pub level: u32,
    /// Graph or leaf metadata.
    pub kind: ItemKind,
    /// Pin slot this record was most recently discovered through.
    pub pin_info: Option<PinInfo>,
    /// Ordered children (owned items or pin slots).
    pub children: Vec<Child>,
}

impl NodeRecord {
    pub(crate) fn new(
        handle: Handle,
        name: String,
        type_tag: String,
        level: u32,
        is_graph: bool,
        pin_info: Option<PinInfo>,
    ) -> Self {
        let kind = if is_graph {
            ItemKind::Graph(GraphInfo::default())
        } else {
            ItemKind::Node(NodeInfo::default())
        };
        Self {
            handle,
            name,
            type_tag,
            level,
            kind,
            pin_info,
            children: Vec::new(),
        }
    }

    /// True for sub-graphs.
    pub const fn is_graph(&self) -> bool {
        self.kind.is_graph()
    }

    /// Value attribute of a childless leaf node.
    pub const fn value_attribute(&self) -> Option<&AttrInfo> {
        match &self.kind {
            ItemKind::Node(info) => info.attr.as_ref(),
            ItemKind::Graph(_) => None,
        }
    }

    /// Handle feeding pin `index`, if the pin slot is mirrored and connected.
    pub fn pin_source(&self, index: u32) -> Option<Handle> {
        self.children.iter().find_map(|child| match child {
            Child::Linked {
                handle,
                pin: Some(pin),
            } if pin.index == index => Some(*handle),
            _ => None,
        })
    }

    /// Handles referenced by child entries, in order.
    pub fn child_handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.children.iter().filter_map(Child::handle)
    }
}
