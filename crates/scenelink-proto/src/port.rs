// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Remote graph port consumed by the sync engine.

use crate::{AttrInfo, AttrValue, Handle, PinInfo, RemoteError};

/// Flags for a pin connect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Ask the remote engine to reject connections that would form a cycle.
    pub check_cycles: bool,
    /// Ask the remote engine to re-evaluate after the change.
    pub evaluate: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            check_cycles: true,
            evaluate: true,
        }
    }
}

/// Handle-addressed remote graph surface.
///
/// Every call is one round trip to a single render process. Implementations
/// are awaited strictly one at a time by the engine; they never need to
/// handle concurrent calls on the same instance.
///
/// Item arrays are flattened here (`owned_items`, `copy_items`, `ungroup`);
/// transports that see array handles on the wire enumerate them internally.
#[allow(async_fn_in_trait)]
pub trait RemoteGraph {
    /// Root graph of the current project.
    async fn root_graph(&mut self) -> Result<Handle, RemoteError>;

    /// Items owned by `graph`, in remote order.
    async fn owned_items(&mut self, graph: Handle) -> Result<Vec<Handle>, RemoteError>;

    /// Display name of an item.
    async fn item_name(&mut self, item: Handle) -> Result<String, RemoteError>;

    /// Type tag of an item (geometry, material, camera, ...).
    async fn item_type(&mut self, item: Handle) -> Result<String, RemoteError>;

    /// Whether the item is a graph (owns items) rather than a leaf node.
    async fn is_graph(&mut self, item: Handle) -> Result<bool, RemoteError>;

    /// Destroy an item. Collapsed default-value nodes it owns go with it.
    async fn destroy(&mut self, item: Handle) -> Result<(), RemoteError>;

    /// Number of input pins on a node.
    async fn pin_count(&mut self, node: Handle) -> Result<u32, RemoteError>;

    /// Metadata for pin `index`.
    async fn pin_info(&mut self, node: Handle, index: u32) -> Result<PinInfo, RemoteError>;

    /// Node currently feeding pin `index`, if any.
    async fn connected_node(
        &mut self,
        node: Handle,
        index: u32,
    ) -> Result<Option<Handle>, RemoteError>;

    /// Point pin `index` at `source`; `None` clears the pin.
    async fn connect_pin(
        &mut self,
        node: Handle,
        index: u32,
        source: Option<Handle>,
        options: ConnectOptions,
    ) -> Result<(), RemoteError>;

    /// Descriptor of the node's directly editable value, if it has one.
    async fn value_attribute(&mut self, node: Handle) -> Result<Option<AttrInfo>, RemoteError>;

    /// Read an attribute value.
    async fn get_attribute(&mut self, item: Handle, attr_id: u32)
        -> Result<AttrValue, RemoteError>;

    /// Write an attribute value.
    async fn set_attribute(
        &mut self,
        item: Handle,
        attr_id: u32,
        value: AttrValue,
        evaluate: bool,
    ) -> Result<(), RemoteError>;

    /// Create a node of `type_tag` inside `graph`.
    async fn create_node(&mut self, graph: Handle, type_tag: &str) -> Result<Handle, RemoteError>;

    /// Copy `items` (with their internal connections remapped) into `graph`.
    async fn copy_items(
        &mut self,
        graph: Handle,
        items: &[Handle],
    ) -> Result<Vec<Handle>, RemoteError>;

    /// Move `items` into a new sub-graph of `graph`; returns the new group.
    async fn group_items(&mut self, graph: Handle, items: &[Handle])
        -> Result<Handle, RemoteError>;

    /// Dissolve a group into its owner graph; returns the released items.
    async fn ungroup(&mut self, group: Handle) -> Result<Vec<Handle>, RemoteError>;
}
