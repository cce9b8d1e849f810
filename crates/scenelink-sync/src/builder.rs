// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tree builder: sequential, depth-capped traversal of the remote graph.
//!
//! Every remote call is awaited before the next one is issued. Siblings are
//! expanded in array order and a node's child list is complete before any of
//! its children is expanded.

use std::time::Duration;

use scenelink_proto::{AttrInfo, Handle, PinInfo, RemoteError, RemoteGraph};
use tracing::{debug, info, warn};

use crate::node::{Child, ItemKind, NodeRecord};
use crate::scene::Scene;
use crate::SyncError;

/// Default traversal depth cap.
pub const DEFAULT_MAX_DEPTH: u32 = 5;
/// Default pause between top-level subtree expansions.
pub const DEFAULT_SIBLING_DELAY: Duration = Duration::from_millis(25);

/// Bounds on traversal work and request rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalLimits {
    /// Deepest level a record may be discovered at (top level is 1).
    pub max_depth: u32,
    /// Pause between expanding consecutive top-level items in a full build.
    pub sibling_delay: Duration,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            sibling_delay: DEFAULT_SIBLING_DELAY,
        }
    }
}

impl TraversalLimits {
    /// Limits without the inter-sibling pause.
    pub fn unthrottled(max_depth: u32) -> Self {
        Self {
            max_depth,
            sibling_delay: Duration::ZERO,
        }
    }
}

/// Rebuild `scene` from the remote root graph.
///
/// Failing to reach the root graph or list its items aborts before the mirror
/// is touched. Anything below that is best effort.
pub(crate) async fn build_full<R: RemoteGraph>(
    remote: &mut R,
    scene: &mut Scene,
    limits: &TraversalLimits,
) -> Result<(), SyncError> {
    let root = remote.root_graph().await?;
    let items = remote.owned_items(root).await?;
    scene.reset(root);
    debug!(%root, items = items.len(), "full build: top level");

    for item in items {
        match register(remote, scene, item, 1, None).await {
            Ok(_) => scene.push_top_level(item),
            Err(err) => warn!(%item, %err, "skipping top-level item"),
        }
    }

    let top = scene.tree.clone();
    for (i, handle) in top.into_iter().enumerate() {
        if i > 0 && !limits.sibling_delay.is_zero() {
            tokio::time::sleep(limits.sibling_delay).await;
        }
        expand_subtree(remote, scene, limits, handle).await;
    }
    info!(
        top_level = scene.tree.len(),
        records = scene.map.len(),
        "full build complete"
    );
    Ok(())
}

/// Materialize one item at top level and expand only its subtree.
pub(crate) async fn build_incremental<R: RemoteGraph>(
    remote: &mut R,
    scene: &mut Scene,
    limits: &TraversalLimits,
    handle: Handle,
) -> Result<(), SyncError> {
    materialize(remote, scene, limits, handle, 1, None).await?;
    scene.push_top_level(handle);
    Ok(())
}

/// Register `handle` at `level` and, if it was not mirrored yet, expand it.
pub(crate) async fn materialize<R: RemoteGraph>(
    remote: &mut R,
    scene: &mut Scene,
    limits: &TraversalLimits,
    handle: Handle,
    level: u32,
    pin: Option<PinInfo>,
) -> Result<(), SyncError> {
    if register(remote, scene, handle, level, pin).await? {
        expand_subtree(remote, scene, limits, handle).await;
    }
    Ok(())
}

/// Ensure a record exists for `handle`. Returns `true` when it was created.
///
/// Known handles keep their metadata; only the pin slot they were reached
/// through is refreshed.
async fn register<R: RemoteGraph>(
    remote: &mut R,
    scene: &mut Scene,
    handle: Handle,
    level: u32,
    pin: Option<PinInfo>,
) -> Result<bool, RemoteError> {
    if let Some(record) = scene.map.get_mut(handle) {
        if pin.is_some() {
            record.pin_info = pin;
        }
        return Ok(false);
    }
    let name = remote.item_name(handle).await?;
    let type_tag = remote.item_type(handle).await?;
    let is_graph = remote.is_graph(handle).await?;
    debug!(%handle, %name, %type_tag, level, "discovered");
    scene
        .map
        .insert(NodeRecord::new(handle, name, type_tag, level, is_graph, pin));
    Ok(true)
}

async fn expand_subtree<R: RemoteGraph>(
    remote: &mut R,
    scene: &mut Scene,
    limits: &TraversalLimits,
    start: Handle,
) {
    let mut stack = vec![start];
    while let Some(handle) = stack.pop() {
        let fresh = expand_children(remote, scene, limits, handle).await;
        stack.extend(fresh.into_iter().rev());
    }
}

/// Fill in the child list of one record. Returns the children that were
/// discovered for the first time, in order.
async fn expand_children<R: RemoteGraph>(
    remote: &mut R,
    scene: &mut Scene,
    limits: &TraversalLimits,
    handle: Handle,
) -> Vec<Handle> {
    let Some(record) = scene.map.get(handle) else {
        return Vec::new();
    };
    let level = record.level;
    let is_graph = record.is_graph();
    if level >= limits.max_depth {
        debug!(%handle, level, "depth cap reached");
        if !is_graph {
            describe_capped_leaf(remote, scene, handle).await;
        }
        return Vec::new();
    }

    let mut children = Vec::new();
    let mut fresh = Vec::new();
    let mut pin_count = 0;

    if is_graph {
        match remote.owned_items(handle).await {
            Ok(items) => {
                for item in items {
                    match register(remote, scene, item, level + 1, None).await {
                        Ok(created) => {
                            children.push(Child::Linked {
                                handle: item,
                                pin: None,
                            });
                            if created {
                                fresh.push(item);
                            }
                        }
                        Err(err) => warn!(graph = %handle, %item, %err, "skipping owned item"),
                    }
                }
            }
            Err(err) => warn!(graph = %handle, %err, "owned items unavailable"),
        }
    } else {
        pin_count = match remote.pin_count(handle).await {
            Ok(count) => count,
            Err(err) => {
                warn!(node = %handle, %err, "pin count unavailable");
                0
            }
        };
        for index in 0..pin_count {
            let pin = match remote.pin_info(handle, index).await {
                Ok(pin) => pin,
                Err(err) => {
                    warn!(node = %handle, index, %err, "skipping pin");
                    continue;
                }
            };
            let source = match remote.connected_node(handle, index).await {
                Ok(source) => source,
                Err(err) => {
                    warn!(node = %handle, index, %err, "skipping pin");
                    continue;
                }
            };
            let Some(source) = source else {
                children.push(Child::Unconnected(pin));
                continue;
            };
            match register(remote, scene, source, level + 1, Some(pin.clone())).await {
                Ok(created) => {
                    children.push(Child::Linked {
                        handle: source,
                        pin: Some(pin),
                    });
                    if created {
                        fresh.push(source);
                    }
                }
                Err(err) => warn!(node = %handle, index, %source, %err, "skipping pin source"),
            }
        }
    }

    let attr = if !is_graph && children.is_empty() {
        fetch_value_attribute(remote, handle).await
    } else {
        None
    };

    if let Some(record) = scene.map.get_mut(handle) {
        match &mut record.kind {
            ItemKind::Graph(info) => info.item_count = children.len(),
            ItemKind::Node(info) => {
                info.pin_count = pin_count;
                info.attr = attr;
            }
        }
        record.children = children;
    }
    fresh
}

async fn fetch_value_attribute<R: RemoteGraph>(
    remote: &mut R,
    handle: Handle,
) -> Option<AttrInfo> {
    match remote.value_attribute(handle).await {
        Ok(attr) => attr,
        Err(err) => {
            debug!(node = %handle, %err, "no value attribute");
            None
        }
    }
}

/// A node at the depth cap has no mirrored children; when it has no pins at
/// all it is a true leaf and still gets its value attribute.
async fn describe_capped_leaf<R: RemoteGraph>(
    remote: &mut R,
    scene: &mut Scene,
    handle: Handle,
) {
    let pin_count = match remote.pin_count(handle).await {
        Ok(count) => count,
        Err(err) => {
            warn!(node = %handle, %err, "pin count unavailable");
            return;
        }
    };
    let attr = if pin_count == 0 {
        fetch_value_attribute(remote, handle).await
    } else {
        None
    };
    if let Some(record) = scene.map.get_mut(handle) {
        if let ItemKind::Node(info) = &mut record.kind {
            info.pin_count = pin_count;
            info.attr = attr;
        }
    }
}
