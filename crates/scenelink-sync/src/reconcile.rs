// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Mutation reconciler: remote write first, then an incremental mirror patch.

use scenelink_proto::{AttrValue, ConnectOptions, Handle, RemoteGraph};
use tracing::{debug, info, warn};

use crate::builder;
use crate::engine::SceneSync;
use crate::notify::SceneEvent;
use crate::SyncError;

/// Result of a successful delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    /// Deleted item.
    pub handle: Handle,
    /// Collapsed descendants the remote engine destroyed with it.
    pub collapsed_children: Vec<Handle>,
}

impl<R: RemoteGraph> SceneSync<R> {
    /// Create a node of `type_tag` in the owner graph and mirror it.
    ///
    /// A failed remote step returns an error and leaves the mirror alone. If
    /// only the mirror update fails, the handle is still returned and the
    /// scene is flagged stale.
    pub async fn create_node(&mut self, type_tag: &str) -> Result<Handle, SyncError> {
        let graph = self.remote.root_graph().await?;
        let handle = self.remote.create_node(graph, type_tag).await?;
        info!(%handle, type_tag, "node created");
        self.reconcile_added(handle).await;
        Ok(handle)
    }

    /// Destroy `handle` remotely and drop it with its collapsed descendants.
    pub async fn delete_node(&mut self, handle: Handle) -> Result<Deletion, SyncError> {
        // Computed before the remote call: the remote side destroys these
        // silently and the mirror must not keep them.
        let collapsed_children = self.scene.collapsed_cascade(handle);
        self.remote.destroy(handle).await?;
        info!(%handle, cascaded = collapsed_children.len(), "node deleted");
        self.drop_records(handle, collapsed_children.clone());
        Ok(Deletion {
            handle,
            collapsed_children,
        })
    }

    /// Feed pin `pin_index` of `target` from `source`.
    ///
    /// The collapsed default previously held by the pin is destroyed by the
    /// remote engine and is purged here as well.
    pub async fn connect(
        &mut self,
        target: Handle,
        pin_index: u32,
        source: Handle,
    ) -> Result<(), SyncError> {
        self.set_pin_source(target, pin_index, Some(source)).await
    }

    /// Clear pin `pin_index` of `target`.
    pub async fn disconnect(&mut self, target: Handle, pin_index: u32) -> Result<(), SyncError> {
        self.set_pin_source(target, pin_index, None).await
    }

    async fn set_pin_source(
        &mut self,
        target: Handle,
        pin_index: u32,
        source: Option<Handle>,
    ) -> Result<(), SyncError> {
        let previous = self
            .scene
            .lookup(target)
            .and_then(|record| record.pin_source(pin_index));
        self.remote
            .connect_pin(target, pin_index, source, ConnectOptions::default())
            .await?;
        info!(%target, pin_index, source = ?source, "pin rewired");

        if let Some(previous) = previous {
            if Some(previous) != source && !self.scene.is_expanded(previous) {
                let cascade = self.scene.collapsed_cascade(previous);
                self.drop_records(previous, cascade);
            }
        }

        if !self.scene.has_pin_slot(target, pin_index) {
            debug!(%target, pin_index, "pin slot not mirrored; nothing to patch");
            return Ok(());
        }

        if let Some(source) = source {
            if !self.scene.map.contains(source) {
                let level = self
                    .scene
                    .lookup(target)
                    .map_or(1, |record| record.level + 1);
                if let Err(err) = builder::materialize(
                    &mut self.remote,
                    &mut self.scene,
                    &self.limits,
                    source,
                    level,
                    None,
                )
                .await
                {
                    warn!(%source, %err, "pin source not mirrored; mirror is stale");
                    self.scene.mark_stale();
                    return Ok(());
                }
            }
        }

        if self.scene.set_pin_slot(target, pin_index, source).is_some() {
            self.notifier
                .emit(&self.scene, &SceneEvent::NodeUpdated { handle: target });
        }
        Ok(())
    }

    /// Copy `handles` into the owner graph; returns the new handles.
    ///
    /// Each copy is mirrored independently; one failing does not undo the
    /// others.
    pub async fn copy_nodes(&mut self, handles: &[Handle]) -> Result<Vec<Handle>, SyncError> {
        let graph = self.remote.root_graph().await?;
        let copies = self.remote.copy_items(graph, handles).await?;
        info!(sources = handles.len(), copies = copies.len(), "nodes copied");
        for handle in &copies {
            self.reconcile_added(*handle).await;
        }
        Ok(copies)
    }

    /// Move `handles` into a new group; returns the group handle.
    ///
    /// The grouped items leave the top level (one `NodeDeleted` each, with an
    /// empty cascade since nothing is destroyed) and reappear as children of
    /// the group when it is mirrored. Pins fed by moved items stay connected.
    pub async fn group_nodes(&mut self, handles: &[Handle]) -> Result<Handle, SyncError> {
        let graph = self.remote.root_graph().await?;
        let group = self.remote.group_items(graph, handles).await?;
        info!(%group, members = handles.len(), "nodes grouped");
        let mut moved = Vec::new();
        for handle in handles {
            if self.scene.map.contains(*handle) {
                let cascade = self.scene.collapsed_cascade(*handle);
                self.detach_records(*handle, &cascade);
                moved.push(*handle);
                moved.extend(cascade);
            }
        }
        self.reconcile_added(group).await;
        self.relink_moved(&moved).await;
        Ok(group)
    }

    /// Dissolve the group `handle`; returns the released items.
    ///
    /// Only the group is destroyed, so its `NodeDeleted` carries an empty
    /// cascade. The released items are mirrored again at top level.
    pub async fn ungroup_node(&mut self, handle: Handle) -> Result<Vec<Handle>, SyncError> {
        let cascade = self.scene.collapsed_cascade(handle);
        let released = self.remote.ungroup(handle).await?;
        info!(group = %handle, released = released.len(), "group dissolved");
        self.scene.detach(&cascade);
        self.drop_records(handle, Vec::new());
        for item in &released {
            self.reconcile_added(*item).await;
        }
        self.relink_moved(&cascade).await;
        Ok(released)
    }

    /// Read the value attribute of a mirrored leaf node.
    pub async fn attribute_value(&mut self, handle: Handle) -> Result<AttrValue, SyncError> {
        let record = self
            .scene
            .lookup(handle)
            .ok_or(SyncError::UnknownHandle(handle))?;
        let attr = record
            .value_attribute()
            .ok_or_else(|| SyncError::Structural(format!("{handle} has no value attribute")))?;
        let attr_id = attr.attr_id;
        Ok(self.remote.get_attribute(handle, attr_id).await?)
    }

    /// Write the value attribute of a mirrored leaf node.
    ///
    /// The value shape must match the mirrored descriptor. Emits
    /// [`SceneEvent::NodeUpdated`].
    pub async fn set_attribute_value(
        &mut self,
        handle: Handle,
        value: AttrValue,
    ) -> Result<(), SyncError> {
        let record = self
            .scene
            .lookup(handle)
            .ok_or(SyncError::UnknownHandle(handle))?;
        let attr = record
            .value_attribute()
            .ok_or_else(|| SyncError::Structural(format!("{handle} has no value attribute")))?;
        if attr.attr_type != value.attr_type() {
            return Err(SyncError::Structural(format!(
                "{handle} expects {:?}, got {:?}",
                attr.attr_type,
                value.attr_type()
            )));
        }
        let attr_id = attr.attr_id;
        self.remote
            .set_attribute(handle, attr_id, value, true)
            .await?;
        self.notifier
            .emit(&self.scene, &SceneEvent::NodeUpdated { handle });
        Ok(())
    }
}
