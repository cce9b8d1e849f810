// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Engine facade owning the remote port, the mirror and the notifier.

use scenelink_proto::{Handle, RemoteGraph};
use tracing::warn;

use crate::builder::{self, TraversalLimits};
use crate::node::{Child, NodeRecord};
use crate::notify::{ChangeNotifier, ObserverId, SceneEvent, SceneObserver};
use crate::scene::Scene;
use crate::SyncError;

/// Scene-graph synchronization engine.
///
/// Operations take `&mut self`, so one instance runs one call chain at a time.
/// Independent instances share nothing.
#[derive(Debug)]
pub struct SceneSync<R> {
    pub(crate) remote: R,
    pub(crate) scene: Scene,
    pub(crate) notifier: ChangeNotifier,
    pub(crate) limits: TraversalLimits,
}

impl<R: RemoteGraph> SceneSync<R> {
    /// Engine with default traversal limits.
    pub fn new(remote: R) -> Self {
        Self::with_limits(remote, TraversalLimits::default())
    }

    /// Engine with explicit traversal limits.
    pub fn with_limits(remote: R, limits: TraversalLimits) -> Self {
        Self {
            remote,
            scene: Scene::default(),
            notifier: ChangeNotifier::default(),
            limits,
        }
    }

    /// Register an event observer.
    pub fn subscribe<O>(&mut self, observer: O) -> ObserverId
    where
        O: SceneObserver + Send + 'static,
    {
        self.notifier.subscribe(observer)
    }

    /// Remove an event observer.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Current mirror.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Mirrored record for `handle`.
    pub fn lookup(&self, handle: Handle) -> Option<&NodeRecord> {
        self.scene.lookup(handle)
    }

    /// Whether `handle` is independently visible rather than a pin default.
    pub fn is_expanded(&self, handle: Handle) -> bool {
        self.scene.is_expanded(handle)
    }

    /// Mirrored children of `handle` (empty when unknown).
    pub fn children_of(&self, handle: Handle) -> &[Child] {
        self.scene
            .lookup(handle)
            .map(|record| record.children.as_slice())
            .unwrap_or(&[])
    }

    /// Walk the whole remote graph and replace the mirror.
    ///
    /// Emits [`SceneEvent::TreeReplaced`]. Fails only when the root graph or
    /// its item list cannot be fetched; the previous mirror is kept then.
    pub async fn build_full_tree(&mut self) -> Result<&Scene, SyncError> {
        builder::build_full(&mut self.remote, &mut self.scene, &self.limits).await?;
        self.notifier.emit(&self.scene, &SceneEvent::TreeReplaced);
        Ok(&self.scene)
    }

    /// Materialize `handle` at top level and expand only its subtree.
    ///
    /// Emits nothing; mutation operations announce the result themselves.
    pub async fn build_incremental(&mut self, handle: Handle) -> Result<(), SyncError> {
        builder::build_incremental(&mut self.remote, &mut self.scene, &self.limits, handle).await
    }

    /// Reconcile a handle returned by a successful remote write.
    ///
    /// Failures are logged and mark the mirror stale; the remote write is
    /// not rolled back.
    pub(crate) async fn reconcile_added(&mut self, handle: Handle) -> bool {
        match self.build_incremental(handle).await {
            Ok(()) => {
                self.notifier
                    .emit(&self.scene, &SceneEvent::NodeAdded { handle });
                true
            }
            Err(err) => {
                warn!(%handle, %err, "reconciliation failed; mirror is stale until a full rebuild");
                self.scene.mark_stale();
                false
            }
        }
    }

    /// Remove `handle` and the given descendants, then announce it.
    pub(crate) fn drop_records(&mut self, handle: Handle, collapsed_children: Vec<Handle>) {
        let mut doomed = Vec::with_capacity(collapsed_children.len() + 1);
        doomed.push(handle);
        doomed.extend(collapsed_children.iter().copied());
        self.scene.purge(&doomed);
        self.notifier.emit(
            &self.scene,
            &SceneEvent::NodeDeleted {
                handle,
                collapsed_children,
            },
        );
    }

    /// Take a moved item and its collapsed descendants out of the mirror.
    ///
    /// Announced as a delete with an empty cascade: nothing was destroyed
    /// remotely. Pin links to the moved records are kept.
    pub(crate) fn detach_records(&mut self, handle: Handle, collapsed_children: &[Handle]) {
        let mut moving = Vec::with_capacity(collapsed_children.len() + 1);
        moving.push(handle);
        moving.extend_from_slice(collapsed_children);
        self.scene.detach(&moving);
        self.notifier.emit(
            &self.scene,
            &SceneEvent::NodeDeleted {
                handle,
                collapsed_children: Vec::new(),
            },
        );
    }

    /// Bring moved items back under the pin slots that still link to them.
    ///
    /// Items re-mirrored at their new place only get their pin metadata
    /// restored; the rest are materialized below their first consumer.
    pub(crate) async fn relink_moved(&mut self, moved: &[Handle]) {
        for &handle in moved {
            let Some((level, pin)) = self.scene.pin_consumer(handle) else {
                continue;
            };
            if let Some(record) = self.scene.map.get_mut(handle) {
                if record.pin_info.is_none() {
                    record.pin_info = Some(pin);
                }
                continue;
            }
            if let Err(err) = builder::materialize(
                &mut self.remote,
                &mut self.scene,
                &self.limits,
                handle,
                level + 1,
                Some(pin),
            )
            .await
            {
                warn!(%handle, %err, "moved pin source not mirrored; mirror is stale");
                self.scene.mark_stale();
            }
        }
    }
}
