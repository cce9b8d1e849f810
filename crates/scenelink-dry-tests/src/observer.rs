// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Observer that records every scene event for later assertions.

use std::sync::{Arc, Mutex, MutexGuard};

use scenelink_sync::{Scene, SceneEvent, SceneObserver};

/// Records events in delivery order. Clones share the log, so keep one clone
/// and subscribe the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<SceneEvent>>>,
}

impl RecordingObserver {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SceneEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<SceneEvent> {
        self.lock().clone()
    }

    /// Number of recorded events.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Forget recorded events.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl SceneObserver for RecordingObserver {
    fn on_scene_event(&mut self, _scene: &Scene, event: &SceneEvent) {
        self.lock().push(event.clone());
    }
}
