// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Change notifier: synchronous, ordered scene events for views.

use scenelink_proto::Handle;

use crate::scene::Scene;

/// Structured mirror change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneEvent {
    /// A full build replaced the whole mirror.
    TreeReplaced,
    /// A record was materialized at top level; look it up in the scene.
    NodeAdded {
        /// New record.
        handle: Handle,
    },
    /// A record left the mirror together with its collapsed descendants.
    NodeDeleted {
        /// Removed record.
        handle: Handle,
        /// Collapsed descendants removed with it.
        collapsed_children: Vec<Handle>,
    },
    /// A record changed in place (pin rewired, value written).
    NodeUpdated {
        /// Changed record.
        handle: Handle,
    },
}

/// Receiver of scene events.
///
/// Called synchronously right after the mirror update. A panicking observer
/// unwinds through the operation that emitted the event.
pub trait SceneObserver {
    /// Handle one event. `scene` already reflects the change.
    fn on_scene_event(&mut self, scene: &Scene, event: &SceneEvent);
}

impl<F> SceneObserver for F
where
    F: FnMut(&Scene, &SceneEvent),
{
    fn on_scene_event(&mut self, scene: &Scene, event: &SceneEvent) {
        self(scene, event);
    }
}

/// Registration token returned by [`ChangeNotifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Fan-out of events to observers in registration order.
#[derive(Default)]
pub struct ChangeNotifier {
    observers: Vec<(ObserverId, Box<dyn SceneObserver + Send>)>,
    next_id: u64,
}

impl ChangeNotifier {
    /// Register an observer.
    pub fn subscribe<O>(&mut self, observer: O) -> ObserverId
    where
        O: SceneObserver + Send + 'static,
    {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Remove an observer; returns whether it was registered.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// True when nobody listens.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver `event` to every observer, in order.
    pub fn emit(&mut self, scene: &Scene, event: &SceneEvent) {
        tracing::trace!(?event, observers = self.observers.len(), "scene event");
        for (_, observer) in &mut self.observers {
            observer.on_scene_event(scene, event);
        }
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn delivers_in_registration_and_emission_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut notifier = ChangeNotifier::default();
        for tag in ["a", "b"] {
            let log = Arc::clone(&log);
            notifier.subscribe(move |_: &Scene, event: &SceneEvent| {
                log.lock().unwrap().push((tag, event.clone()));
            });
        }
        let scene = Scene::default();
        let h = Handle::from_raw(4).unwrap();
        notifier.emit(&scene, &SceneEvent::TreeReplaced);
        notifier.emit(&scene, &SceneEvent::NodeUpdated { handle: h });

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                ("a", SceneEvent::TreeReplaced),
                ("b", SceneEvent::TreeReplaced),
                ("a", SceneEvent::NodeUpdated { handle: h }),
                ("b", SceneEvent::NodeUpdated { handle: h }),
            ]
        );
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let count = Arc::new(Mutex::new(0usize));
        let mut notifier = ChangeNotifier::default();
        let counter = Arc::clone(&count);
        let id = notifier.subscribe(move |_: &Scene, _: &SceneEvent| {
            *counter.lock().unwrap() += 1;
        });
        let scene = Scene::default();
        notifier.emit(&scene, &SceneEvent::TreeReplaced);
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.emit(&scene, &SceneEvent::TreeReplaced);
        assert_eq!(*count.lock().unwrap(), 1);
        assert!(notifier.is_empty());
    }

    #[test]
    #[should_panic(expected = "observer failed")]
    fn observer_panic_reaches_the_emitter() {
        let mut notifier = ChangeNotifier::default();
        notifier.subscribe(|_: &Scene, _: &SceneEvent| panic!("observer failed"));
        notifier.emit(&Scene::default(), &SceneEvent::TreeReplaced);
    }
}
