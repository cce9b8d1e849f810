// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scene-graph synchronization engine.
//!
//! Mirrors a remote, handle-addressed render graph into a local [`Scene`]
//! (ordered top-level tree + deduplicating [`IdentityMap`]) and keeps it in
//! step with mutations without re-walking the whole remote graph.
//!
//! # Design Principles
//!
//! - **One call at a time**: the remote engine is a single render process;
//!   every RPC is awaited before the next, siblings are throttled.
//! - **Remote first**: mutations write remotely, then patch the mirror.
//!   A failed write leaves the mirror untouched.
//! - **Derived collapse**: whether a node is only a pin default is computed
//!   from tree reachability on demand, never stored.

use scenelink_proto::{Handle, RemoteError};
use thiserror::Error;

mod builder;
mod engine;
mod identity;
mod node;
mod notify;
mod reconcile;
mod scene;

pub use builder::{TraversalLimits, DEFAULT_MAX_DEPTH, DEFAULT_SIBLING_DELAY};
pub use engine::SceneSync;
pub use identity::IdentityMap;
pub use node::{Child, GraphInfo, ItemKind, NodeInfo, NodeRecord};
pub use notify::{ChangeNotifier, ObserverId, SceneEvent, SceneObserver};
pub use reconcile::Deletion;
pub use scene::{Connection, Scene};

/// Error type for engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A remote call failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// The handle is not mirrored locally.
    #[error("unknown handle {0}")]
    UnknownHandle(Handle),
    /// Local state does not support the requested operation.
    #[error("structural mismatch: {0}")]
    Structural(String),
}
