// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Handle-addressed remote graph contract for SceneLink.
//!
//! The remote render engine only exposes per-item calls (owned items, pins,
//! connected nodes, attributes). This crate carries the shared vocabulary:
//! [`Handle`], pin/attribute metadata, the [`RemoteGraph`] port the sync
//! engine consumes, and the framed CBOR [`wire`] schema used by clients.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;
use std::path::PathBuf;
use thiserror::Error;

mod port;
pub mod wire;

pub use port::{ConnectOptions, RemoteGraph};

/// Default Unix socket path for the render engine bridge.
///
/// Prefers a per-user runtime dir (XDG_RUNTIME_DIR) and falls back to `/tmp`
/// when unavailable.
pub fn default_socket_path() -> PathBuf {
    let base = std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"));
    base.join("scenelink.sock")
}

/// Stable identity of one item in the remote object graph.
///
/// The wire uses `0` for "no item"; that value never becomes a `Handle`.
/// Absence is always spelled `Option<Handle>` on the Rust side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(NonZeroU64);

impl Handle {
    /// Smallest valid handle.
    pub const MIN: Handle = Handle(NonZeroU64::MIN);

    /// Convert a raw wire value; `0` maps to `None`.
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Raw wire value of an optional handle (`None` → `0`).
    pub fn to_raw(handle: Option<Self>) -> u64 {
        handle.map_or(0, Self::get)
    }

    /// Raw integer value.
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// Next handle in allocation order (saturating).
    pub const fn successor(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// RGBA color, 8 bits per channel.
pub type Rgba8 = [u8; 4];

/// Metadata for one input pin slot on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinInfo {
    /// Zero-based pin index on the owning node.
    pub index: u32,
    /// Display label.
    pub label: String,
    /// Pin color as reported by the remote type system.
    pub color: Rgba8,
    /// Declared value type accepted by the pin (e.g. "geometry", "float").
    pub value_type: String,
}

/// Scalar/vector shape of a directly editable attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrType {
    /// Boolean toggle.
    Bool,
    /// Signed integer.
    Int,
    /// Two-component integer vector.
    Int2,
    /// Three-component integer vector.
    Int3,
    /// Floating point scalar.
    Float,
    /// Two-component float vector.
    Float2,
    /// Three-component float vector.
    Float3,
    /// Four-component float vector.
    Float4,
    /// Free-form text or file path.
    Text,
}

/// Descriptor of the value attribute carried directly on a leaf node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrInfo {
    /// Remote attribute identifier used by get/set calls.
    pub attr_id: u32,
    /// Value shape.
    pub attr_type: AttrType,
}

/// Attribute value, tagged by shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// Boolean toggle.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Two-component integer vector.
    Int2([i64; 2]),
    /// Three-component integer vector.
    Int3([i64; 3]),
    /// Floating point scalar.
    Float(f64),
    /// Two-component float vector.
    Float2([f64; 2]),
    /// Three-component float vector.
    Float3([f64; 3]),
    /// Four-component float vector.
    Float4([f64; 4]),
    /// Free-form text or file path.
    Text(String),
}

impl AttrValue {
    /// Shape of this value.
    pub const fn attr_type(&self) -> AttrType {
        match self {
            AttrValue::Bool(_) => AttrType::Bool,
            AttrValue::Int(_) => AttrType::Int,
            AttrValue::Int2(_) => AttrType::Int2,
            AttrValue::Int3(_) => AttrType::Int3,
            AttrValue::Float(_) => AttrType::Float,
            AttrValue::Float2(_) => AttrType::Float2,
            AttrValue::Float3(_) => AttrType::Float3,
            AttrValue::Float4(_) => AttrType::Float4,
            AttrValue::Text(_) => AttrType::Text,
        }
    }
}

/// Error payload returned by the remote side for an unsuccessful call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Numeric error code.
    pub code: u32,
    /// Stable identifier (e.g., "E_NO_ITEM").
    pub name: String,
    /// Human readable message.
    pub message: String,
}

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The remote engine rejected the call or reported an unsuccessful status.
    #[error("{op} failed ({code}): {message}")]
    Call {
        /// Operation name.
        op: String,
        /// Remote error code.
        code: u32,
        /// Remote message.
        message: String,
    },
    /// The transport could not carry the call.
    #[error("transport error: {0}")]
    Transport(String),
    /// A reply was absent or had an unexpected shape.
    #[error("malformed reply: {0}")]
    Malformed(String),
}

impl RemoteError {
    /// Build a `Call` error from a wire error payload.
    pub fn from_payload(op: &str, payload: ErrorPayload) -> Self {
        RemoteError::Call {
            op: op.to_string(),
            code: payload.code,
            message: payload.message,
        }
    }
}

impl From<std::io::Error> for RemoteError {
    fn from(err: std::io::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

impl From<wire::WireError> for RemoteError {
    fn from(err: wire::WireError) -> Self {
        RemoteError::Malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_no_handle() {
        assert_eq!(Handle::from_raw(0), None);
        assert_eq!(Handle::to_raw(None), 0);
        let h = Handle::from_raw(42).unwrap();
        assert_eq!(Handle::to_raw(Some(h)), 42);
        assert_eq!(h.successor().get(), 43);
    }

    #[test]
    fn attr_value_reports_its_shape() {
        assert_eq!(AttrValue::Float3([0.0; 3]).attr_type(), AttrType::Float3);
        assert_eq!(AttrValue::Text("a".into()).attr_type(), AttrType::Text);
    }
}
