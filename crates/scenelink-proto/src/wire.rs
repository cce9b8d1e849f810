// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! RPC call schema and packet framing.
//!
//! Packet layout:
//!
//! ``MAGIC(4) || VERSION(2) || FLAGS(2) || LENGTH(4) || PAYLOAD || CHECKSUM(32)``
//!
//! * PAYLOAD is a CBOR [`RpcEnvelope`]
//! * CHECKSUM = blake3-256 over HEADER (first 12 bytes) || PAYLOAD
//!
//! Handles travel as raw `u64` with `0` meaning "no item".

use blake3::Hasher;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::{AttrInfo, AttrValue, ErrorPayload, PinInfo};

/// Protocol magic constant "SLNK".
pub const MAGIC: [u8; 4] = [0x53, 0x4c, 0x4e, 0x4b];
/// Wire protocol version (big-endian u16).
pub const VERSION: u16 = 0x0001;
/// Reserved flags (set to zero for v1).
pub const FLAGS: u16 = 0x0000;
/// Header length in bytes.
pub const HEADER_LEN: usize = 12;
/// Trailing checksum length in bytes.
pub const CHECKSUM_LEN: usize = 32;

/// Framing or encoding failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Fewer bytes than the header/length announce.
    #[error("incomplete packet")]
    Incomplete,
    /// Magic bytes did not match.
    #[error("bad magic")]
    BadMagic,
    /// Unknown protocol version.
    #[error("unsupported version {0}")]
    UnsupportedVersion(u16),
    /// blake3 checksum did not match header || payload.
    #[error("checksum mismatch")]
    ChecksumMismatch,
    /// Payload exceeds the u32 length field.
    #[error("payload too large: {0} bytes")]
    TooLarge(usize),
    /// CBOR encode/decode failure.
    #[error("cbor: {0}")]
    Cbor(String),
}

/// One remote procedure call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Call {
    /// Root graph of the project → `Reply::Handle`.
    RootGraph,
    /// Owned items of a graph → `Reply::Handle` (array handle).
    OwnedItems {
        /// Graph handle.
        graph: u64,
    },
    /// Size of an item array → `Reply::Count`.
    ArraySize {
        /// Array handle.
        array: u64,
    },
    /// Element of an item array → `Reply::Handle`.
    ArrayElement {
        /// Array handle.
        array: u64,
        /// Element index.
        index: u32,
    },
    /// Item name → `Reply::Text`.
    ItemName {
        /// Item handle.
        item: u64,
    },
    /// Item type tag → `Reply::Text`.
    ItemType {
        /// Item handle.
        item: u64,
    },
    /// Graph test → `Reply::Bool`.
    IsGraph {
        /// Item handle.
        item: u64,
    },
    /// Destroy an item → `Reply::Unit`.
    Destroy {
        /// Item handle.
        item: u64,
    },
    /// Pin count → `Reply::Count`.
    PinCount {
        /// Node handle.
        node: u64,
    },
    /// Pin metadata → `Reply::Pin`.
    PinInfo {
        /// Node handle.
        node: u64,
        /// Pin index.
        index: u32,
    },
    /// Connected node → `Reply::Handle` (`0` when unconnected).
    ConnectedNode {
        /// Node handle.
        node: u64,
        /// Pin index.
        index: u32,
    },
    /// Connect (or with `source == 0`, clear) a pin → `Reply::Unit`.
    ConnectPin {
        /// Target node handle.
        node: u64,
        /// Pin index.
        index: u32,
        /// Source node handle, `0` to disconnect.
        source: u64,
        /// Reject cycles.
        check_cycles: bool,
        /// Re-evaluate afterwards.
        evaluate: bool,
    },
    /// Find the node's value attribute → `Reply::Attr`.
    ValueAttribute {
        /// Node handle.
        node: u64,
    },
    /// Read an attribute → `Reply::Value`.
    GetAttribute {
        /// Item handle.
        item: u64,
        /// Attribute id.
        attr_id: u32,
    },
    /// Write an attribute → `Reply::Unit`.
    SetAttribute {
        /// Item handle.
        item: u64,
        /// Attribute id.
        attr_id: u32,
        /// New value.
        value: AttrValue,
        /// Re-evaluate afterwards.
        evaluate: bool,
    },
    /// Create a node in a graph → `Reply::Handle`.
    CreateNode {
        /// Owner graph.
        graph: u64,
        /// Node type tag.
        type_tag: String,
    },
    /// Copy items with remapping → `Reply::Handle` (array handle).
    CopyItems {
        /// Destination graph.
        graph: u64,
        /// Items to copy.
        items: Vec<u64>,
    },
    /// Group items → `Reply::Handle` (new group).
    GroupItems {
        /// Owner graph.
        graph: u64,
        /// Items to group.
        items: Vec<u64>,
    },
    /// Ungroup → `Reply::Handle` (array handle of released items).
    Ungroup {
        /// Group handle.
        group: u64,
    },
}

impl Call {
    /// Stable operation name (used for logging and error reporting).
    pub const fn op_name(&self) -> &'static str {
        match self {
            Call::RootGraph => "root_graph",
            Call::OwnedItems { .. } => "owned_items",
            Call::ArraySize { .. } => "array_size",
            Call::ArrayElement { .. } => "array_element",
            Call::ItemName { .. } => "item_name",
            Call::ItemType { .. } => "item_type",
            Call::IsGraph { .. } => "is_graph",
            Call::Destroy { .. } => "destroy",
            Call::PinCount { .. } => "pin_count",
            Call::PinInfo { .. } => "pin_info",
            Call::ConnectedNode { .. } => "connected_node",
            Call::ConnectPin { .. } => "connect_pin",
            Call::ValueAttribute { .. } => "value_attribute",
            Call::GetAttribute { .. } => "get_attribute",
            Call::SetAttribute { .. } => "set_attribute",
            Call::CreateNode { .. } => "create_node",
            Call::CopyItems { .. } => "copy_items",
            Call::GroupItems { .. } => "group_items",
            Call::Ungroup { .. } => "ungroup",
        }
    }
}

/// Successful call result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    /// No value.
    Unit,
    /// Boolean result.
    Bool(bool),
    /// Count or size.
    Count(u64),
    /// Text result.
    Text(String),
    /// Raw handle (`0` = none).
    Handle(u64),
    /// Pin metadata.
    Pin(PinInfo),
    /// Optional attribute descriptor.
    Attr(Option<AttrInfo>),
    /// Attribute value.
    Value(AttrValue),
}

/// Reply or remote error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    /// Call succeeded.
    Ok(Reply),
    /// Call failed remotely.
    Err(ErrorPayload),
}

/// Correlated request/response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcEnvelope<P> {
    /// Request id; responses echo it.
    pub id: u64,
    /// Call (request) or outcome (response).
    pub body: P,
}

/// Request envelope.
pub type Request = RpcEnvelope<Call>;
/// Response envelope.
pub type Response = RpcEnvelope<Outcome>;

fn checksum(header: &[u8], payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut hasher = Hasher::new();
    hasher.update(header);
    hasher.update(payload);
    *hasher.finalize().as_bytes()
}

/// Payload length announced by a packet header.
pub fn payload_len(header: &[u8; HEADER_LEN]) -> usize {
    u32::from_be_bytes([header[8], header[9], header[10], header[11]]) as usize
}

/// Encode a value as CBOR and wrap it into a full packet.
pub fn encode_packet<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let mut payload = Vec::new();
    ciborium::ser::into_writer(value, &mut payload).map_err(|e| WireError::Cbor(e.to_string()))?;
    let len = u32::try_from(payload.len()).map_err(|_| WireError::TooLarge(payload.len()))?;

    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(&MAGIC);
    header[4..6].copy_from_slice(&VERSION.to_be_bytes());
    header[6..8].copy_from_slice(&FLAGS.to_be_bytes());
    header[8..12].copy_from_slice(&len.to_be_bytes());
    let sum = checksum(&header, &payload);

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + CHECKSUM_LEN);
    out.extend_from_slice(&header);
    out.extend_from_slice(&payload);
    out.extend_from_slice(&sum);
    Ok(out)
}

/// Decode a packet, returning the value and the number of bytes consumed.
pub fn decode_packet<T: DeserializeOwned>(bytes: &[u8]) -> Result<(T, usize), WireError> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(WireError::Incomplete);
    }
    if bytes[0..4] != MAGIC {
        return Err(WireError::BadMagic);
    }
    let version = u16::from_be_bytes([bytes[4], bytes[5]]);
    if version != VERSION {
        return Err(WireError::UnsupportedVersion(version));
    }
    let len = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let total = HEADER_LEN + len + CHECKSUM_LEN;
    if bytes.len() < total {
        return Err(WireError::Incomplete);
    }
    let header = &bytes[..HEADER_LEN];
    let payload = &bytes[HEADER_LEN..HEADER_LEN + len];
    if checksum(header, payload) != bytes[HEADER_LEN + len..total] {
        return Err(WireError::ChecksumMismatch);
    }
    let value = ciborium::de::from_reader(payload).map_err(|e| WireError::Cbor(e.to_string()))?;
    Ok((value, total))
}

/// Encode a request packet.
pub fn encode_request(id: u64, call: Call) -> Result<Vec<u8>, WireError> {
    encode_packet(&RpcEnvelope { id, body: call })
}

/// Decode a request packet.
pub fn decode_request(bytes: &[u8]) -> Result<(Request, usize), WireError> {
    decode_packet(bytes)
}

/// Encode a response packet.
pub fn encode_response(id: u64, outcome: Outcome) -> Result<Vec<u8>, WireError> {
    encode_packet(&RpcEnvelope { id, body: outcome })
}

/// Decode a response packet.
pub fn decode_response(bytes: &[u8]) -> Result<(Response, usize), WireError> {
    decode_packet(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AttrType;

    #[test]
    fn request_survives_framing() {
        let call = Call::ConnectPin {
            node: 7,
            index: 2,
            source: 0,
            check_cycles: true,
            evaluate: true,
        };
        let bytes = encode_request(9, call.clone()).unwrap();
        assert_eq!(&bytes[..4], &MAGIC);
        let (req, used) = decode_request(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(req.id, 9);
        assert_eq!(req.body, call);
    }

    #[test]
    fn response_carries_nested_values() {
        let outcome = Outcome::Ok(Reply::Attr(Some(AttrInfo {
            attr_id: 3,
            attr_type: AttrType::Float3,
        })));
        let bytes = encode_response(1, outcome.clone()).unwrap();
        let (resp, _) = decode_response(&bytes).unwrap();
        assert_eq!(resp.body, outcome);
    }

    #[test]
    fn header_reports_payload_length() {
        let bytes = encode_request(1, Call::RootGraph).unwrap();
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&bytes[..HEADER_LEN]);
        assert_eq!(
            payload_len(&header),
            bytes.len() - HEADER_LEN - CHECKSUM_LEN
        );
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut bytes = encode_request(1, Call::ItemName { item: 5 }).unwrap();
        bytes[HEADER_LEN] ^= 0xff;
        assert_eq!(
            decode_request(&bytes).unwrap_err(),
            WireError::ChecksumMismatch
        );
    }

    #[test]
    fn truncated_and_foreign_packets_are_rejected() {
        let bytes = encode_request(1, Call::RootGraph).unwrap();
        assert_eq!(
            decode_request(&bytes[..bytes.len() - 1]).unwrap_err(),
            WireError::Incomplete
        );
        let mut foreign = bytes.clone();
        foreign[0] = 0x4a;
        assert_eq!(decode_request(&foreign).unwrap_err(), WireError::BadMagic);
        let hex = hex::encode(&bytes[..4]);
        assert_eq!(hex, "534c4e4b");
    }
}
