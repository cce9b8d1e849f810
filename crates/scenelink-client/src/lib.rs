// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Framed RPC client for the render engine bridge.
//!
//! [`RpcClient`] speaks the `scenelink-proto` packet format over any async
//! byte stream (Unix socket by default) and implements [`RemoteGraph`], so the
//! sync engine can drive a live engine. Calls are strictly request/response:
//! one outstanding call per client.
//!
//! Reply bytes are buffered across calls, so a call that times out while its
//! reply is half read leaves the stream in sync; the late reply is dropped as
//! unmatched by the next call. A timeout during a request write leaves the
//! peer holding a partial request, and the client refuses further calls.

use std::io;
use std::path::Path;
use std::time::Duration;

use scenelink_proto::wire::{self, Call, Outcome, Reply, CHECKSUM_LEN, HEADER_LEN};
use scenelink_proto::{
    AttrInfo, AttrValue, ConnectOptions, Handle, PinInfo, RemoteError, RemoteGraph,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{trace, warn};

/// Read one packet. Returns `Ok(None)` when the stream is closed before any
/// bytes are read.
///
/// Reads until a full header is buffered so short reads cannot desynchronize
/// framing.
pub async fn read_frame<S>(stream: &mut S) -> io::Result<Option<Vec<u8>>>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut read = 0usize;
    while read < header.len() {
        let n = stream.read(&mut header[read..]).await?;
        if n == 0 {
            if read == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("truncated frame header: read {read} of {HEADER_LEN} bytes"),
            ));
        }
        read += n;
    }
    let len = wire::payload_len(&header);
    let mut rest = vec![0u8; len + CHECKSUM_LEN];
    stream.read_exact(&mut rest).await?;
    let mut packet = Vec::with_capacity(HEADER_LEN + len + CHECKSUM_LEN);
    packet.extend_from_slice(&header);
    packet.extend_from_slice(&rest);
    Ok(Some(packet))
}

/// Split one complete packet off the front of `inbox`.
fn split_frame(inbox: &mut Vec<u8>) -> Option<Vec<u8>> {
    let header: &[u8; HEADER_LEN] = inbox.get(..HEADER_LEN)?.try_into().ok()?;
    let total = HEADER_LEN + wire::payload_len(header) + CHECKSUM_LEN;
    if inbox.len() < total {
        return None;
    }
    let rest = inbox.split_off(total);
    Some(std::mem::replace(inbox, rest))
}

/// Request/response client over a framed byte stream.
pub struct RpcClient<S> {
    stream: S,
    next_id: u64,
    timeout: Option<Duration>,
    inbox: Vec<u8>,
    writing: bool,
    broken: Option<String>,
}

impl RpcClient<UnixStream> {
    /// Connect to the bridge at the given Unix socket path.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, RemoteError> {
        let stream = UnixStream::connect(path.as_ref()).await.map_err(|err| {
            RemoteError::Transport(format!("connect {}: {err}", path.as_ref().display()))
        })?;
        Ok(Self::new(stream))
    }
}

impl<S> RpcClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            next_id: 1,
            timeout: None,
            inbox: Vec::new(),
            writing: false,
            broken: None,
        }
    }

    /// Apply a per-call timeout (`None` disables it).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Issue one call and wait for its reply.
    ///
    /// Fails fast with [`RemoteError::Transport`] once an earlier call was cut
    /// off in the middle of writing its request.
    pub async fn call(&mut self, call: Call) -> Result<Reply, RemoteError> {
        if let Some(reason) = &self.broken {
            return Err(RemoteError::Transport(format!(
                "connection unusable: {reason}"
            )));
        }
        let op = call.op_name();
        let Some(limit) = self.timeout else {
            return self.round_trip(call).await;
        };
        match tokio::time::timeout(limit, self.round_trip(call)).await {
            Ok(result) => result,
            Err(_) => {
                if self.writing {
                    warn!(op, "timed out mid-request; closing client");
                    self.broken = Some(format!("{op} request cut off by timeout"));
                }
                Err(RemoteError::Transport(format!(
                    "{op} timed out after {limit:?}"
                )))
            }
        }
    }

    /// Next complete packet, resuming any partial reply already buffered.
    async fn next_frame(&mut self, op: &str) -> Result<Vec<u8>, RemoteError> {
        loop {
            if let Some(frame) = split_frame(&mut self.inbox) {
                return Ok(frame);
            }
            if self.stream.read_buf(&mut self.inbox).await? == 0 {
                return Err(RemoteError::Transport(format!(
                    "connection closed while waiting for {op}"
                )));
            }
        }
    }

    async fn round_trip(&mut self, call: Call) -> Result<Reply, RemoteError> {
        let op = call.op_name();
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        trace!(id, op, "rpc call");
        let packet = wire::encode_request(id, call)?;
        self.writing = true;
        self.stream.write_all(&packet).await?;
        self.stream.flush().await?;
        self.writing = false;
        loop {
            let bytes = self.next_frame(op).await?;
            let (response, _) = wire::decode_response(&bytes)?;
            if response.id != id {
                warn!(expected = id, got = response.id, op, "dropping unmatched response");
                continue;
            }
            return match response.body {
                Outcome::Ok(reply) => Ok(reply),
                Outcome::Err(payload) => Err(RemoteError::from_payload(op, payload)),
            };
        }
    }

    async fn call_unit(&mut self, call: Call) -> Result<(), RemoteError> {
        let op = call.op_name();
        match self.call(call).await? {
            Reply::Unit => Ok(()),
            other => Err(unexpected(op, &other)),
        }
    }

    async fn call_handle(&mut self, call: Call) -> Result<Option<Handle>, RemoteError> {
        let op = call.op_name();
        match self.call(call).await? {
            Reply::Handle(raw) => Ok(Handle::from_raw(raw)),
            other => Err(unexpected(op, &other)),
        }
    }

    async fn call_required_handle(&mut self, call: Call) -> Result<Handle, RemoteError> {
        let op = call.op_name();
        self.call_handle(call)
            .await?
            .ok_or_else(|| RemoteError::Malformed(format!("{op} returned no item")))
    }

    async fn call_text(&mut self, call: Call) -> Result<String, RemoteError> {
        let op = call.op_name();
        match self.call(call).await? {
            Reply::Text(text) => Ok(text),
            other => Err(unexpected(op, &other)),
        }
    }

    async fn call_count(&mut self, call: Call) -> Result<u64, RemoteError> {
        let op = call.op_name();
        match self.call(call).await? {
            Reply::Count(n) => Ok(n),
            other => Err(unexpected(op, &other)),
        }
    }

    /// Enumerate an item array handle into its elements.
    async fn enumerate(&mut self, array: Handle) -> Result<Vec<Handle>, RemoteError> {
        let array = array.get();
        let size = self.call_count(Call::ArraySize { array }).await?;
        let size = u32::try_from(size)
            .map_err(|_| RemoteError::Malformed(format!("array size {size} out of range")))?;
        let mut out = Vec::with_capacity(size as usize);
        for index in 0..size {
            out.push(
                self.call_required_handle(Call::ArrayElement { array, index })
                    .await?,
            );
        }
        Ok(out)
    }
}

fn unexpected(op: &str, reply: &Reply) -> RemoteError {
    RemoteError::Malformed(format!("{op}: unexpected reply {reply:?}"))
}

fn raw_list(items: &[Handle]) -> Vec<u64> {
    items.iter().map(|h| h.get()).collect()
}

impl<S> RemoteGraph for RpcClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn root_graph(&mut self) -> Result<Handle, RemoteError> {
        self.call_required_handle(Call::RootGraph).await
    }

    async fn owned_items(&mut self, graph: Handle) -> Result<Vec<Handle>, RemoteError> {
        let array = self
            .call_required_handle(Call::OwnedItems { graph: graph.get() })
            .await?;
        self.enumerate(array).await
    }

    async fn item_name(&mut self, item: Handle) -> Result<String, RemoteError> {
        self.call_text(Call::ItemName { item: item.get() }).await
    }

    async fn item_type(&mut self, item: Handle) -> Result<String, RemoteError> {
        self.call_text(Call::ItemType { item: item.get() }).await
    }

    async fn is_graph(&mut self, item: Handle) -> Result<bool, RemoteError> {
        let call = Call::IsGraph { item: item.get() };
        let op = call.op_name();
        match self.call(call).await? {
            Reply::Bool(v) => Ok(v),
            other => Err(unexpected(op, &other)),
        }
    }

    async fn destroy(&mut self, item: Handle) -> Result<(), RemoteError> {
        self.call_unit(Call::Destroy { item: item.get() }).await
    }

    async fn pin_count(&mut self, node: Handle) -> Result<u32, RemoteError> {
        let n = self.call_count(Call::PinCount { node: node.get() }).await?;
        u32::try_from(n).map_err(|_| RemoteError::Malformed(format!("pin count {n} out of range")))
    }

    async fn pin_info(&mut self, node: Handle, index: u32) -> Result<PinInfo, RemoteError> {
        let call = Call::PinInfo {
            node: node.get(),
            index,
        };
        let op = call.op_name();
        match self.call(call).await? {
            Reply::Pin(pin) => Ok(pin),
            other => Err(unexpected(op, &other)),
        }
    }

    async fn connected_node(
        &mut self,
        node: Handle,
        index: u32,
    ) -> Result<Option<Handle>, RemoteError> {
        self.call_handle(Call::ConnectedNode {
            node: node.get(),
            index,
        })
        .await
    }

    async fn connect_pin(
        &mut self,
        node: Handle,
        index: u32,
        source: Option<Handle>,
        options: ConnectOptions,
    ) -> Result<(), RemoteError> {
        self.call_unit(Call::ConnectPin {
            node: node.get(),
            index,
            source: Handle::to_raw(source),
            check_cycles: options.check_cycles,
            evaluate: options.evaluate,
        })
        .await
    }

    async fn value_attribute(&mut self, node: Handle) -> Result<Option<AttrInfo>, RemoteError> {
        let call = Call::ValueAttribute { node: node.get() };
        let op = call.op_name();
        match self.call(call).await? {
            Reply::Attr(attr) => Ok(attr),
            other => Err(unexpected(op, &other)),
        }
    }

    async fn get_attribute(
        &mut self,
        item: Handle,
        attr_id: u32,
    ) -> Result<AttrValue, RemoteError> {
        let call = Call::GetAttribute {
            item: item.get(),
            attr_id,
        };
        let op = call.op_name();
        match self.call(call).await? {
            Reply::Value(value) => Ok(value),
            other => Err(unexpected(op, &other)),
        }
    }

    async fn set_attribute(
        &mut self,
        item: Handle,
        attr_id: u32,
        value: AttrValue,
        evaluate: bool,
    ) -> Result<(), RemoteError> {
        self.call_unit(Call::SetAttribute {
            item: item.get(),
            attr_id,
            value,
            evaluate,
        })
        .await
    }

    async fn create_node(&mut self, graph: Handle, type_tag: &str) -> Result<Handle, RemoteError> {
        self.call_required_handle(Call::CreateNode {
            graph: graph.get(),
            type_tag: type_tag.to_string(),
        })
        .await
    }

    async fn copy_items(
        &mut self,
        graph: Handle,
        items: &[Handle],
    ) -> Result<Vec<Handle>, RemoteError> {
        let array = self
            .call_required_handle(Call::CopyItems {
                graph: graph.get(),
                items: raw_list(items),
            })
            .await?;
        self.enumerate(array).await
    }

    async fn group_items(
        &mut self,
        graph: Handle,
        items: &[Handle],
    ) -> Result<Handle, RemoteError> {
        self.call_required_handle(Call::GroupItems {
            graph: graph.get(),
            items: raw_list(items),
        })
        .await
    }

    async fn ungroup(&mut self, group: Handle) -> Result<Vec<Handle>, RemoteError> {
        let array = self
            .call_required_handle(Call::Ungroup { group: group.get() })
            .await?;
        self.enumerate(array).await
    }
}
