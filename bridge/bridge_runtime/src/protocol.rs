use crate::command::{CanvasCommand, DomCommand};
use crate::error::BridgeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use tracing::{debug, warn};

pub const NATIVE_TO_SERVICE_CAP: usize = 1_048_576;
pub const SERVICE_TO_NATIVE_CAP: usize = 1_048_576;

pub type CallId = u64;
pub type PageId = u64;
pub type NodeId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    pub event: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<CallId>,
}

/// Native's answer to an [`InvokeRequest`]. A non-empty `err_msg` is the only
/// failure signal; everything else is success with `data` as payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<CallId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl InvokeResponse {
    pub fn ok(call_id: CallId, data: Value) -> Self {
        Self {
            call_id: Some(call_id),
            err_msg: None,
            data: Some(data),
        }
    }

    pub fn fail(call_id: CallId, err_msg: impl Into<String>) -> Self {
        Self {
            call_id: Some(call_id),
            err_msg: Some(err_msg.into()),
            data: None,
        }
    }

    pub fn from_result(call_id: CallId, result: Result<Value, String>) -> Self {
        match result {
            Ok(data) => Self::ok(call_id, data),
            Err(err_msg) => Self::fail(call_id, err_msg),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.err_msg.as_deref().is_some_and(|msg| !msg.is_empty())
    }

    pub fn into_result(self) -> Result<Value, String> {
        match self.err_msg {
            Some(err_msg) if !err_msg.is_empty() => Err(err_msg),
            _ => Ok(self.data.unwrap_or(Value::Null)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchMessage {
    pub page_id: PageId,
    pub commands: Vec<DomCommand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasMessage {
    pub page_id: PageId,
    pub node_id: NodeId,
    pub commands: Vec<CanvasCommand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl EventDescriptor {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(kind: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            kind: kind.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchEventMessage {
    pub page_id: PageId,
    pub node_id: NodeId,
    pub event: EventDescriptor,
}

/// Business context -> native.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ServiceEnvelope {
    #[serde(rename = "ready")]
    Ready { sid: String, capabilities: Value },
    #[serde(rename = "invoke")]
    Invoke(InvokeRequest),
    #[serde(rename = "patch")]
    Patch(PatchMessage),
    #[serde(rename = "canvas")]
    Canvas(CanvasMessage),
}

/// Native -> business context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum NativeEnvelope {
    #[serde(rename = "response")]
    Response(InvokeResponse),
    #[serde(rename = "publish")]
    Publish {
        channel: String,
        #[serde(default)]
        payload: Value,
    },
    #[serde(rename = "dispatch")]
    Dispatch(DispatchEventMessage),
}

/// Native -> UI context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum WebViewInbound {
    #[serde(rename = "patch")]
    Patch(PatchMessage),
    #[serde(rename = "canvas")]
    Canvas(CanvasMessage),
    #[serde(rename = "publish")]
    Publish {
        channel: String,
        #[serde(default)]
        payload: Value,
    },
}

/// UI context -> native.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum WebViewOutbound {
    #[serde(rename = "ready")]
    Ready {
        #[serde(rename = "pageId")]
        page_id: PageId,
    },
    #[serde(rename = "dispatch")]
    Dispatch(DispatchEventMessage),
}

pub fn ready_envelope(sid: String) -> ServiceEnvelope {
    ServiceEnvelope::Ready {
        sid,
        capabilities: serde_json::json!({
            "vdom": true,
            "canvas2d": true,
            "transport": "stdio-packet-4"
        }),
    }
}

pub fn invoke_envelope(event: impl Into<String>, params: Value, call_id: Option<CallId>) -> ServiceEnvelope {
    ServiceEnvelope::Invoke(InvokeRequest {
        event: event.into(),
        params,
        call_id,
    })
}

/// One direction of the platform channel. Implementations must deliver each
/// sent envelope intact and in send order.
pub trait Transport<T> {
    fn send(&mut self, envelope: T) -> Result<(), BridgeError>;
}

/// Encodes envelopes and queues the payloads for a writer thread. An envelope
/// over the frame cap is refused here, so the writer never sees it.
pub struct ChannelTransport<T> {
    tx: SyncSender<Vec<u8>>,
    queue_capacity: usize,
    max_payload: usize,
    _envelope: PhantomData<fn(T)>,
}

impl<T> ChannelTransport<T> {
    pub fn new(tx: SyncSender<Vec<u8>>, queue_capacity: usize, max_payload: usize) -> Self {
        Self {
            tx,
            queue_capacity,
            max_payload,
            _envelope: PhantomData,
        }
    }
}

impl<T: Serialize> Transport<T> for ChannelTransport<T> {
    fn send(&mut self, envelope: T) -> Result<(), BridgeError> {
        let payload = serde_json::to_vec(&envelope)?;
        if payload.len() > self.max_payload {
            return Err(BridgeError::FrameTooLarge {
                len: payload.len(),
                max: self.max_payload,
            });
        }

        match self.tx.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(payload)) => {
                // Payloads cannot be dropped or reordered, so wait for the writer.
                warn!(
                    queue_capacity = self.queue_capacity,
                    "outbound queue full; waiting for writer"
                );
                self.tx
                    .send(payload)
                    .map_err(|_| BridgeError::ChannelClosed)
            }
            Err(TrySendError::Disconnected(_payload)) => Err(BridgeError::ChannelClosed),
        }
    }
}

/// In-process transport backed by a shared queue. Clones share the queue.
pub struct MemoryTransport<T> {
    queue: Rc<RefCell<VecDeque<T>>>,
    closed: Rc<RefCell<bool>>,
}

impl<T> Clone for MemoryTransport<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
            closed: Rc::clone(&self.closed),
        }
    }
}

impl<T> Default for MemoryTransport<T> {
    fn default() -> Self {
        Self {
            queue: Rc::new(RefCell::new(VecDeque::new())),
            closed: Rc::new(RefCell::new(false)),
        }
    }
}

impl<T> MemoryTransport<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<T> {
        self.queue.borrow_mut().drain(..).collect()
    }

    pub fn pop(&self) -> Option<T> {
        self.queue.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    pub fn close(&self) {
        *self.closed.borrow_mut() = true;
    }
}

impl<T> Transport<T> for MemoryTransport<T> {
    fn send(&mut self, envelope: T) -> Result<(), BridgeError> {
        if *self.closed.borrow() {
            return Err(BridgeError::ChannelClosed);
        }

        self.queue.borrow_mut().push_back(envelope);
        Ok(())
    }
}

/// Writes each queued payload as one frame. A payload over the cap is logged
/// and skipped; only a failing writer ends the loop early.
pub fn writer_loop<W: Write>(rx: Receiver<Vec<u8>>, mut writer: W, max_payload: usize) -> io::Result<()> {
    for payload in rx {
        match write_frame(&mut writer, &payload, max_payload) {
            Ok(()) => writer.flush()?,
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                warn!(len = payload.len(), "dropping unwritable frame: {err}");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(())
}

/// Reads frames until EOF. A frame whose JSON does not decode is skipped; the
/// length prefix keeps the stream aligned, so later frames are still usable.
pub fn reader_loop<T, R, F>(mut reader: R, max_payload: usize, mut on_envelope: F) -> io::Result<()>
where
    T: DeserializeOwned,
    R: Read,
    F: FnMut(T),
{
    loop {
        match read_frame(&mut reader, max_payload) {
            Ok(payload) => match decode_envelope(&payload) {
                Ok(envelope) => on_envelope(envelope),
                Err(err) => warn!(len = payload.len(), "dropping undecodable frame: {err}"),
            },
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("transport reached end of stream");
                return Ok(());
            }
            Err(err) => return Err(err),
        }
    }
}

pub fn encode_envelope<T: Serialize>(envelope: &T) -> io::Result<Vec<u8>> {
    serde_json::to_vec(envelope).map_err(json_error)
}

pub fn decode_envelope<T: DeserializeOwned>(payload: &[u8]) -> io::Result<T> {
    serde_json::from_slice(payload).map_err(json_error)
}

pub fn read_frame(reader: &mut impl Read, max_payload: usize) -> io::Result<Vec<u8>> {
    let mut len_buf = [0_u8; 4];
    reader.read_exact(&mut len_buf)?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            BridgeError::FrameTooLarge {
                len,
                max: max_payload,
            },
        ));
    }

    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

pub fn write_frame(writer: &mut impl Write, payload: &[u8], max_payload: usize) -> io::Result<()> {
    if payload.len() > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            BridgeError::FrameTooLarge {
                len: payload.len(),
                max: max_payload,
            },
        ));
    }

    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "payload exceeds u32"))?;

    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}

fn json_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
