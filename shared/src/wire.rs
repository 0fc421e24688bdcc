//! Binary wire protocol for inter-process messages
//!
//! On the wire a message is one byte of type code, followed - only for types
//! that declare a payload shape - by the UTF-8 bytes of the shape's stable
//! fully-qualified name, a single zero byte, and the payload serialized as
//! UTF-8 JSON text. The shape name on the wire is redundant with the catalog
//! (decode checks the claim against the catalog entry), which lets any one
//! payload schema widen without a protocol version bump.
//!
//! The catalog is append-only: new types go at the end so existing codes
//! never change.

use crate::errors::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every message must fit a single datagram; no fragmentation is handled.
pub const MAX_DATAGRAM_BYTES: usize = 600;

/// The fixed message type catalog, one variant per wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgType {
    /// Worker heartbeat: the worker process is running (carries a sequence counter)
    ProcessAlive,
    /// Worker readiness ack: the worker's web listener is accepting connections
    WebAlive,
    /// Monitor -> worker: start your web listener
    StartWeb,
    /// Monitor -> worker: stop your web listener
    StopWeb,
    /// Monitor -> worker: shut down the whole worker process
    Shutdown,
    /// Worker -> monitor: acknowledging an orderly shutdown
    ShuttingDown,
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Monotonically increasing heartbeat counter carried by `ProcessAlive`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceData {
    pub sequence: u64,
}

/// Closed set of payload values a message can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Sequence(SequenceData),
}

impl Payload {
    fn shape(&self) -> &'static PayloadShape {
        match self {
            Payload::Sequence(_) => &SEQUENCE_SHAPE,
        }
    }

    fn to_json(&self) -> Result<Vec<u8>, ProtocolError> {
        let bytes = match self {
            Payload::Sequence(data) => serde_json::to_vec(data)?,
        };
        Ok(bytes)
    }
}

/// A payload shape: a version-stable name plus a static decode function.
///
/// This is the dispatch table that replaces any runtime type-name lookup:
/// every shape the protocol can carry is registered here at compile time.
struct PayloadShape {
    name: &'static str,
    decode: fn(&[u8]) -> Result<Payload, ProtocolError>,
}

static SEQUENCE_SHAPE: PayloadShape = PayloadShape {
    name: "monitor.ipmsg.SequenceData",
    decode: |bytes| {
        let data: SequenceData = serde_json::from_slice(bytes)?;
        Ok(Payload::Sequence(data))
    },
};

/// All shapes any catalog entry refers to.
static SHAPES: &[&PayloadShape] = &[&SEQUENCE_SHAPE];

/// One catalog entry: a stable wire code and an optional payload shape.
struct TypeDescriptor {
    code: u8,
    msg_type: MsgType,
    shape: Option<&'static PayloadShape>,
}

/// Append-only message type catalog. Codes of existing entries never change.
static CATALOG: &[TypeDescriptor] = &[
    TypeDescriptor { code: 0, msg_type: MsgType::ProcessAlive, shape: Some(&SEQUENCE_SHAPE) },
    TypeDescriptor { code: 1, msg_type: MsgType::WebAlive, shape: None },
    TypeDescriptor { code: 2, msg_type: MsgType::StartWeb, shape: None },
    TypeDescriptor { code: 3, msg_type: MsgType::StopWeb, shape: None },
    TypeDescriptor { code: 4, msg_type: MsgType::Shutdown, shape: None },
    TypeDescriptor { code: 5, msg_type: MsgType::ShuttingDown, shape: None },
];

fn descriptor_for(msg_type: MsgType) -> &'static TypeDescriptor {
    CATALOG
        .iter()
        .find(|d| d.msg_type == msg_type)
        .expect("every MsgType has a catalog entry")
}

fn descriptor_by_code(code: u8) -> Option<&'static TypeDescriptor> {
    CATALOG.iter().find(|d| d.code == code)
}

fn shape_by_name(name: &str) -> Option<&'static PayloadShape> {
    SHAPES.iter().copied().find(|s| s.name == name)
}

/// An immutable inter-process message: a type plus an optional payload whose
/// shape is determined solely by the type.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    msg_type: MsgType,
    payload: Option<Payload>,
}

impl Message {
    /// Create a message, enforcing the payload-presence invariant of the catalog.
    pub fn new(msg_type: MsgType, payload: Option<Payload>) -> Result<Self, ProtocolError> {
        let descriptor = descriptor_for(msg_type);
        match (descriptor.shape, &payload) {
            (None, Some(_)) => Err(ProtocolError::UnexpectedPayload { msg_type: msg_type.to_string() }),
            (Some(shape), None) => Err(ProtocolError::MissingPayload {
                msg_type: msg_type.to_string(),
                shape: shape.name,
            }),
            (Some(shape), Some(p)) if p.shape().name != shape.name => {
                Err(ProtocolError::ShapeMismatch {
                    claimed: p.shape().name.to_string(),
                    expected: shape.name,
                })
            }
            _ => Ok(Message { msg_type, payload }),
        }
    }

    /// Convenience constructor for the payloadless types.
    pub fn plain(msg_type: MsgType) -> Result<Self, ProtocolError> {
        Message::new(msg_type, None)
    }

    /// Convenience constructor for a heartbeat message.
    pub fn process_alive(sequence: u64) -> Message {
        Message {
            msg_type: MsgType::ProcessAlive,
            payload: Some(Payload::Sequence(SequenceData { sequence })),
        }
    }

    pub fn web_alive() -> Message {
        Message { msg_type: MsgType::WebAlive, payload: None }
    }

    pub fn start_web() -> Message {
        Message { msg_type: MsgType::StartWeb, payload: None }
    }

    pub fn stop_web() -> Message {
        Message { msg_type: MsgType::StopWeb, payload: None }
    }

    pub fn shutdown() -> Message {
        Message { msg_type: MsgType::Shutdown, payload: None }
    }

    pub fn shutting_down() -> Message {
        Message { msg_type: MsgType::ShuttingDown, payload: None }
    }

    pub fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<Payload> {
        self.payload
    }

    /// Encode into wire bytes: type code, then optionally shape name, 0x00,
    /// and JSON payload text.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let descriptor = descriptor_for(self.msg_type);

        // the no-payload shortcut: a one-byte message
        let Some(payload) = &self.payload else {
            return Ok(vec![descriptor.code]);
        };

        let shape_name = payload.shape().name.as_bytes();
        let json = payload.to_json()?;

        let mut bytes = Vec::with_capacity(1 + shape_name.len() + 1 + json.len());
        bytes.push(descriptor.code);
        bytes.extend_from_slice(shape_name);
        bytes.push(0);
        bytes.extend_from_slice(&json);
        Ok(bytes)
    }

    /// Decode wire bytes, checking the sender's shape claim against the catalog.
    pub fn decode(bytes: &[u8]) -> Result<Message, ProtocolError> {
        let (&code, rest) = bytes.split_first().ok_or(ProtocolError::EmptyMessage)?;

        let descriptor =
            descriptor_by_code(code).ok_or(ProtocolError::UnknownTypeCode { code })?;

        if rest.is_empty() {
            return match descriptor.shape {
                None => Ok(Message { msg_type: descriptor.msg_type, payload: None }),
                Some(shape) => Err(ProtocolError::MissingPayload {
                    msg_type: descriptor.msg_type.to_string(),
                    shape: shape.name,
                }),
            };
        }

        let Some(expected) = descriptor.shape else {
            return Err(ProtocolError::UnexpectedPayload {
                msg_type: descriptor.msg_type.to_string(),
            });
        };

        // scan forward to the zero terminator to recover the claimed shape name
        let terminator = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::UnterminatedShapeName)?;
        let claimed = std::str::from_utf8(&rest[..terminator])
            .map_err(|_| ProtocolError::MalformedShapeName)?;

        let shape = shape_by_name(claimed).ok_or_else(|| ProtocolError::UnknownShape {
            name: claimed.to_string(),
        })?;
        if shape.name != expected.name {
            return Err(ProtocolError::ShapeMismatch {
                claimed: claimed.to_string(),
                expected: expected.name,
            });
        }

        let payload = (shape.decode)(&rest[terminator + 1..])?;
        Ok(Message { msg_type: descriptor.msg_type, payload: Some(payload) })
    }
}
