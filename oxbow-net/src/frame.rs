use oxbow_base::Result;
use serde::{Deserialize, Serialize};

pub const SERVER_VERSION: &str = "0.2.0";

/// Client-visible error kinds. The message travels alongside; the code is
/// what clients branch on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // transport
    NetCantAllocBuffer,
    NetUnknownRequest,
    NetServerShutdown,
    PeerLost,
    HandshakeMismatch,
    // policy
    DbaOnly,
    ModificationDisabled,
    WrongServerState,
    // coercion
    CoercionIncompatible,
    CoercionOverflow,
    CoercionTruncated,
    InvalidLiteral,
    // ha
    IllegalTransition,
    CommuteTimeout,
    // resource
    WorkerExhausted,
    TranTablePressure,
    Interrupted,
    Internal,
}

/// What a client offers during the negotiated handshake.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub version: String,
    pub tz_checksum: u64,
    /// Capability bits; bit 0 is HA awareness.
    pub bits: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HandshakeReply {
    pub version: String,
    pub tz_checksum: u64,
    pub server_state: String,
    pub bits: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum FrameBody {
    Reply(Vec<u8>),
    Error { code: ErrorCode, message: String },
    Abort,
    HandshakeReply(HandshakeReply),
}

/// One outbound unit. Frames are msgpack on the wire; the transport below
/// adds whatever framing it needs.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub rid: u32,
    pub body: FrameBody,
}

impl Frame {
    pub fn reply(rid: u32, payload: impl Into<Vec<u8>>) -> Frame {
        Frame {
            rid,
            body: FrameBody::Reply(payload.into()),
        }
    }

    pub fn error(rid: u32, code: ErrorCode, message: impl Into<String>) -> Frame {
        Frame {
            rid,
            body: FrameBody::Error {
                code,
                message: message.into(),
            },
        }
    }

    pub fn abort(rid: u32) -> Frame {
        Frame {
            rid,
            body: FrameBody::Abort,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn decode(buf: &[u8]) -> Result<Frame> {
        Ok(rmp_serde::from_slice(buf)?)
    }
}
