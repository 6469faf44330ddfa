//! Frames exchanged between client and conode.
//!
//! Each frame is a `bincode` body behind the 4-byte length prefix of
//! `LengthDelimitedCodec`.

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{CodecError, ProtocolError};

/// Whether the client expects one reply or a stream of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    Unary,
    Streaming,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Request {
        service: String,
        path: String,
        kind: RequestKind,
        payload: Vec<u8>,
    },
    Response(Vec<u8>),
    Error(ProtocolError),
    StreamItem(Vec<u8>),
    StreamEnd,
}

impl Frame {
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        codec::decode(bytes)
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Request { .. } => "request",
            Frame::Response(_) => "response",
            Frame::Error(_) => "error",
            Frame::StreamItem(_) => "stream-item",
            Frame::StreamEnd => "stream-end",
        }
    }
}
