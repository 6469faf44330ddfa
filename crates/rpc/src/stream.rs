//! Client end of a streaming request.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::debug;

use corelib::{codec, Connection, Frame, ProtocolError, ProtocolErrorKind};

use crate::client::ByteCounters;
use crate::error::{Result, RpcError};

/// Messages of one stream, read in the order the conode produced them.
///
/// The stream owns its connection. Closing or dropping it tells the conode
/// to stop the producer. Once the stream has ended, for whatever reason,
/// every further read fails with [`RpcError::StreamClosed`].
pub struct StreamingConn {
    conn: Option<Connection>,
    peer: String,
    counters: Arc<ByteCounters>,
}

impl std::fmt::Debug for StreamingConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingConn")
            .field("peer", &self.peer)
            .field("open", &self.is_open())
            .finish()
    }
}

impl StreamingConn {
    pub(crate) fn new(conn: Connection, counters: Arc<ByteCounters>) -> Self {
        Self {
            peer: conn.peer().to_string(),
            conn: Some(conn),
            counters,
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Next message, still encoded.
    ///
    /// # Errors
    ///
    /// - [`RpcError::StreamClosed`] at the end of the stream and after it
    /// - [`RpcError::Protocol`] if the conode refused the request
    /// - [`RpcError::Transport`] if the connection broke
    pub async fn read_raw(&mut self) -> Result<Vec<u8>> {
        let conn = self.conn.as_mut().ok_or(RpcError::StreamClosed)?;
        let next = conn.recv().await;

        let err = match next {
            Ok(Some((frame, received))) => {
                self.counters.add_rx(received);
                match frame {
                    Frame::StreamItem(payload) => return Ok(payload),
                    Frame::StreamEnd => RpcError::StreamClosed,
                    Frame::Error(e) => e.into(),
                    other => ProtocolError::new(ProtocolErrorKind::UnexpectedFrame, other.name()).into(),
                }
            }
            Ok(None) => RpcError::StreamClosed,
            Err(e) => e.into(),
        };
        debug!(peer = %self.peer, reason = %err, "stream ended");
        self.close().await;
        Err(err)
    }

    /// Next message, decoded.
    pub async fn read_message<T: DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.read_raw().await?;
        Ok(codec::decode(&bytes)?)
    }

    /// Stop the stream and release the connection. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                debug!(peer = %self.peer, error = %e, "error closing stream connection");
            }
        }
    }
}
