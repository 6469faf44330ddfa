//! Producer side of a tunnel.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::StreamingError;
use crate::state::{Shared, TunnelState};

/// Handle a producer task uses to feed a tunnel.
///
/// Dropping the sender (or calling [`close`](Self::close)) ends the stream
/// from the server side. Producers should check [`is_stopped`](Self::is_stopped)
/// between units of work and return once it is set.
pub struct TunnelSender {
    tx: mpsc::Sender<Vec<u8>>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TunnelSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelSender")
            .field("state", &self.shared.state())
            .finish()
    }
}

impl TunnelSender {
    pub(crate) fn new(tx: mpsc::Sender<Vec<u8>>, shared: Arc<Shared>) -> Self {
        Self { tx, shared }
    }

    /// Queue one encoded message.
    ///
    /// Waits while the buffer is full. Fails with `Stopped` as soon as the
    /// client has closed the stream, even while waiting, and the message is
    /// then not delivered.
    pub async fn send(&self, msg: Vec<u8>) -> Result<(), StreamingError> {
        let stop = self.shared.stop_token();
        if stop.is_cancelled() {
            return Err(StreamingError::Stopped);
        }
        tokio::select! {
            biased;
            _ = stop.cancelled() => Err(StreamingError::Stopped),
            res = self.tx.send(msg) => res.map_err(|_| {
                if stop.is_cancelled() {
                    StreamingError::Stopped
                } else {
                    StreamingError::Closed
                }
            }),
        }
    }

    /// Encode and queue one message.
    pub async fn send_message<M: Serialize + ?Sized>(&self, msg: &M) -> Result<(), StreamingError> {
        let bytes = corelib::codec::encode(msg)?;
        self.send(bytes).await
    }

    /// Poll the stop signal.
    pub fn is_stopped(&self) -> bool {
        self.shared.stop_token().is_cancelled()
    }

    /// Wait for the stop signal.
    pub async fn stopped(&self) {
        self.shared.stop_token().cancelled().await
    }

    pub fn state(&self) -> TunnelState {
        self.shared.state()
    }

    /// End the stream. Same as dropping the sender.
    pub fn close(self) {}
}

impl Drop for TunnelSender {
    fn drop(&mut self) {
        self.shared.server_close();
    }
}
