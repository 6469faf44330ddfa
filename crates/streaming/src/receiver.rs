//! Dispatcher side of a tunnel.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::state::{Shared, TunnelState};

/// The end of a tunnel a streaming handler hands back to the dispatcher.
///
/// Messages come out in the order the producer sent them. Once the tunnel is
/// closed from either side, [`recv`](Self::recv) keeps returning `None`.
pub struct StreamingTunnel {
    rx: mpsc::Receiver<Vec<u8>>,
    shared: Arc<Shared>,
    stopped: bool,
}

impl std::fmt::Debug for StreamingTunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingTunnel")
            .field("state", &self.shared.state())
            .finish()
    }
}

impl StreamingTunnel {
    pub(crate) fn new(rx: mpsc::Receiver<Vec<u8>>, shared: Arc<Shared>) -> Self {
        Self {
            rx,
            shared,
            stopped: false,
        }
    }

    /// Next message, or `None` once the stream is over.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        if self.stopped {
            return None;
        }
        match self.rx.recv().await {
            Some(msg) => Some(msg),
            None => {
                self.shared.drained();
                None
            }
        }
    }

    /// Close from the client side and signal the producer to stop.
    ///
    /// Idempotent. Messages still queued are discarded.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.shared.client_close();
        self.rx.close();
    }

    pub fn state(&self) -> TunnelState {
        self.shared.state()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == TunnelState::Closed
    }
}

impl Drop for StreamingTunnel {
    fn drop(&mut self) {
        self.stop();
    }
}
