//! Tunnel lifecycle.
//!
//! ```text
//!            stop()                 producer gone
//!   Open ──────────────▶ ClientClosing ─────────────▶ Closed
//!     │                                                 ▲
//!     │ producer gone          drained / stop()         │
//!     └──────────────▶ ServerClosing ───────────────────┘
//! ```
//!
//! Every transition happens under one lock, so the tunnel leaves `Open`
//! exactly once and reaches `Closed` exactly once.

use std::fmt;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Open,
    /// The client went away; waiting for the producer to notice.
    ClientClosing,
    /// The producer finished; queued messages may still be drained.
    ServerClosing,
    Closed,
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TunnelState::Open => "open",
            TunnelState::ClientClosing => "client-closing",
            TunnelState::ServerClosing => "server-closing",
            TunnelState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// State shared by the two ends of a tunnel.
pub(crate) struct Shared {
    state: Mutex<TunnelState>,
    stop: CancellationToken,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(TunnelState::Open),
            stop: CancellationToken::new(),
        }
    }

    pub(crate) fn state(&self) -> TunnelState {
        *self.state.lock()
    }

    pub(crate) fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// The consumer side is going away.
    ///
    /// Raises the stop signal only while the producer is still running; a
    /// stop after natural completion just finishes the close.
    pub(crate) fn client_close(&self) {
        let mut state = self.state.lock();
        let next = match *state {
            TunnelState::Open => {
                self.stop.cancel();
                TunnelState::ClientClosing
            }
            TunnelState::ServerClosing => TunnelState::Closed,
            other => other,
        };
        trace!(from = %*state, to = %next, "tunnel client close");
        *state = next;
    }

    /// The producer side is gone.
    pub(crate) fn server_close(&self) {
        let mut state = self.state.lock();
        let next = match *state {
            TunnelState::Open => TunnelState::ServerClosing,
            TunnelState::ClientClosing => TunnelState::Closed,
            other => other,
        };
        trace!(from = %*state, to = %next, "tunnel server close");
        *state = next;
    }

    /// Every queued message has been read after the producer finished.
    pub(crate) fn drained(&self) {
        let mut state = self.state.lock();
        if *state == TunnelState::ServerClosing {
            *state = TunnelState::Closed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_first() {
        let shared = Shared::new();
        shared.client_close();
        assert_eq!(shared.state(), TunnelState::ClientClosing);
        assert!(shared.stop_token().is_cancelled());

        shared.client_close();
        assert_eq!(shared.state(), TunnelState::ClientClosing);

        shared.server_close();
        assert_eq!(shared.state(), TunnelState::Closed);
    }

    #[test]
    fn test_server_first_ignores_late_stop() {
        let shared = Shared::new();
        shared.server_close();
        assert_eq!(shared.state(), TunnelState::ServerClosing);

        shared.client_close();
        assert_eq!(shared.state(), TunnelState::Closed);
        assert!(!shared.stop_token().is_cancelled());
    }

    #[test]
    fn test_drained() {
        let shared = Shared::new();
        shared.drained();
        assert_eq!(shared.state(), TunnelState::Open);
        shared.server_close();
        shared.drained();
        assert_eq!(shared.state(), TunnelState::Closed);
        shared.server_close();
        assert_eq!(shared.state(), TunnelState::Closed);
    }
}
