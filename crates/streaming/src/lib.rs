//! Streaming tunnels between a producer and the connection serving it.
//!
//! This crate provides the server-side half of a streaming request:
//! - A producer handle that sends an ordered sequence of messages
//! - A tunnel the dispatcher drains onto the connection
//! - The cooperative stop signal raised when the client goes away
//!
//! ```rust
//! # tokio_test_block(async {
//! let (sender, mut tunnel) = streaming::tunnel(4);
//! tokio::spawn(async move {
//!     for i in 0u32..3 {
//!         if sender.send_message(&i).await.is_err() {
//!             break;
//!         }
//!     }
//! });
//! let mut got = Vec::new();
//! while let Some(bytes) = tunnel.recv().await {
//!     got.push(corelib::codec::decode::<u32>(&bytes).unwrap());
//! }
//! assert_eq!(got, vec![0, 1, 2]);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f);
//! # }
//! ```

pub mod error;
pub mod receiver;
pub mod sender;
pub mod state;

pub use error::StreamingError;
pub use receiver::StreamingTunnel;
pub use sender::TunnelSender;
pub use state::TunnelState;

use std::sync::Arc;

use tokio::sync::mpsc;

/// Messages a producer may queue before `send` waits for the connection.
pub const DEFAULT_TUNNEL_BUFFER: usize = 16;

/// Create a tunnel holding up to `buffer` queued messages.
///
/// The sender goes to the producer task; the tunnel is handed back to the
/// dispatcher.
pub fn tunnel(buffer: usize) -> (TunnelSender, StreamingTunnel) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let shared = Arc::new(state::Shared::new());
    (
        TunnelSender::new(tx, Arc::clone(&shared)),
        StreamingTunnel::new(rx, shared),
    )
}
