//! Error types for streaming tunnels.

use corelib::CodecError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamingError {
    /// The client asked the producer to stop.
    #[error("stream stopped by the client")]
    Stopped,

    /// The consuming end is gone.
    #[error("stream closed")]
    Closed,

    #[error(transparent)]
    Codec(#[from] CodecError),
}
