//! Framed connections to and from conodes.

use std::io;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::identity::ServerIdentity;
use crate::network::tls::{server_name, TlsClientConfig};
use crate::network::wire::Frame;

/// Default upper bound on a single frame body.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Size of the length prefix in front of every frame.
const PREFIX_LEN: u64 = 4;

/// Byte stream a connection runs over: plain TCP or TLS on either side.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// A single framed connection.
///
/// Counts the bytes it puts on and takes off the wire, length prefixes
/// included.
pub struct Connection {
    framed: Framed<BoxedStream, LengthDelimitedCodec>,
    peer: String,
    max_frame_length: usize,
    sent: u64,
    received: u64,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("sent", &self.sent)
            .field("received", &self.received)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Dial `identity`, over TLS when a client config is given.
    pub async fn connect(
        identity: &ServerIdentity,
        tls: Option<&TlsClientConfig>,
        max_frame_length: usize,
    ) -> Result<Self> {
        let tcp = TcpStream::connect(&identity.address)
            .await
            .map_err(|e| TransportError::ConnectFailed {
                address: identity.address.clone(),
                source: e.into(),
            })?;
        tcp.set_nodelay(true)?;

        let stream: BoxedStream = match tls {
            Some(tls) => {
                let name = server_name(identity.host())?;
                let stream = tls
                    .connector()
                    .connect(name, tcp)
                    .await
                    .map_err(|e| TransportError::Tls(format!("handshake with {}: {}", identity.address, e)))?;
                Box::new(stream)
            }
            None => Box::new(tcp),
        };
        debug!(peer = %identity.address, tls = tls.is_some(), "connected");

        Ok(Self::from_stream(stream, identity.address.clone(), max_frame_length))
    }

    /// Wrap an already established stream, e.g. one accepted by a listener.
    pub fn from_stream(stream: BoxedStream, peer: impl Into<String>, max_frame_length: usize) -> Self {
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(max_frame_length)
            .new_codec();
        Self {
            framed: Framed::new(stream, codec),
            peer: peer.into(),
            max_frame_length,
            sent: 0,
            received: 0,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Total bytes written so far.
    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }

    /// Total bytes read so far.
    pub fn bytes_received(&self) -> u64 {
        self.received
    }

    /// Largest frame body this connection sends or accepts.
    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    /// Write one frame and return how many bytes it took on the wire.
    ///
    /// # Errors
    ///
    /// [`TransportError::FrameTooLarge`] if the encoded frame is over the
    /// limit. Nothing is written in that case.
    pub async fn send(&mut self, frame: &Frame) -> Result<u64> {
        let body = frame
            .encode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        if body.len() > self.max_frame_length {
            return Err(TransportError::FrameTooLarge {
                len: body.len(),
                max: self.max_frame_length,
            });
        }
        let len = body.len() as u64 + PREFIX_LEN;
        self.framed.send(Bytes::from(body)).await?;
        self.sent += len;
        trace!(peer = %self.peer, frame = frame.name(), bytes = len, "sent frame");
        Ok(len)
    }

    /// Read the next frame with its size on the wire.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection cleanly.
    pub async fn recv(&mut self) -> Result<Option<(Frame, u64)>> {
        let body = match self.framed.next().await {
            Some(body) => body?,
            None => return Ok(None),
        };
        let len = body.len() as u64 + PREFIX_LEN;
        self.received += len;
        let frame = Frame::decode(&body)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        trace!(peer = %self.peer, frame = frame.name(), bytes = len, "received frame");
        Ok(Some((frame, len)))
    }

    /// Flush and shut down the write side.
    pub async fn close(&mut self) -> Result<()> {
        SinkExt::<Bytes>::close(&mut self.framed).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::wire::RequestKind;

    fn pair() -> (Connection, Connection) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (
            Connection::from_stream(Box::new(a), "a", DEFAULT_MAX_FRAME_LENGTH),
            Connection::from_stream(Box::new(b), "b", DEFAULT_MAX_FRAME_LENGTH),
        )
    }

    #[tokio::test]
    async fn test_byte_accounting() {
        let (mut a, mut b) = pair();
        let frame = Frame::Request {
            service: "Status".into(),
            path: "Request".into(),
            kind: RequestKind::Unary,
            payload: vec![1, 2, 3],
        };

        let sent = a.send(&frame).await.unwrap();
        let (got, received) = b.recv().await.unwrap().unwrap();

        assert_eq!(got, frame);
        assert_eq!(sent, received);
        assert_eq!(a.bytes_sent(), sent);
        assert_eq!(b.bytes_received(), received);
        assert_eq!(a.bytes_received(), 0);
    }

    #[tokio::test]
    async fn test_clean_close_reads_none() {
        let (mut a, mut b) = pair();
        a.close().await.unwrap();
        assert!(b.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_transport_error() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let mut small = Connection::from_stream(Box::new(a), "small", 16);
        let mut big = Connection::from_stream(Box::new(b), "big", DEFAULT_MAX_FRAME_LENGTH);

        big.send(&Frame::Response(vec![0; 256])).await.unwrap();
        assert!(matches!(small.recv().await, Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn test_oversized_send_refused_before_writing() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let mut small = Connection::from_stream(Box::new(a), "small", 64);
        let mut peer = Connection::from_stream(Box::new(b), "peer", DEFAULT_MAX_FRAME_LENGTH);

        let err = small.send(&Frame::Response(vec![0; 256])).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { max: 64, .. }));
        assert_eq!(small.bytes_sent(), 0);

        // The stream is still in step.
        small.send(&Frame::StreamEnd).await.unwrap();
        let (frame, _) = peer.recv().await.unwrap().unwrap();
        assert_eq!(frame, Frame::StreamEnd);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let identity = ServerIdentity::new(crate::identity::PublicKey::new(vec![1]), addr.to_string());
        let err = Connection::connect(&identity, None, DEFAULT_MAX_FRAME_LENGTH)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectFailed { .. }));
    }
}
