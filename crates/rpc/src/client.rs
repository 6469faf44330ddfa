//! RPC client.
//!
//! A [`Client`] talks to one named service on any number of conodes. It
//! either opens a fresh connection per call or, in keep-alive mode, holds one
//! connection per destination until [`Client::close`].
//!
//! # Example
//!
//! ```rust,no_run
//! use rpc::Client;
//! # async fn run(dst: corelib::ServerIdentity) -> rpc::Result<()> {
//! let client = Client::new_keep("Status");
//! let reply = client.send(&dst, "Request", b"ping").await?;
//! println!("{} bytes back, {} bytes on the wire", reply.len(), client.rx());
//! client.close().await;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use corelib::{
    codec, Connection, Frame, Message, ProtocolError, ProtocolErrorKind, RequestKind,
    ServerIdentity, TlsClientConfig, TransportError,
};

use crate::config::ClientConfig;
use crate::error::{Result, RpcError};
use crate::pool::ConnectionPool;
use crate::stream::StreamingConn;

/// Bytes a client has put on and taken off the wire.
#[derive(Debug, Default)]
pub(crate) struct ByteCounters {
    rx: AtomicU64,
    tx: AtomicU64,
}

impl ByteCounters {
    pub(crate) fn add_rx(&self, n: u64) {
        self.rx.fetch_add(n, Ordering::Relaxed);
        counter!("rpc_client_rx_bytes").increment(n);
    }

    pub(crate) fn add_tx(&self, n: u64) {
        self.tx.fetch_add(n, Ordering::Relaxed);
        counter!("rpc_client_tx_bytes").increment(n);
    }
}

struct Inner {
    service: String,
    config: ClientConfig,
    tls: RwLock<Option<TlsClientConfig>>,
    pool: ConnectionPool,
    counters: Arc<ByteCounters>,
}

/// Client for one service.
///
/// Cheap to clone; clones share connections and counters.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("service", &self.inner.service)
            .field("keep_alive", &self.inner.config.keep_alive)
            .field("rx", &self.rx())
            .field("tx", &self.tx())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Client opening a new connection for every call.
    pub fn new(service: impl Into<String>) -> Self {
        Self::with_config(service, ClientConfig::default())
    }

    /// Client keeping connections open between calls.
    pub fn new_keep(service: impl Into<String>) -> Self {
        Self::with_config(service, ClientConfig::keep_alive())
    }

    pub fn with_config(service: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                service: service.into(),
                config,
                tls: RwLock::new(None),
                pool: ConnectionPool::default(),
                counters: Arc::new(ByteCounters::default()),
            }),
        }
    }

    /// Use TLS for new connections, or plain TCP with `None`.
    ///
    /// Connections already held keep the transport they were opened with.
    pub fn set_tls_config(&self, tls: Option<TlsClientConfig>) {
        *self.inner.tls.write() = tls;
    }

    pub fn service(&self) -> &str {
        &self.inner.service
    }

    pub fn is_keep_alive(&self) -> bool {
        self.inner.config.keep_alive
    }

    /// Bytes received so far, over all calls and streams.
    pub fn rx(&self) -> u64 {
        self.inner.counters.rx.load(Ordering::Relaxed)
    }

    /// Bytes sent so far, over all calls and streams.
    pub fn tx(&self) -> u64 {
        self.inner.counters.tx.load(Ordering::Relaxed)
    }

    /// Connections currently held in keep-alive mode.
    pub async fn held_connections(&self) -> usize {
        self.inner.pool.held().await
    }

    /// Send `payload` to `path` on `dst` and wait for the reply.
    ///
    /// # Errors
    ///
    /// [`RpcError::Transport`] when the node cannot be reached or the
    /// connection breaks, [`RpcError::Protocol`] when the node answered with
    /// an error.
    #[instrument(
        name = "rpc_send",
        skip(self, payload),
        fields(service = %self.inner.service, node = %dst.id())
    )]
    pub async fn send(&self, dst: &ServerIdentity, path: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let request = Frame::Request {
            service: self.inner.service.clone(),
            path: path.to_string(),
            kind: RequestKind::Unary,
            payload: payload.to_vec(),
        };
        if self.inner.config.keep_alive {
            self.send_kept(dst, &request).await
        } else {
            self.send_once(dst, &request).await
        }
    }

    /// Encode `request`, send it to its path and decode the reply.
    pub async fn send_message<Req, Resp>(&self, dst: &ServerIdentity, request: &Req) -> Result<Resp>
    where
        Req: Message,
        Resp: DeserializeOwned,
    {
        let payload = codec::encode(request)?;
        let reply = self.send(dst, Req::PATH, &payload).await?;
        Ok(codec::decode(&reply)?)
    }

    /// Open a stream for `request` on a dedicated connection.
    pub async fn stream<Req: Message>(&self, dst: &ServerIdentity, request: &Req) -> Result<StreamingConn> {
        let payload = codec::encode(request)?;
        self.stream_raw(dst, Req::PATH, &payload).await
    }

    /// Open a stream on `path` with an already encoded payload.
    pub async fn stream_raw(&self, dst: &ServerIdentity, path: &str, payload: &[u8]) -> Result<StreamingConn> {
        let mut conn = self.connect(dst).await?;
        let request = Frame::Request {
            service: self.inner.service.clone(),
            path: path.to_string(),
            kind: RequestKind::Streaming,
            payload: payload.to_vec(),
        };
        let sent = conn.send(&request).await?;
        self.inner.counters.add_tx(sent);
        debug!(service = %self.inner.service, path, node = %dst.id(), "stream opened");
        Ok(StreamingConn::new(conn, Arc::clone(&self.inner.counters)))
    }

    /// Close every held connection.
    ///
    /// Safe to call more than once and from several tasks. The client stays
    /// usable and reconnects on the next call.
    pub async fn close(&self) {
        let closed = self.inner.pool.drain().await;
        if closed > 0 {
            debug!(service = %self.inner.service, closed, "released connections");
        }
    }

    async fn connect(&self, dst: &ServerIdentity) -> Result<Connection> {
        let tls = self.inner.tls.read().clone();
        let conn = Connection::connect(dst, tls.as_ref(), self.inner.config.max_frame_length).await?;
        Ok(conn)
    }

    async fn send_once(&self, dst: &ServerIdentity, request: &Frame) -> Result<Vec<u8>> {
        let mut conn = self.connect(dst).await?;
        let res = self.round_trip(&mut conn, request).await;
        if let Err(e) = conn.close().await {
            debug!(peer = conn.peer(), error = %e, "error closing connection");
        }
        res
    }

    async fn send_kept(&self, dst: &ServerIdentity, request: &Frame) -> Result<Vec<u8>> {
        let slot = self.inner.pool.slot(dst.id());
        let mut held = slot.lock().await;
        let mut conn = match held.take() {
            Some(conn) => conn,
            None => self.connect(dst).await?,
        };

        let res = self.round_trip(&mut conn, request).await;
        if reusable(&res) {
            *held = Some(conn);
        } else {
            debug!(node = %dst.id(), "dropping broken keep-alive connection");
        }
        res
    }

    async fn round_trip(&self, conn: &mut Connection, request: &Frame) -> Result<Vec<u8>> {
        let sent = conn.send(request).await?;
        self.inner.counters.add_tx(sent);

        let (reply, received) = conn.recv().await?.ok_or(TransportError::ConnectionClosed)?;
        self.inner.counters.add_rx(received);

        match reply {
            Frame::Response(payload) => Ok(payload),
            Frame::Error(e) => Err(e.into()),
            other => Err(ProtocolError::new(ProtocolErrorKind::UnexpectedFrame, other.name()).into()),
        }
    }
}

/// Whether the connection is still in step with the server after `res`.
fn reusable(res: &Result<Vec<u8>>) -> bool {
    match res {
        Ok(_) => true,
        Err(RpcError::Protocol(e)) => e.kind != ProtocolErrorKind::UnexpectedFrame,
        Err(_) => false,
    }
}
