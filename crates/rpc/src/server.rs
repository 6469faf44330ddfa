//! Conode server.
//!
//! Accepts connections, plain or TLS, and serves the registered services on
//! them.
//!
//! # Connection protocol
//!
//! - Unary requests are answered one after the other until the client
//!   closes the connection
//! - A streaming request takes the connection over: items are forwarded
//!   until the producer finishes, then the server ends the stream and closes
//!   the connection
//! - If the client goes away mid-stream, the producer is told to stop
//!
//! Every failure to route or handle a request is answered with an error
//! frame and does not affect the connection or other requests.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use corelib::network::BoxedStream;
use corelib::{
    Connection, Frame, ProtocolError, ProtocolErrorKind, PublicKey, RequestKind, ServerIdentity,
    TransportError,
};
use streaming::StreamingTunnel;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::registry::ServiceRegistry;
use crate::service::{Reply, Service};

struct Shared {
    services: BTreeMap<String, Arc<dyn Service>>,
    acceptor: Option<TlsAcceptor>,
    max_frame_length: usize,
}

/// A bound conode, ready to serve.
pub struct Server {
    identity: ServerIdentity,
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("identity", &self.identity)
            .field("services", &self.shared.services.keys().collect::<Vec<_>>())
            .field("tls", &self.shared.acceptor.is_some())
            .finish()
    }
}

impl Server {
    /// Bind the listener and start one instance of every registered service.
    ///
    /// The identity advertises the address actually bound, so a port of 0 in
    /// the config resolves to the port picked by the OS.
    pub async fn bind(config: &ServerConfig, public_key: PublicKey, registry: &ServiceRegistry) -> Result<Self> {
        let acceptor = match &config.tls {
            Some(tls) => Some(tls.to_tls_config().acceptor()?),
            None => None,
        };

        let listener = TcpListener::bind(&config.bind_address)
            .await
            .map_err(TransportError::from)?;
        let address = listener.local_addr().map_err(TransportError::from)?;
        let identity = ServerIdentity::new(public_key, address.to_string());

        let services = registry.instantiate(&identity)?;
        info!(conode = %identity, tls = acceptor.is_some(), "conode bound");

        Ok(Self {
            identity,
            listener,
            shared: Arc::new(Shared {
                services,
                acceptor,
                max_frame_length: config.max_frame_length,
            }),
        })
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// Serve in a background task.
    pub fn spawn(self) -> ServerHandle {
        let shutdown = CancellationToken::new();
        let identity = self.identity.clone();
        let task = tokio::spawn(self.run(shutdown.clone()));
        ServerHandle {
            identity,
            shutdown,
            task,
        }
    }

    /// Serve until `shutdown` is cancelled, then wait for every open
    /// connection to wind down.
    pub async fn run(self, shutdown: CancellationToken) {
        let connections = TaskTracker::new();
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((tcp, peer)) => {
                    let shared = Arc::clone(&self.shared);
                    connections.spawn(serve_connection(tcp, peer, shared, shutdown.child_token()));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }

        connections.close();
        debug!(open = connections.len(), "waiting for connections");
        connections.wait().await;
        info!(conode = %self.identity, "conode stopped");
    }
}

/// Handle of a server running in the background.
#[derive(Debug)]
pub struct ServerHandle {
    identity: ServerIdentity,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// Stop accepting, close every connection and wait until the server
    /// task and all connection tasks have finished.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "server task failed");
        }
    }
}

#[instrument(name = "conode_conn", skip_all, fields(peer = %peer))]
async fn serve_connection(tcp: TcpStream, peer: SocketAddr, shared: Arc<Shared>, shutdown: CancellationToken) {
    if let Err(e) = tcp.set_nodelay(true) {
        debug!(error = %e, "set_nodelay failed");
    }
    let stream: BoxedStream = match &shared.acceptor {
        Some(acceptor) => {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => return,
                accepted = acceptor.accept(tcp) => accepted,
            };
            match accepted {
                Ok(stream) => Box::new(stream),
                Err(e) => {
                    debug!(error = %e, "tls handshake failed");
                    return;
                }
            }
        }
        None => Box::new(tcp),
    };

    let mut conn = Connection::from_stream(stream, peer.to_string(), shared.max_frame_length);
    // A peer that stops reading can block a write; shutdown must not wait on it.
    let served = tokio::select! {
        biased;
        served = serve(&mut conn, &shared, &shutdown) => served,
        _ = shutdown.cancelled() => Ok(()),
    };
    match served {
        Ok(()) => debug!("connection done"),
        Err(e) => debug!(error = %e, "connection ended with error"),
    }
}

async fn serve(conn: &mut Connection, shared: &Shared, shutdown: &CancellationToken) -> corelib::Result<()> {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return conn.close().await,
            next = conn.recv() => next?,
        };
        let Some((frame, _)) = next else {
            return Ok(());
        };

        let (service, path, kind, payload) = match frame {
            Frame::Request {
                service,
                path,
                kind,
                payload,
            } => (service, path, kind, payload),
            other => {
                let err = ProtocolError::new(ProtocolErrorKind::UnexpectedFrame, other.name());
                warn!(error = %err, "expected a request");
                send_reply(conn, &Frame::Error(err)).await?;
                continue;
            }
        };

        match dispatch(shared, &service, &path, kind, &payload) {
            Ok(Reply::Unary(response)) => {
                send_reply(conn, &Frame::Response(response)).await?;
            }
            Ok(Reply::Stream(tunnel)) => {
                debug!(service = %service, path = %path, "streaming");
                forward(conn, tunnel, shutdown).await?;
                return conn.close().await;
            }
            Err(err) => {
                warn!(service = %service, path = %path, error = %err, "request failed");
                send_reply(conn, &Frame::Error(err)).await?;
            }
        }
    }
}

/// Send `reply`, or a handler error in its place when it is too large for
/// the connection. Returns whether the reply itself went out.
async fn send_reply(conn: &mut Connection, reply: &Frame) -> corelib::Result<bool> {
    match conn.send(reply).await {
        Ok(_) => Ok(true),
        Err(TransportError::FrameTooLarge { len, max }) => {
            let err = ProtocolError::handler(format!(
                "{} exceeds max frame length ({len} > {max} bytes)",
                reply.name()
            ));
            warn!(error = %err, "reply refused");
            conn.send(&Frame::Error(err)).await?;
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn dispatch(
    shared: &Shared,
    service: &str,
    path: &str,
    kind: RequestKind,
    payload: &[u8],
) -> std::result::Result<Reply, ProtocolError> {
    let handler = shared
        .services
        .get(service)
        .ok_or_else(|| ProtocolError::unknown_service(service))?;

    if let Some(expected) = handler.path_kind(path) {
        if expected != kind {
            return Err(wrong_kind(path, kind));
        }
    }
    let reply = handler.process_client_request(path, payload)?;
    if reply.kind() != kind {
        return Err(wrong_kind(path, kind));
    }
    Ok(reply)
}

fn wrong_kind(path: &str, asked: RequestKind) -> ProtocolError {
    ProtocolError::new(ProtocolErrorKind::WrongKind, format!("{path} does not serve {asked:?} requests"))
}

/// Copy tunnel items onto the connection until either side is done.
async fn forward(conn: &mut Connection, mut tunnel: StreamingTunnel, shutdown: &CancellationToken) -> corelib::Result<()> {
    loop {
        tokio::select! {
            item = tunnel.recv() => match item {
                Some(payload) => match send_reply(conn, &Frame::StreamItem(payload)).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tunnel.stop();
                        return Ok(());
                    }
                    Err(e) => {
                        tunnel.stop();
                        return Err(e);
                    }
                },
                None => {
                    conn.send(&Frame::StreamEnd).await?;
                    return Ok(());
                }
            },
            incoming = conn.recv() => match incoming {
                Ok(Some((frame, _))) => debug!(frame = frame.name(), "ignoring frame on a stream"),
                Ok(None) => {
                    debug!("client left the stream");
                    tunnel.stop();
                    return Ok(());
                }
                Err(e) => {
                    tunnel.stop();
                    return Err(e);
                }
            },
            _ = shutdown.cancelled() => {
                tunnel.stop();
                return Ok(());
            }
        }
    }
}
