//! Shared fixtures for the RPC integration tests.
//!
//! A `Test` service with:
//! - `Ping` -> `Pong` carrying the answering conode's address
//! - `Whoami` -> the service name, as a second unary path
//! - `Count` -> a finite stream of `u32`
//! - `Forever` -> a stream that only ends when the client leaves
//! - `Fail` -> a raw handler that always errors
//! - `Big` -> a raw handler answering `BIG_REPLY` bytes
//! - `Sizes` -> a stream of raw items of the requested sizes

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use corelib::{Message, PemSource, PublicKey, ServerIdentity, TlsClientConfig};
use rpc::{Context, Server, ServerConfig, ServerHandle, Service, ServiceProcessor, ServiceRegistry};
use serde::{Deserialize, Serialize};

pub const SERVICE: &str = "Test";

/// Size of the `Big` reply.
pub const BIG_REPLY: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub seq: u32,
}

impl Message for Ping {
    const PATH: &'static str = "Ping";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    pub seq: u32,
    pub from: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Whoami;

impl Message for Whoami {
    const PATH: &'static str = "Whoami";
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Count {
    pub n: u32,
}

impl Message for Count {
    const PATH: &'static str = "Count";
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Sizes(pub Vec<usize>);

impl Message for Sizes {
    const PATH: &'static str = "Sizes";
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Forever;

impl Message for Forever {
    const PATH: &'static str = "Forever";
}

/// What the `Forever` producers did.
#[derive(Debug, Default)]
pub struct ProducerLog {
    pub sent: AtomicUsize,
    pub stopped: AtomicBool,
}

impl ProducerLog {
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn test_service(ctx: &Context, log: Arc<ProducerLog>) -> anyhow::Result<Arc<dyn Service>> {
    let address = ctx.server_identity().address.clone();
    let name = ctx.service_name().to_string();
    let mut processor = ServiceProcessor::new();

    processor.register_handler(move |ping: Ping| {
        Ok(Pong {
            seq: ping.seq,
            from: address.clone(),
        })
    })?;

    processor.register_handler(move |_: Whoami| Ok(name.clone()))?;

    processor.register_streaming_handler(|count: Count| {
        let (sender, tunnel) = streaming::tunnel(streaming::DEFAULT_TUNNEL_BUFFER);
        tokio::spawn(async move {
            for i in 0..count.n {
                if sender.send_message(&i).await.is_err() {
                    return;
                }
            }
        });
        Ok(tunnel)
    })?;

    processor.register_streaming_handler(move |_: Forever| {
        let log = Arc::clone(&log);
        let (sender, tunnel) = streaming::tunnel(1);
        tokio::spawn(async move {
            let mut i = 0u64;
            while !sender.is_stopped() {
                if sender.send_message(&i).await.is_err() {
                    break;
                }
                log.sent.fetch_add(1, Ordering::SeqCst);
                i += 1;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            log.stopped.store(true, Ordering::SeqCst);
        });
        Ok(tunnel)
    })?;

    processor.register_raw_handler("Fail", |_| anyhow::bail!("handler failed on purpose"))?;

    processor.register_raw_handler("Big", |_| Ok(vec![7; BIG_REPLY]))?;

    processor.register_streaming_handler(|sizes: Sizes| {
        let (sender, tunnel) = streaming::tunnel(streaming::DEFAULT_TUNNEL_BUFFER);
        tokio::spawn(async move {
            for size in sizes.0 {
                if sender.send(vec![1; size]).await.is_err() {
                    return;
                }
            }
        });
        Ok(tunnel)
    })?;

    Ok(Arc::new(processor))
}

pub fn registry(log: Arc<ProducerLog>) -> ServiceRegistry {
    let mut registry = ServiceRegistry::new();
    registry
        .register_new_service(SERVICE, move |ctx| test_service(ctx, Arc::clone(&log)))
        .unwrap();
    registry
}

/// A fresh public key per call, so every test conode has its own identity.
pub fn next_key() -> PublicKey {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let n = NEXT.fetch_add(1, Ordering::SeqCst);
    PublicKey::new(format!("test-conode-{n}").into_bytes())
}

pub async fn start_with(config: ServerConfig, log: Arc<ProducerLog>) -> ServerHandle {
    init_tracing();
    Server::bind(&config, next_key(), &registry(log))
        .await
        .unwrap()
        .spawn()
}

pub async fn start() -> ServerHandle {
    start_with(ServerConfig::default(), Arc::new(ProducerLog::default())).await
}

/// Server config whose frames cannot carry the `Big` reply.
pub fn small_frames() -> ServerConfig {
    ServerConfig {
        max_frame_length: 256,
        ..ServerConfig::default()
    }
}

/// An identity that accepts connections and never answers.
pub async fn blackhole_identity() -> ServerIdentity {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    ServerIdentity::new(next_key(), addr.to_string()).with_description("blackhole")
}

/// An identity nobody listens on.
pub fn dead_identity() -> ServerIdentity {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    ServerIdentity::new(next_key(), addr.to_string()).with_description("unreachable")
}

pub fn data(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data").join(name)
}

pub fn tls_server_config() -> ServerConfig {
    ServerConfig::default().with_tls(
        PemSource::File(data("server.pem")),
        PemSource::File(data("server.key")),
    )
}

pub fn tls_client_config(ca: &str) -> TlsClientConfig {
    TlsClientConfig::from_ca(&PemSource::File(data(ca))).unwrap()
}
