//! RPC between clients and conodes.
//!
//! This crate provides both ends of a call:
//! - [`Client`]: unary calls, parallel fan-out and streams, over ephemeral
//!   or kept-alive connections, with byte counters
//! - [`ServiceProcessor`]: routes a path to a unary or streaming handler
//! - [`ServiceRegistry`] and [`Server`]: start services and serve them
//!   over TCP or TLS
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use corelib::PublicKey;
//! use rpc::{Client, Server, ServerConfig, ServiceProcessor, ServiceRegistry};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut registry = ServiceRegistry::new();
//! registry.register_new_service("Status", |_ctx| {
//!     let mut processor = ServiceProcessor::new();
//!     processor.register_raw_handler("Request", |_| Ok(b"ok".to_vec()))?;
//!     Ok(Arc::new(processor) as Arc<dyn rpc::Service>)
//! })?;
//!
//! let server = Server::bind(&ServerConfig::default(), PublicKey::new(vec![1]), &registry)
//!     .await?
//!     .spawn();
//!
//! let client = Client::new("Status");
//! let reply = client.send(server.identity(), "Request", &[]).await?;
//! assert_eq!(reply, b"ok");
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod parallel;
mod pool;
pub mod registry;
pub mod server;
pub mod service;
pub mod stream;

pub use client::Client;
pub use config::{ClientConfig, ServerConfig, ServerTlsSettings};
pub use error::{RegistrationError, Result, RpcError};
pub use quorum::ParallelOptions;
pub use registry::{Context, ServiceRegistry};
pub use server::{Server, ServerHandle};
pub use service::{Reply, Service, ServiceProcessor};
pub use stream::StreamingConn;
