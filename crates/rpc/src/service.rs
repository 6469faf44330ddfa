//! Server-side request dispatch.
//!
//! A [`Service`] turns a path and a payload into a [`Reply`]. Most services
//! are a [`ServiceProcessor`]: a table from path to handler, filled in before
//! the conode starts serving and only read afterwards.
//!
//! # Example
//!
//! ```rust
//! use rpc::ServiceProcessor;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Ping(u32);
//!
//! impl corelib::Message for Ping {
//!     const PATH: &'static str = "Ping";
//! }
//!
//! let mut processor = ServiceProcessor::new();
//! processor.register_handler(|ping: Ping| Ok(ping.0 + 1)).unwrap();
//! assert!(processor.register_handler(|ping: Ping| Ok(ping.0)).is_err());
//! ```

use std::collections::HashMap;

use serde::Serialize;
use streaming::StreamingTunnel;

use corelib::{codec, Message, ProtocolError, ProtocolErrorKind, RequestKind};

use crate::error::RegistrationError;

/// What a service hands back for one request.
#[derive(Debug)]
pub enum Reply {
    Unary(Vec<u8>),
    Stream(StreamingTunnel),
}

impl Reply {
    pub fn kind(&self) -> RequestKind {
        match self {
            Reply::Unary(_) => RequestKind::Unary,
            Reply::Stream(_) => RequestKind::Streaming,
        }
    }
}

/// A service running on a conode.
pub trait Service: Send + Sync + 'static {
    /// Handle one request addressed to `path`.
    fn process_client_request(&self, path: &str, payload: &[u8]) -> Result<Reply, ProtocolError>;

    /// Kind of request `path` serves, if known up front.
    ///
    /// Lets the server turn away a request of the wrong kind without running
    /// the handler.
    fn path_kind(&self, _path: &str) -> Option<RequestKind> {
        None
    }
}

type UnaryFn = Box<dyn Fn(&[u8]) -> Result<Vec<u8>, ProtocolError> + Send + Sync>;
type StreamingFn = Box<dyn Fn(&[u8]) -> Result<StreamingTunnel, ProtocolError> + Send + Sync>;

enum Handler {
    Unary(UnaryFn),
    Streaming(StreamingFn),
}

impl Handler {
    fn kind(&self) -> RequestKind {
        match self {
            Handler::Unary(_) => RequestKind::Unary,
            Handler::Streaming(_) => RequestKind::Streaming,
        }
    }
}

/// Path-routed [`Service`].
#[derive(Default)]
pub struct ServiceProcessor {
    handlers: HashMap<String, Handler>,
}

impl std::fmt::Debug for ServiceProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProcessor")
            .field("paths", &self.paths())
            .finish()
    }
}

impl ServiceProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unary handler under `Req::PATH`.
    ///
    /// The request is decoded before the handler runs; a payload that does
    /// not decode is answered with a `Malformed` error. A handler error is
    /// sent back as a `Handler` error carrying its text.
    pub fn register_handler<Req, Resp, F>(&mut self, handler: F) -> Result<(), RegistrationError>
    where
        Req: Message,
        Resp: Serialize,
        F: Fn(Req) -> anyhow::Result<Resp> + Send + Sync + 'static,
    {
        self.insert(
            Req::PATH,
            Handler::Unary(Box::new(move |payload| {
                let request = decode_request::<Req>(payload)?;
                let response = handler(request).map_err(handler_error)?;
                codec::encode(&response).map_err(|e| ProtocolError::handler(e.to_string()))
            })),
        )
    }

    /// Register a streaming handler under `Req::PATH`.
    ///
    /// The handler starts its producer and returns the tunnel; it must not
    /// wait for the stream to finish.
    pub fn register_streaming_handler<Req, F>(&mut self, handler: F) -> Result<(), RegistrationError>
    where
        Req: Message,
        F: Fn(Req) -> anyhow::Result<StreamingTunnel> + Send + Sync + 'static,
    {
        self.insert(
            Req::PATH,
            Handler::Streaming(Box::new(move |payload| {
                let request = decode_request::<Req>(payload)?;
                handler(request).map_err(handler_error)
            })),
        )
    }

    /// Register a unary handler working on raw payload bytes.
    pub fn register_raw_handler<F>(&mut self, path: &str, handler: F) -> Result<(), RegistrationError>
    where
        F: Fn(&[u8]) -> anyhow::Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.insert(
            path,
            Handler::Unary(Box::new(move |payload| handler(payload).map_err(handler_error))),
        )
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    fn insert(&mut self, path: &str, handler: Handler) -> Result<(), RegistrationError> {
        if self.handlers.contains_key(path) {
            return Err(RegistrationError::DuplicatePath(path.to_string()));
        }
        self.handlers.insert(path.to_string(), handler);
        Ok(())
    }
}

impl Service for ServiceProcessor {
    fn process_client_request(&self, path: &str, payload: &[u8]) -> Result<Reply, ProtocolError> {
        match self.handlers.get(path) {
            Some(Handler::Unary(handler)) => handler(payload).map(Reply::Unary),
            Some(Handler::Streaming(handler)) => handler(payload).map(Reply::Stream),
            None => Err(ProtocolError::unknown_path(path)),
        }
    }

    fn path_kind(&self, path: &str) -> Option<RequestKind> {
        self.handlers.get(path).map(Handler::kind)
    }
}

fn decode_request<Req: Message>(payload: &[u8]) -> Result<Req, ProtocolError> {
    codec::decode(payload).map_err(|e| ProtocolError::new(ProtocolErrorKind::Malformed, e.to_string()))
}

fn handler_error(e: anyhow::Error) -> ProtocolError {
    ProtocolError::handler(format!("{e:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct Echo(String);

    impl Message for Echo {
        const PATH: &'static str = "Echo";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Count(u32);

    impl Message for Count {
        const PATH: &'static str = "Count";
    }

    fn processor() -> ServiceProcessor {
        let mut processor = ServiceProcessor::new();
        processor
            .register_handler(|echo: Echo| Ok(echo.0))
            .unwrap();
        processor
            .register_streaming_handler(|_count: Count| {
                let (_sender, tunnel) = streaming::tunnel(4);
                Ok(tunnel)
            })
            .unwrap();
        processor
            .register_raw_handler("Fail", |_| anyhow::bail!("out of coffee"))
            .unwrap();
        processor
    }

    #[test]
    fn test_routes_by_path() {
        let processor = processor();
        let payload = codec::encode(&Echo("hi".into())).unwrap();

        match processor.process_client_request("Echo", &payload).unwrap() {
            Reply::Unary(bytes) => assert_eq!(codec::decode::<String>(&bytes).unwrap(), "hi"),
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(processor.paths(), vec!["Count", "Echo", "Fail"]);
        assert_eq!(processor.path_kind("Count"), Some(RequestKind::Streaming));
        assert_eq!(processor.path_kind("Echo"), Some(RequestKind::Unary));
        assert_eq!(processor.path_kind("Nope"), None);
    }

    #[test]
    fn test_errors() {
        let processor = processor();

        let err = processor.process_client_request("Nope", &[]).unwrap_err();
        assert_eq!(err.kind, ProtocolErrorKind::UnknownPath);

        let err = processor.process_client_request("Echo", &[0xff]).unwrap_err();
        assert_eq!(err.kind, ProtocolErrorKind::Malformed);

        let err = processor.process_client_request("Fail", &[]).unwrap_err();
        assert_eq!(err.kind, ProtocolErrorKind::Handler);
        assert!(err.message.contains("out of coffee"));
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut processor = processor();
        let err = processor
            .register_raw_handler("Echo", |bytes| Ok(bytes.to_vec()))
            .unwrap_err();
        assert_eq!(err, RegistrationError::DuplicatePath("Echo".into()));
    }
}
