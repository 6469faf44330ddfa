//! Message codec.
//!
//! Payloads are opaque to the transport; typed messages are turned into bytes
//! with `bincode`. The `Message` trait ties a request type to the path its
//! handler is registered under.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// A typed request or response that can be routed by path.
pub trait Message: Serialize + DeserializeOwned + Send + 'static {
    /// Path of the handler serving this message type.
    const PATH: &'static str;
}

/// Encode a payload.
pub fn encode<M: Serialize + ?Sized>(msg: &M) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(msg).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a payload.
pub fn decode<M: DeserializeOwned>(bytes: &[u8]) -> Result<M, CodecError> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
        note: String,
    }

    #[test]
    fn test_decode_garbage_fails() {
        let res: Result<Ping, _> = decode(&[0xff]);
        assert!(matches!(res, Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_encode_decode() {
        let ping = Ping { seq: 7, note: "hi".into() };
        let bytes = encode(&ping).unwrap();
        assert_eq!(decode::<Ping>(&bytes).unwrap(), ping);
    }
}
