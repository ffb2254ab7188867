//! Codec boundary (C2): payloads are opaque to every other component. The
//! crate neither assumes nor special-cases the wire format — it only needs
//! `encode`/`decode` to round-trip.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A pluggable `{encode, decode}` capability, injected by the caller rather
/// than hard-coded (spec §9 "Compressed payloads").
pub trait Codec: Send + Sync + 'static {
    fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>>;
    fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V>;
}

/// Default codec: JSON followed by zstd, matching the "compressed payloads"
/// requirement of spec §3/§6 without committing callers to a specific
/// business format.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZstdJsonCodec {
    level: i32,
}

impl ZstdJsonCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Codec for ZstdJsonCodec {
    fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(value).map_err(|e| Error::Encode(e.into()))?;
        zstd::encode_all(json.as_slice(), self.level).map_err(Error::Encode)
    }

    fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V> {
        let json = zstd::decode_all(bytes).map_err(Error::Decode)?;
        serde_json::from_slice(&json).map_err(|e| Error::Decode(e.into()))
    }
}
