//! # Provider
//!
//! Capabilities the host supplies to the engine. Implementations must be
//! `Send + Sync` so independent presentations can be built on separate
//! threads.

use anyhow::Result;
use serde_json::Value;

/// `Codec` decodes query and credential text into JSON values and encodes
/// values back to text.
pub trait Codec: Send + Sync {
    /// Decode text into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error when the text is not valid in the codec's encoding.
    fn decode(&self, text: &str) -> Result<Value>;

    /// Encode a JSON value as text.
    ///
    /// # Errors
    ///
    /// Returns an error when the value cannot be represented.
    fn encode(&self, value: &Value) -> Result<String>;
}

/// The default codec, backed by `serde_json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode(&self, text: &str) -> Result<Value> {
        Ok(serde_json::from_str(text)?)
    }

    fn encode(&self, value: &Value) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }
}

/// `Signer` produces the proof over an assembled presentation.
pub trait Signer: Send + Sync {
    /// Sign the canonical presentation bytes, binding the verifier's
    /// challenge when one was provided. The returned value is embedded as the
    /// presentation's `proof` without inspection.
    ///
    /// # Errors
    ///
    /// Returns an error when the proof cannot be generated. The error's
    /// message is surfaced to the caller unchanged.
    fn sign(&self, payload: &[u8], challenge: Option<&str>) -> Result<Value>;

    /// The holder identifier to set on the presentation, if any.
    fn holder(&self) -> Option<String> {
        None
    }
}

impl<T: Signer + ?Sized> Signer for &T {
    fn sign(&self, payload: &[u8], challenge: Option<&str>) -> Result<Value> {
        (**self).sign(payload, challenge)
    }

    fn holder(&self) -> Option<String> {
        (**self).holder()
    }
}
