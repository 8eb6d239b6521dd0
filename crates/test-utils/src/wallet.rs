use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use serde_json::Value;
use vp_dcql::{DataIntegritySigner, Ed25519Keyring, Signer};

/// Holder signing presentations with an Ed25519 `did:jwk` key.
#[derive(Debug)]
pub struct Wallet {
    did: String,
    signer: DataIntegritySigner<Ed25519Keyring>,
    signed: AtomicUsize,
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

impl Wallet {
    #[must_use]
    pub fn new() -> Self {
        let keyring = Ed25519Keyring::from_seed(&[7; 32]);
        Self {
            did: keyring.did(),
            signer: DataIntegritySigner::new(keyring),
            signed: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn did(&self) -> &str {
        &self.did
    }

    /// Number of presentations signed.
    #[must_use]
    pub fn signatures(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }
}

impl Signer for Wallet {
    fn sign(&self, payload: &[u8], challenge: Option<&str>) -> Result<Value> {
        self.signed.fetch_add(1, Ordering::SeqCst);
        self.signer.sign(payload, challenge)
    }

    fn holder(&self) -> Option<String> {
        self.signer.holder()
    }
}

/// Signer whose key is never available.
#[derive(Debug)]
pub struct FailingSigner(pub &'static str);

impl Signer for FailingSigner {
    fn sign(&self, _: &[u8], _: Option<&str>) -> Result<Value> {
        Err(anyhow!("{}", self.0))
    }
}
