//! # Data Integrity Proof
//!
//! Presentations are secured with an embedded [Verifiable Credential Data
//! Integrity 1.0] proof using the Ed25519 `eddsa-jcs-2022` cryptosuite. The
//! signature covers the SHA-256 hash of the canonical proof configuration
//! followed by the SHA-256 hash of the canonical presentation.
//!
//! The default signer's verification method is a `did:jwk` DID, so a proof
//! can be verified without any external key resolution.
//!
//! [Verifiable Credential Data Integrity 1.0]: https://www.w3.org/TR/vc-data-integrity

use anyhow::{Context as _, Result, anyhow, bail};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, SubsecRound, Utc};
use ed25519_dalek::Signer as _;
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::provider::Signer;

/// Proof type of every proof created here.
pub const PROOF_TYPE: &str = "DataIntegrityProof";

/// The cryptosuite of every proof created here.
pub const CRYPTOSUITE: &str = "eddsa-jcs-2022";

/// An embedded proof securing a presentation.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::struct_field_names)]
pub struct Proof {
    /// The specific proof type. Always `DataIntegrityProof`.
    #[serde(rename = "type")]
    pub type_: String,

    /// The cryptographic suite used to create the proof.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cryptosuite: Option<String>,

    /// The reason for the proof. Presentations use `authentication`.
    pub proof_purpose: String,

    /// Used to verify the proof: a DID URL dereferencing to the holder's
    /// public key.
    pub verification_method: String,

    /// The date-time the proof was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    /// The security domain the proof is meant for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// The verifier's challenge, binding the proof to a single request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,

    /// The multibase (base64url, `u` prefix) encoded signature.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub proof_value: String,
}

impl Proof {
    // The bytes signed: hash of the proof configuration (the proof without
    // its value) followed by the hash of the document.
    fn hash_data(&self, document: &[u8]) -> Result<Vec<u8>> {
        let mut config = self.clone();
        config.proof_value = String::new();
        let config = canonicalize(&config).context("serializing proof configuration")?;

        let mut hash_data = Sha256::digest(config.as_bytes()).to_vec();
        hash_data.extend_from_slice(&Sha256::digest(document));
        Ok(hash_data)
    }
}

/// Serialize a value using the JSON Canonicalization Scheme ([RFC 8785]).
///
/// # Errors
///
/// Returns an error when the value cannot be represented as JSON.
///
/// [RFC 8785]: https://www.rfc-editor.org/rfc/rfc8785
pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_jcs::to_string(value).context("canonicalizing JSON")
}

/// `Signature` is implemented by key holders able to produce raw Ed25519
/// signatures.
pub trait Signature: Send + Sync {
    /// Sign the message.
    ///
    /// # Errors
    ///
    /// Returns an error when the key is unavailable or signing fails.
    fn try_sign(&self, msg: &[u8]) -> Result<Vec<u8>>;

    /// The DID URL of the public key verifying the signature.
    fn verification_method(&self) -> String;

    /// The DID controlling the key, used as the presentation's `holder`.
    fn controller(&self) -> Option<String> {
        None
    }
}

/// A [`Signer`] producing Data Integrity proofs.
#[derive(Clone, Debug)]
pub struct DataIntegritySigner<S: Signature> {
    signature: S,
    domain: Option<String>,
}

impl<S: Signature> DataIntegritySigner<S> {
    /// Create a signer using the provided key.
    pub const fn new(signature: S) -> Self {
        Self { signature, domain: None }
    }

    /// Bind proofs to a security domain.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

impl<S: Signature> Signer for DataIntegritySigner<S> {
    fn sign(&self, payload: &[u8], challenge: Option<&str>) -> Result<Value> {
        let mut proof = Proof {
            type_: PROOF_TYPE.to_string(),
            cryptosuite: Some(CRYPTOSUITE.to_string()),
            proof_purpose: "authentication".to_string(),
            verification_method: self.signature.verification_method(),
            created: Some(Utc::now().trunc_subsecs(0)),
            domain: self.domain.clone(),
            challenge: challenge.map(ToString::to_string),
            proof_value: String::new(),
        };

        let hash_data = proof.hash_data(payload)?;
        let signature = self.signature.try_sign(&hash_data)?;
        proof.proof_value = format!("u{}", Base64UrlUnpadded::encode_string(&signature));

        Ok(serde_json::to_value(proof)?)
    }

    fn holder(&self) -> Option<String> {
        self.signature.controller()
    }
}

/// An Ed25519 key pair identified by a `did:jwk` DID.
#[derive(Clone, Debug)]
pub struct Ed25519Keyring {
    signing_key: SigningKey,
}

impl Ed25519Keyring {
    /// Generate a new random key pair.
    #[must_use]
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: SigningKey::generate(&mut csprng),
        }
    }

    /// Create a key pair from a 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// The public key as an OKP JWK.
    #[must_use]
    pub fn public_jwk(&self) -> Value {
        json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "x": Base64UrlUnpadded::encode_string(self.signing_key.verifying_key().as_bytes()),
        })
    }

    /// The key's `did:jwk` DID.
    #[must_use]
    pub fn did(&self) -> String {
        let x = Base64UrlUnpadded::encode_string(self.signing_key.verifying_key().as_bytes());
        // JCS form of `public_jwk`: members sorted, `x` needs no escaping
        let jwk = format!(r#"{{"crv":"Ed25519","kty":"OKP","x":"{x}"}}"#);
        format!("did:jwk:{}", Base64UrlUnpadded::encode_string(jwk.as_bytes()))
    }
}

impl Signature for Ed25519Keyring {
    fn try_sign(&self, msg: &[u8]) -> Result<Vec<u8>> {
        Ok(self.signing_key.try_sign(msg)?.to_bytes().to_vec())
    }

    fn verification_method(&self) -> String {
        format!("{}#0", self.did())
    }

    fn controller(&self) -> Option<String> {
        Some(self.did())
    }
}

/// Verify a Data Integrity proof over `document`, resolving its `did:jwk`
/// verification method. When `challenge` is provided, the proof must carry
/// the same challenge.
///
/// # Errors
///
/// Returns an error when the proof is not an `eddsa-jcs-2022` Data Integrity
/// proof, the verification method cannot be resolved, or the signature is
/// invalid.
pub fn verify(proof: &Value, document: &[u8], challenge: Option<&str>) -> Result<()> {
    let proof: Proof = serde_json::from_value(proof.clone()).context("decoding proof")?;
    if proof.type_ != PROOF_TYPE || proof.cryptosuite.as_deref() != Some(CRYPTOSUITE) {
        bail!("unsupported proof type `{}`", proof.type_);
    }
    if challenge.is_some() && proof.challenge.as_deref() != challenge {
        bail!("proof challenge does not match");
    }

    let key = resolve_did_jwk(&proof.verification_method)?;
    let Some(encoded) = proof.proof_value.strip_prefix('u') else {
        bail!("`proofValue` must be base64url multibase encoded");
    };
    let bytes = Base64UrlUnpadded::decode_vec(encoded).map_err(|e| anyhow!("{e}"))?;
    let signature = ed25519_dalek::Signature::from_slice(&bytes)?;

    let hash_data = proof.hash_data(document)?;
    key.verify_strict(&hash_data, &signature).context("verifying proof signature")?;
    Ok(())
}

// Resolve the Ed25519 public key embedded in a `did:jwk` DID URL.
fn resolve_did_jwk(did_url: &str) -> Result<VerifyingKey> {
    let did = did_url.split_once('#').map_or(did_url, |(did, _)| did);
    let Some(encoded) = did.strip_prefix("did:jwk:") else {
        bail!("unsupported verification method `{did_url}`");
    };

    let decoded = Base64UrlUnpadded::decode_vec(encoded).map_err(|e| anyhow!("{e}"))?;
    let jwk: Value = serde_json::from_slice(&decoded).context("decoding JWK")?;
    if jwk.get("kty").and_then(Value::as_str) != Some("OKP")
        || jwk.get("crv").and_then(Value::as_str) != Some("Ed25519")
    {
        bail!("verification method is not an Ed25519 key");
    }

    let Some(x) = jwk.get("x").and_then(Value::as_str) else {
        bail!("JWK has no `x` coordinate");
    };
    let x = Base64UrlUnpadded::decode_vec(x).map_err(|e| anyhow!("{e}"))?;
    let x: [u8; 32] = x.try_into().map_err(|_| anyhow!("Ed25519 public key must be 32 bytes"))?;
    Ok(VerifyingKey::from_bytes(&x)?)
}
