//! # Presentation Assembler
//!
//! Builds the Verifiable Presentation envelope around the disclosed
//! credentials and has the [`Signer`] secure it.
//!
//! The proof covers the canonical serialization of the presentation without
//! its `proof` member (see [`Presentation::signing_input`]). Assembly is all
//! or nothing: when the signer fails, no presentation is returned.

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::disclose::DisclosurePayload;
use crate::error::{Error, malformed};
use crate::format::{CredentialClaims, CredentialFormat};
use crate::proof::{self, canonicalize};
use crate::provider::{Codec, JsonCodec, Signer};

/// The base context of every presentation.
pub const VP_CONTEXT: &str = "https://www.w3.org/ns/credentials/v2";

/// The type of every presentation.
pub const VP_TYPE: &str = "VerifiablePresentation";

/// A signed Verifiable Presentation.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Presentation {
    /// JSON-LD contexts, beginning with the VC Data Model 2.0 context.
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// A `urn:uuid:` identifier unique to this presentation.
    pub id: String,

    /// Always `["VerifiablePresentation"]`.
    #[serde(rename = "type")]
    pub type_: Vec<String>,

    /// The holder presenting the credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,

    /// The disclosed credentials, tagged with the credential query each
    /// satisfies.
    pub verifiable_credential: Vec<PresentedCredential>,

    /// The verifier's challenge (nonce), when one was provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,

    /// The intended audience, when one was provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// The proof produced by the signer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Value>,
}

impl Presentation {
    /// The bytes the proof covers: the canonical serialization of the
    /// presentation without its proof.
    ///
    /// # Errors
    ///
    /// Returns an error if the presentation cannot be serialized.
    pub fn signing_input(&self) -> anyhow::Result<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.proof = None;
        Ok(canonicalize(&unsigned)?.into_bytes())
    }

    /// Serialize the presentation as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the presentation cannot be serialized.
    pub fn to_json(&self) -> anyhow::Result<String> {
        self.encode(&JsonCodec)
    }

    /// Serialize the presentation using the provided codec.
    ///
    /// # Errors
    ///
    /// Returns an error if the codec cannot encode the presentation.
    pub fn encode(&self, codec: &impl Codec) -> anyhow::Result<String> {
        let value = serde_json::to_value(self).context("serializing presentation")?;
        codec.encode(&value)
    }

    /// Parse a serialized presentation.
    ///
    /// # Errors
    ///
    /// Returns `MalformedCredential` when the text is not a presentation.
    pub fn from_json(raw: &str) -> Result<Self, Error> {
        serde_json::from_str(raw).map_err(|e| malformed!("invalid presentation: {e}"))
    }

    /// The presented credential satisfying the given credential query.
    #[must_use]
    pub fn credential(&self, query_id: &str) -> Option<&PresentedCredential> {
        self.verifiable_credential.iter().find(|vc| vc.credential_query_id == query_id)
    }

    /// Verify the presentation's Data Integrity proof. The proof's challenge
    /// must equal the presentation's.
    ///
    /// # Errors
    ///
    /// Returns an error when the presentation has no proof or the proof is
    /// invalid.
    pub fn verify(&self) -> anyhow::Result<()> {
        let Some(proof) = &self.proof else {
            anyhow::bail!("presentation has no proof");
        };
        let document = self.signing_input()?;
        proof::verify(proof, &document, self.challenge.as_deref())
    }
}

/// A disclosed credential as it appears in a presentation.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresentedCredential {
    /// The credential query the credential satisfies.
    pub credential_query_id: String,

    /// The credential's format.
    pub format: CredentialFormat,

    /// The trimmed credential document, or the SD-JWT compact serialization
    /// carrying only the needed disclosures.
    pub credential: Value,
}

impl PresentedCredential {
    /// Tag a disclosure with the credential query it satisfies.
    #[must_use]
    pub fn new(credential_query_id: impl Into<String>, payload: DisclosurePayload) -> Self {
        Self {
            credential_query_id: credential_query_id.into(),
            format: payload.format,
            credential: payload.credential,
        }
    }

    /// Decode the presented credential's claims.
    ///
    /// # Errors
    ///
    /// Returns `MalformedCredential` when the credential cannot be decoded.
    pub fn claims(&self) -> Result<Value, Error> {
        let decoded = CredentialClaims::from_value(&self.credential)?;
        Ok(decoded.claims().to_value())
    }
}

/// Build a signed [`Presentation`].
#[derive(Debug)]
pub struct VpBuilder<C, S> {
    credentials: C,
    challenge: Option<String>,
    audience: Option<String>,
    holder: Option<String>,
    context: Vec<String>,
    signer: S,
}

/// Builder has no credentials.
#[doc(hidden)]
pub struct NoCredentials;
/// Builder has credentials.
#[doc(hidden)]
pub struct HasCredentials(Vec<PresentedCredential>);

/// Builder has no signer.
#[doc(hidden)]
pub struct NoSigner;
/// Builder state has a signer.
#[doc(hidden)]
pub struct HasSigner<'a, S: Signer>(pub &'a S);

impl Default for VpBuilder<NoCredentials, NoSigner> {
    fn default() -> Self {
        Self::new()
    }
}

impl VpBuilder<NoCredentials, NoSigner> {
    /// Create a new builder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            credentials: NoCredentials,
            challenge: None,
            audience: None,
            holder: None,
            context: vec![],
            signer: NoSigner,
        }
    }
}

// Credentials to include in the presentation
impl<S> VpBuilder<NoCredentials, S> {
    /// Set the disclosed credentials, in presentation order. The list may be
    /// empty when every requested credential was optional.
    #[must_use]
    pub fn credentials(
        self, credentials: impl IntoIterator<Item = PresentedCredential>,
    ) -> VpBuilder<HasCredentials, S> {
        VpBuilder {
            credentials: HasCredentials(credentials.into_iter().collect()),
            challenge: self.challenge,
            audience: self.audience,
            holder: self.holder,
            context: self.context,
            signer: self.signer,
        }
    }
}

// Optional fields
impl<C, S> VpBuilder<C, S> {
    /// Bind the verifier's challenge.
    #[must_use]
    pub fn challenge(mut self, challenge: impl Into<String>) -> Self {
        self.challenge = Some(challenge.into());
        self
    }

    /// Set the intended audience (`domain`).
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Set the holder, overriding any the signer reports.
    #[must_use]
    pub fn holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = Some(holder.into());
        self
    }

    /// Add a JSON-LD context after the base context.
    #[must_use]
    pub fn context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        if context != VP_CONTEXT && !self.context.contains(&context) {
            self.context.push(context);
        }
        self
    }
}

// Signer
impl<C> VpBuilder<C, NoSigner> {
    /// Set the presentation `Signer`.
    #[must_use]
    pub fn signer<S: Signer>(self, signer: &'_ S) -> VpBuilder<C, HasSigner<'_, S>> {
        VpBuilder {
            credentials: self.credentials,
            challenge: self.challenge,
            audience: self.audience,
            holder: self.holder,
            context: self.context,
            signer: HasSigner(signer),
        }
    }
}

impl<S: Signer> VpBuilder<HasCredentials, HasSigner<'_, S>> {
    /// Assemble and sign the presentation. The signer is called exactly
    /// once.
    ///
    /// # Errors
    ///
    /// Returns `SigningFailed` with the signer's message when the signer
    /// fails.
    #[instrument(level = "debug", skip_all)]
    pub fn build(self) -> Result<Presentation, Error> {
        let signer = self.signer.0;

        let mut context = vec![VP_CONTEXT.to_string()];
        context.extend(self.context);

        let mut presentation = Presentation {
            context,
            id: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            type_: vec![VP_TYPE.to_string()],
            holder: self.holder.or_else(|| signer.holder()),
            verifiable_credential: self.credentials.0,
            challenge: self.challenge,
            domain: self.audience,
            proof: None,
        };

        let payload = presentation.signing_input().context("serializing presentation")?;
        let proof = signer
            .sign(&payload, presentation.challenge.as_deref())
            .map_err(|e| Error::SigningFailed(e.to_string()))?;
        presentation.proof = Some(proof);

        tracing::debug!(
            id = %presentation.id,
            credentials = presentation.verifiable_credential.len(),
            "presentation signed"
        );
        Ok(presentation)
    }
}
