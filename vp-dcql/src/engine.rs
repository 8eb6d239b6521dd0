//! # Engine
//!
//! Orchestrates presentation creation: decode the query and candidate
//! credentials, resolve the query, select disclosures, then assemble and sign
//! the presentation.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::dcql::DcqlQuery;
use crate::disclose;
use crate::error::{Error, malformed};
use crate::format::CredentialClaims;
use crate::present::{Presentation, PresentedCredential, VpBuilder};
use crate::provider::{Codec, JsonCodec, Signer};
use crate::{Result, resolver};

/// Presentation options.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// How to choose between several satisfying credentials or credential
    /// set options.
    pub tie_break: TieBreak,

    /// The intended audience, set as the presentation's `domain`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,

    /// The presentation's `holder`, overriding any the signer reports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,

    /// JSON-LD contexts to add after the base context.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
}

/// Tie-break policy when more than one credential, or more than one
/// credential set option, satisfies a query.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The first candidate in input order, and the first option in declared
    /// order.
    #[default]
    FirstMatch,

    /// The candidate or option disclosing the fewest claims, ties going to
    /// the earlier one.
    FewestClaims,
}

/// Creates presentations using a codec and options.
#[derive(Clone, Debug, Default)]
pub struct Engine<C: Codec = JsonCodec> {
    codec: C,
    options: Options,
}

impl Engine {
    /// Create an engine using the JSON codec and default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: Codec> Engine<C> {
    /// Use another codec to decode queries and credentials.
    #[must_use]
    pub fn with_codec<D: Codec>(self, codec: D) -> Engine<D> {
        Engine { codec, options: self.options }
    }

    /// Use the provided options.
    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// The engine's options.
    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }

    /// Create a presentation satisfying `dcql_query` from the candidate
    /// credentials, in the order given.
    ///
    /// # Errors
    ///
    /// Returns `MalformedQuery` or `MalformedCredential` when an input cannot
    /// be decoded, `UnsatisfiedBranch` when the credentials do not satisfy
    /// the query, and `SigningFailed` when the signer fails.
    #[instrument(level = "debug", skip(self, dcql_query, credentials, signer))]
    pub fn present(
        &self, dcql_query: &str, credentials: &[&str], challenge: Option<&str>, signer: &impl Signer,
    ) -> Result<Presentation> {
        let query = DcqlQuery::parse(dcql_query, &self.codec)?;
        let candidates = credentials
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                CredentialClaims::parse(raw, &self.codec).map_err(|e| match e {
                    Error::MalformedCredential(reason) => {
                        malformed!("credential {index}: {reason}")
                    }
                    other => other,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.present_parsed(&query, &candidates, challenge, signer)
    }

    /// Create a presentation from an already parsed query and credentials.
    ///
    /// # Errors
    ///
    /// Returns `UnsatisfiedBranch` when the credentials do not satisfy the
    /// query and `SigningFailed` when the signer fails.
    pub fn present_parsed(
        &self, query: &DcqlQuery, candidates: &[CredentialClaims], challenge: Option<&str>,
        signer: &impl Signer,
    ) -> Result<Presentation> {
        let resolution = resolver::resolve(query, candidates, &self.options)?;

        let mut presented = vec![];
        for selection in &resolution.selections {
            let Some(candidate) = candidates.get(selection.candidate) else {
                return Err(malformed!("no candidate credential {}", selection.candidate));
            };
            let payload = disclose::select(candidate, &selection.disclosed_paths)?;
            presented.push(PresentedCredential::new(&selection.query_id, payload));
        }

        let mut builder = VpBuilder::new().credentials(presented);
        for context in &self.options.context {
            builder = builder.context(context);
        }
        if let Some(challenge) = challenge {
            builder = builder.challenge(challenge);
        }
        if let Some(audience) = &self.options.audience {
            builder = builder.audience(audience);
        }
        if let Some(holder) = &self.options.holder {
            builder = builder.holder(holder);
        }

        builder.signer(signer).build()
    }

    /// Serialize a presentation using the engine's codec.
    ///
    /// # Errors
    ///
    /// Returns an error if the codec cannot encode the presentation.
    pub fn encode(&self, presentation: &Presentation) -> anyhow::Result<String> {
        presentation.encode(&self.codec)
    }
}

/// Create a presentation of a single signed credential satisfying the DCQL
/// query, using the JSON codec and default options.
///
/// # Errors
///
/// Returns the same errors as [`Engine::present`].
pub fn create_presentation(
    dcql_query: &str, signed_credential: &str, challenge: Option<&str>, signer: &impl Signer,
) -> Result<Presentation> {
    Engine::new().present(dcql_query, &[signed_credential], challenge, signer)
}
