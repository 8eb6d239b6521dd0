//! # Credential Format
//!
//! This module decodes signed credentials into a [`CredentialClaims`]: the
//! credential's claim tree, the metadata used by DCQL type filters, and the
//! envelope needed to reproduce a valid disclosure of the credential.
//!
//! Supported formats are W3C Verifiable Credentials secured with an embedded
//! proof (`ldp_vc`) or as a compact JWS (`jwt_vc_json`), and IETF SD-JWT VCs
//! (`dc+sd-jwt`). The issuer's signature is not verified here.

pub mod sd_jwt;
pub mod w3c_vc;

use std::fmt::{self, Display, Formatter};

use anyhow::{Context as _, anyhow};
use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::claims::ClaimNode;
use crate::error::{Error, malformed};
use crate::provider::Codec;

pub use self::sd_jwt::{Disclosure, SdJwtEnvelope};

/// The format of a credential, as named in DCQL `format` parameters.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum CredentialFormat {
    /// A W3C Verifiable Credential secured with an embedded Data Integrity
    /// proof.
    #[serde(rename = "ldp_vc")]
    #[default]
    LdpVc,

    /// A W3C Verifiable Credential secured as a JWT, not using JSON-LD.
    #[serde(rename = "jwt_vc_json")]
    JwtVcJson,

    /// A W3C Verifiable Credential secured as a JWT, using JSON-LD.
    #[serde(rename = "jwt_vc_json-ld")]
    JwtVcJsonLd,

    /// An IETF SD-JWT VC.
    #[serde(rename = "dc+sd-jwt", alias = "vc+sd-jwt")]
    DcSdJwt,

    /// An ISO mDL (ISO.18013-5) mobile document.
    #[serde(rename = "mso_mdoc")]
    MsoMdoc,
}

impl CredentialFormat {
    /// Whether the format is one of the W3C data model formats.
    #[must_use]
    pub const fn is_w3c(self) -> bool {
        matches!(self, Self::LdpVc | Self::JwtVcJson | Self::JwtVcJsonLd)
    }
}

impl Display for CredentialFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::LdpVc => write!(f, "ldp_vc"),
            Self::JwtVcJson => write!(f, "jwt_vc_json"),
            Self::JwtVcJsonLd => write!(f, "jwt_vc_json-ld"),
            Self::DcSdJwt => write!(f, "dc+sd-jwt"),
            Self::MsoMdoc => write!(f, "mso_mdoc"),
        }
    }
}

/// Credential metadata matched by DCQL `meta` queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialMeta {
    /// The W3C credential's `type` values.
    W3c {
        /// Credential types, in the order issued.
        types: Vec<String>,
    },

    /// The SD-JWT VC type.
    SdJwt {
        /// The `vct` claim.
        vct: String,
    },
}

/// What is needed, beyond the claim tree, to present the credential.
#[derive(Clone, Debug)]
pub enum Envelope {
    /// A W3C document presented as its disclosed claims. The issuer's proof
    /// covers the whole document and is never presented.
    Document,

    /// The issuer-signed JWT and its disclosures.
    SdJwt(SdJwtEnvelope),
}

/// A decoded credential: claims plus the metadata and envelope needed to
/// match and present it.
#[derive(Clone, Debug)]
pub struct CredentialClaims {
    format: CredentialFormat,
    meta: CredentialMeta,
    claims: ClaimNode,
    envelope: Envelope,
}

impl CredentialClaims {
    /// Decode a signed credential. JSON documents are treated as `ldp_vc`;
    /// compact serializations are `dc+sd-jwt` when they carry disclosures or
    /// an SD-JWT `typ`, and `jwt_vc_json` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `MalformedCredential` when the input cannot be decoded or is
    /// not a well-formed credential.
    pub fn parse(raw: &str, codec: &impl Codec) -> Result<Self, Error> {
        let raw = raw.trim();
        if raw.starts_with('{') {
            let value = codec.decode(raw).context("decoding credential")?;
            return Self::from_value(&value);
        }
        Self::from_compact(raw, codec)
    }

    /// Build from an already decoded credential. A JSON string is treated as
    /// a compact serialization.
    ///
    /// # Errors
    ///
    /// Returns `MalformedCredential` when the value is not a well-formed
    /// credential.
    pub fn from_value(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Object(document) => w3c_vc::from_ldp(document),
            Value::String(compact) => Self::from_compact(compact, &crate::provider::JsonCodec),
            _ => Err(malformed!("unsupported credential encoding")),
        }
    }

    fn from_compact(compact: &str, codec: &impl Codec) -> Result<Self, Error> {
        let (jwt, rest) = compact.split_once('~').unwrap_or((compact, ""));
        let jws = Jws::decode(jwt, codec)?;

        let sd_typ = jws.header.get("typ").and_then(Value::as_str).is_some_and(|typ| {
            typ.eq_ignore_ascii_case("dc+sd-jwt") || typ.eq_ignore_ascii_case("vc+sd-jwt")
        });
        if compact.contains('~') || sd_typ {
            return sd_jwt::from_compact(jws, rest, codec);
        }
        w3c_vc::from_jwt(&jws)
    }

    pub(crate) const fn new(
        format: CredentialFormat, meta: CredentialMeta, claims: ClaimNode, envelope: Envelope,
    ) -> Self {
        Self { format, meta, claims, envelope }
    }

    /// The credential's format.
    #[must_use]
    pub const fn format(&self) -> CredentialFormat {
        self.format
    }

    /// Metadata used for DCQL type filters.
    #[must_use]
    pub const fn meta(&self) -> &CredentialMeta {
        &self.meta
    }

    /// The credential's claim tree.
    #[must_use]
    pub const fn claims(&self) -> &ClaimNode {
        &self.claims
    }

    pub(crate) const fn envelope(&self) -> &Envelope {
        &self.envelope
    }
}

/// A compact JWS, decoded but not verified.
#[derive(Clone, Debug)]
pub struct Jws {
    /// The protected header.
    pub header: Map<String, Value>,

    /// The payload.
    pub payload: Map<String, Value>,

    /// The original compact serialization.
    pub compact: String,
}

impl Jws {
    /// Decode the header and payload of a compact JWS.
    ///
    /// # Errors
    ///
    /// Returns an error when the JWS does not have three parts or a part is
    /// not base64url-encoded JSON object.
    pub fn decode(compact: &str, codec: &impl Codec) -> anyhow::Result<Self> {
        let parts = compact.split('.').collect::<Vec<_>>();
        let [header, payload, _signature] = parts.as_slice() else {
            return Err(anyhow!("JWS must have 3 parts, found {}", parts.len()));
        };

        Ok(Self {
            header: decode_part(header, codec).context("decoding JWS header")?,
            payload: decode_part(payload, codec).context("decoding JWS payload")?,
            compact: compact.to_string(),
        })
    }
}

fn decode_part(part: &str, codec: &impl Codec) -> anyhow::Result<Map<String, Value>> {
    let bytes = Base64UrlUnpadded::decode_vec(part).map_err(|e| anyhow!("{e}"))?;
    let text = String::from_utf8(bytes)?;
    match codec.decode(&text)? {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow!("not a JSON object")),
    }
}
