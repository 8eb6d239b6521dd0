//! # SD-JWT VC
//!
//! Decoding of `dc+sd-jwt` credentials: the issuer-signed JWT's payload with
//! every disclosure unpacked into place, so DCQL paths address claims exactly
//! as they would in a fully disclosed credential.
//!
//! The envelope keeps the issuer-signed JWT, the disclosures as issued and,
//! for each disclosure, the claim path it introduces. Presenting a subset of
//! claims is then a matter of choosing which disclosures to append.

use std::collections::{HashMap, HashSet};

use anyhow::{Context as _, anyhow};
use base64ct::{Base64UrlUnpadded, Encoding};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::claims::{ClaimNode, ClaimPath, PathStep};
use crate::error::{Error, malformed};
use crate::format::{CredentialClaims, CredentialFormat, CredentialMeta, Envelope, Jws};
use crate::provider::Codec;

/// A claim disclosure, as issued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disclosure {
    encoded: String,
    name: Option<String>,
    value: Value,
    digest: String,
}

impl Disclosure {
    /// Unpack a base64url-encoded disclosure: `[salt, name, value]` for an
    /// object member or `[salt, value]` for an array element.
    ///
    /// # Errors
    ///
    /// Returns an error if the decoding fails or the disclosure is not a
    /// JSON array of length 2 or 3.
    pub fn decode(encoded: &str, codec: &impl Codec) -> anyhow::Result<Self> {
        let decoded = Base64UrlUnpadded::decode_vec(encoded).map_err(|e| anyhow!("{e}"))?;
        let text = String::from_utf8(decoded)?;
        let Value::Array(parts) = codec.decode(&text)? else {
            return Err(anyhow!("disclosure must be a JSON array"));
        };

        let (name, value) = match parts.as_slice() {
            [Value::String(_), Value::String(name), value] => (Some(name.clone()), value.clone()),
            [Value::String(_), value] => (None, value.clone()),
            [_, _] | [_, _, _] => return Err(anyhow!("disclosure salt or name is invalid")),
            _ => return Err(anyhow!("disclosure must have 2 or 3 elements")),
        };
        if name.as_deref().is_some_and(|n| n == "_sd" || n == "...") {
            return Err(anyhow!("disclosure uses a reserved claim name"));
        }

        Ok(Self {
            encoded: encoded.to_string(),
            name,
            value,
            digest: digest(encoded),
        })
    }

    /// The claim name, or `None` for an array element.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The disclosed value.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// The disclosure as it appears in the compact serialization.
    #[must_use]
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// The base64url-encoded SHA-256 digest referenced from `_sd` or `...`.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// Base64url-encoded SHA-256 digest of an encoded disclosure.
#[must_use]
pub fn digest(encoded: &str) -> String {
    Base64UrlUnpadded::encode_string(Sha256::digest(encoded.as_bytes()).as_slice())
}

/// The issuer-signed JWT and the disclosures needed to reconstruct any
/// subset of its claims.
#[derive(Clone, Debug)]
pub struct SdJwtEnvelope {
    issuer_jwt: String,
    disclosures: Vec<Disclosure>,

    // the claim path each disclosure introduces
    sources: Vec<(ClaimPath, usize)>,
}

impl SdJwtEnvelope {
    /// The issuer-signed JWT.
    #[must_use]
    pub fn issuer_jwt(&self) -> &str {
        &self.issuer_jwt
    }

    /// Disclosures needed to reveal `paths`, in issued order: every
    /// disclosure introducing a path, one of its ancestors or one of its
    /// descendants.
    #[must_use]
    pub fn disclosures_for(&self, paths: &[ClaimPath]) -> Vec<&Disclosure> {
        let mut selected = self
            .sources
            .iter()
            .filter(|(source, _)| {
                paths.iter().any(|path| path.starts_with(source) || source.starts_with(path))
            })
            .map(|(_, index)| *index)
            .collect::<Vec<_>>();
        selected.sort_unstable();
        selected.dedup();
        selected.into_iter().map(|index| &self.disclosures[index]).collect()
    }

    /// Compact serialization disclosing only `paths`. No key binding JWT is
    /// appended.
    #[must_use]
    pub fn present(&self, paths: &[ClaimPath]) -> String {
        let mut compact = format!("{}~", self.issuer_jwt);
        for disclosure in self.disclosures_for(paths) {
            compact.push_str(disclosure.encoded());
            compact.push('~');
        }
        compact
    }
}

/// Decode an SD-JWT from its issuer-signed JWT and the `~`-separated
/// remainder of the compact serialization.
pub(super) fn from_compact(
    jws: Jws, rest: &str, codec: &impl Codec,
) -> Result<CredentialClaims, Error> {
    match jws.payload.get("_sd_alg") {
        None => {}
        Some(Value::String(alg)) if alg.eq_ignore_ascii_case("sha-256") => {}
        Some(alg) => return Err(malformed!("unsupported `_sd_alg` {alg}")),
    }
    let Some(Value::String(vct)) = jws.payload.get("vct") else {
        return Err(malformed!("SD-JWT has no `vct`"));
    };
    let vct = vct.clone();

    let segments = rest.split('~').collect::<Vec<_>>();
    let mut disclosures = vec![];
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        // a trailing key binding JWT belongs to an earlier presentation
        if segment.contains('.') {
            if i + 1 == segments.len() {
                tracing::debug!("dropping key binding JWT");
                continue;
            }
            return Err(malformed!("key binding JWT must be the last segment"));
        }
        let disclosure = Disclosure::decode(segment, codec)
            .with_context(|| format!("decoding disclosure {}", disclosures.len()))?;
        disclosures.push(disclosure);
    }

    let mut by_digest = HashMap::new();
    for (index, disclosure) in disclosures.iter().enumerate() {
        if by_digest.insert(disclosure.digest.as_str(), index).is_some() {
            return Err(malformed!("duplicate disclosure {}", disclosure.digest));
        }
    }

    let mut unpacker = Unpacker {
        disclosures: &disclosures,
        by_digest,
        used: HashSet::new(),
        sources: vec![],
    };
    let claims = unpacker.object(&jws.payload, &ClaimPath::default())?;
    if unpacker.used.len() != disclosures.len() {
        return Err(malformed!("disclosure not referenced by the SD-JWT"));
    }
    let sources = unpacker.sources;

    let envelope = SdJwtEnvelope {
        issuer_jwt: jws.compact,
        disclosures,
        sources,
    };
    Ok(CredentialClaims::new(
        CredentialFormat::DcSdJwt,
        CredentialMeta::SdJwt { vct },
        claims,
        Envelope::SdJwt(envelope),
    ))
}

// Replaces `_sd` digests and `...` array entries with the disclosed claims.
struct Unpacker<'a> {
    disclosures: &'a [Disclosure],
    by_digest: HashMap<&'a str, usize>,
    used: HashSet<usize>,
    sources: Vec<(ClaimPath, usize)>,
}

impl Unpacker<'_> {
    fn value(&mut self, value: &Value, path: &ClaimPath) -> Result<ClaimNode, Error> {
        match value {
            Value::Object(map) => self.object(map, path),
            Value::Array(elements) => self.array(elements, path),
            scalar => Ok(ClaimNode::Scalar(scalar.clone())),
        }
    }

    fn object(&mut self, map: &Map<String, Value>, path: &ClaimPath) -> Result<ClaimNode, Error> {
        let mut members = vec![];
        for (name, value) in map {
            if name == "_sd" || name == "_sd_alg" {
                continue;
            }
            let node = self.value(value, &path.child(PathStep::Key(name.clone())))?;
            members.push((name.clone(), node));
        }

        let Some(digests) = map.get("_sd") else {
            return Ok(ClaimNode::Object(members));
        };
        let Value::Array(digests) = digests else {
            return Err(malformed!("`_sd` must be an array at {path}"));
        };

        let disclosures = self.disclosures;
        for digest in digests {
            let Some(digest) = digest.as_str() else {
                return Err(malformed!("`_sd` digests must be strings at {path}"));
            };
            // undisclosed or decoy
            let Some(index) = self.claim(digest)? else {
                continue;
            };
            let disclosure = &disclosures[index];
            let Some(name) = disclosure.name() else {
                return Err(malformed!("array element disclosure referenced from `_sd`"));
            };
            if members.iter().any(|(existing, _)| existing == name) {
                return Err(malformed!("claim `{name}` disclosed more than once at {path}"));
            }

            let child = path.child(PathStep::Key(name.to_string()));
            self.sources.push((child.clone(), index));
            let node = self.value(disclosure.value(), &child)?;
            members.push((name.to_string(), node));
        }

        Ok(ClaimNode::Object(members))
    }

    fn array(&mut self, elements: &[Value], path: &ClaimPath) -> Result<ClaimNode, Error> {
        let disclosures = self.disclosures;
        let mut nodes = vec![];

        for element in elements {
            let child = path.child(PathStep::Index(nodes.len()));
            let Some(digest) = element_digest(element)? else {
                nodes.push(self.value(element, &child)?);
                continue;
            };
            let Some(index) = self.claim(digest)? else {
                continue;
            };
            let disclosure = &disclosures[index];
            if disclosure.name().is_some() {
                return Err(malformed!("object member disclosure referenced from an array"));
            }
            self.sources.push((child.clone(), index));
            nodes.push(self.value(disclosure.value(), &child)?);
        }

        Ok(ClaimNode::Array(nodes))
    }

    fn claim(&mut self, digest: &str) -> Result<Option<usize>, Error> {
        let Some(&index) = self.by_digest.get(digest) else {
            return Ok(None);
        };
        if !self.used.insert(index) {
            return Err(malformed!("disclosure {digest} referenced more than once"));
        }
        Ok(Some(index))
    }
}

// An array element of the form `{"...": "<digest>"}`.
fn element_digest(element: &Value) -> Result<Option<&str>, Error> {
    let Value::Object(map) = element else {
        return Ok(None);
    };
    if map.len() != 1 {
        return Ok(None);
    }
    match map.get("...") {
        None => Ok(None),
        Some(Value::String(digest)) => Ok(Some(digest)),
        Some(_) => Err(malformed!("array element digest must be a string")),
    }
}
