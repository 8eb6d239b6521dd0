//! # Disclosure Selector
//!
//! Reduces a matched credential to the minimal structure holding the claims
//! being disclosed. Claims off every disclosed path are omitted, never
//! nulled, and only the SD-JWT disclosures those claims need are kept.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::claims::{ClaimNode, ClaimPath, PathStep};
use crate::error::Error;
use crate::format::{CredentialClaims, CredentialFormat, Envelope};

/// The part of a credential to be presented.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DisclosurePayload {
    /// The credential's format.
    pub format: CredentialFormat,

    /// The disclosed claims and their ancestors.
    pub claims: Value,

    /// The credential as presented: the disclosed claims for W3C formats or
    /// the SD-JWT compact serialization with only the needed disclosures.
    pub credential: Value,
}

/// Select the minimal part of `credential` disclosing `paths`.
///
/// A disclosed object or array is disclosed whole. Arrays on the way to a
/// disclosed claim keep only the elements leading to one, in their original
/// order.
///
/// # Errors
///
/// Returns `MissingClaim` when a path is not a concrete path present in the
/// credential.
pub fn select(credential: &CredentialClaims, paths: &[ClaimPath]) -> Result<DisclosurePayload, Error> {
    if let Some(absent) = paths.iter().find(|path| credential.claims().get(path).is_none()) {
        return Err(Error::MissingClaim(absent.clone()));
    }

    let claims = prune(credential.claims(), &ClaimPath::default(), paths)
        .map_or_else(|| Value::Object(Map::new()), |node| node.to_value());

    let presented = match credential.envelope() {
        Envelope::Document => claims.clone(),
        Envelope::SdJwt(envelope) => Value::String(envelope.present(paths)),
    };

    Ok(DisclosurePayload {
        format: credential.format(),
        claims,
        credential: presented,
    })
}

fn prune(node: &ClaimNode, at: &ClaimPath, paths: &[ClaimPath]) -> Option<ClaimNode> {
    if paths.iter().any(|path| at.starts_with(path)) {
        return Some(node.clone());
    }
    if !paths.iter().any(|path| path.starts_with(at)) {
        return None;
    }

    match node {
        ClaimNode::Object(members) => Some(ClaimNode::Object(
            members
                .iter()
                .filter_map(|(name, child)| {
                    let child_path = at.child(PathStep::Key(name.clone()));
                    prune(child, &child_path, paths).map(|pruned| (name.clone(), pruned))
                })
                .collect(),
        )),
        ClaimNode::Array(elements) => Some(ClaimNode::Array(
            elements
                .iter()
                .enumerate()
                .filter_map(|(index, child)| prune(child, &at.child(PathStep::Index(index)), paths))
                .collect(),
        )),
        // a path runs through a scalar: nothing below it exists
        ClaimNode::Scalar(_) => None,
    }
}
