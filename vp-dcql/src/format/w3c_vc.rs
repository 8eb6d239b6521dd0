//! # W3C Verifiable Credentials
//!
//! Decoding of `ldp_vc` and `jwt_vc_json` credentials. For both formats the
//! claim tree is the credential document itself, so DCQL paths start at the
//! document root (e.g. `["credentialSubject", "degree", "type"]`).

use serde_json::{Map, Value};

use crate::claims::ClaimNode;
use crate::error::{Error, malformed};
use crate::format::{CredentialClaims, CredentialFormat, CredentialMeta, Envelope, Jws};

/// Members disclosed with every presented credential, when issued.
pub const STRUCTURAL_MEMBERS: [&str; 2] = ["@context", "type"];

/// Decode a credential secured with an embedded proof.
pub(super) fn from_ldp(document: &Map<String, Value>) -> Result<CredentialClaims, Error> {
    let meta = CredentialMeta::W3c { types: types(document)? };
    Ok(CredentialClaims::new(
        CredentialFormat::LdpVc,
        meta,
        unpack_claims(document),
        Envelope::Document,
    ))
}

/// Decode a credential secured as a JWT with a `vc` claim.
pub(super) fn from_jwt(jws: &Jws) -> Result<CredentialClaims, Error> {
    let Some(Value::Object(vc)) = jws.payload.get("vc") else {
        return Err(malformed!("JWT payload has no `vc` object"));
    };
    let meta = CredentialMeta::W3c { types: types(vc)? };
    Ok(CredentialClaims::new(
        CredentialFormat::JwtVcJson,
        meta,
        unpack_claims(vc),
        Envelope::Document,
    ))
}

// The embedded proof is not a claim.
fn unpack_claims(document: &Map<String, Value>) -> ClaimNode {
    let claims = document
        .iter()
        .filter(|(name, _)| name.as_str() != "proof")
        .map(|(name, value)| (name.clone(), ClaimNode::from(value)))
        .collect();
    ClaimNode::Object(claims)
}

fn types(document: &Map<String, Value>) -> Result<Vec<String>, Error> {
    let types = match document.get("type") {
        Some(Value::String(single)) => vec![single.clone()],
        Some(Value::Array(many)) => many
            .iter()
            .map(|t| t.as_str().map(ToString::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| malformed!("credential `type` values must be strings"))?,
        _ => return Err(malformed!("credential has no `type`")),
    };
    if types.is_empty() {
        return Err(malformed!("credential `type` is empty"));
    }
    Ok(types)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::claims::ClaimPath;
    use crate::format::CredentialClaims;

    #[test]
    fn ldp_vc_claims_exclude_proof() {
        let value = json!({
            "@context": ["https://www.w3.org/ns/credentials/v2"],
            "type": ["VerifiableCredential", "EikenCertificate"],
            "issuer": {"id": "https://eiken.or.jp", "name": "Eiken"},
            "credentialSubject": {"grade": "Grade 1"},
            "proof": {"type": "DataIntegrityProof", "proofValue": "z123"}
        });
        let credential = CredentialClaims::from_value(&value).expect("should parse");

        assert_eq!(credential.format(), CredentialFormat::LdpVc);
        assert!(credential.claims().get(&ClaimPath::from(["proof"])).is_none());
        assert!(credential.claims().get(&ClaimPath::from(["credentialSubject", "grade"])).is_some());
    }

    #[test]
    fn single_type_string() {
        let value = json!({"type": "VerifiableCredential", "credentialSubject": {}});
        let credential = CredentialClaims::from_value(&value).expect("should parse");
        assert_eq!(
            credential.meta(),
            &CredentialMeta::W3c { types: vec!["VerifiableCredential".to_string()] }
        );
    }

    #[test]
    fn missing_type_is_malformed() {
        let err = CredentialClaims::from_value(&json!({"credentialSubject": {}}))
            .expect_err("should fail");
        assert_eq!(err, Error::MalformedCredential("credential has no `type`".to_string()));

        let err = CredentialClaims::from_value(&json!({"type": [1, 2]})).expect_err("should fail");
        assert!(matches!(err, Error::MalformedCredential(_)));
    }
}
