//! # Matcher
//!
//! Evaluates a single credential query against a single credential,
//! producing either the claim paths to disclose or the first reason the
//! credential does not satisfy the query.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::claims::ClaimPath;
use crate::dcql::{ClaimQuery, CredentialQuery, MetadataQuery};
use crate::format::w3c_vc::STRUCTURAL_MEMBERS;
use crate::format::{CredentialClaims, CredentialMeta};

/// The outcome of evaluating a credential query against a credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchResult {
    /// The credential satisfies the query.
    Matched {
        /// Concrete paths of the claims to disclose, in the order their
        /// claim queries are declared.
        disclosed_paths: Vec<ClaimPath>,
    },

    /// The credential does not satisfy the query.
    Unmatched(MatchFailure),
}

impl MatchResult {
    /// Whether the credential satisfies the query.
    #[must_use]
    pub const fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}

/// Why a credential does not satisfy a credential query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchFailure {
    /// The credential's format or type does not satisfy the query's filter.
    FormatMismatch,

    /// A required claim is absent.
    MissingClaim(ClaimPath),

    /// A claim is present but none of its values is acceptable.
    ValueMismatch(ClaimPath),

    /// There were no credentials to evaluate.
    NoCandidate,
}

impl Display for MatchFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::FormatMismatch => write!(f, "format or type mismatch"),
            Self::MissingClaim(path) => write!(f, "missing claim {path}"),
            Self::ValueMismatch(path) => write!(f, "value mismatch at {path}"),
            Self::NoCandidate => write!(f, "no candidate credentials"),
        }
    }
}

impl CredentialQuery {
    /// Evaluate the query against a credential.
    ///
    /// The format and `meta` filters are checked before any claim path is
    /// resolved. Claim queries are then evaluated in declared order and
    /// evaluation stops at the first failure. With `claim_sets`, the first
    /// set whose claims all match is used; when none matches, the first
    /// set's failure is reported.
    #[must_use]
    pub fn evaluate(&self, credential: &CredentialClaims) -> MatchResult {
        if !self.accepts_format(credential) {
            return MatchResult::Unmatched(MatchFailure::FormatMismatch);
        }

        let claims = self.claims();
        let Some(claim_sets) = &self.claim_sets else {
            return match_claims(claims.iter(), credential)
                .map(|paths| with_structure(credential, paths))
                .into();
        };

        let mut first_failure = None;
        for claim_set in claim_sets {
            let set_claims = claim_set
                .iter()
                .filter_map(|id| claims.iter().find(|claim| claim.id.as_ref() == Some(id)));
            match match_claims(set_claims, credential) {
                Ok(paths) => {
                    return MatchResult::Matched {
                        disclosed_paths: with_structure(credential, paths),
                    };
                }
                Err(failure) => {
                    first_failure.get_or_insert(failure);
                }
            }
        }

        MatchResult::Unmatched(first_failure.unwrap_or(MatchFailure::NoCandidate))
    }

    /// Whether the credential passes the query's format and `meta` filters.
    #[must_use]
    pub fn accepts_format(&self, credential: &CredentialClaims) -> bool {
        self.format == credential.format()
            && self.meta.as_ref().is_none_or(|meta| meta.matches(credential.meta()))
    }
}

impl From<Result<Vec<ClaimPath>, MatchFailure>> for MatchResult {
    fn from(result: Result<Vec<ClaimPath>, MatchFailure>) -> Self {
        match result {
            Ok(disclosed_paths) => Self::Matched { disclosed_paths },
            Err(failure) => Self::Unmatched(failure),
        }
    }
}

fn match_claims<'a>(
    claims: impl Iterator<Item = &'a ClaimQuery>, credential: &CredentialClaims,
) -> Result<Vec<ClaimPath>, MatchFailure> {
    let mut disclosed = vec![];

    for claim in claims {
        let selected = credential.claims().select(&claim.path);
        if selected.is_empty() {
            if claim.is_optional() {
                continue;
            }
            return Err(MatchFailure::MissingClaim(claim.path.clone()));
        }

        // with a value restriction, only acceptable elements are disclosed
        let paths = match &claim.values {
            None => selected.into_iter().map(|(path, _)| path).collect::<Vec<_>>(),
            Some(values) => {
                let accepted = selected
                    .into_iter()
                    .filter(|(_, node)| {
                        node.as_scalar().is_some_and(|v| values.iter().any(|e| same_value(e, v)))
                    })
                    .map(|(path, _)| path)
                    .collect::<Vec<_>>();
                if accepted.is_empty() {
                    return Err(MatchFailure::ValueMismatch(claim.path.clone()));
                }
                accepted
            }
        };

        for path in paths {
            if !disclosed.contains(&path) {
                disclosed.push(path);
            }
        }
    }

    Ok(disclosed)
}

// A presented W3C credential keeps `@context` and `type` so it still reads as
// a credential of the requested type.
fn with_structure(credential: &CredentialClaims, paths: Vec<ClaimPath>) -> Vec<ClaimPath> {
    if !credential.format().is_w3c() {
        return paths;
    }
    let mut disclosed = STRUCTURAL_MEMBERS
        .iter()
        .map(|name| ClaimPath::from([*name]))
        .filter(|path| credential.claims().get(path).is_some() && !paths.contains(path))
        .collect::<Vec<_>>();
    disclosed.extend(paths);
    disclosed
}

// Numbers compare by value so `1` accepts a claim issued as `1.0`.
fn same_value(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(e), Value::Number(a)) => {
            if let (Some(e), Some(a)) = (e.as_i64(), a.as_i64()) {
                return e == a;
            }
            if let (Some(e), Some(a)) = (e.as_u64(), a.as_u64()) {
                return e == a;
            }
            e.as_f64().is_some() && e.as_f64() == a.as_f64()
        }
        _ => expected == actual,
    }
}

impl MetadataQuery {
    /// Whether the credential's metadata satisfies the query.
    #[must_use]
    pub fn matches(&self, meta: &CredentialMeta) -> bool {
        match (self, meta) {
            (Self::SdJwt { vct_values }, CredentialMeta::SdJwt { vct }) => vct_values.contains(vct),
            // every type in one of the `type_values` sets must be present
            (Self::W3cVc { type_values }, CredentialMeta::W3c { types }) => {
                type_values.iter().any(|set| set.iter().all(|t| types.contains(t)))
            }
            // `mso_mdoc` credentials are never decoded
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::claims::PathStep;
    use crate::dcql::DcqlQuery;

    fn degree_credential() -> CredentialClaims {
        CredentialClaims::from_value(&json!({
            "@context": ["https://www.w3.org/ns/credentials/v2"],
            "type": ["VerifiableCredential", "ExampleDegree"],
            "issuer": "did:example:university",
            "credentialSubject": {
                "degree": {"type": "Bachelor", "name": "Bachelor of Science"},
                "address": {"city": "X"},
                "languages": [
                    {"name": "en", "level": "native"},
                    {"name": "ja", "level": "fluent"}
                ]
            },
            "proof": {"type": "DataIntegrityProof", "proofValue": "zabc"}
        }))
        .expect("should parse")
    }

    fn query(claims: Value) -> CredentialQuery {
        query_with(json!({
            "id": "degree",
            "format": "ldp_vc",
            "meta": {"type_values": [["VerifiableCredential", "ExampleDegree"]]},
            "claims": claims
        }))
    }

    fn query_with(credential_query: Value) -> CredentialQuery {
        let query = DcqlQuery::from_value(json!({"credentials": [credential_query]}))
            .expect("should parse");
        query.credentials[0].clone()
    }

    fn path(steps: &[&str]) -> ClaimPath {
        steps.iter().map(|s| PathStep::Key((*s).to_string())).collect()
    }

    // `@context` and `type` lead every W3C disclosure
    fn disclosed(claims: &[&[&str]]) -> Vec<ClaimPath> {
        let mut paths = vec![path(&["@context"]), path(&["type"])];
        paths.extend(claims.iter().map(|steps| path(steps)));
        paths
    }

    #[test]
    fn discloses_constrained_paths_only() {
        let query = query(json!([{"path": ["credentialSubject", "degree", "type"]}]));

        let result = query.evaluate(&degree_credential());
        assert_eq!(
            result,
            MatchResult::Matched {
                disclosed_paths: disclosed(&[&["credentialSubject", "degree", "type"]])
            }
        );
    }

    #[test]
    fn missing_claim_fails_fast() {
        let query = query(json!([
            {"path": ["credentialSubject", "degree", "level"]},
            {"path": ["credentialSubject", "degree", "type"], "values": ["Master"]}
        ]));

        let result = query.evaluate(&degree_credential());
        assert_eq!(
            result,
            MatchResult::Unmatched(MatchFailure::MissingClaim(path(&[
                "credentialSubject",
                "degree",
                "level"
            ])))
        );
    }

    #[test]
    fn optional_claims() {
        let query = query(json!([
            {"path": ["credentialSubject", "degree", "level"], "optional": true},
            {"path": ["credentialSubject", "address", "city"], "optional": true}
        ]));

        let result = query.evaluate(&degree_credential());
        assert_eq!(
            result,
            MatchResult::Matched {
                disclosed_paths: disclosed(&[&["credentialSubject", "address", "city"]])
            }
        );
    }

    #[test]
    fn value_restrictions() {
        let accepted = query(json!([
            {"path": ["credentialSubject", "degree", "type"], "values": ["Master", "Bachelor"]}
        ]));
        assert!(accepted.evaluate(&degree_credential()).is_matched());

        // order only changes which failure is reported
        let rejected = query(json!([
            {"path": ["credentialSubject", "address", "city"]},
            {"path": ["credentialSubject", "degree", "type"], "values": ["Master"]}
        ]));
        assert_eq!(
            rejected.evaluate(&degree_credential()),
            MatchResult::Unmatched(MatchFailure::ValueMismatch(path(&[
                "credentialSubject",
                "degree",
                "type"
            ])))
        );

        // a container never equals a literal
        let container = query(json!([
            {"path": ["credentialSubject", "degree"], "values": ["Bachelor"]}
        ]));
        assert!(matches!(
            container.evaluate(&degree_credential()),
            MatchResult::Unmatched(MatchFailure::ValueMismatch(_))
        ));
    }

    #[test]
    fn number_and_bool_restrictions() {
        let credential = CredentialClaims::from_value(&json!({
            "type": ["VerifiableCredential", "ExampleDegree"],
            "credentialSubject": {"gpa": 3.0, "credits": 180, "honours": true}
        }))
        .expect("should parse");
        let restrict = |claim: &str, values: Value| {
            query_with(json!({
                "id": "degree",
                "format": "ldp_vc",
                "claims": [{"path": ["credentialSubject", claim], "values": values}]
            }))
            .evaluate(&credential)
        };

        assert!(restrict("gpa", json!([3])).is_matched());
        assert!(restrict("gpa", json!([3.5, 3.0])).is_matched());
        assert!(restrict("credits", json!([180.0])).is_matched());
        assert!(restrict("honours", json!([true])).is_matched());

        assert!(!restrict("credits", json!([181])).is_matched());
        assert!(!restrict("credits", json!(["180"])).is_matched());
        assert!(!restrict("honours", json!([false])).is_matched());
        assert!(!restrict("honours", json!([1])).is_matched());
    }

    #[test]
    fn wildcard_discloses_accepted_elements() {
        let query = query(json!([
            {"path": ["credentialSubject", "languages", null, "name"], "values": ["ja"]}
        ]));

        let MatchResult::Matched { disclosed_paths } = query.evaluate(&degree_credential()) else {
            panic!("should match");
        };
        let rendered = disclosed_paths.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(rendered, ["@context", "type", "credentialSubject.languages[1].name"]);
    }

    #[test]
    fn duplicate_paths_disclosed_once() {
        let query = query(json!([
            {"path": ["credentialSubject", "degree", "type"]},
            {"path": ["credentialSubject", "degree", "type"], "values": ["Bachelor"]}
        ]));

        let MatchResult::Matched { disclosed_paths } = query.evaluate(&degree_credential()) else {
            panic!("should match");
        };
        assert_eq!(disclosed_paths, disclosed(&[&["credentialSubject", "degree", "type"]]));
    }

    #[test]
    fn type_filter() {
        let query = query_with(json!({
            "id": "employee",
            "format": "ldp_vc",
            "meta": {"type_values": [["EmployeeIDCredential"], ["ExampleDegree", "Other"]]},
            "claims": [{"path": ["credentialSubject", "degree", "type"]}]
        }));
        assert_eq!(
            query.evaluate(&degree_credential()),
            MatchResult::Unmatched(MatchFailure::FormatMismatch)
        );
    }

    #[test]
    fn format_checked_before_claims() {
        let query = query_with(json!({
            "id": "pid",
            "format": "dc+sd-jwt",
            "claims": [{"path": ["given_name"]}]
        }));
        assert_eq!(
            query.evaluate(&degree_credential()),
            MatchResult::Unmatched(MatchFailure::FormatMismatch)
        );
    }

    // mdoc queries are accepted but no credential decodes as an mdoc
    #[test]
    fn mdoc_never_matches() {
        let query = query_with(json!({
            "id": "mdl",
            "format": "mso_mdoc",
            "meta": {"doctype_value": "org.iso.18013.5.1.mDL"},
            "claims": [{"path": ["org.iso.18013.5.1", "family_name"]}]
        }));
        assert!(matches!(query.meta, Some(MetadataQuery::MsoMdoc { .. })));
        assert_eq!(
            query.evaluate(&degree_credential()),
            MatchResult::Unmatched(MatchFailure::FormatMismatch)
        );
    }

    #[test]
    fn claim_sets_choose_first_satisfied() {
        let query = query_with(json!({
            "id": "degree",
            "format": "ldp_vc",
            "claims": [
                {"id": "level", "path": ["credentialSubject", "degree", "level"]},
                {"id": "kind", "path": ["credentialSubject", "degree", "type"]},
                {"id": "city", "path": ["credentialSubject", "address", "city"]}
            ],
            "claim_sets": [["level", "city"], ["kind"]]
        }));
        assert_eq!(
            query.evaluate(&degree_credential()),
            MatchResult::Matched {
                disclosed_paths: disclosed(&[&["credentialSubject", "degree", "type"]])
            }
        );

        let query = query_with(json!({
            "id": "degree",
            "format": "ldp_vc",
            "claims": [
                {"id": "level", "path": ["credentialSubject", "degree", "level"]},
                {"id": "grade", "path": ["credentialSubject", "degree", "grade"]}
            ],
            "claim_sets": [["level"], ["grade"]]
        }));
        assert_eq!(
            query.evaluate(&degree_credential()),
            MatchResult::Unmatched(MatchFailure::MissingClaim(path(&[
                "credentialSubject",
                "degree",
                "level"
            ])))
        );
    }
}
