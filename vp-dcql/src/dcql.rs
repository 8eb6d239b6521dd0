//! # Digital Credentials Query Language (DCQL)
//!
//! The query a verifier sends to request claims from one or more
//! credentials. Parsing a query also validates it, so a [`DcqlQuery`]
//! obtained from [`DcqlQuery::parse`] or [`DcqlQuery::from_value`] is always
//! internally consistent: identifiers are unique, every reference resolves
//! and every `meta` filter suits the requested format.

use std::collections::HashSet;

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::claims::ClaimPath;
use crate::error::{Error, invalid};
use crate::format::CredentialFormat;
use crate::provider::Codec;

/// DCQL query for requesting Verifiable Presentations.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DcqlQuery {
    /// Identifies requested credentials.
    pub credentials: Vec<CredentialQuery>,

    /// Additional constraints on requested credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_sets: Option<Vec<CredentialSetQuery>>,
}

impl DcqlQuery {
    /// Decode and validate a query.
    ///
    /// # Errors
    ///
    /// Returns `MalformedQuery` when the text cannot be decoded or the query
    /// is not valid.
    pub fn parse(raw: &str, codec: &impl Codec) -> Result<Self, Error> {
        let value = codec.decode(raw).map_err(|e| invalid!("{e}"))?;
        Self::from_value(value)
    }

    /// Validate an already decoded query.
    ///
    /// # Errors
    ///
    /// Returns `MalformedQuery` when the value is not a valid query.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let mut query: Self = serde_json::from_value(value).map_err(|e| invalid!("{e}"))?;
        query.normalize()?;
        query.validate()?;
        Ok(query)
    }

    /// Check the query's structural rules.
    ///
    /// # Errors
    ///
    /// Returns `MalformedQuery` naming the first rule violated.
    pub fn validate(&self) -> Result<(), Error> {
        if self.credentials.is_empty() {
            return Err(invalid!("`credentials` must not be empty"));
        }

        let mut ids = HashSet::new();
        for query in &self.credentials {
            check_id(&query.id)?;
            if !ids.insert(query.id.as_str()) {
                return Err(invalid!("duplicate credential query id `{}`", query.id));
            }
            query.validate()?;
        }

        let Some(sets) = &self.credential_sets else {
            return Ok(());
        };
        if sets.is_empty() {
            return Err(invalid!("`credential_sets` must not be empty"));
        }
        for set in sets {
            if set.options.is_empty() {
                return Err(invalid!("credential set `options` must not be empty"));
            }
            for option in &set.options {
                if option.is_empty() {
                    return Err(invalid!("credential set option must not be empty"));
                }
                if let Some(id) = option.iter().find(|id| !ids.contains(id.as_str())) {
                    return Err(invalid!("credential set references unknown query `{id}`"));
                }
            }
        }

        Ok(())
    }

    // Rewrite legacy claim filters as value restrictions.
    fn normalize(&mut self) -> Result<(), Error> {
        for query in &mut self.credentials {
            for claim in query.claims.iter_mut().flatten() {
                let Some(filter) = claim.filter.take() else {
                    continue;
                };
                if filter.type_ != "value" {
                    return Err(invalid!("unsupported claim filter type `{}`", filter.type_));
                }
                if claim.values.is_some() {
                    return Err(invalid!("claim has both `filter` and `values`"));
                }
                claim.values = Some(vec![filter.value]);
            }
        }
        Ok(())
    }

    /// The credential query with the given id.
    #[must_use]
    pub fn credential(&self, id: &str) -> Option<&CredentialQuery> {
        self.credentials.iter().find(|query| query.id == id)
    }

    /// The combination of credential queries that satisfies the query. With
    /// no `credential_sets`, every credential query is required.
    #[must_use]
    pub fn set_expr(&self) -> SetExpr {
        let Some(sets) = &self.credential_sets else {
            return SetExpr::All(
                self.credentials.iter().map(|query| SetExpr::Leaf(query.id.clone())).collect(),
            );
        };

        SetExpr::All(
            sets.iter()
                .map(|set| SetExpr::Any {
                    alternatives: set
                        .options
                        .iter()
                        .map(|option| {
                            SetExpr::All(option.iter().cloned().map(SetExpr::Leaf).collect())
                        })
                        .collect(),
                    required: set.is_required(),
                })
                .collect(),
        )
    }
}

/// A request for the presentation of a single credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialQuery {
    /// Identifies the credential in the response and, if provided, the
    /// constraints in `credential_sets`.
    pub id: String,

    /// The format of the requested credential.
    pub format: CredentialFormat,

    /// Indicates whether multiple credentials can be returned for this
    /// query. Defaults to false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiple: Option<bool>,

    /// Additional properties requested that apply to the metadata of the
    /// credential. Properties are specific to Credential Format Profile.
    #[serde(default, deserialize_with = "deserialize_meta")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetadataQuery>,

    /// Indicates whether the Verifier requires a Cryptographic Holder Binding
    /// proof. The default value is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_cryptographic_holder_binding: Option<bool>,

    /// An array of objects that specifies claims in the requested credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<Vec<ClaimQuery>>,

    /// Combinations of claims to use when requesting credentials. Each set
    /// consists of one or more `claims` identifiers (i.e. `ClaimQuery.id`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_sets: Option<Vec<Vec<String>>>,
}

impl CredentialQuery {
    /// Whether every matching credential should be presented.
    #[must_use]
    pub fn is_multiple(&self) -> bool {
        self.multiple.unwrap_or_default()
    }

    /// The query's claims. Empty only for a query that has not been
    /// validated.
    #[must_use]
    pub fn claims(&self) -> &[ClaimQuery] {
        self.claims.as_deref().unwrap_or_default()
    }

    fn validate(&self) -> Result<(), Error> {
        let id = &self.id;

        if let Some(meta) = &self.meta {
            meta.validate(self.format).map_err(|e| invalid!("query `{id}`: {e}"))?;
        }

        let claims = self.claims();
        if claims.is_empty() {
            return Err(invalid!("query `{id}` must request at least one claim"));
        }

        let mut claim_ids = HashSet::new();
        for claim in claims {
            claim.validate().map_err(|e| invalid!("query `{id}`: {e}"))?;
            if let Some(claim_id) = &claim.id {
                check_id(claim_id)?;
                if !claim_ids.insert(claim_id.as_str()) {
                    return Err(invalid!("query `{id}` has duplicate claim id `{claim_id}`"));
                }
            }
        }

        let Some(claim_sets) = &self.claim_sets else {
            return Ok(());
        };
        if claims.iter().any(|claim| claim.id.is_none()) {
            return Err(invalid!("query `{id}` uses `claim_sets` so every claim needs an id"));
        }
        if claim_sets.is_empty() || claim_sets.iter().any(Vec::is_empty) {
            return Err(invalid!("query `{id}` has an empty claim set"));
        }
        for claim_set in claim_sets {
            if let Some(unknown) = claim_set.iter().find(|c| !claim_ids.contains(c.as_str())) {
                return Err(invalid!("query `{id}` claim set references unknown claim `{unknown}`"));
            }
        }

        Ok(())
    }
}

/// Contains a request for one or more credentials that satisfy a particular
/// use case for the Verifier.
///
/// A Credential Set Query is used when multiple Credential Queries need to be
/// combined to satisfy the Verifier's requirements.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CredentialSetQuery {
    /// A list of Credential Query sets, one of which must identify a set of
    /// Credentials that satisfies the query.
    ///
    /// Each value in the array contains a set of Credential Query identifiers
    /// (`CredentialQuery.id`) pointing to a Credential Query objects in the
    /// `credentials` array.
    pub options: Vec<Vec<String>>,

    /// Specifies whether this Credential Set Query entry is required.
    /// Defaults to true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

impl CredentialSetQuery {
    /// Whether the set must be satisfied.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(true)
    }
}

/// Claims entry.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ClaimQuery {
    /// Identifies the claim within the claims array.
    ///
    /// Required when `claim_sets` is present in the Credential Query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// A claims path pointer specifying the path to a claim within the
    /// credential.
    pub path: ClaimPath,

    /// The expected values of the claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,

    /// Whether the claim may be absent without failing the query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,

    /// Equivalent to `IntentToRetain` variable defined in ISO.18013-5.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_to_retain: Option<bool>,

    /// Legacy single-value filter, rewritten to `values` when parsed.
    #[serde(skip_serializing)]
    pub filter: Option<ClaimFilter>,
}

impl ClaimQuery {
    /// Whether the claim may be absent.
    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or_default()
    }

    fn validate(&self) -> Result<(), String> {
        if self.path.is_empty() {
            return Err("claim path must not be empty".to_string());
        }
        let Some(values) = &self.values else {
            return Ok(());
        };
        if values.is_empty() {
            return Err(format!("claim {} has empty `values`", self.path));
        }
        if !values.iter().all(|v| v.is_string() || v.is_number() || v.is_boolean()) {
            return Err(format!("claim {} `values` must be strings, numbers or booleans", self.path));
        }
        Ok(())
    }
}

/// A legacy claim filter: `{"type": "value", "value": <expected>}`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ClaimFilter {
    /// The filter type. Only `value` is supported.
    #[serde(rename = "type")]
    pub type_: String,

    /// The expected value.
    pub value: Value,
}

/// Credential metadata query parameters. Properties are specific to Credential
/// Format Profile.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MetadataQuery {
    /// ISO-MDL format credential metadata.
    MsoMdoc {
        /// Allowed value for the `doctype` of the requested credential.
        doctype_value: String,
    },

    /// SD-JWT format credential metadata.
    SdJwt {
        /// Allowed `vct` values when querying for SD-JWT Credentials.
        vct_values: Vec<String>,
    },

    /// W3C VC format credential metadata.
    W3cVc {
        /// Each top-level array specifies one alternative to match the type
        /// values of the Verifiable Credential against. Each inner array
        /// specifies a set of types that MUST be present in the type property
        /// of the Verifiable Credential, regardless of order or the presence
        /// of additional types.
        ///
        /// For example, the following query
        ///
        /// ```json
        /// "type_values":[
        ///   ["VerifiableCredential", "AlumniCredential"],
        ///   ["VerifiableCredential", "UniversityDegreeCredential"]
        /// ]
        /// ```
        ///
        /// would match a credential with the following type property:
        /// ```json
        /// "type": ["VerifiableCredential", "UniversityDegreeCredential"]
        /// ```
        type_values: Vec<Vec<String>>,
    },
}

impl MetadataQuery {
    fn validate(&self, format: CredentialFormat) -> Result<(), String> {
        match self {
            Self::MsoMdoc { .. } if format == CredentialFormat::MsoMdoc => Ok(()),
            Self::SdJwt { vct_values } if format == CredentialFormat::DcSdJwt => {
                if vct_values.is_empty() {
                    return Err("`vct_values` must not be empty".to_string());
                }
                Ok(())
            }
            Self::W3cVc { type_values } if format.is_w3c() => {
                if type_values.is_empty() || type_values.iter().any(Vec::is_empty) {
                    return Err("`type_values` must not be empty".to_string());
                }
                Ok(())
            }
            _ => Err(format!("`meta` does not apply to format `{format}`")),
        }
    }
}

// An empty `meta` object places no constraint on the credential.
fn deserialize_meta<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<MetadataQuery>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) if map.is_empty() => Ok(None),
        Some(value) => serde_json::from_value(value).map(Some).map_err(serde::de::Error::custom),
    }
}

/// The credential combinations that satisfy a query, compiled from
/// `credential_sets`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SetExpr {
    /// A single credential query.
    Leaf(String),

    /// Satisfied when every child is satisfied.
    All(Vec<SetExpr>),

    /// Satisfied when one alternative is satisfied. An optional group with
    /// no satisfied alternative is satisfied but contributes nothing.
    Any {
        /// The alternatives, in declared order.
        alternatives: Vec<SetExpr>,

        /// Whether the group must be satisfied.
        required: bool,
    },
}

impl SetExpr {
    /// The credential query ids referenced, in first-seen order.
    #[must_use]
    pub fn query_ids(&self) -> Vec<&str> {
        let mut ids = vec![];
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids<'a>(&'a self, ids: &mut Vec<&'a str>) {
        match self {
            Self::Leaf(id) => {
                if !ids.contains(&id.as_str()) {
                    ids.push(id);
                }
            }
            Self::All(children) | Self::Any { alternatives: children, .. } => {
                for child in children {
                    child.collect_ids(ids);
                }
            }
        }
    }
}

fn check_id(id: &str) -> Result<(), Error> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(invalid!("invalid id `{id}`"));
    }
    Ok(())
}
