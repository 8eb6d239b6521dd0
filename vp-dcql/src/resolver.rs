//! # Credential Set Resolver
//!
//! Binds candidate credentials to credential queries and evaluates the
//! query's credential set combination over those bindings.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::claims::ClaimPath;
use crate::dcql::{CredentialQuery, DcqlQuery, SetExpr};
use crate::engine::{Options, TieBreak};
use crate::error::{Error, invalid};
use crate::format::CredentialClaims;
use crate::matcher::{MatchFailure, MatchResult};

/// The credentials selected to satisfy a query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Selected credentials, in the order their credential queries are
    /// referenced by the query.
    pub selections: Vec<Selection>,
}

impl Resolution {
    /// Whether no credential was selected. Only possible when every
    /// credential set is optional.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }
}

/// A candidate credential bound to a credential query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    /// The credential query satisfied.
    pub query_id: String,

    /// Index of the credential in the candidate list.
    pub candidate: usize,

    /// Concrete paths of the claims to disclose.
    pub disclosed_paths: Vec<ClaimPath>,
}

/// A required part of the query that could not be satisfied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchFailure {
    /// The credential queries referenced by the failed branch.
    pub query_ids: Vec<String>,

    /// The first reason the branch failed.
    pub reason: MatchFailure,
}

impl Display for BranchFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]: {}", self.query_ids.join(", "), self.reason)
    }
}

type Binding = Result<Vec<Selection>, MatchFailure>;

enum Outcome {
    Satisfied(Vec<Selection>),
    Failed(Vec<BranchFailure>),
}

/// Select the candidate credentials that satisfy the query.
///
/// Every credential query referenced by the query's credential sets is
/// evaluated against the candidates in order, then the sets are evaluated
/// over those bindings. Resolution is deterministic: the same inputs always
/// produce the same selections.
///
/// # Errors
///
/// Returns `UnsatisfiedBranch` listing each required branch that could not
/// be satisfied, with the first reason it failed.
#[instrument(level = "debug", skip_all, fields(candidates = candidates.len()))]
pub fn resolve(
    query: &DcqlQuery, candidates: &[CredentialClaims], options: &Options,
) -> Result<Resolution, Error> {
    let expr = query.set_expr();

    let mut bindings = HashMap::new();
    for id in expr.query_ids() {
        let Some(credential_query) = query.credential(id) else {
            return Err(invalid!("credential set references unknown query `{id}`"));
        };
        bindings.insert(id, bind(credential_query, candidates, options.tie_break));
    }

    match evaluate(&expr, &bindings, options.tie_break) {
        Outcome::Satisfied(selections) => {
            let mut resolution = Resolution::default();
            for selection in selections {
                let seen = resolution.selections.iter().any(|s| {
                    s.query_id == selection.query_id && s.candidate == selection.candidate
                });
                if !seen {
                    resolution.selections.push(selection);
                }
            }
            tracing::debug!(selected = resolution.selections.len(), "query resolved");
            Ok(resolution)
        }
        Outcome::Failed(failures) => {
            tracing::debug!(failed = failures.len(), "query unsatisfied");
            Err(Error::UnsatisfiedBranch(failures))
        }
    }
}

// Bind candidates to a single credential query. When nothing matches, the
// reason reported is that of the first candidate to pass the format filter.
fn bind(query: &CredentialQuery, candidates: &[CredentialClaims], tie_break: TieBreak) -> Binding {
    let mut matched = vec![];
    let mut first_failure = None;

    for (index, candidate) in candidates.iter().enumerate() {
        match query.evaluate(candidate) {
            MatchResult::Matched { disclosed_paths } => {
                tracing::trace!(query = %query.id, candidate = index, "candidate matched");
                matched.push(Selection {
                    query_id: query.id.clone(),
                    candidate: index,
                    disclosed_paths,
                });
                if !query.is_multiple() && tie_break == TieBreak::FirstMatch {
                    break;
                }
            }
            MatchResult::Unmatched(failure) => {
                tracing::trace!(query = %query.id, candidate = index, %failure, "candidate rejected");
                if failure != MatchFailure::FormatMismatch {
                    first_failure.get_or_insert(failure);
                }
            }
        }
    }

    if matched.is_empty() {
        return Err(first_failure.unwrap_or(if candidates.is_empty() {
            MatchFailure::NoCandidate
        } else {
            MatchFailure::FormatMismatch
        }));
    }
    if query.is_multiple() {
        return Ok(matched);
    }

    // fewest disclosed claims wins, ties going to the earlier candidate
    let best = matched.into_iter().min_by_key(|selection| selection.disclosed_paths.len());
    Ok(best.into_iter().collect())
}

fn evaluate(expr: &SetExpr, bindings: &HashMap<&str, Binding>, tie_break: TieBreak) -> Outcome {
    match expr {
        SetExpr::Leaf(id) => match bindings.get(id.as_str()) {
            Some(Ok(selections)) => Outcome::Satisfied(selections.clone()),
            Some(Err(reason)) => Outcome::Failed(vec![BranchFailure {
                query_ids: vec![id.clone()],
                reason: reason.clone(),
            }]),
            None => Outcome::Failed(vec![BranchFailure {
                query_ids: vec![id.clone()],
                reason: MatchFailure::NoCandidate,
            }]),
        },
        SetExpr::All(children) => {
            let mut selections = vec![];
            let mut failures = vec![];
            for child in children {
                match evaluate(child, bindings, tie_break) {
                    Outcome::Satisfied(satisfied) => selections.extend(satisfied),
                    Outcome::Failed(failed) => failures.extend(failed),
                }
            }
            if failures.is_empty() { Outcome::Satisfied(selections) } else { Outcome::Failed(failures) }
        }
        SetExpr::Any { alternatives, required } => {
            let mut satisfied = vec![];
            let mut first_failure = None;

            for alternative in alternatives {
                match evaluate(alternative, bindings, tie_break) {
                    Outcome::Satisfied(selections) => {
                        if tie_break == TieBreak::FirstMatch {
                            return Outcome::Satisfied(selections);
                        }
                        satisfied.push(selections);
                    }
                    Outcome::Failed(failed) => {
                        if first_failure.is_none() {
                            first_failure = failed.into_iter().next().map(|f| f.reason);
                        }
                    }
                }
            }

            let best = satisfied.into_iter().min_by_key(|selections| {
                selections.iter().map(|s| s.disclosed_paths.len()).sum::<usize>()
            });
            if let Some(selections) = best {
                return Outcome::Satisfied(selections);
            }
            if !required {
                tracing::debug!("optional credential set unsatisfied");
                return Outcome::Satisfied(vec![]);
            }

            Outcome::Failed(vec![BranchFailure {
                query_ids: expr.query_ids().into_iter().map(ToString::to_string).collect(),
                reason: first_failure.unwrap_or(MatchFailure::NoCandidate),
            }])
        }
    }
}
