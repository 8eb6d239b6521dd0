//! # Errors
//!
//! This module defines the closed set of errors returned when building a
//! Verifiable Presentation from a DCQL query.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::claims::ClaimPath;
use crate::resolver::BranchFailure;

/// Errors returned by the presentation engine.
#[derive(Error, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "error", content = "error_description")]
pub enum Error {
    /// The DCQL query is not valid JSON or violates a structural rule such as
    /// duplicate identifiers, empty claim lists, an unknown format or a
    /// dangling credential set reference.
    #[error("malformed query: {0}")]
    MalformedQuery(String),

    /// The credential is not a well-formed claim structure in one of the
    /// supported formats.
    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    /// The credential's format or type does not satisfy a query's filter.
    #[error("format mismatch: {0}")]
    FormatMismatch(String),

    /// A required claim is absent from the credential.
    #[error("missing claim: {0}")]
    MissingClaim(ClaimPath),

    /// A claim's value is not one of the values the query accepts.
    #[error("claim value mismatch: {0}")]
    ValueMismatch(ClaimPath),

    /// The query's credential combination could not be satisfied. Holds one
    /// entry per required branch that failed, with its first reason.
    #[error("unsatisfied query: {}", describe(.0))]
    UnsatisfiedBranch(Vec<BranchFailure>),

    /// The signer rejected or could not complete proof generation.
    #[error("signing failed: {0}")]
    SigningFailed(String),
}

fn describe(failures: &[BranchFailure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        let Some(inner) = err.downcast_ref::<Self>() else {
            // anything not already classified comes from decoding a credential
            let stack = err.chain().map(ToString::to_string).collect::<Vec<_>>().join(" -> ");
            return Self::MalformedCredential(stack);
        };

        // no added context
        if err.chain().count() == 1 {
            return inner.clone();
        }

        match inner {
            Self::MalformedQuery(e) => Self::MalformedQuery(format!("{err}: {e}")),
            Self::MalformedCredential(e) => Self::MalformedCredential(format!("{err}: {e}")),
            Self::FormatMismatch(e) => Self::FormatMismatch(format!("{err}: {e}")),
            _ => inner.clone(),
        }
    }
}

/// Construct an `Error::MalformedQuery` error from a string or existing error
/// value.
macro_rules! invalid {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::MalformedQuery(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::MalformedQuery(format!($err))
    };
}
pub(crate) use invalid;

/// Construct an `Error::MalformedCredential` error from a string or existing
/// error value.
macro_rules! malformed {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::MalformedCredential(format!($fmt, $($arg)*))
    };
     ($err:expr $(,)?) => {
        $crate::Error::MalformedCredential(format!($err))
    };
}
pub(crate) use malformed;
