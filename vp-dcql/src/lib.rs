//! Build Verifiable Presentations that answer a [Digital Credentials Query
//! Language](https://openid.net/specs/openid-4-verifiable-presentations-1_0.html#name-digital-credentials-query-l)
//! (DCQL) query.
//!
//! Given a DCQL query and one or more signed credentials, the engine works
//! out which credentials satisfy the query, discloses only the claims the
//! query asks for, and returns a presentation bound to the verifier's
//! challenge and signed by the holder.
//!
//! ```rust,ignore
//! use vp_dcql::{DataIntegritySigner, Ed25519Keyring, create_presentation};
//!
//! let signer = DataIntegritySigner::new(Ed25519Keyring::generate());
//! let vp = create_presentation(query, credential, Some("n-0S6_WzA2Mj"), &signer)?;
//! println!("{}", vp.to_json()?);
//! ```
//!
//! Supported credential formats are `ldp_vc`, `jwt_vc_json` and `dc+sd-jwt`.
//!
//! # Feature Flags
//!
//! * `ffi` (default) - Exports the C entry points declared in
//!   `include/vp_dcql.h`.

pub mod claims;
pub mod dcql;
pub mod disclose;
pub mod engine;
pub mod format;
pub mod matcher;
pub mod present;
pub mod proof;
pub mod provider;
pub mod resolver;

#[cfg(feature = "ffi")]
pub mod ffi;

mod error;

pub use self::claims::{ClaimNode, ClaimPath, PathStep};
pub use self::dcql::{DcqlQuery, SetExpr};
pub use self::engine::{Engine, Options, TieBreak, create_presentation};
pub use self::error::Error;
pub use self::format::{CredentialClaims, CredentialFormat, CredentialMeta};
pub use self::matcher::{MatchFailure, MatchResult};
pub use self::present::{Presentation, PresentedCredential, VpBuilder};
pub use self::proof::{DataIntegritySigner, Ed25519Keyring, Signature};
pub use self::provider::{Codec, JsonCodec, Signer};
pub use self::resolver::{BranchFailure, Resolution, Selection};

/// Result type for presentation operations.
pub type Result<T, E = Error> = anyhow::Result<T, E>;
