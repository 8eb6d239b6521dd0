//! # Test Utilities
//!
//! Credential fixtures signed by a fixed issuer key and holder signers for
//! integration tests.

pub mod issuer;
pub mod wallet;

pub use issuer::Issuer;
pub use wallet::{FailingSigner, Wallet};
