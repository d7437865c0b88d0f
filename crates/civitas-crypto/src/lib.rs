//! Civitas Crypto - Signing and hashing primitives.
//!
//! This crate provides:
//! - Ed25519 keypairs and signature verification (off-chain vote signing)
//! - Blake3 hashing with domain separation

pub mod ed25519;
pub mod hash;
pub mod error;

pub use ed25519::{verify, verify_signer, Keypair};
pub use hash::{hash, hash_multi, hash_with_domain, IncrementalHasher};
pub use error::CryptoError;
