//! Civitas Types - Identifier and signature types shared by the Civitas crates.
//!
//! This crate provides:
//! - Addresses (20-byte, Bech32m encoded)
//! - Hashes (32-byte, blake3 digests)
//! - Ed25519 signatures and public keys

pub mod address;
pub mod hash;
pub mod signature;
pub mod error;

#[cfg(any(feature = "serde", feature = "borsh"))]
mod serialization;

pub use address::Address;
pub use hash::Hash;
pub use signature::{Ed25519PublicKey, Ed25519Signature};
pub use error::TypesError;

/// Token amounts are tracked as plain 128-bit integers.
pub type Amount = u128;

/// Unix timestamp in seconds, always supplied by the caller.
pub type Timestamp = u64;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Address, Amount, Ed25519PublicKey, Ed25519Signature, Hash, Timestamp, TypesError,
    };
}
