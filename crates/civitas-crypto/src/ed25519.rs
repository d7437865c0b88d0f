use crate::error::CryptoError;
use civitas_types::{Address, Ed25519PublicKey, Ed25519Signature};
use ed25519_dalek::{Signer, Verifier};
use rand::rngs::OsRng;
use std::fmt;
use zeroize::Zeroizing;

/// Ed25519 keypair used by voters to sign off-chain ballots.
/// The signing key is zeroized on drop by `ed25519-dalek`.
pub struct Keypair {
    signing_key: ed25519_dalek::SigningKey,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let signing_key = ed25519_dalek::SigningKey::generate(&mut csprng);
        Self { signing_key }
    }

    /// Create from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = ed25519_dalek::SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        let bytes = self.signing_key.verifying_key().to_bytes();
        Ed25519PublicKey::from_bytes(bytes)
    }

    /// Get the address derived from this keypair
    pub fn address(&self) -> Address {
        self.public_key().to_address()
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        let signature = self.signing_key.sign(message);
        Ed25519Signature::from_bytes(signature.to_bytes())
    }

    /// Export the seed. The returned buffer is wiped when dropped.
    pub fn export_seed(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({})", self.address())
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.export_seed())
    }
}

/// Verify an ed25519 signature.
pub fn verify(
    public_key: &Ed25519PublicKey,
    message: &[u8],
    signature: &Ed25519Signature,
) -> Result<(), CryptoError> {
    let pk = ed25519_dalek::VerifyingKey::from_bytes(public_key.as_bytes())
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    pk.verify_strict(message, &sig)
        .map_err(|_| CryptoError::VerificationFailed)
}

/// Verify that `signature` was produced over `message` by the key that owns
/// `expected`.
///
/// Ed25519 has no public key recovery, so the signer's key travels with the
/// signature; the derived address stands in for the recovered signer.
pub fn verify_signer(
    expected: &Address,
    public_key: &Ed25519PublicKey,
    message: &[u8],
    signature: &Ed25519Signature,
) -> Result<(), CryptoError> {
    let signer = public_key.to_address();
    if &signer != expected {
        return Err(CryptoError::SignerMismatch {
            expected: expected.to_string(),
            actual: signer.to_string(),
        });
    }
    verify(public_key, message, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_from_seed() {
        let kp1 = Keypair::from_seed(&[42u8; 32]);
        let kp2 = Keypair::from_seed(&[42u8; 32]);
        assert_eq!(kp1.public_key(), kp2.public_key());
        assert_eq!(kp1.address(), kp2.address());
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = Keypair::generate();
        let message = b"ballot";

        let signature = keypair.sign(message);
        assert!(verify(&keypair.public_key(), message, &signature).is_ok());
        assert_eq!(
            verify(&keypair.public_key(), b"other ballot", &signature),
            Err(CryptoError::VerificationFailed)
        );
    }

    #[test]
    fn test_verify_signer_rejects_foreign_key() {
        let voter = Keypair::from_seed(&[1u8; 32]);
        let relayer = Keypair::from_seed(&[2u8; 32]);
        let signature = relayer.sign(b"ballot");

        let result = verify_signer(&voter.address(), &relayer.public_key(), b"ballot", &signature);
        assert!(matches!(result, Err(CryptoError::SignerMismatch { .. })));

        let own = voter.sign(b"ballot");
        assert!(verify_signer(&voter.address(), &voter.public_key(), b"ballot", &own).is_ok());
    }

    #[test]
    fn test_keypair_clone_signs_identically() {
        let kp1 = Keypair::generate();
        let kp2 = kp1.clone();
        assert_eq!(kp1.sign(b"test"), kp2.sign(b"test"));
    }
}
