//! Off-chain signed ballots.
//!
//! A voter signs the canonical message `{proposal_id, voter, tokens, weights,
//! chain_id}` and hands the [`SignedVote`] to a validator, who relays it to
//! [`crate::QuadraticVotingEngine::verify_off_chain_vote`].

use borsh::{BorshDeserialize, BorshSerialize};
use civitas_crypto::{hash_with_domain, verify_signer, Keypair};
use civitas_types::{Address, Amount, Ed25519PublicKey, Ed25519Signature, Hash};
use serde::{Deserialize, Serialize};

use crate::error::{GovernanceError, Result};

/// Domain separator for ballot signatures.
pub const VOTE_DOMAIN: &str = "civitas/offchain-vote/v1";

/// Fields covered by a ballot signature, in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct VoteMessage {
    pub proposal_id: u64,
    pub voter: Address,
    pub tokens: Amount,
    pub weights: Vec<u8>,
    pub chain_id: u64,
}

impl VoteMessage {
    /// Borsh encoding of the message.
    pub fn encode(&self) -> Result<Vec<u8>> {
        borsh::to_vec(self).map_err(|e| GovernanceError::MalformedPayload(e.to_string()))
    }

    /// Digest that is actually signed.
    pub fn signing_hash(&self) -> Result<Hash> {
        Ok(hash_with_domain(&self.encode()?, VOTE_DOMAIN))
    }
}

/// A ballot signed by the voter, submitted by a relayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedVote {
    pub voter: Address,
    /// Voter's key. Its derived address must equal `voter`.
    pub public_key: Ed25519PublicKey,
    pub tokens: Amount,
    pub weights: Vec<u8>,
    pub signature: Ed25519Signature,
}

impl SignedVote {
    /// Sign a ballot with `keypair`. The voter is the keypair's address.
    pub fn sign(
        keypair: &Keypair,
        proposal_id: u64,
        tokens: Amount,
        weights: Vec<u8>,
        chain_id: u64,
    ) -> Result<Self> {
        let voter = keypair.address();
        let message = VoteMessage {
            proposal_id,
            voter,
            tokens,
            weights,
            chain_id,
        };
        let digest = message.signing_hash()?;
        Ok(Self {
            voter,
            public_key: keypair.public_key(),
            tokens,
            weights: message.weights,
            signature: keypair.sign(digest.as_bytes()),
        })
    }

    pub fn message(&self, proposal_id: u64, chain_id: u64) -> VoteMessage {
        VoteMessage {
            proposal_id,
            voter: self.voter,
            tokens: self.tokens,
            weights: self.weights.clone(),
            chain_id,
        }
    }

    /// Key under which a consumed signature is remembered.
    pub fn signature_hash(&self) -> Hash {
        Hash::compute(self.signature.as_bytes())
    }

    /// Check that `voter` signed this ballot for `proposal_id` on `chain_id`.
    ///
    /// # Errors
    /// - `SignerMismatch` if the key does not belong to `voter`
    /// - `InvalidSignature` if the signature does not verify
    pub fn verify(&self, proposal_id: u64, chain_id: u64) -> Result<()> {
        let digest = self.message(proposal_id, chain_id).signing_hash()?;
        verify_signer(&self.voter, &self.public_key, digest.as_bytes(), &self.signature)?;
        Ok(())
    }
}
