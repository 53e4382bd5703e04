use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use super::{AccountId, Balance, DataDomain, NotaryId, Signature, H256};
use crate::proof::merkle::{hash_with_domain, keccak256, leaf_hash};

const BLOCK_VOTE_SIGNING_DOMAIN: &[u8] = b"notary/block-vote/v1";

/// A notary-ledger-backed vote for the block that should be sealed next.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BlockVote {
    /// Tax account that funded the vote.
    pub account_id: AccountId,
    /// Block being voted on.
    pub block_hash: H256,
    /// Distinguishes several votes by one account.
    pub index: u32,
    pub power: Balance,
    pub data_domain: DataDomain,
    pub data_domain_account: AccountId,
    pub signature: Signature,
}

impl BlockVote {
    /// Hash signed by `account_id`.
    pub fn signing_hash(&self) -> H256 {
        let unsigned = BlockVote {
            signature: Signature::EMPTY,
            ..self.clone()
        };
        hash_with_domain(BLOCK_VOTE_SIGNING_DOMAIN, &unsigned)
    }

    /// Leaf of `block_votes_root`. Covers the signature.
    pub fn leaf_hash(&self) -> H256 {
        leaf_hash(self)
    }

    /// Deterministic seal nonce of this vote for a notary. Lower wins.
    pub fn seal_nonce(&self, notary_id: NotaryId) -> H256 {
        let mut data = Vec::with_capacity(36);
        data.extend_from_slice(&self.leaf_hash());
        data.extend_from_slice(&notary_id.to_le_bytes());
        keccak256(&data)
    }
}

/// Chain parameters in force for a voted block. Owned by the seal-spec authority.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct BlockSealSpec {
    pub vote_minimum: Balance,
    pub compute_difficulty: u128,
}

/// A miner eligible to seal blocks.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct MiningAuthority {
    pub authority_id: H256,
    pub authority_index: u32,
}

impl MiningAuthority {
    /// Distance of this authority to a seal nonce: `nonce XOR keccak256(authority_id)`.
    pub fn xor_distance(&self, seal_nonce: &H256) -> H256 {
        let hashed = keccak256(&self.authority_id);
        let mut distance = [0u8; 32];
        for (i, byte) in distance.iter_mut().enumerate() {
            *byte = seal_nonce[i] ^ hashed[i];
        }
        distance
    }
}
