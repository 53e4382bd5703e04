use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use super::{
    AccountId, AccountOrigin, BalanceChange, Balance, BlockNumber, BlockVote, DataDomain,
    NewAccountOrigin, NotaryId, NotebookNumber, Nonce, Signature, Tick, H256,
};
use crate::proof::merkle::{hash_with_domain, sha256_hash};

const NOTEBOOK_HEADER_HASH_DOMAIN: &[u8] = b"notary/notebook-header/v1";
const NOTEBOOK_HASH_DOMAIN: &[u8] = b"notary/notebook/v1";
const NOTEBOOK_SECRET_DOMAIN: &[u8] = b"notary/notebook-secret/v1";

/// Movement of funds between the base chain and a notary ledger.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum ChainTransfer {
    /// Funds leaving the notary ledger, credited on the base chain once admitted.
    ToMainchain { account_id: AccountId, amount: Balance },
    /// Funds the account locked on the base chain, claimed into the notary ledger.
    ToLocalchain {
        account_id: AccountId,
        account_nonce: Nonce,
    },
}

/// Header of a notebook. Field order is the wire order.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct NotebookHeader {
    pub version: u16,
    pub notebook_number: NotebookNumber,
    pub tick: Tick,
    /// Latest finalized base chain block the notary observed.
    pub finalized_block_number: BlockNumber,
    /// Total tax collected in this notebook.
    pub tax: Balance,
    pub notary_id: NotaryId,
    pub chain_transfers: Vec<ChainTransfer>,
    pub changed_accounts_root: H256,
    pub changed_account_origins: Vec<AccountOrigin>,
    pub block_votes_root: H256,
    pub block_votes_count: u32,
    pub blocks_with_votes: Vec<H256>,
    pub block_voting_power: Balance,
    pub secret_hash: H256,
    /// Reveals the secret committed by the previous notebook.
    pub parent_secret: Option<H256>,
    pub data_domains: Vec<(DataDomain, AccountId)>,
}

impl NotebookHeader {
    /// Canonical header hash, signed by the notary on submission.
    pub fn hash(&self) -> H256 {
        hash_with_domain(NOTEBOOK_HEADER_HASH_DOMAIN, self)
    }

    pub fn key_details(&self) -> NotebookKeyDetails {
        NotebookKeyDetails {
            notebook_number: self.notebook_number,
            tick: self.tick,
            changed_accounts_root: self.changed_accounts_root,
            block_votes_root: self.block_votes_root,
            secret_hash: self.secret_hash,
            parent_secret: self.parent_secret,
        }
    }
}

/// Commitment to a notebook secret, revealed by the next notebook as `parent_secret`.
pub fn secret_hash(secret: &H256) -> H256 {
    let mut data = Vec::with_capacity(NOTEBOOK_SECRET_DOMAIN.len() + 32);
    data.extend_from_slice(NOTEBOOK_SECRET_DOMAIN);
    data.extend_from_slice(secret);
    sha256_hash(&data)
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct SignedNotebookHeader {
    pub header: NotebookHeader,
    /// Notary signature over `header.hash()`.
    pub signature: Signature,
}

/// A set of balance changes that must net to zero, with the votes and
/// domain leases they fund.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct Notarization {
    pub balance_changes: Vec<BalanceChange>,
    pub block_votes: Vec<BlockVote>,
    pub data_domains: Vec<(DataDomain, AccountId)>,
}

/// A full notebook as published by a notary.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Notebook {
    pub header: NotebookHeader,
    pub notarizations: Vec<Notarization>,
    pub new_account_origins: Vec<NewAccountOrigin>,
    /// Declared `compute_hash()` of this notebook.
    pub hash: H256,
    /// Notary signature over `hash`.
    pub signature: Signature,
}

impl Notebook {
    pub fn compute_hash(&self) -> H256 {
        hash_with_domain(
            NOTEBOOK_HASH_DOMAIN,
            &(&self.header, &self.notarizations, &self.new_account_origins),
        )
    }

    /// All balance changes in notebook order.
    pub fn balance_changes(&self) -> impl Iterator<Item = &BalanceChange> {
        self.notarizations.iter().flat_map(|n| n.balance_changes.iter())
    }

    /// All block votes in notebook order.
    pub fn block_votes(&self) -> impl Iterator<Item = &BlockVote> {
        self.notarizations.iter().flat_map(|n| n.block_votes.iter())
    }

    pub fn encode(&self) -> Vec<u8> {
        super::encode(self)
    }
}

/// What the chain keeps about each admitted notebook.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct NotebookKeyDetails {
    pub notebook_number: NotebookNumber,
    pub tick: Tick,
    pub changed_accounts_root: H256,
    pub block_votes_root: H256,
    pub secret_hash: H256,
    pub parent_secret: Option<H256>,
}

/// Last admitted tip of an account.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct AccountLastChange {
    pub notebook_number: NotebookNumber,
    pub change_number: Nonce,
    pub balance: Balance,
    pub account_origin: AccountOrigin,
}

/// An on-chain transfer into a notary ledger, awaiting its claim.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct TransferToLocalchainRecord {
    pub account_id: AccountId,
    pub account_nonce: Nonce,
    pub amount: Balance,
    pub notary_id: NotaryId,
    /// Last block at which the transfer may still be claimed.
    pub expiration_block: BlockNumber,
    /// Notebook that claimed it, if any.
    pub consumed_in: Option<NotebookNumber>,
}
