use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use super::{AccountId, Balance, NotaryId, NotebookNumber, Nonce, Signature, Tick, H256};
use crate::proof::merkle::{hash_with_domain, leaf_hash};

/// Domain tag mixed into every balance change signing payload.
const BALANCE_CHANGE_SIGNING_DOMAIN: &[u8] = b"notary/balance-change/v1";

/// The two ledgers every account id can hold.
/// Ordering matters: changed accounts are merkleized by `(account_id, account_type)`.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum AccountType {
    Tax,
    Deposit,
}

/// Key of one ledger account within a notary.
pub type AccountKey = (AccountId, AccountType);

/// The unique first-appearance identity of an account in a notary's notebook lineage.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct AccountOrigin {
    pub notebook_number: NotebookNumber,
    pub account_uid: u32,
}

/// An account first seen in this notebook, with its freshly minted uid.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct NewAccountOrigin {
    pub account_id: AccountId,
    pub account_type: AccountType,
    pub account_uid: u32,
}

impl NewAccountOrigin {
    pub fn new(account_id: AccountId, account_type: AccountType, account_uid: u32) -> Self {
        Self {
            account_id,
            account_type,
            account_uid,
        }
    }
}

/// Inclusion proof of a leaf in a binary merkle tree.
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
pub struct MerkleProof {
    /// Sibling hashes, leaf level first.
    pub proof: Vec<H256>,
    pub number_of_leaves: u32,
    pub leaf_index: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum NoteType {
    /// Funds leave the notary ledger and are credited on the base chain.
    SendToMainchain,
    /// Claims a transfer the account made on the base chain into this notary.
    ClaimFromMainchain { account_nonce: Nonce },
    /// Claims funds sent by another account in the same notarization.
    Claim,
    /// Sends funds to be claimed in the same notarization, optionally restricted to recipients.
    Send { to: Option<Vec<AccountId>> },
    /// Pays for leasing a data domain registered in the same notarization.
    LeaseDomain,
    /// Tax paid from a deposit account, claimed by a tax account.
    Tax,
    /// Tax converted into block vote power.
    SendToVote,
    /// Locks funds for a payment channel towards `recipient`.
    ChannelHold { recipient: AccountId },
    /// Releases a matured hold, sending `milligons` to the hold recipient.
    ChannelHoldSettle,
    /// The hold recipient's claim of settled channel funds.
    ChannelHoldClaim,
}

/// One line item of a balance change.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Note {
    pub milligons: Balance,
    pub note_type: NoteType,
}

impl Note {
    pub fn create(milligons: Balance, note_type: NoteType) -> Self {
        Self {
            milligons,
            note_type,
        }
    }
}

/// Proves the tip an account is changing from.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BalanceProof {
    pub notary_id: NotaryId,
    /// Notebook holding the previous tip.
    pub notebook_number: NotebookNumber,
    /// Tick of that notebook.
    pub tick: Tick,
    /// Absent when the previous tip is in the same notebook.
    pub notebook_proof: Option<MerkleProof>,
    pub account_origin: AccountOrigin,
    /// Balance at the previous tip.
    pub balance: Balance,
}

/// A signed delta for one account.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BalanceChange {
    pub account_id: AccountId,
    pub account_type: AccountType,
    /// The account nonce after this change.
    pub change_number: Nonce,
    /// Declared balance after this change.
    pub balance: Balance,
    pub previous_balance_proof: Option<BalanceProof>,
    /// Hold active on the account before this change.
    pub channel_hold_note: Option<Note>,
    pub notes: Vec<Note>,
    pub signature: Signature,
}

impl BalanceChange {
    pub fn key(&self) -> AccountKey {
        (self.account_id, self.account_type)
    }

    /// Hash the account signs: the change with an empty signature.
    pub fn signing_hash(&self) -> H256 {
        let unsigned = BalanceChange {
            signature: Signature::EMPTY,
            ..self.clone()
        };
        hash_with_domain(BALANCE_CHANGE_SIGNING_DOMAIN, &unsigned)
    }
}

/// Final state of an account in a notebook. Leaf of `changed_accounts_root`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BalanceTip {
    pub account_id: AccountId,
    pub account_type: AccountType,
    pub change_number: Nonce,
    pub balance: Balance,
    pub account_origin: AccountOrigin,
    pub channel_hold_note: Option<Note>,
}

impl BalanceTip {
    pub fn key(&self) -> AccountKey {
        (self.account_id, self.account_type)
    }

    pub fn leaf_hash(&self) -> H256 {
        leaf_hash(self)
    }
}
