use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AccountId, AccountType, Balance};

/// Why a history lookup could not answer.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Error,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum AccountHistoryLookupError {
    #[error("Notebook root not found")]
    RootNotFound,

    #[error("Last account change not found")]
    LastChangeNotFound,

    #[error("Transfer to localchain not found")]
    InvalidTransferToLocalchain,

    #[error("Block seal specification not found")]
    BlockSpecificationNotFound,
}

/// The first fault found in a notebook.
///
/// Only one is ever reported per notebook, so each variant carries just the
/// payload needed to localize its own fault. Indices are 0-based: `change_index`
/// counts balance changes across the whole notebook, `note_index` counts notes
/// within the change.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    Error,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum VerifyError {
    #[error("Missing account origin for {account_type:?} account {}", hex::encode(account_id))]
    MissingAccountOrigin {
        account_id: AccountId,
        account_type: AccountType,
    },

    #[error("History lookup failed: {source}")]
    HistoryLookupError { source: AccountHistoryLookupError },

    #[error("Account changelist does not match the balance changes")]
    InvalidAccountChangelist,

    #[error("Chain transfers do not match the balance changes")]
    InvalidChainTransfersList,

    #[error("Changed accounts root does not match the balance changes")]
    InvalidBalanceChangeRoot,

    #[error("Header tax does not match the tax collected")]
    InvalidHeaderTaxRecorded,

    #[error("Invalid previous nonce")]
    InvalidPreviousNonce,

    #[error("Invalid previous balance")]
    InvalidPreviousBalance,

    #[error("Invalid previous account origin")]
    InvalidPreviousAccountOrigin,

    #[error("Previous balance proof names the wrong notebook")]
    InvalidPreviousBalanceChangeNotebook,

    #[error("Invalid balance change")]
    InvalidBalanceChange,

    #[error("Invalid balance change signature at change {change_index}")]
    InvalidBalanceChangeSignature { change_index: u32 },

    #[error("Note sent to a recipient it was not restricted to")]
    InvalidNoteRecipients,

    #[error("Notarization has no balance changes")]
    InvalidNetBalanceChangeset,

    #[error("Balance {balance} is below {amount} at change {change_index}, note {note_index}")]
    InsufficientBalance {
        balance: Balance,
        amount: Balance,
        note_index: u32,
        change_index: u32,
    },

    #[error("Balance {balance} + {amount} exceeds max at change {change_index}, note {note_index}")]
    ExceededMaxBalance {
        balance: Balance,
        amount: Balance,
        note_index: u32,
        change_index: u32,
    },

    #[error("Change {change_index} declares {provided_balance}, notes give {calculated_balance}")]
    BalanceChangeMismatch {
        change_index: u32,
        provided_balance: Balance,
        calculated_balance: i128,
    },

    #[error("Balance changes are not net zero: sent {sent}, claimed {claimed}")]
    BalanceChangeNotNetZero { sent: Balance, claimed: Balance },

    #[error("Data domain leases do not match the lease notes")]
    InvalidDomainLeaseAllocation,

    #[error("Invalid data domain name")]
    InvalidDomainName,

    #[error("Tax changes are not net zero: sent {sent}, claimed {claimed}")]
    TaxBalanceChangeNotNetZero { sent: Balance, claimed: Balance },

    #[error("Missing balance proof")]
    MissingBalanceProof,

    #[error("Invalid previous balance proof")]
    InvalidPreviousBalanceProof,

    #[error("Invalid notebook hash")]
    InvalidNotebookHash,

    #[error("Invalid notebook header hash")]
    InvalidNotebookHeaderHash,

    #[error("Duplicate chain transfer")]
    DuplicateChainTransfer,

    #[error("Duplicated account origin uid")]
    DuplicatedAccountOriginUid,

    #[error("Invalid notary signature")]
    InvalidNotarySignature,

    #[error("Notebook tick is older than the accepted tick")]
    NotebookTooOld,

    #[error("Unsupported notebook encoding")]
    DecodeError,

    #[error("Could not decode notebook")]
    CouldNotDecodeNotebook,

    #[error("Account has no channel hold")]
    AccountChannelHoldDoesntExist,

    #[error("Account already has a channel hold")]
    AccountAlreadyHasChannelHold,

    #[error("Channel hold has not matured")]
    ChannelHoldNotReadyForClaim,

    #[error("Account is locked by a channel hold")]
    AccountLocked,

    #[error("Invalid channel hold note")]
    InvalidChannelHoldNote,

    #[error("Channel hold claimed by an account other than its recipient")]
    InvalidChannelClaimers,

    #[error("Channel hold is below the minimum")]
    ChannelNoteBelowMinimum,

    #[error("Tax note used on a tax account")]
    InvalidTaxNoteAccount,

    #[error("Operation not allowed on a tax account")]
    InvalidTaxOperation,

    #[error("Insufficient tax: sent {tax_sent}, owed {tax_owed} by {}", hex::encode(account_id))]
    InsufficientTaxIncluded {
        tax_sent: Balance,
        tax_owed: Balance,
        account_id: AccountId,
    },

    #[error("Block votes are not funded by enough tax")]
    InsufficientBlockVoteTax,

    #[error("Vote funds are not fully allocated to block votes")]
    InvalidBlockVoteAllocation,

    #[error("Invalid block votes root")]
    InvalidBlockVoteRoot,

    #[error("Invalid block votes count")]
    InvalidBlockVotesCount,

    #[error("Invalid block voting power")]
    InvalidBlockVotingPower,

    #[error("Invalid block vote list")]
    InvalidBlockVoteList,

    #[error("Invalid block vote signature")]
    BlockVoteInvalidSignature,

    #[error("Block vote power is below the vote minimum")]
    InsufficientBlockVoteMinimum,

    #[error("Block vote names an unregistered data domain")]
    UnregisteredDataDomain,

    #[error("Data domain is not owned by the vote's domain account")]
    InvalidDataDomainAccount,

    #[error("No closest miner found for block vote")]
    NoClosestMinerFoundForVote,

    #[error("Notebook includes an expired transfer to localchain")]
    NotebookIncludesExpiredLocalchainTransfer,

    #[error("Transfer belongs to a different notary")]
    InvalidNotaryUsedForTransfer,

    #[error("Too many chain transfers in one notebook")]
    MaxBlockTransfersExceeded,

    #[error("Invalid notebook secret provided")]
    InvalidSecretProvided,
}

impl From<AccountHistoryLookupError> for VerifyError {
    fn from(source: AccountHistoryLookupError) -> Self {
        VerifyError::HistoryLookupError { source }
    }
}
