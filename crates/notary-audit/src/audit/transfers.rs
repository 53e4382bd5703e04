use std::collections::BTreeSet;

use tracing::trace;

use super::balances::DerivedTransfer;
use crate::config::AuditConfig;
use crate::error::VerifyError;
use crate::history::AccountHistoryLookup;
use crate::types::{AccountId, Balance, ChainTransfer, NotebookHeader, Nonce};

/// Chain-side effects of a notebook's transfers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferOutcome {
    /// On-chain transfers this notebook claims, by `(account_id, account_nonce)`.
    pub consumed: Vec<(AccountId, Nonce)>,
    /// Credits to queue on the base chain.
    pub to_mainchain: Vec<(AccountId, Balance)>,
}

/// Match the header's chain transfers against the notes and the chain's
/// record of transfers into this notary.
///
/// A transfer to localchain may be claimed while the notebook's finalized
/// block is at or before its expiration block.
pub fn reconcile_chain_transfers<L: AccountHistoryLookup + ?Sized>(
    header: &NotebookHeader,
    derived: &[DerivedTransfer],
    lookup: &L,
    config: &AuditConfig,
) -> Result<TransferOutcome, VerifyError> {
    if header.chain_transfers.len() > config.max_block_transfers
        || derived.len() > config.max_block_transfers
    {
        return Err(VerifyError::MaxBlockTransfersExceeded);
    }

    let mut seen = BTreeSet::new();
    for entry in derived {
        if let ChainTransfer::ToLocalchain {
            account_id,
            account_nonce,
        } = entry.transfer
        {
            if !seen.insert((account_id, account_nonce)) {
                return Err(VerifyError::DuplicateChainTransfer);
            }
        }
    }

    if header.chain_transfers.len() != derived.len()
        || header
            .chain_transfers
            .iter()
            .zip(derived)
            .any(|(declared, entry)| *declared != entry.transfer)
    {
        return Err(VerifyError::InvalidChainTransfersList);
    }

    let mut outcome = TransferOutcome::default();
    for entry in derived {
        match entry.transfer {
            ChainTransfer::ToLocalchain {
                account_id,
                account_nonce,
            } => {
                let record = lookup.transfer_to_localchain(&account_id, account_nonce)?;
                if record.notary_id != header.notary_id {
                    return Err(VerifyError::InvalidNotaryUsedForTransfer);
                }
                if header.finalized_block_number > record.expiration_block {
                    return Err(VerifyError::NotebookIncludesExpiredLocalchainTransfer);
                }
                if record.consumed_in.is_some() {
                    return Err(VerifyError::DuplicateChainTransfer);
                }
                if record.amount != entry.amount {
                    return Err(VerifyError::InvalidChainTransfersList);
                }
                trace!(account_nonce, amount = record.amount, "transfer to localchain claimed");
                outcome.consumed.push((account_id, account_nonce));
            }
            ChainTransfer::ToMainchain { account_id, amount } => {
                outcome.to_mainchain.push((account_id, amount));
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccountHistoryLookupError;
    use crate::history::MemoryHistory;
    use crate::test_support::*;
    use crate::types::NOTEBOOK_VERSION;

    fn header(finalized_block_number: u32, chain_transfers: Vec<ChainTransfer>) -> NotebookHeader {
        NotebookHeader {
            version: NOTEBOOK_VERSION,
            notebook_number: 1,
            tick: 1,
            finalized_block_number,
            tax: 0,
            notary_id: NOTARY_ID,
            chain_transfers,
            changed_accounts_root: [0u8; 32],
            changed_account_origins: vec![],
            block_votes_root: [0u8; 32],
            block_votes_count: 0,
            blocks_with_votes: vec![],
            block_voting_power: 0,
            secret_hash: [0u8; 32],
            parent_secret: None,
            data_domains: vec![],
        }
    }

    fn to_localchain(seed: u8, account_nonce: Nonce, amount: Balance) -> DerivedTransfer {
        DerivedTransfer {
            transfer: ChainTransfer::ToLocalchain {
                account_id: account(seed),
                account_nonce,
            },
            amount,
        }
    }

    fn reconcile_at(block: u32, history: &MemoryHistory) -> Result<TransferOutcome, VerifyError> {
        let derived = vec![to_localchain(ALICE, 1, 1_000)];
        let header = header(block, vec![derived[0].transfer.clone()]);
        reconcile_chain_transfers(&header, &derived, history, &AuditConfig::default())
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let mut history = MemoryHistory::new();
        history.insert_transfer(transfer(ALICE, 1, 1_000, 10));

        assert!(reconcile_at(9, &history).is_ok());
        assert!(reconcile_at(10, &history).is_ok());
        assert_eq!(
            reconcile_at(11, &history),
            Err(VerifyError::NotebookIncludesExpiredLocalchainTransfer)
        );
    }

    #[test]
    fn test_consumed_transfer_is_duplicate() {
        let mut history = MemoryHistory::new();
        let mut record = transfer(ALICE, 1, 1_000, 10);
        record.consumed_in = Some(1);
        history.insert_transfer(record);
        assert_eq!(reconcile_at(5, &history), Err(VerifyError::DuplicateChainTransfer));
    }

    #[test]
    fn test_duplicate_within_notebook() {
        let mut history = MemoryHistory::new();
        history.insert_transfer(transfer(ALICE, 1, 1_000, 10));
        let derived = vec![to_localchain(ALICE, 1, 500), to_localchain(ALICE, 1, 500)];
        let header = header(1, derived.iter().map(|d| d.transfer.clone()).collect());
        assert_eq!(
            reconcile_chain_transfers(&header, &derived, &history, &AuditConfig::default()),
            Err(VerifyError::DuplicateChainTransfer)
        );
    }

    #[test]
    fn test_unknown_wrong_notary_and_amount() {
        assert_eq!(
            reconcile_at(1, &MemoryHistory::new()),
            Err(VerifyError::HistoryLookupError {
                source: AccountHistoryLookupError::InvalidTransferToLocalchain
            })
        );

        let mut history = MemoryHistory::new();
        let mut record = transfer(ALICE, 1, 1_000, 10);
        record.notary_id = 2;
        history.insert_transfer(record);
        assert_eq!(reconcile_at(1, &history), Err(VerifyError::InvalidNotaryUsedForTransfer));

        let mut history = MemoryHistory::new();
        history.insert_transfer(transfer(ALICE, 1, 999, 10));
        assert_eq!(reconcile_at(1, &history), Err(VerifyError::InvalidChainTransfersList));
    }

    #[test]
    fn test_header_list_must_match_notes() {
        let history = MemoryHistory::new();
        let derived = vec![DerivedTransfer {
            transfer: ChainTransfer::ToMainchain {
                account_id: account(ALICE),
                amount: 100,
            },
            amount: 100,
        }];
        let config = AuditConfig::default();

        let empty = header(1, vec![]);
        assert_eq!(
            reconcile_chain_transfers(&empty, &derived, &history, &config),
            Err(VerifyError::InvalidChainTransfersList)
        );

        let declared = header(1, vec![derived[0].transfer.clone()]);
        let outcome = reconcile_chain_transfers(&declared, &derived, &history, &config).unwrap();
        assert_eq!(outcome.to_mainchain, vec![(account(ALICE), 100)]);
        assert!(outcome.consumed.is_empty());
    }

    #[test]
    fn test_transfer_ceiling() {
        let config = AuditConfig {
            max_block_transfers: 1,
            ..AuditConfig::default()
        };
        let derived: Vec<DerivedTransfer> =
            (1..=2).map(|nonce| to_localchain(ALICE, nonce, 1)).collect();
        let header = header(1, derived.iter().map(|d| d.transfer.clone()).collect());
        assert_eq!(
            reconcile_chain_transfers(&header, &derived, &MemoryHistory::new(), &config),
            Err(VerifyError::MaxBlockTransfersExceeded)
        );
    }
}
