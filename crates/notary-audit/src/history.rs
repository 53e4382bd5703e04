//! Read-only view of the chain state an audit depends on.
//!
//! The audit engine never owns ledger state. It reads account lineage,
//! transfers and chain parameters through [`AccountHistoryLookup`], and the
//! admitting context commits accepted effects afterwards.

use std::collections::BTreeMap;

use tracing::debug;

use crate::audit::NotebookEffects;
use crate::error::AccountHistoryLookupError;
use crate::types::{
    AccountId, AccountLastChange, AccountType, BlockSealSpec, DataDomain, MiningAuthority,
    NotaryId, NotebookKeyDetails, NotebookNumber, Nonce, TransferToLocalchainRecord, H256,
};

/// Lookups an audit makes against committed chain state.
///
/// Implementations must answer from one consistent snapshot for the length
/// of an audit.
pub trait AccountHistoryLookup: Send + Sync {
    fn notebook_key_details(
        &self,
        notary_id: NotaryId,
        notebook_number: NotebookNumber,
    ) -> Result<NotebookKeyDetails, AccountHistoryLookupError>;

    /// Most recent notebook recorded for a notary.
    fn latest_notebook(&self, notary_id: NotaryId) -> Option<NotebookKeyDetails>;

    fn last_change(
        &self,
        notary_id: NotaryId,
        account_id: &AccountId,
        account_type: AccountType,
    ) -> Result<AccountLastChange, AccountHistoryLookupError>;

    fn transfer_to_localchain(
        &self,
        account_id: &AccountId,
        account_nonce: Nonce,
    ) -> Result<TransferToLocalchainRecord, AccountHistoryLookupError>;

    fn block_seal_spec(
        &self,
        block_hash: &H256,
    ) -> Result<BlockSealSpec, AccountHistoryLookupError>;

    fn data_domain_owner(&self, domain: &DataDomain) -> Option<AccountId>;

    fn mining_authorities(&self) -> Vec<MiningAuthority>;
}

/// In-memory chain snapshot.
#[derive(Clone, Debug, Default)]
pub struct MemoryHistory {
    notebooks: BTreeMap<(NotaryId, NotebookNumber), NotebookKeyDetails>,
    last_changes: BTreeMap<(NotaryId, AccountId, AccountType), AccountLastChange>,
    transfers: BTreeMap<(AccountId, Nonce), TransferToLocalchainRecord>,
    seal_specs: BTreeMap<H256, BlockSealSpec>,
    data_domains: BTreeMap<DataDomain, AccountId>,
    authorities: Vec<MiningAuthority>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_notebook(&mut self, notary_id: NotaryId, details: NotebookKeyDetails) {
        self.notebooks
            .insert((notary_id, details.notebook_number), details);
    }

    pub fn insert_last_change(
        &mut self,
        notary_id: NotaryId,
        account_id: AccountId,
        account_type: AccountType,
        change: AccountLastChange,
    ) {
        self.last_changes
            .insert((notary_id, account_id, account_type), change);
    }

    /// Record an on-chain transfer into a notary.
    pub fn insert_transfer(&mut self, record: TransferToLocalchainRecord) {
        self.transfers
            .insert((record.account_id, record.account_nonce), record);
    }

    pub fn insert_seal_spec(&mut self, block_hash: H256, spec: BlockSealSpec) {
        self.seal_specs.insert(block_hash, spec);
    }

    pub fn register_data_domain(&mut self, domain: DataDomain, owner: AccountId) {
        self.data_domains.insert(domain, owner);
    }

    pub fn add_mining_authority(&mut self, authority: MiningAuthority) {
        self.authorities.push(authority);
    }

    /// Apply the effects of an admitted notebook.
    pub fn commit(&mut self, effects: &NotebookEffects) {
        debug!(
            notary_id = effects.notary_id,
            notebook_number = effects.key_details.notebook_number,
            tips = effects.tips.len(),
            "committing notebook effects"
        );
        self.insert_notebook(effects.notary_id, effects.key_details.clone());

        for tip in &effects.tips {
            self.insert_last_change(
                effects.notary_id,
                tip.account_id,
                tip.account_type,
                AccountLastChange {
                    notebook_number: effects.key_details.notebook_number,
                    change_number: tip.change_number,
                    balance: tip.balance,
                    account_origin: tip.account_origin,
                },
            );
        }

        for (account_id, account_nonce) in &effects.consumed_transfers {
            if let Some(record) = self.transfers.get_mut(&(*account_id, *account_nonce)) {
                record.consumed_in = Some(effects.key_details.notebook_number);
            }
        }

        for (domain, owner) in uncontested_leases(&effects.data_domains) {
            self.data_domains.entry(domain.clone()).or_insert(owner);
        }
    }
}

/// Leases whose domain is claimed only once in the notebook. A domain leased
/// twice in the same notebook goes to nobody.
fn uncontested_leases(leases: &[(DataDomain, AccountId)]) -> Vec<(&DataDomain, AccountId)> {
    leases
        .iter()
        .filter(|(domain, _)| leases.iter().filter(|(other, _)| other == domain).count() == 1)
        .map(|(domain, owner)| (domain, *owner))
        .collect()
}

impl AccountHistoryLookup for MemoryHistory {
    fn notebook_key_details(
        &self,
        notary_id: NotaryId,
        notebook_number: NotebookNumber,
    ) -> Result<NotebookKeyDetails, AccountHistoryLookupError> {
        self.notebooks
            .get(&(notary_id, notebook_number))
            .cloned()
            .ok_or(AccountHistoryLookupError::RootNotFound)
    }

    fn latest_notebook(&self, notary_id: NotaryId) -> Option<NotebookKeyDetails> {
        self.notebooks
            .range((notary_id, 0)..=(notary_id, NotebookNumber::MAX))
            .next_back()
            .map(|(_, details)| details.clone())
    }

    fn last_change(
        &self,
        notary_id: NotaryId,
        account_id: &AccountId,
        account_type: AccountType,
    ) -> Result<AccountLastChange, AccountHistoryLookupError> {
        self.last_changes
            .get(&(notary_id, *account_id, account_type))
            .cloned()
            .ok_or(AccountHistoryLookupError::LastChangeNotFound)
    }

    fn transfer_to_localchain(
        &self,
        account_id: &AccountId,
        account_nonce: Nonce,
    ) -> Result<TransferToLocalchainRecord, AccountHistoryLookupError> {
        self.transfers
            .get(&(*account_id, account_nonce))
            .cloned()
            .ok_or(AccountHistoryLookupError::InvalidTransferToLocalchain)
    }

    fn block_seal_spec(
        &self,
        block_hash: &H256,
    ) -> Result<BlockSealSpec, AccountHistoryLookupError> {
        self.seal_specs
            .get(block_hash)
            .copied()
            .ok_or(AccountHistoryLookupError::BlockSpecificationNotFound)
    }

    fn data_domain_owner(&self, domain: &DataDomain) -> Option<AccountId> {
        self.data_domains.get(domain).copied()
    }

    fn mining_authorities(&self) -> Vec<MiningAuthority> {
        self.authorities.clone()
    }
}

/// A base snapshot plus the effects admitted earlier in the same batch.
///
/// Each notebook in a batch is audited as if everything before it had
/// already been committed, so two notebooks cannot both spend the same
/// transfer or nonce.
pub struct PendingHistory<'a, L: AccountHistoryLookup + ?Sized> {
    base: &'a L,
    overlay: MemoryHistory,
}

impl<'a, L: AccountHistoryLookup + ?Sized> PendingHistory<'a, L> {
    pub fn new(base: &'a L) -> Self {
        Self {
            base,
            overlay: MemoryHistory::default(),
        }
    }

    /// Record a notebook as sequenced, whether or not its audit passed.
    pub fn record_notebook(&mut self, notary_id: NotaryId, details: NotebookKeyDetails) {
        self.overlay.insert_notebook(notary_id, details);
    }

    pub fn admit(&mut self, effects: &NotebookEffects) {
        // Pull transfer records into the overlay so consumption sticks.
        for (account_id, account_nonce) in &effects.consumed_transfers {
            if let Ok(record) = self.base.transfer_to_localchain(account_id, *account_nonce) {
                self.overlay.insert_transfer(record);
            }
        }
        // Domains already owned in the base keep their owner.
        for (domain, _) in &effects.data_domains {
            if let Some(owner) = self.base.data_domain_owner(domain) {
                self.overlay.data_domains.entry(domain.clone()).or_insert(owner);
            }
        }
        self.overlay.commit(effects);
    }
}

impl<L: AccountHistoryLookup + ?Sized> AccountHistoryLookup for PendingHistory<'_, L> {
    fn notebook_key_details(
        &self,
        notary_id: NotaryId,
        notebook_number: NotebookNumber,
    ) -> Result<NotebookKeyDetails, AccountHistoryLookupError> {
        self.overlay
            .notebook_key_details(notary_id, notebook_number)
            .or_else(|_| self.base.notebook_key_details(notary_id, notebook_number))
    }

    fn latest_notebook(&self, notary_id: NotaryId) -> Option<NotebookKeyDetails> {
        self.overlay
            .latest_notebook(notary_id)
            .or_else(|| self.base.latest_notebook(notary_id))
    }

    fn last_change(
        &self,
        notary_id: NotaryId,
        account_id: &AccountId,
        account_type: AccountType,
    ) -> Result<AccountLastChange, AccountHistoryLookupError> {
        self.overlay
            .last_change(notary_id, account_id, account_type)
            .or_else(|_| self.base.last_change(notary_id, account_id, account_type))
    }

    fn transfer_to_localchain(
        &self,
        account_id: &AccountId,
        account_nonce: Nonce,
    ) -> Result<TransferToLocalchainRecord, AccountHistoryLookupError> {
        self.overlay
            .transfer_to_localchain(account_id, account_nonce)
            .or_else(|_| self.base.transfer_to_localchain(account_id, account_nonce))
    }

    fn block_seal_spec(
        &self,
        block_hash: &H256,
    ) -> Result<BlockSealSpec, AccountHistoryLookupError> {
        self.base.block_seal_spec(block_hash)
    }

    fn data_domain_owner(&self, domain: &DataDomain) -> Option<AccountId> {
        self.overlay
            .data_domain_owner(domain)
            .or_else(|| self.base.data_domain_owner(domain))
    }

    fn mining_authorities(&self) -> Vec<MiningAuthority> {
        self.base.mining_authorities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{NotebookEffects, VoteTally};
    use crate::types::{AccountOrigin, BalanceTip, DataTLD};

    fn details(notebook_number: NotebookNumber) -> NotebookKeyDetails {
        NotebookKeyDetails {
            notebook_number,
            tick: notebook_number,
            changed_accounts_root: [notebook_number as u8; 32],
            block_votes_root: [0u8; 32],
            secret_hash: [0u8; 32],
            parent_secret: None,
        }
    }

    fn transfer() -> TransferToLocalchainRecord {
        TransferToLocalchainRecord {
            account_id: [1u8; 32],
            account_nonce: 1,
            amount: 1_000,
            notary_id: 1,
            expiration_block: 10,
            consumed_in: None,
        }
    }

    fn effects() -> NotebookEffects {
        NotebookEffects {
            notary_id: 1,
            key_details: details(1),
            tips: vec![BalanceTip {
                account_id: [1u8; 32],
                account_type: AccountType::Deposit,
                change_number: 1,
                balance: 1_000,
                account_origin: AccountOrigin {
                    notebook_number: 1,
                    account_uid: 1,
                },
                channel_hold_note: None,
            }],
            consumed_transfers: vec![([1u8; 32], 1)],
            mainchain_transfers: vec![],
            data_domains: vec![],
            tax: 0,
            vote_tally: VoteTally::default(),
        }
    }

    #[test]
    fn test_lookup_errors() {
        let history = MemoryHistory::new();
        assert_eq!(
            history.notebook_key_details(1, 1),
            Err(AccountHistoryLookupError::RootNotFound)
        );
        assert_eq!(
            history.last_change(1, &[1u8; 32], AccountType::Deposit),
            Err(AccountHistoryLookupError::LastChangeNotFound)
        );
        assert_eq!(
            history.transfer_to_localchain(&[1u8; 32], 1),
            Err(AccountHistoryLookupError::InvalidTransferToLocalchain)
        );
        assert_eq!(
            history.block_seal_spec(&[0u8; 32]),
            Err(AccountHistoryLookupError::BlockSpecificationNotFound)
        );
    }

    #[test]
    fn test_latest_notebook_is_per_notary() {
        let mut history = MemoryHistory::new();
        history.insert_notebook(1, details(1));
        history.insert_notebook(1, details(2));
        history.insert_notebook(2, details(7));
        assert_eq!(history.latest_notebook(1).map(|d| d.notebook_number), Some(2));
        assert_eq!(history.latest_notebook(2).map(|d| d.notebook_number), Some(7));
        assert!(history.latest_notebook(3).is_none());
    }

    #[test]
    fn test_commit_records_tips_and_consumption() {
        let mut history = MemoryHistory::new();
        history.insert_transfer(transfer());
        history.commit(&effects());

        let last = history.last_change(1, &[1u8; 32], AccountType::Deposit).unwrap();
        assert_eq!(last.change_number, 1);
        assert_eq!(last.notebook_number, 1);
        assert_eq!(
            history.transfer_to_localchain(&[1u8; 32], 1).unwrap().consumed_in,
            Some(1)
        );
    }

    #[test]
    fn test_pending_overlay_leaves_base_untouched() {
        let mut base = MemoryHistory::new();
        base.insert_transfer(transfer());

        let mut pending = PendingHistory::new(&base);
        pending.admit(&effects());
        assert_eq!(
            pending.transfer_to_localchain(&[1u8; 32], 1).unwrap().consumed_in,
            Some(1)
        );
        assert!(pending.last_change(1, &[1u8; 32], AccountType::Deposit).is_ok());

        assert_eq!(
            base.transfer_to_localchain(&[1u8; 32], 1).unwrap().consumed_in,
            None
        );
        assert!(base.last_change(1, &[1u8; 32], AccountType::Deposit).is_err());
    }

    fn domain(name: &str) -> DataDomain {
        DataDomain::new(name, DataTLD::Shopping)
    }

    #[test]
    fn test_commit_keeps_existing_domain_owner() {
        let mut history = MemoryHistory::new();
        history.register_data_domain(domain("superstore"), [1u8; 32]);

        let mut effects = effects();
        effects.data_domains = vec![
            (domain("superstore"), [2u8; 32]),
            (domain("corner"), [2u8; 32]),
        ];
        history.commit(&effects);

        assert_eq!(history.data_domain_owner(&domain("superstore")), Some([1u8; 32]));
        assert_eq!(history.data_domain_owner(&domain("corner")), Some([2u8; 32]));
    }

    #[test]
    fn test_commit_drops_domain_leased_twice_in_notebook() {
        let mut history = MemoryHistory::new();
        let mut effects = effects();
        effects.data_domains = vec![
            (domain("superstore"), [1u8; 32]),
            (domain("superstore"), [2u8; 32]),
            (DataDomain::new("superstore", DataTLD::Travel), [2u8; 32]),
        ];
        history.commit(&effects);

        assert_eq!(history.data_domain_owner(&domain("superstore")), None);
        assert_eq!(
            history.data_domain_owner(&DataDomain::new("superstore", DataTLD::Travel)),
            Some([2u8; 32])
        );
    }

    #[test]
    fn test_pending_admit_keeps_base_domain_owner() {
        let mut base = MemoryHistory::new();
        base.register_data_domain(domain("superstore"), [1u8; 32]);

        let mut pending = PendingHistory::new(&base);
        let mut effects = effects();
        effects.data_domains = vec![(domain("superstore"), [2u8; 32])];
        pending.admit(&effects);

        assert_eq!(pending.data_domain_owner(&domain("superstore")), Some([1u8; 32]));
    }
}
