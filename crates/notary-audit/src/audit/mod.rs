//! Notebook audit pipeline.
//!
//! Phases run in a fixed order and stop at the first fault:
//! origins, balance changes, chain transfers, block votes, then the global
//! header checks. The whole pipeline is a pure function of the notebook and
//! the lookup snapshot.

pub mod balances;
pub mod origins;
pub mod transfers;
pub mod votes;

use tracing::{debug, warn};

use crate::config::AuditConfig;
use crate::error::VerifyError;
use crate::history::AccountHistoryLookup;
use crate::proof::{merkle_root, verify_signature};
use crate::types::{
    secret_hash, AccountId, Balance, BalanceTip, DataDomain, NotaryId, Notebook,
    NotebookKeyDetails, Nonce, Tick, H256, NOTEBOOK_VERSION,
};

pub use balances::{validate_balance_changes, BalanceOutcome, DerivedTransfer};
pub use origins::{resolve_origins, ResolvedOrigins};
pub use transfers::{reconcile_chain_transfers, TransferOutcome};
pub use votes::{closest_miner, select_seal_winners, tally_block_votes, SealWinner, VoteTally};

/// A successful audit is `Ok(())`; failures carry only the first fault.
pub type AuditResult = Result<(), VerifyError>;

/// Chain facts about the submitting notary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditContext {
    pub notary_public_key: AccountId,
    /// Hash of the header the notary signed on submission.
    pub header_hash: H256,
    /// Notebooks with an older tick are rejected.
    pub oldest_accepted_tick: Tick,
}

/// State changes the admitting chain applies for an audited notebook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotebookEffects {
    pub notary_id: NotaryId,
    pub key_details: NotebookKeyDetails,
    /// Final tips, sorted by account.
    pub tips: Vec<BalanceTip>,
    pub consumed_transfers: Vec<(AccountId, Nonce)>,
    pub mainchain_transfers: Vec<(AccountId, Balance)>,
    pub data_domains: Vec<(DataDomain, AccountId)>,
    pub tax: Balance,
    pub vote_tally: VoteTally,
}

/// Decode a notebook from its wire encoding.
pub fn decode_notebook(bytes: &[u8]) -> Result<Notebook, VerifyError> {
    let notebook: Notebook =
        borsh::from_slice(bytes).map_err(|_| VerifyError::CouldNotDecodeNotebook)?;
    if notebook.header.version != NOTEBOOK_VERSION {
        return Err(VerifyError::DecodeError);
    }
    Ok(notebook)
}

/// Audits notebooks against one lookup snapshot.
pub struct NotebookAuditor<'a, L: AccountHistoryLookup + ?Sized> {
    lookup: &'a L,
    config: &'a AuditConfig,
}

impl<'a, L: AccountHistoryLookup + ?Sized> NotebookAuditor<'a, L> {
    pub fn new(lookup: &'a L, config: &'a AuditConfig) -> Self {
        Self { lookup, config }
    }

    pub fn audit(&self, notebook: &Notebook, context: &AuditContext) -> AuditResult {
        self.audit_notebook(notebook, context).map(|_| ())
    }

    /// Decode then audit.
    pub fn audit_encoded(
        &self,
        bytes: &[u8],
        context: &AuditContext,
    ) -> Result<NotebookEffects, VerifyError> {
        let notebook = decode_notebook(bytes)?;
        self.audit_notebook(&notebook, context)
    }

    /// Run every phase and return the effects of the notebook.
    pub fn audit_notebook(
        &self,
        notebook: &Notebook,
        context: &AuditContext,
    ) -> Result<NotebookEffects, VerifyError> {
        let header = &notebook.header;
        debug!(
            notary_id = header.notary_id,
            notebook_number = header.notebook_number,
            tick = header.tick,
            "auditing notebook"
        );

        let result = self.run_phases(notebook, context);
        if let Err(err) = &result {
            warn!(
                notary_id = header.notary_id,
                notebook_number = header.notebook_number,
                error = %err,
                "notebook audit failed"
            );
        }
        result
    }

    fn run_phases(
        &self,
        notebook: &Notebook,
        context: &AuditContext,
    ) -> Result<NotebookEffects, VerifyError> {
        let header = &notebook.header;
        if header.version != NOTEBOOK_VERSION {
            return Err(VerifyError::DecodeError);
        }

        let origins = resolve_origins(notebook, self.lookup)?;
        debug!(accounts = origins.len(), "account origins verified");

        let balances = validate_balance_changes(notebook, &origins, self.lookup, self.config)?;
        debug!(tips = balances.tips.len(), "balance changes verified");

        let transfers =
            reconcile_chain_transfers(header, &balances.chain_transfers, self.lookup, self.config)?;
        debug!(
            consumed = transfers.consumed.len(),
            to_mainchain = transfers.to_mainchain.len(),
            "chain transfers verified"
        );

        let vote_tally =
            tally_block_votes(notebook, &balances.vote_funds, self.lookup, self.config)?;
        debug!(votes = vote_tally.block_votes_count, "block votes verified");

        let declared_domains: Vec<&(DataDomain, AccountId)> = notebook
            .notarizations
            .iter()
            .flat_map(|n| n.data_domains.iter())
            .collect();
        if header.data_domains.len() != declared_domains.len()
            || header.data_domains.iter().zip(&declared_domains).any(|(a, b)| a != *b)
        {
            return Err(VerifyError::InvalidDomainLeaseAllocation);
        }

        if header.tax != balances.tax {
            return Err(VerifyError::InvalidHeaderTaxRecorded);
        }

        let tips: Vec<BalanceTip> = balances.tips.into_values().collect();
        let leaves: Vec<H256> = tips.iter().map(BalanceTip::leaf_hash).collect();
        if merkle_root(&leaves) != header.changed_accounts_root {
            return Err(VerifyError::InvalidBalanceChangeRoot);
        }

        if notebook.compute_hash() != notebook.hash {
            return Err(VerifyError::InvalidNotebookHash);
        }
        if header.hash() != context.header_hash {
            return Err(VerifyError::InvalidNotebookHeaderHash);
        }
        if !verify_signature(&context.notary_public_key, &notebook.hash, &notebook.signature) {
            return Err(VerifyError::InvalidNotarySignature);
        }

        self.check_secret(notebook)?;

        if header.tick < context.oldest_accepted_tick {
            return Err(VerifyError::NotebookTooOld);
        }

        Ok(NotebookEffects {
            notary_id: header.notary_id,
            key_details: header.key_details(),
            tips,
            consumed_transfers: transfers.consumed,
            mainchain_transfers: transfers.to_mainchain,
            data_domains: header.data_domains.clone(),
            tax: balances.tax,
            vote_tally,
        })
    }

    /// The first notebook reveals nothing; every later one reveals the secret
    /// its parent committed to.
    fn check_secret(&self, notebook: &Notebook) -> Result<(), VerifyError> {
        let header = &notebook.header;
        if header.notebook_number <= 1 {
            return match header.parent_secret {
                None => Ok(()),
                Some(_) => Err(VerifyError::InvalidSecretProvided),
            };
        }

        let parent = self
            .lookup
            .notebook_key_details(header.notary_id, header.notebook_number - 1)?;
        match header.parent_secret {
            Some(secret) if secret_hash(&secret) == parent.secret_hash => Ok(()),
            _ => Err(VerifyError::InvalidSecretProvided),
        }
    }
}
