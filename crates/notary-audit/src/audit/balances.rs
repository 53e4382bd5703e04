use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use super::origins::ResolvedOrigins;
use crate::config::AuditConfig;
use crate::error::{AccountHistoryLookupError, VerifyError};
use crate::history::AccountHistoryLookup;
use crate::proof::{verify_merkle_proof, verify_signature};
use crate::types::{
    AccountId, AccountKey, AccountOrigin, AccountType, Balance, BalanceChange, BalanceTip,
    ChainTransfer, Notarization, Note, NoteType, Notebook, NotebookHeader, Nonce, Tick,
};

/// A chain transfer implied by a note, with the amount the note moved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerivedTransfer {
    pub transfer: ChainTransfer,
    pub amount: Balance,
}

/// What the balance phase hands to the later phases.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BalanceOutcome {
    /// Final tip of every changed account.
    pub tips: BTreeMap<AccountKey, BalanceTip>,
    /// Chain transfers in note order.
    pub chain_transfers: Vec<DerivedTransfer>,
    /// Tax and domain lease fees collected.
    pub tax: Balance,
    /// `SendToVote` totals per tax account, one map per notarization.
    pub vote_funds: Vec<BTreeMap<AccountId, Balance>>,
}

/// Validate every balance change of a notebook in order.
pub fn validate_balance_changes<L: AccountHistoryLookup + ?Sized>(
    notebook: &Notebook,
    origins: &ResolvedOrigins,
    lookup: &L,
    config: &AuditConfig,
) -> Result<BalanceOutcome, VerifyError> {
    let mut validator = BalanceValidator {
        header: &notebook.header,
        origins,
        lookup,
        config,
        hold_ticks: BTreeMap::new(),
        outcome: BalanceOutcome::default(),
    };

    let mut change_index = 0u32;
    for notarization in &notebook.notarizations {
        validator.notarization(notarization, &mut change_index)?;
    }
    Ok(validator.outcome)
}

struct BalanceValidator<'a, L: ?Sized> {
    header: &'a NotebookHeader,
    origins: &'a ResolvedOrigins,
    lookup: &'a L,
    config: &'a AuditConfig,
    /// Tick each active hold was placed at.
    hold_ticks: BTreeMap<AccountKey, Tick>,
    outcome: BalanceOutcome,
}

/// The tip an account changes from.
struct PriorState {
    balance: Balance,
    origin: AccountOrigin,
    hold: Option<Note>,
    hold_tick: Tick,
}

#[derive(Default)]
struct NotarizationTotals {
    sent: Balance,
    claimed: Balance,
    tax_sent: Balance,
    tax_claimed: Balance,
    restricted_recipients: Option<BTreeSet<AccountId>>,
    deposit_claimers: BTreeSet<AccountId>,
    settle_recipients: BTreeSet<AccountId>,
    hold_claimers: BTreeSet<AccountId>,
    lease_notes: usize,
    vote_funds: BTreeMap<AccountId, Balance>,
}

enum Flow {
    Credit,
    Debit,
    Hold,
}

fn flow(note_type: &NoteType) -> Flow {
    match note_type {
        NoteType::Claim | NoteType::ClaimFromMainchain { .. } | NoteType::ChannelHoldClaim => {
            Flow::Credit
        }
        NoteType::ChannelHold { .. } => Flow::Hold,
        NoteType::SendToMainchain
        | NoteType::Send { .. }
        | NoteType::LeaseDomain
        | NoteType::Tax
        | NoteType::SendToVote
        | NoteType::ChannelHoldSettle => Flow::Debit,
    }
}

/// Tax accounts may only claim tax and spend it on votes.
fn check_account_type(account_type: AccountType, note_type: &NoteType) -> Result<(), VerifyError> {
    match (account_type, note_type) {
        (AccountType::Tax, NoteType::Tax) => Err(VerifyError::InvalidTaxNoteAccount),
        (AccountType::Tax, NoteType::Claim | NoteType::SendToVote) => Ok(()),
        (AccountType::Tax, NoteType::ClaimFromMainchain { .. } | NoteType::SendToMainchain) => {
            Err(VerifyError::InvalidBalanceChange)
        }
        (AccountType::Tax, _) => Err(VerifyError::InvalidTaxOperation),
        (AccountType::Deposit, NoteType::SendToVote) => Err(VerifyError::InvalidTaxOperation),
        (AccountType::Deposit, _) => Ok(()),
    }
}

/// `prior + credits - debits` as a signed balance.
fn calculate_balance(
    prior: Balance,
    notes: &[Note],
    change_index: u32,
) -> Result<i128, VerifyError> {
    let overflow = |amount: Balance, note_index: usize| VerifyError::ExceededMaxBalance {
        balance: prior,
        amount,
        note_index: note_index as u32,
        change_index,
    };

    let mut balance = i128::try_from(prior).map_err(|_| overflow(0, 0))?;
    for (note_index, note) in notes.iter().enumerate() {
        let amount =
            i128::try_from(note.milligons).map_err(|_| overflow(note.milligons, note_index))?;
        let next = match flow(&note.note_type) {
            Flow::Credit => balance.checked_add(amount),
            Flow::Debit => balance.checked_sub(amount),
            Flow::Hold => Some(balance),
        };
        balance = next.ok_or_else(|| overflow(note.milligons, note_index))?;
    }
    Ok(balance)
}

impl<L: AccountHistoryLookup + ?Sized> BalanceValidator<'_, L> {
    fn notarization(
        &mut self,
        notarization: &Notarization,
        change_index: &mut u32,
    ) -> Result<(), VerifyError> {
        if notarization.balance_changes.is_empty() {
            return Err(VerifyError::InvalidNetBalanceChangeset);
        }

        let mut totals = NotarizationTotals::default();
        for change in &notarization.balance_changes {
            self.change(change, *change_index, &mut totals)?;
            *change_index += 1;
        }

        if totals.sent != totals.claimed {
            return Err(VerifyError::BalanceChangeNotNetZero {
                sent: totals.sent,
                claimed: totals.claimed,
            });
        }
        if totals.tax_sent != totals.tax_claimed {
            return Err(VerifyError::TaxBalanceChangeNotNetZero {
                sent: totals.tax_sent,
                claimed: totals.tax_claimed,
            });
        }
        if let Some(allowed) = &totals.restricted_recipients {
            if !totals.deposit_claimers.is_subset(allowed) {
                return Err(VerifyError::InvalidNoteRecipients);
            }
        }
        if !totals.hold_claimers.is_subset(&totals.settle_recipients) {
            return Err(VerifyError::InvalidChannelClaimers);
        }
        if totals.lease_notes != notarization.data_domains.len() {
            return Err(VerifyError::InvalidDomainLeaseAllocation);
        }
        if notarization
            .data_domains
            .iter()
            .any(|(domain, _)| !domain.is_valid_name())
        {
            return Err(VerifyError::InvalidDomainName);
        }

        self.outcome.vote_funds.push(totals.vote_funds);
        Ok(())
    }

    fn change(
        &mut self,
        change: &BalanceChange,
        change_index: u32,
        totals: &mut NotarizationTotals,
    ) -> Result<(), VerifyError> {
        let key = change.key();
        let prior = self.prior_state(change)?;

        if change.notes.is_empty() {
            return Err(VerifyError::InvalidBalanceChange);
        }

        let calculated = calculate_balance(prior.balance, &change.notes, change_index)?;
        if i128::try_from(change.balance).ok() != Some(calculated) {
            return Err(VerifyError::BalanceChangeMismatch {
                change_index,
                provided_balance: change.balance,
                calculated_balance: calculated,
            });
        }

        if !verify_signature(&change.account_id, &change.signing_hash(), &change.signature) {
            return Err(VerifyError::InvalidBalanceChangeSignature { change_index });
        }

        let mut running = prior.balance;
        let mut hold = prior.hold;
        let mut hold_tick = prior.hold_tick;
        let mut tax_owed: Balance = 0;
        let mut tax_sent: Balance = 0;

        for (index, note) in change.notes.iter().enumerate() {
            let note_index = index as u32;
            let amount = note.milligons;
            check_account_type(change.account_type, &note.note_type)?;

            let insufficient = |balance: Balance| VerifyError::InsufficientBalance {
                balance,
                amount,
                note_index,
                change_index,
            };

            if let NoteType::ChannelHold { .. } = note.note_type {
                if hold.is_some() {
                    return Err(VerifyError::AccountAlreadyHasChannelHold);
                }
                if amount < self.config.minimum_channel_hold {
                    return Err(VerifyError::ChannelNoteBelowMinimum);
                }
                if amount > running {
                    return Err(insufficient(running));
                }
                hold = Some(note.clone());
                hold_tick = self.header.tick;
                continue;
            }

            if hold.is_some() && note.note_type != NoteType::ChannelHoldSettle {
                return Err(VerifyError::AccountLocked);
            }

            running = match flow(&note.note_type) {
                Flow::Credit => running
                    .checked_add(amount)
                    .filter(|balance| *balance <= self.config.max_balance)
                    .ok_or(VerifyError::ExceededMaxBalance {
                        balance: running,
                        amount,
                        note_index,
                        change_index,
                    })?,
                Flow::Debit => running.checked_sub(amount).ok_or_else(|| insufficient(running))?,
                Flow::Hold => running,
            };

            match &note.note_type {
                NoteType::Claim => match change.account_type {
                    AccountType::Deposit => {
                        totals.claimed = totals.claimed.saturating_add(amount);
                        totals.deposit_claimers.insert(change.account_id);
                        tax_owed = tax_owed.saturating_add(self.config.transfer_tax(amount));
                    }
                    AccountType::Tax => {
                        totals.tax_claimed = totals.tax_claimed.saturating_add(amount);
                    }
                },
                NoteType::ClaimFromMainchain { account_nonce } => {
                    self.outcome.chain_transfers.push(DerivedTransfer {
                        transfer: ChainTransfer::ToLocalchain {
                            account_id: change.account_id,
                            account_nonce: *account_nonce,
                        },
                        amount,
                    });
                }
                NoteType::ChannelHoldClaim => {
                    totals.claimed = totals.claimed.saturating_add(amount);
                    totals.hold_claimers.insert(change.account_id);
                    tax_owed = tax_owed.saturating_add(self.config.transfer_tax(amount));
                }
                NoteType::Send { to } => {
                    totals.sent = totals.sent.saturating_add(amount);
                    if let Some(to) = to {
                        totals
                            .restricted_recipients
                            .get_or_insert_with(BTreeSet::new)
                            .extend(to.iter().copied());
                    }
                }
                NoteType::SendToMainchain => {
                    self.outcome.chain_transfers.push(DerivedTransfer {
                        transfer: ChainTransfer::ToMainchain {
                            account_id: change.account_id,
                            amount,
                        },
                        amount,
                    });
                }
                NoteType::LeaseDomain => {
                    if amount != self.config.data_domain_lease_cost {
                        return Err(VerifyError::InvalidDomainLeaseAllocation);
                    }
                    totals.lease_notes += 1;
                    self.outcome.tax = self.outcome.tax.saturating_add(amount);
                }
                NoteType::Tax => {
                    tax_sent = tax_sent.saturating_add(amount);
                    totals.tax_sent = totals.tax_sent.saturating_add(amount);
                    self.outcome.tax = self.outcome.tax.saturating_add(amount);
                }
                NoteType::SendToVote => {
                    let funds = totals.vote_funds.entry(change.account_id).or_default();
                    *funds = funds.saturating_add(amount);
                }
                NoteType::ChannelHoldSettle => {
                    let Some(held) = hold.take() else {
                        return Err(VerifyError::AccountChannelHoldDoesntExist);
                    };
                    let matures_at =
                        hold_tick.saturating_add(self.config.channel_hold_expiration_ticks);
                    if self.header.tick < matures_at {
                        return Err(VerifyError::ChannelHoldNotReadyForClaim);
                    }
                    if amount > held.milligons {
                        return Err(VerifyError::InvalidChannelHoldNote);
                    }
                    if let NoteType::ChannelHold { recipient } = held.note_type {
                        totals.settle_recipients.insert(recipient);
                    }
                    totals.sent = totals.sent.saturating_add(amount);
                }
                NoteType::ChannelHold { .. } => {}
            }
        }

        if change.account_type == AccountType::Deposit && tax_sent < tax_owed {
            return Err(VerifyError::InsufficientTaxIncluded {
                tax_sent,
                tax_owed,
                account_id: change.account_id,
            });
        }

        trace!(
            change_index,
            change_number = change.change_number,
            balance = change.balance,
            "balance change verified"
        );

        match hold {
            Some(_) => self.hold_ticks.insert(key, hold_tick),
            None => self.hold_ticks.remove(&key),
        };
        self.outcome.tips.insert(
            key,
            BalanceTip {
                account_id: change.account_id,
                account_type: change.account_type,
                change_number: change.change_number,
                balance: change.balance,
                account_origin: prior.origin,
                channel_hold_note: hold,
            },
        );
        Ok(())
    }

    /// Resolve the tip a change builds on: earlier in this notebook, then
    /// history, else a brand new account.
    fn prior_state(&self, change: &BalanceChange) -> Result<PriorState, VerifyError> {
        let key = change.key();
        let origin = self
            .origins
            .get(&key)
            .copied()
            .ok_or(VerifyError::MissingAccountOrigin {
                account_id: change.account_id,
                account_type: change.account_type,
            })?;

        if let Some(tip) = self.outcome.tips.get(&key) {
            check_nonce(change, Some(tip.change_number))?;
            let proof = change
                .previous_balance_proof
                .as_ref()
                .ok_or(VerifyError::MissingBalanceProof)?;
            if proof.notebook_number != self.header.notebook_number {
                return Err(VerifyError::InvalidPreviousBalanceChangeNotebook);
            }
            if proof.notary_id != self.header.notary_id
                || proof.tick != self.header.tick
                || proof.notebook_proof.is_some()
            {
                return Err(VerifyError::InvalidPreviousBalanceProof);
            }
            if proof.balance != tip.balance {
                return Err(VerifyError::InvalidPreviousBalance);
            }
            if proof.account_origin != tip.account_origin {
                return Err(VerifyError::InvalidPreviousAccountOrigin);
            }
            if change.channel_hold_note != tip.channel_hold_note {
                return Err(VerifyError::InvalidChannelHoldNote);
            }
            return Ok(PriorState {
                balance: tip.balance,
                origin,
                hold: tip.channel_hold_note.clone(),
                hold_tick: self.hold_ticks.get(&key).copied().unwrap_or(self.header.tick),
            });
        }

        match self
            .lookup
            .last_change(self.header.notary_id, &change.account_id, change.account_type)
        {
            Ok(last) => {
                check_nonce(change, Some(last.change_number))?;
                let proof = change
                    .previous_balance_proof
                    .as_ref()
                    .ok_or(VerifyError::MissingBalanceProof)?;
                if proof.notebook_number != last.notebook_number {
                    return Err(VerifyError::InvalidPreviousBalanceChangeNotebook);
                }
                if proof.balance != last.balance {
                    return Err(VerifyError::InvalidPreviousBalance);
                }
                if proof.account_origin != last.account_origin {
                    return Err(VerifyError::InvalidPreviousAccountOrigin);
                }
                if proof.notary_id != self.header.notary_id {
                    return Err(VerifyError::InvalidPreviousBalanceProof);
                }

                let details = self
                    .lookup
                    .notebook_key_details(self.header.notary_id, proof.notebook_number)?;
                let merkle = proof
                    .notebook_proof
                    .as_ref()
                    .ok_or(VerifyError::InvalidPreviousBalanceProof)?;
                let previous_tip = BalanceTip {
                    account_id: change.account_id,
                    account_type: change.account_type,
                    change_number: last.change_number,
                    balance: proof.balance,
                    account_origin: proof.account_origin,
                    channel_hold_note: change.channel_hold_note.clone(),
                };
                if proof.tick != details.tick
                    || !verify_merkle_proof(
                        &details.changed_accounts_root,
                        &previous_tip.leaf_hash(),
                        merkle,
                    )
                {
                    return Err(VerifyError::InvalidPreviousBalanceProof);
                }

                Ok(PriorState {
                    balance: last.balance,
                    origin,
                    hold: change.channel_hold_note.clone(),
                    hold_tick: proof.tick,
                })
            }
            Err(AccountHistoryLookupError::LastChangeNotFound) => {
                check_nonce(change, None)?;
                if change.previous_balance_proof.is_some() {
                    return Err(VerifyError::InvalidPreviousBalanceProof);
                }
                if change.channel_hold_note.is_some() {
                    return Err(VerifyError::InvalidChannelHoldNote);
                }
                Ok(PriorState {
                    balance: 0,
                    origin,
                    hold: None,
                    hold_tick: self.header.tick,
                })
            }
            Err(source) => Err(source.into()),
        }
    }
}

/// A change must be exactly one past the previous nonce; new accounts start at 1.
fn check_nonce(change: &BalanceChange, previous: Option<Nonce>) -> Result<(), VerifyError> {
    let expected = previous.unwrap_or(0).checked_add(1);
    if expected != Some(change.change_number) {
        return Err(VerifyError::InvalidPreviousNonce);
    }
    Ok(())
}
