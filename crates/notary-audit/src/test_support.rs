//! Deterministic keys and notebook fixtures for tests.

use std::collections::BTreeMap;

use ed25519_dalek::SigningKey;

use crate::audit::AuditContext;
use crate::history::MemoryHistory;
use crate::proof::merkle::{merkle_proof, merkle_root};
use crate::proof::{account_id, sign_hash};
use crate::types::*;

pub const ALICE: u8 = 1;
pub const BOB: u8 = 2;
pub const CAROL: u8 = 3;
pub const NOTARY: u8 = 100;
pub const NOTARY_ID: NotaryId = 1;

pub fn key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

pub fn account(seed: u8) -> AccountId {
    account_id(&key(seed))
}

pub fn secret_for(notebook_number: NotebookNumber) -> H256 {
    [notebook_number as u8; 32]
}

pub fn notarization(balance_changes: Vec<BalanceChange>) -> Notarization {
    Notarization {
        balance_changes,
        ..Default::default()
    }
}

pub fn sign_change(seed: u8, mut change: BalanceChange) -> BalanceChange {
    change.signature = sign_hash(&key(seed), &change.signing_hash());
    change
}

pub fn signed_change(
    seed: u8,
    account_type: AccountType,
    change_number: Nonce,
    balance: Balance,
    previous_balance_proof: Option<BalanceProof>,
    notes: Vec<Note>,
) -> BalanceChange {
    sign_change(
        seed,
        BalanceChange {
            account_id: account(seed),
            account_type,
            change_number,
            balance,
            previous_balance_proof,
            channel_hold_note: None,
            notes,
            signature: Signature::EMPTY,
        },
    )
}

/// First change of a new deposit account, funded from the base chain.
pub fn claim_from_mainchain(seed: u8, amount: Balance, account_nonce: Nonce) -> BalanceChange {
    signed_change(
        seed,
        AccountType::Deposit,
        1,
        amount,
        None,
        vec![Note::create(amount, NoteType::ClaimFromMainchain { account_nonce })],
    )
}

pub fn default_domain() -> DataDomain {
    DataDomain::new("superstore", DataTLD::Shopping)
}

pub fn signed_vote(seed: u8, block_hash: H256, index: u32, power: Balance) -> BlockVote {
    let mut vote = BlockVote {
        account_id: account(seed),
        block_hash,
        index,
        power,
        data_domain: default_domain(),
        data_domain_account: account(CAROL),
        signature: Signature::EMPTY,
    };
    vote.signature = sign_hash(&key(seed), &vote.signing_hash());
    vote
}

pub fn transfer(
    seed: u8,
    account_nonce: Nonce,
    amount: Balance,
    expiration_block: BlockNumber,
) -> TransferToLocalchainRecord {
    TransferToLocalchainRecord {
        account_id: account(seed),
        account_nonce,
        amount,
        notary_id: NOTARY_ID,
        expiration_block,
        consumed_in: None,
    }
}

/// Builds a notebook whose header commitments match its contents.
#[derive(Clone, Debug)]
pub struct NotebookFixture {
    pub notebook_number: NotebookNumber,
    pub tick: Tick,
    pub finalized_block_number: BlockNumber,
    pub notarizations: Vec<Notarization>,
    pub new_account_origins: Vec<NewAccountOrigin>,
    pub secret: H256,
    pub parent_secret: Option<H256>,
}

impl NotebookFixture {
    pub fn new(notebook_number: NotebookNumber, tick: Tick) -> Self {
        Self {
            notebook_number,
            tick,
            finalized_block_number: 1,
            notarizations: vec![],
            new_account_origins: vec![],
            secret: secret_for(notebook_number),
            parent_secret: (notebook_number > 1).then(|| secret_for(notebook_number - 1)),
        }
    }

    fn from_notebook(notebook: &Notebook) -> Self {
        Self {
            notebook_number: notebook.header.notebook_number,
            tick: notebook.header.tick,
            finalized_block_number: notebook.header.finalized_block_number,
            notarizations: notebook.notarizations.clone(),
            new_account_origins: notebook.new_account_origins.clone(),
            secret: [0u8; 32],
            parent_secret: notebook.header.parent_secret,
        }
    }

    pub fn build(&self) -> Notebook {
        let tips = self.tips();
        let leaves: Vec<H256> = tips.values().map(BalanceTip::leaf_hash).collect();

        let mut origins: Vec<AccountOrigin> = tips.values().map(|tip| tip.account_origin).collect();
        origins.sort();
        origins.dedup();

        let changes = self.notarizations.iter().flat_map(|n| n.balance_changes.iter());
        let mut chain_transfers = vec![];
        let mut tax = 0;
        for change in changes {
            for note in &change.notes {
                match note.note_type {
                    NoteType::ClaimFromMainchain { account_nonce } => {
                        chain_transfers.push(ChainTransfer::ToLocalchain {
                            account_id: change.account_id,
                            account_nonce,
                        })
                    }
                    NoteType::SendToMainchain => chain_transfers.push(ChainTransfer::ToMainchain {
                        account_id: change.account_id,
                        amount: note.milligons,
                    }),
                    NoteType::Tax | NoteType::LeaseDomain => tax += note.milligons,
                    _ => {}
                }
            }
        }

        let votes: Vec<&BlockVote> =
            self.notarizations.iter().flat_map(|n| n.block_votes.iter()).collect();
        let mut blocks_with_votes: Vec<H256> = votes.iter().map(|v| v.block_hash).collect();
        blocks_with_votes.sort();
        blocks_with_votes.dedup();
        let vote_leaves: Vec<H256> = votes.iter().map(|v| v.leaf_hash()).collect();

        let header = NotebookHeader {
            version: NOTEBOOK_VERSION,
            notebook_number: self.notebook_number,
            tick: self.tick,
            finalized_block_number: self.finalized_block_number,
            tax,
            notary_id: NOTARY_ID,
            chain_transfers,
            changed_accounts_root: merkle_root(&leaves),
            changed_account_origins: origins,
            block_votes_root: merkle_root(&vote_leaves),
            block_votes_count: votes.len() as u32,
            blocks_with_votes,
            block_voting_power: votes.iter().map(|v| v.power).sum(),
            secret_hash: secret_hash(&self.secret),
            parent_secret: self.parent_secret,
            data_domains: self
                .notarizations
                .iter()
                .flat_map(|n| n.data_domains.iter().cloned())
                .collect(),
        };

        let mut notebook = Notebook {
            header,
            notarizations: self.notarizations.clone(),
            new_account_origins: self.new_account_origins.clone(),
            hash: [0u8; 32],
            signature: Signature::EMPTY,
        };
        reseal(&mut notebook);
        notebook
    }

    fn tips(&self) -> BTreeMap<AccountKey, BalanceTip> {
        let mut tips = BTreeMap::new();
        for change in self.notarizations.iter().flat_map(|n| n.balance_changes.iter()) {
            let account_origin = match &change.previous_balance_proof {
                Some(proof) => proof.account_origin,
                None => self
                    .new_account_origins
                    .iter()
                    .find(|o| {
                        o.account_id == change.account_id && o.account_type == change.account_type
                    })
                    .map(|o| AccountOrigin {
                        notebook_number: self.notebook_number,
                        account_uid: o.account_uid,
                    })
                    .unwrap_or(AccountOrigin {
                        notebook_number: 0,
                        account_uid: 0,
                    }),
            };
            let mut hold = change.channel_hold_note.clone();
            for note in &change.notes {
                match note.note_type {
                    NoteType::ChannelHold { .. } => hold = Some(note.clone()),
                    NoteType::ChannelHoldSettle => hold = None,
                    _ => {}
                }
            }
            tips.insert(
                change.key(),
                BalanceTip {
                    account_id: change.account_id,
                    account_type: change.account_type,
                    change_number: change.change_number,
                    balance: change.balance,
                    account_origin,
                    channel_hold_note: hold,
                },
            );
        }
        tips
    }
}

/// Recompute the notebook hash and notary signature after a mutation.
pub fn reseal(notebook: &mut Notebook) {
    notebook.hash = notebook.compute_hash();
    notebook.signature = sign_hash(&key(NOTARY), &notebook.hash);
}

pub fn context(notebook: &Notebook) -> AuditContext {
    AuditContext {
        notary_public_key: account(NOTARY),
        header_hash: notebook.header.hash(),
        oldest_accepted_tick: 0,
    }
}

/// Proof of an account's tip in a built notebook.
pub fn balance_proof(notebook: &Notebook, seed: u8, account_type: AccountType) -> BalanceProof {
    let tips = NotebookFixture::from_notebook(notebook).tips();
    let key = (account(seed), account_type);
    let index = tips.keys().position(|k| *k == key).unwrap();
    let leaves: Vec<H256> = tips.values().map(BalanceTip::leaf_hash).collect();
    let tip = &tips[&key];
    BalanceProof {
        notary_id: NOTARY_ID,
        notebook_number: notebook.header.notebook_number,
        tick: notebook.header.tick,
        notebook_proof: merkle_proof(&leaves, index),
        account_origin: tip.account_origin,
        balance: tip.balance,
    }
}

/// Record a notebook and its tips as admitted, without auditing it.
pub fn record_in_history(history: &mut MemoryHistory, notebook: &Notebook) {
    history.insert_notebook(NOTARY_ID, notebook.header.key_details());
    for tip in NotebookFixture::from_notebook(notebook).tips().into_values() {
        history.insert_last_change(
            NOTARY_ID,
            tip.account_id,
            tip.account_type,
            AccountLastChange {
                notebook_number: notebook.header.notebook_number,
                change_number: tip.change_number,
                balance: tip.balance,
                account_origin: tip.account_origin,
            },
        );
    }
}
