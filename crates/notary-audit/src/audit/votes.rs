use std::collections::{BTreeMap, BTreeSet};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::AuditConfig;
use crate::error::VerifyError;
use crate::history::AccountHistoryLookup;
use crate::proof::{merkle_root, verify_signature};
use crate::types::{AccountId, Balance, BlockVote, MiningAuthority, Notebook, NotaryId, H256};

/// Best vote for one block and the miner it routes the seal to.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct SealWinner {
    pub block_hash: H256,
    pub account_id: AccountId,
    pub vote_index: u32,
    pub seal_nonce: H256,
    pub closest_miner: MiningAuthority,
}

/// Aggregate of a notebook's accepted block votes.
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
pub struct VoteTally {
    pub block_votes_count: u32,
    pub block_voting_power: Balance,
    pub blocks_with_votes: Vec<H256>,
    pub block_votes_root: H256,
    /// One winner per voted block, ordered by block hash.
    pub winners: Vec<SealWinner>,
}

/// Check every block vote and reproduce the header's vote aggregates.
///
/// `vote_funds` holds the `SendToVote` totals of each notarization, in order.
pub fn tally_block_votes<L: AccountHistoryLookup + ?Sized>(
    notebook: &Notebook,
    vote_funds: &[BTreeMap<AccountId, Balance>],
    lookup: &L,
    config: &AuditConfig,
) -> Result<VoteTally, VerifyError> {
    let header = &notebook.header;
    let empty = BTreeMap::new();
    let mut voters = BTreeSet::new();
    let mut leaves = Vec::new();
    let mut power: Balance = 0;

    for (index, notarization) in notebook.notarizations.iter().enumerate() {
        let mut required: BTreeMap<AccountId, Balance> = BTreeMap::new();
        for vote in &notarization.block_votes {
            check_vote(vote, lookup)?;
            if !voters.insert((vote.account_id, vote.index)) {
                return Err(VerifyError::InvalidBlockVoteList);
            }

            let tax = vote
                .power
                .checked_mul(config.block_vote_tax_ratio)
                .ok_or(VerifyError::InsufficientBlockVoteTax)?;
            let entry = required.entry(vote.account_id).or_default();
            *entry = entry
                .checked_add(tax)
                .ok_or(VerifyError::InsufficientBlockVoteTax)?;
            power = power
                .checked_add(vote.power)
                .ok_or(VerifyError::InvalidBlockVotingPower)?;
            leaves.push(vote.leaf_hash());
        }

        let funds = vote_funds.get(index).unwrap_or(&empty);
        for (account_id, needed) in &required {
            if funds.get(account_id).copied().unwrap_or(0) < *needed {
                return Err(VerifyError::InsufficientBlockVoteTax);
            }
        }
        for (account_id, sent) in funds {
            if required.get(account_id).copied().unwrap_or(0) != *sent {
                return Err(VerifyError::InvalidBlockVoteAllocation);
            }
        }
    }

    if header.block_votes_count as usize != leaves.len() {
        return Err(VerifyError::InvalidBlockVotesCount);
    }
    if header.block_voting_power != power {
        return Err(VerifyError::InvalidBlockVotingPower);
    }

    let blocks_with_votes: Vec<H256> = notebook
        .block_votes()
        .map(|vote| vote.block_hash)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if header.blocks_with_votes != blocks_with_votes {
        return Err(VerifyError::InvalidBlockVoteList);
    }

    let block_votes_root = merkle_root(&leaves);
    if header.block_votes_root != block_votes_root {
        return Err(VerifyError::InvalidBlockVoteRoot);
    }

    let winners = select_seal_winners(notebook, header.notary_id, &lookup.mining_authorities())?;

    Ok(VoteTally {
        block_votes_count: header.block_votes_count,
        block_voting_power: power,
        blocks_with_votes,
        block_votes_root,
        winners,
    })
}

fn check_vote<L: AccountHistoryLookup + ?Sized>(
    vote: &BlockVote,
    lookup: &L,
) -> Result<(), VerifyError> {
    if !verify_signature(&vote.account_id, &vote.signing_hash(), &vote.signature) {
        return Err(VerifyError::BlockVoteInvalidSignature);
    }

    let owner = lookup
        .data_domain_owner(&vote.data_domain)
        .ok_or(VerifyError::UnregisteredDataDomain)?;
    if owner != vote.data_domain_account {
        return Err(VerifyError::InvalidDataDomainAccount);
    }

    let spec = lookup.block_seal_spec(&vote.block_hash)?;
    if vote.power < spec.vote_minimum {
        return Err(VerifyError::InsufficientBlockVoteMinimum);
    }

    trace!(index = vote.index, power = vote.power, "block vote accepted");
    Ok(())
}

/// Pick the lowest seal nonce per voted block and route it to the closest miner.
pub fn select_seal_winners(
    notebook: &Notebook,
    notary_id: NotaryId,
    authorities: &[MiningAuthority],
) -> Result<Vec<SealWinner>, VerifyError> {
    let mut best: BTreeMap<H256, (H256, &BlockVote)> = BTreeMap::new();
    for vote in notebook.block_votes() {
        let nonce = vote.seal_nonce(notary_id);
        let replace = best
            .get(&vote.block_hash)
            .map_or(true, |(current, _)| nonce < *current);
        if replace {
            best.insert(vote.block_hash, (nonce, vote));
        }
    }

    best.into_iter()
        .map(|(block_hash, (seal_nonce, vote))| {
            let closest_miner = closest_miner(&seal_nonce, authorities)
                .ok_or(VerifyError::NoClosestMinerFoundForVote)?;
            Ok(SealWinner {
                block_hash,
                account_id: vote.account_id,
                vote_index: vote.index,
                seal_nonce,
                closest_miner,
            })
        })
        .collect()
}

/// Authority with the smallest XOR distance to the nonce; ties go to the lower index.
pub fn closest_miner(
    seal_nonce: &H256,
    authorities: &[MiningAuthority],
) -> Option<MiningAuthority> {
    authorities
        .iter()
        .min_by_key(|authority| (authority.xor_distance(seal_nonce), authority.authority_index))
        .cloned()
}
