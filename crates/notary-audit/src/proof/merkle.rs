use borsh::BorshSerialize;
use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

use crate::types::{MerkleProof, H256};

/// Prefix byte of a leaf hash (tree version 1).
const LEAF_PREFIX: u8 = 0x00;
/// Prefix byte of an inner node hash (tree version 1).
const NODE_PREFIX: u8 = 0x01;

/// Root of a tree with no leaves.
pub const EMPTY_ROOT: H256 = [0u8; 32];

/// Compute the root of a binary merkle tree over already-hashed leaves.
///
/// Nodes are combined pairwise left to right. The last node of an odd-width
/// level is promoted to the next level unchanged.
pub fn merkle_root(leaves: &[H256]) -> H256 {
    if leaves.is_empty() {
        return EMPTY_ROOT;
    }

    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

/// Build the inclusion proof for the leaf at `index`, or `None` if out of range.
pub fn merkle_proof(leaves: &[H256], index: usize) -> Option<MerkleProof> {
    if index >= leaves.len() {
        return None;
    }

    let mut proof = Vec::new();
    let mut level = leaves.to_vec();
    let mut position = index;
    while level.len() > 1 {
        let sibling = position ^ 1;
        if sibling < level.len() {
            proof.push(level[sibling]);
        }
        level = next_level(&level);
        position /= 2;
    }

    Some(MerkleProof {
        proof,
        number_of_leaves: leaves.len() as u32,
        leaf_index: index as u32,
    })
}

/// Verify that `leaf` is included under `root`.
///
/// Fails closed on any malformed proof: an index outside the tree, a proof
/// that runs out before the root, or elements left over once it is reached.
pub fn verify_merkle_proof(root: &H256, leaf: &H256, proof: &MerkleProof) -> bool {
    let mut width = proof.number_of_leaves as u64;
    let mut position = proof.leaf_index as u64;
    if position >= width {
        return false;
    }

    let mut siblings = proof.proof.iter();
    let mut current = *leaf;
    while width > 1 {
        let promoted = position == width - 1 && width % 2 == 1;
        if !promoted {
            let Some(sibling) = siblings.next() else {
                return false;
            };
            current = if position % 2 == 0 {
                node_hash(&current, sibling)
            } else {
                node_hash(sibling, &current)
            };
        }
        position /= 2;
        width = width.div_ceil(2);
    }

    siblings.next().is_none() && current == *root
}

/// Hash of a tree leaf: `sha256(0x00 || borsh(value))`.
pub fn leaf_hash<T: BorshSerialize>(value: &T) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    write_encoded(&mut hasher, value);
    finalize(hasher)
}

/// Hash of an inner node: `sha256(0x01 || left || right)`.
pub fn node_hash(left: &H256, right: &H256) -> H256 {
    let mut data = [0u8; 65];
    data[0] = NODE_PREFIX;
    data[1..33].copy_from_slice(left);
    data[33..].copy_from_slice(right);
    sha256_hash(&data)
}

/// `sha256(domain || borsh(value))`, used for signing payloads and commitments.
pub fn hash_with_domain<T: BorshSerialize>(domain: &[u8], value: &T) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    write_encoded(&mut hasher, value);
    finalize(hasher)
}

/// SHA256 hash of arbitrary data.
pub fn sha256_hash(data: &[u8]) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    finalize(hasher)
}

/// Compute keccak256 hash of data.
pub fn keccak256(data: &[u8]) -> H256 {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

fn next_level(level: &[H256]) -> Vec<H256> {
    level
        .chunks(2)
        .map(|pair| match pair.get(1) {
            Some(right) => node_hash(&pair[0], right),
            None => pair[0],
        })
        .collect()
}

fn write_encoded<T: BorshSerialize>(hasher: &mut Sha256, value: &T) {
    // Writing into a hasher never fails.
    let _ = BorshSerialize::serialize(value, hasher);
}

fn finalize(hasher: Sha256) -> H256 {
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}
