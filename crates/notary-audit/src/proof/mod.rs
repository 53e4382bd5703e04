pub mod merkle;
pub mod signature;

pub use merkle::{keccak256, leaf_hash, merkle_proof, merkle_root, sha256_hash, verify_merkle_proof};
pub use signature::{account_id, sign_hash, verify_signature};
