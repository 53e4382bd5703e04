pub mod balance;
pub mod domain;
pub mod keys;
pub mod notebook;
pub mod vote;

pub use balance::*;
pub use domain::*;
pub use keys::*;
pub use notebook::*;
pub use vote::*;

/// A 32-byte hash (sha256 unless stated otherwise).
pub type H256 = [u8; 32];

/// An ed25519 public key identifying a ledger account.
pub type AccountId = [u8; 32];

pub type NotaryId = u32;
pub type NotebookNumber = u32;
pub type Tick = u32;
pub type BlockNumber = u32;

/// Per-account change counter. Strictly increases by one per balance change.
pub type Nonce = u32;

/// Balance in milligons.
pub type Balance = u128;

/// The only notebook wire version this engine understands.
pub const NOTEBOOK_VERSION: u16 = 1;

/// Canonical borsh encoding.
pub fn encode<T: borsh::BorshSerialize>(value: &T) -> Vec<u8> {
    let mut out = Vec::new();
    // Writing into a Vec never fails.
    let _ = borsh::BorshSerialize::serialize(value, &mut out);
    out
}
