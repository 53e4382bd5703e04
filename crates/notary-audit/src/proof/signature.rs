use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};

use crate::types::{AccountId, Signature, H256};

/// Verify an ed25519 signature by `signer` over a 32-byte hash.
///
/// An account id that is not a valid curve point simply fails verification.
pub fn verify_signature(signer: &AccountId, message: &H256, signature: &Signature) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(signer) else {
        return false;
    };
    let signature = ed25519_dalek::Signature::from_bytes(&signature.0);
    key.verify(message, &signature).is_ok()
}

/// Sign a 32-byte hash.
pub fn sign_hash(key: &SigningKey, message: &H256) -> Signature {
    Signature(key.sign(message).to_bytes())
}

/// The account id of a signing key.
pub fn account_id(key: &SigningKey) -> AccountId {
    key.verifying_key().to_bytes()
}
