//! # Notary Audit
//!
//! Notebook audit engine for notary-run balance ledgers.
//!
//! Notaries batch off-chain balance changes into notebooks. Before a
//! notebook's effects reach the base chain, every notebook passes through
//! this crate. The audit is a pure function of the notebook bytes, a
//! read-only snapshot of chain state and the chain constants in
//! [`AuditConfig`]. It holds no state of its own and stops at the first
//! fault it finds.
//!
//! ## Trust Model
//!
//! - **Notaries are semi-trusted.** Their signature proves who built a
//!   notebook, never that it is correct. Every balance, nonce, proof,
//!   transfer and vote is recomputed from the notebook contents.
//!
//! - **Account signatures** (`proof` module): each balance change and block
//!   vote carries an ed25519 signature by its account over a domain-separated
//!   hash of its canonical encoding.
//!
//! - **Account history** (`history` module): previous balances are trusted
//!   only through a merkle proof against a changed-accounts root the chain
//!   already admitted.
//!
//! ## Usage
//!
//! ```ignore
//! use notary_audit::{AuditConfig, MemoryHistory, NotebookAuditor};
//!
//! let auditor = NotebookAuditor::new(&history, &config);
//! let effects = auditor.audit_encoded(&bytes, &context)?;
//! history.commit(&effects);
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod history;
pub mod proof;
pub mod submission;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export commonly used types for convenience
pub use audit::{
    decode_notebook, AuditContext, AuditResult, NotebookAuditor, NotebookEffects, SealWinner,
    VoteTally,
};
pub use config::{AuditConfig, ConfigError};
pub use error::{AccountHistoryLookupError, VerifyError};
pub use history::{AccountHistoryLookup, MemoryHistory, PendingHistory};
pub use proof::{merkle_proof, merkle_root, verify_merkle_proof, verify_signature};
pub use submission::{
    submit, NotebookDigestRecord, NotebookEvent, NotebookSubmission, SubmissionContext,
    SubmissionError, SubmissionOutcome,
};
pub use types::*;
