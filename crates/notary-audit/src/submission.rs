//! Batch submission of notebooks by notaries.
//!
//! A submission is checked for sequencing first, which can refuse the whole
//! batch. Each notebook is then audited in batch order against the committed
//! snapshot plus everything admitted earlier in the batch. A notebook that
//! fails its audit is recorded with its first failure and not admitted.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::{AuditContext, NotebookAuditor, NotebookEffects};
use crate::config::AuditConfig;
use crate::error::VerifyError;
use crate::history::{AccountHistoryLookup, MemoryHistory, PendingHistory};
use crate::proof::verify_signature;
use crate::types::{
    AccountId, NotaryId, NotebookKeyDetails, NotebookNumber, SignedNotebookHeader, Tick,
};

/// One entry of a submit call: the signed header and the encoded notebook.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct NotebookSubmission {
    pub header: SignedNotebookHeader,
    /// Borsh encoding of the full notebook.
    pub notebook: Vec<u8>,
}

/// Chain state a submission is checked against.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmissionContext {
    /// Active notaries and their public keys.
    pub notaries: BTreeMap<NotaryId, AccountId>,
    pub oldest_accepted_tick: Tick,
}

/// Terminal outcome of one submitted notebook.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum NotebookEvent {
    NotebookSubmitted {
        notary_id: NotaryId,
        notebook_number: NotebookNumber,
    },
    NotebookAuditFailure {
        notary_id: NotaryId,
        notebook_number: NotebookNumber,
        first_failure_reason: VerifyError,
    },
}

/// Per-notebook record kept by the chain, successful or not.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct NotebookDigestRecord {
    pub notary_id: NotaryId,
    pub notebook_number: NotebookNumber,
    pub tick: Tick,
    pub audit_first_failure: Option<VerifyError>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmissionOutcome {
    /// One event per notebook, in batch order.
    pub events: Vec<NotebookEvent>,
    pub digests: Vec<NotebookDigestRecord>,
    /// Every sequenced notebook, including failed ones.
    pub notebooks: Vec<(NotaryId, NotebookKeyDetails)>,
    /// Effects of the notebooks that passed their audit.
    pub admitted: Vec<NotebookEffects>,
}

impl SubmissionOutcome {
    /// Commit the outcome into an in-memory snapshot.
    pub fn commit_to(&self, history: &mut MemoryHistory) {
        for (notary_id, details) in &self.notebooks {
            history.insert_notebook(*notary_id, details.clone());
        }
        for effects in &self.admitted {
            history.commit(effects);
        }
    }
}

/// Reasons the whole submit call is refused.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("Notary {notary_id} is not active")]
    NotAnActiveNotary { notary_id: NotaryId },

    #[error("Invalid header signature on notebook {notebook_number} of notary {notary_id}")]
    InvalidNotebookSignature {
        notary_id: NotaryId,
        notebook_number: NotebookNumber,
    },

    #[error("Notebook {notebook_number} of notary {notary_id} was already submitted")]
    DuplicateNotebookNumber {
        notary_id: NotaryId,
        notebook_number: NotebookNumber,
    },

    #[error("Notebook {notebook_number} of notary {notary_id} skips an earlier notebook")]
    MissingNotebookNumber {
        notary_id: NotaryId,
        notebook_number: NotebookNumber,
    },

    #[error("Tick {tick} was already used by notary {notary_id}")]
    NotebookTickAlreadyUsed { notary_id: NotaryId, tick: Tick },
}

/// Process a batch of notebook submissions.
pub fn submit<L: AccountHistoryLookup + ?Sized>(
    batch: &[NotebookSubmission],
    context: &SubmissionContext,
    lookup: &L,
    config: &AuditConfig,
) -> Result<SubmissionOutcome, SubmissionError> {
    let mut pending = PendingHistory::new(lookup);
    let mut outcome = SubmissionOutcome::default();

    for submission in batch {
        let header = &submission.header.header;
        let notary_id = header.notary_id;
        let notebook_number = header.notebook_number;

        let notary_public_key = *context
            .notaries
            .get(&notary_id)
            .ok_or(SubmissionError::NotAnActiveNotary { notary_id })?;

        let header_hash = header.hash();
        if !verify_signature(&notary_public_key, &header_hash, &submission.header.signature) {
            return Err(SubmissionError::InvalidNotebookSignature {
                notary_id,
                notebook_number,
            });
        }

        let latest = pending.latest_notebook(notary_id);
        let expected = latest.as_ref().map_or(1, |last| last.notebook_number.saturating_add(1));
        if notebook_number < expected {
            return Err(SubmissionError::DuplicateNotebookNumber {
                notary_id,
                notebook_number,
            });
        }
        if notebook_number > expected {
            return Err(SubmissionError::MissingNotebookNumber {
                notary_id,
                notebook_number,
            });
        }
        if latest.is_some_and(|last| header.tick <= last.tick) {
            return Err(SubmissionError::NotebookTickAlreadyUsed {
                notary_id,
                tick: header.tick,
            });
        }

        let audit_context = AuditContext {
            notary_public_key,
            header_hash,
            oldest_accepted_tick: context.oldest_accepted_tick,
        };
        let result = NotebookAuditor::new(&pending, config)
            .audit_encoded(&submission.notebook, &audit_context);

        pending.record_notebook(notary_id, header.key_details());
        outcome.notebooks.push((notary_id, header.key_details()));

        let audit_first_failure = match result {
            Ok(effects) => {
                info!(notary_id, notebook_number, tick = header.tick, "notebook admitted");
                pending.admit(&effects);
                outcome.events.push(NotebookEvent::NotebookSubmitted {
                    notary_id,
                    notebook_number,
                });
                outcome.admitted.push(effects);
                None
            }
            Err(reason) => {
                warn!(notary_id, notebook_number, error = %reason, "notebook rejected");
                outcome.events.push(NotebookEvent::NotebookAuditFailure {
                    notary_id,
                    notebook_number,
                    first_failure_reason: reason.clone(),
                });
                Some(reason)
            }
        };

        outcome.digests.push(NotebookDigestRecord {
            notary_id,
            notebook_number,
            tick: header.tick,
            audit_first_failure,
        });
    }

    Ok(outcome)
}
