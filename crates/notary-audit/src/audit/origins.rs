use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::error::VerifyError;
use crate::history::AccountHistoryLookup;
use crate::types::{AccountKey, AccountOrigin, Notebook};

/// Origin of every account the notebook touches, keyed by account.
pub type ResolvedOrigins = BTreeMap<AccountKey, AccountOrigin>;

/// Resolve and cross-check the account origins of a notebook.
///
/// Accounts with a previous balance proof keep the origin their history
/// records. Accounts without one are new and take the uid listed for them in
/// `new_account_origins`. The header must list exactly the resolved origins.
pub fn resolve_origins<L: AccountHistoryLookup + ?Sized>(
    notebook: &Notebook,
    lookup: &L,
) -> Result<ResolvedOrigins, VerifyError> {
    let header = &notebook.header;

    let mut uids = BTreeSet::new();
    let mut new_origins = BTreeMap::new();
    for origin in &notebook.new_account_origins {
        if !uids.insert(origin.account_uid) {
            return Err(VerifyError::DuplicatedAccountOriginUid);
        }
        let key = (origin.account_id, origin.account_type);
        if new_origins.insert(key, origin.account_uid).is_some() {
            return Err(VerifyError::InvalidAccountChangelist);
        }
    }

    let mut resolved = ResolvedOrigins::new();
    let mut used_new = BTreeSet::new();
    for change in notebook.balance_changes() {
        let key = change.key();
        if resolved.contains_key(&key) {
            continue;
        }

        let origin = match &change.previous_balance_proof {
            Some(proof) => {
                if new_origins.contains_key(&key) {
                    return Err(VerifyError::InvalidAccountChangelist);
                }
                let last =
                    lookup.last_change(header.notary_id, &change.account_id, change.account_type)?;
                if last.account_origin != proof.account_origin {
                    return Err(VerifyError::InvalidPreviousAccountOrigin);
                }
                proof.account_origin
            }
            None => {
                let uid = new_origins
                    .get(&key)
                    .copied()
                    .ok_or(VerifyError::MissingAccountOrigin {
                        account_id: change.account_id,
                        account_type: change.account_type,
                    })?;
                used_new.insert(key);
                AccountOrigin {
                    notebook_number: header.notebook_number,
                    account_uid: uid,
                }
            }
        };
        trace!(
            account_type = ?change.account_type,
            notebook_number = origin.notebook_number,
            account_uid = origin.account_uid,
            "resolved account origin"
        );
        resolved.insert(key, origin);
    }

    if used_new.len() != new_origins.len() {
        return Err(VerifyError::InvalidAccountChangelist);
    }

    let mut expected: Vec<AccountOrigin> = resolved.values().copied().collect();
    expected.sort();
    if header.changed_account_origins != expected {
        return Err(VerifyError::InvalidAccountChangelist);
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccountHistoryLookupError;
    use crate::history::MemoryHistory;
    use crate::test_support::*;
    use crate::types::{
        AccountLastChange, AccountType, BalanceProof, NewAccountOrigin, Note, NoteType,
    };

    fn claim_fixture() -> NotebookFixture {
        let mut fixture = NotebookFixture::new(1, 1);
        fixture.new_account_origins =
            vec![NewAccountOrigin::new(account(ALICE), AccountType::Deposit, 1)];
        fixture.notarizations = vec![notarization(vec![claim_from_mainchain(ALICE, 1_000, 1)])];
        fixture
    }

    #[test]
    fn test_new_account_gets_minted_origin() {
        let notebook = claim_fixture().build();
        let origins = resolve_origins(&notebook, &MemoryHistory::new()).unwrap();
        assert_eq!(
            origins.get(&(account(ALICE), AccountType::Deposit)),
            Some(&AccountOrigin {
                notebook_number: 1,
                account_uid: 1
            })
        );
    }

    #[test]
    fn test_missing_origin() {
        let mut notebook = claim_fixture().build();
        notebook.new_account_origins.clear();
        assert_eq!(
            resolve_origins(&notebook, &MemoryHistory::new()),
            Err(VerifyError::MissingAccountOrigin {
                account_id: account(ALICE),
                account_type: AccountType::Deposit,
            })
        );
    }

    #[test]
    fn test_duplicate_uid() {
        let mut notebook = claim_fixture().build();
        notebook
            .new_account_origins
            .push(NewAccountOrigin::new(account(BOB), AccountType::Deposit, 1));
        assert_eq!(
            resolve_origins(&notebook, &MemoryHistory::new()),
            Err(VerifyError::DuplicatedAccountOriginUid)
        );
    }

    #[test]
    fn test_unused_origin_and_header_mismatch() {
        let mut notebook = claim_fixture().build();
        notebook
            .new_account_origins
            .push(NewAccountOrigin::new(account(BOB), AccountType::Deposit, 2));
        assert_eq!(
            resolve_origins(&notebook, &MemoryHistory::new()),
            Err(VerifyError::InvalidAccountChangelist)
        );

        let mut notebook = claim_fixture().build();
        notebook.header.changed_account_origins.push(AccountOrigin {
            notebook_number: 1,
            account_uid: 9,
        });
        assert_eq!(
            resolve_origins(&notebook, &MemoryHistory::new()),
            Err(VerifyError::InvalidAccountChangelist)
        );
    }

    #[test]
    fn test_existing_account_origin_must_match_history() {
        let mut history = MemoryHistory::new();
        history.insert_last_change(
            NOTARY_ID,
            account(ALICE),
            AccountType::Deposit,
            AccountLastChange {
                notebook_number: 1,
                change_number: 1,
                balance: 1_000,
                account_origin: AccountOrigin {
                    notebook_number: 1,
                    account_uid: 1,
                },
            },
        );

        let proof = BalanceProof {
            notary_id: NOTARY_ID,
            notebook_number: 1,
            tick: 1,
            notebook_proof: None,
            account_origin: AccountOrigin {
                notebook_number: 1,
                account_uid: 2,
            },
            balance: 1_000,
        };
        let change = signed_change(
            ALICE,
            AccountType::Deposit,
            2,
            1_000,
            Some(proof),
            vec![Note::create(0, NoteType::Claim)],
        );
        let mut fixture = NotebookFixture::new(2, 2);
        fixture.notarizations = vec![notarization(vec![change])];
        let notebook = fixture.build();
        assert_eq!(
            resolve_origins(&notebook, &history),
            Err(VerifyError::InvalidPreviousAccountOrigin)
        );

        assert_eq!(
            resolve_origins(&notebook, &MemoryHistory::new()),
            Err(VerifyError::HistoryLookupError {
                source: AccountHistoryLookupError::LastChangeNotFound
            })
        );
    }
}
