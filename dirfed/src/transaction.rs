//! Deferred remote writes. Each delegate owns exactly one transaction; a
//! transaction is enlisted with the unit of work the first time its delegate
//! really changes, and performs at most one remote write at completion.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use dirfed_proto::v1::OperationError;

use crate::connector::UserDirectory;
use crate::delegate::TxAwareUserDelegate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    NotStarted,
    Enlisted,
    Committed,
    RolledBack,
}

/// A callback registered on the unit of work for execution after the host's
/// primary work completes.
pub trait Transaction {
    fn commit(&self) -> Result<(), OperationError>;
    fn rollback(&self);
}

pub struct UserTransaction {
    connector: Rc<dyn UserDirectory>,
    delegate: Weak<TxAwareUserDelegate>,
    state: Cell<TransactionState>,
    enlisted: Cell<bool>,
}

impl UserTransaction {
    pub(crate) fn new(
        connector: Rc<dyn UserDirectory>,
        delegate: Weak<TxAwareUserDelegate>,
    ) -> Self {
        UserTransaction {
            connector,
            delegate,
            state: Cell::new(TransactionState::NotStarted),
            enlisted: Cell::new(false),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state.get()
    }

    pub fn is_enlisted(&self) -> bool {
        self.enlisted.get()
    }

    pub(crate) fn mark_enlisted(&self) {
        self.state.set(TransactionState::Enlisted);
        self.enlisted.set(true);
    }
}

impl Transaction for UserTransaction {
    /// Flush the delegate's record: create if it never reached the remote
    /// store, otherwise replace it wholesale. A failure here is fatal for
    /// the unit of work.
    fn commit(&self) -> Result<(), OperationError> {
        let delegate = self.delegate.upgrade().ok_or_else(|| {
            OperationError::InvalidRequestState("delegate dropped before commit".to_string())
        })?;

        let model = delegate.model();
        if delegate.is_not_persisted() {
            // The created record echoed back by the service is discarded -
            // the locally generated id is already authoritative.
            self.connector
                .create_user(delegate.realm_id(), &model, delegate.is_admin_tool())?;
            delegate.set_persisted(true);
        } else {
            self.connector
                .update_user(delegate.realm_id(), &model, delegate.is_admin_tool())?;
        }
        self.state.set(TransactionState::Committed);
        Ok(())
    }

    fn rollback(&self) {
        // All mutation so far happened in memory only. Nothing to undo.
        self.state.set(TransactionState::RolledBack);
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use dirfed_proto::v1::{OperationError, User};

    use crate::delegate::TxAwareUserDelegate;
    use crate::session::Session;
    use crate::testkit::{DirectoryCall, RecordingDirectory};
    use crate::transaction::{Transaction, TransactionState};

    fn existing_user(id: &str, username: &str) -> User {
        let mut user = User::new(id);
        user.username = Some(username.to_string());
        user.enabled = true;
        user
    }

    #[test]
    fn test_commit_creates_then_flips_persisted() {
        let directory = RecordingDirectory::new();
        let session = Session::new("/realms/wonderland/account");

        let delegate = TxAwareUserDelegate::create_for_new_user(
            &session,
            "wonderland",
            "hoard",
            existing_user("u-1", "alice"),
            directory.clone(),
        );
        delegate.set_email(Some("alice@example.com"));

        assert!(delegate.is_not_persisted());
        session.commit().expect("commit failed");

        assert!(delegate.is_persisted());
        assert_eq!(delegate.transaction().state(), TransactionState::Committed);
        assert_eq!(
            directory.calls(),
            vec![DirectoryCall::Create {
                external_id: "u-1".to_string(),
                is_manual_set_up: false,
            }]
        );

        // A later unit of work flushing the same delegate goes down the
        // update path now that the record is persisted.
        delegate
            .transaction()
            .commit()
            .expect("second commit failed");
        assert_eq!(
            directory.calls(),
            vec![
                DirectoryCall::Create {
                    external_id: "u-1".to_string(),
                    is_manual_set_up: false,
                },
                DirectoryCall::Update {
                    external_id: "u-1".to_string(),
                    is_manual_set_up: false,
                },
            ]
        );
    }

    #[test]
    fn test_commit_of_existing_user_updates() {
        let directory = RecordingDirectory::with_user(existing_user("u-2", "bob"));
        let session = Session::new("/realms/wonderland/account");

        let delegate = TxAwareUserDelegate::create_for_existing_user(
            &session,
            "wonderland",
            "hoard",
            existing_user("u-2", "bob"),
            directory.clone(),
        );
        delegate.set_last_name(Some("Builder"));

        session.commit().expect("commit failed");
        assert_eq!(
            directory.calls(),
            vec![DirectoryCall::Update {
                external_id: "u-2".to_string(),
                is_manual_set_up: false,
            }]
        );
    }

    #[test]
    fn test_admin_request_sets_manual_flag() {
        let directory = RecordingDirectory::new();
        let session = Session::new("/admin/realms/wonderland/users");

        let delegate = TxAwareUserDelegate::create_for_new_user(
            &session,
            "wonderland",
            "hoard",
            existing_user("u-3", "carol"),
            directory.clone(),
        );
        delegate.set_enabled(true);

        session.commit().expect("commit failed");
        assert_eq!(
            directory.calls(),
            vec![DirectoryCall::Create {
                external_id: "u-3".to_string(),
                is_manual_set_up: true,
            }]
        );
    }

    #[test]
    fn test_rollback_issues_no_remote_write() {
        let directory = RecordingDirectory::new();
        let session = Session::new("/realms/wonderland/account");

        let delegate = TxAwareUserDelegate::create_for_new_user(
            &session,
            "wonderland",
            "hoard",
            existing_user("u-4", "dave"),
            directory.clone(),
        );
        delegate.set_email(Some("dave@example.com"));
        assert_eq!(session.enlisted_count(), 1);

        session.rollback();

        assert!(directory.calls().is_empty());
        assert!(delegate.is_not_persisted());
        assert_eq!(delegate.transaction().state(), TransactionState::RolledBack);
    }

    #[test]
    fn test_failed_create_is_fatal_for_the_unit_of_work() {
        let directory = RecordingDirectory::new();
        directory.fail_writes.set(true);
        let session = Session::new("/realms/wonderland/account");

        let delegate = TxAwareUserDelegate::create_for_new_user(
            &session,
            "wonderland",
            "hoard",
            existing_user("u-5", "eve"),
            directory.clone(),
        );
        delegate.set_enabled(true);

        let result = session.commit();
        assert_eq!(result, Err(OperationError::Remote(String::new())));
        assert!(delegate.is_not_persisted());
    }

    #[test]
    fn test_commit_without_delegate_is_invalid() {
        let directory = RecordingDirectory::new();
        let session = Session::new("/realms/wonderland/account");

        let delegate = TxAwareUserDelegate::create_for_new_user(
            &session,
            "wonderland",
            "hoard",
            existing_user("u-6", "frank"),
            directory.clone(),
        );
        delegate.set_enabled(true);
        session.commit().expect("commit failed");

        // Re-running the transaction after its delegate is gone cannot
        // produce a record to flush.
        let tx: Rc<dyn Transaction> = delegate.transaction().clone();
        drop(delegate);
        drop(session);

        assert_eq!(
            tx.commit(),
            Err(OperationError::InvalidRequestState(String::new()))
        );
    }
}
