//! In-memory stand-in for the remote directory, recording every call so
//! tests can assert on when the wire is hit, not just on results.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use dirfed_proto::v1::{OperationError, User};

use crate::connector::UserDirectory;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DirectoryCall {
    GetById(String),
    GetByUsername(String),
    GetByEmail(String),
    Count,
    List,
    Search(String),
    SearchByParams(BTreeMap<String, String>),
    Create {
        external_id: String,
        is_manual_set_up: bool,
    },
    Update {
        external_id: String,
        is_manual_set_up: bool,
    },
    Remove(String),
    VerifyPassword(String),
    IsConfiguredPassword(String),
}

pub(crate) struct RecordingDirectory {
    users: RefCell<BTreeMap<String, User>>,
    calls: RefCell<Vec<DirectoryCall>>,
    pub(crate) fail_writes: Cell<bool>,
    pub(crate) users_count: Cell<Option<u32>>,
}

impl RecordingDirectory {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(RecordingDirectory {
            users: RefCell::new(BTreeMap::new()),
            calls: RefCell::new(Vec::new()),
            fail_writes: Cell::new(false),
            users_count: Cell::new(Some(0)),
        })
    }

    pub(crate) fn with_user(user: User) -> Rc<Self> {
        let directory = Self::new();
        directory
            .users
            .borrow_mut()
            .insert(user.id.clone(), user);
        directory.users_count.set(Some(1));
        directory
    }

    pub(crate) fn calls(&self) -> Vec<DirectoryCall> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: DirectoryCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl UserDirectory for RecordingDirectory {
    fn get_user_by_external_id(
        &self,
        _realm_id: &str,
        external_id: &str,
    ) -> Result<Option<User>, OperationError> {
        self.record(DirectoryCall::GetById(external_id.to_string()));
        Ok(self.users.borrow().get(external_id).cloned())
    }

    fn get_user_by_username(
        &self,
        _realm_id: &str,
        username: &str,
    ) -> Result<Option<User>, OperationError> {
        self.record(DirectoryCall::GetByUsername(username.to_string()));
        Ok(self
            .users
            .borrow()
            .values()
            .find(|u| u.username.as_deref() == Some(username))
            .cloned())
    }

    fn get_user_by_email(
        &self,
        _realm_id: &str,
        email: &str,
    ) -> Result<Option<User>, OperationError> {
        self.record(DirectoryCall::GetByEmail(email.to_string()));
        Ok(self
            .users
            .borrow()
            .values()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    fn get_users_count(&self, _realm_id: &str) -> Result<Option<u32>, OperationError> {
        self.record(DirectoryCall::Count);
        Ok(self.users_count.get())
    }

    fn get_users(
        &self,
        _realm_id: &str,
        _first_result: u32,
        _max_results: u32,
    ) -> Result<Vec<User>, OperationError> {
        self.record(DirectoryCall::List);
        Ok(self.users.borrow().values().cloned().collect())
    }

    fn search_for_user(
        &self,
        _realm_id: &str,
        search: &str,
        _first_result: u32,
        _max_results: u32,
    ) -> Result<Vec<User>, OperationError> {
        self.record(DirectoryCall::Search(search.to_string()));
        Ok(self
            .users
            .borrow()
            .values()
            .filter(|u| {
                u.username
                    .as_deref()
                    .map(|n| n.contains(search))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    fn search_for_user_by_params(
        &self,
        _realm_id: &str,
        params: &BTreeMap<String, String>,
        _first_result: u32,
        _max_results: u32,
    ) -> Result<Vec<User>, OperationError> {
        self.record(DirectoryCall::SearchByParams(params.clone()));
        Ok(self
            .users
            .borrow()
            .values()
            .filter(|u| {
                params.iter().all(|(name, value)| {
                    u.username.as_deref() == Some(value.as_str())
                        || u.attribute(name).iter().any(|v| v == value)
                })
            })
            .cloned()
            .collect())
    }

    fn create_user(
        &self,
        _realm_id: &str,
        user: &User,
        is_manual_set_up: bool,
    ) -> Result<User, OperationError> {
        self.record(DirectoryCall::Create {
            external_id: user.id.clone(),
            is_manual_set_up,
        });
        if self.fail_writes.get() {
            return Err(OperationError::Remote("write rejected".to_string()));
        }
        self.users.borrow_mut().insert(user.id.clone(), user.clone());
        Ok(user.clone())
    }

    fn update_user(
        &self,
        _realm_id: &str,
        user: &User,
        is_manual_set_up: bool,
    ) -> Result<(), OperationError> {
        self.record(DirectoryCall::Update {
            external_id: user.id.clone(),
            is_manual_set_up,
        });
        if self.fail_writes.get() {
            return Err(OperationError::Remote("write rejected".to_string()));
        }
        self.users.borrow_mut().insert(user.id.clone(), user.clone());
        Ok(())
    }

    fn remove_user_by_external_id(
        &self,
        _realm_id: &str,
        external_id: &str,
    ) -> Result<bool, OperationError> {
        self.record(DirectoryCall::Remove(external_id.to_string()));
        Ok(self.users.borrow_mut().remove(external_id).is_some())
    }

    fn verify_password(
        &self,
        _realm_id: &str,
        external_id: &str,
        raw_password: &str,
    ) -> Result<bool, OperationError> {
        self.record(DirectoryCall::VerifyPassword(external_id.to_string()));
        Ok(self
            .users
            .borrow()
            .get(external_id)
            .map(|u| u.password.as_deref() == Some(raw_password))
            .unwrap_or(false))
    }

    fn is_configured_password(
        &self,
        _realm_id: &str,
        external_id: &str,
    ) -> Result<Option<bool>, OperationError> {
        self.record(DirectoryCall::IsConfiguredPassword(external_id.to_string()));
        Ok(Some(
            self.users
                .borrow()
                .get(external_id)
                .map(|u| u.password.is_some())
                .unwrap_or(false),
        ))
    }
}
