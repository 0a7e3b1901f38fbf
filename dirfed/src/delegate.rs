//! Dirty-tracking view over a remote user record. Reads are served from the
//! in-memory snapshot; the first genuine write enlists the delegate's
//! transaction with the unit of work so the record is flushed exactly once
//! at completion.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use dirfed_proto::v1::{OperationError, User, MASKED_PASSWORD};

use crate::connector::UserDirectory;
use crate::session::Session;
use crate::storage_id;
use crate::transaction::{TransactionState, UserTransaction};

const GROUPS_AND_ROLES_ARE_NOT_SUPPORTED: &str =
    "groups and roles are owned by the host and are not federated";

pub struct TxAwareUserDelegate {
    session: Weak<Session>,
    realm_id: String,
    storage_id: String,
    model: RefCell<User>,
    persisted: Cell<bool>,
    tx: Rc<UserTransaction>,
}

impl TxAwareUserDelegate {
    fn new(
        session: &Rc<Session>,
        realm_id: &str,
        provider_id: &str,
        model: User,
        connector: Rc<dyn UserDirectory>,
        persisted: bool,
    ) -> Rc<Self> {
        let session = Rc::downgrade(session);
        Rc::new_cyclic(|weak_self| TxAwareUserDelegate {
            session,
            realm_id: realm_id.to_string(),
            storage_id: storage_id::format(provider_id, model.id.as_str()),
            tx: Rc::new(UserTransaction::new(connector, weak_self.clone())),
            model: RefCell::new(model),
            persisted: Cell::new(persisted),
        })
    }

    /// Wrap a record that does not yet exist in the remote store. The first
    /// flush will create it.
    pub fn create_for_new_user(
        session: &Rc<Session>,
        realm_id: &str,
        provider_id: &str,
        model: User,
        connector: Rc<dyn UserDirectory>,
    ) -> Rc<Self> {
        Self::new(session, realm_id, provider_id, model, connector, false)
    }

    /// Wrap a record fetched from the remote store. A flush replaces it.
    pub fn create_for_existing_user(
        session: &Rc<Session>,
        realm_id: &str,
        provider_id: &str,
        model: User,
        connector: Rc<dyn UserDirectory>,
    ) -> Rc<Self> {
        Self::new(session, realm_id, provider_id, model, connector, true)
    }

    /// The composite id the host knows this user by.
    pub fn id(&self) -> String {
        self.storage_id.clone()
    }

    /// The id the remote directory knows this user by.
    pub fn external_id(&self) -> String {
        self.model.borrow().id.clone()
    }

    pub fn realm_id(&self) -> &str {
        self.realm_id.as_str()
    }

    /// A snapshot of the current in-memory record.
    pub fn model(&self) -> User {
        self.model.borrow().clone()
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted.get()
    }

    pub fn is_not_persisted(&self) -> bool {
        !self.persisted.get()
    }

    pub(crate) fn set_persisted(&self, persisted: bool) {
        self.persisted.set(persisted);
    }

    pub fn transaction(&self) -> &Rc<UserTransaction> {
        &self.tx
    }

    pub fn is_admin_tool(&self) -> bool {
        self.session
            .upgrade()
            .map(|s| s.is_admin_request())
            .unwrap_or(false)
    }

    /// Register this delegate's transaction with the unit of work. Safe to
    /// call on every write; only the first call has any effect.
    fn ensure_transaction_enlisted(&self) {
        if self.tx.state() != TransactionState::NotStarted || self.tx.is_enlisted() {
            return;
        }
        match self.session.upgrade() {
            Some(session) => {
                session.enlist_after_completion(self.tx.clone());
                self.tx.mark_enlisted();
            }
            None => {
                warn!(
                    "unit of work for {} already gone, change will not be flushed",
                    self.storage_id
                );
            }
        }
    }

    pub fn username(&self) -> Option<String> {
        self.model.borrow().username.clone()
    }

    pub fn set_username(&self, username: &str) {
        if self.model.borrow().username.as_deref() == Some(username) {
            return;
        }
        trace!("set_username -> {}", username);
        self.model.borrow_mut().username = Some(username.to_string());
        self.ensure_transaction_enlisted();
    }

    pub fn email(&self) -> Option<String> {
        self.model.borrow().email.clone()
    }

    pub fn set_email(&self, email: Option<&str>) {
        if self.model.borrow().email.as_deref() == email {
            return;
        }
        trace!("set_email -> {:?}", email);
        self.model.borrow_mut().email = email.map(str::to_string);
        self.ensure_transaction_enlisted();
    }

    pub fn email_verified(&self) -> bool {
        self.model.borrow().email_verified
    }

    pub fn set_email_verified(&self, verified: bool) {
        if self.model.borrow().email_verified == verified {
            return;
        }
        trace!("set_email_verified -> {}", verified);
        self.model.borrow_mut().email_verified = verified;
        self.ensure_transaction_enlisted();
    }

    pub fn first_name(&self) -> Option<String> {
        self.model.borrow().first_name.clone()
    }

    pub fn set_first_name(&self, first_name: Option<&str>) {
        if self.model.borrow().first_name.as_deref() == first_name {
            return;
        }
        trace!("set_first_name -> {:?}", first_name);
        self.model.borrow_mut().first_name = first_name.map(str::to_string);
        self.ensure_transaction_enlisted();
    }

    pub fn last_name(&self) -> Option<String> {
        self.model.borrow().last_name.clone()
    }

    pub fn set_last_name(&self, last_name: Option<&str>) {
        if self.model.borrow().last_name.as_deref() == last_name {
            return;
        }
        trace!("set_last_name -> {:?}", last_name);
        self.model.borrow_mut().last_name = last_name.map(str::to_string);
        self.ensure_transaction_enlisted();
    }

    pub fn enabled(&self) -> bool {
        self.model.borrow().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        if self.model.borrow().enabled == enabled {
            return;
        }
        trace!("set_enabled -> {}", enabled);
        self.model.borrow_mut().enabled = enabled;
        self.ensure_transaction_enlisted();
    }

    pub fn created_timestamp(&self) -> Option<i64> {
        self.model.borrow().created_timestamp
    }

    pub fn set_created_timestamp(&self, timestamp: Option<i64>) {
        if self.model.borrow().created_timestamp == timestamp {
            return;
        }
        trace!("set_created_timestamp -> {:?}", timestamp);
        self.model.borrow_mut().created_timestamp = timestamp;
        self.ensure_transaction_enlisted();
    }

    pub fn first_attribute(&self, name: &str) -> Option<String> {
        self.model.borrow().first_attribute(name).map(str::to_string)
    }

    pub fn attribute(&self, name: &str) -> Vec<String> {
        self.model.borrow().attribute(name).to_vec()
    }

    pub fn attributes(&self) -> std::collections::BTreeMap<String, Vec<String>> {
        self.model.borrow().attributes.clone()
    }

    pub fn set_single_attribute(&self, name: &str, value: &str) {
        if self.model.borrow().first_attribute(name).as_deref() == Some(value) {
            return;
        }
        trace!("set_single_attribute {} -> {}", name, value);
        self.model.borrow_mut().set_single_attribute(name, value);
        self.ensure_transaction_enlisted();
    }

    pub fn set_attribute(&self, name: &str, values: Vec<String>) {
        if self.model.borrow().attribute(name) == values {
            return;
        }
        trace!("set_attribute {} -> {:?}", name, values);
        self.model.borrow_mut().set_attribute(name, values);
        self.ensure_transaction_enlisted();
    }

    /// Removal always counts as a change, present or not.
    pub fn remove_attribute(&self, name: &str) {
        trace!("remove_attribute {}", name);
        self.model.borrow_mut().remove_attribute(name);
        self.ensure_transaction_enlisted();
    }

    pub fn required_actions(&self) -> std::collections::BTreeSet<String> {
        self.model.borrow().required_actions.clone()
    }

    pub fn add_required_action(&self, action: &str) {
        let added = self.model.borrow_mut().add_required_action(action);
        if added {
            trace!("add_required_action {}", action);
            self.ensure_transaction_enlisted();
        }
    }

    pub fn remove_required_action(&self, action: &str) {
        let removed = self.model.borrow_mut().remove_required_action(action);
        if removed {
            trace!("remove_required_action {}", action);
            self.ensure_transaction_enlisted();
        }
    }

    pub fn set_password(&self, password: &str) {
        trace!("set_password -> {}", MASKED_PASSWORD);
        self.model.borrow_mut().password = Some(password.to_string());
        self.ensure_transaction_enlisted();
    }

    pub fn group_memberships(&self) -> Result<Vec<String>, OperationError> {
        Err(OperationError::Unsupported(
            GROUPS_AND_ROLES_ARE_NOT_SUPPORTED.to_string(),
        ))
    }

    pub fn groups_count(&self) -> Result<u32, OperationError> {
        Err(OperationError::Unsupported(
            GROUPS_AND_ROLES_ARE_NOT_SUPPORTED.to_string(),
        ))
    }

    pub fn join_group(&self, _group: &str) -> Result<(), OperationError> {
        Err(OperationError::Unsupported(
            GROUPS_AND_ROLES_ARE_NOT_SUPPORTED.to_string(),
        ))
    }

    pub fn leave_group(&self, _group: &str) -> Result<(), OperationError> {
        Err(OperationError::Unsupported(
            GROUPS_AND_ROLES_ARE_NOT_SUPPORTED.to_string(),
        ))
    }

    pub fn is_member_of(&self, _group: &str) -> Result<bool, OperationError> {
        Err(OperationError::Unsupported(
            GROUPS_AND_ROLES_ARE_NOT_SUPPORTED.to_string(),
        ))
    }

    pub fn realm_role_mappings(&self) -> Result<Vec<String>, OperationError> {
        Err(OperationError::Unsupported(
            GROUPS_AND_ROLES_ARE_NOT_SUPPORTED.to_string(),
        ))
    }

    pub fn role_mappings(&self) -> Result<Vec<String>, OperationError> {
        Err(OperationError::Unsupported(
            GROUPS_AND_ROLES_ARE_NOT_SUPPORTED.to_string(),
        ))
    }

    pub fn has_role(&self, _role: &str) -> Result<bool, OperationError> {
        Err(OperationError::Unsupported(
            GROUPS_AND_ROLES_ARE_NOT_SUPPORTED.to_string(),
        ))
    }

    pub fn grant_role(&self, _role: &str) -> Result<(), OperationError> {
        Err(OperationError::Unsupported(
            GROUPS_AND_ROLES_ARE_NOT_SUPPORTED.to_string(),
        ))
    }

    pub fn delete_role_mapping(&self, _role: &str) -> Result<(), OperationError> {
        Err(OperationError::Unsupported(
            GROUPS_AND_ROLES_ARE_NOT_SUPPORTED.to_string(),
        ))
    }

    pub fn federation_link(&self) -> Result<Option<String>, OperationError> {
        Err(OperationError::Unsupported(
            GROUPS_AND_ROLES_ARE_NOT_SUPPORTED.to_string(),
        ))
    }

    pub fn set_federation_link(&self, _link: Option<&str>) -> Result<(), OperationError> {
        Err(OperationError::Unsupported(
            GROUPS_AND_ROLES_ARE_NOT_SUPPORTED.to_string(),
        ))
    }
}
