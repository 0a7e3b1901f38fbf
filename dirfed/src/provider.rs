//! The storage provider the host drives. Lookups consult the in-request
//! index first and fall back to the remote directory; writes go through
//! delegates so they flush once, at unit-of-work completion.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use dirfed_proto::v1::{OperationError, User};
use uuid::Uuid;

use crate::connector::UserDirectory;
use crate::delegate::TxAwareUserDelegate;
use crate::session::{FreshlyCreatedUsers, Session};
use crate::storage_id;

pub const PASSWORD_CREDENTIAL_TYPE: &str = "password";

pub struct HttpUserStorageProvider {
    connector: Rc<dyn UserDirectory>,
    session: Rc<Session>,
    realm_id: String,
    provider_id: String,
    freshly_created_users: FreshlyCreatedUsers,
}

impl HttpUserStorageProvider {
    pub fn new(
        connector: Rc<dyn UserDirectory>,
        session: Rc<Session>,
        realm_id: &str,
        provider_id: &str,
    ) -> Self {
        HttpUserStorageProvider {
            connector,
            freshly_created_users: FreshlyCreatedUsers::new(session.clone()),
            session,
            realm_id: realm_id.to_string(),
            provider_id: provider_id.to_string(),
        }
    }

    fn wrap_existing(&self, model: User) -> Rc<TxAwareUserDelegate> {
        TxAwareUserDelegate::create_for_existing_user(
            &self.session,
            self.realm_id.as_str(),
            self.provider_id.as_str(),
            model,
            self.connector.clone(),
        )
    }

    pub fn get_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Rc<TxAwareUserDelegate>>, OperationError> {
        if let Some(delegate) = self.freshly_created_users.get_by_username(username) {
            return Ok(Some(delegate));
        }
        let found = self
            .connector
            .get_user_by_username(self.realm_id.as_str(), username)?;
        Ok(found.map(|model| self.wrap_existing(model)))
    }

    pub fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Rc<TxAwareUserDelegate>>, OperationError> {
        if let Some(delegate) = self.freshly_created_users.get_by_email(email) {
            return Ok(Some(delegate));
        }
        let found = self
            .connector
            .get_user_by_email(self.realm_id.as_str(), email)?;
        Ok(found.map(|model| self.wrap_existing(model)))
    }

    /// Lookup by the host's composite id. Unlike the name lookups, a miss
    /// here is fatal: the host only asks for ids it has previously seen.
    pub fn get_user_by_id(&self, id: &str) -> Result<Rc<TxAwareUserDelegate>, OperationError> {
        if let Some(delegate) = self.freshly_created_users.get_by_id(id) {
            return Ok(delegate);
        }
        let external_id = storage_id::external_id(id);
        let found = self
            .connector
            .get_user_by_external_id(self.realm_id.as_str(), external_id)?;
        match found {
            Some(model) => Ok(self.wrap_existing(model)),
            None => Err(OperationError::NoMatchingEntries),
        }
    }

    pub fn get_users_count(&self) -> Result<u32, OperationError> {
        self.connector
            .get_users_count(self.realm_id.as_str())?
            .ok_or_else(|| {
                OperationError::Remote("no users count could be retrieved".to_string())
            })
    }

    pub fn get_users(
        &self,
        first_result: u32,
        max_results: u32,
    ) -> Result<Vec<Rc<TxAwareUserDelegate>>, OperationError> {
        let users = self
            .connector
            .get_users(self.realm_id.as_str(), first_result, max_results)?;
        Ok(users.into_iter().map(|u| self.wrap_existing(u)).collect())
    }

    pub fn get_all_users(&self) -> Result<Vec<Rc<TxAwareUserDelegate>>, OperationError> {
        self.get_users(0, u32::MAX)
    }

    pub fn search_for_user(
        &self,
        search: &str,
        first_result: u32,
        max_results: u32,
    ) -> Result<Vec<Rc<TxAwareUserDelegate>>, OperationError> {
        let users = self.connector.search_for_user(
            self.realm_id.as_str(),
            search,
            first_result,
            max_results,
        )?;
        Ok(users.into_iter().map(|u| self.wrap_existing(u)).collect())
    }

    pub fn search_for_user_by_params(
        &self,
        params: &BTreeMap<String, String>,
        first_result: u32,
        max_results: u32,
    ) -> Result<Vec<Rc<TxAwareUserDelegate>>, OperationError> {
        let users = self.connector.search_for_user_by_params(
            self.realm_id.as_str(),
            params,
            first_result,
            max_results,
        )?;
        Ok(users.into_iter().map(|u| self.wrap_existing(u)).collect())
    }

    pub fn search_for_user_by_attribute(
        &self,
        name: &str,
        value: &str,
    ) -> Result<Vec<Rc<TxAwareUserDelegate>>, OperationError> {
        let mut params = BTreeMap::new();
        params.insert(name.to_string(), value.to_string());
        self.search_for_user_by_params(&params, 0, u32::MAX)
    }

    /// Group membership is modelled remotely as a search parameter.
    pub fn get_group_members(
        &self,
        group_name: &str,
        first_result: u32,
        max_results: u32,
    ) -> Result<Vec<Rc<TxAwareUserDelegate>>, OperationError> {
        let mut params = BTreeMap::new();
        params.insert("group".to_string(), group_name.to_string());
        self.search_for_user_by_params(&params, first_result, max_results)
    }

    /// Create a user in memory only. The remote record is written when the
    /// unit of work completes; until then the new user is served out of the
    /// in-request index.
    pub fn add_user(&self, username: &str) -> Rc<TxAwareUserDelegate> {
        let mut model = User::new(Uuid::new_v4().to_string().as_str());
        model.username = Some(username.to_string());
        model.created_timestamp = Some(now_millis());
        let delegate = TxAwareUserDelegate::create_for_new_user(
            &self.session,
            self.realm_id.as_str(),
            self.provider_id.as_str(),
            model,
            self.connector.clone(),
        );
        self.freshly_created_users.save_in_session(&delegate);
        delegate
    }

    pub fn remove_user(&self, delegate: &Rc<TxAwareUserDelegate>) -> Result<bool, OperationError> {
        self.freshly_created_users.remove_from_session(delegate);
        self.connector
            .remove_user_by_external_id(self.realm_id.as_str(), delegate.external_id().as_str())
    }

    pub fn supports_credential_type(&self, credential_type: &str) -> bool {
        credential_type == PASSWORD_CREDENTIAL_TYPE
    }

    pub fn is_configured_for(
        &self,
        delegate: &Rc<TxAwareUserDelegate>,
        credential_type: &str,
    ) -> Result<bool, OperationError> {
        if !self.supports_credential_type(credential_type) {
            return Ok(false);
        }
        self.connector
            .is_configured_password(self.realm_id.as_str(), delegate.external_id().as_str())?
            .ok_or_else(|| {
                OperationError::Remote(
                    "could not determine whether a password is configured".to_string(),
                )
            })
    }

    /// Check a password challenge against the remote directory. The user
    /// must already be persisted; an absent challenge is rejected locally.
    pub fn validate_credential(
        &self,
        delegate: &Rc<TxAwareUserDelegate>,
        credential_type: &str,
        challenge: Option<&str>,
    ) -> Result<bool, OperationError> {
        if !self.supports_credential_type(credential_type) {
            return Ok(false);
        }
        if self.freshly_created_users.get_by_id(delegate.id().as_str()).is_some()
            || delegate.is_not_persisted()
        {
            return Err(OperationError::InvalidRequestState(
                "cannot validate a password for a user that has not been persisted yet".to_string(),
            ));
        }
        let challenge = match challenge {
            Some(c) => c,
            None => {
                trace!("no password challenge supplied, rejecting");
                return Ok(false);
            }
        };
        self.connector.verify_password(
            self.realm_id.as_str(),
            delegate.external_id().as_str(),
            challenge,
        )
    }

    /// Store a new password on the delegate. Like every other write it is
    /// flushed at unit-of-work completion, not immediately.
    pub fn update_credential(
        &self,
        delegate: &Rc<TxAwareUserDelegate>,
        credential_type: &str,
        password: &str,
    ) -> Result<bool, OperationError> {
        if !self.supports_credential_type(credential_type) {
            return Ok(false);
        }
        delegate.set_password(password);
        Ok(true)
    }

    pub fn disable_credential_type(
        &self,
        _delegate: &Rc<TxAwareUserDelegate>,
        _credential_type: &str,
    ) -> Result<(), OperationError> {
        Err(OperationError::Unsupported(
            "credential types cannot be disabled through this provider".to_string(),
        ))
    }

    pub fn disableable_credential_types(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
