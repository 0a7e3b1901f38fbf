//! The seam between the deferred-write core and the remote directory. The
//! core only ever talks to a `UserDirectory`; the HTTP client implements it
//! and tests substitute a recording fake.

use std::collections::BTreeMap;

use dirfed_client::{ClientError, DirectoryClient};
use dirfed_proto::v1::{OperationError, User};

pub trait UserDirectory {
    fn get_user_by_external_id(
        &self,
        realm_id: &str,
        external_id: &str,
    ) -> Result<Option<User>, OperationError>;

    fn get_user_by_username(
        &self,
        realm_id: &str,
        username: &str,
    ) -> Result<Option<User>, OperationError>;

    fn get_user_by_email(&self, realm_id: &str, email: &str)
        -> Result<Option<User>, OperationError>;

    fn get_users_count(&self, realm_id: &str) -> Result<Option<u32>, OperationError>;

    fn get_users(
        &self,
        realm_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<User>, OperationError>;

    fn search_for_user(
        &self,
        realm_id: &str,
        search: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<User>, OperationError>;

    fn search_for_user_by_params(
        &self,
        realm_id: &str,
        params: &BTreeMap<String, String>,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<User>, OperationError>;

    fn create_user(
        &self,
        realm_id: &str,
        user: &User,
        is_manual_set_up: bool,
    ) -> Result<User, OperationError>;

    fn update_user(
        &self,
        realm_id: &str,
        user: &User,
        is_manual_set_up: bool,
    ) -> Result<(), OperationError>;

    fn remove_user_by_external_id(
        &self,
        realm_id: &str,
        external_id: &str,
    ) -> Result<bool, OperationError>;

    /// Verify a password that is known to be present - absent challenges are
    /// rejected before this seam is reached.
    fn verify_password(
        &self,
        realm_id: &str,
        external_id: &str,
        raw_password: &str,
    ) -> Result<bool, OperationError>;

    fn is_configured_password(
        &self,
        realm_id: &str,
        external_id: &str,
    ) -> Result<Option<bool>, OperationError>;
}

fn map_client_err(e: ClientError) -> OperationError {
    match e {
        ClientError::BadRequest(body) => OperationError::Remote(body),
        ClientError::Http(status, body) => {
            OperationError::Remote(format!("status {}: {}", status, body.unwrap_or_default()))
        }
        e => OperationError::Remote(format!("{:?}", e)),
    }
}

impl UserDirectory for DirectoryClient {
    fn get_user_by_external_id(
        &self,
        realm_id: &str,
        external_id: &str,
    ) -> Result<Option<User>, OperationError> {
        DirectoryClient::get_user_by_external_id(self, realm_id, external_id)
            .map_err(map_client_err)
    }

    fn get_user_by_username(
        &self,
        realm_id: &str,
        username: &str,
    ) -> Result<Option<User>, OperationError> {
        DirectoryClient::get_user_by_username(self, realm_id, username).map_err(map_client_err)
    }

    fn get_user_by_email(
        &self,
        realm_id: &str,
        email: &str,
    ) -> Result<Option<User>, OperationError> {
        DirectoryClient::get_user_by_email(self, realm_id, email).map_err(map_client_err)
    }

    fn get_users_count(&self, realm_id: &str) -> Result<Option<u32>, OperationError> {
        DirectoryClient::get_users_count(self, realm_id).map_err(map_client_err)
    }

    fn get_users(
        &self,
        realm_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<User>, OperationError> {
        DirectoryClient::get_users(self, realm_id, offset, limit).map_err(map_client_err)
    }

    fn search_for_user(
        &self,
        realm_id: &str,
        search: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<User>, OperationError> {
        DirectoryClient::search_for_user(self, realm_id, search, offset, limit)
            .map_err(map_client_err)
    }

    fn search_for_user_by_params(
        &self,
        realm_id: &str,
        params: &BTreeMap<String, String>,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<User>, OperationError> {
        DirectoryClient::search_for_user_by_params(self, realm_id, params, offset, limit)
            .map_err(map_client_err)
    }

    fn create_user(
        &self,
        realm_id: &str,
        user: &User,
        is_manual_set_up: bool,
    ) -> Result<User, OperationError> {
        DirectoryClient::create_user(self, realm_id, user, is_manual_set_up)
            .map_err(map_client_err)
    }

    fn update_user(
        &self,
        realm_id: &str,
        user: &User,
        is_manual_set_up: bool,
    ) -> Result<(), OperationError> {
        DirectoryClient::update_user(self, realm_id, user, is_manual_set_up)
            .map_err(map_client_err)
    }

    fn remove_user_by_external_id(
        &self,
        realm_id: &str,
        external_id: &str,
    ) -> Result<bool, OperationError> {
        DirectoryClient::remove_user_by_external_id(self, realm_id, external_id)
            .map_err(map_client_err)
    }

    fn verify_password(
        &self,
        realm_id: &str,
        external_id: &str,
        raw_password: &str,
    ) -> Result<bool, OperationError> {
        DirectoryClient::verify_password(self, realm_id, external_id, Some(raw_password))
            .map_err(map_client_err)
    }

    fn is_configured_password(
        &self,
        realm_id: &str,
        external_id: &str,
    ) -> Result<Option<bool>, OperationError> {
        DirectoryClient::is_configured_password(self, realm_id, external_id)
            .map_err(map_client_err)
    }
}
