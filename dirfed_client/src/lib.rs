//! Client for the remote user directory service. This is a stateless
//! translator between directory operations and HTTP calls - all deferred
//! write and visibility semantics live in the `dirfed` crate on top of it.

#![deny(warnings)]
#![warn(unused_extern_crates)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use dirfed_proto::v1::{User, VerifyPasswordRequest, MASKED_PASSWORD};

const IS_MANUAL_SET_UP_QUERY_PARAM: &str = "is_manual_set_up";

const DEFAULT_ADDRESS: &str = "http://localhost:8080/v1";

#[derive(Debug)]
pub enum ClientError {
    Configuration(String),
    Transport(reqwest::Error),
    Http(reqwest::StatusCode, Option<String>),
    BadRequest(String),
    JsonDecode,
}

#[derive(Debug, Deserialize)]
struct DirfedClientConfig {
    address: Option<String>,
    connect_timeout: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct DirectoryClientBuilder {
    address: Option<String>,
    connect_timeout: Option<u64>,
}

impl DirectoryClientBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn address(mut self, address: String) -> Self {
        self.address = Some(address);
        self
    }

    pub fn connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout = Some(secs);
        self
    }

    fn apply_config_options(mut self, config: DirfedClientConfig) -> Self {
        if let Some(address) = config.address {
            self.address = Some(address);
        }
        if let Some(secs) = config.connect_timeout {
            self.connect_timeout = Some(secs);
        }
        self
    }

    /// Merge options from a TOML config file. A missing file is not an
    /// error - the builder is returned unchanged.
    pub fn read_options_from_optional_config<P: AsRef<Path>>(
        self,
        config_path: P,
    ) -> Result<Self, ClientError> {
        let mut f = match File::open(&config_path) {
            Ok(f) => f,
            Err(e) => {
                debug!("Unable to open config file [{:?}], skipping ...", e);
                return Ok(self);
            }
        };

        let mut contents = String::new();
        f.read_to_string(&mut contents)
            .map_err(|e| ClientError::Configuration(format!("{:?}", e)))?;

        let config: DirfedClientConfig = toml::from_str(contents.as_str())
            .map_err(|e| ClientError::Configuration(format!("{:?}", e)))?;

        Ok(self.apply_config_options(config))
    }

    pub fn build(self) -> Result<DirectoryClient, ClientError> {
        let address = self
            .address
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());

        url::Url::parse(address.as_str())
            .map_err(|e| ClientError::Configuration(format!("invalid address: {:?}", e)))?;

        let mut client_builder = reqwest::blocking::Client::builder();
        if let Some(secs) = self.connect_timeout {
            client_builder = client_builder
                .connect_timeout(Duration::from_secs(secs))
                .timeout(Duration::from_secs(secs));
        }

        let client = client_builder.build().map_err(ClientError::Transport)?;

        Ok(DirectoryClient {
            client,
            addr: address.trim_end_matches('/').to_string(),
        })
    }
}

/// Stateless per-call HTTP connector - may be shared process wide.
#[derive(Debug)]
pub struct DirectoryClient {
    client: reqwest::blocking::Client,
    addr: String,
}

impl DirectoryClient {
    fn realm_endpoint(&self, realm_id: &str) -> String {
        format!("{}/realms/{}", self.addr, realm_id)
    }

    fn users_endpoint(&self, realm_id: &str) -> String {
        format!("{}/realms/{}/users", self.addr, realm_id)
    }

    fn user_endpoint(&self, realm_id: &str, external_id: &str) -> String {
        format!("{}/realms/{}/users/{}", self.addr, realm_id, external_id)
    }

    fn perform_get_request<T: DeserializeOwned>(
        &self,
        dest: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, ClientError> {
        let response = self
            .client
            .get(dest)
            .query(query)
            .send()
            .map_err(ClientError::Transport)?;

        match response.status() {
            reqwest::StatusCode::OK => {}
            _ => return Ok(None),
        }

        response.json().map(Some).map_err(|_| ClientError::JsonDecode)
    }

    /// Resolve a user by the id the remote service assigned to it. Any
    /// non-200 response reads as absence.
    pub fn get_user_by_external_id(
        &self,
        realm_id: &str,
        external_id: &str,
    ) -> Result<Option<User>, ClientError> {
        let result: Option<User> =
            self.perform_get_request(self.user_endpoint(realm_id, external_id).as_str(), &[])?;
        trace!(
            "get_user_by_external_id({}, {}) = {:?}",
            realm_id,
            external_id,
            result
        );
        Ok(result)
    }

    fn get_single_user_by_query(
        &self,
        realm_id: &str,
        key: &str,
        value: &str,
    ) -> Result<Option<User>, ClientError> {
        let users: Option<Vec<User>> =
            self.perform_get_request(self.users_endpoint(realm_id).as_str(), &[(key, value)])?;
        Ok(users.and_then(|mut users| {
            if users.is_empty() {
                None
            } else {
                Some(users.remove(0))
            }
        }))
    }

    pub fn get_user_by_username(
        &self,
        realm_id: &str,
        username: &str,
    ) -> Result<Option<User>, ClientError> {
        trace!("get_user_by_username({}, {})", realm_id, username);
        self.get_single_user_by_query(realm_id, "username", username)
    }

    pub fn get_user_by_email(
        &self,
        realm_id: &str,
        email: &str,
    ) -> Result<Option<User>, ClientError> {
        trace!("get_user_by_email({}, {})", realm_id, email);
        self.get_single_user_by_query(realm_id, "email", email)
    }

    pub fn get_users_count(&self, realm_id: &str) -> Result<Option<u32>, ClientError> {
        trace!("get_users_count({})", realm_id);
        self.perform_get_request(self.realm_endpoint(realm_id).as_str(), &[])
    }

    /// Shared pagination template for the list and search calls. A 400 is
    /// fatal with the response body as the message; any other non-200
    /// degrades to an empty page so listing stays usable.
    fn get_users_template(
        &self,
        realm_id: &str,
        offset: u32,
        limit: u32,
        extra_params: &[(&str, &str)],
    ) -> Result<Vec<User>, ClientError> {
        let offset = offset.to_string();
        let limit = limit.to_string();

        let mut request = self.client.get(self.users_endpoint(realm_id).as_str());
        for (key, value) in extra_params {
            request = request.query(&[(*key, *value)]);
        }

        let response = request
            .query(&[("offset", offset.as_str()), ("limit", limit.as_str())])
            .send()
            .map_err(ClientError::Transport)?;

        match response.status() {
            reqwest::StatusCode::OK => {
                response.json().map_err(|_| ClientError::JsonDecode)
            }
            reqwest::StatusCode::BAD_REQUEST => {
                let body = response.text().map_err(ClientError::Transport)?;
                Err(ClientError::BadRequest(body))
            }
            unexpect => {
                error!(
                    "get_users_template({}, {}, {}) = {:?}",
                    realm_id, offset, limit, unexpect
                );
                Ok(Vec::new())
            }
        }
    }

    pub fn get_users(
        &self,
        realm_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<User>, ClientError> {
        trace!("get_users({}, {}, {})", realm_id, offset, limit);
        let result = self.get_users_template(realm_id, offset, limit, &[])?;
        trace!("list of user models: {:?}", result);
        Ok(result)
    }

    pub fn search_for_user(
        &self,
        realm_id: &str,
        search: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<User>, ClientError> {
        trace!("search_for_user({}, {}, {}, {})", realm_id, search, offset, limit);
        let result = self.get_users_template(realm_id, offset, limit, &[("search", search)])?;
        trace!("list of user models: {:?}", result);
        Ok(result)
    }

    pub fn search_for_user_by_params(
        &self,
        realm_id: &str,
        params: &BTreeMap<String, String>,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<User>, ClientError> {
        trace!(
            "search_for_user_by_params({}, {:?}, {}, {})",
            realm_id,
            params,
            offset,
            limit
        );
        let extra_params: Vec<(&str, &str)> = params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let result =
            self.get_users_template(realm_id, offset, limit, extra_params.as_slice())?;
        trace!("list of user models: {:?}", result);
        Ok(result)
    }

    /// Check whether a password credential is configured for a user. The
    /// entity is inspected as a raw map - the typed record never carries a
    /// password back from the service.
    pub fn is_configured_password(
        &self,
        realm_id: &str,
        external_id: &str,
    ) -> Result<Option<bool>, ClientError> {
        trace!("is_configured_password({}, {})", realm_id, external_id);
        let response = self
            .client
            .get(self.user_endpoint(realm_id, external_id).as_str())
            .send()
            .map_err(ClientError::Transport)?;

        let body = response.text().map_err(ClientError::Transport)?;
        if body.is_empty() {
            return Ok(None);
        }

        let entity: serde_json::Value =
            serde_json::from_str(body.as_str()).map_err(|_| ClientError::JsonDecode)?;
        Ok(entity.as_object().map(|map| map.contains_key("password")))
    }

    pub fn create_user(
        &self,
        realm_id: &str,
        user: &User,
        is_manual_set_up: bool,
    ) -> Result<User, ClientError> {
        trace!("create_user({}, {:?})", realm_id, user);
        let response = self
            .client
            .post(self.users_endpoint(realm_id).as_str())
            .query(&[(IS_MANUAL_SET_UP_QUERY_PARAM, is_manual_set_up.to_string())])
            .json(user)
            .send()
            .map_err(ClientError::Transport)?;

        match response.status() {
            reqwest::StatusCode::OK => {
                response.json().map_err(|_| ClientError::JsonDecode)
            }
            unexpect => {
                let body = response.text().map_err(ClientError::Transport)?;
                error!("Response was not OK: {}", body);
                Err(ClientError::Http(unexpect, Some(body)))
            }
        }
    }

    /// Full record replacement - there is no partial-field diff on the wire.
    pub fn update_user(
        &self,
        realm_id: &str,
        user: &User,
        is_manual_set_up: bool,
    ) -> Result<(), ClientError> {
        trace!("update_user({}, {:?})", realm_id, user);
        let response = self
            .client
            .put(self.user_endpoint(realm_id, user.id.as_str()).as_str())
            .query(&[(IS_MANUAL_SET_UP_QUERY_PARAM, is_manual_set_up.to_string())])
            .json(user)
            .send()
            .map_err(ClientError::Transport)?;

        match response.status() {
            reqwest::StatusCode::OK => Ok(()),
            unexpect => {
                let body = response.text().ok();
                Err(ClientError::Http(unexpect, body))
            }
        }
    }

    pub fn remove_user_by_external_id(
        &self,
        realm_id: &str,
        external_id: &str,
    ) -> Result<bool, ClientError> {
        let response = self
            .client
            .delete(self.user_endpoint(realm_id, external_id).as_str())
            .send()
            .map_err(ClientError::Transport)?;
        let success = response.status() == reqwest::StatusCode::OK;
        trace!(
            "remove_user_by_external_id({}, {}) = {}",
            realm_id,
            external_id,
            success
        );
        Ok(success)
    }

    /// Verify a password for a user. An absent challenge is always false
    /// without a remote call.
    pub fn verify_password(
        &self,
        realm_id: &str,
        external_id: &str,
        raw_password: Option<&str>,
    ) -> Result<bool, ClientError> {
        let raw_password = match raw_password {
            Some(pw) => pw,
            None => {
                trace!("verify_password({}, {}, null) = false", realm_id, external_id);
                return Ok(false);
            }
        };

        let dest = format!("{}/valid_password", self.user_endpoint(realm_id, external_id));
        let response = self
            .client
            .post(dest.as_str())
            .json(&VerifyPasswordRequest::new(raw_password.to_string()))
            .send()
            .map_err(ClientError::Transport)?;

        if response.status() != reqwest::StatusCode::OK {
            trace!(
                "verify_password({}, {}, {}) = false",
                realm_id,
                external_id,
                MASKED_PASSWORD
            );
            return Ok(false);
        }

        let matches: bool = response.json().map_err(|_| ClientError::JsonDecode)?;
        trace!(
            "verify_password({}, {}, {}) = {}",
            realm_id,
            external_id,
            MASKED_PASSWORD,
            matches
        );
        Ok(matches)
    }
}
