use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/* ===== errors ===== */

/// Errors as the host-facing provider surface reports them. These are
/// serialisable so the host can forward them over its own admin channels.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "lowercase")]
pub enum OperationError {
    NoMatchingEntries,
    InvalidRequestState(String),
    Unsupported(String),
    Remote(String),
}

impl PartialEq for OperationError {
    fn eq(&self, other: &Self) -> bool {
        // Discriminant compare only - the attached messages are free text and
        // generally we only use PartialEq for testing anyway.
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationError::NoMatchingEntries => write!(f, "no matching entries"),
            OperationError::InvalidRequestState(r) => write!(f, "invalid request state: {}", r),
            OperationError::Unsupported(r) => write!(f, "unsupported operation: {}", r),
            OperationError::Remote(r) => write!(f, "remote directory failure: {}", r),
        }
    }
}

/* ===== wire types ===== */

/// Token that stands in for a password anywhere a record is rendered for
/// diagnostics. The real value is only ever sent on the write path.
pub const MASKED_PASSWORD: &str = "**masked password**";

/// A user record as the remote directory service speaks it. The id is
/// assigned remotely for resolved users, locally for users that have not
/// been persisted yet. Unknown response fields are ignored on read, and the
/// directory never sends (nor do we accept) group or role mappings.
#[derive(Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    // Write path only. Never round-tripped back from the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub created_timestamp: Option<i64>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub required_actions: BTreeSet<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

impl User {
    pub fn new(id: &str) -> Self {
        User {
            id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn first_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(|vs| vs.first())
            .map(|v| v.as_str())
    }

    /// All values of an attribute. Absent attributes read as empty, never as
    /// an error, so callers don't need a null branch.
    pub fn attribute(&self, name: &str) -> &[String] {
        self.attributes.get(name).map(|vs| vs.as_slice()).unwrap_or(&[])
    }

    pub fn set_single_attribute(&mut self, name: &str, value: &str) {
        self.attributes
            .insert(name.to_string(), vec![value.to_string()]);
    }

    pub fn set_attribute(&mut self, name: &str, values: Vec<String>) {
        self.attributes.insert(name.to_string(), values);
    }

    pub fn remove_attribute(&mut self, name: &str) {
        self.attributes.remove(name);
    }

    pub fn add_required_action(&mut self, action: &str) -> bool {
        self.required_actions.insert(action.to_string())
    }

    pub fn remove_required_action(&mut self, action: &str) -> bool {
        self.required_actions.remove(action)
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| MASKED_PASSWORD))
            .field("created_timestamp", &self.created_timestamp)
            .field("enabled", &self.enabled)
            .field("attributes", &self.attributes)
            .field("required_actions", &self.required_actions)
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email_verified", &self.email_verified)
            .finish()
    }
}

/// Body of the password verification call.
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyPasswordRequest {
    pub password: String,
}

impl VerifyPasswordRequest {
    pub fn new(s: String) -> Self {
        VerifyPasswordRequest { password: s }
    }
}
