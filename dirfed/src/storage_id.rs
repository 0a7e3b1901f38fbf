//! Host-visible composite user ids. A delegate is addressed by the host as
//! `f:{provider}:{external}` where the external part is the id the remote
//! directory assigned. The external part may itself contain colons.

pub fn format(provider_id: &str, external_id: &str) -> String {
    format!("f:{}:{}", provider_id, external_id)
}

/// Extract the remote directory id from a host-visible id. An id that does
/// not carry the composite prefix is returned unchanged.
pub fn external_id(storage_id: &str) -> &str {
    storage_id.splitn(3, ':').nth(2).unwrap_or(storage_id)
}
