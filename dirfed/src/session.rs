//! Per-request unit of work. Holds the after-completion transaction list and
//! a small attribute table used to index delegates created during the
//! request, so they stay visible before any remote flush happens.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use dirfed_proto::v1::OperationError;

use crate::delegate::TxAwareUserDelegate;
use crate::transaction::Transaction;

const ADMIN_PATH_PREFIX: &str = "/admin/realms/";

pub struct Session {
    request_path: String,
    transactions: RefCell<Vec<Rc<dyn Transaction>>>,
    attributes: RefCell<HashMap<String, Rc<TxAwareUserDelegate>>>,
}

impl Session {
    pub fn new(request_path: &str) -> Rc<Self> {
        Rc::new(Session {
            request_path: request_path.to_string(),
            transactions: RefCell::new(Vec::new()),
            attributes: RefCell::new(HashMap::new()),
        })
    }

    /// True when the request arrived through the administrative console or
    /// the admin REST surface rather than an end-user flow.
    pub fn is_admin_request(&self) -> bool {
        self.request_path.starts_with(ADMIN_PATH_PREFIX)
    }

    pub fn enlist_after_completion(&self, tx: Rc<dyn Transaction>) {
        self.transactions.borrow_mut().push(tx);
    }

    pub fn enlisted_count(&self) -> usize {
        self.transactions.borrow().len()
    }

    /// Run every enlisted transaction in enlistment order. The first failure
    /// aborts the unit of work.
    pub fn commit(&self) -> Result<(), OperationError> {
        let transactions: Vec<_> = self.transactions.borrow_mut().drain(..).collect();
        for tx in transactions {
            tx.commit()?;
        }
        Ok(())
    }

    pub fn rollback(&self) {
        let transactions: Vec<_> = self.transactions.borrow_mut().drain(..).collect();
        for tx in transactions {
            tx.rollback();
        }
    }

    fn set_attribute(&self, key: String, delegate: Rc<TxAwareUserDelegate>) {
        self.attributes.borrow_mut().insert(key, delegate);
    }

    fn get_attribute(&self, key: &str) -> Option<Rc<TxAwareUserDelegate>> {
        self.attributes.borrow().get(key).cloned()
    }

    fn remove_attribute(&self, key: &str) {
        self.attributes.borrow_mut().remove(key);
    }
}

/// Index of users created earlier in this request, keyed by id, username and
/// email so lookups resolve the same in-memory delegate the write produced.
pub struct FreshlyCreatedUsers {
    session: Rc<Session>,
}

impl FreshlyCreatedUsers {
    pub fn new(session: Rc<Session>) -> Self {
        FreshlyCreatedUsers { session }
    }

    fn id_key(id: &str) -> String {
        format!("id:{}", id)
    }

    fn username_key(username: &str) -> String {
        format!("username:{}", username)
    }

    fn email_key(email: &str) -> String {
        format!("email:{}", email)
    }

    fn is_not_blank(value: Option<&str>) -> bool {
        value.map(|v| !v.trim().is_empty()).unwrap_or(false)
    }

    pub fn get_by_id(&self, storage_id: &str) -> Option<Rc<TxAwareUserDelegate>> {
        self.session.get_attribute(Self::id_key(storage_id).as_str())
    }

    pub fn get_by_username(&self, username: &str) -> Option<Rc<TxAwareUserDelegate>> {
        self.session
            .get_attribute(Self::username_key(username).as_str())
    }

    pub fn get_by_email(&self, email: &str) -> Option<Rc<TxAwareUserDelegate>> {
        self.session.get_attribute(Self::email_key(email).as_str())
    }

    /// Index a delegate under every non-blank key it currently carries. The
    /// keys are not re-derived later, so a rename after registration leaves
    /// the old key in place for the rest of the request.
    pub fn save_in_session(&self, delegate: &Rc<TxAwareUserDelegate>) {
        let model = delegate.model();
        if Self::is_not_blank(model.username.as_deref()) {
            if let Some(username) = model.username.as_deref() {
                self.session
                    .set_attribute(Self::username_key(username), delegate.clone());
            }
        }
        if Self::is_not_blank(model.email.as_deref()) {
            if let Some(email) = model.email.as_deref() {
                self.session
                    .set_attribute(Self::email_key(email), delegate.clone());
            }
        }
        self.session
            .set_attribute(Self::id_key(delegate.id().as_str()), delegate.clone());
    }

    pub fn remove_from_session(&self, delegate: &Rc<TxAwareUserDelegate>) {
        let model = delegate.model();
        if Self::is_not_blank(model.username.as_deref()) {
            if let Some(username) = model.username.as_deref() {
                self.session
                    .remove_attribute(Self::username_key(username).as_str());
            }
        }
        if Self::is_not_blank(model.email.as_deref()) {
            if let Some(email) = model.email.as_deref() {
                self.session
                    .remove_attribute(Self::email_key(email).as_str());
            }
        }
        self.session
            .remove_attribute(Self::id_key(delegate.id().as_str()).as_str());
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use dirfed_proto::v1::User;

    use crate::delegate::TxAwareUserDelegate;
    use crate::session::{FreshlyCreatedUsers, Session};
    use crate::testkit::RecordingDirectory;

    fn fresh_delegate(
        session: &Rc<Session>,
        id: &str,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Rc<TxAwareUserDelegate> {
        let mut model = User::new(id);
        model.username = username.map(str::to_string);
        model.email = email.map(str::to_string);
        TxAwareUserDelegate::create_for_new_user(
            session,
            "wonderland",
            "hoard",
            model,
            RecordingDirectory::new(),
        )
    }

    #[test]
    fn test_admin_request_detection() {
        assert!(Session::new("/admin/realms/wonderland/users").is_admin_request());
        assert!(!Session::new("/realms/wonderland/account").is_admin_request());
        assert!(!Session::new("/realms/wonderland/admin/realms/x").is_admin_request());
    }

    #[test]
    fn test_index_registration_is_symmetric() {
        let session = Session::new("/realms/wonderland/account");
        let index = FreshlyCreatedUsers::new(session.clone());
        let delegate = fresh_delegate(&session, "u-1", Some("alice"), Some("alice@example.com"));

        index.save_in_session(&delegate);
        assert!(index
            .get_by_id("f:hoard:u-1")
            .map(|d| Rc::ptr_eq(&d, &delegate))
            .unwrap_or(false));
        assert!(index.get_by_username("alice").is_some());
        assert!(index.get_by_email("alice@example.com").is_some());

        index.remove_from_session(&delegate);
        assert!(index.get_by_id("f:hoard:u-1").is_none());
        assert!(index.get_by_username("alice").is_none());
        assert!(index.get_by_email("alice@example.com").is_none());
    }

    #[test]
    fn test_blank_fields_are_not_indexed() {
        let session = Session::new("/realms/wonderland/account");
        let index = FreshlyCreatedUsers::new(session.clone());
        let delegate = fresh_delegate(&session, "u-2", Some("bob"), Some("   "));

        index.save_in_session(&delegate);
        assert!(index.get_by_username("bob").is_some());
        assert!(index.get_by_email("   ").is_none());
    }

    #[test]
    fn test_keys_are_namespaced() {
        let session = Session::new("/realms/wonderland/account");
        let index = FreshlyCreatedUsers::new(session.clone());
        let delegate = fresh_delegate(&session, "u-3", Some("carol"), None);

        index.save_in_session(&delegate);
        // The username must not bleed into the other key spaces.
        assert!(index.get_by_id("carol").is_none());
        assert!(index.get_by_email("carol").is_none());
    }
}
