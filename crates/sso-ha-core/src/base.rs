//! Non-replicated single-sign-on bookkeeping.
//!
//! [`SsoState`] is the interface the replicated entry composes over: the
//! canonical live session set plus the credential fields. [`BaseSsoEntry`]
//! is the reference implementation; embedders with their own SSO tracking
//! implement the trait instead.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::principal::Principal;
use crate::snapshot::SessionBinding;

/// Base single-sign-on tracking behavior.
pub trait SsoState: Send + 'static {
    /// Zero-value state for `id`: no principal, no credentials, no sessions.
    /// Populated afterwards through [`SsoState::update_credentials`] and
    /// [`SsoState::set_last_access`].
    fn blank(id: &str, realm_name: &str, version: u64) -> Self
    where
        Self: Sized;

    fn id(&self) -> &str;
    fn realm_name(&self) -> &str;
    fn principal(&self) -> Option<&Arc<dyn Principal>>;
    fn auth_type(&self) -> &str;
    fn username(&self) -> &str;
    fn password(&self) -> Option<&str>;

    fn update_credentials(
        &mut self,
        principal: Option<Arc<dyn Principal>>,
        auth_type: &str,
        username: &str,
        password: Option<String>,
    );

    /// Returns `true` if the session was not already bound.
    fn add_session(&mut self, binding: SessionBinding) -> bool;

    /// Returns `true` if the session was bound. Unknown sessions are a no-op.
    fn remove_session(&mut self, binding: &SessionBinding) -> bool;

    fn sessions(&self) -> &BTreeSet<SessionBinding>;

    fn last_access_ms(&self) -> u64;
    fn set_last_access(&mut self, last_access_ms: u64);

    fn version(&self) -> u64;

    /// Advance the version. `None` when it is already `u64::MAX`, in which
    /// case it is left unchanged.
    fn increment_and_get_version(&mut self) -> Option<u64>;
}

/// Reference SSO entry without replication.
#[derive(Clone)]
pub struct BaseSsoEntry {
    id: String,
    version: u64,
    principal: Option<Arc<dyn Principal>>,
    auth_type: String,
    username: String,
    password: Option<String>,
    realm_name: String,
    last_access_ms: u64,
    sessions: BTreeSet<SessionBinding>,
}

impl fmt::Debug for BaseSsoEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseSsoEntry")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("principal", &self.principal.as_ref().map(|p| p.name()))
            .field("auth_type", &self.auth_type)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("realm_name", &self.realm_name)
            .field("last_access_ms", &self.last_access_ms)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl SsoState for BaseSsoEntry {
    fn blank(id: &str, realm_name: &str, version: u64) -> Self {
        Self {
            id: id.to_string(),
            version,
            principal: None,
            auth_type: String::new(),
            username: String::new(),
            password: None,
            realm_name: realm_name.to_string(),
            last_access_ms: 0,
            sessions: BTreeSet::new(),
        }
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn realm_name(&self) -> &str {
        &self.realm_name
    }

    fn principal(&self) -> Option<&Arc<dyn Principal>> {
        self.principal.as_ref()
    }

    fn auth_type(&self) -> &str {
        &self.auth_type
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    fn update_credentials(
        &mut self,
        principal: Option<Arc<dyn Principal>>,
        auth_type: &str,
        username: &str,
        password: Option<String>,
    ) {
        self.principal = principal;
        auth_type.clone_into(&mut self.auth_type);
        username.clone_into(&mut self.username);
        self.password = password;
    }

    fn add_session(&mut self, binding: SessionBinding) -> bool {
        self.sessions.insert(binding)
    }

    fn remove_session(&mut self, binding: &SessionBinding) -> bool {
        self.sessions.remove(binding)
    }

    fn sessions(&self) -> &BTreeSet<SessionBinding> {
        &self.sessions
    }

    fn last_access_ms(&self) -> u64 {
        self.last_access_ms
    }

    fn set_last_access(&mut self, last_access_ms: u64) {
        self.last_access_ms = last_access_ms;
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn increment_and_get_version(&mut self) -> Option<u64> {
        self.version = self.version.checked_add(1)?;
        Some(self.version)
    }
}
