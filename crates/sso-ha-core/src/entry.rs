//! Live replicated SSO entry.
//!
//! [`SsoEntry`] pairs a base SSO state ([`SsoState`]) with the
//! [`SsoEntrySnapshot`] that replication ships to other nodes. Both live
//! behind one mutex and every mutator updates them in the same critical
//! section, so a reader sees either the state before a mutation or the state
//! after it, never live and snapshot views that disagree.
//!
//! # Version
//!
//! Only [`SsoEntry::increment_and_get_version`] advances the version. Session
//! attach/detach does not; the replication layer bumps the version once
//! before it transmits, so a burst of attachments costs one increment.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use tracing::{debug, trace, warn};

use crate::base::{BaseSsoEntry, SsoState};
use crate::container::SessionHandle;
use crate::error::{CodecError, VersionOverflow};
use crate::principal::{Principal, PrincipalCodec};
use crate::snapshot::{PrincipalBlob, SessionBinding, SsoEntrySnapshot};

/// Parameters for a freshly authenticated entry.
#[derive(Clone)]
pub struct NewSsoEntry {
    pub id: String,
    pub principal: Option<Arc<dyn Principal>>,
    pub auth_type: String,
    pub username: String,
    pub realm_name: String,
    pub last_access_ms: u64,
    pub max_idle_ms: u64,
    pub version: u64,
}

impl fmt::Debug for NewSsoEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewSsoEntry")
            .field("id", &self.id)
            .field("principal", &self.principal.as_ref().map(|p| p.name()))
            .field("auth_type", &self.auth_type)
            .field("username", &self.username)
            .field("realm_name", &self.realm_name)
            .field("last_access_ms", &self.last_access_ms)
            .field("max_idle_ms", &self.max_idle_ms)
            .field("version", &self.version)
            .finish()
    }
}

struct EntryState<B> {
    base: B,
    snapshot: SsoEntrySnapshot,
}

/// An SSO identity shared by every request authenticated under it.
pub struct SsoEntry<B: SsoState = BaseSsoEntry> {
    id: String,
    max_idle_ms: u64,
    state: Mutex<EntryState<B>>,
}

impl SsoEntry<BaseSsoEntry> {
    /// Fresh entry after a new authentication on this node.
    ///
    /// The principal is encoded immediately; a principal the codec cannot
    /// serialize fails construction.
    pub fn new(params: NewSsoEntry, codec: &dyn PrincipalCodec) -> Result<Self, CodecError> {
        Self::with_state(params, codec)
    }
}

impl<B: SsoState> SsoEntry<B> {
    /// Fresh entry over a caller-chosen base state type.
    pub fn with_state(params: NewSsoEntry, codec: &dyn PrincipalCodec) -> Result<Self, CodecError> {
        let blob = PrincipalBlob::encode(codec, params.principal.as_deref())?;
        let entry = Self::populate(params, blob);
        debug!(sso_id = %entry.id, "Created SSO entry");
        Ok(entry)
    }

    /// Two-phase build shared by the fresh and inflation paths: blank base
    /// state, then the ordinary credential and access-time updates.
    ///
    /// `blob` is stored as given so an inflated entry keeps the exact bytes
    /// it received.
    pub(crate) fn populate(params: NewSsoEntry, blob: PrincipalBlob) -> Self {
        let NewSsoEntry {
            id,
            principal,
            auth_type,
            username,
            realm_name,
            last_access_ms,
            max_idle_ms,
            version,
        } = params;

        let mut base = B::blank(&id, &realm_name, version);
        base.update_credentials(principal, &auth_type, &username, None);
        base.set_last_access(last_access_ms);

        let snapshot = SsoEntrySnapshot::new(
            id.clone(),
            version,
            blob,
            auth_type,
            username,
            realm_name,
            last_access_ms,
            max_idle_ms,
        );

        Self {
            id,
            max_idle_ms,
            state: Mutex::new(EntryState { base, snapshot }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EntryState<B>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn max_idle_ms(&self) -> u64 {
        self.max_idle_ms
    }

    /// Bind an application session. Returns `true` if it was not bound yet.
    pub fn add_session(&self, session: &dyn SessionHandle) -> bool {
        let binding = session.binding();
        let mut state = self.lock();
        let added = state.base.add_session(binding.clone());
        state.snapshot.add_binding(binding);
        trace!(
            sso_id = %self.id,
            session_id = session.id(),
            context_path = session.context_path(),
            added,
            "Bound session to SSO entry"
        );
        added
    }

    /// Unbind an application session. Unbound sessions are a no-op.
    pub fn remove_session(&self, session: &dyn SessionHandle) -> bool {
        let binding = session.binding();
        let mut state = self.lock();
        let removed = state.base.remove_session(&binding);
        state.snapshot.remove_binding(&binding);
        trace!(
            sso_id = %self.id,
            session_id = session.id(),
            context_path = session.context_path(),
            removed,
            "Unbound session from SSO entry"
        );
        removed
    }

    /// Record a request touching this identity.
    ///
    /// Callers must not regress the access time; smaller values are accepted
    /// as given.
    pub fn set_last_access_time(&self, last_access_ms: u64) {
        let mut state = self.lock();
        state.base.set_last_access(last_access_ms);
        state.snapshot.set_last_access_ms(last_access_ms);
    }

    /// Advance the version and return the new value.
    ///
    /// Fails once the version is `u64::MAX`; neither view changes then.
    pub fn increment_and_get_version(&self) -> Result<u64, VersionOverflow> {
        let mut state = self.lock();
        let Some(version) = state.base.increment_and_get_version() else {
            let version = state.base.version();
            drop(state);
            warn!(sso_id = %self.id, version, "SSO entry version exhausted");
            return Err(VersionOverflow {
                entry_id: self.id.clone(),
                version,
            });
        };
        state.snapshot.set_version(version);
        Ok(version)
    }

    /// Re-authentication: replace principal and credentials.
    ///
    /// The principal is encoded before the lock is taken. The password stays
    /// in the base state and is never replicated.
    pub fn update_credentials(
        &self,
        principal: Option<Arc<dyn Principal>>,
        auth_type: &str,
        username: &str,
        password: Option<String>,
        codec: &dyn PrincipalCodec,
    ) -> Result<(), CodecError> {
        let blob = PrincipalBlob::encode(codec, principal.as_deref())?;
        let mut state = self.lock();
        state
            .base
            .update_credentials(principal, auth_type, username, password);
        state.snapshot.set_credentials(blob, auth_type, username);
        debug!(sso_id = %self.id, auth_type, "Updated SSO entry credentials");
        Ok(())
    }

    /// Current replicated projection.
    pub fn snapshot(&self) -> SsoEntrySnapshot {
        self.lock().snapshot.clone()
    }

    /// Read the base state and the snapshot under one lock acquisition.
    pub fn with_views<R>(&self, f: impl FnOnce(&B, &SsoEntrySnapshot) -> R) -> R {
        let state = self.lock();
        f(&state.base, &state.snapshot)
    }

    pub fn version(&self) -> u64 {
        self.lock().base.version()
    }

    pub fn principal(&self) -> Option<Arc<dyn Principal>> {
        self.lock().base.principal().cloned()
    }

    pub fn auth_type(&self) -> String {
        self.lock().base.auth_type().to_string()
    }

    pub fn username(&self) -> String {
        self.lock().base.username().to_string()
    }

    pub fn realm_name(&self) -> String {
        self.lock().base.realm_name().to_string()
    }

    pub fn last_access_ms(&self) -> u64 {
        self.lock().base.last_access_ms()
    }

    pub fn bindings(&self) -> BTreeSet<SessionBinding> {
        self.lock().base.sessions().clone()
    }

    pub fn session_count(&self) -> usize {
        self.lock().base.sessions().len()
    }

    pub fn is_bound(&self, binding: &SessionBinding) -> bool {
        self.lock().base.sessions().contains(binding)
    }

    pub fn is_idle_expired(&self, now_ms: u64) -> bool {
        self.lock().snapshot.is_idle_expired(now_ms)
    }
}

impl<B: SsoState> fmt::Debug for SsoEntry<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("SsoEntry");
        out.field("id", &self.id);
        // Formatting may happen on the thread that already holds the lock.
        let state = match self.state.try_lock() {
            Ok(state) => Some(state),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        };
        match state {
            Some(state) => out
                .field("version", &state.base.version())
                .field("username", &state.base.username())
                .field("sessions", &state.base.sessions().len()),
            None => out.field("state", &format_args!("<locked>")),
        };
        out.field("max_idle_ms", &self.max_idle_ms).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::LocalSession;
    use crate::principal::{JsonPrincipalCodec, PrincipalTypes, UserPrincipal, principals_equivalent};
    use std::collections::HashSet;
    use std::thread;

    fn fresh(version: u64) -> SsoEntry {
        SsoEntry::new(
            NewSsoEntry {
                id: "sso-1".into(),
                principal: Some(Arc::new(UserPrincipal::new("alice"))),
                auth_type: "FORM".into(),
                username: "alice".into(),
                realm_name: "file".into(),
                last_access_ms: 1_000,
                max_idle_ms: 60_000,
                version,
            },
            &JsonPrincipalCodec,
        )
        .unwrap()
    }

    fn assert_mirrored(entry: &SsoEntry) {
        entry.with_views(|base, snap| {
            assert_eq!(base.sessions(), snap.bindings());
            assert_eq!(base.version(), snap.version());
            assert_eq!(base.last_access_ms(), snap.last_access_ms());
        });
    }

    #[test]
    fn fresh_entry_projects_all_fields() {
        let entry = fresh(0);
        let snap = entry.snapshot();
        assert_eq!(snap.id(), "sso-1");
        assert_eq!(snap.version(), 0);
        assert_eq!(snap.auth_type(), "FORM");
        assert_eq!(snap.username(), "alice");
        assert_eq!(snap.realm_name(), "file");
        assert_eq!(snap.last_access_ms(), 1_000);
        assert_eq!(snap.max_idle_ms(), 60_000);
        assert!(snap.bindings().is_empty());

        let decoded = snap
            .decode_principal(&JsonPrincipalCodec, &PrincipalTypes::with_defaults())
            .unwrap();
        assert!(principals_equivalent(decoded.as_ref(), entry.principal().as_ref()));
    }

    #[test]
    fn fresh_entry_without_principal() {
        let entry = SsoEntry::new(
            NewSsoEntry {
                id: "anon".into(),
                principal: None,
                auth_type: "BASIC".into(),
                username: String::new(),
                realm_name: "file".into(),
                last_access_ms: 0,
                max_idle_ms: 0,
                version: 0,
            },
            &JsonPrincipalCodec,
        )
        .unwrap();
        assert_eq!(*entry.snapshot().principal(), PrincipalBlob::Absent);
        assert!(entry.principal().is_none());
    }

    #[test]
    fn add_and_remove_mirror_into_snapshot() {
        let entry = fresh(0);
        let s1 = LocalSession::new("s1", "/a");
        let s2 = LocalSession::new("s2", "/b");

        assert!(entry.add_session(&s1));
        assert!(entry.add_session(&s2));
        assert!(!entry.add_session(&s1));
        assert_mirrored(&entry);
        assert_eq!(entry.session_count(), 2);

        assert!(entry.remove_session(&s1));
        assert_mirrored(&entry);
        assert!(!entry.is_bound(&SessionBinding::new("s1", "/a")));
        assert!(entry.is_bound(&SessionBinding::new("s2", "/b")));
    }

    #[test]
    fn session_changes_do_not_bump_version() {
        let entry = fresh(5);
        entry.add_session(&LocalSession::new("s1", "/a"));
        entry.remove_session(&LocalSession::new("s1", "/a"));
        assert_eq!(entry.version(), 5);
        assert_eq!(entry.snapshot().version(), 5);
    }

    #[test]
    fn removing_unbound_session_is_noop() {
        let entry = fresh(2);
        entry.add_session(&LocalSession::new("s1", "/a"));
        let before = entry.snapshot();
        assert!(!entry.remove_session(&LocalSession::new("ghost", "/a")));
        assert_eq!(entry.snapshot(), before);
        assert_eq!(entry.version(), 2);
    }

    #[test]
    fn increment_mirrors_version() {
        let entry = fresh(10);
        assert_eq!(entry.increment_and_get_version(), Ok(11));
        assert_eq!(entry.increment_and_get_version(), Ok(12));
        assert_eq!(entry.snapshot().version(), 12);
        assert_mirrored(&entry);
    }

    #[test]
    fn exhausted_version_is_reported_not_repeated() {
        let entry = fresh(u64::MAX - 1);
        assert_eq!(entry.increment_and_get_version(), Ok(u64::MAX));

        let err = entry.increment_and_get_version().unwrap_err();
        assert_eq!(err.entry_id, "sso-1");
        assert_eq!(err.version, u64::MAX);
        assert_eq!(entry.version(), u64::MAX);
        assert_eq!(entry.snapshot().version(), u64::MAX);
        assert_mirrored(&entry);
    }

    #[test]
    fn last_access_is_not_clamped() {
        let entry = fresh(0);
        entry.set_last_access_time(5_000);
        entry.set_last_access_time(4_000);
        assert_eq!(entry.last_access_ms(), 4_000);
        assert_eq!(entry.snapshot().last_access_ms(), 4_000);
    }

    #[test]
    fn update_credentials_reencodes_principal() {
        let entry = fresh(0);
        let bob: Arc<dyn Principal> = Arc::new(UserPrincipal::new("bob"));
        entry
            .update_credentials(
                Some(Arc::clone(&bob)),
                "CLIENT_CERT",
                "bob",
                Some("p@ss!".into()),
                &JsonPrincipalCodec,
            )
            .unwrap();

        let snap = entry.snapshot();
        assert_eq!(snap.username(), "bob");
        assert_eq!(snap.auth_type(), "CLIENT_CERT");
        let decoded = snap
            .decode_principal(&JsonPrincipalCodec, &PrincipalTypes::with_defaults())
            .unwrap();
        assert!(principals_equivalent(decoded.as_ref(), Some(&bob)));
        assert!(!snap.to_json().unwrap().contains("p@ss!"));
        entry.with_views(|base, _| assert_eq!(base.password(), Some("p@ss!")));
    }

    #[test]
    fn username_and_principal_name_are_independent() {
        let entry = SsoEntry::new(
            NewSsoEntry {
                id: "sso-x".into(),
                principal: Some(Arc::new(UserPrincipal::new("CN=Alice,O=Example"))),
                auth_type: "CLIENT_CERT".into(),
                username: "alice".into(),
                realm_name: "certificate".into(),
                last_access_ms: 0,
                max_idle_ms: 0,
                version: 0,
            },
            &JsonPrincipalCodec,
        )
        .unwrap();
        assert_eq!(entry.username(), "alice");
        assert_eq!(
            entry.principal().map(|p| p.name().to_string()).as_deref(),
            Some("CN=Alice,O=Example")
        );
    }

    #[test]
    fn concurrent_increments_are_unique_and_increasing() {
        let entry = Arc::new(fresh(0));
        let threads = 8;
        let per_thread = 250;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let entry = Arc::clone(&entry);
                thread::spawn(move || {
                    let mut seen = Vec::with_capacity(per_thread);
                    for _ in 0..per_thread {
                        seen.push(entry.increment_and_get_version().unwrap());
                    }
                    seen
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            let seen = handle.join().unwrap();
            assert!(seen.windows(2).all(|w| w[0] < w[1]), "per-thread order");
            for v in seen {
                assert!(all.insert(v), "duplicate version {v}");
            }
        }
        let total = (threads * per_thread) as u64;
        assert_eq!(all.len() as u64, total);
        assert_eq!(entry.version(), total);
        assert_eq!(entry.snapshot().version(), total);
    }

    #[test]
    fn readers_never_observe_torn_state() {
        let entry = Arc::new(fresh(0));
        let writer = {
            let entry = Arc::clone(&entry);
            thread::spawn(move || {
                for i in 0..500 {
                    let s = LocalSession::new(format!("s{}", i % 17), "/app");
                    if i % 3 == 0 {
                        entry.remove_session(&s);
                    } else {
                        entry.add_session(&s);
                    }
                    entry.increment_and_get_version().unwrap();
                    entry.set_last_access_time(i);
                }
            })
        };
        let reader = {
            let entry = Arc::clone(&entry);
            thread::spawn(move || {
                for _ in 0..500 {
                    assert_mirrored(&entry);
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
        assert_mirrored(&entry);
    }

    #[test]
    fn debug_does_not_leak_principal_bytes() {
        let entry = fresh(0);
        let dbg = format!("{entry:?}");
        assert!(dbg.contains("sso-1"));
        assert!(!dbg.contains("SSOP"));
    }

    #[test]
    fn debug_inside_with_views_reports_locked_state() {
        let entry = fresh(3);
        let dbg = entry.with_views(|_, _| format!("{entry:?}"));
        assert!(dbg.contains("sso-1"));
        assert!(dbg.contains("<locked>"));
        assert!(!dbg.contains("version"));

        let unlocked = format!("{entry:?}");
        assert!(unlocked.contains("version: 3"));
        assert!(!unlocked.contains("<locked>"));
    }
}
