//! Serializable projection of an SSO entry.
//!
//! [`SsoEntrySnapshot`] is what replication moves between nodes: the
//! entry's scalar fields, its principal as an opaque [`PrincipalBlob`], and
//! its session bindings as plain identifiers. The live [`crate::entry::SsoEntry`]
//! keeps exactly one snapshot current under its own lock and hands out
//! clones.
//!
//! # Payload
//!
//! ```json
//! {
//!   "id": "7F3A...",
//!   "version": 4,
//!   "principal": { "state": "present", "bytes": "U1NPUAF7..." },
//!   "auth_type": "FORM",
//!   "username": "alice",
//!   "realm_name": "file",
//!   "last_access_ms": 1700000000000,
//!   "max_idle_ms": 1800000,
//!   "bindings": [ { "session_id": "s1", "context_path": "/shop" } ]
//! }
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::principal::{Principal, PrincipalCodec, PrincipalTypes};

// =============================================================================
// Session binding
// =============================================================================

/// One application session covered by an SSO identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionBinding {
    pub session_id: String,
    pub context_path: String,
}

impl SessionBinding {
    #[must_use]
    pub fn new(session_id: impl Into<String>, context_path: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            context_path: context_path.into(),
        }
    }
}

impl fmt::Display for SessionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.session_id, self.context_path)
    }
}

// =============================================================================
// Principal blob
// =============================================================================

/// Replicated form of an optional principal.
///
/// An absent principal is an explicit marker, never an empty byte vector.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PrincipalBlob {
    Absent,
    Present {
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
    },
}

impl fmt::Debug for PrincipalBlob {
    // Principal bytes stay out of logs and panic messages.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Present { bytes } => write!(f, "Present({} bytes)", bytes.len()),
        }
    }
}

impl PrincipalBlob {
    pub fn encode(
        codec: &dyn PrincipalCodec,
        principal: Option<&dyn Principal>,
    ) -> Result<Self, CodecError> {
        match principal {
            None => Ok(Self::Absent),
            Some(p) => Ok(Self::Present {
                bytes: codec.encode(p)?,
            }),
        }
    }

    pub fn decode(
        &self,
        codec: &dyn PrincipalCodec,
        types: &PrincipalTypes,
    ) -> Result<Option<Arc<dyn Principal>>, CodecError> {
        match self {
            Self::Absent => Ok(None),
            Self::Present { bytes } => codec.decode(bytes, types).map(Some),
        }
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Absent => None,
            Self::Present { bytes } => Some(bytes),
        }
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time copy of one SSO entry's replicated state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsoEntrySnapshot {
    id: String,
    version: u64,
    principal: PrincipalBlob,
    auth_type: String,
    username: String,
    realm_name: String,
    last_access_ms: u64,
    max_idle_ms: u64,
    #[serde(default)]
    bindings: BTreeSet<SessionBinding>,
}

impl SsoEntrySnapshot {
    /// Snapshot with no bindings.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        version: u64,
        principal: PrincipalBlob,
        auth_type: impl Into<String>,
        username: impl Into<String>,
        realm_name: impl Into<String>,
        last_access_ms: u64,
        max_idle_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            version,
            principal,
            auth_type: auth_type.into(),
            username: username.into(),
            realm_name: realm_name.into(),
            last_access_ms,
            max_idle_ms,
            bindings: BTreeSet::new(),
        }
    }

    /// Serialize a principal for inclusion in a snapshot.
    pub fn encode_principal(
        codec: &dyn PrincipalCodec,
        principal: Option<&dyn Principal>,
    ) -> Result<PrincipalBlob, CodecError> {
        PrincipalBlob::encode(codec, principal)
    }

    /// Decode this snapshot's principal against the caller's known types.
    pub fn decode_principal(
        &self,
        codec: &dyn PrincipalCodec,
        types: &PrincipalTypes,
    ) -> Result<Option<Arc<dyn Principal>>, CodecError> {
        self.principal.decode(codec, types)
    }

    /// Returns `true` if the binding was not already present.
    pub fn add_binding(&mut self, binding: SessionBinding) -> bool {
        self.bindings.insert(binding)
    }

    /// Returns `true` if the binding was present. Absent bindings are a no-op.
    pub fn remove_binding(&mut self, binding: &SessionBinding) -> bool {
        self.bindings.remove(binding)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn principal(&self) -> &PrincipalBlob {
        &self.principal
    }

    pub fn auth_type(&self) -> &str {
        &self.auth_type
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn realm_name(&self) -> &str {
        &self.realm_name
    }

    pub fn last_access_ms(&self) -> u64 {
        self.last_access_ms
    }

    pub fn max_idle_ms(&self) -> u64 {
        self.max_idle_ms
    }

    pub fn bindings(&self) -> &BTreeSet<SessionBinding> {
        &self.bindings
    }

    /// Whether `self` is a newer replica of the same entry than `other`.
    pub fn supersedes(&self, other: &Self) -> bool {
        self.id == other.id && self.version > other.version
    }

    /// Instant after which the entry may be expired, or `None` when
    /// `max_idle_ms` is zero (no idle timeout).
    pub fn idle_deadline_ms(&self) -> Option<u64> {
        (self.max_idle_ms > 0).then(|| self.last_access_ms.saturating_add(self.max_idle_ms))
    }

    pub fn is_idle_expired(&self, now_ms: u64) -> bool {
        self.max_idle_ms > 0 && now_ms.saturating_sub(self.last_access_ms) > self.max_idle_ms
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    pub(crate) fn set_last_access_ms(&mut self, last_access_ms: u64) {
        self.last_access_ms = last_access_ms;
    }

    pub(crate) fn set_credentials(
        &mut self,
        principal: PrincipalBlob,
        auth_type: &str,
        username: &str,
    ) {
        self.principal = principal;
        auth_type.clone_into(&mut self.auth_type);
        username.clone_into(&mut self.username);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::{JsonPrincipalCodec, UserPrincipal};

    fn sample() -> SsoEntrySnapshot {
        let blob = SsoEntrySnapshot::encode_principal(
            &JsonPrincipalCodec,
            Some(&UserPrincipal::new("alice")),
        )
        .unwrap();
        SsoEntrySnapshot::new("sso-1", 3, blob, "FORM", "alice", "file", 1_000, 500)
    }

    #[test]
    fn absent_principal_is_explicit_marker() {
        let blob = SsoEntrySnapshot::encode_principal(&JsonPrincipalCodec, None).unwrap();
        assert_eq!(blob, PrincipalBlob::Absent);
        assert!(blob.as_bytes().is_none());
        let json = serde_json::to_string(&blob).unwrap();
        assert_eq!(json, r#"{"state":"absent"}"#);
        let decoded = blob
            .decode(&JsonPrincipalCodec, &PrincipalTypes::with_defaults())
            .unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn bindings_have_set_semantics() {
        let mut snap = sample();
        let b = SessionBinding::new("s1", "/app1");
        assert!(snap.add_binding(b.clone()));
        assert!(!snap.add_binding(b.clone()));
        assert_eq!(snap.bindings().len(), 1);

        assert!(snap.remove_binding(&b));
        assert!(!snap.remove_binding(&b));
        assert!(snap.bindings().is_empty());
    }

    #[test]
    fn removing_unknown_binding_leaves_snapshot_unchanged() {
        let mut snap = sample();
        snap.add_binding(SessionBinding::new("s1", "/app1"));
        let before = snap.clone();
        assert!(!snap.remove_binding(&SessionBinding::new("s1", "/other")));
        assert_eq!(snap, before);
    }

    #[test]
    fn json_payload_roundtrip() {
        let mut snap = sample();
        snap.add_binding(SessionBinding::new("s2", "/b"));
        snap.add_binding(SessionBinding::new("s1", "/a"));
        let json = snap.to_json().unwrap();
        assert!(json.contains(r#""state":"present""#));
        assert!(json.contains(r#""last_access_ms":1000"#));
        let back = SsoEntrySnapshot::from_json(&json).unwrap();
        assert_eq!(back, snap);

        let principal = back
            .decode_principal(&JsonPrincipalCodec, &PrincipalTypes::with_defaults())
            .unwrap()
            .unwrap();
        assert_eq!(principal.name(), "alice");
    }

    #[test]
    fn missing_bindings_field_defaults_to_empty() {
        let json = r#"{"id":"x","version":0,"principal":{"state":"absent"},
            "auth_type":"BASIC","username":"u","realm_name":"r",
            "last_access_ms":0,"max_idle_ms":0}"#;
        let snap = SsoEntrySnapshot::from_json(json).unwrap();
        assert!(snap.bindings().is_empty());
    }

    #[test]
    fn bad_base64_rejected() {
        let json = r#"{"id":"x","version":0,"principal":{"state":"present","bytes":"***"},
            "auth_type":"BASIC","username":"u","realm_name":"r",
            "last_access_ms":0,"max_idle_ms":0}"#;
        assert!(SsoEntrySnapshot::from_json(json).is_err());
    }

    #[test]
    fn supersedes_requires_same_id_and_newer_version() {
        let old = sample();
        let mut newer = old.clone();
        newer.set_version(4);
        assert!(newer.supersedes(&old));
        assert!(!old.supersedes(&newer));
        assert!(!old.supersedes(&old));

        let other = SsoEntrySnapshot::new("sso-2", 99, PrincipalBlob::Absent, "", "", "", 0, 0);
        assert!(!other.supersedes(&old));
    }

    #[test]
    fn idle_expiry() {
        let snap = sample(); // last access 1000, max idle 500
        assert_eq!(snap.idle_deadline_ms(), Some(1_500));
        assert!(!snap.is_idle_expired(1_500));
        assert!(snap.is_idle_expired(1_501));
        assert!(!snap.is_idle_expired(0));

        let forever = SsoEntrySnapshot::new("x", 0, PrincipalBlob::Absent, "", "", "", 0, 0);
        assert_eq!(forever.idle_deadline_ms(), None);
        assert!(!forever.is_idle_expired(u64::MAX));
    }

    #[test]
    fn debug_hides_principal_bytes() {
        let snap = sample();
        let dbg = format!("{:?}", snap.principal());
        assert!(dbg.starts_with("Present("));
        assert!(!dbg.contains("SSOP"));
    }

    #[test]
    fn binding_display() {
        assert_eq!(SessionBinding::new("abc", "/shop").to_string(), "abc@/shop");
    }
}
