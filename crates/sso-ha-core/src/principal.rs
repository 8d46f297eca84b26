//! Authenticated principals and their replication codec.
//!
//! A principal travels between nodes as an opaque byte blob. The sending
//! node encodes it with a [`PrincipalCodec`]; the receiving node decodes it
//! against its own [`PrincipalTypes`], which lists the principal types that
//! node has loaded. A blob naming a type the receiver does not know is an
//! [`CodecError::UnresolvedType`], never a silent fallback.
//!
//! # Wire format ([`JsonPrincipalCodec`])
//!
//! ```text
//! b"SSOP" | format version (1 byte) | {"type": "<tag>", "body": <principal JSON>}
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Blob header identifying the JSON principal format.
const PRINCIPAL_MAGIC: &[u8; 4] = b"SSOP";

/// Current JSON principal format version.
const PRINCIPAL_FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = PRINCIPAL_MAGIC.len() + 1;

// =============================================================================
// Principal
// =============================================================================

/// A live authenticated identity.
///
/// `name()` is the principal's own notion of who it is. It is independent of
/// the username an SSO entry was created with; neither is derived from the
/// other.
pub trait Principal: fmt::Debug + Send + Sync + 'static {
    /// Principal name as reported by the authenticating realm.
    fn name(&self) -> &str;

    /// Stable tag used to resolve the concrete type on the receiving node.
    fn type_tag(&self) -> &str;

    /// JSON body carried inside the replicated blob.
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Identity equivalence: same type and same replicated body.
    fn equivalent(&self, other: &dyn Principal) -> bool {
        if self.type_tag() != other.type_tag() {
            return false;
        }
        match (self.to_json(), other.to_json()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

/// A principal type that can be registered in [`PrincipalTypes`].
pub trait PrincipalType: Principal + DeserializeOwned {
    const TYPE_TAG: &'static str;
}

/// Compare two optional principals by identity equivalence.
#[must_use]
pub fn principals_equivalent(
    a: Option<&Arc<dyn Principal>>,
    b: Option<&Arc<dyn Principal>>,
) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.equivalent(b.as_ref()),
        _ => false,
    }
}

/// Principal produced by username/password style realms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPrincipal {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

impl UserPrincipal {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

impl Principal for UserPrincipal {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_tag(&self) -> &str {
        Self::TYPE_TAG
    }

    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl PrincipalType for UserPrincipal {
    const TYPE_TAG: &'static str = "user";
}

// =============================================================================
// Type resolution
// =============================================================================

type DecodeFn = fn(serde_json::Value) -> Result<Arc<dyn Principal>, serde_json::Error>;

fn decode_as<T: PrincipalType>(body: serde_json::Value) -> Result<Arc<dyn Principal>, serde_json::Error> {
    let principal: T = serde_json::from_value(body)?;
    Ok(Arc::new(principal))
}

/// Principal types this node can resolve when decoding replicated blobs.
#[derive(Clone, Default)]
pub struct PrincipalTypes {
    decoders: HashMap<String, DecodeFn>,
}

impl fmt::Debug for PrincipalTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&str> = self.tags().collect();
        tags.sort_unstable();
        f.debug_struct("PrincipalTypes").field("tags", &tags).finish()
    }
}

impl PrincipalTypes {
    /// A context that resolves nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in principal types.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut types = Self::empty();
        types.register::<UserPrincipal>();
        types
    }

    /// Register `T` under its [`PrincipalType::TYPE_TAG`].
    pub fn register<T: PrincipalType>(&mut self) -> &mut Self {
        self.decoders
            .insert(T::TYPE_TAG.to_string(), decode_as::<T> as DecodeFn);
        self
    }

    #[must_use]
    pub fn contains(&self, type_tag: &str) -> bool {
        self.decoders.contains_key(type_tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.decoders.keys().map(String::as_str)
    }

    fn resolve(
        &self,
        type_tag: &str,
        body: serde_json::Value,
    ) -> Result<Arc<dyn Principal>, CodecError> {
        let decode = self
            .decoders
            .get(type_tag)
            .ok_or_else(|| CodecError::UnresolvedType(type_tag.to_string()))?;
        decode(body)
            .map_err(|e| CodecError::Deserialization(format!("body of `{type_tag}`: {e}")))
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Turns principals into opaque bytes and back.
pub trait PrincipalCodec: Send + Sync {
    fn encode(&self, principal: &dyn Principal) -> Result<Vec<u8>, CodecError>;

    fn decode(
        &self,
        bytes: &[u8],
        types: &PrincipalTypes,
    ) -> Result<Arc<dyn Principal>, CodecError>;
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    type_tag: String,
    body: serde_json::Value,
}

/// Default codec: versioned header followed by a tagged JSON envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPrincipalCodec;

impl PrincipalCodec for JsonPrincipalCodec {
    fn encode(&self, principal: &dyn Principal) -> Result<Vec<u8>, CodecError> {
        let type_tag = principal.type_tag().to_string();
        if type_tag.is_empty() {
            return Err(CodecError::Serialization {
                type_tag,
                reason: "empty type tag".to_string(),
            });
        }
        let body = principal.to_json().map_err(|e| CodecError::Serialization {
            type_tag: type_tag.clone(),
            reason: e.to_string(),
        })?;
        let envelope = Envelope {
            type_tag: type_tag.clone(),
            body,
        };

        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(PRINCIPAL_MAGIC);
        bytes.push(PRINCIPAL_FORMAT_VERSION);
        serde_json::to_writer(&mut bytes, &envelope).map_err(|e| CodecError::Serialization {
            type_tag,
            reason: e.to_string(),
        })?;
        Ok(bytes)
    }

    fn decode(
        &self,
        bytes: &[u8],
        types: &PrincipalTypes,
    ) -> Result<Arc<dyn Principal>, CodecError> {
        if bytes.len() < HEADER_LEN || &bytes[..PRINCIPAL_MAGIC.len()] != PRINCIPAL_MAGIC {
            return Err(CodecError::Deserialization(
                "missing principal header".to_string(),
            ));
        }
        let version = bytes[PRINCIPAL_MAGIC.len()];
        if version != PRINCIPAL_FORMAT_VERSION {
            return Err(CodecError::Deserialization(format!(
                "unsupported principal format version {version}"
            )));
        }
        let envelope: Envelope = serde_json::from_slice(&bytes[HEADER_LEN..])
            .map_err(|e| CodecError::Deserialization(e.to_string()))?;
        types.resolve(&envelope.type_tag, envelope.body)
    }
}
