//! sso-ha-core: replicated single-sign-on entries
//!
//! An SSO entry ties one authenticated principal to every application
//! session it covers across a container's deployed applications. This crate
//! keeps such an entry replicable: each live [`SsoEntry`] maintains a
//! serializable [`SsoEntrySnapshot`] in lockstep with its live state, and a
//! node that takes over after a peer fails can [`inflate`] a received
//! snapshot back into a live entry.
//!
//! # Architecture
//!
//! ```text
//! authenticate → SsoEntry ──(same lock)──> SsoEntrySnapshot ──> replication
//!                                                                   ↓
//!   ContainerRegistry / SessionManager ←── inflate ←── SsoEntrySnapshot
//! ```
//!
//! # Modules
//!
//! - `principal`: principal trait, type registry, and the byte codec
//! - `snapshot`: session bindings, principal blobs, and the replicable snapshot
//! - `base`: non-replicated SSO state the live entry composes over
//! - `entry`: the live replicated entry
//! - `container`: container/session-manager collaborators and in-memory impls
//! - `inflate`: failover reconstruction with partial reattachment
//! - `config`: Configuration management
//! - `logging`: tracing subscriber setup
//! - `error`: error types and remediation hints
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod base;
pub mod config;
pub mod container;
pub mod entry;
pub mod error;
pub mod inflate;
pub mod logging;
pub mod principal;
pub mod snapshot;

pub use base::{BaseSsoEntry, SsoState};
pub use entry::{NewSsoEntry, SsoEntry};
pub use error::{CodecError, ConfigError, Error, LookupError, ReconstructionError, Result,
    VersionOverflow,
};
pub use inflate::{
    InflationContext, InflationReport, Inflated, SkipReason, SkippedBinding, inflate, inflate_as,
};
pub use principal::{JsonPrincipalCodec, Principal, PrincipalCodec, PrincipalTypes, UserPrincipal};
pub use snapshot::{PrincipalBlob, SessionBinding, SsoEntrySnapshot};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
