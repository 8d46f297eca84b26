//! Failover reconstruction of SSO entries.
//!
//! When a node takes over traffic for a failed peer it receives that peer's
//! [`SsoEntrySnapshot`]s and inflates each one back into a live
//! [`SsoEntry`]. Session replication and SSO replication are independent
//! channels, so some bound sessions may not exist here yet. Those bindings
//! are skipped and reported; the entry itself survives with the bindings
//! that did resolve.
//!
//! # Data flow
//!
//! ```text
//! SsoEntrySnapshot → decode principal → blank entry → update credentials
//!                                             ↓
//!                   per binding: ContainerRegistry → SessionManager → add_session
//!                                             ↓
//!                                 Inflated { entry, report }
//! ```
//!
//! A principal that fails to decode is fatal: the entry is not returned at
//! all, because an entry without its principal would authorize requests for
//! an unauthenticated identity.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::base::{BaseSsoEntry, SsoState};
use crate::container::ContainerRegistry;
use crate::entry::{NewSsoEntry, SsoEntry};
use crate::error::ReconstructionError;
use crate::principal::{PrincipalCodec, PrincipalTypes};
use crate::snapshot::{SessionBinding, SsoEntrySnapshot};

/// Node-local collaborators needed to inflate a snapshot.
#[derive(Clone, Copy)]
pub struct InflationContext<'a> {
    pub registry: &'a dyn ContainerRegistry,
    pub codec: &'a dyn PrincipalCodec,
    pub types: &'a PrincipalTypes,
}

/// Why a binding was left out of the reconstructed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// No application is deployed at the binding's context path.
    ApplicationNotFound,
    /// The application does not know the session (not replicated yet, or expired).
    SessionNotFound,
    /// The session manager failed to answer.
    LookupFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApplicationNotFound => f.write_str("application not deployed"),
            Self::SessionNotFound => f.write_str("session not found"),
            Self::LookupFailed(reason) => write!(f, "lookup failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedBinding {
    pub binding: SessionBinding,
    pub reason: SkipReason,
}

/// Outcome of one inflation, for logging and metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InflationReport {
    pub entry_id: String,
    pub version: u64,
    pub restored: Vec<SessionBinding>,
    pub skipped: Vec<SkippedBinding>,
}

impl InflationReport {
    /// Bindings present in the received snapshot.
    pub fn requested(&self) -> usize {
        self.restored.len() + self.skipped.len()
    }

    /// Whether every binding was restored.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn applications_missing(&self) -> usize {
        self.count(|r| matches!(r, SkipReason::ApplicationNotFound))
    }

    pub fn sessions_missing(&self) -> usize {
        self.count(|r| matches!(r, SkipReason::SessionNotFound))
    }

    pub fn lookup_failures(&self) -> usize {
        self.count(|r| matches!(r, SkipReason::LookupFailed(_)))
    }

    fn count(&self, pred: impl Fn(&SkipReason) -> bool) -> usize {
        self.skipped.iter().filter(|s| pred(&s.reason)).count()
    }
}

/// A reconstructed entry and what it took to build it.
pub struct Inflated<B: SsoState = BaseSsoEntry> {
    pub entry: SsoEntry<B>,
    pub report: InflationReport,
}

impl<B: SsoState> fmt::Debug for Inflated<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inflated")
            .field("entry", &self.entry)
            .field("report", &self.report)
            .finish()
    }
}

/// Rebuild a live entry from a replicated snapshot.
pub async fn inflate(
    snapshot: &SsoEntrySnapshot,
    ctx: &InflationContext<'_>,
) -> Result<Inflated, ReconstructionError> {
    inflate_as::<BaseSsoEntry>(snapshot, ctx).await
}

/// [`inflate`] over a caller-chosen base state type.
///
/// The version is carried over unchanged and never incremented here.
pub async fn inflate_as<B: SsoState>(
    snapshot: &SsoEntrySnapshot,
    ctx: &InflationContext<'_>,
) -> Result<Inflated<B>, ReconstructionError> {
    let principal = snapshot
        .decode_principal(ctx.codec, ctx.types)
        .map_err(|source| {
            warn!(sso_id = snapshot.id(), error = %source, "Cannot decode replicated principal");
            ReconstructionError {
                entry_id: snapshot.id().to_string(),
                source,
            }
        })?;

    let entry = SsoEntry::<B>::populate(
        NewSsoEntry {
            id: snapshot.id().to_string(),
            principal,
            auth_type: snapshot.auth_type().to_string(),
            username: snapshot.username().to_string(),
            realm_name: snapshot.realm_name().to_string(),
            last_access_ms: snapshot.last_access_ms(),
            max_idle_ms: snapshot.max_idle_ms(),
            version: snapshot.version(),
        },
        snapshot.principal().clone(),
    );

    let mut report = InflationReport {
        entry_id: snapshot.id().to_string(),
        version: snapshot.version(),
        ..InflationReport::default()
    };

    for binding in snapshot.bindings() {
        let Some(app) = ctx.registry.resolve_application(&binding.context_path) else {
            debug!(
                sso_id = snapshot.id(),
                context_path = %binding.context_path,
                "Skipping binding: application not deployed on this node"
            );
            report.skipped.push(SkippedBinding {
                binding: binding.clone(),
                reason: SkipReason::ApplicationNotFound,
            });
            continue;
        };

        let reason = match app.session_manager().find_session(&binding.session_id).await {
            Ok(Some(session)) => {
                entry.add_session(session.as_ref());
                report.restored.push(session.binding());
                continue;
            }
            Ok(None) => SkipReason::SessionNotFound,
            Err(err) => SkipReason::LookupFailed(err.to_string()),
        };

        debug!(
            sso_id = snapshot.id(),
            session_id = %binding.session_id,
            context_path = %binding.context_path,
            reason = %reason,
            "Skipping binding"
        );
        report.skipped.push(SkippedBinding {
            binding: binding.clone(),
            reason,
        });
    }

    info!(
        sso_id = snapshot.id(),
        version = report.version,
        restored = report.restored.len(),
        skipped = report.skipped.len(),
        "Inflated SSO entry from replica"
    );

    Ok(Inflated { entry, report })
}
