//! Error types for sso-ha-core

use std::fmt::Write;
use thiserror::Error;

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Add a diagnostic command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sso-ha-core
#[derive(Error, Debug)]
pub enum Error {
    /// Principal encode/decode errors
    #[error("Principal codec error: {0}")]
    Codec(#[from] CodecError),

    /// Fatal inflation failures
    #[error("Reconstruction error: {0}")]
    Reconstruction(#[from] ReconstructionError),

    /// Version counter cannot advance
    #[error("Version error: {0}")]
    Version(#[from] VersionOverflow),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot payload (JSON) errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Codec(err) => Some(err.remediation()),
            Self::Reconstruction(err) => Some(err.remediation()),
            Self::Version(err) => Some(err.remediation()),
            Self::Config(err) => Some(err.remediation()),
            Self::Io(_) => Some(
                Remediation::new("Check file permissions and paths, then retry.")
                    .alternative("Verify the snapshot file exists and is readable."),
            ),
            Self::Json(_) => Some(
                Remediation::new("The snapshot payload is not valid JSON for this version.")
                    .command("Inspect payload", "sso-ha inspect <snapshot.json>")
                    .alternative("Check that sender and receiver run the same sso-ha release."),
            ),
        }
    }
}

/// Principal serialization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The principal could not be turned into bytes
    #[error("principal of type `{type_tag}` is not serializable: {reason}")]
    Serialization { type_tag: String, reason: String },

    /// The principal bytes are truncated, corrupt, or not in a known format
    #[error("malformed principal blob: {0}")]
    Deserialization(String),

    /// The blob names a principal type this node has not registered
    #[error("principal type `{0}` is not registered on this node")]
    UnresolvedType(String),
}

impl CodecError {
    /// Whether this error came from the decode direction.
    #[must_use]
    pub fn is_deserialization(&self) -> bool {
        matches!(self, Self::Deserialization(_) | Self::UnresolvedType(_))
    }

    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Serialization { .. } => Remediation::new(
                "Principal type cannot be replicated. Make its JSON form infallible.",
            )
            .alternative("Register a principal type whose fields are plain data."),
            Self::Deserialization(_) => {
                Remediation::new("Principal blob is corrupt. Force re-authentication.")
                    .command("Inspect payload", "sso-ha inspect <snapshot.json>")
                    .alternative("Drop the replicated entry and let the user log in again.")
            }
            Self::UnresolvedType(_) => Remediation::new(
                "Register the principal type on this node before accepting replicas.",
            )
            .alternative("Deploy the same principal types on every cluster node."),
        }
    }
}

/// Fatal failure while rebuilding a live entry from a replicated snapshot.
///
/// Carries the entry id so the replication-receive path can drop the
/// identity and force re-authentication.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot reconstruct SSO entry {entry_id}: {source}")]
pub struct ReconstructionError {
    pub entry_id: String,
    #[source]
    pub source: CodecError,
}

impl ReconstructionError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        Remediation::new(format!(
            "SSO entry {} is unrecoverable on this node. Force re-authentication.",
            self.entry_id
        ))
        .command("Inspect payload", "sso-ha inspect <snapshot.json>")
        .alternative(self.source.remediation().summary)
    }
}

/// The entry's version is already `u64::MAX`; the version is left unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("version of SSO entry {entry_id} cannot advance past {version}")]
pub struct VersionOverflow {
    pub entry_id: String,
    pub version: u64,
}

impl VersionOverflow {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        Remediation::new(format!(
            "SSO entry {} can no longer be ordered for replication. Force re-authentication.",
            self.entry_id
        ))
        .alternative("Drop the entry so the next login starts a fresh identity at version 0.")
    }
}

/// A session manager could not answer a lookup.
///
/// Never fatal to inflation: the binding is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    #[error("session {session_id} could not be loaded: {reason}")]
    LoadFailed { session_id: String, reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::FileNotFound(_) => Remediation::new("Config file not found.")
                .command("Use explicit path", "sso-ha --config <path> inspect <snapshot.json>")
                .alternative("Run without --config to use built-in defaults."),
            Self::ReadFailed(..) => Remediation::new("Config file could not be read.")
                .alternative("Check file permissions."),
            Self::ParseFailed(_) => Remediation::new("Config file is not valid TOML.")
                .alternative("Compare against the documented [general]/[replication] tables."),
            Self::InvalidValue { field, .. } => {
                Remediation::new(format!("Fix the value of `{field}` in the config file."))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconstruction_error_names_entry() {
        let err = ReconstructionError {
            entry_id: "sso-42".to_string(),
            source: CodecError::Deserialization("truncated".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("sso-42"));
        assert!(msg.contains("truncated"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn codec_error_direction() {
        assert!(CodecError::Deserialization("x".into()).is_deserialization());
        assert!(CodecError::UnresolvedType("x".into()).is_deserialization());
        assert!(
            !CodecError::Serialization {
                type_tag: "user".into(),
                reason: "x".into()
            }
            .is_deserialization()
        );
    }

    #[test]
    fn every_error_has_remediation() {
        let errors = vec![
            Error::Codec(CodecError::UnresolvedType("ldap".into())),
            Error::Reconstruction(ReconstructionError {
                entry_id: "a".into(),
                source: CodecError::Deserialization("bad".into()),
            }),
            Error::Version(VersionOverflow {
                entry_id: "b".into(),
                version: u64::MAX,
            }),
            Error::Config(ConfigError::FileNotFound("x".into())),
            Error::Io(std::io::Error::other("boom")),
        ];
        for err in errors {
            assert!(err.remediation().is_some(), "missing remediation for {err}");
        }
    }

    #[test]
    fn render_plain_lists_sections() {
        let text = Remediation::new("Do the thing")
            .command("Check", "sso-ha inspect x.json")
            .alternative("Or not")
            .render_plain();
        assert!(text.starts_with("To fix:"));
        assert!(text.contains("Commands:"));
        assert!(text.contains("- Check: sso-ha inspect x.json"));
        assert!(text.contains("Alternatives:"));
    }

    #[test]
    fn reconstruction_remediation_mentions_reauthentication() {
        let err = ReconstructionError {
            entry_id: "sso-7".into(),
            source: CodecError::UnresolvedType("kerberos".into()),
        };
        let rem = err.remediation();
        assert!(rem.summary.contains("sso-7"));
        assert!(rem.summary.contains("re-authentication"));
        assert_eq!(rem.alternatives.len(), 1);
    }
}
