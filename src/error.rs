//! Error types.

use thiserror::Error;

/// Result alias for bootstrap operations.
pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Errors returned by bootstrap steps.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Filesystem I/O failed (typically `PermissionDenied` on system paths).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An external tool exited nonzero.
    #[error("`{command}` failed (exit {code}): {stderr}")]
    CommandFailed {
        /// The command line that was run.
        command: String,
        /// Exit code, or -1 if killed by a signal.
        code: i32,
        /// Trimmed stderr output of the tool.
        stderr: String,
    },

    /// Homebrew is not installed at any known location.
    #[error("brew binary not found (looked in /opt/homebrew/bin and /usr/local/bin)")]
    BrewMissing,

    /// An external tool's output could not be interpreted.
    #[error("could not parse output of `{command}`: {detail}")]
    UnparseableOutput {
        /// The command whose output was being parsed.
        command: String,
        /// What was expected and not found.
        detail: String,
    },

    /// No free UID/GID in the reserved service-account range.
    #[error("no free service-account id in [{low}, {high}]")]
    IdRangeExhausted {
        /// Low end of the scanned range.
        low: u32,
        /// High end of the scanned range.
        high: u32,
    },

    /// Attempted to remove a zone-override file not written by this tool.
    #[error("override file not managed by macos-localdev: {zone}")]
    NotManaged {
        /// The zone whose file is unmanaged.
        zone: String,
    },

    /// Certificate generation or signing failed.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// The signing-profile document is malformed or names no such profile.
    #[error("invalid signing profile: {0}")]
    InvalidProfile(String),

    /// The resolver base config failed `unbound-checkconf` validation.
    #[error("resolver config rejected by unbound-checkconf: {0}")]
    ConfigInvalid(String),

    /// The HTTPS self-test did not complete with a validated response.
    #[error("self-test failed: {0}")]
    SelfTest(String),
}

impl BootstrapError {
    /// Returns `true` if the underlying I/O error is `PermissionDenied`.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied)
    }
}

impl From<rcgen::Error> for BootstrapError {
    fn from(e: rcgen::Error) -> Self {
        Self::Certificate(e.to_string())
    }
}
