//! Filesystem layout.
//!
//! All artifact locations are derived from a single [`Paths`] value so tests
//! can point every step at a tempdir instead of the live system.

use std::path::{Path, PathBuf};

/// Default sudoers drop-in location.
const DEFAULT_SUDOERS_FILE: &str = "/etc/sudoers.d/macos-localdev";

/// Filesystem locations of every artifact the bootstrap manages.
///
/// The default layout lives under `~/.config/localdev`:
///
/// ```text
/// ~/.config/localdev/
///   ca/root.key          root CA private key (0600)
///   ca/root.crt          root CA certificate
///   ca/profiles.toml     signing-profile document
///   zones/*.conf         resolver zone overrides (include glob)
///   certs/<host>.*       issued leaf material
/// ```
#[derive(Debug, Clone)]
pub struct Paths {
    base: PathBuf,
    sudoers_file: PathBuf,
}

impl Paths {
    /// Layout rooted at the invoking user's home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `$HOME` is unset.
    pub fn from_home() -> crate::Result<Self> {
        let home = std::env::var_os("HOME").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "HOME is not set")
        })?;
        Ok(Self::rooted(PathBuf::from(home).join(".config/localdev")))
    }

    /// Layout rooted at an arbitrary directory (useful for testing).
    #[must_use]
    pub fn rooted(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            sudoers_file: PathBuf::from(DEFAULT_SUDOERS_FILE),
            base,
        }
    }

    /// Overrides the sudoers drop-in path (useful for testing).
    #[must_use]
    pub fn with_sudoers_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sudoers_file = path.into();
        self
    }

    /// Base state directory.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Root CA private key.
    #[must_use]
    pub fn ca_key(&self) -> PathBuf {
        self.base.join("ca/root.key")
    }

    /// Root CA certificate.
    #[must_use]
    pub fn ca_cert(&self) -> PathBuf {
        self.base.join("ca/root.crt")
    }

    /// Signing-profile document.
    #[must_use]
    pub fn profiles(&self) -> PathBuf {
        self.base.join("ca/profiles.toml")
    }

    /// Directory of resolver zone-override files.
    #[must_use]
    pub fn zones_dir(&self) -> PathBuf {
        self.base.join("zones")
    }

    /// Include glob handed to the resolver base config.
    #[must_use]
    pub fn zones_glob(&self) -> String {
        format!("{}/*.conf", self.zones_dir().display())
    }

    /// Directory of issued leaf material.
    #[must_use]
    pub fn certs_dir(&self) -> PathBuf {
        self.base.join("certs")
    }

    /// Private key for an issued host.
    #[must_use]
    pub fn leaf_key(&self, host: &str) -> PathBuf {
        self.certs_dir().join(format!("{host}.key"))
    }

    /// Certificate for an issued host.
    #[must_use]
    pub fn leaf_cert(&self, host: &str) -> PathBuf {
        self.certs_dir().join(format!("{host}.crt"))
    }

    /// Chain file (leaf then root) for an issued host.
    #[must_use]
    pub fn leaf_chain(&self, host: &str) -> PathBuf {
        self.certs_dir().join(format!("{host}.chain.crt"))
    }

    /// Sudoers drop-in file.
    #[must_use]
    pub fn sudoers_file(&self) -> &Path {
        &self.sudoers_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_at_base() {
        let p = Paths::rooted("/tmp/x");
        assert_eq!(p.ca_key(), PathBuf::from("/tmp/x/ca/root.key"));
        assert_eq!(p.ca_cert(), PathBuf::from("/tmp/x/ca/root.crt"));
        assert_eq!(p.leaf_chain("a.b"), PathBuf::from("/tmp/x/certs/a.b.chain.crt"));
        assert!(p.zones_glob().ends_with("/zones/*.conf"));
    }

    #[test]
    fn sudoers_override() {
        let p = Paths::rooted("/tmp/x").with_sudoers_file("/tmp/x/sudoers");
        assert_eq!(p.sudoers_file(), Path::new("/tmp/x/sudoers"));
    }
}
