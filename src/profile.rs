//! CA signing profiles.
//!
//! A small TOML document declaring the default expiry plus named issuance
//! profiles (allowed key usages, expiry). Consumed for every leaf
//! certificate; users extend it with their own profiles.
//!
//! ```toml
//! [default]
//! expiry_days = 365
//!
//! [profiles.server]
//! usages = ["digital-signature", "key-encipherment", "server-auth"]
//! expiry_days = 365
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BootstrapError, Result};
use crate::paths::Paths;
use crate::step::{Step, StepStatus};

/// Default leaf expiry when a profile does not set its own.
const DEFAULT_EXPIRY_DAYS: u32 = 365;

/// Top-level signing-profile document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningProfiles {
    /// Defaults applied when a profile omits a field.
    pub default: Defaults,
    /// Named issuance profiles.
    pub profiles: BTreeMap<String, Profile>,
}

/// Document-wide defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Leaf validity in days.
    pub expiry_days: u32,
}

/// One named issuance profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Allowed key usages, in kebab case (`server-auth`, `client-auth`,
    /// `digital-signature`, `key-encipherment`).
    pub usages: Vec<String>,
    /// Overrides the default expiry when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_days: Option<u32>,
}

/// Effective parameters for one issuance, after default resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    /// Allowed key usages.
    pub usages: Vec<String>,
    /// Leaf validity in days.
    pub expiry_days: u32,
}

impl SigningProfiles {
    /// The document written on first run: one `server` profile suitable for
    /// local TLS termination.
    #[must_use]
    pub fn bootstrap_default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "server".to_string(),
            Profile {
                usages: vec![
                    "digital-signature".to_string(),
                    "key-encipherment".to_string(),
                    "server-auth".to_string(),
                ],
                expiry_days: None,
            },
        );
        Self {
            default: Defaults {
                expiry_days: DEFAULT_EXPIRY_DAYS,
            },
            profiles,
        }
    }

    /// Loads the document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Io`] if the file cannot be read, or
    /// [`BootstrapError::InvalidProfile`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| BootstrapError::InvalidProfile(e.to_string()))
    }

    /// Writes the document to disk.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Io`] on write failure.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)
            .map_err(|e| BootstrapError::InvalidProfile(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Resolves a named profile against the document defaults.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::InvalidProfile`] if no such profile exists.
    pub fn resolve(&self, name: &str) -> Result<ResolvedProfile> {
        let profile = self.profiles.get(name).ok_or_else(|| {
            BootstrapError::InvalidProfile(format!("no profile named `{name}`"))
        })?;
        Ok(ResolvedProfile {
            usages: profile.usages.clone(),
            expiry_days: profile.expiry_days.unwrap_or(self.default.expiry_days),
        })
    }
}

/// Writes the default signing-profile document if absent.
pub struct ProfileStep {
    paths: Paths,
}

impl ProfileStep {
    /// Creates the step.
    #[must_use]
    pub const fn new(paths: Paths) -> Self {
        Self { paths }
    }
}

impl Step for ProfileStep {
    fn name(&self) -> &str {
        "signing-profiles"
    }

    fn check(&self) -> Result<StepStatus> {
        if self.paths.profiles().exists() {
            Ok(StepStatus::Satisfied)
        } else {
            Ok(StepStatus::Needed(format!(
                "write {}",
                self.paths.profiles().display()
            )))
        }
    }

    fn apply(&self) -> Result<()> {
        let path = self.paths.profiles();
        SigningProfiles::bootstrap_default().save(&path)?;
        tracing::info!(path = %path.display(), "Wrote signing profiles");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_default_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");

        let doc = SigningProfiles::bootstrap_default();
        doc.save(&path).unwrap();

        let loaded = SigningProfiles::load(&path).unwrap();
        assert_eq!(loaded.default.expiry_days, DEFAULT_EXPIRY_DAYS);
        assert!(loaded.profiles.contains_key("server"));
    }

    #[test]
    fn resolve_applies_default_expiry() {
        let doc = SigningProfiles::bootstrap_default();
        let resolved = doc.resolve("server").unwrap();
        assert_eq!(resolved.expiry_days, DEFAULT_EXPIRY_DAYS);
        assert!(resolved.usages.contains(&"server-auth".to_string()));
    }

    #[test]
    fn resolve_prefers_profile_expiry() {
        let mut doc = SigningProfiles::bootstrap_default();
        doc.profiles.insert(
            "short".to_string(),
            Profile {
                usages: vec!["server-auth".to_string()],
                expiry_days: Some(7),
            },
        );
        assert_eq!(doc.resolve("short").unwrap().expiry_days, 7);
    }

    #[test]
    fn resolve_unknown_profile_errors() {
        let doc = SigningProfiles::bootstrap_default();
        assert!(doc.resolve("nope").is_err());
    }

    #[test]
    fn user_extended_document_parses() {
        let text = r#"
            [default]
            expiry_days = 30

            [profiles.server]
            usages = ["server-auth"]

            [profiles.client]
            usages = ["client-auth"]
            expiry_days = 90
        "#;
        let doc: SigningProfiles = toml::from_str(text).unwrap();
        assert_eq!(doc.resolve("server").unwrap().expiry_days, 30);
        assert_eq!(doc.resolve("client").unwrap().expiry_days, 90);
    }

    #[test]
    fn step_is_idempotent_on_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::rooted(dir.path());
        let step = ProfileStep::new(paths.clone());

        assert!(matches!(step.check().unwrap(), StepStatus::Needed(_)));
        step.apply().unwrap();
        assert_eq!(step.check().unwrap(), StepStatus::Satisfied);
    }
}
