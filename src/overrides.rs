//! Zone-override file management.
//!
//! Each file in the override directory declares one zone redirect with a
//! static answer, in unbound syntax. The resolver base config includes the
//! whole directory by glob, so files written here (or authored by hand) are
//! loaded verbatim on the next restart. Files written by this module carry
//! an ownership marker so removal never touches hand-authored ones.

use std::path::{Path, PathBuf};

use crate::error::{BootstrapError, Result};

/// Marker comment embedded in every managed override file.
const MANAGED_BY_MARKER: &str = "# managed by macos-localdev";

/// A single zone redirect: every name under `zone` answers with `address`.
#[derive(Debug, Clone)]
pub struct ZoneOverride {
    /// Zone apex without the trailing dot (e.g. `"custom"`).
    pub zone: String,
    /// Static A-record answer (e.g. `"127.0.0.1"`).
    pub address: String,
}

impl ZoneOverride {
    /// Creates a new override.
    #[must_use]
    pub fn new(zone: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            address: address.into(),
        }
    }
}

/// Manages `<zones dir>/<zone>.conf` files.
///
/// Changes take effect after a resolver restart-and-flush cycle
/// ([`crate::resolver::restart_and_flush`]).
pub struct ZoneOverrides {
    zones_dir: PathBuf,
}

impl ZoneOverrides {
    /// Creates a manager for the given directory.
    #[must_use]
    pub fn new(zones_dir: impl Into<PathBuf>) -> Self {
        Self {
            zones_dir: zones_dir.into(),
        }
    }

    /// Returns the override directory path.
    #[must_use]
    pub fn zones_dir(&self) -> &Path {
        &self.zones_dir
    }

    /// Writes `<zone>.conf` declaring the redirect.
    ///
    /// Calling this again for the same zone overwrites the previous file.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Io`] if the directory cannot be created or
    /// the file cannot be written.
    pub fn register(&self, entry: &ZoneOverride) -> Result<()> {
        if !self.zones_dir.exists() {
            std::fs::create_dir_all(&self.zones_dir)?;
        }

        let path = self.zone_path(&entry.zone);
        std::fs::write(&path, generate_file_content(entry))?;

        tracing::info!(
            zone = %entry.zone,
            address = %entry.address,
            path = %path.display(),
            "Registered zone override"
        );
        Ok(())
    }

    /// Removes `<zone>.conf`.
    ///
    /// Only removes files that contain the ownership marker; hand-authored
    /// files are left untouched and a [`BootstrapError::NotManaged`] error
    /// is returned. If the file does not exist, this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Io`] on I/O failure, or
    /// [`BootstrapError::NotManaged`] for a hand-authored file.
    pub fn unregister(&self, zone: &str) -> Result<()> {
        let path = self.zone_path(zone);

        if !path.exists() {
            tracing::debug!(zone, "Override file does not exist, skipping");
            return Ok(());
        }

        if !is_managed(&path) {
            tracing::warn!(
                zone,
                path = %path.display(),
                "Override file not managed by this tool, refusing to remove"
            );
            return Err(BootstrapError::NotManaged {
                zone: zone.to_string(),
            });
        }

        std::fs::remove_file(&path)?;
        tracing::info!(zone, "Unregistered zone override");
        Ok(())
    }

    /// Lists all zones with a managed override file.
    ///
    /// Returns an empty vec if the directory does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Io`] if the directory cannot be read.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.zones_dir.exists() {
            return Ok(Vec::new());
        }

        let mut zones = Vec::new();
        for entry in std::fs::read_dir(&self.zones_dir)? {
            let path = entry?.path();
            if path.is_file() && is_managed(&path) {
                if let Some(stem) = path.file_stem().and_then(|n| n.to_str()) {
                    zones.push(stem.to_string());
                }
            }
        }
        Ok(zones)
    }

    /// Returns `true` if `zone` has a managed override file on disk.
    #[must_use]
    pub fn is_registered(&self, zone: &str) -> bool {
        let path = self.zone_path(zone);
        path.exists() && is_managed(&path)
    }

    fn zone_path(&self, zone: &str) -> PathBuf {
        self.zones_dir.join(format!("{zone}.conf"))
    }
}

// ---------------------------------------------------------------------------
// File content helpers
// ---------------------------------------------------------------------------

/// Generates override file content.
///
/// ```text
/// # managed by macos-localdev
/// local-zone: "custom." redirect
/// local-data: "custom. A 127.0.0.1"
/// ```
fn generate_file_content(entry: &ZoneOverride) -> String {
    format!(
        "{MANAGED_BY_MARKER}\nlocal-zone: \"{zone}.\" redirect\nlocal-data: \"{zone}. A {addr}\"\n",
        zone = entry.zone,
        addr = entry.address,
    )
}

/// Checks whether a file contains the ownership marker.
fn is_managed(path: &Path) -> bool {
    std::fs::read_to_string(path).is_ok_and(|c| c.contains(MANAGED_BY_MARKER))
}
