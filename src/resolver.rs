//! Local resolver (unbound) installation and base configuration.
//!
//! The base config binds unbound to loopback, drops privileges to the
//! service account, allow-lists private client ranges, includes every file
//! in the user zone-override directory, and forwards everything unresolved
//! upstream. The file is only rewritten when it does not yet reference the
//! override directory, so user edits elsewhere in the file survive re-runs
//! once the include line is in place.

use std::path::{Path, PathBuf};

use crate::cmd;
use crate::error::{BootstrapError, Result};
use crate::paths::Paths;
use crate::step::{Step, StepStatus};

/// Formula and service name.
pub const PACKAGE: &str = "unbound";

/// Upstream forwarder for everything the overrides do not answer.
const UPSTREAM: &str = "1.1.1.1";

/// Client ranges allowed to query the resolver.
const ALLOWED_SUBNETS: &[&str] = &[
    "10.0.0.0/8",
    "127.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
];

/// Renders the base config.
fn base_config(account: &str, zones_glob: &str) -> String {
    let mut out = String::from("# managed by macos-localdev\nserver:\n");
    out.push_str("  interface: 127.0.0.1\n");
    out.push_str("  do-daemonize: no\n");
    out.push_str(&format!("  username: \"{account}\"\n"));
    for subnet in ALLOWED_SUBNETS {
        out.push_str(&format!("  access-control: {subnet} allow\n"));
    }
    out.push_str(&format!("  include: \"{zones_glob}\"\n"));
    out.push_str("\nforward-zone:\n  name: \".\"\n");
    out.push_str(&format!("  forward-addr: {UPSTREAM}\n"));
    out
}

/// Returns `true` when the config already includes the override glob.
fn references_overrides(config: &str, zones_glob: &str) -> bool {
    config.contains(zones_glob)
}

/// Validates a config file with `unbound-checkconf`.
///
/// # Errors
///
/// Returns [`BootstrapError::ConfigInvalid`] carrying the checker's
/// diagnostics when the file does not parse. The caller must not (re)start
/// the service after this fails.
pub fn check_config(config_path: &Path) -> Result<()> {
    match cmd::run("unbound-checkconf", &[&config_path.display().to_string()]) {
        Ok(_) => Ok(()),
        Err(BootstrapError::CommandFailed { stderr, .. }) => {
            Err(BootstrapError::ConfigInvalid(stderr))
        }
        Err(other) => Err(other),
    }
}

/// Restarts the resolver and flushes the OS DNS caches.
///
/// These are exactly the three commands the sudoers drop-in delegates;
/// the brew path is resolved to its absolute location so the delegation
/// actually matches.
///
/// # Errors
///
/// Returns [`BootstrapError::BrewMissing`] when Homebrew is absent, or
/// propagates the first failing command.
pub fn restart_and_flush() -> Result<()> {
    let brew = crate::brew::require_binary()?;
    cmd::run_elevated(brew, &["services", "restart", PACKAGE])?;
    cmd::run_elevated("/usr/bin/dscacheutil", &["-flushcache"])?;
    cmd::run_elevated("/usr/bin/killall", &["-HUP", "mDNSResponder"])?;
    tracing::info!("Resolver restarted and DNS caches flushed");
    Ok(())
}

/// Installs unbound and writes the base config.
pub struct ResolverStep {
    paths: Paths,
    config_path: Option<PathBuf>,
    account: String,
}

impl ResolverStep {
    /// Creates the step targeting `<brew prefix>/etc/unbound/unbound.conf`.
    ///
    /// The prefix is queried lazily, after the Homebrew step has had its
    /// chance to install `brew`.
    #[must_use]
    pub fn new(paths: Paths, account: &str) -> Self {
        Self {
            paths,
            config_path: None,
            account: account.to_string(),
        }
    }

    /// Creates the step with an explicit config path (useful for testing).
    #[must_use]
    pub fn with_config_path(paths: Paths, config_path: PathBuf, account: &str) -> Self {
        Self {
            paths,
            config_path: Some(config_path),
            account: account.to_string(),
        }
    }

    fn config_path(&self) -> Result<PathBuf> {
        self.config_path.as_ref().map_or_else(
            || {
                crate::brew::prefix()
                    .map(|prefix| PathBuf::from(prefix).join("etc/unbound/unbound.conf"))
            },
            |p| Ok(p.clone()),
        )
    }

    fn write_config(&self) -> Result<()> {
        let config_path = self.config_path()?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(
            &config_path,
            base_config(&self.account, &self.paths.zones_glob()),
        )?;
        std::fs::create_dir_all(self.paths.zones_dir())?;
        tracing::info!(config = %config_path.display(), "Wrote resolver base config");
        Ok(())
    }
}

impl Step for ResolverStep {
    fn name(&self) -> &str {
        "resolver"
    }

    fn check(&self) -> Result<StepStatus> {
        if !cmd::succeeds(crate::brew::brew_binary().unwrap_or("brew"), &["list", PACKAGE]) {
            return Ok(StepStatus::Needed("install and configure unbound".into()));
        }
        let config_path = self.config_path()?;
        let current = std::fs::read_to_string(&config_path).unwrap_or_default();
        if references_overrides(&current, &self.paths.zones_glob()) {
            Ok(StepStatus::Satisfied)
        } else {
            Ok(StepStatus::Needed(format!(
                "rewrite {}",
                config_path.display()
            )))
        }
    }

    fn apply(&self) -> Result<()> {
        crate::brew::ensure_package(PACKAGE)?;
        self.write_config()?;

        let config_path = self.config_path()?;
        // The resolver drops privileges to the service account; its config
        // directory must be readable by it.
        if let Some(dir) = config_path.parent() {
            cmd::run_elevated(
                "chown",
                &["-R", &self.account, &dir.display().to_string()],
            )?;
        }

        // An invalid config must never reach a service restart; only a
        // validated rewrite goes live.
        check_config(&config_path)?;
        restart_and_flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_config_lists_private_ranges_and_upstream() {
        let config = base_config("_devdns", "/home/u/.config/localdev/zones/*.conf");
        assert!(config.contains("interface: 127.0.0.1"));
        assert!(config.contains("username: \"_devdns\""));
        for subnet in ALLOWED_SUBNETS {
            assert!(config.contains(&format!("access-control: {subnet} allow")));
        }
        assert!(config.contains("include: \"/home/u/.config/localdev/zones/*.conf\""));
        assert!(config.contains("forward-addr: 1.1.1.1"));
    }

    #[test]
    fn references_overrides_detects_include() {
        let glob = "/x/zones/*.conf";
        assert!(references_overrides(&base_config("_devdns", glob), glob));
        assert!(!references_overrides("server:\n  interface: 127.0.0.1\n", glob));
    }

    #[test]
    fn restart_requires_brew_to_be_installed() {
        // Without brew there is no absolute path to delegate to sudo, so
        // the restart must refuse up front rather than invoke a bare name.
        if crate::brew::brew_binary().is_none() {
            assert!(matches!(
                restart_and_flush(),
                Err(BootstrapError::BrewMissing)
            ));
        }
    }

    #[test]
    fn write_config_creates_zone_directory() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::rooted(dir.path());
        let step = ResolverStep::with_config_path(
            paths.clone(),
            dir.path().join("etc/unbound/unbound.conf"),
            "_devdns",
        );

        step.write_config().unwrap();
        assert!(paths.zones_dir().is_dir());

        let written = std::fs::read_to_string(dir.path().join("etc/unbound/unbound.conf")).unwrap();
        assert!(references_overrides(&written, &paths.zones_glob()));
    }
}
