//! Homebrew bootstrap and package installation.

use std::path::Path;

use crate::cmd;
use crate::error::{BootstrapError, Result};
use crate::step::{Step, StepStatus};

/// Locations Homebrew installs itself to, by hardware generation.
const BREW_PATHS: &[&str] = &["/opt/homebrew/bin/brew", "/usr/local/bin/brew"];

/// Official installer, run the same way the Homebrew docs do.
const INSTALL_SNIPPET: &str =
    "$(curl -fsSL https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh)";

/// Returns the path to the `brew` binary, if installed.
#[must_use]
pub fn brew_binary() -> Option<&'static str> {
    BREW_PATHS.iter().copied().find(|p| Path::new(p).exists())
}

/// Returns the absolute path to `brew`, erroring when Homebrew is absent.
///
/// Callers that hand the path to sudo must use this rather than falling
/// back to a bare `brew`: sudoers command specs match on absolute paths,
/// so a relative name would bypass the NOPASSWD delegation.
///
/// # Errors
///
/// Returns [`BootstrapError::BrewMissing`] when no known location has the
/// binary.
pub fn require_binary() -> Result<&'static str> {
    brew_binary().ok_or(BootstrapError::BrewMissing)
}

/// Returns Homebrew's prefix (`/opt/homebrew` or `/usr/local`).
///
/// # Errors
///
/// Fails if `brew --prefix` cannot be run, i.e. Homebrew is not installed.
pub fn prefix() -> Result<String> {
    cmd::run(brew_binary().unwrap_or("brew"), &["--prefix"])
}

/// Installs a formula unless it is already present.
///
/// # Errors
///
/// Propagates `brew` failures.
pub fn ensure_package(name: &str) -> Result<()> {
    let brew = brew_binary().unwrap_or("brew");
    if cmd::succeeds(brew, &["list", name]) {
        tracing::debug!(package = name, "Formula already installed");
        return Ok(());
    }
    tracing::info!(package = name, "Installing formula");
    cmd::run(brew, &["install", name])?;
    Ok(())
}

/// Ensures Homebrew itself is present.
pub struct HomebrewStep;

impl Step for HomebrewStep {
    fn name(&self) -> &str {
        "homebrew"
    }

    fn check(&self) -> Result<StepStatus> {
        if brew_binary().is_some() || cmd::succeeds("brew", &["--version"]) {
            Ok(StepStatus::Satisfied)
        } else {
            Ok(StepStatus::Needed("run the Homebrew installer".into()))
        }
    }

    fn apply(&self) -> Result<()> {
        cmd::run("/bin/bash", &["-c", INSTALL_SNIPPET])?;
        tracing::info!("Homebrew installed");
        Ok(())
    }
}
