//! Passwordless-sudo delegation for resolver maintenance.
//!
//! The drop-in grants the `admin` group exactly three fully-qualified
//! commands: restart the resolver service, flush the OS DNS cache, and
//! signal mDNSResponder to reload. Nothing else, no wildcards, and the
//! environment is reset explicitly for the delegated commands. sudo rejects
//! drop-ins that are group/world writable, so the file is chmodded 0644.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use crate::error::Result;
use crate::step::{Step, StepStatus};

/// Group receiving the delegation.
const TRUSTED_GROUP: &str = "admin";

/// Renders the drop-in.
///
/// `brew` must be the absolute path to the brew binary — sudoers command
/// specs match on the full path.
fn render(brew: &str) -> String {
    format!(
        "# managed by macos-localdev\n\
         Cmnd_Alias LOCALDEV_DNS = {brew} services restart unbound, \
         /usr/bin/dscacheutil -flushcache, \
         /usr/bin/killall -HUP mDNSResponder\n\
         Defaults!LOCALDEV_DNS env_reset\n\
         %{TRUSTED_GROUP} ALL=(root) NOPASSWD: LOCALDEV_DNS\n"
    )
}

/// Writes the sudoers drop-in if absent.
pub struct SudoersStep {
    file: PathBuf,
}

impl SudoersStep {
    /// Creates the step.
    #[must_use]
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self { file: file.into() }
    }
}

impl Step for SudoersStep {
    fn name(&self) -> &str {
        "sudoers"
    }

    fn check(&self) -> Result<StepStatus> {
        if self.file.exists() {
            Ok(StepStatus::Satisfied)
        } else {
            Ok(StepStatus::Needed(format!("write {}", self.file.display())))
        }
    }

    fn apply(&self) -> Result<()> {
        // Resolved at apply time: brew exists by now, and sudoers command
        // specs match on absolute paths.
        let brew = crate::brew::brew_binary().unwrap_or("/opt/homebrew/bin/brew");
        let content = render(brew);
        match write_direct(&self.file, &content) {
            Ok(()) => {}
            Err(e) if e.is_permission_denied() => {
                // /etc/sudoers.d is root-owned; stage the file and install
                // it elevated with the right mode in one step.
                let staged = std::env::temp_dir().join("macos-localdev.sudoers");
                std::fs::write(&staged, &content)?;
                let result = crate::cmd::run_elevated(
                    "install",
                    &[
                        "-m",
                        "0644",
                        &staged.display().to_string(),
                        &self.file.display().to_string(),
                    ],
                );
                let _ = std::fs::remove_file(&staged);
                result?;
            }
            Err(e) => return Err(e),
        }
        tracing::info!(file = %self.file.display(), "Wrote sudoers drop-in");
        Ok(())
    }
}

fn write_direct(file: &std::path::Path, content: &str) -> Result<()> {
    if let Some(parent) = file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(file, content)?;
    std::fs::set_permissions(file, std::fs::Permissions::from_mode(0o644))?;
    Ok(())
}
