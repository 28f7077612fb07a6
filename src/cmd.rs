//! External-command plumbing.
//!
//! Every OS tool the bootstrap drives (`brew`, `security`, `dscl`,
//! `networksetup`, `unbound-checkconf`, ...) goes through [`run`] so that a
//! nonzero exit becomes a [`BootstrapError::CommandFailed`] carrying the
//! tool's stderr verbatim. There is no retry and no translation layer.

use std::process::Command;

use crate::error::{BootstrapError, Result};

/// Runs a command, returning its trimmed stdout on success.
///
/// # Errors
///
/// Returns [`BootstrapError::Io`] if the binary cannot be spawned, or
/// [`BootstrapError::CommandFailed`] on nonzero exit.
pub fn run(program: &str, args: &[&str]) -> Result<String> {
    tracing::debug!(program, ?args, "Running external command");
    let output = Command::new(program).args(args).output()?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(BootstrapError::CommandFailed {
            command: render(program, args),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Runs a command under `sudo`, prompting interactively unless a sudoers
/// rule already covers it.
///
/// # Errors
///
/// Same as [`run`].
pub fn run_elevated(program: &str, args: &[&str]) -> Result<String> {
    let mut sudo_args = vec![program];
    sudo_args.extend_from_slice(args);
    run("sudo", &sudo_args)
}

/// Returns `true` if the command exits zero (existence probes).
#[must_use]
pub fn succeeds(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Returns `true` when running as root.
///
/// The bootstrap itself must *not* run as root: artifacts land in the
/// invoking user's home and elevation happens per-command via `sudo`.
#[must_use]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

fn render(program: &str, args: &[&str]) -> String {
    let mut s = String::from(program);
    for a in args {
        s.push(' ');
        s.push_str(a);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_captures_stdout() {
        assert_eq!(run("echo", &["hello"]).unwrap(), "hello");
    }

    #[test]
    fn run_surfaces_exit_code_and_stderr() {
        let err = run("sh", &["-c", "echo bad >&2; exit 3"]).unwrap_err();
        match err {
            BootstrapError::CommandFailed { command, code, stderr } => {
                assert!(command.starts_with("sh -c"));
                assert_eq!(code, 3);
                assert_eq!(stderr, "bad");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn succeeds_probe() {
        assert!(succeeds("true", &[]));
        assert!(!succeeds("false", &[]));
        assert!(!succeeds("/nonexistent-binary", &[]));
    }
}
