//! # macos-localdev
//!
//! Idempotent bootstrap of a macOS workstation for local HTTPS development.
//!
//! One run, in order: Homebrew, a local root CA trusted by the System
//! keychain, a `_devdns` service account, an unbound resolver restricted to
//! private ranges with a user-editable zone-override directory, a
//! narrowly-scoped sudoers drop-in, the active network service's DNS
//! rebound to loopback, a CA signing-profile file — then a demonstration:
//! `custom.` redirected to loopback, a leaf for `example.custom`, and an
//! HTTPS self-test with full certificate validation.
//!
//! Every step is a check-then-act pair ([`step::Step`]) executed by a
//! fail-fast [`step::Runner`]. Re-running skips whatever already holds and
//! continues from the first failure; nothing is rolled back.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use macos_localdev::{Paths, bootstrap_runner};
//!
//! let paths = Paths::from_home()?;
//! bootstrap_runner(paths, false).run()?;
//! ```
//!
//! ## Pieces on disk
//!
//! ```text
//! ~/.config/localdev/           CA material, profiles, zones, issued certs
//! <brew prefix>/etc/unbound/    resolver base config
//! /etc/sudoers.d/macos-localdev three delegated maintenance commands
//! ```
//!
//! ## Permissions
//!
//! Run as a regular user. Steps that touch system state (`security`,
//! `dscl`, `networksetup`, the sudoers drop-in) elevate per command via
//! `sudo` and prompt interactively until the drop-in is in place.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod account;
pub mod brew;
pub mod ca;
pub mod cmd;
pub mod demo;
pub mod error;
pub mod network;
pub mod overrides;
pub mod paths;
pub mod profile;
pub mod resolver;
pub mod selftest;
pub mod step;
pub mod sudoers;

pub use error::{BootstrapError, Result};
pub use overrides::{ZoneOverride, ZoneOverrides};
pub use paths::Paths;
pub use step::{Runner, Step, StepStatus};

/// Assembles the full bootstrap sequence in execution order.
#[must_use]
pub fn bootstrap_runner(paths: Paths, dry_run: bool) -> Runner {
    Runner::new(dry_run)
        .with(brew::HomebrewStep)
        .with(ca::RootCaStep::new(paths.clone()))
        .with(account::ServiceAccountStep)
        .with(resolver::ResolverStep::new(paths.clone(), account::ACCOUNT))
        .with(sudoers::SudoersStep::new(paths.sudoers_file()))
        .with(network::NetworkDnsStep)
        .with(profile::ProfileStep::new(paths.clone()))
        .with(demo::DemoOverrideStep::new(paths.clone()))
        .with(demo::DemoIssueStep::new(paths.clone()))
        .with(demo::SelfTestStep::new(paths))
}
