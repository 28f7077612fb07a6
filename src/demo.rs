//! Demonstration tail of the bootstrap.
//!
//! Wires the provisioned pieces together for one concrete host: a zone
//! override sending `custom.` to loopback, a fresh leaf for
//! `example.custom`, and the HTTPS self-test. Issuance and self-test rerun
//! on every invocation; only the override is existence-guarded.

use crate::ca::RootCa;
use crate::error::Result;
use crate::overrides::{ZoneOverride, ZoneOverrides};
use crate::paths::Paths;
use crate::profile::SigningProfiles;
use crate::resolver;
use crate::selftest::{self, SelfTest};
use crate::step::{Step, StepStatus};

/// Top-level domain redirected to loopback.
pub const DEMO_TLD: &str = "custom";

/// Host the demo certificate is issued for.
pub const DEMO_HOST: &str = "example.custom";

/// Profile used for the demo leaf.
const DEMO_PROFILE: &str = "server";

/// Registers the `custom.` → 127.0.0.1 override and cycles the resolver.
pub struct DemoOverrideStep {
    paths: Paths,
}

impl DemoOverrideStep {
    /// Creates the step.
    #[must_use]
    pub const fn new(paths: Paths) -> Self {
        Self { paths }
    }
}

impl Step for DemoOverrideStep {
    fn name(&self) -> &str {
        "demo-override"
    }

    fn check(&self) -> Result<StepStatus> {
        if ZoneOverrides::new(self.paths.zones_dir()).is_registered(DEMO_TLD) {
            Ok(StepStatus::Satisfied)
        } else {
            Ok(StepStatus::Needed(format!(
                "redirect `{DEMO_TLD}.` to 127.0.0.1 and restart the resolver"
            )))
        }
    }

    fn apply(&self) -> Result<()> {
        ZoneOverrides::new(self.paths.zones_dir())
            .register(&ZoneOverride::new(DEMO_TLD, "127.0.0.1"))?;
        resolver::restart_and_flush()
    }
}

/// Issues a fresh leaf for `example.custom` on every run.
pub struct DemoIssueStep {
    paths: Paths,
}

impl DemoIssueStep {
    /// Creates the step.
    #[must_use]
    pub const fn new(paths: Paths) -> Self {
        Self { paths }
    }
}

impl Step for DemoIssueStep {
    fn name(&self) -> &str {
        "demo-issue"
    }

    fn check(&self) -> Result<StepStatus> {
        // Always fresh material, never reused or rotated in place.
        Ok(StepStatus::Needed(format!(
            "issue a certificate for {DEMO_HOST}"
        )))
    }

    fn apply(&self) -> Result<()> {
        let profiles = SigningProfiles::load(&self.paths.profiles())?;
        let profile = profiles.resolve(DEMO_PROFILE)?;
        let ca = RootCa::load(&self.paths)?;
        ca.issue(&self.paths, DEMO_HOST, &profile)?;
        Ok(())
    }
}

/// Runs the HTTPS self-test against the demo host.
pub struct SelfTestStep {
    paths: Paths,
}

impl SelfTestStep {
    /// Creates the step.
    #[must_use]
    pub const fn new(paths: Paths) -> Self {
        Self { paths }
    }
}

impl Step for SelfTestStep {
    fn name(&self) -> &str {
        "self-test"
    }

    fn check(&self) -> Result<StepStatus> {
        // Reruns every invocation; it is the proof the rest worked.
        Ok(StepStatus::Needed(format!(
            "validate https://{DEMO_HOST}:{} end to end",
            selftest::PORT
        )))
    }

    fn apply(&self) -> Result<()> {
        let test = SelfTest {
            host: DEMO_HOST.to_string(),
            port: selftest::PORT,
            chain_pem: std::fs::read_to_string(self.paths.leaf_chain(DEMO_HOST))?,
            key_pem: std::fs::read_to_string(self.paths.leaf_key(DEMO_HOST))?,
            root_pem: std::fs::read_to_string(self.paths.ca_cert())?,
            addr_override: None,
        };
        test.run()?;
        println!("Self-test passed: https://{DEMO_HOST}:{} validated", selftest::PORT);
        Ok(())
    }
}
