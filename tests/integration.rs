//! Integration tests for `macos-localdev`.
//!
//! Everything here runs against tempdirs; nothing touches live system
//! state. Tests marked `#[ignore]` require a macOS host and sudo:
//!
//! ```bash
//! cargo test -- --ignored
//! ```

use macos_localdev::ca::RootCa;
use macos_localdev::profile::{ProfileStep, SigningProfiles};
use macos_localdev::selftest::SelfTest;
use macos_localdev::sudoers::SudoersStep;
use macos_localdev::{Paths, Step, StepStatus, ZoneOverride, ZoneOverrides};

// ---------------------------------------------------------------------------
// Tempdir tests (no privileges required)
// ---------------------------------------------------------------------------

#[test]
fn override_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let overrides = ZoneOverrides::new(dir.path());

    assert!(overrides.list().unwrap().is_empty());

    overrides
        .register(&ZoneOverride::new("custom", "127.0.0.1"))
        .unwrap();
    overrides
        .register(&ZoneOverride::new("foo", "10.10.10.10"))
        .unwrap();

    assert!(overrides.is_registered("custom"));
    let mut zones = overrides.list().unwrap();
    zones.sort();
    assert_eq!(zones, vec!["custom", "foo"]);

    // The file is what the resolver will include verbatim.
    let content = std::fs::read_to_string(dir.path().join("foo.conf")).unwrap();
    assert!(content.contains("local-zone: \"foo.\" redirect"));
    assert!(content.contains("local-data: \"foo. A 10.10.10.10\""));

    overrides.unregister("custom").unwrap();
    assert!(!overrides.is_registered("custom"));
    assert!(overrides.is_registered("foo"));

    overrides.unregister("foo").unwrap();
    assert!(overrides.list().unwrap().is_empty());
}

#[test]
fn second_run_changes_nothing_for_filesystem_steps() {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::rooted(dir.path().join("state"))
        .with_sudoers_file(dir.path().join("sudoers.d/macos-localdev"));

    let profile_step = ProfileStep::new(paths.clone());
    let sudoers_step = SudoersStep::new(paths.sudoers_file());

    // First run applies.
    assert!(matches!(profile_step.check().unwrap(), StepStatus::Needed(_)));
    profile_step.apply().unwrap();
    assert!(matches!(sudoers_step.check().unwrap(), StepStatus::Needed(_)));
    sudoers_step.apply().unwrap();
    RootCa::load_or_provision(&paths).unwrap();

    let snapshot = |p: &std::path::Path| std::fs::read(p).unwrap();
    let profiles_before = snapshot(&paths.profiles());
    let sudoers_before = snapshot(paths.sudoers_file());
    let ca_key_before = snapshot(&paths.ca_key());
    let ca_cert_before = snapshot(&paths.ca_cert());

    // Second run: checks report satisfied, artifacts are untouched.
    assert_eq!(profile_step.check().unwrap(), StepStatus::Satisfied);
    assert_eq!(sudoers_step.check().unwrap(), StepStatus::Satisfied);
    RootCa::load_or_provision(&paths).unwrap();

    assert_eq!(snapshot(&paths.profiles()), profiles_before);
    assert_eq!(snapshot(paths.sudoers_file()), sudoers_before);
    assert_eq!(snapshot(&paths.ca_key()), ca_key_before);
    assert_eq!(snapshot(&paths.ca_cert()), ca_cert_before);
}

#[test]
fn issued_chain_passes_validated_https_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::rooted(dir.path());

    let ca = RootCa::provision(&paths).unwrap();
    let profiles = SigningProfiles::bootstrap_default();
    profiles.save(&paths.profiles()).unwrap();
    let resolved = SigningProfiles::load(&paths.profiles())
        .unwrap()
        .resolve("server")
        .unwrap();
    let issued = ca.issue(&paths, "example.custom", &resolved).unwrap();

    let test = SelfTest {
        host: "example.custom".into(),
        port: 28443,
        chain_pem: issued.chain_pem,
        key_pem: issued.key_pem,
        root_pem: ca.cert_pem.clone(),
        addr_override: Some(([127, 0, 0, 1], 28443).into()),
    };
    test.run().unwrap();

    // The listener does not outlive the step: the port is free again.
    let rebind = std::net::TcpListener::bind(("127.0.0.1", 28443));
    assert!(rebind.is_ok());
}

#[test]
fn leaf_issuance_failure_leaves_no_partial_override_state() {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::rooted(dir.path());
    let overrides = ZoneOverrides::new(paths.zones_dir());

    overrides
        .register(&ZoneOverride::new("custom", "127.0.0.1"))
        .unwrap();
    let before = overrides.list().unwrap();

    let ca = RootCa::provision(&paths).unwrap();
    let bad_profile = macos_localdev::profile::ResolvedProfile {
        usages: vec!["not-a-usage".into()],
        expiry_days: 1,
    };
    assert!(ca.issue(&paths, "example.custom", &bad_profile).is_err());

    // The failure aborted issuance without touching the include directory.
    assert_eq!(overrides.list().unwrap(), before);
    assert!(!paths.leaf_chain("example.custom").exists());
}

// ---------------------------------------------------------------------------
// Host tests (macOS + sudo required)
// ---------------------------------------------------------------------------

#[test]
#[ignore = "requires macOS and sudo for the System keychain"]
fn real_trust_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::rooted(dir.path());

    RootCa::provision(&paths).unwrap();
    macos_localdev::ca::install_trust(&paths.ca_cert()).unwrap();
    assert!(macos_localdev::ca::is_trusted());
}

#[test]
#[ignore = "requires macOS networksetup"]
fn real_active_service_resolves() {
    let service = macos_localdev::network::active_service().unwrap();
    assert!(!service.is_empty());
}
