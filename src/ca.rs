//! Root CA provisioning and leaf issuance.
//!
//! The root is an ECDSA P-256 key pair with a self-signed certificate,
//! generated once and kept on disk (`ca/root.key`, `ca/root.crt`). Leaves
//! are issued fresh on every request with the same curve as the root, and
//! bundled into a chain file (leaf followed by root) for TLS servers.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};

use crate::cmd;
use crate::error::{BootstrapError, Result};
use crate::paths::Paths;
use crate::profile::ResolvedProfile;
use crate::step::{Step, StepStatus};

/// Subject common name of the root certificate. Also the handle used to
/// look the certificate up in the System keychain.
pub const ROOT_CN: &str = "Localdev Development CA";

const ROOT_ORG: &str = "macos-localdev";

/// Root certificate validity.
const ROOT_VALIDITY_YEARS: i64 = 10;

const SYSTEM_KEYCHAIN: &str = "/Library/Keychains/System.keychain";

/// In-memory root CA, ready to sign leaves.
pub struct RootCa {
    key: KeyPair,
    cert: rcgen::Certificate,
    /// Root certificate PEM as stored on disk.
    pub cert_pem: String,
}

/// Result of one leaf issuance.
#[derive(Debug)]
pub struct IssuedCert {
    /// Leaf certificate PEM.
    pub cert_pem: String,
    /// Leaf private key PEM (PKCS#8).
    pub key_pem: String,
    /// Leaf followed by root, for TLS servers.
    pub chain_pem: String,
}

fn root_params() -> CertificateParams {
    let mut params = CertificateParams::default();
    params.distinguished_name.push(DnType::CommonName, ROOT_CN);
    params
        .distinguished_name
        .push(DnType::OrganizationName, ROOT_ORG);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(ROOT_VALIDITY_YEARS * 365);
    params
}

impl RootCa {
    /// Generates a fresh root and writes key (0600) and certificate to disk.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Certificate`] on generation failure or
    /// [`BootstrapError::Io`] on write failure.
    pub fn provision(paths: &Paths) -> Result<Self> {
        // rcgen's default algorithm is ECDSA P-256 with SHA-256.
        let key = KeyPair::generate()?;
        let cert = root_params().self_signed(&key)?;
        let cert_pem = cert.pem();

        let key_path = paths.ca_key();
        if let Some(parent) = key_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&key_path, key.serialize_pem())?;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
        std::fs::write(paths.ca_cert(), &cert_pem)?;

        tracing::info!(cert = %paths.ca_cert().display(), "Generated root CA");
        Ok(Self {
            key,
            cert,
            cert_pem,
        })
    }

    /// Loads the root from disk.
    ///
    /// The signing context is rebuilt from the stored key; the certificate
    /// PEM is read verbatim so the chain file always carries the exact bytes
    /// the trust store saw.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Io`] if either file is missing, or
    /// [`BootstrapError::Certificate`] if the key does not parse.
    pub fn load(paths: &Paths) -> Result<Self> {
        let key_pem = std::fs::read_to_string(paths.ca_key())?;
        let cert_pem = std::fs::read_to_string(paths.ca_cert())?;
        let key = KeyPair::from_pem(&key_pem)?;
        let cert = root_params().self_signed(&key)?;
        Ok(Self {
            key,
            cert,
            cert_pem,
        })
    }

    /// Loads the root if present, otherwise provisions it.
    ///
    /// # Errors
    ///
    /// See [`RootCa::provision`] and [`RootCa::load`].
    pub fn load_or_provision(paths: &Paths) -> Result<Self> {
        if paths.ca_cert().exists() {
            Self::load(paths)
        } else {
            Self::provision(paths)
        }
    }

    /// Issues a leaf for `host` under the given resolved profile and writes
    /// key, certificate, and chain to the certs directory.
    ///
    /// Always generates fresh material; existing files for the host are
    /// overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::InvalidProfile`] for an unknown usage name,
    /// [`BootstrapError::Certificate`] on signing failure, or
    /// [`BootstrapError::Io`] on write failure.
    pub fn issue(&self, paths: &Paths, host: &str, profile: &ResolvedProfile) -> Result<IssuedCert> {
        // Same curve as the root.
        let leaf_key = KeyPair::generate()?;

        let mut params = CertificateParams::new(vec![host.to_string()])?;
        params.distinguished_name.push(DnType::CommonName, host);
        apply_usages(&mut params, &profile.usages)?;

        let now = time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(i64::from(profile.expiry_days));

        let leaf = params.signed_by(&leaf_key, &self.cert, &self.key)?;

        let cert_pem = leaf.pem();
        let key_pem = leaf_key.serialize_pem();
        let chain_pem = format!("{cert_pem}{}", self.cert_pem);

        std::fs::create_dir_all(paths.certs_dir())?;
        let key_path = paths.leaf_key(host);
        std::fs::write(&key_path, &key_pem)?;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
        std::fs::write(paths.leaf_cert(host), &cert_pem)?;
        std::fs::write(paths.leaf_chain(host), &chain_pem)?;

        tracing::info!(host, chain = %paths.leaf_chain(host).display(), "Issued leaf certificate");
        Ok(IssuedCert {
            cert_pem,
            key_pem,
            chain_pem,
        })
    }
}

fn apply_usages(params: &mut CertificateParams, usages: &[String]) -> Result<()> {
    for usage in usages {
        match usage.as_str() {
            "digital-signature" => params.key_usages.push(KeyUsagePurpose::DigitalSignature),
            "key-encipherment" => params.key_usages.push(KeyUsagePurpose::KeyEncipherment),
            "server-auth" => params
                .extended_key_usages
                .push(ExtendedKeyUsagePurpose::ServerAuth),
            "client-auth" => params
                .extended_key_usages
                .push(ExtendedKeyUsagePurpose::ClientAuth),
            other => {
                return Err(BootstrapError::InvalidProfile(format!(
                    "unknown key usage `{other}`"
                )));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Trust store
// ---------------------------------------------------------------------------

/// Returns `true` if a certificate with the root CN is in the keychain.
///
/// Best-effort probe; a missing `security` binary reads as "not installed".
#[must_use]
pub fn is_trusted() -> bool {
    cmd::succeeds(
        "security",
        &["find-certificate", "-c", ROOT_CN, SYSTEM_KEYCHAIN],
    )
}

/// Registers the root certificate as a trusted root in the System keychain.
///
/// Prompts for an interactive sudo confirmation unless pre-authorized.
///
/// # Errors
///
/// Propagates the `security` tool's failure.
pub fn install_trust(cert_path: &Path) -> Result<()> {
    cmd::run_elevated(
        "security",
        &[
            "add-trusted-cert",
            "-d",
            "-r",
            "trustRoot",
            "-k",
            SYSTEM_KEYCHAIN,
            &cert_path.display().to_string(),
        ],
    )?;
    tracing::info!(cert = %cert_path.display(), "Root CA trusted in System keychain");
    Ok(())
}

/// Provisions the root CA and keeps it registered in the trust store.
///
/// The check covers both halves: a user who deleted only the keychain entry
/// (leaving the files) gets it re-registered on the next run.
pub struct RootCaStep {
    paths: Paths,
}

impl RootCaStep {
    /// Creates the step.
    #[must_use]
    pub const fn new(paths: Paths) -> Self {
        Self { paths }
    }
}

impl Step for RootCaStep {
    fn name(&self) -> &str {
        "root-ca"
    }

    fn check(&self) -> Result<StepStatus> {
        if !self.paths.ca_cert().exists() {
            return Ok(StepStatus::Needed(
                "generate root CA and register it in the System keychain".into(),
            ));
        }
        if !is_trusted() {
            return Ok(StepStatus::Needed(
                "re-register existing root CA in the System keychain".into(),
            ));
        }
        Ok(StepStatus::Satisfied)
    }

    fn apply(&self) -> Result<()> {
        RootCa::load_or_provision(&self.paths)?;
        install_trust(&self.paths.ca_cert())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::SigningProfiles;

    fn server_profile() -> ResolvedProfile {
        SigningProfiles::bootstrap_default()
            .resolve("server")
            .unwrap()
    }

    #[test]
    fn provision_writes_key_and_cert() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::rooted(dir.path());

        let ca = RootCa::provision(&paths).unwrap();
        assert!(ca.cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(paths.ca_key().exists());
        assert!(paths.ca_cert().exists());

        let mode = std::fs::metadata(paths.ca_key()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn load_or_provision_does_not_regenerate() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::rooted(dir.path());

        let first = RootCa::load_or_provision(&paths).unwrap();
        let second = RootCa::load_or_provision(&paths).unwrap();
        assert_eq!(first.cert_pem, second.cert_pem);
    }

    #[test]
    fn issue_writes_chain_of_leaf_then_root() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::rooted(dir.path());

        let ca = RootCa::provision(&paths).unwrap();
        let issued = ca.issue(&paths, "example.custom", &server_profile()).unwrap();

        assert!(issued.cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(issued.key_pem.contains("BEGIN PRIVATE KEY"));
        assert!(issued.chain_pem.starts_with(&issued.cert_pem));
        assert!(issued.chain_pem.ends_with(&ca.cert_pem));

        assert!(paths.leaf_key("example.custom").exists());
        assert!(paths.leaf_cert("example.custom").exists());
        assert_eq!(
            std::fs::read_to_string(paths.leaf_chain("example.custom")).unwrap(),
            issued.chain_pem
        );
    }

    #[test]
    fn issue_always_generates_fresh_material() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::rooted(dir.path());
        let ca = RootCa::provision(&paths).unwrap();

        let a = ca.issue(&paths, "example.custom", &server_profile()).unwrap();
        let b = ca.issue(&paths, "example.custom", &server_profile()).unwrap();
        assert_ne!(a.key_pem, b.key_pem);
    }

    #[test]
    fn issue_rejects_unknown_usage() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::rooted(dir.path());
        let ca = RootCa::provision(&paths).unwrap();

        let bad = ResolvedProfile {
            usages: vec!["code-signing".to_string()],
            expiry_days: 30,
        };
        assert!(matches!(
            ca.issue(&paths, "example.custom", &bad),
            Err(BootstrapError::InvalidProfile(_))
        ));
    }

    #[test]
    fn loaded_ca_issues_under_stored_root() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::rooted(dir.path());

        RootCa::provision(&paths).unwrap();
        let ca = RootCa::load(&paths).unwrap();
        let issued = ca.issue(&paths, "example.custom", &server_profile()).unwrap();
        assert!(issued.chain_pem.ends_with(&ca.cert_pem));
    }
}
