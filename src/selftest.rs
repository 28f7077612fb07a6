//! End-to-end HTTPS self-test.
//!
//! Starts a throwaway TLS listener loaded with an issued chain and key,
//! then makes one client request against it with full certificate
//! validation — the client's root store holds exactly the provisioned root
//! CA, no skip-verify anywhere. A passing run proves DNS redirection, root
//! trust, and leaf issuance end to end.
//!
//! The socket is bound before the accept thread is spawned, so the client
//! can never race a listener that has not bound yet.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, ServerConfig, ServerConnection};

use crate::error::{BootstrapError, Result};

/// Port the throwaway listener binds.
pub const PORT: u16 = 8443;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Self-test parameters.
pub struct SelfTest {
    /// Hostname the client requests and validates against.
    pub host: String,
    /// Listener port.
    pub port: u16,
    /// Chain presented by the listener (leaf then root), PEM.
    pub chain_pem: String,
    /// Leaf private key, PEM.
    pub key_pem: String,
    /// Root certificate the client trusts, PEM.
    pub root_pem: String,
    /// Connect here instead of resolving `host` (hermetic tests). The real
    /// run leaves this unset so the request goes through the OS resolver.
    pub addr_override: Option<SocketAddr>,
}

impl SelfTest {
    /// Runs the test: one listener, one validated request.
    ///
    /// The listener thread is joined before returning, pass or fail, so no
    /// process or thread outlives the step.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::SelfTest`] when the handshake, validation,
    /// or request fails.
    pub fn run(&self) -> Result<()> {
        let server_config = self.server_config()?;
        let listener = TcpListener::bind(("127.0.0.1", self.port))?;
        let local_addr = listener.local_addr()?;
        tracing::info!(host = %self.host, port = self.port, "Self-test listener bound");

        let handle = std::thread::spawn(move || serve_one(&listener, &server_config));

        let client_result = self.request();

        // The accept call has no timeout. If the client failed before a
        // connection was made (unresolvable host, refused route), poke the
        // listener so the join below can never block forever.
        if client_result.is_err() {
            let _ = TcpStream::connect(local_addr);
        }

        let server_result = handle
            .join()
            .map_err(|_| BootstrapError::SelfTest("listener thread panicked".into()))?;

        // Client verdict first: a validation failure there is the signal
        // this test exists for.
        client_result?;
        server_result
    }

    fn server_config(&self) -> Result<Arc<ServerConfig>> {
        let certs = parse_certs(&self.chain_pem)?;
        let key = parse_key(&self.key_pem)?;
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| BootstrapError::SelfTest(format!("listener TLS config: {e}")))?;
        Ok(Arc::new(config))
    }

    fn client_config(&self) -> Result<Arc<ClientConfig>> {
        let mut roots = RootCertStore::empty();
        for cert in parse_certs(&self.root_pem)? {
            roots
                .add(cert)
                .map_err(|e| BootstrapError::SelfTest(format!("root store: {e}")))?;
        }
        Ok(Arc::new(
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        ))
    }

    fn connect(&self) -> Result<TcpStream> {
        if let Some(addr) = self.addr_override {
            return Ok(TcpStream::connect(addr)?);
        }
        // Resolving through the OS exercises the DNS redirection.
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                BootstrapError::SelfTest(format!("`{}` did not resolve", self.host))
            })?;
        Ok(TcpStream::connect(addr)?)
    }

    fn request(&self) -> Result<()> {
        let config = self.client_config()?;
        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|e| BootstrapError::SelfTest(format!("bad server name: {e}")))?;
        let mut conn = ClientConnection::new(config, server_name)
            .map_err(|e| BootstrapError::SelfTest(format!("client setup: {e}")))?;

        let mut sock = self.connect()?;
        sock.set_read_timeout(Some(IO_TIMEOUT))?;
        sock.set_write_timeout(Some(IO_TIMEOUT))?;
        let mut tls = rustls::Stream::new(&mut conn, &mut sock);

        tls.write_all(
            format!(
                "GET / HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
                self.host
            )
            .as_bytes(),
        )
        .map_err(|e| BootstrapError::SelfTest(format!("request failed: {e}")))?;

        let mut response = String::new();
        tls.read_to_string(&mut response)
            .map_err(|e| BootstrapError::SelfTest(format!("certificate validation or read failed: {e}")))?;

        if response.starts_with("HTTP/1.1 200") {
            tracing::info!(host = %self.host, "Self-test request validated");
            Ok(())
        } else {
            Err(BootstrapError::SelfTest(format!(
                "unexpected response: {}",
                response.lines().next().unwrap_or("")
            )))
        }
    }
}

/// Accepts one connection, completes the handshake, answers 200, exits.
fn serve_one(listener: &TcpListener, config: &Arc<ServerConfig>) -> Result<()> {
    let (mut sock, _peer) = listener.accept()?;
    sock.set_read_timeout(Some(IO_TIMEOUT))?;
    sock.set_write_timeout(Some(IO_TIMEOUT))?;

    let mut conn = ServerConnection::new(Arc::clone(config))
        .map_err(|e| BootstrapError::SelfTest(format!("listener setup: {e}")))?;
    let mut tls = rustls::Stream::new(&mut conn, &mut sock);

    // Drain the request head; the body is empty for GET.
    let mut buf = [0u8; 4096];
    let mut head = Vec::new();
    loop {
        let n = tls
            .read(&mut buf)
            .map_err(|e| BootstrapError::SelfTest(format!("listener read: {e}")))?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    const BODY: &str = "macos-localdev self-test ok\n";
    tls.write_all(
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{BODY}",
            BODY.len()
        )
        .as_bytes(),
    )
    .map_err(|e| BootstrapError::SelfTest(format!("listener write: {e}")))?;
    let _ = tls.conn.send_close_notify();
    let _ = tls.flush();
    Ok(())
}

fn parse_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs: std::result::Result<Vec<_>, _> =
        rustls_pemfile::certs(&mut pem.as_bytes()).collect();
    let certs = certs.map_err(|e| BootstrapError::SelfTest(format!("bad certificate PEM: {e}")))?;
    if certs.is_empty() {
        return Err(BootstrapError::SelfTest("no certificates in PEM".into()));
    }
    Ok(certs)
}

fn parse_key(pem: &str) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut pem.as_bytes())
        .map_err(|e| BootstrapError::SelfTest(format!("bad key PEM: {e}")))?
        .ok_or_else(|| BootstrapError::SelfTest("no private key in PEM".into()))
}
