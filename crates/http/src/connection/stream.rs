//! TCP and TLS byte streams.
//!
//! [`TransportStream`] unifies a plain `TcpStream` and a rustls client
//! stream behind one `AsyncRead + AsyncWrite` type. [`TlsSettings`] builds
//! the rustls `ClientConfig`: root certificates come from the platform
//! store with the Mozilla bundle as fallback, and peer/hostname
//! verification can each be relaxed. TLS session secrets are appended in
//! NSS key-log format to `SSLKEYLOGFILE` or an explicitly configured path.

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{
    CertificateError, ClientConfig, DigitallySignedStruct, KeyLogFile, RootCertStore,
    SignatureScheme,
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::error::Error;
use crate::uri::ConnectionKey;

/// Plain TCP or TLS. Implements `AsyncRead` + `AsyncWrite`.
pub enum TransportStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for TransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            TransportStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            TransportStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            TransportStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            TransportStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            TransportStream::Plain(s) => Pin::new(s).poll_flush(cx),
            TransportStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            TransportStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            TransportStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

impl fmt::Debug for TransportStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportStream::Plain(_) => f.write_str("TransportStream::Plain"),
            TransportStream::Tls(_) => f.write_str("TransportStream::Tls"),
        }
    }
}

/// TLS behavior knobs carried by the client configuration.
#[derive(Debug, Clone)]
pub struct TlsSettings {
    /// Verify the peer certificate chain
    pub verify: bool,
    /// Verify that the certificate matches the host
    pub check_hostname: bool,
    /// Append TLS session secrets to this file; `SSLKEYLOGFILE` is honored
    /// when unset
    pub keylog_file: Option<PathBuf>,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self { verify: true, check_hostname: true, keylog_file: None }
    }
}

impl TlsSettings {
    /// Builds the rustls client configuration for these settings.
    pub fn build_config(&self) -> Result<Arc<ClientConfig>, Error> {
        let mut config = if !self.verify {
            warn!("certificate verification is disabled");
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification))
                .with_no_client_auth()
        } else if !self.check_hostname {
            let inner = WebPkiServerVerifier::builder(Arc::new(build_root_store()))
                .build()
                .map_err(Error::tls)?;
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AnyHostname { inner }))
                .with_no_client_auth()
        } else {
            ClientConfig::builder()
                .with_root_certificates(build_root_store())
                .with_no_client_auth()
        };

        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        config.key_log = match &self.keylog_file {
            Some(path) => Arc::new(FileKeyLog::open(path)),
            None => Arc::new(KeyLogFile::new()),
        };
        Ok(Arc::new(config))
    }
}

/// Platform native certificates first, Mozilla bundle as fallback.
fn build_root_store() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    if let Ok(certs) = rustls_native_certs::load_native_certs() {
        for cert in certs {
            let _ = roots.add(cert);
        }
    }
    if roots.is_empty() {
        roots.roots = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
    }
    roots
}

/// Opens a connection for `key`, performing the TLS handshake for https
/// keys. The timeout covers TCP connect and handshake together.
pub async fn connect(
    key: &ConnectionKey,
    tls_config: Option<Arc<ClientConfig>>,
    connect_timeout: Duration,
) -> Result<TransportStream, Error> {
    timeout(connect_timeout, do_connect(key, tls_config))
        .await
        .map_err(|_| Error::Timeout)?
}

async fn do_connect(
    key: &ConnectionKey,
    tls_config: Option<Arc<ClientConfig>>,
) -> Result<TransportStream, Error> {
    // url keeps IPv6 hosts bracketed; the socket address form does not
    let host = key.host.trim_start_matches('[').trim_end_matches(']');
    let stream = TcpStream::connect((host, key.port)).await.map_err(Error::connect)?;
    debug!(%key, "tcp connection established");

    match tls_config {
        None => Ok(TransportStream::Plain(stream)),
        Some(config) => {
            let server_name = ServerName::try_from(host.to_string())
                .map_err(|_| Error::tls(format!("`{host}` is not a valid server name")))?;
            let tls = TlsConnector::from(config)
                .connect(server_name, stream)
                .await
                .map_err(|e| Error::tls(e.to_string()))?;
            debug!(%key, "tls handshake complete");
            Ok(TransportStream::Tls(Box::new(tls)))
        }
    }
}

/// Key-log writer for an explicitly configured path, NSS format.
struct FileKeyLog {
    file: Mutex<Option<std::fs::File>>,
}

impl FileKeyLog {
    fn open(path: &Path) -> Self {
        let file = std::fs::OpenOptions::new().append(true).create(true).open(path);
        if let Err(e) = &file {
            warn!(path = %path.display(), error = %e, "cannot open key log file");
        }
        Self { file: Mutex::new(file.ok()) }
    }
}

impl rustls::KeyLog for FileKeyLog {
    fn log(&self, label: &str, client_random: &[u8], secret: &[u8]) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = writeln!(file, "{} {} {}", label, hex(client_random), hex(secret));
            }
        }
    }
}

impl fmt::Debug for FileKeyLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FileKeyLog")
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Accepts any certificate. Installed when `verify_mode` is off.
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Verifies the chain but forgives a name mismatch. Installed when
/// `check_hostname` is off while verification stays on.
#[derive(Debug)]
struct AnyHostname {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for AnyHostname {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self.inner.verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Err(rustls::Error::InvalidCertificate(
                CertificateError::NotValidForName
                | CertificateError::NotValidForNameContext { .. },
            )) => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
