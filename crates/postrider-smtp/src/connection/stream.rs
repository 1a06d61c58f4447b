//! SMTP transport: plain TCP or TLS.

use crate::connection::config::TlsOptions;
use crate::error::{Error, Result};
use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

/// A stream that is either plaintext or TLS.
///
/// STARTTLS consumes the plaintext variant and produces the TLS variant;
/// after the upgrade the plaintext handle is unreachable.
pub enum SmtpStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl SmtpStream {
    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Upgrades a plaintext stream to TLS, with SNI set to `host`.
    ///
    /// # Errors
    ///
    /// Returns `TLS_FAILED` if the stream is already TLS or the handshake
    /// fails.
    pub async fn upgrade_to_tls(self, host: &str, tls: &TlsOptions) -> Result<Self> {
        match self {
            Self::Plain(tcp) => {
                let connector = create_tls_connector(tls);
                let server_name = server_name(host)?;
                let stream = connector
                    .connect(server_name, tcp)
                    .await
                    .map_err(|e| Error::tls(e.to_string()))?;
                Ok(Self::Tls(Box::new(stream)))
            }
            Self::Tls(_) => Err(Error::tls("Connection is already using TLS")),
        }
    }
}

impl std::fmt::Debug for SmtpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("SmtpStream::Plain"),
            Self::Tls(_) => f.write_str("SmtpStream::Tls"),
        }
    }
}

impl AsyncRead for SmtpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SmtpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Connects to a server over plain TCP (STARTTLS expected later).
///
/// # Errors
///
/// Returns `CONNECTION_FAILED` if the TCP connection fails.
pub async fn connect(host: &str, port: u16) -> Result<SmtpStream> {
    let addr = format!("{host}:{port}");
    let tcp = TcpStream::connect(&addr).await?;
    Ok(SmtpStream::Plain(tcp))
}

/// Connects to a server with implicit TLS (port 465).
///
/// # Errors
///
/// Returns `CONNECTION_FAILED` if the TCP connection fails, or
/// `TLS_FAILED` if the handshake fails.
pub async fn connect_tls(host: &str, port: u16, tls: &TlsOptions) -> Result<SmtpStream> {
    let addr = format!("{host}:{port}");
    let tcp = TcpStream::connect(&addr).await?;

    let connector = create_tls_connector(tls);
    let server_name = server_name(host)?;
    let stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| Error::tls(e.to_string()))?;
    Ok(SmtpStream::Tls(Box::new(stream)))
}

fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|_| Error::tls(format!("Invalid TLS server name: {host}")))
}

/// Creates a TLS connector with system root certificates, or a
/// certificate-accepting one when verification is disabled.
fn create_tls_connector(tls: &TlsOptions) -> TlsConnector {
    let config = if tls.reject_unauthorized {
        let root_store = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth()
    } else {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth()
    };

    TlsConnector::from(Arc::new(config))
}

/// Verifier used when `reject_unauthorized` is false: accepts any
/// certificate and signature.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_server_name_accepts_hostname() {
        assert!(server_name("smtp.example.com").is_ok());
    }

    #[test]
    fn test_server_name_rejects_invalid() {
        assert!(server_name("not a hostname").is_err());
    }

    #[test]
    fn test_connector_builds_with_verification_disabled() {
        let tls = TlsOptions {
            reject_unauthorized: false,
        };
        let _connector = create_tls_connector(&tls);
    }
}
