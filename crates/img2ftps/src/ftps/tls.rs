//! TLS helpers for Explicit and Implicit FTPS (RFC 4217).
//!
//! - Builds a rustls `ClientConfig` for a [`TlsTrustPolicy`].
//! - Upgrades a plain control codec after `AUTH TLS`.
//! - Wraps passive data sockets with the same config so the server sees a
//!   resumed session on the data channel.

use crate::ftps::error::{FtpsError, FtpsResult};
use crate::ftps::protocol::{FtpCodec, ReadHalf, WriteHalf};
use crate::ftps::types::TlsTrustPolicy;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Accepts every server certificate. Signatures are still checked so the
/// handshake itself stays well-formed.
#[derive(Debug)]
struct AcceptAllVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAllVerifier {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Build the client config for one uploader.
pub fn build_client_config(policy: TlsTrustPolicy) -> FtpsResult<Arc<ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?;

    let config = match policy {
        TlsTrustPolicy::AcceptAll => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAllVerifier { provider }))
            .with_no_client_auth(),
        TlsTrustPolicy::SystemRoots => {
            let mut roots = RootCertStore::empty();
            let native = rustls_native_certs::load_native_certs();
            for err in &native.errors {
                log::warn!("Skipping unreadable system certificate: {}", err);
            }
            let (added, ignored) = roots.add_parsable_certificates(native.certs);
            log::debug!("Loaded {} system root certificates ({} ignored)", added, ignored);
            if roots.is_empty() {
                return Err(FtpsError::tls_failed("No usable system root certificates"));
            }
            builder.with_root_certificates(roots).with_no_client_auth()
        }
    };

    Ok(Arc::new(config))
}

pub fn server_name(host: &str) -> FtpsResult<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|e| FtpsError::tls_failed(format!("Invalid TLS server name '{}': {}", host, e)))
}

/// Run a client handshake over an established TCP socket.
pub async fn connect_tls(
    tcp: TcpStream,
    host: &str,
    config: &Arc<ClientConfig>,
) -> FtpsResult<TlsStream<TcpStream>> {
    let connector = TlsConnector::from(config.clone());
    connector
        .connect(server_name(host)?, tcp)
        .await
        .map_err(|e| FtpsError::tls_failed(format!("TLS handshake with {}: {}", host, e)))
}

/// Upgrade an existing **plain** control connection to TLS.
///
/// Called after a successful `AUTH TLS` (234).
pub async fn upgrade_to_tls(
    codec: FtpCodec,
    host: &str,
    config: &Arc<ClientConfig>,
) -> FtpsResult<FtpCodec> {
    let tcp = reunite_plain(codec)?;
    let tls = connect_tls(tcp, host, config).await?;
    Ok(FtpCodec::from_tls(tls))
}

/// Reunite the plain read + write halves into a `TcpStream`.
fn reunite_plain(codec: FtpCodec) -> FtpsResult<TcpStream> {
    let rd = match codec.reader {
        ReadHalf::Plain(br) => {
            if !br.buffer().is_empty() {
                return Err(FtpsError::protocol_error(
                    "Unexpected data buffered before TLS upgrade",
                ));
            }
            br.into_inner()
        }
        ReadHalf::Tls(_) => {
            return Err(FtpsError::protocol_error(
                "Cannot upgrade: connection is already TLS",
            ))
        }
    };
    let wr = match codec.writer {
        WriteHalf::Plain(w) => w,
        WriteHalf::Tls(_) => {
            return Err(FtpsError::protocol_error(
                "Cannot upgrade: connection is already TLS",
            ))
        }
    };
    rd.reunite(wr)
        .map_err(|e| FtpsError::protocol_error(format!("Reunite failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_all_config_builds() {
        let config = build_client_config(TlsTrustPolicy::AcceptAll).unwrap();
        assert!(config.enable_sni);
    }

    #[test]
    fn test_server_name_accepts_ip_and_dns() {
        assert!(server_name("ftp.example.com").is_ok());
        assert!(server_name("10.0.0.5").is_ok());
        assert!(server_name("not a host!").is_err());
    }
}
