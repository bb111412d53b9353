//! TCP + TLS transport: establishes the FTPS control connection.
//!
//! Implicit FTPS wraps the socket before the banner; explicit FTPS reads the
//! banner in plain text and leaves `AUTH TLS` to `client.rs`.

use crate::ftps::error::{FtpsError, FtpsResult};
use crate::ftps::protocol::FtpCodec;
use crate::ftps::tls;
use crate::ftps::types::{FtpResponse, FtpsSecurityMode, UploaderConfig};
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Open the control connection and return the codec plus the server banner.
pub async fn connect(
    config: &UploaderConfig,
    tls_config: &Arc<ClientConfig>,
) -> FtpsResult<(FtpCodec, FtpResponse)> {
    let addr = format!("{}:{}", config.host, config.port);
    let dur = Duration::from_secs(config.connect_timeout_sec);

    let tcp = timeout(dur, TcpStream::connect(&addr))
        .await
        .map_err(|_| FtpsError::timeout(format!("TCP connect to {} timed out", addr)))?
        .map_err(|e| FtpsError::connection_failed(format!("TCP connect to {}: {}", addr, e)))?;

    tcp.set_nodelay(true).ok();

    let mut codec = match config.security {
        FtpsSecurityMode::Implicit => {
            let stream = timeout(dur, tls::connect_tls(tcp, &config.host, tls_config))
                .await
                .map_err(|_| FtpsError::timeout(format!("TLS handshake with {} timed out", addr)))??;
            FtpCodec::from_tls(stream)
        }
        FtpsSecurityMode::Explicit => FtpCodec::from_tcp(tcp),
    };

    let banner = codec.read_response().await?;
    if banner.code != 220 {
        return Err(FtpsError::from_reply(banner.code, &banner.text()));
    }
    Ok((codec, banner))
}
