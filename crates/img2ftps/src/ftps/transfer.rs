//! Passive data channel for FTPS transfers.
//!
//! `PASV` is tried first; servers that refuse it (IPv6-only listeners) get
//! `EPSV`. The socket is TLS-wrapped (`PROT P`) once the transfer command
//! has been answered with 1xx.

use crate::ftps::error::{FtpsError, FtpsResult};
use crate::ftps::protocol::FtpCodec;
use crate::ftps::tls;
use lazy_static::lazy_static;
use regex::Regex;
use rustls::ClientConfig;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_rustls::client::TlsStream;

lazy_static! {
    static ref PASV_RE: Regex =
        Regex::new(r"\((\d+),(\d+),(\d+),(\d+),(\d+),(\d+)\)").expect("valid PASV pattern");
    static ref EPSV_RE: Regex = Regex::new(r"\|\|\|(\d+)\|").expect("valid EPSV pattern");
}

/// Where the data connection should go.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DataTarget {
    Addr(SocketAddr),
    /// Same host as the control connection.
    ControlHost(u16),
}

/// Open the passive data socket. The TLS handshake waits for
/// [`secure_data_channel`], after the transfer command got its 1xx reply.
pub async fn open_data_channel(
    codec: &mut FtpCodec,
    host: &str,
    data_timeout: Duration,
) -> FtpsResult<TcpStream> {
    let target = request_passive(codec).await?;
    let tcp = match target {
        DataTarget::Addr(addr) => connect_data(addr.to_string(), data_timeout).await?,
        DataTarget::ControlHost(port) => connect_data(format!("{}:{}", host, port), data_timeout).await?,
    };
    tcp.set_nodelay(true).ok();
    Ok(tcp)
}

/// Wrap an open data socket in TLS (`PROT P`).
pub async fn secure_data_channel(
    tcp: TcpStream,
    host: &str,
    tls_config: &Arc<ClientConfig>,
    data_timeout: Duration,
) -> FtpsResult<TlsStream<TcpStream>> {
    timeout(data_timeout, tls::connect_tls(tcp, host, tls_config))
        .await
        .map_err(|_| FtpsError::data_channel("Data channel TLS handshake timed out"))?
}

/// Write all of `content`, then flush and shut the stream down.
///
/// There is no deadline on the transfer as a whole: it only fails when a
/// single write, the flush or the shutdown makes no progress for `idle`.
pub async fn write_until_idle<W>(stream: &mut W, content: &[u8], idle: Duration) -> FtpsResult<()>
where
    W: AsyncWrite + Unpin,
{
    let stalled = || FtpsError::timeout(format!("Data channel stalled for {:?}", idle));

    let mut rest = content;
    while !rest.is_empty() {
        let n = timeout(idle, stream.write(rest)).await.map_err(|_| stalled())??;
        if n == 0 {
            return Err(FtpsError::data_channel("Data channel closed during transfer"));
        }
        rest = &rest[n..];
    }
    timeout(idle, stream.flush()).await.map_err(|_| stalled())??;
    timeout(idle, stream.shutdown()).await.map_err(|_| stalled())??;
    Ok(())
}

async fn request_passive(codec: &mut FtpCodec) -> FtpsResult<DataTarget> {
    let resp = codec.execute("PASV").await?;
    if resp.code == 227 {
        return parse_pasv_response(&resp.text());
    }
    log::debug!("PASV refused ({}), trying EPSV", resp.code);
    let resp = codec.expect_ok("EPSV").await?;
    Ok(DataTarget::ControlHost(parse_epsv_response(&resp.text())?))
}

async fn connect_data(addr: String, data_timeout: Duration) -> FtpsResult<TcpStream> {
    timeout(data_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| FtpsError::data_channel(format!("Data connect to {} timed out", addr)))?
        .map_err(|e| FtpsError::data_channel(format!("Data connect to {}: {}", addr, e)))
}

/// Parse `(h1,h2,h3,h4,p1,p2)` from a 227 reply.
///
/// An all-zero address means "the control host".
fn parse_pasv_response(text: &str) -> FtpsResult<DataTarget> {
    let caps = PASV_RE
        .captures(text)
        .ok_or_else(|| FtpsError::protocol_error(format!("Cannot parse PASV: {}", text)))?;

    let nums: Vec<u8> = (1..=6)
        .map(|i| {
            caps[i]
                .parse::<u8>()
                .map_err(|_| FtpsError::protocol_error("PASV number out of range"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let ip = IpAddr::from([nums[0], nums[1], nums[2], nums[3]]);
    let port = (nums[4] as u16) * 256 + (nums[5] as u16);
    if ip.is_unspecified() {
        Ok(DataTarget::ControlHost(port))
    } else {
        Ok(DataTarget::Addr(SocketAddr::new(ip, port)))
    }
}

/// Parse `(|||port|)` from a 229 reply.
fn parse_epsv_response(text: &str) -> FtpsResult<u16> {
    let caps = EPSV_RE
        .captures(text)
        .ok_or_else(|| FtpsError::protocol_error(format!("Cannot parse EPSV: {}", text)))?;
    caps[1]
        .parse::<u16>()
        .map_err(|_| FtpsError::protocol_error("EPSV port out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pasv() {
        let target = parse_pasv_response("227 Entering Passive Mode (192,168,1,20,195,80)").unwrap();
        assert_eq!(
            target,
            DataTarget::Addr("192.168.1.20:50000".parse().unwrap())
        );
    }

    #[test]
    fn test_pasv_unspecified_uses_control_host() {
        let target = parse_pasv_response("227 Entering Passive Mode (0,0,0,0,4,1)").unwrap();
        assert_eq!(target, DataTarget::ControlHost(1025));
    }

    #[test]
    fn test_pasv_out_of_range() {
        assert!(parse_pasv_response("227 (300,1,1,1,1,1)").is_err());
        assert!(parse_pasv_response("227 nothing here").is_err());
    }

    #[tokio::test]
    async fn test_slow_reader_outlasting_idle_window_completes() {
        let (mut tx, mut rx) = tokio::io::duplex(1024);
        let content: Vec<u8> = (0..16 * 1024).map(|i| (i % 251) as u8).collect();
        let expected = content.clone();

        let reader = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut got = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                tokio::time::sleep(Duration::from_millis(15)).await;
                let n = rx.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                got.extend_from_slice(&chunk[..n]);
            }
            got
        });

        let started = std::time::Instant::now();
        write_until_idle(&mut tx, &content, Duration::from_millis(100))
            .await
            .unwrap();
        drop(tx);
        assert!(started.elapsed() > Duration::from_millis(100));
        assert_eq!(reader.await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_stalled_reader_times_out() {
        let (mut tx, _rx) = tokio::io::duplex(256);
        let err = write_until_idle(&mut tx, &[7u8; 4096], Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::ftps::error::FtpsErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_closed_peer_is_error() {
        let (mut tx, rx) = tokio::io::duplex(64);
        drop(rx);
        assert!(write_until_idle(&mut tx, &[1u8; 512], Duration::from_millis(50))
            .await
            .is_err());
    }

    #[test]
    fn test_epsv() {
        assert_eq!(parse_epsv_response("229 Entering Extended Passive Mode (|||6446|)").unwrap(), 6446);
        assert!(parse_epsv_response("229 (|||99999|)").is_err());
    }
}
