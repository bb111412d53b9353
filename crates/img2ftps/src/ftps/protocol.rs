//! Low-level FTP command/response codec (RFC 959 §4).
//!
//! Sends CRLF-terminated commands and reads single- or multi-line replies
//! over either a plain or a TLS-wrapped control connection.

use crate::ftps::error::{FtpsError, FtpsResult};
use crate::ftps::types::FtpResponse;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// Plain or TLS read half of the control connection.
pub enum ReadHalf {
    Plain(BufReader<OwnedReadHalf>),
    Tls(BufReader<tokio::io::ReadHalf<TlsStream<TcpStream>>>),
}

/// Plain or TLS write half of the control connection.
pub enum WriteHalf {
    Plain(OwnedWriteHalf),
    Tls(tokio::io::WriteHalf<TlsStream<TcpStream>>),
}

pub struct FtpCodec {
    pub reader: ReadHalf,
    pub writer: WriteHalf,
}

impl FtpCodec {
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (rd, wr) = stream.into_split();
        Self {
            reader: ReadHalf::Plain(BufReader::new(rd)),
            writer: WriteHalf::Plain(wr),
        }
    }

    pub fn from_tls(stream: TlsStream<TcpStream>) -> Self {
        let (rd, wr) = tokio::io::split(stream);
        Self {
            reader: ReadHalf::Tls(BufReader::new(rd)),
            writer: WriteHalf::Tls(wr),
        }
    }

    /// Send a raw command; CRLF is appended here.
    pub async fn send_command(&mut self, cmd: &str) -> FtpsResult<()> {
        let line = format!("{}\r\n", cmd);
        match &mut self.writer {
            WriteHalf::Plain(w) => w.write_all(line.as_bytes()).await?,
            WriteHalf::Tls(w) => {
                w.write_all(line.as_bytes()).await?;
                w.flush().await?;
            }
        }
        if cmd.starts_with("PASS ") {
            log::trace!(">>> PASS ****");
        } else {
            log::trace!(">>> {}", cmd);
        }
        Ok(())
    }

    async fn read_line_raw(&mut self) -> FtpsResult<String> {
        let mut buf = String::new();
        let n = match &mut self.reader {
            ReadHalf::Plain(r) => r.read_line(&mut buf).await?,
            ReadHalf::Tls(r) => r.read_line(&mut buf).await?,
        };
        if n == 0 {
            return Err(FtpsError::disconnected("Server closed connection"));
        }
        Ok(buf)
    }

    /// Read a complete reply.
    ///
    /// Multi-line replies look like:
    /// ```text
    /// 211-Features:
    ///  UTF8
    /// 211 End
    /// ```
    pub async fn read_response(&mut self) -> FtpsResult<FtpResponse> {
        let first = self.read_line_raw().await?;
        let first_trimmed = first.trim_end_matches(['\r', '\n']);
        let code = parse_code(first_trimmed)?;
        let mut lines = vec![first_trimmed.to_string()];

        if is_multiline_start(first_trimmed) {
            let terminator = format!("{} ", code);
            loop {
                let next = self.read_line_raw().await?;
                let next_trimmed = next.trim_end_matches(['\r', '\n']);
                lines.push(next_trimmed.to_string());
                if next_trimmed.starts_with(&terminator) || next_trimmed == code.to_string() {
                    break;
                }
            }
        }

        let resp = FtpResponse { code, lines };
        log::trace!("<<< {}", resp.lines.last().map(String::as_str).unwrap_or(""));
        Ok(resp)
    }

    pub async fn execute(&mut self, cmd: &str) -> FtpsResult<FtpResponse> {
        self.send_command(cmd).await?;
        self.read_response().await
    }

    /// Send a command and require a reply in the given class (1-5).
    pub async fn expect(&mut self, cmd: &str, expected_first_digit: u16) -> FtpsResult<FtpResponse> {
        let resp = self.execute(cmd).await?;
        if resp.code / 100 != expected_first_digit {
            return Err(FtpsError::from_reply(resp.code, &resp.text()));
        }
        Ok(resp)
    }

    pub async fn expect_ok(&mut self, cmd: &str) -> FtpsResult<FtpResponse> {
        self.expect(cmd, 2).await
    }
}

/// Parse the 3-digit reply code from the start of a line.
pub(crate) fn parse_code(line: &str) -> FtpsResult<u16> {
    line.get(..3)
        .filter(|c| c.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| FtpsError::protocol_error(format!("Invalid reply code in: '{}'", line)))
}

fn is_multiline_start(line: &str) -> bool {
    line.as_bytes().get(3) == Some(&b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_code() {
        assert_eq!(parse_code("226 Transfer complete").unwrap(), 226);
        assert_eq!(parse_code("257").unwrap(), 257);
        assert!(parse_code("22").is_err());
        assert!(parse_code("abc def").is_err());
        assert!(parse_code("2é6 x").is_err());
    }

    #[test]
    fn test_multiline_marker() {
        assert!(is_multiline_start("211-Features:"));
        assert!(!is_multiline_start("211 End"));
        assert!(!is_multiline_start("211"));
    }

    #[tokio::test]
    async fn test_read_multiline_response() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"220-Welcome\r\n220-second line\r\n220 Ready\r\n331 Password required\r\n")
                .await
                .unwrap();
        });

        let tcp = TcpStream::connect(addr).await.unwrap();
        let mut codec = FtpCodec::from_tcp(tcp);
        let banner = codec.read_response().await.unwrap();
        assert_eq!(banner.code, 220);
        assert_eq!(banner.lines.len(), 3);
        let next = codec.read_response().await.unwrap();
        assert_eq!(next.code, 331);
        server.await.unwrap();
    }
}
