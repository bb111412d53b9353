//! Stateful FTPS client: owns one control connection and issues commands.
//!
//! Lifecycle: `connect()` → optional AUTH TLS → PBSZ/PROT → USER/PASS →
//! TYPE I. The session then serves NLST / MKD / STOR until `quit()`.

use crate::ftps::connection;
use crate::ftps::error::{FtpsError, FtpsResult};
use crate::ftps::protocol::FtpCodec;
use crate::ftps::tls;
use crate::ftps::transfer;
use crate::ftps::types::*;
use rustls::ClientConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::time::timeout;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);
const QUIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A logged-in FTPS session.
pub struct FtpsClient {
    pub id: u64,
    pub codec: FtpCodec,
    host: String,
    tls_config: Arc<ClientConfig>,
    data_timeout: Duration,
    last_activity: Instant,
}

impl FtpsClient {
    /// Connect, secure and authenticate a new session.
    pub async fn connect(config: &UploaderConfig, tls_config: Arc<ClientConfig>) -> FtpsResult<Self> {
        let (mut codec, banner) = connection::connect(config, &tls_config).await?;
        log::debug!("{}:{} banner: {}", config.host, config.port, banner.text());

        // ── Explicit FTPS: AUTH TLS ──────────────────────────────
        if config.security == FtpsSecurityMode::Explicit {
            let resp = codec.execute("AUTH TLS").await?;
            if resp.code != 234 {
                return Err(FtpsError::tls_failed(format!(
                    "AUTH TLS rejected: {}",
                    resp.text()
                )));
            }
            codec = tls::upgrade_to_tls(codec, &config.host, &tls_config).await?;
        }

        // Protect the data channel too.
        codec.expect_ok("PBSZ 0").await?;
        codec.expect_ok("PROT P").await?;

        // ── Authenticate ─────────────────────────────────────────
        let user_resp = codec.execute(&format!("USER {}", config.username)).await?;
        if user_resp.code == 331 {
            let pass_resp = codec
                .execute(&format!("PASS {}", config.password))
                .await?;
            if !pass_resp.is_success() {
                return Err(FtpsError::auth_failed(format!(
                    "Login failed: {}",
                    pass_resp.text()
                ))
                .with_code(pass_resp.code));
            }
        } else if !user_resp.is_success() {
            return Err(FtpsError::auth_failed(format!(
                "USER rejected: {}",
                user_resp.text()
            ))
            .with_code(user_resp.code));
        }

        codec.expect_ok("TYPE I").await?;

        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!("FTPS session {} ready on {}", id, config.host);

        Ok(Self {
            id,
            codec,
            host: config.host.clone(),
            tls_config,
            data_timeout: Duration::from_secs(config.data_timeout_sec),
            last_activity: Instant::now(),
        })
    }

    /// Send a NOOP to check the control connection is still usable.
    pub async fn noop(&mut self) -> FtpsResult<()> {
        self.codec.expect_ok("NOOP").await?;
        self.touch();
        Ok(())
    }

    // ─── NLST ────────────────────────────────────────────────────

    /// Name-list `path`, one entry per returned line.
    pub async fn name_list(&mut self, path: &str) -> FtpsResult<Vec<String>> {
        let tcp = transfer::open_data_channel(&mut self.codec, &self.host, self.data_timeout).await?;

        let resp = self.codec.execute(&format!("NLST {}", path)).await?;
        if is_empty_listing(&resp) {
            log::debug!("NLST {}: {}", path, resp.text());
            self.touch();
            return Ok(Vec::new());
        }
        if !resp.is_preliminary() {
            return Err(FtpsError::from_reply(resp.code, &resp.text()));
        }
        let mut ds =
            transfer::secure_data_channel(tcp, &self.host, &self.tls_config, self.data_timeout)
                .await?;

        let mut buf = Vec::new();
        timeout(self.data_timeout, ds.read_to_end(&mut buf))
            .await
            .map_err(|_| FtpsError::timeout("NLST data read timed out"))??;
        drop(ds);

        let done = self.codec.read_response().await?;
        if !done.is_success() {
            return Err(FtpsError::from_reply(done.code, &done.text()));
        }
        self.touch();

        Ok(split_listing(&String::from_utf8_lossy(&buf)))
    }

    // ─── MKD ─────────────────────────────────────────────────────

    /// Issue MKD and hand back the raw reply; callers decide what counts
    /// as created.
    pub async fn make_directory(&mut self, path: &str) -> FtpsResult<FtpResponse> {
        let resp = self.codec.execute(&format!("MKD {}", path)).await?;
        self.touch();
        Ok(resp)
    }

    // ─── STOR ────────────────────────────────────────────────────

    /// Upload `content` to `remote_path` and return the closing reply.
    pub async fn store(&mut self, remote_path: &str, content: &[u8]) -> FtpsResult<FtpResponse> {
        let tcp = transfer::open_data_channel(&mut self.codec, &self.host, self.data_timeout).await?;

        let resp = self.codec.execute(&format!("STOR {}", remote_path)).await?;
        if !resp.is_preliminary() {
            return Err(FtpsError::from_reply(resp.code, &resp.text()));
        }
        let mut ds =
            transfer::secure_data_channel(tcp, &self.host, &self.tls_config, self.data_timeout)
                .await?;

        // Ends with close_notify + FIN, which marks end-of-file for the server.
        transfer::write_until_idle(&mut ds, content, self.data_timeout).await?;
        drop(ds);

        let done = self.codec.read_response().await?;
        self.touch();
        Ok(done)
    }

    // ─── QUIT ────────────────────────────────────────────────────

    pub async fn quit(&mut self) {
        match timeout(QUIT_TIMEOUT, self.codec.execute("QUIT")).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => log::debug!("FTPS session {} QUIT failed: {}", self.id, e),
            Err(_) => log::debug!("FTPS session {} QUIT unanswered", self.id),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Wrap an already logged-in control connection.
    #[cfg(test)]
    pub(crate) fn from_codec(codec: FtpCodec, host: &str, tls_config: Arc<ClientConfig>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            codec,
            host: host.to_string(),
            tls_config,
            data_timeout: Duration::from_secs(5),
            last_activity: Instant::now(),
        }
    }
}

/// Some servers answer NLST on an empty directory with 450 or
/// `550 No files found` instead of opening a transfer.
fn is_empty_listing(resp: &FtpResponse) -> bool {
    match resp.code {
        450 => true,
        550 => resp.text().to_lowercase().contains("no files"),
        _ => false,
    }
}

/// Split an NLST body into entries, dropping blank lines and CR.
pub(crate) fn split_listing(body: &str) -> Vec<String> {
    body.lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
