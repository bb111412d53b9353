//! Session pool: reuses logged-in `FtpsClient`s between operations.
//!
//! Sessions are checked out for exactly one NLST / MKD / STOR. Healthy ones
//! go back to the idle list (bounded by `max_idle`); any session that hit a
//! transport error is dropped.

use crate::ftps::client::FtpsClient;
use crate::ftps::error::FtpsResult;
use crate::ftps::tls;
use crate::ftps::types::UploaderConfig;
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Idle sessions older than this are closed instead of reused.
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct FtpsSessionPool {
    config: Arc<UploaderConfig>,
    tls_config: Arc<ClientConfig>,
    idle: Mutex<Vec<FtpsClient>>,
    max_idle: usize,
    idle_timeout: Duration,
}

impl FtpsSessionPool {
    pub fn new(config: Arc<UploaderConfig>) -> FtpsResult<Self> {
        let tls_config = tls::build_client_config(config.tls_trust)?;
        let max_idle = if config.keep_alive { config.max_concurrent } else { 0 };
        Ok(Self {
            config,
            tls_config,
            idle: Mutex::new(Vec::new()),
            max_idle,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        })
    }

    /// Take an idle session that still answers NOOP, or connect a new one.
    pub async fn checkout(&self) -> FtpsResult<FtpsClient> {
        loop {
            let candidate = self.idle.lock().await.pop();
            let Some(mut client) = candidate else { break };

            if client.idle_for() > self.idle_timeout {
                client.quit().await;
                continue;
            }
            match client.noop().await {
                Ok(()) => {
                    log::trace!("Reusing FTPS session {}", client.id);
                    return Ok(client);
                }
                Err(e) => log::debug!("Dropping stale FTPS session {}: {}", client.id, e),
            }
        }

        FtpsClient::connect(&self.config, self.tls_config.clone()).await
    }

    /// Return a healthy session.
    pub async fn checkin(&self, mut client: FtpsClient) {
        {
            let mut idle = self.idle.lock().await;
            if idle.len() < self.max_idle {
                idle.push(client);
                return;
            }
        }
        client.quit().await;
    }

    /// Forget a session after a transport error; the socket closes on drop.
    pub fn discard(&self, client: FtpsClient) {
        log::debug!("Discarding FTPS session {}", client.id);
        drop(client);
    }

    /// Check `client` back in when `result` is `Ok`, discard it otherwise.
    pub async fn release<T>(&self, client: FtpsClient, result: FtpsResult<T>) -> FtpsResult<T> {
        match result {
            Ok(value) => {
                self.checkin(client).await;
                Ok(value)
            }
            Err(e) => {
                self.discard(client);
                Err(e)
            }
        }
    }

    /// QUIT and drop every idle session.
    pub async fn close_idle(&self) {
        let sessions: Vec<FtpsClient> = self.idle.lock().await.drain(..).collect();
        let count = sessions.len();
        for mut client in sessions {
            client.quit().await;
        }
        if count > 0 {
            log::info!("FTPS pool: closed {} idle sessions", count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_starts_empty() {
        let config = Arc::new(UploaderConfig::new("127.0.0.1", "/img", "u", "p"));
        let pool = FtpsSessionPool::new(config).unwrap();
        assert!(pool.idle.lock().await.is_empty());
        assert_eq!(pool.max_idle, 10);
        pool.close_idle().await;
    }

    #[tokio::test]
    async fn test_keep_alive_off_disables_idle_list() {
        let mut config = UploaderConfig::new("127.0.0.1", "/img", "u", "p");
        config.keep_alive = false;
        let pool = FtpsSessionPool::new(Arc::new(config)).unwrap();
        assert_eq!(pool.max_idle, 0);
    }

    async fn idle_client(pool: &FtpsSessionPool) -> (FtpsClient, tokio::net::TcpListener) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let tcp = tokio::net::TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let codec = crate::ftps::protocol::FtpCodec::from_tcp(tcp);
        let client = FtpsClient::from_codec(codec, "127.0.0.1", pool.tls_config.clone());
        (client, listener)
    }

    #[tokio::test]
    async fn test_release_keeps_healthy_and_drops_failed_sessions() {
        let config = Arc::new(UploaderConfig::new("127.0.0.1", "/img", "u", "p"));
        let pool = FtpsSessionPool::new(config).unwrap();

        let (client, l1) = idle_client(&pool).await;
        let kept = pool.release(client, Ok(7)).await.unwrap();
        assert_eq!(kept, 7);
        assert_eq!(pool.idle.lock().await.len(), 1);

        let (client, _l2) = idle_client(&pool).await;
        let failed: FtpsResult<()> =
            Err(crate::ftps::error::FtpsError::data_channel("reset"));
        assert!(pool.release(client, failed).await.is_err());
        assert_eq!(pool.idle.lock().await.len(), 1);

        // The idle session's peer acknowledges QUIT on close.
        let peer = tokio::spawn(async move {
            use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
            let (sock, _) = l1.accept().await.unwrap();
            let (rd, mut wr) = sock.into_split();
            let mut line = String::new();
            BufReader::new(rd).read_line(&mut line).await.unwrap();
            wr.write_all(b"221 Bye\r\n").await.unwrap();
            line
        });
        pool.close_idle().await;
        assert!(pool.idle.lock().await.is_empty());
        assert_eq!(peer.await.unwrap().trim_end(), "QUIT");
    }

    #[tokio::test]
    async fn test_checkout_reports_connection_failure() {
        // Bind then drop a listener so the port is (very likely) closed.
        let port = {
            let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let mut config = UploaderConfig::new("127.0.0.1", "/img", "u", "p");
        config.port = port;
        config.connect_timeout_sec = 2;
        let pool = FtpsSessionPool::new(Arc::new(config)).unwrap();
        assert!(pool.checkout().await.is_err());
    }
}
