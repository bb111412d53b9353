//! The remote-operation seam used by the upload pipeline.
//!
//! `FtpsSessionPool` is the production implementation; tests plug in
//! mocks and fakes.

use crate::ftps::error::FtpsResult;
use crate::ftps::pool::FtpsSessionPool;
use crate::ftps::types::FtpResponse;
use async_trait::async_trait;
use bytes::Bytes;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FtpsTransport: Send + Sync {
    /// Name-list a remote directory.
    async fn list_directory(&self, path: &str) -> FtpsResult<Vec<String>>;

    /// Create a remote directory. A negative reply is returned, not raised.
    async fn make_directory(&self, path: &str) -> FtpsResult<FtpResponse>;

    /// Write `content` to `remote_path` and return the server's closing reply.
    async fn store(&self, remote_path: &str, content: Bytes) -> FtpsResult<FtpResponse>;
}

#[async_trait]
impl FtpsTransport for FtpsSessionPool {
    async fn list_directory(&self, path: &str) -> FtpsResult<Vec<String>> {
        let mut client = self.checkout().await?;
        let result = client.name_list(path).await;
        self.release(client, result).await
    }

    async fn make_directory(&self, path: &str) -> FtpsResult<FtpResponse> {
        let mut client = self.checkout().await?;
        let result = client.make_directory(path).await;
        self.release(client, result).await
    }

    async fn store(&self, remote_path: &str, content: Bytes) -> FtpsResult<FtpResponse> {
        let mut client = self.checkout().await?;
        let result = client.store(remote_path, &content).await;
        self.release(client, result).await
    }
}
