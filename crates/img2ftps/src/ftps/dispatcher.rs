//! Upload dispatcher: one task per validated file, bounded by a shared
//! semaphore.
//!
//! A task holds its permit from before the STOR until the server's closing
//! reply has been read (or the transfer failed). The permit is an owned
//! guard, so every exit path releases it exactly once.

use crate::ftps::transport::FtpsTransport;
use crate::ftps::types::{FileOutcome, UploadJob, UploadStatus};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Run one job to its terminal outcome.
pub async fn run_job(
    transport: Arc<dyn FtpsTransport>,
    permits: Arc<Semaphore>,
    job: UploadJob,
) -> FileOutcome {
    let name = job.item.name.clone();
    let bytes = job.item.content.len();

    let status = match permits.acquire_owned().await {
        Ok(_permit) => {
            log::info!("Start uploading [{}]", name);
            log::debug!("[{}] {:?}, {} bytes -> {}", name, job.kind, bytes, job.remote_path);
            match transport.store(&job.remote_path, job.item.content.clone()).await {
                Ok(resp) if resp.is_transfer_complete() => {
                    log::info!("[{}] uploaded!", name);
                    UploadStatus::Uploaded
                }
                Ok(resp) => {
                    log::warn!("[{}] rejected by server: {}", name, resp.text());
                    UploadStatus::Failed { reason: resp.text() }
                }
                Err(e) => {
                    log::warn!("[{}] upload failed: {}", name, e);
                    UploadStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            }
            // `_permit` drops here, after the reply was observed.
        }
        Err(_) => UploadStatus::Failed {
            reason: "Upload permit pool closed".into(),
        },
    };

    FileOutcome {
        name,
        remote_path: Some(job.remote_path),
        bytes,
        status,
        finished_at: Utc::now(),
    }
}

/// Spawn every job on the runtime and wait for all of them.
///
/// Outcomes come back in submission order; the transfers themselves finish
/// in any order.
pub async fn dispatch(
    transport: Arc<dyn FtpsTransport>,
    permits: Arc<Semaphore>,
    jobs: Vec<UploadJob>,
) -> Vec<FileOutcome> {
    let handles: Vec<_> = jobs
        .into_iter()
        .map(|job| {
            let meta = (job.item.name.clone(), job.remote_path.clone(), job.item.content.len());
            let handle = tokio::spawn(run_job(transport.clone(), permits.clone(), job));
            (meta, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for ((name, remote_path, bytes), handle) in handles {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                log::error!("Upload task for [{}] ended abnormally: {}", name, e);
                outcomes.push(FileOutcome {
                    name,
                    remote_path: Some(remote_path),
                    bytes,
                    status: UploadStatus::Failed {
                        reason: format!("Upload task aborted: {}", e),
                    },
                    finished_at: Utc::now(),
                });
            }
        }
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftps::error::FtpsError;
    use crate::ftps::transport::MockFtpsTransport;
    use crate::ftps::types::{FileItem, FtpResponse, ImageKind};
    use mockall::predicate::eq;

    fn job(name: &str) -> UploadJob {
        let mut png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        png.extend_from_slice(b"data");
        UploadJob::new("/img", "batch", FileItem::new(name, png), ImageKind::Png)
    }

    #[tokio::test]
    async fn test_closing_data_reply_is_uploaded() {
        let mut mock = MockFtpsTransport::new();
        mock.expect_store()
            .with(eq("/img/batch/a.png"), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Ok(FtpResponse::new(226, "Transfer complete")));
        let permits = Arc::new(Semaphore::new(1));

        let outcome = run_job(Arc::new(mock), permits.clone(), job("a.png")).await;
        assert_eq!(outcome.status, UploadStatus::Uploaded);
        assert_eq!(outcome.bytes, 12);
        assert_eq!(permits.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_negative_reply_is_failed_and_releases_permit() {
        let mut mock = MockFtpsTransport::new();
        mock.expect_store()
            .returning(|_, _| Ok(FtpResponse::new(552, "Quota exceeded")));
        let permits = Arc::new(Semaphore::new(2));

        let outcome = run_job(Arc::new(mock), permits.clone(), job("a.png")).await;
        assert!(matches!(outcome.status, UploadStatus::Failed { ref reason } if reason.contains("Quota")));
        assert_eq!(permits.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_is_failed_and_releases_permit() {
        let mut mock = MockFtpsTransport::new();
        mock.expect_store()
            .returning(|_, _| Err(FtpsError::data_channel("reset")));
        let permits = Arc::new(Semaphore::new(1));

        let outcome = run_job(Arc::new(mock), permits.clone(), job("a.png")).await;
        assert!(matches!(outcome.status, UploadStatus::Failed { .. }));
        assert_eq!(permits.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_closed_pool_fails_without_transfer() {
        let mut mock = MockFtpsTransport::new();
        mock.expect_store().times(0);
        let permits = Arc::new(Semaphore::new(1));
        permits.close();

        let outcome = run_job(Arc::new(mock), permits, job("a.png")).await;
        assert!(matches!(outcome.status, UploadStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn test_dispatch_reports_every_job() {
        let mut mock = MockFtpsTransport::new();
        mock.expect_store()
            .times(3)
            .returning(|path, _| {
                if path.ends_with("b.png") {
                    Err(FtpsError::timeout("slow"))
                } else {
                    Ok(FtpResponse::new(226, "ok"))
                }
            });
        let permits = Arc::new(Semaphore::new(2));

        let outcomes = dispatch(
            Arc::new(mock),
            permits.clone(),
            vec![job("a.png"), job("b.png"), job("c.png")],
        )
        .await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes.iter().filter(|o| o.is_uploaded()).count(), 2);
        assert_eq!(permits.available_permits(), 2);
    }
}
