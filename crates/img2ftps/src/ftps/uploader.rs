//! High-level facade. Owns the configuration, the transport and the permit
//! pool, and runs directory-ensure → validate → dispatch for each batch.

use crate::ftps::directory;
use crate::ftps::dispatcher;
use crate::ftps::error::{FtpsError, FtpsResult};
use crate::ftps::pool::FtpsSessionPool;
use crate::ftps::transport::FtpsTransport;
use crate::ftps::types::*;
use crate::ftps::validator;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct ImageUploader {
    config: Arc<UploaderConfig>,
    transport: Arc<dyn FtpsTransport>,
    permits: Arc<Semaphore>,
    /// Set when the uploader owns its session pool.
    pool: Option<Arc<FtpsSessionPool>>,
}

impl ImageUploader {
    /// Build an uploader backed by a pooled FTPS transport.
    pub fn new(config: UploaderConfig) -> FtpsResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let pool = Arc::new(FtpsSessionPool::new(config.clone())?);
        log::info!(
            "FTPS uploader for {}:{}{} (max {} concurrent)",
            config.host,
            config.port,
            config.base_path,
            config.max_concurrent
        );
        let mut uploader = Self::build(config, pool.clone());
        uploader.pool = Some(pool);
        Ok(uploader)
    }

    /// Build an uploader over any transport.
    pub fn with_transport(
        config: UploaderConfig,
        transport: Arc<dyn FtpsTransport>,
    ) -> FtpsResult<Self> {
        config.validate()?;
        Ok(Self::build(Arc::new(config), transport))
    }

    fn build(config: Arc<UploaderConfig>, transport: Arc<dyn FtpsTransport>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            config,
            transport,
            permits,
            pool: None,
        }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Permits currently free in the concurrency budget.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// QUIT every idle session held by the pool. Later uploads reconnect.
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close_idle().await;
        }
    }

    /// Upload in-memory files into `base_path/subfolder`.
    ///
    /// Never fails as a whole: every file gets an outcome in the report.
    pub async fn upload(&self, subfolder: &str, files: Vec<FileItem>) -> BatchReport {
        let started_at = Utc::now();
        let base_path = self.config.base_path.as_str();

        let folder_ready = if validator::is_plain_name(subfolder) {
            directory::ensure_folder(
                self.transport.as_ref(),
                base_path,
                subfolder,
                self.config.folder_match,
            )
            .await
        } else {
            log::warn!("Subfolder {:?} is not a plain directory name", subfolder);
            false
        };

        let mut outcomes = Vec::with_capacity(files.len());

        if !folder_ready {
            log::warn!(
                "Remote folder [{}] unavailable, skipping {} file(s)",
                subfolder,
                files.len()
            );
            outcomes.extend(files.iter().map(|f| {
                FileOutcome::skipped(&f.name, f.content.len(), SkipReason::FolderUnavailable)
            }));
        } else {
            let mut jobs = Vec::new();
            for item in files {
                if !validator::is_plain_name(&item.name) {
                    log::info!("[{}] not valid, skipping...", item.name.escape_debug());
                    outcomes.push(FileOutcome::skipped(
                        &item.name,
                        item.content.len(),
                        SkipReason::InvalidName,
                    ));
                    continue;
                }
                match validator::validate(&item.content, self.config.max_file_size) {
                    Ok(kind) => jobs.push(UploadJob::new(base_path, subfolder, item, kind)),
                    Err(reason) => {
                        log::info!("[{}] not valid, skipping...", item.name);
                        log::debug!("[{}] rejected: {:?}", item.name, reason);
                        outcomes.push(FileOutcome::skipped(&item.name, item.content.len(), reason));
                    }
                }
            }

            outcomes.extend(
                dispatcher::dispatch(self.transport.clone(), self.permits.clone(), jobs).await,
            );
        }

        let report = BatchReport {
            subfolder: subfolder.to_string(),
            folder_ready,
            outcomes,
            started_at,
            duration_ms: (Utc::now() - started_at).num_milliseconds().max(0) as u64,
        };
        log::info!(
            "Batch [{}]: {} uploaded, {} skipped, {} failed",
            subfolder,
            report.uploaded(),
            report.skipped(),
            report.failed()
        );
        report
    }

    /// Read local files and upload them under their base names.
    ///
    /// Any unreadable path fails the call before anything is sent.
    pub async fn upload_paths<P: AsRef<Path>>(
        &self,
        subfolder: &str,
        paths: &[P],
    ) -> FtpsResult<BatchReport> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(read_file_item(path.as_ref()).await?);
        }
        Ok(self.upload(subfolder, files).await)
    }

    /// Single-file form of [`upload_paths`](Self::upload_paths).
    pub async fn upload_path(&self, subfolder: &str, path: impl AsRef<Path>) -> FtpsResult<BatchReport> {
        let item = read_file_item(path.as_ref()).await?;
        Ok(self.upload(subfolder, vec![item]).await)
    }
}

/// Load a file's bytes, naming the item after the path's final component.
pub async fn read_file_item(path: &Path) -> FtpsResult<FileItem> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            FtpsError::io_error(format!("'{}' does not name a file", path.display()))
        })?;
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| FtpsError::io_error(format!("Reading {}: {}", path.display(), e)))?;
    Ok(FileItem::new(name, content))
}
