use std::path::{Path, PathBuf};

use anyhow::Context;
use futures::{stream, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use crate::{
    config::Config,
    downloader::{DownloadRequest, DownloadStatus, Orchestrator},
    naming::{FileNameRequest, FileNamer, NamingError, Resolution},
    song::Song,
};

/// A resolved batch handed over by whatever fetched the catalog.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub source_url: String,
    pub name: String,
    pub songs: Vec<ManifestItem>,
}

#[derive(Debug, Deserialize)]
pub struct ManifestItem {
    #[serde(flatten)]
    pub song: Song,
    pub url: String,
}

impl Manifest {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;

        serde_json::from_str(&raw).with_context(|| format!("Invalid manifest {}", path.display()))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub success: usize,
    /// Already on disk or already claimed, found either while naming or by
    /// the transfer.
    pub skipped_existing: usize,
    pub skipped_trial: usize,
    pub failed: usize,
}
impl BatchSummary {
    fn record(&mut self, status: DownloadStatus) {
        match status {
            DownloadStatus::Success => self.success += 1,
            DownloadStatus::SkippedExisting => self.skipped_existing += 1,
            DownloadStatus::SkippedTrial => self.skipped_trial += 1,
            DownloadStatus::Failed => self.failed += 1,
        }
    }
}

/// Name every item in manifest order, then download the ones that got a
/// path, `config.concurrency` at a time.
#[tracing::instrument(skip_all, fields(name = %manifest.name, songs = manifest.songs.len()))]
pub async fn run(
    manifest: &Manifest,
    config: &Config,
    namer: &FileNamer,
    orchestrator: &Orchestrator,
) -> Result<BatchSummary, NamingError> {
    let total = manifest.songs.len();
    let mut summary = BatchSummary::default();
    let mut planned: Vec<(&ManifestItem, PathBuf)> = Vec::with_capacity(total);

    for item in &manifest.songs {
        let resolution = namer.file_name(FileNameRequest {
            format: &config.format,
            song: &item.song,
            source_url: &manifest.source_url,
            name: &manifest.name,
            check_skip_exists: config.skip_exists,
        })?;

        match resolution {
            Resolution::Allocated(path) => planned.push((item, path)),
            Resolution::Skipped => {
                info!("{}/{} 下载跳过 {}", item.song.index, total, item.song.song_name);
                summary.record(DownloadStatus::SkippedExisting);
            }
        }
    }

    info!(queued = planned.len(), "Names resolved, starting downloads");

    let statuses = stream::iter(planned)
        .map(|(item, path)| async move {
            let url = match Url::parse(&item.url) {
                Ok(url) => url,
                Err(e) => {
                    warn!(?e, url = %item.url, "{}/{} 下载失败 {}", item.song.index, total, path.display());
                    orchestrator.release(&path, &item.song);
                    return DownloadStatus::Failed;
                }
            };

            orchestrator
                .download(DownloadRequest {
                    url: &url,
                    destination: &path,
                    song: &item.song,
                    total,
                    per_attempt_timeout: config.retry_timeout,
                    max_attempts: config.retry_times,
                    skip_if_exists: config.skip_exists,
                    skip_trial: config.skip_trial,
                })
                .await
        })
        .buffer_unordered(config.concurrency)
        .collect::<Vec<_>>()
        .await;

    for status in statuses {
        summary.record(status);
    }

    Ok(summary)
}
