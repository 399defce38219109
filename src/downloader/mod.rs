pub mod transfer;

use std::{path::Path, sync::Arc, time::Duration};

use tracing::{info, warn};
use transfer::{Transfer, TransferOptions, Transferred};
use url::Url;

use crate::{
    naming::{identity::ContentIdentity, registry::AllocationRegistry},
    song::Song,
};

#[derive(Debug, Clone, Copy)]
pub struct DownloadRequest<'a> {
    pub url: &'a Url,
    pub destination: &'a Path,
    pub song: &'a Song,
    pub total: usize,
    pub per_attempt_timeout: Duration,
    pub max_attempts: u32,
    pub skip_if_exists: bool,
    pub skip_trial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Success,
    SkippedExisting,
    SkippedTrial,
    Failed,
}

#[derive(Debug)]
pub struct Orchestrator {
    registry: Arc<AllocationRegistry>,
    transfer: Box<dyn Transfer>,
    retry_delay: Duration,
}
impl Orchestrator {
    pub fn new<T>(registry: Arc<AllocationRegistry>, transfer: T, retry_delay: Duration) -> Self
    where
        T: Transfer + 'static,
    {
        Self {
            registry,
            transfer: Box::new(transfer),
            retry_delay,
        }
    }

    /// Give the name claimed for `destination` back to the run.
    pub fn release(&self, destination: &Path, song: &Song) {
        let identity = ContentIdentity::resolve(destination, song, self.registry.folding());
        self.registry.release(destination, &identity);
    }

    #[tracing::instrument(skip_all, fields(index = %req.song.index, total = req.total, file = ?req.destination))]
    pub async fn download(&self, req: DownloadRequest<'_>) -> DownloadStatus {
        let position = format!("{}/{}", req.song.index, req.total);
        let file = req.destination.display().to_string();

        if req.song.is_free_trial && req.skip_trial {
            warn!("{position} 跳过试听 {file}");
            self.release(req.destination, req.song);
            return DownloadStatus::SkippedTrial;
        }

        let res = tryhard::retry_fn(|| self.attempt(&req))
            .retries(req.max_attempts.max(1) - 1)
            .fixed_backoff(self.retry_delay)
            .on_retry(|attempt, _next_delay, err| {
                let e = err.to_string();
                let position = position.clone();
                let file = file.clone();

                async move {
                    warn!(?e, "{position} {attempt}次失败 {file}");
                }
            })
            .await;

        match res {
            Ok(Transferred::Written) => {
                info!("{position} 下载成功 {file}");
                DownloadStatus::Success
            }
            Ok(Transferred::AlreadyComplete) => {
                info!("{position} 下载跳过 {file}");
                DownloadStatus::SkippedExisting
            }
            Err(e) => {
                warn!(?e, "{position} 下载失败 {file}");
                self.release(req.destination, req.song);
                DownloadStatus::Failed
            }
        }
    }

    async fn attempt(&self, req: &DownloadRequest<'_>) -> anyhow::Result<Transferred> {
        let options = TransferOptions {
            skip_if_complete: req.skip_if_exists,
            timeout: req.per_attempt_timeout,
        };

        tokio::time::timeout(
            req.per_attempt_timeout,
            self.transfer.transfer(req.url, req.destination, options),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Transfer timed out after {:?}", req.per_attempt_timeout))?
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{
        naming::{identity::CaseFolding, resolver::CollisionResolver, Resolution},
        song::test_song,
    };

    /// Fails the first `failures` calls, then succeeds. Urls containing
    /// `fail` never succeed.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedTransfer {
        pub failures: u32,
        pub delay: Option<Duration>,
        pub calls: Arc<AtomicU32>,
    }

    #[async_trait::async_trait]
    impl Transfer for ScriptedTransfer {
        async fn transfer(
            &self,
            url: &Url,
            _destination: &Path,
            options: TransferOptions,
        ) -> anyhow::Result<Transferred> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if url.as_str().contains("fail") || call < self.failures {
                anyhow::bail!("connection reset");
            }
            if options.skip_if_complete && url.as_str().contains("complete") {
                return Ok(Transferred::AlreadyComplete);
            }

            Ok(Transferred::Written)
        }
    }

    struct Fixture {
        registry: Arc<AllocationRegistry>,
        resolver: CollisionResolver,
        calls: Arc<AtomicU32>,
        orchestrator: Orchestrator,
    }
    impl Fixture {
        fn new(transfer: ScriptedTransfer) -> Self {
            let registry = Arc::new(AllocationRegistry::new(CaseFolding::Fold));
            let calls = Arc::clone(&transfer.calls);
            Self {
                resolver: CollisionResolver::new(Arc::clone(&registry)),
                orchestrator: Orchestrator::new(Arc::clone(&registry), transfer, Duration::ZERO),
                registry,
                calls,
            }
        }

        fn allocate(&self, path: &Path, song: &Song) -> std::path::PathBuf {
            let identity = ContentIdentity::resolve(path, song, CaseFolding::Fold);
            match self.resolver.resolve(path, &identity) {
                Resolution::Allocated(p) => p,
                Resolution::Skipped => panic!("expected a free slot"),
            }
        }
    }

    fn request<'a>(url: &'a Url, destination: &'a Path, song: &'a Song) -> DownloadRequest<'a> {
        DownloadRequest {
            url,
            destination,
            song,
            total: 10,
            per_attempt_timeout: Duration::from_secs(5),
            max_attempts: 3,
            skip_if_exists: true,
            skip_trial: true,
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn success_keeps_the_claim() {
        let fx = Fixture::new(ScriptedTransfer::default());
        let song = test_song("Song", Some(1000));
        let path = fx.allocate(Path::new("list/Song.mp3"), &song);
        let u = url("https://cdn.example/song.mp3");

        let status = fx.orchestrator.download(request(&u, &path, &song)).await;

        assert_eq!(status, DownloadStatus::Success);
        assert!(fx.registry.has_claim("song", 1000));
        assert_eq!(fx.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn already_complete_is_reported() {
        let fx = Fixture::new(ScriptedTransfer::default());
        let song = test_song("Song", Some(1000));
        let path = fx.allocate(Path::new("list/Song.mp3"), &song);
        let u = url("https://cdn.example/complete.mp3");

        let status = fx.orchestrator.download(request(&u, &path, &song)).await;

        assert_eq!(status, DownloadStatus::SkippedExisting);
        assert!(fx.registry.has_claim("song", 1000));
    }

    #[tokio::test]
    async fn trial_is_skipped_and_released() {
        let fx = Fixture::new(ScriptedTransfer::default());
        let mut song = test_song("Song", Some(1000));
        song.is_free_trial = true;
        let path = fx.allocate(Path::new("list/Song [试听].mp3"), &song);
        assert!(fx.registry.has_claim("song [试听]", 1000));
        let u = url("https://cdn.example/song.mp3");

        let status = fx.orchestrator.download(request(&u, &path, &song)).await;

        assert_eq!(status, DownloadStatus::SkippedTrial);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
        assert!(fx.registry.is_empty());
    }

    #[tokio::test]
    async fn trial_is_downloaded_when_allowed() {
        let fx = Fixture::new(ScriptedTransfer::default());
        let mut song = test_song("Song", Some(1000));
        song.is_free_trial = true;
        let path = fx.allocate(Path::new("list/Song [试听].mp3"), &song);
        let u = url("https://cdn.example/song.mp3");

        let req = DownloadRequest {
            skip_trial: false,
            ..request(&u, &path, &song)
        };

        assert_eq!(fx.orchestrator.download(req).await, DownloadStatus::Success);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let fx = Fixture::new(ScriptedTransfer {
            failures: 2,
            ..Default::default()
        });
        let song = test_song("Song", Some(1000));
        let path = fx.allocate(Path::new("list/Song.mp3"), &song);
        let u = url("https://cdn.example/song.mp3");

        let status = fx.orchestrator.download(request(&u, &path, &song)).await;

        assert_eq!(status, DownloadStatus::Success);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_release_the_slot() {
        let fx = Fixture::new(ScriptedTransfer::default());
        let song = test_song("Song", Some(1000));
        let path = fx.allocate(Path::new("list/Song.mp3"), &song);
        let u = url("https://cdn.example/fail.mp3");

        let status = fx.orchestrator.download(request(&u, &path, &song)).await;

        assert_eq!(status, DownloadStatus::Failed);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 3);
        assert!(!fx.registry.has_claim("song", 1000));

        // the freed slot goes to the next item with that identity
        let again = fx.allocate(Path::new("list/Song.mp3"), &song);
        assert_eq!(again, path);
    }

    #[tokio::test]
    async fn timeouts_count_as_failed_attempts() {
        let fx = Fixture::new(ScriptedTransfer {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let song = test_song("Song", None);
        let path = fx.allocate(Path::new("list/Song.mp3"), &song);
        let u = url("https://cdn.example/song.mp3");

        let req = DownloadRequest {
            per_attempt_timeout: Duration::from_millis(10),
            max_attempts: 2,
            ..request(&u, &path, &song)
        };

        assert_eq!(fx.orchestrator.download(req).await, DownloadStatus::Failed);
        assert_eq!(fx.calls.load(Ordering::SeqCst), 2);
        assert!(!fx.registry.is_path_claimed(&path));
    }
}
