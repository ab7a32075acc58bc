use std::path::PathBuf;
use std::sync::Arc;
use log::{info, warn};
use tokio::{fs, select};
use tokio_util::sync::CancellationToken;
use url::Url;
use crate::download::chunk_manager::ChunkManager;
use crate::download::chunk_range::{Segment, TransferPlan};
use crate::download::client::RangeClient;
use crate::download::error::{DownloadEndCause, DownloadError};
use crate::download::persistence::CheckpointStore;
use crate::download::util::{file_name_from_url, parse_url, part_file_name};

type DownloadResult = Result<DownloadEndCause, DownloadError>;

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub url: String,
    /// Root of the per-url working directories.
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub connection_count: usize,
}

impl DownloaderConfig {
    pub fn file_path(&self, url: &Url) -> PathBuf {
        self.output_dir.join(file_name_from_url(url))
    }
}

pub struct Downloader<C> {
    config: DownloaderConfig,
    client: Arc<C>,
    cancel_token: CancellationToken,
}

impl<C: RangeClient> Downloader<C> {
    pub fn new(config: DownloaderConfig, client: Arc<C>, cancel_token: CancellationToken) -> Self {
        Self { config, client, cancel_token }
    }

    /// Downloads the configured url, continuing from a saved checkpoint when
    /// there is one.
    pub async fn download(&self) -> DownloadResult {
        let url = parse_url(&self.config.url)?;
        let store = CheckpointStore::new(&self.config.data_dir);
        let output = self.config.file_path(&url);

        let plan = match self.resume_plan(&store, &url).await? {
            Some(plan) => plan,
            None => select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    warn!("Interrupted before {} was probed", url);
                    return Ok(DownloadEndCause::Cancelled);
                }
                plan = self.probe_plan(&store, url.clone()) => plan?,
            },
        };

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }

        let chunk_manager = ChunkManager::new(self.client.clone(), self.cancel_token.clone());
        chunk_manager.download(plan, &store, &output).await
    }

    async fn resume_plan(&self, store: &CheckpointStore, url: &Url) -> Result<Option<TransferPlan>, DownloadError> {
        let checkpoint = match store.load(url).await {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => return Ok(None),
            Err(DownloadError::Checkpoint(err)) => {
                warn!("Unreadable checkpoint for {}, starting over: {}", url, err);
                store.remove(url).await?;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let segments = checkpoint.into_segments();
        if !parts_match_checkpoint(&segments).await {
            warn!("Part files of {} do not match the checkpoint, starting over", url);
            store.remove(url).await?;
            return Ok(None);
        }

        info!("Resuming {} from {:?}", url, store.state_path(url));
        Ok(Some(TransferPlan::from_checkpoint(url.clone(), segments)))
    }

    async fn probe_plan(&self, store: &CheckpointStore, url: Url) -> Result<TransferPlan, DownloadError> {
        let remote = self.client.probe(&url).await?;
        info!(
            "{}: length {:?}, ranges {}",
            url,
            remote.content_length,
            if remote.accept_ranges { "supported" } else { "unsupported" }
        );

        let work_dir = store.work_dir(&url);
        fs::create_dir_all(&work_dir).await?;
        let file_name = file_name_from_url(&url);

        Ok(TransferPlan::from_probe(
            url,
            remote.content_length,
            remote.accept_ranges,
            self.config.connection_count,
            |index| work_dir.join(part_file_name(&file_name, index)),
        ))
    }
}

/// Segments of a checkpoint partition the resource in order, so each one
/// originally started right after the previous range end. A part file must
/// hold exactly the bytes between that start and its remaining range.
async fn parts_match_checkpoint(segments: &[Segment]) -> bool {
    let mut origin = 0;
    for segment in segments {
        let Some(range) = segment.range else {
            return false;
        };
        let Some(expected) = range.start.checked_sub(origin) else {
            return false;
        };

        let on_disk = match fs::metadata(&segment.path).await {
            Ok(metadata) => metadata.len(),
            Err(_) if expected == 0 => 0,
            Err(_) => return false,
        };
        if on_disk != expected {
            return false;
        }

        origin = range.end + 1;
    }

    true
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;
    use super::*;
    use crate::download::chunk_range::ChunkRange;
    use crate::download::client::RemoteInfo;
    use crate::download::mock::{test_body, MockClient};

    const URL: &str = "http://localhost:23333/files/archive.tar.gz?token=1";

    fn config(dir: &TempDir, url: &str) -> DownloaderConfig {
        DownloaderConfig {
            url: url.to_string(),
            data_dir: dir.path().join("data"),
            output_dir: dir.path().join("out"),
            connection_count: 3,
        }
    }

    async fn download(config: DownloaderConfig, client: Arc<MockClient>) -> DownloadResult {
        Downloader::new(config, client, CancellationToken::new()).download().await
    }

    #[tokio::test]
    async fn should_reject_invalid_url() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockClient::new(test_body(10)));

        let result = download(config(&dir, "ftp://localhost/file"), client.clone()).await;

        assert!(matches!(result, Err(DownloadError::InvalidUrl(_))));
        assert!(client.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn should_be_download() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockClient::new(test_body(500)));

        let cause = download(config(&dir, URL), client.clone()).await.unwrap();

        let output = dir.path().join("out").join("archive.tar.gz");
        assert_eq!(cause, DownloadEndCause::Finished { output: output.clone() });
        assert_eq!(fs::read(&output).await.unwrap(), test_body(500));
        assert_eq!(client.requests.lock().len(), 3);
    }

    #[tokio::test]
    async fn should_use_single_request_without_range_support() {
        let dir = tempfile::tempdir().unwrap();
        let info = RemoteInfo { content_length: Some(64), accept_ranges: false };
        let client = Arc::new(MockClient::new(test_body(64)).with_info(info));

        download(config(&dir, URL), client.clone()).await.unwrap();

        assert_eq!(*client.requests.lock(), vec![None]);
        let output = dir.path().join("out").join("archive.tar.gz");
        assert_eq!(fs::read(&output).await.unwrap(), test_body(64));
    }

    #[tokio::test]
    async fn should_resume_without_probe() {
        let dir = tempfile::tempdir().unwrap();
        let stalled = Arc::new(Notify::new());
        // parts: [0,99] [100,199] [200,299]
        let client = Arc::new(MockClient::new(test_body(300)).stall(100, 30, stalled.clone()));
        let token = CancellationToken::new();

        let downloader = Downloader::new(config(&dir, URL), client, token.clone());
        let handle = tokio::spawn(async move { downloader.download().await });
        stalled.notified().await;
        token.cancel();
        assert!(matches!(handle.await.unwrap(), Ok(DownloadEndCause::Paused { .. })));

        // probing this client would yield a single unranged request
        let info = RemoteInfo { content_length: None, accept_ranges: false };
        let client = Arc::new(MockClient::new(test_body(300)).with_info(info));
        download(config(&dir, URL), client.clone()).await.unwrap();

        let requests = client.requests.lock().clone();
        assert!(requests.contains(&Some(ChunkRange::new(130, 199))));
        assert!(requests.iter().all(Option::is_some));
        let output = dir.path().join("out").join("archive.tar.gz");
        assert_eq!(fs::read(&output).await.unwrap(), test_body(300));
    }

    #[tokio::test]
    async fn should_start_over_on_corrupt_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse(URL).unwrap();
        let store = CheckpointStore::new(dir.path().join("data"));
        fs::create_dir_all(store.work_dir(&url)).await.unwrap();
        fs::write(store.state_path(&url), r#"{"url": "http://localhost/a.bin", "par"#).await.unwrap();

        let client = Arc::new(MockClient::new(test_body(200)));
        let cause = download(config(&dir, URL), client.clone()).await.unwrap();

        assert!(matches!(cause, DownloadEndCause::Finished { .. }));
        assert_eq!(client.requests.lock().len(), 3);
        let output = dir.path().join("out").join("archive.tar.gz");
        assert_eq!(fs::read(&output).await.unwrap(), test_body(200));
        assert!(!store.work_dir(&url).exists());
    }

    #[tokio::test]
    async fn should_stop_waiting_for_probe_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockClient::new(test_body(10)).hang_probe());
        let token = CancellationToken::new();

        let downloader = Downloader::new(config(&dir, URL), client.clone(), token.clone());
        let handle = tokio::spawn(async move { downloader.download().await });
        tokio::task::yield_now().await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;

        assert_eq!(result.unwrap().unwrap().unwrap(), DownloadEndCause::Cancelled);
        assert!(client.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn should_start_over_when_parts_are_missing() {
        let dir = tempfile::tempdir().unwrap();
        let stalled = Arc::new(Notify::new());
        let client = Arc::new(MockClient::new(test_body(300)).stall(100, 30, stalled.clone()));
        let token = CancellationToken::new();

        let downloader = Downloader::new(config(&dir, URL), client, token.clone());
        let handle = tokio::spawn(async move { downloader.download().await });
        stalled.notified().await;
        token.cancel();
        handle.await.unwrap().unwrap();

        let url = Url::parse(URL).unwrap();
        let store = CheckpointStore::new(dir.path().join("data"));
        fs::remove_file(store.work_dir(&url).join("archive.tar.gz.part1")).await.unwrap();

        let client = Arc::new(MockClient::new(test_body(300)));
        download(config(&dir, URL), client.clone()).await.unwrap();

        assert_eq!(client.requests.lock().len(), 3);
        let output = dir.path().join("out").join("archive.tar.gz");
        assert_eq!(fs::read(&output).await.unwrap(), test_body(300));
    }
}
