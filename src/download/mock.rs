//! In-memory [`RangeClient`] serving a fixed body, for tests.

use std::collections::HashMap;
use std::sync::Arc;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::StatusCode;
use tokio::sync::Notify;
use url::Url;
use crate::download::chunk_range::ChunkRange;
use crate::download::client::{BodyStream, RangeClient, RemoteInfo};
use crate::download::error::DownloadError;

pub struct MockClient {
    body: Bytes,
    chunk_len: usize,
    info: RemoteInfo,
    // keyed by the start of the requested range
    truncated: HashMap<u64, u64>,
    stalled: HashMap<u64, (u64, Arc<Notify>)>,
    failing: HashMap<u64, StatusCode>,
    panicking: Option<u64>,
    probe_hangs: bool,
    pub requests: Mutex<Vec<Option<ChunkRange>>>,
}

impl MockClient {
    pub fn new(body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let info = RemoteInfo { content_length: Some(body.len() as u64), accept_ranges: true };

        Self {
            body,
            info,
            chunk_len: 7,
            truncated: HashMap::new(),
            stalled: HashMap::new(),
            failing: HashMap::new(),
            panicking: None,
            probe_hangs: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_info(mut self, info: RemoteInfo) -> Self {
        self.info = info;
        self
    }

    /// Serve only `len` bytes for the range starting at `start`.
    pub fn truncate(mut self, start: u64, len: u64) -> Self {
        self.truncated.insert(start, len);
        self
    }

    /// Serve `len` bytes for the range starting at `start`, signal `notify`,
    /// then never finish.
    pub fn stall(mut self, start: u64, len: u64, notify: Arc<Notify>) -> Self {
        self.stalled.insert(start, (len, notify));
        self
    }

    pub fn fail(mut self, start: u64, status: StatusCode) -> Self {
        self.failing.insert(start, status);
        self
    }

    /// Panic inside the fetch of the range starting at `start`.
    pub fn panic_at(mut self, start: u64) -> Self {
        self.panicking = Some(start);
        self
    }

    /// Never answer the probe.
    pub fn hang_probe(mut self) -> Self {
        self.probe_hangs = true;
        self
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

impl RangeClient for MockClient {
    async fn probe(&self, _url: &Url) -> Result<RemoteInfo, DownloadError> {
        if self.probe_hangs {
            futures_util::future::pending::<()>().await;
        }
        Ok(self.info)
    }

    async fn fetch(&self, _url: &Url, range: Option<ChunkRange>) -> Result<BodyStream, DownloadError> {
        self.requests.lock().push(range);

        let (start, mut data) = match range {
            Some(range) => {
                let end = (range.end as usize + 1).min(self.body.len());
                (range.start, self.body.slice(range.start as usize..end))
            }
            None => (0, self.body.clone()),
        };

        if self.panicking == Some(start) {
            panic!("fetch of range starting at {start} panicked");
        }

        if let Some(status) = self.failing.get(&start) {
            return Err(DownloadError::HttpStatus(*status));
        }

        if let Some(len) = self.truncated.get(&start) {
            data = data.slice(..(*len as usize).min(data.len()));
        }

        let stall = self.stalled.get(&start).cloned();
        if let Some((len, _)) = &stall {
            data = data.slice(..(*len as usize).min(data.len()));
        }

        let chunks: Vec<Bytes> = data
            .chunks(self.chunk_len)
            .map(Bytes::copy_from_slice)
            .collect();

        let stream = async_stream::stream! {
            for chunk in chunks {
                yield Ok::<Bytes, DownloadError>(chunk);
            }

            if let Some((_, notify)) = stall {
                notify.notify_one();
                futures_util::future::pending::<()>().await;
            }
        };

        Ok(Box::pin(stream))
    }
}

pub fn test_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
