use std::path::PathBuf;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::io;
use crate::download::chunk_range::ChunkRange;

/// 下载中发生的错误
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Invalid url: {0}")]
    InvalidUrl(String),

    #[error("Probe request failed: {:?}", .0)]
    Probe(#[source] reqwest::Error),

    #[error("Probe request failed: HTTP {0}")]
    ProbeStatus(StatusCode),

    #[error("Http request failed: {:?}", .0)]
    HttpRequestFailed(#[from] reqwest::Error),

    #[error("Http request failed: HTTP {0}")]
    HttpStatus(StatusCode),

    #[error("Server ignored the byte range: HTTP {0}")]
    RangeNotHonored(StatusCode),

    #[error("IOError: {:?}", .0)]
    IOError(#[from] io::Error),

    #[error("Part {index}: expected {expected} bytes, got {actual} bytes")]
    SizeMismatch {
        index: usize,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Invalid byte range: {:?}", .0)]
    InvalidRange(ChunkRange),

    #[error("Checkpoint error: {:?}", .0)]
    Checkpoint(#[from] serde_json::Error),

    #[error("Part {0} cannot be checkpointed")]
    NotResumable(usize),

    #[error("Part {0} exited without reporting")]
    WorkerLost(usize),
}

/// 下载结束的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEndCause {
    /// Every part arrived and was joined into `output`.
    Finished { output: PathBuf },
    /// The remote resource was empty; nothing was written.
    Empty,
    /// Interrupted; the remaining work was saved to `checkpoint`.
    Paused { checkpoint: PathBuf },
    /// Interrupted while the transfer could not be resumed.
    Cancelled,
}
