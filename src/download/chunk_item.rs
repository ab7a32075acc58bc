use std::path::PathBuf;
use std::sync::Arc;
use futures_util::StreamExt;
use log::{debug, warn};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::select;
use tokio_util::sync::CancellationToken;
use crate::download::chunk_range::{ChunkRange, Segment};
use crate::download::client::RangeClient;
use crate::download::error::DownloadError;

/// How a single part ended.
#[derive(Debug)]
pub enum ChunkOutcome {
    Completed(PathBuf),
    /// `remaining` is what is left to fetch once the part file was rolled back
    /// to its size at open; `None` when the rollback itself failed.
    Failed {
        error: DownloadError,
        remaining: Option<Segment>,
    },
    Interrupted(Segment),
}

enum TransferEnd {
    Finished,
    Cancelled,
}

/// Fetches one segment into its own part file.
pub struct ChunkItem<C> {
    index: usize,
    segment: Segment,
    expected_len: Option<u64>,
    // send a Range header
    ranged: bool,
    // keep the bytes already in the part file
    resume: bool,
    client: Arc<C>,
    cancel_token: CancellationToken,
}

impl<C: RangeClient> ChunkItem<C> {
    pub fn new(
        index: usize,
        segment: Segment,
        expected_len: Option<u64>,
        ranged: bool,
        resume: bool,
        client: Arc<C>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self { index, segment, expected_len, ranged, resume, client, cancel_token }
    }

    pub async fn download(self) -> ChunkOutcome {
        let (mut file, initial_len) = match self.open_part_file().await {
            Ok(opened) => opened,
            Err(error) => {
                return ChunkOutcome::Failed { error, remaining: Some(self.segment.clone()) };
            }
        };

        if self.segment.range.is_some_and(|range| range.is_empty()) {
            debug!("Part {} already complete", self.index);
            return ChunkOutcome::Completed(self.segment.path.clone());
        }

        let result = self.transfer(&mut file).await;
        let written = match file.metadata().await {
            Ok(metadata) => metadata.len().saturating_sub(initial_len),
            Err(err) => return self.fail(&mut file, initial_len, err.into()).await,
        };

        match result {
            Ok(TransferEnd::Finished) => match self.expected_len {
                Some(expected) if expected != written => {
                    let error = DownloadError::SizeMismatch { index: self.index, expected, actual: written };
                    self.fail(&mut file, initial_len, error).await
                }
                _ => {
                    debug!("Part {} finished, {} bytes", self.index, written);
                    ChunkOutcome::Completed(self.segment.path.clone())
                }
            },
            Ok(TransferEnd::Cancelled) => {
                debug!("Part {} interrupted after {} bytes", self.index, written);
                ChunkOutcome::Interrupted(Segment {
                    range: self.segment.range.map(|range| range.advance(written)),
                    ..self.segment.clone()
                })
            }
            Err(error) => self.fail(&mut file, initial_len, error).await,
        }
    }

    async fn open_part_file(&self) -> Result<(File, u64), DownloadError> {
        let mut options = OpenOptions::new();
        options.create(true);
        if self.resume {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }

        let file = options.open(&self.segment.path).await?;
        let len = file.metadata().await?.len();

        Ok((file, len))
    }

    fn request_range(&self) -> Option<ChunkRange> {
        if self.ranged {
            self.segment.range
        } else {
            None
        }
    }

    /// Streams the response into `file` until the body ends, an error occurs or
    /// the token is cancelled. The stream is dropped before returning, so the
    /// file holds every byte that was acknowledged.
    async fn transfer(&self, file: &mut File) -> Result<TransferEnd, DownloadError> {
        let request = self.client.fetch(&self.segment.url, self.request_range());
        let mut stream = select! {
            biased;
            _ = self.cancel_token.cancelled() => return Ok(TransferEnd::Cancelled),
            stream = request => stream?,
        };

        loop {
            select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    file.flush().await?;
                    return Ok(TransferEnd::Cancelled);
                }
                item = stream.next() => match item {
                    Some(bytes) => file.write_all(&bytes?).await?,
                    None => {
                        file.flush().await?;
                        return Ok(TransferEnd::Finished);
                    }
                }
            }
        }
    }

    async fn fail(&self, file: &mut File, initial_len: u64, error: DownloadError) -> ChunkOutcome {
        if let Err(err) = file.flush().await {
            warn!("Part {}: flush of {:?} failed: {}", self.index, self.segment.path, err);
        }
        let remaining = match file.set_len(initial_len).await {
            Ok(()) => Some(self.segment.clone()),
            Err(err) => {
                warn!("Part {}: rollback of {:?} failed: {}", self.index, self.segment.path, err);
                None
            }
        };

        ChunkOutcome::Failed { error, remaining }
    }
}
