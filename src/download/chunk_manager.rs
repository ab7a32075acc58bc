use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use crate::download::chunk_item::{ChunkItem, ChunkOutcome};
use crate::download::chunk_range::{Segment, TransferPlan};
use crate::download::client::RangeClient;
use crate::download::error::{DownloadEndCause, DownloadError};
use crate::download::joiner::join_files;
use crate::download::persistence::{Checkpoint, CheckpointStore};

type DownloadResultType = Result<DownloadEndCause, DownloadError>;

enum PartState {
    Pending,
    Completed(PathBuf),
    Remaining(Segment),
    // the part file could not be rolled back
    Unrecoverable,
}

/// Runs one fetcher per segment and turns their outcomes into the end of the
/// download: a joined file, a saved checkpoint or an error.
pub struct ChunkManager<C> {
    client: Arc<C>,
    cancel_token: CancellationToken,
}

impl<C: RangeClient> ChunkManager<C> {
    pub fn new(client: Arc<C>, cancel_token: CancellationToken) -> Self {
        Self { client, cancel_token }
    }

    pub async fn download(
        &self,
        plan: TransferPlan,
        store: &CheckpointStore,
        output: &Path,
    ) -> DownloadResultType {
        let count = plan.segments.len();
        // cancelled on the first failure without touching the caller's token
        let token = self.cancel_token.child_token();
        let (sender, mut receiver) = mpsc::channel(count.max(1));

        info!("Downloading {} in {} parts", plan.url, count);
        for (index, segment) in plan.segments.iter().enumerate() {
            let item = ChunkItem::new(
                index,
                segment.clone(),
                plan.expected_len(index),
                plan.resumable,
                plan.resumed,
                self.client.clone(),
                token.clone(),
            );
            let sender = sender.clone();

            tokio::spawn(async move {
                let outcome = item.download().await;
                let _ = sender.send((index, outcome)).await;
            });
        }
        // the channel closes once every fetcher has reported
        drop(sender);

        let mut states: Vec<PartState> = (0..count).map(|_| PartState::Pending).collect();
        let mut interrupted = false;
        let mut failure = None;

        while let Some((index, outcome)) = receiver.recv().await {
            states[index] = match outcome {
                ChunkOutcome::Completed(path) => PartState::Completed(path),
                ChunkOutcome::Interrupted(remaining) => {
                    interrupted = true;
                    PartState::Remaining(remaining)
                }
                ChunkOutcome::Failed { error, remaining } => {
                    error!("Part {} failed: {}", index, error);
                    if failure.is_none() {
                        token.cancel();
                        failure = Some(error);
                    }
                    remaining.map_or(PartState::Unrecoverable, PartState::Remaining)
                }
            };
        }

        if let Some(error) = failure {
            if plan.resumable {
                match self.save_checkpoint(&plan, &states, store).await {
                    Ok(path) => info!("Saved progress to {:?} before failing", path),
                    Err(err) => warn!("Progress of {} could not be saved: {}", plan.url, err),
                }
            }
            return Err(error);
        }

        if let Some(index) = states.iter().position(|state| matches!(state, PartState::Pending)) {
            return Err(DownloadError::WorkerLost(index));
        }

        if interrupted {
            if !plan.resumable {
                warn!("Interrupted a transfer that cannot be resumed");
                store.remove(&plan.url).await?;
                return Ok(DownloadEndCause::Cancelled);
            }

            let checkpoint = self.save_checkpoint(&plan, &states, store).await?;
            info!("Interrupted, progress saved to {:?}", checkpoint);
            return Ok(DownloadEndCause::Paused { checkpoint });
        }

        let files: Vec<PathBuf> = states
            .into_iter()
            .filter_map(|state| match state {
                PartState::Completed(path) => Some(path),
                _ => None,
            })
            .collect();

        if let [file] = files.as_slice() {
            if tokio::fs::metadata(file).await?.len() == 0 {
                info!("{} is empty, nothing to join", plan.url);
                store.remove(&plan.url).await?;
                return Ok(DownloadEndCause::Empty);
            }
        }

        let written = join_files(files, output).await?;
        if let Some(expected) = plan.total_len.filter(|len| *len != written) {
            warn!("Joined {} bytes, the server announced {}", written, expected);
        }
        store.remove(&plan.url).await?;
        debug!("Removed working directory of {}", plan.url);

        Ok(DownloadEndCause::Finished { output: output.to_path_buf() })
    }

    /// Saves what is left of every part, completed parts as empty ranges.
    async fn save_checkpoint(
        &self,
        plan: &TransferPlan,
        states: &[PartState],
        store: &CheckpointStore,
    ) -> Result<PathBuf, DownloadError> {
        let mut remaining = Vec::with_capacity(states.len());
        for (index, (segment, state)) in plan.segments.iter().zip(states).enumerate() {
            match state {
                PartState::Completed(_) => remaining.push(Segment {
                    range: segment.range.map(|range| range.advance(range.len())),
                    ..segment.clone()
                }),
                PartState::Remaining(segment) => remaining.push(segment.clone()),
                PartState::Pending | PartState::Unrecoverable => {
                    return Err(DownloadError::NotResumable(index));
                }
            }
        }

        let checkpoint = Checkpoint::from_segments(plan.url.clone(), &remaining)?;
        store.save(&checkpoint).await
    }
}
