//!
//! # 持久化模块
//! 将未完成的分段写入硬盘，用于断点恢复
//!

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;
use url::Url;
use crate::download::chunk_range::{ChunkRange, Segment};
use crate::download::error::DownloadError;
use crate::download::util::work_dir;

const STATE_FILE_NAME: &str = "state.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointPart {
    pub url: Url,
    pub path: PathBuf,
    pub range_from: u64,
    pub range_to: u64,
}

/// The segments still to fetch for one url.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub url: Url,
    pub parts: Vec<CheckpointPart>,
}

impl Checkpoint {
    pub fn from_segments(url: Url, segments: &[Segment]) -> Result<Self, DownloadError> {
        let parts = segments
            .iter()
            .enumerate()
            .map(|(index, segment)| {
                let range = segment.range.ok_or(DownloadError::NotResumable(index))?;
                Ok(CheckpointPart {
                    url: segment.url.clone(),
                    path: segment.path.clone(),
                    range_from: range.start,
                    range_to: range.end,
                })
            })
            .collect::<Result<_, DownloadError>>()?;

        Ok(Self { url, parts })
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.parts
            .into_iter()
            .map(|part| Segment {
                url: part.url,
                path: part.path,
                range: Some(ChunkRange::new(part.range_from, part.range_to)),
            })
            .collect()
    }
}

/// Keeps one checkpoint per url inside that url's working directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    data_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    /// Directory holding the part files and the checkpoint of `url`.
    pub fn work_dir(&self, url: &Url) -> PathBuf {
        work_dir(&self.data_dir, url)
    }

    pub fn state_path(&self, url: &Url) -> PathBuf {
        self.work_dir(url).join(STATE_FILE_NAME)
    }

    /// Writes `checkpoint`, replacing any earlier one for the same url.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<PathBuf, DownloadError> {
        let path = self.state_path(&checkpoint.url);
        let temp_path = path.with_extension("json.tmp");
        fs::create_dir_all(self.work_dir(&checkpoint.url)).await?;

        let data = serde_json::to_vec_pretty(checkpoint)?;
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, &path).await?;
        debug!("Saved checkpoint with {} parts to {:?}", checkpoint.parts.len(), path);

        Ok(path)
    }

    /// The saved checkpoint for `url`, or `None` when there is none.
    pub async fn load(&self, url: &Url) -> Result<Option<Checkpoint>, DownloadError> {
        let path = self.state_path(url);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let checkpoint: Checkpoint = serde_json::from_slice(&data)?;
        if &checkpoint.url != url {
            warn!("Ignoring checkpoint {:?} saved for {}", path, checkpoint.url);
            return Ok(None);
        }

        Ok(Some(checkpoint))
    }

    /// Removes the working directory of `url`, checkpoint included.
    pub async fn remove(&self, url: &Url) -> Result<(), DownloadError> {
        remove_dir(&self.work_dir(url)).await
    }
}

async fn remove_dir(dir: &Path) -> Result<(), DownloadError> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
