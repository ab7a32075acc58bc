use std::ops::{Bound, RangeBounds};
use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use url::Url;
use crate::download::error::DownloadError;

/// Inclusive byte range `[start, end]`. `start == end + 1` marks a range with
/// nothing left to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn from_len(start: u64, len: u64) -> Self {
        Self { start, end: start + len - 1 }
    }

    pub fn len(&self) -> u64 {
        (self.end + 1).saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The part of this range left after `done` bytes have been received.
    pub fn advance(&self, done: u64) -> Self {
        Self { start: self.start + done.min(self.len()), end: self.end }
    }

    pub fn to_range_header(&self) -> Result<headers::Range, DownloadError> {
        headers::Range::bytes(self).map_err(|_| DownloadError::InvalidRange(*self))
    }
}

impl<'a> RangeBounds<u64> for &'a ChunkRange {
    fn start_bound(&self) -> Bound<&u64> {
        Bound::Included(&self.start)
    }

    fn end_bound(&self) -> Bound<&u64> {
        Bound::Included(&self.end)
    }
}

/// One independently fetched piece of the remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub url: Url,
    pub path: PathBuf,
    /// `None` only for a non-ranged transfer of a resource of unknown length.
    pub range: Option<ChunkRange>,
}

impl Segment {
    /// Bytes this segment is expected to deliver, when known.
    pub fn expected_len(&self) -> Option<u64> {
        self.range.map(|range| range.len())
    }
}

#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub url: Url,
    /// Whether ranged requests (and therefore checkpoints) are usable.
    pub resumable: bool,
    pub total_len: Option<u64>,
    pub segments: Vec<Segment>,
    /// Set when the segments came from a checkpoint; their files already hold
    /// the bytes before each range start.
    pub resumed: bool,
}

impl TransferPlan {
    /// Builds a fresh plan from what the probe learned about the resource.
    ///
    /// Without both a length and range support the plan collapses to a single
    /// non-resumable segment covering the whole resource.
    pub fn from_probe(
        url: Url,
        content_length: Option<u64>,
        accept_ranges: bool,
        connections: usize,
        part_path: impl Fn(usize) -> PathBuf,
    ) -> Self {
        match content_length {
            Some(len) if accept_ranges && len > 0 => {
                let segments = plan_segments(len, connections)
                    .into_iter()
                    .enumerate()
                    .map(|(index, range)| Segment {
                        url: url.clone(),
                        path: part_path(index),
                        range: Some(range),
                    })
                    .collect();

                Self { url, resumable: true, total_len: Some(len), segments, resumed: false }
            }
            _ => {
                let segment = Segment {
                    url: url.clone(),
                    path: part_path(0),
                    range: content_length.filter(|len| *len > 0).map(|len| ChunkRange::from_len(0, len)),
                };

                Self { url, resumable: false, total_len: content_length, segments: vec![segment], resumed: false }
            }
        }
    }

    /// Rebuilds a plan from the remaining segments of a checkpoint.
    pub fn from_checkpoint(url: Url, segments: Vec<Segment>) -> Self {
        Self { url, resumable: true, total_len: None, segments, resumed: true }
    }

    /// Expected byte count for the segment at `index`.
    pub fn expected_len(&self, index: usize) -> Option<u64> {
        let segment = &self.segments[index];
        segment.expected_len().or(if self.resumable { None } else { self.total_len })
    }
}

/// Splits `[0, len - 1]` into `connections` ascending ranges; the last range
/// absorbs the remainder of the integer division.
///
/// Connections are clamped to `[1, len]` so that no range is empty.
pub fn plan_segments(len: u64, connections: usize) -> Vec<ChunkRange> {
    if len == 0 {
        return Vec::new();
    }

    let count = (connections.max(1) as u64).min(len);
    let part_len = len / count;

    (0..count)
        .map(|i| {
            let start = part_len * i;
            let end = if i < count - 1 { part_len * (i + 1) - 1 } else { len - 1 };
            ChunkRange::new(start, end)
        })
        .collect()
}
