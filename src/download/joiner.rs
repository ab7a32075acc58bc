//! Joins finished part files into the final output file.

use std::path::{Path, PathBuf};
use log::{debug, info};
use tokio::fs::{File, OpenOptions};
use tokio::io::{self, AsyncWriteExt};
use crate::download::util::part_index;

/// Orders part files by the number after the part separator, so `part2`
/// comes before `part10`. If any name carries no parsable index the whole list
/// is ordered lexically instead.
pub fn sort_parts(files: &mut [PathBuf]) {
    let indexes: Option<Vec<usize>> = files.iter().map(|file| part_index(file)).collect();

    match indexes {
        Some(_) => files.sort_by_key(|file| part_index(file)),
        None => files.sort(),
    }
}

/// Concatenates `files`, in part order, into `output`, which is created or
/// truncated. Returns the number of bytes written.
///
/// Stops at the first error and leaves `output` partially written.
pub async fn join_files(mut files: Vec<PathBuf>, output: &Path) -> io::Result<u64> {
    sort_parts(&mut files);
    info!("Joining {} parts into {:?}", files.len(), output);

    let mut output_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(output)
        .await?;

    let mut total = 0;
    for file in &files {
        let mut part = File::open(file).await?;
        let copied = io::copy(&mut part, &mut output_file).await?;
        debug!("Joined {:?}, {} bytes", file, copied);
        total += copied;
    }

    output_file.flush().await?;
    output_file.sync_all().await?;

    Ok(total)
}
