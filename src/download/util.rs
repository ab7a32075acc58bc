use std::path::{Path, PathBuf};
use sha2::{Digest, Sha256};
use url::Url;
use crate::download::error::DownloadError;

/// Separator between the target file name and the part index.
pub const PART_SEPARATOR: &str = ".part";

const FALLBACK_FILE_NAME: &str = "download";

/// Accepts only absolute http(s) urls with a host.
pub fn parse_url(raw: &str) -> Result<Url, DownloadError> {
    let url = Url::parse(raw).map_err(|err| DownloadError::InvalidUrl(format!("{raw}: {err}")))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(DownloadError::InvalidUrl(raw.to_string())),
    }
}

/// Last path segment of the url, without query or fragment.
pub fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(sanitize)
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// Per-url working directory name: readable prefix plus a digest of the full
/// url so that different urls with the same file name never share a directory.
pub fn work_dir_name(url: &Url) -> String {
    let digest = Sha256::digest(url.as_str().as_bytes());
    let hash = hex::encode(&digest[..6]);

    format!("{}-{}", file_name_from_url(url), hash)
}

pub fn work_dir(data_dir: &Path, url: &Url) -> PathBuf {
    data_dir.join(work_dir_name(url))
}

pub fn part_file_name(file_name: &str, index: usize) -> String {
    format!("{file_name}{PART_SEPARATOR}{index}")
}

/// Index following the last part separator in the file name of `path`.
pub fn part_index(path: &Path) -> Option<usize> {
    let name = path.file_name()?.to_str()?;
    let (_, suffix) = name.rsplit_once(PART_SEPARATOR)?;

    suffix.parse().ok()
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}
