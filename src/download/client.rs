use std::future::Future;
use std::pin::Pin;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use headers::HeaderMapExt;
use log::debug;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH};
use reqwest::{Client, Method, Request, Response, StatusCode};
use url::Url;
use crate::download::chunk_range::ChunkRange;
use crate::download::error::DownloadError;

pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, DownloadError>> + Send + 'static>>;

/// What the probe learned about the remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteInfo {
    pub content_length: Option<u64>,
    pub accept_ranges: bool,
}

/// The HTTP operations the engine needs: one probe and ranged streaming GETs.
pub trait RangeClient: Send + Sync + 'static {
    fn probe(&self, url: &Url) -> impl Future<Output = Result<RemoteInfo, DownloadError>> + Send;

    /// Streams the body of a GET, restricted to `range` when one is given.
    fn fetch(
        &self,
        url: &Url,
        range: Option<ChunkRange>,
    ) -> impl Future<Output = Result<BodyStream, DownloadError>> + Send;
}

pub struct HttpRangeClient {
    client: Client,
    user_agent: String,
}

impl HttpRangeClient {
    pub fn new(client: Client, user_agent: impl Into<String>) -> Self {
        Self { client, user_agent: user_agent.into() }
    }

    fn create_http_request(&self, method: Method, url: &Url) -> Result<Request, DownloadError> {
        let mut request = Request::new(method, url.clone());
        let header_map = request.headers_mut();

        let agent = headers::HeaderValue::from_str(&self.user_agent)
            .map_err(|_| DownloadError::InvalidHeader(self.user_agent.clone()))?;
        header_map.insert(reqwest::header::USER_AGENT, agent);
        header_map.insert(reqwest::header::ACCEPT, headers::HeaderValue::from_static("*/*"));
        header_map.typed_insert(headers::Connection::keep_alive());

        Ok(request)
    }

    async fn send_probe(&self, method: Method, url: &Url) -> Result<Response, DownloadError> {
        let request = self.create_http_request(method, url)?;
        self.client.execute(request).await.map_err(DownloadError::Probe)
    }
}

impl RangeClient for HttpRangeClient {
    async fn probe(&self, url: &Url) -> Result<RemoteInfo, DownloadError> {
        let mut response = self.send_probe(Method::HEAD, url).await?;
        if !response.status().is_success() {
            debug!("HEAD {} answered {}, probing with GET", url, response.status());
            response = self.send_probe(Method::GET, url).await?;
        }

        if !response.status().is_success() {
            return Err(DownloadError::ProbeStatus(response.status()));
        }

        Ok(remote_info(response.headers()))
    }

    async fn fetch(&self, url: &Url, range: Option<ChunkRange>) -> Result<BodyStream, DownloadError> {
        let mut request = self.create_http_request(Method::GET, url)?;
        if let Some(range) = range {
            request.headers_mut().typed_insert(range.to_range_header()?);
        }

        let response = self.client.execute(request).await?;
        check_fetch_status(response.status(), range.is_some())?;

        let stream = response
            .bytes_stream()
            .map(|item| item.map_err(DownloadError::HttpRequestFailed));

        Ok(Box::pin(stream))
    }
}

/// A ranged request must be answered with 206, otherwise the body is the
/// whole resource.
fn check_fetch_status(status: StatusCode, ranged: bool) -> Result<(), DownloadError> {
    if !status.is_success() {
        return Err(DownloadError::HttpStatus(status));
    }
    if ranged && status != StatusCode::PARTIAL_CONTENT {
        return Err(DownloadError::RangeNotHonored(status));
    }

    Ok(())
}

fn remote_info(headers: &reqwest::header::HeaderMap) -> RemoteInfo {
    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    let accept_ranges = headers
        .get(ACCEPT_RANGES)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            let value = value.trim();
            !value.is_empty() && !value.eq_ignore_ascii_case("none")
        })
        .unwrap_or(false);

    RemoteInfo { content_length, accept_ranges }
}
