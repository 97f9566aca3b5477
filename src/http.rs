//! Injected HTTP client capability.
//!
//! Every source adapter talks to its backend through this wrapper rather
//! than owning a `reqwest::Client`: one shared connection pool, one request
//! timeout policy, per-host bearer-token injection, uniform 2xx validation
//! (non-2xx responses become `SourceError::Protocol` carrying the body for
//! diagnostics), and a streaming download-to-file with progress callbacks.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::progress::ProgressListener;
use crate::source::error::{SourceError, SourceResult};

const USER_AGENT: &str = concat!("keg/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct Http {
    client: Client,
    /// host -> bearer token, injected on matching requests
    auth_tokens: HashMap<String, String>,
}

impl Http {
    pub fn new(
        request_timeout: Duration,
        auth_tokens: HashMap<String, String>,
    ) -> SourceResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            auth_tokens,
        })
    }

    fn apply_auth(&self, url: &str, request: RequestBuilder) -> RequestBuilder {
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        match host.and_then(|h| self.auth_tokens.get(&h)) {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    /// GET returning the validated response.
    pub async fn get(&self, url: &str) -> SourceResult<Response> {
        debug!(%url, "GET");
        let response = self.apply_auth(url, self.client.get(url)).send().await?;
        ensure_success(response).await
    }

    /// GET returning the response body as text.
    pub async fn get_text(&self, url: &str) -> SourceResult<String> {
        Ok(self.get(url).await?.text().await?)
    }

    /// GET deserializing a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> SourceResult<T> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).map_err(|e| SourceError::malformed(e.to_string()))
    }

    /// Stream a download into `target`, reporting progress per chunk.
    ///
    /// `target`'s parent directory is created as needed. A partially written
    /// file is removed when the transfer fails midway.
    pub async fn download_to_file(
        &self,
        url: &str,
        target: &Path,
        progress: &dyn ProgressListener,
    ) -> SourceResult<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self.get(url).await?;
        progress.started(response.content_length());

        let result = write_body(response, target, progress).await;
        progress.finished();

        if result.is_err() {
            let _ = tokio::fs::remove_file(target).await;
        }
        result
    }
}

async fn write_body(
    response: Response,
    target: &Path,
    progress: &dyn ProgressListener,
) -> SourceResult<()> {
    let mut file = tokio::fs::File::create(target).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        progress.advanced(chunk.len() as u64);
    }
    file.flush().await?;
    Ok(())
}

/// Convert any non-2xx response into a `Protocol` error carrying the body.
async fn ensure_success(response: Response) -> SourceResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SourceError::protocol(status.as_u16(), body))
}
