//! Curated-catalog source.
//!
//! The broker behind this source aggregates community-maintained tool lists
//! and serves them as flat CSV payloads. It knows the most tools and is by
//! far the slowest backend, which earns it two mitigations: listing payloads
//! go through the on-disk response cache between process invocations, and
//! the registry consults it last.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::SourceResult;
use super::{Candidate, Source, SourceLayout, ToolVersion};
use crate::http::Http;
use crate::http_cache::HttpCache;
use crate::singleflight::SingleFlight;

pub struct CatalogSource {
    http: Http,
    layout: SourceLayout,
    base_url: String,
    cache: Arc<HttpCache>,
    tools_flight: SingleFlight<Vec<Candidate>>,
    versions_flight: SingleFlight<Vec<ToolVersion>>,
}

impl CatalogSource {
    pub fn new(http: Http, layout: SourceLayout, base_url: String, cache: Arc<HttpCache>) -> Self {
        Self {
            http,
            layout,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache,
            tools_flight: SingleFlight::new(),
            versions_flight: SingleFlight::new(),
        }
    }

    /// Fetch a CSV listing, consulting the response cache first and
    /// repopulating it on a fetch.
    async fn cached_csv(http: Http, cache: Arc<HttpCache>, url: String) -> SourceResult<String> {
        if let Some(cached) = cache.lookup(&url) {
            return Ok(cached);
        }
        let body = http.get_text(&url).await?;
        cache.save(&url, &body);
        Ok(body)
    }
}

fn split_csv(body: &str) -> Vec<String> {
    body.split(',')
        .flat_map(|field| field.split_whitespace())
        .filter(|field| !field.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl Source for CatalogSource {
    fn name(&self) -> &'static str {
        "catalog"
    }

    fn description(&self) -> &'static str {
        "Curated community catalog"
    }

    fn http(&self) -> &Http {
        &self.http
    }

    fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    fn download_url(&self, tool: &str, version: &ToolVersion) -> String {
        format!(
            "{}/broker/download/{}/{}",
            self.base_url, tool, version.identifier
        )
    }

    fn version_from_identifier(&self, _tool: &str, identifier: &str) -> ToolVersion {
        ToolVersion::new("", identifier)
    }

    async fn list_tools(&self) -> SourceResult<Vec<Candidate>> {
        let url = format!("{}/candidates/all", self.base_url);
        let http = self.http.clone();
        let cache = Arc::clone(&self.cache);
        self.tools_flight
            .run("list-tools", move || async move {
                let body = Self::cached_csv(http, cache, url).await?;
                Ok(split_csv(&body).into_iter().map(Candidate::named).collect())
            })
            .await
    }

    async fn list_versions(&self, tool: &str) -> SourceResult<Vec<ToolVersion>> {
        let url = format!("{}/candidates/{}", self.base_url, tool);
        let http = self.http.clone();
        let cache = Arc::clone(&self.cache);
        self.versions_flight
            .run(&format!("list-versions-{tool}"), move || async move {
                let body = Self::cached_csv(http, cache, url).await?;
                Ok(split_csv(&body)
                    .into_iter()
                    .map(|v| ToolVersion::new("", v))
                    .collect())
            })
            .await
    }
}
