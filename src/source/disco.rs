//! Release-API source.
//!
//! A REST discovery service for JDK-style runtimes: version listings are
//! paginated JSON, walked page by page until the backend reports no more.
//! Every page fetch is individually coalesced so two tools resolving
//! concurrently never fetch the same page twice.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::error::{SourceError, SourceResult};
use super::{Candidate, Source, SourceLayout, ToolVersion};
use crate::http::Http;
use crate::singleflight::SingleFlight;

/// Upper bound on pagination, as defense against a backend that never stops
/// reporting more pages.
const MAX_PAGES: u32 = 64;

#[derive(Debug, Clone, Deserialize)]
struct PackagePage {
    packages: Vec<PackageEntry>,
    #[serde(default)]
    more: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct PackageEntry {
    /// Opaque handle the download endpoint accepts.
    id: String,
    vendor: String,
    version: String,
    #[serde(default)]
    release_status: Option<String>,
}

pub struct DiscoSource {
    http: Http,
    layout: SourceLayout,
    base_url: String,
    tools_flight: SingleFlight<Vec<Candidate>>,
    page_flight: SingleFlight<PackagePage>,
}

impl DiscoSource {
    pub fn new(http: Http, layout: SourceLayout, base_url: String) -> Self {
        Self {
            http,
            layout,
            base_url: base_url.trim_end_matches('/').to_string(),
            tools_flight: SingleFlight::new(),
            page_flight: SingleFlight::new(),
        }
    }

    async fn fetch_page(&self, tool: &str, page: u32) -> SourceResult<PackagePage> {
        let url = format!("{}/packages?tool={}&page={}", self.base_url, tool, page);
        let http = self.http.clone();
        self.page_flight
            .run(&format!("list-versions-{tool}-page-{page}"), move || {
                async move { http.get_json(&url).await }
            })
            .await
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ToolListing {
    tools: Vec<ToolEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ToolEntry {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    homepage: String,
}

#[async_trait]
impl Source for DiscoSource {
    fn name(&self) -> &'static str {
        "disco"
    }

    fn description(&self) -> &'static str {
        "Runtime discovery API"
    }

    fn http(&self) -> &Http {
        &self.http
    }

    fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    fn download_url(&self, _tool: &str, version: &ToolVersion) -> String {
        format!("{}/download/{}", self.base_url, version.identifier)
    }

    fn version_from_identifier(&self, _tool: &str, identifier: &str) -> ToolVersion {
        // Identifiers look like `<vendor>-<version>`; older installs may
        // predate that scheme, in which case the identifier doubles as the
        // display version.
        match identifier.split_once('-') {
            Some((vendor, version)) => {
                ToolVersion::new(vendor, version).with_identifier(identifier)
            }
            None => ToolVersion::new("", identifier),
        }
    }

    async fn list_tools(&self) -> SourceResult<Vec<Candidate>> {
        let url = format!("{}/tools", self.base_url);
        let http = self.http.clone();
        self.tools_flight
            .run("list-tools", move || async move {
                let listing: ToolListing = http.get_json(&url).await?;
                Ok(listing
                    .tools
                    .into_iter()
                    .map(|tool| Candidate {
                        display_name: if tool.name.is_empty() {
                            tool.id.clone()
                        } else {
                            tool.name
                        },
                        description: tool.description,
                        homepage_url: tool.homepage,
                        metadata: HashMap::new(),
                        id: tool.id,
                    })
                    .collect())
            })
            .await
    }

    async fn list_versions(&self, tool: &str) -> SourceResult<Vec<ToolVersion>> {
        let mut versions = Vec::new();
        for page in 0..MAX_PAGES {
            let listing = self.fetch_page(tool, page).await?;
            versions.extend(listing.packages.into_iter().map(|entry| {
                let mut version = ToolVersion::new(entry.vendor, entry.version)
                    .with_identifier(entry.id);
                if let Some(status) = entry.release_status {
                    version = version.with_tag(status);
                }
                version
            }));
            if !listing.more {
                return Ok(versions);
            }
        }
        Err(SourceError::malformed(format!(
            "pagination did not terminate after {MAX_PAGES} pages"
        )))
    }
}
