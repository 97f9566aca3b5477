//! CDN source.
//!
//! The CDN serves zip bundles behind an HTTP/2 endpoint that caps concurrent
//! streams, so page listings fan out in waves through the bounded
//! concurrency gate instead of unboundedly. Archive names carry everything
//! we need: `zulu21.32.17-ca-jdk21.0.2-linux_x64.zip` yields the identifier
//! `21.32.17-ca-jdk21.0.2` and the display version `21.0.2`.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;

use super::error::{SourceError, SourceResult};
use super::{Candidate, Source, SourceLayout, ToolVersion};
use crate::archive::ArchiveKind;
use crate::gate::Gate;
use crate::http::Http;
use crate::singleflight::SingleFlight;

const PAGE_SIZE: usize = 100;
const MAX_PAGES: u32 = 64;

#[derive(Debug, Clone, Deserialize)]
struct CdnEntry {
    /// Bundle file name, e.g. `zulu21.32.17-ca-jdk21.0.2-linux_x64.zip`.
    name: String,
}

pub struct ZuluSource {
    http: Http,
    layout: SourceLayout,
    base_url: String,
    /// Archive-name platform suffix, e.g. `linux_x64`.
    platform: String,
    gate: Gate,
    page_flight: SingleFlight<Vec<CdnEntry>>,
}

impl ZuluSource {
    pub fn new(
        http: Http,
        layout: SourceLayout,
        base_url: String,
        platform: String,
        max_streams: usize,
    ) -> Self {
        Self {
            http,
            layout,
            base_url: base_url.trim_end_matches('/').to_string(),
            platform,
            gate: Gate::new(max_streams),
            page_flight: SingleFlight::new(),
        }
    }

    /// Fetch one listing page through the stream gate.
    async fn fetch_page(&self, tool: &str, page: u32) -> SourceResult<Vec<CdnEntry>> {
        let url = format!(
            "{}/packages?tool={}&page={}&page_size={}",
            self.base_url, tool, page, PAGE_SIZE
        );
        let http = self.http.clone();
        let gate = self.gate.clone();
        self.page_flight
            .run(&format!("list-versions-{tool}-page-{page}"), move || {
                async move {
                    let _permit = gate.acquire().await;
                    http.get_json(&url).await
                }
            })
            .await
    }

    /// Parse a bundle name into a version; entries for other platforms or
    /// with unrecognized names are skipped.
    fn parse_entry(&self, name: &str) -> Option<ToolVersion> {
        let stem = name
            .strip_prefix("zulu")?
            .strip_suffix(&format!("-{}.zip", self.platform))?;
        // `21.32.17-ca-jdk21.0.2` — display version trails the bundle kind
        // marker (`jdk`, `jre`, ...).
        let marker_start = stem.rfind('-')?;
        let bundle = &stem[marker_start + 1..];
        let version_start = bundle.find(|c: char| c.is_ascii_digit())?;
        let kind = &bundle[..version_start];
        let version = &bundle[version_start..];

        let mut parsed = ToolVersion::new("azul", version).with_identifier(stem);
        if !kind.is_empty() {
            parsed = parsed.with_tag(kind);
        }
        Some(parsed)
    }
}

#[async_trait]
impl Source for ZuluSource {
    fn name(&self) -> &'static str {
        "zulu"
    }

    fn description(&self) -> &'static str {
        "Azul CDN zip bundles"
    }

    fn http(&self) -> &Http {
        &self.http
    }

    fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    fn archive_kind(&self, _version: &ToolVersion) -> ArchiveKind {
        ArchiveKind::Zip
    }

    fn download_url(&self, _tool: &str, version: &ToolVersion) -> String {
        format!(
            "{}/{}/zulu{}-{}.zip",
            self.base_url, self.platform, version.identifier, self.platform
        )
    }

    fn version_from_identifier(&self, _tool: &str, identifier: &str) -> ToolVersion {
        self.parse_entry(&format!("zulu{}-{}.zip", identifier, self.platform))
            .unwrap_or_else(|| ToolVersion::new("azul", identifier))
    }

    async fn list_tools(&self) -> SourceResult<Vec<Candidate>> {
        // The CDN hosts exactly one product line; no remote catalog exists.
        let mut metadata = HashMap::new();
        metadata.insert("default_vendor".to_string(), "azul".to_string());
        Ok(vec![Candidate {
            id: "java".to_string(),
            display_name: "Zulu OpenJDK".to_string(),
            description: "Azul Zulu builds of OpenJDK".to_string(),
            homepage_url: "https://www.azul.com/".to_string(),
            metadata,
        }])
    }

    async fn list_versions(&self, tool: &str) -> SourceResult<Vec<ToolVersion>> {
        if tool != "java" {
            return Ok(Vec::new());
        }

        let wave = self.gate.available().max(1) as u32;
        let mut versions = Vec::new();
        let mut page = 0u32;
        loop {
            let batch: Vec<u32> = (page..(page + wave).min(MAX_PAGES)).collect();
            if batch.is_empty() {
                return Err(SourceError::malformed(format!(
                    "pagination did not terminate after {MAX_PAGES} pages"
                )));
            }
            let pages = join_all(batch.iter().map(|n| self.fetch_page(tool, *n))).await;

            let mut exhausted = false;
            for fetched in pages {
                let entries = fetched?;
                let full = entries.len() == PAGE_SIZE;
                versions.extend(entries.iter().filter_map(|e| self.parse_entry(&e.name)));
                if !full {
                    exhausted = true;
                    break;
                }
            }
            if exhausted {
                return Ok(versions);
            }
            page += wave;
        }
    }
}
