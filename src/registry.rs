//! Resolution registry: fan out a version query across every source, pick
//! the winner deterministically.
//!
//! Sources sit in a fixed priority list declared at construction. One
//! resolution call probes every candidate source concurrently — wall-clock
//! latency is bounded by the slowest necessary backend, not the sum — but
//! the result is always the match from the first source in priority order,
//! never whichever answered first. Reproducible selection matters more than
//! best-case latency here: two backends may ship differently built
//! distributions under the same display version, and "which one you get"
//! must not depend on network jitter.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::Result;
use crate::http::Http;
use crate::http_cache::{HttpCache, DEFAULT_TTL};
use crate::source::catalog::CatalogSource;
use crate::source::central::CentralSource;
use crate::source::disco::DiscoSource;
use crate::source::error::SourceResult;
use crate::source::zulu::ZuluSource;
use crate::source::{Candidate, Disabled, Source, SourceLayout, ToolVersion};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// No source, local or remote, matched the request. Carries a dump of
    /// everything every enabled source currently knows, for diagnostics.
    #[error("No match for {tool} {version}\n{diagnostic}")]
    NoMatch {
        tool: String,
        version: String,
        diagnostic: String,
    },
}

/// The result of a successful resolution: which source won, and what it
/// offered.
#[derive(Clone)]
pub struct MatchedVersion {
    pub source: Arc<dyn Source>,
    pub candidate: Candidate,
    pub version: ToolVersion,
}

impl fmt::Debug for MatchedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchedVersion")
            .field("source", &self.source.name())
            .field("candidate", &self.candidate.id)
            .field("version", &self.version)
            .finish()
    }
}

/// Per-resolution-session memo of source listings.
///
/// Scoped to one multi-tool resolution run (an RC file resolving a dozen
/// tools) and discarded afterwards; never persisted. Distinct from each
/// source's own on-disk caches. Concurrently populated, since several tools
/// in one session may probe the same source at once.
#[derive(Default)]
pub struct ResolutionCache {
    tools: DashMap<String, Arc<Vec<Candidate>>>,
    remote: DashMap<(String, String), Arc<Vec<ToolVersion>>>,
    local: DashMap<String, Arc<LocalListing>>,
}

type LocalListing = Vec<(Candidate, Vec<ToolVersion>)>;

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn tools_for(&self, source: &dyn Source) -> SourceResult<Arc<Vec<Candidate>>> {
        let key = source.name().to_string();
        if let Some(hit) = self.tools.get(&key) {
            return Ok(Arc::clone(&hit));
        }
        let listed = Arc::new(source.list_tools().await?);
        self.tools.insert(key, Arc::clone(&listed));
        Ok(listed)
    }

    async fn versions_for(
        &self,
        source: &dyn Source,
        tool: &str,
    ) -> SourceResult<Arc<Vec<ToolVersion>>> {
        let key = (source.name().to_string(), tool.to_string());
        if let Some(hit) = self.remote.get(&key) {
            return Ok(Arc::clone(&hit));
        }
        let listed = Arc::new(source.list_versions(tool).await?);
        self.remote.insert(key, Arc::clone(&listed));
        Ok(listed)
    }

    fn local_for(&self, source: &dyn Source) -> SourceResult<Arc<LocalListing>> {
        let key = source.name().to_string();
        if let Some(hit) = self.local.get(&key) {
            return Ok(Arc::clone(&hit));
        }
        let listed = Arc::new(source.list_local()?);
        self.local.insert(key, Arc::clone(&listed));
        Ok(listed)
    }
}

/// A single resolution request.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub tool: &'a str,
    pub version: &'a str,
    /// Restrict to sources whose name equals or starts with this hint.
    pub source_hint: Option<&'a str>,
    /// Also accept versions whose display value merely starts with the
    /// requested expression.
    pub relaxed: bool,
    /// Permit remote listings when nothing local matches.
    pub allow_remote: bool,
}

impl<'a> ResolveRequest<'a> {
    pub fn new(tool: &'a str, version: &'a str) -> Self {
        Self {
            tool,
            version,
            source_hint: None,
            relaxed: false,
            allow_remote: true,
        }
    }
}

/// Version matching rule: exact display version, exact identifier, or (when
/// relaxed) display-version prefix. No semantic range matching.
fn matches(expr: &str, version: &ToolVersion, relaxed: bool) -> bool {
    expr == version.version
        || expr == version.identifier
        || (relaxed && version.version.starts_with(expr))
}

pub struct Registry {
    /// Priority order: first entry wins ties.
    sources: Vec<Arc<dyn Source>>,
}

impl Registry {
    /// Build a registry over an explicit, already-prioritized source list.
    pub fn new(sources: Vec<Arc<dyn Source>>) -> Self {
        Self { sources }
    }

    /// Standard construction: artifact-repository sources first, then the
    /// release API, then the CDN, with the scraping-heavy catalog last.
    /// Administratively disabled sources are wrapped so they answer empty.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let http = Http::new(config.request_timeout(), config.auth_tokens.clone())?;
        let response_cache = Arc::new(HttpCache::new(config.response_cache_dir(), DEFAULT_TTL));
        let root = &config.root_dir;

        let ordered: Vec<Arc<dyn Source>> = vec![
            Arc::new(CentralSource::new(
                http.clone(),
                SourceLayout::new(root, "central"),
                config.central_url.clone(),
            )),
            Arc::new(DiscoSource::new(
                http.clone(),
                SourceLayout::new(root, "disco"),
                config.disco_url.clone(),
            )),
            Arc::new(ZuluSource::new(
                http.clone(),
                SourceLayout::new(root, "zulu"),
                config.zulu_url.clone(),
                config.zulu_platform.clone(),
                config.max_cdn_streams,
            )),
            Arc::new(CatalogSource::new(
                http,
                SourceLayout::new(root, "catalog"),
                config.catalog_url.clone(),
                response_cache,
            )),
        ];

        let sources = ordered
            .into_iter()
            .map(|source| {
                if config.is_disabled(source.name()) {
                    Disabled::wrap(source)
                } else {
                    source
                }
            })
            .collect();

        Ok(Self { sources })
    }

    pub fn sources(&self) -> &[Arc<dyn Source>] {
        &self.sources
    }

    /// Look a source up by exact name.
    pub fn source(&self, name: &str) -> Option<Arc<dyn Source>> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .map(Arc::clone)
    }

    /// Sources admitted by a hint: exact name match, or case-insensitive
    /// prefix of the name (`zu` admits `zulu`).
    pub fn admitted(&self, hint: Option<&str>) -> Vec<Arc<dyn Source>> {
        match hint {
            None => self.sources.clone(),
            Some(hint) => {
                let folded = hint.to_ascii_lowercase();
                self.sources
                    .iter()
                    .filter(|s| {
                        s.name() == hint || s.name().to_ascii_lowercase().starts_with(&folded)
                    })
                    .map(Arc::clone)
                    .collect()
            }
        }
    }

    /// Resolve a version expression to the highest-priority matching source.
    ///
    /// All admitted sources are probed concurrently; results are consumed
    /// strictly in priority order. Per-source failures are logged and count
    /// as "found nothing" so one misbehaving backend never blocks the rest.
    pub async fn resolve(
        &self,
        cache: &ResolutionCache,
        request: ResolveRequest<'_>,
    ) -> Option<MatchedVersion> {
        self.resolve_inner(cache, request).await.0
    }

    /// Strict variant: failing to match is an error carrying an enumeration
    /// of every tool/version every enabled source knows about. Building that
    /// diagnostic is deliberately expensive and happens only on this error
    /// path.
    pub async fn resolve_strict(
        &self,
        cache: &ResolutionCache,
        request: ResolveRequest<'_>,
    ) -> std::result::Result<MatchedVersion, ResolveError> {
        let (matched, failures) = self.resolve_inner(cache, request).await;
        match matched {
            Some(found) => Ok(found),
            None => Err(ResolveError::NoMatch {
                tool: request.tool.to_string(),
                version: request.version.to_string(),
                diagnostic: self.diagnostic_dump(cache, &failures).await,
            }),
        }
    }

    async fn resolve_inner(
        &self,
        cache: &ResolutionCache,
        request: ResolveRequest<'_>,
    ) -> (Option<MatchedVersion>, Vec<String>) {
        let admitted = self.admitted(request.source_hint);
        let probes = join_all(
            admitted
                .iter()
                .map(|source| probe(Arc::clone(source), cache, request)),
        )
        .await;

        let probed = admitted.len();
        let mut failures = Vec::new();
        let mut winner = None;
        // Probe results come back in the same order the sources were
        // launched, i.e. priority order; completion order is irrelevant.
        for (source, outcome) in admitted.into_iter().zip(probes) {
            match outcome {
                Ok(Some((candidate, version))) => {
                    if winner.is_none() {
                        debug!(
                            source = source.name(),
                            tool = request.tool,
                            identifier = %version.identifier,
                            "resolved"
                        );
                        winner = Some(MatchedVersion {
                            source,
                            candidate,
                            version,
                        });
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(source = source.name(), error = %e, "source failed during resolution");
                    failures.push(format!("{}: {}", source.name(), e));
                }
            }
        }
        // Individual source errors stay at warn level unless every admitted
        // source failed; only then do they belong in the caller-facing
        // diagnostic.
        if failures.len() < probed {
            failures.clear();
        }
        (winner, failures)
    }

    async fn diagnostic_dump(&self, cache: &ResolutionCache, failures: &[String]) -> String {
        let mut lines = Vec::new();
        for source in &self.sources {
            match cache.tools_for(source.as_ref()).await {
                Ok(tools) => {
                    for candidate in tools.iter() {
                        let versions = cache
                            .versions_for(source.as_ref(), &candidate.id)
                            .await
                            .map(|listed| {
                                listed
                                    .iter()
                                    .map(|v| v.version.clone())
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            })
                            .unwrap_or_else(|e| format!("<{e}>"));
                        lines.push(format!("  {}/{}: {}", source.name(), candidate.id, versions));
                    }
                }
                Err(e) => lines.push(format!("  {}: <{}>", source.name(), e)),
            }
            if let Ok(local) = cache.local_for(source.as_ref()) {
                for (candidate, versions) in local.iter() {
                    let listed = versions
                        .iter()
                        .map(|v| v.version.clone())
                        .collect::<Vec<_>>()
                        .join(", ");
                    lines.push(format!(
                        "  {}/{} (installed): {}",
                        source.name(),
                        candidate.id,
                        listed
                    ));
                }
            }
        }
        if !failures.is_empty() {
            lines.push("source failures:".to_string());
            for failure in failures {
                lines.push(format!("  {failure}"));
            }
        }
        if lines.is_empty() {
            "no enabled source knows any tool".to_string()
        } else {
            format!("known tools and versions:\n{}", lines.join("\n"))
        }
    }
}

/// Probe one source for a match: local installs first (no network), then —
/// only when allowed and the source's catalog claims the tool — the remote
/// listing.
async fn probe(
    source: Arc<dyn Source>,
    cache: &ResolutionCache,
    request: ResolveRequest<'_>,
) -> SourceResult<Option<(Candidate, ToolVersion)>> {
    let local = cache.local_for(source.as_ref())?;
    for (candidate, versions) in local.iter() {
        if candidate.id != request.tool {
            continue;
        }
        if let Some(found) = versions
            .iter()
            .find(|v| matches(request.version, v, request.relaxed))
        {
            return Ok(Some((candidate.clone(), found.clone())));
        }
    }

    if !request.allow_remote {
        return Ok(None);
    }

    let tools = cache.tools_for(source.as_ref()).await?;
    let Some(claimed) = tools.iter().find(|c| c.id == request.tool) else {
        return Ok(None);
    };

    let versions = cache.versions_for(source.as_ref(), request.tool).await?;
    Ok(versions
        .iter()
        .find(|v| matches(request.version, v, request.relaxed))
        .map(|found| (claimed.clone(), found.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveKind;
    use crate::source::error::SourceError;
    use crate::source::SourceLayout;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory source with configurable latency and call counters.
    struct FakeSource {
        name: &'static str,
        http: Http,
        layout: SourceLayout,
        versions: Vec<ToolVersion>,
        delay: Duration,
        remote_listings: AtomicUsize,
    }

    impl FakeSource {
        fn new(
            name: &'static str,
            root: &std::path::Path,
            versions: Vec<ToolVersion>,
            delay: Duration,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                http: Http::new(Duration::from_secs(5), HashMap::new()).unwrap(),
                layout: SourceLayout::new(root, name),
                versions,
                delay,
                remote_listings: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Source for FakeSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn http(&self) -> &Http {
            &self.http
        }

        fn layout(&self) -> &SourceLayout {
            &self.layout
        }

        fn archive_kind(&self, _version: &ToolVersion) -> ArchiveKind {
            ArchiveKind::TarGz
        }

        fn download_url(&self, tool: &str, version: &ToolVersion) -> String {
            format!("http://invalid.test/{}/{}", tool, version.identifier)
        }

        fn version_from_identifier(&self, _tool: &str, identifier: &str) -> ToolVersion {
            ToolVersion::new("fake", identifier)
        }

        async fn list_tools(&self) -> SourceResult<Vec<Candidate>> {
            Ok(vec![Candidate::named("java")])
        }

        async fn list_versions(&self, tool: &str) -> SourceResult<Vec<ToolVersion>> {
            self.remote_listings.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if tool == "java" {
                Ok(self.versions.clone())
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn version(v: &str) -> ToolVersion {
        ToolVersion::new("fake", v)
    }

    #[tokio::test]
    async fn test_priority_order_beats_completion_order() {
        let dir = tempfile::tempdir().unwrap();
        // B answers fastest, but A also matches: A must win.
        let a = FakeSource::new(
            "alpha",
            dir.path(),
            vec![version("1.0.0")],
            Duration::from_millis(80),
        );
        let b = FakeSource::new(
            "beta",
            dir.path(),
            vec![version("1.0.0")],
            Duration::ZERO,
        );
        let c = FakeSource::new(
            "gamma",
            dir.path(),
            vec![version("1.0.0")],
            Duration::from_millis(40),
        );
        let registry = Registry::new(vec![a.clone(), b.clone(), c.clone()]);

        let cache = ResolutionCache::new();
        let matched = registry
            .resolve(&cache, ResolveRequest::new("java", "1.0.0"))
            .await
            .unwrap();
        assert_eq!(matched.source.name(), "alpha");

        // Every admitted source was probed concurrently regardless.
        assert_eq!(a.remote_listings.load(Ordering::SeqCst), 1);
        assert_eq!(b.remote_listings.load(Ordering::SeqCst), 1);
        assert_eq!(c.remote_listings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_cache_prevents_repeat_listings() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new("alpha", dir.path(), vec![version("1.0.0")], Duration::ZERO);
        let registry = Registry::new(vec![source.clone()]);

        let cache = ResolutionCache::new();
        let request = ResolveRequest::new("java", "1.0.0");
        registry.resolve(&cache, request).await.unwrap();
        registry.resolve(&cache, request).await.unwrap();
        assert_eq!(source.remote_listings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_local_match_needs_no_network() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new("alpha", dir.path(), vec![version("2.0.0")], Duration::ZERO);
        std::fs::create_dir_all(source.layout.exploded_dir("java", "1.0.0")).unwrap();
        let registry = Registry::new(vec![source.clone()]);

        let cache = ResolutionCache::new();
        let matched = registry
            .resolve(&cache, ResolveRequest::new("java", "1.0.0"))
            .await
            .unwrap();
        assert_eq!(matched.version.identifier, "1.0.0");
        assert_eq!(source.remote_listings.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_allow_remote_false_stays_local() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource::new("alpha", dir.path(), vec![version("1.0.0")], Duration::ZERO);
        let registry = Registry::new(vec![source.clone()]);

        let cache = ResolutionCache::new();
        let request = ResolveRequest {
            allow_remote: false,
            ..ResolveRequest::new("java", "1.0.0")
        };
        assert!(registry.resolve(&cache, request).await.is_none());
        assert_eq!(source.remote_listings.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_relaxed_prefix_matching() {
        let dir = tempfile::tempdir().unwrap();
        let zulu_build = ToolVersion::new("azul", "21.0.2")
            .with_identifier("21.32.17-ca-jdk21.0.2");
        let source = FakeSource::new("zulu", dir.path(), vec![zulu_build], Duration::ZERO);
        let registry = Registry::new(vec![source]);

        let cache = ResolutionCache::new();
        let request = ResolveRequest {
            relaxed: true,
            ..ResolveRequest::new("java", "21.")
        };
        let matched = registry.resolve(&cache, request).await.unwrap();
        assert_eq!(matched.version.identifier, "21.32.17-ca-jdk21.0.2");

        // Identifier matching works without relaxed.
        let by_id = registry
            .resolve(
                &cache,
                ResolveRequest::new("java", "21.32.17-ca-jdk21.0.2"),
            )
            .await
            .unwrap();
        assert_eq!(by_id.version.version, "21.0.2");

        // No 22.* build anywhere: strict resolution fails with a dump.
        let strict = ResolveRequest {
            relaxed: true,
            ..ResolveRequest::new("java", "22")
        };
        let err = registry.resolve_strict(&cache, strict).await.unwrap_err();
        let ResolveError::NoMatch { diagnostic, .. } = err;
        assert!(diagnostic.contains("zulu/java"));
        assert!(diagnostic.contains("21.0.2"));
    }

    #[tokio::test]
    async fn test_source_hint_prefix_filter() {
        let dir = tempfile::tempdir().unwrap();
        let alpha = FakeSource::new("alpha", dir.path(), vec![version("1.0.0")], Duration::ZERO);
        let zulu = FakeSource::new("zulu", dir.path(), vec![version("1.0.0")], Duration::ZERO);
        let registry = Registry::new(vec![alpha.clone(), zulu.clone()]);

        let cache = ResolutionCache::new();
        let request = ResolveRequest {
            source_hint: Some("ZU"),
            ..ResolveRequest::new("java", "1.0.0")
        };
        let matched = registry.resolve(&cache, request).await.unwrap();
        assert_eq!(matched.source.name(), "zulu");
        assert_eq!(alpha.remote_listings.load(Ordering::SeqCst), 0);

        let none = ResolveRequest {
            source_hint: Some("nosuch"),
            ..ResolveRequest::new("java", "1.0.0")
        };
        assert!(registry.resolve(&cache, none).await.is_none());
    }

    #[tokio::test]
    async fn test_failing_source_does_not_block_others() {
        struct BrokenSource(Arc<FakeSource>);

        #[async_trait]
        impl Source for BrokenSource {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn http(&self) -> &Http {
                self.0.http()
            }
            fn layout(&self) -> &SourceLayout {
                self.0.layout()
            }
            fn download_url(&self, tool: &str, version: &ToolVersion) -> String {
                self.0.download_url(tool, version)
            }
            fn version_from_identifier(&self, tool: &str, identifier: &str) -> ToolVersion {
                self.0.version_from_identifier(tool, identifier)
            }
            async fn list_tools(&self) -> SourceResult<Vec<Candidate>> {
                Ok(vec![Candidate::named("java")])
            }
            async fn list_versions(&self, _tool: &str) -> SourceResult<Vec<ToolVersion>> {
                Err(SourceError::protocol(502, "bad gateway"))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let healthy = FakeSource::new("alpha", dir.path(), vec![version("1.0.0")], Duration::ZERO);
        let broken: Arc<dyn Source> = Arc::new(BrokenSource(healthy.clone()));
        // Broken source has higher priority, but its failure is soft.
        let registry = Registry::new(vec![broken, healthy]);

        let cache = ResolutionCache::new();
        let matched = registry
            .resolve(&cache, ResolveRequest::new("java", "1.0.0"))
            .await
            .unwrap();
        assert_eq!(matched.source.name(), "alpha");
    }

    #[tokio::test]
    async fn test_disabled_source_aggregates_safely() {
        let dir = tempfile::tempdir().unwrap();
        let gone = FakeSource::new("alpha", dir.path(), vec![version("1.0.0")], Duration::ZERO);
        let live = FakeSource::new("beta", dir.path(), vec![version("1.0.0")], Duration::ZERO);
        let registry = Registry::new(vec![Disabled::wrap(gone.clone()), live]);

        let cache = ResolutionCache::new();
        let matched = registry
            .resolve(&cache, ResolveRequest::new("java", "1.0.0"))
            .await
            .unwrap();
        assert_eq!(matched.source.name(), "beta");
        assert_eq!(gone.remote_listings.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_match_rule() {
        let build = ToolVersion::new("azul", "21.0.2").with_identifier("21.32.17-ca-jdk21.0.2");
        assert!(matches("21.0.2", &build, false));
        assert!(matches("21.32.17-ca-jdk21.0.2", &build, false));
        assert!(!matches("21.", &build, false));
        assert!(matches("21.", &build, true));
        assert!(!matches("22", &build, true));
    }
}
