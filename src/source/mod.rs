//! Distribution source abstraction layer.
//!
//! This module provides a unified interface over the heterogeneous backends
//! a tool can be fetched from. The `Source` trait defines the contract every
//! backend implements; the resolution registry aggregates across them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   Registry   │  ← priority-ordered fan-out
//! └──────┬───────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │  dyn Source  │  ← common contract
//! └──────┬───────┘
//!        │
//!   ┌────┼────────┬──────────┐
//!   ▼    ▼        ▼          ▼
//! central disco  zulu     catalog  ← implementations
//! ```
//!
//! # Adding a new source
//!
//! 1. Create a new module (e.g. `corretto.rs`)
//! 2. Implement the `Source` trait (the default `list_local`, `resolve`,
//!    `download`, `install` and `delete` bodies cover the shared disk
//!    layout; most adapters only write the listing calls)
//! 3. Register it, at its priority slot, in `Registry::from_config`

pub mod catalog;
pub mod central;
pub mod disco;
pub mod error;
pub mod zulu;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::archive::{self, Archive, ArchiveKind};
use crate::http::Http;
use crate::install::InstallError;
use crate::progress::ProgressListener;
use error::{SourceError, SourceResult};

/// A tool identity as advertised by one source.
///
/// `id` is unique within its source but not globally; the registry treats
/// `(source, id)` as the global key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub homepage_url: String,
    /// Open string map for source-specific hints (decorations, defaults).
    pub metadata: HashMap<String, String>,
}

impl Candidate {
    /// Minimal candidate carrying nothing but its identity; used when a
    /// source learns about a tool from its disk layout rather than its
    /// remote catalog.
    pub fn named(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            description: String::new(),
            homepage_url: String::new(),
            metadata: HashMap::new(),
            id,
        }
    }
}

/// One concrete, installable build of a candidate.
///
/// `identifier` is the source-specific handle: on its own it is sufficient
/// to re-derive both the download URL and the local install path within its
/// source. It frequently differs from the human `version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolVersion {
    pub vendor: String,
    pub version: String,
    pub distribution_tag: Option<String>,
    pub identifier: String,
}

impl ToolVersion {
    pub fn new(vendor: impl Into<String>, version: impl Into<String>) -> Self {
        let version = version.into();
        Self {
            vendor: vendor.into(),
            identifier: version.clone(),
            version,
            distribution_tag: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.distribution_tag = Some(tag.into());
        self
    }
}

/// Suffix marking a fully unpacked install; its presence is what
/// `resolve`/`list_local` treat as "installed".
const EXPLODED_SUFFIX: &str = "_exploded";

/// On-disk layout shared by every source: archives and exploded installs
/// under `<root>/<source>/<tool>/`.
#[derive(Debug, Clone)]
pub struct SourceLayout {
    root: PathBuf,
}

impl SourceLayout {
    pub fn new(root_dir: &Path, source_name: &str) -> Self {
        Self {
            root: root_dir.join(source_name),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tool_dir(&self, tool: &str) -> PathBuf {
        self.root.join(tool)
    }

    /// The fully-installed marker directory for one build.
    pub fn exploded_dir(&self, tool: &str, identifier: &str) -> PathBuf {
        self.tool_dir(tool)
            .join(format!("{identifier}{EXPLODED_SUFFIX}"))
    }

    /// Stable location of the downloaded archive backing an install.
    pub fn archive_path(&self, tool: &str, identifier: &str, kind: ArchiveKind) -> PathBuf {
        self.tool_dir(tool)
            .join(format!("{identifier}.{}", kind.extension()))
    }

    /// Scratch directory for one in-progress install; distinct from the
    /// final path so a crash never leaves a half-exploded marker dir.
    pub fn work_dir(&self, tool: &str, identifier: &str) -> PathBuf {
        self.tool_dir(tool).join(format!(".{identifier}.tmp"))
    }

    /// Enumerate installed builds by scanning for `*_exploded` directories.
    /// Purely local; never touches the network.
    pub fn scan_local(&self) -> SourceResult<Vec<(String, Vec<String>)>> {
        let mut found: Vec<(String, Vec<String>)> = Vec::new();
        if !self.root.exists() {
            return Ok(found);
        }
        let mut tools: Vec<_> = fs::read_dir(&self.root)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .collect();
        tools.sort_by_key(|e| e.file_name());

        for tool_entry in tools {
            let tool = tool_entry.file_name().to_string_lossy().to_string();
            if tool.starts_with('.') {
                continue;
            }
            let mut identifiers: Vec<String> = fs::read_dir(tool_entry.path())?
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .filter_map(|e| {
                    e.file_name()
                        .to_string_lossy()
                        .strip_suffix(EXPLODED_SUFFIX)
                        .map(str::to_string)
                })
                .collect();
            identifiers.sort();
            if !identifiers.is_empty() {
                found.push((tool, identifiers));
            }
        }
        Ok(found)
    }
}

/// Contract implemented by every distribution backend.
///
/// Listing calls are remote (and coalesced per adapter through the
/// single-flight table); `list_local` and `resolve` are pure disk lookups.
#[async_trait]
pub trait Source: Send + Sync {
    /// Stable identity, usable as a CLI override; matched case-insensitively
    /// by prefix.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    /// Shared HTTP capability this source talks through.
    fn http(&self) -> &Http;

    /// This source's slice of the install tree.
    fn layout(&self) -> &SourceLayout;

    /// Container format this source ships a given build in.
    fn archive_kind(&self, _version: &ToolVersion) -> ArchiveKind {
        ArchiveKind::TarGz
    }

    /// Re-derive the download URL from an identifier. Together with
    /// `version_from_identifier` this is what makes an identifier
    /// self-sufficient.
    fn download_url(&self, tool: &str, version: &ToolVersion) -> String;

    /// Reconstruct the version value for an identifier found on disk.
    fn version_from_identifier(&self, tool: &str, identifier: &str) -> ToolVersion;

    /// Static or near-static catalog of tools this source can serve.
    async fn list_tools(&self) -> SourceResult<Vec<Candidate>>;

    /// Remote version listing for one tool.
    async fn list_versions(&self, tool: &str) -> SourceResult<Vec<ToolVersion>>;

    /// Enumerate what is already installed on disk for this source.
    fn list_local(&self) -> SourceResult<Vec<(Candidate, Vec<ToolVersion>)>> {
        let mut result = Vec::new();
        for (tool, identifiers) in self.layout().scan_local()? {
            let versions = identifiers
                .iter()
                .map(|id| self.version_from_identifier(&tool, id))
                .collect();
            result.push((Candidate::named(tool), versions));
        }
        Ok(result)
    }

    /// Pure local lookup: the install path when this exact build is fully
    /// unpacked, `None` otherwise.
    fn resolve(&self, tool: &str, version: &ToolVersion) -> Option<PathBuf> {
        let path = self.layout().exploded_dir(tool, &version.identifier);
        path.is_dir().then_some(path)
    }

    /// Fetch the archive for one build into `target`.
    async fn download(
        &self,
        tool: &str,
        version: &ToolVersion,
        target: &Path,
        progress: &dyn ProgressListener,
    ) -> SourceResult<Archive> {
        let url = self.download_url(tool, version);
        self.http().download_to_file(&url, target, progress).await?;
        Ok(Archive {
            kind: self.archive_kind(version),
            location: target.to_path_buf(),
        })
    }

    /// Idempotent install: returns the existing exploded directory without
    /// touching the network, or downloads and unpacks it.
    async fn install(
        &self,
        tool: &str,
        version: &ToolVersion,
        progress: &dyn ProgressListener,
    ) -> Result<PathBuf, InstallError> {
        crate::install::ensure_installed(self, tool, version, progress).await
    }

    /// Remove the local install and its backing archive; no-op when absent.
    fn delete(&self, tool: &str, version: &ToolVersion) -> SourceResult<()> {
        let layout = self.layout();
        archive::delete(&layout.exploded_dir(tool, &version.identifier))?;
        archive::delete(&layout.archive_path(
            tool,
            &version.identifier,
            self.archive_kind(version),
        ))?;
        Ok(())
    }
}

/// Decorator around an administratively disabled source.
///
/// Listing operations answer with empty results so the registry can safely
/// aggregate across a mix of enabled and disabled sources; anything that
/// would touch the network to mutate local state fails with
/// `SourceError::Disabled`. Local lookups pass through, so already-installed
/// builds stay usable.
pub struct Disabled {
    inner: Arc<dyn Source>,
}

impl Disabled {
    pub fn wrap(inner: Arc<dyn Source>) -> Arc<dyn Source> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl Source for Disabled {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn description(&self) -> &'static str {
        self.inner.description()
    }

    fn http(&self) -> &Http {
        self.inner.http()
    }

    fn layout(&self) -> &SourceLayout {
        self.inner.layout()
    }

    fn archive_kind(&self, version: &ToolVersion) -> ArchiveKind {
        self.inner.archive_kind(version)
    }

    fn download_url(&self, tool: &str, version: &ToolVersion) -> String {
        self.inner.download_url(tool, version)
    }

    fn version_from_identifier(&self, tool: &str, identifier: &str) -> ToolVersion {
        self.inner.version_from_identifier(tool, identifier)
    }

    async fn list_tools(&self) -> SourceResult<Vec<Candidate>> {
        Ok(Vec::new())
    }

    async fn list_versions(&self, _tool: &str) -> SourceResult<Vec<ToolVersion>> {
        Ok(Vec::new())
    }

    fn list_local(&self) -> SourceResult<Vec<(Candidate, Vec<ToolVersion>)>> {
        self.inner.list_local()
    }

    fn resolve(&self, tool: &str, version: &ToolVersion) -> Option<PathBuf> {
        self.inner.resolve(tool, version)
    }

    async fn download(
        &self,
        _tool: &str,
        _version: &ToolVersion,
        _target: &Path,
        _progress: &dyn ProgressListener,
    ) -> SourceResult<Archive> {
        Err(SourceError::disabled(self.inner.name()))
    }

    async fn install(
        &self,
        _tool: &str,
        _version: &ToolVersion,
        _progress: &dyn ProgressListener,
    ) -> Result<PathBuf, InstallError> {
        Err(InstallError::Source(SourceError::disabled(self.inner.name())))
    }

    fn delete(&self, tool: &str, version: &ToolVersion) -> SourceResult<()> {
        self.inner.delete(tool, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_named() {
        let candidate = Candidate::named("java");
        assert_eq!(candidate.id, "java");
        assert_eq!(candidate.display_name, "java");
        assert!(candidate.metadata.is_empty());
    }

    #[test]
    fn test_tool_version_builders() {
        let version = ToolVersion::new("azul", "21.0.2")
            .with_identifier("21.32.17-ca-jdk21.0.2")
            .with_tag("ca");
        assert_eq!(version.version, "21.0.2");
        assert_eq!(version.identifier, "21.32.17-ca-jdk21.0.2");
        assert_eq!(version.distribution_tag.as_deref(), Some("ca"));
    }

    #[test]
    fn test_layout_paths() {
        let layout = SourceLayout::new(Path::new("/tmp/keg"), "zulu");
        assert_eq!(
            layout.exploded_dir("java", "21.32.17-ca-jdk21.0.2"),
            PathBuf::from("/tmp/keg/zulu/java/21.32.17-ca-jdk21.0.2_exploded")
        );
        assert_eq!(
            layout.archive_path("java", "id", ArchiveKind::Zip),
            PathBuf::from("/tmp/keg/zulu/java/id.zip")
        );
        assert_eq!(
            layout.work_dir("java", "id"),
            PathBuf::from("/tmp/keg/zulu/java/.id.tmp")
        );
    }

    #[test]
    fn test_scan_local_sees_only_exploded_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = SourceLayout::new(dir.path(), "central");
        fs::create_dir_all(layout.exploded_dir("maven", "3.9.6")).unwrap();
        fs::create_dir_all(layout.exploded_dir("maven", "3.9.9")).unwrap();
        fs::create_dir_all(layout.tool_dir("maven").join("3.9.7")).unwrap();
        fs::create_dir_all(layout.work_dir("maven", "4.0.0")).unwrap();
        fs::write(layout.tool_dir("maven").join("3.9.6.tar.gz"), b"x").unwrap();

        let local = layout.scan_local().unwrap();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].0, "maven");
        assert_eq!(local[0].1, vec!["3.9.6".to_string(), "3.9.9".to_string()]);
    }

    #[test]
    fn test_scan_local_missing_root_is_empty() {
        let layout = SourceLayout::new(Path::new("/no/such/root"), "zulu");
        assert!(layout.scan_local().unwrap().is_empty());
    }
}
