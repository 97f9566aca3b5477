//! Artifact-repository source.
//!
//! Serves build tools published to a Maven-layout repository. The tool
//! catalog is a static table (repository coordinates do not change); version
//! listings come from each artifact's `maven-metadata.xml`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::error::{SourceError, SourceResult};
use super::{Candidate, Source, SourceLayout, ToolVersion};
use crate::http::Http;
use crate::singleflight::SingleFlight;

/// Repository coordinates for one tool this source can serve.
#[derive(Debug, Clone)]
pub struct RepoTool {
    /// Group/artifact path below the repository root, e.g.
    /// `org/apache/maven/apache-maven`.
    pub path: String,
    /// Artifact id used in the archive file name.
    pub artifact: String,
    pub vendor: String,
    pub display_name: String,
    pub description: String,
    pub homepage_url: String,
}

#[derive(Debug, Deserialize)]
struct MavenMetadata {
    versioning: MavenVersioning,
}

#[derive(Debug, Deserialize)]
struct MavenVersioning {
    versions: MavenVersions,
}

#[derive(Debug, Deserialize)]
struct MavenVersions {
    #[serde(rename = "version", default)]
    version: Vec<String>,
}

pub struct CentralSource {
    http: Http,
    layout: SourceLayout,
    base_url: String,
    tools: HashMap<String, RepoTool>,
    versions_flight: SingleFlight<Vec<ToolVersion>>,
}

impl CentralSource {
    pub fn new(http: Http, layout: SourceLayout, base_url: String) -> Self {
        Self {
            http,
            layout,
            base_url: base_url.trim_end_matches('/').to_string(),
            tools: default_tools(),
            versions_flight: SingleFlight::new(),
        }
    }

    /// Replace the built-in tool table (tests, custom repositories).
    pub fn with_tools(mut self, tools: HashMap<String, RepoTool>) -> Self {
        self.tools = tools;
        self
    }

    fn metadata_url(&self, tool: &RepoTool) -> String {
        format!("{}/{}/maven-metadata.xml", self.base_url, tool.path)
    }
}

/// Tools served out of the default artifact repository.
fn default_tools() -> HashMap<String, RepoTool> {
    let mut tools = HashMap::new();
    tools.insert(
        "maven".to_string(),
        RepoTool {
            path: "org/apache/maven/apache-maven".to_string(),
            artifact: "apache-maven".to_string(),
            vendor: "apache".to_string(),
            display_name: "Apache Maven".to_string(),
            description: "Java project management and comprehension tool".to_string(),
            homepage_url: "https://maven.apache.org/".to_string(),
        },
    );
    tools.insert(
        "ant".to_string(),
        RepoTool {
            path: "org/apache/ant/apache-ant".to_string(),
            artifact: "apache-ant".to_string(),
            vendor: "apache".to_string(),
            display_name: "Apache Ant".to_string(),
            description: "Java-based build tool".to_string(),
            homepage_url: "https://ant.apache.org/".to_string(),
        },
    );
    tools
}

#[async_trait]
impl Source for CentralSource {
    fn name(&self) -> &'static str {
        "central"
    }

    fn description(&self) -> &'static str {
        "Maven-layout artifact repository"
    }

    fn http(&self) -> &Http {
        &self.http
    }

    fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    fn download_url(&self, tool: &str, version: &ToolVersion) -> String {
        // Identifier equals the repository version for this source, which
        // keeps it self-sufficient for URL derivation.
        let (path, artifact) = self
            .tools
            .get(tool)
            .map(|t| (t.path.as_str(), t.artifact.as_str()))
            .unwrap_or((tool, tool));
        format!(
            "{}/{}/{}/{}-{}-bin.tar.gz",
            self.base_url, path, version.identifier, artifact, version.identifier
        )
    }

    fn version_from_identifier(&self, tool: &str, identifier: &str) -> ToolVersion {
        let vendor = self
            .tools
            .get(tool)
            .map(|t| t.vendor.clone())
            .unwrap_or_default();
        ToolVersion::new(vendor, identifier)
    }

    async fn list_tools(&self) -> SourceResult<Vec<Candidate>> {
        let mut candidates: Vec<Candidate> = self
            .tools
            .iter()
            .map(|(id, tool)| Candidate {
                id: id.clone(),
                display_name: tool.display_name.clone(),
                description: tool.description.clone(),
                homepage_url: tool.homepage_url.clone(),
                metadata: HashMap::new(),
            })
            .collect();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(candidates)
    }

    async fn list_versions(&self, tool: &str) -> SourceResult<Vec<ToolVersion>> {
        let Some(repo_tool) = self.tools.get(tool) else {
            return Ok(Vec::new());
        };
        let url = self.metadata_url(repo_tool);
        let vendor = repo_tool.vendor.clone();
        let http = self.http.clone();

        self.versions_flight
            .run(&format!("list-versions-{tool}"), move || async move {
                let xml = http.get_text(&url).await?;
                let metadata: MavenMetadata = quick_xml::de::from_str(&xml)
                    .map_err(|e| SourceError::malformed(format!("metadata XML: {e}")))?;
                Ok(metadata
                    .versioning
                    .versions
                    .version
                    .into_iter()
                    .map(|v| ToolVersion::new(vendor.clone(), v))
                    .collect())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const METADATA_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>org.apache.maven</groupId>
  <artifactId>apache-maven</artifactId>
  <versioning>
    <latest>4.0.0</latest>
    <release>3.9.9</release>
    <versions>
      <version>3.9.6</version>
      <version>3.9.9</version>
      <version>4.0.0</version>
    </versions>
  </versioning>
</metadata>"#;

    fn source(server: &MockServer, root: &std::path::Path) -> CentralSource {
        let http = Http::new(Duration::from_secs(5), HashMap::new()).unwrap();
        CentralSource::new(http, SourceLayout::new(root, "central"), server.uri())
    }

    #[tokio::test]
    async fn test_list_versions_parses_metadata_xml() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/org/apache/maven/apache-maven/maven-metadata.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(METADATA_XML))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let versions = source(&server, dir.path())
            .list_versions("maven")
            .await
            .unwrap();
        let listed: Vec<_> = versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(listed, vec!["3.9.6", "3.9.9", "4.0.0"]);
        assert!(versions.iter().all(|v| v.vendor == "apache"));
        assert!(versions.iter().all(|v| v.identifier == v.version));
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_nothing() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let versions = source(&server, dir.path())
            .list_versions("cobol")
            .await
            .unwrap();
        assert!(versions.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_metadata_is_protocol_level_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/org/apache/maven/apache-maven/maven-metadata.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = source(&server, dir.path())
            .list_versions("maven")
            .await
            .unwrap_err();
        assert!(err.is_soft());
    }

    #[tokio::test]
    async fn test_concurrent_listings_share_one_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/org/apache/maven/apache-maven/maven-metadata.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(METADATA_XML)
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(source(&server, dir.path()));
        let mut handles = Vec::new();
        for _ in 0..6 {
            let source = Arc::clone(&source);
            handles.push(tokio::spawn(
                async move { source.list_versions("maven").await },
            ));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), 3);
        }
    }

    #[test]
    fn test_download_url_from_identifier_alone() {
        let server_url = "https://repo.example.com/maven2";
        let http = Http::new(Duration::from_secs(5), HashMap::new()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let source = CentralSource::new(
            http,
            SourceLayout::new(dir.path(), "central"),
            server_url.to_string(),
        );
        let version = source.version_from_identifier("maven", "3.9.9");
        assert_eq!(
            source.download_url("maven", &version),
            "https://repo.example.com/maven2/org/apache/maven/apache-maven/3.9.9/apache-maven-3.9.9-bin.tar.gz"
        );
    }
}
