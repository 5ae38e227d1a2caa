//! MetaCPAN API implementation

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::{DEFAULT_INDEX_URL, DEFAULT_MAX_RESULTS, FETCH_TIMEOUT_MS};
use crate::index::error::IndexError;
use crate::index::registry::ReleaseIndex;
use crate::index::types::{ModuleFileHit, ReleaseFile, ReleaseMetadata};

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    hits: SearchHits<T>,
}

#[derive(Debug, Deserialize)]
struct SearchHits<T> {
    hits: Vec<SearchHit<T>>,
}

#[derive(Debug, Deserialize)]
struct SearchHit<T> {
    #[serde(rename = "_source")]
    source: T,
}

#[derive(Debug, Deserialize)]
struct ModuleFileSource {
    release: String,
    author: String,
    distribution: String,
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    maturity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFileSource {
    path: String,
    #[serde(default)]
    stat: Option<FileStat>,
    #[serde(default)]
    module: Vec<ModuleEntry>,
}

#[derive(Debug, Deserialize)]
struct FileStat {
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct ModuleEntry {
    name: String,
    #[serde(default)]
    version: Option<Value>,
}

/// The index stores versions as strings or numbers depending on the release
fn version_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Release index backed by the MetaCPAN search API
pub struct MetaCpanIndex {
    client: reqwest::Client,
    base_url: String,
    max_results: usize,
}

impl MetaCpanIndex {
    /// Creates a new MetaCpanIndex with a custom base URL and result ceiling.
    /// A ceiling of zero is raised to one.
    pub fn new(base_url: &str, max_results: usize) -> Result<Self, IndexError> {
        let client = reqwest::Client::builder()
            .user_agent("dist-surveyor")
            .timeout(Duration::from_millis(FETCH_TIMEOUT_MS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_results: max_results.max(1),
        })
    }

    pub fn with_defaults() -> Result<Self, IndexError> {
        Self::new(DEFAULT_INDEX_URL, DEFAULT_MAX_RESULTS)
    }

    async fn search<T: DeserializeOwned>(
        &self,
        description: &str,
        body: Value,
    ) -> Result<Vec<T>, IndexError> {
        let url = format!("{}/v1/file/_search", self.base_url);
        debug!("Querying {} for {}", url, description);

        let response = self.client.post(&url).json(&body).send().await?;
        let response = check_status(response, &url).await?;

        let parsed: SearchResponse<T> = response.json().await.map_err(|e| {
            warn!("Failed to parse MetaCPAN search response: {}", e);
            IndexError::InvalidResponse(e.to_string())
        })?;

        let count = parsed.hits.hits.len();
        if count >= self.max_results {
            return Err(IndexError::CountExceeded {
                query: description.to_string(),
                count,
                limit: self.max_results,
            });
        }

        Ok(parsed.hits.hits.into_iter().map(|h| h.source).collect())
    }
}

async fn check_status(
    response: reqwest::Response,
    url: &str,
) -> Result<reqwest::Response, IndexError> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        return Err(IndexError::RateLimited { retry_after_secs });
    }

    if !status.is_success() {
        warn!("MetaCPAN returned status {}: {}", status, url);
        return Err(IndexError::InvalidResponse(format!(
            "Unexpected status: {}",
            status
        )));
    }

    Ok(response)
}

#[async_trait::async_trait]
impl ReleaseIndex for MetaCpanIndex {
    async fn files_by_module(
        &self,
        module: &str,
        versions: &[String],
        file_size: Option<u64>,
    ) -> Result<Vec<ModuleFileHit>, IndexError> {
        let mut filter = vec![
            json!({ "term": { "module.name": module } }),
            json!({ "terms": { "module.version": versions } }),
        ];
        if let Some(size) = file_size {
            filter.push(json!({ "term": { "stat.size": size } }));
        }

        let body = json!({
            "size": self.max_results,
            "query": { "bool": { "filter": filter } },
            "_source": [
                "release", "author", "distribution", "version",
                "date", "download_url", "maturity"
            ]
        });

        let description = format!("module {} {:?} size {:?}", module, versions, file_size);
        let sources: Vec<ModuleFileSource> = self.search(&description, body).await?;

        Ok(sources
            .into_iter()
            .map(|s| ModuleFileHit {
                release: s.release,
                author: s.author,
                distribution: s.distribution,
                version: version_text(s.version),
                date: s.date,
                download_url: s.download_url,
                maturity: s.maturity,
            })
            .collect())
    }

    async fn files_by_release(
        &self,
        author: &str,
        release: &str,
    ) -> Result<Vec<ReleaseFile>, IndexError> {
        let body = json!({
            "size": self.max_results,
            "query": { "bool": { "filter": [
                { "term": { "release": release } },
                { "term": { "author": author } },
                { "exists": { "field": "module.name" } }
            ] } },
            "_source": ["path", "stat.size", "module.name", "module.version"]
        });

        let description = format!("release {}/{}", author, release);
        let sources: Vec<ReleaseFileSource> = self.search(&description, body).await?;

        let files = sources
            .into_iter()
            .flat_map(|source| {
                let size = source.stat.map(|s| s.size).unwrap_or(0);
                let path = source.path;
                source.module.into_iter().map(move |m| ReleaseFile {
                    path: path.clone(),
                    module_name: m.name,
                    module_version: version_text(m.version),
                    file_size: size,
                })
            })
            .collect();

        Ok(files)
    }

    async fn release_metadata(
        &self,
        author: &str,
        release: &str,
    ) -> Result<ReleaseMetadata, IndexError> {
        let url = format!("{}/v1/release/{}/{}", self.base_url, author, release);

        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(IndexError::NotFound(format!("{}/{}", author, release)));
        }
        let response = check_status(response, &url).await?;

        let body: Value = response.json().await.map_err(|e| {
            warn!("Failed to parse MetaCPAN release response: {}", e);
            IndexError::InvalidResponse(e.to_string())
        })?;

        // Some API versions wrap the document in a "release" key
        match body {
            Value::Object(mut map) => match map.remove("release") {
                Some(Value::Object(inner)) => Ok(inner),
                Some(other) => {
                    map.insert("release".to_string(), other);
                    Ok(map)
                }
                None => Ok(map),
            },
            _ => Err(IndexError::InvalidResponse(format!(
                "Release document for {}/{} is not an object",
                author, release
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn files_by_module_filters_on_name_versions_and_size() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/v1/file/_search")
            .match_body(Matcher::PartialJson(json!({
                "query": { "bool": { "filter": [
                    { "term": { "module.name": "Foo::Bar" } },
                    { "terms": { "module.version": ["1.2", "v1.200.0", "1.200"] } },
                    { "term": { "stat.size": 500 } }
                ] } }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"hits": {"total": 1, "hits": [
                    {"_source": {
                        "release": "Foo-Baz-1.2",
                        "author": "ALICE",
                        "distribution": "Foo-Baz",
                        "version": 1.2,
                        "date": "2012-03-04T05:06:07",
                        "download_url": "https://cpan.metacpan.org/authors/id/A/AL/ALICE/Foo-Baz-1.2.tar.gz"
                    }}
                ]}}"#,
            )
            .create_async()
            .await;

        let index = MetaCpanIndex::new(&server.url(), 100).unwrap();
        let versions = vec!["1.2".to_string(), "v1.200.0".to_string(), "1.200".to_string()];
        let hits = index
            .files_by_module("Foo::Bar", &versions, Some(500))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            hits,
            vec![ModuleFileHit {
                release: "Foo-Baz-1.2".to_string(),
                author: "ALICE".to_string(),
                distribution: "Foo-Baz".to_string(),
                version: Some("1.2".to_string()),
                date: Some("2012-03-04T05:06:07".to_string()),
                download_url: Some(
                    "https://cpan.metacpan.org/authors/id/A/AL/ALICE/Foo-Baz-1.2.tar.gz"
                        .to_string()
                ),
                maturity: None,
            }]
        );
    }

    #[tokio::test]
    async fn files_by_module_fails_when_result_count_reaches_limit() {
        let mut server = Server::new_async().await;

        let hit = r#"{"_source": {"release": "Foo-1.0", "author": "A", "distribution": "Foo"}}"#;
        let body = format!(r#"{{"hits": {{"hits": [{}, {}]}}}}"#, hit, hit);

        let mock = server
            .mock("POST", "/v1/file/_search")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let index = MetaCpanIndex::new(&server.url(), 2).unwrap();
        let result = index
            .files_by_module("Foo", &["1.0".to_string()], None)
            .await;

        mock.assert_async().await;
        assert!(matches!(
            result,
            Err(IndexError::CountExceeded {
                count: 2,
                limit: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn zero_result_ceiling_still_answers_empty_searches() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/v1/file/_search")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"hits": {"hits": []}}"#)
            .create_async()
            .await;

        let index = MetaCpanIndex::new(&server.url(), 0).unwrap();
        let result = index
            .files_by_module("Foo", &["1.0".to_string()], None)
            .await;

        mock.assert_async().await;
        assert_eq!(result.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn files_by_module_reports_rate_limiting() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/v1/file/_search")
            .with_status(429)
            .with_header("retry-after", "30")
            .create_async()
            .await;

        let index = MetaCpanIndex::new(&server.url(), 100).unwrap();
        let result = index.files_by_module("Foo", &["1.0".to_string()], None).await;

        mock.assert_async().await;
        assert!(matches!(
            result,
            Err(IndexError::RateLimited {
                retry_after_secs: Some(30)
            })
        ));
    }

    #[tokio::test]
    async fn files_by_release_flattens_modules_per_file() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("POST", "/v1/file/_search")
            .match_body(Matcher::PartialJson(json!({
                "query": { "bool": { "filter": [
                    { "term": { "release": "Foo-Baz-1.2" } },
                    { "term": { "author": "ALICE" } },
                    { "exists": { "field": "module.name" } }
                ] } }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"hits": {"hits": [
                    {"_source": {
                        "path": "lib/Foo/Bar.pm",
                        "stat": {"size": 500},
                        "module": [
                            {"name": "Foo::Bar", "version": "1.2"},
                            {"name": "Foo::Bar::Helper"}
                        ]
                    }},
                    {"_source": {
                        "path": "lib/Foo/Qux.pm",
                        "stat": {"size": 300},
                        "module": [{"name": "Foo::Qux", "version": 1.2}]
                    }}
                ]}}"#,
            )
            .create_async()
            .await;

        let index = MetaCpanIndex::new(&server.url(), 100).unwrap();
        let files = index.files_by_release("ALICE", "Foo-Baz-1.2").await.unwrap();

        mock.assert_async().await;
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].module_name, "Foo::Bar");
        assert_eq!(files[0].file_size, 500);
        assert_eq!(files[1].module_name, "Foo::Bar::Helper");
        assert_eq!(files[1].module_version, None);
        assert_eq!(files[2].module_version, Some("1.2".to_string()));
        assert_eq!(files[2].path, "lib/Foo/Qux.pm");
    }

    #[tokio::test]
    async fn release_metadata_unwraps_release_document() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/v1/release/ALICE/Foo-Baz-1.2")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"release": {"name": "Foo-Baz-1.2", "author": "ALICE"}}"#)
            .create_async()
            .await;

        let index = MetaCpanIndex::new(&server.url(), 100).unwrap();
        let metadata = index.release_metadata("ALICE", "Foo-Baz-1.2").await.unwrap();

        mock.assert_async().await;
        assert_eq!(metadata.get("name"), Some(&json!("Foo-Baz-1.2")));
    }

    #[tokio::test]
    async fn release_metadata_returns_not_found_for_missing_release() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", "/v1/release/ALICE/Gone-1.0")
            .with_status(404)
            .create_async()
            .await;

        let index = MetaCpanIndex::new(&server.url(), 100).unwrap();
        let result = index.release_metadata("ALICE", "Gone-1.0").await;

        mock.assert_async().await;
        assert!(matches!(result, Err(IndexError::NotFound(_))));
    }
}
