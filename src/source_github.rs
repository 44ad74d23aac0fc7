//! Code-host source backed by the GitHub GraphQL API.
//!
//! One fetch issues the repository query (following the default branch's
//! commit history page by page until it is exhausted) and then downloads
//! the README from the raw content host, on the repository's default
//! branch when GitHub reports one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::GitHubSourceConfig;
use crate::error::{FetchError, ParseError};
use crate::markdown;
use crate::models::{FieldName, FieldValue, Lifespan, PageContents, RawResponse, Release};
use crate::traits::{dispatch, ParserTable, Source};

pub const NAME: &str = "github";

const REPOSITORY_QUERY: &str = include_str!("queries/repository.graphql");

const SUPPORTED_FIELDS: [FieldName; 5] = [
    FieldName::Name,
    FieldName::Description,
    FieldName::Lifespan,
    FieldName::LatestRelease,
    FieldName::PageContents,
];

static PARSERS: ParserTable<GitHubResponse> = &[
    (FieldName::Name, parse_name),
    (FieldName::Description, parse_description),
    (FieldName::Lifespan, parse_lifespan),
    (FieldName::LatestRelease, parse_latest_release),
    (FieldName::PageContents, parse_page_contents),
];

/// Per-project configuration: `{owner, repo, countLifespanAsStillOngoing?}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GitHubConfig {
    pub owner: String,
    #[serde(alias = "name")]
    pub repo: String,
    #[serde(default)]
    pub count_lifespan_as_still_ongoing: bool,
}

impl GitHubConfig {
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let config: Self = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
        if config.owner.trim().is_empty() || config.repo.trim().is_empty() {
            return Err("owner and repo must not be empty".to_string());
        }
        Ok(config)
    }
}

/// The decoded `repository` object plus the README, if one was found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubResponse {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_branch_ref: Option<BranchRef>,
    #[serde(default)]
    pub releases: Releases,
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub page_contents: Option<ReadmeContents>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub target: CommitTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitTarget {
    #[serde(default)]
    pub authored_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: History,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    #[serde(default)]
    pub nodes: Vec<CommitNode>,
    #[serde(default)]
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitNode {
    pub authored_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub end_cursor: Option<String>,
    #[serde(default)]
    pub has_next_page: bool,
}

impl PageInfo {
    fn next_cursor(&self) -> Option<String> {
        if self.has_next_page {
            self.end_cursor.clone()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Releases {
    #[serde(default)]
    pub nodes: Vec<ReleaseNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseNode {
    #[serde(default)]
    pub name: Option<String>,
    pub tag_name: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_prerelease: bool,
}

/// README text and the base URL its relative assets resolve against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadmeContents {
    pub readme: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
struct GraphQLRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryData {
    repository: Option<GitHubResponse>,
}

/// Where the source sends its requests.
#[derive(Debug, Clone)]
pub struct GitHubEndpoints {
    pub api_url: String,
    pub raw_url: String,
    /// README branch for repositories that do not report a default branch.
    pub branch: String,
    pub page_size: u32,
}

impl From<&GitHubSourceConfig> for GitHubEndpoints {
    fn from(config: &GitHubSourceConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            raw_url: config.raw_url.trim_end_matches('/').to_string(),
            branch: config.branch.clone(),
            page_size: config.history_page_size,
        }
    }
}

pub struct GitHubSource {
    client: Client,
    endpoints: GitHubEndpoints,
    token: Option<String>,
    query: String,
}

impl GitHubSource {
    pub fn new(client: Client, endpoints: GitHubEndpoints, token: Option<String>) -> Self {
        Self {
            client,
            endpoints,
            token,
            query: REPOSITORY_QUERY.to_string(),
        }
    }

    pub fn from_config(client: Client, config: &GitHubSourceConfig) -> anyhow::Result<Self> {
        let token = config.token();
        if token.is_none() {
            debug!(
                "{} is not set; GitHub requests will be unauthenticated",
                config.token_env
            );
        }
        Ok(Self::new(client, GitHubEndpoints::from(config), token))
    }

    /// Replace the bundled repository query.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    async fn query_repository(
        &self,
        id: &str,
        config: &GitHubConfig,
        cursor: Option<&str>,
    ) -> Result<GitHubResponse, FetchError> {
        let body = GraphQLRequest {
            query: &self.query,
            variables: serde_json::json!({
                "owner": config.owner,
                "name": config.repo,
                "cursor": cursor,
                "pageSize": self.endpoints.page_size,
            }),
        };

        let mut request = self.client.post(&self.endpoints.api_url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::request(id, NAME, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                id: id.to_string(),
                source_name: NAME.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| FetchError::request(id, NAME, e))?;
        let decoded: GraphQLResponse<RepositoryData> = serde_json::from_str(&text)
            .map_err(|e| FetchError::decode(id, NAME, format!("invalid GraphQL response: {}", e)))?;

        match decoded.data.and_then(|data| data.repository) {
            Some(repository) => Ok(repository),
            None => {
                let messages = decoded
                    .errors
                    .unwrap_or_default()
                    .into_iter()
                    .map(|error| error.message)
                    .collect::<Vec<_>>();
                let reason = if messages.is_empty() {
                    format!("repository {}/{} not found", config.owner, config.repo)
                } else {
                    messages.join("; ")
                };
                Err(FetchError::decode(id, NAME, reason))
            }
        }
    }

    async fn fetch_readme(
        &self,
        id: &str,
        config: &GitHubConfig,
        branch: Option<&str>,
    ) -> Result<Option<ReadmeContents>, FetchError> {
        let branch = branch
            .filter(|name| !name.is_empty())
            .unwrap_or(self.endpoints.branch.as_str());
        let base = format!(
            "{}/{}/{}/{}/",
            self.endpoints.raw_url, config.owner, config.repo, branch
        );
        let url = format!("{}README.md", base);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::request(id, NAME, e))?;
        if !response.status().is_success() {
            debug!("[{}] no README at {} (HTTP {})", id, url, response.status());
            return Ok(None);
        }

        let readme = response
            .text()
            .await
            .map_err(|e| FetchError::request(id, NAME, e))?;
        if readme.is_empty() {
            return Ok(None);
        }
        Ok(Some(ReadmeContents { readme, url: base }))
    }
}

#[async_trait]
impl Source for GitHubSource {
    fn name(&self) -> &str {
        NAME
    }

    fn fancy_name(&self) -> &str {
        "GitHub"
    }

    fn supported_fields(&self) -> &[FieldName] {
        &SUPPORTED_FIELDS
    }

    fn check_config(&self, config: &Value) -> Result<(), String> {
        GitHubConfig::from_value(config).map(|_| ())
    }

    async fn fetch(&self, id: &str, config: &Value) -> Result<RawResponse, FetchError> {
        let config =
            GitHubConfig::from_value(config).map_err(|reason| FetchError::config(id, NAME, reason))?;

        let mut repository = self.query_repository(id, &config, None).await?;

        if let Some(branch) = repository.default_branch_ref.as_mut() {
            let history = &mut branch.target.history;
            let mut cursor = history.page_info.next_cursor();
            let mut pages = 1;
            while let Some(after) = cursor {
                let page = self.query_repository(id, &config, Some(after.as_str())).await?;
                let next = page
                    .default_branch_ref
                    .ok_or_else(|| {
                        FetchError::decode(id, NAME, "default branch vanished while paging history")
                    })?
                    .target
                    .history;
                cursor = next.page_info.next_cursor();
                if cursor.as_deref() == Some(after.as_str()) {
                    return Err(FetchError::decode(
                        id,
                        NAME,
                        "history cursor did not advance",
                    ));
                }
                history.nodes.extend(next.nodes);
                history.page_info = next.page_info;
                pages += 1;
            }
            debug!(
                "[{}] read {} commit(s) over {} history page(s)",
                id,
                history.nodes.len(),
                pages
            );

            if config.count_lifespan_as_still_ongoing {
                branch.target.authored_date = None;
            }
        }

        let default_branch = repository
            .default_branch_ref
            .as_ref()
            .and_then(|branch| branch.name.clone());
        repository.page_contents = self
            .fetch_readme(id, &config, default_branch.as_deref())
            .await?;

        Ok(RawResponse::GitHub(repository))
    }

    fn parse(
        &self,
        field: FieldName,
        id: &str,
        response: &RawResponse,
    ) -> Result<FieldValue, ParseError> {
        match response {
            RawResponse::GitHub(response) => dispatch(PARSERS, NAME, field, id, response),
            _ => Err(ParseError::unexpected_response(id, field, NAME)),
        }
    }
}

fn parse_name(id: &str, response: &GitHubResponse) -> Result<FieldValue, ParseError> {
    response
        .page_contents
        .as_ref()
        .and_then(|contents| markdown::heading1(&contents.readme))
        .map(FieldValue::Name)
        .ok_or_else(|| {
            ParseError::failed(id, FieldName::Name, NAME, "README has no level-one heading")
        })
}

fn parse_description(id: &str, response: &GitHubResponse) -> Result<FieldValue, ParseError> {
    response
        .description
        .as_deref()
        .map(str::trim)
        .filter(|description| !description.is_empty())
        .map(|description| FieldValue::Description(description.to_string()))
        .ok_or_else(|| {
            ParseError::failed(id, FieldName::Description, NAME, "repository has no description")
        })
}

fn parse_lifespan(id: &str, response: &GitHubResponse) -> Result<FieldValue, ParseError> {
    let target = response
        .default_branch_ref
        .as_ref()
        .map(|branch| &branch.target)
        .ok_or_else(|| {
            ParseError::failed(id, FieldName::Lifespan, NAME, "repository has no default branch")
        })?;

    let begun = target
        .history
        .nodes
        .iter()
        .map(|node| node.authored_date)
        .min()
        .ok_or_else(|| {
            ParseError::failed(id, FieldName::Lifespan, NAME, "default branch has no commits")
        })?;

    Ok(FieldValue::Lifespan(Lifespan {
        begun,
        ended: target.authored_date,
    }))
}

fn parse_latest_release(id: &str, response: &GitHubResponse) -> Result<FieldValue, ParseError> {
    let fail = |reason: &str| ParseError::failed(id, FieldName::LatestRelease, NAME, reason);

    let release = response
        .releases
        .nodes
        .first()
        .ok_or_else(|| fail("repository has no releases"))?;
    let version = markdown::release_version(&release.tag_name)
        .or_else(|| release.name.as_deref().and_then(markdown::release_version))
        .ok_or_else(|| fail("release tag does not contain a version"))?;
    let timestamp = release
        .published_at
        .ok_or_else(|| fail("release has not been published"))?;

    Ok(FieldValue::LatestRelease(Release {
        version: version.to_string(),
        timestamp,
        is_prerelease: Some(release.is_prerelease),
    }))
}

fn parse_page_contents(id: &str, response: &GitHubResponse) -> Result<FieldValue, ParseError> {
    let contents = response.page_contents.as_ref().ok_or_else(|| {
        ParseError::failed(id, FieldName::PageContents, NAME, "repository has no README")
    })?;
    let base = Url::parse(&contents.url).ok();
    markdown::page_contents(&contents.readme, base.as_ref())
        .map(|text| FieldValue::PageContents(PageContents::Markdown(text)))
        .ok_or_else(|| {
            ParseError::failed(id, FieldName::PageContents, NAME, "README is empty after cleanup")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn source() -> GitHubSource {
        GitHubSource::new(
            Client::new(),
            GitHubEndpoints::from(&GitHubSourceConfig::default()),
            None,
        )
    }

    fn response() -> GitHubResponse {
        serde_json::from_value(json!({
            "description": "A tool",
            "defaultBranchRef": {
                "target": {
                    "authoredDate": "2023-06-01T10:00:00Z",
                    "history": {
                        "nodes": [
                            { "authoredDate": "2023-06-01T10:00:00Z" },
                            { "authoredDate": "2019-01-02T03:04:05Z" },
                            { "authoredDate": "2020-01-01T00:00:00Z" }
                        ],
                        "pageInfo": { "endCursor": null, "hasNextPage": false }
                    }
                }
            },
            "releases": {
                "nodes": [{
                    "name": "Second",
                    "tagName": "v2.3.1-beta",
                    "publishedAt": "2023-05-01T00:00:00Z",
                    "isPrerelease": true
                }]
            }
        }))
        .unwrap()
    }

    fn with_readme(readme: &str) -> RawResponse {
        let mut response = response();
        response.page_contents = Some(ReadmeContents {
            readme: readme.to_string(),
            url: "https://raw.githubusercontent.com/a/b/master/".to_string(),
        });
        RawResponse::GitHub(response)
    }

    #[test]
    fn test_parser_table_is_complete() {
        let fields: Vec<FieldName> = PARSERS.iter().map(|(field, _)| *field).collect();
        assert_eq!(fields, SUPPORTED_FIELDS.to_vec());
    }

    #[test]
    fn test_config_accepts_name_alias() {
        let config = GitHubConfig::from_value(&json!({ "owner": "a", "name": "b" })).unwrap();
        assert_eq!(config.repo, "b");
        assert!(!config.count_lifespan_as_still_ongoing);

        assert!(GitHubConfig::from_value(&json!({ "owner": "a" })).is_err());
        assert!(GitHubConfig::from_value(&json!({ "owner": "a", "repo": "b", "x": 1 })).is_err());
    }

    #[test]
    fn test_parse_name_from_readme_heading() {
        let source = source();
        let value = source
            .parse(FieldName::Name, "p", &with_readme("# MyProject\n\nText"))
            .unwrap();
        assert_eq!(value, FieldValue::Name("MyProject".into()));

        let err = source
            .parse(FieldName::Name, "p", &with_readme("No heading here"))
            .unwrap_err();
        assert!(matches!(err, ParseError::FailedAcquisition { field: FieldName::Name, .. }));
    }

    #[test]
    fn test_parse_lifespan_uses_earliest_commit() {
        let value = source()
            .parse(FieldName::Lifespan, "p", &RawResponse::GitHub(response()))
            .unwrap();
        assert_eq!(
            value,
            FieldValue::Lifespan(Lifespan {
                begun: Utc.with_ymd_and_hms(2019, 1, 2, 3, 4, 5).unwrap(),
                ended: Some(Utc.with_ymd_and_hms(2023, 6, 1, 10, 0, 0).unwrap()),
            })
        );
    }

    #[test]
    fn test_parse_latest_release_keeps_prerelease_flag() {
        let value = source()
            .parse(FieldName::LatestRelease, "p", &RawResponse::GitHub(response()))
            .unwrap();
        assert_eq!(
            value,
            FieldValue::LatestRelease(Release {
                version: "2.3.1".into(),
                timestamp: Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap(),
                is_prerelease: Some(true),
            })
        );
    }

    #[test]
    fn test_parse_page_contents() {
        let value = source()
            .parse(
                FieldName::PageContents,
                "p",
                &with_readme("# Tool\n\nLine<br>\n![logo](img/logo.png)"),
            )
            .unwrap();
        assert_eq!(
            value,
            FieldValue::PageContents(PageContents::Markdown(
                "Line<br />\n![logo](https://raw.githubusercontent.com/a/b/master/img/logo.png)"
                    .into()
            ))
        );

        assert!(source()
            .parse(FieldName::PageContents, "p", &with_readme("# Tool\n"))
            .is_err());
    }

    #[test]
    fn test_parse_unsupported_and_foreign_response() {
        let source = source();
        assert!(matches!(
            source.parse(FieldName::Downloads, "p", &RawResponse::GitHub(response())),
            Err(ParseError::UnsupportedField { .. })
        ));
        assert!(matches!(
            source.parse(FieldName::Name, "p", &RawResponse::Json(json!({}))),
            Err(ParseError::UnexpectedResponse { .. })
        ));
    }

    #[test]
    fn test_empty_description_fails() {
        let mut response = response();
        response.description = Some("   ".into());
        assert!(source()
            .parse(FieldName::Description, "p", &RawResponse::GitHub(response))
            .is_err());
    }
}
