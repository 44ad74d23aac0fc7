//! Package-registry source backed by the npm registry document API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

use crate::config::NpmSourceConfig;
use crate::error::{FetchError, ParseError};
use crate::markdown;
use crate::models::{FieldName, FieldValue, PageContents, RawResponse, Release};
use crate::traits::{dispatch, ParserTable, Source};

pub const NAME: &str = "npm";

const SUPPORTED_FIELDS: [FieldName; 4] = [
    FieldName::Name,
    FieldName::Description,
    FieldName::LatestRelease,
    FieldName::PageContents,
];

static PARSERS: ParserTable<NpmResponse> = &[
    (FieldName::Name, parse_name),
    (FieldName::Description, parse_description),
    (FieldName::LatestRelease, parse_latest_release),
    (FieldName::PageContents, parse_page_contents),
];

/// Per-project configuration: `{packageName}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NpmConfig {
    #[serde(alias = "name")]
    pub package_name: String,
}

impl NpmConfig {
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let config: Self = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
        if config.package_name.trim().is_empty() {
            return Err("packageName must not be empty".to_string());
        }
        Ok(config)
    }
}

/// The subset of the registry's package document this source reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpmResponse {
    pub name: String,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: DistTags,
    #[serde(default)]
    pub time: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistTags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
}

pub struct NpmSource {
    client: Client,
    registry_url: Url,
}

impl NpmSource {
    pub fn new(client: Client, registry_url: Url) -> Self {
        Self {
            client,
            registry_url,
        }
    }

    pub fn from_config(client: Client, config: &NpmSourceConfig) -> anyhow::Result<Self> {
        Ok(Self::new(client, Url::parse(&config.registry_url)?))
    }

    /// Registry document URL for a package; `@scope/name` keeps its slash encoded.
    pub fn package_url(&self, package_name: &str) -> Option<Url> {
        let mut url = self.registry_url.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .push(package_name);
        Some(url)
    }
}

#[async_trait]
impl Source for NpmSource {
    fn name(&self) -> &str {
        NAME
    }

    fn fancy_name(&self) -> &str {
        "npm"
    }

    fn supported_fields(&self) -> &[FieldName] {
        &SUPPORTED_FIELDS
    }

    fn check_config(&self, config: &Value) -> Result<(), String> {
        NpmConfig::from_value(config).map(|_| ())
    }

    async fn fetch(&self, id: &str, config: &Value) -> Result<RawResponse, FetchError> {
        let config =
            NpmConfig::from_value(config).map_err(|reason| FetchError::config(id, NAME, reason))?;
        let url = self.package_url(&config.package_name).ok_or_else(|| {
            FetchError::config(id, NAME, "registry URL cannot carry a package path")
        })?;

        let response = self
            .client
            .get(url)
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
        let document: NpmResponse = serde_json::from_str(&text).map_err(|e| {
            FetchError::decode(id, NAME, format!("not a package document: {}", e))
        })?;

        Ok(RawResponse::Npm(document))
    }

    fn parse(
        &self,
        field: FieldName,
        id: &str,
        response: &RawResponse,
    ) -> Result<FieldValue, ParseError> {
        match response {
            RawResponse::Npm(response) => dispatch(PARSERS, NAME, field, id, response),
            _ => Err(ParseError::unexpected_response(id, field, NAME)),
        }
    }
}

fn parse_name(id: &str, response: &NpmResponse) -> Result<FieldValue, ParseError> {
    response
        .readme
        .as_deref()
        .and_then(markdown::heading1)
        .map(FieldValue::Name)
        .ok_or_else(|| {
            ParseError::failed(id, FieldName::Name, NAME, "readme has no level-one heading")
        })
}

fn parse_description(id: &str, response: &NpmResponse) -> Result<FieldValue, ParseError> {
    response
        .description
        .as_deref()
        .map(str::trim)
        .filter(|description| !description.is_empty())
        .map(|description| FieldValue::Description(description.to_string()))
        .ok_or_else(|| {
            ParseError::failed(id, FieldName::Description, NAME, "package has no description")
        })
}

fn parse_latest_release(id: &str, response: &NpmResponse) -> Result<FieldValue, ParseError> {
    let fail = |reason: &str| ParseError::failed(id, FieldName::LatestRelease, NAME, reason);

    let latest = response
        .dist_tags
        .latest
        .as_deref()
        .ok_or_else(|| fail("package has no latest dist-tag"))?;
    let version =
        markdown::release_version(latest).ok_or_else(|| fail("latest tag is not a version"))?;
    let timestamp = response
        .time
        .get(latest)
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|time| time.with_timezone(&Utc))
        .ok_or_else(|| fail("latest version has no publish time"))?;

    Ok(FieldValue::LatestRelease(Release {
        version: version.to_string(),
        timestamp,
        is_prerelease: None,
    }))
}

fn parse_page_contents(id: &str, response: &NpmResponse) -> Result<FieldValue, ParseError> {
    response
        .readme
        .as_deref()
        .and_then(|readme| markdown::page_contents(readme, None))
        .map(|text| FieldValue::PageContents(PageContents::Markdown(text)))
        .ok_or_else(|| {
            ParseError::failed(id, FieldName::PageContents, NAME, "readme is empty after cleanup")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn source() -> NpmSource {
        NpmSource::new(
            Client::new(),
            Url::parse("https://registry.npmjs.com").unwrap(),
        )
    }

    fn response() -> RawResponse {
        RawResponse::Npm(
            serde_json::from_value(json!({
                "name": "widget",
                "dist-tags": { "latest": "v2.3.1-beta" },
                "time": {
                    "created": "2020-01-01T00:00:00.000Z",
                    "v2.3.1-beta": "2023-04-05T06:07:08.000Z"
                },
                "description": "Widgets for all",
                "readme": "# Widget\n\nUse it<br/>"
            }))
            .unwrap(),
        )
    }

    #[test]
    fn test_parser_table_is_complete() {
        let fields: Vec<FieldName> = PARSERS.iter().map(|(field, _)| *field).collect();
        assert_eq!(fields, SUPPORTED_FIELDS.to_vec());
        assert!(!source().supports_field(FieldName::Lifespan));
    }

    #[test]
    fn test_package_url_encodes_scope() {
        let source = source();
        assert_eq!(
            source.package_url("@acme/widget").unwrap().as_str(),
            "https://registry.npmjs.com/@acme%2Fwidget"
        );
        assert_eq!(
            source.package_url("widget").unwrap().as_str(),
            "https://registry.npmjs.com/widget"
        );
    }

    #[test]
    fn test_config_aliases() {
        assert_eq!(
            NpmConfig::from_value(&json!({ "name": "widget" }))
                .unwrap()
                .package_name,
            "widget"
        );
        assert!(NpmConfig::from_value(&json!({ "packageName": "" })).is_err());
    }

    #[test]
    fn test_latest_release_without_prerelease_flag() {
        let value = source()
            .parse(FieldName::LatestRelease, "w", &response())
            .unwrap();
        assert_eq!(
            value,
            FieldValue::LatestRelease(Release {
                version: "2.3.1".into(),
                timestamp: Utc.with_ymd_and_hms(2023, 4, 5, 6, 7, 8).unwrap(),
                is_prerelease: None,
            })
        );
    }

    #[test]
    fn test_name_description_and_page_contents() {
        let source = source();
        let response = response();
        assert_eq!(
            source.parse(FieldName::Name, "w", &response).unwrap(),
            FieldValue::Name("Widget".into())
        );
        assert_eq!(
            source.parse(FieldName::Description, "w", &response).unwrap(),
            FieldValue::Description("Widgets for all".into())
        );
        assert_eq!(
            source.parse(FieldName::PageContents, "w", &response).unwrap(),
            FieldValue::PageContents(PageContents::Markdown("Use it<br />".into()))
        );
    }

    #[test]
    fn test_lifespan_is_unsupported() {
        assert!(matches!(
            source().parse(FieldName::Lifespan, "w", &response()),
            Err(ParseError::UnsupportedField { .. })
        ));
    }
}
