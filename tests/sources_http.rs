use project_populate::error::FetchError;
use project_populate::models::{FieldName, FieldValue, Lifespan, RawResponse, Release};
use project_populate::source_github::{GitHubEndpoints, GitHubSource};
use project_populate::source_npm::NpmSource;
use project_populate::traits::Source;

use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn github(server: &MockServer) -> GitHubSource {
    GitHubSource::new(
        Client::new(),
        GitHubEndpoints {
            api_url: format!("{}/graphql", server.uri()),
            raw_url: server.uri(),
            branch: "master".to_string(),
            page_size: 2,
        },
        Some("secret".to_string()),
    )
}

fn npm(server: &MockServer) -> NpmSource {
    NpmSource::new(Client::new(), Url::parse(&server.uri()).unwrap())
}

fn repository_page(cursor: Option<&str>, dates: &[&str]) -> serde_json::Value {
    json!({
        "data": {
            "repository": {
                "description": "A tool for testing",
                "defaultBranchRef": {
                    "target": {
                        "authoredDate": "2024-03-01T00:00:00Z",
                        "history": {
                            "nodes": dates
                                .iter()
                                .map(|d| json!({ "authoredDate": d }))
                                .collect::<Vec<_>>(),
                            "pageInfo": {
                                "endCursor": cursor,
                                "hasNextPage": cursor.is_some()
                            }
                        }
                    }
                },
                "releases": {
                    "nodes": [{
                        "name": "Version 1.4.0",
                        "tagName": "v1.4.0",
                        "publishedAt": "2024-02-01T00:00:00Z",
                        "isPrerelease": false
                    }]
                }
            }
        }
    })
}

async fn mount_repository(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(json!({ "variables": { "cursor": null, "pageSize": 2 } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(repository_page(
            Some("page-2"),
            &["2024-03-01T00:00:00Z", "2023-01-01T00:00:00Z"],
        )))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({ "variables": { "cursor": "page-2" } })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(repository_page(None, &["2018-05-06T07:08:09Z"])),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_github_fetch_paginates_and_reads_readme() {
    let server = MockServer::start().await;
    mount_repository(&server).await;
    Mock::given(method("GET"))
        .and(path("/acme/tool/master/README.md"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("# Tool\n\nSee ![diagram](docs/diagram.png)<br>"),
        )
        .mount(&server)
        .await;

    let source = github(&server);
    let response = source
        .fetch("tool", &json!({ "owner": "acme", "repo": "tool" }))
        .await
        .unwrap();

    let RawResponse::GitHub(repository) = &response else {
        panic!("expected a GitHub response");
    };
    let history = &repository.default_branch_ref.as_ref().unwrap().target.history;
    assert_eq!(history.nodes.len(), 3);
    assert!(!history.page_info.has_next_page);

    assert_eq!(
        source.parse(FieldName::Name, "tool", &response).unwrap(),
        FieldValue::Name("Tool".into())
    );
    assert_eq!(
        source.parse(FieldName::Lifespan, "tool", &response).unwrap(),
        FieldValue::Lifespan(Lifespan {
            begun: Utc.with_ymd_and_hms(2018, 5, 6, 7, 8, 9).unwrap(),
            ended: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
        })
    );
    assert_eq!(
        source.parse(FieldName::LatestRelease, "tool", &response).unwrap(),
        FieldValue::LatestRelease(Release {
            version: "1.4.0".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            is_prerelease: Some(false),
        })
    );

    let FieldValue::PageContents(contents) = source
        .parse(FieldName::PageContents, "tool", &response)
        .unwrap()
    else {
        panic!("expected page contents");
    };
    let contents = serde_json::to_value(contents).unwrap();
    let text = contents.as_str().unwrap();
    assert!(text.contains(&format!("{}/acme/tool/master/docs/diagram.png", server.uri())));
    assert!(text.ends_with("<br />"));
    assert!(!text.contains("# Tool"));
}

#[tokio::test]
async fn test_github_still_ongoing_clears_end() {
    let server = MockServer::start().await;
    mount_repository(&server).await;
    Mock::given(method("GET"))
        .and(path("/acme/tool/master/README.md"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = github(&server);
    let response = source
        .fetch(
            "tool",
            &json!({ "owner": "acme", "name": "tool", "countLifespanAsStillOngoing": true }),
        )
        .await
        .unwrap();

    let FieldValue::Lifespan(lifespan) =
        source.parse(FieldName::Lifespan, "tool", &response).unwrap()
    else {
        panic!("expected a lifespan");
    };
    assert_eq!(lifespan.ended, None);

    // no README: name and page contents are unavailable, description is not
    assert!(source.parse(FieldName::Name, "tool", &response).is_err());
    assert!(source.parse(FieldName::PageContents, "tool", &response).is_err());
    assert_eq!(
        source.parse(FieldName::Description, "tool", &response).unwrap(),
        FieldValue::Description("A tool for testing".into())
    );
}

#[tokio::test]
async fn test_github_readme_follows_default_branch() {
    let server = MockServer::start().await;
    let mut page = repository_page(None, &["2022-02-02T00:00:00Z"]);
    page["data"]["repository"]["defaultBranchRef"]["name"] = json!("main");
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/acme/tool/main/README.md"))
        .respond_with(ResponseTemplate::new(200).set_body_string("# On Main\n\nBody"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/acme/tool/master/README.md"))
        .respond_with(ResponseTemplate::new(404))
        .expect(0)
        .mount(&server)
        .await;

    let source = github(&server);
    let response = source
        .fetch("tool", &json!({ "owner": "acme", "repo": "tool" }))
        .await
        .unwrap();

    assert_eq!(
        source.parse(FieldName::Name, "tool", &response).unwrap(),
        FieldValue::Name("On Main".into())
    );
}

#[tokio::test]
async fn test_github_missing_repository_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "repository": null },
            "errors": [{ "message": "Could not resolve to a Repository with the name 'acme/gone'." }]
        })))
        .mount(&server)
        .await;

    let err = github(&server)
        .fetch("gone", &json!({ "owner": "acme", "repo": "gone" }))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Decode { .. }));
    assert_eq!(err.id(), "gone");
    assert!(err.to_string().contains("Could not resolve"));
}

#[tokio::test]
async fn test_github_unauthorized_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = github(&server)
        .fetch("tool", &json!({ "owner": "acme", "repo": "tool" }))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 401, .. }));
}

#[tokio::test]
async fn test_github_bad_config_never_hits_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = github(&server)
        .fetch("tool", &json!({ "owner": "acme" }))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Config { .. }));
}

#[tokio::test]
async fn test_github_custom_query_is_sent() {
    let server = MockServer::start().await;
    let query = "query Slim($owner: String!, $name: String!) { repository(owner: $owner, name: $name) { description } }";
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({ "query": query })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "repository": { "description": "Slim" } }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = github(&server).with_query(query);
    let response = source
        .fetch("slim", &json!({ "owner": "acme", "repo": "slim" }))
        .await
        .unwrap();

    assert_eq!(
        source.parse(FieldName::Description, "slim", &response).unwrap(),
        FieldValue::Description("Slim".into())
    );
    assert!(source.parse(FieldName::Lifespan, "slim", &response).is_err());
}

#[tokio::test]
async fn test_npm_fetch_scoped_package() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/@acme%2Fwidget"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "@acme/widget",
            "dist-tags": { "latest": "2.3.1-beta.1" },
            "time": {
                "created": "2020-01-01T00:00:00.000Z",
                "modified": "2023-04-05T06:07:08.000Z",
                "2.3.1-beta.1": "2023-04-05T06:07:08.000Z"
            },
            "description": "Widgets",
            "readme": "# Widget\n\nBody",
            "versions": {}
        })))
        .mount(&server)
        .await;

    let source = npm(&server);
    let response = source
        .fetch("widget", &json!({ "packageName": "@acme/widget" }))
        .await
        .unwrap();

    assert_eq!(
        source.parse(FieldName::LatestRelease, "widget", &response).unwrap(),
        FieldValue::LatestRelease(Release {
            version: "2.3.1".into(),
            timestamp: Utc.with_ymd_and_hms(2023, 4, 5, 6, 7, 8).unwrap(),
            is_prerelease: None,
        })
    );
    assert_eq!(
        source.parse(FieldName::Name, "widget", &response).unwrap(),
        FieldValue::Name("Widget".into())
    );
}

#[tokio::test]
async fn test_npm_not_found_is_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "Not found" })))
        .mount(&server)
        .await;

    let err = npm(&server)
        .fetch("missing", &json!({ "name": "missing" }))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }));
    assert_eq!(err.source_name(), "npm");
}

#[tokio::test]
async fn test_npm_wrong_shape_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/odd"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[1, 2, 3]"))
        .mount(&server)
        .await;

    let err = npm(&server)
        .fetch("odd", &json!({ "packageName": "odd" }))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Decode { .. }));
}
