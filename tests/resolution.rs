//! End-to-end resolution through the factory with in-memory upstreams

mod helper;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;

use depwatch::dependency::clients::github::ReleaseTag;
use depwatch::dependency::{DependencyError, DependencyFactory, batch};
use helper::{FakeGithubClient, FakeWebClient, HELLO, HELLO_SHA256, collaborators};

const NODE_INDEX: &str = r#"[
    {"version": "v22.1.0", "date": "2024-05-02"},
    {"version": "v22.0.0", "date": "2024-04-24"},
    {"version": "v20.13.0", "date": "2024-05-07"}
]"#;

const NODE_TARBALL: &str = "https://nodejs.org/dist/v22.1.0/node-v22.1.0.tar.gz";

fn node_upstream(shasums: &str) -> FakeWebClient {
    FakeWebClient::new()
        .with_body("https://nodejs.org/dist/index.json", NODE_INDEX)
        .with_body("https://nodejs.org/dist/v22.1.0/SHASUMS256.txt", shasums)
        .with_body(NODE_TARBALL, HELLO)
        .with_body(
            "https://raw.githubusercontent.com/nodejs/Release/master/schedule.json",
            r#"{"v22": {"start": "2024-04-24", "end": "2027-04-30"}}"#,
        )
}

fn factory(web: Arc<FakeWebClient>, github: FakeGithubClient) -> DependencyFactory {
    DependencyFactory::new(collaborators(web, github))
}

#[tokio::test]
async fn node_versions_are_ordered_by_release_date() {
    let web = Arc::new(node_upstream(""));
    let source = factory(web, FakeGithubClient::new()).create("node").unwrap();

    let versions = source.list_versions().await.unwrap();

    assert_eq!(versions, vec!["v20.13.0", "v22.1.0", "v22.0.0"]);
}

#[tokio::test]
async fn node_resolve_produces_complete_record() {
    let shasums = format!(
        "{}  node-v22.1.0-linux-x64.tar.gz\n{}  node-v22.1.0.tar.gz\n",
        "0".repeat(64),
        HELLO_SHA256
    );
    let web = Arc::new(node_upstream(&shasums));
    let source = factory(Arc::clone(&web), FakeGithubClient::new())
        .create("node")
        .unwrap();

    let resolved = source.resolve("v22.1.0").await.unwrap();

    assert_eq!(
        serde_json::to_value(&resolved).unwrap(),
        json!({
            "version": "v22.1.0",
            "uri": NODE_TARBALL,
            "digest": {"algorithm": "sha256", "hex": HELLO_SHA256},
            "release_date": "2024-05-02T00:00:00Z",
            "deprecation_date": "2027-04-30T00:00:00Z",
            "cpe": "cpe:2.3:a:nodejs:node.js:22.1.0:*:*:*:*:*:*:*",
            "purl": format!(
                "pkg:generic/node@v22.1.0?checksum={}&download_url={}",
                HELLO_SHA256, NODE_TARBALL
            ),
            "licenses": ["MIT"],
        })
    );
    assert!(web.requests().iter().any(|url| url == NODE_TARBALL));
}

#[tokio::test]
async fn node_resolve_rejects_tampered_artifact() {
    let shasums = format!("{}  node-v22.1.0.tar.gz\n", "1".repeat(64));
    let web = Arc::new(node_upstream(&shasums));
    let source = factory(web, FakeGithubClient::new()).create("node").unwrap();

    let err = source.resolve("v22.1.0").await.unwrap_err();

    assert!(matches!(err, DependencyError::ChecksumMismatch { .. }));
}

#[tokio::test]
async fn node_release_date_of_unknown_version_is_not_found() {
    let web = Arc::new(node_upstream(""));
    let source = factory(web, FakeGithubClient::new()).create("node").unwrap();

    let err = source.release_date("v99.0.0").await.unwrap_err();

    assert!(matches!(err, DependencyError::NotFound(_)));
}

#[tokio::test]
async fn new_versions_lists_unknown_releases_newest_first() {
    let web = Arc::new(node_upstream(""));
    let source = factory(web, FakeGithubClient::new()).create("node").unwrap();

    let versions = batch::new_versions(source.as_ref(), &["v22.1.0".to_string()])
        .await
        .unwrap();

    assert_eq!(versions, vec!["v20.13.0", "v22.0.0"]);
}

#[tokio::test]
async fn composer_resolves_through_github_releases() {
    let uri = "https://getcomposer.org/download/2.7.6/composer.phar";
    let web = Arc::new(
        FakeWebClient::new()
            .with_body(uri, HELLO)
            .with_body(
                &format!("{}.sha256sum", uri),
                &format!("{}  composer.phar\n", HELLO_SHA256),
            ),
    );
    let github = FakeGithubClient::new().with_releases(
        "composer",
        "composer",
        vec![
            ReleaseTag {
                tag_name: "2.7.6".to_string(),
                published_at: Some(Utc.with_ymd_and_hms(2024, 5, 4, 10, 0, 0).unwrap()),
                created_at: None,
            },
            ReleaseTag {
                tag_name: "2.7.5".to_string(),
                published_at: Some(Utc.with_ymd_and_hms(2024, 5, 3, 10, 0, 0).unwrap()),
                created_at: None,
            },
        ],
    );
    let source = factory(web, github).create("composer").unwrap();

    let resolved = source.resolve("2.7.6").await.unwrap();

    assert_eq!(resolved.uri, uri);
    assert_eq!(resolved.digest.hex(), HELLO_SHA256);
    assert_eq!(resolved.licenses, vec!["MIT".to_string()]);
    assert_eq!(
        source.release_date("2.7.5").await.unwrap(),
        Utc.with_ymd_and_hms(2024, 5, 3, 10, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn unreachable_upstream_is_upstream_unavailable() {
    let web = Arc::new(FakeWebClient::new());
    let source = factory(web, FakeGithubClient::new()).create("node").unwrap();

    let err = source.list_versions().await.unwrap_err();

    assert!(err.is_upstream_unavailable());
}
