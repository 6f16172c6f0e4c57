use std::path::Path;

use asc::{
    AscError, Client, ClientConfig, DebugSettings, LinkagesQuery, ListQuery, ListResponse,
    config::Credentials,
    query::QuerySupport,
    resources::WebhookCreateAttributes,
};
use httpmock::{
    Method::{GET, PATCH, POST, PUT},
    MockServer,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;

const PNG_12: [u8; 12] = [
    0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n', 0, 0, 0, 0x0d,
];

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::default()
        .with_base_url(Url::parse(&server.base_url()).unwrap())
        .with_debug(DebugSettings::OFF)
}

fn client(server: &MockServer) -> Client {
    Client::with_static_token("test-token", config(server)).unwrap()
}

#[tokio::test]
async fn profiles_request_carries_limit_and_bearer() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/bundleIds/bundle-1/profiles")
            .query_param("limit", "8")
            .header("authorization", "Bearer test-token")
            .header("accept", "application/json");
        then.status(200).json_body(json!({
            "data": [{"type": "profiles", "id": "p1", "attributes": {"name": "Dev", "profileState": "ACTIVE"}}],
            "links": {"self": "https://api.appstoreconnect.apple.com/v1/bundleIds/bundle-1/profiles"}
        }));
    });

    let profiles = client(&server)
        .get_bundle_id_profiles(" bundle-1 ", &ListQuery::new().limit(8))
        .await
        .unwrap();

    mock.assert();
    assert_eq!(profiles.data.len(), 1);
    assert_eq!(profiles.data[0].id, "p1");
    let attrs = profiles.data[0].attributes.as_ref().unwrap();
    assert_eq!(attrs.profile_state.as_deref(), Some("ACTIVE"));
}

#[tokio::test]
async fn capabilities_linkages_reject_limit_before_sending() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/bundleIds/bundle-1/relationships/bundleIdCapabilities");
        then.status(200).json_body(json!({
            "data": [{"type": "bundleIdCapabilities", "id": "cap-1"}],
            "links": {}
        }));
    });
    let client = client(&server);

    let err = client
        .get_bundle_id_capabilities_relationships("bundle-1", &LinkagesQuery::new().limit(5))
        .await
        .unwrap_err();
    assert!(matches!(err, AscError::UnsupportedParameter(ref m) if m.contains("limit")), "{err}");
    assert_eq!(mock.hits(), 0);

    let links = client
        .get_bundle_id_capabilities_relationships("bundle-1", &LinkagesQuery::new())
        .await
        .unwrap();
    assert_eq!(links.data[0].id, "cap-1");
    assert_eq!(mock.hits(), 1);
}

#[tokio::test]
async fn foreign_next_url_is_rejected_without_a_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.any_request();
        then.status(200).json_body(json!({"data": []}));
    });
    let client = client(&server);

    for next in [
        "https://evil.example.com/v1/apps?cursor=abc",
        "http://api.appstoreconnect.apple.com/v1/apps?cursor=abc",
        "https://user:pw@api.appstoreconnect.apple.com/v1/apps",
        "https://api.appstoreconnect.apple.com/internal/apps",
    ] {
        let err = client
            .list_apps(&ListQuery::new().next(next))
            .await
            .unwrap_err();
        assert!(matches!(err, AscError::InvalidNextUrl(_)), "{next}: {err}");
    }
    assert_eq!(mock.hits(), 0);
}

#[tokio::test]
async fn create_webhook_sends_attributes_and_app_relationship() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/webhooks")
            .header("content-type", "application/json")
            .json_body(json!({
                "data": {
                    "type": "webhooks",
                    "attributes": {
                        "enabled": true,
                        "eventTypes": ["BUILD_UPLOAD_STATE_UPDATED"],
                        "name": "Builds",
                        "secret": "s3cret",
                        "url": "https://hooks.example.com/asc"
                    },
                    "relationships": {"app": {"data": {"type": "apps", "id": "app-1"}}}
                }
            }));
        then.status(201).json_body(json!({
            "data": {"type": "webhooks", "id": "wh-1", "attributes": {
                "enabled": true,
                "eventTypes": ["BUILD_UPLOAD_STATE_UPDATED"],
                "name": "Builds",
                "url": "https://hooks.example.com/asc"
            }},
            "links": {}
        }));
    });

    let created = client(&server)
        .create_webhook(
            "app-1",
            WebhookCreateAttributes {
                enabled: true,
                event_types: vec!["BUILD_UPLOAD_STATE_UPDATED".into()],
                name: "Builds".into(),
                secret: "s3cret".into(),
                url: "https://hooks.example.com/asc".into(),
            },
        )
        .await
        .unwrap();

    mock.assert();
    assert_eq!(created.data.id, "wh-1");
}

fn write_png(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("header.png");
    std::fs::write(&path, PNG_12).unwrap();
    path
}

#[tokio::test]
async fn app_clip_header_upload_reserves_uploads_and_commits() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let file = write_png(dir.path());

    let reserve = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/appClipHeaderImages")
            .json_body(json!({
                "data": {
                    "type": "appClipHeaderImages",
                    "attributes": {"fileName": "header.png", "fileSize": 12},
                    "relationships": {
                        "appClipDefaultExperienceLocalization": {
                            "data": {"type": "appClipDefaultExperienceLocalizations", "id": "loc-1"}
                        }
                    }
                }
            }));
        then.status(201).json_body(json!({
            "data": {
                "type": "appClipHeaderImages",
                "id": "img-1",
                "attributes": {
                    "fileName": "header.png",
                    "fileSize": 12,
                    "uploadOperations": [{
                        "method": "PUT",
                        "url": server.url("/storage/part-1"),
                        "offset": 0,
                        "length": 12,
                        "requestHeaders": [{"name": "Content-Type", "value": "image/png"}]
                    }]
                }
            },
            "links": {}
        }));
    });
    let chunk = server.mock(|when, then| {
        when.method(PUT)
            .path("/storage/part-1")
            .header("content-type", "image/png")
            .header("content-length", "12");
        then.status(200);
    });
    let commit = server.mock(|when, then| {
        when.method(PATCH)
            .path("/v1/appClipHeaderImages/img-1")
            .json_body(json!({
                "data": {"type": "appClipHeaderImages", "id": "img-1", "attributes": {"uploaded": true}}
            }));
        then.status(200).json_body(json!({
            "data": {
                "type": "appClipHeaderImages",
                "id": "img-1",
                "attributes": {"assetDeliveryState": {"state": "UPLOAD_COMPLETE"}}
            },
            "links": {}
        }));
    });

    let result = client(&server)
        .upload_app_clip_header_image("loc-1", &file)
        .await
        .unwrap();

    reserve.assert();
    chunk.assert();
    commit.assert();
    assert!(result.uploaded);
    assert_eq!(result.id, "img-1");
    assert_eq!(result.file_name, "header.png");
    assert_eq!(result.file_size, 12);
    assert_eq!(result.asset_delivery_state.as_deref(), Some("UPLOAD_COMPLETE"));
}

#[tokio::test]
async fn failed_chunk_aborts_before_commit() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let file = write_png(dir.path());

    server.mock(|when, then| {
        when.method(POST).path("/v1/appScreenshots");
        then.status(201).json_body(json!({
            "data": {
                "type": "appScreenshots",
                "id": "shot-1",
                "attributes": {"uploadOperations": [
                    {"method": "PUT", "url": server.url("/storage/a"), "offset": 0, "length": 6},
                    {"method": "PUT", "url": server.url("/storage/b"), "offset": 6, "length": 6}
                ]}
            },
            "links": {}
        }));
    });
    server.mock(|when, then| {
        when.method(PUT).path("/storage/a");
        then.status(200);
    });
    server.mock(|when, then| {
        when.method(PUT).path("/storage/b");
        then.status(500);
    });
    let commit = server.mock(|when, then| {
        when.method(PATCH).path("/v1/appScreenshots/shot-1");
        then.status(200).json_body(json!({"data": {"type": "appScreenshots", "id": "shot-1"}}));
    });

    let err = client(&server)
        .upload_screenshot("set-1", &file)
        .await
        .unwrap_err();

    assert!(
        matches!(err, AscError::UploadChunk { offset: 6, length: 6, status: 500 }),
        "{err}"
    );
    assert_eq!(commit.hits(), 0);
}

#[tokio::test]
async fn operations_not_covering_the_file_are_rejected_before_upload() {
    let server = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let file = write_png(dir.path());

    server.mock(|when, then| {
        when.method(POST).path("/v1/appScreenshots");
        then.status(201).json_body(json!({
            "data": {
                "type": "appScreenshots",
                "id": "shot-1",
                "attributes": {"uploadOperations": [
                    {"method": "PUT", "url": server.url("/storage/a"), "offset": 0, "length": 10}
                ]}
            },
            "links": {}
        }));
    });
    let chunk = server.mock(|when, then| {
        when.method(PUT).path("/storage/a");
        then.status(200);
    });

    let err = client(&server)
        .upload_screenshot("set-1", &file)
        .await
        .unwrap_err();
    assert!(matches!(err, AscError::InvalidUploadOperations(_)), "{err}");
    assert_eq!(chunk.hits(), 0);
}

#[tokio::test]
async fn api_errors_are_surfaced_verbatim() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/apps/missing");
        then.status(404).json_body(json!({
            "errors": [{
                "status": "404",
                "code": "NOT_FOUND",
                "title": "The specified resource does not exist",
                "detail": "There is no resource of type 'apps' with id 'missing'"
            }]
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/v1/apps/broken");
        then.status(502).body("<html>bad gateway</html>");
    });
    let client = client(&server);

    let err = client.get_app("missing").await.unwrap_err();
    let AscError::Api(api) = &err else {
        panic!("expected api error, got {err:?}");
    };
    assert_eq!(api.status, 404);
    assert_eq!(api.code, "NOT_FOUND");
    assert_eq!(
        err.to_string(),
        "The specified resource does not exist: There is no resource of type 'apps' with id 'missing'"
    );

    let err = client.get_app("broken").await.unwrap_err();
    assert!(matches!(err, AscError::Transport { status: Some(502), .. }), "{err:?}");
}

#[tokio::test]
async fn not_authorized_retries_once_with_a_fresh_token() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/v1/apps/app-1");
        then.status(401).json_body(json!({
            "errors": [{"status": "401", "code": "NOT_AUTHORIZED", "title": "Authentication credentials are missing or invalid."}]
        }));
    });
    let credentials = Credentials::new(
        "KEY123",
        "issuer-uuid",
        include_str!("fixtures/AuthKey_TEST.p8"),
    );
    let client = Client::new(credentials, config(&server)).unwrap();

    let err = client.get_app("app-1").await.unwrap_err();
    assert!(matches!(err, AscError::Api(ref api) if api.is_not_authorized()), "{err}");
    assert_eq!(mock.hits(), 2);
}

#[tokio::test]
async fn static_token_is_not_retried() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/v1/apps/app-1");
        then.status(401).json_body(json!({
            "errors": [{"status": "401", "code": "NOT_AUTHORIZED", "title": "Unauthorized"}]
        }));
    });

    assert!(client(&server).get_app("app-1").await.is_err());
    assert_eq!(mock.hits(), 1);
}

#[tokio::test]
async fn blank_ids_fail_without_a_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.any_request();
        then.status(200).json_body(json!({"data": []}));
    });
    let client = client(&server);

    assert!(matches!(client.get_app("  ").await, Err(AscError::InvalidArgument(_))));
    assert!(matches!(client.delete_webhook("").await, Err(AscError::InvalidArgument(_))));
    assert!(matches!(
        client.get_bundle_id_profiles(" ", &ListQuery::new()).await,
        Err(AscError::InvalidArgument(_))
    ));
    assert_eq!(mock.hits(), 0);
}

#[tokio::test]
async fn cancelled_client_sends_nothing() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.any_request();
        then.status(200).json_body(json!({"data": []}));
    });
    let cancel = CancellationToken::new();
    cancel.cancel();
    let client = client(&server).with_cancellation(cancel);

    let err = client.list_apps(&ListQuery::new()).await.unwrap_err();
    assert!(matches!(err, AscError::Cancelled));
    assert_eq!(mock.hits(), 0);
}

const API_ROOT: &str = "https://api.appstoreconnect.apple.com";

/// Cursors name the production host; requests for them land on the mock.
fn paging_client(server: &MockServer) -> Client {
    let origin = Url::parse(&server.base_url()).unwrap();
    Client::with_static_token("test-token", config(server).with_cursor_origin(origin)).unwrap()
}

fn run(id: &str, number: u64) -> serde_json::Value {
    json!({"type": "ciBuildRuns", "id": id, "attributes": {"number": number}})
}

fn ids<A>(list: &ListResponse<A>) -> Vec<&str> {
    list.data.iter().map(|r| r.id.as_str()).collect()
}

#[tokio::test]
async fn build_runs_keep_server_order() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/ciWorkflows/wf-1/buildRuns")
            .query_param("sort", "number");
        then.status(200)
            .json_body(json!({"data": [run("r1", 1), run("r2", 2), run("r3", 3)]}));
    });

    let runs = client(&server)
        .list_build_runs("wf-1", &ListQuery::new().sort(["number"]))
        .await
        .unwrap();

    mock.assert();
    assert_eq!(ids(&runs), vec!["r1", "r2", "r3"]);
}

#[tokio::test]
async fn paginated_build_runs_equal_the_individual_pages() {
    let server = MockServer::start();
    let first_page = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/ciWorkflows/wf-1/buildRuns")
            .query_param("limit", "2");
        then.status(200).json_body(json!({
            "data": [run("r1", 1), run("r2", 2)],
            "links": {"next": format!("{API_ROOT}/v1/ciWorkflows/wf-1/buildRuns?cursor=AB")}
        }));
    });
    let second_page = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/ciWorkflows/wf-1/buildRuns")
            .query_param("cursor", "AB")
            .header("authorization", "Bearer test-token");
        then.status(200).json_body(json!({"data": [run("r3", 3)]}));
    });
    let client = paging_client(&server);

    let first = client
        .list_build_runs("wf-1", &ListQuery::new().limit(2))
        .await
        .unwrap();
    let cursor = first.next_url().unwrap().to_string();
    let second = client
        .list_build_runs("wf-1", &ListQuery::new().next(cursor))
        .await
        .unwrap();
    let all = client.paginate_from(first.clone(), None).await.unwrap();

    let mut expected = ids(&first);
    expected.extend(ids(&second));
    assert_eq!(expected, vec!["r1", "r2", "r3"]);
    assert_eq!(ids(&all), expected);
    assert_eq!(all.next_url(), None);
    first_page.assert_hits(1);
    second_page.assert_hits(2);
}

#[tokio::test]
async fn paginate_stops_at_the_page_cap() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/apps").query_param("limit", "1");
        then.status(200).json_body(json!({
            "data": [{"type": "apps", "id": "a1"}],
            "links": {"next": format!("{API_ROOT}/v1/apps?cursor=2")}
        }));
    });
    let second = server.mock(|when, then| {
        when.method(GET).path("/v1/apps").query_param("cursor", "2");
        then.status(200).json_body(json!({
            "data": [{"type": "apps", "id": "a2"}],
            "links": {"next": format!("{API_ROOT}/v1/apps?cursor=3")}
        }));
    });
    let third = server.mock(|when, then| {
        when.method(GET).path("/v1/apps").query_param("cursor", "3");
        then.status(200).json_body(json!({"data": [{"type": "apps", "id": "a3"}]}));
    });

    let apps: ListResponse = paging_client(&server)
        .paginate("/v1/apps", &ListQuery::new().limit(1), QuerySupport::full("apps"), Some(2))
        .await
        .unwrap();

    assert_eq!(ids(&apps), vec!["a1", "a2"]);
    assert_eq!(apps.next_url(), Some(format!("{API_ROOT}/v1/apps?cursor=3").as_str()));
    second.assert_hits(1);
    third.assert_hits(0);
}

#[tokio::test]
async fn bundle_id_app_linkage_is_decoded() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/v1/bundleIds/bundle-1/relationships/app");
        then.status(200).json_body(json!({
            "data": {"type": "apps", "id": "app-1"},
            "links": {"self": format!("{API_ROOT}/v1/bundleIds/bundle-1/relationships/app")}
        }));
    });

    let link = client(&server)
        .get_bundle_id_app_relationship("bundle-1")
        .await
        .unwrap();

    mock.assert();
    let app = link.data.unwrap();
    assert_eq!((app.kind.as_str(), app.id.as_str()), ("apps", "app-1"));
}

#[tokio::test]
async fn reorder_screenshots_replaces_the_linkage_list() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(PATCH)
            .path("/v1/appScreenshotSets/set-1/relationships/appScreenshots")
            .json_body(json!({"data": [
                {"type": "appScreenshots", "id": "s2"},
                {"type": "appScreenshots", "id": "s1"}
            ]}));
        then.status(204);
    });
    let client = client(&server);

    client
        .reorder_screenshots("set-1", ["s2", " ", "s1"])
        .await
        .unwrap();
    mock.assert();

    let err = client
        .reorder_screenshots("set-1", Vec::<String>::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AscError::InvalidArgument(_)), "{err}");
    mock.assert_hits(1);
}
