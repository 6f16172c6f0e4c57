use std::io::Write;

use asc::{
    AscError, Client, ClientConfig, Credentials, DebugSettings, DownloadRequest,
    download::ChecksumAlgorithm,
    resources::reports::SalesReportParams,
};
use flate2::{Compression, write::GzEncoder};
use httpmock::{Method::GET, MockServer};
use sha2::{Digest, Sha256};
use url::Url;

const REPORT: &str = "Provider\tSKU\tUnits\nAPPLE\tdemo\t3\n";

fn client(server: &MockServer) -> Client {
    let config = ClientConfig::default()
        .with_base_url(Url::parse(&server.base_url()).unwrap())
        .with_debug(DebugSettings::OFF);
    Client::with_static_token("test-token", config).unwrap()
}

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

fn sales_params() -> SalesReportParams {
    SalesReportParams {
        vendor_number: "8500".into(),
        report_type: "SALES".into(),
        report_sub_type: "SUMMARY".into(),
        frequency: "DAILY".into(),
        report_date: "2024-01-20".into(),
        version: None,
    }
}

#[tokio::test]
async fn sales_report_is_saved_and_decompressed() {
    let server = MockServer::start();
    let body = gzip(REPORT);
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/v1/salesReports")
            .query_param("filter[vendorNumber]", "8500")
            .query_param("filter[reportType]", "SALES")
            .query_param("filter[frequency]", "DAILY")
            .header("accept", "application/a-gzip")
            .header("authorization", "Bearer test-token");
        then.status(200)
            .header("content-type", "application/a-gzip")
            .body(body.clone());
    });
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("sales.tsv.gz");

    let report = client(&server)
        .download_sales_report(&sales_params(), &dest, true)
        .await
        .unwrap();

    mock.assert();
    assert_eq!(report.file.path, dest);
    assert_eq!(report.file.bytes, body.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    let plain = dir.path().join("sales.tsv");
    assert_eq!(report.file.decompressed_path.as_deref(), Some(plain.as_path()));
    assert_eq!(report.file.decompressed_bytes, Some(REPORT.len() as u64));
    assert_eq!(std::fs::read_to_string(&plain).unwrap(), REPORT);
}

#[tokio::test]
async fn plain_payload_is_not_decompressed() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/salesReports");
        then.status(200).body(REPORT);
    });
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("sales.tsv");

    let report = client(&server)
        .download_sales_report(&sales_params(), &dest, true)
        .await
        .unwrap();
    assert_eq!(report.file.decompressed_path, None);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), REPORT);
}

#[tokio::test]
async fn content_md5_mismatch_leaves_no_files() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/salesReports");
        // md5 of "hello world", not of the payload
        then.status(200)
            .header("content-md5", "XrY7u+Ae7tCTyyK7j1rNww==")
            .body(gzip(REPORT));
    });
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("sales.tsv.gz");

    let err = client(&server)
        .download_sales_report(&sales_params(), &dest, true)
        .await
        .unwrap_err();

    assert!(matches!(err, AscError::ChecksumMismatch { .. }), "{err}");
    assert!(!dest.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn pre_signed_download_omits_bearer_and_checks_sha256() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/segments/seg-1.gz");
        then.status(200).body("segment-bytes");
    });
    let client = client(&server);
    let dir = tempfile::tempdir().unwrap();
    let good = hex::encode(Sha256::digest(b"segment-bytes"));

    let ok = DownloadRequest::new(server.url("/segments/seg-1.gz"), dir.path().join("ok.bin"))
        .pre_signed()
        .expect_checksum(ChecksumAlgorithm::Sha256, good.to_ascii_uppercase());
    let result = client.download(&ok).await.unwrap();
    assert_eq!(result.bytes, 13);

    let bad_dest = dir.path().join("bad.bin");
    let bad = DownloadRequest::new(server.url("/segments/seg-1.gz"), &bad_dest)
        .pre_signed()
        .expect_checksum(ChecksumAlgorithm::Sha256, "00".repeat(32));
    let err = client.download(&bad).await.unwrap_err();
    assert!(matches!(err, AscError::ChecksumMismatch { .. }));
    assert!(!bad_dest.exists());
    assert_eq!(mock.hits(), 2);
}

#[tokio::test]
async fn bearer_download_refuses_foreign_absolute_urls() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.any_request();
        then.status(200).body("x");
    });
    let dir = tempfile::tempdir().unwrap();
    let request = DownloadRequest::new(server.url("/v1/salesReports"), dir.path().join("r"));

    let err = client(&server).download(&request).await.unwrap_err();
    assert!(matches!(err, AscError::InvalidNextUrl(_)), "{err}");
    assert_eq!(mock.hits(), 0);
}

#[tokio::test]
async fn error_status_maps_to_api_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/salesReports");
        then.status(404).json_body(serde_json::json!({
            "errors": [{"status": "404", "code": "NOT_FOUND", "title": "Report not available"}]
        }));
    });
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("sales.tsv.gz");

    let err = client(&server)
        .download_sales_report(&sales_params(), &dest, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AscError::Api(ref api) if api.status == 404));
    assert!(!dest.exists());
}

#[tokio::test]
async fn not_authorized_download_retries_once_with_a_fresh_token() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/v1/salesReports");
        then.status(401).json_body(serde_json::json!({
            "errors": [{"status": "401", "code": "NOT_AUTHORIZED", "title": "Unauthorized"}]
        }));
    });
    let credentials = Credentials::new(
        "KEY123",
        "issuer-uuid",
        include_str!("fixtures/AuthKey_TEST.p8"),
    );
    let config = ClientConfig::default()
        .with_base_url(Url::parse(&server.base_url()).unwrap())
        .with_debug(DebugSettings::OFF);
    let client = Client::new(credentials, config).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("sales.tsv.gz");

    let err = client
        .download_sales_report(&sales_params(), &dest, true)
        .await
        .unwrap_err();

    assert!(matches!(err, AscError::Api(ref api) if api.is_not_authorized()), "{err}");
    assert_eq!(mock.hits(), 2);
    assert!(!dest.exists());
}

#[tokio::test]
async fn pre_signed_download_is_not_retried_on_401() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/segments/expired.gz");
        then.status(401).json_body(serde_json::json!({
            "errors": [{"status": "401", "code": "NOT_AUTHORIZED", "title": "Unauthorized"}]
        }));
    });
    let credentials = Credentials::new(
        "KEY123",
        "issuer-uuid",
        include_str!("fixtures/AuthKey_TEST.p8"),
    );
    let client = Client::new(credentials, ClientConfig::default().with_debug(DebugSettings::OFF))
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let request =
        DownloadRequest::new(server.url("/segments/expired.gz"), dir.path().join("s.gz")).pre_signed();

    let err = client.download(&request).await.unwrap_err();
    assert!(matches!(err, AscError::Api(ref api) if api.status == 401), "{err:?}");
    assert_eq!(mock.hits(), 1);
}

#[tokio::test]
async fn verbose_http_download_still_streams_to_disk() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/salesReports");
        then.status(200).body(REPORT);
    });
    let config = ClientConfig::default()
        .with_base_url(Url::parse(&server.base_url()).unwrap())
        .with_debug(DebugSettings { enabled: true, verbose_http: true });
    let client = Client::with_static_token("test-token", config).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("sales.tsv");

    let report = client
        .download_sales_report(&sales_params(), &dest, false)
        .await
        .unwrap();
    assert_eq!(report.file.bytes, REPORT.len() as u64);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), REPORT);
}
