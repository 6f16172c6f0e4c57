//! Streamed report and artifact downloads.

use std::{
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use flate2::read::MultiGzDecoder;
use md5::Md5;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::{
    client::{Client, classify_failure},
    debug::{self, sanitize_url},
    error::{AscError, Result},
};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const COPY_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadAuth {
    /// Standard API request carrying the bearer token.
    Bearer,
    /// Pre-signed storage URL; no `Authorization` header is sent.
    PreSigned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedChecksum {
    pub algorithm: ChecksumAlgorithm,
    pub hex: String,
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub destination: PathBuf,
    pub auth: DownloadAuth,
    pub accept: Option<String>,
    pub decompress: bool,
    pub expected_checksum: Option<ExpectedChecksum>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            auth: DownloadAuth::Bearer,
            accept: None,
            decompress: false,
            expected_checksum: None,
        }
    }

    pub fn pre_signed(mut self) -> Self {
        self.auth = DownloadAuth::PreSigned;
        self
    }

    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn decompress(mut self, decompress: bool) -> Self {
        self.decompress = decompress;
        self
    }

    pub fn expect_checksum(mut self, algorithm: ChecksumAlgorithm, hex: impl Into<String>) -> Self {
        self.expected_checksum = Some(ExpectedChecksum {
            algorithm,
            hex: hex.into().trim().to_ascii_lowercase(),
        });
        self
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    pub path: PathBuf,
    pub bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decompressed_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decompressed_bytes: Option<u64>,
}

/// `report.tsv.gz` decompresses to `report.tsv`; anything else gets `.out`.
pub fn decompressed_path(destination: &Path) -> PathBuf {
    match destination.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("gz") => destination.with_extension(""),
        _ => {
            let mut name = destination.as_os_str().to_os_string();
            name.push(".out");
            PathBuf::from(name)
        }
    }
}

fn content_md5(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("content-md5")?.to_str().ok()?.trim();
    STANDARD.decode(raw).ok().map(hex::encode)
}

fn verify(expected: &str, actual: &str) -> Result<()> {
    if expected.eq_ignore_ascii_case(actual) {
        Ok(())
    } else {
        Err(AscError::ChecksumMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

fn destination_dir(destination: &Path) -> PathBuf {
    match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

impl Client {
    /// Streams `request.url` to a temp file beside the destination, verifies
    /// checksums and renames it into place. Temp files are removed on any error
    /// or cancellation.
    pub async fn download(&self, request: &DownloadRequest) -> Result<DownloadResult> {
        if request.destination.as_os_str().is_empty() {
            return Err(AscError::InvalidArgument("output path is required".into()));
        }
        let url = match request.auth {
            DownloadAuth::Bearer => self.resolve_url(&request.url)?,
            DownloadAuth::PreSigned => Url::parse(request.url.trim())?,
        };

        let settings = self.debug_settings();
        let mut retried = false;
        let mut resp = loop {
            let mut builder = self
                .http()
                .get(url.clone())
                .header(ACCEPT, request.accept.as_deref().unwrap_or("*/*"))
                .timeout(self.config().upload_timeout);
            if request.auth == DownloadAuth::Bearer {
                builder = builder.header(AUTHORIZATION, format!("Bearer {}", self.bearer().await?));
            }
            let outgoing = builder.build()?;
            debug!(url = %sanitize_url(&url), "download started");
            if settings.verbose_http {
                debug!("{}", debug::dump_request("GET", &url, outgoing.headers(), None));
            }

            let resp = self
                .cancellable(async { Ok::<_, AscError>(self.http().execute(outgoing).await?) })
                .await?;
            let status = resp.status();
            if status.is_success() {
                if settings.verbose_http {
                    debug!("{}", debug::dump_response(status.as_u16(), &url, resp.headers(), &[]));
                }
                break resp;
            }

            let headers = resp.headers().clone();
            let body = self
                .cancellable(async { Ok::<_, AscError>(resp.bytes().await?.to_vec()) })
                .await?;
            if settings.verbose_http {
                debug!("{}", debug::dump_response(status.as_u16(), &url, &headers, &body));
            }
            let err = classify_failure(status.as_u16(), &body);
            if !retried && request.auth == DownloadAuth::Bearer && self.reauthorize(&err, &url).await {
                retried = true;
                continue;
            }
            return Err(err);
        };
        let server_md5 = content_md5(resp.headers());

        let dir = destination_dir(&request.destination);
        tokio::fs::create_dir_all(&dir).await?;
        let tmp = NamedTempFile::new_in(&dir)?;
        let mut file = tokio::fs::File::from_std(tmp.as_file().try_clone()?);

        let mut md5 = Md5::new();
        let mut sha = Sha256::new();
        let mut head: Vec<u8> = Vec::with_capacity(2);
        let mut bytes = 0u64;
        while let Some(chunk) = self
            .cancellable(async { Ok::<_, AscError>(resp.chunk().await?) })
            .await?
        {
            if head.len() < 2 {
                let take = (2 - head.len()).min(chunk.len());
                head.extend_from_slice(&chunk[..take]);
            }
            md5.update(&chunk);
            sha.update(&chunk);
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let md5_hex = hex::encode(md5.finalize());
        if let Some(expected) = &server_md5 {
            verify(expected, &md5_hex)?;
        }
        if let Some(expected) = &request.expected_checksum {
            match expected.algorithm {
                ChecksumAlgorithm::Md5 => verify(&expected.hex, &md5_hex)?,
                ChecksumAlgorithm::Sha256 => verify(&expected.hex, &hex::encode(sha.finalize()))?,
            }
        }

        tmp.persist(&request.destination).map_err(|e| e.error)?;
        info!(path = %request.destination.display(), bytes, "download saved");

        let mut result = DownloadResult {
            path: request.destination.clone(),
            bytes,
            decompressed_path: None,
            decompressed_bytes: None,
        };
        if request.decompress && head == GZIP_MAGIC {
            let target = decompressed_path(&request.destination);
            let source = request.destination.clone();
            let cancel = self.cancellation_token().clone();
            let out = target.clone();
            let written = tokio::task::spawn_blocking(move || gunzip(&source, &out, &cancel))
                .await
                .map_err(|e| AscError::transport(format!("decompression task failed: {e}")))??;
            info!(path = %target.display(), bytes = written, "report decompressed");
            result.decompressed_path = Some(target);
            result.decompressed_bytes = Some(written);
        }
        Ok(result)
    }
}

/// Gunzips `source` into a temp file beside `target`, then renames it.
pub fn gunzip(source: &Path, target: &Path, cancel: &CancellationToken) -> Result<u64> {
    let input = std::fs::File::open(source)?;
    let mut decoder = MultiGzDecoder::new(io::BufReader::new(input));
    let mut tmp = NamedTempFile::new_in(destination_dir(target))?;
    let mut buf = vec![0u8; COPY_BUFFER];
    let mut written = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(AscError::Cancelled);
        }
        let n = decoder.read(&mut buf)?;
        if n == 0 {
            break;
        }
        tmp.write_all(&buf[..n])?;
        written += n as u64;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, write::GzEncoder};

    #[test]
    fn decompressed_sibling_names() {
        assert_eq!(
            decompressed_path(Path::new("out/sales.tsv.gz")),
            PathBuf::from("out/sales.tsv")
        );
        assert_eq!(
            decompressed_path(Path::new("out/report")),
            PathBuf::from("out/report.out")
        );
    }

    #[test]
    fn content_md5_is_base64_of_digest() {
        let mut headers = HeaderMap::new();
        // md5("hello world")
        headers.insert("content-md5", "XrY7u+Ae7tCTyyK7j1rNww==".parse().unwrap());
        assert_eq!(
            content_md5(&headers).as_deref(),
            Some("5eb63bbbe01eeed093cb22bb8f5acdc3")
        );
    }

    #[test]
    fn gunzip_roundtrip_and_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("r.tsv.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"Provider\tUnits\nAPPLE\t3\n").unwrap();
        std::fs::write(&gz, encoder.finish().unwrap()).unwrap();

        let out = decompressed_path(&gz);
        let n = gunzip(&gz, &out, &CancellationToken::new()).unwrap();
        assert_eq!(n, 23);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "Provider\tUnits\nAPPLE\t3\n");

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let other = dir.path().join("other.tsv");
        assert!(matches!(gunzip(&gz, &other, &cancelled), Err(AscError::Cancelled)));
        assert!(!other.exists());
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 2);
    }
}
