//! Reserve/upload/commit flow for media assets.

use std::path::Path;

use futures::{TryStreamExt, stream};
use md5::{Digest, Md5};
use reqwest::{
    Method,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, SeekFrom},
};
use tracing::{debug, info};

use crate::{
    client::{Client, require_id},
    envelope::{ResourceRef, SingleResponse},
    error::{AscError, Result},
};

const READ_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

/// One server-issued chunk directive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadOperation {
    pub method: String,
    pub url: String,
    pub offset: u64,
    pub length: u64,
    #[serde(default)]
    pub request_headers: Vec<HttpHeader>,
}

/// Checks that `operations` cover `[0, file_size)` with no gap or overlap.
pub fn validate_coverage(operations: &[UploadOperation], file_size: u64) -> Result<()> {
    if operations.is_empty() {
        return Err(AscError::InvalidUploadOperations(
            "no upload operations returned from API".into(),
        ));
    }
    let mut sorted: Vec<&UploadOperation> = operations.iter().collect();
    sorted.sort_by_key(|op| op.offset);

    let mut expected = 0u64;
    for op in sorted {
        if op.length == 0 {
            return Err(AscError::InvalidUploadOperations(format!(
                "operation at offset {} has zero length",
                op.offset
            )));
        }
        if op.offset != expected {
            let kind = if op.offset < expected { "overlap" } else { "gap" };
            return Err(AscError::InvalidUploadOperations(format!(
                "{kind} at offset {expected}: next operation starts at {}",
                op.offset
            )));
        }
        expected = op.offset.checked_add(op.length).ok_or_else(|| {
            AscError::InvalidUploadOperations("operation length overflows".into())
        })?;
    }
    if expected != file_size {
        return Err(AscError::InvalidUploadOperations(format!(
            "operations cover {expected} bytes but file has {file_size}"
        )));
    }
    Ok(())
}

/// How the commit `PATCH` reports the file checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    None,
    Md5,
    Composite,
}

/// Streams `path` through MD5 and returns the lowercase hex digest.
pub async fn md5_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Commit attributes for an asset upload.
pub fn commit_attributes(kind: ChecksumKind, checksum: Option<&str>) -> Value {
    match (kind, checksum) {
        (ChecksumKind::Md5, Some(sum)) => json!({"uploaded": true, "sourceFileChecksum": sum}),
        (ChecksumKind::Composite, Some(sum)) => json!({
            "uploaded": true,
            "sourceFileChecksums": {"file": {"hash": sum, "algorithm": "MD5"}}
        }),
        _ => json!({"uploaded": true}),
    }
}

/// Builds the request for one chunk. Operation headers are applied as given
/// and no `Authorization` header is added.
pub fn chunk_request(
    http: &reqwest::Client,
    op: &UploadOperation,
    body: Vec<u8>,
) -> Result<reqwest::RequestBuilder> {
    let method = Method::from_bytes(op.method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| AscError::InvalidUploadOperations(format!("bad method {:?}", op.method)))?;
    let url = url::Url::parse(op.url.trim())
        .map_err(|e| AscError::InvalidUploadOperations(format!("bad upload URL: {e}")))?;

    let mut headers = HeaderMap::new();
    for header in &op.request_headers {
        let name = HeaderName::from_bytes(header.name.trim().as_bytes()).map_err(|_| {
            AscError::InvalidUploadOperations(format!("bad header name {:?}", header.name))
        })?;
        let value = HeaderValue::from_str(&header.value).map_err(|_| {
            AscError::InvalidUploadOperations(format!("bad value for header {}", header.name))
        })?;
        headers.append(name, value);
    }
    Ok(http.request(method, url).headers(headers).body(body))
}

async fn read_chunk(path: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
    let length = usize::try_from(length)
        .map_err(|_| AscError::InvalidUploadOperations("chunk too large".into()))?;
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; length];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}

impl Client {
    /// Sends every chunk with at most `upload_concurrency` in flight. The first
    /// failure stops the remaining chunks.
    pub async fn upload_chunks(&self, path: &Path, operations: &[UploadOperation]) -> Result<()> {
        let workers = self.config().upload_concurrency.max(1);
        let timeout = self.config().upload_timeout;
        let uploads = stream::iter(operations.iter().map(Ok::<_, AscError>))
            .try_for_each_concurrent(workers, |op| async move {
                let body = read_chunk(path, op.offset, op.length).await?;
                let response = chunk_request(self.http(), op, body)?
                    .timeout(timeout)
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(AscError::UploadChunk {
                        offset: op.offset,
                        length: op.length,
                        status: status.as_u16(),
                    });
                }
                debug!(offset = op.offset, length = op.length, "chunk uploaded");
                Ok(())
            });
        self.cancellable(uploads).await
    }

    /// Uploads the file for an already reserved asset and commits it.
    /// Chunks and the checksum pass run together; the commit only happens
    /// after both finish.
    pub async fn upload_and_commit(
        &self,
        resource_type: &str,
        resource_id: &str,
        path: &Path,
        operations: &[UploadOperation],
        checksum: ChecksumKind,
    ) -> Result<SingleResponse<Value>> {
        let resource_id = require_id(resource_id, "asset ID")?;
        let size = tokio::fs::metadata(path).await?.len();
        validate_coverage(operations, size)?;

        let sum = async {
            match checksum {
                ChecksumKind::None => Ok(None),
                ChecksumKind::Md5 | ChecksumKind::Composite => md5_file(path).await.map(Some),
            }
        };
        let (sum, ()) = self
            .cancellable(async { tokio::try_join!(sum, self.upload_chunks(path, operations)) })
            .await?;

        let body = json!({
            "data": {
                "type": resource_type,
                "id": resource_id,
                "attributes": commit_attributes(checksum, sum.as_deref()),
            }
        });
        let committed: SingleResponse<Value> = self
            .patch_json(&format!("/v1/{resource_type}/{resource_id}"), &body)
            .await?;
        info!(resource_type, id = %resource_id, "asset upload committed");
        Ok(committed)
    }
}

/// Upload target for one asset type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetKind {
    pub resource_type: &'static str,
    /// To-one relationship the reservation is attached to, if any.
    pub parent: Option<(&'static str, &'static str)>,
    pub checksum: ChecksumKind,
}

/// Outcome of a full reserve/upload/commit run.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetUploadResult {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub file_name: String,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_delivery_state: Option<String>,
    pub uploaded: bool,
}

/// Rejects missing, empty and non-regular files before anything is reserved.
pub async fn validate_upload_file(path: &Path) -> Result<(String, u64)> {
    let meta = tokio::fs::metadata(path).await.map_err(|e| {
        AscError::InvalidArgument(format!("cannot read {}: {e}", path.display()))
    })?;
    if !meta.is_file() {
        return Err(AscError::InvalidArgument(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    if meta.len() == 0 {
        return Err(AscError::InvalidArgument(format!(
            "{} is empty",
            path.display()
        )));
    }
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            AscError::InvalidArgument(format!("{} has no usable file name", path.display()))
        })?;
    Ok((name, meta.len()))
}

impl Client {
    /// Reserves an asset record, uploads `path` into it and commits.
    /// `extra_attributes` are merged into the reservation attributes.
    pub async fn upload_asset(
        &self,
        kind: AssetKind,
        parent_id: Option<&str>,
        path: &Path,
        extra_attributes: Option<Value>,
    ) -> Result<AssetUploadResult> {
        let parent_id = match (kind.parent, parent_id) {
            (Some((relationship, _)), Some(id)) => Some(require_id(id, relationship)?),
            (Some((relationship, _)), None) => {
                return Err(AscError::InvalidArgument(format!("{relationship} ID is required")));
            }
            (None, _) => None,
        };
        let (file_name, file_size) = validate_upload_file(path).await?;

        let mut attributes = json!({"fileName": file_name, "fileSize": file_size});
        if let (Some(Value::Object(extra)), Value::Object(attrs)) =
            (extra_attributes, &mut attributes)
        {
            attrs.extend(extra);
        }
        let mut data = json!({"type": kind.resource_type, "attributes": attributes});
        if let (Some((relationship, parent_type)), Some(id)) = (kind.parent, parent_id.as_deref())
        {
            let mut relationships = serde_json::Map::new();
            relationships.insert(
                relationship.to_string(),
                json!({"data": ResourceRef::new(parent_type, id)}),
            );
            data["relationships"] = Value::Object(relationships);
        }

        let reservation: SingleResponse<Value> = self
            .post_json(&format!("/v1/{}", kind.resource_type), &json!({"data": data}))
            .await?;
        let asset_id = reservation.data.id.clone();
        let operations: Vec<UploadOperation> = reservation
            .data
            .attributes
            .as_ref()
            .and_then(|a| a.get("uploadOperations"))
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        debug!(
            resource_type = kind.resource_type,
            id = %asset_id,
            operations = operations.len(),
            "asset reserved"
        );

        let committed = self
            .upload_and_commit(kind.resource_type, &asset_id, path, &operations, kind.checksum)
            .await?;
        let attrs = committed.data.attributes.as_ref();
        let state = attrs
            .and_then(|a| a.pointer("/assetDeliveryState/state"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let checksum = attrs
            .and_then(|a| a.get("sourceFileChecksum"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(AssetUploadResult {
            id: committed.data.id,
            kind: kind.resource_type.to_string(),
            parent_id,
            file_name,
            file_size,
            checksum,
            asset_delivery_state: state,
            uploaded: true,
        })
    }
}
