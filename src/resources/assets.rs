use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    client::{Client, require_id},
    envelope::{
        CreateRequest, LinkagesResponse, ListResponse, RelationshipRequest, ResourceRef,
        SingleResponse,
    },
    error::{AscError, Result},
    query::{LinkagesQuery, ListQuery, QuerySupport},
    render::{Table, TableRows, opt_text, value_text},
    upload::{AssetKind, AssetUploadResult, ChecksumKind, UploadOperation},
};

pub const APP_SCREENSHOT: AssetKind = AssetKind {
    resource_type: "appScreenshots",
    parent: Some(("appScreenshotSet", "appScreenshotSets")),
    checksum: ChecksumKind::Md5,
};

pub const APP_PREVIEW: AssetKind = AssetKind {
    resource_type: "appPreviews",
    parent: Some(("appPreviewSet", "appPreviewSets")),
    checksum: ChecksumKind::Md5,
};

pub const APP_CLIP_HEADER_IMAGE: AssetKind = AssetKind {
    resource_type: "appClipHeaderImages",
    parent: Some((
        "appClipDefaultExperienceLocalization",
        "appClipDefaultExperienceLocalizations",
    )),
    checksum: ChecksumKind::None,
};

pub const APP_CLIP_ADVANCED_EXPERIENCE_IMAGE: AssetKind = AssetKind {
    resource_type: "appClipAdvancedExperienceImages",
    parent: None,
    checksum: ChecksumKind::None,
};

pub const REVIEW_ATTACHMENT: AssetKind = AssetKind {
    resource_type: "appStoreReviewAttachments",
    parent: Some(("appStoreReviewDetail", "appStoreReviewDetails")),
    checksum: ChecksumKind::Md5,
};

pub const BACKGROUND_ASSET_UPLOAD_FILE: AssetKind = AssetKind {
    resource_type: "backgroundAssetUploadFiles",
    parent: Some(("backgroundAssetVersion", "backgroundAssetVersions")),
    checksum: ChecksumKind::Composite,
};

/// Attributes shared by uploadable asset records.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file_checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_delivery_state: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upload_operations: Vec<UploadOperation>,
}

impl AssetAttributes {
    pub fn delivery_state(&self) -> String {
        value_text(self.asset_delivery_state.as_ref().and_then(|s| s.get("state")))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaSetAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_display_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_type: Option<String>,
}

impl Client {
    pub async fn list_screenshot_sets(
        &self,
        localization_id: &str,
        query: &ListQuery,
    ) -> Result<ListResponse<MediaSetAttributes>> {
        let localization_id = require_id(localization_id, "localization ID")?;
        self.list_page(
            &format!("/v1/appStoreVersionLocalizations/{localization_id}/appScreenshotSets"),
            query,
            QuerySupport::full("appScreenshotSets"),
        )
        .await
    }

    pub async fn get_screenshot_set(&self, set_id: &str) -> Result<SingleResponse<MediaSetAttributes>> {
        let set_id = require_id(set_id, "screenshot set ID")?;
        self.get_json(&format!("/v1/appScreenshotSets/{set_id}")).await
    }

    pub async fn create_screenshot_set(
        &self,
        localization_id: &str,
        display_type: &str,
    ) -> Result<SingleResponse<MediaSetAttributes>> {
        let localization_id = require_id(localization_id, "localization ID")?;
        let display_type = require_id(display_type, "display type")?;
        let body = CreateRequest::new(
            "appScreenshotSets",
            json!({"screenshotDisplayType": display_type.to_ascii_uppercase()}),
        )
        .relationship(
            "appStoreVersionLocalization",
            ResourceRef::new("appStoreVersionLocalizations", localization_id),
        );
        self.post_json("/v1/appScreenshotSets", &body).await
    }

    pub async fn list_screenshots(
        &self,
        set_id: &str,
        query: &ListQuery,
    ) -> Result<ListResponse<AssetAttributes>> {
        let set_id = require_id(set_id, "screenshot set ID")?;
        self.list_page(
            &format!("/v1/appScreenshotSets/{set_id}/appScreenshots"),
            query,
            QuerySupport::full("appScreenshots"),
        )
        .await
    }

    /// Screenshot linkages of a set, in display order.
    pub async fn get_screenshot_set_screenshot_ids(
        &self,
        set_id: &str,
        query: &LinkagesQuery,
    ) -> Result<LinkagesResponse> {
        let set_id = require_id(set_id, "screenshot set ID")?;
        self.linkages_page(
            &format!("/v1/appScreenshotSets/{set_id}/relationships/appScreenshots"),
            query,
            QuerySupport::full("appScreenshots relationship"),
        )
        .await
    }

    /// Replaces the display order of a set. Screenshots left out of
    /// `screenshot_ids` are removed from the set by the server.
    pub async fn reorder_screenshots<I>(&self, set_id: &str, screenshot_ids: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let set_id = require_id(set_id, "screenshot set ID")?;
        let body = RelationshipRequest::new("appScreenshots", screenshot_ids);
        if body.data.is_empty() {
            return Err(AscError::InvalidArgument(
                "at least one screenshot ID is required".into(),
            ));
        }
        self.patch_no_content(
            &format!("/v1/appScreenshotSets/{set_id}/relationships/appScreenshots"),
            &body,
        )
        .await
    }

    pub async fn get_screenshot(&self, screenshot_id: &str) -> Result<SingleResponse<AssetAttributes>> {
        let screenshot_id = require_id(screenshot_id, "screenshot ID")?;
        self.get_json(&format!("/v1/appScreenshots/{screenshot_id}")).await
    }

    pub async fn delete_screenshot(&self, screenshot_id: &str) -> Result<()> {
        let screenshot_id = require_id(screenshot_id, "screenshot ID")?;
        self.delete(&format!("/v1/appScreenshots/{screenshot_id}")).await
    }

    pub async fn list_preview_sets(
        &self,
        localization_id: &str,
        query: &ListQuery,
    ) -> Result<ListResponse<MediaSetAttributes>> {
        let localization_id = require_id(localization_id, "localization ID")?;
        self.list_page(
            &format!("/v1/appStoreVersionLocalizations/{localization_id}/appPreviewSets"),
            query,
            QuerySupport::full("appPreviewSets"),
        )
        .await
    }

    pub async fn create_preview_set(
        &self,
        localization_id: &str,
        preview_type: &str,
    ) -> Result<SingleResponse<MediaSetAttributes>> {
        let localization_id = require_id(localization_id, "localization ID")?;
        let preview_type = require_id(preview_type, "preview type")?;
        let body = CreateRequest::new(
            "appPreviewSets",
            json!({"previewType": preview_type.to_ascii_uppercase()}),
        )
        .relationship(
            "appStoreVersionLocalization",
            ResourceRef::new("appStoreVersionLocalizations", localization_id),
        );
        self.post_json("/v1/appPreviewSets", &body).await
    }

    pub async fn get_preview(&self, preview_id: &str) -> Result<SingleResponse<AssetAttributes>> {
        let preview_id = require_id(preview_id, "preview ID")?;
        self.get_json(&format!("/v1/appPreviews/{preview_id}")).await
    }

    pub async fn delete_preview(&self, preview_id: &str) -> Result<()> {
        let preview_id = require_id(preview_id, "preview ID")?;
        self.delete(&format!("/v1/appPreviews/{preview_id}")).await
    }

    pub async fn delete_app_clip_header_image(&self, image_id: &str) -> Result<()> {
        let image_id = require_id(image_id, "image ID")?;
        self.delete(&format!("/v1/appClipHeaderImages/{image_id}")).await
    }

    pub async fn upload_screenshot(&self, set_id: &str, path: &Path) -> Result<AssetUploadResult> {
        self.upload_asset(APP_SCREENSHOT, Some(set_id), path, None).await
    }

    /// `mime_type` defaults from the file extension when not given.
    pub async fn upload_preview(
        &self,
        set_id: &str,
        path: &Path,
        mime_type: Option<&str>,
    ) -> Result<AssetUploadResult> {
        let mime = match mime_type.map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) => m.to_string(),
            None => preview_mime_type(path)?.to_string(),
        };
        self.upload_asset(APP_PREVIEW, Some(set_id), path, Some(json!({"mimeType": mime})))
            .await
    }

    pub async fn upload_app_clip_header_image(
        &self,
        localization_id: &str,
        path: &Path,
    ) -> Result<AssetUploadResult> {
        self.upload_asset(APP_CLIP_HEADER_IMAGE, Some(localization_id), path, None)
            .await
    }

    pub async fn upload_app_clip_advanced_experience_image(
        &self,
        path: &Path,
    ) -> Result<AssetUploadResult> {
        self.upload_asset(APP_CLIP_ADVANCED_EXPERIENCE_IMAGE, None, path, None)
            .await
    }

    pub async fn upload_review_attachment(
        &self,
        review_detail_id: &str,
        path: &Path,
    ) -> Result<AssetUploadResult> {
        self.upload_asset(REVIEW_ATTACHMENT, Some(review_detail_id), path, None)
            .await
    }

    /// `asset_type` is `ASSET` or `MANIFEST`.
    pub async fn upload_background_asset_file(
        &self,
        version_id: &str,
        path: &Path,
        asset_type: &str,
    ) -> Result<AssetUploadResult> {
        let asset_type = require_id(asset_type, "asset type")?.to_ascii_uppercase();
        self.upload_asset(
            BACKGROUND_ASSET_UPLOAD_FILE,
            Some(version_id),
            path,
            Some(json!({"assetType": asset_type})),
        )
        .await
    }
}

pub fn preview_mime_type(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "mov" => Ok("video/quicktime"),
        "mp4" => Ok("video/mp4"),
        "m4v" => Ok("video/x-m4v"),
        _ => Err(AscError::InvalidArgument(format!(
            "cannot infer preview mime type for {}; pass one explicitly",
            path.display()
        ))),
    }
}

impl TableRows for AssetUploadResult {
    fn table(&self) -> Table {
        Table::new(["ID", "Type", "File Name", "File Size", "State", "Uploaded"]).with_row([
            self.id.clone(),
            self.kind.clone(),
            self.file_name.clone(),
            self.file_size.to_string(),
            opt_text(&self.asset_delivery_state),
            self.uploaded.to_string(),
        ])
    }
}

const ASSET_HEADERS: [&str; 4] = ["ID", "File Name", "File Size", "State"];

fn asset_row(id: &str, attrs: Option<&AssetAttributes>) -> Vec<String> {
    let attrs = attrs.cloned().unwrap_or_default();
    vec![
        id.to_string(),
        opt_text(&attrs.file_name),
        opt_text(&attrs.file_size),
        attrs.delivery_state(),
    ]
}

impl TableRows for ListResponse<AssetAttributes> {
    fn table(&self) -> Table {
        let mut table = Table::new(ASSET_HEADERS);
        for asset in &self.data {
            table.row(asset_row(&asset.id, asset.attributes.as_ref()));
        }
        table
    }
}

impl TableRows for SingleResponse<AssetAttributes> {
    fn table(&self) -> Table {
        Table::new(ASSET_HEADERS).with_row(asset_row(&self.data.id, self.data.attributes.as_ref()))
    }
}

impl TableRows for ListResponse<MediaSetAttributes> {
    fn table(&self) -> Table {
        let mut table = Table::new(["ID", "Type"]);
        for set in &self.data {
            let attrs = set.attributes.clone().unwrap_or_default();
            table.row([
                set.id.clone(),
                attrs
                    .screenshot_display_type
                    .or(attrs.preview_type)
                    .unwrap_or_default(),
            ]);
        }
        table
    }
}

impl TableRows for SingleResponse<MediaSetAttributes> {
    fn table(&self) -> Table {
        let attrs = self.data.attributes.clone().unwrap_or_default();
        Table::new(["ID", "Type"]).with_row([
            self.data.id.clone(),
            attrs
                .screenshot_display_type
                .or(attrs.preview_type)
                .unwrap_or_default(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_mime_from_extension() {
        assert_eq!(preview_mime_type(Path::new("a.MOV")).unwrap(), "video/quicktime");
        assert_eq!(preview_mime_type(Path::new("a.mp4")).unwrap(), "video/mp4");
        assert!(preview_mime_type(Path::new("a.gif")).is_err());
    }

    #[test]
    fn delivery_state_from_nested_object() {
        let attrs: AssetAttributes = serde_json::from_value(json!({
            "fileName": "a.png",
            "assetDeliveryState": {"state": "COMPLETE", "errors": []}
        }))
        .unwrap();
        assert_eq!(attrs.delivery_state(), "COMPLETE");
    }
}
