use serde::{Deserialize, Serialize};

use crate::{
    client::{Client, require_id},
    envelope::{LinkageResponse, LinkagesResponse, ListResponse, SingleResponse},
    error::Result,
    query::{LinkagesQuery, ListQuery, QuerySupport},
    render::{Table, TableRows, opt_text},
    resources::AppAttributes,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleIdAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
}

/// The capabilities linkage endpoint rejects `limit`.
pub const CAPABILITIES_RELATIONSHIP: QuerySupport =
    QuerySupport::without_limit("bundleIdCapabilities relationship");
pub const PROFILES_RELATIONSHIP: QuerySupport = QuerySupport::full("profiles relationship");

impl Client {
    pub async fn list_bundle_ids(&self, query: &ListQuery) -> Result<ListResponse<BundleIdAttributes>> {
        self.list_page("/v1/bundleIds", query, QuerySupport::full("bundleIds"))
            .await
    }

    pub async fn get_bundle_id(&self, bundle_id: &str) -> Result<SingleResponse<BundleIdAttributes>> {
        let bundle_id = require_id(bundle_id, "bundle ID")?;
        self.get_json(&format!("/v1/bundleIds/{bundle_id}")).await
    }

    pub async fn get_bundle_id_app(&self, bundle_id: &str) -> Result<SingleResponse<AppAttributes>> {
        let bundle_id = require_id(bundle_id, "bundle ID")?;
        self.get_json(&format!("/v1/bundleIds/{bundle_id}/app")).await
    }

    /// Linkage of the app owning a bundle ID, without its attributes.
    pub async fn get_bundle_id_app_relationship(&self, bundle_id: &str) -> Result<LinkageResponse> {
        let bundle_id = require_id(bundle_id, "bundle ID")?;
        self.get_json(&format!("/v1/bundleIds/{bundle_id}/relationships/app"))
            .await
    }

    pub async fn get_bundle_id_profiles(
        &self,
        bundle_id: &str,
        query: &ListQuery,
    ) -> Result<ListResponse<ProfileAttributes>> {
        let bundle_id = require_id(bundle_id, "bundle ID")?;
        self.list_page(
            &format!("/v1/bundleIds/{bundle_id}/profiles"),
            query,
            QuerySupport::full("bundleIdProfiles"),
        )
        .await
    }

    pub async fn get_bundle_id_capabilities_relationships(
        &self,
        bundle_id: &str,
        query: &LinkagesQuery,
    ) -> Result<LinkagesResponse> {
        CAPABILITIES_RELATIONSHIP.check_limit(query.limit)?;
        let bundle_id = require_id(bundle_id, "bundle ID")?;
        self.linkages_page(
            &format!("/v1/bundleIds/{bundle_id}/relationships/bundleIdCapabilities"),
            query,
            CAPABILITIES_RELATIONSHIP,
        )
        .await
    }

    pub async fn get_bundle_id_profiles_relationships(
        &self,
        bundle_id: &str,
        query: &LinkagesQuery,
    ) -> Result<LinkagesResponse> {
        let bundle_id = require_id(bundle_id, "bundle ID")?;
        self.linkages_page(
            &format!("/v1/bundleIds/{bundle_id}/relationships/profiles"),
            query,
            PROFILES_RELATIONSHIP,
        )
        .await
    }
}

impl TableRows for ListResponse<BundleIdAttributes> {
    fn table(&self) -> Table {
        let mut table = Table::new(["ID", "Name", "Identifier", "Platform"]);
        for bundle in &self.data {
            let attrs = bundle.attributes.clone().unwrap_or_default();
            table.row([
                bundle.id.clone(),
                opt_text(&attrs.name),
                opt_text(&attrs.identifier),
                opt_text(&attrs.platform),
            ]);
        }
        table
    }
}

impl TableRows for SingleResponse<BundleIdAttributes> {
    fn table(&self) -> Table {
        let attrs = self.data.attributes.clone().unwrap_or_default();
        Table::new(["ID", "Name", "Identifier", "Platform"]).with_row([
            self.data.id.clone(),
            opt_text(&attrs.name),
            opt_text(&attrs.identifier),
            opt_text(&attrs.platform),
        ])
    }
}

impl TableRows for ListResponse<ProfileAttributes> {
    fn table(&self) -> Table {
        let mut table = Table::new(["ID", "Name", "Type", "State", "Expires"]);
        for profile in &self.data {
            let attrs = profile.attributes.clone().unwrap_or_default();
            table.row([
                profile.id.clone(),
                opt_text(&attrs.name),
                opt_text(&attrs.profile_type),
                opt_text(&attrs.profile_state),
                opt_text(&attrs.expiration_date),
            ]);
        }
        table
    }
}
