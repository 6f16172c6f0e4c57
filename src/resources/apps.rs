use serde::{Deserialize, Serialize};

use crate::{
    client::{Client, require_id},
    envelope::{ListResponse, SingleResponse},
    error::Result,
    query::{ListQuery, QuerySupport},
    render::{Table, TableRows, opt_text},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_locale: Option<String>,
}

impl Client {
    pub async fn list_apps(&self, query: &ListQuery) -> Result<ListResponse<AppAttributes>> {
        self.list_page("/v1/apps", query, QuerySupport::full("apps"))
            .await
    }

    pub async fn get_app(&self, app_id: &str) -> Result<SingleResponse<AppAttributes>> {
        let app_id = require_id(app_id, "app ID")?;
        self.get_json(&format!("/v1/apps/{app_id}")).await
    }
}

const HEADERS: [&str; 5] = ["ID", "Name", "Bundle ID", "SKU", "Locale"];

fn app_row(id: &str, attrs: Option<&AppAttributes>) -> Vec<String> {
    let attrs = attrs.cloned().unwrap_or_default();
    vec![
        id.to_string(),
        opt_text(&attrs.name),
        opt_text(&attrs.bundle_id),
        opt_text(&attrs.sku),
        opt_text(&attrs.primary_locale),
    ]
}

impl TableRows for ListResponse<AppAttributes> {
    fn table(&self) -> Table {
        let mut table = Table::new(HEADERS);
        for app in &self.data {
            table.row(app_row(&app.id, app.attributes.as_ref()));
        }
        table
    }
}

impl TableRows for SingleResponse<AppAttributes> {
    fn table(&self) -> Table {
        Table::new(HEADERS).with_row(app_row(&self.data.id, self.data.attributes.as_ref()))
    }
}
