use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    client::{Client, require_id},
    envelope::{CreateRequest, ListResponse, ResourceRef, SingleResponse, UpdateRequest},
    error::{AscError, Result},
    query::{ListQuery, QuerySupport},
    render::{Table, TableRows, opt_text},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookCreateAttributes {
    pub enabled: bool,
    pub event_types: Vec<String>,
    pub name: String,
    pub secret: String,
    pub url: String,
}

/// Only the fields that are `Some` are sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookUpdateAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl WebhookUpdateAttributes {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDeliveryAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redelivery: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

fn validate_create(attrs: &WebhookCreateAttributes) -> Result<()> {
    if attrs.name.trim().is_empty() {
        return Err(AscError::InvalidArgument("webhook name is required".into()));
    }
    if attrs.url.trim().is_empty() {
        return Err(AscError::InvalidArgument("webhook URL is required".into()));
    }
    if attrs.event_types.iter().all(|e| e.trim().is_empty()) {
        return Err(AscError::InvalidArgument(
            "at least one webhook event type is required".into(),
        ));
    }
    Ok(())
}

impl Client {
    pub async fn list_app_webhooks(
        &self,
        app_id: &str,
        query: &ListQuery,
    ) -> Result<ListResponse<WebhookAttributes>> {
        let app_id = require_id(app_id, "app ID")?;
        self.list_page(
            &format!("/v1/apps/{app_id}/webhooks"),
            query,
            QuerySupport::full("appWebhooks"),
        )
        .await
    }

    pub async fn get_webhook(&self, webhook_id: &str) -> Result<SingleResponse<WebhookAttributes>> {
        let webhook_id = require_id(webhook_id, "webhook ID")?;
        self.get_json(&format!("/v1/webhooks/{webhook_id}")).await
    }

    pub async fn create_webhook(
        &self,
        app_id: &str,
        attributes: WebhookCreateAttributes,
    ) -> Result<SingleResponse<WebhookAttributes>> {
        let app_id = require_id(app_id, "app ID")?;
        validate_create(&attributes)?;
        let body = CreateRequest::new("webhooks", attributes)
            .relationship("app", ResourceRef::new("apps", app_id));
        self.post_json("/v1/webhooks", &body).await
    }

    pub async fn update_webhook(
        &self,
        webhook_id: &str,
        attributes: WebhookUpdateAttributes,
    ) -> Result<SingleResponse<WebhookAttributes>> {
        let webhook_id = require_id(webhook_id, "webhook ID")?;
        if attributes.is_empty() {
            return Err(AscError::InvalidArgument(
                "at least one webhook field must be updated".into(),
            ));
        }
        let body = UpdateRequest::new("webhooks", webhook_id.clone(), Some(attributes));
        self.patch_json(&format!("/v1/webhooks/{webhook_id}"), &body)
            .await
    }

    pub async fn delete_webhook(&self, webhook_id: &str) -> Result<()> {
        let webhook_id = require_id(webhook_id, "webhook ID")?;
        self.delete(&format!("/v1/webhooks/{webhook_id}")).await
    }

    pub async fn list_webhook_deliveries(
        &self,
        webhook_id: &str,
        query: &ListQuery,
    ) -> Result<ListResponse<WebhookDeliveryAttributes>> {
        let webhook_id = require_id(webhook_id, "webhook ID")?;
        self.list_page(
            &format!("/v1/webhooks/{webhook_id}/deliveries"),
            query,
            QuerySupport::full("webhookDeliveries"),
        )
        .await
    }

    /// Re-sends a past delivery using it as the template.
    pub async fn redeliver_webhook_delivery(
        &self,
        delivery_id: &str,
    ) -> Result<SingleResponse<WebhookDeliveryAttributes>> {
        let delivery_id = require_id(delivery_id, "delivery ID")?;
        let body = json!({
            "data": {
                "type": "webhookDeliveries",
                "relationships": {
                    "template": {"data": ResourceRef::new("webhookDeliveries", delivery_id)}
                }
            }
        });
        self.post_json("/v1/webhookDeliveries", &body).await
    }

    pub async fn ping_webhook(&self, webhook_id: &str) -> Result<SingleResponse<Value>> {
        let webhook_id = require_id(webhook_id, "webhook ID")?;
        let body = json!({
            "data": {
                "type": "webhookPings",
                "relationships": {
                    "webhook": {"data": ResourceRef::new("webhooks", webhook_id)}
                }
            }
        });
        self.post_json("/v1/webhookPings", &body).await
    }
}

const WEBHOOK_HEADERS: [&str; 5] = ["ID", "Name", "Enabled", "URL", "Events"];

fn webhook_row(id: &str, attrs: Option<&WebhookAttributes>) -> Vec<String> {
    let attrs = attrs.cloned().unwrap_or_default();
    vec![
        id.to_string(),
        opt_text(&attrs.name),
        opt_text(&attrs.enabled),
        opt_text(&attrs.url),
        attrs.event_types.join(","),
    ]
}

impl TableRows for ListResponse<WebhookAttributes> {
    fn table(&self) -> Table {
        let mut table = Table::new(WEBHOOK_HEADERS);
        for hook in &self.data {
            table.row(webhook_row(&hook.id, hook.attributes.as_ref()));
        }
        table
    }
}

impl TableRows for SingleResponse<WebhookAttributes> {
    fn table(&self) -> Table {
        Table::new(WEBHOOK_HEADERS)
            .with_row(webhook_row(&self.data.id, self.data.attributes.as_ref()))
    }
}

const DELIVERY_HEADERS: [&str; 5] = ["ID", "State", "Created", "Sent", "Error"];

fn delivery_row(id: &str, attrs: Option<&WebhookDeliveryAttributes>) -> Vec<String> {
    let attrs = attrs.cloned().unwrap_or_default();
    vec![
        id.to_string(),
        opt_text(&attrs.delivery_state),
        opt_text(&attrs.created_date),
        opt_text(&attrs.sent_date),
        opt_text(&attrs.error_message),
    ]
}

impl TableRows for ListResponse<WebhookDeliveryAttributes> {
    fn table(&self) -> Table {
        let mut table = Table::new(DELIVERY_HEADERS);
        for delivery in &self.data {
            table.row(delivery_row(&delivery.id, delivery.attributes.as_ref()));
        }
        table
    }
}

impl TableRows for SingleResponse<WebhookDeliveryAttributes> {
    fn table(&self) -> Table {
        Table::new(DELIVERY_HEADERS)
            .with_row(delivery_row(&self.data.id, self.data.attributes.as_ref()))
    }
}
