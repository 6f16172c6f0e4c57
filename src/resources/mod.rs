//! Per-endpoint operations. Every method trims its IDs, builds a path and
//! funnels through [`crate::Client`].

pub mod apps;
pub mod assets;
pub mod bundle_ids;
pub mod reports;
pub mod webhooks;
pub mod xcode_cloud;

pub use apps::AppAttributes;
pub use bundle_ids::{BundleIdAttributes, ProfileAttributes};
pub use webhooks::{
    WebhookAttributes, WebhookCreateAttributes, WebhookDeliveryAttributes,
    WebhookUpdateAttributes,
};
