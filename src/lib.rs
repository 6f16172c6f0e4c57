//! App Store Connect API client.
//!
//! [`Client`] signs every request with a cached ES256 token, executes it with
//! debug logging and error mapping, and exposes typed resource operations in
//! [`resources`]. Pagination, chunked asset uploads and report downloads are
//! layered on the same client.

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod debug;
pub mod download;
pub mod envelope;
pub mod error;
pub mod pagination;
pub mod query;
pub mod render;
pub mod resources;
pub mod upload;

pub use auth::TokenMinter;
pub use client::Client;
pub use config::{ClientConfig, Credentials};
pub use debug::DebugSettings;
pub use download::{DownloadRequest, DownloadResult};
pub use envelope::{
    LinkageResponse, LinkagesResponse, ListResponse, Resource, ResourceRef, SingleResponse,
};
pub use error::{ApiError, AscError, Result};
pub use query::{LinkagesQuery, ListQuery};
pub use render::{OutputFormat, TableRows};
pub use upload::{AssetUploadResult, UploadOperation};
