use std::{future::Future, sync::Arc, time::Instant};

use reqwest::{
    Method,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use serde::{Serialize, de::DeserializeOwned};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::{
    auth::TokenMinter,
    config::{ClientConfig, Credentials},
    debug::{self, DebugSettings},
    envelope::{LinkagesResponse, ListResponse},
    error::{ApiError, AscError, Result},
    query::{LinkagesQuery, ListQuery, QuerySupport, validate_next_url, with_query},
};

enum Auth {
    Minter(TokenMinter),
    Static(String),
}

struct Inner {
    http: reqwest::Client,
    config: ClientConfig,
    auth: Auth,
}

/// App Store Connect API client. Cheap to clone; clones share the connection
/// pool and token cache.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
    cancel: CancellationToken,
}

impl Client {
    pub fn new(credentials: Credentials, config: ClientConfig) -> Result<Self> {
        let minter = TokenMinter::new(&credentials)?;
        Self::build(Auth::Minter(minter), config)
    }

    /// Client that sends a pre-minted bearer token instead of signing its own.
    pub fn with_static_token(token: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(AscError::Configuration("static token is empty".into()));
        }
        Self::build(Auth::Static(token.trim().to_string()), config)
    }

    fn build(auth: Auth, config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .use_rustls_tls()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build()
            .map_err(|e| AscError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            inner: Arc::new(Inner { http, config, auth }),
            cancel: CancellationToken::new(),
        })
    }

    /// Handle whose operations abort once `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            cancel: token,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub fn debug_settings(&self) -> DebugSettings {
        self.inner.config.debug.unwrap_or_else(debug::resolve)
    }

    pub async fn bearer(&self) -> Result<String> {
        match &self.inner.auth {
            Auth::Static(token) => Ok(token.clone()),
            Auth::Minter(minter) => minter.token().await,
        }
    }

    /// Races `fut` against this handle's cancellation token.
    pub(crate) async fn cancellable<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(AscError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AscError::Cancelled),
            result = fut => result,
        }
    }

    /// Relative paths are joined onto the base URL; absolute URLs must pass the
    /// `nextURL` allow-list because they receive the bearer token.
    pub fn resolve_url(&self, path_or_url: &str) -> Result<Url> {
        let trimmed = path_or_url.trim();
        if trimmed.is_empty() {
            return Err(AscError::InvalidArgument("request path is empty".into()));
        }
        if trimmed.contains("://") {
            let url = validate_next_url(trimmed, &self.inner.config.allowed_next_hosts)?;
            return self.route_to_origin(url);
        }
        let path = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        Ok(self.inner.config.base_url.join(&path)?)
    }

    fn route_to_origin(&self, url: Url) -> Result<Url> {
        let Some(origin) = &self.inner.config.cursor_origin else {
            return Ok(url);
        };
        let mut routed = origin.join(url.path())?;
        routed.set_query(url.query());
        Ok(routed)
    }

    /// Drops the cached token after a `401 NOT_AUTHORIZED`. Returns whether a
    /// retry with a fresh token makes sense; static tokens never do.
    pub(crate) async fn reauthorize(&self, err: &AscError, url: &Url) -> bool {
        let AscError::Api(api) = err else {
            return false;
        };
        let Auth::Minter(minter) = &self.inner.auth else {
            return false;
        };
        if !api.is_not_authorized() {
            return false;
        }
        warn!(url = %debug::sanitize_url(url), "token rejected, minting a new one");
        minter.invalidate().await;
        true
    }

    /// Sends one request and returns the raw success body. A `401 NOT_AUTHORIZED`
    /// re-mints the token and retries once; nothing else is retried.
    pub async fn execute(
        &self,
        method: Method,
        path_or_url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>> {
        let url = self.resolve_url(path_or_url)?;
        let settings = self.debug_settings();
        let mut retried = false;

        loop {
            let bearer = self.bearer().await?;
            let mut builder = self
                .inner
                .http
                .request(method.clone(), url.clone())
                .header(AUTHORIZATION, format!("Bearer {bearer}"))
                .header(ACCEPT, "application/json");
            if let Some(body) = &body {
                builder = builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone());
            }
            let request = builder.build()?;

            if settings.enabled {
                debug!(method = %method, url = %debug::sanitize_url(&url), "request");
            }
            if settings.verbose_http {
                debug!(
                    "{}",
                    debug::dump_request(
                        method.as_str(),
                        &url,
                        request.headers(),
                        body.as_deref()
                    )
                );
            }

            let started = Instant::now();
            let response = self
                .cancellable(async { Ok::<_, AscError>(self.inner.http.execute(request).await?) })
                .await?;
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = self
                .cancellable(async { Ok::<_, AscError>(response.bytes().await?.to_vec()) })
                .await?;

            if settings.enabled {
                debug!(
                    method = %method,
                    url = %debug::sanitize_url(&url),
                    status = status.as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    bytes = bytes.len(),
                    "response"
                );
            }
            if settings.verbose_http {
                debug!(
                    "{}",
                    debug::dump_response(status.as_u16(), &url, &headers, &bytes)
                );
            }

            if status.is_success() {
                return Ok(bytes);
            }

            let err = classify_failure(status.as_u16(), &bytes);
            if !retried && self.reauthorize(&err, &url).await {
                retried = true;
                continue;
            }
            return Err(err);
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path_or_url: &str) -> Result<T> {
        let bytes = self.execute(Method::GET, path_or_url, None).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)?;
        let bytes = self.execute(Method::POST, path, Some(payload)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)?;
        let bytes = self.execute(Method::PATCH, path, Some(payload)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// PATCH whose success response has no body, as relationship replacement does.
    pub async fn patch_no_content<B>(&self, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let payload = serde_json::to_vec(body)?;
        self.execute(Method::PATCH, path, Some(payload)).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// One page of a collection endpoint. A cursor in `query` replaces `path`
    /// and every other option.
    pub async fn list_page<A: DeserializeOwned>(
        &self,
        path: &str,
        query: &ListQuery,
        support: QuerySupport,
    ) -> Result<ListResponse<A>> {
        support.check_limit(query.limit)?;
        match query.cursor() {
            Some(next) => {
                let url = validate_next_url(next, &self.inner.config.allowed_next_hosts)?;
                self.get_json(url.as_str()).await
            }
            None => self.get_json(&with_query(path, &query.encode())).await,
        }
    }

    /// One page of a to-many `/relationships/` endpoint.
    pub async fn linkages_page(
        &self,
        path: &str,
        query: &LinkagesQuery,
        support: QuerySupport,
    ) -> Result<LinkagesResponse> {
        support.check_limit(query.limit)?;
        match query.cursor() {
            Some(next) => {
                let url = validate_next_url(next, &self.inner.config.allowed_next_hosts)?;
                self.get_json(url.as_str()).await
            }
            None => self.get_json(&with_query(path, &query.encode())).await,
        }
    }
}

pub(crate) fn classify_failure(status: u16, body: &[u8]) -> AscError {
    match ApiError::from_body(status, body) {
        Some(api) => AscError::Api(api),
        None => AscError::transport_status(status, body),
    }
}

/// Trims an ID and rejects blank ones.
pub(crate) fn require_id(value: &str, what: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AscError::InvalidArgument(format!("{what} is required")));
    }
    Ok(trimmed.to_string())
}
