//! JSON:API query encoding and pagination cursor validation.

use std::collections::BTreeMap;

use url::{Url, form_urlencoded};

use crate::error::{AscError, Result};

/// Largest page size the API accepts.
pub const MAX_LIMIT: u32 = 200;

/// Query options for collection endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: u32,
    pub filters: BTreeMap<String, Vec<String>>,
    pub fields: BTreeMap<String, Vec<String>>,
    pub include: Vec<String>,
    pub sort: Vec<String>,
    pub next_url: Option<String>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn filter<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values = clean_values(values, false);
        if !values.is_empty() {
            self.filters.insert(name.to_string(), values);
        }
        self
    }

    /// Territory codes are always sent uppercase.
    pub fn territories<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values = clean_values(values, true);
        if !values.is_empty() {
            self.filters.insert("territory".to_string(), values);
        }
        self
    }

    pub fn fields<I, S>(mut self, resource_type: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values = clean_values(values, false);
        if !values.is_empty() {
            self.fields.insert(resource_type.to_string(), values);
        }
        self
    }

    pub fn include<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.include = clean_values(values, false);
        self
    }

    pub fn sort<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.sort = clean_values(values, false);
        self
    }

    pub fn next(mut self, url: impl Into<String>) -> Self {
        self.next_url = Some(url.into());
        self
    }

    /// The pagination cursor, if a non-blank one was supplied.
    pub fn cursor(&self) -> Option<&str> {
        non_blank(self.next_url.as_deref())
    }

    /// Encoded query string (no leading `?`). Keys are sorted.
    pub fn encode(&self) -> String {
        let mut pairs: BTreeMap<String, String> = BTreeMap::new();
        if self.limit > 0 {
            pairs.insert("limit".into(), self.limit.to_string());
        }
        for (name, values) in &self.filters {
            pairs.insert(format!("filter[{name}]"), values.join(","));
        }
        for (resource_type, values) in &self.fields {
            pairs.insert(format!("fields[{resource_type}]"), values.join(","));
        }
        if !self.include.is_empty() {
            pairs.insert("include".into(), self.include.join(","));
        }
        if !self.sort.is_empty() {
            pairs.insert("sort".into(), self.sort.join(","));
        }
        encode_pairs(&pairs)
    }
}

/// Query options for `/relationships/` linkage endpoints. These accept only a
/// page size and a cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkagesQuery {
    pub limit: u32,
    pub next_url: Option<String>,
}

impl LinkagesQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn next(mut self, url: impl Into<String>) -> Self {
        self.next_url = Some(url.into());
        self
    }

    pub fn cursor(&self) -> Option<&str> {
        non_blank(self.next_url.as_deref())
    }

    pub fn encode(&self) -> String {
        let mut pairs = BTreeMap::new();
        if self.limit > 0 {
            pairs.insert("limit".to_string(), self.limit.to_string());
        }
        encode_pairs(&pairs)
    }
}

/// Which query parameters an endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuerySupport {
    pub endpoint: &'static str,
    pub limit: bool,
}

impl QuerySupport {
    pub const fn full(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            limit: true,
        }
    }

    pub const fn without_limit(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            limit: false,
        }
    }

    pub fn check_limit(&self, limit: u32) -> Result<()> {
        if limit > 0 && !self.limit {
            return Err(AscError::UnsupportedParameter(format!(
                "{} does not support limit",
                self.endpoint
            )));
        }
        if limit > MAX_LIMIT {
            return Err(AscError::InvalidArgument(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        Ok(())
    }
}

/// Accepts a cursor only if it is `https`, targets an allowed host and stays
/// under `/v1/` or `/v2/`.
pub fn validate_next_url(raw: &str, allowed_hosts: &[String]) -> Result<Url> {
    let raw = raw.trim();
    let url = Url::parse(raw).map_err(|e| AscError::InvalidNextUrl(format!("{raw}: {e}")))?;
    if url.scheme() != "https" {
        return Err(AscError::InvalidNextUrl(format!(
            "{raw}: scheme must be https"
        )));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(AscError::InvalidNextUrl(format!(
            "{raw}: credentials are not allowed"
        )));
    }
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if !allowed_hosts.iter().any(|allowed| allowed == &host) {
        return Err(AscError::InvalidNextUrl(format!(
            "{raw}: host {host:?} is not allowed"
        )));
    }
    if url.port().is_some_and(|p| p != 443) {
        return Err(AscError::InvalidNextUrl(format!(
            "{raw}: unexpected port"
        )));
    }
    let path = url.path();
    if !(path.starts_with("/v1/") || path.starts_with("/v2/")) {
        return Err(AscError::InvalidNextUrl(format!(
            "{raw}: path must start with /v1/ or /v2/"
        )));
    }
    Ok(url)
}

/// Appends an encoded query to a path.
pub fn with_query(path: &str, query: &str) -> String {
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    }
}

/// Splits a comma-separated flag value, trimming entries and dropping empties.
pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn split_csv_upper(value: &str) -> Vec<String> {
    split_csv(value)
        .into_iter()
        .map(|s| s.to_ascii_uppercase())
        .collect()
}

fn clean_values<I, S>(values: I, upper: bool) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .flat_map(|v| split_csv(v.as_ref()))
        .map(|v| if upper { v.to_ascii_uppercase() } else { v })
        .collect()
}

/// Form-encodes `pairs` in iteration order.
pub(crate) fn encode_pairs<I, K, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key.as_ref(), value.as_ref());
    }
    serializer.finish()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
