//! JSON:API document shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Links {
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<String>,
}

impl Links {
    /// `links.next`, treating a blank string as absent.
    pub fn next_url(&self) -> Option<&str> {
        self.next.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// `{type, id}` reference to another resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

impl ResourceRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Linkage {
    Many(Vec<ResourceRef>),
    One(ResourceRef),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Linkage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// A resource object with a caller-chosen attribute shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(bound(deserialize = "A: Deserialize<'de>"))]
pub struct Resource<A = Value> {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<A>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

impl<A> Resource<A> {
    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(&self.kind, &self.id)
    }

    /// ID of a to-one relationship target.
    pub fn related_id(&self, name: &str) -> Option<&str> {
        match self.relationships.get(name)?.data.as_ref()? {
            Linkage::One(r) => Some(r.id.as_str()),
            Linkage::Many(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Paging {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub limit: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PagingInformation {
    pub paging: Paging,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListResponse<A = Value> {
    pub data: Vec<Resource<A>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included: Option<Vec<Value>>,
    #[serde(default)]
    pub links: Links,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl<A> Default for ListResponse<A> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            included: None,
            links: Links::default(),
            meta: None,
        }
    }
}

impl<A> ListResponse<A> {
    pub fn next_url(&self) -> Option<&str> {
        self.links.next_url()
    }

    pub fn paging(&self) -> Option<PagingInformation> {
        self.meta
            .as_ref()
            .and_then(|m| serde_json::from_value(m.clone()).ok())
    }

    /// Decodes the included resources of one type, skipping the rest.
    pub fn included_of_type<T: DeserializeOwned>(&self, kind: &str) -> Result<Vec<Resource<T>>> {
        included_of_type(self.included.as_deref(), kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SingleResponse<A = Value> {
    pub data: Resource<A>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included: Option<Vec<Value>>,
    #[serde(default)]
    pub links: Links,
}

impl<A> SingleResponse<A> {
    pub fn included_of_type<T: DeserializeOwned>(&self, kind: &str) -> Result<Vec<Resource<T>>> {
        included_of_type(self.included.as_deref(), kind)
    }
}

/// Response of a to-many `/relationships/` endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LinkagesResponse {
    pub data: Vec<ResourceRef>,
    #[serde(default)]
    pub links: Links,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Response of a to-one `/relationships/` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkageResponse {
    pub data: Option<ResourceRef>,
    #[serde(default)]
    pub links: Links,
}

fn included_of_type<T: DeserializeOwned>(
    included: Option<&[Value]>,
    kind: &str,
) -> Result<Vec<Resource<T>>> {
    let mut out = Vec::new();
    for item in included.unwrap_or_default() {
        if item.get("type").and_then(Value::as_str) == Some(kind) {
            out.push(serde_json::from_value(item.clone())?);
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToOne {
    pub data: ResourceRef,
}

/// `POST` body: `{"data": {"type", "attributes", "relationships"}}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateRequest<A> {
    pub data: CreateData<A>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateData<A> {
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: A,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, ToOne>,
}

impl<A> CreateRequest<A> {
    pub fn new(kind: impl Into<String>, attributes: A) -> Self {
        Self {
            data: CreateData {
                kind: kind.into(),
                attributes,
                relationships: BTreeMap::new(),
            },
        }
    }

    pub fn relationship(mut self, name: &str, target: ResourceRef) -> Self {
        self.data
            .relationships
            .insert(name.to_string(), ToOne { data: target });
        self
    }
}

/// `PATCH` body: `{"data": {"type", "id", "attributes"?}}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UpdateRequest<A> {
    pub data: UpdateData<A>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UpdateData<A> {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<A>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, ToOne>,
}

impl<A> UpdateRequest<A> {
    pub fn new(kind: impl Into<String>, id: impl Into<String>, attributes: Option<A>) -> Self {
        Self {
            data: UpdateData {
                kind: kind.into(),
                id: id.into(),
                attributes,
                relationships: BTreeMap::new(),
            },
        }
    }
}

/// Replacement body for a to-many relationship.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RelationshipRequest {
    pub data: Vec<ResourceRef>,
}

impl RelationshipRequest {
    pub fn new<I>(kind: &str, ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self {
            data: ids
                .into_iter()
                .map(|id| id.as_ref().trim().to_string())
                .filter(|id| !id.is_empty())
                .map(|id| ResourceRef::new(kind, id))
                .collect(),
        }
    }
}
