//! Xcode Cloud products, workflows, build runs and artifacts.

use std::{cmp::Ordering, path::PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::{
    client::{Client, require_id},
    download::{DownloadRequest, DownloadResult},
    envelope::{ListResponse, Resource, ResourceRef, SingleResponse},
    error::{AscError, Result},
    query::{ListQuery, QuerySupport, with_query},
    render::{Table, TableRows, opt_text},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CiProductAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CiWorkflowAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CiBuildRunAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_progress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl CiBuildRunAttributes {
    /// Most specific status available: result, then progress, then the
    /// completion and generic status fields.
    pub fn display_status(&self) -> &str {
        self.build_result
            .as_deref()
            .or(self.execution_progress.as_deref())
            .or(self.completion_status.as_deref())
            .or(self.status.as_deref())
            .unwrap_or("UNKNOWN")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CiBuildActionAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_progress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CiArtifactAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitReferenceAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl GitReferenceAttributes {
    pub fn is_branch(&self) -> bool {
        self.canonical_name.as_deref().is_some_and(|name| {
            name.starts_with("refs/heads/") || name.starts_with("heads/") || name.contains("/heads/")
        })
    }
}

/// Newest first by `createdDate`; runs without a date sort last, ties by ID
/// descending.
pub fn compare_runs_desc(
    a: &Resource<CiBuildRunAttributes>,
    b: &Resource<CiBuildRunAttributes>,
) -> Ordering {
    let created = |r: &Resource<CiBuildRunAttributes>| {
        r.attributes.as_ref().and_then(|a| a.created_date.clone())
    };
    match (created(a), created(b)) {
        (Some(x), Some(y)) if x != y => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => b.id.cmp(&a.id),
    }
}

impl Client {
    pub async fn list_ci_products(&self, query: &ListQuery) -> Result<ListResponse<CiProductAttributes>> {
        self.list_page("/v1/ciProducts", query, QuerySupport::full("ciProducts"))
            .await
    }

    pub async fn list_workflows(
        &self,
        product_id: &str,
        query: &ListQuery,
    ) -> Result<ListResponse<CiWorkflowAttributes>> {
        let product_id = require_id(product_id, "product ID")?;
        self.list_page(
            &format!("/v1/ciProducts/{product_id}/workflows"),
            query,
            QuerySupport::full("ciWorkflows"),
        )
        .await
    }

    pub async fn get_workflow(&self, workflow_id: &str) -> Result<SingleResponse<CiWorkflowAttributes>> {
        let workflow_id = require_id(workflow_id, "workflow ID")?;
        self.get_json(&format!("/v1/ciWorkflows/{workflow_id}")).await
    }

    pub async fn list_build_runs(
        &self,
        workflow_id: &str,
        query: &ListQuery,
    ) -> Result<ListResponse<CiBuildRunAttributes>> {
        let workflow_id = require_id(workflow_id, "workflow ID")?;
        self.list_page(
            &format!("/v1/ciWorkflows/{workflow_id}/buildRuns"),
            query,
            QuerySupport::full("ciBuildRuns"),
        )
        .await
    }

    pub async fn get_build_run(&self, run_id: &str) -> Result<SingleResponse<CiBuildRunAttributes>> {
        let run_id = require_id(run_id, "build run ID")?;
        self.get_json(&format!("/v1/ciBuildRuns/{run_id}")).await
    }

    /// Starts a run of `workflow_id` on the given git reference.
    pub async fn start_build_run(
        &self,
        workflow_id: &str,
        git_reference_id: &str,
    ) -> Result<SingleResponse<CiBuildRunAttributes>> {
        let workflow_id = require_id(workflow_id, "workflow ID")?;
        let git_reference_id = require_id(git_reference_id, "git reference ID")?;
        let body = json!({
            "data": {
                "type": "ciBuildRuns",
                "relationships": {
                    "workflow": {"data": ResourceRef::new("ciWorkflows", &workflow_id)},
                    "sourceBranchOrTag": {"data": ResourceRef::new("scmGitReferences", git_reference_id)}
                }
            }
        });
        let run: SingleResponse<CiBuildRunAttributes> =
            self.post_json("/v1/ciBuildRuns", &body).await?;
        info!(workflow = %workflow_id, run = %run.data.id, "build run started");
        Ok(run)
    }

    pub async fn list_build_actions(
        &self,
        run_id: &str,
        query: &ListQuery,
    ) -> Result<ListResponse<CiBuildActionAttributes>> {
        let run_id = require_id(run_id, "build run ID")?;
        self.list_page(
            &format!("/v1/ciBuildRuns/{run_id}/actions"),
            query,
            QuerySupport::full("ciBuildActions"),
        )
        .await
    }

    pub async fn list_artifacts(
        &self,
        action_id: &str,
        query: &ListQuery,
    ) -> Result<ListResponse<CiArtifactAttributes>> {
        let action_id = require_id(action_id, "build action ID")?;
        self.list_page(
            &format!("/v1/ciBuildActions/{action_id}/artifacts"),
            query,
            QuerySupport::full("ciArtifacts"),
        )
        .await
    }

    pub async fn get_artifact(&self, artifact_id: &str) -> Result<SingleResponse<CiArtifactAttributes>> {
        let artifact_id = require_id(artifact_id, "artifact ID")?;
        self.get_json(&format!("/v1/ciArtifacts/{artifact_id}")).await
    }

    /// Looks up the artifact and streams its pre-signed download URL to
    /// `destination`. The expected size is not verified; the storage host
    /// supplies `Content-MD5` when it has one.
    pub async fn download_artifact(
        &self,
        artifact_id: &str,
        destination: impl Into<PathBuf>,
    ) -> Result<DownloadResult> {
        let artifact = self.get_artifact(artifact_id).await?;
        let url = artifact
            .data
            .attributes
            .as_ref()
            .and_then(|a| a.download_url.clone())
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                AscError::InvalidArgument(format!(
                    "artifact {} does not expose a download URL",
                    artifact.data.id
                ))
            })?;
        self.download(&DownloadRequest::new(url, destination).pre_signed())
            .await
    }

    /// Repository ID linked to a workflow, if any.
    pub async fn workflow_repository_id(&self, workflow_id: &str) -> Result<Option<String>> {
        let workflow_id = require_id(workflow_id, "workflow ID")?;
        let repository: SingleResponse<serde_json::Value> = match self
            .get_json(&format!("/v1/ciWorkflows/{workflow_id}/repository"))
            .await
        {
            Ok(repository) => repository,
            Err(AscError::Api(err)) if err.status == 404 => {
                debug!(workflow = %workflow_id, "workflow has no repository");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        Ok(Some(repository.data.id))
    }

    pub async fn list_git_references(
        &self,
        repository_id: &str,
        query: &ListQuery,
    ) -> Result<ListResponse<GitReferenceAttributes>> {
        let repository_id = require_id(repository_id, "repository ID")?;
        self.list_page(
            &format!("/v1/scmRepositories/{repository_id}/gitReferences"),
            query,
            QuerySupport::full("scmGitReferences"),
        )
        .await
    }

    /// Every non-deleted branch of a repository, across all pages.
    pub async fn list_branches(
        &self,
        repository_id: &str,
    ) -> Result<Vec<Resource<GitReferenceAttributes>>> {
        let repository_id = require_id(repository_id, "repository ID")?;
        let path = with_query(
            &format!("/v1/scmRepositories/{repository_id}/gitReferences"),
            "limit=200",
        );
        let first: ListResponse<GitReferenceAttributes> = self.get_json(&path).await?;
        let all = self.paginate_from(first, None).await?;
        Ok(all
            .data
            .into_iter()
            .filter(|r| {
                r.attributes
                    .as_ref()
                    .is_some_and(|a| a.is_branch() && a.is_deleted != Some(true))
            })
            .collect())
    }

    /// Resolves a branch by short name (`main`) or canonical name
    /// (`refs/heads/main`) in the workflow's repository.
    pub async fn find_workflow_branch(
        &self,
        workflow_id: &str,
        branch: &str,
    ) -> Result<Resource<GitReferenceAttributes>> {
        let branch = require_id(branch, "branch")?;
        let repository_id = self.workflow_repository_id(workflow_id).await?.ok_or_else(|| {
            AscError::InvalidArgument(format!("workflow {} has no repository", workflow_id.trim()))
        })?;
        self.list_branches(&repository_id)
            .await?
            .into_iter()
            .find(|r| {
                r.attributes.as_ref().is_some_and(|a| {
                    a.name.as_deref() == Some(branch.as_str())
                        || a.canonical_name.as_deref() == Some(branch.as_str())
                })
            })
            .ok_or_else(|| AscError::InvalidArgument(format!("branch {branch:?} not found")))
    }
}

impl TableRows for ListResponse<CiProductAttributes> {
    fn table(&self) -> Table {
        let mut table = Table::new(["ID", "Name", "Type"]);
        for product in &self.data {
            let attrs = product.attributes.clone().unwrap_or_default();
            table.row([
                product.id.clone(),
                opt_text(&attrs.name),
                opt_text(&attrs.product_type),
            ]);
        }
        table
    }
}

impl TableRows for ListResponse<CiWorkflowAttributes> {
    fn table(&self) -> Table {
        let mut table = Table::new(["ID", "Name", "Enabled"]);
        for workflow in &self.data {
            let attrs = workflow.attributes.clone().unwrap_or_default();
            table.row([
                workflow.id.clone(),
                opt_text(&attrs.name),
                opt_text(&attrs.is_enabled),
            ]);
        }
        table
    }
}

impl TableRows for SingleResponse<CiWorkflowAttributes> {
    fn table(&self) -> Table {
        let attrs = self.data.attributes.clone().unwrap_or_default();
        Table::new(["ID", "Name", "Enabled"]).with_row([
            self.data.id.clone(),
            opt_text(&attrs.name),
            opt_text(&attrs.is_enabled),
        ])
    }
}

const RUN_HEADERS: [&str; 5] = ["ID", "Number", "Status", "Created", "Reason"];

fn run_row(run: &Resource<CiBuildRunAttributes>) -> Vec<String> {
    let attrs = run.attributes.clone().unwrap_or_default();
    vec![
        run.id.clone(),
        opt_text(&attrs.number),
        attrs.display_status().to_string(),
        opt_text(&attrs.created_date),
        opt_text(&attrs.start_reason),
    ]
}

impl TableRows for ListResponse<CiBuildRunAttributes> {
    fn table(&self) -> Table {
        let mut table = Table::new(RUN_HEADERS);
        for run in &self.data {
            table.row(run_row(run));
        }
        table
    }
}

impl TableRows for SingleResponse<CiBuildRunAttributes> {
    fn table(&self) -> Table {
        Table::new(RUN_HEADERS).with_row(run_row(&self.data))
    }
}

impl TableRows for ListResponse<CiBuildActionAttributes> {
    fn table(&self) -> Table {
        let mut table = Table::new(["ID", "Name", "Type", "Progress", "Status"]);
        for action in &self.data {
            let attrs = action.attributes.clone().unwrap_or_default();
            table.row([
                action.id.clone(),
                opt_text(&attrs.name),
                opt_text(&attrs.action_type),
                opt_text(&attrs.execution_progress),
                opt_text(&attrs.completion_status),
            ]);
        }
        table
    }
}

impl TableRows for ListResponse<CiArtifactAttributes> {
    fn table(&self) -> Table {
        let mut table = Table::new(["ID", "File Name", "Type", "Size"]);
        for artifact in &self.data {
            let attrs = artifact.attributes.clone().unwrap_or_default();
            table.row([
                artifact.id.clone(),
                opt_text(&attrs.file_name),
                opt_text(&attrs.file_type),
                opt_text(&attrs.file_size),
            ]);
        }
        table
    }
}

impl TableRows for Vec<Resource<GitReferenceAttributes>> {
    fn table(&self) -> Table {
        let mut table = Table::new(["ID", "Name", "Canonical Name"]);
        for reference in self {
            let attrs = reference.attributes.clone().unwrap_or_default();
            table.row([
                reference.id.clone(),
                opt_text(&attrs.name),
                opt_text(&attrs.canonical_name),
            ]);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(id: &str, created: Option<&str>) -> Resource<CiBuildRunAttributes> {
        Resource {
            kind: "ciBuildRuns".into(),
            id: id.into(),
            attributes: Some(CiBuildRunAttributes {
                created_date: created.map(str::to_string),
                ..Default::default()
            }),
            relationships: Default::default(),
            links: None,
        }
    }

    #[test]
    fn runs_sort_newest_first() {
        let mut runs = vec![
            run("1", Some("2024-01-01T00:00:00Z")),
            run("2", None),
            run("3", Some("2024-03-01T00:00:00Z")),
            run("4", None),
        ];
        runs.sort_by(compare_runs_desc);
        let ids: Vec<_> = runs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["3", "1", "4", "2"]);
    }

    #[test]
    fn status_prefers_build_result() {
        let attrs = CiBuildRunAttributes {
            build_result: Some("SUCCEEDED".into()),
            execution_progress: Some("COMPLETE".into()),
            ..Default::default()
        };
        assert_eq!(attrs.display_status(), "SUCCEEDED");
        let pending = CiBuildRunAttributes {
            execution_progress: Some("RUNNING".into()),
            ..Default::default()
        };
        assert_eq!(pending.display_status(), "RUNNING");
        assert_eq!(CiBuildRunAttributes::default().display_status(), "UNKNOWN");
    }

    #[test]
    fn branch_detection() {
        let branch = |name: &str| GitReferenceAttributes {
            canonical_name: Some(name.into()),
            ..Default::default()
        };
        assert!(branch("refs/heads/main").is_branch());
        assert!(!branch("refs/tags/v1.0").is_branch());
        assert!(!GitReferenceAttributes::default().is_branch());
    }
}
