//! BigQuery REST (v2) warehouse backend
//!
//! Talks to the datasets, tables, and jobs endpoints with a bearer token.
//! Credential resolution is not handled here: the token comes from the
//! environment, typically `gcloud auth print-access-token`.

use crate::error::{DbError, DbResult};
use crate::sql::quote_bq_path;
use crate::traits::{DatasetInfo, TableInfo, TableKind, Warehouse};
use async_trait::async_trait;
use bqw_core::{DatasetName, DatasetRef, ProjectId, TableName};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Environment variables checked, in order, for an access token
pub const TOKEN_ENV_VARS: [&str; 2] = ["BQWIZARD_ACCESS_TOKEN", "GOOGLE_OAUTH_ACCESS_TOKEN"];

const QUERY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// BigQuery warehouse backend
pub struct BigQueryBackend {
    client: Client,
    api_root: String,
    token: String,
    default_project: Option<ProjectId>,
}

impl BigQueryBackend {
    /// Create a backend with an explicit access token
    pub fn new(
        api_root: &str,
        token: impl Into<String>,
        default_project: Option<ProjectId>,
        request_timeout: Duration,
    ) -> DbResult<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(DbError::Config("access token is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            client,
            api_root: api_root.trim_end_matches('/').to_string(),
            token,
            default_project,
        })
    }

    /// Create a backend reading the token from [`TOKEN_ENV_VARS`]
    pub fn from_env(
        api_root: &str,
        default_project: Option<ProjectId>,
        request_timeout: Duration,
    ) -> DbResult<Self> {
        let token = TOKEN_ENV_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                DbError::Config(format!(
                    "no access token found; set {}",
                    TOKEN_ENV_VARS.join(" or ")
                ))
            })?;
        Self::new(api_root, token, default_project, request_timeout)
    }

    fn project_for<'a>(&'a self, dataset: &'a DatasetRef) -> DbResult<&'a ProjectId> {
        dataset
            .project
            .as_ref()
            .or(self.default_project.as_ref())
            .ok_or_else(|| {
                DbError::Config(format!(
                    "dataset '{}' has no project and no default project is configured",
                    dataset
                ))
            })
    }

    fn dataset_url(&self, project: &ProjectId, dataset: &DatasetName) -> String {
        format!(
            "{}/projects/{}/datasets/{}",
            self.api_root, project, dataset
        )
    }

    /// Send a request, turning non-success statuses into classified errors.
    async fn send(&self, request: RequestBuilder) -> DbResult<Response> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_error(status, &body))
    }

    async fn get_dataset(&self, dataset: &DatasetRef) -> DbResult<DatasetResource> {
        let project = self.project_for(dataset)?;
        let response = self
            .send(self.client.get(self.dataset_url(project, &dataset.dataset)))
            .await?;
        Ok(response.json().await?)
    }

    /// Poll `jobs.getQueryResults` until the job reports completion.
    async fn wait_for_job(&self, mut response: QueryResponse) -> DbResult<()> {
        loop {
            if let Some(errors) = response.errors.as_deref() {
                if let Some(first) = errors.first() {
                    return Err(classify_job_error(first));
                }
            }
            if response.job_complete {
                return Ok(());
            }
            let job = response.job_reference.as_ref().ok_or_else(|| {
                DbError::InvalidResponse("incomplete query without a job reference".to_string())
            })?;
            log::debug!("Waiting for job {} to complete", job.job_id);
            tokio::time::sleep(QUERY_POLL_INTERVAL).await;

            let mut request = self.client.get(format!(
                "{}/projects/{}/queries/{}",
                self.api_root, job.project_id, job.job_id
            ));
            if let Some(location) = &job.location {
                request = request.query(&[("location", location.as_str())]);
            }
            response = self
                .send(request.query(&[("maxResults", "0")]))
                .await?
                .json()
                .await?;
        }
    }
}

#[async_trait]
impl Warehouse for BigQueryBackend {
    async fn dataset_exists(&self, dataset: &DatasetRef) -> DbResult<bool> {
        match self.get_dataset(dataset).await {
            Ok(_) => Ok(true),
            Err(DbError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_datasets(&self, project: Option<&ProjectId>) -> DbResult<Vec<DatasetRef>> {
        let project = project.or(self.default_project.as_ref()).ok_or_else(|| {
            DbError::Config("no project given and no default project configured".to_string())
        })?;
        let url = format!("{}/projects/{}/datasets", self.api_root, project);

        let mut datasets = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.client.get(&url).query(&[("all", "true")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: DatasetList = self.send(request).await?.json().await?;
            for item in page.datasets {
                let reference = item.dataset_reference;
                datasets.push(DatasetRef::new(
                    Some(parse_field(ProjectId::try_new(reference.project_id))?),
                    parse_field(DatasetName::try_new(reference.dataset_id))?,
                ));
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(datasets)
    }

    async fn list_tables(&self, dataset: &DatasetRef) -> DbResult<Vec<TableInfo>> {
        let project = self.project_for(dataset)?;
        let url = format!("{}/tables", self.dataset_url(project, &dataset.dataset));

        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.client.get(&url).query(&[("maxResults", "1000")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: TableList = self.send(request).await?.json().await?;
            for item in page.tables {
                tables.push(TableInfo {
                    name: parse_field(TableName::try_new(item.table_reference.table_id))?,
                    kind: item
                        .kind
                        .as_deref()
                        .map(TableKind::from_label)
                        .unwrap_or(TableKind::Table),
                });
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }

    async fn describe_dataset(&self, dataset: &DatasetRef) -> DbResult<DatasetInfo> {
        let resource = self.get_dataset(dataset).await?;
        let tables = self.list_tables(dataset).await?;
        Ok(DatasetInfo {
            dataset: dataset.clone(),
            description: resource.description,
            location: resource.location,
            labels: resource.labels.unwrap_or_default(),
            tables,
        })
    }

    async fn create_dataset(&self, dataset: &DatasetRef, location: &str) -> DbResult<()> {
        let project = self.project_for(dataset)?;
        let body = NewDataset {
            dataset_reference: DatasetReference {
                project_id: project.to_string(),
                dataset_id: dataset.dataset.to_string(),
            },
            location: location.to_string(),
        };
        let request = self
            .client
            .post(format!("{}/projects/{}/datasets", self.api_root, project))
            .json(&body);
        match self.send(request).await {
            Ok(_) => Ok(()),
            Err(DbError::Api { status: 409, .. }) => {
                log::debug!("Dataset {} already exists", dataset);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_dataset(&self, dataset: &DatasetRef) -> DbResult<()> {
        let project = self.project_for(dataset)?;
        let request = self
            .client
            .delete(self.dataset_url(project, &dataset.dataset))
            .query(&[("deleteContents", "true")]);
        match self.send(request).await {
            Ok(_) | Err(DbError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn create_or_replace_view(
        &self,
        target: &DatasetRef,
        view: &TableName,
        source: &DatasetRef,
        table: &TableName,
    ) -> DbResult<()> {
        let target_project = self.project_for(target)?;
        let source_project = self.project_for(source)?;
        let ddl = view_ddl(target_project, target, view, source_project, source, table);

        let request = self
            .client
            .post(format!("{}/projects/{}/queries", self.api_root, target_project))
            .json(&QueryRequest {
                query: ddl,
                use_legacy_sql: false,
            });
        let response: QueryResponse = self.send(request).await?.json().await?;
        self.wait_for_job(response).await
    }

    fn backend_type(&self) -> &'static str {
        "bigquery"
    }

    /// Bare names resolve against the default project.
    fn canonical(&self, dataset: &DatasetRef) -> DatasetRef {
        match &self.default_project {
            Some(default) => DatasetRef::new(
                Some(dataset.project_or(default).clone()),
                dataset.dataset.clone(),
            ),
            None => dataset.clone(),
        }
    }
}

/// Build the `CREATE OR REPLACE VIEW` statement for one chained table.
pub(crate) fn view_ddl(
    target_project: &ProjectId,
    target: &DatasetRef,
    view: &TableName,
    source_project: &ProjectId,
    source: &DatasetRef,
    table: &TableName,
) -> String {
    format!(
        "CREATE OR REPLACE VIEW {} AS SELECT * FROM {}",
        quote_bq_path(target_project, &target.dataset, view),
        quote_bq_path(source_project, &source.dataset, table),
    )
}

fn parse_field<T>(value: bqw_core::CoreResult<T>) -> DbResult<T> {
    value.map_err(|e| DbError::InvalidResponse(e.to_string()))
}

/// Error reasons BigQuery reports for conditions that clear up on retry
const TRANSIENT_REASONS: [&str; 3] = ["rateLimitExceeded", "backendError", "internalError"];

/// Map an HTTP error status and body onto a [`DbError`].
pub(crate) fn classify_error(status: StatusCode, body: &str) -> DbError {
    let envelope: Option<ErrorEnvelope> = serde_json::from_str(body).ok();
    let (message, reason) = match &envelope {
        Some(env) => (
            env.error.message.clone(),
            env.error.errors.first().and_then(|e| e.reason.clone()),
        ),
        None => (body.trim().to_string(), None),
    };
    let message = if message.is_empty() {
        status.to_string()
    } else {
        message
    };

    match (status.as_u16(), reason.as_deref()) {
        (404, _) => DbError::NotFound(message),
        (429, _) | (_, Some("rateLimitExceeded")) => DbError::RateLimited(message),
        (500 | 502 | 503 | 504, _) => DbError::Unavailable(message),
        (_, Some(r)) if TRANSIENT_REASONS.contains(&r) => DbError::Unavailable(message),
        (code, _) => DbError::Api {
            status: code,
            message,
        },
    }
}

fn classify_job_error(error: &ErrorProto) -> DbError {
    let message = error.message.clone().unwrap_or_default();
    match error.reason.as_deref() {
        Some("rateLimitExceeded") => DbError::RateLimited(message),
        Some("notFound") => DbError::NotFound(message),
        Some(r) if TRANSIENT_REASONS.contains(&r) => DbError::Unavailable(message),
        _ => DbError::ExecutionError(message),
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    project_id: String,
    dataset_id: String,
}

#[derive(Debug, Deserialize)]
struct DatasetResource {
    description: Option<String>,
    location: Option<String>,
    labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewDataset {
    dataset_reference: DatasetReference,
    location: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetList {
    #[serde(default)]
    datasets: Vec<DatasetListItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetListItem {
    dataset_reference: DatasetReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableList {
    #[serde(default)]
    tables: Vec<TableListItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableListItem {
    table_reference: TableReference,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    table_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    query: String,
    use_legacy_sql: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    errors: Option<Vec<ErrorProto>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

#[cfg(test)]
#[path = "bigquery_test.rs"]
mod tests;
