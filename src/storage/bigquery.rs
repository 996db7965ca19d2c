//! BigQuery warehouse implementation.
//!
//! Dataset and table creation use get-then-insert so repeated setup is a
//! no-op. Appends run as newline-delimited JSON load jobs with
//! `WRITE_APPEND`; the call waits until the job reports `DONE`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::models::WarehouseConfig;
use crate::services::GoogleAuth;
use crate::storage::{LoadMetadata, SchemaStatus, TableSchema, Warehouse};
use crate::utils::http::describe_failure;
use crate::utils::join_url;

/// State of a load job as reported by the jobs API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Running,
    Done,
    Failed(String),
}

/// BigQuery-backed warehouse.
pub struct BigQueryWarehouse {
    client: Client,
    auth: Arc<GoogleAuth>,
    config: WarehouseConfig,
}

impl BigQueryWarehouse {
    /// Create a warehouse client; fails when no project is configured.
    pub fn new(client: Client, auth: Arc<GoogleAuth>, config: &WarehouseConfig) -> Result<Self> {
        if config.project_id.trim().is_empty() {
            return Err(AppError::config(
                "warehouse.project_id is empty (set GCP_PROJECT_ID)",
            ));
        }
        Ok(Self {
            client,
            auth,
            config: config.clone(),
        })
    }

    fn project_path(&self) -> String {
        format!("projects/{}", self.config.project_id)
    }

    fn dataset_path(&self) -> String {
        format!("{}/datasets/{}", self.project_path(), self.config.dataset_id)
    }

    fn qualified(&self, table: &str) -> String {
        format!(
            "{}:{}.{}",
            self.config.project_id, self.config.dataset_id, table
        )
    }

    /// Status request for a job in the given location.
    fn job_request(&self, job_id: &str, location: &str) -> RequestBuilder {
        let url = join_url(
            &self.config.api_base,
            &format!("{}/jobs/{}", self.project_path(), job_id),
        );
        self.client.get(url).query(&[("location", location)])
    }

    /// Send a GET, returning `None` on 404.
    async fn get_optional(&self, request: RequestBuilder, context: &str) -> Result<Option<Value>> {
        let response = request
            .bearer_auth(self.auth.bearer().await?)
            .send()
            .await
            .map_err(|e| AppError::warehouse(context, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(AppError::warehouse(context, describe_failure(response).await)),
        }
    }

    /// POST a resource; a 409 means someone else created it first.
    async fn insert(&self, url: &str, body: &Value, context: &str) -> Result<SchemaStatus> {
        let response = self
            .client
            .post(url)
            .bearer_auth(self.auth.bearer().await?)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::warehouse(context, e))?;

        match response.status() {
            StatusCode::CONFLICT => Ok(SchemaStatus::Exists),
            status if status.is_success() => Ok(SchemaStatus::Created),
            _ => Err(AppError::warehouse(context, describe_failure(response).await)),
        }
    }

    /// Upload rows as a load job and return the job resource.
    async fn submit_load_job(&self, table: &TableSchema, rows: &[Value]) -> Result<Value> {
        let context = self.qualified(table.name);
        let url = format!(
            "{}?uploadType=multipart",
            join_url(&self.config.upload_base, &format!("{}/jobs", self.project_path()))
        );
        let boundary = format!(
            "subreddit_etl_{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        let metadata = load_job_config(
            &self.config.project_id,
            &self.config.dataset_id,
            &self.config.location,
            table,
        );
        let body = multipart_body(&boundary, &metadata, rows)?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.auth.bearer().await?)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::warehouse(&context, e))?;

        if !response.status().is_success() {
            return Err(AppError::warehouse(
                &context,
                describe_failure(response).await,
            ));
        }
        Ok(response.json().await?)
    }

    /// Poll a job until it finishes or the configured timeout passes.
    async fn wait_for_job(&self, mut job: Value, context: &str) -> Result<()> {
        let started = Instant::now();
        let timeout = Duration::from_secs(self.config.load_timeout_secs);
        let interval = Duration::from_millis(self.config.poll_interval_ms.max(1));

        let job_id = job
            .pointer("/jobReference/jobId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::warehouse(context, "load job has no job id"))?;
        let location = job
            .pointer("/jobReference/location")
            .and_then(Value::as_str)
            .unwrap_or(self.config.location.as_str())
            .to_string();

        loop {
            match job_state(&job) {
                JobState::Done => {
                    log::debug!("Load job {} done", job_id);
                    return Ok(());
                }
                JobState::Failed(reason) => {
                    return Err(AppError::warehouse(
                        context,
                        format!("load job {job_id} failed: {reason}"),
                    ));
                }
                JobState::Running => {}
            }

            if started.elapsed() >= timeout {
                return Err(AppError::warehouse(
                    context,
                    format!("load job {job_id} still running after {timeout:?}"),
                ));
            }
            tokio::time::sleep(interval).await;

            job = self
                .get_optional(self.job_request(&job_id, &location), context)
                .await?
                .ok_or_else(|| AppError::warehouse(context, format!("job {job_id} vanished")))?;
        }
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn ensure_dataset(&self) -> Result<SchemaStatus> {
        let dataset = &self.config.dataset_id;
        let url = join_url(&self.config.api_base, &self.dataset_path());
        if self.get_optional(self.client.get(&url), dataset).await?.is_some() {
            log::info!("Dataset {} exists.", dataset);
            return Ok(SchemaStatus::Exists);
        }

        let url = join_url(
            &self.config.api_base,
            &format!("{}/datasets", self.project_path()),
        );
        let body = json!({
            "datasetReference": {
                "projectId": self.config.project_id,
                "datasetId": dataset,
            },
            "location": self.config.location,
        });
        let status = self.insert(&url, &body, dataset).await?;
        log::info!("Dataset {}: {}.", dataset, status);
        Ok(status)
    }

    async fn ensure_table(&self, table: &TableSchema) -> Result<SchemaStatus> {
        let context = self.qualified(table.name);
        let url = join_url(
            &self.config.api_base,
            &format!("{}/tables/{}", self.dataset_path(), table.name),
        );
        if self.get_optional(self.client.get(&url), &context).await?.is_some() {
            log::info!("Table {} exists.", table.name);
            return Ok(SchemaStatus::Exists);
        }

        let url = join_url(
            &self.config.api_base,
            &format!("{}/tables", self.dataset_path()),
        );
        let body = json!({
            "tableReference": {
                "projectId": self.config.project_id,
                "datasetId": self.config.dataset_id,
                "tableId": table.name,
            },
            "schema": table.to_json(),
        });
        let status = self.insert(&url, &body, &context).await?;
        log::info!("Table {}: {}.", table.name, status);
        Ok(status)
    }

    async fn append(&self, table: &TableSchema, rows: &[Value]) -> Result<LoadMetadata> {
        let location = self.qualified(table.name);
        if !rows.is_empty() {
            let job = self.submit_load_job(table, rows).await?;
            self.wait_for_job(job, &location).await?;
        }

        Ok(LoadMetadata {
            table: table.name.to_string(),
            row_count: rows.len(),
            location,
            timestamp: Utc::now(),
        })
    }
}

/// Load job resource for an append into `table`.
pub fn load_job_config(project: &str, dataset: &str, location: &str, table: &TableSchema) -> Value {
    json!({
        "jobReference": {
            "projectId": project,
            "location": location,
        },
        "configuration": {
            "load": {
                "destinationTable": {
                    "projectId": project,
                    "datasetId": dataset,
                    "tableId": table.name,
                },
                "schema": table.to_json(),
                "sourceFormat": "NEWLINE_DELIMITED_JSON",
                "writeDisposition": "WRITE_APPEND",
                "createDisposition": "CREATE_NEVER",
            }
        }
    })
}

/// Build a `multipart/related` upload body: job metadata, then the rows as
/// newline-delimited JSON.
pub fn multipart_body(boundary: &str, metadata: &Value, rows: &[Value]) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    serde_json::to_writer(&mut body, metadata)?;
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    for row in rows {
        serde_json::to_writer(&mut body, row)?;
        body.push(b'\n');
    }
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    Ok(body)
}

/// Read the state of a job resource.
pub fn job_state(job: &Value) -> JobState {
    let status = job.get("status");
    if let Some(error) = status.and_then(|s| s.get("errorResult")) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        let reason = error.get("reason").and_then(Value::as_str).unwrap_or("");
        return JobState::Failed(if reason.is_empty() {
            message.to_string()
        } else {
            format!("{reason}: {message}")
        });
    }
    match status.and_then(|s| s.get("state")).and_then(Value::as_str) {
        Some("DONE") => JobState::Done,
        _ => JobState::Running,
    }
}
