//! Local filesystem warehouse.
//!
//! Mirrors the dataset/table layout of the real warehouse for dry runs and
//! tests.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! └── {dataset}/
//!     ├── dataset.json           # Dataset marker
//!     ├── posts.schema.json      # Table schema
//!     ├── posts.ndjson           # Append-only rows
//!     ├── comments.schema.json
//!     └── comments.ndjson
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::{LoadMetadata, SchemaStatus, TableSchema, Warehouse};

/// Directory-backed warehouse.
#[derive(Clone)]
pub struct LocalWarehouse {
    root_dir: PathBuf,
    dataset_id: String,
}

impl LocalWarehouse {
    /// Create a warehouse rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>, dataset_id: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            dataset_id: dataset_id.into(),
        }
    }

    fn dataset_dir(&self) -> PathBuf {
        self.root_dir.join(&self.dataset_id)
    }

    fn dataset_marker(&self) -> PathBuf {
        self.dataset_dir().join("dataset.json")
    }

    fn schema_path(&self, table: &str) -> PathBuf {
        self.dataset_dir().join(format!("{table}.schema.json"))
    }

    fn rows_path(&self, table: &str) -> PathBuf {
        self.dataset_dir().join(format!("{table}.ndjson"))
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, path: &PathBuf, bytes: &[u8]) -> Result<()> {
        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, path: &PathBuf, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(path, &bytes).await
    }

    /// Read every row appended to a table so far.
    pub async fn read_rows(&self, table: &str) -> Result<Vec<Value>> {
        let content = match tokio::fs::read_to_string(self.rows_path(table)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(AppError::from))
            .collect()
    }

    /// Names of tables that exist in the dataset.
    pub async fn table_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(self.dataset_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(AppError::Io(e)),
        };
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if let Some(table) = file_name.strip_suffix(".schema.json") {
                names.push(table.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl Warehouse for LocalWarehouse {
    async fn ensure_dataset(&self) -> Result<SchemaStatus> {
        let marker = self.dataset_marker();
        if tokio::fs::try_exists(&marker).await? {
            log::info!("Dataset {} exists.", self.dataset_id);
            return Ok(SchemaStatus::Exists);
        }

        tokio::fs::create_dir_all(self.dataset_dir()).await?;
        let meta = serde_json::json!({
            "dataset_id": self.dataset_id,
            "created_at": Utc::now(),
        });
        self.write_json(&marker, &meta).await?;
        log::info!("Created dataset {}.", self.dataset_id);
        Ok(SchemaStatus::Created)
    }

    async fn ensure_table(&self, table: &TableSchema) -> Result<SchemaStatus> {
        if !tokio::fs::try_exists(self.dataset_marker()).await? {
            return Err(AppError::warehouse(
                table.name,
                format!("dataset {} does not exist", self.dataset_id),
            ));
        }

        let path = self.schema_path(table.name);
        if tokio::fs::try_exists(&path).await? {
            log::info!("Table {} exists.", table.name);
            return Ok(SchemaStatus::Exists);
        }

        self.write_json(&path, &table.to_json()).await?;
        log::info!("Created table {}.", table.name);
        Ok(SchemaStatus::Created)
    }

    async fn append(&self, table: &TableSchema, rows: &[Value]) -> Result<LoadMetadata> {
        if !tokio::fs::try_exists(self.schema_path(table.name)).await? {
            return Err(AppError::warehouse(
                table.name,
                "table does not exist; run setup first",
            ));
        }

        let path = self.rows_path(table.name);
        let mut buffer = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut buffer, row)?;
            buffer.push(b'\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&buffer).await?;
        file.sync_all().await?;

        Ok(LoadMetadata {
            table: table.name.to_string(),
            row_count: rows.len(),
            location: path.display().to_string(),
            timestamp: Utc::now(),
        })
    }
}
