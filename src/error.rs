// src/error.rs

//! Unified error handling for the ETL job.

use std::fmt;

use thiserror::Error;

/// Result type alias for ETL operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Token acquisition failed
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Discussion API call failed
    #[error("Source error for {context}: {message}")]
    Source { context: String, message: String },

    /// A raw field could not be coerced to its declared type
    #[error("Cannot coerce field '{field}' of record {record_id}: {message}")]
    Coercion {
        record_id: String,
        field: String,
        message: String,
    },

    /// A row does not match the destination table schema
    #[error("Schema mismatch for table {table}: {message}")]
    Schema { table: String, message: String },

    /// Warehouse API call or load job failed
    #[error("Warehouse error for {context}: {message}")]
    Warehouse { context: String, message: String },

    /// Secret could not be read or decoded
    #[error("Secret '{name}' unavailable: {message}")]
    Secret { name: String, message: String },

    /// A pipeline stage failed for a forum
    #[error("Stage {stage} failed for forum '{forum}': {message}")]
    Stage {
        forum: String,
        stage: String,
        message: String,
    },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an authentication error.
    pub fn auth(message: impl fmt::Display) -> Self {
        Self::Auth(message.to_string())
    }

    /// Create a source API error with context.
    pub fn source(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Source {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a coercion error for one field of one record.
    pub fn coercion(
        record_id: impl Into<String>,
        field: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        Self::Coercion {
            record_id: record_id.into(),
            field: field.into(),
            message: message.to_string(),
        }
    }

    /// Create a schema mismatch error.
    pub fn schema(table: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Schema {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a warehouse error with context.
    pub fn warehouse(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Warehouse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a secret retrieval error.
    pub fn secret(name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Secret {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Wrap an error with the forum and stage it happened in.
    pub fn stage(forum: impl Into<String>, stage: impl fmt::Display, err: AppError) -> Self {
        Self::Stage {
            forum: forum.into(),
            stage: stage.to_string(),
            message: err.to_string(),
        }
    }
}
