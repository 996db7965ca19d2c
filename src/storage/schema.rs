//! Destination table schemas and row validation.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AppError, Result};

/// Column type as understood by the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
}

/// Column nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    Nullable,
    Required,
}

/// One column of a table schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchemaField {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub mode: FieldMode,
}

impl SchemaField {
    const fn required(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            mode: FieldMode::Required,
        }
    }

    const fn nullable(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            mode: FieldMode::Nullable,
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match (self.field_type, value) {
            (_, Value::Null) => self.mode == FieldMode::Nullable,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (FieldType::Float, Value::Number(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Timestamp, Value::String(s)) => {
                chrono::DateTime::parse_from_rfc3339(s).is_ok()
            }
            _ => false,
        }
    }
}

/// A logical destination table with a fixed schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub fields: &'static [SchemaField],
}

impl TableSchema {
    /// Schema in the warehouse REST representation (`{"fields": [...]}`).
    pub fn to_json(&self) -> Value {
        serde_json::json!({ "fields": self.fields })
    }

    /// Check that a serialized row has exactly this table's columns, each
    /// holding a value of the declared type.
    pub fn validate_row(&self, row: &Value) -> Result<()> {
        let object = row
            .as_object()
            .ok_or_else(|| AppError::schema(self.name, "row is not a JSON object"))?;

        self.check_columns(object)?;

        for field in self.fields {
            let value = object.get(field.name).unwrap_or(&Value::Null);
            if !field.accepts(value) {
                return Err(AppError::schema(
                    self.name,
                    format!(
                        "column '{}' expects {:?} ({:?}), got {}",
                        field.name, field.field_type, field.mode, value
                    ),
                ));
            }
        }
        Ok(())
    }

    fn check_columns(&self, object: &Map<String, Value>) -> Result<()> {
        if let Some(extra) = object
            .keys()
            .find(|k| !self.fields.iter().any(|f| f.name == k.as_str()))
        {
            return Err(AppError::schema(
                self.name,
                format!("unexpected column '{extra}'"),
            ));
        }
        if let Some(missing) = self.fields.iter().find(|f| !object.contains_key(f.name)) {
            return Err(AppError::schema(
                self.name,
                format!("missing column '{}'", missing.name),
            ));
        }
        Ok(())
    }
}

/// Posts table.
pub const POSTS: TableSchema = TableSchema {
    name: "posts",
    fields: &[
        SchemaField::required("id", FieldType::String),
        SchemaField::nullable("title", FieldType::String),
        SchemaField::nullable("selftext", FieldType::String),
        SchemaField::nullable("author", FieldType::String),
        SchemaField::nullable("created_utc", FieldType::Timestamp),
        SchemaField::nullable("score", FieldType::Integer),
        SchemaField::nullable("num_comments", FieldType::Integer),
        SchemaField::nullable("subreddit", FieldType::String),
        SchemaField::nullable("url", FieldType::String),
        SchemaField::nullable("upvote_ratio", FieldType::Float),
        SchemaField::nullable("over_18", FieldType::Boolean),
    ],
};

/// Comments table.
pub const COMMENTS: TableSchema = TableSchema {
    name: "comments",
    fields: &[
        SchemaField::required("id", FieldType::String),
        SchemaField::nullable("post_id", FieldType::String),
        SchemaField::nullable("parent_id", FieldType::String),
        SchemaField::nullable("body", FieldType::String),
        SchemaField::nullable("author", FieldType::String),
        SchemaField::nullable("created_utc", FieldType::Timestamp),
        SchemaField::nullable("score", FieldType::Integer),
        SchemaField::nullable("subreddit", FieldType::String),
    ],
};

/// Every table the pipeline writes to.
pub const ALL_TABLES: [&TableSchema; 2] = [&POSTS, &COMMENTS];

/// A cleaned record that maps onto one destination table.
pub trait WarehouseRow: Serialize {
    /// Destination table for this row type.
    fn schema() -> &'static TableSchema;

    /// Natural key, used in log and error messages.
    fn record_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn valid_comment() -> Value {
        json!({
            "id": "c1",
            "post_id": "p1",
            "parent_id": "t3_p1",
            "body": "hello",
            "author": "[deleted]",
            "created_utc": "2024-05-01T12:00:00.000000Z",
            "score": 3,
            "subreddit": "rust"
        })
    }

    #[test]
    fn accepts_matching_row() {
        assert!(COMMENTS.validate_row(&valid_comment()).is_ok());
    }

    #[test]
    fn rejects_missing_and_extra_columns() {
        let mut row = valid_comment();
        row.as_object_mut().unwrap().remove("subreddit");
        assert!(COMMENTS.validate_row(&row).is_err());

        let mut row = valid_comment();
        row["extra"] = json!(1);
        assert!(COMMENTS.validate_row(&row).is_err());
    }

    #[test]
    fn rejects_wrong_types_and_null_required() {
        let mut row = valid_comment();
        row["score"] = json!(1.5);
        assert!(COMMENTS.validate_row(&row).is_err());

        let mut row = valid_comment();
        row["id"] = Value::Null;
        assert!(COMMENTS.validate_row(&row).is_err());

        let mut row = valid_comment();
        row["created_utc"] = json!("last tuesday");
        assert!(COMMENTS.validate_row(&row).is_err());
    }

    #[test]
    fn nullable_columns_accept_null() {
        let mut row = valid_comment();
        row["parent_id"] = Value::Null;
        assert!(COMMENTS.validate_row(&row).is_ok());
    }

    #[test]
    fn schema_json_uses_rest_names() {
        let schema = POSTS.to_json();
        let first = &schema["fields"][0];
        assert_eq!(first["name"], "id");
        assert_eq!(first["type"], "STRING");
        assert_eq!(first["mode"], "REQUIRED");
        assert_eq!(schema["fields"][9]["type"], "FLOAT");
        assert_eq!(schema["fields"].as_array().unwrap().len(), 11);
    }
}
