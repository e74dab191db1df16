//! The derived schema configuration.
//!
//! Built once by the analyzer, saved next to the generated client and loaded
//! read-only by every seeding run. Components receive it by reference at
//! construction time.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::schema::ScalarType;

// ---------- field shapes ----------

/// What a seed value in a given position is, decided at analysis time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldShape {
    Scalar {
        ty: ScalarType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        generated: Option<Generated>,
        /// Database type of an enum column.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        enum_name: Option<String>,
    },
    ToOne(RelationTarget),
    ToMany(RelationTarget),
}

/// Values the client fills in because the database has no default for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generated {
    Uuid,
    Now,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationTarget {
    pub table: String,
    pub foreign_key: ForeignKey,
}

/// Which table physically stores the key of a relation, seen from one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "side", rename_all = "snake_case")]
pub enum ForeignKey {
    /// `column` on this table references `references` on the target.
    Local { column: String, references: String },
    /// `column` on the target references `references` on this table.
    Remote { column: String, references: String },
}

// ---------- relation pairs ----------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    pub table: String,
    pub field: String,
}

/// Both sides of one named relation. `owner` stores the foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationPair {
    pub name: String,
    pub owner: FieldRef,
    pub inverse: FieldRef,
    /// Foreign-key column on the owner's table.
    pub column: String,
    /// Referenced column on the inverse side's table.
    pub references: String,
}

// ---------- schema config ----------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaConfig {
    /// `table#field` → `otherTable#column`.
    pub relational_fields: BTreeMap<String, String>,
    pub relational_models: BTreeMap<String, Vec<String>>,
    pub unique_fields: BTreeMap<String, Vec<String>>,
    pub primary_keys: BTreeMap<String, String>,
    /// Human-facing name → canonical table name.
    pub pretty_names: BTreeMap<String, String>,
    pub fields: BTreeMap<String, BTreeMap<String, FieldShape>>,
    pub relations: Vec<RelationPair>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read schema config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write schema config {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid schema config {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

impl SchemaConfig {
    pub fn field_key(table: &str, field: &str) -> String {
        format!("{table}#{field}")
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })?;
        tokio::fs::write(path, text).await.map_err(write_err)
    }
}
