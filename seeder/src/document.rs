//! Seed documents as authored on disk.
//!
//! ```json
//! { "$schema": "...", "author": { "data": [{ "name": "Ada" }], "upsertBy": ["name"] } }
//! ```

use std::path::Path;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::checksum::checksum;
use crate::store::Record;

const SCHEMA_KEY: &str = "$schema";

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to read seed {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("seed {name} is not valid JSON: {source}")]
    Json {
        name: String,
        source: serde_json::Error,
    },
    #[error("seed {name} is invalid: {reason}")]
    Invalid { name: String, reason: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawTableSeed {
    data: Vec<JsonValue>,
    #[serde(default)]
    upsert_by: Option<Vec<String>>,
}

/// One top-level table section, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSeed {
    /// The key as written, a human-facing or canonical table name.
    pub key: String,
    pub data: Vec<Record>,
    pub upsert_by: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct SeedDocument {
    /// File name the seed was declared under, extension included.
    pub name: String,
    content: JsonValue,
    tables: Vec<TableSeed>,
}

impl SeedDocument {
    pub async fn load(path: &Path) -> Result<Self, DocumentError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| DocumentError::Read {
                path: path.display().to_string(),
                source,
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(name, &text)
    }

    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self, DocumentError> {
        let name = name.into();
        let value = serde_json::from_str(text).map_err(|source| DocumentError::Json {
            name: name.clone(),
            source,
        })?;
        Self::from_value(name, value)
    }

    pub fn from_value(name: impl Into<String>, value: JsonValue) -> Result<Self, DocumentError> {
        let name = name.into();
        let invalid = |reason: String| DocumentError::Invalid {
            name: name.clone(),
            reason,
        };

        let JsonValue::Object(mut sections) = value else {
            return Err(invalid("top level must be an object".to_string()));
        };
        sections.shift_remove(SCHEMA_KEY);

        let mut tables = Vec::with_capacity(sections.len());
        for (key, section) in &sections {
            let raw: RawTableSeed = serde_json::from_value(section.clone())
                .map_err(|e| invalid(format!("table `{key}`: {e}")))?;
            let data = raw
                .data
                .into_iter()
                .enumerate()
                .map(|(i, record)| match record {
                    JsonValue::Object(record) => Ok(record),
                    _ => Err(invalid(format!("table `{key}`: data[{i}] is not an object"))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            if raw.upsert_by.as_ref().is_some_and(Vec::is_empty) {
                return Err(invalid(format!("table `{key}`: upsertBy is empty")));
            }
            tables.push(TableSeed {
                key: key.clone(),
                data,
                upsert_by: raw.upsert_by,
            });
        }

        Ok(Self {
            name,
            content: JsonValue::Object(sections),
            tables,
        })
    }

    pub fn tables(&self) -> &[TableSeed] {
        &self.tables
    }

    /// Content checksum, `$schema` excluded.
    pub fn checksum(&self) -> String {
        checksum(&self.content)
    }
}
