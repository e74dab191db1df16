//! Lookups over a loaded [`SchemaConfig`].
//!
//! Seed documents address tables by their human-facing name (`blogPost`);
//! the store wants canonical names (`BlogPost`). Every lookup that can miss
//! returns `None`, except [`NameMapper::primary_key`].

use serde_json::{Map, Value as JsonValue};

use crate::config::{FieldShape, SchemaConfig};

#[derive(Debug, thiserror::Error)]
pub enum MapperError {
    #[error("Primary key not found: {0}")]
    MissingPrimaryKey(String),
}

#[derive(Clone, Copy)]
pub struct NameMapper<'a> {
    config: &'a SchemaConfig,
}

impl<'a> NameMapper<'a> {
    pub fn new(config: &'a SchemaConfig) -> Self {
        Self { config }
    }

    /// Canonical table name for either a human-facing or a canonical name.
    pub fn table_name(&self, name: &str) -> Option<&'a str> {
        if let Some(table) = self.config.pretty_names.get(name) {
            return Some(table.as_str());
        }
        self.config
            .fields
            .get_key_value(name)
            .map(|(table, _)| table.as_str())
    }

    /// Human-facing name for a canonical table name.
    pub fn pretty_name(&self, table: &str) -> Option<&'a str> {
        self.config
            .pretty_names
            .iter()
            .find(|(_, canonical)| canonical.as_str() == table)
            .map(|(pretty, _)| pretty.as_str())
    }

    pub fn field_shape(&self, table: &str, field: &str) -> Option<&'a FieldShape> {
        let table = self.table_name(table)?;
        self.config.fields.get(table)?.get(field)
    }

    /// Table a relation field points at, read from `relationalFields`.
    pub fn relation_target(&self, table: &str, field: &str) -> Option<&'a str> {
        let table = self.table_name(table)?;
        let referenced = self
            .config
            .relational_fields
            .get(&SchemaConfig::field_key(table, field))?;
        referenced.split('#').next()
    }

    pub fn related_tables(&self, table: &str) -> &'a [String] {
        self.table_name(table)
            .and_then(|t| self.config.relational_models.get(t))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn unique_fields(&self, table: &str) -> &'a [String] {
        self.table_name(table)
            .and_then(|t| self.config.unique_fields.get(t))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The record's values for the table's unique fields, nulls left out.
    pub fn unique_where(&self, table: &str, record: &Map<String, JsonValue>) -> Map<String, JsonValue> {
        self.unique_fields(table)
            .iter()
            .filter_map(|field| match record.get(field) {
                Some(JsonValue::Null) | None => None,
                Some(value) => Some((field.clone(), value.clone())),
            })
            .collect()
    }

    /// Every seedable table has exactly one primary key field; a miss is a bug.
    pub fn primary_key(&self, table: &str) -> Result<&'a str, MapperError> {
        self.table_name(table)
            .and_then(|t| self.config.primary_keys.get(t))
            .map(String::as_str)
            .ok_or_else(|| MapperError::MissingPrimaryKey(table.to_string()))
    }
}
