//! Rewrites nested seed records into create/connect operation trees.
//!
//! Every relation value is resolved depth-first: a nested record's own
//! relations are decided before the record itself is looked up, so its unique
//! values are final when the store is asked whether it already exists.
//! Siblings (array elements, distinct fields) are resolved concurrently;
//! output order always follows input order.

use std::collections::BTreeSet;

use futures::future::{BoxFuture, try_join_all};
use serde_json::Value as JsonValue;

use crate::config::FieldShape;
use crate::mapper::NameMapper;
use crate::store::{Record, SeedStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown table `{0}`")]
    UnknownTable(String),
    #[error("unknown field `{field}` on {table} at {path}")]
    UnknownField {
        table: String,
        field: String,
        path: String,
    },
    #[error("{table}.{field} at {path} expects {expected}")]
    ShapeMismatch {
        table: String,
        field: String,
        path: String,
        expected: &'static str,
    },
    #[error("expected a {table} record at {path}")]
    NotARecord { table: String, path: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A rewritten value and the document paths visited to produce it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub value: JsonValue,
    pub paths: BTreeSet<String>,
}

impl Resolution {
    fn leaf(value: JsonValue) -> Self {
        Self {
            value,
            paths: BTreeSet::new(),
        }
    }
}

enum Decision {
    Create,
    Connect(Record),
}

pub struct SeedResolver<'a> {
    mapper: NameMapper<'a>,
    store: &'a dyn SeedStore,
}

impl<'a> SeedResolver<'a> {
    pub fn new(mapper: NameMapper<'a>, store: &'a dyn SeedStore) -> Self {
        Self { mapper, store }
    }

    /// Resolves one record or an array of records for `table`, keeping the
    /// shape. `path` names the value's location in the document.
    pub async fn resolve(
        &self,
        table: &str,
        value: &JsonValue,
        path: &str,
    ) -> Result<Resolution, ResolveError> {
        let table = self
            .mapper
            .table_name(table)
            .ok_or_else(|| ResolveError::UnknownTable(table.to_string()))?;

        match value {
            JsonValue::Array(items) => {
                let resolved =
                    try_join_all(items.iter().map(|item| self.resolve_record(table, item, path)))
                        .await?;
                let mut paths = BTreeSet::from([path.to_string()]);
                let values = resolved
                    .into_iter()
                    .map(|r| {
                        paths.extend(r.paths);
                        r.value
                    })
                    .collect();
                Ok(Resolution {
                    value: JsonValue::Array(values),
                    paths,
                })
            }
            _ => self.resolve_record(table, value, path).await,
        }
    }

    fn resolve_record<'s>(
        &'s self,
        table: &'s str,
        value: &'s JsonValue,
        path: &'s str,
    ) -> BoxFuture<'s, Result<Resolution, ResolveError>> {
        Box::pin(async move {
            let JsonValue::Object(record) = value else {
                return Err(ResolveError::NotARecord {
                    table: table.to_string(),
                    path: path.to_string(),
                });
            };

            let fields = try_join_all(
                record
                    .iter()
                    .map(|(field, value)| self.resolve_field(table, field, value, path)),
            )
            .await?;

            let mut paths = BTreeSet::from([path.to_string()]);
            let mut out = Record::new();
            for (field, resolved) in record.keys().zip(fields) {
                paths.extend(resolved.paths);
                out.insert(field.clone(), resolved.value);
            }
            Ok(Resolution {
                value: JsonValue::Object(out),
                paths,
            })
        })
    }

    async fn resolve_field(
        &self,
        table: &str,
        field: &str,
        value: &JsonValue,
        path: &str,
    ) -> Result<Resolution, ResolveError> {
        let shape = self
            .mapper
            .field_shape(table, field)
            .ok_or_else(|| ResolveError::UnknownField {
                table: table.to_string(),
                field: field.to_string(),
                path: path.to_string(),
            })?;
        let mismatch = |expected| ResolveError::ShapeMismatch {
            table: table.to_string(),
            field: field.to_string(),
            path: path.to_string(),
            expected,
        };

        match (shape, value) {
            (FieldShape::Scalar { .. }, _) | (_, JsonValue::Null) => Ok(Resolution::leaf(value.clone())),
            (FieldShape::ToMany(target), JsonValue::Array(items)) => {
                self.resolve_to_many(&target.table, items, path).await
            }
            (FieldShape::ToOne(target), JsonValue::Object(_)) => {
                let path = format!("{path}.{field}");
                self.resolve_to_one(&target.table, value, &path).await
            }
            (FieldShape::ToMany(_), _) => Err(mismatch("an array of records")),
            (FieldShape::ToOne(_), _) => Err(mismatch("a record")),
        }
    }

    /// `[a, b]` → `{ create: [new ones], connect: [unique keys of existing ones] }`,
    /// empty buckets left out.
    async fn resolve_to_many(
        &self,
        table: &str,
        items: &[JsonValue],
        path: &str,
    ) -> Result<Resolution, ResolveError> {
        let resolved =
            try_join_all(items.iter().map(|item| self.resolve_record(table, item, path))).await?;
        let decisions = try_join_all(resolved.iter().map(|r| self.decide(table, &r.value))).await?;

        let mut paths = BTreeSet::new();
        let mut create = Vec::new();
        let mut connect = Vec::new();
        for (resolved, decision) in resolved.into_iter().zip(decisions) {
            paths.extend(resolved.paths);
            match decision {
                Decision::Create => create.push(resolved.value),
                Decision::Connect(unique) => connect.push(JsonValue::Object(unique)),
            }
        }

        let mut buckets = Record::new();
        if !create.is_empty() {
            buckets.insert("create".to_string(), JsonValue::Array(create));
        }
        if !connect.is_empty() {
            buckets.insert("connect".to_string(), JsonValue::Array(connect));
        }
        Ok(Resolution {
            value: JsonValue::Object(buckets),
            paths,
        })
    }

    /// `{..}` → `{ create: {..} }` or `{ connect: {unique key} }`.
    async fn resolve_to_one(
        &self,
        table: &str,
        value: &JsonValue,
        path: &str,
    ) -> Result<Resolution, ResolveError> {
        let resolved = self.resolve_record(table, value, path).await?;
        let wrapped = match self.decide(table, &resolved.value).await? {
            Decision::Create => ("create".to_string(), resolved.value),
            Decision::Connect(unique) => ("connect".to_string(), JsonValue::Object(unique)),
        };
        Ok(Resolution {
            value: JsonValue::Object(Record::from_iter([wrapped])),
            paths: resolved.paths,
        })
    }

    /// A record without unique values cannot match an existing row and is created.
    async fn decide(&self, table: &str, value: &JsonValue) -> Result<Decision, ResolveError> {
        let Some(record) = value.as_object() else {
            return Ok(Decision::Create);
        };
        let unique = self.mapper.unique_where(table, record);
        if unique.is_empty() {
            tracing::debug!(table, "no unique values, creating");
            return Ok(Decision::Create);
        }

        let count = self.store.count(table, &unique).await?;
        if count > 0 {
            tracing::debug!(table, count, "row exists, connecting");
            Ok(Decision::Connect(unique))
        } else {
            tracing::debug!(table, "row not found, creating");
            Ok(Decision::Create)
        }
    }
}
