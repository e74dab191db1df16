//! [`SeedStore`] over a SeaORM connection (SQLite or Postgres).
//!
//! Seed tables are not known at compile time, so statements are built with
//! `sea_query` against [`Alias`] identifiers and values are bound according to
//! the scalar types recorded in the schema config. Rows come back as JSON.

use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::future::BoxFuture;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::sea_query::{
    Alias, Asterisk, Condition, Expr, Func, Query, SimpleExpr, Value,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, ExecResult, FromQueryResult, QueryOrder, QueryResult, SqlErr,
    StatementBuilder, TransactionTrait,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{Record, SeedStore, SeedTransaction, StoreError};
use crate::config::{FieldShape, ForeignKey, Generated, RelationTarget, SchemaConfig};
use crate::entity::seed_migration;
use crate::ledger::LedgerEntry;
use crate::mapper::NameMapper;
use crate::schema::ScalarType;

pub struct SeaStore {
    db: DatabaseConnection,
    config: Arc<SchemaConfig>,
}

impl SeaStore {
    pub fn new(db: DatabaseConnection, config: Arc<SchemaConfig>) -> Self {
        Self { db, config }
    }
}

#[async_trait::async_trait]
impl SeedStore for SeaStore {
    async fn count(&self, table: &str, criteria: &Record) -> Result<u64, StoreError> {
        let mut select = Query::select();
        select
            .expr_as(Func::count(Expr::col(Asterisk)), Alias::new("count"))
            .from(Alias::new(table))
            .cond_where(condition(&self.config, table, criteria)?);
        let row = query_one(&self.db, &select)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("count over {table}")))?;
        let count: i64 = row.try_get("", "count")?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn begin(&self) -> Result<Box<dyn SeedTransaction>, StoreError> {
        let txn = self.db.begin().await?;
        Ok(Box::new(SeaTransaction {
            txn,
            config: self.config.clone(),
        }))
    }

    async fn read_ledger(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let entries = seed_migration::Entity::find()
            .order_by_asc(seed_migration::Column::StartedAt)
            .all(&self.db)
            .await?;
        Ok(entries)
    }

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        seed_migration::ActiveModel {
            id: Set(entry.id),
            checksum: Set(entry.checksum.clone()),
            started_at: Set(entry.started_at),
            finished_at: Set(entry.finished_at),
            logs: Set(entry.logs.clone()),
            migration_name: Set(entry.migration_name.clone()),
            rolled_back_at: Set(entry.rolled_back_at),
            applied_steps_count: Set(entry.applied_steps_count),
        }
        .insert(&self.db)
        .await?;
        Ok(())
    }
}

// ---------- transaction ----------

pub struct SeaTransaction {
    txn: DatabaseTransaction,
    config: Arc<SchemaConfig>,
}

#[async_trait::async_trait]
impl SeedTransaction for SeaTransaction {
    async fn create(&mut self, table: &str, payload: &Record) -> Result<Record, StoreError> {
        let savepoint = self.txn.begin().await?;
        let result = create_nested(&savepoint, &self.config, table, payload).await;
        release(savepoint, result).await
    }

    async fn upsert(
        &mut self,
        table: &str,
        criteria: &Record,
        payload: &Record,
    ) -> Result<Record, StoreError> {
        let savepoint = self.txn.begin().await?;
        let result = upsert_row(&savepoint, &self.config, table, criteria, payload).await;
        release(savepoint, result).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let SeaTransaction { txn, .. } = *self;
        txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let SeaTransaction { txn, .. } = *self;
        txn.rollback().await?;
        Ok(())
    }
}

/// Keeps the savepoint's work on success, discards it on failure.
async fn release(
    savepoint: DatabaseTransaction,
    result: Result<Record, StoreError>,
) -> Result<Record, StoreError> {
    match result {
        Ok(row) => {
            savepoint.commit().await?;
            Ok(row)
        }
        Err(e) => {
            savepoint.rollback().await?;
            Err(e)
        }
    }
}

// ---------- nested writes ----------

enum Nested<'v> {
    Create(&'v Record),
    Connect(&'v Record),
}

/// Inserts `payload` into `table`. Rows it references are written first, rows
/// that reference it afterwards, with the new row's key.
fn create_nested<'a>(
    txn: &'a DatabaseTransaction,
    config: &'a SchemaConfig,
    table: &'a str,
    payload: &'a Record,
) -> BoxFuture<'a, Result<Record, StoreError>> {
    Box::pin(async move {
        let shapes = config
            .fields
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        let mut columns: Vec<(String, SimpleExpr)> = Vec::new();
        let mut dependents = Vec::new();

        for (field, value) in payload {
            let shape = shapes.get(field).ok_or_else(|| StoreError::UnknownField {
                table: table.to_string(),
                field: field.clone(),
            })?;
            match shape {
                FieldShape::Scalar { .. } => {
                    columns.push((field.clone(), bind(config, table, field, value)?));
                }
                FieldShape::ToOne(target) | FieldShape::ToMany(target) => match &target.foreign_key {
                    ForeignKey::Local { column, references } => {
                        let key = if value.is_null() {
                            JsonValue::Null
                        } else {
                            link_referenced(txn, config, table, field, target, references, value)
                                .await?
                        };
                        columns.push((column.clone(), bind(config, table, column, &key)?));
                    }
                    ForeignKey::Remote { column, references } => {
                        dependents.push((field, target, column, references, value));
                    }
                },
            }
        }

        for (field, shape) in shapes {
            if let FieldShape::Scalar {
                generated: Some(generated),
                ..
            } = shape
                && !columns.iter().any(|(column, _)| column == field)
            {
                columns.push((field.clone(), generated_value(*generated).into()));
            }
        }

        let row = insert_row(txn, table, columns).await?;

        for (field, target, column, references, value) in dependents {
            if value.is_null() {
                continue;
            }
            let key = row.get(references).cloned().unwrap_or(JsonValue::Null);
            for op in nested_ops(table, field, value)? {
                match op {
                    Nested::Create(record) => {
                        let mut child = record.clone();
                        child.insert(column.clone(), key.clone());
                        create_nested(txn, config, &target.table, &child).await?;
                    }
                    Nested::Connect(criteria) => {
                        let mut update = Query::update();
                        update
                            .table(Alias::new(target.table.as_str()))
                            .value(
                                Alias::new(column.as_str()),
                                bind(config, &target.table, column, &key)?,
                            )
                            .cond_where(condition(config, &target.table, criteria)?);
                        let result = exec(txn, &update)
                            .await
                            .map_err(|e| classify(&target.table, e))?;
                        if result.rows_affected() == 0 {
                            return Err(connect_missing(&target.table, criteria));
                        }
                    }
                }
            }
        }

        Ok(row)
    })
}

/// Creates or finds the row a local foreign key points at and returns the
/// referenced column's value.
async fn link_referenced(
    txn: &DatabaseTransaction,
    config: &SchemaConfig,
    table: &str,
    field: &str,
    target: &RelationTarget,
    references: &str,
    value: &JsonValue,
) -> Result<JsonValue, StoreError> {
    let ops = nested_ops(table, field, value)?;
    let [op] = ops.as_slice() else {
        return Err(invalid(table, field, "expected exactly one create or connect"));
    };
    let row = match op {
        Nested::Create(record) => create_nested(txn, config, &target.table, record).await?,
        Nested::Connect(criteria) => find_one(txn, config, &target.table, criteria)
            .await?
            .ok_or_else(|| connect_missing(&target.table, criteria))?,
    };
    Ok(row.get(references).cloned().unwrap_or(JsonValue::Null))
}

fn nested_ops<'v>(table: &str, field: &str, value: &'v JsonValue) -> Result<Vec<Nested<'v>>, StoreError> {
    let JsonValue::Object(ops) = value else {
        return Err(invalid(table, field, "expected a create/connect object"));
    };
    let mut out = Vec::new();
    for (op, arg) in ops {
        let records: Vec<&Record> = match arg {
            JsonValue::Object(record) => vec![record],
            JsonValue::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_object()
                        .ok_or_else(|| invalid(table, field, "relation entries must be objects"))
                })
                .collect::<Result<_, _>>()?,
            _ => return Err(invalid(table, field, "relation entries must be objects")),
        };
        match op.as_str() {
            "create" => out.extend(records.into_iter().map(Nested::Create)),
            "connect" => out.extend(records.into_iter().map(Nested::Connect)),
            other => {
                return Err(invalid(
                    table,
                    field,
                    &format!("unsupported relation operation `{other}`"),
                ));
            }
        }
    }
    Ok(out)
}

/// Updates the scalar columns of the row matching `criteria`, or creates.
async fn upsert_row(
    txn: &DatabaseTransaction,
    config: &SchemaConfig,
    table: &str,
    criteria: &Record,
    payload: &Record,
) -> Result<Record, StoreError> {
    let Some(mut existing) = find_one(txn, config, table, criteria).await? else {
        return create_nested(txn, config, table, payload).await;
    };

    let primary_key = NameMapper::new(config).primary_key(table)?;
    let shapes = config
        .fields
        .get(table)
        .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

    let mut update = Query::update();
    update.table(Alias::new(table));
    let mut changed = Vec::new();
    for (field, value) in payload {
        match shapes.get(field) {
            Some(FieldShape::Scalar { .. }) if field != primary_key => {
                update.value(Alias::new(field.as_str()), bind(config, table, field, value)?);
                changed.push((field, value));
            }
            Some(_) => {
                tracing::debug!(table, field = %field, "upsert leaves existing relations untouched");
            }
            None => {
                return Err(StoreError::UnknownField {
                    table: table.to_string(),
                    field: field.clone(),
                });
            }
        }
    }
    if changed.is_empty() {
        return Ok(existing);
    }

    let key = existing.get(primary_key).cloned().unwrap_or(JsonValue::Null);
    update.and_where(Expr::col(Alias::new(primary_key)).eq(bind(config, table, primary_key, &key)?));
    exec(txn, &update).await.map_err(|e| classify(table, e))?;

    for (field, value) in changed {
        existing.insert(field.clone(), value.clone());
    }
    Ok(existing)
}

// ---------- statements ----------

async fn query_one<C, S>(conn: &C, stmt: &S) -> Result<Option<QueryResult>, DbErr>
where
    C: ConnectionTrait,
    S: StatementBuilder,
{
    let backend = conn.get_database_backend();
    conn.query_one(backend.build(stmt)).await
}

async fn exec<C, S>(conn: &C, stmt: &S) -> Result<ExecResult, DbErr>
where
    C: ConnectionTrait,
    S: StatementBuilder,
{
    let backend = conn.get_database_backend();
    conn.execute(backend.build(stmt)).await
}

async fn insert_row(
    txn: &DatabaseTransaction,
    table: &str,
    columns: Vec<(String, SimpleExpr)>,
) -> Result<Record, StoreError> {
    let mut insert = Query::insert();
    insert.into_table(Alias::new(table));
    if columns.is_empty() {
        insert.or_default_values();
    } else {
        let (names, values): (Vec<String>, Vec<SimpleExpr>) = columns.into_iter().unzip();
        insert.columns(names.into_iter().map(Alias::new));
        insert
            .values(values)
            .map_err(|e| DbErr::Custom(e.to_string()))?;
    }
    insert.returning_all();

    let row = query_one(txn, &insert)
        .await
        .map_err(|e| classify(table, e))?
        .ok_or(DbErr::RecordNotInserted)?;
    to_record(&row)
}

async fn find_one(
    txn: &DatabaseTransaction,
    config: &SchemaConfig,
    table: &str,
    criteria: &Record,
) -> Result<Option<Record>, StoreError> {
    let mut select = Query::select();
    select
        .column(Asterisk)
        .from(Alias::new(table))
        .cond_where(condition(config, table, criteria)?)
        .limit(1);
    match query_one(txn, &select).await? {
        Some(row) => to_record(&row).map(Some),
        None => Ok(None),
    }
}

fn to_record(row: &QueryResult) -> Result<Record, StoreError> {
    match JsonValue::from_query_result(row, "")? {
        JsonValue::Object(record) => Ok(record),
        _ => Ok(Record::new()),
    }
}

/// Equality on every entry, `IS NULL` for nulls.
fn condition(config: &SchemaConfig, table: &str, criteria: &Record) -> Result<Condition, StoreError> {
    let mut cond = Condition::all();
    for (field, value) in criteria {
        let column = Expr::col(Alias::new(field.as_str()));
        cond = cond.add(if value.is_null() {
            column.is_null()
        } else {
            column.eq(bind(config, table, field, value)?)
        });
    }
    Ok(cond)
}

// ---------- values ----------

fn scalar_type<'c>(config: &'c SchemaConfig, table: &str, field: &str) -> Option<(ScalarType, Option<&'c str>)> {
    match config.fields.get(table)?.get(field)? {
        FieldShape::Scalar { ty, enum_name, .. } => Some((*ty, enum_name.as_deref())),
        _ => None,
    }
}

/// Converts a JSON seed value into a bind expression for `table.field`.
/// Enum values are cast to the column's type, which only Postgres renders.
fn bind(config: &SchemaConfig, table: &str, field: &str, value: &JsonValue) -> Result<SimpleExpr, StoreError> {
    let Some((ty, enum_name)) = scalar_type(config, table, field) else {
        return Ok(untyped(value).into());
    };
    let value = bind_value(ty, table, field, value)?;
    Ok(match enum_name {
        Some(name) => Expr::val(value).as_enum(Alias::new(name)),
        None => value.into(),
    })
}

fn bind_value(ty: ScalarType, table: &str, field: &str, value: &JsonValue) -> Result<Value, StoreError> {
    let mismatch = || invalid(table, field, &format!("expected {ty:?}, got {value}"));

    match (ty, value) {
        (_, JsonValue::Null) => Ok(typed_null(ty)),
        (ScalarType::String | ScalarType::Enum, JsonValue::String(s)) => Ok(s.clone().into()),
        (ScalarType::Int, JsonValue::Number(n)) => n
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Value::from)
            .ok_or_else(mismatch),
        (ScalarType::BigInt, JsonValue::Number(n)) => n.as_i64().map(Value::from).ok_or_else(mismatch),
        (ScalarType::BigInt, JsonValue::String(s)) => {
            s.parse::<i64>().map(Value::from).map_err(|_| mismatch())
        }
        (ScalarType::Float, JsonValue::Number(n)) => n.as_f64().map(Value::from).ok_or_else(mismatch),
        (ScalarType::Decimal, JsonValue::Number(n)) => parse_decimal(&n.to_string()).ok_or_else(mismatch),
        (ScalarType::Decimal, JsonValue::String(s)) => parse_decimal(s).ok_or_else(mismatch),
        (ScalarType::Boolean, JsonValue::Bool(b)) => Ok((*b).into()),
        (ScalarType::DateTime, JsonValue::String(s)) => {
            parse_datetime(s).map(Value::from).ok_or_else(mismatch)
        }
        (ScalarType::Bytes, JsonValue::String(s)) => STANDARD
            .decode(s)
            .map(Value::from)
            .map_err(|e| invalid(table, field, &format!("invalid base64: {e}"))),
        (ScalarType::Json, value) => Ok(Value::from(value.clone())),
        _ => Err(mismatch()),
    }
}

fn typed_null(ty: ScalarType) -> Value {
    match ty {
        ScalarType::String | ScalarType::Enum => Value::String(None),
        ScalarType::Int => Value::Int(None),
        ScalarType::BigInt => Value::BigInt(None),
        ScalarType::Float => Value::Double(None),
        ScalarType::Decimal => Value::Decimal(None),
        ScalarType::Boolean => Value::Bool(None),
        ScalarType::DateTime => Value::ChronoDateTime(None),
        ScalarType::Bytes => Value::Bytes(None),
        ScalarType::Json => Value::Json(None),
    }
}

/// Keys read back from the store have no declared type of their own.
fn untyped(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::String(None),
        JsonValue::Bool(b) => (*b).into(),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.as_f64().unwrap_or_default().into(),
        },
        JsonValue::String(s) => s.clone().into(),
        other => Value::from(other.clone()),
    }
}

fn parse_decimal(s: &str) -> Option<Value> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
        .map(Value::from)
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}

fn generated_value(generated: Generated) -> Value {
    match generated {
        Generated::Uuid => Uuid::new_v4().to_string().into(),
        Generated::Now => Utc::now().naive_utc().into(),
    }
}

// ---------- errors ----------

fn invalid(table: &str, field: &str, reason: &str) -> StoreError {
    StoreError::InvalidValue {
        table: table.to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn connect_missing(table: &str, criteria: &Record) -> StoreError {
    StoreError::ConnectTargetMissing {
        table: table.to_string(),
        criteria: JsonValue::Object(criteria.clone()).to_string(),
    }
}

static NOT_NULL: OnceLock<Option<Regex>> = OnceLock::new();

/// Column named by a NOT NULL violation, for SQLite and Postgres wording.
fn not_null_column(message: &str) -> Option<String> {
    let re = NOT_NULL
        .get_or_init(|| {
            Regex::new(r#"NOT NULL constraint failed: (?:[\w"]+\.)?"?(\w+)|null value in column "(\w+)""#).ok()
        })
        .as_ref()?;
    let caps = re.captures(message)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

static CONTENT_REJECTED: OnceLock<Option<Regex>> = OnceLock::new();

/// CHECK violations and malformed input, for SQLite and Postgres wording.
fn rejects_content(message: &str) -> bool {
    CONTENT_REJECTED
        .get_or_init(|| {
            Regex::new(
                r"CHECK constraint failed|violates check constraint|invalid input (?:value for enum|syntax for type)",
            )
            .ok()
        })
        .as_ref()
        .is_some_and(|re| re.is_match(message))
}

/// Errors the seed values caused stay with their document; anything else is
/// a store failure.
fn classify(table: &str, err: DbErr) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => {
            return StoreError::Duplicate {
                table: table.to_string(),
                detail,
            };
        }
        Some(SqlErr::ForeignKeyConstraintViolation(detail)) => {
            return StoreError::Constraint {
                table: table.to_string(),
                detail,
            };
        }
        _ => {}
    }
    let message = err.to_string();
    if let Some(field) = not_null_column(&message) {
        return StoreError::MissingField {
            table: table.to_string(),
            field,
        };
    }
    if rejects_content(&message) {
        return StoreError::Constraint {
            table: table.to_string(),
            detail: message,
        };
    }
    StoreError::Database(err)
}
