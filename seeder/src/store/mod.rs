use serde_json::{Map, Value as JsonValue};

use crate::ledger::LedgerEntry;
use crate::mapper::MapperError;

#[cfg(test)]
pub mod memory;
pub mod sea;

pub use sea::SeaStore;

/// One row-shaped JSON object: a seed record, a payload or a `where` filter.
pub type Record = Map<String, JsonValue>;

// ---------- errors ----------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate row in {table}: {detail}")]
    Duplicate { table: String, detail: String },
    #[error("missing required field `{field}` on {table}")]
    MissingField { table: String, field: String },
    /// A foreign-key, CHECK or input-syntax violation caused by seed values.
    #[error("{table} rejected the row: {detail}")]
    Constraint { table: String, detail: String },
    #[error("no {table} row matches {criteria} to connect")]
    ConnectTargetMissing { table: String, criteria: String },
    #[error("invalid value for {table}.{field}: {reason}")]
    InvalidValue {
        table: String,
        field: String,
        reason: String,
    },
    #[error("unknown table {0}")]
    UnknownTable(String),
    #[error("unknown field {table}.{field}")]
    UnknownField { table: String, field: String },
    #[error(transparent)]
    Mapper(#[from] MapperError),
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

// ---------- traits ----------

/// What seeding needs from the relational store. Table names are canonical.
#[async_trait::async_trait]
pub trait SeedStore: Send + Sync {
    /// Rows matching every `criteria` entry by equality.
    async fn count(&self, table: &str, criteria: &Record) -> Result<u64, StoreError>;

    async fn begin(&self) -> Result<Box<dyn SeedTransaction>, StoreError>;

    async fn read_ledger(&self) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), StoreError>;
}

/// A scoped handle; nothing is visible to other connections before `commit`.
#[async_trait::async_trait]
pub trait SeedTransaction: Send {
    /// Creates one row from a resolved payload, nested `create`/`connect`
    /// relation values included. A failed create leaves the transaction usable.
    async fn create(&mut self, table: &str, payload: &Record) -> Result<Record, StoreError>;

    /// Updates the row matching `criteria`, or creates `payload` when none does.
    async fn upsert(
        &mut self,
        table: &str,
        criteria: &Record,
        payload: &Record,
    ) -> Result<Record, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
