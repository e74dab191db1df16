//! In-memory [`SeedStore`] for unit tests. Rows are stored as given; nested
//! relation payloads are recorded, not expanded.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::Value as JsonValue;

use super::{Record, SeedStore, SeedTransaction, StoreError};
use crate::ledger::LedgerEntry;

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Create { table: String, payload: Record },
    Upsert { table: String, criteria: Record, payload: Record },
}

#[derive(Debug, Clone)]
pub enum Failure {
    Duplicate,
    MissingField(String),
}

struct Rule {
    table: String,
    field: String,
    value: JsonValue,
    failure: Failure,
}

#[derive(Default)]
struct State {
    rows: BTreeMap<String, Vec<Record>>,
    committed: Vec<Op>,
    attempts: usize,
    commits: usize,
    rollbacks: usize,
    ledger: Vec<LedgerEntry>,
    rules: Vec<Rule>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an existing row, visible to `count`.
    pub fn insert(&self, table: &str, row: JsonValue) -> &Self {
        if let JsonValue::Object(row) = row {
            self.lock().rows.entry(table.to_string()).or_default().push(row);
        }
        self
    }

    /// Makes creates on `table` whose `field` equals `value` fail.
    pub fn fail_when(&self, table: &str, field: &str, value: JsonValue, failure: Failure) -> &Self {
        self.lock().rules.push(Rule {
            table: table.to_string(),
            field: field.to_string(),
            value,
            failure,
        });
        self
    }

    pub fn committed(&self) -> Vec<Op> {
        self.lock().committed.clone()
    }

    /// Create and upsert calls, failed ones included.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.lock().ledger.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

fn matches(row: &Record, criteria: &Record) -> bool {
    criteria
        .iter()
        .all(|(field, value)| row.get(field).unwrap_or(&JsonValue::Null) == value)
}

#[async_trait::async_trait]
impl SeedStore for MemoryStore {
    async fn count(&self, table: &str, criteria: &Record) -> Result<u64, StoreError> {
        let state = self.lock();
        let count = state
            .rows
            .get(table)
            .map(|rows| rows.iter().filter(|row| matches(row, criteria)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn begin(&self) -> Result<Box<dyn SeedTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            pending: Vec::new(),
        }))
    }

    async fn read_ledger(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self.ledger())
    }

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.lock().ledger.push(entry.clone());
        Ok(())
    }
}

struct MemoryTransaction {
    store: MemoryStore,
    pending: Vec<Op>,
}

impl MemoryTransaction {
    fn check(&self, table: &str, payload: &Record) -> Result<(), StoreError> {
        let mut state = self.store.lock();
        state.attempts += 1;
        let rule = state.rules.iter().find(|rule| {
            rule.table == table && payload.get(&rule.field) == Some(&rule.value)
        });
        match rule.map(|rule| rule.failure.clone()) {
            Some(Failure::Duplicate) => Err(StoreError::Duplicate {
                table: table.to_string(),
                detail: "UNIQUE constraint failed".to_string(),
            }),
            Some(Failure::MissingField(field)) => Err(StoreError::MissingField {
                table: table.to_string(),
                field,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl SeedTransaction for MemoryTransaction {
    async fn create(&mut self, table: &str, payload: &Record) -> Result<Record, StoreError> {
        self.check(table, payload)?;
        self.pending.push(Op::Create {
            table: table.to_string(),
            payload: payload.clone(),
        });
        Ok(payload.clone())
    }

    async fn upsert(
        &mut self,
        table: &str,
        criteria: &Record,
        payload: &Record,
    ) -> Result<Record, StoreError> {
        self.check(table, payload)?;
        self.pending.push(Op::Upsert {
            table: table.to_string(),
            criteria: criteria.clone(),
            payload: payload.clone(),
        });
        Ok(payload.clone())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { store, pending } = *self;
        let mut state = store.lock();
        state.commits += 1;
        for op in pending {
            let (Op::Create { table, payload } | Op::Upsert { table, payload, .. }) = &op;
            state.rows.entry(table.clone()).or_default().push(payload.clone());
            state.committed.push(op);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.store.lock().rollbacks += 1;
        Ok(())
    }
}
