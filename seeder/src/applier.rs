//! Applies one seed document exactly once per content version.
//!
//! identify → checksum → compare → resolve → apply → record. A ledger entry
//! is only written after the document's transaction committed, and the
//! checksum sidecar only after the ledger entry.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::config::SchemaConfig;
use crate::document::{DocumentError, SeedDocument};
use crate::ledger::{self, Artifacts, LedgerEntry};
use crate::mapper::NameMapper;
use crate::resolver::{ResolveError, SeedResolver};
use crate::store::{Record, SeedStore, SeedTransaction, StoreError};

// ---------- errors ----------

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(
        "Seed \"{name}\" changed since it was applied as {migration_name}. Roll it back before seeding it again."
    )]
    Diverged {
        name: String,
        migration_name: String,
    },
    #[error("Seed \"{name}\" could not be resolved: {source}")]
    Resolve { name: String, source: ResolveError },
    #[error(
        "Seed \"{name}\" is missing required field `{field}` on {table}. Check: {}",
        paths.join(", ")
    )]
    MissingField {
        name: String,
        table: String,
        field: String,
        paths: Vec<String>,
    },
    #[error("Seed \"{name}\" was rejected by the store: {source}")]
    Rejected { name: String, source: StoreError },
    #[error("store failure: {0}")]
    Store(#[source] StoreError),
    #[error("failed to access seed artifacts: {0}")]
    Artifacts(#[from] std::io::Error),
}

impl SeedError {
    /// Store and filesystem failures stop the run; everything else only
    /// fails the document it came from.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, SeedError::Store(_) | SeedError::Artifacts(_))
    }

    fn from_store(name: &str, err: StoreError) -> Self {
        match err {
            StoreError::Database(_) => SeedError::Store(err),
            other => SeedError::Rejected {
                name: name.to_string(),
                source: other,
            },
        }
    }

    fn from_resolve(name: &str, err: ResolveError) -> Self {
        match err {
            ResolveError::Store(err) => SeedError::from_store(name, err),
            other => SeedError::Resolve {
                name: name.to_string(),
                source: other,
            },
        }
    }
}

// ---------- outcome ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    Applied {
        migration_name: String,
        checksum: String,
    },
    Skipped {
        checksum: String,
    },
}

/// One top-level table of a document after resolution.
#[derive(Debug, Clone)]
pub struct SeedDatum {
    pub table: String,
    pub data: Vec<Record>,
    pub paths: BTreeSet<String>,
    pub upsert_by: Option<Vec<String>>,
}

// ---------- applier ----------

pub struct SeedApplier<'a> {
    mapper: NameMapper<'a>,
    store: &'a dyn SeedStore,
    artifacts: Artifacts,
    ledger: Vec<LedgerEntry>,
}

impl<'a> SeedApplier<'a> {
    /// `ledger` is read once per run; entries appended here are added to it.
    pub fn new(
        config: &'a SchemaConfig,
        store: &'a dyn SeedStore,
        migrations_dir: impl Into<PathBuf>,
        ledger: Vec<LedgerEntry>,
    ) -> Self {
        Self {
            mapper: NameMapper::new(config),
            store,
            artifacts: Artifacts::new(migrations_dir),
            ledger,
        }
    }

    pub fn ledger(&self) -> &[LedgerEntry] {
        &self.ledger
    }

    pub async fn apply(&mut self, doc: &SeedDocument) -> Result<SeedOutcome, SeedError> {
        let pure_name = ledger::pure_name(&doc.name);
        let checksum = doc.checksum();

        if let Some(prior) = ledger::find_applied(&self.ledger, pure_name)
            && let Some(stored) = self.artifacts.read_checksum(&prior.migration_name).await?
        {
            if stored == checksum {
                tracing::info!(seed = %doc.name, checksum = %checksum, "seed already applied, skipping");
                return Ok(SeedOutcome::Skipped { checksum });
            }
            return Err(SeedError::Diverged {
                name: doc.name.clone(),
                migration_name: prior.migration_name.clone(),
            });
        }

        let started_at = Utc::now().naive_utc();
        let data = self.resolve(doc).await?;

        let mut txn = self.store.begin().await.map_err(SeedError::Store)?;
        match apply_data(txn.as_mut(), &doc.name, &data).await {
            Ok(()) => txn.commit().await.map_err(SeedError::Store)?,
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    tracing::error!(seed = %doc.name, error = %rollback, "rollback failed");
                }
                return Err(e);
            }
        }

        let finished_at = Utc::now().naive_utc();
        let migration_name = ledger::migration_name(pure_name, finished_at);
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            checksum: checksum.clone(),
            started_at,
            finished_at: Some(finished_at),
            logs: None,
            migration_name: migration_name.clone(),
            rolled_back_at: None,
            applied_steps_count: 1,
        };
        self.store
            .append_ledger_entry(&entry)
            .await
            .map_err(SeedError::Store)?;
        self.artifacts.write(&migration_name, &checksum).await?;
        self.ledger.push(entry);

        tracing::info!(
            seed = %doc.name,
            migration = %migration_name,
            checksum = %checksum,
            "seed applied"
        );
        Ok(SeedOutcome::Applied {
            migration_name,
            checksum,
        })
    }

    /// One datum per top-level table, in document order. Table keys are
    /// checked before any of them is resolved.
    async fn resolve(&self, doc: &SeedDocument) -> Result<Vec<SeedDatum>, SeedError> {
        let mut tables = Vec::with_capacity(doc.tables().len());
        for table in doc.tables() {
            let canonical = self.mapper.table_name(&table.key).ok_or_else(|| {
                SeedError::Document(DocumentError::Invalid {
                    name: doc.name.clone(),
                    reason: format!("unknown table `{}`", table.key),
                })
            })?;
            tables.push((canonical, table));
        }

        let resolver = SeedResolver::new(self.mapper, self.store);
        let mut data = Vec::with_capacity(tables.len());
        for (canonical, table) in tables {
            let value = JsonValue::Array(table.data.iter().cloned().map(JsonValue::Object).collect());
            let resolution = resolver
                .resolve(canonical, &value, &table.key)
                .await
                .map_err(|e| SeedError::from_resolve(&doc.name, e))?;
            let records = match resolution.value {
                JsonValue::Array(items) => items
                    .into_iter()
                    .filter_map(|item| match item {
                        JsonValue::Object(record) => Some(record),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            data.push(SeedDatum {
                table: canonical.to_string(),
                data: records,
                paths: resolution.paths,
                upsert_by: table.upsert_by.clone(),
            });
        }
        Ok(data)
    }
}

async fn apply_data(
    txn: &mut dyn SeedTransaction,
    name: &str,
    data: &[SeedDatum],
) -> Result<(), SeedError> {
    for datum in data {
        for record in &datum.data {
            let result = match &datum.upsert_by {
                Some(keys) => {
                    let criteria: Record = keys
                        .iter()
                        .map(|key| (key.clone(), record.get(key).cloned().unwrap_or(JsonValue::Null)))
                        .collect();
                    txn.upsert(&datum.table, &criteria, record).await
                }
                None => txn.create(&datum.table, record).await,
            };

            match result {
                Ok(_) => {}
                Err(StoreError::Duplicate { detail, .. }) if datum.upsert_by.is_none() => {
                    tracing::warn!(
                        seed = %name,
                        table = %datum.table,
                        detail = %detail,
                        "duplicate row; add \"upsertBy\" to this table's seed data to match existing rows. Skipping its remaining rows"
                    );
                    break;
                }
                Err(StoreError::MissingField { table, field }) => {
                    return Err(SeedError::MissingField {
                        name: name.to_string(),
                        table,
                        field,
                        paths: datum.paths.iter().cloned().collect(),
                    });
                }
                Err(e) => return Err(SeedError::from_store(name, e)),
            }
        }
    }
    Ok(())
}
