//! The seed ledger and its on-disk checksum artifacts.
//!
//! A ledger row means a document was applied in full. Next to it, under
//! `<migrations_dir>/<migration_name>/`, a `seed.sha256` sidecar stores the
//! content checksum and an empty `migration.sql` keeps the directory shaped
//! like a regular migration.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::entity::seed_migration;

pub type LedgerEntry = seed_migration::Model;

const CHECKSUM_FILE: &str = "seed.sha256";
const MIGRATION_FILE: &str = "migration.sql";

/// `001_users.json` → `001_users`.
pub fn pure_name(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
}

/// `<YYYYMMDDHHMMSS>_<pure name>`.
pub fn migration_name(pure_name: &str, at: NaiveDateTime) -> String {
    format!("{}_{}", at.format("%Y%m%d%H%M%S"), pure_name)
}

/// The live (not rolled back) ledger entry for a seed, if any. The name must
/// follow the timestamp's `_` so `users` never matches `admin_users`.
pub fn find_applied<'a>(ledger: &'a [LedgerEntry], pure_name: &str) -> Option<&'a LedgerEntry> {
    let suffix = format!("_{pure_name}");
    ledger
        .iter()
        .filter(|entry| entry.rolled_back_at.is_none())
        .find(|entry| entry.migration_name.ends_with(&suffix))
}

// ---------- artifacts ----------

#[derive(Debug, Clone)]
pub struct Artifacts {
    migrations_dir: PathBuf,
}

impl Artifacts {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    pub fn checksum_path(&self, migration_name: &str) -> PathBuf {
        self.migrations_dir.join(migration_name).join(CHECKSUM_FILE)
    }

    /// The stored checksum, or `None` when the sidecar does not exist.
    pub async fn read_checksum(&self, migration_name: &str) -> std::io::Result<Option<String>> {
        match tokio::fs::read_to_string(self.checksum_path(migration_name)).await {
            Ok(text) => Ok(Some(text.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn write(&self, migration_name: &str, checksum: &str) -> std::io::Result<()> {
        let dir = self.migrations_dir.join(migration_name);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(CHECKSUM_FILE), checksum).await?;
        tokio::fs::write(dir.join(MIGRATION_FILE), "").await
    }
}
