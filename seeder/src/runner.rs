//! Applies every seed document in a directory, one after the other.

use std::path::{Path, PathBuf};

use crate::applier::{SeedApplier, SeedError, SeedOutcome};
use crate::document::SeedDocument;

#[derive(Debug, Default)]
pub struct RunSummary {
    pub applied: usize,
    pub skipped: usize,
    /// `(seed name, error)` for documents that failed on their own.
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// `*.json` files directly under `dir`, in lexicographic order. A missing
/// directory holds no seeds.
pub async fn list_seeds(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(dir = %dir.display(), "seeds directory not found");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut seeds = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") && entry.file_type().await?.is_file() {
            seeds.push(path);
        }
    }
    seeds.sort();
    Ok(seeds)
}

/// Documents run strictly in order so later ones can connect to rows earlier
/// ones created. A failed document does not stop the run; a store or
/// filesystem failure does.
pub async fn run(applier: &mut SeedApplier<'_>, seeds_dir: &Path) -> Result<RunSummary, SeedError> {
    let mut summary = RunSummary::default();

    for path in list_seeds(seeds_dir).await? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let result = match SeedDocument::load(&path).await {
            Ok(doc) => applier.apply(&doc).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(SeedOutcome::Applied { .. }) => summary.applied += 1,
            Ok(SeedOutcome::Skipped { .. }) => summary.skipped += 1,
            Err(e) if e.is_fatal_for_run() => return Err(e),
            Err(e) => {
                tracing::error!(seed = %name, error = %e, "seed failed");
                summary.failed.push((name, e.to_string()));
            }
        }
    }

    tracing::info!(
        applied = summary.applied,
        skipped = summary.skipped,
        failed = summary.failed.len(),
        "seeding finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryStore, Op};
    use crate::testing::library_config;

    fn write(dir: &Path, name: &str, text: &str) {
        std::fs::write(dir.join(name), text).unwrap();
    }

    #[tokio::test]
    async fn test_list_seeds_sorted_json_only() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "002_books.json", "{}");
        write(dir.path(), "001_authors.json", "{}");
        write(dir.path(), "README.md", "");
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();

        let names: Vec<String> = list_seeds(dir.path())
            .await
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["001_authors.json", "002_books.json"]);

        let missing = list_seeds(&dir.path().join("absent")).await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_failed_document_does_not_stop_the_run() {
        let seeds = tempfile::tempdir().unwrap();
        let migrations = tempfile::tempdir().unwrap();
        write(seeds.path(), "001_authors.json", r#"{ "author": { "data": [{ "name": "Ada" }] } }"#);
        write(seeds.path(), "002_broken.json", r#"{ "author": { "data": "#);
        write(
            seeds.path(),
            "003_books.json",
            r#"{ "book": { "data": [{ "title": "T1", "author": { "name": "Ada" } }] } }"#,
        );

        let config = library_config();
        let store = MemoryStore::new();
        let mut applier = SeedApplier::new(&config, &store, migrations.path(), Vec::new());
        let summary = run(&mut applier, seeds.path()).await.unwrap();

        assert_eq!(summary.applied, 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "002_broken.json");
        assert!(!summary.is_success());

        // The book connects to the author the first document created.
        let Op::Create { payload, .. } = &store.committed()[1] else {
            panic!("expected a create");
        };
        assert_eq!(payload["author"], serde_json::json!({ "connect": { "name": "Ada" } }));

        let summary = run(&mut applier, seeds.path()).await.unwrap();
        assert_eq!((summary.applied, summary.skipped), (0, 2));
    }
}
