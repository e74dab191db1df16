use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use seeder::analyzer::Analyzer;
use seeder::applier::SeedApplier;
use seeder::config::SchemaConfig;
use seeder::document::SeedDocument;
use seeder::runner;
use seeder::schema::Datamodel;
use seeder::settings::{Settings, redact_db_url};
use seeder::store::{SeaStore, SeedStore};

#[derive(Parser)]
#[command(name = "seedgraph", about = "Seedgraph: nested relational seeding, applied once per content version")]
struct Cli {
    /// Database URL (overrides SEED_DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,
    /// Derived schema config file (overrides SEED_CONFIG_FILE)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a DMMF schema and save the derived config
    Analyze {
        #[arg(long)]
        schema: PathBuf,
    },
    /// Apply pending seed documents (default)
    Seed {
        #[arg(long)]
        seeds_dir: Option<PathBuf>,
        #[arg(long)]
        migrations_dir: Option<PathBuf>,
    },
    /// Print the content checksum of a seed document
    Checksum { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Init structured logging (respects RUST_LOG; defaults to info)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Load .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    if let Some(url) = cli.database_url {
        settings.database_url = url;
    }
    if let Some(config) = cli.config {
        settings.config_file = config;
    }

    match cli.command {
        Some(Commands::Analyze { schema }) => analyze(&settings, schema).await,
        Some(Commands::Checksum { file }) => {
            let doc = SeedDocument::load(&file).await?;
            println!("{}", doc.checksum());
            Ok(())
        }
        Some(Commands::Seed {
            seeds_dir,
            migrations_dir,
        }) => {
            if let Some(dir) = seeds_dir {
                settings.seeds_dir = dir;
            }
            if let Some(dir) = migrations_dir {
                settings.migrations_dir = dir;
            }
            seed(&settings).await
        }
        None => seed(&settings).await,
    }
}

async fn analyze(settings: &Settings, schema: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let text = tokio::fs::read_to_string(&schema).await?;
    let datamodel = Datamodel::from_json(&text)?;
    let config = Analyzer::new(&datamodel).analyze()?;

    for table in config.fields.keys() {
        let unique = config.unique_fields.get(table).cloned().unwrap_or_default();
        let related = config.relational_models.get(table).cloned().unwrap_or_default();
        tracing::info!(
            table = %table,
            unique = ?unique,
            related = ?related,
            "table analyzed"
        );
    }

    config.save(&settings.config_file).await?;
    tracing::info!(
        path = %settings.config_file.display(),
        tables = config.fields.len(),
        relations = config.relations.len(),
        "schema config saved"
    );
    Ok(())
}

async fn seed(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(database = %redact_db_url(&settings.database_url), "connecting to database");

    let db = Database::connect(&settings.database_url).await?;
    Migrator::up(&db, None).await?;

    tracing::info!("seed ledger ready");

    let config = Arc::new(SchemaConfig::load(&settings.config_file).await?);
    let store = SeaStore::new(db, config.clone());
    let ledger = store.read_ledger().await?;

    let mut applier = SeedApplier::new(&config, &store, &settings.migrations_dir, ledger);
    let summary = runner::run(&mut applier, &settings.seeds_dir).await?;

    if !summary.is_success() {
        return Err(format!("{} seed document(s) failed", summary.failed.len()).into());
    }
    Ok(())
}
