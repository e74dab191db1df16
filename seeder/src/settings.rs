use std::path::PathBuf;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://seed.db?mode=rwc";
pub const DEFAULT_SEEDS_DIR: &str = "prisma/seeds";
pub const DEFAULT_MIGRATIONS_DIR: &str = "prisma/migrations";
pub const DEFAULT_CONFIG_FILE: &str = "node_modules/.prisma/seed/config.json";

/// Runtime settings. Read from `SEED_*` environment variables (after `.env`
/// is loaded); command-line flags override individual values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub seeds_dir: PathBuf,
    pub migrations_dir: PathBuf,
    pub config_file: PathBuf,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        Self {
            database_url: var("SEED_DATABASE_URL", DEFAULT_DATABASE_URL),
            seeds_dir: var("SEED_SEEDS_DIR", DEFAULT_SEEDS_DIR).into(),
            migrations_dir: var("SEED_MIGRATIONS_DIR", DEFAULT_MIGRATIONS_DIR).into(),
            config_file: var("SEED_CONFIG_FILE", DEFAULT_CONFIG_FILE).into(),
        }
    }
}

/// Masks the password of a database URL and drops its query string, for logs.
pub fn redact_db_url(url: &str) -> String {
    let base = url.split('?').next().unwrap_or(url);
    if let Some(scheme_end) = base.find("://")
        && let Some(at) = base.rfind('@')
        && let Some((user, _)) = base
            .get(scheme_end + 3..at)
            .and_then(|userinfo| userinfo.split_once(':'))
    {
        return format!("{}://{}:****{}", &base[..scheme_end], user, &base[at..]);
    }
    base.to_string()
}
