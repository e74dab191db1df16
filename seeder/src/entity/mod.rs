pub mod seed_migration;
