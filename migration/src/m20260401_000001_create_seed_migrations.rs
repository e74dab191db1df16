use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SeedMigrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SeedMigrations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SeedMigrations::Checksum)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SeedMigrations::StartedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(SeedMigrations::FinishedAt).timestamp().null())
                    .col(ColumnDef::new(SeedMigrations::Logs).text().null())
                    .col(
                        ColumnDef::new(SeedMigrations::MigrationName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SeedMigrations::RolledBackAt)
                            .timestamp()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SeedMigrations::AppliedStepsCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_seed_migrations_name")
                    .table(SeedMigrations::Table)
                    .col(SeedMigrations::MigrationName)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SeedMigrations::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SeedMigrations {
    #[iden = "_seed_migrations"]
    Table,
    Id,
    Checksum,
    StartedAt,
    FinishedAt,
    Logs,
    MigrationName,
    RolledBackAt,
    AppliedStepsCount,
}
