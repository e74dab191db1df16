use sea_orm::entity::prelude::*;
use uuid::Uuid;

/// One applied seed document. Rows are appended, never updated by the seeder.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "_seed_migrations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub checksum: String,
    pub started_at: DateTime,
    pub finished_at: Option<DateTime>,
    pub logs: Option<String>,
    pub migration_name: String,
    pub rolled_back_at: Option<DateTime>,
    pub applied_steps_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
