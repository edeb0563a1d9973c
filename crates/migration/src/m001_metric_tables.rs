use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_metric_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

// Both dialects accept this DDL as-is. The empty-id check makes a bad record
// fail inside a batch transaction instead of silently creating a "" row.
const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS gauges (
    id TEXT PRIMARY KEY NOT NULL CHECK (id <> ''),
    value DOUBLE PRECISION NOT NULL
);

CREATE TABLE IF NOT EXISTS counters (
    id TEXT PRIMARY KEY NOT NULL CHECK (id <> ''),
    value BIGINT NOT NULL
);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS counters;
DROP TABLE IF EXISTS gauges;
";
