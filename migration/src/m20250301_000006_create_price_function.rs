use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{ConnectionTrait, DatabaseBackend};

#[derive(DeriveMigrationName)]
pub struct Migration;

// Placeholder tariff; deployments replace the function body with the real one.
const CREATE_PRICE_FUNCTION: &str = r#"
CREATE OR REPLACE FUNCTION calculate_ride_price(pickup_location TEXT, dropoff_location TEXT)
RETURNS DOUBLE PRECISION
LANGUAGE sql
IMMUTABLE
AS $$
    SELECT ROUND((80 + 3 * (char_length($1) + char_length($2)))::numeric, 2)::double precision
$$;
"#;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if manager.get_database_backend() != DatabaseBackend::Postgres {
            return Ok(());
        }

        manager
            .get_connection()
            .execute_unprepared(CREATE_PRICE_FUNCTION)
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if manager.get_database_backend() != DatabaseBackend::Postgres {
            return Ok(());
        }

        manager
            .get_connection()
            .execute_unprepared("DROP FUNCTION IF EXISTS calculate_ride_price(TEXT, TEXT)")
            .await?;

        Ok(())
    }
}
