use crate::storage::entity;
use log::info;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr,
    EntityTrait, Schema, Statement,
};
use std::time::Duration;

pub async fn establish_connection(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());
    opt.max_connections(10)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(60))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    if db.get_database_backend() == DatabaseBackend::Sqlite {
        // WAL lets pollers read while a worker commits results
        db.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            "PRAGMA journal_mode=WAL;".to_string(),
        ))
        .await?;
        db.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            "PRAGMA busy_timeout=5000;".to_string(),
        ))
        .await?;
    }

    create_schema(&db).await?;
    info!("database connection established url={}", db_url);
    Ok(db)
}

/// Private in-memory database. One pooled connection that is never
/// recycled, otherwise the data would vanish with it.
pub async fn establish_in_memory() -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_owned());
    opt.max_connections(1)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(false);
    let db = Database::connect(opt).await?;
    create_schema(&db).await?;
    Ok(db)
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let stmt = builder.build(schema.create_table_from_entity(entity).if_not_exists());
    db.execute(stmt).await?;
    Ok(())
}

async fn create_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    // parents before children so foreign keys resolve
    create_table(db, entity::Simulation).await?;
    create_table(db, entity::ContestResult).await?;
    create_table(db, entity::SweepJob).await?;
    create_table(db, entity::SweepChild).await?;
    create_table(db, entity::DrawRecord).await?;

    let backend = db.get_database_backend();
    for sql in [
        "CREATE INDEX IF NOT EXISTS idx_simulations_status ON simulations(status, id);",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_contest_results_contest ON contest_results(simulation_id, contest);",
        "CREATE INDEX IF NOT EXISTS idx_sweep_children_sweep ON sweep_children(sweep_id);",
    ] {
        db.execute(Statement::from_string(backend, sql.to_string()))
            .await?;
    }
    Ok(())
}
