//! Database module
//!
//! This module provides all database functionality including:
//! - Schema and migrations for the settings and spellbook databases
//! - Model definitions and record validation
//! - Repository layer for CRUD operations

pub mod models;
pub mod repository;
pub mod schema;
pub mod validation;

pub use models::*;
pub use repository::{SettingsRepository, SpellbookRepository};
pub use schema::{initialize_database, Schema};

use crate::config::{BUSY_TIMEOUT, MAX_POOL_CONNECTIONS};
use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;

/// Build connection options shared by migration and application connections.
fn connect_options(db_path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .busy_timeout(BUSY_TIMEOUT)
        .journal_mode(SqliteJournalMode::Wal)
}

/// Open (creating if needed) the database at `db_path` and bring it up to
/// the latest version of `schema`.
///
/// Migrations run on a dedicated single-connection pool that is closed
/// before the application pool is created, so every pooled connection
/// sees the final schema.
pub async fn create_pool(db_path: &Path, schema: Schema) -> Result<SqlitePool> {
    tracing::info!("Opening {:?} database at: {:?}", schema, db_path);

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let migration_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options(db_path))
        .await?;

    initialize_database(&migration_pool, schema).await?;
    migration_pool.close().await;

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_POOL_CONNECTIONS)
        .connect_with(connect_options(db_path))
        .await?;

    tracing::info!("{:?} database pool created", schema);

    Ok(pool)
}

/// In-memory pool used by unit tests. A single connection keeps every query
/// on the same in-memory database.
#[cfg(test)]
pub(crate) async fn create_memory_pool(schema: Schema) -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    initialize_database(&pool, schema).await.unwrap();
    pool
}
