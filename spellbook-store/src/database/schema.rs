//! Database schema and migrations
//!
//! Two kinds of database exist: the single settings database and one
//! database per spellbook. Each carries its own migration list.

use crate::error::Result;
use sqlx::{sqlite::SqlitePool, Row};

/// Which family of migrations a database follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    Settings,
    Spellbook,
}

impl Schema {
    fn migrations(self) -> Vec<(i32, &'static str)> {
        match self {
            Schema::Settings => vec![(1, include_str!("migrations/settings/001_initial_schema.sql"))],
            Schema::Spellbook => vec![(1, include_str!("migrations/spellbook/001_initial_schema.sql"))],
        }
    }
}

/// Initialize database with schema
pub async fn initialize_database(pool: &SqlitePool, schema: Schema) -> Result<()> {
    tracing::debug!("Initializing {:?} schema", schema);

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current_version: i32 = sqlx::query("SELECT COALESCE(MAX(version), 0) FROM migrations")
        .fetch_one(pool)
        .await?
        .get(0);

    tracing::debug!("Current {:?} schema version: {}", schema, current_version);

    apply_migrations(pool, schema, current_version).await?;

    Ok(())
}

async fn apply_migrations(pool: &SqlitePool, schema: Schema, current_version: i32) -> Result<()> {
    for (version, sql) in schema.migrations() {
        if version <= current_version {
            continue;
        }

        tracing::info!("Applying {:?} migration version {}", schema, version);

        let mut tx = pool.begin().await?;

        for statement in sql.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query("INSERT INTO migrations (version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
    }

    Ok(())
}
