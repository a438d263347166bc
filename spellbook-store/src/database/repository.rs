//! Repository layer for database operations
//!
//! `SettingsRepository` wraps the settings database, `SpellbookRepository`
//! one spellbook database. Multi-statement operations run in a transaction.

use super::models::*;
use crate::error::Result;
use sqlx::{Sqlite, SqlitePool, Transaction};

/// Page used to park a record while two pages are exchanged
const SWAP_PARKING_PAGE: i64 = -1;

/// Repository for the settings table
#[derive(Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Set setting: {} = {}", key, value);
        Ok(())
    }

    /// Insert a setting only if the key is absent. Returns whether a row was written.
    pub async fn insert_setting_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let rows = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows > 0)
    }

    pub async fn delete_setting(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Deleted setting: {}", key);
        Ok(())
    }

    /// Every stored row, including keys the application no longer knows
    pub async fn list_settings(&self) -> Result<Vec<Setting>> {
        let settings = sqlx::query_as::<_, Setting>("SELECT key, value FROM settings ORDER BY key")
            .fetch_all(&self.pool)
            .await?;

        Ok(settings)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Repository for the spells and notes of one spellbook database
#[derive(Clone)]
pub struct SpellbookRepository {
    pool: SqlitePool,
}

impl SpellbookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    // ===== Spells =====

    pub async fn get_spell(&self, page: PageNumber) -> Result<Option<Spell>> {
        let row = sqlx::query_as::<_, SpellRow>("SELECT * FROM spells WHERE page = ?")
            .bind(i64::from(page))
            .fetch_optional(&self.pool)
            .await?;

        row.map(Spell::try_from).transpose()
    }

    /// Insert or replace the spell stored at `spell.page`
    pub async fn upsert_spell(&self, spell: &Spell) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO spells (page, name, incant, speed, spell_range, damage_type,
                                description, level, icon_data, icon_mime, icon_link, icon_fit)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(page) DO UPDATE SET
                name = excluded.name,
                incant = excluded.incant,
                speed = excluded.speed,
                spell_range = excluded.spell_range,
                damage_type = excluded.damage_type,
                description = excluded.description,
                level = excluded.level,
                icon_data = excluded.icon_data,
                icon_mime = excluded.icon_mime,
                icon_link = excluded.icon_link,
                icon_fit = excluded.icon_fit
            "#,
        )
        .bind(i64::from(spell.page))
        .bind(&spell.name)
        .bind(&spell.incant)
        .bind(&spell.speed)
        .bind(&spell.range)
        .bind(&spell.damage_type)
        .bind(&spell.description)
        .bind(spell.level)
        .bind(spell.icon.data_column())
        .bind(spell.icon.mime_column())
        .bind(spell.icon.link_column())
        .bind(spell.icon_fit.as_str())
        .execute(&self.pool)
        .await?;

        tracing::debug!("Saved spell at page {}", spell.page);
        Ok(())
    }

    /// Spells in ascending page order
    pub async fn list_spells(&self) -> Result<Vec<Spell>> {
        let rows = sqlx::query_as::<_, SpellRow>("SELECT * FROM spells ORDER BY page ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Spell::try_from).collect()
    }

    pub async fn highest_spell_page(&self) -> Result<Option<PageNumber>> {
        let page: Option<i64> = sqlx::query_scalar("SELECT MAX(page) FROM spells")
            .fetch_one(&self.pool)
            .await?;

        Ok(page.and_then(|page| PageNumber::try_from(page).ok()))
    }

    /// Delete the spell at `page` and move every later spell down one page,
    /// in one transaction. Returns the number of spells moved, or `None`
    /// when no spell was stored at `page`.
    pub async fn delete_spell_and_renumber(&self, page: PageNumber) -> Result<Option<u64>> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM spells WHERE page = ?")
            .bind(i64::from(page))
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let later: Vec<i64> =
            sqlx::query_scalar("SELECT page FROM spells WHERE page > ? ORDER BY page ASC")
                .bind(i64::from(page))
                .fetch_all(&mut *tx)
                .await?;

        // Ascending order: each target page was vacated by the previous step.
        for old_page in &later {
            move_page(&mut tx, "spells", *old_page, old_page - 1).await?;
        }

        tx.commit().await?;

        tracing::debug!("Deleted spell at page {} and renumbered {} spells", page, later.len());
        Ok(Some(later.len() as u64))
    }

    /// Exchange the pages of two stored spells in one transaction.
    /// Returns false, writing nothing, when either page is empty.
    pub async fn swap_spell_pages(&self, page_a: PageNumber, page_b: PageNumber) -> Result<bool> {
        let (a, b) = (i64::from(page_a), i64::from(page_b));
        let mut tx = self.pool.begin().await?;

        let present: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM spells WHERE page IN (?, ?)")
            .bind(a)
            .bind(b)
            .fetch_one(&mut *tx)
            .await?;

        let expected = if a == b { 1 } else { 2 };
        if present != expected {
            tx.rollback().await?;
            return Ok(false);
        }

        if a != b {
            move_page(&mut tx, "spells", a, SWAP_PARKING_PAGE).await?;
            move_page(&mut tx, "spells", b, a).await?;
            move_page(&mut tx, "spells", SWAP_PARKING_PAGE, b).await?;
        }

        tx.commit().await?;

        tracing::debug!("Swapped spell pages {} and {}", page_a, page_b);
        Ok(true)
    }

    // ===== Notes =====

    pub async fn get_note(&self, page: PageNumber) -> Result<Option<Note>> {
        let row = sqlx::query_as::<_, NoteRow>("SELECT * FROM notes WHERE page = ?")
            .bind(i64::from(page))
            .fetch_optional(&self.pool)
            .await?;

        row.map(Note::try_from).transpose()
    }

    /// Insert or replace the note stored at `note.page`, keeping `note.date` as given
    pub async fn upsert_note(&self, note: &Note) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notes (page, title, note_type, content, icon_data, icon_mime,
                               icon_link, icon_fit, date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(page) DO UPDATE SET
                title = excluded.title,
                note_type = excluded.note_type,
                content = excluded.content,
                icon_data = excluded.icon_data,
                icon_mime = excluded.icon_mime,
                icon_link = excluded.icon_link,
                icon_fit = excluded.icon_fit,
                date = excluded.date
            "#,
        )
        .bind(i64::from(note.page))
        .bind(&note.title)
        .bind(&note.note_type)
        .bind(&note.content)
        .bind(note.icon.data_column())
        .bind(note.icon.mime_column())
        .bind(note.icon.link_column())
        .bind(note.icon_fit.as_str())
        .bind(note.date)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Saved note at page {}", note.page);
        Ok(())
    }

    /// Returns whether a note was stored at `page`
    pub async fn delete_note(&self, page: PageNumber) -> Result<bool> {
        let rows = sqlx::query("DELETE FROM notes WHERE page = ?")
            .bind(i64::from(page))
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::debug!("Deleted note at page {} ({} rows)", page, rows);
        Ok(rows > 0)
    }

    /// Notes in ascending page order
    pub async fn list_notes(&self) -> Result<Vec<Note>> {
        let rows = sqlx::query_as::<_, NoteRow>("SELECT * FROM notes ORDER BY page ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Note::try_from).collect()
    }

    pub async fn highest_note_page(&self) -> Result<Option<PageNumber>> {
        let page: Option<i64> = sqlx::query_scalar("SELECT MAX(page) FROM notes")
            .fetch_one(&self.pool)
            .await?;

        Ok(page.and_then(|page| PageNumber::try_from(page).ok()))
    }

    /// Remove every spell and note
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM spells").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM notes").execute(&mut *tx).await?;
        tx.commit().await?;

        tracing::debug!("Cleared all spells and notes");
        Ok(())
    }
}

async fn move_page(
    tx: &mut Transaction<'_, Sqlite>,
    table: &'static str,
    from: i64,
    to: i64,
) -> Result<()> {
    sqlx::query(&format!("UPDATE {} SET page = ? WHERE page = ?", table))
        .bind(to)
        .bind(from)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
