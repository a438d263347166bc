//! Import and export of a whole spellbook
//!
//! The export format is a JSON object
//! `{spells, notes, name, exportDate}`. Stored icons travel as base64
//! `data:` URLs. Import also accepts the legacy format, a bare array of
//! spell records.

use crate::database::validation::{parse_legacy_record, parse_record, Record};
use crate::database::{Note, Spell};
use crate::error::{Result, StoreError};
use crate::services::spellbook::SpellbookStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tokio::fs;

/// Snapshot of one spellbook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpellbookExport {
    pub spells: Vec<Spell>,
    pub notes: Vec<Note>,
    pub name: String,
    pub export_date: DateTime<Utc>,
}

/// Records waiting to be imported, still unvalidated
#[derive(Debug, Clone, Default)]
pub struct ImportData {
    pub spells: Vec<Value>,
    pub notes: Vec<Value>,
    /// Records come from the flat-array format; absent fields take defaults
    pub legacy: bool,
}

impl ImportData {
    /// Accepts the structured export object or a legacy array of spells
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Array(spells) => Ok(Self {
                spells,
                notes: Vec::new(),
                legacy: true,
            }),
            Value::Object(mut fields) => Ok(Self {
                spells: take_records(&mut fields, "spells")?,
                notes: take_records(&mut fields, "notes")?,
                legacy: false,
            }),
            _ => Err(StoreError::InvalidImport(
                "expected an export object or an array of spells".to_string(),
            )),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| StoreError::InvalidImport(format!("not valid JSON: {}", e)))?;
        Self::from_json(value)
    }
}

impl TryFrom<&SpellbookExport> for ImportData {
    type Error = StoreError;

    fn try_from(export: &SpellbookExport) -> Result<Self> {
        let spells: Vec<Value> = export
            .spells
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<_, _>>()?;
        let notes: Vec<Value> = export
            .notes
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<_, _>>()?;

        Ok(Self {
            spells,
            notes,
            legacy: false,
        })
    }
}

fn take_records(fields: &mut serde_json::Map<String, Value>, key: &str) -> Result<Vec<Value>> {
    match fields.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(records)) => Ok(records),
        Some(_) => Err(StoreError::InvalidImport(format!("\"{}\" must be an array", key))),
    }
}

/// Outcome of an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub spells_imported: usize,
    pub spells_skipped: usize,
    pub notes_imported: usize,
    pub notes_skipped: usize,
}

impl ImportReport {
    pub fn skipped(&self) -> usize {
        self.spells_skipped + self.notes_skipped
    }
}

/// Validate one record; a schema violation is logged and yields `None`.
fn accept<R: Record + Serialize>(record: Value, legacy: bool) -> Result<Option<R>> {
    let parsed = if legacy {
        parse_legacy_record::<R>(record)
    } else {
        parse_record::<R>(record)
    };

    match parsed {
        Ok(record) => Ok(Some(record)),
        Err(StoreError::SchemaViolation(reason)) => {
            tracing::warn!("Skipping {} during import: {}", R::KIND, reason);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl SpellbookStore {
    /// Snapshot every spell and note of the active spellbook
    pub async fn export_all(&mut self) -> Result<SpellbookExport> {
        let repo = self.repository().await?;

        let export = SpellbookExport {
            spells: repo.list_spells().await?,
            notes: repo.list_notes().await?,
            name: self.open_spellbook_name().unwrap_or_default().to_string(),
            export_date: Utc::now(),
        };

        tracing::info!(
            "Exported spellbook {}: {} spells, {} notes",
            export.name,
            export.spells.len(),
            export.notes.len()
        );
        Ok(export)
    }

    /// Upsert every valid record into the active spellbook.
    ///
    /// Invalid records are skipped and counted; records already written stay
    /// written if a later one fails. Notes keep their exported date.
    pub async fn import_all(&mut self, data: ImportData) -> Result<ImportReport> {
        let repo = self.repository().await?;
        let mut report = ImportReport::default();

        for record in data.spells {
            match accept::<Spell>(record, data.legacy)? {
                Some(spell) => {
                    repo.upsert_spell(&spell).await?;
                    report.spells_imported += 1;
                }
                None => report.spells_skipped += 1,
            }
        }

        for record in data.notes {
            match accept::<Note>(record, data.legacy)? {
                Some(note) => {
                    repo.upsert_note(&note).await?;
                    report.notes_imported += 1;
                }
                None => report.notes_skipped += 1,
            }
        }

        tracing::info!(
            "Imported {} spells and {} notes, skipped {} records",
            report.spells_imported,
            report.notes_imported,
            report.skipped()
        );
        Ok(report)
    }

    /// Empty the active spellbook, then import `data` into it
    pub async fn replace_all(&mut self, data: ImportData) -> Result<ImportReport> {
        self.clear_all_content().await?;
        self.import_all(data).await
    }

    /// Write the export of the active spellbook to `path` as pretty JSON
    pub async fn export_to_file(&mut self, path: &Path) -> Result<SpellbookExport> {
        let export = self.export_all().await?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&export)?;
        fs::write(path, json).await?;

        tracing::info!("Export written to {:?}", path);
        Ok(export)
    }

    /// Import an export file (structured or legacy) into the active spellbook
    pub async fn import_from_file(&mut self, path: &Path) -> Result<ImportReport> {
        tracing::info!("Importing from {:?}", path);

        let json = fs::read_to_string(path).await?;
        let data = ImportData::from_json_str(&json)?;
        self.import_all(data).await
    }
}
