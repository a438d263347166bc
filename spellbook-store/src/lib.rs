//! Spellbook store
//!
//! Local persistence for a paginated spellbook: page-keyed spells and
//! notes in named, switchable spellbooks, icon images, import/export,
//! and a global settings store with defaults.

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod services;
pub mod storage;

pub use app::{setup, AppState, StorePaths};
pub use database::{IconBlob, IconFit, IconRef, Note, PageNumber, Spell};
pub use error::{Result, StoreError};
pub use services::{ImportData, ImportReport, SettingKey, SettingsStore, SpellbookExport, SpellbookStore};
