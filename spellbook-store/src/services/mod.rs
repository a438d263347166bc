//! Services module
//!
//! Business logic over the settings and spellbook databases.

pub mod settings;
pub mod spellbook;
pub mod transfer;

pub use settings::{SettingKey, SettingsMap, SettingsStore};
pub use spellbook::{validate_spellbook_name, SpellbookStore};
pub use transfer::{ImportData, ImportReport, SpellbookExport};
