//! Settings service
//!
//! Global key-value settings with a fixed key set. Every key has a static
//! default; defaults are written on open so `get_all` is always complete.

use crate::config::{DEFAULT_SPELLBOOK_NAME, FIRST_PAGE};
use crate::database::{create_pool, Schema, SettingsRepository};
use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// The known setting keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingKey {
    /// Page the reader last had open
    RecentPage,
    /// Font size delta applied on top of the base size
    FontAddition,
    /// Fit pages to the viewport
    PageFit,
    /// Page-flip animation enabled
    Animation,
    /// Name of the active spellbook
    CurrentSpellbookDb,
    /// Names of every known spellbook
    SpellbookList,
    /// Custom font payload
    LocalFont,
    /// Display name of the custom font
    LocalFontName,
}

impl SettingKey {
    pub const ALL: [SettingKey; 8] = [
        SettingKey::RecentPage,
        SettingKey::FontAddition,
        SettingKey::PageFit,
        SettingKey::Animation,
        SettingKey::CurrentSpellbookDb,
        SettingKey::SpellbookList,
        SettingKey::LocalFont,
        SettingKey::LocalFontName,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::RecentPage => "recentPage",
            SettingKey::FontAddition => "fontAddition",
            SettingKey::PageFit => "pageFit",
            SettingKey::Animation => "animation",
            SettingKey::CurrentSpellbookDb => "currentSpellbookDb",
            SettingKey::SpellbookList => "spellbookList",
            SettingKey::LocalFont => "localFont",
            SettingKey::LocalFontName => "localFontName",
        }
    }

    pub fn default_value(self) -> Value {
        match self {
            SettingKey::RecentPage => Value::from(FIRST_PAGE),
            SettingKey::FontAddition => Value::from(0),
            SettingKey::PageFit => Value::Bool(false),
            SettingKey::Animation => Value::Bool(true),
            SettingKey::CurrentSpellbookDb => Value::from(DEFAULT_SPELLBOOK_NAME),
            SettingKey::SpellbookList | SettingKey::LocalFont | SettingKey::LocalFontName => {
                Value::Null
            }
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = SettingKey::ALL.iter().map(|key| key.as_str()).collect();
                StoreError::InvalidKey(format!("{}. Valid keys are: {}", s, valid.join(", ")))
            })
    }
}

/// Every known key with its effective value
pub type SettingsMap = BTreeMap<SettingKey, Value>;

/// Service for managing application settings
#[derive(Clone)]
pub struct SettingsStore {
    repo: SettingsRepository,
}

impl SettingsStore {
    /// Open the settings database at `db_path` and backfill defaults
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = create_pool(db_path, Schema::Settings).await?;
        Self::from_pool(pool).await
    }

    /// Wrap an already migrated pool and backfill defaults
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self {
            repo: SettingsRepository::new(pool),
        };
        store.backfill_defaults().await?;
        Ok(store)
    }

    /// Write the default of every key that has no stored value
    async fn backfill_defaults(&self) -> Result<usize> {
        let mut written = 0;
        for key in SettingKey::ALL {
            let value = serde_json::to_string(&key.default_value())?;
            if self.repo.insert_setting_if_absent(key.as_str(), &value).await? {
                written += 1;
            }
        }

        if written > 0 {
            tracing::info!("Backfilled {} default settings", written);
        }
        Ok(written)
    }

    /// Stored value of `key`, or its default. Fails with `InvalidKey` for unknown keys.
    pub async fn get(&self, key: &str) -> Result<Value> {
        self.get_setting(key.parse()?).await
    }

    /// Upsert `key`. Fails with `InvalidKey` for unknown keys.
    pub async fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.set_setting(key.parse()?, value).await
    }

    /// Remove the stored value of `key`; reads fall back to the default.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.delete_setting(key.parse()?).await
    }

    pub async fn get_setting(&self, key: SettingKey) -> Result<Value> {
        match self.repo.get_setting(key.as_str()).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(key.default_value()),
        }
    }

    pub async fn set_setting(&self, key: SettingKey, value: impl Into<Value>) -> Result<()> {
        let raw = serde_json::to_string(&value.into())?;
        self.repo.set_setting(key.as_str(), &raw).await
    }

    pub async fn delete_setting(&self, key: SettingKey) -> Result<()> {
        self.repo.delete_setting(key.as_str()).await
    }

    /// Every known key, stored value first, default otherwise.
    /// Unknown keys found in storage are left out.
    pub async fn get_all(&self) -> Result<SettingsMap> {
        let mut settings: SettingsMap = SettingKey::ALL
            .into_iter()
            .map(|key| (key, key.default_value()))
            .collect();

        for setting in self.repo.list_settings().await? {
            match setting.key.parse::<SettingKey>() {
                Ok(key) => {
                    settings.insert(key, serde_json::from_str(&setting.value)?);
                }
                Err(_) => tracing::debug!("Ignoring unknown stored setting: {}", setting.key),
            }
        }

        Ok(settings)
    }

    /// Remove every known key
    pub async fn clear(&self) -> Result<()> {
        for key in SettingKey::ALL {
            self.delete_setting(key).await?;
        }
        tracing::info!("Cleared settings");
        Ok(())
    }

    /// Remove every known key, then store every default again
    pub async fn reset_to_defaults(&self) -> Result<()> {
        self.clear().await?;
        for key in SettingKey::ALL {
            self.set_setting(key, key.default_value()).await?;
        }
        tracing::info!("Settings reset to defaults");
        Ok(())
    }

    /// Name of the active spellbook
    pub async fn active_spellbook(&self) -> Result<String> {
        match self.get_setting(SettingKey::CurrentSpellbookDb).await? {
            Value::String(name) if !name.is_empty() => Ok(name),
            other => {
                tracing::warn!("Unusable active spellbook setting {}, using default", other);
                Ok(DEFAULT_SPELLBOOK_NAME.to_string())
            }
        }
    }

    pub async fn set_active_spellbook(&self, name: &str) -> Result<()> {
        self.set_setting(SettingKey::CurrentSpellbookDb, name).await
    }

    /// Known spellbook names, `None` if no list was ever stored
    pub async fn spellbook_list(&self) -> Result<Option<Vec<String>>> {
        let value = self.get_setting(SettingKey::SpellbookList).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn set_spellbook_list(&self, names: &[String]) -> Result<()> {
        self.set_setting(SettingKey::SpellbookList, names.to_vec()).await
    }

    pub async fn close(&self) {
        self.repo.close().await;
    }
}
