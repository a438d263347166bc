//! Store state and initialization
//!
//! Derives the on-disk layout from a single data directory and wires the
//! settings and spellbook stores together.

use crate::config::{DEFAULT_LOG_FILTER, SETTINGS_DB_FILE, SPELLBOOKS_DIR};
use crate::error::Result;
use crate::services::{SettingsStore, SpellbookStore};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Locations of every database under one data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub data_dir: PathBuf,
}

impl StorePaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn settings_db(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_DB_FILE)
    }

    pub fn spellbooks_dir(&self) -> PathBuf {
        self.data_dir.join(SPELLBOOKS_DIR)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Both stores, ready for use
pub struct AppState {
    pub paths: StorePaths,
    pub settings: SettingsStore,
    pub spellbooks: SpellbookStore,
}

/// Create the directory layout, open the settings (backfilling defaults)
/// and open the active spellbook.
pub async fn setup(data_dir: impl Into<PathBuf>) -> Result<AppState> {
    let paths = StorePaths::new(data_dir);
    tracing::info!("Initializing spellbook store in {:?}", paths.data_dir());

    std::fs::create_dir_all(paths.data_dir())?;
    std::fs::create_dir_all(paths.spellbooks_dir())?;

    let settings = SettingsStore::open(&paths.settings_db()).await?;
    let mut spellbooks = SpellbookStore::new(settings.clone(), paths.spellbooks_dir());
    spellbooks.init(None).await?;

    tracing::info!("Spellbook store initialized");

    Ok(AppState {
        paths,
        settings,
        spellbooks,
    })
}

/// Install a fmt subscriber filtered by `RUST_LOG`. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
