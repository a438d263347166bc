//! Store configuration constants
//!
//! Central location for file layout, defaults, resource limits
//! and validation boundaries used throughout the store.

use std::time::Duration;

// ===== File Layout =====

/// File name of the global settings database inside the data directory
pub const SETTINGS_DB_FILE: &str = "settings.sqlite";

/// Directory (inside the data directory) holding one database per spellbook
pub const SPELLBOOKS_DIR: &str = "spellbooks";

/// Extension of a spellbook database file
pub const SPELLBOOK_DB_EXTENSION: &str = "sqlite";

/// SQLite side files that belong to a database in WAL mode
pub const SQLITE_SIDE_FILE_SUFFIXES: &[&str] = &["-wal", "-shm"];

// ===== Connection Pool =====

/// How long a connection waits on a locked database before failing
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connections held by an application pool
pub const MAX_POOL_CONNECTIONS: u32 = 5;

// ===== Spellbooks =====

/// Spellbook opened when the settings name none
pub const DEFAULT_SPELLBOOK_NAME: &str = "Spellbook";

/// Maximum length of a spellbook name in bytes.
/// The name is also the database file stem.
pub const MAX_SPELLBOOK_NAME_LENGTH: usize = 255;

// ===== Pages =====

/// Page numbers are 0-based: the first record of a keyspace lives at page 0
/// and a keyspace of `n` records occupies pages `0..n`.
pub const FIRST_PAGE: u32 = 0;

/// Reported by the highest-page queries for an empty keyspace
pub const EMPTY_KEYSPACE_HIGHEST_PAGE: u32 = 0;

/// Flat-array exports number their pages from 1; import shifts them down to
/// [`FIRST_PAGE`].
pub const LEGACY_FIRST_PAGE: u32 = 1;

// ===== Records =====

/// In-memory-only fields a caller may leave on a record; stripped before validation
pub const TRANSIENT_FIELDS: &[&str] = &["iconObjectUrl", "_iconObjectUrl"];

/// Type tag given to new notes
pub const DEFAULT_NOTE_TYPE: &str = "text";

// ===== Icons =====

/// MIME type assumed for a stored icon without one
pub const DEFAULT_ICON_MIME: &str = "application/octet-stream";

/// Prefix of every transient display URL handed out by the store
pub const OBJECT_URL_PREFIX: &str = "blob:spellbook/";

// ===== Logging =====

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "spellbook_store=debug,info";
