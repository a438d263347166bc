//! Database models
//!
//! Rust structs representing stored records.
//! Records serialize with the field names of the export file format.

use crate::config::{DEFAULT_ICON_MIME, DEFAULT_NOTE_TYPE};
use crate::error::StoreError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Unique key of a spell or note within one spellbook keyspace
pub type PageNumber = u32;

/// How an icon is fitted into its frame when displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IconFit {
    #[default]
    Contain,
    Cover,
    Fill,
    None,
    ScaleDown,
}

impl IconFit {
    pub const ALL: [IconFit; 5] = [
        IconFit::Contain,
        IconFit::Cover,
        IconFit::Fill,
        IconFit::None,
        IconFit::ScaleDown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IconFit::Contain => "contain",
            IconFit::Cover => "cover",
            IconFit::Fill => "fill",
            IconFit::None => "none",
            IconFit::ScaleDown => "scale-down",
        }
    }
}

impl fmt::Display for IconFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IconFit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        IconFit::ALL
            .into_iter()
            .find(|fit| fit.as_str() == s)
            .ok_or_else(|| format!("unknown icon fit: {}", s))
    }
}

/// Raw image bytes kept in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconBlob {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl IconBlob {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// `data:<mime>;base64,<payload>` form used by the JSON export format
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

/// The icon of a spell or note page.
///
/// Only `Stored` icons get a transient display URL; a `Linked` URL is
/// already displayable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IconRef {
    #[default]
    Empty,
    Stored(IconBlob),
    Linked(String),
}

impl IconRef {
    pub fn is_empty(&self) -> bool {
        matches!(self, IconRef::Empty)
    }

    pub fn as_blob(&self) -> Option<&IconBlob> {
        match self {
            IconRef::Stored(blob) => Some(blob),
            _ => None,
        }
    }

    /// Parse the string form of an icon reference.
    ///
    /// `""` is empty, a base64 `data:` URL becomes stored bytes, anything else
    /// is kept as a link.
    pub fn from_url(url: &str) -> std::result::Result<Self, String> {
        if url.is_empty() {
            return Ok(IconRef::Empty);
        }

        if let Some(rest) = url.strip_prefix("data:") {
            if let Some((mime, payload)) = rest.split_once(";base64,") {
                let bytes = STANDARD
                    .decode(payload.trim())
                    .map_err(|e| format!("invalid base64 icon data: {}", e))?;
                let mime = if mime.is_empty() { DEFAULT_ICON_MIME } else { mime };
                return Ok(IconRef::Stored(IconBlob::new(mime, bytes)));
            }
        }

        Ok(IconRef::Linked(url.to_string()))
    }

    /// Inverse of [`IconRef::from_url`]
    pub fn to_url(&self) -> String {
        match self {
            IconRef::Empty => String::new(),
            IconRef::Stored(blob) => blob.to_data_url(),
            IconRef::Linked(url) => url.clone(),
        }
    }

    pub(crate) fn from_columns(
        data: Option<Vec<u8>>,
        mime: Option<String>,
        link: Option<String>,
    ) -> Self {
        match (data, link) {
            (Some(bytes), _) => IconRef::Stored(IconBlob {
                mime_type: mime.unwrap_or_else(|| DEFAULT_ICON_MIME.to_string()),
                bytes,
            }),
            (None, Some(link)) if !link.is_empty() => IconRef::Linked(link),
            _ => IconRef::Empty,
        }
    }

    pub(crate) fn data_column(&self) -> Option<&[u8]> {
        self.as_blob().map(|blob| blob.bytes.as_slice())
    }

    pub(crate) fn mime_column(&self) -> Option<&str> {
        self.as_blob().map(|blob| blob.mime_type.as_str())
    }

    pub(crate) fn link_column(&self) -> Option<&str> {
        match self {
            IconRef::Linked(url) => Some(url.as_str()),
            _ => None,
        }
    }
}

impl Serialize for IconRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_url())
    }
}

impl<'de> Deserialize<'de> for IconRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<serde_json::Value>::deserialize(deserializer)? {
            None | Some(serde_json::Value::Null) => Ok(IconRef::Empty),
            Some(serde_json::Value::String(url)) => IconRef::from_url(&url).map_err(de::Error::custom),
            // A browser serializes a Blob as `{}`; its bytes are gone.
            Some(serde_json::Value::Object(map)) if map.is_empty() => Ok(IconRef::Empty),
            Some(other) => Err(de::Error::custom(format!(
                "unsupported icon reference: {}",
                other
            ))),
        }
    }
}

/// One page of spell content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Spell {
    pub page: PageNumber,
    pub name: String,
    pub incant: String,
    pub speed: String,
    pub range: String,
    #[serde(rename = "type")]
    pub damage_type: String,
    #[serde(rename = "desc")]
    pub description: String,
    #[serde(rename = "lvl")]
    pub level: i64,
    #[serde(rename = "iconUrl")]
    pub icon: IconRef,
    #[serde(rename = "iconObjectFit")]
    pub icon_fit: IconFit,
    /// Display URL for a stored icon. Never persisted.
    #[serde(skip)]
    pub icon_object_url: Option<String>,
}

impl Spell {
    /// A blank spell at `page`
    pub fn empty(page: PageNumber) -> Self {
        Self {
            page,
            name: String::new(),
            incant: String::new(),
            speed: String::new(),
            range: String::new(),
            damage_type: String::new(),
            description: String::new(),
            level: 0,
            icon: IconRef::Empty,
            icon_fit: IconFit::default(),
            icon_object_url: None,
        }
    }

    /// Copy of the record as it is persisted, without transient fields
    pub fn persisted(&self) -> Self {
        Self {
            icon_object_url: None,
            ..self.clone()
        }
    }
}

/// A free-form annotation page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Note {
    pub page: PageNumber,
    pub title: String,
    #[serde(rename = "type")]
    pub note_type: String,
    pub content: String,
    #[serde(rename = "iconUrl")]
    pub icon: IconRef,
    #[serde(rename = "iconObjectFit")]
    pub icon_fit: IconFit,
    /// Last modification, restamped on every save
    pub date: DateTime<Utc>,
    /// Display URL for a stored icon. Never persisted.
    #[serde(skip)]
    pub icon_object_url: Option<String>,
}

impl Note {
    /// A blank text note at `page`, dated now
    pub fn empty(page: PageNumber) -> Self {
        Self {
            page,
            title: String::new(),
            note_type: DEFAULT_NOTE_TYPE.to_string(),
            content: String::new(),
            icon: IconRef::Empty,
            icon_fit: IconFit::default(),
            date: Utc::now(),
            icon_object_url: None,
        }
    }

    /// Copy of the record as it is persisted, without transient fields
    pub fn persisted(&self) -> Self {
        Self {
            icon_object_url: None,
            ..self.clone()
        }
    }
}

/// Application setting, value stored as JSON text
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

#[derive(Debug, FromRow)]
pub(crate) struct SpellRow {
    pub page: i64,
    pub name: String,
    pub incant: String,
    pub speed: String,
    pub spell_range: String,
    pub damage_type: String,
    pub description: String,
    pub level: i64,
    pub icon_data: Option<Vec<u8>>,
    pub icon_mime: Option<String>,
    pub icon_link: Option<String>,
    pub icon_fit: String,
}

impl TryFrom<SpellRow> for Spell {
    type Error = StoreError;

    fn try_from(row: SpellRow) -> Result<Self, Self::Error> {
        Ok(Spell {
            page: page_from_column(row.page)?,
            name: row.name,
            incant: row.incant,
            speed: row.speed,
            range: row.spell_range,
            damage_type: row.damage_type,
            description: row.description,
            level: row.level,
            icon: IconRef::from_columns(row.icon_data, row.icon_mime, row.icon_link),
            icon_fit: row.icon_fit.parse().map_err(StoreError::Corrupt)?,
            icon_object_url: None,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct NoteRow {
    pub page: i64,
    pub title: String,
    pub note_type: String,
    pub content: String,
    pub icon_data: Option<Vec<u8>>,
    pub icon_mime: Option<String>,
    pub icon_link: Option<String>,
    pub icon_fit: String,
    pub date: DateTime<Utc>,
}

impl TryFrom<NoteRow> for Note {
    type Error = StoreError;

    fn try_from(row: NoteRow) -> Result<Self, Self::Error> {
        Ok(Note {
            page: page_from_column(row.page)?,
            title: row.title,
            note_type: row.note_type,
            content: row.content,
            icon: IconRef::from_columns(row.icon_data, row.icon_mime, row.icon_link),
            icon_fit: row.icon_fit.parse().map_err(StoreError::Corrupt)?,
            date: row.date,
            icon_object_url: None,
        })
    }
}

fn page_from_column(page: i64) -> Result<PageNumber, StoreError> {
    PageNumber::try_from(page).map_err(|_| StoreError::Corrupt(format!("invalid page number: {}", page)))
}
