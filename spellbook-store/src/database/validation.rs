//! Record validation
//!
//! Dynamic records (import files, raw UI payloads) must carry exactly the
//! field set of their record type. Transient display fields are dropped
//! first and never cause a rejection.

use super::models::{Note, Spell};
use crate::config::{FIRST_PAGE, LEGACY_FIRST_PAGE, TRANSIENT_FIELDS};
use crate::error::{Result, StoreError};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Fields of a persisted spell record
pub const SPELL_FIELDS: &[&str] = &[
    "page",
    "name",
    "incant",
    "speed",
    "range",
    "type",
    "desc",
    "lvl",
    "iconUrl",
    "iconObjectFit",
];

/// Fields of a persisted note record
pub const NOTE_FIELDS: &[&str] = &[
    "page",
    "title",
    "type",
    "content",
    "iconUrl",
    "iconObjectFit",
    "date",
];

/// A record type with a closed field set
pub trait Record: DeserializeOwned {
    const KIND: &'static str;
    const FIELDS: &'static [&'static str];

    /// Defaults used to fill absent fields of legacy records
    fn defaults(page: u32) -> Self;

    /// Rewrite fields of the flat-array layout into the current field set
    fn upgrade_legacy(_fields: &mut Map<String, Value>) -> Result<()> {
        Ok(())
    }
}

impl Record for Spell {
    const KIND: &'static str = "spell";
    const FIELDS: &'static [&'static str] = SPELL_FIELDS;

    fn defaults(page: u32) -> Self {
        Spell::empty(page)
    }

    /// Flat-array spells nest the icon as `icon: {url, objectFit}` and carry
    /// `lvl` as the text of the level field.
    fn upgrade_legacy(fields: &mut Map<String, Value>) -> Result<()> {
        if let Some(icon) = fields.remove("icon") {
            let (url, fit) = match icon {
                Value::Object(mut icon) => (icon.remove("url"), icon.remove("objectFit")),
                Value::Null => (None, None),
                other => {
                    return Err(StoreError::SchemaViolation(format!(
                        "invalid spell property: icon must be an object, got {}",
                        json_type(&other)
                    )))
                }
            };
            if let Some(url) = url {
                fields.entry("iconUrl").or_insert(url);
            }
            if let Some(fit) = fit {
                fields.entry("iconObjectFit").or_insert(fit);
            }
        }

        // An unset fit was written as "", which means the default fit
        if matches!(fields.get("iconObjectFit"), Some(Value::String(fit)) if fit.is_empty()) {
            fields.remove("iconObjectFit");
        }

        let level = match fields.get("lvl") {
            Some(Value::String(text)) => Some(parse_level_text(text)?),
            _ => None,
        };
        if let Some(level) = level {
            fields.insert("lvl".to_string(), Value::from(level));
        }

        Ok(())
    }
}

fn parse_level_text(text: &str) -> Result<i64> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    text.parse().map_err(|_| {
        StoreError::SchemaViolation(format!("invalid spell property: lvl {:?} is not a number", text))
    })
}

impl Record for Note {
    const KIND: &'static str = "note";
    const FIELDS: &'static [&'static str] = NOTE_FIELDS;

    fn defaults(page: u32) -> Self {
        Note::empty(page)
    }
}

/// Validate a dynamic record and convert it to its typed form.
pub fn parse_record<R: Record>(value: Value) -> Result<R> {
    let mut fields = into_fields::<R>(value)?;
    strip_transient(&mut fields);
    check_field_set::<R>(&fields)?;
    decode(fields)
}

/// Like [`parse_record`], but for the flat-array layout: the record is
/// upgraded to the current field set, its 1-based page is shifted to the
/// 0-based keyspace and absent known fields take their default value.
/// Unknown fields are still rejected; `page` is required.
pub fn parse_legacy_record<R: Record + serde::Serialize>(value: Value) -> Result<R> {
    let mut fields = into_fields::<R>(value)?;
    strip_transient(&mut fields);
    R::upgrade_legacy(&mut fields)?;

    let page = fields
        .get("page")
        .and_then(Value::as_u64)
        .and_then(|page| u32::try_from(page).ok())
        .and_then(|page| page.checked_sub(LEGACY_FIRST_PAGE))
        .map(|offset| FIRST_PAGE + offset)
        .ok_or_else(|| {
            StoreError::SchemaViolation(format!("{} record has no valid page", R::KIND))
        })?;
    fields.insert("page".to_string(), Value::from(page));

    if let Value::Object(defaults) = serde_json::to_value(R::defaults(page))? {
        for (key, value) in defaults {
            fields.entry(key).or_insert(value);
        }
    }

    check_field_set::<R>(&fields)?;
    decode(fields)
}

fn into_fields<R: Record>(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(fields) => Ok(fields),
        other => Err(StoreError::SchemaViolation(format!(
            "{} record must be an object, got {}",
            R::KIND,
            json_type(&other)
        ))),
    }
}

fn strip_transient(fields: &mut Map<String, Value>) {
    for field in TRANSIENT_FIELDS {
        fields.remove(*field);
    }
}

fn check_field_set<R: Record>(fields: &Map<String, Value>) -> Result<()> {
    if let Some(missing) = R::FIELDS.iter().find(|key| !fields.contains_key(**key)) {
        return Err(StoreError::SchemaViolation(format!(
            "missing required {} property: {}",
            R::KIND,
            missing
        )));
    }

    if let Some(extra) = fields.keys().find(|key| !R::FIELDS.contains(&key.as_str())) {
        return Err(StoreError::SchemaViolation(format!(
            "invalid {} property: {}",
            R::KIND,
            extra
        )));
    }

    Ok(())
}

fn decode<R: Record>(fields: Map<String, Value>) -> Result<R> {
    serde_json::from_value(Value::Object(fields))
        .map_err(|e| StoreError::SchemaViolation(format!("invalid {} record: {}", R::KIND, e)))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
