//! Integration tests for the spellbook store
//!
//! These tests verify end-to-end functionality including:
//! - Settings defaults and validation
//! - Page-keyed spell and note storage with renumbering and swaps
//! - Spellbook creation, switching and deletion
//! - Export and import round trips

use serde_json::json;
use spellbook_store::app::setup;
use spellbook_store::services::settings::SettingKey;
use spellbook_store::{
    IconBlob, IconFit, IconRef, ImportData, Note, PageNumber, SettingsStore, Spell, StoreError,
};
use tempfile::TempDir;

fn spell(page: PageNumber, name: &str) -> Spell {
    Spell {
        name: name.to_string(),
        incant: "Verba".to_string(),
        speed: "1 action".to_string(),
        range: "60 ft".to_string(),
        damage_type: "force".to_string(),
        description: format!("{} description", name),
        level: 2,
        icon: IconRef::Empty,
        icon_fit: IconFit::Cover,
        ..Spell::empty(page)
    }
}

#[tokio::test]
async fn test_settings_defaults_and_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let state = setup(temp_dir.path()).await.unwrap();
    let settings = &state.settings;

    for key in SettingKey::ALL {
        assert_eq!(settings.get(key.as_str()).await.unwrap(), key.default_value());
    }

    for bad in ["", "theme", "RECENTPAGE"] {
        assert!(matches!(settings.get(bad).await, Err(StoreError::InvalidKey(_))));
        assert!(matches!(settings.set(bad, 1).await, Err(StoreError::InvalidKey(_))));
    }

    for value in [json!("text"), json!(7), json!(false), json!(null), json!(["a", "b"])] {
        settings.set("localFont", value.clone()).await.unwrap();
        assert_eq!(settings.get("localFont").await.unwrap(), value);
    }

    let all = settings.get_all().await.unwrap();
    assert_eq!(all.len(), SettingKey::ALL.len());
}

#[tokio::test]
async fn test_settings_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("settings.sqlite");

    let settings = SettingsStore::open(&db_path).await.unwrap();
    settings.set("pageFit", true).await.unwrap();
    settings.close().await;

    let reopened = SettingsStore::open(&db_path).await.unwrap();
    assert_eq!(reopened.get("pageFit").await.unwrap(), json!(true));
}

#[tokio::test]
async fn test_spell_page_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let mut state = setup(temp_dir.path()).await.unwrap();
    let store = &mut state.spellbooks;

    for (page, name) in ["Alarm", "Blur", "Counterspell", "Darkness"].into_iter().enumerate() {
        store.save_spell(&spell(page as PageNumber, name)).await.unwrap();
    }

    let saved = spell(3, "Darkness");
    assert_eq!(store.get_spell(3).await.unwrap().unwrap(), saved);

    assert!(store.delete_spell_and_renumber(1).await.unwrap());
    let spells = store.list_spells_sorted_by_page().await.unwrap();
    let names: Vec<(PageNumber, &str)> = spells.iter().map(|s| (s.page, s.name.as_str())).collect();
    assert_eq!(names, vec![(0, "Alarm"), (1, "Counterspell"), (2, "Darkness")]);
    assert_eq!(spells[2], Spell { page: 2, ..saved });

    assert!(store.swap_spell_pages(0, 2).await.unwrap());
    assert_eq!(store.get_spell(0).await.unwrap().unwrap().name, "Darkness");
    assert_eq!(store.get_spell(2).await.unwrap().unwrap().name, "Alarm");

    assert!(!store.swap_spell_pages(2, 3).await.unwrap());
    assert_eq!(store.get_spell(2).await.unwrap().unwrap().name, "Alarm");
    assert!(store.get_spell(3).await.unwrap().is_none());
}

#[tokio::test]
async fn test_schema_violation_keeps_prior_state() {
    let temp_dir = TempDir::new().unwrap();
    let mut state = setup(temp_dir.path()).await.unwrap();
    let store = &mut state.spellbooks;

    store.save_spell(&spell(0, "Kept")).await.unwrap();

    let mut missing = serde_json::to_value(spell(0, "Lost")).unwrap();
    missing.as_object_mut().unwrap().remove("iconObjectFit");
    let err = store.save_spell_record(missing).await.unwrap_err();
    assert!(matches!(err, StoreError::SchemaViolation(ref msg) if msg.contains("iconObjectFit")));

    let mut extra = serde_json::to_value(spell(0, "Lost")).unwrap();
    extra["author"] = json!("Mordenkainen");
    assert!(matches!(
        store.save_spell_record(extra).await,
        Err(StoreError::SchemaViolation(_))
    ));

    assert_eq!(store.get_spell(0).await.unwrap().unwrap().name, "Kept");
}

#[tokio::test]
async fn test_icon_display_urls() {
    let temp_dir = TempDir::new().unwrap();
    let mut state = setup(temp_dir.path()).await.unwrap();
    let store = &mut state.spellbooks;

    let image = IconBlob::new("image/png", vec![0x89, 0x50, 0x4e, 0x47]);
    let url = store.save_spell_image(0, image.clone()).await.unwrap();

    let listed = store.list_spells().await.unwrap();
    let listed_url = listed[0].icon_object_url.clone().unwrap();
    assert_eq!(store.object_urls().resolve(&listed_url), Some(image.clone()));
    assert_eq!(listed[0].icon, IconRef::Stored(image));

    assert!(store.object_urls().revoke(&url));
    assert!(store.object_urls().revoke(&listed_url));
    assert!(store.object_urls().is_empty());
}

#[tokio::test]
async fn test_spellbook_administration() {
    let temp_dir = TempDir::new().unwrap();
    let mut state = setup(temp_dir.path()).await.unwrap();
    let store = &mut state.spellbooks;

    store.create_new("A").await.unwrap();
    store.create_new("B").await.unwrap();

    let names = store.list_all().await.unwrap();
    assert!(names.contains(&"A".to_string()));
    assert!(names.contains(&"B".to_string()));
    assert_eq!(store.current_spellbook_name().await.unwrap(), "B");
    assert_eq!(state.settings.get("currentSpellbookDb").await.unwrap(), json!("B"));

    let store = &mut state.spellbooks;
    store.delete_spellbook("A").await.unwrap();
    assert!(!store.list_all().await.unwrap().contains(&"A".to_string()));

    assert!(matches!(
        store.delete_spellbook("B").await,
        Err(StoreError::ForbiddenOperation(_))
    ));
    assert!(matches!(
        store.create_new("../escape").await,
        Err(StoreError::InvalidSpellbookName(_))
    ));
}

#[tokio::test]
async fn test_export_import_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let mut state = setup(temp_dir.path()).await.unwrap();
    let store = &mut state.spellbooks;

    store.save_spell(&spell(0, "Mage Hand")).await.unwrap();
    store
        .save_spell_image(1, IconBlob::new("image/webp", vec![5, 4, 3, 2, 1]))
        .await
        .unwrap();
    store
        .save_note(&Note {
            title: "Components".to_string(),
            content: "Bat guano".to_string(),
            ..Note::empty(0)
        })
        .await
        .unwrap();

    let exported = store.export_all().await.unwrap();
    let json = serde_json::to_string(&exported).unwrap();

    store.create_new("Restored").await.unwrap();
    let report = store
        .import_all(ImportData::from_json_str(&json).unwrap())
        .await
        .unwrap();
    assert_eq!(report.spells_imported, 2);
    assert_eq!(report.notes_imported, 1);
    assert_eq!(report.skipped(), 0);

    let restored = store.export_all().await.unwrap();
    assert_eq!(restored.name, "Restored");
    assert_eq!(restored.spells, exported.spells);
    assert_eq!(restored.notes, exported.notes);
}

#[tokio::test]
async fn test_import_legacy_page_file() {
    let temp_dir = TempDir::new().unwrap();
    let mut state = setup(temp_dir.path()).await.unwrap();
    let store = &mut state.spellbooks;

    let legacy = json!([
        {
            "page": 1,
            "name": "Fireball",
            "incant": "Ignis",
            "speed": "1 action",
            "range": "150 ft",
            "type": "fire",
            "desc": "A bright streak flashes.",
            "lvl": "3",
            "icon": { "url": "", "objectFit": "cover" }
        },
        {
            "page": 2,
            "name": "Sleep",
            "incant": "Somnus",
            "speed": "1 action",
            "range": "90 ft",
            "type": "enchantment",
            "desc": "Creatures fall unconscious.",
            "lvl": "",
            "icon": { "url": "", "objectFit": "" }
        }
    ]);
    let path = temp_dir.path().join("spellbook-pages.json");
    std::fs::write(&path, serde_json::to_string(&legacy).unwrap()).unwrap();

    let report = store.import_from_file(&path).await.unwrap();
    assert_eq!(report.spells_imported, 2);
    assert_eq!(report.skipped(), 0);

    let spells = store.list_spells_sorted_by_page().await.unwrap();
    assert_eq!(spells.len(), 2);
    assert_eq!((spells[0].page, spells[0].name.as_str(), spells[0].level), (0, "Fireball", 3));
    assert_eq!(spells[0].icon_fit, IconFit::Cover);
    assert_eq!((spells[1].page, spells[1].level), (1, 0));
    assert_eq!(spells[1].icon_fit, IconFit::Contain);
}
