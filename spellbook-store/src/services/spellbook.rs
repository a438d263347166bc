//! Spellbook service
//!
//! Spells and notes of the active spellbook, addressed by page number, plus
//! administration of the named spellbooks themselves. At most one spellbook
//! database is open at a time; the active one is named in the settings.

use crate::config::{
    EMPTY_KEYSPACE_HIGHEST_PAGE, MAX_SPELLBOOK_NAME_LENGTH, SPELLBOOK_DB_EXTENSION,
    SQLITE_SIDE_FILE_SUFFIXES,
};
use crate::database::validation::parse_record;
use crate::database::{
    create_pool, IconBlob, IconRef, Note, PageNumber, Schema, Spell, SpellbookRepository,
};
use crate::error::{Result, StoreError};
use crate::services::settings::SettingsStore;
use crate::storage::ObjectUrlRegistry;
use chrono::Utc;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

struct OpenSpellbook {
    name: String,
    repo: SpellbookRepository,
}

/// Store for the records of the active spellbook
pub struct SpellbookStore {
    settings: SettingsStore,
    spellbooks_dir: PathBuf,
    object_urls: ObjectUrlRegistry,
    open: Option<OpenSpellbook>,
}

impl SpellbookStore {
    /// Nothing is opened until the first operation or an explicit [`init`](Self::init).
    pub fn new(settings: SettingsStore, spellbooks_dir: PathBuf) -> Self {
        Self {
            settings,
            spellbooks_dir,
            object_urls: ObjectUrlRegistry::new(),
            open: None,
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Display URLs handed out by this store; callers revoke them here.
    pub fn object_urls(&self) -> &ObjectUrlRegistry {
        &self.object_urls
    }

    // ===== Lifecycle =====

    /// Open the spellbook `name`, or the active one from the settings.
    ///
    /// Reuses the handle when that spellbook is already open, otherwise
    /// closes the open one first.
    pub async fn init(&mut self, name: Option<&str>) -> Result<()> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.settings.active_spellbook().await?,
        };

        if self.open_spellbook_name() == Some(name.as_str()) {
            return Ok(());
        }

        let path = self.spellbook_path(&name)?;
        self.close().await;

        let pool = create_pool(&path, Schema::Spellbook).await?;
        tracing::info!("Opened spellbook: {}", name);

        self.open = Some(OpenSpellbook {
            name,
            repo: SpellbookRepository::new(pool),
        });
        Ok(())
    }

    /// Close the open spellbook, if any
    pub async fn close(&mut self) {
        if let Some(open) = self.open.take() {
            open.repo.close().await;
            tracing::info!("Closed spellbook: {}", open.name);
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn open_spellbook_name(&self) -> Option<&str> {
        self.open.as_ref().map(|open| open.name.as_str())
    }

    /// Handle to the active spellbook, opening or switching as the settings demand
    pub(crate) async fn repository(&mut self) -> Result<SpellbookRepository> {
        self.init(None).await?;
        match &self.open {
            Some(open) => Ok(open.repo.clone()),
            None => Err(StoreError::Corrupt("spellbook did not open".to_string())),
        }
    }

    // ===== Spellbook administration =====

    pub async fn current_spellbook_name(&self) -> Result<String> {
        self.settings.active_spellbook().await
    }

    /// Known spellbook names; only the active one if no list was stored yet
    pub async fn list_all(&self) -> Result<Vec<String>> {
        match self.settings.spellbook_list().await? {
            Some(names) => Ok(names),
            None => Ok(vec![self.current_spellbook_name().await?]),
        }
    }

    /// Register `name` and make it the active spellbook
    pub async fn create_new(&mut self, name: &str) -> Result<()> {
        validate_spellbook_name(name)?;
        tracing::info!("Creating spellbook: {}", name);

        self.register(name).await?;
        self.switch_to(name).await
    }

    /// Make `name` the active spellbook and open it
    pub async fn switch_to(&mut self, name: &str) -> Result<()> {
        validate_spellbook_name(name)?;

        self.register(name).await?;
        self.settings.set_active_spellbook(name).await?;
        self.init(Some(name)).await?;

        tracing::info!("Switched to spellbook: {}", name);
        Ok(())
    }

    /// Forget `name` and destroy its database. The active spellbook cannot be deleted.
    pub async fn delete_spellbook(&mut self, name: &str) -> Result<()> {
        if name == self.current_spellbook_name().await? {
            return Err(StoreError::ForbiddenOperation(format!(
                "cannot delete the currently active spellbook: {}",
                name
            )));
        }

        let path = self.spellbook_path(name)?;

        if self.open_spellbook_name() == Some(name) {
            self.close().await;
        }

        let remaining: Vec<String> = self
            .list_all()
            .await?
            .into_iter()
            .filter(|known| known != name)
            .collect();
        self.settings.set_spellbook_list(&remaining).await?;

        remove_database_files(&path).await?;

        tracing::info!("Deleted spellbook: {}", name);
        Ok(())
    }

    async fn register(&self, name: &str) -> Result<()> {
        let mut names = self.list_all().await?;
        if !names.iter().any(|known| known == name) {
            names.push(name.to_string());
            self.settings.set_spellbook_list(&names).await?;
        }
        Ok(())
    }

    fn spellbook_path(&self, name: &str) -> Result<PathBuf> {
        validate_spellbook_name(name)?;
        Ok(self
            .spellbooks_dir
            .join(format!("{}.{}", name, SPELLBOOK_DB_EXTENSION)))
    }

    // ===== Spells =====

    /// Spell at `page` with a display URL attached to a stored icon
    pub async fn get_spell(&mut self, page: PageNumber) -> Result<Option<Spell>> {
        let repo = self.repository().await?;
        let mut spell = repo.get_spell(page).await?;
        if let Some(spell) = spell.as_mut() {
            self.attach_spell_url(spell);
        }
        Ok(spell)
    }

    /// Upsert `spell` at its page, without transient fields. Returns the page.
    pub async fn save_spell(&mut self, spell: &Spell) -> Result<PageNumber> {
        let repo = self.repository().await?;
        repo.upsert_spell(&spell.persisted()).await?;
        Ok(spell.page)
    }

    /// Validate a dynamic spell record and save it
    pub async fn save_spell_record(&mut self, record: Value) -> Result<PageNumber> {
        let spell: Spell = parse_record(record)?;
        self.save_spell(&spell).await
    }

    /// Delete the spell at `page`, then move every later spell down one page
    /// so the pages stay contiguous. Returns false when `page` held no spell;
    /// nothing is renumbered then.
    pub async fn delete_spell_and_renumber(&mut self, page: PageNumber) -> Result<bool> {
        let repo = self.repository().await?;
        match repo.delete_spell_and_renumber(page).await? {
            Some(moved) => {
                tracing::info!("Deleted spell page {}, {} later pages moved down", page, moved);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn list_spells(&mut self) -> Result<Vec<Spell>> {
        let repo = self.repository().await?;
        let mut spells = repo.list_spells().await?;
        for spell in &mut spells {
            self.attach_spell_url(spell);
        }
        Ok(spells)
    }

    pub async fn list_spells_sorted_by_page(&mut self) -> Result<Vec<Spell>> {
        let mut spells = self.list_spells().await?;
        spells.sort_by_key(|spell| spell.page);
        Ok(spells)
    }

    /// Highest spell page, 0 for an empty spellbook
    pub async fn highest_spell_page(&mut self) -> Result<PageNumber> {
        let repo = self.repository().await?;
        Ok(repo
            .highest_spell_page()
            .await?
            .unwrap_or(EMPTY_KEYSPACE_HIGHEST_PAGE))
    }

    /// Exchange the spells at two pages. Returns false, changing nothing,
    /// if either page holds no spell.
    pub async fn swap_spell_pages(&mut self, page_a: PageNumber, page_b: PageNumber) -> Result<bool> {
        let repo = self.repository().await?;
        repo.swap_spell_pages(page_a, page_b).await
    }

    /// Store `image` as the icon of the spell at `page`, creating the spell
    /// if needed. Returns a fresh display URL for the image.
    pub async fn save_spell_image(&mut self, page: PageNumber, image: IconBlob) -> Result<String> {
        let repo = self.repository().await?;

        let mut spell = repo
            .get_spell(page)
            .await?
            .unwrap_or_else(|| Spell::empty(page));
        spell.icon = IconRef::Stored(image.clone());
        spell.icon_object_url = None;

        repo.upsert_spell(&spell).await?;

        tracing::info!("Saved {} byte icon for spell page {}", image.bytes.len(), page);
        Ok(self.object_urls.create(&image))
    }

    fn attach_spell_url(&self, spell: &mut Spell) {
        if let IconRef::Stored(blob) = &spell.icon {
            spell.icon_object_url = Some(self.object_urls.create(blob));
        }
    }

    // ===== Notes =====

    pub async fn get_note(&mut self, page: PageNumber) -> Result<Option<Note>> {
        let repo = self.repository().await?;
        let mut note = repo.get_note(page).await?;
        if let Some(note) = note.as_mut() {
            self.attach_note_url(note);
        }
        Ok(note)
    }

    /// Upsert `note` at its page with its date set to now. Returns the page.
    pub async fn save_note(&mut self, note: &Note) -> Result<PageNumber> {
        let repo = self.repository().await?;
        let mut note = note.persisted();
        note.date = Utc::now();
        repo.upsert_note(&note).await?;
        Ok(note.page)
    }

    /// Validate a dynamic note record and save it. The date is stamped
    /// before validation, so callers may omit it.
    pub async fn save_note_record(&mut self, mut record: Value) -> Result<PageNumber> {
        if let Value::Object(fields) = &mut record {
            fields.insert("date".to_string(), serde_json::to_value(Utc::now())?);
        }
        let note: Note = parse_record(record)?;
        self.save_note(&note).await
    }

    /// Delete the note at `page`. Later notes keep their pages.
    pub async fn delete_note(&mut self, page: PageNumber) -> Result<bool> {
        let repo = self.repository().await?;
        repo.delete_note(page).await
    }

    pub async fn list_notes(&mut self) -> Result<Vec<Note>> {
        let repo = self.repository().await?;
        let mut notes = repo.list_notes().await?;
        for note in &mut notes {
            self.attach_note_url(note);
        }
        Ok(notes)
    }

    pub async fn list_notes_sorted_by_page(&mut self) -> Result<Vec<Note>> {
        let mut notes = self.list_notes().await?;
        notes.sort_by_key(|note| note.page);
        Ok(notes)
    }

    /// Most recently modified first
    pub async fn list_notes_sorted_by_date(&mut self) -> Result<Vec<Note>> {
        let mut notes = self.list_notes().await?;
        notes.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(notes)
    }

    /// Highest note page, 0 when there are no notes
    pub async fn highest_note_page(&mut self) -> Result<PageNumber> {
        let repo = self.repository().await?;
        Ok(repo
            .highest_note_page()
            .await?
            .unwrap_or(EMPTY_KEYSPACE_HIGHEST_PAGE))
    }

    fn attach_note_url(&self, note: &mut Note) {
        if let IconRef::Stored(blob) = &note.icon {
            note.icon_object_url = Some(self.object_urls.create(blob));
        }
    }

    /// Remove every spell and note of the active spellbook
    pub async fn clear_all_content(&mut self) -> Result<()> {
        let repo = self.repository().await?;
        repo.clear().await?;
        tracing::info!("Cleared spellbook: {}", self.open_spellbook_name().unwrap_or_default());
        Ok(())
    }
}

/// Spellbook names double as file stems, so they must be usable as one.
pub fn validate_spellbook_name(name: &str) -> Result<()> {
    let problem = if name.trim().is_empty() {
        Some("name is empty")
    } else if name.len() > MAX_SPELLBOOK_NAME_LENGTH {
        Some("name is too long")
    } else if name == "." || name == ".." {
        Some("name is a relative path")
    } else if name
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        Some("name contains a path separator or control character")
    } else {
        None
    };

    match problem {
        Some(problem) => Err(StoreError::InvalidSpellbookName(format!("{:?}: {}", name, problem))),
        None => Ok(()),
    }
}

async fn remove_database_files(path: &Path) -> Result<()> {
    let mut targets = vec![path.to_path_buf()];
    for suffix in SQLITE_SIDE_FILE_SUFFIXES {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        targets.push(PathBuf::from(side));
    }

    for target in targets {
        match fs::remove_file(&target).await {
            Ok(()) => tracing::debug!("Removed {:?}", target),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::IconFit;
    use serde_json::json;
    use tempfile::TempDir;

    async fn create_test_store() -> (SpellbookStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let settings = SettingsStore::open(&temp_dir.path().join("settings.sqlite"))
            .await
            .unwrap();
        let store = SpellbookStore::new(settings, temp_dir.path().join("spellbooks"));
        (store, temp_dir)
    }

    fn spell(page: PageNumber, name: &str) -> Spell {
        Spell {
            name: name.to_string(),
            incant: format!("{} incantation", name),
            level: page as i64 + 1,
            ..Spell::empty(page)
        }
    }

    #[tokio::test]
    async fn test_lazy_open_uses_active_name() {
        let (mut store, _temp) = create_test_store().await;
        assert!(!store.is_open());

        store.list_spells().await.unwrap();
        assert_eq!(store.open_spellbook_name(), Some("Spellbook"));
    }

    #[tokio::test]
    async fn test_init_reuses_and_replaces_handle() {
        let (mut store, temp) = create_test_store().await;

        store.init(Some("Alpha")).await.unwrap();
        store.init(Some("Alpha")).await.unwrap();
        assert_eq!(store.open_spellbook_name(), Some("Alpha"));

        store.init(Some("Beta")).await.unwrap();
        assert_eq!(store.open_spellbook_name(), Some("Beta"));
        assert!(temp.path().join("spellbooks/Alpha.sqlite").exists());

        store.close().await;
        assert!(!store.is_open());
    }

    #[tokio::test]
    async fn test_save_and_get_spell() {
        let (mut store, _temp) = create_test_store().await;

        let saved = Spell {
            icon_fit: IconFit::Fill,
            ..spell(3, "Fireball")
        };
        assert_eq!(store.save_spell(&saved).await.unwrap(), 3);

        let fetched = store.get_spell(3).await.unwrap().unwrap();
        assert_eq!(fetched, saved);
        assert_eq!(fetched.icon_object_url, None);

        assert!(store.get_spell(4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transient_url_is_not_persisted() {
        let (mut store, _temp) = create_test_store().await;

        let mut with_url = spell(0, "Blink");
        with_url.icon_object_url = Some("blob:spellbook/stale".to_string());
        store.save_spell(&with_url).await.unwrap();

        let fetched = store.get_spell(0).await.unwrap().unwrap();
        assert_eq!(fetched.icon_object_url, None);
        assert_eq!(fetched, with_url.persisted());
    }

    #[tokio::test]
    async fn test_save_spell_record_validation() {
        let (mut store, _temp) = create_test_store().await;
        store.save_spell(&spell(1, "Original")).await.unwrap();

        let mut record = serde_json::to_value(spell(1, "Replacement")).unwrap();
        record["school"] = json!("illusion");
        assert!(matches!(
            store.save_spell_record(record).await,
            Err(StoreError::SchemaViolation(_))
        ));

        let mut record = serde_json::to_value(spell(1, "Replacement")).unwrap();
        record.as_object_mut().unwrap().remove("speed");
        assert!(matches!(
            store.save_spell_record(record).await,
            Err(StoreError::SchemaViolation(_))
        ));

        assert_eq!(store.get_spell(1).await.unwrap().unwrap().name, "Original");

        let mut record = serde_json::to_value(spell(1, "Replacement")).unwrap();
        record["iconObjectUrl"] = json!("blob:spellbook/ignored");
        assert_eq!(store.save_spell_record(record).await.unwrap(), 1);
        assert_eq!(store.get_spell(1).await.unwrap().unwrap().name, "Replacement");
    }

    #[tokio::test]
    async fn test_delete_renumbers_later_pages() {
        let (mut store, _temp) = create_test_store().await;
        for (page, name) in ["zero", "one", "two", "three"].into_iter().enumerate() {
            store.save_spell(&spell(page as PageNumber, name)).await.unwrap();
        }
        let former_two = store.get_spell(2).await.unwrap().unwrap();

        assert!(store.delete_spell_and_renumber(1).await.unwrap());

        let spells = store.list_spells_sorted_by_page().await.unwrap();
        let pages: Vec<PageNumber> = spells.iter().map(|s| s.page).collect();
        assert_eq!(pages, vec![0, 1, 2]);
        assert_eq!(spells[1], Spell { page: 1, ..former_two });
        assert_eq!(spells[2].name, "three");
        assert_eq!(spells[2].level, 4);

        assert!(!store.delete_spell_and_renumber(10).await.unwrap());
        assert_eq!(store.highest_spell_page().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_swap_spell_pages() {
        let (mut store, _temp) = create_test_store().await;
        store.save_spell(&spell(0, "Shield")).await.unwrap();
        store.save_spell(&spell(1, "Sleep")).await.unwrap();

        assert!(store.swap_spell_pages(0, 1).await.unwrap());
        assert_eq!(store.get_spell(0).await.unwrap().unwrap().name, "Sleep");
        assert_eq!(store.get_spell(1).await.unwrap().unwrap().name, "Shield");

        assert!(!store.swap_spell_pages(0, 9).await.unwrap());
        assert_eq!(store.get_spell(0).await.unwrap().unwrap().name, "Sleep");
        assert!(store.get_spell(9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_highest_page_sentinel() {
        let (mut store, _temp) = create_test_store().await;
        assert_eq!(store.highest_spell_page().await.unwrap(), 0);
        assert_eq!(store.highest_note_page().await.unwrap(), 0);

        store.save_spell(&spell(5, "Far")).await.unwrap();
        assert_eq!(store.highest_spell_page().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_save_spell_image() {
        let (mut store, _temp) = create_test_store().await;
        let image = IconBlob::new("image/png", vec![0x89, b'P', b'N', b'G']);

        let url = store.save_spell_image(2, image.clone()).await.unwrap();
        assert_eq!(store.object_urls().resolve(&url), Some(image.clone()));

        let fetched = store.get_spell(2).await.unwrap().unwrap();
        assert_eq!(fetched.icon, IconRef::Stored(image.clone()));
        assert_eq!(fetched.name, "");

        let display = fetched.icon_object_url.unwrap();
        assert_ne!(display, url);
        assert!(store.object_urls().revoke(&display));
        assert!(store.object_urls().revoke(&url));
    }

    #[tokio::test]
    async fn test_image_keeps_existing_fields() {
        let (mut store, _temp) = create_test_store().await;
        store.save_spell(&spell(0, "Light")).await.unwrap();

        store
            .save_spell_image(0, IconBlob::new("image/jpeg", vec![1]))
            .await
            .unwrap();

        let fetched = store.get_spell(0).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Light");
        assert!(fetched.icon.as_blob().is_some());
    }

    #[tokio::test]
    async fn test_notes() {
        let (mut store, _temp) = create_test_store().await;

        let old = Note {
            title: "Old".to_string(),
            date: Utc::now() - chrono::Duration::days(3),
            ..Note::empty(0)
        };
        store.save_note(&old).await.unwrap();
        store.save_spell(&spell(0, "Shared page")).await.unwrap();

        let stored = store.get_note(0).await.unwrap().unwrap();
        assert!(stored.date > old.date);

        let page = store
            .save_note_record(json!({
                "page": 1,
                "title": "New",
                "type": "text",
                "content": "",
                "iconUrl": "",
                "iconObjectFit": "contain"
            }))
            .await
            .unwrap();
        assert_eq!(page, 1);

        let by_date = store.list_notes_sorted_by_date().await.unwrap();
        assert_eq!(by_date[0].title, "New");

        assert!(store.delete_note(0).await.unwrap());
        let remaining = store.list_notes_sorted_by_page().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].page, 1);
        assert_eq!(store.list_spells().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_switch_and_delete_spellbooks() {
        let (mut store, temp) = create_test_store().await;
        assert_eq!(store.list_all().await.unwrap(), vec!["Spellbook".to_string()]);

        store.save_spell(&spell(0, "In Spellbook")).await.unwrap();
        store.create_new("Grimoire").await.unwrap();

        assert_eq!(store.current_spellbook_name().await.unwrap(), "Grimoire");
        assert_eq!(store.open_spellbook_name(), Some("Grimoire"));
        assert_eq!(
            store.list_all().await.unwrap(),
            vec!["Spellbook".to_string(), "Grimoire".to_string()]
        );
        assert!(store.list_spells().await.unwrap().is_empty());

        let err = store.delete_spellbook("Grimoire").await.unwrap_err();
        assert!(matches!(err, StoreError::ForbiddenOperation(_)));

        store.switch_to("Spellbook").await.unwrap();
        assert_eq!(store.list_spells().await.unwrap()[0].name, "In Spellbook");

        store.delete_spellbook("Grimoire").await.unwrap();
        assert_eq!(store.list_all().await.unwrap(), vec!["Spellbook".to_string()]);
        assert!(!temp.path().join("spellbooks/Grimoire.sqlite").exists());
    }

    #[tokio::test]
    async fn test_switch_registers_unknown_name() {
        let (mut store, _temp) = create_test_store().await;

        store.switch_to("Codex").await.unwrap();
        let names = store.list_all().await.unwrap();
        assert!(names.contains(&"Codex".to_string()));
        assert!(names.contains(&"Spellbook".to_string()));
    }

    #[tokio::test]
    async fn test_external_setting_change_reopens() {
        let (mut store, _temp) = create_test_store().await;
        store.init(None).await.unwrap();

        store.settings().set_active_spellbook("Elsewhere").await.unwrap();
        store.list_notes().await.unwrap();
        assert_eq!(store.open_spellbook_name(), Some("Elsewhere"));
    }

    #[tokio::test]
    async fn test_clear_all_content() {
        let (mut store, _temp) = create_test_store().await;
        store.save_spell(&spell(0, "Gone")).await.unwrap();
        store.save_note(&Note::empty(0)).await.unwrap();

        store.clear_all_content().await.unwrap();
        assert!(store.list_spells().await.unwrap().is_empty());
        assert!(store.list_notes().await.unwrap().is_empty());
    }

    #[test]
    fn test_validate_spellbook_name() {
        assert!(validate_spellbook_name("Spellbook").is_ok());
        assert!(validate_spellbook_name("Tome of Fire (2nd ed.)").is_ok());

        for bad in ["", "   ", ".", "..", "a/b", "a\\b", "nul\0"] {
            assert!(
                matches!(validate_spellbook_name(bad), Err(StoreError::InvalidSpellbookName(_))),
                "{:?}",
                bad
            );
        }
        assert!(validate_spellbook_name(&"x".repeat(MAX_SPELLBOOK_NAME_LENGTH + 1)).is_err());
    }
}
