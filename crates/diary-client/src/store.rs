//! Local preference and entry cache store
//!
//! State lives under a single key in a directory-backed key/value store
//! (`<dir>/<key>.json`). Every mutation writes through; a missing or corrupt
//! file loads as defaults.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use diary_core::constants::SEARCH_HISTORY_CAP;
use diary_core::{DecryptedContent, EntryId, EntryMetadata};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Storage key owned by the diary store
pub const STORE_KEY: &str = "diaryState";

/// Directory of JSON documents keyed by name
#[derive(Debug, Clone)]
pub struct DurableStorage {
    dir: PathBuf,
}

impl DurableStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn read(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace the document atomically (temp file + rename); on failure the
    /// previous document is left in place
    pub fn write(&self, key: &str, contents: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, self.path(key))
    }

}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub theme: Theme,
    pub language: String,
    pub notifications_enabled: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            language: "en".into(),
            notifications_enabled: true,
        }
    }
}

/// Partial preference update; `None` fields are left as they are
#[derive(Debug, Clone, Default)]
pub struct PreferencesPatch {
    pub theme: Option<Theme>,
    pub language: Option<String>,
    pub notifications_enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntry {
    pub content: Option<DecryptedContent>,
    pub metadata: EntryMetadata,
    /// Unix seconds
    pub last_viewed_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedState {
    pub user_preferences: UserPreferences,
    pub cached_entries: BTreeMap<EntryId, CachedEntry>,
    pub draft_content: String,
    /// Most recent first
    pub search_history: Vec<String>,
    pub favorite_entries: BTreeSet<EntryId>,
}

pub struct PreferenceStore {
    storage: DurableStorage,
    state: PersistedState,
}

impl PreferenceStore {
    /// Load persisted state, falling back to defaults
    pub fn open(storage: DurableStorage) -> Self {
        let state = match storage.read(STORE_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Corrupt diary state, using defaults");
                PersistedState::default()
            }),
            Ok(None) => PersistedState::default(),
            Err(e) => {
                tracing::warn!(error = %e, dir = %storage.dir().display(), "Failed to read diary state, using defaults");
                PersistedState::default()
            }
        };
        Self { storage, state }
    }

    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    pub fn preferences(&self) -> &UserPreferences {
        &self.state.user_preferences
    }

    fn persist(&self) -> Result<()> {
        self.write_state(&self.state)
    }

    fn write_state(&self, state: &PersistedState) -> Result<()> {
        let raw = serde_json::to_string_pretty(state)?;
        self.storage.write(STORE_KEY, &raw)?;
        Ok(())
    }

    pub fn update_preferences(&mut self, patch: PreferencesPatch) -> Result<()> {
        let prefs = &mut self.state.user_preferences;
        if let Some(theme) = patch.theme {
            prefs.theme = theme;
        }
        if let Some(language) = patch.language {
            prefs.language = language;
        }
        if let Some(enabled) = patch.notifications_enabled {
            prefs.notifications_enabled = enabled;
        }
        self.persist()
    }

    /// Remember an entry, stamping when it was viewed
    pub fn cache_entry(
        &mut self,
        id: EntryId,
        metadata: EntryMetadata,
        content: Option<DecryptedContent>,
        now: u64,
    ) -> Result<()> {
        self.state.cached_entries.insert(
            id,
            CachedEntry {
                content,
                metadata,
                last_viewed_at: now,
            },
        );
        self.persist()
    }

    pub fn cached(&self, id: EntryId) -> Option<&CachedEntry> {
        self.state.cached_entries.get(&id)
    }

    pub fn save_draft(&mut self, content: &str) -> Result<()> {
        self.state.draft_content = content.to_string();
        self.persist()
    }

    pub fn draft(&self) -> &str {
        &self.state.draft_content
    }

    /// Record a search term: most recent first, deduplicated, capped
    pub fn push_search(&mut self, term: &str) -> Result<()> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(());
        }
        let history = &mut self.state.search_history;
        history.retain(|t| t != term);
        history.insert(0, term.to_string());
        history.truncate(SEARCH_HISTORY_CAP);
        self.persist()
    }

    pub fn search_history(&self) -> &[String] {
        &self.state.search_history
    }

    /// Flip favorite status; returns whether the entry is now a favorite
    pub fn toggle_favorite(&mut self, id: EntryId) -> Result<bool> {
        let favorites = &mut self.state.favorite_entries;
        let now_favorite = if favorites.remove(&id) {
            false
        } else {
            favorites.insert(id);
            true
        };
        self.persist()?;
        Ok(now_favorite)
    }

    pub fn is_favorite(&self, id: EntryId) -> bool {
        self.state.favorite_entries.contains(&id)
    }

    pub fn clear_cache(&mut self) -> Result<()> {
        self.state.cached_entries.clear();
        self.persist()
    }

    /// Drop everything except user preferences
    ///
    /// The reset state replaces the stored document in one write; if that
    /// write fails both the file and the in-memory state are unchanged.
    pub fn reset(&mut self) -> Result<()> {
        let fresh = PersistedState {
            user_preferences: self.state.user_preferences.clone(),
            ..Default::default()
        };
        self.write_state(&fresh)?;
        self.state = fresh;
        tracing::info!("Diary state reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use diary_core::Address;
    use tempfile::tempdir;

    use super::*;

    fn meta() -> EntryMetadata {
        EntryMetadata {
            author: Address::repeat_byte(1),
            created_at: 1_704_067_200,
            unlock_timestamp: 0,
            is_public: false,
        }
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let mut store = PreferenceStore::open(DurableStorage::new(dir.path()));
            store
                .update_preferences(PreferencesPatch {
                    theme: Some(Theme::Dark),
                    ..Default::default()
                })
                .unwrap();
            store.save_draft("half a thought").unwrap();
            store
                .cache_entry(3, meta(), Some(DecryptedContent::Text("hi".into())), 42)
                .unwrap();
            assert!(store.toggle_favorite(3).unwrap());
        }

        let store = PreferenceStore::open(DurableStorage::new(dir.path()));
        assert_eq!(store.preferences().theme, Theme::Dark);
        assert_eq!(store.preferences().language, "en");
        assert_eq!(store.draft(), "half a thought");
        assert_eq!(store.cached(3).unwrap().last_viewed_at, 42);
        assert!(store.is_favorite(3));
        assert!(dir.path().join("diaryState.json").exists());
    }

    #[test]
    fn test_search_history_dedup_and_cap() {
        let dir = tempdir().unwrap();
        let mut store = PreferenceStore::open(DurableStorage::new(dir.path()));

        for i in 0..11 {
            store.push_search(&format!("term{i}")).unwrap();
        }
        assert_eq!(store.search_history().len(), 10);
        assert_eq!(store.search_history()[0], "term10");
        assert!(!store.search_history().contains(&"term0".to_string()));

        store.push_search("term5").unwrap();
        assert_eq!(store.search_history()[0], "term5");
        assert_eq!(store.search_history().len(), 10);
        assert_eq!(
            store.search_history().iter().filter(|t| *t == "term5").count(),
            1
        );
    }

    #[test]
    fn test_reset_keeps_preferences() {
        let dir = tempdir().unwrap();
        let mut store = PreferenceStore::open(DurableStorage::new(dir.path()));
        store
            .update_preferences(PreferencesPatch {
                language: Some("fr".into()),
                notifications_enabled: Some(false),
                ..Default::default()
            })
            .unwrap();
        store.save_draft("draft").unwrap();
        store.push_search("cats").unwrap();
        store.toggle_favorite(1).unwrap();
        store.cache_entry(1, meta(), None, 1).unwrap();

        store.reset().unwrap();

        let reopened = PreferenceStore::open(DurableStorage::new(dir.path()));
        for s in [&store, &reopened] {
            assert_eq!(s.preferences().language, "fr");
            assert!(!s.preferences().notifications_enabled);
            assert_eq!(s.draft(), "");
            assert!(s.search_history().is_empty());
            assert!(!s.is_favorite(1));
            assert!(s.cached(1).is_none());
        }
    }

    #[test]
    fn test_failed_reset_keeps_stored_preferences() {
        let dir = tempdir().unwrap();
        let mut store = PreferenceStore::open(DurableStorage::new(dir.path()));
        store
            .update_preferences(PreferencesPatch {
                language: Some("fr".into()),
                ..Default::default()
            })
            .unwrap();
        store.save_draft("keep me").unwrap();

        // A directory where the temp file goes makes the write fail
        fs::create_dir(dir.path().join("diaryState.json.tmp")).unwrap();
        assert!(store.reset().is_err());
        assert_eq!(store.draft(), "keep me");

        let reopened = PreferenceStore::open(DurableStorage::new(dir.path()));
        assert_eq!(reopened.preferences().language, "fr");
        assert_eq!(reopened.draft(), "keep me");
    }

    #[test]
    fn test_reset_leaves_other_keys_alone() {
        let dir = tempdir().unwrap();
        let storage = DurableStorage::new(dir.path());
        storage.write("otherApp", "{}").unwrap();

        let mut store = PreferenceStore::open(storage.clone());
        store.save_draft("x").unwrap();
        store.reset().unwrap();

        assert_eq!(storage.read("otherApp").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_corrupt_state_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let storage = DurableStorage::new(dir.path());
        storage.write(STORE_KEY, "{not json").unwrap();

        let store = PreferenceStore::open(storage);
        assert_eq!(store.state(), &PersistedState::default());
    }

    #[test]
    fn test_clear_cache_only_touches_cache() {
        let dir = tempdir().unwrap();
        let mut store = PreferenceStore::open(DurableStorage::new(dir.path()));
        store.cache_entry(7, meta(), None, 1).unwrap();
        store.toggle_favorite(7).unwrap();

        store.clear_cache().unwrap();
        assert!(store.cached(7).is_none());
        assert!(store.is_favorite(7));
        assert!(!store.toggle_favorite(7).unwrap());
    }
}
