//! Conversation persistence.
//!
//! The event loop talks to storage only through [`ConversationStore`]; the
//! on-disk layout is one pretty-printed JSON file per conversation.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use tracing::warn;

use crate::core::conversation::{Conversation, ConversationId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conversation {0} not found")]
    NotFound(ConversationId),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid conversation file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not replace conversation file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("conversation id {0:?} cannot be used as a file name")]
    InvalidId(ConversationId),
}

pub trait ConversationStore: Send {
    fn load(&self, id: &ConversationId) -> Result<Conversation, StoreError>;
    fn save(&self, conversation: &Conversation) -> Result<(), StoreError>;
    /// All stored conversations, most recently updated first.
    fn list(&self) -> Result<Vec<Conversation>, StoreError>;
    fn delete(&self, id: &ConversationId) -> Result<(), StoreError>;
}

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &ConversationId) -> Result<PathBuf, StoreError> {
        if !id.is_file_safe() {
            return Err(StoreError::InvalidId(id.clone()));
        }
        Ok(self.dir.join(format!("{}.json", id.as_str())))
    }

    fn read(path: &Path) -> Result<Conversation, StoreError> {
        let contents = fs::read_to_string(path)?;
        let mut conversation: Conversation = serde_json::from_str(&contents)?;
        if !conversation.id.is_file_safe() {
            return Err(StoreError::InvalidId(conversation.id));
        }
        conversation.normalize();
        Ok(conversation)
    }
}

impl ConversationStore for JsonFileStore {
    fn load(&self, id: &ConversationId) -> Result<Conversation, StoreError> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Err(StoreError::NotFound(id.clone()));
        }
        Self::read(&path)
    }

    fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let path = self.path_for(&conversation.id)?;
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(conversation)?;

        // Write beside the target and rename so a crash never leaves a
        // truncated file behind.
        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(json.as_bytes())?;
        temp.flush()?;
        temp.persist(path)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<Conversation>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut conversations = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match Self::read(&path) {
                Ok(conversation) => conversations.push(conversation),
                Err(err) => warn!(path = %path.display(), error = %err, "Skipping unreadable conversation"),
            }
        }
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    fn delete(&self, id: &ConversationId) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Err(StoreError::NotFound(id.clone()));
        }
        fs::remove_file(path)?;
        Ok(())
    }
}

/// Keeps conversations for the lifetime of the process only.
#[derive(Default)]
pub struct MemoryStore {
    conversations: Mutex<HashMap<ConversationId, Conversation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for MemoryStore {
    fn load(&self, id: &ConversationId) -> Result<Conversation, StoreError> {
        let guard = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut guard = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<Conversation>, StoreError> {
        let guard = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
        let mut conversations: Vec<_> = guard.values().cloned().collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    fn delete(&self, id: &ConversationId) -> Result<(), StoreError> {
        let mut guard = self.conversations.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Role;
    use tempfile::tempdir;

    #[test]
    fn json_store_round_trips_and_lists_newest_first() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("chats"));

        let mut older = Conversation::new("m");
        older.append(Role::User, "first");
        store.save(&older).unwrap();

        let mut newer = Conversation::new("m");
        newer.append(Role::User, "second");
        newer.updated_at = older.updated_at + chrono::Duration::seconds(5);
        store.save(&newer).unwrap();

        let loaded = store.load(&older.id).unwrap();
        assert_eq!(loaded.messages(), older.messages());

        let listed: Vec<_> = store.list().unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(listed, vec![newer.id.clone(), older.id.clone()]);
    }

    #[test]
    fn json_store_skips_corrupt_files_and_foreign_extensions() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let conversation = Conversation::new("m");
        store.save(&conversation).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, conversation.id);
    }

    #[test]
    fn loaded_conversation_continues_sequence_numbers() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let mut conversation = Conversation::new("m");
        conversation.append(Role::User, "a");
        conversation.append(Role::Assistant, "b");
        store.save(&conversation).unwrap();

        let mut loaded = store.load(&conversation.id).unwrap();
        assert_eq!(loaded.append(Role::User, "c"), 2);
    }

    #[test]
    fn missing_conversations_report_not_found() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let id = ConversationId::new("nope");
        assert!(matches!(store.load(&id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(&id), Err(StoreError::NotFound(_))));
        assert!(JsonFileStore::new(dir.path().join("absent")).list().unwrap().is_empty());
    }

    #[test]
    fn memory_store_supports_the_full_contract() {
        let store = MemoryStore::new();
        let conversation = Conversation::new("m");
        store.save(&conversation).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.load(&conversation.id).unwrap().id, conversation.id);
        store.delete(&conversation.id).unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn ids_that_would_escape_the_data_dir_are_refused() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("chats");
        let store = JsonFileStore::new(&data_dir);

        let mut crafted = Conversation::new("m");
        crafted.id = ConversationId::new("../x");
        assert!(matches!(store.save(&crafted), Err(StoreError::InvalidId(_))));
        assert!(!dir.path().join("x.json").exists());
        assert!(matches!(store.load(&crafted.id), Err(StoreError::InvalidId(_))));
        assert!(matches!(store.delete(&crafted.id), Err(StoreError::InvalidId(_))));

        let honest = Conversation::new("m");
        store.save(&honest).unwrap();
        let planted = fs::read_to_string(data_dir.join(format!("{}.json", honest.id)))
            .unwrap()
            .replace(honest.id.as_str(), "../x");
        fs::write(data_dir.join("planted.json"), planted).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1, "the planted file is skipped");
        assert_eq!(listed[0].id, honest.id);
    }
}
