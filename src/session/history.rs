use super::message::{Role, Session, SessionId};
use super::store::{SessionStore, StoreSnapshot};
use crate::error::{LexisError, Result};
use crate::error_ext::ResultExt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const LEXIS_DIR: &str = ".lexis";
const SESSIONS_DIR: &str = "sessions";
const INDEX_FILE: &str = "index.json";
const MAX_PREVIEW_LENGTH: usize = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub id: SessionId,
    pub title: String,
    pub preview: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

/// Sessions are listed in store order, which the active-session fallback relies on.
#[derive(Debug, Serialize, Deserialize)]
struct SessionIndex {
    next_id: u64,
    #[serde(default)]
    active: Option<SessionId>,
    sessions: Vec<SessionMetadata>,
}

impl SessionIndex {
    fn empty() -> Self {
        Self {
            next_id: 1,
            active: None,
            sessions: Vec::new(),
        }
    }
}

/// Snapshot of one save, taken under the store lock and written after it is released.
#[derive(Debug)]
pub struct PendingSave {
    index: SessionIndex,
    sessions: Vec<Session>,
}

/// Persists the session store under `.lexis/sessions` in the workspace.
pub struct HistoryManager {
    workspace: PathBuf,
}

impl HistoryManager {
    pub fn new(workspace: PathBuf) -> Result<Self> {
        let manager = Self { workspace };
        manager.ensure_directories()?;
        Ok(manager)
    }

    fn ensure_directories(&self) -> Result<()> {
        let sessions_dir = self.sessions_dir();

        fs::create_dir_all(&sessions_dir).map_err(|e| {
            LexisError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create .lexis directories: {}", e),
            ))
        })?;

        let index_path = self.index_path();
        if !index_path.exists() {
            let content = serde_json::to_string_pretty(&SessionIndex::empty())?;
            fs::write(index_path, content)?;
        }

        Ok(())
    }

    fn sessions_dir(&self) -> PathBuf {
        self.workspace.join(LEXIS_DIR).join(SESSIONS_DIR)
    }

    fn index_path(&self) -> PathBuf {
        self.sessions_dir().join(INDEX_FILE)
    }

    fn session_path(&self, id: SessionId) -> PathBuf {
        self.sessions_dir().join(format!("{}.json", id))
    }

    fn extract_preview(session: &Session) -> String {
        for message in session.messages.iter().filter(|m| m.role == Role::User) {
            let preview = message.text.trim();
            if preview.is_empty() {
                continue;
            }

            return if preview.chars().count() > MAX_PREVIEW_LENGTH {
                let cut: String = preview.chars().take(MAX_PREVIEW_LENGTH).collect();
                format!("{}...", cut)
            } else {
                preview.to_string()
            };
        }
        "Session vide".to_string()
    }

    pub fn metadata(session: &Session) -> SessionMetadata {
        SessionMetadata {
            id: session.id,
            title: session.title.clone(),
            preview: Self::extract_preview(session),
            created_at: session.created_at,
            updated_at: session.updated_at(),
            message_count: session.messages.len(),
        }
    }

    pub fn save_session(&self, session: &Session) -> Result<()> {
        let content = serde_json::to_string_pretty(session)?;
        fs::write(self.session_path(session.id), content)
            .with_context(|| format!("Failed to save session {}", session.id))?;
        Ok(())
    }

    /// Captures what a save writes: the index, plus the sessions named in
    /// `changed`. Cheap enough to run under the store lock; the disk work
    /// happens later in [`HistoryManager::write`].
    pub fn prepare_save(store: &SessionStore, changed: &[SessionId]) -> PendingSave {
        let sessions = store.sessions();
        PendingSave {
            index: SessionIndex {
                next_id: store.next_id(),
                active: store.active_id(),
                sessions: sessions.iter().map(Self::metadata).collect(),
            },
            sessions: sessions
                .iter()
                .filter(|s| changed.contains(&s.id))
                .cloned()
                .collect(),
        }
    }

    /// Writes the changed session files, then the index.
    pub fn write(&self, save: PendingSave) -> Result<()> {
        for session in &save.sessions {
            self.save_session(session)?;
        }
        self.write_index(&save.index)?;

        tracing::debug!(
            sessions = save.index.sessions.len(),
            written = save.sessions.len(),
            "Saved session store"
        );
        Ok(())
    }

    /// Writes every session file and the index.
    pub fn save_store(&self, store: &SessionStore) -> Result<()> {
        let snapshot = store.snapshot();
        self.write(PendingSave {
            index: SessionIndex {
                next_id: snapshot.next_id,
                active: snapshot.active,
                sessions: snapshot.sessions.iter().map(Self::metadata).collect(),
            },
            sessions: snapshot.sessions,
        })
    }

    fn write_index(&self, index: &SessionIndex) -> Result<()> {
        let content = serde_json::to_string_pretty(index)?;
        fs::write(self.index_path(), content)
            .context("Failed to save session index")?;
        Ok(())
    }

    pub fn load_session(&self, id: SessionId) -> Result<Session> {
        let session_path = self.session_path(id);

        if !session_path.exists() {
            return Err(LexisError::SessionNotFound(id));
        }

        let content = fs::read_to_string(session_path)?;
        let session: Session = serde_json::from_str(&content)?;

        Ok(session)
    }

    /// Loads the store. Sessions whose file is missing or unreadable are skipped.
    pub fn load_store(&self) -> Result<SessionStore> {
        let index = self.read_index()?;

        let mut sessions = Vec::with_capacity(index.sessions.len());
        for meta in &index.sessions {
            match self.load_session(meta.id) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::warn!(session = %meta.id, error = %e, "Skipping unreadable session");
                }
            }
        }

        Ok(SessionStore::from_snapshot(StoreSnapshot {
            next_id: index.next_id,
            active: index.active,
            sessions,
        }))
    }

    #[cfg(test)]
    pub fn list_sessions(&self) -> Result<Vec<SessionMetadata>> {
        Ok(self.read_index()?.sessions)
    }

    /// Removes the session file and its index entry.
    pub fn delete_session(&self, id: SessionId) -> Result<()> {
        let session_path = self.session_path(id);

        if session_path.exists() {
            fs::remove_file(session_path)?;
        }

        let mut index = self.read_index()?;
        index.sessions.retain(|s| s.id != id);
        if index.active == Some(id) {
            index.active = None;
        }

        self.write_index(&index)
    }

    fn read_index(&self) -> Result<SessionIndex> {
        let index_path = self.index_path();

        if !index_path.exists() {
            return Ok(SessionIndex::empty());
        }

        let content = fs::read_to_string(&index_path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("Corrupted session index at {:?}", index_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{AttachedFile, Message};
    use tempfile::TempDir;

    #[test]
    fn test_history_manager_creation() {
        let temp_dir = TempDir::new().unwrap();
        let manager = HistoryManager::new(temp_dir.path().to_path_buf());
        assert!(manager.is_ok());

        let sessions_dir = temp_dir.path().join(LEXIS_DIR).join(SESSIONS_DIR);
        assert!(sessions_dir.join(INDEX_FILE).exists());
    }

    #[test]
    fn test_store_round_trip_keeps_ids_and_counter() {
        let temp_dir = TempDir::new().unwrap();
        let manager = HistoryManager::new(temp_dir.path().to_path_buf()).unwrap();

        let mut store = SessionStore::new();
        let a = store.create_session();
        let b = store.create_session();
        let c = store.create_session();
        store.rename_session(a, "Droit des contrats");
        store
            .append_message(
                a,
                Message::user("[Fichier joint : arret.pdf]\nRésume")
                    .with_file(Some(AttachedFile::from_bytes("arret.pdf", b"%PDF"))),
            )
            .unwrap();
        store
            .append_message(a, Message::model_error("Erreur : boom"))
            .unwrap();
        store.delete_session(c);
        manager.delete_session(c).unwrap();
        store.select_session(a).unwrap();

        manager.save_store(&store).unwrap();

        let mut loaded = manager.load_store().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.active_id(), Some(a));
        assert!(loaded.session(b).is_some());

        let session = loaded.session(a).unwrap();
        assert_eq!(session.title, "Droit des contrats");
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].file.as_ref().unwrap().name, "arret.pdf");
        assert!(session.messages[1].is_error);

        // The deleted id must not come back.
        let next = loaded.create_session();
        assert!(next > c);
    }

    #[test]
    fn test_partial_save_leaves_other_session_files_alone() {
        let temp_dir = TempDir::new().unwrap();
        let manager = HistoryManager::new(temp_dir.path().to_path_buf()).unwrap();

        let mut store = SessionStore::new();
        let a = store.create_session();
        let b = store.create_session();
        manager.save_store(&store).unwrap();

        let a_path = manager.session_path(a);
        fs::write(&a_path, "SENTINEL").unwrap();

        store.rename_session(b, "Régimes matrimoniaux");
        manager
            .write(HistoryManager::prepare_save(&store, &[b]))
            .unwrap();

        assert_eq!(fs::read_to_string(&a_path).unwrap(), "SENTINEL");
        assert_eq!(manager.load_session(b).unwrap().title, "Régimes matrimoniaux");

        let listed = manager.list_sessions().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].title, "Régimes matrimoniaux");
    }

    #[test]
    fn test_index_only_save_keeps_counter_and_active() {
        let temp_dir = TempDir::new().unwrap();
        let manager = HistoryManager::new(temp_dir.path().to_path_buf()).unwrap();

        let mut store = SessionStore::new();
        let a = store.create_session();
        store.create_session();
        manager.save_store(&store).unwrap();

        store.select_session(a).unwrap();
        manager.write(HistoryManager::prepare_save(&store, &[])).unwrap();

        let loaded = manager.load_store().unwrap();
        assert_eq!(loaded.active_id(), Some(a));
        assert_eq!(loaded.next_id(), 3);
    }

    #[test]
    fn test_list_sessions_in_store_order() {
        let temp_dir = TempDir::new().unwrap();
        let manager = HistoryManager::new(temp_dir.path().to_path_buf()).unwrap();

        let mut store = SessionStore::new();
        let first = store.create_session();
        let second = store.create_session();
        store
            .append_message(first, Message::user("Premier thème"))
            .unwrap();
        store
            .append_message(second, Message::user("Second thème"))
            .unwrap();
        manager.save_store(&store).unwrap();

        let sessions = manager.list_sessions().unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].preview, "Premier thème");
        assert_eq!(sessions[1].preview, "Second thème");
        assert_eq!(sessions[1].message_count, 1);
    }

    #[test]
    fn test_delete_session_removes_file_and_entry() {
        let temp_dir = TempDir::new().unwrap();
        let manager = HistoryManager::new(temp_dir.path().to_path_buf()).unwrap();

        let mut store = SessionStore::new();
        let id = store.create_session();
        manager.save_store(&store).unwrap();
        assert!(manager.load_session(id).is_ok());

        manager.delete_session(id).unwrap();
        assert!(matches!(
            manager.load_session(id),
            Err(LexisError::SessionNotFound(_))
        ));
        assert!(manager.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_missing_session_file_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let manager = HistoryManager::new(temp_dir.path().to_path_buf()).unwrap();

        let mut store = SessionStore::new();
        let a = store.create_session();
        let b = store.create_session();
        manager.save_store(&store).unwrap();
        fs::remove_file(manager.session_path(b)).unwrap();

        let loaded = manager.load_store().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.active_id(), Some(a));
    }

    #[test]
    fn test_preview_extraction() {
        let mut session = Session::new(SessionId::new(1));
        assert_eq!(HistoryManager::extract_preview(&session), "Session vide");

        session.messages.push(Message::model("Bonjour"));
        session.messages.push(Message::user("  La responsabilité du fait des choses "));
        assert_eq!(
            HistoryManager::extract_preview(&session),
            "La responsabilité du fait des choses"
        );

        let mut session = Session::new(SessionId::new(2));
        session.messages.push(Message::user("é".repeat(150)));
        let preview = HistoryManager::extract_preview(&session);
        assert_eq!(preview.chars().count(), MAX_PREVIEW_LENGTH + 3);
        assert!(preview.ends_with("..."));
    }
}
