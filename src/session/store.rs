use super::message::{Message, Session, SessionId};
use crate::error::{LexisError, Result};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Owns every session and the active-session pointer.
///
/// All transitions are synchronous. Sessions keep their creation order, which is
/// also the order used to pick a new active session after a deletion.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Vec<Session>,
    active: Option<SessionId>,
    next_id: u64,
}

/// Serializable form of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub next_id: u64,
    pub active: Option<SessionId>,
    pub sessions: Vec<Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Vec::new(),
            active: None,
            next_id: 1,
        }
    }

    /// Rebuilds a store from persisted state, repairing what cannot hold:
    /// a dangling active pointer or an id counter behind a stored id.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let StoreSnapshot {
            next_id,
            active,
            mut sessions,
        } = snapshot;

        let mut seen = std::collections::HashSet::new();
        sessions.retain(|s| {
            let fresh = seen.insert(s.id);
            if !fresh {
                tracing::warn!(session = %s.id, "Dropping duplicate session from snapshot");
            }
            fresh
        });

        let floor = sessions.iter().map(|s| s.id.get() + 1).max().unwrap_or(1);
        let active = active
            .filter(|id| sessions.iter().any(|s| s.id == *id))
            .or_else(|| sessions.first().map(|s| s.id));

        Self {
            sessions,
            active,
            next_id: next_id.max(floor),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            next_id: self.next_id,
            active: self.active,
            sessions: self.sessions.clone(),
        }
    }

    pub fn create_session(&mut self) -> SessionId {
        let id = SessionId::new(self.next_id);
        self.next_id += 1;
        self.sessions.push(Session::new(id));
        self.active = Some(id);
        tracing::debug!(session = %id, "Created session");
        id
    }

    /// Active session id, creating the first session when the store is empty.
    pub fn ensure_session(&mut self) -> SessionId {
        match self.active {
            Some(id) => id,
            None => self.create_session(),
        }
    }

    pub fn select_session(&mut self, id: SessionId) -> Result<()> {
        if self.position(id).is_none() {
            return Err(LexisError::SessionNotFound(id));
        }
        self.active = Some(id);
        Ok(())
    }

    /// Returns `false` without touching state for unknown ids or blank titles.
    pub fn rename_session(&mut self, id: SessionId, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            return false;
        }
        match self.sessions.iter_mut().find(|s| s.id == id) {
            Some(session) => {
                session.title = title.to_string();
                true
            }
            None => false,
        }
    }

    /// Removes the session. When it was active, the session that followed it
    /// becomes active, else the one before it, else none.
    pub fn delete_session(&mut self, id: SessionId) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };

        self.sessions.remove(index);

        if self.active == Some(id) {
            self.active = self
                .sessions
                .get(index)
                .or_else(|| index.checked_sub(1).and_then(|i| self.sessions.get(i)))
                .map(|s| s.id);
        }

        tracing::debug!(session = %id, active = ?self.active, "Deleted session");
        true
    }

    pub fn append_message(&mut self, id: SessionId, mut message: Message) -> Result<()> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(LexisError::SessionNotFound(id))?;

        if message.timestamp.is_none() {
            message.timestamp = Some(Utc::now());
        }
        session.messages.push(message);
        Ok(())
    }

    /// Id the next created session will get.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.active
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active.and_then(|id| self.session(id))
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn position(&self, id: SessionId) -> Option<usize> {
        self.sessions.iter().position(|s| s.id == id)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    fn assert_active_is_valid(store: &SessionStore) {
        match store.active_id() {
            Some(id) => assert!(store.session(id).is_some(), "dangling active id {}", id),
            None => assert!(store.is_empty()),
        }
    }

    #[test]
    fn test_create_makes_session_active() {
        let mut store = SessionStore::new();
        let first = store.create_session();
        let second = store.create_session();

        assert_ne!(first, second);
        assert_eq!(store.active_id(), Some(second));
        assert_eq!(store.len(), 2);
        assert_eq!(store.active_session().unwrap().title, "Nouvelle session 2");
    }

    #[test]
    fn test_select_unknown_session_keeps_active() {
        let mut store = SessionStore::new();
        let id = store.create_session();

        let err = store.select_session(SessionId::new(99)).unwrap_err();
        assert!(matches!(err, LexisError::SessionNotFound(_)));
        assert_eq!(store.active_id(), Some(id));
    }

    #[test]
    fn test_select_switches_active() {
        let mut store = SessionStore::new();
        let first = store.create_session();
        store.create_session();

        store.select_session(first).unwrap();
        assert_eq!(store.active_id(), Some(first));
    }

    #[test]
    fn test_rename_ignores_blank_titles() {
        let mut store = SessionStore::new();
        let id = store.create_session();
        let original = store.session(id).unwrap().title.clone();

        assert!(!store.rename_session(id, "  "));
        assert_eq!(store.session(id).unwrap().title, original);

        assert!(store.rename_session(id, "Torts"));
        assert_eq!(store.session(id).unwrap().title, "Torts");

        assert!(store.rename_session(id, "  Police administrative "));
        assert_eq!(store.session(id).unwrap().title, "Police administrative");
    }

    #[test]
    fn test_rename_unknown_session_is_noop() {
        let mut store = SessionStore::new();
        store.create_session();
        assert!(!store.rename_session(SessionId::new(42), "Torts"));
    }

    #[test]
    fn test_delete_active_prefers_next_session() {
        let mut store = SessionStore::new();
        let a = store.create_session();
        let b = store.create_session();
        let c = store.create_session();

        store.select_session(b).unwrap();
        assert!(store.delete_session(b));
        assert_eq!(store.active_id(), Some(c));

        assert!(store.delete_session(c));
        assert_eq!(store.active_id(), Some(a));

        assert!(store.delete_session(a));
        assert_eq!(store.active_id(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_inactive_keeps_active() {
        let mut store = SessionStore::new();
        let a = store.create_session();
        let b = store.create_session();

        assert!(store.delete_session(a));
        assert_eq!(store.active_id(), Some(b));
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let mut store = SessionStore::new();
        let a = store.create_session();
        assert!(!store.delete_session(SessionId::new(7)));
        assert_eq!(store.active_id(), Some(a));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut store = SessionStore::new();
        let a = store.create_session();
        store.delete_session(a);
        let b = store.create_session();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_active_never_dangles_across_create_delete_sequences() {
        let mut store = SessionStore::new();
        let mut created = Vec::new();

        // Deterministic interleaving of creations and deletions.
        for step in 0..60u64 {
            if step % 3 == 2 && !created.is_empty() {
                let victim = created.remove((step as usize * 7) % created.len());
                store.delete_session(victim);
            } else {
                created.push(store.create_session());
            }
            assert_active_is_valid(&store);
        }

        for id in created {
            store.delete_session(id);
            assert_active_is_valid(&store);
        }
        assert_eq!(store.active_id(), None);
    }

    #[test]
    fn test_append_preserves_call_order() {
        let mut store = SessionStore::new();
        let id = store.create_session();

        for i in 0..25 {
            let message = if i % 2 == 0 {
                Message::user(format!("question {}", i))
            } else {
                Message::model(format!("answer {}", i))
            };
            store.append_message(id, message).unwrap();
        }

        let messages = &store.session(id).unwrap().messages;
        assert_eq!(messages.len(), 25);
        for (i, message) in messages.iter().enumerate() {
            assert!(message.text.ends_with(&i.to_string()));
            assert!(message.timestamp.is_some());
        }
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Model);
    }

    #[test]
    fn test_append_keeps_explicit_timestamp() {
        let mut store = SessionStore::new();
        let id = store.create_session();
        let when = chrono::DateTime::parse_from_rfc3339("2024-09-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        store
            .append_message(id, Message::user("Bonjour").with_timestamp(when))
            .unwrap();
        assert_eq!(store.session(id).unwrap().messages[0].timestamp, Some(when));
    }

    #[test]
    fn test_append_to_missing_session_fails() {
        let mut store = SessionStore::new();
        let err = store
            .append_message(SessionId::new(3), Message::user("lost"))
            .unwrap_err();
        assert!(matches!(err, LexisError::SessionNotFound(id) if id == SessionId::new(3)));
    }

    #[test]
    fn test_ensure_session_creates_first_lazily() {
        let mut store = SessionStore::new();
        let id = store.ensure_session();
        assert_eq!(store.ensure_session(), id);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_snapshot_repairs_dangling_state() {
        let mut store = SessionStore::new();
        let a = store.create_session();
        let b = store.create_session();

        let mut snapshot = store.snapshot();
        snapshot.active = Some(SessionId::new(50));
        snapshot.next_id = 1;

        let restored = SessionStore::from_snapshot(snapshot);
        assert_eq!(restored.active_id(), Some(a));

        let mut restored = restored;
        let c = restored.create_session();
        assert!(c > b);
    }
}
