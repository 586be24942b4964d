use crate::api::{CompletionBackend, CompletionRequest};
use crate::config::{DispatchScope, EMPTY_REPLY_FALLBACK, ERROR_PREFIX};
use crate::request_builder::RequestBuilder;
use crate::session::{AttachedFile, Message, SessionId, SessionStore};

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type SharedStore = Arc<Mutex<SessionStore>>;

/// Store mutations never panic midway, so a poisoned lock still holds consistent state.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Inputs every turn carries besides the transcript. Opaque to the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct DispatchSettings {
    pub system_instruction: String,
    pub course_content: String,
    pub scope: DispatchScope,
}

/// Why a submission was not dispatched. None of these change the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    EmptyInput,
    Busy(SessionId),
    UnknownSession(SessionId),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::EmptyInput => write!(f, "Nothing to send"),
            Rejection::Busy(id) => write!(f, "A reply is already pending for session {}", id),
            Rejection::UnknownSession(id) => write!(f, "Session {} not found", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A model reply was appended.
    Answered(SessionId),
    /// An error turn was appended.
    Failed { session_id: SessionId, detail: String },
    /// The session was deleted before the reply arrived.
    Lost(SessionId),
}

impl TurnOutcome {
    pub fn session_id(&self) -> SessionId {
        match self {
            TurnOutcome::Answered(id) | TurnOutcome::Lost(id) => *id,
            TurnOutcome::Failed { session_id, .. } => *session_id,
        }
    }
}

type InFlight = Arc<Mutex<HashSet<SessionId>>>;

/// Holds a session's in-flight slot until dropped.
struct InFlightGuard {
    in_flight: InFlight,
    session_id: SessionId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.session_id);
        tracing::trace!(session = %self.session_id, "Released in-flight slot");
    }
}

/// Turns user submissions into completed turns against the shared store.
pub struct Dispatcher<C> {
    store: SharedStore,
    backend: Arc<C>,
    in_flight: InFlight,
    settings: Arc<DispatchSettings>,
}

impl<C> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            backend: Arc::clone(&self.backend),
            in_flight: Arc::clone(&self.in_flight),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<C: CompletionBackend> Dispatcher<C> {
    pub fn new(store: SharedStore, backend: Arc<C>, settings: DispatchSettings) -> Self {
        Self {
            store,
            backend,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            settings: Arc::new(settings),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn is_in_flight(&self, session_id: SessionId) -> bool {
        lock(&self.in_flight).contains(&session_id)
    }

    #[cfg(test)]
    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Synchronous half of a turn: validates, takes the in-flight slot, appends
    /// the user's message and captures the transcript.
    pub fn begin_turn(
        &self,
        session_id: SessionId,
        text: &str,
        file: Option<&AttachedFile>,
    ) -> Result<PendingTurn<C>, Rejection> {
        let text = text.trim();
        if text.is_empty() && file.is_none() {
            return Err(Rejection::EmptyInput);
        }

        let guard = self.acquire(session_id)?;

        let display_text = match file {
            Some(file) if text.is_empty() => file.marker(),
            Some(file) => format!("{}\n{}", file.marker(), text),
            None => text.to_string(),
        };

        let request = {
            let mut store = lock(&self.store);
            let session = store
                .session(session_id)
                .ok_or(Rejection::UnknownSession(session_id))?;

            let request = RequestBuilder::new(
                &session.messages,
                &self.settings.system_instruction,
                &self.settings.course_content,
            )
            .user_turn(text, file)
            .build();

            store
                .append_message(session_id, Message::user(display_text).with_file(file.cloned()))
                .map_err(|_| Rejection::UnknownSession(session_id))?;

            request
        };

        tracing::info!(
            session = %session_id,
            transcript_len = request.messages.len(),
            has_file = file.is_some(),
            "Dispatching turn"
        );

        Ok(PendingTurn {
            session_id,
            request,
            backend: Arc::clone(&self.backend),
            store: Arc::clone(&self.store),
            _guard: guard,
        })
    }

    /// Runs a whole turn. Rejections leave the store untouched.
    pub async fn submit_turn(
        &self,
        session_id: SessionId,
        text: &str,
        file: Option<&AttachedFile>,
    ) -> Result<TurnOutcome, Rejection> {
        let pending = self.begin_turn(session_id, text, file)?;
        Ok(pending.run().await)
    }

    fn acquire(&self, session_id: SessionId) -> Result<InFlightGuard, Rejection> {
        let mut in_flight = lock(&self.in_flight);

        let busy = match self.settings.scope {
            DispatchScope::PerSession => in_flight.contains(&session_id),
            DispatchScope::Global => !in_flight.is_empty(),
        };
        if busy {
            tracing::debug!(session = %session_id, scope = ?self.settings.scope, "Turn rejected, dispatch in flight");
            return Err(Rejection::Busy(session_id));
        }

        in_flight.insert(session_id);
        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            session_id,
        })
    }
}

/// A turn whose user message is already in the store, waiting on the backend.
///
/// Dropping it without running releases the in-flight slot.
pub struct PendingTurn<C> {
    session_id: SessionId,
    request: CompletionRequest,
    backend: Arc<C>,
    store: SharedStore,
    _guard: InFlightGuard,
}

impl<C: CompletionBackend> PendingTurn<C> {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn request(&self) -> &CompletionRequest {
        &self.request
    }

    /// Awaits the backend and appends the reply, or an error turn, to the
    /// session the turn was started for.
    pub async fn run(mut self) -> TurnOutcome {
        let request = std::mem::take(&mut self.request);
        let result = self.backend.complete(request).await;

        let (message, failure) = match result {
            Ok(text) if text.trim().is_empty() => (Message::model(EMPTY_REPLY_FALLBACK), None),
            Ok(text) => (Message::model(text), None),
            Err(e) => {
                tracing::warn!(session = %self.session_id, status = e.status_code(), error = %e, "Completion failed");
                let detail = e.detail();
                (
                    Message::model_error(format!("{}{}", ERROR_PREFIX, detail)),
                    Some(detail),
                )
            }
        };

        let appended = lock(&self.store).append_message(self.session_id, message);

        match (appended, failure) {
            (Err(e), _) => {
                tracing::warn!(session = %self.session_id, error = %e, "Dropping reply for deleted session");
                TurnOutcome::Lost(self.session_id)
            }
            (Ok(()), Some(detail)) => TurnOutcome::Failed {
                session_id: self.session_id,
                detail,
            },
            (Ok(()), None) => TurnOutcome::Answered(self.session_id),
        }
    }
}
