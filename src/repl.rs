use crate::api::CompletionBackend;
use crate::commands::{Command, CommandResult};
use crate::dispatch::{lock, Dispatcher, Rejection, TurnOutcome};
use crate::error::{LexisError, Result};
use crate::render::{MarkdownRenderer, Renderer};
use crate::session::{AttachedFile, HistoryManager, SessionId, SessionMetadata};
use crate::ui::UI;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Interactive front end. Turns run as spawned tasks and report back over a
/// channel, so the prompt stays usable while replies are pending.
pub struct Repl<C> {
    dispatcher: Dispatcher<C>,
    history_manager: HistoryManager,
    renderer: MarkdownRenderer,
    pending_file: Option<AttachedFile>,
    outcomes_tx: mpsc::UnboundedSender<TurnOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<TurnOutcome>,
    outstanding: usize,
}

impl<C: CompletionBackend> Repl<C> {
    pub fn new(dispatcher: Dispatcher<C>, history_manager: HistoryManager) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Self {
            dispatcher,
            history_manager,
            renderer: MarkdownRenderer,
            pending_file: None,
            outcomes_tx,
            outcomes_rx,
            outstanding: 0,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut interrupted = false;

        self.show_active_session();

        loop {
            self.print_prompt();

            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if self.handle_line(&line)? == CommandResult::Exit {
                            break;
                        }
                    }
                    Ok(None) => {
                        println!();
                        break;
                    }
                    Err(e) => {
                        UI::print_error(&format!("Failed to read input: {}", e));
                        break;
                    }
                },
                Some(outcome) = self.outcomes_rx.recv() => self.handle_outcome(outcome),
                _ = tokio::signal::ctrl_c() => {
                    println!("\nExiting...");
                    interrupted = true;
                    break;
                }
            }
        }

        if !interrupted {
            self.drain().await;
        }
        self.save_all();
        UI::print_goodbye();

        Ok(())
    }

    /// Sends one prompt (with any attachment) and waits for its reply.
    pub async fn process_single_prompt(&mut self, prompt: &str) -> Result<()> {
        UI::print_echo(prompt);
        if !self.submit(prompt) {
            return Err(LexisError::InvalidCommand("Nothing to send".to_string()));
        }
        self.drain().await;
        Ok(())
    }

    pub(crate) fn handle_line(&mut self, line: &str) -> Result<CommandResult> {
        match Command::parse(line) {
            Some(Ok(command)) => command.execute(self),
            Some(Err(e)) => {
                UI::print_error(&e.to_string());
                Ok(CommandResult::Continue)
            }
            None => {
                self.submit(line);
                Ok(CommandResult::Continue)
            }
        }
    }

    /// Dispatches a turn to the active session. The pending attachment is
    /// consumed only when the turn is accepted.
    pub fn submit(&mut self, text: &str) -> bool {
        if text.trim().is_empty() && self.pending_file.is_none() {
            return false;
        }
        let session_id = self.ensure_session();

        match self
            .dispatcher
            .begin_turn(session_id, text, self.pending_file.as_ref())
        {
            Ok(pending) => {
                self.pending_file = None;
                self.save(&[session_id]);
                UI::print_waiting(session_id);

                let outcomes = self.outcomes_tx.clone();
                tokio::spawn(async move {
                    let _ = outcomes.send(pending.run().await);
                });
                self.outstanding += 1;
                true
            }
            Err(Rejection::EmptyInput) => false,
            Err(rejection) => {
                UI::print_warning(&rejection.to_string());
                false
            }
        }
    }

    fn handle_outcome(&mut self, outcome: TurnOutcome) {
        self.outstanding = self.outstanding.saturating_sub(1);

        let session_id = outcome.session_id();
        if let TurnOutcome::Lost(_) = outcome {
            tracing::debug!(session = %session_id, "Reply arrived after session was deleted");
            return;
        }

        self.save(&[session_id]);

        let store = lock(self.dispatcher.store());
        let Some(session) = store.session(session_id) else {
            return;
        };

        if store.active_id() == Some(session_id) {
            if let Some(message) = session.messages.last() {
                println!();
                UI::print_chat_message(message, &self.renderer);
            }
        } else {
            UI::print_info(&format!(
                "Reply ready in session {} ({}), /select {} to read it",
                session_id, session.title, session_id
            ));
        }
    }

    /// Waits for every spawned turn to report back.
    async fn drain(&mut self) {
        if self.outstanding > 0 {
            UI::print_info(&format!("Waiting for {} pending reply(s)...", self.outstanding));
        }

        while self.outstanding > 0 {
            match self.outcomes_rx.recv().await {
                Some(outcome) => self.handle_outcome(outcome),
                None => break,
            }
        }
    }

    /// Persists the index and the `changed` sessions. The store lock is
    /// released before any file is written. Failures are reported, never fatal.
    pub fn save(&self, changed: &[SessionId]) {
        let save = HistoryManager::prepare_save(&lock(self.dispatcher.store()), changed);
        if let Err(e) = self.history_manager.write(save) {
            Self::report_save_error(&e);
        }
    }

    /// Rewrites every session file. Used on exit, once turns have settled.
    pub fn save_all(&self) {
        let store = lock(self.dispatcher.store());
        if let Err(e) = self.history_manager.save_store(&store) {
            Self::report_save_error(&e);
        }
    }

    fn report_save_error(e: &LexisError) {
        tracing::warn!(error = %e, "Failed to save sessions");
        UI::print_warning(&format!("Failed to save sessions: {}", e));
    }

    fn ensure_session(&mut self) -> SessionId {
        let (id, created) = {
            let mut store = lock(self.dispatcher.store());
            let before = store.len();
            let id = store.ensure_session();
            (id, store.len() != before)
        };
        if created {
            self.save(&[id]);
        }
        id
    }

    fn print_prompt(&self) {
        let store = lock(self.dispatcher.store());
        let active = store.active_session().map(|s| (s.id, s.title.as_str()));
        UI::print_prompt(active);
    }

    fn show_active_session(&self) {
        let store = lock(self.dispatcher.store());
        if let Some(session) = store.active_session() {
            UI::display_session(session, &self.renderer);
            if self.dispatcher.is_in_flight(session.id) {
                UI::print_waiting(session.id);
            }
        }
    }

    pub fn create_session(&mut self) -> SessionId {
        let id = lock(self.dispatcher.store()).create_session();
        self.save(&[id]);
        id
    }

    pub fn list_sessions(&self) {
        let (sessions, active): (Vec<SessionMetadata>, _) = {
            let store = lock(self.dispatcher.store());
            (
                store.sessions().iter().map(HistoryManager::metadata).collect(),
                store.active_id(),
            )
        };
        UI::print_sessions(&sessions, active, |id| self.dispatcher.is_in_flight(id));
    }

    pub fn select_session(&mut self, id: SessionId) -> Result<()> {
        lock(self.dispatcher.store()).select_session(id)?;
        self.save(&[]);
        self.show_active_session();
        Ok(())
    }

    pub fn rename_session(&mut self, id: SessionId, title: &str) -> bool {
        let renamed = lock(self.dispatcher.store()).rename_session(id, title);
        if renamed {
            self.save(&[id]);
        }
        renamed
    }

    /// Deletes the session and its file. A reply still pending for it is dropped on arrival.
    pub fn delete_session(&mut self, id: SessionId) -> bool {
        let deleted = lock(self.dispatcher.store()).delete_session(id);
        if !deleted {
            return false;
        }

        if let Err(e) = self.history_manager.delete_session(id) {
            tracing::warn!(session = %id, error = %e, "Failed to remove session file");
        }
        self.save(&[]);

        if let Some(active) = lock(self.dispatcher.store()).active_id() {
            UI::print_info(&format!("Active session: {}", active));
        }
        true
    }

    /// Reads a PDF to send with the next turn. Returns its file name.
    pub fn attach(&mut self, path: &Path) -> Result<String> {
        let file = AttachedFile::from_path(path)?;
        let name = file.name.clone();
        self.pending_file = Some(file);
        Ok(name)
    }

    pub fn detach(&mut self) -> Option<AttachedFile> {
        self.pending_file.take()
    }

    pub fn pending_file(&self) -> Option<&AttachedFile> {
        self.pending_file.as_ref()
    }

    /// Submission text of option `n` (1-based) in the active session's last reply.
    pub fn quiz_choice(&self, n: usize) -> Result<String> {
        let store = lock(self.dispatcher.store());
        let message = store
            .active_session()
            .and_then(|s| s.last_model_message())
            .filter(|m| !m.is_error)
            .ok_or_else(|| LexisError::InvalidCommand("No quiz to answer".to_string()))?;

        let rendered = self.renderer.render(&message.text);
        let options = rendered.quiz_options();
        n.checked_sub(1)
            .and_then(|i| options.get(i))
            .map(|option| option.submission_text())
            .ok_or_else(|| {
                LexisError::InvalidCommand(format!(
                    "No option {} in the last quiz ({} available)",
                    n,
                    options.len()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CompletionRequest;
    use crate::dispatch::DispatchSettings;
    use crate::session::{Message, Role, SessionStore};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct EchoBackend;

    impl CompletionBackend for EchoBackend {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            let last = request.messages.last().map(|m| m.text.clone()).unwrap_or_default();
            Ok(format!("re: {}", last))
        }
    }

    fn repl(workspace: &TempDir) -> Repl<EchoBackend> {
        let dispatcher = Dispatcher::new(
            Arc::new(Mutex::new(SessionStore::new())),
            Arc::new(EchoBackend),
            DispatchSettings::default(),
        );
        let history = HistoryManager::new(workspace.path().to_path_buf()).unwrap();
        Repl::new(dispatcher, history)
    }

    fn write_pdf(workspace: &TempDir, name: &str) -> std::path::PathBuf {
        let path = workspace.path().join(name);
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        path
    }

    #[tokio::test]
    async fn test_turn_is_persisted_after_reply() {
        let workspace = TempDir::new().unwrap();
        let mut repl = repl(&workspace);

        repl.process_single_prompt("Qu'est-ce que la cause ?").await.unwrap();

        let reloaded = HistoryManager::new(workspace.path().to_path_buf())
            .unwrap()
            .load_store()
            .unwrap();
        let session = reloaded.active_session().unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1].role, Role::Model);
        assert_eq!(session.messages[1].text, "re: Qu'est-ce que la cause ?");
    }

    #[tokio::test]
    async fn test_attachment_kept_until_turn_is_accepted() {
        let workspace = TempDir::new().unwrap();
        let mut repl = repl(&workspace);
        let path = write_pdf(&workspace, "td.pdf");

        assert!(repl.submit("Premier"));
        repl.attach(&path).unwrap();

        // The first turn has not been polled yet, so the session is busy.
        assert!(!repl.submit("Second"));
        assert_eq!(repl.pending_file().map(|f| f.name.as_str()), Some("td.pdf"));

        repl.drain().await;
        assert!(repl.submit("Second"));
        assert!(repl.pending_file().is_none());
        repl.drain().await;

        let store = lock(repl.dispatcher.store());
        let messages = &store.active_session().unwrap().messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].text, "[Fichier joint : td.pdf]\nSecond");
    }

    #[tokio::test]
    async fn test_blank_line_leaves_store_untouched() {
        let workspace = TempDir::new().unwrap();
        let mut repl = repl(&workspace);

        assert_eq!(repl.handle_line("   ").unwrap(), CommandResult::Continue);
        assert_eq!(repl.outstanding, 0);
        assert!(lock(repl.dispatcher.store()).is_empty());

        let history = HistoryManager::new(workspace.path().to_path_buf()).unwrap();
        assert!(history.list_sessions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_rewrites_only_that_session_file() {
        let workspace = TempDir::new().unwrap();
        let mut repl = repl(&workspace);

        repl.handle_line("/new").unwrap();
        repl.handle_line("/new").unwrap();

        let first = workspace.path().join(".lexis/sessions/1.json");
        std::fs::write(&first, "SENTINEL").unwrap();

        repl.handle_line("/rename 2 Successions").unwrap();
        repl.handle_line("/select 2").unwrap();

        assert_eq!(std::fs::read_to_string(&first).unwrap(), "SENTINEL");
        let history = HistoryManager::new(workspace.path().to_path_buf()).unwrap();
        assert_eq!(history.load_session(SessionId::new(2)).unwrap().title, "Successions");
    }

    #[tokio::test]
    async fn test_session_commands() {
        let workspace = TempDir::new().unwrap();
        let mut repl = repl(&workspace);

        repl.handle_line("/new").unwrap();
        repl.handle_line("/new").unwrap();
        repl.handle_line("/rename 1 Contrats").unwrap();
        repl.handle_line("/select 1").unwrap();
        repl.handle_line("/delete 2").unwrap();
        assert_eq!(repl.handle_line("/exit").unwrap(), CommandResult::Exit);

        let history = HistoryManager::new(workspace.path().to_path_buf()).unwrap();
        let listed = history.list_sessions().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Contrats");
        assert!(!workspace.path().join(".lexis/sessions/2.json").exists());
    }

    #[tokio::test]
    async fn test_choose_submits_quiz_option() {
        let workspace = TempDir::new().unwrap();
        let mut repl = repl(&workspace);
        {
            let mut store = lock(repl.dispatcher.store());
            let id = store.create_session();
            store
                .append_message(
                    id,
                    Message::model(
                        "Question 1 :\n<div class=\"qcm-container\"><qcm-option value=\"A\">Oui</qcm-option><qcm-option value=\"B\">Non</qcm-option></div>",
                    ),
                )
                .unwrap();
        }

        assert_eq!(repl.quiz_choice(2).unwrap(), "B. Non");
        assert!(repl.quiz_choice(3).is_err());
        assert!(repl.quiz_choice(0).is_err());

        repl.handle_line("/choose 1").unwrap();
        repl.drain().await;

        let store = lock(repl.dispatcher.store());
        let messages = &store.active_session().unwrap().messages;
        assert_eq!(messages[1].text, "A. Oui");
        assert_eq!(messages[2].text, "re: A. Oui");
    }

    #[tokio::test]
    async fn test_invalid_attachment_is_reported() {
        let workspace = TempDir::new().unwrap();
        let mut repl = repl(&workspace);
        let path = workspace.path().join("notes.txt");
        std::fs::write(&path, "texte").unwrap();

        assert!(repl.attach(&path).is_err());
        assert!(repl.pending_file().is_none());
    }
}
