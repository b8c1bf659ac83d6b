use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::conversation_state::{ConversationSnapshot, ConversationState, Message};
use crate::inference::InferenceClient;

/// Shown when the model answered but gave us nothing to display.
pub const EMPTY_REPLY_TEXT: &str = "AI 沒有回應內容";

/// Shown when the call itself failed.
pub const APOLOGY_TEXT: &str = "AI 媽媽暫時無法回應，請稍後再試";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Completion,
    EmptyFallback,
    Apology,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Input was blank. Nothing changed.
    Skipped,
    /// Another turn is still waiting on its reply. Nothing changed.
    Busy,
    /// The user message and an assistant reply were both appended.
    Answered(ReplyKind),
    /// The conversation was torn down before the reply arrived.
    Discarded,
}

/// Runs one inference round-trip per user send.
///
/// The store lock is only held between awaits, never across the call to
/// the inference client.
pub struct TurnController {
    client: Arc<dyn InferenceClient>,
    state: Arc<Mutex<ConversationState>>,
}

impl TurnController {
    pub fn new(client: Arc<dyn InferenceClient>, state: ConversationState) -> Self {
        Self {
            client,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub async fn submit(&self, raw_input: &str) -> SubmitOutcome {
        let prompt = raw_input.trim();
        if prompt.is_empty() {
            debug!("Ignoring blank input");
            return SubmitOutcome::Skipped;
        }

        {
            let mut state = self.lock();
            if state.is_disposed() {
                debug!("Ignoring input for a disposed conversation");
                return SubmitOutcome::Discarded;
            }
            if state.is_pending() {
                info!("A reply is still pending, rejecting new input");
                return SubmitOutcome::Busy;
            }
            // Liveness was checked under this same guard.
            if state.append(Message::user(prompt)).is_err() || state.set_pending(true).is_err() {
                return SubmitOutcome::Discarded;
            }
        }

        let (text, kind) = match self.client.complete(prompt).await {
            Ok(Some(text)) => (text, ReplyKind::Completion),
            Ok(None) => {
                info!("Completion carried no text, using fallback reply");
                (EMPTY_REPLY_TEXT.to_string(), ReplyKind::EmptyFallback)
            }
            Err(e) => {
                warn!("Inference call failed: {}", e);
                (APOLOGY_TEXT.to_string(), ReplyKind::Apology)
            }
        };

        let mut state = self.lock();
        if state.append(Message::assistant(text)).is_err() {
            debug!("Conversation disposed while waiting, discarding reply");
            return SubmitOutcome::Discarded;
        }
        if state.set_pending(false).is_err() {
            return SubmitOutcome::Discarded;
        }

        SubmitOutcome::Answered(kind)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages().to_vec()
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.lock().snapshot()
    }

    /// Tear the conversation down. An in-flight reply will be dropped.
    pub fn dispose(&self) {
        self.lock().dispose();
    }

    fn lock(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::{Notify, mpsc};

    use super::*;
    use crate::cli::chat::conversation_state::{Role, StoreEvent};
    use crate::inference::InferenceError;

    enum Canned {
        Text(&'static str),
        Empty,
        Fail,
    }

    struct MockClient {
        canned: Canned,
        prompts: Mutex<Vec<String>>,
    }

    impl MockClient {
        fn new(canned: Canned) -> Arc<Self> {
            Arc::new(Self {
                canned,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl InferenceClient for MockClient {
        async fn complete(&self, prompt: &str) -> Result<Option<String>, InferenceError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.canned {
                Canned::Text(text) => Ok(Some(text.to_string())),
                Canned::Empty => Ok(None),
                Canned::Fail => Err(InferenceError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                }),
            }
        }
    }

    /// Blocks inside `complete` until released, so a turn can be held
    /// in the pending state.
    struct GatedClient {
        entered: Notify,
        release: Notify,
    }

    impl GatedClient {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                entered: Notify::new(),
                release: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl InferenceClient for GatedClient {
        async fn complete(&self, _prompt: &str) -> Result<Option<String>, InferenceError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Some("好啦好啦".to_string()))
        }
    }

    fn controller(client: Arc<dyn InferenceClient>) -> TurnController {
        TurnController::new(client, ConversationState::default())
    }

    #[tokio::test]
    async fn test_scenario_tired_child() {
        let client = MockClient::new(Canned::Text("你要早點睡喔"));
        let turns = controller(client.clone());

        let outcome = turns.submit("今天好累").await;

        assert_eq!(outcome, SubmitOutcome::Answered(ReplyKind::Completion));
        assert_eq!(
            turns.messages(),
            vec![Message::user("今天好累"), Message::assistant("你要早點睡喔")]
        );
        assert!(!turns.snapshot().pending);
    }

    #[tokio::test]
    async fn test_blank_input_changes_nothing() {
        let client = MockClient::new(Canned::Text("unused"));
        let turns = controller(client.clone());

        for input in ["", "   ", "\n\t  \r\n"] {
            assert_eq!(turns.submit(input).await, SubmitOutcome::Skipped);
        }

        assert!(turns.messages().is_empty());
        assert!(!turns.snapshot().pending);
        assert!(client.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_input_is_trimmed_for_message_and_prompt() {
        let client = MockClient::new(Canned::Text("嘿呀"));
        let turns = controller(client.clone());

        turns.submit("  媽，我回來了 \n").await;

        assert_eq!(turns.messages()[0], Message::user("媽，我回來了"));
        assert_eq!(*client.prompts.lock().unwrap(), vec!["媽，我回來了".to_string()]);
    }

    #[tokio::test]
    async fn test_reply_text_is_not_transformed() {
        let turns = controller(MockClient::new(Canned::Text("嘿呀")));
        turns.submit("hi").await;

        let messages = turns.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role(), Role::Assistant);
        assert_eq!(messages[1].text(), "嘿呀");
    }

    #[tokio::test]
    async fn test_empty_completion_uses_fallback() {
        let turns = controller(MockClient::new(Canned::Empty));

        let outcome = turns.submit("hi").await;

        assert_eq!(outcome, SubmitOutcome::Answered(ReplyKind::EmptyFallback));
        assert_eq!(turns.messages()[1], Message::assistant(EMPTY_REPLY_TEXT));
        assert!(!turns.snapshot().pending);
    }

    #[tokio::test]
    async fn test_failure_uses_apology_and_next_turn_still_works() {
        let failing = controller(MockClient::new(Canned::Fail));

        let outcome = failing.submit("hi").await;

        assert_eq!(outcome, SubmitOutcome::Answered(ReplyKind::Apology));
        assert_eq!(failing.messages()[1], Message::assistant(APOLOGY_TEXT));
        assert!(!failing.snapshot().pending);

        assert_eq!(
            failing.submit("again").await,
            SubmitOutcome::Answered(ReplyKind::Apology)
        );
        assert_eq!(failing.messages().len(), 4);
    }

    #[tokio::test]
    async fn test_each_turn_sends_only_latest_text() {
        let client = MockClient::new(Canned::Text("ok"));
        let turns = controller(client.clone());

        turns.submit("first").await;
        turns.submit("second").await;

        assert_eq!(
            *client.prompts.lock().unwrap(),
            vec!["first".to_string(), "second".to_string()]
        );
        let roles: Vec<_> = turns.messages().iter().map(Message::role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_event_order_brackets_pending() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let turns = TurnController::new(
            MockClient::new(Canned::Text("嘿呀")),
            ConversationState::with_listener(tx),
        );

        turns.submit("hi").await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                StoreEvent::Appended(Message::user("hi")),
                StoreEvent::PendingChanged(true),
                StoreEvent::Appended(Message::assistant("嘿呀")),
                StoreEvent::PendingChanged(false),
            ]
        );
    }

    #[tokio::test]
    async fn test_pending_while_in_flight_and_overlap_rejected() {
        let client = GatedClient::new();
        let turns = Arc::new(controller(client.clone()));

        let first = tokio::spawn({
            let turns = turns.clone();
            async move { turns.submit("first").await }
        });
        client.entered.notified().await;

        let snapshot = turns.snapshot();
        assert!(snapshot.pending);
        assert_eq!(snapshot.messages, vec![Message::user("first")]);

        assert_eq!(turns.submit("second").await, SubmitOutcome::Busy);
        assert_eq!(turns.messages().len(), 1);

        client.release.notify_one();
        assert_eq!(
            first.await.unwrap(),
            SubmitOutcome::Answered(ReplyKind::Completion)
        );
        assert!(!turns.snapshot().pending);
        assert_eq!(
            turns.messages(),
            vec![Message::user("first"), Message::assistant("好啦好啦")]
        );
    }

    #[tokio::test]
    async fn test_reply_after_dispose_is_discarded() {
        let client = GatedClient::new();
        let turns = Arc::new(controller(client.clone()));

        let pending = tokio::spawn({
            let turns = turns.clone();
            async move { turns.submit("bye").await }
        });
        client.entered.notified().await;

        turns.dispose();
        client.release.notify_one();

        assert_eq!(pending.await.unwrap(), SubmitOutcome::Discarded);
        assert_eq!(turns.messages(), vec![Message::user("bye")]);
        assert_eq!(turns.submit("hello?").await, SubmitOutcome::Discarded);
    }
}
