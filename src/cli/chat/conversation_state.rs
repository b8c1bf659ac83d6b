use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    role: Role,
    text: String,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Change notifications for whoever renders the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Appended(Message),
    PendingChanged(bool),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("conversation has been disposed")]
    Disposed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSnapshot {
    pub messages: Vec<Message>,
    pub pending: bool,
}

/// Ordered messages of one session plus the "awaiting reply" flag.
///
/// Messages are only ever appended. Once [`dispose`](Self::dispose) is
/// called every mutation is refused.
#[derive(Debug, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
    pending: bool,
    disposed: bool,
    listener: Option<UnboundedSender<StoreEvent>>,
}

impl ConversationState {
    pub fn with_listener(listener: UnboundedSender<StoreEvent>) -> Self {
        Self {
            listener: Some(listener),
            ..Self::default()
        }
    }

    pub fn append(&mut self, message: Message) -> Result<(), StoreError> {
        self.ensure_live()?;
        self.messages.push(message.clone());
        self.notify(StoreEvent::Appended(message));
        Ok(())
    }

    pub fn set_pending(&mut self, pending: bool) -> Result<(), StoreError> {
        self.ensure_live()?;
        if self.pending != pending {
            self.pending = pending;
            self.notify(StoreEvent::PendingChanged(pending));
        }
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            messages: self.messages.clone(),
            pending: self.pending,
        }
    }

    /// Tear the session down. The listener is dropped so its receiver sees
    /// the channel close.
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.listener = None;
    }

    fn ensure_live(&self) -> Result<(), StoreError> {
        if self.disposed {
            return Err(StoreError::Disposed);
        }
        Ok(())
    }

    fn notify(&self, event: StoreEvent) {
        if let Some(listener) = &self.listener {
            if listener.send(event).is_err() {
                trace!("Conversation listener is gone, dropping event");
            }
        }
    }
}
