//! append-only chat log owned by a single session.

use serde::Serialize;

pub const DEFAULT_GREETING: &str =
    "Hello! I'm DeepBot, your AI knowledge assistant powered by OpenRouter. How can I help you today?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    User,
    Assistant,
}

impl Origin {
    /// role name on the wire.
    pub fn role(self) -> &'static str {
        match self {
            Origin::User => "user",
            Origin::Assistant => "assistant",
        }
    }
}

/// a single chat line. fields are private so a message can't change after
/// it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    sequence_id: u64,
    origin: Origin,
    text: String,
    created_at: String,
}

impl Message {
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }
    pub fn origin(&self) -> Origin {
        self.origin
    }
    pub fn text(&self) -> &str {
        &self.text
    }
    pub fn created_at(&self) -> &str {
        &self.created_at
    }
}

/// local wall-clock time, e.g. `3:07:42 PM`.
fn display_time() -> String {
    chrono::Local::now().format("%-I:%M:%S %p").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(DEFAULT_GREETING)
    }
}

impl Conversation {
    /// a fresh log holding just the assistant greeting (sequence id 1).
    pub fn new(greeting: impl Into<String>) -> Self {
        let mut c = Self { messages: Vec::with_capacity(16) };
        c.append(Origin::Assistant, greeting);
        c
    }

    /// sequence id is `len + 1`; ids stay dense since nothing is ever removed.
    pub fn append(&mut self, origin: Origin, text: impl Into<String>) -> &Message {
        let sequence_id = self.messages.len() as u64 + 1;
        self.messages.push(Message {
            sequence_id,
            origin,
            text: text.into(),
            created_at: display_time(),
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn seeded_with_greeting() {
        let c = Conversation::default();
        assert_eq!(c.len(), 1);
        let first = &c.messages()[0];
        assert_eq!(first.sequence_id(), 1);
        assert_eq!(first.origin(), Origin::Assistant);
        assert_eq!(first.text(), DEFAULT_GREETING);
        assert!(!first.created_at().is_empty());
    }

    #[test]
    fn append_preserves_order_and_numbering() {
        let mut c = Conversation::new("hi");
        c.append(Origin::User, "one");
        c.append(Origin::Assistant, "two");
        let ids: Vec<_> = c.messages().iter().map(Message::sequence_id).collect();
        let texts: Vec<_> = c.messages().iter().map(Message::text).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(texts, vec!["hi", "one", "two"]);
        assert_eq!(c.last().map(Message::origin), Some(Origin::Assistant));
    }
}
