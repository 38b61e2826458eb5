//! one chat turn: accept input, build the request, fold the outcome back in.
//!
//! the turn is split in two so a host can run the network call wherever it
//! likes (the bevy plugin hands it to a background task):
//!
//! - [`submit`] validates input, appends the user line, sets `awaiting` and
//!   returns the request to send.
//! - [`resolve`] appends the reply (or the error sentence) and clears `awaiting`.
//!
//! [`dispatch`] runs both around a single transport call.

use bevy::prelude::*;

use crate::config::ChatSettings;
use crate::conversation::{Conversation, Message, Origin};
use crate::error::CompletionError;
use crate::transport::{CompletionRequest, CompletionTransport, WireMessage};

/// a conversation plus its single in-flight flag.
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    pub conversation: Conversation,
    awaiting: bool,
}

impl ChatState {
    pub fn new(conversation: Conversation) -> Self {
        Self { conversation, awaiting: false }
    }

    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self::new(Conversation::new(greeting))
    }

    /// true between [`submit`] and [`resolve`]. input is disabled meanwhile.
    pub fn is_awaiting(&self) -> bool {
        self.awaiting
    }

    /// whether the submit control should be enabled for this draft.
    pub fn can_submit(&self, draft: &str) -> bool {
        !self.awaiting && !draft.trim().is_empty()
    }
}

/// why a submission was dropped. neither case touches the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    Busy,
}

/// system prompt first, then the whole history in order.
pub fn build_request(conversation: &Conversation, settings: &ChatSettings) -> CompletionRequest {
    let mut messages = Vec::with_capacity(conversation.len() + 1);
    messages.push(WireMessage::new("system", settings.system_prompt.clone()));
    messages.extend(
        conversation
            .messages()
            .iter()
            .map(|m| WireMessage::new(m.origin().role(), m.text())),
    );
    CompletionRequest {
        model: settings.model.clone(),
        messages,
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
    }
}

pub fn submit(
    state: &mut ChatState,
    text: &str,
    settings: &ChatSettings,
) -> Result<CompletionRequest, Rejection> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Rejection::Empty);
    }
    if state.awaiting {
        return Err(Rejection::Busy);
    }
    state.conversation.append(Origin::User, text);
    state.awaiting = true;
    Ok(build_request(&state.conversation, settings))
}

pub fn resolve(state: &mut ChatState, outcome: Result<String, CompletionError>) -> &Message {
    state.awaiting = false;
    match outcome {
        Ok(text) => state.conversation.append(Origin::Assistant, text),
        Err(err) => {
            error!(target: "deepbot", "completion failed ({:?}): {}", err.category(), err);
            state.conversation.append(Origin::Assistant, err.user_message())
        }
    }
}

/// a full turn. returns the appended assistant message, or `None` when the
/// input was rejected and nothing was sent.
pub async fn dispatch<'a, T>(
    state: &'a mut ChatState,
    text: &str,
    settings: &ChatSettings,
    transport: &T,
) -> Option<&'a Message>
where
    T: CompletionTransport + ?Sized,
{
    let request = match submit(state, text, settings) {
        Ok(r) => r,
        Err(why) => {
            warn!(target: "deepbot", "submission rejected: {:?}", why);
            return None;
        }
    };
    info!(
        target: "deepbot",
        "dispatch: transport={} model={} msgs={}",
        transport.name(), request.model, request.messages.len()
    );
    let outcome = transport.complete(&request).await;
    Some(resolve(state, outcome))
}
