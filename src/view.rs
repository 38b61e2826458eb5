//! what a chat view shows. the typing row exists only here, never in the store.

use crate::conversation::Origin;
use crate::dispatch::ChatState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Message,
    Typing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptRow {
    pub kind: RowKind,
    pub origin: Origin,
    pub text: String,
    pub time: String,
}

pub fn transcript(state: &ChatState) -> Vec<TranscriptRow> {
    let mut rows: Vec<TranscriptRow> = state
        .conversation
        .messages()
        .iter()
        .map(|m| TranscriptRow {
            kind: RowKind::Message,
            origin: m.origin(),
            text: m.text().to_string(),
            time: m.created_at().to_string(),
        })
        .collect();
    if state.is_awaiting() {
        rows.push(TranscriptRow {
            kind: RowKind::Typing,
            origin: Origin::Assistant,
            text: String::new(),
            time: String::new(),
        });
    }
    rows
}

/// three dots cycling at ~3hz.
pub fn typing_indicator(elapsed_secs: f32) -> &'static str {
    const FRAMES: [&str; 3] = [".  ", ".. ", "..."];
    FRAMES[((elapsed_secs * 3.0).max(0.0) as usize) % FRAMES.len()]
}

pub fn render_text(rows: &[TranscriptRow], elapsed_secs: f32) -> String {
    let mut out = String::new();
    for row in rows {
        let who = match row.origin {
            Origin::User => "you",
            Origin::Assistant => "deepbot",
        };
        match row.kind {
            RowKind::Message => {
                out.push_str(&format!("[{}] {}: {}\n", row.time, who, row.text));
            }
            RowKind::Typing => {
                out.push_str(&format!("{}: {}\n", who, typing_indicator(elapsed_secs)));
            }
        }
    }
    out
}
