use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::ActionKind;
use super::game::GamePhase;
use super::seat::SeatId;

/// Who may read a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Visibility {
    Public,
    WolfTeam,
    Private { seat_id: SeatId },
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub seq: u64,
    pub day: u32,
    pub phase: GamePhase,
    pub seat_id: Option<SeatId>,
    pub action: Option<ActionKind>,
    pub visibility: Visibility,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only session log. Sequence numbers start at 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageLog {
    entries: Vec<MessageEntry>,
}

/// Entry contents before the log stamps sequence and time.
#[derive(Debug, Clone, PartialEq)]
pub struct LogDraft {
    pub seat_id: Option<SeatId>,
    pub action: Option<ActionKind>,
    pub visibility: Visibility,
    pub content: String,
}

impl LogDraft {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            seat_id: None,
            action: None,
            visibility: Visibility::System,
            content: content.into(),
        }
    }

    pub fn action(
        seat_id: SeatId,
        action: ActionKind,
        visibility: Visibility,
        content: impl Into<String>,
    ) -> Self {
        Self {
            seat_id: Some(seat_id),
            action: Some(action),
            visibility,
            content: content.into(),
        }
    }

    pub fn append(&mut self, more: &str) {
        if !self.content.is_empty() {
            self.content.push(' ');
        }
        self.content.push_str(more);
    }
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        day: u32,
        phase: GamePhase,
        draft: LogDraft,
        thought: Option<String>,
    ) -> &MessageEntry {
        let seq = self.last_seq() + 1;
        self.entries.push(MessageEntry {
            seq,
            day,
            phase,
            seat_id: draft.seat_id,
            action: draft.action,
            visibility: draft.visibility,
            content: draft.content,
            thought,
            timestamp: Utc::now(),
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_seq(&self) -> u64 {
        self.entries.last().map(|e| e.seq).unwrap_or(0)
    }

    /// Entries appended after `seq`, used for notification deltas.
    pub fn since(&self, seq: u64) -> &[MessageEntry] {
        let start = self.entries.partition_point(|e| e.seq <= seq);
        &self.entries[start..]
    }
}
