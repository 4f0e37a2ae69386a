use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::seat::{SeatId, SKIP};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Kill,
    Verify,
    Save,
    Poison,
    Protect,
    Vote,
    Shoot,
    SelfDestruct,
    Speak,
    Skip,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Kill => "kill",
            ActionKind::Verify => "verify",
            ActionKind::Save => "save",
            ActionKind::Poison => "poison",
            ActionKind::Protect => "protect",
            ActionKind::Vote => "vote",
            ActionKind::Shoot => "shoot",
            ActionKind::SelfDestruct => "self_destruct",
            ActionKind::Speak => "speak",
            ActionKind::Skip => "skip",
        };
        f.write_str(name)
    }
}

/// The single decision currently blocking phase advance.
///
/// `actors` lists every seat expected to answer; the decision is complete once
/// each of them appears in `responded`. `choices` holds the legal targets,
/// with `SKIP` present whenever abstaining is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub kind: ActionKind,
    pub actors: Vec<SeatId>,
    pub choices: BTreeSet<SeatId>,
    pub hint: String,
    /// A second action type the actor may answer with instead of `kind`.
    #[serde(default)]
    pub alternative: Option<ActionKind>,
    #[serde(default)]
    pub responded: Vec<SeatId>,
}

impl PendingAction {
    pub fn new(
        kind: ActionKind,
        actors: Vec<SeatId>,
        choices: impl IntoIterator<Item = SeatId>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            actors,
            choices: choices.into_iter().collect(),
            hint: hint.into(),
            alternative: None,
            responded: Vec::new(),
        }
    }

    /// Adds the skip sentinel to the legal targets.
    pub fn skippable(mut self) -> Self {
        self.choices.insert(SKIP);
        self
    }

    pub fn with_alternative(mut self, kind: ActionKind) -> Self {
        self.alternative = Some(kind);
        self
    }

    pub fn allows_skip(&self) -> bool {
        self.choices.contains(&SKIP)
    }

    pub fn accepts(&self, kind: ActionKind) -> bool {
        self.kind == kind || self.alternative == Some(kind)
    }

    pub fn is_actor(&self, seat_id: SeatId) -> bool {
        self.actors.contains(&seat_id)
    }

    pub fn has_responded(&self, seat_id: SeatId) -> bool {
        self.responded.contains(&seat_id)
    }

    /// Seats that still owe an answer.
    pub fn awaiting(&self) -> Vec<SeatId> {
        self.actors
            .iter()
            .copied()
            .filter(|seat| !self.responded.contains(seat))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.actors.iter().all(|seat| self.responded.contains(seat))
    }
}

/// One caller submission, already resolved to a seat by the routing layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub seat_id: SeatId,
    pub action: ActionKind,
    #[serde(default)]
    pub target: Option<SeatId>,
    #[serde(default)]
    pub content: Option<String>,
    /// AI reasoning attached to the log entry; only debug views show it.
    #[serde(default)]
    pub thought: Option<String>,
    pub expected_version: u64,
}

impl Submission {
    pub fn new(seat_id: SeatId, action: ActionKind, expected_version: u64) -> Self {
        Self {
            seat_id,
            action,
            target: None,
            content: None,
            thought: None,
            expected_version,
        }
    }

    pub fn target(mut self, target: SeatId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn thought(mut self, thought: impl Into<String>) -> Self {
        self.thought = Some(thought.into());
        self
    }
}
