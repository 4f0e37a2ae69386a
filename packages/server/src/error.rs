use serde::Serialize;

use crate::models::action::ActionKind;
use crate::models::game::GamePhase;
use crate::models::seat::SeatId;
use crate::services::snapshot::SnapshotError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("session {0} not found")]
    NotFound(String),
    #[error("seat {0} is not part of this session")]
    SeatNotFound(SeatId),
    #[error("illegal action: {0}")]
    IllegalAction(#[from] IllegalReason),
    #[error("stale state version: submitted {submitted}, current {current}")]
    StaleVersion { submitted: u64, current: u64 },
    #[error("session capacity reached ({limit} resident sessions)")]
    CapacityExceeded { limit: usize },
    #[error("invalid roster: {0}")]
    InvalidRoster(String),
    #[error("snapshot persistence failed: {0}")]
    Persistence(#[from] SnapshotError),
}

/// Why a submission was refused while the session itself is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IllegalReason {
    #[error("the game has already finished")]
    GameFinished,
    #[error("no action is pending")]
    NoPendingAction,
    #[error("seat {seat_id} is not expected to act now")]
    NotYourTurn { seat_id: SeatId },
    #[error("seat {seat_id} has already acted")]
    AlreadyActed { seat_id: SeatId },
    #[error("expected a {expected} action, got {got}")]
    WrongActionType { expected: ActionKind, got: ActionKind },
    #[error("{kind} is not accepted during {phase}")]
    WrongPhase { phase: GamePhase, kind: ActionKind },
    #[error("skipping is not allowed here")]
    SkipNotAllowed,
    #[error("a target seat is required")]
    MissingTarget,
    #[error("seat {target} is not a legal target")]
    TargetNotAllowed { target: SeatId },
    #[error("speech content is required")]
    MissingContent,
    #[error("{detail}")]
    RuleViolation { detail: &'static str },
}

impl EngineError {
    /// Stable machine-readable code for callers and the HTTP adapter.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::SeatNotFound(_) => "SEAT_NOT_FOUND",
            EngineError::IllegalAction(_) => "ILLEGAL_ACTION",
            EngineError::StaleVersion { .. } => "STALE_VERSION",
            EngineError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            EngineError::InvalidRoster(_) => "INVALID_ROSTER",
            EngineError::Persistence(_) => "PERSISTENCE",
        }
    }

    /// Stale submissions must refetch the view; illegal ones can simply retry.
    pub fn requires_refetch(&self) -> bool {
        matches!(self, EngineError::StaleVersion { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::IllegalAction(_)
                | EngineError::StaleVersion { .. }
                | EngineError::CapacityExceeded { .. }
                | EngineError::Persistence(_)
        )
    }
}
