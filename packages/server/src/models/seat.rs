use serde::{Deserialize, Serialize};

use super::game::DeathCause;
use super::role::Role;

/// Seat number, 1..=N for the lifetime of a session.
pub type SeatId = u8;

/// Sentinel target meaning "skip" or "abstain".
pub const SKIP: SeatId = 0;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub seat_id: SeatId,
    pub name: String,
    pub role: Role,
    pub is_alive: bool,
    pub is_ai: bool,
    #[serde(default)]
    pub death_cause: Option<DeathCause>,
}

impl Seat {
    pub fn new(seat_id: SeatId, name: String, role: Role, is_ai: bool) -> Self {
        Self {
            seat_id,
            name,
            role,
            is_alive: true,
            is_ai,
            death_cause: None,
        }
    }
}

/// One roster entry handed over by matchmaking at creation time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeatSpec {
    pub name: String,
    #[serde(default)]
    pub is_ai: bool,
    #[serde(default)]
    pub role: Option<Role>,
}

impl SeatSpec {
    pub fn human(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_ai: false,
            role: None,
        }
    }

    pub fn ai(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_ai: true,
            role: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }
}
