//! Per-seat projection of a session.
//!
//! A [`SeatView`] holds everything one seat may legitimately know: the public
//! table, its own role, and the private knowledge its role grants. Both human
//! clients and AI agents receive it, so nothing hidden may leak through it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::models::action::{ActionKind, PendingAction};
use crate::models::game::{Ballot, DeathCause, GamePhase, GameSession, GameStatus, Winner};
use crate::models::message::{MessageEntry, Visibility};
use crate::models::mode::GameMode;
use crate::models::role::Role;
use crate::models::rule::Rules;
use crate::models::seat::SeatId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatView {
    pub session_id: String,
    pub mode: GameMode,
    pub rules: Rules,
    pub status: GameStatus,
    pub day: u32,
    pub phase: GamePhase,
    pub state_version: u64,
    pub you: OwnSeat,
    pub seats: Vec<TableSeat>,
    #[serde(default)]
    pub knowledge: Knowledge,
    /// Present only while this seat still owes an answer.
    #[serde(default)]
    pub pending_action: Option<PendingAction>,
    pub your_turn: bool,
    pub messages: Vec<MessageEntry>,
    #[serde(default)]
    pub winner: Option<Winner>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnSeat {
    pub seat_id: SeatId,
    pub name: String,
    pub role: Role,
    pub is_alive: bool,
}

/// Another seat as this seat sees it. `role` is only filled for wolf
/// teammates and once the game has finished. `death_cause` hides night
/// deaths until then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSeat {
    pub seat_id: SeatId,
    pub name: String,
    pub is_alive: bool,
    pub is_ai: bool,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_cause: Option<DeathCause>,
}

/// Role-granted private knowledge. Fields a role does not grant stay empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Knowledge {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teammates: Vec<SeatId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub night_kill_target: Option<SeatId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wolf_votes: Vec<Ballot>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub verified_results: BTreeMap<SeatId, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub antidote_available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poison_available: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard_last_target: Option<SeatId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_destruct_available: Option<bool>,
}

/// Projects `session` for `seat_id`. `debug` keeps AI thoughts in the log.
pub fn project(session: &GameSession, seat_id: SeatId, debug: bool) -> Result<SeatView, EngineError> {
    let me = session
        .seat(seat_id)
        .ok_or(EngineError::SeatNotFound(seat_id))?;
    let role = me.role;
    let wolf = role.is_wolf_aligned();
    let finished = session.is_finished();

    let seats = session
        .seats
        .iter()
        .map(|seat| {
            let known = finished
                || seat.seat_id == seat_id
                || (wolf && seat.role.is_wolf_aligned());
            TableSeat {
                seat_id: seat.seat_id,
                name: seat.name.clone(),
                is_alive: seat.is_alive,
                is_ai: seat.is_ai,
                role: known.then_some(seat.role),
                death_cause: seat
                    .death_cause
                    .filter(|cause| finished || cause.is_public()),
            }
        })
        .collect();

    let pending_action = session
        .pending_action
        .as_ref()
        .filter(|p| p.is_actor(seat_id) && !p.has_responded(seat_id))
        .cloned();

    let messages = entries_for_seat(session.message_log.entries(), seat_id, role, debug);

    Ok(SeatView {
        session_id: session.session_id.clone(),
        mode: session.mode,
        rules: session.rules.clone(),
        status: session.status,
        day: session.day,
        phase: session.phase,
        state_version: session.state_version,
        you: OwnSeat {
            seat_id,
            name: me.name.clone(),
            role,
            is_alive: me.is_alive,
        },
        seats,
        knowledge: knowledge(session, seat_id, role),
        your_turn: pending_action.is_some(),
        pending_action,
        messages,
        winner: session.winner,
    })
}

/// The entries a seat holding `role` may read, with thoughts stripped unless
/// `debug`. Used for the seat view and for relaying [`SessionEvent`] entries.
///
/// [`SessionEvent`]: crate::services::session_store::SessionEvent
pub fn entries_for_seat(
    entries: &[MessageEntry],
    seat_id: SeatId,
    role: Role,
    debug: bool,
) -> Vec<MessageEntry> {
    let wolf = role.is_wolf_aligned();
    entries
        .iter()
        .filter(|entry| can_read(&entry.visibility, seat_id, wolf))
        .map(|entry| {
            let mut entry = entry.clone();
            if !debug {
                entry.thought = None;
            }
            entry
        })
        .collect()
}

fn can_read(visibility: &Visibility, seat_id: SeatId, wolf: bool) -> bool {
    match visibility {
        Visibility::Public | Visibility::System => true,
        Visibility::WolfTeam => wolf,
        Visibility::Private { seat_id: owner } => *owner == seat_id,
    }
}

fn knowledge(session: &GameSession, seat_id: SeatId, role: Role) -> Knowledge {
    let mut known = Knowledge::default();

    if role.is_wolf_aligned() {
        known.teammates = session
            .wolf_seats()
            .into_iter()
            .filter(|seat| *seat != seat_id)
            .collect();
        known.night_kill_target = session.night_kill_target;
        known.wolf_votes = session.wolf_votes.clone();
    }

    match role {
        Role::Seer => known.verified_results = session.verified_results.clone(),
        Role::Witch => {
            known.antidote_available = Some(!session.antidote_used);
            known.poison_available = Some(!session.poison_used);
            // only while the antidote is actually on offer to her
            let offered_save = session.pending_action.as_ref().is_some_and(|p| {
                p.kind == ActionKind::Save && p.is_actor(seat_id) && !p.has_responded(seat_id)
            });
            if offered_save {
                known.night_kill_target = session.night_kill_target;
            }
        }
        Role::Guard => known.guard_last_target = session.guard_last_target,
        Role::WhiteWolfKing => known.self_destruct_available = Some(!session.self_destruct_used),
        _ => {}
    }

    known
}
