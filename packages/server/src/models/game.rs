use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use super::action::PendingAction;
use super::message::{LogDraft, MessageLog};
use super::mode::GameMode;
use super::role::Role;
use super::rule::Rules;
use super::seat::{Seat, SeatId, SeatSpec};
use crate::error::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Waiting,
    Active,
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    NightStart,
    NightGuard,
    NightWerewolfChat,
    NightWerewolf,
    NightSeer,
    NightWitch,
    DayAnnouncement,
    DayLastWords,
    DeathShoot,
    DaySpeech,
    DayVote,
    DayVoteResult,
    HunterShoot,
    GameOver,
}

impl GamePhase {
    pub fn is_night(self) -> bool {
        matches!(
            self,
            GamePhase::NightStart
                | GamePhase::NightGuard
                | GamePhase::NightWerewolfChat
                | GamePhase::NightWerewolf
                | GamePhase::NightSeer
                | GamePhase::NightWitch
        )
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GamePhase::NightStart => "night_start",
            GamePhase::NightGuard => "night_guard",
            GamePhase::NightWerewolfChat => "night_werewolf_chat",
            GamePhase::NightWerewolf => "night_werewolf",
            GamePhase::NightSeer => "night_seer",
            GamePhase::NightWitch => "night_witch",
            GamePhase::DayAnnouncement => "day_announcement",
            GamePhase::DayLastWords => "day_last_words",
            GamePhase::DeathShoot => "death_shoot",
            GamePhase::DaySpeech => "day_speech",
            GamePhase::DayVote => "day_vote",
            GamePhase::DayVoteResult => "day_vote_result",
            GamePhase::HunterShoot => "hunter_shoot",
            GamePhase::GameOver => "game_over",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Villager,
    Werewolf,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Villager => write!(f, "the village"),
            Winner::Werewolf => write!(f, "the werewolves"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    WolfKill,
    Poison,
    Exile,
    Shot,
    SelfDestruct,
}

impl DeathCause {
    /// Night causes stay hidden until the game ends; the rest happen in
    /// front of the table.
    pub fn is_public(self) -> bool {
        !matches!(self, DeathCause::WolfKill | DeathCause::Poison)
    }
}

/// Immutable per-night requests, resolved together at dawn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightEffects {
    pub kill: Option<SeatId>,
    pub protect: Option<SeatId>,
    pub save: Option<SeatId>,
    pub poison: Option<SeatId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub voter: SeatId,
    pub target: SeatId,
}

/// What started the current chain of death-triggered shots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShotOrigin {
    Dawn,
    Exile,
    SelfDestruct,
}

/// Day-scoped queues driving speeches, last words and shots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayState {
    pub night_deaths: Vec<SeatId>,
    pub last_words_queue: VecDeque<SeatId>,
    pub speech_queue: VecDeque<SeatId>,
    pub speeches_started: bool,
    pub shot_queue: VecDeque<SeatId>,
    pub shot_origin: Option<ShotOrigin>,
    pub votes: Vec<Ballot>,
    pub exiled: Option<SeatId>,
    /// Set by a self-destruct: remaining speeches and the vote are skipped.
    pub cut_short: bool,
}

/// Input handed over by matchmaking to create a session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateSession {
    pub mode: GameMode,
    pub roster: Vec<SeatSpec>,
    #[serde(default)]
    pub rules: Option<Rules>,
    /// Seeds the role deal when the roster carries no roles.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub session_id: String,
    pub mode: GameMode,
    pub rules: Rules,
    pub status: GameStatus,
    pub day: u32,
    pub phase: GamePhase,
    pub state_version: u64,
    pub seats: Vec<Seat>,
    pub pending_action: Option<PendingAction>,
    pub message_log: MessageLog,
    pub winner: Option<Winner>,

    pub night_kill_target: Option<SeatId>,
    pub guard_last_target: Option<SeatId>,
    /// Wolf kill submissions for the current night, in submission order.
    pub wolf_votes: Vec<Ballot>,
    pub night_effects: NightEffects,
    /// Seer results: seat -> is wolf-aligned.
    pub verified_results: BTreeMap<SeatId, bool>,
    pub antidote_used: bool,
    pub poison_used: bool,
    pub self_destruct_used: bool,
    pub shots_fired: BTreeSet<SeatId>,
    pub day_state: DayState,
}

impl GameSession {
    pub fn new(session_id: String, mode: GameMode, rules: Rules, seats: Vec<Seat>) -> Self {
        let mut session = GameSession {
            session_id,
            mode,
            rules,
            status: GameStatus::Waiting,
            day: 1,
            phase: GamePhase::NightStart,
            state_version: 0,
            seats,
            pending_action: None,
            message_log: MessageLog::new(),
            winner: None,
            night_kill_target: None,
            guard_last_target: None,
            wolf_votes: Vec::new(),
            night_effects: NightEffects::default(),
            verified_results: BTreeMap::new(),
            antidote_used: false,
            poison_used: false,
            self_destruct_used: false,
            shots_fired: BTreeSet::new(),
            day_state: DayState::default(),
        };
        let opening = format!(
            "A {} game with {} seats is ready.",
            session.mode,
            session.seats.len()
        );
        session.log(LogDraft::system(opening));
        session
    }

    /// Builds a session from a matchmaking roster, dealing roles when the
    /// roster does not carry them.
    pub fn from_request(
        session_id: String,
        request: CreateSession,
        default_rules: &Rules,
    ) -> Result<Self, EngineError> {
        let mode = request.mode;
        if request.roster.len() != mode.seat_count() {
            return Err(EngineError::InvalidRoster(format!(
                "{mode} needs {} seats, got {}",
                mode.seat_count(),
                request.roster.len()
            )));
        }

        let given: Vec<Role> = request.roster.iter().filter_map(|s| s.role).collect();
        let roles = if given.is_empty() {
            mode.deal_roles(request.seed)
        } else if given.len() == request.roster.len() && mode.matches_distribution(&given) {
            given
        } else {
            return Err(EngineError::InvalidRoster(format!(
                "roster roles do not match the {mode} distribution"
            )));
        };

        let seats = request
            .roster
            .into_iter()
            .zip(roles)
            .enumerate()
            .map(|(idx, (spec, role))| Seat::new(idx as SeatId + 1, spec.name, role, spec.is_ai))
            .collect();
        let rules = request.rules.unwrap_or_else(|| default_rules.clone());

        Ok(GameSession::new(session_id, mode, rules, seats))
    }

    pub fn seat(&self, seat_id: SeatId) -> Option<&Seat> {
        self.seats.iter().find(|s| s.seat_id == seat_id)
    }

    pub fn is_alive(&self, seat_id: SeatId) -> bool {
        self.seat(seat_id).map(|s| s.is_alive).unwrap_or(false)
    }

    pub fn role_of(&self, seat_id: SeatId) -> Option<Role> {
        self.seat(seat_id).map(|s| s.role)
    }

    /// Living seat ids in ascending order.
    pub fn living_seats(&self) -> Vec<SeatId> {
        self.seats
            .iter()
            .filter(|s| s.is_alive)
            .map(|s| s.seat_id)
            .collect()
    }

    pub fn living_wolves(&self) -> Vec<SeatId> {
        self.seats
            .iter()
            .filter(|s| s.is_alive && s.role.is_wolf_aligned())
            .map(|s| s.seat_id)
            .collect()
    }

    pub fn wolf_seats(&self) -> Vec<SeatId> {
        self.seats
            .iter()
            .filter(|s| s.role.is_wolf_aligned())
            .map(|s| s.seat_id)
            .collect()
    }

    /// The first living seat holding `role`.
    pub fn living_with_role(&self, role: Role) -> Option<SeatId> {
        self.seats
            .iter()
            .find(|s| s.is_alive && s.role == role)
            .map(|s| s.seat_id)
    }

    /// Marks a seat dead. Returns false when it was already dead or unknown.
    pub fn mark_dead(&mut self, seat_id: SeatId, cause: DeathCause) -> bool {
        match self.seats.iter_mut().find(|s| s.seat_id == seat_id) {
            Some(seat) if seat.is_alive => {
                seat.is_alive = false;
                seat.death_cause = Some(cause);
                true
            }
            _ => false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == GameStatus::Finished
    }

    pub fn log(&mut self, draft: LogDraft) {
        self.message_log.push(self.day, self.phase, draft, None);
    }

    pub fn log_with_thought(&mut self, draft: LogDraft, thought: Option<String>) {
        self.message_log.push(self.day, self.phase, draft, thought);
    }
}

impl fmt::Display for GameSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GameSession {{ id: {}, mode: {}, status: {:?}, day: {}, phase: {}, version: {}, alive: {:?} }}",
            self.session_id,
            self.mode,
            self.status,
            self.day,
            self.phase,
            self.state_version,
            self.living_seats()
        )
    }
}
