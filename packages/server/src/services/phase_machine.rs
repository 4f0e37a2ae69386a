//! Night/day phase ordering.
//!
//! `next_phase` is a pure function of the session; `step` applies it and
//! issues the pending action of the phase it enters. A phase is only left
//! once its pending action has been answered.

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

use super::night_resolution::resolve_night;
use crate::models::action::{ActionKind, PendingAction};
use crate::models::game::{
    Ballot, DeathCause, GamePhase, GameSession, GameStatus, ShotOrigin, Winner,
};
use crate::models::message::LogDraft;
use crate::models::role::Role;
use crate::models::rule::WinVariant;
use crate::models::seat::{SeatId, SKIP};

/// Night sub-phases in the order they run.
pub const NIGHT_ORDER: [GamePhase; 5] = [
    GamePhase::NightGuard,
    GamePhase::NightWerewolfChat,
    GamePhase::NightWerewolf,
    GamePhase::NightSeer,
    GamePhase::NightWitch,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "phase", rename_all = "snake_case")]
pub enum StepOutcome {
    Advanced(GamePhase),
    Unchanged(GamePhase),
}

impl StepOutcome {
    pub fn phase(self) -> GamePhase {
        match self {
            StepOutcome::Advanced(phase) | StepOutcome::Unchanged(phase) => phase,
        }
    }

    pub fn advanced(self) -> bool {
        matches!(self, StepOutcome::Advanced(_))
    }
}

/// Advances the session by one phase.
///
/// A finished session, or one with an outstanding pending action, is left
/// untouched and reported as `Unchanged`.
pub fn step(session: &mut GameSession) -> StepOutcome {
    if session.is_finished() || session.pending_action.is_some() {
        return StepOutcome::Unchanged(session.phase);
    }

    if session.status == GameStatus::Waiting {
        session.status = GameStatus::Active;
        session.log(LogDraft::system(format!("Night {} falls.", session.day)));
    }

    let from = session.phase;
    let to = next_phase(session);
    debug_assert!(is_legal_transition(from, to), "illegal transition {from} -> {to}");
    enter(session, to);
    session.state_version += 1;
    StepOutcome::Advanced(session.phase)
}

pub fn next_phase(session: &GameSession) -> GamePhase {
    if session.is_finished() {
        return GamePhase::GameOver;
    }

    let day = &session.day_state;
    match session.phase {
        GamePhase::NightStart => night_phase_after(session, None),
        phase @ (GamePhase::NightGuard
        | GamePhase::NightWerewolfChat
        | GamePhase::NightWerewolf
        | GamePhase::NightSeer
        | GamePhase::NightWitch) => night_phase_after(session, Some(phase)),
        GamePhase::DayAnnouncement | GamePhase::DayLastWords => {
            if day.last_words_queue.is_empty() {
                after_deaths(session, day_opening(session))
            } else {
                GamePhase::DayLastWords
            }
        }
        GamePhase::DeathShoot | GamePhase::HunterShoot => {
            let resume = match day.shot_origin {
                Some(ShotOrigin::Dawn) => day_opening(session),
                _ => GamePhase::NightStart,
            };
            after_deaths(session, resume)
        }
        GamePhase::DaySpeech => {
            if day.cut_short {
                after_deaths(session, GamePhase::NightStart)
            } else {
                day_opening(session)
            }
        }
        GamePhase::DayVote => GamePhase::DayVoteResult,
        GamePhase::DayVoteResult => after_deaths(session, GamePhase::NightStart),
        GamePhase::GameOver => GamePhase::GameOver,
    }
}

/// Whether the machine can ever move directly from `from` to `to`.
pub fn is_legal_transition(from: GamePhase, to: GamePhase) -> bool {
    use GamePhase::*;

    if from == GameOver {
        return false;
    }
    if to == GameOver {
        return true;
    }
    let night_index = |p: GamePhase| NIGHT_ORDER.iter().position(|n| *n == p);
    match from {
        NightStart => night_index(to).is_some() || to == DayAnnouncement,
        NightGuard | NightWerewolfChat | NightWerewolf | NightSeer | NightWitch => {
            match (night_index(from), night_index(to)) {
                (Some(a), Some(b)) => b > a,
                _ => to == DayAnnouncement,
            }
        }
        DayAnnouncement | DayLastWords => matches!(
            to,
            DayLastWords | DeathShoot | HunterShoot | DaySpeech | DayVote
        ),
        DeathShoot | HunterShoot => matches!(
            to,
            DeathShoot | HunterShoot | DaySpeech | DayVote | NightStart
        ),
        DaySpeech => matches!(to, DaySpeech | DayVote | DeathShoot | HunterShoot | NightStart),
        DayVote => to == DayVoteResult,
        DayVoteResult => matches!(to, DeathShoot | HunterShoot | NightStart),
        GameOver => false,
    }
}

fn night_phase_present(session: &GameSession, phase: GamePhase) -> bool {
    match phase {
        GamePhase::NightGuard => session.living_with_role(Role::Guard).is_some(),
        GamePhase::NightWerewolfChat | GamePhase::NightWerewolf => {
            !session.living_wolves().is_empty()
        }
        GamePhase::NightSeer => session.living_with_role(Role::Seer).is_some(),
        GamePhase::NightWitch => session.living_with_role(Role::Witch).is_some(),
        _ => false,
    }
}

fn night_phase_after(session: &GameSession, current: Option<GamePhase>) -> GamePhase {
    let start = current
        .and_then(|p| NIGHT_ORDER.iter().position(|n| *n == p))
        .map(|idx| idx + 1)
        .unwrap_or(0);
    NIGHT_ORDER[start..]
        .iter()
        .copied()
        .find(|phase| night_phase_present(session, *phase))
        .unwrap_or(GamePhase::DayAnnouncement)
}

/// Queued shots run first; otherwise the day continues at `resume`.
fn after_deaths(session: &GameSession, resume: GamePhase) -> GamePhase {
    match session.day_state.shot_queue.front() {
        Some(shooter) => session
            .role_of(*shooter)
            .and_then(Role::shoot_phase)
            .unwrap_or(GamePhase::DeathShoot),
        None => resume,
    }
}

fn day_opening(session: &GameSession) -> GamePhase {
    if next_speaker(session).is_some() {
        GamePhase::DaySpeech
    } else {
        GamePhase::DayVote
    }
}

/// Living seats in speaking order: ascending seat id, starting from the
/// first living seat at or after the configured first speaker.
pub fn speaking_order(session: &GameSession) -> Vec<SeatId> {
    let mut living = session.living_seats();
    let start = living
        .iter()
        .position(|seat| *seat >= session.rules.first_speaker)
        .unwrap_or(0);
    living.rotate_left(start);
    living
}

fn next_speaker(session: &GameSession) -> Option<SeatId> {
    let day = &session.day_state;
    if day.speeches_started {
        day.speech_queue
            .iter()
            .copied()
            .find(|seat| session.is_alive(*seat))
    } else {
        speaking_order(session).first().copied()
    }
}

/// Plurality target among non-abstaining ballots; a tie exiles nobody.
pub fn tally(ballots: &[Ballot]) -> Option<SeatId> {
    let mut counts: BTreeMap<SeatId, usize> = BTreeMap::new();
    for ballot in ballots.iter().filter(|b| b.target != SKIP) {
        *counts.entry(ballot.target).or_default() += 1;
    }
    let top = counts.values().copied().max()?;
    let mut leaders = counts.iter().filter(|(_, n)| **n == top);
    let (leader, _) = leaders.next()?;
    if leaders.next().is_some() {
        None
    } else {
        Some(*leader)
    }
}

pub fn check_winner(session: &GameSession) -> Option<Winner> {
    let wolves = session.living_wolves().len();
    let village = session.living_seats().len() - wolves;
    if wolves == 0 {
        Some(Winner::Villager)
    } else if village == 0 {
        Some(Winner::Werewolf)
    } else if session.rules.win_variant == WinVariant::Parity && wolves >= village {
        Some(Winner::Werewolf)
    } else {
        None
    }
}

/// Ends the session: nothing queued survives a win.
pub(crate) fn finish(session: &mut GameSession, winner: Winner) {
    session.status = GameStatus::Finished;
    session.phase = GamePhase::GameOver;
    session.winner = Some(winner);
    session.pending_action = None;
    session.day_state.shot_queue.clear();
    session.day_state.last_words_queue.clear();
    session.day_state.speech_queue.clear();
}

/// Runs the win check after a death; returns the winner when it ended the game.
pub(crate) fn settle_deaths(session: &mut GameSession) -> Option<Winner> {
    let winner = check_winner(session)?;
    finish(session, winner);
    Some(winner)
}

pub(crate) fn game_over_text(winner: Winner) -> String {
    format!("Game over: {winner} won.")
}

/// Kills a seat and queues its death-triggered shot if it still has one.
pub(crate) fn kill_seat(session: &mut GameSession, seat_id: SeatId, cause: DeathCause) -> bool {
    if !session.mark_dead(seat_id, cause) {
        return false;
    }
    let shooter = session
        .role_of(seat_id)
        .and_then(Role::shoot_phase)
        .is_some();
    if shooter && !session.shots_fired.contains(&seat_id) {
        session.day_state.shot_queue.push_back(seat_id);
    }
    true
}

fn enter(session: &mut GameSession, phase: GamePhase) {
    session.phase = phase;
    match phase {
        GamePhase::NightStart => begin_night(session),
        GamePhase::NightGuard => offer_protect(session),
        GamePhase::NightWerewolfChat => offer_wolf_chat(session),
        GamePhase::NightWerewolf => offer_wolf_kill(session),
        GamePhase::NightSeer => offer_verify(session),
        GamePhase::NightWitch => offer_save_or_poison(session),
        GamePhase::DayAnnouncement => announce_dawn(session),
        GamePhase::DayLastWords => offer_last_words(session),
        GamePhase::DeathShoot | GamePhase::HunterShoot => offer_shot(session),
        GamePhase::DaySpeech => offer_speech(session),
        GamePhase::DayVote => offer_vote(session),
        GamePhase::DayVoteResult => announce_exile(session),
        GamePhase::GameOver => {}
    }
}

fn begin_night(session: &mut GameSession) {
    session.day += 1;
    session.night_kill_target = None;
    session.wolf_votes.clear();
    session.night_effects = Default::default();
    session.day_state = Default::default();
    session.log(LogDraft::system(format!("Night {} falls.", session.day)));
}

fn offer_protect(session: &mut GameSession) {
    let Some(guard) = session.living_with_role(Role::Guard) else {
        return;
    };
    let last = session.guard_last_target;
    let choices: Vec<SeatId> = session
        .living_seats()
        .into_iter()
        .filter(|seat| Some(*seat) != last)
        .collect();
    let hint = match last {
        Some(seat) => format!("Choose a seat to protect tonight (seat {seat} was protected last night)."),
        None => "Choose a seat to protect tonight.".to_string(),
    };
    session.pending_action =
        Some(PendingAction::new(ActionKind::Protect, vec![guard], choices, hint).skippable());
}

fn offer_wolf_chat(session: &mut GameSession) {
    let wolves = session.living_wolves();
    session.pending_action = Some(
        PendingAction::new(
            ActionKind::Speak,
            wolves,
            [],
            "Wolves, agree on tonight's target. Each of you may speak once.",
        )
        .skippable(),
    );
}

fn offer_wolf_kill(session: &mut GameSession) {
    let wolves = session.living_wolves();
    let choices = session.living_seats();
    session.pending_action = Some(
        PendingAction::new(
            ActionKind::Kill,
            wolves,
            choices,
            "Choose a seat to kill tonight.",
        )
        .skippable(),
    );
}

fn offer_verify(session: &mut GameSession) {
    let Some(seer) = session.living_with_role(Role::Seer) else {
        return;
    };
    let choices: Vec<SeatId> = session
        .living_seats()
        .into_iter()
        .filter(|seat| *seat != seer)
        .collect();
    session.pending_action = Some(
        PendingAction::new(
            ActionKind::Verify,
            vec![seer],
            choices,
            "Choose a seat to verify.",
        )
        .skippable(),
    );
}

/// Witch decisions run save first, then poison, within one night phase.
pub(crate) fn offer_save_or_poison(session: &mut GameSession) {
    let Some(witch) = session.living_with_role(Role::Witch) else {
        session.pending_action = None;
        return;
    };
    let saveable = session
        .night_kill_target
        .filter(|target| *target != witch || session.rules.witch_self_save);
    match saveable {
        Some(target) if !session.antidote_used => {
            session.pending_action = Some(
                PendingAction::new(
                    ActionKind::Save,
                    vec![witch],
                    [target],
                    format!("Seat {target} was attacked tonight. Use the antidote?"),
                )
                .skippable(),
            );
        }
        _ => offer_poison(session),
    }
}

pub(crate) fn offer_poison(session: &mut GameSession) {
    let witch = session.living_with_role(Role::Witch);
    let (Some(witch), false) = (witch, session.poison_used) else {
        session.pending_action = None;
        return;
    };
    let saved = session.night_effects.save;
    let choices: Vec<SeatId> = session
        .living_seats()
        .into_iter()
        .filter(|seat| Some(*seat) != saved)
        .collect();
    session.pending_action = Some(
        PendingAction::new(
            ActionKind::Poison,
            vec![witch],
            choices,
            "Use the poison on a seat?",
        )
        .skippable(),
    );
}

fn announce_dawn(session: &mut GameSession) {
    let outcome = resolve_night(&session.night_effects, session.rules.double_rescue_kills);
    session.night_kill_target = None;
    session.day_state.shot_origin = Some(ShotOrigin::Dawn);
    for death in &outcome.deaths {
        kill_seat(session, death.seat_id, death.cause);
    }
    let dead = outcome.seats();
    session.day_state.night_deaths = dead.clone();

    let text = if outcome.is_peaceful() {
        format!("Day {} dawns. Last night was peaceful.", session.day)
    } else {
        format!("Day {} dawns. Died last night: {}.", session.day, seat_list(&dead))
    };
    session.log(LogDraft::system(text));

    if let Some(winner) = settle_deaths(session) {
        session.log(LogDraft::system(game_over_text(winner)));
        return;
    }

    if session.day == 1 && session.rules.first_night_last_words {
        session.day_state.last_words_queue = dead.into_iter().collect();
    }
}

fn offer_last_words(session: &mut GameSession) {
    let Some(seat) = session.day_state.last_words_queue.pop_front() else {
        return;
    };
    session.pending_action = Some(
        PendingAction::new(
            ActionKind::Speak,
            vec![seat],
            [],
            format!("Seat {seat}, say your last words."),
        )
        .skippable(),
    );
}

fn offer_shot(session: &mut GameSession) {
    let Some(shooter) = session.day_state.shot_queue.pop_front() else {
        return;
    };
    session.shots_fired.insert(shooter);
    let choices = session.living_seats();
    session.pending_action = Some(
        PendingAction::new(
            ActionKind::Shoot,
            vec![shooter],
            choices,
            format!("Seat {shooter}, you may take one living seat with you."),
        )
        .skippable(),
    );
}

fn offer_speech(session: &mut GameSession) {
    if !session.day_state.speeches_started {
        session.day_state.speech_queue = VecDeque::from(speaking_order(session));
        session.day_state.speeches_started = true;
    }

    let mut speaker = None;
    while let Some(seat) = session.day_state.speech_queue.pop_front() {
        if session.is_alive(seat) {
            speaker = Some(seat);
            break;
        }
    }
    let Some(speaker) = speaker else {
        return;
    };

    let hint = format!("Seat {speaker}, it is your turn to speak.");
    let can_self_destruct =
        session.role_of(speaker) == Some(Role::WhiteWolfKing) && !session.self_destruct_used;
    let pending = if can_self_destruct {
        let targets: Vec<SeatId> = session
            .living_seats()
            .into_iter()
            .filter(|seat| *seat != speaker)
            .collect();
        PendingAction::new(ActionKind::Speak, vec![speaker], targets, hint)
            .skippable()
            .with_alternative(ActionKind::SelfDestruct)
    } else {
        PendingAction::new(ActionKind::Speak, vec![speaker], [], hint).skippable()
    };
    session.pending_action = Some(pending);
}

fn offer_vote(session: &mut GameSession) {
    session.day_state.votes.clear();
    let living = session.living_seats();
    session.log(LogDraft::system("Voting begins."));
    session.pending_action = Some(
        PendingAction::new(
            ActionKind::Vote,
            living.clone(),
            living,
            "Vote for a seat to exile, or abstain.",
        )
        .skippable(),
    );
}

fn announce_exile(session: &mut GameSession) {
    let exiled = tally(&session.day_state.votes);
    session.day_state.exiled = exiled;

    let Some(seat) = exiled else {
        session.log(LogDraft::system("The vote is tied or empty. No one is exiled."));
        return;
    };

    session.day_state.shot_origin = Some(ShotOrigin::Exile);
    kill_seat(session, seat, DeathCause::Exile);
    let votes = session
        .day_state
        .votes
        .iter()
        .filter(|b| b.target == seat)
        .count();
    session.log(LogDraft::system(format!(
        "Seat {seat} is exiled with {votes} vote(s)."
    )));

    if let Some(winner) = settle_deaths(session) {
        session.log(LogDraft::system(game_over_text(winner)));
        return;
    }

    session.pending_action = Some(
        PendingAction::new(
            ActionKind::Speak,
            vec![seat],
            [],
            format!("Seat {seat}, say your last words."),
        )
        .skippable(),
    );
}

pub(crate) fn seat_list(seats: &[SeatId]) -> String {
    seats
        .iter()
        .map(|s| format!("seat {s}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::mode::GameMode;
    use crate::models::rule::Rules;
    use crate::models::seat::Seat;

    pub(crate) fn session_with(roles: &[Role]) -> GameSession {
        let seats = roles
            .iter()
            .enumerate()
            .map(|(idx, role)| Seat::new(idx as SeatId + 1, format!("P{}", idx + 1), *role, false))
            .collect();
        GameSession::new("test".into(), GameMode::Classic9, Rules::default(), seats)
    }

    pub(crate) fn classic9() -> GameSession {
        use Role::*;
        session_with(&[
            Werewolf, Werewolf, Werewolf, Villager, Villager, Villager, Seer, Witch, Hunter,
        ])
    }

    fn ballots(pairs: &[(SeatId, SeatId)]) -> Vec<Ballot> {
        pairs
            .iter()
            .map(|(voter, target)| Ballot {
                voter: *voter,
                target: *target,
            })
            .collect()
    }

    #[test]
    fn test_first_step_activates_and_skips_missing_guard() {
        let mut session = classic9();
        assert_eq!(step(&mut session), StepOutcome::Advanced(GamePhase::NightWerewolfChat));
        assert_eq!(session.status, GameStatus::Active);
        assert_eq!(session.state_version, 1);
    }

    #[test]
    fn test_step_blocked_by_pending_action() {
        let mut session = classic9();
        step(&mut session);
        let version = session.state_version;
        assert_eq!(
            step(&mut session),
            StepOutcome::Unchanged(GamePhase::NightWerewolfChat)
        );
        assert_eq!(session.state_version, version);
    }

    #[test]
    fn test_step_on_finished_session_is_noop() {
        let mut session = classic9();
        finish(&mut session, Winner::Villager);
        let version = session.state_version;
        assert_eq!(step(&mut session), StepOutcome::Unchanged(GamePhase::GameOver));
        assert_eq!(session.state_version, version);
    }

    #[test]
    fn test_full_night_order_with_guard() {
        use Role::*;
        let mut session = session_with(&[
            Werewolf, Werewolf, Werewolf, Villager, Villager, Villager, Seer, Witch, Hunter, Guard,
        ]);
        let mut seen = Vec::new();
        loop {
            let outcome = step(&mut session);
            seen.push(outcome.phase());
            if outcome.phase() == GamePhase::DayAnnouncement {
                break;
            }
            session.pending_action = None;
        }
        assert_eq!(
            seen,
            vec![
                GamePhase::NightGuard,
                GamePhase::NightWerewolfChat,
                GamePhase::NightWerewolf,
                GamePhase::NightSeer,
                GamePhase::NightWitch,
                GamePhase::DayAnnouncement,
            ]
        );
    }

    #[test]
    fn test_dead_seer_phase_is_skipped() {
        let mut session = classic9();
        session.mark_dead(7, DeathCause::WolfKill);
        session.phase = GamePhase::NightWerewolf;
        assert_eq!(next_phase(&session), GamePhase::NightWitch);
    }

    #[test]
    fn test_tally_plurality_and_ties() {
        assert_eq!(tally(&ballots(&[(1, 1), (2, 1), (3, 2)])), Some(1));
        assert_eq!(tally(&ballots(&[(1, 1), (2, 2)])), None);
        assert_eq!(tally(&ballots(&[(1, SKIP), (2, SKIP)])), None);
        assert_eq!(tally(&ballots(&[(1, 3), (2, SKIP), (3, SKIP)])), Some(3));
    }

    #[test]
    fn test_speaking_order_rotates_from_first_speaker() {
        let mut session = classic9();
        session.rules.first_speaker = 4;
        session.mark_dead(4, DeathCause::WolfKill);
        assert_eq!(speaking_order(&session), vec![5, 6, 7, 8, 9, 1, 2, 3]);
        session.rules.first_speaker = 12;
        assert_eq!(speaking_order(&session)[0], 1);
    }

    #[test]
    fn test_win_variants() {
        let mut session = classic9();
        for seat in [4, 5, 6, 7] {
            session.mark_dead(seat, DeathCause::WolfKill);
        }
        // three wolves against two village seats
        assert_eq!(check_winner(&session), None);
        session.rules.win_variant = WinVariant::Parity;
        assert_eq!(check_winner(&session), Some(Winner::Werewolf));

        let mut session = classic9();
        for seat in [1, 2, 3] {
            session.mark_dead(seat, DeathCause::WolfKill);
        }
        assert_eq!(check_winner(&session), Some(Winner::Villager));
    }

    #[test]
    fn test_exiled_hunter_shoots_before_night() {
        let mut session = classic9();
        session.status = GameStatus::Active;
        session.phase = GamePhase::DayVote;
        session.day_state.votes = ballots(&[(1, 9), (2, 9), (3, 4)]);
        assert_eq!(step(&mut session), StepOutcome::Advanced(GamePhase::DayVoteResult));
        assert!(!session.is_alive(9));
        // last words first, then the shot
        session.pending_action = None;
        assert_eq!(step(&mut session), StepOutcome::Advanced(GamePhase::HunterShoot));
        let pending = session.pending_action.as_ref().unwrap();
        assert_eq!(pending.actors, vec![9]);
        assert!(!pending.choices.contains(&9));
        session.pending_action = None;
        assert_eq!(step(&mut session), StepOutcome::Advanced(GamePhase::NightStart));
        assert_eq!(session.day, 2);
    }

    #[test]
    fn test_exiling_last_wolf_ends_game_at_once() {
        let mut session = classic9();
        session.status = GameStatus::Active;
        session.mark_dead(1, DeathCause::WolfKill);
        session.mark_dead(2, DeathCause::WolfKill);
        session.phase = GamePhase::DayVote;
        session.day_state.votes = ballots(&[(3, 4), (4, 3), (5, 3)]);
        assert_eq!(step(&mut session), StepOutcome::Advanced(GamePhase::GameOver));
        assert_eq!(session.winner, Some(Winner::Villager));
        assert_eq!(session.status, GameStatus::Finished);
        assert!(session.pending_action.is_none());
    }

    #[test]
    fn test_legal_transitions() {
        use GamePhase::*;
        assert!(is_legal_transition(NightStart, NightGuard));
        assert!(is_legal_transition(NightGuard, NightWitch));
        assert!(!is_legal_transition(NightWitch, NightGuard));
        assert!(is_legal_transition(DayVoteResult, HunterShoot));
        assert!(!is_legal_transition(DayVote, NightStart));
        assert!(is_legal_transition(DaySpeech, GameOver));
        assert!(!is_legal_transition(GameOver, NightStart));
    }
}
