//! Validation and application of seat submissions.
//!
//! Every submission is checked in full before the session is touched, so a
//! rejected one leaves the session exactly as it was. An accepted one appends
//! exactly one log entry and bumps `state_version` by one.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

use super::phase_machine::{game_over_text, kill_seat, offer_poison, seat_list, settle_deaths};
use crate::error::{EngineError, IllegalReason};
use crate::models::action::{ActionKind, PendingAction, Submission};
use crate::models::game::{Ballot, DeathCause, GamePhase, GameSession, ShotOrigin, Winner};
use crate::models::message::{LogDraft, Visibility};
use crate::models::rule::WolfKillPolicy;
use crate::models::seat::{SeatId, SKIP};

/// What an accepted submission did to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReceipt {
    pub seat_id: SeatId,
    pub action: ActionKind,
    pub state_version: u64,
    pub entry_seq: u64,
    /// Nothing is pending any more and the session may be stepped.
    pub pending_cleared: bool,
    pub winner: Option<Winner>,
}

/// A submission after generic validation, with skip folded into the
/// pending kind and a `SKIP` target.
#[derive(Debug, Clone, Copy)]
struct Act<'a> {
    seat: SeatId,
    kind: ActionKind,
    target: SeatId,
    skipped: bool,
    content: &'a str,
}

type Check = fn(&GameSession, &Act<'_>) -> Result<(), IllegalReason>;
type Apply = fn(&mut GameSession, &Act<'_>) -> LogDraft;
type Complete = fn(&mut GameSession) -> Option<String>;

struct Handler {
    check: Check,
    apply: Apply,
    /// Runs once every actor has answered; its text joins the entry.
    complete: Option<Complete>,
}

/// Which actions each phase accepts and how they are applied.
static HANDLERS: Lazy<HashMap<(GamePhase, ActionKind), Handler>> = Lazy::new(|| {
    let entry = |check: Check, apply: Apply, complete: Option<Complete>| Handler {
        check,
        apply,
        complete,
    };
    HashMap::from([
        (
            (GamePhase::NightGuard, ActionKind::Protect),
            entry(no_check, apply_protect, None),
        ),
        (
            (GamePhase::NightWerewolfChat, ActionKind::Speak),
            entry(no_check, apply_speak, None),
        ),
        (
            (GamePhase::NightWerewolf, ActionKind::Kill),
            entry(no_check, apply_kill, Some(settle_wolf_kill)),
        ),
        (
            (GamePhase::NightSeer, ActionKind::Verify),
            entry(no_check, apply_verify, None),
        ),
        (
            (GamePhase::NightWitch, ActionKind::Save),
            entry(no_check, apply_save, Some(follow_with_poison)),
        ),
        (
            (GamePhase::NightWitch, ActionKind::Poison),
            entry(no_check, apply_poison, None),
        ),
        (
            (GamePhase::DayLastWords, ActionKind::Speak),
            entry(no_check, apply_speak, None),
        ),
        (
            (GamePhase::DaySpeech, ActionKind::Speak),
            entry(no_check, apply_speak, None),
        ),
        (
            (GamePhase::DaySpeech, ActionKind::SelfDestruct),
            entry(check_self_destruct, apply_self_destruct, None),
        ),
        (
            (GamePhase::DayVote, ActionKind::Vote),
            entry(no_check, apply_vote, None),
        ),
        (
            (GamePhase::DayVoteResult, ActionKind::Speak),
            entry(no_check, apply_speak, None),
        ),
        (
            (GamePhase::HunterShoot, ActionKind::Shoot),
            entry(no_check, apply_shoot, None),
        ),
        (
            (GamePhase::DeathShoot, ActionKind::Shoot),
            entry(no_check, apply_shoot, None),
        ),
    ])
});

/// Validates `submission` against the session and applies it.
pub fn resolve(
    session: &mut GameSession,
    submission: &Submission,
) -> Result<ActionReceipt, EngineError> {
    let (act, handler) = validate(session, submission)?;

    let mut draft = (handler.apply)(session, &act);

    if !session.is_finished() {
        let complete = match session.pending_action.as_mut() {
            Some(pending) => {
                if !pending.has_responded(act.seat) {
                    pending.responded.push(act.seat);
                }
                pending.is_complete()
            }
            None => false,
        };
        if complete {
            session.pending_action = None;
            if let Some(text) = handler.complete.and_then(|f| f(session)) {
                draft.append(&text);
            }
        }
    }

    if let (true, Some(winner)) = (session.is_finished(), session.winner) {
        draft.append(&game_over_text(winner));
    }

    session.log_with_thought(draft, submission.thought.clone());
    session.state_version += 1;

    Ok(ActionReceipt {
        seat_id: act.seat,
        action: act.kind,
        state_version: session.state_version,
        entry_seq: session.message_log.last_seq(),
        pending_cleared: session.pending_action.is_none(),
        winner: session.winner,
    })
}

fn validate<'a>(
    session: &GameSession,
    submission: &'a Submission,
) -> Result<(Act<'a>, &'static Handler), EngineError> {
    if session.is_finished() {
        return Err(IllegalReason::GameFinished.into());
    }
    if submission.expected_version != session.state_version {
        return Err(EngineError::StaleVersion {
            submitted: submission.expected_version,
            current: session.state_version,
        });
    }
    let pending = session
        .pending_action
        .as_ref()
        .ok_or(IllegalReason::NoPendingAction)?;
    let seat = submission.seat_id;
    if session.seat(seat).is_none() {
        return Err(EngineError::SeatNotFound(seat));
    }
    if !pending.is_actor(seat) {
        return Err(IllegalReason::NotYourTurn { seat_id: seat }.into());
    }
    if pending.has_responded(seat) {
        return Err(IllegalReason::AlreadyActed { seat_id: seat }.into());
    }

    let act = shape(pending, submission)?;
    let handler = HANDLERS
        .get(&(session.phase, act.kind))
        .ok_or(IllegalReason::WrongPhase {
            phase: session.phase,
            kind: act.kind,
        })?;
    (handler.check)(session, &act)?;
    Ok((act, handler))
}

/// Folds skip into the pending kind and checks target and content.
///
/// Target 0 is an abstain wherever skipping is allowed, whatever action it
/// was sent with; a speech that carries content is still a speech.
fn shape<'a>(pending: &PendingAction, submission: &'a Submission) -> Result<Act<'a>, IllegalReason> {
    let seat = submission.seat_id;
    let content = submission.content.as_deref().unwrap_or("").trim();
    let skip = Act {
        seat,
        kind: pending.kind,
        target: SKIP,
        skipped: true,
        content: "",
    };

    if submission.action == ActionKind::Skip {
        return if pending.allows_skip() {
            Ok(skip)
        } else {
            Err(IllegalReason::SkipNotAllowed)
        };
    }

    if !pending.accepts(submission.action) {
        return Err(IllegalReason::WrongActionType {
            expected: pending.kind,
            got: submission.action,
        });
    }

    let kind = submission.action;
    let abstain = submission.target == Some(SKIP) && pending.allows_skip();

    if kind == ActionKind::Speak {
        if let Some(target) = submission.target.filter(|t| *t != SKIP) {
            return Err(IllegalReason::TargetNotAllowed { target });
        }
        if !content.is_empty() {
            return Ok(Act {
                seat,
                kind,
                target: SKIP,
                skipped: false,
                content,
            });
        }
        return if abstain {
            Ok(skip)
        } else {
            Err(IllegalReason::MissingContent)
        };
    }

    if abstain {
        return Ok(skip);
    }
    let target = submission.target.ok_or(IllegalReason::MissingTarget)?;
    if !pending.choices.contains(&target) {
        return Err(IllegalReason::TargetNotAllowed { target });
    }
    Ok(Act {
        seat,
        kind,
        target,
        skipped: false,
        content,
    })
}

fn no_check(_: &GameSession, _: &Act<'_>) -> Result<(), IllegalReason> {
    Ok(())
}

fn check_self_destruct(session: &GameSession, _: &Act<'_>) -> Result<(), IllegalReason> {
    if session.self_destruct_used {
        return Err(IllegalReason::RuleViolation {
            detail: "self-destruct has already been used",
        });
    }
    Ok(())
}

fn apply_protect(session: &mut GameSession, act: &Act<'_>) -> LogDraft {
    let private = Visibility::Private { seat_id: act.seat };
    if act.skipped {
        session.night_effects.protect = None;
        session.guard_last_target = None;
        return LogDraft::action(act.seat, act.kind, private, "The guard protects nobody tonight.");
    }
    session.night_effects.protect = Some(act.target);
    session.guard_last_target = Some(act.target);
    LogDraft::action(
        act.seat,
        act.kind,
        private,
        format!("The guard protects seat {}.", act.target),
    )
}

fn apply_speak(session: &mut GameSession, act: &Act<'_>) -> LogDraft {
    let visibility = if session.phase == GamePhase::NightWerewolfChat {
        Visibility::WolfTeam
    } else {
        Visibility::Public
    };
    let content = if act.skipped {
        format!("Seat {} passes.", act.seat)
    } else {
        act.content.to_string()
    };
    LogDraft::action(act.seat, ActionKind::Speak, visibility, content)
}

fn apply_kill(session: &mut GameSession, act: &Act<'_>) -> LogDraft {
    session.wolf_votes.push(Ballot {
        voter: act.seat,
        target: act.target,
    });
    if session.rules.wolf_kill_policy == WolfKillPolicy::FirstSubmit {
        if let Some(pending) = session.pending_action.as_mut() {
            pending.responded = pending.actors.clone();
        }
    }
    let content = if act.skipped {
        format!("Seat {} declines to pick a target.", act.seat)
    } else {
        format!("Seat {} picks seat {} to kill.", act.seat, act.target)
    };
    LogDraft::action(act.seat, act.kind, Visibility::WolfTeam, content)
}

fn settle_wolf_kill(session: &mut GameSession) -> Option<String> {
    let target = aggregate_wolf_votes(&session.wolf_votes, session.rules.wolf_kill_policy);
    session.night_kill_target = target;
    session.night_effects.kill = target;
    Some(match target {
        Some(seat) => format!("The pack settles on seat {seat}."),
        None => "The pack kills nobody tonight.".to_string(),
    })
}

/// Collapses wolf submissions into one kill target.
pub fn aggregate_wolf_votes(votes: &[Ballot], policy: WolfKillPolicy) -> Option<SeatId> {
    match policy {
        WolfKillPolicy::FirstSubmit => votes.first().map(|b| b.target).filter(|t| *t != SKIP),
        WolfKillPolicy::Plurality => {
            let mut counts: Vec<(SeatId, usize)> = Vec::new();
            for ballot in votes.iter().filter(|b| b.target != SKIP) {
                match counts.iter_mut().find(|(seat, _)| *seat == ballot.target) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((ballot.target, 1)),
                }
            }
            let top = counts.iter().map(|(_, n)| *n).max()?;
            // first-submitted among the tied
            counts.iter().find(|(_, n)| *n == top).map(|(seat, _)| *seat)
        }
    }
}

fn apply_verify(session: &mut GameSession, act: &Act<'_>) -> LogDraft {
    let private = Visibility::Private { seat_id: act.seat };
    if act.skipped {
        return LogDraft::action(act.seat, act.kind, private, "The seer rests tonight.");
    }
    let wolf = session
        .role_of(act.target)
        .map(|role| role.is_wolf_aligned())
        .unwrap_or(false);
    session.verified_results.insert(act.target, wolf);
    let verdict = if wolf { "a werewolf" } else { "good" };
    LogDraft::action(
        act.seat,
        act.kind,
        private,
        format!("Seat {} is {verdict}.", act.target),
    )
}

fn apply_save(session: &mut GameSession, act: &Act<'_>) -> LogDraft {
    let private = Visibility::Private { seat_id: act.seat };
    if act.skipped {
        return LogDraft::action(act.seat, act.kind, private, "The witch keeps the antidote.");
    }
    session.night_effects.save = Some(act.target);
    session.night_kill_target = None;
    session.antidote_used = true;
    LogDraft::action(
        act.seat,
        act.kind,
        private,
        format!("The witch saves seat {}.", act.target),
    )
}

fn follow_with_poison(session: &mut GameSession) -> Option<String> {
    offer_poison(session);
    None
}

fn apply_poison(session: &mut GameSession, act: &Act<'_>) -> LogDraft {
    let private = Visibility::Private { seat_id: act.seat };
    if act.skipped {
        return LogDraft::action(act.seat, act.kind, private, "The witch keeps the poison.");
    }
    session.night_effects.poison = Some(act.target);
    session.poison_used = true;
    LogDraft::action(
        act.seat,
        act.kind,
        private,
        format!("The witch poisons seat {}.", act.target),
    )
}

fn apply_vote(session: &mut GameSession, act: &Act<'_>) -> LogDraft {
    session.day_state.votes.push(Ballot {
        voter: act.seat,
        target: act.target,
    });
    let content = if act.skipped {
        format!("Seat {} abstains.", act.seat)
    } else {
        format!("Seat {} votes for seat {}.", act.seat, act.target)
    };
    LogDraft::action(act.seat, act.kind, Visibility::Public, content)
}

fn apply_shoot(session: &mut GameSession, act: &Act<'_>) -> LogDraft {
    if act.skipped {
        return LogDraft::action(
            act.seat,
            act.kind,
            Visibility::Public,
            format!("Seat {} holds fire.", act.seat),
        );
    }
    kill_seat(session, act.target, DeathCause::Shot);
    settle_deaths(session);
    LogDraft::action(
        act.seat,
        act.kind,
        Visibility::Public,
        format!("Seat {} shoots seat {}.", act.seat, act.target),
    )
}

fn apply_self_destruct(session: &mut GameSession, act: &Act<'_>) -> LogDraft {
    session.self_destruct_used = true;
    session.shots_fired.insert(act.seat);
    session.day_state.shot_origin = Some(ShotOrigin::SelfDestruct);
    session.day_state.cut_short = true;
    session.day_state.speech_queue.clear();

    let mut dead = Vec::new();
    for seat in [act.seat, act.target] {
        if kill_seat(session, seat, DeathCause::SelfDestruct) {
            dead.push(seat);
        }
    }
    settle_deaths(session);
    LogDraft::action(
        act.seat,
        act.kind,
        Visibility::Public,
        format!(
            "Seat {} self-destructs. Died: {}.",
            act.seat,
            seat_list(&dead)
        ),
    )
}
