// Shared helpers for the integration suites.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use werewolf_server::error::EngineError;
use werewolf_server::models::action::{ActionKind, Submission};
use werewolf_server::models::game::{CreateSession, GameSession};
use werewolf_server::models::mode::GameMode;
use werewolf_server::models::role::Role;
use werewolf_server::models::seat::{SeatId, SeatSpec, SKIP};
use werewolf_server::services::session_store::{SessionStore, StoreLimits};
use werewolf_server::services::snapshot::SnapshotStore;
use werewolf_server::utils::clock::ManualClock;

pub const TTL: Duration = Duration::from_secs(600);

pub fn limits(max_sessions: usize) -> StoreLimits {
    StoreLimits {
        max_sessions,
        idle_ttl: TTL,
    }
}

pub fn store_with(
    snapshots: Arc<dyn SnapshotStore>,
    max_sessions: usize,
    clock: Arc<ManualClock>,
) -> Arc<SessionStore> {
    Arc::new(SessionStore::with_clock(snapshots, limits(max_sessions), clock))
}

/// A roster with roles fixed in seat order.
pub fn fixed_roster(mode: GameMode, roles: &[Role]) -> CreateSession {
    CreateSession {
        mode,
        roster: roles
            .iter()
            .enumerate()
            .map(|(idx, role)| SeatSpec::ai(format!("seat-{}", idx + 1)).with_role(*role))
            .collect(),
        rules: None,
        seed: None,
    }
}

/// Werewolves in seats 1-3, villagers 4-6, then seer, witch and hunter.
pub fn classic9_roster() -> CreateSession {
    use Role::*;
    fixed_roster(
        GameMode::Classic9,
        &[Werewolf, Werewolf, Werewolf, Villager, Villager, Villager, Seer, Witch, Hunter],
    )
}

pub fn dealt_roster(mode: GameMode, seed: u64) -> CreateSession {
    CreateSession {
        mode,
        roster: (1..=mode.seat_count())
            .map(|n| SeatSpec::ai(format!("bot-{n}")))
            .collect(),
        rules: None,
        seed: Some(seed),
    }
}

/// Steps until a pending action exists or the game ends.
pub async fn step_until_pending(store: &SessionStore, id: &str) -> GameSession {
    for _ in 0..64 {
        let session = store.get(id).await.unwrap();
        if session.pending_action.is_some() || session.is_finished() {
            return session;
        }
        store.step(id).await.unwrap();
    }
    panic!("session {id} never produced a pending action");
}

pub async fn submit(
    store: &SessionStore,
    id: &str,
    seat: SeatId,
    action: ActionKind,
    target: Option<SeatId>,
) -> Result<u64, EngineError> {
    let version = store.get(id).await?.state_version;
    let mut sub = Submission::new(seat, action, version);
    if let Some(target) = target {
        sub = sub.target(target);
    }
    if action == ActionKind::Speak {
        sub = sub.content(format!("seat {seat} has nothing to hide"));
    }
    store.submit_action(id, sub).await.map(|r| r.state_version)
}

/// Every awaiting seat answers with skip.
pub async fn skip_all(store: &SessionStore, id: &str) {
    let session = store.get(id).await.unwrap();
    let Some(pending) = session.pending_action else {
        return;
    };
    for seat in pending.awaiting() {
        submit(store, id, seat, ActionKind::Skip, None).await.unwrap();
    }
}

/// Answers the current pending action the way a simple bot would: speak,
/// or pick the lowest legal non-skip target.
pub async fn answer_simply(store: &SessionStore, id: &str) {
    let session = store.get(id).await.unwrap();
    let Some(pending) = session.pending_action else {
        return;
    };
    for seat in pending.awaiting() {
        let target = pending.choices.iter().copied().find(|c| *c != SKIP);
        let result = match (pending.kind, target) {
            (ActionKind::Speak, _) => submit(store, id, seat, ActionKind::Speak, None).await,
            (kind, Some(target)) => submit(store, id, seat, kind, Some(target)).await,
            (_, None) => submit(store, id, seat, ActionKind::Skip, None).await,
        };
        if let Err(err) = result {
            // a shot can end the game before every actor answers
            assert!(
                matches!(
                    err,
                    EngineError::IllegalAction(
                        werewolf_server::error::IllegalReason::GameFinished
                    )
                ),
                "unexpected rejection: {err}"
            );
            return;
        }
    }
}
