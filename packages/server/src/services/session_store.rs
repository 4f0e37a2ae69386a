//! Registry of live sessions.
//!
//! Each session sits behind its own async mutex, so mutations on one session
//! are serialized while different sessions proceed in parallel. The index
//! lock is only held to look up, insert or remove a slot, never across an
//! await on a session lock. When both are needed the session lock is taken
//! first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::action_resolver::{self, ActionReceipt};
use super::phase_machine::{self, StepOutcome};
use super::snapshot::{Snapshot, SnapshotStore};
use super::visibility::{self, SeatView};
use crate::error::EngineError;
use crate::models::action::Submission;
use crate::models::config::EngineConfig;
use crate::models::game::{CreateSession, GamePhase, GameSession};
use crate::models::message::MessageEntry;
use crate::models::rule::Rules;
use crate::models::seat::SeatId;
use crate::utils::clock::{idle_longer_than, Clock, SystemClock};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct StoreLimits {
    pub max_sessions: usize,
    pub idle_ttl: Duration,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_sessions: 256,
            idle_ttl: Duration::from_secs(30 * 60),
        }
    }
}

impl From<&EngineConfig> for StoreLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_sessions: config.max_sessions,
            idle_ttl: config.idle_ttl,
        }
    }
}

/// Log entries produced by one accepted mutation.
///
/// Entries are unfiltered; a subscriber relaying them to a seat passes the
/// event through [`SessionStore::event_entries_for`] first.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub session_id: String,
    pub state_version: u64,
    pub phase: GamePhase,
    pub entries: Vec<MessageEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepReport {
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub state_version: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub evicted: usize,
    pub snapshots_retried: usize,
    pub removals_retried: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub loaded: usize,
    pub expired: usize,
    pub corrupt: usize,
    pub over_capacity: usize,
}

struct SlotState {
    game: GameSession,
    last_activity: DateTime<Utc>,
    /// Set once the slot has been swept or deleted; holders of a stale
    /// `Arc` must treat the session as gone.
    evicted: bool,
    /// The latest state has not reached the snapshot store yet.
    persist_failed: bool,
}

type Slot = Arc<Mutex<SlotState>>;

pub struct SessionStore {
    index: RwLock<HashMap<String, Slot>>,
    snapshots: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    limits: StoreLimits,
    default_rules: Rules,
    debug_views: bool,
    events: broadcast::Sender<SessionEvent>,
    pending_removals: parking_lot::Mutex<HashSet<String>>,
}

impl SessionStore {
    pub fn new(snapshots: Arc<dyn SnapshotStore>, limits: StoreLimits) -> Self {
        Self::with_clock(snapshots, limits, Arc::new(SystemClock))
    }

    pub fn with_clock(
        snapshots: Arc<dyn SnapshotStore>,
        limits: StoreLimits,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            index: RwLock::new(HashMap::new()),
            snapshots,
            clock,
            limits,
            default_rules: Rules::default(),
            debug_views: false,
            events,
            pending_removals: parking_lot::Mutex::new(HashSet::new()),
        }
    }

    pub fn from_config(config: &EngineConfig, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self::new(snapshots, StoreLimits::from(config))
            .default_rules(config.default_rules.clone())
            .debug_views(config.debug_views)
    }

    /// Rules applied when a create request carries none.
    pub fn default_rules(mut self, rules: Rules) -> Self {
        self.default_rules = rules;
        self
    }

    pub fn debug_views(mut self, debug: bool) -> Self {
        self.debug_views = debug;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.index.read().await.contains_key(session_id)
    }

    /// Creates a session from a matchmaking roster and returns its id.
    ///
    /// Fails fast with `CapacityExceeded` when the resident limit is reached.
    pub async fn create(&self, request: CreateSession) -> Result<String, EngineError> {
        let session_id = Uuid::new_v4().to_string();
        let game = GameSession::from_request(session_id.clone(), request, &self.default_rules)?;
        let now = self.clock.now();
        let slot: Slot = Arc::new(Mutex::new(SlotState {
            game,
            last_activity: now,
            evicted: false,
            persist_failed: false,
        }));

        {
            let mut index = self.index.write().await;
            if index.len() >= self.limits.max_sessions {
                warn!(
                    limit = self.limits.max_sessions,
                    "Rejecting session create: capacity reached"
                );
                return Err(EngineError::CapacityExceeded {
                    limit: self.limits.max_sessions,
                });
            }
            index.insert(session_id.clone(), slot.clone());
        }

        let mut state = slot.lock().await;
        self.persist(&session_id, &mut state).await;
        info!(session_id = %session_id, mode = %state.game.mode, "Session created");
        Ok(session_id)
    }

    /// A full copy of the session, hidden information included.
    pub async fn get(&self, session_id: &str) -> Result<GameSession, EngineError> {
        let slot = self.slot(session_id).await?;
        let state = slot.lock().await;
        if state.evicted {
            return Err(EngineError::NotFound(session_id.to_string()));
        }
        Ok(state.game.clone())
    }

    /// The session as `seat_id` may see it. Reads do not count as activity.
    pub async fn get_view(&self, session_id: &str, seat_id: SeatId) -> Result<SeatView, EngineError> {
        let slot = self.slot(session_id).await?;
        let state = slot.lock().await;
        if state.evicted {
            return Err(EngineError::NotFound(session_id.to_string()));
        }
        visibility::project(&state.game, seat_id, self.debug_views)
    }

    /// The entries of `event` that `seat_id` may read, under the same rules
    /// as [`SessionStore::get_view`].
    pub async fn event_entries_for(
        &self,
        event: &SessionEvent,
        seat_id: SeatId,
    ) -> Result<Vec<MessageEntry>, EngineError> {
        let slot = self.slot(&event.session_id).await?;
        let state = slot.lock().await;
        if state.evicted {
            return Err(EngineError::NotFound(event.session_id.clone()));
        }
        let role = state
            .game
            .role_of(seat_id)
            .ok_or(EngineError::SeatNotFound(seat_id))?;
        Ok(visibility::entries_for_seat(
            &event.entries,
            seat_id,
            role,
            self.debug_views,
        ))
    }

    pub async fn submit_action(
        &self,
        session_id: &str,
        submission: Submission,
    ) -> Result<ActionReceipt, EngineError> {
        let slot = self.slot(session_id).await?;
        let mut state = slot.lock().await;
        if state.evicted {
            return Err(EngineError::NotFound(session_id.to_string()));
        }

        let since = state.game.message_log.last_seq();
        let receipt = match action_resolver::resolve(&mut state.game, &submission) {
            Ok(receipt) => receipt,
            Err(err) => {
                debug!(
                    session_id = %session_id,
                    seat_id = submission.seat_id,
                    action = %submission.action,
                    error = %err,
                    "Submission rejected"
                );
                return Err(err);
            }
        };

        state.last_activity = self.clock.now();
        self.persist(session_id, &mut state).await;
        self.publish(&state.game, since);
        debug!(
            session_id = %session_id,
            seat_id = receipt.seat_id,
            action = %receipt.action,
            state_version = receipt.state_version,
            "Submission accepted"
        );
        Ok(receipt)
    }

    /// Advances the session by one phase if nothing is pending.
    pub async fn step(&self, session_id: &str) -> Result<StepReport, EngineError> {
        let slot = self.slot(session_id).await?;
        let mut state = slot.lock().await;
        if state.evicted {
            return Err(EngineError::NotFound(session_id.to_string()));
        }

        let since = state.game.message_log.last_seq();
        let outcome = phase_machine::step(&mut state.game);
        if outcome.advanced() {
            state.last_activity = self.clock.now();
            self.persist(session_id, &mut state).await;
            self.publish(&state.game, since);
            debug!(
                session_id = %session_id,
                phase = %outcome.phase(),
                state_version = state.game.state_version,
                "Session advanced"
            );
        }
        Ok(StepReport {
            outcome,
            state_version: state.game.state_version,
        })
    }

    /// Removes a session and its snapshot.
    ///
    /// The snapshot goes first. If it cannot be removed the session stays
    /// resident and the error is returned, so a restart never brings back a
    /// session the caller was told is gone.
    pub async fn delete(&self, session_id: &str) -> Result<(), EngineError> {
        let slot = self.slot(session_id).await?;
        let mut state = slot.lock().await;
        if state.evicted {
            return Err(EngineError::NotFound(session_id.to_string()));
        }
        if let Err(err) = self.snapshots.remove(session_id).await {
            warn!(session_id = %session_id, error = %err, "Failed to remove snapshot, session kept");
            return Err(EngineError::Persistence(err));
        }
        state.evicted = true;
        self.index.write().await.remove(session_id);
        info!(session_id = %session_id, "Session deleted");
        Ok(())
    }

    /// Evicts sessions idle longer than the TTL and retries failed snapshot
    /// writes and removals. Sessions busy with a mutation are skipped.
    pub async fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        let slots: Vec<(String, Slot)> = self
            .index
            .read()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect();

        for (session_id, slot) in slots {
            let Ok(mut state) = slot.try_lock() else {
                continue;
            };
            if state.evicted {
                continue;
            }
            if idle_longer_than(state.last_activity, now, self.limits.idle_ttl) {
                self.evict(&session_id, &mut state).await;
                report.evicted += 1;
                info!(session_id = %session_id, "Evicted idle session");
            } else if state.persist_failed {
                self.persist(&session_id, &mut state).await;
                report.snapshots_retried += 1;
            }
        }

        let removals: Vec<String> = self.pending_removals.lock().iter().cloned().collect();
        for session_id in removals {
            report.removals_retried += 1;
            if self.snapshots.remove(&session_id).await.is_ok() {
                self.pending_removals.lock().remove(&session_id);
            }
        }

        report
    }

    /// Loads persisted sessions at startup.
    ///
    /// Records idle past the TTL are deleted instead of loaded, corrupt or
    /// unreadable ones are skipped, and at most `max_sessions` of the most
    /// recently active sessions become resident. Only a failure to list the
    /// snapshot store is an error.
    pub async fn restore(&self) -> Result<RestoreReport, EngineError> {
        let now = self.clock.now();
        let mut report = RestoreReport::default();
        let mut live = Vec::new();

        for record in self.snapshots.load_all().await? {
            let bytes = match record.bytes {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(session_id = %record.session_id, error = %err, "Skipping snapshot that could not be read");
                    report.corrupt += 1;
                    continue;
                }
            };
            let snapshot = match Snapshot::decode(&bytes) {
                Ok(snapshot) if snapshot.session.session_id == record.session_id => snapshot,
                Ok(_) => {
                    warn!(session_id = %record.session_id, "Snapshot id does not match its key, skipping");
                    report.corrupt += 1;
                    continue;
                }
                Err(err) => {
                    warn!(session_id = %record.session_id, error = %err, "Skipping unreadable snapshot");
                    report.corrupt += 1;
                    continue;
                }
            };

            if idle_longer_than(snapshot.last_activity_ts, now, self.limits.idle_ttl) {
                report.expired += 1;
                if let Err(err) = self.snapshots.remove(&record.session_id).await {
                    warn!(session_id = %record.session_id, error = %err, "Failed to remove expired snapshot");
                    self.pending_removals.lock().insert(record.session_id);
                }
                continue;
            }
            live.push(snapshot);
        }

        live.sort_by(|a, b| b.last_activity_ts.cmp(&a.last_activity_ts));

        let mut index = self.index.write().await;
        for snapshot in live {
            let session_id = snapshot.session.session_id.clone();
            if index.contains_key(&session_id) {
                continue;
            }
            if index.len() >= self.limits.max_sessions {
                report.over_capacity += 1;
                continue;
            }
            index.insert(
                session_id,
                Arc::new(Mutex::new(SlotState {
                    game: snapshot.session,
                    last_activity: snapshot.last_activity_ts,
                    evicted: false,
                    persist_failed: false,
                })),
            );
            report.loaded += 1;
        }

        info!(
            loaded = report.loaded,
            expired = report.expired,
            corrupt = report.corrupt,
            over_capacity = report.over_capacity,
            "Restored sessions from snapshots"
        );
        Ok(report)
    }

    /// Runs `sweep` every `every` until the returned task is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = self.sweep().await;
                if report != SweepReport::default() {
                    debug!(
                        evicted = report.evicted,
                        snapshots_retried = report.snapshots_retried,
                        removals_retried = report.removals_retried,
                        "Sweep finished"
                    );
                }
            }
        })
    }

    async fn slot(&self, session_id: &str) -> Result<Slot, EngineError> {
        self.index
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(session_id.to_string()))
    }

    /// Drops an idle session. A failed snapshot removal is retried by later
    /// sweeps; until then restore skips the record as expired. Caller holds
    /// the session lock.
    async fn evict(&self, session_id: &str, state: &mut SlotState) {
        state.evicted = true;
        if let Err(err) = self.snapshots.remove(session_id).await {
            warn!(session_id = %session_id, error = %err, "Failed to remove snapshot, will retry");
            self.pending_removals.lock().insert(session_id.to_string());
        }
        self.index.write().await.remove(session_id);
    }

    /// Writes the current state. A failure is logged and retried later; the
    /// in-memory session stays authoritative.
    async fn persist(&self, session_id: &str, state: &mut SlotState) {
        let result = match Snapshot::encode(&state.game, state.last_activity) {
            Ok(bytes) => self.snapshots.write(session_id, bytes).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => {
                if state.persist_failed {
                    info!(session_id = %session_id, "Snapshot write recovered");
                }
                state.persist_failed = false;
            }
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "Snapshot write failed, will retry");
                state.persist_failed = true;
            }
        }
    }

    fn publish(&self, game: &GameSession, since: u64) {
        let entries = game.message_log.since(since).to_vec();
        if entries.is_empty() {
            return;
        }
        // no subscribers is fine
        let _ = self.events.send(SessionEvent {
            session_id: game.session_id.clone(),
            state_version: game.state_version,
            phase: game.phase,
            entries,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::action::ActionKind;
    use crate::models::message::Visibility;
    use crate::models::mode::GameMode;
    use crate::models::seat::SeatSpec;
    use crate::services::snapshot::MemorySnapshotStore;
    use crate::utils::clock::ManualClock;

    fn request() -> CreateSession {
        CreateSession {
            mode: GameMode::Classic9,
            roster: (1..=9).map(|n| SeatSpec::ai(format!("bot-{n}"))).collect(),
            rules: None,
            seed: Some(7),
        }
    }

    fn store(max_sessions: usize) -> (SessionStore, Arc<MemorySnapshotStore>, Arc<ManualClock>) {
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let clock = Arc::new(ManualClock::default());
        let limits = StoreLimits {
            max_sessions,
            idle_ttl: Duration::from_secs(600),
        };
        let store = SessionStore::with_clock(snapshots.clone(), limits, clock.clone());
        (store, snapshots, clock)
    }

    #[tokio::test]
    async fn test_create_persists_snapshot() {
        let (store, snapshots, _) = store(4);
        let id = store.create(request()).await.unwrap();
        assert!(snapshots.contains(&id));
        let session = store.get(&id).await.unwrap();
        assert_eq!(session.seats.len(), 9);
        assert_eq!(session.state_version, 0);
    }

    #[tokio::test]
    async fn test_capacity_fails_fast() {
        let (store, _, _) = store(1);
        store.create(request()).await.unwrap();
        let err = store.create(request()).await.unwrap_err();
        assert!(matches!(err, EngineError::CapacityExceeded { limit: 1 }));
    }

    #[tokio::test]
    async fn test_bad_roster_is_rejected() {
        let (store, _, _) = store(4);
        let mut bad = request();
        bad.roster.pop();
        assert!(matches!(
            store.create(bad).await,
            Err(EngineError::InvalidRoster(_))
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_step_publishes_new_entries() {
        let (store, _, _) = store(4);
        let id = store.create(request()).await.unwrap();
        let mut events = store.subscribe();

        let report = store.step(&id).await.unwrap();
        assert!(report.outcome.advanced());
        assert_eq!(report.state_version, 1);

        let event = events.recv().await.unwrap();
        assert_eq!(event.session_id, id);
        assert_eq!(event.state_version, 1);
        assert!(!event.entries.is_empty());
    }

    #[tokio::test]
    async fn test_event_entries_are_filtered_per_seat() {
        let (store, _, _) = store(4);
        let id = store.create(request()).await.unwrap();
        store.step(&id).await.unwrap();
        let session = store.get(&id).await.unwrap();
        let pending = session.pending_action.clone().unwrap();
        assert_eq!(pending.kind, ActionKind::Speak);
        let wolf = pending.actors[0];
        let villager = session
            .seats
            .iter()
            .find(|s| !s.role.is_wolf_aligned())
            .unwrap()
            .seat_id;

        let mut events = store.subscribe();
        let sub = Submission::new(wolf, ActionKind::Speak, session.state_version)
            .content("take seat 4")
            .thought("they suspect nothing");
        store.submit_action(&id, sub).await.unwrap();
        let event = events.recv().await.unwrap();
        assert!(event.entries.iter().any(|e| e.thought.is_some()));

        let for_wolf = store.event_entries_for(&event, wolf).await.unwrap();
        assert_eq!(for_wolf.len(), event.entries.len());
        assert!(for_wolf.iter().all(|e| e.thought.is_none()));

        let for_villager = store.event_entries_for(&event, villager).await.unwrap();
        assert!(for_villager.len() < event.entries.len());
        assert!(for_villager
            .iter()
            .all(|e| e.visibility != Visibility::WolfTeam));

        assert!(matches!(
            store.event_entries_for(&event, 42).await,
            Err(EngineError::SeatNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_idle_session_is_swept_with_snapshot() {
        let (store, snapshots, clock) = store(4);
        let id = store.create(request()).await.unwrap();

        clock.advance(Duration::from_secs(300));
        assert_eq!(store.sweep().await.evicted, 0);
        // activity resets the idle timer
        store.step(&id).await.unwrap();
        clock.advance(Duration::from_secs(500));
        assert_eq!(store.sweep().await.evicted, 0);

        clock.advance(Duration::from_secs(101));
        assert_eq!(store.sweep().await.evicted, 1);
        assert!(!snapshots.contains(&id));
        assert!(matches!(
            store.get_view(&id, 1).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reads_do_not_refresh_activity() {
        let (store, _, clock) = store(4);
        let id = store.create(request()).await.unwrap();
        clock.advance(Duration::from_secs(590));
        store.get_view(&id, 3).await.unwrap();
        clock.advance(Duration::from_secs(20));
        assert_eq!(store.sweep().await.evicted, 1);
    }

    #[tokio::test]
    async fn test_failed_write_is_retried() {
        let (store, snapshots, _) = store(4);
        let id = store.create(request()).await.unwrap();
        snapshots.fail_writes(true);

        store.step(&id).await.unwrap();
        let stale = Snapshot::decode(&snapshots.get(&id).unwrap()).unwrap();
        assert_eq!(stale.session.state_version, 0);

        snapshots.fail_writes(false);
        let report = store.sweep().await;
        assert_eq!(report.snapshots_retried, 1);
        let fresh = Snapshot::decode(&snapshots.get(&id).unwrap()).unwrap();
        assert_eq!(fresh.session.state_version, 1);
    }

    #[tokio::test]
    async fn test_failed_removal_is_retried_by_sweep() {
        let (store, snapshots, clock) = store(4);
        let id = store.create(request()).await.unwrap();
        snapshots.fail_removes(true);
        clock.advance(Duration::from_secs(601));
        assert_eq!(store.sweep().await.evicted, 1);
        assert!(snapshots.contains(&id));
        assert!(!store.contains(&id).await);

        snapshots.fail_removes(false);
        assert_eq!(store.sweep().await.removals_retried, 1);
        assert!(!snapshots.contains(&id));
    }

    #[tokio::test]
    async fn test_delete_keeps_session_when_snapshot_removal_fails() {
        let (store, snapshots, _) = store(4);
        let id = store.create(request()).await.unwrap();
        snapshots.fail_removes(true);

        let err = store.delete(&id).await.unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
        assert!(err.is_retryable());
        assert!(store.contains(&id).await);
        assert!(snapshots.contains(&id));

        snapshots.fail_removes(false);
        store.delete(&id).await.unwrap();
        assert!(!store.contains(&id).await);
        assert!(!snapshots.contains(&id));
    }

    #[tokio::test]
    async fn test_rejected_submission_does_not_touch_snapshot() {
        let (store, snapshots, _) = store(4);
        let id = store.create(request()).await.unwrap();
        store.step(&id).await.unwrap();
        let before = snapshots.get(&id).unwrap();

        let sub = Submission::new(1, ActionKind::Vote, 1).target(2);
        assert!(store.submit_action(&id, sub).await.is_err());
        assert_eq!(snapshots.get(&id).unwrap(), before);
    }
}
