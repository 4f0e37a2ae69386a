//! Dawn resolution of one night's effect records.
//!
//! The guard, wolves and witch all act against the same night. Their requests
//! are recorded as-is during the night and resolved here in one pass, so the
//! outcome never depends on the order the phases ran in.

use serde::{Deserialize, Serialize};

use crate::models::game::{DeathCause, NightEffects};
use crate::models::seat::SeatId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Death {
    pub seat_id: SeatId,
    pub cause: DeathCause,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NightOutcome {
    /// Ordered by seat id; the public announcement does not reveal causes.
    pub deaths: Vec<Death>,
}

impl NightOutcome {
    pub fn is_peaceful(&self) -> bool {
        self.deaths.is_empty()
    }

    pub fn seats(&self) -> Vec<SeatId> {
        self.deaths.iter().map(|d| d.seat_id).collect()
    }
}

pub fn resolve_night(effects: &NightEffects, double_rescue_kills: bool) -> NightOutcome {
    let mut deaths = Vec::new();

    if let Some(target) = effects.kill {
        let protected = effects.protect == Some(target);
        let saved = effects.save == Some(target);
        let survives = match (protected, saved) {
            (true, true) => !double_rescue_kills,
            (protected, saved) => protected || saved,
        };
        if !survives {
            deaths.push(Death {
                seat_id: target,
                cause: DeathCause::WolfKill,
            });
        }
    }

    // Protection does not stop poison.
    if let Some(target) = effects.poison {
        if !deaths.iter().any(|d| d.seat_id == target) {
            deaths.push(Death {
                seat_id: target,
                cause: DeathCause::Poison,
            });
        }
    }

    deaths.sort_by_key(|d| d.seat_id);
    NightOutcome { deaths }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effects(
        kill: Option<SeatId>,
        protect: Option<SeatId>,
        save: Option<SeatId>,
        poison: Option<SeatId>,
    ) -> NightEffects {
        NightEffects {
            kill,
            protect,
            save,
            poison,
        }
    }

    #[test]
    fn test_unopposed_kill() {
        let outcome = resolve_night(&effects(Some(4), None, None, None), true);
        assert_eq!(
            outcome.deaths,
            vec![Death {
                seat_id: 4,
                cause: DeathCause::WolfKill
            }]
        );
    }

    #[test]
    fn test_save_negates_kill() {
        let outcome = resolve_night(&effects(Some(4), None, Some(4), None), true);
        assert!(outcome.is_peaceful());
    }

    #[test]
    fn test_protect_negates_kill() {
        let outcome = resolve_night(&effects(Some(4), Some(4), None, None), true);
        assert!(outcome.is_peaceful());
    }

    #[test]
    fn test_protect_on_other_seat_does_not_help() {
        let outcome = resolve_night(&effects(Some(4), Some(5), None, None), true);
        assert_eq!(outcome.seats(), vec![4]);
    }

    #[test]
    fn test_double_rescue_follows_rule() {
        let both = effects(Some(4), Some(4), Some(4), None);
        assert_eq!(resolve_night(&both, true).seats(), vec![4]);
        assert!(resolve_night(&both, false).is_peaceful());
    }

    #[test]
    fn test_poison_ignores_protection_and_adds_death() {
        let outcome = resolve_night(&effects(Some(7), Some(2), None, Some(2)), true);
        assert_eq!(outcome.seats(), vec![2, 7]);
        assert_eq!(outcome.deaths[0].cause, DeathCause::Poison);
    }

    #[test]
    fn test_poisoning_the_kill_target_counts_once() {
        let outcome = resolve_night(&effects(Some(3), None, None, Some(3)), true);
        assert_eq!(outcome.deaths.len(), 1);
    }

    #[test]
    fn test_empty_night() {
        assert!(resolve_night(&NightEffects::default(), true).is_peaceful());
    }
}
