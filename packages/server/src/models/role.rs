use serde::{Deserialize, Serialize};
use std::fmt;

use super::game::GamePhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Villager,
    Werewolf,
    WolfKing,
    WhiteWolfKing,
    Seer,
    Witch,
    Hunter,
    Guard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Village,
    Werewolf,
}

impl Role {
    pub fn team(self) -> Team {
        match self {
            Role::Werewolf | Role::WolfKing | Role::WhiteWolfKing => Team::Werewolf,
            _ => Team::Village,
        }
    }

    /// Roles that share werewolf-team night visibility.
    pub fn is_wolf_aligned(self) -> bool {
        self.team() == Team::Werewolf
    }

    /// Phase in which this role fires its one death-triggered shot, if any.
    pub fn shoot_phase(self) -> Option<GamePhase> {
        match self {
            Role::Hunter => Some(GamePhase::HunterShoot),
            Role::WolfKing | Role::WhiteWolfKing => Some(GamePhase::DeathShoot),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Villager => write!(f, "villager"),
            Role::Werewolf => write!(f, "werewolf"),
            Role::WolfKing => write!(f, "wolf king"),
            Role::WhiteWolfKing => write!(f, "white wolf king"),
            Role::Seer => write!(f, "seer"),
            Role::Witch => write!(f, "witch"),
            Role::Hunter => write!(f, "hunter"),
            Role::Guard => write!(f, "guard"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wolf_alignment() {
        assert!(Role::Werewolf.is_wolf_aligned());
        assert!(Role::WolfKing.is_wolf_aligned());
        assert!(Role::WhiteWolfKing.is_wolf_aligned());
        assert!(!Role::Seer.is_wolf_aligned());
        assert!(!Role::Hunter.is_wolf_aligned());
    }

    #[test]
    fn test_shooters() {
        assert_eq!(Role::Hunter.shoot_phase(), Some(GamePhase::HunterShoot));
        assert_eq!(Role::WolfKing.shoot_phase(), Some(GamePhase::DeathShoot));
        assert_eq!(Role::WhiteWolfKing.shoot_phase(), Some(GamePhase::DeathShoot));
        assert_eq!(Role::Witch.shoot_phase(), None);
    }
}
