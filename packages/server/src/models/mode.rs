use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::role::Role;

/// Preset seat count and role distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Classic9,
    Guard10,
    WolfKing11,
    WolfKing12,
    WhiteWolfKing12,
}

impl GameMode {
    pub fn seat_count(self) -> usize {
        self.roles().len()
    }

    /// The exact role multiset dealt for this mode.
    pub fn roles(self) -> Vec<Role> {
        use Role::*;
        match self {
            GameMode::Classic9 => vec![
                Werewolf, Werewolf, Werewolf, Villager, Villager, Villager, Seer, Witch, Hunter,
            ],
            GameMode::Guard10 => vec![
                Werewolf, Werewolf, Werewolf, Villager, Villager, Villager, Seer, Witch, Hunter,
                Guard,
            ],
            GameMode::WolfKing11 => vec![
                Werewolf, Werewolf, WolfKing, Villager, Villager, Villager, Villager, Seer, Witch,
                Hunter, Guard,
            ],
            GameMode::WolfKing12 => vec![
                Werewolf, Werewolf, Werewolf, WolfKing, Villager, Villager, Villager, Villager,
                Seer, Witch, Hunter, Guard,
            ],
            GameMode::WhiteWolfKing12 => vec![
                Werewolf,
                Werewolf,
                Werewolf,
                WhiteWolfKing,
                Villager,
                Villager,
                Villager,
                Villager,
                Seer,
                Witch,
                Hunter,
                Guard,
            ],
        }
    }

    pub fn has_role(self, role: Role) -> bool {
        self.roles().contains(&role)
    }

    /// Shuffled deal of `roles()`; a seed makes the deal reproducible.
    pub fn deal_roles(self, seed: Option<u64>) -> Vec<Role> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut roles = self.roles();
        roles.shuffle(&mut rng);
        roles
    }

    /// True when `assigned` is a permutation of this mode's distribution.
    pub fn matches_distribution(self, assigned: &[Role]) -> bool {
        let mut expected = self.roles();
        let mut actual = assigned.to_vec();
        expected.sort();
        actual.sort();
        expected == actual
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameMode::Classic9 => "classic9",
            GameMode::Guard10 => "guard10",
            GameMode::WolfKing11 => "wolf_king11",
            GameMode::WolfKing12 => "wolf_king12",
            GameMode::WhiteWolfKing12 => "white_wolf_king12",
        };
        f.write_str(name)
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classic9" => Ok(GameMode::Classic9),
            "guard10" => Ok(GameMode::Guard10),
            "wolf_king11" => Ok(GameMode::WolfKing11),
            "wolf_king12" => Ok(GameMode::WolfKing12),
            "white_wolf_king12" => Ok(GameMode::WhiteWolfKing12),
            other => Err(format!("unknown game mode: {other}")),
        }
    }
}
