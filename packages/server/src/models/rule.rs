use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::seat::SeatId;

/// When the wolf side is declared the winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinVariant {
    /// Every village-aligned seat is dead.
    Elimination,
    /// Living wolves are at least as many as living village seats.
    Parity,
}

/// How several wolves' kill submissions collapse into one night kill target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WolfKillPolicy {
    /// Every living wolf submits once; the most-voted target dies. Ties go to
    /// the tied target that was submitted first.
    Plurality,
    /// The first wolf submission decides for the pack.
    FirstSubmit,
}

/// Per-session rule switches, fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rules {
    pub win_variant: WinVariant,
    pub wolf_kill_policy: WolfKillPolicy,
    pub witch_self_save: bool,
    /// A kill target that is both protected and saved still dies.
    pub double_rescue_kills: bool,
    pub first_speaker: SeatId,
    pub first_night_last_words: bool,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            win_variant: WinVariant::Elimination,
            wolf_kill_policy: WolfKillPolicy::Plurality,
            witch_self_save: false,
            double_rescue_kills: true,
            first_speaker: 1,
            first_night_last_words: true,
        }
    }
}

impl FromStr for WinVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "elimination" => Ok(WinVariant::Elimination),
            "parity" => Ok(WinVariant::Parity),
            other => Err(format!("unknown win variant: {other}")),
        }
    }
}

impl FromStr for WolfKillPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plurality" => Ok(WolfKillPolicy::Plurality),
            "first_submit" => Ok(WolfKillPolicy::FirstSubmit),
            other => Err(format!("unknown wolf kill policy: {other}")),
        }
    }
}
