use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use super::rule::{Rules, WinVariant, WolfKillPolicy};
use super::seat::SeatId;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bind_addr: SocketAddr,
    // Resident session ceiling; create() fails fast beyond it
    pub max_sessions: usize,
    pub idle_ttl: Duration,
    pub sweep_interval: Duration,
    pub snapshot_dir: PathBuf,
    // Include AI "thought" entries in seat views
    pub debug_views: bool,
    pub default_rules: Rules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let debug_mode = cfg!(debug_assertions) || env::var("DEBUG_MODE").is_ok();

        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_sessions: 256,
            idle_ttl: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
            snapshot_dir: PathBuf::from("./data/sessions"),
            debug_views: debug_mode,
            default_rules: Rules::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = env::var("WEREWOLF_BIND_ADDR")
            .ok()
            .and_then(|v| v.parse::<SocketAddr>().ok())
            .unwrap_or(defaults.bind_addr);
        let max_sessions = env::var("WEREWOLF_MAX_SESSIONS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.max_sessions);
        let idle_ttl = env::var("WEREWOLF_IDLE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.idle_ttl);
        let sweep_interval = env::var("WEREWOLF_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.sweep_interval);
        let snapshot_dir = env::var("WEREWOLF_SNAPSHOT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.snapshot_dir);
        let debug_views = env::var("WEREWOLF_DEBUG_VIEWS")
            .map(|v| v == "true")
            .unwrap_or(defaults.debug_views);

        Self {
            bind_addr,
            max_sessions,
            idle_ttl,
            sweep_interval,
            snapshot_dir,
            debug_views,
            default_rules: rules_from_env(defaults.default_rules),
        }
    }
}

fn rules_from_env(defaults: Rules) -> Rules {
    let win_variant = env::var("WEREWOLF_WIN_VARIANT")
        .ok()
        .and_then(|v| v.parse::<WinVariant>().ok())
        .unwrap_or(defaults.win_variant);
    let wolf_kill_policy = env::var("WEREWOLF_WOLF_KILL_POLICY")
        .ok()
        .and_then(|v| v.parse::<WolfKillPolicy>().ok())
        .unwrap_or(defaults.wolf_kill_policy);
    let witch_self_save = env::var("WEREWOLF_WITCH_SELF_SAVE")
        .map(|v| v == "true")
        .unwrap_or(defaults.witch_self_save);
    let double_rescue_kills = env::var("WEREWOLF_DOUBLE_RESCUE_KILLS")
        .map(|v| v == "true")
        .unwrap_or(defaults.double_rescue_kills);
    let first_speaker = env::var("WEREWOLF_FIRST_SPEAKER")
        .ok()
        .and_then(|v| v.parse::<SeatId>().ok())
        .filter(|seat| *seat > 0)
        .unwrap_or(defaults.first_speaker);

    Rules {
        win_variant,
        wolf_kill_policy,
        witch_self_save,
        double_rescue_kills,
        first_speaker,
        first_night_last_words: defaults.first_night_last_words,
    }
}
