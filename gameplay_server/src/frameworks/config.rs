use std::{env, sync::Arc, sync::OnceLock, time::Duration};

use crate::domain::ReservedInstanceIds;
use crate::domain::state::WORLD_STATE_UPDATE_INTERVAL_MS;

// Runtime/server constants (not gameplay tuning).

pub fn http_port() -> u16 {
    env::var("GAMEPLAY_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3001)
}

/// Fixed ids of the reserved test instances, read from the environment once.
pub fn reserved_instance_ids() -> ReservedInstanceIds {
    static IDS: OnceLock<ReservedInstanceIds> = OnceLock::new();
    IDS.get_or_init(|| {
        let defaults = ReservedInstanceIds::default();
        ReservedInstanceIds {
            battle_test: env_id("BATTLE_TEST_INSTANCE_ID").unwrap_or(defaults.battle_test),
            island_test: env_id("ISLAND_TEST_INSTANCE_ID").unwrap_or(defaults.island_test),
        }
    })
    .clone()
}

fn env_id(key: &str) -> Option<Arc<str>> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(Arc::from)
}

pub fn max_players_per_instance() -> usize {
    env::var("MAX_PLAYERS_PER_INSTANCE")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(16)
}

pub fn idle_sweep_interval() -> Duration {
    let millis = env::var("IDLE_SWEEP_INTERVAL_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(5000);
    Duration::from_millis(millis)
}

pub const COMMAND_CHANNEL_CAPACITY: usize = 1024;

/// Upper bound on bots spawned by a single create-instance request.
pub const MAX_BOTS_PER_REQUEST: usize = 32;

pub const ENGINE_TICK_RATE: u32 = 30;
pub const WORLD_STATE_UPDATE_INTERVAL: Duration =
    Duration::from_millis(WORLD_STATE_UPDATE_INTERVAL_MS);
