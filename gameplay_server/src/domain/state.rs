// Domain-level session identity, entity descriptions and input types.

use std::fmt;
use std::sync::Arc;

/// Time an ordinary instance may sit empty before the sweeper destroys it.
pub const DESTROY_EMPTY_INSTANCE_TIMEOUT_MS: u64 = 10_000;
/// Period of the world-state broadcast sent to every player of an instance.
pub const WORLD_STATE_UPDATE_INTERVAL_MS: u64 = 2_000;

/// Session variant, fixed when the instance is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameplayType {
    Default,
    BattleTest,
    IslandTest,
}

impl GameplayType {
    /// Reserved variants share a well-known id and never expire by idleness.
    pub fn is_reserved(self) -> bool {
        matches!(self, GameplayType::BattleTest | GameplayType::IslandTest)
    }
}

impl fmt::Display for GameplayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameplayType::Default => "Default",
            GameplayType::BattleTest => "BattleTest",
            GameplayType::IslandTest => "IslandTest",
        };
        f.write_str(name)
    }
}

/// Well-known instance ids for the reserved session variants.
///
/// Loaded once at startup and shared read-only by every instance.
#[derive(Debug, Clone)]
pub struct ReservedInstanceIds {
    pub battle_test: Arc<str>,
    pub island_test: Arc<str>,
}

impl ReservedInstanceIds {
    /// Returns the fixed id for a reserved variant, `None` for ordinary sessions.
    pub fn for_type(&self, gameplay_type: GameplayType) -> Option<Arc<str>> {
        match gameplay_type {
            GameplayType::BattleTest => Some(self.battle_test.clone()),
            GameplayType::IslandTest => Some(self.island_test.clone()),
            GameplayType::Default => None,
        }
    }
}

impl Default for ReservedInstanceIds {
    fn default() -> Self {
        Self {
            battle_test: Arc::from("battle-test"),
            island_test: Arc::from("island-test"),
        }
    }
}

/// Spawn coordinates handed to an instance at creation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Spawn {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Ship,
    Scout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerInputType {
    Forward,
    Backward,
    Left,
    Right,
    Shoot,
}

/// Command queued into the engine on behalf of a player's controlled entity.
#[derive(Debug, Clone, PartialEq)]
pub struct InputCommand {
    /// Client-side sequence number of the input.
    pub index: u64,
    pub input_type: PlayerInputType,
    pub entity_id: String,
    pub player_id: String,
}

/// Engine-independent description of an entity, as sent to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescription {
    pub id: String,
    pub player_id: String,
    pub kind: EntityKind,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}
