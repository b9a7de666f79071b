// Concrete session kinds: each decides how a joining player's entity is created
// in the arena and how arena entities are described to clients.

use crate::domain::engine::{ArenaEngine, ArenaEntity};
use crate::domain::ports::{GameEngine, GameMode};
use crate::domain::{EngineError, EntityDescription, EntityKind, Spawn};

/// Horizontal gap between consecutive battle-test spawn slots.
const BATTLE_SLOT_SPACING: f32 = 64.0;

fn describe(entity: &ArenaEntity) -> EntityDescription {
    EntityDescription {
        id: entity.id.clone(),
        player_id: entity.player_id.clone(),
        kind: entity.kind,
        x: entity.x,
        y: entity.y,
        rotation: entity.rotation,
    }
}

/// Ordinary sessions: one ship per player at the arena's default spawn.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardMode;

impl GameMode<ArenaEngine> for StandardMode {
    fn initiate_engine_entity(
        &self,
        engine: &mut ArenaEngine,
        player_id: &str,
        entity_id: &str,
    ) -> Result<Option<ArenaEntity>, EngineError> {
        engine.create_entity(player_id, entity_id)
    }

    fn convert_engine_entity_to_transport(&self, entity: &ArenaEntity) -> EntityDescription {
        describe(entity)
    }
}

/// Battle test: ships line up side by side from the spawn point so they can engage.
#[derive(Debug, Clone, Copy)]
pub struct BattleTestMode {
    pub spawn: Spawn,
}

impl GameMode<ArenaEngine> for BattleTestMode {
    fn initiate_engine_entity(
        &self,
        engine: &mut ArenaEngine,
        player_id: &str,
        entity_id: &str,
    ) -> Result<Option<ArenaEntity>, EngineError> {
        let slot = engine.entity_count()? as f32;
        let at = Spawn {
            x: self.spawn.x + slot * BATTLE_SLOT_SPACING,
            y: self.spawn.y,
        };
        engine.spawn_entity(player_id, entity_id, EntityKind::Ship, at)
    }

    fn convert_engine_entity_to_transport(&self, entity: &ArenaEntity) -> EntityDescription {
        describe(entity)
    }
}

/// Island test: unarmed scouts for exploring the map.
#[derive(Debug, Clone, Copy)]
pub struct IslandTestMode {
    pub spawn: Spawn,
}

impl GameMode<ArenaEngine> for IslandTestMode {
    fn initiate_engine_entity(
        &self,
        engine: &mut ArenaEngine,
        player_id: &str,
        entity_id: &str,
    ) -> Result<Option<ArenaEntity>, EngineError> {
        engine.spawn_entity(player_id, entity_id, EntityKind::Scout, self.spawn)
    }

    fn convert_engine_entity_to_transport(&self, entity: &ArenaEntity) -> EntityDescription {
        // Scouts report no heading; clients render them without a facing.
        EntityDescription {
            rotation: 0.0,
            ..describe(entity)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::engine::ArenaTuning;

    fn engine() -> ArenaEngine {
        ArenaEngine::start(ArenaTuning::default(), Spawn { x: 5.0, y: 6.0 })
    }

    #[tokio::test]
    async fn when_standard_player_joins_then_ship_spawns_at_default_spawn() {
        let mut engine = engine();

        let entity = StandardMode
            .initiate_engine_entity(&mut engine, "p1", "e1")
            .expect("create should succeed")
            .expect("entity should be created");
        let description = StandardMode.convert_engine_entity_to_transport(&entity);

        assert_eq!(description.kind, EntityKind::Ship);
        assert_eq!((description.x, description.y), (5.0, 6.0));
        assert_eq!(description.player_id, "p1");
    }

    #[tokio::test]
    async fn when_battle_test_players_join_then_they_take_consecutive_slots() {
        let mut engine = engine();
        let mode = BattleTestMode {
            spawn: Spawn { x: -100.0, y: 0.0 },
        };

        let first = mode
            .initiate_engine_entity(&mut engine, "p1", "e1")
            .expect("create should succeed")
            .expect("entity should be created");
        let second = mode
            .initiate_engine_entity(&mut engine, "p2", "e2")
            .expect("create should succeed")
            .expect("entity should be created");

        assert_eq!(first.x, -100.0);
        assert_eq!(second.x, -100.0 + BATTLE_SLOT_SPACING);
    }

    #[tokio::test]
    async fn when_island_test_player_joins_then_scout_is_created() {
        let mut engine = engine();
        let mode = IslandTestMode {
            spawn: Spawn { x: 1.0, y: 2.0 },
        };

        let entity = mode
            .initiate_engine_entity(&mut engine, "p1", "e1")
            .expect("create should succeed")
            .expect("entity should be created");

        assert_eq!(mode.convert_engine_entity_to_transport(&entity).kind, EntityKind::Scout);
    }

    #[tokio::test]
    async fn when_entity_id_is_taken_then_mode_reports_no_entity() {
        let mut engine = engine();

        StandardMode
            .initiate_engine_entity(&mut engine, "p1", "e1")
            .expect("create should succeed");
        let duplicate = StandardMode
            .initiate_engine_entity(&mut engine, "p2", "e1")
            .expect("create should succeed");

        assert!(duplicate.is_none());
    }
}
