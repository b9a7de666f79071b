// Ports the gameplay core depends on: engine capability, game-mode hooks,
// notification delivery and time.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::errors::EngineError;
use crate::domain::messages::{Notification, OutboundMessage};
use crate::domain::state::{EntityDescription, InputCommand, Spawn};

/// Narrow view of a simulation engine owned by exactly one instance.
pub trait GameEngine: Send + 'static {
    /// Engine-native entity representation.
    type Entity: Send;

    /// Creates the entity a player controls. `Ok(None)` means the engine declined.
    fn create_entity(
        &mut self,
        player_id: &str,
        entity_id: &str,
    ) -> Result<Option<Self::Entity>, EngineError>;

    /// Creates a server-driven entity at `at`. `Ok(None)` means the engine declined.
    fn create_bot_entity(
        &mut self,
        bot_id: &str,
        at: Spawn,
    ) -> Result<Option<Self::Entity>, EngineError>;

    fn remove_entity(&mut self, entity_id: &str) -> Result<(), EngineError>;

    fn enqueue_input_command(&mut self, command: InputCommand) -> Result<(), EngineError>;

    /// Forgets the entity's input ordering and drops its queued inputs, so a
    /// reconnecting client can restart its indexes.
    fn reset_input_sequence(&mut self, entity_id: &str) -> Result<(), EngineError>;

    /// Live entities in the engine's iteration order.
    fn list_entities(&self) -> Result<Vec<Self::Entity>, EngineError>;

    fn tick_rate(&self) -> u32;

    /// Releases every resource the engine holds.
    fn destroy(&mut self) -> Result<(), EngineError>;
}

/// Per-variant hooks a concrete session kind supplies to its instance.
pub trait GameMode<E: GameEngine>: Send + 'static {
    /// Creates the engine entity for a joining player, or `None` if the mode refuses.
    fn initiate_engine_entity(
        &self,
        engine: &mut E,
        player_id: &str,
        entity_id: &str,
    ) -> Result<Option<E::Entity>, EngineError>;

    /// Normalizes an engine-native entity into its wire description.
    fn convert_engine_entity_to_transport(&self, entity: &E::Entity) -> EntityDescription;
}

/// Outbound event sink. Delivery is at-most-once with no acknowledgement.
pub trait Notifier: Send + Sync {
    fn emit(&self, notification: Notification);

    /// Unicast scoped to the sending instance; dropped if the player's socket moved elsewhere.
    fn notify_player(&self, instance_id: &str, player_id: &str, message: OutboundMessage) {
        self.emit(Notification::player(instance_id, player_id, message));
    }

    fn notify_all_players_in_instance(&self, instance_id: &str, message: OutboundMessage) {
        self.emit(Notification::each_player(instance_id, message));
    }
}

// Port for retrieving the current time.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}
