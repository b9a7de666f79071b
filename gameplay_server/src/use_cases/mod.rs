// Use cases layer: gameplay sessions, game modes and the instance registry.

pub mod instance;
pub mod modes;
pub mod registry;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use instance::{GameplayInstance, InstanceContext, WorldStateTimer, instance_task};
pub use modes::{BattleTestMode, IslandTestMode, StandardMode};
pub use registry::{GameplayRegistry, InstanceHandle, JoinSlot, RegistryError, RegistrySettings};
pub use types::{InstanceCommand, PendingJoin, PlayerEvent};
