// Domain layer: session types, engine capability ports and the arena simulation.

pub mod engine;
pub mod errors;
pub mod messages;
pub mod ports;
pub mod state;

pub use errors::EngineError;
pub use messages::{Notification, OutboundMessage, SocketEvent};
pub use state::{
    EntityDescription, EntityKind, GameplayType, InputCommand, PlayerInputType,
    ReservedInstanceIds, Spawn,
};
