// Outbound messages produced by gameplay instances and the envelopes that carry them.

use super::state::{EntityDescription, PlayerInputType};

/// Socket event name a message is delivered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketEvent {
    GameInit,
    RemoveEntity,
    EntityInput,
    Sync,
}

impl SocketEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            SocketEvent::GameInit => "GameInit",
            SocketEvent::RemoveEntity => "RemoveEntity",
            SocketEvent::EntityInput => "EntityInput",
            SocketEvent::Sync => "Sync",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    GameInit {
        instance_id: String,
        tick_rate: u32,
        world_state_sync_interval_ms: u64,
        entities: Vec<EntityDescription>,
    },
    RemoveEntity {
        entity_id: String,
    },
    EntityInput {
        entity_id: String,
        input_type: PlayerInputType,
    },
    Sync {
        entities: Vec<EntityDescription>,
    },
}

impl OutboundMessage {
    pub fn socket_event(&self) -> SocketEvent {
        match self {
            OutboundMessage::GameInit { .. } => SocketEvent::GameInit,
            OutboundMessage::RemoveEntity { .. } => SocketEvent::RemoveEntity,
            OutboundMessage::EntityInput { .. } => SocketEvent::EntityInput,
            OutboundMessage::Sync { .. } => SocketEvent::Sync,
        }
    }
}

/// Fire-and-forget delivery request handed to the notification dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Deliver to a single player connected to the source instance.
    Player {
        instance_id: String,
        player_id: String,
        socket_event: SocketEvent,
        message: OutboundMessage,
    },
    /// Deliver to every player connected to an instance.
    EachPlayer {
        instance_id: String,
        socket_event: SocketEvent,
        message: OutboundMessage,
    },
}

impl Notification {
    pub fn player(
        instance_id: impl Into<String>,
        player_id: impl Into<String>,
        message: OutboundMessage,
    ) -> Self {
        Notification::Player {
            instance_id: instance_id.into(),
            player_id: player_id.into(),
            socket_event: message.socket_event(),
            message,
        }
    }

    pub fn each_player(instance_id: impl Into<String>, message: OutboundMessage) -> Self {
        Notification::EachPlayer {
            instance_id: instance_id.into(),
            socket_event: message.socket_event(),
            message,
        }
    }

    pub fn socket_event(&self) -> SocketEvent {
        match self {
            Notification::Player { socket_event, .. } => *socket_event,
            Notification::EachPlayer { socket_event, .. } => *socket_event,
        }
    }
}
