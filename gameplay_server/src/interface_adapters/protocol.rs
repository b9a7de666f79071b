// Wire protocol DTOs and conversions for the realtime gameplay channel.

use crate::domain::{EntityDescription, EntityKind, OutboundMessage, PlayerInputType};
use crate::use_cases::PlayerEvent;
use serde::{Deserialize, Serialize};

/// Messages the client sends to the server over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    // Requests an entity in the connection's instance.
    JoinGame(JoinGamePayload),
    // Sequenced control input for the player's entity.
    Input(InputPayload),
    // Requests a full entity snapshot.
    Sync(SyncPayload),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGamePayload {
    pub player_id: String,
    pub entity_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputPayload {
    pub player_id: String,
    pub index: u64,
    pub player_input_type: PlayerInputTypeDto,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    pub player_id: String,
}

impl ClientMessage {
    pub fn player_id(&self) -> &str {
        match self {
            ClientMessage::JoinGame(payload) => &payload.player_id,
            ClientMessage::Input(payload) => &payload.player_id,
            ClientMessage::Sync(payload) => &payload.player_id,
        }
    }
}

impl From<ClientMessage> for PlayerEvent {
    fn from(message: ClientMessage) -> Self {
        match message {
            ClientMessage::JoinGame(payload) => PlayerEvent::Joined {
                player_id: payload.player_id,
                entity_id: payload.entity_id,
            },
            ClientMessage::Input(payload) => PlayerEvent::Input {
                player_id: payload.player_id,
                index: payload.index,
                input_type: payload.player_input_type.into(),
            },
            ClientMessage::Sync(payload) => PlayerEvent::Sync {
                player_id: payload.player_id,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerInputTypeDto {
    Forward,
    Backward,
    Left,
    Right,
    Shoot,
}

impl From<PlayerInputTypeDto> for PlayerInputType {
    fn from(input: PlayerInputTypeDto) -> Self {
        match input {
            PlayerInputTypeDto::Forward => PlayerInputType::Forward,
            PlayerInputTypeDto::Backward => PlayerInputType::Backward,
            PlayerInputTypeDto::Left => PlayerInputType::Left,
            PlayerInputTypeDto::Right => PlayerInputType::Right,
            PlayerInputTypeDto::Shoot => PlayerInputType::Shoot,
        }
    }
}

impl From<PlayerInputType> for PlayerInputTypeDto {
    fn from(input: PlayerInputType) -> Self {
        match input {
            PlayerInputType::Forward => PlayerInputTypeDto::Forward,
            PlayerInputType::Backward => PlayerInputTypeDto::Backward,
            PlayerInputType::Left => PlayerInputTypeDto::Left,
            PlayerInputType::Right => PlayerInputTypeDto::Right,
            PlayerInputType::Shoot => PlayerInputTypeDto::Shoot,
        }
    }
}

/// Messages the server sends to connected clients over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    // Join acknowledgement with the instance configuration and current entities.
    GameInit(GameInitDto),
    // An entity left the instance.
    RemoveEntity(RemoveEntityDto),
    // Another player's input, echoed for client-side prediction.
    EntityInput(EntityInputDto),
    // Full entity snapshot (on request and on the world-state timer).
    Sync(SyncDto),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInitDto {
    pub instance_id: String,
    pub tick_rate: u32,
    /// Milliseconds between world-state broadcasts.
    pub world_state_sync_interval: u64,
    pub entities: Vec<EntityDto>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveEntityDto {
    pub entity_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityInputDto {
    pub entity_id: String,
    pub player_input_type: PlayerInputTypeDto,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncDto {
    pub entities: Vec<EntityDto>,
}

/// Flattened entity state for wire transmission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDto {
    pub id: String,
    pub player_id: String,
    pub kind: EntityKindDto,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub enum EntityKindDto {
    Ship,
    Scout,
}

impl From<EntityKind> for EntityKindDto {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Ship => EntityKindDto::Ship,
            EntityKind::Scout => EntityKindDto::Scout,
        }
    }
}

impl From<&EntityDescription> for EntityDto {
    fn from(entity: &EntityDescription) -> Self {
        Self {
            id: entity.id.clone(),
            player_id: entity.player_id.clone(),
            kind: entity.kind.into(),
            x: entity.x,
            y: entity.y,
            rotation: entity.rotation,
        }
    }
}

fn entity_dtos(entities: &[EntityDescription]) -> Vec<EntityDto> {
    entities.iter().map(EntityDto::from).collect()
}

impl From<&OutboundMessage> for ServerMessage {
    fn from(message: &OutboundMessage) -> Self {
        match message {
            OutboundMessage::GameInit {
                instance_id,
                tick_rate,
                world_state_sync_interval_ms,
                entities,
            } => ServerMessage::GameInit(GameInitDto {
                instance_id: instance_id.clone(),
                tick_rate: *tick_rate,
                world_state_sync_interval: *world_state_sync_interval_ms,
                entities: entity_dtos(entities),
            }),
            OutboundMessage::RemoveEntity { entity_id } => {
                ServerMessage::RemoveEntity(RemoveEntityDto {
                    entity_id: entity_id.clone(),
                })
            }
            OutboundMessage::EntityInput {
                entity_id,
                input_type,
            } => ServerMessage::EntityInput(EntityInputDto {
                entity_id: entity_id.clone(),
                player_input_type: (*input_type).into(),
            }),
            OutboundMessage::Sync { entities } => ServerMessage::Sync(SyncDto {
                entities: entity_dtos(entities),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn when_input_json_uses_camel_case_then_it_parses_into_player_event() {
        let raw = json!({
            "type": "Input",
            "data": { "playerId": "p1", "index": 3, "playerInputType": "Left" }
        });

        let message: ClientMessage =
            serde_json::from_value(raw).expect("input message should parse");

        assert_eq!(message.player_id(), "p1");
        assert_eq!(
            PlayerEvent::from(message),
            PlayerEvent::Input {
                player_id: "p1".to_string(),
                index: 3,
                input_type: PlayerInputType::Left,
            }
        );
    }

    #[test]
    fn when_join_payload_misses_entity_id_then_parse_fails() {
        let raw = json!({ "type": "JoinGame", "data": { "playerId": "p1" } });

        assert!(serde_json::from_value::<ClientMessage>(raw).is_err());
    }

    #[test]
    fn when_game_init_is_serialized_then_field_names_match_wire_contract() {
        let message = OutboundMessage::GameInit {
            instance_id: "battle-test".to_string(),
            tick_rate: 30,
            world_state_sync_interval_ms: 2_000,
            entities: vec![EntityDescription {
                id: "e1".to_string(),
                player_id: "p1".to_string(),
                kind: EntityKind::Ship,
                x: 1.0,
                y: 2.0,
                rotation: 0.5,
            }],
        };

        let value = serde_json::to_value(ServerMessage::from(&message))
            .expect("game init should serialize");

        assert_eq!(
            value,
            json!({
                "type": "GameInit",
                "data": {
                    "instanceId": "battle-test",
                    "tickRate": 30,
                    "worldStateSyncInterval": 2000,
                    "entities": [{
                        "id": "e1",
                        "playerId": "p1",
                        "kind": "Ship",
                        "x": 1.0,
                        "y": 2.0,
                        "rotation": 0.5
                    }]
                }
            })
        );
    }

    #[test]
    fn when_entity_input_is_serialized_then_it_carries_entity_and_input_type() {
        let message = OutboundMessage::EntityInput {
            entity_id: "e1".to_string(),
            input_type: PlayerInputType::Shoot,
        };

        let value = serde_json::to_value(ServerMessage::from(&message))
            .expect("entity input should serialize");

        assert_eq!(
            value,
            json!({
                "type": "EntityInput",
                "data": { "entityId": "e1", "playerInputType": "Shoot" }
            })
        );
    }
}
