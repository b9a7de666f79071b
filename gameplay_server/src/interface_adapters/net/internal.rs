use crate::domain::{GameplayType, Spawn};
use crate::frameworks::config;
use crate::interface_adapters::http::{error_response, registry_error_response};
use crate::interface_adapters::protocol::EntityDto;
use crate::interface_adapters::state::AppState;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, serde::Deserialize)]
pub struct CreateInstanceRequest {
    // Bots spawned into the new instance right away.
    #[serde(default)]
    bots: usize,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateInstanceResponse {
    instance_id: String,
    bots: Vec<EntityDto>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBotRequest {
    x: Option<f32>,
    y: Option<f32>,
    // Falls back to the reserved battle-test instance.
    instance_id: Option<String>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct AddBotResponse {
    instance_id: String,
    entity: EntityDto,
}

#[derive(Debug, serde::Serialize)]
struct KillBotsResponse {
    removed: usize,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct InstanceSummary {
    instance_id: String,
    gameplay_type: String,
    players: usize,
}

pub async fn list_instances_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut summaries: Vec<InstanceSummary> = state
        .registry
        .instances()
        .await
        .into_iter()
        .map(|handle| InstanceSummary {
            instance_id: handle.instance_id.to_string(),
            gameplay_type: handle.gameplay_type.to_string(),
            players: handle.players_count(),
        })
        .collect();
    summaries.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
    Json(summaries)
}

pub async fn create_instance_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateInstanceRequest>,
) -> Response {
    if payload.bots > config::MAX_BOTS_PER_REQUEST {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("bots must be at most {}", config::MAX_BOTS_PER_REQUEST),
        );
    }

    // Created instances are ordinary and expire if nobody joins in time.
    match state.registry.create_instance_with_bots(payload.bots).await {
        Ok((instance, bots)) => {
            info!(instance_id = %instance.instance_id, bots = bots.len(), "instance created");
            (
                StatusCode::CREATED,
                Json(CreateInstanceResponse {
                    instance_id: instance.instance_id.to_string(),
                    bots: bots.iter().map(EntityDto::from).collect(),
                }),
            )
                .into_response()
        }
        Err(e) => registry_error_response(&e),
    }
}

pub async fn remove_instance_handler(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
) -> Response {
    match state.registry.remove_instance(&instance_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => registry_error_response(&e),
    }
}

pub async fn add_bot_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddBotRequest>,
) -> Response {
    let instance = match payload.instance_id.as_deref().map(str::trim) {
        Some("") => return error_response(StatusCode::BAD_REQUEST, "instanceId must not be empty"),
        Some(instance_id) => state.registry.get_instance(instance_id).await,
        None => state.registry.reserved_instance(GameplayType::BattleTest).await,
    };
    let Some(instance) = instance else {
        return error_response(StatusCode::NOT_FOUND, "instance not found");
    };

    // Without coordinates the bot uses the instance spawn; a missing axis is 0.
    let at = match (payload.x, payload.y) {
        (None, None) => None,
        (x, y) => Some(Spawn {
            x: x.unwrap_or_default(),
            y: y.unwrap_or_default(),
        }),
    };

    match instance.add_bot(at).await {
        Ok(Some(bot)) => (
            StatusCode::CREATED,
            Json(AddBotResponse {
                instance_id: instance.instance_id.to_string(),
                entity: EntityDto::from(&bot),
            }),
        )
            .into_response(),
        Ok(None) => error_response(StatusCode::CONFLICT, "arena is full"),
        Err(e) => registry_error_response(&e),
    }
}

pub async fn kill_bots_handler(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
) -> Response {
    let Some(instance) = state.registry.get_instance(&instance_id).await else {
        return error_response(StatusCode::NOT_FOUND, "instance not found");
    };

    match instance.kill_bots().await {
        Ok(removed) => (StatusCode::OK, Json(KillBotsResponse { removed })).into_response(),
        Err(e) => registry_error_response(&e),
    }
}
