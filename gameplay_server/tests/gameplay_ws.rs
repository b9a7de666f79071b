mod support;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

async fn connect(query: &str) -> Client {
    let (socket, _) = connect_async(support::ws_url(query))
        .await
        .expect("websocket upgrade should succeed");
    socket
}

async fn send_json(socket: &mut Client, value: Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .expect("send should succeed");
}

async fn join(socket: &mut Client, player_id: &str, entity_id: &str) -> Value {
    send_json(
        socket,
        json!({ "type": "JoinGame", "data": { "playerId": player_id, "entityId": entity_id } }),
    )
    .await;
    next_of_type(socket, "GameInit").await
}

// Skips periodic world-state syncs and anything else until the wanted message type arrives.
async fn next_of_type(socket: &mut Client, message_type: &str) -> Value {
    tokio::time::timeout(READ_TIMEOUT, async {
        loop {
            let message = socket
                .next()
                .await
                .expect("socket should stay open")
                .expect("frame should be valid");
            if !message.is_text() {
                continue;
            }
            let value: Value = serde_json::from_str(message.to_text().expect("text frame"))
                .expect("server should send json");
            if value["type"] == message_type {
                return value;
            }
        }
    })
    .await
    .expect("message should arrive in time")
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

fn entity_ids(message: &Value) -> Vec<String> {
    message["data"]["entities"]
        .as_array()
        .expect("entities should be an array")
        .iter()
        .filter_map(|entity| entity["id"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn when_client_joins_battle_test_then_game_init_describes_instance() {
    let player_id = unique("player");
    let entity_id = unique("entity");
    let mut socket = connect("?gameplay=battle_test").await;

    let init = join(&mut socket, &player_id, &entity_id).await;

    assert_eq!(init["data"]["instanceId"], "battle-test");
    assert_eq!(init["data"]["tickRate"], 30);
    assert_eq!(init["data"]["worldStateSyncInterval"], 2000);
    let own = init["data"]["entities"]
        .as_array()
        .expect("entities should be an array")
        .iter()
        .find(|entity| entity["id"] == entity_id.as_str())
        .expect("joined entity should be listed");
    assert_eq!(own["playerId"], player_id.as_str());
    assert_eq!(own["kind"], "Ship");
}

#[tokio::test]
async fn when_client_requests_sync_then_snapshot_contains_its_entity() {
    let player_id = unique("player");
    let entity_id = unique("entity");
    let mut socket = connect("?gameplay=island_test").await;
    join(&mut socket, &player_id, &entity_id).await;

    send_json(
        &mut socket,
        json!({ "type": "Sync", "data": { "playerId": player_id } }),
    )
    .await;
    let sync = next_of_type(&mut socket, "Sync").await;

    assert!(entity_ids(&sync).contains(&entity_id));
}

#[tokio::test]
async fn when_client_leaves_then_remaining_players_receive_remove_entity() {
    let stayer_entity = unique("entity");
    let leaver_entity = unique("entity");
    let mut stayer = connect("?gameplay=battle_test").await;
    join(&mut stayer, &unique("player"), &stayer_entity).await;
    let mut leaver = connect("?gameplay=battle_test").await;
    join(&mut leaver, &unique("player"), &leaver_entity).await;

    leaver.close(None).await.expect("close should succeed");

    // Other tests share the battle instance, so wait for this leaver specifically.
    let removed = tokio::time::timeout(READ_TIMEOUT, async {
        loop {
            let message = next_of_type(&mut stayer, "RemoveEntity").await;
            if message["data"]["entityId"] == leaver_entity.as_str() {
                return message;
            }
        }
    })
    .await
    .expect("remove should arrive in time");
    assert_eq!(removed["data"]["entityId"], leaver_entity.as_str());
}

#[tokio::test]
async fn when_default_gameplay_is_requested_then_an_ordinary_instance_is_joined() {
    let mut socket = connect("").await;

    let init = join(&mut socket, &unique("player"), &unique("entity")).await;

    let instance_id = init["data"]["instanceId"]
        .as_str()
        .expect("instance id should be a string");
    assert_ne!(instance_id, "battle-test");
    assert_ne!(instance_id, "island-test");
}

#[tokio::test]
async fn when_instance_id_is_unknown_then_upgrade_is_rejected_with_not_found() {
    let result = connect_async(support::ws_url("?instance_id=does-not-exist")).await;

    match result {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 404);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("upgrade should be rejected"),
    }
}
