use crate::domain::GameplayType;
use crate::interface_adapters::dispatch::SocketSessions;
use crate::interface_adapters::http::registry_error_response;
use crate::interface_adapters::protocol::ClientMessage;
use crate::interface_adapters::state::AppState;
use crate::use_cases::{InstanceHandle, JoinSlot, PlayerEvent, RegistryError};

use axum::{
    Error,
    extract::{
        Query, State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::SinkExt;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{Notify, mpsc};
use tokio::time::timeout;
use tracing::{Instrument, debug, info, info_span, warn};

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
const MAX_ID_LEN: usize = 128;
const JOIN_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    InstanceClosed,
    JoinRequired,
    ClosedBeforeJoin,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

#[derive(Debug, Default, Clone, Copy, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameplayQuery {
    #[default]
    Default,
    BattleTest,
    IslandTest,
}

impl From<GameplayQuery> for GameplayType {
    fn from(query: GameplayQuery) -> Self {
        match query {
            GameplayQuery::Default => GameplayType::Default,
            GameplayQuery::BattleTest => GameplayType::BattleTest,
            GameplayQuery::IslandTest => GameplayType::IslandTest,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct InstanceQuery {
    // Explicit instance to join; takes precedence over `gameplay`.
    #[serde(default)]
    instance_id: Option<String>,
    // Session kind to join when no instance id is given.
    #[serde(default)]
    gameplay: Option<GameplayQuery>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<InstanceQuery>,
) -> impl IntoResponse {
    // The seat is held from here until the join is handled, or released if the upgrade is dropped.
    let slot = match reserve_seat(&state, query).await {
        Ok(slot) => slot,
        // Keep lookup failures consistent with the JSON error schema.
        Err(e) => return registry_error_response(&e),
    };

    let sessions = state.sessions.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, slot, sessions))
}

async fn reserve_seat(state: &AppState, query: InstanceQuery) -> Result<JoinSlot, RegistryError> {
    if let Some(instance_id) = query.instance_id {
        return state.registry.reserve_seat(instance_id.trim()).await;
    }

    match GameplayType::from(query.gameplay.unwrap_or_default()) {
        GameplayType::Default => state.registry.find_or_create_open_instance().await,
        reserved => {
            let instance = state
                .registry
                .reserved_instance(reserved)
                .await
                .ok_or(RegistryError::NotFound)?;
            state.registry.reserve_seat(&instance.instance_id).await
        }
    }
}

async fn handle_socket(socket: WebSocket, slot: JoinSlot, sessions: Arc<SocketSessions>) {
    // Separate connection id for correlating logs before/after a player_id exists.
    let conn_id = uuid::Uuid::new_v4().to_string();
    let span = info_span!(
        "conn",
        conn_id = %conn_id,
        instance_id = %slot.instance().instance_id,
        player_id = tracing::field::Empty
    );

    serve_connection(socket, slot, sessions, conn_id)
        .instrument(span)
        .await
}

async fn serve_connection(
    mut socket: WebSocket,
    slot: JoinSlot,
    sessions: Arc<SocketSessions>,
    conn_id: String,
) {
    let join = match timeout(JOIN_HANDSHAKE_TIMEOUT, read_join_handshake(&mut socket)).await {
        Ok(Ok(join)) => join,
        Ok(Err(NetError::ClosedBeforeJoin)) => {
            info!("client disconnected before join handshake");
            return;
        }
        Ok(Err(e)) => {
            warn!(error = ?e, "join handshake failed");
            return;
        }
        Err(_) => {
            let _ = send_close_with_reason(&mut socket, close_code::POLICY, "join timeout").await;
            warn!("join handshake timed out");
            return;
        }
    };
    tracing::Span::current().record("player_id", join.player_id.as_str());

    // Register before joining so the GameInit reply has a socket to land on.
    let (outbound_tx, outbound_rx) = mpsc::channel::<Utf8Bytes>(OUTBOUND_CHANNEL_CAPACITY);
    let shutdown = sessions
        .register(
            &join.player_id,
            slot.instance().instance_id.clone(),
            &conn_id,
            outbound_tx,
        )
        .await;

    let instance = match slot.join(&join.player_id, &join.entity_id).await {
        Ok(instance) => instance,
        Err(e) => {
            warn!(error = %e, "instance unavailable during join");
            sessions.unregister_if_owner(&join.player_id, &conn_id).await;
            let _ = send_close_with_reason(&mut socket, close_code::AWAY, "instance unavailable")
                .await;
            return;
        }
    };

    info!(entity_id = %join.entity_id, "client joined");

    let now = Instant::now() - LOG_THROTTLE;
    let mut ctx = ConnCtx {
        player_id: join.player_id,
        conn_id,
        instance,
        sessions,
        shutdown,
        outbound_rx,
        msgs_in: join.msgs_in,
        msgs_out: 0,
        bytes_in: join.bytes_in,
        bytes_out: 0,
        invalid_json: 0,
        last_invalid_input_log: now,
        close_frame: None,
    };

    // Main Client Loop
    if let Err(e) = run_client_loop(&mut socket, &mut ctx).await {
        warn!(error = ?e, "client loop exited with error");
    }

    disconnect_cleanup(&ctx).await;
}

struct ConnCtx {
    pub player_id: String,
    pub conn_id: String,
    // Instance this connection joined.
    pub instance: InstanceHandle,
    // Socket registry, also consulted on cleanup to detect replacement.
    pub sessions: Arc<SocketSessions>,
    // Shutdown signal used to replace stale connections.
    pub shutdown: Arc<Notify>,
    // Serialized notifications queued by the dispatcher.
    pub outbound_rx: mpsc::Receiver<Utf8Bytes>,

    pub msgs_in: u64,
    pub msgs_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,

    pub invalid_json: u32,
    pub last_invalid_input_log: Instant,

    pub close_frame: Option<CloseFrame>,
}

#[derive(Debug)]
struct JoinHandshake {
    player_id: String,
    entity_id: String,
    bytes_in: u64,
    msgs_in: u64,
}

enum LoopControl {
    Continue,
    Disconnect,
}

async fn send_close_with_reason(
    socket: &mut WebSocket,
    code: u16,
    reason: &'static str,
) -> Result<(), NetError> {
    socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await
        .map_err(NetError::Ws)?;
    socket.close().await.map_err(NetError::Ws)
}

fn valid_id(value: &str) -> bool {
    !value.trim().is_empty() && value.len() <= MAX_ID_LEN
}

async fn read_join_handshake(socket: &mut WebSocket) -> Result<JoinHandshake, NetError> {
    loop {
        let Some(incoming) = socket.recv().await else {
            return Err(NetError::ClosedBeforeJoin);
        };

        let message = incoming.map_err(NetError::Ws)?;
        match message {
            Message::Text(text) => {
                let bytes_in = text.len() as u64;
                let payload = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::JoinGame(payload)) => payload,
                    Ok(_) => {
                        let _ = send_close_with_reason(socket, close_code::POLICY, "join required")
                            .await;
                        return Err(NetError::JoinRequired);
                    }
                    Err(_) => {
                        let _ = send_close_with_reason(
                            socket,
                            close_code::POLICY,
                            "invalid join payload",
                        )
                        .await;
                        return Err(NetError::JoinRequired);
                    }
                };

                if !valid_id(&payload.player_id) || !valid_id(&payload.entity_id) {
                    let _ =
                        send_close_with_reason(socket, close_code::POLICY, "invalid join ids")
                            .await;
                    return Err(NetError::JoinRequired);
                }

                return Ok(JoinHandshake {
                    player_id: payload.player_id,
                    entity_id: payload.entity_id,
                    bytes_in,
                    msgs_in: 1,
                });
            }
            Message::Binary(_) => {
                let _ = send_close_with_reason(
                    socket,
                    close_code::UNSUPPORTED,
                    "binary messages not supported",
                )
                .await;
                return Err(NetError::JoinRequired);
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return Err(NetError::ClosedBeforeJoin),
        }
    }
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

async fn run_client_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) -> Result<(), NetError> {
    let mut fatal: Option<NetError> = None;

    loop {
        // disconnect becomes true on error
        let disconnect: bool = tokio::select! {
            // Incoming Message from Client
            incoming = socket.recv() => {
                match handle_incoming_ws(incoming, ctx).await {
                    Ok(LoopControl::Continue) => false,
                    Ok(LoopControl::Disconnect) => true,
                    Err(e) => {
                        fatal = Some(e);
                        true
                    }
                }
            }

            // Outgoing notification queued by the dispatcher
            outbound = ctx.outbound_rx.recv() => {
                match outbound {
                    Some(bytes) => {
                        let bytes_len = bytes.len();
                        match socket.send(Message::Text(bytes)).await {
                            Ok(()) => {
                                ctx.msgs_out += 1;
                                ctx.bytes_out += bytes_len as u64;
                                false
                            }
                            Err(err) => {
                                // Disconnect follows immediately.
                                warn!(error = ?err, "failed to send notification");
                                true
                            }
                        }
                    }
                    // The dispatcher dropped our sender: another connection took over.
                    None => true,
                }
            }

            // Connection replacement signal for duplicate player ids.
            _ = ctx.shutdown.notified() => {
                ctx.close_frame = Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "connection replaced".into(),
                });
                info!("connection replaced by newer session");
                true
            }
        };

        if disconnect {
            if let Some(frame) = ctx.close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn handle_incoming_ws(
    incoming: Option<Result<Message, Error>>,
    ctx: &mut ConnCtx,
) -> Result<LoopControl, NetError> {
    let text = match incoming {
        Some(Ok(Message::Text(text))) => text,
        Some(Ok(Message::Binary(_))) => {
            ctx.close_frame = Some(CloseFrame {
                code: close_code::UNSUPPORTED,
                reason: "binary messages not supported".into(),
            });
            return Ok(LoopControl::Disconnect);
        }
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => return Ok(LoopControl::Continue),
        Some(Ok(Message::Close(_))) => return Ok(LoopControl::Disconnect),
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            return Ok(LoopControl::Disconnect);
        }
        None => {
            info!("websocket closed");
            return Ok(LoopControl::Disconnect);
        }
    };

    ctx.msgs_in += 1;
    ctx.bytes_in += text.len() as u64;

    let message = match serde_json::from_str::<ClientMessage>(&text) {
        Ok(message) => message,
        Err(parse_err) => {
            ctx.invalid_json += 1;
            if should_log(&mut ctx.last_invalid_input_log) {
                warn!(
                    bytes = text.len(),
                    error = %parse_err,
                    "failed to parse client message"
                );
            }

            if ctx.invalid_json > MAX_INVALID_JSON {
                ctx.close_frame = Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "too many invalid messages".into(),
                });
                return Ok(LoopControl::Disconnect);
            }
            return Ok(LoopControl::Continue);
        }
    };

    if let ClientMessage::JoinGame(_) = message {
        // Ignore repeated JoinGame packets after the handshake to keep the session stable.
        if should_log(&mut ctx.last_invalid_input_log) {
            warn!("duplicate join ignored");
        }
        return Ok(LoopControl::Continue);
    }

    // A connection may only act for the player it joined as.
    if message.player_id() != ctx.player_id {
        if should_log(&mut ctx.last_invalid_input_log) {
            warn!(claimed = message.player_id(), "player id mismatch; dropping message");
        }
        return Ok(LoopControl::Continue);
    }

    ctx.instance
        .send(PlayerEvent::from(message))
        .await
        .map_err(|_| NetError::InstanceClosed)?;
    Ok(LoopControl::Continue)
}

async fn disconnect_cleanup(ctx: &ConnCtx) {
    let owned = ctx
        .sessions
        .unregister_if_owner(&ctx.player_id, &ctx.conn_id)
        .await;

    // A replacement on the same instance keeps the entity; it would rejoin as a duplicate.
    let replaced_here = !owned
        && ctx.sessions.instance_of(&ctx.player_id).await.as_deref()
            == Some(&*ctx.instance.instance_id);

    if !replaced_here {
        if let Err(e) = ctx
            .instance
            .send(PlayerEvent::Disconnected {
                player_id: ctx.player_id.clone(),
            })
            .await
        {
            debug!(error = %e, "instance gone before disconnect");
        }
    }

    debug!(
        msgs_in = ctx.msgs_in,
        msgs_out = ctx.msgs_out,
        bytes_in = ctx.bytes_in,
        bytes_out = ctx.bytes_out,
        invalid_json = ctx.invalid_json,
        "connection stats"
    );
    info!("client disconnected");
}
