// Framework bootstrap for the gameplay server runtime.

use crate::domain::engine::ArenaTuning;
use crate::domain::ports::SystemClock;
use crate::domain::{GameplayType, Spawn};
use crate::frameworks::config;
use crate::interface_adapters::dispatch::{ChannelNotifier, SocketSessions, notification_dispatcher};
use crate::interface_adapters::net::{
    add_bot_handler, create_instance_handler, kill_bots_handler, list_instances_handler,
    remove_instance_handler, ws_handler,
};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{GameplayRegistry, InstanceContext, RegistrySettings};

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    // build state
    let state = build_state().await?;
    // Start the Web Server
    let app = Router::new()
        .route("/ws", get(ws_handler))
        // Instance administration routes.
        .route(
            "/instances",
            get(list_instances_handler).post(create_instance_handler),
        )
        .route("/instances/bots", post(add_bot_handler))
        .route("/instances/{instance_id}", delete(remove_instance_handler))
        .route("/instances/{instance_id}/bots", delete(kill_bots_handler))
        .with_state(state);

    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    })
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

async fn build_state() -> Result<Arc<AppState>> {
    // Instances emit notifications; the dispatcher task fans them out to sockets.
    let sessions = Arc::new(SocketSessions::default());
    let (notifier, notifications_rx) = ChannelNotifier::new();
    tokio::spawn(notification_dispatcher(notifications_rx, sessions.clone()));

    let context = InstanceContext {
        notifier: Arc::new(notifier),
        clock: Arc::new(SystemClock),
        reserved_ids: config::reserved_instance_ids(),
        world_state_interval: config::WORLD_STATE_UPDATE_INTERVAL,
    };
    let max_players_per_instance = config::max_players_per_instance();
    let registry = Arc::new(GameplayRegistry::new(
        RegistrySettings {
            command_channel_capacity: config::COMMAND_CHANNEL_CAPACITY,
            max_players_per_instance,
            arena: ArenaTuning {
                tick_rate: config::ENGINE_TICK_RATE,
                ..ArenaTuning::default()
            },
            default_spawn: Spawn::default(),
        },
        context,
    ));

    // Reserved test instances are pinned for the lifetime of the process.
    for gameplay_type in [GameplayType::BattleTest, GameplayType::IslandTest] {
        let instance = registry
            .create_instance(gameplay_type, Spawn::default())
            .await
            .map_err(|e| {
                std::io::Error::other(format!("failed to create {gameplay_type} instance: {e}"))
            })?;
        tracing::debug!(instance_id = %instance.instance_id, "reserved instance ready");
    }

    let idle_sweep_interval = config::idle_sweep_interval();
    registry.clone().spawn_idle_sweeper(idle_sweep_interval);
    tracing::debug!(
        max_players_per_instance,
        idle_sweep_interval_ms = idle_sweep_interval.as_millis(),
        "gameplay registry configured"
    );

    Ok(Arc::new(AppState { registry, sessions }))
}
