use crate::interface_adapters::dispatch::SocketSessions;
use crate::use_cases::GameplayRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    // Owns every running gameplay instance.
    pub registry: Arc<GameplayRegistry>,
    // Connected player sockets used by the notification dispatcher.
    pub sessions: Arc<SocketSessions>,
}
