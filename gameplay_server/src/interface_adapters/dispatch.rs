// Notification dispatch: maps players to their live sockets and delivers
// serialized server messages to one player or to every player of an instance.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, RwLock, mpsc};
use tracing::{debug, error, warn};

use crate::domain::Notification;
use crate::domain::ports::Notifier;
use crate::interface_adapters::protocol::ServerMessage;

/// Notifier that hands envelopes to the dispatcher task over a channel.
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn emit(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            debug!("notification dispatcher stopped; dropping notification");
        }
    }
}

struct PlayerSocket {
    instance_id: Arc<str>,
    // Identifies which connection currently owns the player slot.
    conn_id: String,
    outbound_tx: mpsc::Sender<Utf8Bytes>,
    // Signals the owning connection to close when a newer one replaces it.
    shutdown: Arc<Notify>,
}

/// Registry of connected player sockets.
#[derive(Default)]
pub struct SocketSessions {
    sockets: RwLock<HashMap<String, PlayerSocket>>,
}

impl SocketSessions {
    /// Attaches a connection to a player id, replacing (and shutting down) any previous one.
    pub async fn register(
        &self,
        player_id: &str,
        instance_id: Arc<str>,
        conn_id: &str,
        outbound_tx: mpsc::Sender<Utf8Bytes>,
    ) -> Arc<Notify> {
        let shutdown = Arc::new(Notify::new());
        let previous = self.sockets.write().await.insert(
            player_id.to_string(),
            PlayerSocket {
                instance_id,
                conn_id: conn_id.to_string(),
                outbound_tx,
                shutdown: shutdown.clone(),
            },
        );

        if let Some(previous) = previous {
            debug!(player_id, old_conn_id = %previous.conn_id, "replacing player connection");
            previous.shutdown.notify_one();
        }
        shutdown
    }

    /// Detaches the player only if `conn_id` still owns the slot.
    pub async fn unregister_if_owner(&self, player_id: &str, conn_id: &str) -> bool {
        let mut sockets = self.sockets.write().await;
        let owned = sockets
            .get(player_id)
            .is_some_and(|socket| socket.conn_id == conn_id);
        if owned {
            sockets.remove(player_id);
        }
        owned
    }

    /// Instance the player's current connection belongs to, if any.
    pub async fn instance_of(&self, player_id: &str) -> Option<Arc<str>> {
        self.sockets
            .read()
            .await
            .get(player_id)
            .map(|socket| socket.instance_id.clone())
    }

    /// Serializes the message once and queues it on every target socket.
    /// Returns how many sockets accepted it.
    pub async fn deliver(&self, notification: &Notification) -> usize {
        let (message, socket_event) = match notification {
            Notification::Player {
                message,
                socket_event,
                ..
            } => (message, socket_event),
            Notification::EachPlayer {
                message,
                socket_event,
                ..
            } => (message, socket_event),
        };

        let txt = match serde_json::to_string(&ServerMessage::from(message)) {
            Ok(txt) => txt,
            Err(e) => {
                error!(error = ?e, event = socket_event.as_str(), "failed to serialize notification");
                return 0;
            }
        };
        let bytes = Utf8Bytes::from(txt);

        let sockets = self.sockets.read().await;
        match notification {
            Notification::Player {
                instance_id,
                player_id,
                ..
            } => match sockets.get(player_id) {
                Some(socket) if &*socket.instance_id == instance_id.as_str() => {
                    usize::from(queue(player_id, socket, bytes))
                }
                Some(_) => {
                    debug!(
                        player_id,
                        instance_id = %instance_id,
                        event = socket_event.as_str(),
                        "player moved to another instance"
                    );
                    0
                }
                None => {
                    debug!(player_id, event = socket_event.as_str(), "player not connected");
                    0
                }
            },
            Notification::EachPlayer { instance_id, .. } => sockets
                .iter()
                .filter(|(_, socket)| &*socket.instance_id == instance_id.as_str())
                .filter(|(player_id, socket)| queue(player_id, socket, bytes.clone()))
                .count(),
        }
    }
}

fn queue(player_id: &str, socket: &PlayerSocket, bytes: Utf8Bytes) -> bool {
    match socket.outbound_tx.try_send(bytes) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(player_id, "outbound channel full; dropping notification");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(player_id, "outbound channel closed; dropping notification");
            false
        }
    }
}

/// Drains notifications emitted by instances and delivers them to sockets.
pub async fn notification_dispatcher(
    mut notifications_rx: mpsc::UnboundedReceiver<Notification>,
    sessions: Arc<SocketSessions>,
) {
    while let Some(notification) = notifications_rx.recv().await {
        sessions.deliver(&notification).await;
    }
    warn!("notification channel closed; dispatcher exiting");
}
