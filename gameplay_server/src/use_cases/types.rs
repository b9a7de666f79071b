// Use-case level inputs for gameplay instance tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::{EngineError, EntityDescription, PlayerInputType, Spawn};
use tokio::sync::oneshot;

/// Inbound player events routed to an instance by the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Joined {
        player_id: String,
        entity_id: String,
    },
    Disconnected {
        player_id: String,
    },
    Input {
        player_id: String,
        index: u64,
        input_type: PlayerInputType,
    },
    Sync {
        player_id: String,
    },
}

/// A join that has been promised a seat but not yet handled by the instance.
///
/// Counts against the instance's capacity and keeps it from idle expiry until dropped.
#[derive(Debug)]
pub struct PendingJoin {
    pending: Arc<AtomicUsize>,
}

impl PendingJoin {
    pub(crate) fn new(pending: Arc<AtomicUsize>) -> Self {
        pending.fetch_add(1, Ordering::SeqCst);
        Self { pending }
    }
}

impl Drop for PendingJoin {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Everything an instance task reacts to, serialized through one channel.
#[derive(Debug)]
pub enum InstanceCommand {
    Player(PlayerEvent),
    /// Join carrying its seat reservation; released once the join is handled.
    Join {
        player_id: String,
        entity_id: String,
        reservation: PendingJoin,
    },
    /// Periodic world-state broadcast fired by the instance timer.
    WorldStateTick,
    /// Idle-expiry poll; replies whether the instance destroyed itself.
    DestroyIfIdle { reply: oneshot::Sender<bool> },
    AddBot {
        at: Option<Spawn>,
        reply: oneshot::Sender<Result<Option<EntityDescription>, EngineError>>,
    },
    /// Removes every bot; replies with how many were removed.
    KillBots {
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
    Destroy,
}
