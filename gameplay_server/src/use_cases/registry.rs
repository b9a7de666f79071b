// Registry orchestration for spawning, seating players in, sweeping and administering
// gameplay instances.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{RwLock, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::engine::{ArenaEngine, ArenaTuning};
use crate::domain::ports::GameMode;
use crate::domain::{EngineError, EntityDescription, GameplayType, Spawn};
use crate::use_cases::instance::{GameplayInstance, InstanceContext, WorldStateTimer, instance_task};
use crate::use_cases::modes::{BattleTestMode, IslandTestMode, StandardMode};
use crate::use_cases::types::{InstanceCommand, PendingJoin, PlayerEvent};

/// Shared configuration for spawning instances.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Capacity for inbound commands per instance.
    pub command_channel_capacity: usize,
    /// Player cap used when picking an open ordinary instance.
    pub max_players_per_instance: usize,
    /// Simulation tuning for each instance's arena engine.
    pub arena: ArenaTuning,
    /// Spawn point for instances created without explicit coordinates.
    pub default_spawn: Spawn,
}

/// Errors returned by registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Reserved instance already exists and cannot be re-created.
    #[error("instance already exists")]
    AlreadyExists,
    #[error("instance not found")]
    NotFound,
    /// The instance task has stopped accepting commands.
    #[error("instance closed")]
    Closed,
    /// Reserved instances live as long as the process.
    #[error("reserved instance cannot be removed")]
    Pinned,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Cloneable access to a running instance task.
#[derive(Clone)]
pub struct InstanceHandle {
    /// Identifier clients use to target this instance.
    pub instance_id: Arc<str>,
    pub gameplay_type: GameplayType,
    /// Sender for commands into the instance task.
    commands_tx: mpsc::Sender<InstanceCommand>,
    /// Live player count published by the instance task.
    players_rx: watch::Receiver<usize>,
    /// Seats promised to connections whose join has not been handled yet.
    pending_joins: Arc<AtomicUsize>,
}

impl InstanceHandle {
    /// Forwards a player event to the instance task.
    pub async fn send(&self, event: PlayerEvent) -> Result<(), RegistryError> {
        self.commands_tx
            .send(InstanceCommand::Player(event))
            .await
            .map_err(|_| RegistryError::Closed)
    }

    pub fn players_count(&self) -> usize {
        *self.players_rx.borrow()
    }

    pub fn pending_joins(&self) -> usize {
        self.pending_joins.load(Ordering::SeqCst)
    }

    /// Spawns a bot in the instance, at `at` or at the instance spawn point.
    pub async fn add_bot(
        &self,
        at: Option<Spawn>,
    ) -> Result<Option<EntityDescription>, RegistryError> {
        let (reply, reply_rx) = oneshot::channel();
        self.commands_tx
            .send(InstanceCommand::AddBot { at, reply })
            .await
            .map_err(|_| RegistryError::Closed)?;
        Ok(reply_rx.await.map_err(|_| RegistryError::Closed)??)
    }

    /// Removes every bot from the instance. Returns how many were removed.
    pub async fn kill_bots(&self) -> Result<usize, RegistryError> {
        let (reply, reply_rx) = oneshot::channel();
        self.commands_tx
            .send(InstanceCommand::KillBots { reply })
            .await
            .map_err(|_| RegistryError::Closed)?;
        Ok(reply_rx.await.map_err(|_| RegistryError::Closed)??)
    }

    // Players plus seats promised to connections still joining.
    fn occupancy(&self) -> usize {
        self.players_count() + self.pending_joins()
    }

    fn reserve(&self) -> JoinSlot {
        JoinSlot {
            instance: self.clone(),
            reservation: PendingJoin::new(self.pending_joins.clone()),
        }
    }

    /// Asks the instance to expire itself if idle. A stopped task counts as expired.
    async fn poll_idle(&self) -> bool {
        let (reply, reply_rx) = oneshot::channel();
        if self
            .commands_tx
            .send(InstanceCommand::DestroyIfIdle { reply })
            .await
            .is_err()
        {
            return true;
        }
        reply_rx.await.unwrap_or(true)
    }
}

/// A seat held in an instance from lookup until the player's join has been handled.
///
/// While held, the seat counts against capacity and the instance is not swept.
/// Dropping an unused slot gives the seat back.
pub struct JoinSlot {
    instance: InstanceHandle,
    reservation: PendingJoin,
}

impl JoinSlot {
    pub fn instance(&self) -> &InstanceHandle {
        &self.instance
    }

    /// Queues the join; the instance releases the seat once it has handled it.
    pub async fn join(
        self,
        player_id: &str,
        entity_id: &str,
    ) -> Result<InstanceHandle, RegistryError> {
        let JoinSlot {
            instance,
            reservation,
        } = self;
        instance
            .commands_tx
            .send(InstanceCommand::Join {
                player_id: player_id.to_string(),
                entity_id: entity_id.to_string(),
                reservation,
            })
            .await
            .map_err(|_| RegistryError::Closed)?;
        Ok(instance)
    }
}

/// Thread-safe registry for active instances.
pub struct GameplayRegistry {
    /// Global settings applied to newly created instances.
    settings: RegistrySettings,
    /// Collaborators handed to every instance.
    context: InstanceContext,
    /// Map of instance id to active handle.
    instances: RwLock<HashMap<String, InstanceHandle>>,
}

impl GameplayRegistry {
    pub fn new(settings: RegistrySettings, context: InstanceContext) -> Self {
        Self {
            settings,
            context,
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Creates an instance and spawns its task. Reserved variants may exist only once.
    pub async fn create_instance(
        &self,
        gameplay_type: GameplayType,
        spawn: Spawn,
    ) -> Result<InstanceHandle, RegistryError> {
        let mut instances = self.instances.write().await;
        self.spawn_instance(&mut instances, gameplay_type, spawn)
    }

    /// Creates an ordinary instance populated with `bots` bots.
    ///
    /// Bots are not players: the instance still expires if nobody joins in time.
    pub async fn create_instance_with_bots(
        &self,
        bots: usize,
    ) -> Result<(InstanceHandle, Vec<EntityDescription>), RegistryError> {
        let handle = self
            .create_instance(GameplayType::Default, self.settings.default_spawn)
            .await?;

        let mut spawned = Vec::with_capacity(bots);
        for _ in 0..bots {
            match handle.add_bot(None).await? {
                Some(bot) => spawned.push(bot),
                None => {
                    debug!(instance_id = %handle.instance_id, "arena full; remaining bots skipped");
                    break;
                }
            }
        }
        Ok((handle, spawned))
    }

    /// Returns an instance handle for the provided id, if it exists.
    pub async fn get_instance(&self, instance_id: &str) -> Option<InstanceHandle> {
        let instances = self.instances.read().await;
        instances.get(instance_id).cloned()
    }

    /// Returns the running instance of a reserved variant.
    pub async fn reserved_instance(&self, gameplay_type: GameplayType) -> Option<InstanceHandle> {
        let instance_id = self.context.reserved_ids.for_type(gameplay_type)?;
        self.get_instance(&instance_id).await
    }

    /// Holds a seat in a specific instance for a connecting player.
    pub async fn reserve_seat(&self, instance_id: &str) -> Result<JoinSlot, RegistryError> {
        let instances = self.instances.read().await;
        instances
            .get(instance_id)
            .map(InstanceHandle::reserve)
            .ok_or(RegistryError::NotFound)
    }

    /// Holds a seat in the fullest ordinary instance that still has room, or in a new one.
    pub async fn find_or_create_open_instance(&self) -> Result<JoinSlot, RegistryError> {
        let mut instances = self.instances.write().await;
        let open = instances
            .values()
            .filter(|handle| handle.gameplay_type == GameplayType::Default)
            .filter(|handle| handle.occupancy() < self.settings.max_players_per_instance)
            .max_by_key(|handle| handle.occupancy())
            .map(InstanceHandle::reserve);

        match open {
            Some(slot) => Ok(slot),
            None => {
                let spawn = self.settings.default_spawn;
                let handle = self.spawn_instance(&mut instances, GameplayType::Default, spawn)?;
                Ok(handle.reserve())
            }
        }
    }

    /// Drops an ordinary instance from the registry and asks its task to tear down.
    pub async fn remove_instance(&self, instance_id: &str) -> Result<(), RegistryError> {
        let mut instances = self.instances.write().await;
        let handle = instances.get(instance_id).ok_or(RegistryError::NotFound)?;
        if handle.gameplay_type.is_reserved() {
            return Err(RegistryError::Pinned);
        }

        if let Some(handle) = instances.remove(instance_id) {
            // The task may already be gone; teardown is best-effort.
            let _ = handle.commands_tx.send(InstanceCommand::Destroy).await;
            info!(instance_id, "instance removed");
        }
        Ok(())
    }

    /// Snapshot of every running instance.
    pub async fn instances(&self) -> Vec<InstanceHandle> {
        self.instances.read().await.values().cloned().collect()
    }

    /// Polls every instance for idle expiry and forgets the ones that destroyed themselves.
    ///
    /// Holds the registry for the whole pass so no seat can be handed out in an
    /// instance that is about to expire; instances with seats held are skipped.
    pub async fn sweep_idle_instances(&self) -> Vec<String> {
        let mut instances = self.instances.write().await;

        let polls = instances
            .values()
            .filter(|handle| handle.pending_joins() == 0)
            .map(|handle| async move {
                let expired = handle.poll_idle().await;
                (handle.instance_id.clone(), expired)
            });
        let expired: Vec<String> = futures::future::join_all(polls)
            .await
            .into_iter()
            .filter(|(_, expired)| *expired)
            .map(|(instance_id, _)| instance_id.to_string())
            .collect();

        for instance_id in &expired {
            instances.remove(instance_id);
            info!(instance_id = %instance_id, "idle instance expired");
        }
        expired
    }

    /// Spawns the periodic idle sweep over all instances.
    pub fn spawn_idle_sweeper(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let expired = self.sweep_idle_instances().await;
                if !expired.is_empty() {
                    debug!(count = expired.len(), "idle sweep finished");
                }
            }
        })
    }

    fn spawn_instance(
        &self,
        instances: &mut HashMap<String, InstanceHandle>,
        gameplay_type: GameplayType,
        spawn: Spawn,
    ) -> Result<InstanceHandle, RegistryError> {
        if let Some(reserved_id) = self.context.reserved_ids.for_type(gameplay_type) {
            if instances.contains_key(&*reserved_id) {
                return Err(RegistryError::AlreadyExists);
            }
        }

        let engine = ArenaEngine::start(self.settings.arena, spawn);
        let handle = match gameplay_type {
            GameplayType::Default => self.start_instance_task(gameplay_type, engine, StandardMode, spawn),
            GameplayType::BattleTest => {
                self.start_instance_task(gameplay_type, engine, BattleTestMode { spawn }, spawn)
            }
            GameplayType::IslandTest => {
                self.start_instance_task(gameplay_type, engine, IslandTestMode { spawn }, spawn)
            }
        };

        instances.insert(handle.instance_id.to_string(), handle.clone());
        info!(
            instance_id = %handle.instance_id,
            gameplay_type = %gameplay_type,
            "instance created"
        );
        Ok(handle)
    }

    fn start_instance_task<M: GameMode<ArenaEngine>>(
        &self,
        gameplay_type: GameplayType,
        engine: ArenaEngine,
        mode: M,
        spawn: Spawn,
    ) -> InstanceHandle {
        // Channel wiring for the instance task; the timer feeds the same queue.
        let (commands_tx, commands_rx) =
            mpsc::channel::<InstanceCommand>(self.settings.command_channel_capacity);
        let (players_tx, players_rx) = watch::channel(0usize);
        let timer = WorldStateTimer::spawn(self.context.world_state_interval, commands_tx.clone());

        let instance = GameplayInstance::new(&self.context, gameplay_type, engine, mode, spawn, timer);
        let instance_id = instance.instance_id().clone();

        tokio::spawn(instance_task(instance, commands_rx, players_tx));

        InstanceHandle {
            instance_id,
            gameplay_type,
            commands_tx,
            players_rx,
            pending_joins: Arc::new(AtomicUsize::new(0)),
        }
    }
}
