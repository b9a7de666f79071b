// Gameplay instance: one isolated session with its player/entity maps, world-state
// timer and player-event handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, error, info, info_span, warn};

use crate::domain::ports::{Clock, GameEngine, GameMode, Notifier};
use crate::domain::state::DESTROY_EMPTY_INSTANCE_TIMEOUT_MS;
use crate::domain::{
    EngineError, EntityDescription, GameplayType, InputCommand, OutboundMessage, PlayerInputType,
    ReservedInstanceIds, Spawn,
};
use crate::use_cases::types::{InstanceCommand, PlayerEvent};

/// Collaborators shared by every instance a registry creates.
#[derive(Clone)]
pub struct InstanceContext {
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub reserved_ids: ReservedInstanceIds,
    /// Period of the world-state broadcast.
    pub world_state_interval: Duration,
}

/// Recurring world-state trigger feeding an instance's command channel.
///
/// Cancelled by [`GameplayInstance::destroy`]; cancelling twice is a no-op.
pub struct WorldStateTimer {
    task: Option<JoinHandle<()>>,
}

impl WorldStateTimer {
    /// Spawns the timer on the current runtime. The first tick fires one period from now.
    pub fn spawn(period: Duration, commands: mpsc::Sender<InstanceCommand>) -> Self {
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if commands.send(InstanceCommand::WorldStateTick).await.is_err() {
                    break;
                }
            }
        });
        Self { task: Some(task) }
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Stops the timer. Returns false if it was already cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for WorldStateTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub struct GameplayInstance<E: GameEngine, M: GameMode<E>> {
    instance_id: Arc<str>,
    gameplay_type: GameplayType,
    creation_time: u64,
    spawn: Spawn,
    world_state_sync_interval_ms: u64,

    // Kept in lockstep: (p, e) in one map iff (e, p) in the other.
    player_entity_map: HashMap<String, String>,
    entity_player_map: HashMap<String, String>,

    // Server-driven entities, in creation order.
    bots: Vec<String>,
    bot_input_index: u64,

    world_state_timer: WorldStateTimer,
    engine: E,
    mode: M,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    engine_released: bool,
}

impl<E: GameEngine, M: GameMode<E>> GameplayInstance<E, M> {
    pub fn new(
        context: &InstanceContext,
        gameplay_type: GameplayType,
        engine: E,
        mode: M,
        spawn: Spawn,
        world_state_timer: WorldStateTimer,
    ) -> Self {
        let instance_id = context
            .reserved_ids
            .for_type(gameplay_type)
            .unwrap_or_else(|| Arc::from(uuid::Uuid::new_v4().to_string()));

        Self {
            instance_id,
            gameplay_type,
            creation_time: context.clock.now_millis(),
            spawn,
            world_state_sync_interval_ms: context.world_state_interval.as_millis() as u64,
            player_entity_map: HashMap::new(),
            entity_player_map: HashMap::new(),
            bots: Vec::new(),
            bot_input_index: 0,
            world_state_timer,
            engine,
            mode,
            notifier: context.notifier.clone(),
            clock: context.clock.clone(),
            engine_released: false,
        }
    }

    pub fn instance_id(&self) -> &Arc<str> {
        &self.instance_id
    }

    pub fn gameplay_type(&self) -> GameplayType {
        self.gameplay_type
    }

    pub fn creation_time(&self) -> u64 {
        self.creation_time
    }

    pub fn spawn(&self) -> Spawn {
        self.spawn
    }

    pub fn players_count(&self) -> usize {
        self.player_entity_map.len()
    }

    pub fn entity_of(&self, player_id: &str) -> Option<&str> {
        self.player_entity_map.get(player_id).map(String::as_str)
    }

    pub fn player_of(&self, entity_id: &str) -> Option<&str> {
        self.entity_player_map.get(entity_id).map(String::as_str)
    }

    pub fn bots_count(&self) -> usize {
        self.bots.len()
    }

    pub fn is_world_state_timer_active(&self) -> bool {
        self.world_state_timer.is_active()
    }

    /// Creates the player's engine entity through the mode hook and records the pair.
    ///
    /// A player already in the session, or an entity id already owned, is rejected
    /// without touching the engine.
    pub fn add_player(
        &mut self,
        player_id: &str,
        entity_id: &str,
    ) -> Result<Option<E::Entity>, EngineError> {
        if self.player_entity_map.contains_key(player_id)
            || self.entity_player_map.contains_key(entity_id)
        {
            return Ok(None);
        }

        let Some(entity) = self
            .mode
            .initiate_engine_entity(&mut self.engine, player_id, entity_id)?
        else {
            return Ok(None);
        };

        self.player_entity_map
            .insert(player_id.to_string(), entity_id.to_string());
        self.entity_player_map
            .insert(entity_id.to_string(), player_id.to_string());
        Ok(Some(entity))
    }

    /// Destroys an ordinary instance that has been empty past the idle timeout.
    pub fn destroy_by_time_if_needed(&mut self) -> bool {
        if self.gameplay_type.is_reserved() {
            return false;
        }

        let now = self.clock.now_millis();
        if now >= self.creation_time + DESTROY_EMPTY_INSTANCE_TIMEOUT_MS
            && self.players_count() == 0
        {
            self.destroy();
            return true;
        }
        false
    }

    /// Best-effort teardown. Never fails; safe to call more than once.
    pub fn destroy(&mut self) {
        self.world_state_timer.cancel();
        self.player_entity_map.clear();
        self.entity_player_map.clear();
        self.bots.clear();

        if self.engine_released {
            return;
        }
        self.engine_released = true;

        match self.engine.destroy() {
            Ok(()) => info!(
                gameplay_type = %self.gameplay_type,
                instance_id = %self.instance_id,
                "destroy instance"
            ),
            Err(e) => error!(
                gameplay_type = %self.gameplay_type,
                instance_id = %self.instance_id,
                error = %e,
                "failed to release engine during instance destroy"
            ),
        }
    }

    pub fn handle_event(&mut self, event: PlayerEvent) -> Result<(), EngineError> {
        match event {
            PlayerEvent::Joined {
                player_id,
                entity_id,
            } => self.handle_player_joined(&player_id, &entity_id),
            PlayerEvent::Disconnected { player_id } => self.handle_player_disconnected(&player_id),
            PlayerEvent::Input {
                player_id,
                index,
                input_type,
            } => self.handle_player_input(&player_id, index, input_type),
            PlayerEvent::Sync { player_id } => self.handle_player_sync(&player_id),
        }
    }

    /// Always answers the joining player with a GameInit, even if no entity was created.
    pub fn handle_player_joined(
        &mut self,
        player_id: &str,
        entity_id: &str,
    ) -> Result<(), EngineError> {
        if let Some(mapped) = self.player_entity_map.get(player_id).cloned() {
            // Rejoining keeps the entity; the new client starts its input indexes over.
            self.engine.reset_input_sequence(&mapped)?;
        }
        self.add_player(player_id, entity_id)?;

        let message = OutboundMessage::GameInit {
            instance_id: self.instance_id.to_string(),
            tick_rate: self.engine.tick_rate(),
            world_state_sync_interval_ms: self.world_state_sync_interval_ms,
            entities: self.collect_entities()?,
        };
        self.notifier
            .notify_player(&self.instance_id, player_id, message);
        Ok(())
    }

    pub fn handle_player_disconnected(&mut self, player_id: &str) -> Result<(), EngineError> {
        let Some(entity_id) = self.player_entity_map.get(player_id).cloned() else {
            return Ok(());
        };
        // Engine first: on failure the entity keeps its owner instead of lingering unowned.
        self.engine.remove_entity(&entity_id)?;
        self.player_entity_map.remove(player_id);
        self.entity_player_map.remove(&entity_id);

        self.notify_all_players(OutboundMessage::RemoveEntity { entity_id });
        Ok(())
    }

    pub fn handle_player_input(
        &mut self,
        player_id: &str,
        index: u64,
        input_type: PlayerInputType,
    ) -> Result<(), EngineError> {
        let Some(entity_id) = self.player_entity_map.get(player_id).cloned() else {
            return Ok(());
        };

        self.engine.enqueue_input_command(InputCommand {
            index,
            input_type,
            entity_id: entity_id.clone(),
            player_id: player_id.to_string(),
        })?;

        self.notify_all_players(OutboundMessage::EntityInput {
            entity_id,
            input_type,
        });
        Ok(())
    }

    pub fn handle_player_sync(&mut self, player_id: &str) -> Result<(), EngineError> {
        if !self.player_entity_map.contains_key(player_id) {
            return Ok(());
        }

        let entities = self.collect_entities()?;
        self.notifier
            .notify_player(&self.instance_id, player_id, OutboundMessage::Sync { entities });
        Ok(())
    }

    /// Sends the current entity set to every player in the instance.
    pub fn broadcast_world_state(&mut self) -> Result<(), EngineError> {
        if self.player_entity_map.is_empty() {
            return Ok(());
        }

        let entities = self.collect_entities()?;
        self.notify_all_players(OutboundMessage::Sync { entities });
        Ok(())
    }

    /// Spawns a bot at `at`, or at the instance spawn point, and pushes a fresh snapshot.
    pub fn add_bot(&mut self, at: Option<Spawn>) -> Result<Option<EntityDescription>, EngineError> {
        let bot_id = format!("bot-{}", uuid::Uuid::new_v4());
        let Some(entity) = self
            .engine
            .create_bot_entity(&bot_id, at.unwrap_or(self.spawn))?
        else {
            return Ok(None);
        };
        self.bots.push(bot_id);

        let description = self.mode.convert_engine_entity_to_transport(&entity);
        self.broadcast_world_state()?;
        Ok(Some(description))
    }

    /// Removes every bot and announces each removal. Returns how many were removed.
    pub fn kill_bots(&mut self) -> Result<usize, EngineError> {
        let mut removed = 0;
        while let Some(bot_id) = self.bots.last().cloned() {
            self.engine.remove_entity(&bot_id)?;
            self.bots.pop();
            self.notify_all_players(OutboundMessage::RemoveEntity { entity_id: bot_id });
            removed += 1;
        }
        Ok(removed)
    }

    /// Feeds each bot its next input: throttle up, then turn, so bots circle the arena.
    pub fn drive_bots(&mut self) -> Result<(), EngineError> {
        if self.bots.is_empty() {
            return Ok(());
        }

        self.bot_input_index += 1;
        let input_type = if self.bot_input_index % 2 == 0 {
            PlayerInputType::Right
        } else {
            PlayerInputType::Forward
        };
        for bot_id in &self.bots {
            self.engine.enqueue_input_command(InputCommand {
                index: self.bot_input_index,
                input_type,
                entity_id: bot_id.clone(),
                player_id: bot_id.clone(),
            })?;
        }
        Ok(())
    }

    fn collect_entities(&self) -> Result<Vec<EntityDescription>, EngineError> {
        Ok(self
            .engine
            .list_entities()?
            .iter()
            .map(|entity| self.mode.convert_engine_entity_to_transport(entity))
            .collect())
    }

    fn notify_all_players(&self, message: OutboundMessage) {
        self.notifier
            .notify_all_players_in_instance(&self.instance_id, message);
    }
}

/// Single thread of control for one instance: player events, timer ticks and
/// expiry polls are handled one at a time in arrival order.
pub async fn instance_task<E, M>(
    mut instance: GameplayInstance<E, M>,
    mut commands: mpsc::Receiver<InstanceCommand>,
    players_tx: watch::Sender<usize>,
) where
    E: GameEngine,
    M: GameMode<E>,
{
    let span = info_span!(
        "instance",
        instance_id = %instance.instance_id(),
        gameplay_type = %instance.gameplay_type()
    );

    async move {
        info!("instance started");

        while let Some(command) = commands.recv().await {
            match command {
                InstanceCommand::Player(event) => {
                    // Engine failures stay inside this session.
                    if let Err(e) = instance.handle_event(event) {
                        warn!(error = %e, "player event failed");
                    }
                }
                InstanceCommand::Join {
                    player_id,
                    entity_id,
                    reservation,
                } => {
                    if let Err(e) = instance.handle_player_joined(&player_id, &entity_id) {
                        warn!(error = %e, "player join failed");
                    }
                    // Publish the count before the seat is released so capacity never undercounts.
                    players_tx.send_replace(instance.players_count());
                    drop(reservation);
                }
                InstanceCommand::WorldStateTick => {
                    if let Err(e) = instance.drive_bots() {
                        warn!(error = %e, "bot input failed");
                    }
                    if let Err(e) = instance.broadcast_world_state() {
                        warn!(error = %e, "world state broadcast failed");
                    }
                }
                InstanceCommand::DestroyIfIdle { reply } => {
                    let destroyed = instance.destroy_by_time_if_needed();
                    let _ = reply.send(destroyed);
                    if destroyed {
                        break;
                    }
                }
                InstanceCommand::AddBot { at, reply } => {
                    let _ = reply.send(instance.add_bot(at));
                }
                InstanceCommand::KillBots { reply } => {
                    let _ = reply.send(instance.kill_bots());
                }
                InstanceCommand::Destroy => break,
            }
            players_tx.send_replace(instance.players_count());
        }

        instance.destroy();
        players_tx.send_replace(0);
    }
    .instrument(span)
    .await
}
