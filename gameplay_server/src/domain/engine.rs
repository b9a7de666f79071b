// Arena engine: a small fixed-step ship simulation implementing the engine capability.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::domain::errors::EngineError;
use crate::domain::ports::GameEngine;
use crate::domain::state::{EntityKind, InputCommand, PlayerInputType, Spawn};

/// Gameplay tuning for arena simulations.
///
/// Keep this separate from runtime/server configuration (channel sizes, ports, etc.).
#[derive(Debug, Clone, Copy)]
pub struct ArenaTuning {
    /// Simulation steps per second.
    pub tick_rate: u32,

    /// Maximum forward speed in pixels per second.
    pub max_speed: f32,

    /// Heading change applied by a single Left/Right input, in radians.
    pub turn_step: f32,

    /// Throttle change applied by a single Forward/Backward input.
    pub throttle_step: f32,

    /// Upper bound on live entities; creation beyond it is declined.
    pub max_entities: usize,

    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl Default for ArenaTuning {
    fn default() -> Self {
        Self {
            tick_rate: 30,
            max_speed: 150.0,
            turn_step: 0.25,
            throttle_step: 0.25,
            max_entities: 64,
            min_x: -400.0,
            max_x: 400.0,
            min_y: -230.0,
            max_y: 230.0,
        }
    }
}

/// Engine-native entity state.
#[derive(Debug, Clone, PartialEq)]
pub struct ArenaEntity {
    pub id: String,
    pub player_id: String,
    pub kind: EntityKind,
    pub x: f32,
    pub y: f32,
    pub rotation: f32,

    // Movement-only state (not part of the wire description).
    pub throttle: f32,               // 0.0..=1.0
    pub last_input_index: Option<u64>, // highest input index applied so far
    pub shots_fired: u32,
}

/// Simulation state advanced by the arena tick loop.
#[derive(Debug)]
pub struct ArenaWorld {
    tuning: ArenaTuning,
    tick: u64,
    // Insertion order doubles as the iteration order reported to instances.
    entities: Vec<ArenaEntity>,
    pending: VecDeque<InputCommand>,
}

impl ArenaWorld {
    pub fn new(tuning: ArenaTuning) -> Self {
        Self {
            tuning,
            tick: 0,
            entities: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn entities(&self) -> &[ArenaEntity] {
        &self.entities
    }

    pub fn entity(&self, entity_id: &str) -> Option<&ArenaEntity> {
        self.entities.iter().find(|e| e.id == entity_id)
    }

    /// Adds an entity; `None` when the id is taken or the arena is full.
    pub fn spawn(
        &mut self,
        player_id: &str,
        entity_id: &str,
        kind: EntityKind,
        at: Spawn,
    ) -> Option<ArenaEntity> {
        if self.entities.len() >= self.tuning.max_entities || self.entity(entity_id).is_some() {
            return None;
        }

        let entity = ArenaEntity {
            id: entity_id.to_string(),
            player_id: player_id.to_string(),
            kind,
            x: at.x.clamp(self.tuning.min_x, self.tuning.max_x),
            y: at.y.clamp(self.tuning.min_y, self.tuning.max_y),
            rotation: 0.0,
            throttle: 0.0,
            last_input_index: None,
            shots_fired: 0,
        };
        self.entities.push(entity.clone());
        Some(entity)
    }

    /// Removes an entity and any of its queued inputs. Returns whether it existed.
    pub fn remove(&mut self, entity_id: &str) -> bool {
        let before = self.entities.len();
        self.entities.retain(|e| e.id != entity_id);
        self.pending.retain(|c| c.entity_id != entity_id);
        before != self.entities.len()
    }

    /// Clears the entity's last applied index and its queued inputs. Returns whether it exists.
    pub fn reset_input_sequence(&mut self, entity_id: &str) -> bool {
        self.pending.retain(|c| c.entity_id != entity_id);
        match self.entities.iter_mut().find(|e| e.id == entity_id) {
            Some(entity) => {
                entity.last_input_index = None;
                true
            }
            None => false,
        }
    }

    pub fn enqueue(&mut self, command: InputCommand) {
        self.pending.push_back(command);
    }

    pub fn pending_commands(&self) -> usize {
        self.pending.len()
    }

    /// Applies queued inputs, then integrates movement for `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        let tuning = self.tuning;

        while let Some(command) = self.pending.pop_front() {
            let Some(entity) = self.entities.iter_mut().find(|e| e.id == command.entity_id) else {
                continue;
            };
            // Inputs can arrive out of order; keep only the newest.
            if entity
                .last_input_index
                .is_some_and(|last| command.index <= last)
            {
                continue;
            }
            entity.last_input_index = Some(command.index);
            apply_input(entity, command.input_type, tuning);
        }

        for entity in &mut self.entities {
            move_entity(entity, dt, tuning);
        }

        self.tick += 1;
    }

    fn clear(&mut self) {
        self.entities.clear();
        self.pending.clear();
    }
}

fn apply_input(entity: &mut ArenaEntity, input_type: PlayerInputType, tuning: ArenaTuning) {
    match input_type {
        PlayerInputType::Forward => {
            entity.throttle = (entity.throttle + tuning.throttle_step).min(1.0);
        }
        PlayerInputType::Backward => {
            entity.throttle = (entity.throttle - tuning.throttle_step).max(0.0);
        }
        PlayerInputType::Left => entity.rotation -= tuning.turn_step,
        PlayerInputType::Right => entity.rotation += tuning.turn_step,
        PlayerInputType::Shoot => {
            // Scouts are unarmed.
            if entity.kind == EntityKind::Ship {
                entity.shots_fired += 1;
            }
        }
    }
}

fn move_entity(entity: &mut ArenaEntity, dt: f32, tuning: ArenaTuning) {
    // direction (0 rad = up / -Y)
    let dir_x = entity.rotation.sin();
    let dir_y = -entity.rotation.cos();

    entity.x += dir_x * entity.throttle * tuning.max_speed * dt;
    entity.y += dir_y * entity.throttle * tuning.max_speed * dt;

    // world wrap
    if entity.x < tuning.min_x {
        entity.x = tuning.max_x;
    } else if entity.x > tuning.max_x {
        entity.x = tuning.min_x;
    }

    if entity.y < tuning.min_y {
        entity.y = tuning.max_y;
    } else if entity.y > tuning.max_y {
        entity.y = tuning.min_y;
    }
}

/// Engine capability backed by an [`ArenaWorld`] and its own tick task.
pub struct ArenaEngine {
    world: Arc<Mutex<ArenaWorld>>,
    tick_rate: u32,
    default_spawn: Spawn,
    tick_task: Option<JoinHandle<()>>,
    destroyed: bool,
}

impl ArenaEngine {
    /// Creates the world and spawns its fixed-step tick loop on the current runtime.
    pub fn start(tuning: ArenaTuning, default_spawn: Spawn) -> Self {
        let tick_rate = tuning.tick_rate.max(1);
        let world = Arc::new(Mutex::new(ArenaWorld::new(tuning)));
        let tick_task = tokio::spawn(arena_tick_loop(world.clone(), tick_rate));

        Self {
            world,
            tick_rate,
            default_spawn,
            tick_task: Some(tick_task),
            destroyed: false,
        }
    }

    /// Creates an entity of a specific kind at a specific position.
    pub fn spawn_entity(
        &mut self,
        player_id: &str,
        entity_id: &str,
        kind: EntityKind,
        at: Spawn,
    ) -> Result<Option<ArenaEntity>, EngineError> {
        Ok(self.world()?.spawn(player_id, entity_id, kind, at))
    }

    pub fn entity_count(&self) -> Result<usize, EngineError> {
        Ok(self.world()?.entities().len())
    }

    fn world(&self) -> Result<MutexGuard<'_, ArenaWorld>, EngineError> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        self.world.lock().map_err(|_| EngineError::Poisoned)
    }
}

impl GameEngine for ArenaEngine {
    type Entity = ArenaEntity;

    fn create_entity(
        &mut self,
        player_id: &str,
        entity_id: &str,
    ) -> Result<Option<ArenaEntity>, EngineError> {
        let at = self.default_spawn;
        self.spawn_entity(player_id, entity_id, EntityKind::Ship, at)
    }

    fn create_bot_entity(
        &mut self,
        bot_id: &str,
        at: Spawn,
    ) -> Result<Option<ArenaEntity>, EngineError> {
        // Bots own themselves: the entity id doubles as the player id.
        self.spawn_entity(bot_id, bot_id, EntityKind::Ship, at)
    }

    fn remove_entity(&mut self, entity_id: &str) -> Result<(), EngineError> {
        if !self.world()?.remove(entity_id) {
            debug!(entity_id, "remove requested for entity not in arena");
        }
        Ok(())
    }

    fn enqueue_input_command(&mut self, command: InputCommand) -> Result<(), EngineError> {
        let mut world = self.world()?;
        if world.entity(&command.entity_id).is_none() {
            return Err(EngineError::UnknownEntity(command.entity_id));
        }
        world.enqueue(command);
        Ok(())
    }

    fn reset_input_sequence(&mut self, entity_id: &str) -> Result<(), EngineError> {
        if !self.world()?.reset_input_sequence(entity_id) {
            return Err(EngineError::UnknownEntity(entity_id.to_string()));
        }
        Ok(())
    }

    fn list_entities(&self) -> Result<Vec<ArenaEntity>, EngineError> {
        Ok(self.world()?.entities().to_vec())
    }

    fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    fn destroy(&mut self) -> Result<(), EngineError> {
        if let Some(task) = self.tick_task.take() {
            task.abort();
        }
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        self.world
            .lock()
            .map_err(|_| EngineError::Poisoned)?
            .clear();
        Ok(())
    }
}

impl Drop for ArenaEngine {
    fn drop(&mut self) {
        if let Some(task) = self.tick_task.take() {
            task.abort();
        }
    }
}

async fn arena_tick_loop(world: Arc<Mutex<ArenaWorld>>, tick_rate: u32) {
    let tick_interval = Duration::from_secs(1) / tick_rate;
    let dt = tick_interval.as_secs_f32();
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        match world.lock() {
            Ok(mut world) => world.step(dt),
            Err(_) => {
                error!("arena world lock poisoned; stopping tick loop");
                break;
            }
        }
    }
}
