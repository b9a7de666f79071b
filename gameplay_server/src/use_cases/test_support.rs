use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::domain::ports::{Clock, GameEngine, GameMode, Notifier};
use crate::domain::{
    EngineError, EntityDescription, EntityKind, GameplayType, InputCommand, Notification,
    ReservedInstanceIds, Spawn,
};
use crate::use_cases::instance::{GameplayInstance, InstanceContext, WorldStateTimer};
use crate::use_cases::types::InstanceCommand;

pub(crate) const CREATED_AT: u64 = 1_700_000_000_000;

// Manually driven time source so expiry assertions are deterministic.
#[derive(Clone)]
pub(crate) struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub(crate) fn new(now: u64) -> Self {
        Self(Arc::new(AtomicU64::new(now)))
    }

    pub(crate) fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub(crate) struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub(crate) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }

    pub(crate) fn clear(&self) {
        self.sent.lock().expect("notifier mutex poisoned").clear();
    }
}

impl Notifier for RecordingNotifier {
    fn emit(&self, notification: Notification) {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
    }
}

#[derive(Debug, Default)]
pub(crate) struct EngineLog {
    pub created: Vec<(String, String)>,
    pub removed: Vec<String>,
    pub bots: Vec<(String, Spawn)>,
    pub commands: Vec<InputCommand>,
    pub sequence_resets: Vec<String>,
    pub destroy_calls: usize,
}

#[derive(Clone, Copy, Default)]
pub(crate) struct EngineFailures {
    pub reject_create: bool,
    pub remove: bool,
    pub destroy: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FakeEntity {
    pub id: String,
    pub player_id: String,
}

// Engine double that records every call so tests can inspect it after the move.
pub(crate) struct FakeEngine {
    log: Arc<Mutex<EngineLog>>,
    failures: EngineFailures,
    entities: Vec<FakeEntity>,
}

impl GameEngine for FakeEngine {
    type Entity = FakeEntity;

    fn create_entity(
        &mut self,
        player_id: &str,
        entity_id: &str,
    ) -> Result<Option<FakeEntity>, EngineError> {
        let mut log = self.log.lock().expect("engine log mutex poisoned");
        log.created
            .push((player_id.to_string(), entity_id.to_string()));
        if self.failures.reject_create {
            return Ok(None);
        }
        let entity = FakeEntity {
            id: entity_id.to_string(),
            player_id: player_id.to_string(),
        };
        self.entities.push(entity.clone());
        Ok(Some(entity))
    }

    fn create_bot_entity(
        &mut self,
        bot_id: &str,
        at: Spawn,
    ) -> Result<Option<FakeEntity>, EngineError> {
        self.log
            .lock()
            .expect("engine log mutex poisoned")
            .bots
            .push((bot_id.to_string(), at));
        if self.failures.reject_create {
            return Ok(None);
        }
        let entity = FakeEntity {
            id: bot_id.to_string(),
            player_id: bot_id.to_string(),
        };
        self.entities.push(entity.clone());
        Ok(Some(entity))
    }

    fn remove_entity(&mut self, entity_id: &str) -> Result<(), EngineError> {
        if self.failures.remove {
            return Err(EngineError::Poisoned);
        }
        self.entities.retain(|e| e.id != entity_id);
        self.log
            .lock()
            .expect("engine log mutex poisoned")
            .removed
            .push(entity_id.to_string());
        Ok(())
    }

    fn enqueue_input_command(&mut self, command: InputCommand) -> Result<(), EngineError> {
        self.log
            .lock()
            .expect("engine log mutex poisoned")
            .commands
            .push(command);
        Ok(())
    }

    fn reset_input_sequence(&mut self, entity_id: &str) -> Result<(), EngineError> {
        self.log
            .lock()
            .expect("engine log mutex poisoned")
            .sequence_resets
            .push(entity_id.to_string());
        Ok(())
    }

    fn list_entities(&self) -> Result<Vec<FakeEntity>, EngineError> {
        Ok(self.entities.clone())
    }

    fn tick_rate(&self) -> u32 {
        20
    }

    fn destroy(&mut self) -> Result<(), EngineError> {
        self.log
            .lock()
            .expect("engine log mutex poisoned")
            .destroy_calls += 1;
        if self.failures.destroy {
            return Err(EngineError::Rejected("destroy failed".to_string()));
        }
        self.entities.clear();
        Ok(())
    }
}

pub(crate) struct FakeMode;

impl GameMode<FakeEngine> for FakeMode {
    fn initiate_engine_entity(
        &self,
        engine: &mut FakeEngine,
        player_id: &str,
        entity_id: &str,
    ) -> Result<Option<FakeEntity>, EngineError> {
        engine.create_entity(player_id, entity_id)
    }

    fn convert_engine_entity_to_transport(&self, entity: &FakeEntity) -> EntityDescription {
        EntityDescription {
            id: entity.id.clone(),
            player_id: entity.player_id.clone(),
            kind: EntityKind::Ship,
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
        }
    }
}

pub(crate) struct TestInstance {
    pub instance: GameplayInstance<FakeEngine, FakeMode>,
    pub notifier: RecordingNotifier,
    pub clock: ManualClock,
    pub engine_log: Arc<Mutex<EngineLog>>,
    pub commands_rx: mpsc::Receiver<InstanceCommand>,
}

impl TestInstance {
    pub(crate) fn engine_log(&self) -> std::sync::MutexGuard<'_, EngineLog> {
        self.engine_log.lock().expect("engine log mutex poisoned")
    }
}

pub(crate) fn test_context(notifier: &RecordingNotifier, clock: &ManualClock) -> InstanceContext {
    InstanceContext {
        notifier: Arc::new(notifier.clone()),
        clock: Arc::new(clock.clone()),
        reserved_ids: ReservedInstanceIds::default(),
        world_state_interval: Duration::from_millis(2_000),
    }
}

// Builds an instance over the recording doubles. Needs a Tokio runtime for the timer.
pub(crate) fn build_instance(
    gameplay_type: GameplayType,
    failures: EngineFailures,
) -> TestInstance {
    let notifier = RecordingNotifier::default();
    let clock = ManualClock::new(CREATED_AT);
    let engine_log = Arc::new(Mutex::new(EngineLog::default()));
    let engine = FakeEngine {
        log: engine_log.clone(),
        failures,
        entities: Vec::new(),
    };

    let context = test_context(&notifier, &clock);
    let (commands_tx, commands_rx) = mpsc::channel(16);
    let timer = WorldStateTimer::spawn(context.world_state_interval, commands_tx);
    let instance = GameplayInstance::new(
        &context,
        gameplay_type,
        engine,
        FakeMode,
        Spawn { x: 10.0, y: 20.0 },
        timer,
    );

    TestInstance {
        instance,
        notifier,
        clock,
        engine_log,
        commands_rx,
    }
}
