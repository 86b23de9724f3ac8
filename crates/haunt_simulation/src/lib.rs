//! HAUNT Simulation Core
//!
//! Адаптивная сложность + преследователь на Bevy 0.16 ECS (headless).
//!
//! Замкнутая петля за один тик:
//! телеметрия/события → DifficultyState → normalized → GhostAgent параметры →
//! FSM (Patrol/Chase/Search) через PerceptionModel + PathfindingOracle →
//! proximity → обратно в DifficultyState.
//!
//! Движок/физика/navmesh снаружи: `PathfindingOracle`, `PerceptionWorld`,
//! `TelemetrySource`, sinks. Для тестов и headless прогона есть `sandbox`.

use bevy::ecs::schedule::{ExecutorKind, ScheduleLabel};
use bevy::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

// Публичные модули
pub mod ai;
pub mod config;
pub mod difficulty;
pub mod feedback;
pub mod logger;
pub mod navigation;
pub mod patrol;
pub mod perception;
pub mod sandbox;
pub mod session;
pub mod sinks;
pub mod telemetry;

// Re-export основных типов
pub use ai::{GhostAIPlugin, GhostAgent, GhostId, GhostState, GhostStateKind, GhostTuning, SearchPhase};
pub use config::{ConfigError, DifficultyConfig, GhostConfig, PatrolConfig, SessionConfig, SimulationConfig};
pub use difficulty::{DifficultyPlugin, DifficultyState};
pub use feedback::FeedbackPlugin;
pub use logger::{init_logger, log, log_error, log_info, log_warning, set_log_level, set_logger, LogLevel, LogPrinter};
pub use navigation::{NavPath, NavPoint, PathStatus, PathfindingOracle};
pub use patrol::PatrolPlanner;
pub use perception::{visible, HitEntity, PerceptionQuery, PerceptionTarget, PerceptionWorld};
pub use session::{GhostSpawn, Session, SessionBuilder, SessionOutcome, SessionPlugin};
pub use sinks::{AudioSink, FeedbackSinks, HapticsSink, TelemetryLogger};
pub use telemetry::{Pose, TelemetrySample, TelemetrySource};

/// Schedule одного тика симуляции (гоняется вручную из `Session::tick`)
#[derive(ScheduleLabel, Debug, Clone, PartialEq, Eq, Hash)]
pub struct GhostTick;

/// Фазы тика (строго последовательно)
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickSet {
    /// Телеметрия, события, спад
    Difficulty,
    /// Snapshot сложности → агенты и sinks
    Publish,
    /// FSM каждого призрака
    Agents,
    /// Proximity → сложность
    FeedbackRoute,
    /// Catch/escape, журнал переходов
    Outcome,
}

/// Главный plugin симуляции (объединяет все подсистемы)
///
/// Navigation и PerceptionWorldRes вставляет хост (Session), остальные
/// resources получают значения по умолчанию, если их нет.
pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        // Однопоточный executor: порядок систем и расход RNG воспроизводимы
        let mut schedule = Schedule::new(GhostTick);
        schedule.set_executor_kind(ExecutorKind::SingleThreaded);

        app.add_schedule(schedule)
            .configure_sets(
                GhostTick,
                (
                    TickSet::Difficulty,
                    TickSet::Publish,
                    TickSet::Agents,
                    TickSet::FeedbackRoute,
                    TickSet::Outcome,
                )
                    .chain(),
            )
            .init_resource::<Time>()
            .init_resource::<DifficultyConfig>()
            .init_resource::<DifficultyState>()
            .init_resource::<PatrolPlanner>()
            .init_resource::<telemetry::Telemetry>()
            .init_resource::<sinks::SinkDispatcher>()
            .init_resource::<session::PursuitTarget>()
            .init_resource::<session::SessionState>()
            .register_type::<DifficultyState>()
            .add_plugins((DifficultyPlugin, FeedbackPlugin, GhostAIPlugin, SessionPlugin));

        if !app.world().contains_resource::<DeterministicRng>() {
            app.insert_resource(DeterministicRng::new(42));
        }
    }
}

/// Детерминистичный RNG resource (seeded)
#[derive(Resource)]
pub struct DeterministicRng {
    pub rng: ChaCha8Rng,
    pub seed: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }
}

/// Создаёт minimal Bevy App для headless симуляции
///
/// Без MinimalPlugins: время продвигает только `Session::tick`.
pub fn create_headless_app(seed: u64) -> App {
    let mut app = App::new();
    init_logger();
    app.insert_resource(DeterministicRng::new(seed))
        .init_resource::<Time>();

    app
}

/// Snapshot призраков для сравнения детерминизма
///
/// Порядок по GhostId, формат: id + Debug(state, agent, translation, rotation).
pub fn ghost_snapshot(world: &mut World) -> Vec<u8> {
    let mut snapshot = Vec::new();

    let mut query = world.query::<(&GhostAgent, &GhostState, &Transform)>();
    let mut ghosts: Vec<_> = query.iter(world).collect();
    ghosts.sort_by_key(|(agent, ..)| agent.id);

    for (agent, state, transform) in ghosts {
        snapshot.extend_from_slice(&agent.id.0.to_le_bytes());
        snapshot.extend_from_slice(
            format!(
                "{:?}{:?}{:?}{:?}",
                state, agent, transform.translation, transform.rotation
            )
            .as_bytes(),
        );
    }

    snapshot
}
