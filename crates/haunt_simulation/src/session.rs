//! Session: явный контекст симуляции
//!
//! Владеет bevy `App` (DifficultyState, реестр призраков, коллабораторы) и гоняет
//! `GhostTick` вручную: `tick(dt)` = продвинуть `Time` на dt, один проход schedule,
//! ротация event буферов. Никаких глобальных синглтонов и wall-clock таймеров.

use std::collections::BTreeMap;
use std::time::Duration;

use bevy::ecs::event::Events;
use bevy::prelude::*;

use crate::ai::{
    GhostAgent, GhostId, GhostState, GhostStateChanged, GhostStateKind, GhostTuning, ProximityReported,
    TargetCaught,
};
use crate::config::{ConfigError, GhostConfig, SessionConfig, SimulationConfig};
use crate::difficulty::{DifficultyChanged, DifficultyState, ItemCollected};
use crate::logger;
use crate::navigation::{Navigation, PathfindingOracle};
use crate::patrol::PatrolPlanner;
use crate::perception::{HitEntity, PerceptionTarget, PerceptionWorld, PerceptionWorldRes};
use crate::sinks::{FeedbackSinks, SinkDispatcher};
use crate::telemetry::{NoTelemetry, Telemetry, TelemetrySource};
use crate::{create_headless_app, GhostTick, SimulationPlugin, TickSet};

/// Цель преследования (игрок): id для raycast'ов + текущая позиция
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct PursuitTarget {
    pub entity: HitEntity,
    /// None: цели нет (не заспавнена / уничтожена)
    pub position: Option<Vec3>,
}

impl Default for PursuitTarget {
    fn default() -> Self {
        Self {
            entity: HitEntity(0),
            position: None,
        }
    }
}

impl PursuitTarget {
    pub fn perception_target(&self) -> Option<PerceptionTarget> {
        self.position.map(|position| PerceptionTarget {
            entity: self.entity,
            position,
        })
    }
}

/// Итог сессии
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum SessionOutcome {
    Running,
    /// Пойман конкретным призраком
    Caught(GhostId),
    /// Все предметы собраны и игрок у выхода
    Escaped,
}

/// Resource: состояние сессии (предметы, итог)
#[derive(Resource, Debug, Clone)]
pub struct SessionState {
    pub outcome: SessionOutcome,
    pub items_collected: u32,
    pub total_items: u32,
    pub exit: Option<Vec3>,
    pub exit_proximity: f32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl SessionState {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            outcome: SessionOutcome::Running,
            items_collected: 0,
            total_items: config.total_items,
            exit: config.exit_point(),
            exit_proximity: config.exit_proximity,
        }
    }

    pub fn is_over(&self) -> bool {
        self.outcome != SessionOutcome::Running
    }

    pub fn all_items_collected(&self) -> bool {
        self.items_collected >= self.total_items
    }
}

/// Resource: GhostId → Entity (статичный на время жизни призрака)
#[derive(Resource, Debug, Default)]
pub struct GhostRegistry {
    ghosts: BTreeMap<GhostId, Entity>,
}

impl GhostRegistry {
    pub fn get(&self, id: GhostId) -> Option<Entity> {
        self.ghosts.get(&id).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = GhostId> + '_ {
        self.ghosts.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.ghosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ghosts.is_empty()
    }
}

/// Resource: журнал FSM переходов до `Session::drain_transitions`
#[derive(Resource, Debug, Default)]
pub struct TransitionJournal(pub Vec<GhostStateChanged>);

/// Параметры спавна призрака
#[derive(Debug, Clone)]
pub struct GhostSpawn {
    pub id: GhostId,
    pub position: Vec3,
    /// Начальный heading (forward = -Z)
    pub rotation: Quat,
    /// None: общий `SimulationConfig::ghost`
    pub config: Option<GhostConfig>,
}

impl GhostSpawn {
    pub fn new(id: u32, position: Vec3) -> Self {
        Self {
            id: GhostId(id),
            position,
            rotation: Quat::IDENTITY,
            config: None,
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_config(mut self, config: GhostConfig) -> Self {
        self.config = Some(config);
        self
    }
}

/// Система: catch / escape → итог сессии
pub fn track_session_outcome(
    mut caught: EventReader<TargetCaught>,
    mut session: ResMut<SessionState>,
    target: Res<PursuitTarget>,
) {
    for event in caught.read() {
        if !session.is_over() {
            session.outcome = SessionOutcome::Caught(event.ghost);
            logger::log_info(&format!("Session over: target caught by {}", event.ghost));
        }
    }

    if session.is_over() || !session.all_items_collected() {
        return;
    }

    if let (Some(exit), Some(position)) = (session.exit, target.position) {
        if position.distance(exit) <= session.exit_proximity {
            session.outcome = SessionOutcome::Escaped;
            logger::log_info("Session over: target escaped");
        }
    }
}

/// Система: GhostStateChanged → журнал для хоста
pub fn journal_transitions(
    mut transitions: EventReader<GhostStateChanged>,
    mut journal: ResMut<TransitionJournal>,
) {
    journal.0.extend(transitions.read().copied());
}

/// Session Plugin
pub struct SessionPlugin;

impl Plugin for SessionPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<GhostRegistry>()
            .init_resource::<TransitionJournal>();

        app.add_systems(
            GhostTick,
            (track_session_outcome, journal_transitions)
                .chain()
                .in_set(TickSet::Outcome),
        );
    }
}

/// Сборка сессии: конфиг + коллабораторы
pub struct SessionBuilder {
    config: SimulationConfig,
    seed: u64,
    navigation: Option<Box<dyn PathfindingOracle>>,
    perception: Option<Box<dyn PerceptionWorld>>,
    telemetry: Option<Box<dyn TelemetrySource>>,
    sinks: FeedbackSinks,
    target: HitEntity,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            config: SimulationConfig::default(),
            seed: 42,
            navigation: None,
            perception: None,
            telemetry: None,
            sinks: FeedbackSinks::default(),
            target: HitEntity(0),
        }
    }
}

impl SessionBuilder {
    pub fn config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn navigation(mut self, oracle: impl PathfindingOracle) -> Self {
        self.navigation = Some(Box::new(oracle));
        self
    }

    pub fn perception(mut self, world: impl PerceptionWorld) -> Self {
        self.perception = Some(Box::new(world));
        self
    }

    pub fn telemetry(mut self, source: impl TelemetrySource) -> Self {
        self.telemetry = Some(Box::new(source));
        self
    }

    pub fn sinks(mut self, sinks: FeedbackSinks) -> Self {
        self.sinks = sinks;
        self
    }

    /// HitEntity, которым цель отвечает на raycast
    pub fn target(mut self, entity: HitEntity) -> Self {
        self.target = entity;
        self
    }

    /// Валидация конфига и коллабораторов, сборка App.
    ///
    /// Telemetry необязательна (без неё агрегация просто пропускается).
    pub fn build(self) -> Result<Session, ConfigError> {
        self.config.validate()?;

        let navigation = self
            .navigation
            .ok_or(ConfigError::MissingCollaborator("navigation"))?;
        let perception = self
            .perception
            .ok_or(ConfigError::MissingCollaborator("perception"))?;
        let telemetry = self
            .telemetry
            .unwrap_or_else(|| Box::new(NoTelemetry));

        let config = self.config;
        let mut app = create_headless_app(self.seed);

        app.insert_resource(DifficultyState::from_config(&config.difficulty))
            .insert_resource(config.difficulty.clone())
            .insert_resource(PatrolPlanner::new(config.patrol.clone()))
            .insert_resource(Navigation(navigation))
            .insert_resource(PerceptionWorldRes(perception))
            .insert_resource(Telemetry(telemetry))
            .insert_resource(SinkDispatcher::spawn(self.sinks))
            .insert_resource(PursuitTarget {
                entity: self.target,
                position: None,
            })
            .insert_resource(SessionState::from_config(&config.session))
            .add_plugins(SimulationPlugin);

        logger::log_info(&format!(
            "Session ready (seed {}, difficulty {:.2})",
            self.seed, config.difficulty.initial_level
        ));

        Ok(Session { app, config })
    }
}

/// Сессия симуляции
pub struct Session {
    app: App,
    config: SimulationConfig,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        self.app.world()
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.app.world_mut()
    }

    /// Спавн призрака: валидация per-agent конфига, регистрация в oracle
    pub fn spawn_ghost(&mut self, spawn: GhostSpawn) -> Result<GhostId, ConfigError> {
        let config = spawn.config.unwrap_or_else(|| self.config.ghost.clone());
        config.validate()?;

        let world = self.app.world_mut();
        if world.resource::<GhostRegistry>().get(spawn.id).is_some() {
            return Err(ConfigError::DuplicateGhost(spawn.id.0));
        }

        let agent = GhostAgent::new(spawn.id, &config);
        {
            let mut navigation = world.resource_mut::<Navigation>();
            let oracle = navigation.oracle_mut();
            oracle.place_agent(spawn.id, spawn.position);
            oracle.set_speed(spawn.id, agent.speed_for(GhostStateKind::Patrolling));
        }

        let entity = world
            .spawn((
                agent,
                GhostTuning::from_config(&config),
                GhostState::patrolling(),
                Transform::from_translation(spawn.position).with_rotation(spawn.rotation),
            ))
            .id();
        world
            .resource_mut::<GhostRegistry>()
            .ghosts
            .insert(spawn.id, entity);

        logger::log_info(&format!("Spawned {} at {:?}", spawn.id, spawn.position));
        Ok(spawn.id)
    }

    /// Один тик симуляции (dt в секундах симуляционного времени)
    pub fn tick(&mut self, dt: f32) {
        let delta = match Duration::try_from_secs_f32(dt) {
            Ok(delta) => delta,
            Err(_) => {
                logger::log_warning(&format!("Session: skipping tick with invalid dt {}", dt));
                return;
            }
        };

        let world = self.app.world_mut();
        world.resource_mut::<Time>().advance_by(delta);
        world.run_schedule(GhostTick);
        rotate_events(world);
    }

    /// Позиция цели (None: цели нет)
    pub fn set_target_position(&mut self, position: Option<Vec3>) {
        self.app.world_mut().resource_mut::<PursuitTarget>().position = position;
    }

    /// Предмет подобран: учёт + рост сложности на следующем тике
    pub fn on_item_collected(&mut self) {
        let world = self.app.world_mut();
        {
            let mut session = world.resource_mut::<SessionState>();
            session.items_collected += 1;
            logger::log_info(&format!(
                "Item collected ({}/{})",
                session.items_collected, session.total_items
            ));
        }
        world.send_event(ItemCollected);
    }

    /// Внешний proximity репорт (тот же путь, что и у FSM).
    ///
    /// Возвращает false если значение не finite или призрак неизвестен.
    pub fn on_ghost_proximity(&mut self, ghost: GhostId, proximity: f32) -> bool {
        if !proximity.is_finite() {
            logger::log_warning(&format!("Session: ignoring proximity {} from {}", proximity, ghost));
            return false;
        }
        let world = self.app.world_mut();
        if world.resource::<GhostRegistry>().get(ghost).is_none() {
            logger::log_warning(&format!("Session: proximity reported by unknown {}", ghost));
            return false;
        }
        world.send_event(ProximityReported {
            ghost,
            proximity: proximity.clamp(0.0, 1.0),
        });
        true
    }

    /// Внешний catch (терминальный, one-shot).
    ///
    /// Возвращает false если сессия уже закончена или призрак неизвестен.
    pub fn on_caught(&mut self, ghost: GhostId) -> bool {
        let world = self.app.world_mut();
        if world.resource::<SessionState>().is_over() {
            return false;
        }
        let Some(entity) = world.resource::<GhostRegistry>().get(ghost) else {
            logger::log_warning(&format!("Session: catch reported by unknown {}", ghost));
            return false;
        };

        let from = world
            .get::<GhostState>(entity)
            .map(GhostState::kind)
            .unwrap_or(GhostStateKind::Patrolling);
        if let Some(mut state) = world.get_mut::<GhostState>(entity) {
            *state = GhostState::Caught;
        }
        world
            .resource_mut::<Navigation>()
            .oracle_mut()
            .set_stopped(ghost, true);
        world
            .resource_mut::<TransitionJournal>()
            .0
            .push(GhostStateChanged {
                ghost,
                from,
                to: GhostStateKind::Caught,
            });
        world.resource_mut::<SessionState>().outcome = SessionOutcome::Caught(ghost);

        logger::log_info(&format!("Session over: target caught by {} (reported)", ghost));
        true
    }

    pub fn difficulty_level(&self) -> f32 {
        self.world().resource::<DifficultyState>().current_level()
    }

    pub fn normalized_difficulty(&self) -> f32 {
        self.world().resource::<DifficultyState>().normalized()
    }

    /// Прямой прирост сложности (тот же `increase`, что и у событий)
    pub fn increase_difficulty(&mut self, amount: f32) -> f32 {
        self.world_mut().resource_mut::<DifficultyState>().increase(amount)
    }

    pub fn force_difficulty(&mut self, level: f32) {
        self.world_mut().resource_mut::<DifficultyState>().force_level(level);
    }

    pub fn ghost_ids(&self) -> Vec<GhostId> {
        self.world().resource::<GhostRegistry>().ids().collect()
    }

    pub fn ghost_state(&self, ghost: GhostId) -> Option<&GhostState> {
        self.ghost_component(ghost)
    }

    pub fn ghost_agent(&self, ghost: GhostId) -> Option<&GhostAgent> {
        self.ghost_component(ghost)
    }

    pub fn ghost_transform(&self, ghost: GhostId) -> Option<&Transform> {
        self.ghost_component(ghost)
    }

    /// Ориентация для рендера (с поправкой рига)
    pub fn ghost_render_rotation(&self, ghost: GhostId) -> Option<Quat> {
        let tuning = self.ghost_component::<GhostTuning>(ghost)?;
        let state = self.ghost_state(ghost)?;
        let transform = self.ghost_transform(ghost)?;
        Some(tuning.render_rotation(state, transform.rotation))
    }

    fn ghost_component<T: Component>(&self, ghost: GhostId) -> Option<&T> {
        let entity = self.world().resource::<GhostRegistry>().get(ghost)?;
        self.world().get::<T>(entity)
    }

    pub fn outcome(&self) -> SessionOutcome {
        self.world().resource::<SessionState>().outcome
    }

    pub fn items_collected(&self) -> u32 {
        self.world().resource::<SessionState>().items_collected
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.world().resource::<Time>().elapsed_secs()
    }

    /// Переходы с прошлого вызова (в порядке возникновения)
    pub fn drain_transitions(&mut self) -> Vec<GhostStateChanged> {
        std::mem::take(&mut self.world_mut().resource_mut::<TransitionJournal>().0)
    }

    /// Дождаться доставки всех sink сообщений
    pub fn shutdown(&mut self) {
        self.world_mut().resource_mut::<SinkDispatcher>().shutdown();
        logger::log_info("Session shut down");
    }
}

/// Ручная ротация double-buffer событий (First schedule не запускается)
fn rotate_events(world: &mut World) {
    world.resource_mut::<Events<ItemCollected>>().update();
    world.resource_mut::<Events<DifficultyChanged>>().update();
    world.resource_mut::<Events<GhostStateChanged>>().update();
    world.resource_mut::<Events<ProximityReported>>().update();
    world.resource_mut::<Events<TargetCaught>>().update();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::Sandbox;

    fn session() -> Session {
        let sandbox = Sandbox::open_field(40.0);
        Session::builder()
            .navigation(sandbox.navigation())
            .perception(sandbox.perception())
            .target(sandbox.target_entity())
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_requires_navigation_and_perception() {
        let sandbox = Sandbox::open_field(40.0);

        let missing_nav = Session::builder().perception(sandbox.perception()).build();
        assert!(matches!(
            missing_nav,
            Err(ConfigError::MissingCollaborator("navigation"))
        ));

        let missing_perception = Session::builder().navigation(sandbox.navigation()).build();
        assert!(matches!(
            missing_perception,
            Err(ConfigError::MissingCollaborator("perception"))
        ));
    }

    #[test]
    fn test_invalid_config_rejected_at_build() {
        let sandbox = Sandbox::open_field(40.0);
        let mut config = SimulationConfig::default();
        config.difficulty.decay_rate = 0.0;

        let result = Session::builder()
            .config(config)
            .navigation(sandbox.navigation())
            .perception(sandbox.perception())
            .build();
        assert!(matches!(result, Err(ConfigError::NonPositive { .. })));
    }

    #[test]
    fn test_spawn_rejects_duplicates_and_invalid_config() {
        let mut session = session();
        assert_eq!(session.spawn_ghost(GhostSpawn::new(1, Vec3::ZERO)).unwrap(), GhostId(1));
        assert!(matches!(
            session.spawn_ghost(GhostSpawn::new(1, Vec3::X)),
            Err(ConfigError::DuplicateGhost(1))
        ));

        let bad = GhostConfig {
            catch_distance: -1.0,
            ..Default::default()
        };
        assert!(session
            .spawn_ghost(GhostSpawn::new(2, Vec3::X).with_config(bad))
            .is_err());
        assert_eq!(session.ghost_ids(), vec![GhostId(1)]);
    }

    #[test]
    fn test_invalid_dt_skips_tick() {
        let mut session = session();
        session.tick(f32::NAN);
        session.tick(-1.0);
        assert_eq!(session.elapsed_secs(), 0.0);

        session.tick(0.5);
        assert!((session.elapsed_secs() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_proximity_from_unknown_ghost_is_ignored() {
        let mut session = session();
        session.spawn_ghost(GhostSpawn::new(1, Vec3::ZERO)).unwrap();

        assert!(!session.on_ghost_proximity(GhostId(7), 0.0));
        assert!(!session.on_ghost_proximity(GhostId(1), f32::NAN));
        session.tick(0.1);
        assert_eq!(session.difficulty_level(), 1.0);

        assert!(session.on_ghost_proximity(GhostId(1), 0.0));
        session.tick(0.1);
        assert!(session.difficulty_level() > 1.0);
    }

    #[test]
    fn test_on_caught_is_one_shot() {
        let mut session = session();
        session.spawn_ghost(GhostSpawn::new(1, Vec3::ZERO)).unwrap();

        assert!(!session.on_caught(GhostId(9)));
        assert!(session.on_caught(GhostId(1)));
        assert!(!session.on_caught(GhostId(1)));

        assert_eq!(session.outcome(), SessionOutcome::Caught(GhostId(1)));
        assert_eq!(session.ghost_state(GhostId(1)), Some(&GhostState::Caught));
        let transitions = session.drain_transitions();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].to, GhostStateKind::Caught);
    }
}
