//! Sandbox: детерминированные reference коллабораторы
//!
//! Плоская ограниченная арена + box препятствия + цилиндр-цель (игрок).
//! Один общий `SandboxState` за `Arc<Mutex<..>>`, наружу раздаются handles:
//! - `SandboxNavigation`: PathfindingOracle (прямые пути, препятствия → Partial)
//! - `SandboxPerception`: PerceptionWorld (ray vs AABB / цилиндр)
//! - `SandboxTelemetry`: TelemetrySource (поза головы и триггеры задаёт хост)
//!
//! Агенты двигаются только в `Sandbox::advance(dt)` (между тиками симуляции),
//! как это делал бы движок.
//!
//! ## Collision layers
//! - 0b10: actors (цель)
//! - 0b100: environment (препятствия)

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bevy::prelude::*;

use crate::ai::GhostId;
use crate::navigation::{NavPath, NavPoint, PathStatus, PathfindingOracle};
use crate::perception::{HitEntity, PerceptionWorld};
use crate::telemetry::{Pose, TelemetrySource};

pub const LAYER_ACTORS: u32 = 0b10;
pub const LAYER_ENVIRONMENT: u32 = 0b100;

/// HitEntity цели; препятствия нумеруются с `OBSTACLE_ID_BASE`
pub const TARGET_ENTITY: HitEntity = HitEntity(1);
const OBSTACLE_ID_BASE: u64 = 1000;

/// Размеры цели (вертикальный цилиндр от позиции вверх)
const TARGET_RADIUS: f32 = 0.3;
const TARGET_HEIGHT: f32 = 1.8;

/// Box препятствие (AABB)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub min: Vec3,
    pub max: Vec3,
}

impl Obstacle {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Точка внутри в горизонтальной проекции
    fn contains_planar(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.z >= self.min.z && point.z <= self.max.z
    }

    /// Slab test: расстояние до входа луча (direction нормализован)
    fn ray_entry(&self, origin: Vec3, direction: Vec3) -> Option<f32> {
        let mut t_min = 0.0f32;
        let mut t_max = f32::INFINITY;

        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            if d.abs() < 1e-8 {
                if o < self.min[axis] || o > self.max[axis] {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / d;
            let mut t1 = (self.min[axis] - o) * inv;
            let mut t2 = (self.max[axis] - o) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }

        Some(t_min)
    }

    /// Пересекает ли горизонтальный отрезок препятствие (на его средней высоте)
    fn blocks_segment(&self, from: Vec3, to: Vec3) -> Option<f32> {
        let mid_y = (self.min.y + self.max.y) * 0.5;
        let from = Vec3::new(from.x, mid_y, from.z);
        let to = Vec3::new(to.x, mid_y, to.z);
        let length = from.distance(to);
        let direction = (to - from).try_normalize()?;

        self.ray_entry(from, direction).filter(|&t| t <= length)
    }
}

#[derive(Debug, Clone, Default)]
struct SandboxAgent {
    position: Vec3,
    destination: Option<Vec3>,
    speed: f32,
    stopped: bool,
    velocity: Vec3,
}

/// Общее состояние песочницы
#[derive(Debug, Clone)]
pub struct SandboxState {
    half_extent: f32,
    obstacles: Vec<Obstacle>,
    agents: BTreeMap<GhostId, SandboxAgent>,
    target: Option<Vec3>,
    head_pose: Option<Pose>,
    triggers: Vec<f32>,
    forced_path_status: Option<PathStatus>,
}

impl SandboxState {
    fn in_bounds(&self, point: Vec3) -> bool {
        point.x.abs() <= self.half_extent && point.z.abs() <= self.half_extent
    }

    fn walkable(&self, point: Vec3) -> bool {
        self.in_bounds(point) && !self.obstacles.iter().any(|o| o.contains_planar(point))
    }

    fn path(&self, from: Vec3, to: Vec3) -> NavPath {
        if let Some(status) = self.forced_path_status {
            return NavPath {
                status,
                corners: vec![from, to],
            };
        }

        if !self.walkable(to) {
            return NavPath::invalid();
        }

        let blocked_at = self
            .obstacles
            .iter()
            .filter_map(|o| o.blocks_segment(from, to))
            .fold(None, |closest: Option<f32>, t| Some(closest.map_or(t, |c| c.min(t))));

        match blocked_at {
            Some(t) => {
                let direction = (to - from).normalize_or_zero();
                NavPath {
                    status: PathStatus::Partial,
                    corners: vec![from, from + direction * t],
                }
            }
            None => NavPath {
                status: PathStatus::Complete,
                corners: vec![from, to],
            },
        }
    }

    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32, layer_mask: u32) -> Option<HitEntity> {
        let mut closest: Option<(f32, HitEntity)> = None;
        let mut consider = |t: f32, hit: HitEntity| {
            if t <= max_distance && closest.is_none_or(|(best, _)| t < best) {
                closest = Some((t, hit));
            }
        };

        if layer_mask & LAYER_ENVIRONMENT != 0 {
            for (index, obstacle) in self.obstacles.iter().enumerate() {
                if let Some(t) = obstacle.ray_entry(origin, direction) {
                    consider(t, HitEntity(OBSTACLE_ID_BASE + index as u64));
                }
            }
        }

        if layer_mask & LAYER_ACTORS != 0 {
            if let Some(t) = self.target.and_then(|base| ray_cylinder(origin, direction, base)) {
                consider(t, TARGET_ENTITY);
            }
        }

        closest.map(|(_, hit)| hit)
    }

    fn advance(&mut self, dt: f32) {
        for agent in self.agents.values_mut() {
            agent.velocity = Vec3::ZERO;
            if agent.stopped || dt <= 0.0 {
                continue;
            }
            let Some(destination) = agent.destination else {
                continue;
            };

            let to_destination = Vec3::new(
                destination.x - agent.position.x,
                0.0,
                destination.z - agent.position.z,
            );
            let distance = to_destination.length();
            let step = agent.speed * dt;

            if distance <= step || distance <= f32::EPSILON {
                agent.position = Vec3::new(destination.x, agent.position.y, destination.z);
                if distance > f32::EPSILON {
                    agent.velocity = to_destination / dt;
                }
            } else {
                let direction = to_destination / distance;
                agent.position += direction * step;
                agent.velocity = direction * agent.speed;
            }
        }
    }
}

/// Вертикальный цилиндр цели: пересечение в XZ, потом проверка высоты
fn ray_cylinder(origin: Vec3, direction: Vec3, base: Vec3) -> Option<f32> {
    let o = Vec2::new(origin.x - base.x, origin.z - base.z);
    let d = Vec2::new(direction.x, direction.z);

    let a = d.length_squared();
    if a < 1e-10 {
        return None;
    }
    let b = 2.0 * o.dot(d);
    let c = o.length_squared() - TARGET_RADIUS * TARGET_RADIUS;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }

    let sqrt = discriminant.sqrt();
    let t_near = (-b - sqrt) / (2.0 * a);
    let t_far = (-b + sqrt) / (2.0 * a);
    if t_far < 0.0 {
        return None;
    }
    // Начало луча внутри цилиндра → попадание сразу
    let t = t_near.max(0.0);

    let y = origin.y + direction.y * t;
    (y >= base.y && y <= base.y + TARGET_HEIGHT).then_some(t)
}

/// Песочница (владелец общего состояния)
#[derive(Clone)]
pub struct Sandbox {
    state: Arc<Mutex<SandboxState>>,
}

impl Sandbox {
    /// Квадратная арена [-half_extent, half_extent] по X и Z
    pub fn open_field(half_extent: f32) -> Self {
        Self {
            state: Arc::new(Mutex::new(SandboxState {
                half_extent,
                obstacles: Vec::new(),
                agents: BTreeMap::new(),
                target: None,
                head_pose: None,
                triggers: Vec::new(),
                forced_path_status: None,
            })),
        }
    }

    pub fn with_obstacle(self, min: Vec3, max: Vec3) -> Self {
        self.lock().obstacles.push(Obstacle::new(min, max));
        self
    }

    fn lock(&self) -> MutexGuard<'_, SandboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn navigation(&self) -> SandboxNavigation {
        SandboxNavigation {
            state: Arc::clone(&self.state),
        }
    }

    pub fn perception(&self) -> SandboxPerception {
        SandboxPerception {
            state: Arc::clone(&self.state),
        }
    }

    pub fn telemetry(&self) -> SandboxTelemetry {
        SandboxTelemetry {
            state: Arc::clone(&self.state),
        }
    }

    pub fn target_entity(&self) -> HitEntity {
        TARGET_ENTITY
    }

    pub fn set_target(&self, position: Option<Vec3>) {
        self.lock().target = position;
    }

    pub fn target(&self) -> Option<Vec3> {
        self.lock().target
    }

    pub fn set_head_pose(&self, pose: Option<Pose>) {
        self.lock().head_pose = pose;
    }

    pub fn set_triggers(&self, values: Vec<f32>) {
        self.lock().triggers = values;
    }

    /// Принудительный статус всех путей (None: честный расчёт)
    pub fn force_path_status(&self, status: Option<PathStatus>) {
        self.lock().forced_path_status = status;
    }

    /// Движение агентов (вызывать между тиками)
    pub fn advance(&self, dt: f32) {
        self.lock().advance(dt);
    }

    pub fn agent_position(&self, agent: GhostId) -> Option<Vec3> {
        self.lock().agents.get(&agent).map(|a| a.position)
    }

    pub fn agent_destination(&self, agent: GhostId) -> Option<Vec3> {
        self.lock().agents.get(&agent).and_then(|a| a.destination)
    }

    pub fn agent_speed(&self, agent: GhostId) -> Option<f32> {
        self.lock().agents.get(&agent).map(|a| a.speed)
    }

    /// Телепорт агента (тестовые сценарии)
    pub fn teleport_agent(&self, agent: GhostId, position: Vec3) {
        if let Some(a) = self.lock().agents.get_mut(&agent) {
            a.position = position;
        }
    }
}

macro_rules! sandbox_handle {
    ($name:ident) => {
        #[derive(Clone)]
        pub struct $name {
            state: Arc<Mutex<SandboxState>>,
        }

        impl $name {
            fn lock(&self) -> MutexGuard<'_, SandboxState> {
                self.state.lock().unwrap_or_else(PoisonError::into_inner)
            }
        }
    };
}

sandbox_handle!(SandboxNavigation);
sandbox_handle!(SandboxPerception);
sandbox_handle!(SandboxTelemetry);

impl PathfindingOracle for SandboxNavigation {
    fn sample_position(&self, point: Vec3, max_distance: f32) -> Option<NavPoint> {
        let state = self.lock();
        let clamped = Vec3::new(
            point.x.clamp(-state.half_extent, state.half_extent),
            0.0,
            point.z.clamp(-state.half_extent, state.half_extent),
        );

        let planar_offset = Vec2::new(point.x - clamped.x, point.z - clamped.z).length();
        if planar_offset > max_distance || !state.walkable(clamped) {
            return None;
        }
        Some(NavPoint { position: clamped })
    }

    fn calculate_path(&self, from: Vec3, to: Vec3) -> NavPath {
        self.lock().path(from, to)
    }

    fn set_destination(&mut self, agent: GhostId, point: Vec3) {
        if let Some(a) = self.lock().agents.get_mut(&agent) {
            a.destination = Some(point);
        }
    }

    fn remaining_distance(&self, agent: GhostId) -> f32 {
        let state = self.lock();
        let Some(a) = state.agents.get(&agent) else {
            return 0.0;
        };
        a.destination.map_or(0.0, |destination| {
            Vec2::new(destination.x - a.position.x, destination.z - a.position.z).length()
        })
    }

    fn is_stopped(&self, agent: GhostId) -> bool {
        self.lock().agents.get(&agent).is_none_or(|a| a.stopped)
    }

    fn set_stopped(&mut self, agent: GhostId, stopped: bool) {
        if let Some(a) = self.lock().agents.get_mut(&agent) {
            a.stopped = stopped;
        }
    }

    fn set_speed(&mut self, agent: GhostId, speed: f32) {
        if let Some(a) = self.lock().agents.get_mut(&agent) {
            a.speed = speed;
        }
    }

    fn place_agent(&mut self, agent: GhostId, position: Vec3) {
        self.lock().agents.insert(
            agent,
            SandboxAgent {
                position,
                ..Default::default()
            },
        );
    }

    fn agent_position(&self, agent: GhostId) -> Option<Vec3> {
        self.lock().agents.get(&agent).map(|a| a.position)
    }

    fn agent_velocity(&self, agent: GhostId) -> Vec3 {
        self.lock()
            .agents
            .get(&agent)
            .map_or(Vec3::ZERO, |a| a.velocity)
    }
}

impl PerceptionWorld for SandboxPerception {
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32, layer_mask: u32) -> Option<HitEntity> {
        self.lock().raycast(origin, direction, max_distance, layer_mask)
    }
}

impl TelemetrySource for SandboxTelemetry {
    fn current_head_pose(&self) -> Option<Pose> {
        self.lock().head_pose
    }

    fn current_trigger_values(&self) -> Vec<f32> {
        self.lock().triggers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_with_wall() -> Sandbox {
        // Стена поперёк оси X на x ∈ [4, 5]
        Sandbox::open_field(20.0).with_obstacle(Vec3::new(4.0, 0.0, -10.0), Vec3::new(5.0, 3.0, 10.0))
    }

    #[test]
    fn test_path_through_wall_is_partial() {
        let sandbox = arena_with_wall();
        let nav = sandbox.navigation();

        let blocked = nav.calculate_path(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(blocked.status, PathStatus::Partial);
        assert!((blocked.corners[1].x - 4.0).abs() < 1e-4);

        let clear = nav.calculate_path(Vec3::ZERO, Vec3::new(-10.0, 0.0, 0.0));
        assert_eq!(clear.status, PathStatus::Complete);

        let outside = nav.calculate_path(Vec3::ZERO, Vec3::new(-30.0, 0.0, 0.0));
        assert_eq!(outside.status, PathStatus::Invalid);
    }

    #[test]
    fn test_sample_position_respects_max_distance() {
        let nav = Sandbox::open_field(10.0).navigation();

        assert_eq!(
            nav.sample_position(Vec3::new(12.0, 0.1, 0.0), 5.0).map(|p| p.position),
            Some(Vec3::new(10.0, 0.0, 0.0))
        );
        assert_eq!(nav.sample_position(Vec3::new(30.0, 0.0, 0.0), 5.0), None);
    }

    #[test]
    fn test_wall_occludes_target() {
        let sandbox = arena_with_wall();
        sandbox.set_target(Some(Vec3::new(8.0, 0.0, 0.0)));
        let world = sandbox.perception();
        let mask = LAYER_ACTORS | LAYER_ENVIRONMENT;

        let hit = world.raycast(Vec3::new(0.0, 1.0, 0.0), Vec3::X, 8.0, mask);
        assert_eq!(hit, Some(HitEntity(OBSTACLE_ID_BASE)));

        // Маска без environment: стена прозрачна
        let hit = world.raycast(Vec3::new(0.0, 1.0, 0.0), Vec3::X, 8.0, LAYER_ACTORS);
        assert_eq!(hit, Some(TARGET_ENTITY));
    }

    #[test]
    fn test_target_cylinder_height() {
        let sandbox = Sandbox::open_field(20.0);
        sandbox.set_target(Some(Vec3::new(0.0, 0.0, -5.0)));
        let world = sandbox.perception();

        assert_eq!(
            world.raycast(Vec3::new(0.0, 1.5, 0.0), Vec3::NEG_Z, 5.0, u32::MAX),
            Some(TARGET_ENTITY)
        );
        // Выше головы
        assert_eq!(world.raycast(Vec3::new(0.0, 2.0, 0.0), Vec3::NEG_Z, 5.0, u32::MAX), None);
    }

    #[test]
    fn test_agents_move_only_on_advance() {
        let sandbox = Sandbox::open_field(20.0);
        let mut nav = sandbox.navigation();
        let id = GhostId(1);

        nav.place_agent(id, Vec3::ZERO);
        nav.set_speed(id, 2.0);
        nav.set_destination(id, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(nav.remaining_distance(id), 10.0);

        sandbox.advance(1.0);
        assert_eq!(nav.agent_position(id), Some(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(nav.agent_velocity(id), Vec3::new(2.0, 0.0, 0.0));

        nav.set_stopped(id, true);
        sandbox.advance(1.0);
        assert_eq!(nav.agent_position(id), Some(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(nav.agent_velocity(id), Vec3::ZERO);
    }
}
