//! Navigation oracle: внешний navmesh/pathfinding сервис
//!
//! Симуляция не строит navmesh и не двигает агентов сама.
//! Она только спрашивает (sample/path) и отдаёт команды (destination/speed/stop).
//! Движок (или `sandbox`) реализует `PathfindingOracle` и двигает агентов между тиками.

use bevy::prelude::*;

use crate::ai::GhostId;

/// Статус рассчитанного пути
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum PathStatus {
    /// Путь доходит до цели
    Complete,
    /// Путь обрывается до цели
    Partial,
    /// Путь не найден
    Invalid,
}

/// Точка на навигационной поверхности
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavPoint {
    pub position: Vec3,
}

/// Результат `calculate_path`
#[derive(Debug, Clone, PartialEq)]
pub struct NavPath {
    pub status: PathStatus,
    pub corners: Vec<Vec3>,
}

impl NavPath {
    pub fn invalid() -> Self {
        Self {
            status: PathStatus::Invalid,
            corners: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == PathStatus::Complete
    }
}

/// Внешний pathfinding сервис (синхронные bounded-cost вызовы)
pub trait PathfindingOracle: Send + Sync + 'static {
    /// Ближайшая навигационная точка в радиусе `max_distance`
    fn sample_position(&self, point: Vec3, max_distance: f32) -> Option<NavPoint>;

    fn calculate_path(&self, from: Vec3, to: Vec3) -> NavPath;

    fn set_destination(&mut self, agent: GhostId, point: Vec3);

    fn remaining_distance(&self, agent: GhostId) -> f32;

    fn is_stopped(&self, agent: GhostId) -> bool;

    fn set_stopped(&mut self, agent: GhostId, stopped: bool);

    fn set_speed(&mut self, agent: GhostId, speed: f32);

    /// Регистрация агента при спавне
    fn place_agent(&mut self, agent: GhostId, position: Vec3);

    /// Текущая позиция агента (None если движок его потерял)
    fn agent_position(&self, agent: GhostId) -> Option<Vec3>;

    fn agent_velocity(&self, _agent: GhostId) -> Vec3 {
        Vec3::ZERO
    }

    /// Путь ещё считается (асинхронный navmesh)
    fn path_pending(&self, _agent: GhostId) -> bool {
        false
    }
}

/// Resource: oracle текущей сессии
#[derive(Resource)]
pub struct Navigation(pub Box<dyn PathfindingOracle>);

impl Navigation {
    pub fn new(oracle: impl PathfindingOracle) -> Self {
        Self(Box::new(oracle))
    }

    pub fn oracle(&self) -> &dyn PathfindingOracle {
        self.0.as_ref()
    }

    pub fn oracle_mut(&mut self) -> &mut dyn PathfindingOracle {
        self.0.as_mut()
    }
}
