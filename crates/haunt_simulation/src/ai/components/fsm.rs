//! Ghost FSM components (state machine, agent parameters, per-agent tuning).

use bevy::prelude::*;

use crate::config::{GhostConfig, DEFAULT_HEIGHT_OFFSETS};
use crate::patrol::PatrolProgress;

/// Стабильный идентификатор призрака (ключ для oracle и событий)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Reflect)]
pub struct GhostId(pub u32);

impl std::fmt::Display for GhostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ghost#{}", self.0)
    }
}

/// Ghost FSM состояния
///
/// Таймеры живут внутри вариантов: вход в новое состояние = новый variant,
/// прогресс предыдущего состояния физически не может "протечь".
#[derive(Component, Debug, Clone, PartialEq, Reflect)]
#[reflect(Component)]
pub enum GhostState {
    /// Patrol: бродим по случайным точкам (PatrolPlanner)
    Patrolling { patrol: PatrolProgress },

    /// Chase: бежим к цели, facing зафиксирован на цели
    Chasing,

    /// Search: идём к last known позиции, потом осматриваемся
    Searching { phase: SearchPhase },

    /// Caught: цель поймана, терминальное состояние
    Caught,
}

impl Default for GhostState {
    fn default() -> Self {
        Self::patrolling()
    }
}

impl GhostState {
    pub fn patrolling() -> Self {
        Self::Patrolling {
            patrol: PatrolProgress::default(),
        }
    }

    pub fn searching() -> Self {
        Self::Searching {
            phase: SearchPhase::Travelling,
        }
    }

    pub fn kind(&self) -> GhostStateKind {
        match self {
            GhostState::Patrolling { .. } => GhostStateKind::Patrolling,
            GhostState::Chasing => GhostStateKind::Chasing,
            GhostState::Searching { .. } => GhostStateKind::Searching,
            GhostState::Caught => GhostStateKind::Caught,
        }
    }
}

/// Фаза поиска
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub enum SearchPhase {
    /// Идём к last known позиции
    Travelling,
    /// На месте: крутимся и смотрим (оставшееся время)
    Dwelling { remaining: f32 },
}

/// Тип состояния без данных (для событий и логов)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum GhostStateKind {
    Patrolling,
    Chasing,
    Searching,
    Caught,
}

/// Параметры призрака, масштабируемые сложностью
///
/// Пишут только FSM (last known позиция) и FeedbackBus (current_*),
/// никогда одновременно: bus отрабатывает до FSM в том же тике.
#[derive(Component, Debug, Clone, PartialEq, Reflect)]
#[reflect(Component)]
pub struct GhostAgent {
    pub id: GhostId,

    pub base_walk_speed: f32,
    pub base_run_speed: f32,
    pub base_detection_radius: f32,

    pub current_walk_speed: f32,
    pub current_run_speed: f32,
    pub current_detection_radius: f32,

    pub max_speed_increase: f32,
    pub max_detection_increase: f32,

    pub last_known_target_position: Option<Vec3>,
}

impl GhostAgent {
    pub fn new(id: GhostId, config: &GhostConfig) -> Self {
        Self {
            id,
            base_walk_speed: config.walk_speed,
            base_run_speed: config.run_speed,
            base_detection_radius: config.detection_radius,
            current_walk_speed: config.walk_speed,
            current_run_speed: config.run_speed,
            current_detection_radius: config.detection_radius,
            max_speed_increase: config.max_speed_increase,
            max_detection_increase: config.max_detection_increase,
            last_known_target_position: None,
        }
    }

    /// Масштабирование от normalized сложности [0, 1]
    ///
    /// - detection = base + maxDetectionIncrease * n
    /// - walk = base + 0.5 * maxSpeedIncrease * n
    /// - run = base + maxSpeedIncrease * n
    pub fn set_normalized_difficulty(&mut self, normalized: f32) {
        let n = if normalized.is_finite() {
            normalized.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.current_detection_radius = self.base_detection_radius + self.max_detection_increase * n;
        self.current_walk_speed = self.base_walk_speed + 0.5 * self.max_speed_increase * n;
        self.current_run_speed = self.base_run_speed + self.max_speed_increase * n;
    }

    /// Chase бегом, всё остальное шагом
    pub fn speed_for(&self, state: GhostStateKind) -> f32 {
        match state {
            GhostStateKind::Chasing => self.current_run_speed,
            _ => self.current_walk_speed,
        }
    }
}

/// Per-agent perception/pursuit настройки (не масштабируются сложностью)
#[derive(Component, Debug, Clone, PartialEq, Reflect)]
#[reflect(Component)]
pub struct GhostTuning {
    pub chase_radius: f32,
    pub catch_distance: f32,
    pub search_duration: f32,
    /// Полный угол обзора при chase/search (градусы)
    pub chase_field_of_view: f32,
    /// Градусы/сек при осмотре во время search dwell
    pub scan_rate: f32,
    pub lost_target_distance: f32,
    /// Поправка рига при Chasing, влияет только на render_rotation
    pub facing_offset_degrees: f32,
    pub detection_layers: u32,
    pub height_offsets: Vec<f32>,
}

impl Default for GhostTuning {
    fn default() -> Self {
        Self::from_config(&GhostConfig::default())
    }
}

impl GhostTuning {
    pub fn from_config(config: &GhostConfig) -> Self {
        Self {
            chase_radius: config.chase_radius,
            catch_distance: config.catch_distance,
            search_duration: config.search_duration,
            chase_field_of_view: config.chase_field_of_view,
            scan_rate: config.scan_rate,
            lost_target_distance: config.lost_target_distance,
            facing_offset_degrees: config.facing_offset_degrees,
            detection_layers: config.detection_layers,
            height_offsets: DEFAULT_HEIGHT_OFFSETS.to_vec(),
        }
    }

    /// Ориентация для рендера: логический heading + поправка рига (только в Chasing)
    pub fn render_rotation(&self, state: &GhostState, heading: Quat) -> Quat {
        if matches!(state, GhostState::Chasing) && self.facing_offset_degrees != 0.0 {
            heading * Quat::from_rotation_y(self.facing_offset_degrees.to_radians())
        } else {
            heading
        }
    }
}
