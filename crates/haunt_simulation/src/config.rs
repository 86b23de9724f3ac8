//! Конфигурация симуляции (difficulty, patrol, ghost, session)
//!
//! Все структуры `#[serde(default)]`: JSON файл может переопределить только нужные поля.
//! Валидация выполняется один раз при сборке Session / спавне призрака,
//! в runtime ошибки конфигурации не возникают.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use bevy::prelude::*;
use serde::Deserialize;
use thiserror::Error;

/// Высоты лучей perception (метры над позицией наблюдателя)
pub const DEFAULT_HEIGHT_OFFSETS: [f32; 5] = [0.1, 0.5, 1.0, 1.5, 2.0];

/// Доля радиуса, внутри которой FOV не проверяется
pub const NEAR_FIELD_FRACTION: f32 = 0.3;

/// Маска "все слои"
pub const ALL_LAYERS: u32 = u32::MAX;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f32 },

    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("{field}: lower bound {min} exceeds upper bound {max}")]
    InvertedRange { field: &'static str, min: f32, max: f32 },

    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f32 },

    #[error("{field} must be at least 1")]
    ZeroCount { field: &'static str },

    #[error("session requires a {0} collaborator")]
    MissingCollaborator(&'static str),

    #[error("ghost {0} is already registered")]
    DuplicateGhost(u32),

    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: f32::INFINITY,
        })
    }
}

fn within(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

fn finite(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite { field, value })
    }
}

fn ordered(field: &'static str, min: f32, max: f32) -> Result<(), ConfigError> {
    if min <= max {
        Ok(())
    } else {
        Err(ConfigError::InvertedRange { field, min, max })
    }
}

/// Корневая конфигурация
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub difficulty: DifficultyConfig,
    pub patrol: PatrolConfig,
    pub ghost: GhostConfig,
    pub session: SessionConfig,
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.difficulty.validate()?;
        self.patrol.validate()?;
        self.ghost.validate()?;
        self.session.validate()
    }
}

/// Параметры DifficultySignalProcessor
#[derive(Resource, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DifficultyConfig {
    /// Стартовый уровень (1..3)
    pub initial_level: f32,
    pub change_rate: f32,
    /// Единиц уровня в секунду
    pub decay_rate: f32,

    /// Градусы поворота головы за интервал проверки
    pub head_rotation_threshold: f32,
    /// Метры перемещения головы за интервал проверки
    pub movement_threshold: f32,
    pub trigger_threshold: f32,

    pub sudden_movement_impact: f32,
    pub fast_rotation_impact: f32,
    pub trigger_grip_impact: f32,
    pub item_collected_impact: f32,
    pub proximity_min_impact: f32,
    pub proximity_max_impact: f32,
    /// Множитель haptic импульса при сжатии триггера
    pub grip_haptic_scale: f32,

    /// Интервал threshold агрегации (секунды)
    pub check_interval: f32,

    pub enable_data_logging: bool,
    pub data_log_interval: f32,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            initial_level: 1.0,
            change_rate: 0.05,
            decay_rate: 0.025,
            head_rotation_threshold: 30.0,
            movement_threshold: 0.5,
            trigger_threshold: 0.7,
            sudden_movement_impact: 0.1,
            fast_rotation_impact: 0.1,
            trigger_grip_impact: 0.05,
            item_collected_impact: 0.15,
            proximity_min_impact: 0.05,
            proximity_max_impact: 0.15,
            grip_haptic_scale: 0.2,
            check_interval: 0.5,
            enable_data_logging: true,
            data_log_interval: 0.5,
        }
    }
}

impl DifficultyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        within("difficulty.initial_level", self.initial_level, 1.0, 3.0)?;
        positive("difficulty.change_rate", self.change_rate)?;
        positive("difficulty.decay_rate", self.decay_rate)?;
        positive("difficulty.head_rotation_threshold", self.head_rotation_threshold)?;
        positive("difficulty.movement_threshold", self.movement_threshold)?;
        positive("difficulty.trigger_threshold", self.trigger_threshold)?;
        non_negative("difficulty.sudden_movement_impact", self.sudden_movement_impact)?;
        non_negative("difficulty.fast_rotation_impact", self.fast_rotation_impact)?;
        non_negative("difficulty.trigger_grip_impact", self.trigger_grip_impact)?;
        non_negative("difficulty.item_collected_impact", self.item_collected_impact)?;
        non_negative("difficulty.proximity_min_impact", self.proximity_min_impact)?;
        non_negative("difficulty.proximity_max_impact", self.proximity_max_impact)?;
        non_negative("difficulty.grip_haptic_scale", self.grip_haptic_scale)?;
        positive("difficulty.check_interval", self.check_interval)?;
        positive("difficulty.data_log_interval", self.data_log_interval)
    }
}

/// Параметры PatrolPlanner (общие для всех призраков)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatrolConfig {
    pub min_wander_distance: f32,
    pub max_wander_distance: f32,
    pub wait_at_point_time: f32,
    /// Stuck-timeout одной попытки дойти до точки
    pub max_travel_time: f32,
    pub use_preferred_direction: bool,
    /// Вероятность продолжить примерно в прежнем направлении
    pub preferred_direction_probability: f32,
    pub restrict_to_level_y: bool,
    pub y_level_offset: f32,
    pub max_attempts: u32,
    pub fallback_attempts: u32,
    /// Пауза перед повтором, если не нашли ни одной точки
    pub retry_delay: f32,
    pub stopping_distance: f32,

    /// Patrol-specific perception (не масштабируется сложностью)
    pub detection_radius: f32,
    pub field_of_view: f32,
    pub detection_layers: u32,

    /// Скорость доворота к направлению движения
    pub turn_rate: f32,
}

impl Default for PatrolConfig {
    fn default() -> Self {
        Self {
            min_wander_distance: 20.0,
            max_wander_distance: 50.0,
            wait_at_point_time: 2.0,
            max_travel_time: 30.0,
            use_preferred_direction: true,
            preferred_direction_probability: 0.7,
            restrict_to_level_y: true,
            y_level_offset: 0.1,
            max_attempts: 30,
            fallback_attempts: 10,
            retry_delay: 3.0,
            stopping_distance: 0.5,
            detection_radius: 10.0,
            field_of_view: 90.0,
            detection_layers: ALL_LAYERS,
            turn_rate: 5.0,
        }
    }
}

impl PatrolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("patrol.min_wander_distance", self.min_wander_distance)?;
        positive("patrol.max_wander_distance", self.max_wander_distance)?;
        ordered(
            "patrol.wander_distance",
            self.min_wander_distance,
            self.max_wander_distance,
        )?;
        non_negative("patrol.wait_at_point_time", self.wait_at_point_time)?;
        positive("patrol.max_travel_time", self.max_travel_time)?;
        finite("patrol.y_level_offset", self.y_level_offset)?;
        within(
            "patrol.preferred_direction_probability",
            self.preferred_direction_probability,
            0.0,
            1.0,
        )?;
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroCount {
                field: "patrol.max_attempts",
            });
        }
        positive("patrol.retry_delay", self.retry_delay)?;
        non_negative("patrol.stopping_distance", self.stopping_distance)?;
        positive("patrol.detection_radius", self.detection_radius)?;
        within("patrol.field_of_view", self.field_of_view, 0.0, 360.0)?;
        positive("patrol.turn_rate", self.turn_rate)
    }
}

/// Базовые параметры призрака (per-agent, можно переопределить при спавне)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GhostConfig {
    pub walk_speed: f32,
    pub run_speed: f32,
    pub detection_radius: f32,
    pub chase_radius: f32,
    pub catch_distance: f32,
    pub search_duration: f32,
    pub max_speed_increase: f32,
    pub max_detection_increase: f32,
    /// Chase/search FOV (градусы, полный угол)
    pub chase_field_of_view: f32,
    /// Скорость осмотра на месте во время search dwell (градусы/сек)
    pub scan_rate: f32,
    /// Дистанция до last known позиции, при которой потеря цели = Searching
    pub lost_target_distance: f32,
    /// Поправка ориентации рига при Chasing (только для рендера)
    pub facing_offset_degrees: f32,
    pub detection_layers: u32,
}

impl Default for GhostConfig {
    fn default() -> Self {
        Self {
            walk_speed: 1.2,
            run_speed: 3.5,
            detection_radius: 10.0,
            chase_radius: 15.0,
            catch_distance: 1.5,
            search_duration: 5.0,
            max_speed_increase: 1.0,
            max_detection_increase: 5.0,
            chase_field_of_view: 240.0,
            scan_rate: 120.0,
            lost_target_distance: 2.0,
            facing_offset_degrees: 0.0,
            detection_layers: ALL_LAYERS,
        }
    }
}

impl GhostConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("ghost.walk_speed", self.walk_speed)?;
        positive("ghost.run_speed", self.run_speed)?;
        positive("ghost.detection_radius", self.detection_radius)?;
        positive("ghost.chase_radius", self.chase_radius)?;
        positive("ghost.catch_distance", self.catch_distance)?;
        positive("ghost.search_duration", self.search_duration)?;
        non_negative("ghost.max_speed_increase", self.max_speed_increase)?;
        non_negative("ghost.max_detection_increase", self.max_detection_increase)?;
        within("ghost.chase_field_of_view", self.chase_field_of_view, 0.0, 360.0)?;
        positive("ghost.scan_rate", self.scan_rate)?;
        finite("ghost.facing_offset_degrees", self.facing_offset_degrees)?;
        positive("ghost.lost_target_distance", self.lost_target_distance)
    }
}

/// Параметры сессии (предметы, выход)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub total_items: u32,
    /// Точка выхода [x, y, z]; None = побег не отслеживается
    pub exit_position: Option<[f32; 3]>,
    pub exit_proximity: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            total_items: 5,
            exit_position: None,
            exit_proximity: 2.0,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("session.exit_proximity", self.exit_proximity)
    }

    pub fn exit_point(&self) -> Option<Vec3> {
        self.exit_position.map(Vec3::from_array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SimulationConfig::from_json_str(
            r#"{ "difficulty": { "decay_rate": 0.05 }, "ghost": { "run_speed": 4.0 } }"#,
        )
        .expect("partial config should parse");

        assert_eq!(config.difficulty.decay_rate, 0.05);
        assert_eq!(config.difficulty.change_rate, 0.05);
        assert_eq!(config.ghost.run_speed, 4.0);
        assert_eq!(config.patrol.max_attempts, 30);
    }

    #[test]
    fn test_rejects_non_positive_radius() {
        let mut config = GhostConfig::default();
        config.detection_radius = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive { field: "ghost.detection_radius", .. })
        ));
    }

    #[test]
    fn test_rejects_inverted_wander_range() {
        let mut config = PatrolConfig::default();
        config.min_wander_distance = 60.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_rejects_negative_threshold_in_json() {
        let result = SimulationConfig::from_json_str(
            r#"{ "difficulty": { "trigger_threshold": -1.0 } }"#,
        );
        assert!(matches!(result, Err(ConfigError::NonPositive { .. })));
    }

    #[test]
    fn test_rejects_non_finite_offsets() {
        let patrol = PatrolConfig {
            y_level_offset: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(
            patrol.validate(),
            Err(ConfigError::NonFinite { field: "patrol.y_level_offset", .. })
        ));

        let ghost = GhostConfig {
            facing_offset_degrees: f32::INFINITY,
            ..Default::default()
        };
        assert!(matches!(
            ghost.validate(),
            Err(ConfigError::NonFinite { field: "ghost.facing_offset_degrees", .. })
        ));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let result = SimulationConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
