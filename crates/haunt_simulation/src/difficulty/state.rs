//! Difficulty resources: bounded level + player behavior accumulators.

use bevy::prelude::*;

use crate::config::DifficultyConfig;
use crate::logger;
use crate::telemetry::Pose;

/// Глобальная сложность сессии.
///
/// Инварианты:
/// - level всегда в [1, 3]
/// - `increase` сам по себе никогда не уменьшает level
/// - decay работает только пока level > 1 и не опускает ниже 1
#[derive(Resource, Debug, Clone, Copy, PartialEq, Reflect)]
#[reflect(Resource)]
pub struct DifficultyState {
    level: f32,
    pub change_rate: f32,
    /// Единиц уровня в секунду
    pub decay_rate: f32,
}

impl Default for DifficultyState {
    fn default() -> Self {
        Self::from_config(&DifficultyConfig::default())
    }
}

impl DifficultyState {
    pub const MIN_LEVEL: f32 = 1.0;
    pub const MAX_LEVEL: f32 = 3.0;

    pub fn new(level: f32, change_rate: f32, decay_rate: f32) -> Self {
        Self {
            level: level.clamp(Self::MIN_LEVEL, Self::MAX_LEVEL),
            change_rate,
            decay_rate,
        }
    }

    pub fn from_config(config: &DifficultyConfig) -> Self {
        Self::new(config.initial_level, config.change_rate, config.decay_rate)
    }

    pub fn current_level(&self) -> f32 {
        self.level
    }

    /// (level - 1) / 2: [1, 3] → [0, 1]
    pub fn normalized(&self) -> f32 {
        (self.level - Self::MIN_LEVEL) / (Self::MAX_LEVEL - Self::MIN_LEVEL)
    }

    /// level = min(3, level + amount * change_rate).
    ///
    /// Неположительные и не-finite amount игнорируются. Возвращает фактический прирост.
    pub fn increase(&mut self, amount: f32) -> f32 {
        if !(amount.is_finite() && amount > 0.0) {
            return 0.0;
        }

        let old_level = self.level;
        self.level = (self.level + amount * self.change_rate).min(Self::MAX_LEVEL);

        if self.level > old_level + 0.01 {
            logger::log(&format!(
                "Difficulty raised: {:.2} → {:.2}",
                old_level, self.level
            ));
        }

        self.level - old_level
    }

    /// Естественный спад к базовой сложности
    pub fn decay(&mut self, delta: f32) {
        if self.level > Self::MIN_LEVEL && delta > 0.0 {
            self.level = (self.level - self.decay_rate * delta).max(Self::MIN_LEVEL);
        }
    }

    /// Ручная установка (dev tooling), clamp в [1, 3]
    pub fn force_level(&mut self, level: f32) {
        if level.is_finite() {
            self.level = level.clamp(Self::MIN_LEVEL, Self::MAX_LEVEL);
            logger::log_info(&format!("Difficulty forced to {:.2}/3.0", self.level));
        }
    }
}

/// Прирост сложности от threshold агрегации за один интервал
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ThresholdImpacts {
    pub rotation: Option<f32>,
    pub movement: Option<f32>,
}

/// Аккумуляторы поведения игрока между проверками
#[derive(Resource, Debug, Clone, Default)]
pub struct BehaviorMonitor {
    pub last_head_pose: Option<Pose>,
    /// Поза пришла в текущем тике (без неё sample не пишется)
    pub pose_tracked: bool,
    /// Градусы с последней проверки
    pub rotation_accumulator: f32,
    /// Метры с последней проверки
    pub movement_accumulator: f32,
    pub since_last_check: f32,
    pub since_last_log: f32,

    pub current_rotation_speed: f32,
    pub current_movement_speed: f32,
    pub current_trigger_force: f32,
}

impl BehaviorMonitor {
    /// Накопить поворот/перемещение головы.
    ///
    /// Первая поза только запоминается как baseline.
    pub fn observe_pose(&mut self, pose: Pose, delta: f32) {
        if let Some(last) = self.last_head_pose {
            let rotation_diff = last.rotation.angle_between(pose.rotation).to_degrees();
            let movement_diff = last.position.distance(pose.position);

            self.rotation_accumulator += rotation_diff;
            self.movement_accumulator += movement_diff;

            if delta > 0.0 {
                self.current_rotation_speed = rotation_diff / delta;
                self.current_movement_speed = movement_diff / delta;
            }
        }

        self.last_head_pose = Some(pose);
    }

    /// Интенсивности для каждого триггера выше порога: min(1, value / threshold)
    pub fn observe_triggers(&mut self, values: &[f32], threshold: f32) -> Vec<f32> {
        self.current_trigger_force = values.iter().copied().fold(0.0, f32::max);

        values
            .iter()
            .filter(|&&value| value > threshold)
            .map(|&value| (value / threshold).min(1.0))
            .collect()
    }

    /// Сравнить аккумуляторы с порогами и сбросить их.
    ///
    /// intensity = min(1, accumulator / (threshold * 2)), impact = coefficient * intensity
    pub fn take_threshold_impacts(&mut self, config: &DifficultyConfig) -> ThresholdImpacts {
        let rotation = (self.rotation_accumulator > config.head_rotation_threshold).then(|| {
            let intensity =
                (self.rotation_accumulator / (config.head_rotation_threshold * 2.0)).min(1.0);
            config.fast_rotation_impact * intensity
        });

        let movement = (self.movement_accumulator > config.movement_threshold).then(|| {
            let intensity =
                (self.movement_accumulator / (config.movement_threshold * 2.0)).min(1.0);
            config.sudden_movement_impact * intensity
        });

        if rotation.is_some() {
            logger::log(&format!(
                "Fast head rotation: {:.1}°",
                self.rotation_accumulator
            ));
        }
        if movement.is_some() {
            logger::log(&format!(
                "Sudden movement: {:.2}m",
                self.movement_accumulator
            ));
        }

        self.rotation_accumulator = 0.0;
        self.movement_accumulator = 0.0;

        ThresholdImpacts { rotation, movement }
    }
}

/// lerp(min, max, 1 - proximity): чем ближе призрак, тем сильнее давление
pub fn proximity_impact(config: &DifficultyConfig, proximity: f32) -> f32 {
    let closeness = 1.0 - proximity.clamp(0.0, 1.0);
    config.proximity_min_impact
        + (config.proximity_max_impact - config.proximity_min_impact) * closeness
}
