//! Player telemetry (head pose, controller triggers)
//!
//! Источник данных внешний (XR runtime / sandbox). Ядро только читает
//! текущие значения раз в тик и агрегирует их в `BehaviorMonitor`.

use bevy::prelude::*;

/// Поза головы игрока
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }
}

/// Внешний источник телеметрии
pub trait TelemetrySource: Send + Sync + 'static {
    /// None: нет head tracking в этот тик (агрегация пропускается)
    fn current_head_pose(&self) -> Option<Pose>;

    /// Сила нажатия триггеров всех контроллеров (0..1)
    fn current_trigger_values(&self) -> Vec<f32>;
}

/// Источник без данных (headless без игрока)
pub struct NoTelemetry;

impl TelemetrySource for NoTelemetry {
    fn current_head_pose(&self) -> Option<Pose> {
        None
    }

    fn current_trigger_values(&self) -> Vec<f32> {
        Vec::new()
    }
}

/// Resource: telemetry source текущей сессии
#[derive(Resource)]
pub struct Telemetry(pub Box<dyn TelemetrySource>);

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(NoTelemetry)
    }
}

impl Telemetry {
    pub fn new(source: impl TelemetrySource) -> Self {
        Self(Box::new(source))
    }

    pub fn source(&self) -> &dyn TelemetrySource {
        self.0.as_ref()
    }
}

/// Снимок поведения игрока на sampling tick (уходит в TelemetryLogger)
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    /// Время симуляции (секунды)
    pub timestamp: f32,
    pub difficulty_level: f32,
    /// Градусы/сек
    pub head_rotation_speed: f32,
    /// Метры/сек
    pub movement_speed: f32,
    pub trigger_force: f32,
    pub position: Vec3,
    pub orientation: Quat,
}
