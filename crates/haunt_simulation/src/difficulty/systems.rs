//! DifficultySignalProcessor systems (порядок задаётся в DifficultyPlugin).

use bevy::prelude::*;

use super::events::ItemCollected;
use super::state::{BehaviorMonitor, DifficultyState};
use crate::config::DifficultyConfig;
use crate::logger;
use crate::sinks::{SinkDispatcher, SinkMessage};
use crate::telemetry::{Telemetry, TelemetrySample};

/// Система: телеметрия → аккумуляторы + grip события
///
/// Нет head pose → pose-агрегация пропускается (не ошибка).
/// Триггеры обрабатываются независимо от head tracking.
pub fn monitor_player_behavior(
    telemetry: Res<Telemetry>,
    config: Res<DifficultyConfig>,
    mut monitor: ResMut<BehaviorMonitor>,
    mut difficulty: ResMut<DifficultyState>,
    sinks: Res<SinkDispatcher>,
    time: Res<Time>,
) {
    let delta = time.delta_secs();
    let source = telemetry.source();

    let pose = source.current_head_pose();
    monitor.pose_tracked = pose.is_some();
    if let Some(pose) = pose {
        monitor.observe_pose(pose, delta);
    }

    let triggers = source.current_trigger_values();
    for intensity in monitor.observe_triggers(&triggers, config.trigger_threshold) {
        difficulty.increase(config.trigger_grip_impact * intensity);
        sinks.send(SinkMessage::GripIntensity(config.grip_haptic_scale * intensity));
    }
}

/// Система: threshold агрегация раз в `check_interval`
pub fn apply_threshold_aggregation(
    config: Res<DifficultyConfig>,
    mut monitor: ResMut<BehaviorMonitor>,
    mut difficulty: ResMut<DifficultyState>,
    time: Res<Time>,
) {
    monitor.since_last_check += time.delta_secs();
    if monitor.since_last_check < config.check_interval {
        return;
    }
    monitor.since_last_check = 0.0;

    let impacts = monitor.take_threshold_impacts(&config);
    if let Some(impact) = impacts.rotation {
        difficulty.increase(impact);
    }
    if let Some(impact) = impacts.movement {
        difficulty.increase(impact);
    }
}

/// Система: дискретные события (предмет подобран)
pub fn apply_difficulty_events(
    mut items: EventReader<ItemCollected>,
    config: Res<DifficultyConfig>,
    mut difficulty: ResMut<DifficultyState>,
    sinks: Res<SinkDispatcher>,
) {
    for _ in items.read() {
        difficulty.increase(config.item_collected_impact);
        sinks.send(SinkMessage::ItemCollected);
    }
}

/// Система: непрерывный спад
pub fn decay_difficulty(mut difficulty: ResMut<DifficultyState>, time: Res<Time>) {
    difficulty.decay(time.delta_secs());
}

/// Система: TelemetrySample раз в `data_log_interval`
pub fn record_telemetry_sample(
    config: Res<DifficultyConfig>,
    mut monitor: ResMut<BehaviorMonitor>,
    difficulty: Res<DifficultyState>,
    sinks: Res<SinkDispatcher>,
    time: Res<Time>,
) {
    if !config.enable_data_logging {
        return;
    }

    monitor.since_last_log += time.delta_secs();
    if monitor.since_last_log < config.data_log_interval {
        return;
    }
    monitor.since_last_log = 0.0;

    // Потеря трекинга: пропускаем sample, а не пишем замороженную позу
    if !monitor.pose_tracked {
        return;
    }
    let Some(pose) = monitor.last_head_pose else {
        return;
    };

    sinks.send(SinkMessage::Telemetry(TelemetrySample {
        timestamp: time.elapsed_secs(),
        difficulty_level: difficulty.current_level(),
        head_rotation_speed: monitor.current_rotation_speed,
        movement_speed: monitor.current_movement_speed,
        trigger_force: monitor.current_trigger_force,
        position: pose.position,
        orientation: pose.rotation,
    }));

    logger::log(&format!(
        "Telemetry: level {:.2}, rotation {:.1}°/s, movement {:.2}m/s, trigger {:.2}",
        difficulty.current_level(),
        monitor.current_rotation_speed,
        monitor.current_movement_speed,
        monitor.current_trigger_force
    ));
}
