//! DifficultySignalProcessor
//!
//! Телеметрия игрока + дискретные события → bounded difficulty level [1, 3].
//!
//! Два пути роста:
//! 1. Threshold агрегация (раз в `check_interval`): накопленный поворот/перемещение головы
//! 2. Дискретные события: предмет, сжатый триггер, близость призрака (через FeedbackBus)
//!
//! Спад: каждый тик пока level > 1. Выход: `normalized = (level - 1) / 2`.

use bevy::prelude::*;

pub mod events;
pub mod state;
pub mod systems;

#[cfg(test)]
mod processor_tests;

pub use events::{DifficultyChanged, ItemCollected};
pub use state::{proximity_impact, BehaviorMonitor, DifficultyState, ThresholdImpacts};

use crate::{GhostTick, TickSet};

/// Difficulty Plugin
///
/// Порядок внутри тика:
/// 1. monitor_player_behavior: телеметрия → аккумуляторы, grip
/// 2. apply_threshold_aggregation: пороги раз в check_interval
/// 3. apply_difficulty_events: предметы
/// 4. decay_difficulty: спад
/// 5. record_telemetry_sample: sampling tick для TelemetryLogger
pub struct DifficultyPlugin;

impl Plugin for DifficultyPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<ItemCollected>()
            .add_event::<DifficultyChanged>()
            .init_resource::<BehaviorMonitor>();

        app.add_systems(
            GhostTick,
            (
                systems::monitor_player_behavior,
                systems::apply_threshold_aggregation,
                systems::apply_difficulty_events,
                systems::decay_difficulty,
                systems::record_telemetry_sample,
            )
                .chain()
                .in_set(TickSet::Difficulty),
        );
    }
}
