//! DifficultyFeedbackBus
//!
//! Замыкает петлю:
//! - `publish_difficulty`: normalized → все GhostAgent (радиус/скорости) + audio/haptics sinks
//! - `route_proximity_reports`: proximity от призраков → DifficultyState + haptics
//!
//! publish отрабатывает ДО FSM в том же тике: каждый агент видит один и тот же
//! snapshot сложности, порядок агентов не важен.

use bevy::prelude::*;

use crate::ai::{GhostAgent, GhostState, ProximityReported};
use crate::config::DifficultyConfig;
use crate::difficulty::{proximity_impact, DifficultyChanged, DifficultyState};
use crate::navigation::Navigation;
use crate::sinks::{SinkDispatcher, SinkMessage};
use crate::{GhostTick, TickSet};

#[cfg(test)]
mod feedback_tests;

/// Последнее опубликованное normalized значение (для on-change уведомлений)
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq)]
pub struct PublishedDifficulty {
    pub normalized: Option<f32>,
}

/// Система: normalized сложность → агенты и sinks
///
/// Агенты получают значение каждый тик (новые агенты подхватываются сразу),
/// sinks и `DifficultyChanged` только при изменении.
pub fn publish_difficulty(
    difficulty: Res<DifficultyState>,
    mut published: ResMut<PublishedDifficulty>,
    mut ghosts: Query<(&mut GhostAgent, &GhostState)>,
    mut navigation: ResMut<Navigation>,
    sinks: Res<SinkDispatcher>,
    mut changed: EventWriter<DifficultyChanged>,
) {
    let normalized = difficulty.normalized();
    let oracle = navigation.oracle_mut();

    for (mut agent, state) in ghosts.iter_mut() {
        agent.set_normalized_difficulty(normalized);
        if !matches!(state, GhostState::Caught) {
            oracle.set_speed(agent.id, agent.speed_for(state.kind()));
        }
    }

    if published.normalized != Some(normalized) {
        published.normalized = Some(normalized);
        sinks.send(SinkMessage::Difficulty(normalized));
        changed.write(DifficultyChanged {
            level: difficulty.current_level(),
            normalized,
        });
    }
}

/// Система: proximity → рост сложности (масштаб по dt) + haptics
pub fn route_proximity_reports(
    mut reports: EventReader<ProximityReported>,
    config: Res<DifficultyConfig>,
    mut difficulty: ResMut<DifficultyState>,
    sinks: Res<SinkDispatcher>,
    time: Res<Time>,
) {
    let delta = time.delta_secs();

    for report in reports.read() {
        difficulty.increase(proximity_impact(&config, report.proximity) * delta);
        sinks.send(SinkMessage::Proximity(report.proximity));
    }
}

/// Feedback Plugin
pub struct FeedbackPlugin;

impl Plugin for FeedbackPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PublishedDifficulty>();

        app.add_systems(GhostTick, publish_difficulty.in_set(TickSet::Publish))
            .add_systems(GhostTick, route_proximity_reports.in_set(TickSet::FeedbackRoute));
    }
}
