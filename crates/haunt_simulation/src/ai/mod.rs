//! Ghost AI: GhostBehaviorStateMachine (Patrolling / Chasing / Searching / Caught)
//!
//! - `components`: GhostAgent (параметры, масштабируемые сложностью), GhostTuning, GhostState
//! - `behavior`: чистый step одного призрака за тик
//! - `systems`: ECS обвязка (pose sync, FSM tick)
//! - `events`: переходы, proximity, catch

use bevy::prelude::*;

pub mod behavior;
pub mod components;
pub mod events;
pub mod systems;

pub use behavior::{step_ghost, StepReport, TickContext};
pub use components::{GhostAgent, GhostId, GhostState, GhostStateKind, GhostTuning, SearchPhase};
pub use events::{GhostStateChanged, ProximityReported, TargetCaught};

use crate::{GhostTick, TickSet};

/// Ghost AI Plugin
///
/// Порядок внутри `TickSet::Agents`:
/// 1. sync_ghost_poses: oracle → Transform
/// 2. ghost_behavior: FSM + PatrolPlanner
pub struct GhostAIPlugin;

impl Plugin for GhostAIPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<GhostStateChanged>()
            .add_event::<ProximityReported>()
            .add_event::<TargetCaught>()
            .register_type::<GhostAgent>()
            .register_type::<GhostTuning>()
            .register_type::<GhostState>();

        app.add_systems(
            GhostTick,
            (systems::sync_ghost_poses, systems::ghost_behavior)
                .chain()
                .in_set(TickSet::Agents),
        );
    }
}
