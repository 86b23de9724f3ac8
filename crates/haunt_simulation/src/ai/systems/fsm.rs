//! Ghost FSM systems (pose sync + behavior tick)

use bevy::prelude::*;

use crate::ai::behavior::{step_ghost, TickContext};
use crate::ai::components::{GhostAgent, GhostId, GhostState, GhostTuning};
use crate::ai::events::{GhostStateChanged, ProximityReported, TargetCaught};
use crate::navigation::Navigation;
use crate::patrol::PatrolPlanner;
use crate::perception::PerceptionWorldRes;
use crate::session::{PursuitTarget, SessionState};
use crate::sinks::{SinkDispatcher, SinkMessage};
use crate::DeterministicRng;

/// Система: позиции агентов из oracle → Transform
///
/// Движок двигает агентов между тиками, ECS только читает результат.
/// Ориентацию (логический heading) ведёт FSM, её не трогаем.
pub fn sync_ghost_poses(navigation: Res<Navigation>, mut ghosts: Query<(&GhostAgent, &mut Transform)>) {
    let oracle = navigation.oracle();

    for (agent, mut transform) in ghosts.iter_mut() {
        if let Some(position) = oracle.agent_position(agent.id) {
            transform.translation = position;
        }
    }
}

/// Система: один тик FSM для каждого призрака
///
/// Порядок агентов: по GhostId (RNG расходуется детерминированно).
/// Сессия закончена (пойман/сбежал) → FSM заморожены.
pub fn ghost_behavior(
    mut ghosts: Query<(
        Entity,
        &mut GhostAgent,
        &GhostTuning,
        &mut GhostState,
        &mut Transform,
    )>,
    mut navigation: ResMut<Navigation>,
    perception: Res<PerceptionWorldRes>,
    planner: Res<PatrolPlanner>,
    target: Res<PursuitTarget>,
    session: Res<SessionState>,
    mut rng: ResMut<DeterministicRng>,
    sinks: Res<SinkDispatcher>,
    time: Res<Time>,
    mut transitions: EventWriter<GhostStateChanged>,
    mut proximity_reports: EventWriter<ProximityReported>,
    mut caught_events: EventWriter<TargetCaught>,
) {
    if session.is_over() {
        return;
    }

    let delta = time.delta_secs();
    let perception_target = target.perception_target();

    let mut order: Vec<(GhostId, Entity)> = ghosts
        .iter()
        .map(|(entity, agent, ..)| (agent.id, entity))
        .collect();
    order.sort_unstable_by_key(|(id, _)| *id);

    for (ghost, entity) in order {
        let Ok((_, mut agent, tuning, mut state, mut transform)) = ghosts.get_mut(entity) else {
            continue;
        };

        let mut ctx = TickContext {
            oracle: navigation.oracle_mut(),
            world: perception.world(),
            planner: &*planner,
            rng: &mut rng.rng,
            target: perception_target,
            delta,
        };

        let report = step_ghost(&mut agent, tuning, &mut state, &mut transform, &mut ctx);

        if report.detected {
            sinks.send(SinkMessage::GhostDetected {
                ghost,
                position: transform.translation,
            });
        }
        if let Some(chasing) = report.heartbeat {
            sinks.send(SinkMessage::Heartbeat(chasing));
        }
        if let Some(proximity) = report.proximity {
            proximity_reports.write(ProximityReported { ghost, proximity });
        }
        if let Some((from, to)) = report.transition {
            transitions.write(GhostStateChanged { ghost, from, to });
        }
        if report.caught {
            caught_events.write(TargetCaught { ghost });
            // Game over: остальные призраки в этом тике уже не ходят
            break;
        }
    }
}
