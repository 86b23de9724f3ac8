//! GhostBehaviorStateMachine: один тик одного призрака
//!
//! Чистая функция над явным контекстом (oracle, perception world, planner, rng).
//! ECS система `ghost_behavior` только собирает контекст и раскладывает `StepReport`
//! по событиям и sinks, поэтому FSM тестируется без App.
//!
//! | From       | Condition                                              | To         |
//! |------------|--------------------------------------------------------|------------|
//! | Patrolling | patrol perception видит цель                           | Chasing    |
//! | Chasing    | distance < catch_distance                              | Caught     |
//! | Chasing    | distance > chase_radius ИЛИ (не видно И до last known < 2) | Searching |
//! | Searching  | видно (в пути или на месте)                            | Chasing    |
//! | Searching  | dwell таймер истёк                                     | Patrolling |

use bevy::prelude::*;
use rand_chacha::ChaCha8Rng;

use super::components::{GhostAgent, GhostState, GhostStateKind, GhostTuning, SearchPhase};
use crate::logger;
use crate::navigation::PathfindingOracle;
use crate::patrol::{planar_heading, PatrolEvent, PatrolPlanner};
use crate::perception::{self, PerceptionQuery, PerceptionTarget, PerceptionWorld};


/// Всё, что призрак видит/трогает за тик (кроме своих компонентов)
pub struct TickContext<'a> {
    pub oracle: &'a mut dyn PathfindingOracle,
    pub world: &'a dyn PerceptionWorld,
    pub planner: &'a PatrolPlanner,
    pub rng: &'a mut ChaCha8Rng,
    /// None: цели нет (не заспавнена / уничтожена) → не видно
    pub target: Option<PerceptionTarget>,
    pub delta: f32,
}

/// Итог тика (для событий и sinks)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepReport {
    pub transition: Option<(GhostStateKind, GhostStateKind)>,
    pub proximity: Option<f32>,
    pub caught: bool,
    /// Patrol → Chase: звук обнаружения
    pub detected: bool,
    /// Heartbeat on/off
    pub heartbeat: Option<bool>,
    pub patrol: Option<PatrolEvent>,
}

/// Один тик FSM.
///
/// Caught: ничего не делает. Остальные состояния см. таблицу в шапке модуля.
pub fn step_ghost(
    agent: &mut GhostAgent,
    tuning: &GhostTuning,
    state: &mut GhostState,
    transform: &mut Transform,
    ctx: &mut TickContext,
) -> StepReport {
    let mut report = StepReport::default();

    let next = match state {
        GhostState::Caught => None,

        GhostState::Patrolling { patrol } => {
            if ctx
                .planner
                .detects(transform, ctx.target.as_ref(), ctx.world)
            {
                report.detected = true;
                report.heartbeat = Some(true);
                Some(GhostState::Chasing)
            } else {
                report.patrol = Some(ctx.planner.step(
                    agent.id,
                    patrol,
                    transform,
                    &mut *ctx.oracle,
                    &mut *ctx.rng,
                    ctx.delta,
                ));
                None
            }
        }

        GhostState::Chasing => pursuit_checks(agent, tuning, transform, ctx, &mut report)
            .or_else(|| chase(agent, tuning, transform, ctx)),

        GhostState::Searching { phase } => pursuit_checks(agent, tuning, transform, ctx, &mut report)
            .or_else(|| search(agent, tuning, phase, transform, ctx, &mut report)),
    };

    if let Some(next) = next {
        let from = state.kind();
        *state = next;
        enter_state(&mut *agent, tuning, state, transform, ctx);
        report.transition = Some((from, state.kind()));

        logger::log_info(&format!("{}: {:?} → {:?}", agent.id, from, state.kind()));
    }

    report
}

/// Catch + proximity (любое не-patrol состояние)
fn pursuit_checks(
    agent: &GhostAgent,
    tuning: &GhostTuning,
    transform: &Transform,
    ctx: &TickContext,
    report: &mut StepReport,
) -> Option<GhostState> {
    let target = ctx.target?;
    let distance = transform.translation.distance(target.position);

    if distance < tuning.catch_distance {
        report.caught = true;
        logger::log_info(&format!("{} caught the target ({:.2}m)", agent.id, distance));
        return Some(GhostState::Caught);
    }

    let proximity_band = agent.current_detection_radius * 1.5;
    if distance < proximity_band {
        report.proximity = Some((distance / proximity_band).clamp(0.0, 1.0));
    }

    None
}

fn chase(
    agent: &mut GhostAgent,
    tuning: &GhostTuning,
    transform: &mut Transform,
    ctx: &mut TickContext,
) -> Option<GhostState> {
    let Some(target) = ctx.target else {
        // Цель пропала: доходим до last known позиции
        return Some(GhostState::searching());
    };

    ctx.oracle.set_destination(agent.id, target.position);
    face_towards(transform, target.position);
    agent.last_known_target_position = Some(target.position);

    let distance = transform.translation.distance(target.position);
    if distance > tuning.chase_radius {
        return Some(GhostState::searching());
    }

    if !sees_target(agent, tuning, transform, ctx) {
        let to_last_known = agent
            .last_known_target_position
            .map_or(f32::INFINITY, |last_known| transform.translation.distance(last_known));
        if to_last_known < tuning.lost_target_distance {
            return Some(GhostState::searching());
        }
    }

    None
}

fn search(
    agent: &GhostAgent,
    tuning: &GhostTuning,
    phase: &mut SearchPhase,
    transform: &mut Transform,
    ctx: &mut TickContext,
    report: &mut StepReport,
) -> Option<GhostState> {
    match *phase {
        SearchPhase::Travelling => {
            // В пути смотрим туда, куда идём
            ctx.planner
                .face_velocity(transform, ctx.oracle.agent_velocity(agent.id), ctx.delta);

            if sees_target(agent, tuning, transform, ctx) {
                report.heartbeat = Some(true);
                return Some(GhostState::Chasing);
            }

            let stopping_distance = ctx.planner.config().stopping_distance;
            if !ctx.oracle.path_pending(agent.id)
                && ctx.oracle.remaining_distance(agent.id) <= stopping_distance
            {
                *phase = SearchPhase::Dwelling {
                    remaining: tuning.search_duration,
                };
            }
            None
        }

        SearchPhase::Dwelling { remaining } => {
            transform.rotate_y((tuning.scan_rate * ctx.delta).to_radians());

            if sees_target(agent, tuning, transform, ctx) {
                report.heartbeat = Some(true);
                return Some(GhostState::Chasing);
            }

            let remaining = remaining - ctx.delta;
            if remaining <= 0.0 {
                report.heartbeat = Some(false);
                Some(GhostState::patrolling())
            } else {
                *phase = SearchPhase::Dwelling { remaining };
                None
            }
        }
    }
}

/// Вход в состояние: сброс движения предыдущего + скорость нового
fn enter_state(
    agent: &mut GhostAgent,
    tuning: &GhostTuning,
    state: &mut GhostState,
    transform: &mut Transform,
    ctx: &mut TickContext,
) {
    let id = agent.id;
    ctx.oracle.set_speed(id, agent.speed_for(state.kind()));

    match state {
        GhostState::Chasing => {
            ctx.oracle.set_stopped(id, false);
            if let Some(target) = ctx.target {
                ctx.oracle.set_destination(id, target.position);
                face_towards(transform, target.position);
                agent.last_known_target_position = Some(target.position);
            }
        }
        GhostState::Searching { phase } => {
            ctx.oracle.set_stopped(id, false);
            match agent.last_known_target_position {
                Some(last_known) => ctx.oracle.set_destination(id, last_known),
                // Некуда идти: сразу осматриваемся на месте
                None => {
                    *phase = SearchPhase::Dwelling {
                        remaining: tuning.search_duration,
                    }
                }
            }
        }
        GhostState::Caught => ctx.oracle.set_stopped(id, true),
        // Patrol выберет точку на следующем step (фаза Idle)
        GhostState::Patrolling { .. } => {}
    }
}

fn sees_target(
    agent: &GhostAgent,
    tuning: &GhostTuning,
    transform: &Transform,
    ctx: &TickContext,
) -> bool {
    let query = PerceptionQuery {
        radius: agent.current_detection_radius,
        field_of_view: tuning.chase_field_of_view,
        height_offsets: &tuning.height_offsets,
        layer_mask: tuning.detection_layers,
    };
    perception::visible(transform, ctx.target.as_ref(), &query, ctx.world)
}

/// Locked facing: логический heading строго на цель (в горизонтальной плоскости)
fn face_towards(transform: &mut Transform, point: Vec3) {
    if let Some(rotation) = planar_heading(point - transform.translation) {
        transform.rotation = rotation;
    }
}
