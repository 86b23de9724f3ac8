//! PatrolPlanner: выбор и валидация wander-точек
//!
//! Лестница повторов:
//! 1. `max_attempts` кандидатов на дистанции [min_wander, max_wander]
//! 2. `fallback_attempts` кандидатов в диске радиуса min_wander * 0.5
//! 3. ничего не нашли → `RetryDelay` (без ошибки), потом всё заново
//!
//! Точка принимается ТОЛЬКО если путь Complete (Partial/Invalid отбрасываются).
//! Планировщик общий для всех призраков (resource), прогресс хранится в
//! `PatrolProgress` внутри `GhostState::Patrolling`.

use bevy::prelude::*;
use rand::Rng;

use crate::ai::GhostId;
use crate::config::{PatrolConfig, DEFAULT_HEIGHT_OFFSETS};
use crate::logger;
use crate::navigation::{PathStatus, PathfindingOracle};
use crate::perception::{self, PerceptionQuery, PerceptionTarget, PerceptionWorld};


/// Порог скорости, ниже которого facing не доворачивается
const MIN_FACING_SPEED: f32 = 0.1;

/// Stuck-таймауты подряд, после которых пишем warning
const STUCK_WARNING_THRESHOLD: u32 = 3;

/// Фаза патрулирования (таймеры внутри вариантов)
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub enum PatrolPhase {
    /// Нужна новая точка (следующий step выберет её)
    Idle,
    /// Идём к точке; `elapsed` для stuck-timeout
    Travelling { destination: Vec3, elapsed: f32 },
    /// Стоим на точке
    Waiting { remaining: f32 },
    /// Ни одной валидной точки: пауза перед повтором
    RetryDelay { remaining: f32 },
}

/// Прогресс патруля одного призрака
#[derive(Debug, Clone, PartialEq, Reflect)]
pub struct PatrolProgress {
    pub phase: PatrolPhase,
    /// Горизонтальное направление последней wander-точки
    pub last_direction: Option<Vec3>,
    /// Stuck-таймауты подряд (сбрасывается при прибытии)
    pub failed_attempts: u32,
}

impl Default for PatrolProgress {
    fn default() -> Self {
        Self {
            phase: PatrolPhase::Idle,
            last_direction: None,
            failed_attempts: 0,
        }
    }
}

/// Принятая точка патруля (эфемерная)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatrolDestination {
    pub point: Vec3,
    pub path_status: PathStatus,
}

/// Результат выбора точки
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DestinationChoice {
    /// Обычная wander-точка
    Wander(PatrolDestination),
    /// Аварийная короткая точка (основной бюджет исчерпан)
    ShortRange(PatrolDestination),
    /// Оба бюджета исчерпаны
    Exhausted,
}

/// Что произошло за один patrol step
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PatrolEvent {
    /// Ничего нового (идём / ждём)
    Continue,
    DestinationSet(Vec3),
    Arrived,
    StuckTimeout,
    RetryScheduled,
}

/// Общий планировщик патруля
#[derive(Resource, Debug, Clone)]
pub struct PatrolPlanner {
    config: PatrolConfig,
    height_offsets: Vec<f32>,
}

impl Default for PatrolPlanner {
    fn default() -> Self {
        Self::new(PatrolConfig::default())
    }
}

impl PatrolPlanner {
    pub fn new(config: PatrolConfig) -> Self {
        Self {
            config,
            height_offsets: DEFAULT_HEIGHT_OFFSETS.to_vec(),
        }
    }

    pub fn config(&self) -> &PatrolConfig {
        &self.config
    }

    /// Patrol-specific perception (свой радиус/FOV, не масштабируется сложностью)
    pub fn detects(
        &self,
        observer: &Transform,
        target: Option<&PerceptionTarget>,
        world: &dyn PerceptionWorld,
    ) -> bool {
        let query = PerceptionQuery {
            radius: self.config.detection_radius,
            field_of_view: self.config.field_of_view,
            height_offsets: &self.height_offsets,
            layer_mask: self.config.detection_layers,
        };
        perception::visible(observer, target, &query, world)
    }

    /// Направление кандидата (горизонтальное, нормализованное).
    ///
    /// С вероятностью p: прежнее направление ± до 90°, иначе полностью случайное.
    pub fn candidate_heading<R: Rng + ?Sized>(&self, last_direction: Option<Vec3>, rng: &mut R) -> Vec3 {
        if self.config.use_preferred_direction {
            if let Some(last) = last_direction {
                if rng.gen_bool(self.config.preferred_direction_probability as f64) {
                    let offset = rng.gen_range(-90.0f32..=90.0).to_radians();
                    return Quat::from_rotation_y(offset) * last;
                }
            }
        }

        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        Vec3::new(angle.cos(), 0.0, angle.sin())
    }

    /// Лестница выбора точки (без side effects на агенте)
    pub fn select_destination<R: Rng + ?Sized>(
        &self,
        origin: Vec3,
        last_direction: Option<Vec3>,
        oracle: &dyn PathfindingOracle,
        rng: &mut R,
    ) -> DestinationChoice {
        for _ in 0..self.config.max_attempts {
            let heading = self.candidate_heading(last_direction, rng);
            let distance =
                rng.gen_range(self.config.min_wander_distance..=self.config.max_wander_distance);
            let candidate = self.level_point(origin, origin + heading * distance);

            if let Some(destination) = validate_candidate(origin, candidate, distance, oracle) {
                return DestinationChoice::Wander(destination);
            }
        }

        logger::log_warning(&format!(
            "Patrol: no reachable point after {} attempts, trying short range",
            self.config.max_attempts
        ));

        let fallback_radius = self.config.min_wander_distance * 0.5;
        for _ in 0..self.config.fallback_attempts {
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            let radius = fallback_radius * rng.gen::<f32>().sqrt();
            let offset = Vec3::new(angle.cos(), 0.0, angle.sin()) * radius;
            let candidate = self.level_point(origin, origin + offset);

            if let Some(destination) =
                validate_candidate(origin, candidate, self.config.min_wander_distance, oracle)
            {
                return DestinationChoice::ShortRange(destination);
            }
        }

        DestinationChoice::Exhausted
    }

    /// Один тик патруля.
    ///
    /// Детекция цели НЕ здесь: FSM зовёт `detects` до `step`.
    pub fn step<R: Rng + ?Sized>(
        &self,
        ghost: GhostId,
        progress: &mut PatrolProgress,
        transform: &mut Transform,
        oracle: &mut dyn PathfindingOracle,
        rng: &mut R,
        delta: f32,
    ) -> PatrolEvent {
        let event = match progress.phase {
            PatrolPhase::Idle => self.plan_next(ghost, progress, transform.translation, oracle, rng),

            PatrolPhase::Travelling { destination, elapsed } => {
                if oracle.path_pending(ghost) {
                    progress.phase = PatrolPhase::Travelling {
                        destination,
                        elapsed: elapsed + delta,
                    };
                    PatrolEvent::Continue
                } else if oracle.remaining_distance(ghost) <= self.config.stopping_distance {
                    progress.failed_attempts = 0;
                    self.start_waiting(ghost, progress, oracle);
                    logger::log(&format!("Patrol: {} reached {:?}", ghost, destination));
                    PatrolEvent::Arrived
                } else if elapsed >= self.config.max_travel_time {
                    progress.failed_attempts += 1;
                    if progress.failed_attempts > STUCK_WARNING_THRESHOLD {
                        logger::log_warning(&format!(
                            "Patrol: {} repeatedly failed to reach its destination, navigation data may be broken",
                            ghost
                        ));
                        progress.failed_attempts = 0;
                    }
                    self.start_waiting(ghost, progress, oracle);
                    PatrolEvent::StuckTimeout
                } else {
                    progress.phase = PatrolPhase::Travelling {
                        destination,
                        elapsed: elapsed + delta,
                    };
                    PatrolEvent::Continue
                }
            }

            PatrolPhase::Waiting { remaining } | PatrolPhase::RetryDelay { remaining } => {
                let remaining = remaining - delta;
                if remaining <= 0.0 {
                    self.plan_next(ghost, progress, transform.translation, oracle, rng)
                } else {
                    progress.phase = match progress.phase {
                        PatrolPhase::Waiting { .. } => PatrolPhase::Waiting { remaining },
                        _ => PatrolPhase::RetryDelay { remaining },
                    };
                    PatrolEvent::Continue
                }
            }
        };

        self.face_velocity(transform, oracle.agent_velocity(ghost), delta);
        event
    }

    fn plan_next<R: Rng + ?Sized>(
        &self,
        ghost: GhostId,
        progress: &mut PatrolProgress,
        origin: Vec3,
        oracle: &mut dyn PathfindingOracle,
        rng: &mut R,
    ) -> PatrolEvent {
        let destination = match self.select_destination(origin, progress.last_direction, &*oracle, rng) {
            DestinationChoice::Wander(destination) => {
                let horizontal = Vec3::new(
                    destination.point.x - origin.x,
                    0.0,
                    destination.point.z - origin.z,
                );
                progress.last_direction = horizontal.try_normalize();
                logger::log(&format!(
                    "Patrol: {} → {:?} ({:.1}m)",
                    ghost,
                    destination.point,
                    origin.distance(destination.point)
                ));
                destination
            }
            DestinationChoice::ShortRange(destination) => {
                logger::log(&format!(
                    "Patrol: {} using short range point {:?}",
                    ghost, destination.point
                ));
                destination
            }
            DestinationChoice::Exhausted => {
                logger::log_error(&format!(
                    "Patrol: {} found no reachable point, retrying in {:.1}s",
                    ghost, self.config.retry_delay
                ));
                progress.phase = PatrolPhase::RetryDelay {
                    remaining: self.config.retry_delay,
                };
                return PatrolEvent::RetryScheduled;
            }
        };

        oracle.set_stopped(ghost, false);
        oracle.set_destination(ghost, destination.point);
        progress.phase = PatrolPhase::Travelling {
            destination: destination.point,
            elapsed: 0.0,
        };
        PatrolEvent::DestinationSet(destination.point)
    }

    fn start_waiting(&self, ghost: GhostId, progress: &mut PatrolProgress, oracle: &mut dyn PathfindingOracle) {
        oracle.set_stopped(ghost, true);
        progress.phase = PatrolPhase::Waiting {
            remaining: self.config.wait_at_point_time,
        };
    }

    /// Кандидат на уровне агента (не прыгаем по этажам)
    fn level_point(&self, origin: Vec3, candidate: Vec3) -> Vec3 {
        if self.config.restrict_to_level_y {
            Vec3::new(candidate.x, origin.y + self.config.y_level_offset, candidate.z)
        } else {
            candidate
        }
    }

    /// Плавный доворот к направлению движения
    pub fn face_velocity(&self, transform: &mut Transform, velocity: Vec3, delta: f32) {
        if velocity.length() <= MIN_FACING_SPEED {
            return;
        }
        if let Some(target) = planar_heading(velocity) {
            let t = (self.config.turn_rate * delta).clamp(0.0, 1.0);
            transform.rotation = transform.rotation.slerp(target, t);
        }
    }
}

/// snap → path → Complete?
fn validate_candidate(
    origin: Vec3,
    candidate: Vec3,
    sample_distance: f32,
    oracle: &dyn PathfindingOracle,
) -> Option<PatrolDestination> {
    let hit = oracle.sample_position(candidate, sample_distance)?;
    let path = oracle.calculate_path(origin, hit.position);

    path.is_complete().then_some(PatrolDestination {
        point: hit.position,
        path_status: path.status,
    })
}

/// Yaw-поворот, при котором forward (-Z) смотрит вдоль горизонтальной проекции `direction`
pub fn planar_heading(direction: Vec3) -> Option<Quat> {
    let flat = Vec3::new(direction.x, 0.0, direction.z).try_normalize()?;
    Some(Quat::from_rotation_y(f32::atan2(-flat.x, -flat.z)))
}
