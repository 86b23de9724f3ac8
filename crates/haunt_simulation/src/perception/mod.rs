//! PerceptionModel: stateless line-of-sight проверка
//!
//! Алгоритм `visible`:
//! 1. distance > radius → не видно
//! 2. угол к цели > fov/2 И distance >= radius * 0.3 → не видно
//!    (near-field: вплотную призрак "чувствует" цель за спиной)
//! 3. лучи с нескольких высот; видно если ХОТЯ БЫ ОДИН луч первым попал в цель
//!
//! Никакого состояния: можно звать каждый тик для каждого агента.

use bevy::prelude::*;

use crate::config::NEAR_FIELD_FRACTION;


/// Идентификатор того, во что попал луч
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub struct HitEntity(pub u64);

/// Внешний мир для raycast'ов (физика движка или sandbox)
pub trait PerceptionWorld: Send + Sync + 'static {
    /// Первое пересечение луча; `direction` нормализован
    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        layer_mask: u32,
    ) -> Option<HitEntity>;
}

/// Resource: perception world текущей сессии
#[derive(Resource)]
pub struct PerceptionWorldRes(pub Box<dyn PerceptionWorld>);

impl PerceptionWorldRes {
    pub fn new(world: impl PerceptionWorld) -> Self {
        Self(Box::new(world))
    }

    pub fn world(&self) -> &dyn PerceptionWorld {
        self.0.as_ref()
    }
}

/// Цель восприятия (игрок)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerceptionTarget {
    pub entity: HitEntity,
    pub position: Vec3,
}

/// Параметры одного запроса
#[derive(Debug, Clone, Copy)]
pub struct PerceptionQuery<'a> {
    pub radius: f32,
    /// Полный угол обзора (градусы)
    pub field_of_view: f32,
    pub height_offsets: &'a [f32],
    pub layer_mask: u32,
}

/// Видит ли наблюдатель цель.
///
/// `target = None` (цель уничтожена/не заспавнена) → false, не ошибка.
pub fn visible(
    observer: &Transform,
    target: Option<&PerceptionTarget>,
    query: &PerceptionQuery,
    world: &dyn PerceptionWorld,
) -> bool {
    let Some(target) = target else {
        return false;
    };

    let to_target = target.position - observer.translation;
    let distance = to_target.length();

    if distance > query.radius {
        return false;
    }

    // Цель в той же точке: лучи не построить, считаем видимой
    if distance <= f32::EPSILON {
        return true;
    }

    let direction = to_target / distance;

    if distance >= query.radius * NEAR_FIELD_FRACTION {
        let forward = observer.forward().as_vec3();
        let angle = forward.angle_between(direction).to_degrees();
        if angle > query.field_of_view * 0.5 {
            return false;
        }
    }

    any_ray_hits(observer.translation, direction, distance, target.entity, query, world)
}

/// Параллельные лучи с разных высот (перекрытие одной высоты не блокирует остальные)
fn any_ray_hits(
    origin: Vec3,
    direction: Vec3,
    distance: f32,
    target: HitEntity,
    query: &PerceptionQuery,
    world: &dyn PerceptionWorld,
) -> bool {
    query.height_offsets.iter().any(|&offset| {
        let ray_start = origin + Vec3::Y * offset;
        world.raycast(ray_start, direction, distance, query.layer_mask) == Some(target)
    })
}
