//! Tests for DifficultySignalProcessor state.

use bevy::prelude::*;
use proptest::prelude::*;

use super::state::*;
use crate::config::DifficultyConfig;
use crate::telemetry::Pose;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

#[test]
fn test_increase_then_idle_decay_returns_to_base() {
    let mut state = DifficultyState::new(1.0, 0.05, 0.025);

    state.increase(3.0);
    assert!(approx(state.current_level(), 1.15));

    // 6 секунд простоя тиками по 0.1
    for _ in 0..60 {
        state.decay(0.1);
    }
    assert!(approx(state.current_level(), 1.0));
    assert!(state.current_level() >= 1.0);

    // Дальше спад не уводит ниже 1
    state.decay(10.0);
    assert_eq!(state.current_level(), 1.0);
}

#[test]
fn test_increase_clamps_at_max() {
    let mut state = DifficultyState::new(2.9, 0.05, 0.025);
    state.increase(100.0);
    assert_eq!(state.current_level(), DifficultyState::MAX_LEVEL);
    assert_eq!(state.normalized(), 1.0);
}

#[test]
fn test_non_positive_increase_is_ignored() {
    let mut state = DifficultyState::new(2.0, 0.05, 0.025);
    assert_eq!(state.increase(-5.0), 0.0);
    assert_eq!(state.increase(f32::NAN), 0.0);
    assert_eq!(state.current_level(), 2.0);
}

#[test]
fn test_normalized_mapping() {
    assert_eq!(DifficultyState::new(1.0, 0.05, 0.025).normalized(), 0.0);
    assert_eq!(DifficultyState::new(2.0, 0.05, 0.025).normalized(), 0.5);
    assert_eq!(DifficultyState::new(3.0, 0.05, 0.025).normalized(), 1.0);
}

#[test]
fn test_force_level_clamps() {
    let mut state = DifficultyState::default();
    state.force_level(7.0);
    assert_eq!(state.current_level(), 3.0);
    state.force_level(0.0);
    assert_eq!(state.current_level(), 1.0);
}

#[test]
fn test_first_pose_is_baseline_only() {
    let mut monitor = BehaviorMonitor::default();
    monitor.observe_pose(Pose::new(Vec3::ZERO, Quat::IDENTITY), 0.1);

    assert_eq!(monitor.rotation_accumulator, 0.0);
    assert_eq!(monitor.movement_accumulator, 0.0);
    assert!(monitor.last_head_pose.is_some());
}

#[test]
fn test_pose_accumulates_rotation_and_movement() {
    let mut monitor = BehaviorMonitor::default();
    monitor.observe_pose(Pose::new(Vec3::ZERO, Quat::IDENTITY), 0.1);
    monitor.observe_pose(
        Pose::new(Vec3::new(0.3, 0.0, 0.0), Quat::from_rotation_y(20f32.to_radians())),
        0.1,
    );
    monitor.observe_pose(
        Pose::new(Vec3::new(0.6, 0.0, 0.0), Quat::from_rotation_y(40f32.to_radians())),
        0.1,
    );

    assert!(approx(monitor.rotation_accumulator, 40.0));
    assert!(approx(monitor.movement_accumulator, 0.6));
    // Скорости = разница / dt: погрешность acos умножается на 1 / dt
    assert!((monitor.current_rotation_speed - 200.0).abs() < 1e-2);
    assert!((monitor.current_movement_speed - 3.0).abs() < 1e-2);
}

#[test]
fn test_threshold_impacts_scale_with_intensity_and_reset() {
    let config = DifficultyConfig::default();
    let mut monitor = BehaviorMonitor {
        // 45° при пороге 30: intensity = 45 / 60 = 0.75
        rotation_accumulator: 45.0,
        // 0.4м при пороге 0.5: ниже порога
        movement_accumulator: 0.4,
        ..Default::default()
    };

    let impacts = monitor.take_threshold_impacts(&config);
    assert!(approx(impacts.rotation.unwrap(), 0.1 * 0.75));
    assert_eq!(impacts.movement, None);
    assert_eq!(monitor.rotation_accumulator, 0.0);
    assert_eq!(monitor.movement_accumulator, 0.0);
}

#[test]
fn test_threshold_intensity_caps_at_one() {
    let config = DifficultyConfig::default();
    let mut monitor = BehaviorMonitor {
        movement_accumulator: 5.0,
        ..Default::default()
    };

    let impacts = monitor.take_threshold_impacts(&config);
    assert!(approx(impacts.movement.unwrap(), config.sudden_movement_impact));
}

#[test]
fn test_trigger_intensities_only_above_threshold() {
    let mut monitor = BehaviorMonitor::default();
    let intensities = monitor.observe_triggers(&[0.2, 0.9, 0.7], 0.7);

    assert_eq!(intensities, vec![1.0]);
    assert_eq!(monitor.current_trigger_force, 0.9);
}

#[test]
fn test_proximity_impact_lerp() {
    let config = DifficultyConfig::default();
    // Вплотную → max impact, на краю → min
    assert!(approx(proximity_impact(&config, 0.0), 0.15));
    assert!(approx(proximity_impact(&config, 1.0), 0.05));
    assert!(approx(proximity_impact(&config, 0.5), 0.10));
}

proptest! {
    #[test]
    fn prop_level_stays_bounded(
        ops in proptest::collection::vec((any::<bool>(), 0.0f32..50.0), 1..200),
    ) {
        let mut state = DifficultyState::new(1.0, 0.05, 0.025);
        for (is_increase, value) in ops {
            if is_increase {
                let before = state.current_level();
                state.increase(value);
                prop_assert!(state.current_level() >= before);
            } else {
                state.decay(value);
            }
            prop_assert!(state.current_level() >= DifficultyState::MIN_LEVEL);
            prop_assert!(state.current_level() <= DifficultyState::MAX_LEVEL);
        }
    }

    #[test]
    fn prop_decay_never_undershoots(level in 1.0f32..3.0, steps in 1usize..500, dt in 0.001f32..1.0) {
        let mut state = DifficultyState::new(level, 0.05, 0.025);
        let mut previous = state.current_level();
        for _ in 0..steps {
            state.decay(dt);
            prop_assert!(state.current_level() <= previous);
            prop_assert!(state.current_level() >= 1.0);
            previous = state.current_level();
        }
    }
}
