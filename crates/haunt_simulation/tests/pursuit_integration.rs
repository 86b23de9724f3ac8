//! Интеграционные тесты преследования: Session + sandbox, полный тик

mod common;

use bevy::prelude::*;
use common::Arena;
use haunt_simulation::{
    GhostId, GhostSpawn, GhostStateKind, PathfindingOracle, SessionConfig, SessionOutcome,
    SimulationConfig,
};

const GHOST: GhostId = GhostId(1);

fn arena_with_ghost() -> Arena {
    let mut arena = Arena::new(40.0, SimulationConfig::default(), 7);
    arena
        .session
        .spawn_ghost(GhostSpawn::new(1, Vec3::ZERO))
        .expect("spawn");
    arena
}

fn kind(arena: &Arena) -> GhostStateKind {
    arena.session.ghost_state(GHOST).expect("ghost exists").kind()
}

#[test]
fn test_detection_then_chase_beyond_radius_becomes_search() {
    let mut arena = arena_with_ghost();

    // Призрак смотрит в -Z, цель в 5 м перед ним
    arena.set_target(Some(Vec3::new(0.0, 0.0, -5.0)));
    arena.tick(0.1);
    assert_eq!(kind(&arena), GhostStateKind::Chasing);
    assert_eq!(arena.sandbox.agent_destination(GHOST), Some(Vec3::new(0.0, 0.0, -5.0)));

    // Цель убежала за chase radius (15 м)
    arena.set_target(Some(Vec3::new(0.0, 0.0, -16.0)));
    arena.tick(0.1);
    assert_eq!(kind(&arena), GhostStateKind::Searching);

    let transitions: Vec<_> = arena
        .session
        .drain_transitions()
        .into_iter()
        .map(|change| (change.from, change.to))
        .collect();
    assert_eq!(
        transitions,
        vec![
            (GhostStateKind::Patrolling, GhostStateKind::Chasing),
            (GhostStateKind::Chasing, GhostStateKind::Searching),
        ]
    );
}

#[test]
fn test_target_behind_obstacle_is_not_detected() {
    let sandbox = haunt_simulation::sandbox::Sandbox::open_field(40.0)
        .with_obstacle(Vec3::new(-3.0, 0.0, -4.0), Vec3::new(3.0, 3.0, -3.0));
    let mut arena = Arena::with_sinks(sandbox, SimulationConfig::default(), 7, Default::default());
    arena.session.spawn_ghost(GhostSpawn::new(1, Vec3::ZERO)).expect("spawn");

    arena.set_target(Some(Vec3::new(0.0, 0.0, -6.0)));
    arena.tick(0.1);
    assert_eq!(kind(&arena), GhostStateKind::Patrolling);
}

#[test]
fn test_ghost_runs_down_stationary_target() {
    let mut arena = arena_with_ghost();
    arena.set_target(Some(Vec3::new(0.0, 0.0, -8.0)));

    for _ in 0..60 {
        arena.step(0.1);
        if arena.session.outcome() != SessionOutcome::Running {
            break;
        }
    }

    assert_eq!(arena.session.outcome(), SessionOutcome::Caught(GHOST));
    assert_eq!(kind(&arena), GhostStateKind::Caught);
    assert!(arena.sandbox.navigation().is_stopped(GHOST));

    // Терминальное состояние: дальнейшие тики ничего не меняют
    let position = arena.sandbox.agent_position(GHOST);
    arena.step(0.1);
    arena.step(0.1);
    assert_eq!(kind(&arena), GhostStateKind::Caught);
    assert_eq!(arena.sandbox.agent_position(GHOST), position);
    assert!(!arena.session.on_caught(GHOST));
}

#[test]
fn test_lost_target_search_dwells_then_resumes_patrol() {
    let mut arena = arena_with_ghost();

    arena.set_target(Some(Vec3::new(0.0, 0.0, -5.0)));
    arena.tick(0.1);
    assert_eq!(kind(&arena), GhostStateKind::Chasing);

    // Цель исчезла: идём к последней известной позиции
    arena.set_target(None);
    arena.tick(0.1);
    assert_eq!(kind(&arena), GhostStateKind::Searching);
    let search_started = arena.session.elapsed_secs();

    let mut elapsed = 0.0;
    while kind(&arena) == GhostStateKind::Searching && elapsed < 20.0 {
        arena.step(0.1);
        elapsed += 0.1;
    }

    assert_eq!(kind(&arena), GhostStateKind::Patrolling);
    // Дошёл (около 4 с пешком) и простоял search_duration
    assert!(arena.session.elapsed_secs() - search_started >= 5.0);
    let position = arena.sandbox.agent_position(GHOST).expect("agent");
    assert!(position.distance(Vec3::new(0.0, 0.0, -5.0)) <= 0.5 + 1e-3);

    let back_to_patrol = arena
        .session
        .drain_transitions()
        .iter()
        .filter(|change| change.to == GhostStateKind::Patrolling)
        .count();
    assert_eq!(back_to_patrol, 1);
}

#[test]
fn test_escape_requires_all_items_and_exit() {
    let config = SimulationConfig {
        session: SessionConfig {
            total_items: 2,
            exit_position: Some([10.0, 0.0, 10.0]),
            exit_proximity: 2.0,
        },
        ..Default::default()
    };
    let mut arena = Arena::new(40.0, config, 7);

    arena.set_target(Some(Vec3::new(10.0, 0.0, 9.0)));
    arena.tick(0.1);
    assert_eq!(arena.session.outcome(), SessionOutcome::Running);

    arena.session.on_item_collected();
    arena.tick(0.1);
    assert_eq!(arena.session.outcome(), SessionOutcome::Running);

    arena.session.on_item_collected();
    arena.tick(0.1);
    assert_eq!(arena.session.items_collected(), 2);
    assert_eq!(arena.session.outcome(), SessionOutcome::Escaped);
}
