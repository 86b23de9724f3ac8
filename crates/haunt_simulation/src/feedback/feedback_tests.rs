//! Tests for DifficultyFeedbackBus systems (голый World + run_system_once).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bevy::ecs::event::Events;
use bevy::ecs::system::RunSystemOnce;
use bevy::prelude::*;

use super::*;
use crate::ai::GhostId;
use crate::config::GhostConfig;
use crate::navigation::{NavPath, NavPoint, PathfindingOracle};
use crate::sinks::{AudioSink, FeedbackSinks, HapticsSink};

/// Oracle, запоминающий выставленные скорости
#[derive(Clone, Default)]
struct SpeedOracle {
    speeds: Arc<Mutex<HashMap<GhostId, f32>>>,
}

impl PathfindingOracle for SpeedOracle {
    fn sample_position(&self, point: Vec3, _max_distance: f32) -> Option<NavPoint> {
        Some(NavPoint { position: point })
    }
    fn calculate_path(&self, _from: Vec3, _to: Vec3) -> NavPath {
        NavPath::invalid()
    }
    fn set_destination(&mut self, _agent: GhostId, _point: Vec3) {}
    fn remaining_distance(&self, _agent: GhostId) -> f32 {
        0.0
    }
    fn is_stopped(&self, _agent: GhostId) -> bool {
        false
    }
    fn set_stopped(&mut self, _agent: GhostId, _stopped: bool) {}
    fn set_speed(&mut self, agent: GhostId, speed: f32) {
        self.speeds.lock().unwrap().insert(agent, speed);
    }
    fn place_agent(&mut self, _agent: GhostId, _position: Vec3) {}
    fn agent_position(&self, _agent: GhostId) -> Option<Vec3> {
        None
    }
}

#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl AudioSink for Recorder {
    fn on_difficulty_changed(&mut self, normalized: f32) {
        self.events.lock().unwrap().push(format!("audio difficulty {:.2}", normalized));
    }
}

impl HapticsSink for Recorder {
    fn on_proximity(&mut self, proximity: f32) {
        self.events.lock().unwrap().push(format!("haptics proximity {:.2}", proximity));
    }
}

fn world_with(oracle: SpeedOracle, recorder: &Recorder, level: f32) -> World {
    let mut world = World::new();
    world.insert_resource(DifficultyState::new(level, 0.05, 0.025));
    world.insert_resource(DifficultyConfig::default());
    world.init_resource::<PublishedDifficulty>();
    world.insert_resource(Navigation::new(oracle));
    world.insert_resource(SinkDispatcher::spawn(
        FeedbackSinks::default()
            .with_audio(recorder.clone())
            .with_haptics(recorder.clone()),
    ));
    world.init_resource::<Events<DifficultyChanged>>();
    world.init_resource::<Events<ProximityReported>>();

    let mut time = Time::<()>::default();
    time.advance_by(Duration::from_millis(100));
    world.insert_resource(time);
    world
}

fn flush_sinks(world: &mut World) {
    world.resource_mut::<SinkDispatcher>().shutdown();
}

#[test]
fn test_publish_scales_agents_and_speeds_per_state() {
    let oracle = SpeedOracle::default();
    let recorder = Recorder::default();
    let mut world = world_with(oracle.clone(), &recorder, 3.0);

    let config = GhostConfig::default();
    world.spawn((GhostAgent::new(GhostId(1), &config), GhostState::patrolling()));
    world.spawn((GhostAgent::new(GhostId(2), &config), GhostState::Chasing));

    world.run_system_once(publish_difficulty).unwrap();

    let mut query = world.query::<&GhostAgent>();
    for agent in query.iter(&world) {
        assert_eq!(agent.current_detection_radius, 15.0);
        assert_eq!(agent.current_walk_speed, 1.7);
        assert_eq!(agent.current_run_speed, 4.5);
    }

    let speeds = oracle.speeds.lock().unwrap();
    assert_eq!(speeds.get(&GhostId(1)), Some(&1.7));
    assert_eq!(speeds.get(&GhostId(2)), Some(&4.5));
}

#[test]
fn test_sinks_notified_only_on_change() {
    let recorder = Recorder::default();
    let mut world = world_with(SpeedOracle::default(), &recorder, 2.0);

    world.run_system_once(publish_difficulty).unwrap();
    world.run_system_once(publish_difficulty).unwrap();
    world.resource_mut::<DifficultyState>().force_level(3.0);
    world.run_system_once(publish_difficulty).unwrap();

    assert_eq!(world.resource::<Events<DifficultyChanged>>().len(), 2);

    flush_sinks(&mut world);
    let events = recorder.events.lock().unwrap();
    assert_eq!(
        *events,
        vec!["audio difficulty 0.50".to_string(), "audio difficulty 1.00".to_string()]
    );
}

#[test]
fn test_proximity_report_raises_difficulty_by_elapsed_time() {
    let recorder = Recorder::default();
    let mut world = world_with(SpeedOracle::default(), &recorder, 1.0);

    world.send_event(ProximityReported {
        ghost: GhostId(1),
        proximity: 0.0,
    });
    world.run_system_once(route_proximity_reports).unwrap();

    // 0.15 (max impact) * 0.1s * 0.05 change rate
    let level = world.resource::<DifficultyState>().current_level();
    assert!((level - (1.0 + 0.15 * 0.1 * 0.05)).abs() < 1e-6);

    flush_sinks(&mut world);
    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec!["haptics proximity 0.00".to_string()]
    );
}
