//! Общие helpers для интеграционных тестов: sandbox + session + recording sinks

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bevy::prelude::*;
use haunt_simulation::sandbox::Sandbox;
use haunt_simulation::{
    AudioSink, FeedbackSinks, GhostId, HapticsSink, Session, SimulationConfig, TelemetryLogger, TelemetrySample,
};

/// Sandbox + Session, цель синхронизируется в обоих
pub struct Arena {
    pub sandbox: Sandbox,
    pub session: Session,
}

impl Arena {
    pub fn new(half_extent: f32, config: SimulationConfig, seed: u64) -> Self {
        Self::with_sinks(Sandbox::open_field(half_extent), config, seed, FeedbackSinks::default())
    }

    pub fn with_sinks(sandbox: Sandbox, config: SimulationConfig, seed: u64, sinks: FeedbackSinks) -> Self {
        let session = Session::builder()
            .config(config)
            .seed(seed)
            .navigation(sandbox.navigation())
            .perception(sandbox.perception())
            .telemetry(sandbox.telemetry())
            .sinks(sinks)
            .target(sandbox.target_entity())
            .build()
            .expect("session should build");

        Self { sandbox, session }
    }

    pub fn set_target(&mut self, position: Option<Vec3>) {
        self.sandbox.set_target(position);
        self.session.set_target_position(position);
    }

    /// Тик без движения агентов (геометрия сценария фиксирована)
    pub fn tick(&mut self, dt: f32) {
        self.session.tick(dt);
    }

    /// Движок двигает агентов, потом тик симуляции
    pub fn step(&mut self, dt: f32) {
        self.sandbox.advance(dt);
        self.session.tick(dt);
    }
}

/// Sink, записывающий всё в общий журнал строк
#[derive(Clone, Default)]
pub struct Recorder {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn entries(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.entries().iter().any(|entry| entry.starts_with(prefix))
    }

    fn push(&self, entry: String) {
        self.events.lock().unwrap().push(entry);
    }
}

impl AudioSink for Recorder {
    fn on_ghost_detected(&mut self, ghost: GhostId, _position: Vec3) {
        self.push(format!("detected {}", ghost));
    }

    fn on_heartbeat_toggle(&mut self, chasing: bool) {
        self.push(format!("heartbeat {}", chasing));
    }

    fn on_difficulty_changed(&mut self, normalized: f32) {
        self.push(format!("audio difficulty {:.4}", normalized));
    }

    fn on_item_collected(&mut self) {
        self.push("item collected".to_string());
    }
}

impl HapticsSink for Recorder {
    fn on_proximity(&mut self, proximity: f32) {
        self.push(format!("proximity {:.3}", proximity));
    }

    fn on_grip_intensity(&mut self, intensity: f32) {
        self.push(format!("grip {:.2}", intensity));
    }
}

impl TelemetryLogger for Recorder {
    fn record(&mut self, sample: TelemetrySample) {
        self.push(format!("sample {:.2}", sample.timestamp));
    }
}
