//! Headless симуляция HAUNT
//!
//! Sandbox арена + два призрака + цель, бегущая по кругу.
//! Запускает 1000 тиков по 50 мс и печатает сводку каждые 100 тиков.

use std::f32::consts::TAU;

use bevy::prelude::*;
use haunt_simulation::sandbox::Sandbox;
use haunt_simulation::{
    log_error, GhostSpawn, Pose, Session, SessionConfig, SessionOutcome, SimulationConfig,
};

const TICKS: u32 = 1000;
const DT: f32 = 0.05;

fn main() {
    let seed = 42;
    println!("Starting HAUNT headless simulation (seed: {})", seed);

    let sandbox = Sandbox::open_field(40.0)
        .with_obstacle(Vec3::new(-2.0, 0.0, -8.0), Vec3::new(2.0, 3.0, -6.0))
        .with_obstacle(Vec3::new(10.0, 0.0, 5.0), Vec3::new(12.0, 3.0, 15.0));

    let config = SimulationConfig {
        session: SessionConfig {
            total_items: 3,
            exit_position: Some([30.0, 0.0, 30.0]),
            ..Default::default()
        },
        ..Default::default()
    };

    let built = Session::builder()
        .config(config)
        .seed(seed)
        .navigation(sandbox.navigation())
        .perception(sandbox.perception())
        .telemetry(sandbox.telemetry())
        .target(sandbox.target_entity())
        .build();
    let mut session = match built {
        Ok(session) => session,
        Err(error) => {
            log_error(&format!("Failed to build session: {}", error));
            return;
        }
    };

    for spawn in [
        GhostSpawn::new(1, Vec3::new(-20.0, 0.0, -20.0)),
        GhostSpawn::new(2, Vec3::new(20.0, 0.0, -25.0)),
    ] {
        if let Err(error) = session.spawn_ghost(spawn) {
            log_error(&format!("Failed to spawn ghost: {}", error));
            return;
        }
    }

    for tick in 0..TICKS {
        let t = tick as f32 * DT;
        let angle = t * TAU / 40.0;
        let target = Vec3::new(angle.cos() * 18.0, 0.0, angle.sin() * 18.0);
        let heading = Quat::from_rotation_y(-angle);

        sandbox.set_target(Some(target));
        sandbox.set_head_pose(Some(Pose::new(target + Vec3::Y * 1.7, heading)));
        sandbox.set_triggers(vec![if tick % 80 < 5 { 0.9 } else { 0.0 }]);
        session.set_target_position(Some(target));

        if tick > 0 && tick % 250 == 0 {
            session.on_item_collected();
        }

        sandbox.advance(DT);
        session.tick(DT);

        if tick % 100 == 0 {
            let states: Vec<String> = session
                .ghost_ids()
                .into_iter()
                .filter_map(|id| session.ghost_state(id).map(|state| format!("{}={:?}", id, state.kind())))
                .collect();
            println!(
                "Tick {}: difficulty {:.3} | {}",
                tick,
                session.difficulty_level(),
                states.join(", ")
            );
        }

        if session.outcome() != SessionOutcome::Running {
            println!("Tick {}: session over ({:?})", tick, session.outcome());
            break;
        }
    }

    for change in session.drain_transitions() {
        println!("{}: {:?} -> {:?}", change.ghost, change.from, change.to);
    }

    session.shutdown();
    println!("Simulation complete!");
}
