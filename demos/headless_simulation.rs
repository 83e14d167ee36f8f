use std::sync::Arc;
use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::ecs::message::{MessageReader, MessageWriter};
use bevy::prelude::*;
use bevy_bullet_sim::prelude::*;
use bevy_bullet_sim::template::presets;

fn main() {
    println!("Starting Headless Ballistics Simulation...");
    println!("Firing a supersonic and a subsonic bullet, running for 5 seconds...");

    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(1.0 / 60.0))))
        .insert_resource(Time::<Fixed>::from_hz(60.0))
        // Skip the debug plugin (headless)
        .add_plugins(BallisticsCorePlugin::default())
        .add_systems(Startup, setup_simulation)
        .add_systems(Update, (print_progress, report_destroyed))
        .add_systems(FixedUpdate, check_bullet_status.after(BallisticsSet::Simulate))
        .run();
}

#[derive(Resource)]
struct Tracker {
    start: Vec3,
    checked: Vec<bool>,
}

fn setup_simulation(mut commands: Commands, mut fire: MessageWriter<FireEvent>) {
    println!("\n[SETUP] Firing test bullets...");
    let start = Vec3::new(0.0, 10.0, 0.0);

    // 1. Standard Bullet (Supersonic)
    fire.write(FireEvent::new(start, Vec3::NEG_Z, Arc::new(presets::rifle())));

    // 2. Heavy/Slow Bullet (Subsonic)
    let subsonic = BulletTemplate {
        name: "Subsonic".to_string(),
        speed: 300.0,
        mass: 0.015,
        ..presets::pistol()
    };
    fire.write(FireEvent::new(start + Vec3::X * 5.0, Vec3::NEG_Z, Arc::new(subsonic)));

    commands.insert_resource(Tracker {
        start,
        checked: vec![false; 2],
    });
}

fn print_progress(time: Res<Time>, sim: Res<BulletSimulation>, mut timer: Local<f32>) {
    *timer += time.delta_secs();
    if *timer > 1.0 {
        *timer = 0.0;
        println!(
            "[INFO] Simulation running... (Time: {:.1}s, {} active)",
            time.elapsed_secs(),
            sim.active_count()
        );
    }

    // Auto-quit after 5 seconds
    if time.elapsed_secs() > 5.0 {
        println!("[FINISHED] Simulation complete.");
        std::process::exit(0);
    }
}

fn check_bullet_status(sim: Res<BulletSimulation>, mut tracker: ResMut<Tracker>) {
    let start = tracker.start;
    for (handle, state) in sim.iter_active() {
        let index = handle.slot as usize;
        let Some(checked) = tracker.checked.get_mut(index) else {
            continue;
        };
        let distance = (state.position.z - start.z).abs();
        if !*checked && distance >= 100.0 {
            let drop = start.y - state.position.y;
            println!(
                "[CHECKPOINT] bullet {} at {:.1}m: Drop = {:.4}m, Velocity = {:.1} m/s",
                index,
                distance,
                drop,
                state.speed()
            );
            *checked = true;
        }
    }
}

fn report_destroyed(mut destroyed: MessageReader<BulletDestroyed>) {
    for BulletDestroyed(bullet) in destroyed.read() {
        println!(
            "[DESTROYED] slot {} after {:.1}m ({:?})",
            bullet.handle.slot, bullet.distance, bullet.reason
        );
    }
}
