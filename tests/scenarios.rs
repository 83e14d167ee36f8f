use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use approx::assert_relative_eq;
use bevy::ecs::message::MessageReader;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use bevy_bullet_sim::prelude::*;
use bevy_bullet_sim::template::presets;
use rand::prelude::*;

const DT: f32 = 1.0 / 60.0;

struct DestroyCounter {
    index: usize,
    counts: Arc<Vec<AtomicU32>>,
}

impl BulletVisual for DestroyCounter {
    fn destroy(&mut self) {
        self.counts[self.index].fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_ten_thousand_bullets_expire_and_destroy_once() {
    const COUNT: usize = 10_000;
    let mut sim = BulletSimulation::new(
        BallisticsConfig {
            capacity: COUNT,
            ..Default::default()
        },
        BallisticsEnvironment::default(),
        MaterialTable::default(),
    );
    let template = Arc::new(BulletTemplate {
        lifetime: 0.5,
        ..presets::rifle()
    });
    let counts: Arc<Vec<AtomicU32>> = Arc::new((0..COUNT).map(|_| AtomicU32::new(0)).collect());

    let mut rng = StdRng::seed_from_u64(42);
    for index in 0..COUNT {
        let direction = Vec3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
        );
        let shot = Shot::new(Vec3::ZERO, direction, template.clone());
        let visual = DestroyCounter {
            index,
            counts: counts.clone(),
        };
        sim.spawn(&shot, Some(Box::new(visual))).unwrap();
    }
    assert_eq!(sim.active_count(), COUNT);

    let mut destroyed = 0;
    for _ in 0..60 {
        destroyed += sim.tick(DT, &NoCollision).destroyed.len();
    }

    assert_eq!(sim.active_count(), 0);
    assert_eq!(destroyed, COUNT);
    assert!(counts.iter().all(|count| count.load(Ordering::SeqCst) == 1));
}

#[test]
fn test_faulty_handlers_do_not_stop_the_tick() {
    let wall = World::new().spawn_empty().id();
    let mut world = SlabWorld::default();
    world.add_box(wall, Vec3::new(0.0, 0.0, -30.0), Vec3::new(20.0, 20.0, 5.0), None);
    let table = MaterialTable::new(BallisticMaterial {
        energy_loss_per_unit: 1.0e9,
        ricochet_probability: FloatRange::new(0.0, 0.0),
        ..Default::default()
    });
    let mut sim = BulletSimulation::new(BallisticsConfig::default(), BallisticsEnvironment::vacuum(), table);

    let panicking = Arc::new(presets::pistol().with_handler(Arc::new(
        |_: &Interaction, _: HandledFlags, _: &mut DispatchContext| -> HandlerResult {
            panic!("handler blew up");
        },
    )));
    let resolved = Arc::new(AtomicUsize::new(0));
    let counter = resolved.clone();
    sim.set_global_handler(Some(Arc::new(
        move |_: &Interaction, _: HandledFlags, _: &mut DispatchContext| -> HandlerResult {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HandledFlags::DAMAGE)
        },
    )));

    for x in -5..=5 {
        let template = if x == 0 {
            panicking.clone()
        } else {
            Arc::new(presets::pistol())
        };
        sim.spawn(&Shot::new(Vec3::new(x as f32, 0.0, 0.0), Vec3::NEG_Z, template), None)
            .unwrap();
    }

    let mut stops = 0;
    for _ in 0..10 {
        let report = sim.tick(DT, &world);
        stops += report
            .destroyed
            .iter()
            .filter(|d| d.reason == DestroyReason::Stopped)
            .count();
    }

    assert_eq!(stops, 11);
    // the global handler still runs after the panicking bullet handler
    assert_eq!(resolved.load(Ordering::SeqCst), 11);
    assert_eq!(sim.active_count(), 0);
}

#[test]
fn test_preview_matches_live_flight() {
    struct Recorder(Arc<Mutex<Vec<Vec3>>>);

    impl BulletVisual for Recorder {
        fn initialize(&mut self, pose: &BulletPose) {
            self.0.lock().unwrap().push(pose.position);
        }

        fn update(&mut self, pose: &BulletPose) {
            self.0.lock().unwrap().push(pose.position);
        }
    }

    let wall = World::new().spawn_empty().id();
    let mut world = SlabWorld::default();
    world.add_box(wall, Vec3::new(0.0, 0.0, -250.0), Vec3::new(50.0, 50.0, 1.0), None);
    let table = MaterialTable::new(BallisticMaterial {
        energy_loss_per_unit: 1.0e9,
        ricochet_probability: FloatRange::new(0.0, 0.0),
        ..Default::default()
    });
    let env = BallisticsEnvironment {
        wind: Vec3::new(3.0, 0.0, 0.0),
        ..Default::default()
    };
    let mut sim = BulletSimulation::new(BallisticsConfig::default(), env, table);

    let shot = Shot::new(
        Vec3::new(0.0, 1.5, 0.0),
        Vec3::new(0.0, 0.01, -1.0),
        Arc::new(presets::rifle()),
    )
    .with_visual_offset(Vec3::new(0.1, -0.05, 0.0));

    let mut preview = Vec::new();
    let result = sim
        .preview(
            &shot,
            &world,
            PreviewSettings {
                time_step: DT,
                max_time: 2.0,
            },
            &mut preview,
        )
        .unwrap();
    assert_eq!(result.end, PreviewEnd::Impact);
    assert_eq!(sim.active_count(), 0);

    let live = Arc::new(Mutex::new(Vec::new()));
    sim.spawn(&shot, Some(Box::new(Recorder(live.clone())))).unwrap();
    for _ in 0..120 {
        sim.tick(DT, &world);
    }
    assert_eq!(sim.active_count(), 0);

    let live = live.lock().unwrap();
    assert_eq!(live.len(), preview.len());
    let last = preview.len() - 1;
    for (live, preview) in live[..last].iter().zip(&preview[..last]) {
        assert_eq!(live, preview);
    }
    assert_relative_eq!(live[last].x, preview[last].x, epsilon = 1.0e-3);
    assert_relative_eq!(live[last].y, preview[last].y, epsilon = 1.0e-3);
    assert_relative_eq!(live[last].z, preview[last].z, epsilon = 1.0e-3);
}

#[derive(Resource, Default)]
struct DestroyedCount(usize);

fn count_destroyed(mut destroyed: MessageReader<BulletDestroyed>, mut count: ResMut<DestroyedCount>) {
    count.0 += destroyed.read().count();
}

fn test_app() -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f64(1.0 / 64.0)))
        .add_plugins(BallisticsCorePlugin::default())
        .init_resource::<DestroyedCount>()
        .add_systems(Update, count_destroyed);
    app
}

#[test]
fn test_plugin_fires_and_expires_bullets() {
    let mut app = test_app();
    app.update();

    let template = Arc::new(BulletTemplate {
        lifetime: 0.2,
        pellet_count: 3,
        pellet_spread: 0.02,
        ..presets::pistol()
    });
    app.world_mut()
        .write_message(FireEvent::new(Vec3::ZERO, Vec3::NEG_Z, template));

    for _ in 0..4 {
        app.update();
    }
    assert_eq!(app.world().resource::<BulletSimulation>().active_count(), 3);

    for _ in 0..30 {
        app.update();
    }
    assert_eq!(app.world().resource::<BulletSimulation>().active_count(), 0);
    assert_eq!(app.world().resource::<DestroyedCount>().0, 3);
}

#[test]
fn test_plugin_syncs_environment_changes() {
    let mut app = test_app();
    app.update();

    app.world_mut().resource_mut::<BallisticsEnvironment>().wind = Vec3::new(5.0, 0.0, 0.0);
    for _ in 0..3 {
        app.update();
    }
    assert_eq!(
        app.world().resource::<BulletSimulation>().environment().wind,
        Vec3::new(5.0, 0.0, 0.0)
    );
}

#[test]
fn test_plugin_zeroes_weapons() {
    let mut app = test_app();
    let analytic = app
        .world_mut()
        .spawn(ZeroingRequest::new(ZeroingParams::analytic(vec![100.0, 300.0], 800.0, 9.81)))
        .id();
    let with_drag = app
        .world_mut()
        .spawn(ZeroingRequest::new(ZeroingParams::from_template(
            &presets::rifle(),
            &BallisticsEnvironment::default(),
            vec![200.0],
        )))
        .id();

    app.update();
    let zeroing = app.world().get::<WeaponZeroing>(analytic).unwrap();
    assert_eq!(zeroing.results.len(), 2);
    assert!(zeroing.results[1].angle > zeroing.results[0].angle);
    assert!(app.world().get::<ZeroingRequest>(analytic).is_none());

    for _ in 0..500 {
        if app.world().get::<WeaponZeroing>(with_drag).is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(2));
        app.update();
    }
    let zeroing = app.world().get::<WeaponZeroing>(with_drag).unwrap();
    assert_eq!(zeroing.results.len(), 1);
    assert!(zeroing.results[0].angle > 0.0);
}
