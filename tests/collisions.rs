//! Collision resolution through the engine

use approx::assert_abs_diff_eq;
use gravitas::physics::collision::{CollisionPolicy, Ejecta, Resolution};
use gravitas::physics::engine::{BodyDesc, Engine, EngineOptions, FRAME_RATE};
use gravitas::physics::integrators::registry::IntegratorRegistry;
use gravitas::physics::math::{Scalar, Vector};
use gravitas::physics::units::ScaleState;
use gravitas::prelude::BodyId;

fn engine() -> Engine {
    let options = EngineOptions {
        seed: Some(3),
        ..EngineOptions::default()
    };
    Engine::new(&options, ScaleState::default(), &IntegratorRegistry::default()).unwrap()
}

fn pair(engine: &mut Engine) -> (BodyId, BodyId) {
    let a = engine
        .register_body(
            BodyDesc::new(3.0, Vector::new(-0.01, 0.0, 0.0), Vector::new(0.4, 0.1, 0.0)).with_capture_radius(0.02),
        )
        .unwrap();
    let b = engine
        .register_body(BodyDesc::new(1.0, Vector::new(0.01, 0.0, 0.0), Vector::new(-0.9, 0.0, 0.3)))
        .unwrap();
    (a, b)
}

fn momentum(engine: &Engine, ids: &[BodyId]) -> Vector {
    ids.iter()
        .filter(|id| engine.is_active(**id).unwrap())
        .map(|id| engine.velocity(*id).unwrap() * engine.mass(*id).unwrap())
        .sum()
}

#[test]
fn test_absorb_conserves_momentum() {
    let mut engine = engine();
    let (a, b) = pair(&mut engine);
    engine.start().unwrap();
    engine.step(1.0 / FRAME_RATE).unwrap();

    let before = momentum(&engine, &[a, b]);
    let report = engine.collide(a, b, &CollisionPolicy::Absorb).unwrap();
    assert!(matches!(report.resolution, Resolution::Absorbed { .. }));
    assert!(report.ejecta.is_none());

    assert!(!engine.is_active(b).unwrap());
    assert_abs_diff_eq!(engine.mass(a).unwrap(), 4.0, epsilon = 1e-12);
    let after = engine.velocity(a).unwrap() * engine.mass(a).unwrap();
    assert_abs_diff_eq!(after.x, before.x, epsilon = 1e-12);
    assert_abs_diff_eq!(after.y, before.y, epsilon = 1e-12);
    assert_abs_diff_eq!(after.z, before.z, epsilon = 1e-12);
}

#[test]
fn test_bounce_conserves_momentum() {
    let mut engine = engine();
    let (a, b) = pair(&mut engine);
    let before = momentum(&engine, &[a, b]);

    engine
        .collide(a, b, &CollisionPolicy::Bounce { factor: 0.5 })
        .unwrap();
    let after = momentum(&engine, &[a, b]);

    assert!(engine.is_active(a).unwrap() && engine.is_active(b).unwrap());
    assert_abs_diff_eq!((after - before).length(), 0.0, epsilon = 1e-12);
}

#[test]
fn test_massless_bounce_reverses_its_own_velocity() {
    let mut engine = engine();
    let a = engine
        .register_body(BodyDesc::new(0.0, Vector::ZERO, Vector::new(1.0, 0.0, 0.0)))
        .unwrap();
    let b = engine
        .register_body(BodyDesc::new(0.0, Vector::X, Vector::new(0.0, 2.0, 0.0)))
        .unwrap();

    engine
        .collide(a, b, &CollisionPolicy::Bounce { factor: 1.0 })
        .unwrap();
    assert_eq!(engine.velocity(a).unwrap(), Vector::new(-1.0, 0.0, 0.0));
    assert_eq!(engine.velocity(b).unwrap(), Vector::new(0.0, -2.0, 0.0));
}

#[test]
fn test_absorb_into_massless_is_unchanged() {
    let mut engine = engine();
    let a = engine.register_body(BodyDesc::new(1.0, Vector::ZERO, Vector::ZERO)).unwrap();
    let b = engine.register_body(BodyDesc::new(0.0, Vector::X, Vector::Y)).unwrap();

    let report = engine.collide(a, b, &CollisionPolicy::Absorb).unwrap();
    assert_eq!(report.resolution, Resolution::Unchanged);
    assert!(engine.is_active(b).unwrap());
}

#[test]
fn test_slow_explode_or_bounce_bounces() {
    let mut engine = engine();
    let (a, b) = pair(&mut engine);
    let policy = CollisionPolicy::ExplodeOrBounce {
        threshold: 100.0,
        factor: 1.0,
        ejecta: Ejecta::default(),
    };
    let report = engine.collide(a, b, &policy).unwrap();
    assert!(matches!(report.resolution, Resolution::Bounced { .. }));
    assert!(engine.swarm_ids().is_empty());
}

#[test]
fn test_explosion_ejecta_evolve() {
    let mut engine = engine();
    let (a, b) = pair(&mut engine);
    engine.start().unwrap();

    let ejecta = Ejecta {
        particles: 40,
        ..Ejecta::default()
    };
    let report = engine
        .collide(a, b, &CollisionPolicy::Explode { ejecta })
        .unwrap();
    let swarm_id = report.ejecta.unwrap();
    assert!(!engine.is_active(b).unwrap());

    for _ in 0..10 {
        engine.step(1.0 / FRAME_RATE).unwrap();
    }
    let swarm = engine.swarm(swarm_id).unwrap();
    assert_eq!(swarm.particle_count(), 40);
    for i in 0..swarm.particle_count() {
        assert!(swarm.position(i).is_finite());
        assert!(swarm.velocity(i).is_finite());
    }
    let survivor_mass: Scalar = engine.mass(a).unwrap();
    assert_abs_diff_eq!(survivor_mass, 4.0, epsilon = 1e-12);
}
