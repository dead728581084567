//! Particle swarms driven by the engine

use gravitas::physics::engine::{BodyDesc, Engine, EngineOptions, FRAME_RATE};
use gravitas::physics::integrators::registry::IntegratorRegistry;
use gravitas::physics::math::{Scalar, Vector};
use gravitas::physics::particles::BurstEmitter;
use gravitas::physics::particles::initializers::DustBall;
use gravitas::physics::units::ScaleState;
use gravitas::resources::SharedRng;

const FRAME: Scalar = 1.0 / FRAME_RATE;

fn engine_with_planet() -> Engine {
    let mut engine = Engine::new(
        &EngineOptions::default(),
        ScaleState::default(),
        &IntegratorRegistry::default(),
    )
    .unwrap();
    engine
        .register_body(BodyDesc::new(1.0, Vector::ZERO, Vector::ZERO).with_capture_radius(0.5))
        .unwrap();
    engine
}

#[test]
fn test_dust_inside_capture_radius_is_retired() {
    let mut engine = engine_with_planet();
    let dust = DustBall::new(Vector::ZERO, 0.2, Vector::ZERO, SharedRng::from_seed(1));
    let swarm = engine.add_swarm(
        Box::new(BurstEmitter::new(25, Vector::ZERO)),
        Some(Box::new(dust)),
        Vector::ZERO,
    );
    engine.start().unwrap();
    engine.step(FRAME).unwrap();

    let swarm = engine.swarm(swarm).unwrap();
    assert!(swarm.is_one_shot());
    assert_eq!(swarm.inactive_count(), 25);
    assert!(swarm.all_inactive());
}

#[test]
fn test_distant_dust_falls_toward_planet() {
    let mut engine = engine_with_planet();
    let center = Vector::new(4.0, 0.0, 0.0);
    let dust = DustBall::new(center, 0.1, Vector::ZERO, SharedRng::from_seed(2));
    let swarm_id = engine.add_swarm(
        Box::new(BurstEmitter::new(10, center)),
        Some(Box::new(dust)),
        Vector::ZERO,
    );
    engine.start().unwrap();
    engine.step(FRAME).unwrap();
    let start: Vec<Scalar> = {
        let swarm = engine.swarm(swarm_id).unwrap();
        (0..10).map(|i| swarm.position(i).length()).collect()
    };

    for _ in 0..60 {
        engine.step(FRAME).unwrap();
    }

    let swarm = engine.swarm(swarm_id).unwrap();
    assert_eq!(swarm.inactive_count(), 0);
    for (i, r0) in start.iter().enumerate() {
        assert!(swarm.is_active(i));
        assert!(swarm.position(i).length() < *r0, "particle {i} did not fall");
        assert!(swarm.velocity(i).x < 0.0);
    }
}

#[test]
fn test_emitter_without_initializer_uses_initial_velocity() {
    let mut engine = engine_with_planet();
    let swarm_id = engine.add_swarm(
        Box::new(BurstEmitter::new(3, Vector::new(0.0, 10.0, 0.0))),
        None,
        Vector::new(0.0, 0.0, 1.0),
    );
    engine.start().unwrap();
    engine.step(FRAME).unwrap();

    let swarm = engine.swarm(swarm_id).unwrap();
    for i in 0..3 {
        assert!((swarm.velocity(i).z - 1.0).abs() < 1e-3);
        assert!(swarm.position(i).z > 0.0);
    }
    assert!(engine.remove_swarm(swarm_id).is_ok());
    assert!(engine.swarm(swarm_id).is_err());
}
