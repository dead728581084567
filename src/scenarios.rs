//! Ready-made initial conditions
//!
//! Every builder registers its bodies with the engine and returns their ids in
//! registration order. Positions and velocities are in user units.

use crate::config::ScenarioKind;
use crate::error::Result;
use crate::physics::body::BodyId;
use crate::physics::engine::{BodyDesc, Engine};
use crate::physics::math::{Scalar, Vector, random_unit_vector};
use crate::physics::orbit::{OrbitElements, OrbitSize};
use crate::resources::SharedRng;
use bevy::log::info;
use rand::Rng;

/// Earth-to-Sun mass ratio
pub const EARTH_SUN_MASS_RATIO: Scalar = 3.003e-6;

/// Registers the scenario `kind`. `count` is only used by the random scenarios.
pub fn build(kind: ScenarioKind, engine: &mut Engine, rng: &mut SharedRng, count: usize) -> Result<Vec<BodyId>> {
    let ids = match kind {
        ScenarioKind::SunEarth => sun_earth(engine)?,
        ScenarioKind::FigureEight => figure_eight(engine)?,
        ScenarioKind::RandomCluster => random_cluster(engine, rng, count)?,
        ScenarioKind::TestBodies => planet_with_test_bodies(engine, rng, count)?,
    };
    info!("Scenario {:?}: {} bodies", kind, ids.len());
    Ok(ids)
}

/// Unit-mass sun with an Earth-mass planet on a circular orbit of radius 1.
pub fn sun_earth(engine: &mut Engine) -> Result<Vec<BodyId>> {
    let sun = engine.register_body(BodyDesc::new(1.0, Vector::ZERO, Vector::ZERO).with_capture_radius(0.05))?;
    let earth = engine.register_body(BodyDesc::orbiting(
        EARTH_SUN_MASS_RATIO,
        sun,
        OrbitElements::circular(1.0),
    ))?;
    Ok(vec![sun, earth])
}

/// Chenciner-Montgomery periodic three-body orbit.
pub fn figure_eight(engine: &mut Engine) -> Result<Vec<BodyId>> {
    let p = Vector::new(0.970_004_36, -0.243_087_53, 0.0);
    let v = Vector::new(0.466_203_685, 0.432_365_73, 0.0);
    let bodies = [(p, v), (-p, v), (Vector::ZERO, -2.0 * v)];

    bodies
        .into_iter()
        .map(|(position, velocity)| engine.register_body(BodyDesc::new(1.0, position, velocity)))
        .collect()
}

/// `count` bodies of random mass in a ball, with small random velocities.
pub fn random_cluster(engine: &mut Engine, rng: &mut SharedRng, count: usize) -> Result<Vec<BodyId>> {
    let radius = 2.0 * libm::cbrt(count.max(1) as Scalar);
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        let r = radius * libm::cbrt(rng.random::<Scalar>());
        let position = random_unit_vector(rng) * r;
        let speed: Scalar = rng.random_range(0.0..0.2);
        let velocity = random_unit_vector(rng) * speed;
        let mass: Scalar = rng.random_range(0.5..1.5);
        ids.push(engine.register_body(BodyDesc::new(mass, position, velocity).with_capture_radius(0.01))?);
    }
    Ok(ids)
}

/// A unit-mass planet circled by `count` massless test bodies on randomly
/// oriented near-circular orbits.
pub fn planet_with_test_bodies(engine: &mut Engine, rng: &mut SharedRng, count: usize) -> Result<Vec<BodyId>> {
    let planet = engine.register_body(BodyDesc::new(1.0, Vector::ZERO, Vector::ZERO).with_capture_radius(0.5))?;
    let mut ids = Vec::with_capacity(count + 1);
    ids.push(planet);

    for _ in 0..count {
        let elements = OrbitElements {
            size: OrbitSize::SemiMajorAxis(rng.random_range(2.0..10.0)),
            eccentricity: rng.random_range(0.0..0.1),
            inclination: rng.random_range(0.0..180.0),
            ascending_node: rng.random_range(0.0..360.0),
            argument_of_pericenter: rng.random_range(0.0..360.0),
            true_anomaly: rng.random_range(0.0..360.0),
        };
        ids.push(engine.register_body(BodyDesc::orbiting(0.0, planet, elements))?);
    }
    Ok(ids)
}
