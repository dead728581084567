use crate::config::SimulationConfig;
use crate::error::Result;
use crate::physics::engine::Engine;
use crate::physics::integrators::registry::IntegratorRegistry;
use crate::resources::{InitialEnergy, SharedRng};
use crate::scenarios;
use bevy::prelude::*;

/// Ticks between energy reports
const REPORT_INTERVAL: u64 = 60;

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum PhysicsSet {
    Step,
    ResolveContacts,
    Report,
}

/// Builds an empty engine from `config`, falling back to leapfrog when the
/// configured integrator is unknown.
pub fn build_engine(config: &SimulationConfig, registry: &IntegratorRegistry) -> Result<Engine> {
    let scale = config.scale_state()?;
    let mut options = config.engine_options();
    if registry.resolve(&options.integrator).is_none() {
        warn!(
            "Unknown integrator '{}', falling back to leapfrog",
            options.integrator
        );
        options.integrator = "leapfrog".to_string();
    }
    Engine::new(&options, scale, registry)
}

/// Registers the configured scenario and starts evolving.
pub fn start_scenario(
    engine: &mut Engine,
    config: &SimulationConfig,
    rng: &mut SharedRng,
    initial_energy: &mut InitialEnergy,
) -> Result<()> {
    scenarios::build(
        config.scenario.kind,
        engine,
        rng,
        config.scenario.body_count,
    )?;
    engine.start()?;
    **initial_energy = engine.initial_energy();
    Ok(())
}

pub fn setup_engine(
    mut commands: Commands,
    config: Res<SimulationConfig>,
    registry: Res<IntegratorRegistry>,
    mut rng: ResMut<SharedRng>,
    mut initial_energy: ResMut<InitialEnergy>,
) {
    let built = build_engine(&config, &registry).and_then(|mut engine| {
        start_scenario(&mut engine, &config, &mut rng, &mut initial_energy)?;
        Ok(engine)
    });
    match built {
        Ok(engine) => commands.insert_resource(engine),
        Err(e) => error!("Simulation not started: {}", e),
    }
}

pub fn step_engine(engine: Option<ResMut<Engine>>, time: Res<Time<Fixed>>) {
    let Some(mut engine) = engine else {
        return;
    };
    if !engine.is_evolving() {
        return;
    }
    if let Err(e) = engine.step(time.timestep().as_secs_f64()) {
        error!("Step failed: {}", e);
    }
}

/// Resolves overlapping capture spheres with the configured collision policy.
pub fn resolve_contacts(engine: Option<ResMut<Engine>>, config: Res<SimulationConfig>) {
    let Some(mut engine) = engine else {
        return;
    };
    if !engine.is_evolving() {
        return;
    }
    let policy = config.scenario.collision_policy;
    for (a, b) in engine.contacts() {
        // an earlier contact this tick may have absorbed one of the pair
        let active = engine.is_active(a).unwrap_or(false) && engine.is_active(b).unwrap_or(false);
        if !active {
            continue;
        }
        match engine.collide(a, b, &policy) {
            Ok(report) => {
                if let Some(swarm) = report.ejecta {
                    info!("Collision of {} and {} released {}", a, b, swarm);
                }
            }
            Err(e) => warn!("Collision of {} and {} failed: {}", a, b, e),
        }
    }
}

pub fn report_energy(engine: Option<Res<Engine>>, mut ticks: Local<u64>) {
    let Some(engine) = engine else {
        return;
    };
    *ticks += 1;
    if *ticks % REPORT_INTERVAL != 0 {
        return;
    }
    debug!(
        "t = {:.4}, energy drift = {:.3e}",
        engine.physical_time(),
        engine.energy_drift()
    );
}
