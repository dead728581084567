//! Handlers for [`SimulationCommand`] events

use super::physics::{build_engine, start_scenario};
use crate::physics::integrators::registry::IntegratorRegistry;
use crate::prelude::*;

/// Replaces the engine with a fresh one built from the current configuration.
///
/// A configured seed is reused so a restart replays the same scenario.
pub fn handle_restart_event(
    mut commands_reader: EventReader<SimulationCommand>,
    mut commands: Commands,
    config: Res<SimulationConfig>,
    registry: Res<IntegratorRegistry>,
    mut rng: ResMut<SharedRng>,
    mut initial_energy: ResMut<InitialEnergy>,
) {
    for command in commands_reader.read() {
        if !matches!(command, SimulationCommand::Restart) {
            continue;
        }
        *rng = SharedRng::from_optional_seed(config.physics.initial_seed);

        let built = build_engine(&config, &registry).and_then(|mut engine| {
            start_scenario(&mut engine, &config, &mut rng, &mut initial_energy)?;
            Ok(engine)
        });
        match built {
            Ok(engine) => {
                info!("Simulation restarted");
                commands.insert_resource(engine);
            }
            Err(e) => error!("Restart failed: {}", e),
        }
    }
}

pub fn handle_toggle_pause_event(
    mut commands_reader: EventReader<SimulationCommand>,
    current_state: Res<State<AppState>>,
    mut next_state: ResMut<NextState<AppState>>,
) {
    for command in commands_reader.read() {
        if !matches!(command, SimulationCommand::TogglePause) {
            continue;
        }
        match current_state.get() {
            AppState::Running => next_state.set(AppState::Paused),
            AppState::Paused => next_state.set(AppState::Running),
        }
    }
}

pub fn handle_set_time_zoom_event(
    mut commands_reader: EventReader<SimulationCommand>,
    engine: Option<ResMut<Engine>>,
) {
    let Some(mut engine) = engine else {
        return;
    };
    for command in commands_reader.read() {
        let SimulationCommand::SetTimeZoom(zoom) = *command else {
            continue;
        };
        if let Err(e) = engine.set_time_zoom(zoom) {
            warn!("Ignoring time zoom {}: {}", zoom, e);
        }
    }
}
