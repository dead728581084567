//! Simulation plugin
//!
//! Owns the [`Engine`] resource and drives it from the fixed-update schedule.
//! Control goes through [`SimulationCommand`] events.

use crate::physics::integrators::registry::IntegratorRegistry;
use crate::prelude::*;

mod actions;
mod physics;

pub use physics::{PhysicsSet, build_engine, start_scenario};

use actions::{handle_restart_event, handle_set_time_zoom_event, handle_toggle_pause_event};
use bevy::ecs::schedule::{LogLevel, ScheduleBuildSettings};
use physics::{report_energy, resolve_contacts, setup_engine, step_engine};

/// Runs a gravity simulation from [`SimulationConfig`].
///
/// A configuration inserted before the plugin is added takes precedence over
/// the user config file.
pub struct GravityPlugin;

impl Plugin for GravityPlugin {
    fn build(&self, app: &mut App) {
        let config = match app.world().get_resource::<SimulationConfig>() {
            Some(config) => config.clone(),
            None => SimulationConfig::load_from_user_config(),
        };

        match toml::to_string_pretty(&config) {
            Ok(toml_string) => {
                info!("=== Current Configuration (TOML) ===\n{}", toml_string);
                info!("=== End Configuration ===");
            }
            Err(e) => {
                error!("Failed to serialize configuration to TOML: {}", e);
            }
        }

        app.insert_resource(SharedRng::from_optional_seed(config.physics.initial_seed));
        app.insert_resource(config);
        app.init_resource::<IntegratorRegistry>();
        app.init_resource::<InitialEnergy>();

        app.add_event::<SimulationCommand>();
        app.init_state::<AppState>();

        app.edit_schedule(FixedUpdate, |schedule| {
            schedule.set_build_settings(ScheduleBuildSettings {
                ambiguity_detection: LogLevel::Warn,
                ..default()
            });
        });

        app.configure_sets(
            FixedUpdate,
            (
                PhysicsSet::Step,
                PhysicsSet::ResolveContacts,
                PhysicsSet::Report,
            )
                .chain(),
        );

        app.add_systems(Startup, setup_engine);
        app.add_systems(
            FixedUpdate,
            (
                step_engine
                    .in_set(PhysicsSet::Step)
                    .run_if(in_state(AppState::Running)),
                resolve_contacts
                    .in_set(PhysicsSet::ResolveContacts)
                    .run_if(in_state(AppState::Running)),
                report_energy.in_set(PhysicsSet::Report),
            ),
        );
        app.add_systems(
            Update,
            (
                handle_restart_event,
                handle_toggle_pause_event,
                handle_set_time_zoom_event,
            )
                .chain(),
        );
    }
}
