//! Test utilities for plugin testing

use std::time::Duration;

use bevy::time::TimeUpdateStrategy;

use crate::plugins::GravityPlugin;
use crate::prelude::*;

/// Creates a headless app running [`GravityPlugin`] with `config`.
///
/// Virtual time is frozen so fixed-update ticks only happen when a test runs
/// the `FixedUpdate` schedule itself. Startup has already run on return.
pub fn create_test_app(config: SimulationConfig) -> App {
    let mut app = App::new();

    app.add_plugins((MinimalPlugins, bevy::state::app::StatesPlugin));
    app.insert_resource(TimeUpdateStrategy::ManualDuration(Duration::ZERO));
    app.insert_resource(config);
    app.add_plugins(GravityPlugin);

    app.update();
    app
}
