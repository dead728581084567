use bevy::log::{Level, LogPlugin};
use bevy::prelude::*;
use bevy::state::app::StatesPlugin;
use clap::Parser;

use gravitas::cli::{self, Args, CliError};
use gravitas::physics::engine::{Engine, FRAME_RATE};
use gravitas::plugins::GravityPlugin;

fn main() {
    let args = Args::parse();

    if args.list_integrators {
        cli::handle_list_integrators();
        return;
    }
    if args.list_force_laws {
        cli::handle_list_force_laws();
        return;
    }

    if let Err(e) = run(&args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), CliError> {
    let config = cli::load_and_apply_config(args)?;
    let ticks = args
        .ticks
        .unwrap_or_else(|| (config.scenario.duration * FRAME_RATE).ceil() as u64);

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };

    let mut app = App::new();
    app.add_plugins((
        MinimalPlugins,
        LogPlugin {
            level,
            ..default()
        },
        StatesPlugin,
    ));
    app.insert_resource(Time::<Fixed>::from_hz(FRAME_RATE));
    app.insert_resource(config);
    app.add_plugins(GravityPlugin);
    app.finish();
    app.cleanup();

    // Runs startup, which builds the scenario
    app.update();

    if !app.world().contains_resource::<Engine>() {
        return Err(CliError::ConfigLoad(
            "simulation failed to start, see log for details".to_string(),
        ));
    }

    let started = chrono::Local::now();
    for _ in 0..ticks {
        app.world_mut().run_schedule(FixedUpdate);
    }
    let elapsed = chrono::Local::now() - started;

    let engine = app.world().resource::<Engine>();
    println!("Integrator:      {}", engine.integrator_name());
    println!("Bodies:          {} massive, {} massless", engine.massive_count(), engine.massless_count());
    println!("Ticks:           {ticks}");
    println!("Started:         {}", started.format("%Y-%m-%d %H:%M:%S"));
    println!("Wall time:       {} ms", elapsed.num_milliseconds());
    println!("Physical time:   {:.6}", engine.physical_time());
    println!("Energy:          {:.9e}", engine.energy());
    println!("Energy drift:    {:.3e}", engine.energy_drift());
    let center = engine.world_center_of_mass();
    println!("Center of mass:  ({:.6}, {:.6}, {:.6})", center.x, center.y, center.z);
    Ok(())
}
