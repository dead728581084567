//! Command line interface for the headless gravitas runner

use clap::Parser;
use std::fmt;

use crate::config::{ScenarioKind, SimulationConfig};
use crate::error::EngineError;
use crate::physics::force::ForceLawKind;
use crate::physics::integrators::registry::IntegratorRegistry;

/// CLI-specific errors
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded or failed validation
    ConfigLoad(String),
    /// Invalid integrator name provided
    InvalidIntegrator(String),
    /// Invalid force law name provided
    InvalidForceLaw(String),
    /// The engine rejected the configuration or a body
    Engine(EngineError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::ConfigLoad(msg) => write!(f, "Failed to load configuration: {msg}"),
            CliError::InvalidIntegrator(msg) => write!(f, "Invalid integrator: {msg}"),
            CliError::InvalidForceLaw(msg) => write!(f, "Invalid force law: {msg}"),
            CliError::Engine(err) => write!(f, "Engine error: {err}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        CliError::Engine(err)
    }
}

/// Gravitas - gravitational N-body engine
#[derive(Parser, Debug, Default)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_DATE"), ")"), about, long_about = None)]
pub struct Args {
    /// Path to configuration file (TOML format)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<String>,

    /// Scenario to run (sun_earth, figure_eight, random_cluster, test_bodies)
    #[arg(long, value_name = "NAME", value_parser = parse_scenario)]
    pub scenario: Option<ScenarioKind>,

    /// Number of bodies for the random scenarios (overrides config file)
    #[arg(short = 'n', long, value_name = "COUNT")]
    pub bodies: Option<usize>,

    /// Integrator type (e.g., leapfrog, hermite, azt)
    #[arg(short = 'i', long, value_name = "TYPE")]
    pub integrator: Option<String>,

    /// Force law (e.g., newtonian, inverse_r, logarithmic)
    #[arg(short = 'f', long, value_name = "LAW")]
    pub force_law: Option<String>,

    /// Random seed for body generation
    #[arg(short = 's', long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// World seconds to simulate (overrides config file)
    #[arg(short = 'd', long, value_name = "SECONDS")]
    pub duration: Option<f64>,

    /// Number of 60 Hz ticks to run; takes precedence over the duration
    #[arg(short = 't', long, value_name = "COUNT")]
    pub ticks: Option<u64>,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// List available integrators and exit
    #[arg(long)]
    pub list_integrators: bool,

    /// List available force laws and exit
    #[arg(long)]
    pub list_force_laws: bool,
}

fn parse_scenario(name: &str) -> Result<ScenarioKind, String> {
    match name.to_lowercase().replace('-', "_").as_str() {
        "sun_earth" => Ok(ScenarioKind::SunEarth),
        "figure_eight" | "figure8" => Ok(ScenarioKind::FigureEight),
        "random_cluster" | "cluster" => Ok(ScenarioKind::RandomCluster),
        "test_bodies" => Ok(ScenarioKind::TestBodies),
        _ => Err(format!(
            "Unknown scenario '{name}'. Expected one of: sun_earth, figure_eight, random_cluster, test_bodies"
        )),
    }
}

/// Handles the --list-integrators flag by printing available integrators and exiting
pub fn handle_list_integrators() {
    let registry = IntegratorRegistry::new().with_standard_integrators();
    println!("Available integrators:");
    for name in registry.list_available() {
        match registry.describe(&name) {
            Some(description) => println!("  - {name}: {description}"),
            None => println!("  - {name}"),
        }
    }

    let aliases = registry.list_aliases();
    if !aliases.is_empty() {
        println!("\nAliases:");
        for (alias, target) in aliases {
            println!("  - {alias} -> {target}");
        }
    }
}

pub fn handle_list_force_laws() {
    println!("Available force laws:");
    for kind in ForceLawKind::ALL {
        println!("  - {kind}");
    }
}

/// Loads configuration from file or defaults, then applies command-line overrides
pub fn load_and_apply_config(args: &Args) -> Result<SimulationConfig, CliError> {
    let mut config = if let Some(config_path) = &args.config {
        println!("Loading configuration from: {config_path}");
        SimulationConfig::load_or_default(config_path)
    } else {
        SimulationConfig::load_from_user_config()
    };

    if let Some(kind) = args.scenario {
        println!("Using scenario: {kind:?}");
        config.scenario.kind = kind;
    }

    if let Some(body_count) = args.bodies {
        println!("Overriding body count to: {body_count}");
        config.scenario.body_count = body_count;
    }

    if let Some(integrator_type) = &args.integrator {
        let registry = IntegratorRegistry::new().with_standard_integrators();
        let canonical = registry.resolve(integrator_type).ok_or_else(|| {
            let available = registry.list_available().join(", ");
            CliError::InvalidIntegrator(format!(
                "Unknown integrator: '{integrator_type}'. Available integrators: {available}"
            ))
        })?;

        println!("Using integrator: {canonical}");
        config.physics.integrator = canonical.to_string();
    }

    if let Some(force_law) = &args.force_law {
        let kind: ForceLawKind = force_law.parse().map_err(CliError::InvalidForceLaw)?;
        println!("Using force law: {kind}");
        config.physics.force_law = kind;
    }

    if let Some(seed) = args.seed {
        println!("Using random seed: {seed}");
        config.physics.initial_seed = Some(seed);
    }

    if let Some(duration) = args.duration {
        println!("Overriding duration to: {duration}");
        config.scenario.duration = duration;
    }

    config
        .validate()
        .map_err(|err| CliError::ConfigLoad(err.to_string()))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["gravitas", "--config", "/nonexistent/gravitas.toml"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = load_and_apply_config(&args(&[
            "--integrator",
            "hermite",
            "--force-law",
            "inverse-r",
            "--seed",
            "9",
            "--scenario",
            "figure-eight",
        ]))
        .unwrap();

        assert_eq!(config.physics.integrator, "hermite");
        assert_eq!(config.physics.force_law, ForceLawKind::InverseR);
        assert_eq!(config.physics.initial_seed, Some(9));
        assert_eq!(config.scenario.kind, ScenarioKind::FigureEight);
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        assert!(matches!(
            load_and_apply_config(&args(&["--integrator", "euler"])),
            Err(CliError::InvalidIntegrator(_))
        ));
        assert!(matches!(
            load_and_apply_config(&args(&["--force-law", "cubic"])),
            Err(CliError::InvalidForceLaw(_))
        ));
    }

    #[test]
    fn test_zero_duration_fails_validation() {
        assert!(matches!(
            load_and_apply_config(&args(&["--duration", "0"])),
            Err(CliError::ConfigLoad(_))
        ));
    }
}
