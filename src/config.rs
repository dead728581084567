use crate::error::{EngineError, Result};
use crate::physics::collision::CollisionPolicy;
use crate::physics::engine::EngineOptions;
use crate::physics::force::ForceLawKind;
use crate::physics::math::Scalar;
use crate::physics::units::{ScaleState, UnitSystem};
use bevy::prelude::*;
use gravitas_macros::ConfigDefaults;
use serde::{Deserialize, Serialize};
use std::path::Path;

const CONFIG_FILE_NAME: &str = "config.toml";
const ENV_PREFIX: &str = "GRAVITAS";

#[derive(Resource, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub physics: PhysicsConfig,
    pub units: UnitsConfig,
    pub scenario: ScenarioConfig,
}

#[derive(ConfigDefaults, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Integrator name or alias
    #[default("leapfrog")]
    pub integrator: String,

    #[default(ForceLawKind::Newtonian)]
    pub force_law: ForceLawKind,

    #[default(8)]
    #[positive]
    pub steps_per_frame: u32,

    #[default(2)]
    #[positive]
    pub particle_steps_per_frame: u32,

    /// Evolve zero-mass bodies outside the integrator
    #[default(true)]
    pub optimize_massless: bool,

    #[default(None)]
    pub initial_seed: Option<u64>,

    #[default(10)]
    pub body_capacity: usize,
}

#[derive(ConfigDefaults, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct UnitsConfig {
    #[default(UnitSystem::Dimensionless)]
    pub unit_system: UnitSystem,

    #[default(1.0)]
    #[positive]
    pub length_scale: Scalar,

    #[default(1.0)]
    #[positive]
    pub time_scale: Scalar,

    /// Only used by the dimensionless system
    #[default(1.0)]
    #[positive]
    pub mass_scale: Scalar,

    #[default(1.0)]
    #[positive]
    pub physics_to_world: Scalar,
}

/// Built-in initial conditions for the headless runner
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    #[default]
    SunEarth,
    FigureEight,
    RandomCluster,
    TestBodies,
}

#[derive(ConfigDefaults, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ScenarioConfig {
    #[default(ScenarioKind::SunEarth)]
    pub kind: ScenarioKind,

    /// Bodies generated by the random scenarios
    #[default(100)]
    pub body_count: usize,

    /// World seconds to run
    #[default(10.0)]
    #[positive]
    pub duration: Scalar,

    #[default(CollisionPolicy::Absorb)]
    pub collision_policy: CollisionPolicy,
}

impl SimulationConfig {
    /// Load configuration from a file, falling back to defaults if the file doesn't exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(
                        "Failed to parse config file {}: {}. Using defaults.",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => {
                info!("Config file {} not found. Using defaults.", path.display());
                Self::default()
            }
        }
    }

    /// Load `config.toml` from the platform config directory, layered with
    /// `GRAVITAS__SECTION__KEY` environment overrides.
    pub fn load_from_user_config() -> Self {
        let Some(dirs) = directories::ProjectDirs::from("", "", "gravitas") else {
            warn!("No user config directory available. Using defaults.");
            return Self::default();
        };
        let path = dirs.config_dir().join(CONFIG_FILE_NAME);

        let loaded = config::Config::builder()
            .add_source(config::File::from(path.as_path()).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|settings| settings.try_deserialize::<SimulationConfig>());

        match loaded {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Failed to load user configuration: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Rejects zero or negative scales and step counts.
    pub fn validate(&self) -> Result<()> {
        let invalid = self
            .physics
            .non_positive_fields()
            .into_iter()
            .chain(self.units.non_positive_fields())
            .chain(self.scenario.non_positive_fields())
            .next();
        match invalid {
            Some(name) => Err(EngineError::ZeroScale { name }),
            None => Ok(()),
        }
    }

    pub fn scale_state(&self) -> Result<ScaleState> {
        ScaleState::derive(
            self.units.unit_system,
            self.units.length_scale,
            self.units.time_scale,
            self.units.mass_scale,
            self.units.physics_to_world,
        )
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            integrator: self.physics.integrator.clone(),
            force_law: self.physics.force_law,
            steps_per_frame: self.physics.steps_per_frame,
            particle_steps_per_frame: self.physics.particle_steps_per_frame,
            optimize_massless: self.physics.optimize_massless,
            body_capacity: self.physics.body_capacity,
            seed: self.physics.initial_seed,
        }
    }
}
