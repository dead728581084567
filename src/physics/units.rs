//! Unit systems and the derived scale state
//!
//! Internally every simulation runs with G = 1. A [`UnitSystem`] together with a
//! user length scale and time scale determines how much externally specified
//! masses and velocities must be stretched so that the dimensionless dynamics
//! reproduce the physical ones.
//!
//! The derivation, for every system other than dimensionless:
//!
//! ```text
//! time_unity  = g1_time / sqrt(length_scale³)
//! mass_scale  = (game_seconds_per_unit / time_unity)²
//! vel_scale   = length_scale / time_scale        (× km/s → AU/yr for solar)
//! ```
//!
//! where `g1_time` is the time unit that makes G = 1 in the system's own
//! (length, mass) basis and `game_seconds_per_unit` is how many simulated
//! seconds correspond to one second, hour or year of physical time.

use crate::error::{EngineError, Result};
use crate::physics::math::Scalar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// G = 1 time unit for SI (metres, kilograms), in seconds
pub const G1_TIME_SI: Scalar = 122_406.448_1;
/// G = 1 time unit for orbital units (km, 1E24 kg), in hours
pub const G1_TIME_ORBIT: Scalar = 0.003_870_832;
/// G = 1 time unit for solar units (AU, 1E24 kg), in years
pub const G1_TIME_SOLAR: Scalar = 7_082_595_090.0;

pub const SEC_PER_HOUR: Scalar = 3600.0;
pub const SEC_PER_YEAR: Scalar = 3600.0 * 24.0 * 365.25;
pub const KM_SEC_TO_AU_YR: Scalar = 0.210_949_527;

/// Unit system used to interpret body masses, positions and velocities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    /// G = 1, no conversion
    #[default]
    Dimensionless,
    /// metres, kilograms, seconds
    Si,
    /// km, 1E24 kg, hours
    Orbital,
    /// AU, 1E24 kg, years
    Solar,
}

impl UnitSystem {
    pub const ALL: [UnitSystem; 4] = [
        UnitSystem::Dimensionless,
        UnitSystem::Si,
        UnitSystem::Orbital,
        UnitSystem::Solar,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            UnitSystem::Dimensionless => "dimensionless",
            UnitSystem::Si => "si",
            UnitSystem::Orbital => "orbital",
            UnitSystem::Solar => "solar",
        }
    }

    pub fn length_label(&self) -> &'static str {
        match self {
            UnitSystem::Dimensionless => "DL",
            UnitSystem::Si => "m",
            UnitSystem::Orbital => "km",
            UnitSystem::Solar => "AU",
        }
    }

    pub fn mass_label(&self) -> &'static str {
        match self {
            UnitSystem::Dimensionless => "DL",
            UnitSystem::Si => "kg",
            UnitSystem::Orbital | UnitSystem::Solar => "1E24 kg",
        }
    }

    pub fn velocity_label(&self) -> &'static str {
        match self {
            UnitSystem::Dimensionless => "DL",
            UnitSystem::Si => "m/s",
            UnitSystem::Orbital => "km/hr",
            UnitSystem::Solar => "km/s",
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for UnitSystem {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        UnitSystem::ALL
            .into_iter()
            .find(|units| units.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!("Unknown unit system '{s}'. Expected one of: dimensionless, si, orbital, solar")
            })
    }
}

/// Immutable snapshot of the unit configuration and the multipliers derived from it.
///
/// Built once with [`ScaleState::derive`] and handed by reference to everything
/// that converts between user, world and physics space. A new value replaces the
/// old one wholesale; there is no in-place mutation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleState {
    unit_system: UnitSystem,
    length_scale: Scalar,
    time_scale: Scalar,
    physics_to_world: Scalar,
    mass_scale: Scalar,
    velocity_scale: Scalar,
}

impl ScaleState {
    /// Derives mass and velocity multipliers for `unit_system`.
    ///
    /// `user_mass_scale` is only honoured for [`UnitSystem::Dimensionless`]; every
    /// physical system computes its own. Any zero (or negative, or NaN) input is a
    /// fatal configuration error.
    pub fn derive(
        unit_system: UnitSystem,
        length_scale: Scalar,
        time_scale: Scalar,
        user_mass_scale: Scalar,
        physics_to_world: Scalar,
    ) -> Result<Self> {
        require_positive("length scale", length_scale)?;
        require_positive("time scale", time_scale)?;
        require_positive("physics-to-world factor", physics_to_world)?;

        let (mass_scale, velocity_scale) = match unit_system {
            UnitSystem::Dimensionless => (user_mass_scale, 1.0),
            UnitSystem::Si => (
                physical_mass_scale(G1_TIME_SI, 1.0 / time_scale, length_scale),
                length_scale / time_scale,
            ),
            UnitSystem::Orbital => (
                physical_mass_scale(G1_TIME_ORBIT, SEC_PER_HOUR / time_scale, length_scale),
                length_scale / time_scale,
            ),
            UnitSystem::Solar => (
                physical_mass_scale(G1_TIME_SOLAR, SEC_PER_YEAR / time_scale, length_scale),
                KM_SEC_TO_AU_YR * length_scale / time_scale,
            ),
        };
        require_positive("mass scale", mass_scale)?;

        Ok(Self {
            unit_system,
            length_scale,
            time_scale,
            physics_to_world,
            mass_scale,
            velocity_scale,
        })
    }

    pub fn unit_system(&self) -> UnitSystem {
        self.unit_system
    }

    pub fn length_scale(&self) -> Scalar {
        self.length_scale
    }

    pub fn time_scale(&self) -> Scalar {
        self.time_scale
    }

    pub fn physics_to_world(&self) -> Scalar {
        self.physics_to_world
    }

    /// Physics-space length of one user length unit
    pub fn physics_per_user_length(&self) -> Scalar {
        self.length_scale / self.physics_to_world
    }

    /// Multiplier applied to every externally specified mass
    pub fn mass_scale(&self) -> Scalar {
        self.mass_scale
    }

    /// Multiplier applied to every externally specified velocity
    pub fn velocity_scale(&self) -> Scalar {
        self.velocity_scale
    }
}

impl Default for ScaleState {
    fn default() -> Self {
        Self {
            unit_system: UnitSystem::Dimensionless,
            length_scale: 1.0,
            time_scale: 1.0,
            physics_to_world: 1.0,
            mass_scale: 1.0,
            velocity_scale: 1.0,
        }
    }
}

fn physical_mass_scale(g1_time: Scalar, game_sec_per_unit: Scalar, length_scale: Scalar) -> Scalar {
    let time_unity = g1_time / libm::sqrt(length_scale * length_scale * length_scale);
    game_sec_per_unit * game_sec_per_unit / (time_unity * time_unity)
}

fn require_positive(name: &'static str, value: Scalar) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(EngineError::ZeroScale { name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dimensionless_keeps_user_mass_scale() {
        let scale = ScaleState::derive(UnitSystem::Dimensionless, 1.0, 1.0, 3.5, 1.0).unwrap();
        assert_eq!(scale.mass_scale(), 3.5);
        assert_eq!(scale.velocity_scale(), 1.0);
    }

    #[test]
    fn test_si_mass_scale() {
        let scale = ScaleState::derive(UnitSystem::Si, 1.0, 1.0, 1.0, 1.0).unwrap();
        assert_relative_eq!(scale.mass_scale(), 1.0 / (G1_TIME_SI * G1_TIME_SI), max_relative = 1e-12);
        assert_eq!(scale.velocity_scale(), 1.0);
    }

    #[test]
    fn test_solar_velocity_scale_includes_unit_conversion() {
        let scale = ScaleState::derive(UnitSystem::Solar, 2.0, 4.0, 1.0, 1.0).unwrap();
        assert_relative_eq!(scale.velocity_scale(), KM_SEC_TO_AU_YR * 0.5, max_relative = 1e-12);
    }

    #[test]
    fn test_orbital_mass_scale_grows_with_length_cubed() {
        let one = ScaleState::derive(UnitSystem::Orbital, 1.0, 1.0, 1.0, 1.0).unwrap();
        let two = ScaleState::derive(UnitSystem::Orbital, 2.0, 1.0, 1.0, 1.0).unwrap();
        assert_relative_eq!(two.mass_scale() / one.mass_scale(), 8.0, max_relative = 1e-12);
    }

    #[test]
    fn test_rederiving_is_idempotent() {
        for units in UnitSystem::ALL {
            let first = ScaleState::derive(units, 1000.0, 0.25, 1.0, 2.0).unwrap();
            let second = ScaleState::derive(units, 1000.0, 0.25, 1.0, 2.0).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_zero_scales_are_fatal() {
        assert_eq!(
            ScaleState::derive(UnitSystem::Si, 1.0, 0.0, 1.0, 1.0),
            Err(EngineError::ZeroScale { name: "time scale" })
        );
        assert_eq!(
            ScaleState::derive(UnitSystem::Si, 1.0, 1.0, 1.0, 0.0),
            Err(EngineError::ZeroScale { name: "physics-to-world factor" })
        );
        assert_eq!(
            ScaleState::derive(UnitSystem::Dimensionless, 1.0, 1.0, 0.0, 1.0),
            Err(EngineError::ZeroScale { name: "mass scale" })
        );
    }

    #[test]
    fn test_unit_system_parsing() {
        assert_eq!("Solar".parse::<UnitSystem>(), Ok(UnitSystem::Solar));
        assert!("parsecs".parse::<UnitSystem>().is_err());
        assert_eq!(UnitSystem::Orbital.velocity_label(), "km/hr");
    }
}
