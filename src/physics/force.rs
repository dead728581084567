//! Pluggable radial force laws
//!
//! The Newtonian inverse-square law is the default and is inlined directly in the
//! integrators' hot loops; it is represented here by `None`. Any other law is
//! selected explicitly and handed to the integrators as a shared trait object.
//!
//! Note that the orbit helpers ([`crate::physics::orbit`]) assume Newtonian
//! gravity. Their results are meaningless under a different law.

use crate::physics::math::Scalar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Magnitude of a central attraction as a function of separation.
pub trait ForceLaw: Send + Sync + fmt::Debug {
    /// Force per unit mass product at separation `r`
    fn magnitude(&self, r: Scalar) -> Scalar;

    /// d(magnitude)/dr, needed by the Hermite integrator for the jerk
    fn derivative(&self, r: Scalar) -> Scalar;

    fn name(&self) -> &str;
}

/// Shared handle to a non-default force law
pub type SharedForceLaw = Arc<dyn ForceLaw>;

#[derive(Debug, Clone, Copy, Default)]
pub struct Newtonian;

impl ForceLaw for Newtonian {
    fn magnitude(&self, r: Scalar) -> Scalar {
        1.0 / (r * r)
    }

    fn derivative(&self, r: Scalar) -> Scalar {
        -2.0 / (r * r * r)
    }

    fn name(&self) -> &str {
        "newtonian"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InverseR;

impl ForceLaw for InverseR {
    fn magnitude(&self, r: Scalar) -> Scalar {
        1.0 / r
    }

    fn derivative(&self, r: Scalar) -> Scalar {
        -1.0 / (r * r)
    }

    fn name(&self) -> &str {
        "inverse_r"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InverseR3;

impl ForceLaw for InverseR3 {
    fn magnitude(&self, r: Scalar) -> Scalar {
        1.0 / (r * r * r)
    }

    fn derivative(&self, r: Scalar) -> Scalar {
        -3.0 / (r * r * r * r)
    }

    fn name(&self) -> &str {
        "inverse_r3"
    }
}

/// Linear (spring-like) attraction
#[derive(Debug, Clone, Copy, Default)]
pub struct ForceR;

impl ForceLaw for ForceR {
    fn magnitude(&self, r: Scalar) -> Scalar {
        r
    }

    fn derivative(&self, _r: Scalar) -> Scalar {
        1.0
    }

    fn name(&self) -> &str {
        "force_r"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ForceR2;

impl ForceLaw for ForceR2 {
    fn magnitude(&self, r: Scalar) -> Scalar {
        r * r
    }

    fn derivative(&self, r: Scalar) -> Scalar {
        2.0 * r
    }

    fn name(&self) -> &str {
        "force_r2"
    }
}

/// Logarithmic law `a·ln(b·r)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Logarithmic {
    pub a: Scalar,
    pub b: Scalar,
}

impl Default for Logarithmic {
    fn default() -> Self {
        Self { a: 2.0, b: 1.0 }
    }
}

impl ForceLaw for Logarithmic {
    fn magnitude(&self, r: Scalar) -> Scalar {
        self.a * libm::log(self.b * r)
    }

    fn derivative(&self, r: Scalar) -> Scalar {
        self.a / r
    }

    fn name(&self) -> &str {
        "logarithmic"
    }
}

/// Configuration-level selection of a force law.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceLawKind {
    #[default]
    Newtonian,
    InverseR,
    InverseR3,
    ForceR,
    ForceR2,
    Logarithmic,
}

impl ForceLawKind {
    pub const ALL: [ForceLawKind; 6] = [
        ForceLawKind::Newtonian,
        ForceLawKind::InverseR,
        ForceLawKind::InverseR3,
        ForceLawKind::ForceR,
        ForceLawKind::ForceR2,
        ForceLawKind::Logarithmic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ForceLawKind::Newtonian => "newtonian",
            ForceLawKind::InverseR => "inverse_r",
            ForceLawKind::InverseR3 => "inverse_r3",
            ForceLawKind::ForceR => "force_r",
            ForceLawKind::ForceR2 => "force_r2",
            ForceLawKind::Logarithmic => "logarithmic",
        }
    }

    /// Instantiates the law; `None` means the inlined Newtonian path.
    pub fn build(&self) -> Option<SharedForceLaw> {
        match self {
            ForceLawKind::Newtonian => None,
            ForceLawKind::InverseR => Some(Arc::new(InverseR)),
            ForceLawKind::InverseR3 => Some(Arc::new(InverseR3)),
            ForceLawKind::ForceR => Some(Arc::new(ForceR)),
            ForceLawKind::ForceR2 => Some(Arc::new(ForceR2)),
            ForceLawKind::Logarithmic => Some(Arc::new(Logarithmic::default())),
        }
    }
}

impl fmt::Display for ForceLawKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ForceLawKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('-', "_");
        let alias = match normalized.as_str() {
            "gravity" | "newton" | "inverse_square" => "newtonian",
            "custom" | "log" => "logarithmic",
            other => other,
        };
        ForceLawKind::ALL
            .into_iter()
            .find(|kind| kind.name() == alias)
            .ok_or_else(|| {
                let names: Vec<&str> = ForceLawKind::ALL.iter().map(|k| k.name()).collect();
                format!("Unknown force law: '{s}'. Available force laws: {}", names.join(", "))
            })
    }
}

/// Pairwise coefficient `c` such that `a_i += m_j · c · r_ji`.
///
/// `epsilon` keeps the coefficient finite as the separation approaches zero. The
/// Newtonian branch adds it to r³; a supplied law adds it to r.
#[inline]
pub fn pair_coefficient(law: Option<&dyn ForceLaw>, r2: Scalar, epsilon: Scalar) -> Scalar {
    match law {
        None => 1.0 / (r2 * libm::sqrt(r2) + epsilon),
        Some(law) => {
            let r_sep = libm::sqrt(r2) + epsilon;
            law.magnitude(r_sep) / r_sep
        }
    }
}
