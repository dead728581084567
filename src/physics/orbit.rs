//! Two-body orbit elements
//!
//! Conversions between a body's state relative to a central mass and the
//! classical Keplerian elements. Angles are in degrees at the public surface,
//! matching how orbits are usually written down; the anomaly helpers work in
//! radians.
//!
//! Everything here assumes Newtonian gravity with G = 1. The results are
//! meaningless under any other force law.

use crate::error::{EngineError, Result};
use crate::physics::math::{Rotation, Scalar, Vector, angle_from_sin_cos, finite_or_zero};
use bevy::log::warn;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// Below this eccentricity the orbit is treated as a circle and the true
/// anomaly is folded into the argument of pericenter.
pub const CIRCULAR_ECCENTRICITY: Scalar = 1e-3;

/// |sin i| below this is treated as an equatorial orbit.
const EQUATORIAL_SIN: Scalar = 1e-5;

const KEPLER_TOLERANCE: Scalar = 1e-10;
const KEPLER_ITERATIONS: usize = 50;

/// How the size of an orbit is given
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrbitSize {
    /// Ellipses only
    SemiMajorAxis(Scalar),
    /// Closest approach; valid for any eccentricity
    Pericenter(Scalar),
}

/// Keplerian elements of an orbit around a central body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitElements {
    pub size: OrbitSize,
    pub eccentricity: Scalar,
    /// Degrees, 0 to 180
    #[serde(default)]
    pub inclination: Scalar,
    /// Longitude of the ascending node, degrees
    #[serde(default)]
    pub ascending_node: Scalar,
    /// Argument of pericenter, degrees
    #[serde(default)]
    pub argument_of_pericenter: Scalar,
    /// True anomaly at the initial time, degrees
    #[serde(default)]
    pub true_anomaly: Scalar,
}

impl OrbitElements {
    /// Circular orbit of the given radius in the reference plane
    pub fn circular(radius: Scalar) -> Self {
        Self {
            size: OrbitSize::SemiMajorAxis(radius),
            eccentricity: 0.0,
            inclination: 0.0,
            ascending_node: 0.0,
            argument_of_pericenter: 0.0,
            true_anomaly: 0.0,
        }
    }

    pub fn is_elliptical(&self) -> bool {
        self.eccentricity < 1.0
    }

    /// Same elements with every length multiplied by `factor`
    pub fn scaled(&self, factor: Scalar) -> Self {
        let size = match self.size {
            OrbitSize::SemiMajorAxis(a) => OrbitSize::SemiMajorAxis(a * factor),
            OrbitSize::Pericenter(p) => OrbitSize::Pericenter(p * factor),
        };
        Self { size, ..*self }
    }

    pub fn pericenter(&self) -> Scalar {
        match self.size {
            OrbitSize::SemiMajorAxis(a) => a * (1.0 - self.eccentricity),
            OrbitSize::Pericenter(p) => p,
        }
    }

    /// Semi-major axis of an ellipse; `None` for open orbits
    pub fn semi_major_axis(&self) -> Option<Scalar> {
        if !self.is_elliptical() {
            return None;
        }
        Some(match self.size {
            OrbitSize::SemiMajorAxis(a) => a,
            OrbitSize::Pericenter(p) => p / (1.0 - self.eccentricity),
        })
    }

    /// Semi-latus rectum
    pub fn semi_latus_rectum(&self) -> Scalar {
        self.pericenter() * (1.0 + self.eccentricity)
    }

    /// Rotation from the orbital plane (pericenter along +x) to the reference
    /// frame: Rz(Ω) · Rx(i) · Rz(ω).
    pub fn orientation(&self) -> Rotation {
        Rotation::from_rotation_z(self.ascending_node.to_radians())
            * Rotation::from_rotation_x(self.inclination.to_radians())
            * Rotation::from_rotation_z(self.argument_of_pericenter.to_radians())
    }

    fn validate(&self) -> Result<()> {
        let e = self.eccentricity;
        if !(e >= 0.0 && e.is_finite()) {
            return Err(EngineError::InvalidOrbit(format!("eccentricity {e} must be non-negative")));
        }
        match self.size {
            OrbitSize::SemiMajorAxis(_) if e >= 1.0 => Err(EngineError::InvalidOrbit(format!(
                "eccentricity {e} needs a pericenter distance, not a semi-major axis"
            ))),
            OrbitSize::SemiMajorAxis(size) | OrbitSize::Pericenter(size) if !(size > 0.0) => {
                Err(EngineError::InvalidOrbit(format!("orbit size {size} must be positive")))
            }
            _ => Ok(()),
        }
    }

    /// Position and velocity relative to a central body of mass `mu`.
    pub fn state_vectors(&self, mu: Scalar) -> Result<(Vector, Vector)> {
        self.validate()?;
        if !(mu > 0.0) {
            return Err(EngineError::InvalidOrbit(format!("central mass {mu} must be positive")));
        }

        let e = self.eccentricity;
        let f = self.true_anomaly.to_radians();
        let (sin_f, cos_f) = libm::sincos(f);
        let denom = 1.0 + e * cos_f;
        if denom <= 0.0 {
            return Err(EngineError::InvalidOrbit(format!(
                "true anomaly {} lies beyond the asymptote of an e = {e} orbit",
                self.true_anomaly
            )));
        }

        let l = self.semi_latus_rectum();
        let r = l / denom;
        let speed = libm::sqrt(mu / l);
        let rotation = self.orientation();

        let position = rotation * Vector::new(r * cos_f, r * sin_f, 0.0);
        let velocity = rotation * Vector::new(-speed * sin_f, speed * (e + cos_f), 0.0);
        Ok((position, velocity))
    }
}

/// Orbit derived from a relative state, the inverse of
/// [`OrbitElements::state_vectors`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OrbitData {
    pub eccentricity: Scalar,
    /// Positive for both ellipses and hyperbolas
    pub semi_major_axis: Scalar,
    pub perihelion: Scalar,
    /// Degrees
    pub inclination: Scalar,
    /// Degrees
    pub ascending_node: Scalar,
    /// Degrees
    pub argument_of_pericenter: Scalar,
    /// Degrees
    pub true_anomaly: Scalar,
    /// Zero for hyperbolas
    pub period: Scalar,
    /// Time to the next pericenter passage; zero for hyperbolas
    pub tau: Scalar,
    /// Initial distance from the focus
    pub r_initial: Scalar,
}

impl OrbitData {
    /// Elements of the orbit of a body at relative position `r` with relative
    /// velocity `v` around a central mass `mu`.
    pub fn from_state(r: Vector, v: Vector, mu: Scalar) -> Result<Self> {
        let r_len = r.length();
        if !(mu > 0.0) || r_len == 0.0 {
            return Err(EngineError::InvalidOrbit(
                "orbit needs a positive central mass and a non-zero separation".to_string(),
            ));
        }
        let h_vec = r.cross(v);
        let h = h_vec.length();
        if h == 0.0 {
            return Err(EngineError::InvalidOrbit("radial trajectory has no orbital plane".to_string()));
        }

        let v2 = v.length_squared();
        let elliptical = 2.0 / r_len > v2 / mu;

        let mut data = OrbitData {
            r_initial: r_len,
            ..Default::default()
        };

        let f = if elliptical {
            let a = 1.0 / (2.0 / r_len - v2 / mu);
            let q = h * h / (mu * a);
            // q creeps over 1 for circular input
            let e = if q > 1.0 { 0.0 } else { libm::sqrt(1.0 - q) };
            data.semi_major_axis = a;
            data.eccentricity = e;
            data.perihelion = a * (1.0 - e);

            if e > CIRCULAR_ECCENTRICITY {
                let cos_phi = (a - r_len) / (a * e);
                let sin_phi = r.dot(v) / (e * libm::sqrt(mu * a));
                let cos_f = (cos_phi - e) / (1.0 - e * cos_phi);
                let sin_f = sin_phi * libm::sqrt(1.0 - e * e) / (1.0 - e * cos_phi);
                angle_from_sin_cos(sin_f, cos_f)
            } else {
                0.0
            }
        } else {
            let a = 1.0 / (v2 / mu - 2.0 / r_len);
            let e = libm::sqrt(h * h / (mu * a) + 1.0);
            data.semi_major_axis = a;
            data.eccentricity = e;
            data.perihelion = a * (e - 1.0);

            let mut r_dot = libm::sqrt((v2 - h * h / (r_len * r_len)).max(0.0));
            if r.dot(v) < 0.0 {
                r_dot = -r_dot;
            }
            let cos_f = (a * (e * e - 1.0) / r_len - 1.0) / e;
            let sin_f = r_dot * a * (e * e - 1.0) / (h * e);
            angle_from_sin_cos(sin_f, cos_f)
        };

        let inclination = libm::acos((h_vec.z / h).clamp(-1.0, 1.0));
        let sin_i = libm::sin(inclination);

        let (node, argument) = if sin_i.abs() > EQUATORIAL_SIN {
            let sin_node = h_vec.x / (h * sin_i);
            let cos_node = -h_vec.y / (h * sin_i);
            let sin_of = r.z / (r_len * sin_i);
            let cos_of = (r.x * cos_node + r.y * sin_node) / r_len;
            (angle_from_sin_cos(sin_node, cos_node), angle_from_sin_cos(sin_of, cos_of) - f)
        } else if h_vec.z > 0.0 {
            // prograde equatorial: the node is undefined, fold it into ω
            let theta = angle_from_sin_cos(r.y / r_len, r.x / r_len);
            (0.0, theta - f)
        } else {
            // retrograde equatorial: Rx(180°) flips y, fold ω into the node
            let theta = angle_from_sin_cos(-r.y / r_len, r.x / r_len);
            (f - theta, 0.0)
        };

        data.inclination = inclination.to_degrees();
        data.ascending_node = node.rem_euclid(TAU).to_degrees();
        data.argument_of_pericenter = argument.rem_euclid(TAU).to_degrees();
        data.true_anomaly = f.to_degrees();

        if elliptical {
            let a = data.semi_major_axis;
            let e = data.eccentricity;
            let mean_motion_inv = libm::sqrt(a * a * a / mu);
            data.period = TAU * mean_motion_inv;
            if e > 0.0 {
                let ecc_anomaly = libm::acos(((1.0 - r_len / a) / e).clamp(-1.0, 1.0));
                let mut tau = (ecc_anomaly - e * libm::sin(ecc_anomaly)) * mean_motion_inv;
                // moving away from pericenter: the next passage is a period on
                if r.dot(v) > 0.0 {
                    tau = data.period - tau;
                }
                data.tau = finite_or_zero(tau);
            }
        }

        Ok(data)
    }

    pub fn is_elliptical(&self) -> bool {
        self.eccentricity < 1.0
    }

    /// Elements that reproduce this orbit
    pub fn elements(&self) -> OrbitElements {
        OrbitElements {
            size: if self.is_elliptical() {
                OrbitSize::SemiMajorAxis(self.semi_major_axis)
            } else {
                OrbitSize::Pericenter(self.perihelion)
            },
            eccentricity: self.eccentricity,
            inclination: self.inclination,
            ascending_node: self.ascending_node,
            argument_of_pericenter: self.argument_of_pericenter,
            true_anomaly: self.true_anomaly,
        }
    }
}

/// Solves Kepler's equation `M = E - e sin E` for the eccentric anomaly by
/// Newton iteration. Returns the best estimate and whether it converged.
pub fn solve_kepler(mean_anomaly: Scalar, e: Scalar) -> (Scalar, bool) {
    let mut u = if e > 0.8 { PI } else { mean_anomaly };
    for _ in 0..KEPLER_ITERATIONS {
        let (sin_u, cos_u) = libm::sincos(u);
        let next = u + (mean_anomaly - (u - e * sin_u)) / (1.0 - e * cos_u);
        if (next - u).abs() < KEPLER_TOLERANCE {
            return (next, true);
        }
        u = next;
    }
    (u, false)
}

/// True anomaly (radians, `[0, 2π)`) for a mean anomaly on an ellipse.
pub fn mean_to_true_anomaly(mean_anomaly: Scalar, e: Scalar) -> Scalar {
    let mean = mean_anomaly.rem_euclid(TAU);
    let (u, converged) = solve_kepler(mean, e);
    if !converged {
        warn!("Kepler's equation did not converge for M = {}, e = {}", mean, e);
    }
    let (sin_u, cos_u) = libm::sincos(u);
    let denom = 1.0 - e * cos_u;
    let cos_f = (cos_u - e) / denom;
    let sin_f = libm::sqrt(1.0 - e * e) * sin_u / denom;
    angle_from_sin_cos(sin_f, cos_f)
}

/// Mean anomaly (radians, `[0, 2π)`) for a true anomaly on an ellipse.
pub fn true_to_mean_anomaly(true_anomaly: Scalar, e: Scalar) -> Scalar {
    let ecc_anomaly = 2.0 * libm::atan(libm::sqrt((1.0 - e) / (1.0 + e)) * libm::tan(true_anomaly / 2.0));
    (ecc_anomaly - e * libm::sin(ecc_anomaly)).rem_euclid(TAU)
}

/// Distance from the secondary inside which its gravity dominates the primary's.
pub fn hill_radius(primary_mass: Scalar, secondary_mass: Scalar, distance: Scalar) -> Scalar {
    let denom = 3.0 * (primary_mass + secondary_mass);
    if denom.abs() < 1e-6 {
        return 0.0;
    }
    libm::cbrt(secondary_mass / denom) * distance
}
