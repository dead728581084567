//! Bodies on rails
//!
//! A fixed-motion body is positioned by a closed-form rule each tick instead of
//! by the integrator. It still sources gravity for everything else.

use crate::physics::body::BodyId;
use crate::physics::math::{Rotation, Scalar, Vector};
use crate::physics::orbit::{OrbitElements, OrbitSize, solve_kepler, true_to_mean_anomaly};
use crate::physics::units::ScaleState;
use bevy::log::{error, warn};
use std::f64::consts::TAU;

/// Highest eccentricity a Kepler body will follow
pub const MAX_KEPLER_ECCENTRICITY: Scalar = 0.99;

/// Closed-form motion supplied when a body is registered.
pub trait FixedMotion: Send + Sync {
    /// Recomputes internal constants for the current scale and the internal
    /// mass of the centre body (zero without one).
    fn pre_evolve(&mut self, scale: &ScaleState, center_mass: Scalar);

    /// Physics-space position at `physics_time`. `origin` is the centre body's
    /// current physics position.
    fn evolve(&mut self, physics_time: Scalar, origin: Vector) -> Vector;

    /// Velocity relative to the centre body at `physics_time`
    fn velocity(&self, _physics_time: Scalar) -> Vector {
        Vector::ZERO
    }

    /// Body the motion is relative to
    fn center(&self) -> Option<BodyId> {
        None
    }
}

/// Holds a body at a constant offset from its centre (or the origin).
#[derive(Debug, Clone, Copy)]
pub struct Stationary {
    offset: Vector,
    center: Option<BodyId>,
}

impl Stationary {
    pub fn new(offset: Vector, center: Option<BodyId>) -> Self {
        Self { offset, center }
    }
}

impl FixedMotion for Stationary {
    fn pre_evolve(&mut self, _scale: &ScaleState, _center_mass: Scalar) {}

    fn evolve(&mut self, _physics_time: Scalar, origin: Vector) -> Vector {
        origin + self.offset
    }

    fn center(&self) -> Option<BodyId> {
        self.center
    }
}

/// Elliptical orbit around a centre body, advanced with Kepler's equation.
///
/// Element lengths are in user units and are rescaled on every
/// [`pre_evolve`](FixedMotion::pre_evolve).
#[derive(Debug, Clone)]
pub struct KeplerOrbit {
    elements: OrbitElements,
    center: BodyId,
    eccentricity: Scalar,
    semi_major_axis: Scalar,
    orientation: Rotation,
    period: Scalar,
    speed_factor: Scalar,
    mean_anomaly_phase: Scalar,
}

impl KeplerOrbit {
    pub fn new(elements: OrbitElements, center: BodyId) -> Self {
        let mut eccentricity = elements.eccentricity;
        if eccentricity >= 1.0 {
            warn!(
                "Kepler orbit eccentricity {} clamped to {}",
                eccentricity, MAX_KEPLER_ECCENTRICITY
            );
            eccentricity = MAX_KEPLER_ECCENTRICITY;
        }
        Self {
            elements,
            center,
            eccentricity,
            semi_major_axis: 0.0,
            orientation: elements.orientation(),
            period: 0.0,
            speed_factor: 0.0,
            mean_anomaly_phase: 0.0,
        }
    }

    pub fn elements(&self) -> &OrbitElements {
        &self.elements
    }

    /// Physics-time period; zero before the first `pre_evolve`
    pub fn period(&self) -> Scalar {
        self.period
    }

    fn true_anomaly_at(&self, physics_time: Scalar) -> Scalar {
        if self.period == 0.0 {
            return self.elements.true_anomaly.to_radians();
        }
        let mean = TAU * physics_time / self.period + self.mean_anomaly_phase;
        let (u, converged) = solve_kepler(mean.rem_euclid(TAU), self.eccentricity);
        if !converged {
            error!("Kepler orbit failed to converge at t = {}", physics_time);
        }
        let e = self.eccentricity;
        let (sin_u, cos_u) = libm::sincos(u);
        let denom = 1.0 - e * cos_u;
        libm::atan2(libm::sqrt(1.0 - e * e) * sin_u / denom, (cos_u - e) / denom)
    }
}

impl FixedMotion for KeplerOrbit {
    fn pre_evolve(&mut self, scale: &ScaleState, center_mass: Scalar) {
        let to_physics = scale.length_scale() / scale.physics_to_world();
        let e = self.eccentricity;
        self.semi_major_axis = match self.elements.size {
            OrbitSize::SemiMajorAxis(a) => a * to_physics,
            OrbitSize::Pericenter(p) => p * to_physics / (1.0 - e),
        };
        self.orientation = self.elements.orientation();

        let a = self.semi_major_axis;
        if center_mass > 0.0 {
            self.period = TAU * libm::sqrt(a * a * a / center_mass);
            self.speed_factor = libm::sqrt(center_mass / (a * (1.0 - e * e)));
        } else {
            warn!("Kepler orbit around a massless centre will not move");
            self.period = 0.0;
            self.speed_factor = 0.0;
        }
        self.mean_anomaly_phase = true_to_mean_anomaly(self.elements.true_anomaly.to_radians(), e);
    }

    fn evolve(&mut self, physics_time: Scalar, origin: Vector) -> Vector {
        let e = self.eccentricity;
        let f = self.true_anomaly_at(physics_time);
        let r = self.semi_major_axis * (1.0 - e * e) / (1.0 + e * libm::cos(f));
        origin + self.orientation * Vector::new(r * libm::cos(f), r * libm::sin(f), 0.0)
    }

    fn velocity(&self, physics_time: Scalar) -> Vector {
        let f = self.true_anomaly_at(physics_time);
        let (sin_f, cos_f) = libm::sincos(f);
        self.orientation * Vector::new(-self.speed_factor * sin_f, self.speed_factor * (self.eccentricity + cos_f), 0.0)
    }

    fn center(&self) -> Option<BodyId> {
        Some(self.center)
    }
}
