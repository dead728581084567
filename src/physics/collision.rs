//! Momentum exchange between two colliding bodies
//!
//! Detection is the caller's business; this module only decides what a
//! reported contact does to the two bodies' masses and velocities. The engine
//! applies the [`Resolution`] and deactivates the absorbed body.

use crate::physics::math::{Scalar, Vector};
use crate::physics::particles::ExplosionParams;
use serde::{Deserialize, Serialize};

/// Debris released by an explosive collision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ejecta {
    pub particles: usize,
    #[serde(flatten)]
    pub params: ExplosionParams,
}

impl Default for Ejecta {
    fn default() -> Self {
        Self {
            particles: 100,
            params: ExplosionParams::default(),
        }
    }
}

/// How a contact between two bodies is resolved.
///
/// The first body of a pair survives absorbing and explosive collisions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollisionPolicy {
    #[default]
    /// Perfectly inelastic: the survivor takes the combined mass and momentum.
    Absorb,
    /// Centre-of-mass velocities are reflected and scaled by `factor`.
    Bounce { factor: Scalar },
    /// Absorb, then release ejecta from the contact point.
    Explode {
        #[serde(default)]
        ejecta: Ejecta,
    },
    /// Bounce below a relative speed of `threshold` (user velocity units),
    /// explode above it.
    ExplodeOrBounce {
        threshold: Scalar,
        factor: Scalar,
        #[serde(default)]
        ejecta: Ejecta,
    },
}

impl CollisionPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            CollisionPolicy::Absorb => "absorb",
            CollisionPolicy::Bounce { .. } => "bounce",
            CollisionPolicy::Explode { .. } => "explode",
            CollisionPolicy::ExplodeOrBounce { .. } => "explode_or_bounce",
        }
    }
}

/// Internal masses and physics velocities of a colliding pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Impact {
    pub mass: [Scalar; 2],
    pub velocity: [Vector; 2],
}

/// Outcome to be applied by the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// Body 0 takes `mass` and `velocity`; body 1 is deactivated.
    Absorbed { mass: Scalar, velocity: Vector },
    /// As `Absorbed`, plus ejecta leave body 0.
    Exploded {
        mass: Scalar,
        velocity: Vector,
        ejecta: Ejecta,
    },
    /// Both bodies keep their mass and take the new velocities.
    Bounced { velocity: [Vector; 2] },
    Unchanged,
}

/// Resolves `impact` under `policy`. `velocity_scale` converts the
/// explode-or-bounce threshold into physics units.
pub fn resolve(policy: &CollisionPolicy, impact: &Impact, velocity_scale: Scalar) -> Resolution {
    let [m1, m2] = impact.mass;
    let [v1, v2] = impact.velocity;

    let bounce_factor = match *policy {
        CollisionPolicy::Bounce { factor } => Some(factor),
        CollisionPolicy::ExplodeOrBounce { threshold, factor, .. }
            if v2.distance(v1) < threshold * velocity_scale =>
        {
            Some(factor)
        }
        _ => None,
    };

    // A massless body has no momentum to exchange; only a bounce touches it.
    if m1 == 0.0 || m2 == 0.0 {
        return match bounce_factor {
            Some(_) => Resolution::Bounced {
                velocity: [
                    if m1 == 0.0 { -v1 } else { v1 },
                    if m2 == 0.0 { -v2 } else { v2 },
                ],
            },
            None => Resolution::Unchanged,
        };
    }

    let total = m1 + m2;
    let cm_velocity = (v1 * m1 + v2 * m2) / total;

    if let Some(factor) = bounce_factor {
        return Resolution::Bounced {
            velocity: [
                cm_velocity - (v1 - cm_velocity) * factor,
                cm_velocity - (v2 - cm_velocity) * factor,
            ],
        };
    }

    match *policy {
        CollisionPolicy::Explode { ejecta } | CollisionPolicy::ExplodeOrBounce { ejecta, .. } => {
            Resolution::Exploded {
                mass: total,
                velocity: cm_velocity,
                ejecta,
            }
        }
        _ => Resolution::Absorbed {
            mass: total,
            velocity: cm_velocity,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn head_on() -> Impact {
        Impact {
            mass: [3.0, 1.0],
            velocity: [Vector::new(1.0, 0.0, 0.0), Vector::new(-2.0, 1.0, 0.0)],
        }
    }

    #[test]
    fn test_absorb_conserves_momentum() {
        let impact = head_on();
        let before = impact.velocity[0] * 3.0 + impact.velocity[1] * 1.0;

        let Resolution::Absorbed { mass, velocity } = resolve(&CollisionPolicy::Absorb, &impact, 1.0) else {
            panic!("expected absorption");
        };
        assert_eq!(mass, 4.0);
        assert_relative_eq!((velocity * mass).x, before.x, epsilon = 1e-12);
        assert_relative_eq!((velocity * mass).y, before.y, epsilon = 1e-12);
    }

    #[test]
    fn test_elastic_bounce_conserves_energy() {
        let impact = head_on();
        let Resolution::Bounced { velocity } = resolve(&CollisionPolicy::Bounce { factor: 1.0 }, &impact, 1.0) else {
            panic!("expected bounce");
        };

        let kinetic = |v: [Vector; 2]| 0.5 * 3.0 * v[0].length_squared() + 0.5 * v[1].length_squared();
        assert_relative_eq!(kinetic(velocity), kinetic(impact.velocity), epsilon = 1e-12);

        let momentum = velocity[0] * 3.0 + velocity[1];
        let before = impact.velocity[0] * 3.0 + impact.velocity[1];
        assert!(momentum.distance(before) < 1e-12);
    }

    #[test]
    fn test_zero_restitution_sticks() {
        let impact = head_on();
        let Resolution::Bounced { velocity } = resolve(&CollisionPolicy::Bounce { factor: 0.0 }, &impact, 1.0) else {
            panic!("expected bounce");
        };
        assert!(velocity[0].distance(velocity[1]) < 1e-12);
    }

    #[test]
    fn test_massless_bounce_reflects_own_velocity() {
        let impact = Impact {
            mass: [5.0, 0.0],
            velocity: [Vector::X, Vector::new(0.0, 2.0, 0.0)],
        };
        assert_eq!(
            resolve(&CollisionPolicy::Bounce { factor: 1.0 }, &impact, 1.0),
            Resolution::Bounced {
                velocity: [Vector::X, Vector::new(0.0, -2.0, 0.0)]
            }
        );
        assert_eq!(resolve(&CollisionPolicy::Absorb, &impact, 1.0), Resolution::Unchanged);
    }

    #[test]
    fn test_explode_or_bounce_threshold() {
        let impact = head_on();
        let slow = CollisionPolicy::ExplodeOrBounce {
            threshold: 10.0,
            factor: 1.0,
            ejecta: Ejecta::default(),
        };
        assert!(matches!(resolve(&slow, &impact, 1.0), Resolution::Bounced { .. }));

        // relative speed is sqrt(10) ≈ 3.16; a velocity scale of 0.1 lowers the threshold to 1
        assert!(matches!(resolve(&slow, &impact, 0.1), Resolution::Exploded { mass, .. } if mass == 4.0));
    }

    #[test]
    fn test_policy_config_format() {
        let policy: CollisionPolicy = toml::from_str("kind = \"bounce\"\nfactor = 0.5").unwrap();
        assert_eq!(policy, CollisionPolicy::Bounce { factor: 0.5 });
        assert_eq!(policy.name(), "bounce");
    }
}
