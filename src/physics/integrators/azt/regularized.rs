//! Kustaanheimo-Stiefel regularized three-body state
//!
//! Bodies 0 and 1 are each expressed relative to the reference body 2 through a
//! four-dimensional KS vector `Q` with `|Q|² = r`. The equations of motion in
//! the fictitious time τ (dt/dτ = r₁·r₂) are free of the 1/r singularities of
//! both regularized pairs; only the separation between bodies 0 and 1 stays
//! singular, which is why the reference body is swapped whenever that pair
//! becomes dominant.
//!
//! Layout of the state vector used by the extrapolator:
//!
//! ```text
//! y[0..8]   Q for pair (0,2) followed by Q for pair (1,2)
//! y[8..16]  conjugate momenta P
//! y[16]     physical time
//! ```

use super::extrapolation::{Derivatives, STATE_LEN};
use crate::error::{EngineError, Result};
use crate::physics::math::{Scalar, Vector};

#[derive(Debug, Clone, Default)]
pub(super) struct Regularized {
    pub m: [Scalar; 3],
    pub x: [Vector; 3],
    pub xdot: [Vector; 3],
    pub q: [Scalar; 8],
    pub p: [Scalar; 8],
    /// Twice the total energy in the centre-of-mass frame
    pub energy2: Scalar,
    /// Separation of bodies 0 and 1 (not regularized)
    pub r: Scalar,
    /// Separation of bodies 0 and 2
    pub r1: Scalar,
    /// Separation of bodies 1 and 2
    pub r2: Scalar,
    c11: Scalar,
    c12: Scalar,
    c19: Scalar,
    c20: Scalar,
    c24: Scalar,
    c25: Scalar,
}

impl Regularized {
    pub fn total_mass(&self) -> Scalar {
        self.m.iter().sum()
    }

    /// Σ m v² + 2·Σ(−mᵢmⱼ/rᵢⱼ), i.e. twice the physical energy
    pub fn two_energy(&self) -> Scalar {
        let mut kinetic = 0.0;
        let mut potential = 0.0;
        for i in 0..3 {
            kinetic += self.m[i] * self.xdot[i].length_squared();
            for j in (i + 1)..3 {
                potential -= self.m[i] * self.m[j] / self.x[i].distance(self.x[j]);
            }
        }
        kinetic + 2.0 * potential
    }

    /// Physical to KS variables, recomputing the conserved energy first.
    pub fn regularize_with_energy(&mut self) -> Result<()> {
        self.energy2 = self.two_energy();
        self.regularize()
    }

    /// Physical to KS variables, keeping the stored energy.
    pub fn regularize(&mut self) -> Result<()> {
        let [m1, m2, m3] = self.m;
        self.c11 = 0.25 / m1 + 0.25 / m3;
        self.c12 = 0.25 / m2 + 0.25 / m3;
        self.c19 = 2.0 * m2 * m3;
        self.c20 = 2.0 * m1 * m3;
        self.c24 = 0.25 / m3;
        self.c25 = 2.0 * m1 * m2;

        for pair in 0..2 {
            let relative = (self.x[pair] - self.x[2]).to_array();
            let momentum = (self.xdot[pair] * self.m[pair]).to_array();
            let k = 4 * pair;
            let rk = libm::sqrt(
                relative[0] * relative[0] + relative[1] * relative[1] + relative[2] * relative[2],
            );
            if rk == 0.0 {
                return Err(EngineError::Regularization(format!(
                    "body {pair} coincides with the reference body"
                )));
            }

            let q = &mut self.q;
            if relative[0] > 0.0 {
                q[k] = libm::sqrt(0.5 * (rk + relative[0]));
                q[k + 1] = 0.5 * relative[1] / q[k];
                q[k + 2] = 0.5 * relative[2] / q[k];
                q[k + 3] = 0.0;
            } else {
                q[k + 1] = libm::sqrt(0.5 * (rk - relative[0]));
                q[k] = 0.5 * relative[1] / q[k + 1];
                q[k + 3] = 0.5 * relative[2] / q[k + 1];
                q[k + 2] = 0.0;
            }

            let p = &mut self.p;
            p[k] = 2.0 * (q[k] * momentum[0] + q[k + 1] * momentum[1] + q[k + 2] * momentum[2]);
            p[k + 1] =
                2.0 * (-q[k + 1] * momentum[0] + q[k] * momentum[1] + q[k + 3] * momentum[2]);
            p[k + 2] =
                2.0 * (-q[k + 2] * momentum[0] - q[k + 3] * momentum[1] + q[k] * momentum[2]);
            p[k + 3] =
                2.0 * (q[k + 3] * momentum[0] - q[k + 2] * momentum[1] + q[k + 1] * momentum[2]);
        }

        self.r1 = ks_norm2(&self.q[0..4]);
        self.r2 = ks_norm2(&self.q[4..8]);
        self.r = pair_separation(&self.q);
        Ok(())
    }

    /// KS to physical variables in the centre-of-mass frame.
    pub fn to_physical(&mut self) {
        let mut relative = [[0.0; 3]; 2];
        let mut momentum = [[0.0; 3]; 2];

        for pair in 0..2 {
            let k = 4 * pair;
            let q = &self.q[k..k + 4];
            let p = &self.p[k..k + 4];
            relative[pair] = [
                q[0] * q[0] - q[1] * q[1] - q[2] * q[2] + q[3] * q[3],
                2.0 * (q[0] * q[1] - q[2] * q[3]),
                2.0 * (q[0] * q[2] + q[1] * q[3]),
            ];
            let scale = 0.5 / ks_norm2(q);
            momentum[pair] = [
                scale * (q[0] * p[0] - q[1] * p[1] - q[2] * p[2] + q[3] * p[3]),
                scale * (q[1] * p[0] + q[0] * p[1] - q[3] * p[2] - q[2] * p[3]),
                scale * (q[2] * p[0] + q[3] * p[1] + q[0] * p[2] + q[1] * p[3]),
            ];
        }

        let [m1, m2, m3] = self.m;
        let total = m1 + m2 + m3;
        let q1 = Vector::from_array(relative[0]);
        let q2 = Vector::from_array(relative[1]);
        let p1 = Vector::from_array(momentum[0]);
        let p2 = Vector::from_array(momentum[1]);

        let reference = -(q1 * m1 + q2 * m2) / total;
        self.x = [q1 + reference, q2 + reference, reference];
        self.xdot = [p1 / m1, p2 / m2, -(p1 + p2) / m3];
    }

    /// Swaps physical body `slot` with the reference body 2.
    pub fn swap_with_reference(&mut self, slot: usize) {
        self.x.swap(slot, 2);
        self.xdot.swap(slot, 2);
        self.m.swap(slot, 2);
    }

    /// Refreshes `r1`, `r2` and `r` from the current KS coordinates.
    pub fn update_separations(&mut self) {
        self.r1 = ks_norm2(&self.q[0..4]);
        self.r2 = ks_norm2(&self.q[4..8]);
        self.r = pair_separation(&self.q);
    }
}

fn ks_norm2(q: &[Scalar]) -> Scalar {
    q.iter().map(|c| c * c).sum()
}

/// Distance between bodies 0 and 1 computed directly from the KS vectors.
fn pair_separation(q: &[Scalar; 8]) -> Scalar {
    let [c21, c22, c23] = pair_components(q);
    libm::sqrt(c21 * c21 + c22 * c22 + c23 * c23)
}

fn pair_components(q: &[Scalar; 8]) -> [Scalar; 3] {
    let [q1, q2, q3, q4, q5, q6, q7, q8] = *q;
    let c21 = q1 * q1 - q2 * q2 - q3 * q3 + q4 * q4 - q5 * q5 + q6 * q6 + q7 * q7 - q8 * q8;
    let c22 = 2.0 * (q1 * q2 - q3 * q4 - q5 * q6 + q7 * q8);
    let c23 = 2.0 * (q1 * q3 + q2 * q4 - q5 * q7 - q6 * q8);
    [c21, c22, c23]
}

impl Derivatives for Regularized {
    fn derivatives(&mut self, y: &[Scalar; STATE_LEN], yp: &mut [Scalar; STATE_LEN]) {
        let mut q = [0.0; 8];
        let mut p = [0.0; 8];
        q.copy_from_slice(&y[0..8]);
        p.copy_from_slice(&y[8..16]);

        let [q1, q2, q3, q4, q5, q6, q7, q8] = q;
        let [p1, p2, p3, p4, p5, p6, p7, p8] = p;

        let r1 = q1 * q1 + q2 * q2 + q3 * q3 + q4 * q4;
        let r2 = q5 * q5 + q6 * q6 + q7 * q7 + q8 * q8;
        self.r1 = r1;
        self.r2 = r2;

        let c3 = q1 * p1 - q2 * p2 - q3 * p3 + q4 * p4;
        let c4 = q5 * p5 - q6 * p6 - q7 * p7 + q8 * p8;
        let c5 = q2 * p1 + q1 * p2 - q4 * p3 - q3 * p4;
        let c6 = q6 * p5 + q5 * p6 - q8 * p7 - q7 * p8;
        let c7 = q3 * p1 + q4 * p2 + q1 * p3 + q2 * p4;
        let c8 = q7 * p5 + q8 * p6 + q5 * p7 + q6 * p8;
        let c9 = p1 * p1 + p2 * p2 + p3 * p3 + p4 * p4;
        let c10 = p5 * p5 + p6 * p6 + p7 * p7 + p8 * p8;
        let c13 = self.c11 * r2;
        let c14 = self.c12 * r1;
        let c15 = self.c12 * c10;
        let c16 = self.c11 * c9;
        let c17 = r2 * self.energy2;
        let c18 = r1 * self.energy2;

        let [c21, c22, c23] = pair_components(&q);
        let rr = c21 * c21 + c22 * c22 + c23 * c23;
        self.r = libm::sqrt(rr);
        let a = self.c25 / self.r;
        let tpr = r1 * r2;
        let b = a * tpr / rr;

        let s2 = [
            q1 * c4 + q2 * c6 + q3 * c8,
            -q2 * c4 + q1 * c6 + q4 * c8,
            -q3 * c4 - q4 * c6 + q1 * c8,
            q4 * c4 - q3 * c6 + q2 * c8,
            q5 * c3 + q6 * c5 + q7 * c7,
            -q6 * c3 + q5 * c5 + q8 * c7,
            -q7 * c3 - q8 * c5 + q5 * c7,
            q8 * c3 - q7 * c5 + q6 * c7,
        ];
        let s5 = [
            p1 * c4 + p2 * c6 + p3 * c8,
            -p2 * c4 + p1 * c6 + p4 * c8,
            -p3 * c4 - p4 * c6 + p1 * c8,
            p4 * c4 - p3 * c6 + p2 * c8,
            p5 * c3 + p6 * c5 + p7 * c7,
            -p6 * c3 + p5 * c5 + p8 * c7,
            -p7 * c3 - p8 * c5 + p5 * c7,
            p8 * c3 - p7 * c5 + p6 * c7,
        ];
        let s8 = [
            q1 * c21 + q2 * c22 + q3 * c23,
            -q2 * c21 + q1 * c22 + q4 * c23,
            -q3 * c21 - q4 * c22 + q1 * c23,
            q4 * c21 - q3 * c22 + q2 * c23,
            -q5 * c21 - q6 * c22 - q7 * c23,
            q6 * c21 - q5 * c22 - q8 * c23,
            q7 * c21 + q8 * c22 - q5 * c23,
            -q8 * c21 + q7 * c22 - q6 * c23,
        ];

        let c1 = c17 - c15 + self.c19 + a * r2;
        let c2 = c18 - c16 + self.c20 + a * r1;

        for i in 0..4 {
            let k = i + 4;
            yp[i] = c13 * p[i] + self.c24 * s2[i];
            yp[k] = c14 * p[k] + self.c24 * s2[k];
            yp[i + 8] = c1 * q[i] - self.c24 * s5[i] - b * s8[i];
            yp[k + 8] = c2 * q[k] - self.c24 * s5[k] - b * s8[k];
        }
        yp[16] = tpr;
    }

    fn time_factor(&self, y: &[Scalar; STATE_LEN]) -> Scalar {
        let r1 = ks_norm2(&y[0..4]);
        let r2 = ks_norm2(&y[4..8]);
        self.m[2] * (self.m[0] * r2 + self.m[1] * r1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Regularized {
        Regularized {
            m: [1.0, 2.0, 3.0],
            x: [
                Vector::new(1.0, 0.5, -0.25),
                Vector::new(-2.0, 1.0, 0.75),
                Vector::new(0.1, -0.6, 0.2),
            ],
            xdot: [
                Vector::new(0.1, 0.2, 0.3),
                Vector::new(-0.3, 0.1, 0.0),
                Vector::new(0.05, -0.15, -0.1),
            ],
            ..Default::default()
        }
    }

    fn to_centre_of_mass(state: &mut Regularized) {
        let total = state.total_mass();
        let cm = (state.x[0] * state.m[0] + state.x[1] * state.m[1] + state.x[2] * state.m[2]) / total;
        let vcm = (state.xdot[0] * state.m[0] + state.xdot[1] * state.m[1] + state.xdot[2] * state.m[2])
            / total;
        for i in 0..3 {
            state.x[i] -= cm;
            state.xdot[i] -= vcm;
        }
    }

    #[test]
    fn test_ks_round_trip_restores_physical_state() {
        let mut state = sample();
        to_centre_of_mass(&mut state);
        let (x, xdot) = (state.x, state.xdot);

        state.regularize_with_energy().unwrap();
        state.to_physical();

        for i in 0..3 {
            assert!(state.x[i].distance(x[i]) < 1e-12, "position {i}");
            assert!(state.xdot[i].distance(xdot[i]) < 1e-12, "velocity {i}");
        }
    }

    #[test]
    fn test_ks_norm_equals_separation() {
        let mut state = sample();
        to_centre_of_mass(&mut state);
        state.regularize().unwrap();

        assert!((state.r1 - state.x[0].distance(state.x[2])).abs() < 1e-12);
        assert!((state.r2 - state.x[1].distance(state.x[2])).abs() < 1e-12);
        assert!((state.r - state.x[0].distance(state.x[1])).abs() < 1e-12);
    }

    #[test]
    fn test_time_derivative_is_product_of_separations() {
        let mut state = sample();
        to_centre_of_mass(&mut state);
        state.regularize_with_energy().unwrap();

        let mut y = [0.0; STATE_LEN];
        y[0..8].copy_from_slice(&state.q);
        y[8..16].copy_from_slice(&state.p);
        let mut yp = [0.0; STATE_LEN];
        state.derivatives(&y, &mut yp);

        assert!((yp[16] - state.r1 * state.r2).abs() < 1e-12);
    }

    #[test]
    fn test_coincident_bodies_are_rejected() {
        let mut state = sample();
        state.x[0] = state.x[2];
        assert!(matches!(state.regularize(), Err(EngineError::Regularization(_))));
    }
}
