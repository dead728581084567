//! Regularized three-body integrator
//!
//! Uses the Aarseth-Zare (AZT) scheme: the two pairs involving a reference body
//! are KS-regularized and integrated in fictitious time with Bulirsch-Stoer
//! extrapolation. Whenever the non-regularized pair becomes the dominant
//! interaction the reference body is swapped, so arbitrarily close encounters
//! are integrated without softening.
//!
//! The integrator owns its bodies' state between calls. The registry's
//! positions are only read in [`pre_evolve`](NBodyIntegrator::pre_evolve) and
//! written back after each evolve.

mod extrapolation;
mod regularized;

use super::{BodyInit, NBodyIntegrator};
use crate::error::{EngineError, Result};
use crate::physics::body::{BodyFlags, BodyView};
use crate::physics::math::{Scalar, Vector, finite_vector};
use bevy::log::{debug, error, trace, warn};
use extrapolation::{Extrapolator, STATE_LEN, StepOutcome};
use regularized::Regularized;

/// Relative accuracy requested from the extrapolator
pub const AZT_TOLERANCE: Scalar = 1e-12;

/// The scheme is defined for exactly three bodies.
pub const AZT_BODY_LIMIT: usize = 3;

const STEP_SHRINK: Scalar = 0.05;
const SWITCH_BIAS: Scalar = 1.00001;

/// Encounter statistics accumulated since the last `pre_evolve`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncounterStats {
    /// Smallest regularized separation seen
    pub min_separation: Scalar,
    /// Smallest separation per pair of bodies, by registry slot
    pub pair_min: [[Scalar; 3]; 3],
    /// Number of reference-body swaps
    pub switches: u32,
    /// Semi-major axis of the closest pair at the end of the last evolve
    pub binary_semi_major_axis: Scalar,
}

impl Default for EncounterStats {
    fn default() -> Self {
        Self {
            min_separation: Scalar::INFINITY,
            pair_min: [[100.0; 3]; 3],
            switches: 0,
            binary_semi_major_axis: 0.0,
        }
    }
}

#[derive(Debug, Default)]
pub struct AztTriple {
    state: Regularized,
    /// Registry slot of the body held in each internal position
    slot_of: [usize; 3],
    count: usize,
    extrapolator: Extrapolator,
    y: [Scalar; STATE_LEN],
    tau: Scalar,
    dtau: Scalar,
    time: Scalar,
    cm_position: Vector,
    cm_velocity: Vector,
    /// Set once the state has been shifted to the centre-of-mass frame
    adjusted: bool,
    ready: bool,
    /// Why integration stopped after a failed step
    halt: Option<String>,
    initial_energy: Scalar,
    stats: EncounterStats,
}

impl AztTriple {
    pub fn new() -> Self {
        Self {
            slot_of: [0, 1, 2],
            ..Default::default()
        }
    }

    pub fn body_count(&self) -> usize {
        self.count
    }

    pub fn stats(&self) -> EncounterStats {
        self.stats
    }

    /// Physical time integrated since the last `pre_evolve`
    pub fn elapsed(&self) -> Scalar {
        self.time
    }

    /// Stops integration until the next `pre_evolve`.
    fn halt_with(&mut self, reason: String) {
        error!("AZT integration halted: {reason}");
        self.ready = false;
        self.halt = Some(reason);
    }

    fn internal_index(&self, slot: usize) -> Option<usize> {
        self.slot_of.iter().position(|&s| s == slot)
    }

    /// Puts the bodies back in registry order with lab-frame velocities.
    fn restore_registry_order(&mut self, positions: &[Vector], masses: &[Scalar]) {
        let mut x = [Vector::ZERO; 3];
        let mut xdot = [Vector::ZERO; 3];
        for internal in 0..3 {
            let slot = self.slot_of[internal];
            let offset = if self.adjusted { self.cm_velocity } else { Vector::ZERO };
            xdot[slot] = self.state.xdot[internal] + offset;
        }
        for slot in 0..3 {
            x[slot] = positions[slot];
            self.state.m[slot] = masses[slot];
        }
        self.state.x = x;
        self.state.xdot = xdot;
        self.slot_of = [0, 1, 2];
        self.adjusted = false;
    }

    fn adjust_to_centre_of_mass(&mut self) {
        let total = self.state.total_mass();
        let mut position = Vector::ZERO;
        let mut velocity = Vector::ZERO;
        for i in 0..3 {
            position += self.state.x[i] * self.state.m[i];
            velocity += self.state.xdot[i] * self.state.m[i];
        }
        self.cm_position = position / total;
        self.cm_velocity = velocity / total;
        for i in 0..3 {
            self.state.x[i] -= self.cm_position;
            self.state.xdot[i] -= self.cm_velocity;
        }
        self.adjusted = true;
    }

    fn load_state_vector(&mut self) {
        self.y[0..8].copy_from_slice(&self.state.q);
        self.y[8..16].copy_from_slice(&self.state.p);
    }

    fn unload_state_vector(&mut self) {
        self.state.q.copy_from_slice(&self.y[0..8]);
        self.state.p.copy_from_slice(&self.y[8..16]);
        self.time = self.y[16];
        self.state.update_separations();
    }

    fn write_positions(&self, positions: &mut [Vector]) {
        let drift = self.cm_position + self.cm_velocity * self.time;
        for internal in 0..3 {
            positions[self.slot_of[internal]] = finite_vector(self.state.x[internal] + drift);
        }
    }

    fn record_separations(&mut self) {
        let Regularized { r, r1, r2, .. } = self.state;
        self.stats.min_separation = self.stats.min_separation.min(r1.min(r2));

        // internal pairs (0,1), (0,2), (1,2) have separations r, r1, r2
        for (a, b, distance) in [(0, 1, r), (0, 2, r1), (1, 2, r2)] {
            let (i, j) = (self.slot_of[a], self.slot_of[b]);
            let entry = &mut self.stats.pair_min[i.min(j)][i.max(j)];
            *entry = entry.min(distance);
        }
    }

    /// Makes the closer of bodies 0 and 1 the new reference when their mutual
    /// attraction dominates both regularized pairs.
    fn switch_reference_if_needed(&mut self) -> Result<()> {
        let [m1, m2, m3] = self.state.m;
        let Regularized { r, r1, r2, .. } = self.state;
        let f12 = (m1 + m2) / (r * r);
        let f13 = (m1 + m3) / (r1 * r1);
        let f23 = (m2 + m3) / (r2 * r2);
        if f12 < f13.max(f23) {
            return Ok(());
        }

        let closer = if r2 < SWITCH_BIAS * r1 { 1 } else { 0 };
        self.state.to_physical();
        self.state.swap_with_reference(closer);
        self.slot_of.swap(closer, 2);
        self.state.regularize()?;
        self.load_state_vector();
        self.stats.switches += 1;
        trace!(
            "AZT reference switched to slot {} at t = {:.6}",
            self.slot_of[2], self.time
        );
        Ok(())
    }

    fn record_binary(&mut self) {
        let Regularized { r1, r2, .. } = self.state;
        let (near, rb) = if r2 < r1 { (1, r2) } else { (0, r1) };
        let escaper = 1 - near;
        let x = &self.state.x;
        let xdot = &self.state.xdot;

        let vrel2 = (xdot[2] - xdot[near]).length_squared();
        let mb = self.state.m[2] + self.state.m[near];
        self.stats.binary_semi_major_axis = 1.0 / (2.0 / rb - vrel2 / mb);

        let binary_cm = (x[2] * self.state.m[2] + x[near] * self.state.m[near]) / mb;
        let escape_distance = x[escaper].distance(binary_cm);
        let escape_speed = xdot[escaper].length();
        debug!(
            "AZT binary slots ({}, {}) a = {:.6}, third body at {:.6} moving {:.6}",
            self.slot_of[2], self.slot_of[near], self.stats.binary_semi_major_axis, escape_distance,
            escape_speed
        );
    }
}

impl NBodyIntegrator for AztTriple {
    fn name(&self) -> &'static str {
        "azt"
    }

    fn setup(&mut self, capacity: usize, _dt: Scalar) -> Result<()> {
        if capacity > AZT_BODY_LIMIT {
            return Err(EngineError::BodyLimit {
                integrator: self.name(),
                limit: AZT_BODY_LIMIT,
            });
        }
        *self = Self::new();
        Ok(())
    }

    fn add_body(&mut self, index: usize, body: &BodyInit) -> Result<()> {
        if self.count >= AZT_BODY_LIMIT || index != self.count {
            return Err(EngineError::BodyLimit {
                integrator: self.name(),
                limit: AZT_BODY_LIMIT,
            });
        }
        self.state.m[index] = body.mass;
        self.state.x[index] = finite_vector(body.position);
        self.state.xdot[index] = finite_vector(body.velocity);
        self.slot_of[index] = index;
        self.count += 1;
        Ok(())
    }

    fn remove_body_at(&mut self, _index: usize) -> Result<()> {
        Err(EngineError::Unsupported {
            integrator: self.name(),
            operation: "remove_body",
        })
    }

    fn grow(&mut self, _by: usize) -> Result<()> {
        error!("AZT integrator is limited to {} bodies and cannot grow", AZT_BODY_LIMIT);
        Err(EngineError::GrowthRefused { integrator: self.name() })
    }

    fn pre_evolve(&mut self, bodies: &mut BodyView<'_>) -> Result<()> {
        self.ready = false;
        self.halt = None;
        if self.count != AZT_BODY_LIMIT || bodies.len() != AZT_BODY_LIMIT {
            return Err(EngineError::Regularization(format!(
                "needs exactly {} bodies, found {}",
                AZT_BODY_LIMIT, self.count
            )));
        }
        if bodies.flags.iter().any(|flag| *flag != BodyFlags::NONE) {
            return Err(EngineError::Unsupported {
                integrator: self.name(),
                operation: "inactive or fixed-motion bodies",
            });
        }

        self.restore_registry_order(bodies.position, bodies.mass);
        self.adjust_to_centre_of_mass();
        self.initial_energy = 0.5 * self.state.two_energy();
        self.stats = EncounterStats::default();
        self.extrapolator = Extrapolator::default();
        self.time = 0.0;
        self.tau = 0.0;
        self.y = [0.0; STATE_LEN];

        self.state.regularize_with_energy()?;

        let total = self.state.total_mass();
        let Regularized { r1, r2, energy2, m, .. } = self.state;
        let crossing = total.powf(2.5) / energy2.abs().powf(1.5);
        let rmax = r1.max(r2);
        let mut tstar = rmax * libm::sqrt(rmax / total);
        let (near, rm) = if r2 < r1 { (1, r2) } else { (0, r1) };
        let pericentre = rm / libm::sqrt(2.0 * (m[near] + m[2]) / rm);
        tstar = tstar.min(pericentre);
        let tpr = r1 * r2 / libm::sqrt(r1 + r2);
        self.dtau = crossing.min(tstar) * AZT_TOLERANCE.powf(0.1) / tpr;

        self.load_state_vector();
        self.state.to_physical();
        self.write_positions(bodies.position);
        self.ready = true;

        debug!(
            "AZT pre-evolve: E = {:.9}, dtau = {:.3e}",
            self.initial_energy, self.dtau
        );
        Ok(())
    }

    fn evolve(&mut self, duration: Scalar, bodies: &mut BodyView<'_>) -> Scalar {
        if let Some(reason) = &self.halt {
            warn!("AZT is halted ({reason}); ignoring evolve of {duration:.6}");
            return 0.0;
        }
        if !self.ready {
            return duration;
        }

        let start = self.time;
        while self.time - start < duration {
            self.dtau *= STEP_SHRINK;
            let outcome = self.extrapolator.step(
                &mut self.state,
                AZT_TOLERANCE,
                &mut self.dtau,
                &mut self.tau,
                &mut self.y,
            );
            if outcome == StepOutcome::Collapsed {
                self.halt_with(format!("step size collapsed at t = {:.6}", self.time));
                break;
            }

            self.unload_state_vector();
            self.record_separations();
            if let Err(err) = self.switch_reference_if_needed() {
                self.halt_with(format!("reference switch failed: {err}"));
                break;
            }
        }

        self.state.to_physical();
        self.record_binary();
        self.write_positions(bodies.position);

        self.time - start
    }

    fn velocity(&self, index: usize) -> Result<Vector> {
        let internal = self
            .internal_index(index)
            .filter(|_| index < self.count)
            .ok_or(EngineError::Unsupported {
                integrator: "azt",
                operation: "velocity of an unknown slot",
            })?;
        let offset = if self.adjusted { self.cm_velocity } else { Vector::ZERO };
        Ok(self.state.xdot[internal] + offset)
    }

    fn set_velocity(&mut self, _index: usize, _velocity: Vector) -> Result<()> {
        Err(EngineError::Unsupported {
            integrator: self.name(),
            operation: "set_velocity",
        })
    }

    fn acceleration(&self, _index: usize) -> Vector {
        Vector::ZERO
    }

    /// Energy in the centre-of-mass frame
    fn energy(&self, _mass: &[Scalar], _position: &[Vector], _flags: &[BodyFlags]) -> Scalar {
        0.5 * self.state.two_energy()
    }

    fn initial_energy(&self) -> Scalar {
        self.initial_energy
    }

    fn halted(&self) -> Option<&str> {
        self.halt.as_deref()
    }

    fn body_limit(&self) -> Option<usize> {
        Some(AZT_BODY_LIMIT)
    }
}
