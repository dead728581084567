//! Engine coordinator
//!
//! The [`Engine`] owns the massive-body registry, the active integrator, the
//! massless fast path and every particle swarm. Bodies are addressed by
//! [`BodyId`]; the engine keeps the id → slot map current across removals and
//! forwards every registry change to the integrator so both stay in lockstep.
//!
//! Each of the three evolvers (massive, massless, particles) keeps its own
//! clock. On every [`Engine::step`] each one is asked for the physical time it
//! is behind the world clock and may overshoot; the surplus is subtracted on
//! the next tick.

use crate::error::{EngineError, Result};
use crate::physics::body::{BodyFlags, BodyId, BodyKind, MassiveBodies, Slot};
use crate::physics::collision::{self, CollisionPolicy, Impact, Resolution};
use crate::physics::force::{ForceLawKind, SharedForceLaw};
use crate::physics::integrators::registry::IntegratorRegistry;
use crate::physics::integrators::{BodyInit, NBodyIntegrator};
use crate::physics::kepler::FixedMotion;
use crate::physics::massless::{FieldSources, MasslessBodies};
use crate::physics::math::{Scalar, Vector};
use crate::physics::orbit::{OrbitData, OrbitElements};
use crate::physics::particles::{
    BurstEmitter, ExplosionInitializer, ExplosionSource, ParticleEmitter, ParticleInitializer,
    ParticleSwarm, SwarmContext, SwarmId,
};
use crate::physics::units::ScaleState;
use crate::resources::SharedRng;
use bevy::log::{debug, error, info, trace, warn};
use bevy::prelude::Resource;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};

/// Registry capacity increment
pub const ENGINE_GROW_BY: usize = 10;

/// Frames per second the steps-per-frame settings refer to
pub const FRAME_RATE: Scalar = 60.0;

/// Evolvers are only called once they are at least this far behind.
pub const EVOLVE_THRESHOLD: Scalar = 1e-5;

const MASSIVE: usize = 0;
const MASSLESS: usize = 1;
const PARTICLES: usize = 2;

/// Construction-time engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub integrator: String,
    pub force_law: ForceLawKind,
    pub steps_per_frame: u32,
    pub particle_steps_per_frame: u32,
    /// Route zero-mass bodies to the massless fast path
    pub optimize_massless: bool,
    pub body_capacity: usize,
    pub seed: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            integrator: "leapfrog".to_string(),
            force_law: ForceLawKind::Newtonian,
            steps_per_frame: 8,
            particle_steps_per_frame: 2,
            optimize_massless: true,
            body_capacity: ENGINE_GROW_BY,
            seed: None,
        }
    }
}

/// Where a body starts, in user units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitialCondition {
    Cartesian { position: Vector, velocity: Vector },
    /// Keplerian elements relative to an already registered centre body
    Orbit { center: BodyId, elements: OrbitElements },
}

/// Everything needed to register one body.
///
/// Capabilities are explicit: a body follows a closed-form path only when it is
/// registered with [`with_fixed_motion`](Self::with_fixed_motion).
pub struct BodyDesc {
    /// User-unit mass; zero makes a test body
    pub mass: Scalar,
    pub initial: InitialCondition,
    /// World-space capture radius
    pub capture_radius: Scalar,
    pub motion: Option<Box<dyn FixedMotion>>,
}

impl BodyDesc {
    pub fn new(mass: Scalar, position: Vector, velocity: Vector) -> Self {
        Self {
            mass,
            initial: InitialCondition::Cartesian { position, velocity },
            capture_radius: 0.0,
            motion: None,
        }
    }

    pub fn orbiting(mass: Scalar, center: BodyId, elements: OrbitElements) -> Self {
        Self {
            mass,
            initial: InitialCondition::Orbit { center, elements },
            capture_radius: 0.0,
            motion: None,
        }
    }

    pub fn with_capture_radius(mut self, capture_radius: Scalar) -> Self {
        self.capture_radius = capture_radius;
        self
    }

    pub fn with_fixed_motion(mut self, motion: Box<dyn FixedMotion>) -> Self {
        self.motion = Some(motion);
        self
    }
}

/// What a body was registered with, kept for rescaling
#[derive(Debug, Clone, Copy)]
struct BodyRecord {
    mass: Scalar,
    initial: InitialCondition,
    capture_radius: Scalar,
}

/// Result of [`Engine::collide`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionReport {
    pub resolution: Resolution,
    /// Swarm carrying the ejecta of an explosive collision
    pub ejecta: Option<SwarmId>,
}

#[derive(Resource)]
pub struct Engine {
    scale: ScaleState,
    force: Option<SharedForceLaw>,
    dt: Scalar,
    particle_dt: Scalar,
    optimize_massless: bool,

    massive: MassiveBodies,
    integrator: Box<dyn NBodyIntegrator>,
    massless: MasslessBodies,
    swarms: BTreeMap<SwarmId, ParticleSwarm>,
    fixed: BTreeMap<BodyId, Box<dyn FixedMotion>>,
    slots: HashMap<BodyId, Slot>,
    records: HashMap<BodyId, BodyRecord>,

    evolved: [Scalar; 3],
    world_time: Scalar,
    total_physical_time: Scalar,
    time_zoom: Scalar,
    pending_zoom: Option<Scalar>,
    evolving: bool,

    next_body: u64,
    next_swarm: u64,
    rng: SharedRng,
}

/// Integrator capacity never exceeds a hard body limit.
fn integrator_capacity(integrator: &dyn NBodyIntegrator, capacity: usize) -> usize {
    integrator.body_limit().map_or(capacity, |limit| capacity.min(limit))
}

fn field_sources(massive: &MassiveBodies) -> FieldSources<'_> {
    FieldSources {
        mass: massive.masses(),
        position: massive.positions(),
        flags: massive.flags(),
        capture_radius2: massive.capture_radii_squared(),
    }
}

fn slot_position(massive: &MassiveBodies, massless: &MasslessBodies, slot: Slot) -> Vector {
    match slot.kind {
        BodyKind::Massive => massive.position(slot.index),
        BodyKind::Massless => massless.position(slot.index),
    }
}

fn steps_to_dt(name: &'static str, steps_per_frame: u32) -> Result<Scalar> {
    if steps_per_frame == 0 {
        return Err(EngineError::ZeroScale { name });
    }
    Ok(1.0 / (FRAME_RATE * steps_per_frame as Scalar))
}

impl Engine {
    /// Builds an engine with no bodies. Fails on zero step counts or an
    /// integrator `registry` does not know.
    pub fn new(options: &EngineOptions, scale: ScaleState, registry: &IntegratorRegistry) -> Result<Self> {
        let dt = steps_to_dt("steps per frame", options.steps_per_frame)?;
        let particle_dt = steps_to_dt("particle steps per frame", options.particle_steps_per_frame)?;
        let force = options.force_law.build();

        let mut integrator = registry
            .create(&options.integrator, force.clone())
            .map_err(|_| EngineError::UnknownIntegrator(options.integrator.clone()))?;
        let capacity = integrator_capacity(integrator.as_ref(), options.body_capacity);
        integrator.setup(capacity, dt)?;

        info!(
            "Engine: integrator = {}, force law = {}, dt = {:.6}, particle dt = {:.6}, units = {}",
            integrator.name(),
            options.force_law,
            dt,
            particle_dt,
            scale.unit_system()
        );

        Ok(Self {
            scale,
            force: force.clone(),
            dt,
            particle_dt,
            optimize_massless: options.optimize_massless,
            massive: MassiveBodies::with_capacity(capacity),
            integrator,
            massless: MasslessBodies::new(dt, force),
            swarms: BTreeMap::new(),
            fixed: BTreeMap::new(),
            slots: HashMap::new(),
            records: HashMap::new(),
            evolved: [0.0; 3],
            world_time: 0.0,
            total_physical_time: 0.0,
            time_zoom: 1.0,
            pending_zoom: None,
            evolving: false,
            next_body: 0,
            next_swarm: 0,
            rng: SharedRng::from_optional_seed(options.seed),
        })
    }

    pub fn with_rng(mut self, rng: SharedRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn scale(&self) -> &ScaleState {
        &self.scale
    }

    pub fn integrator_name(&self) -> &'static str {
        self.integrator.name()
    }

    pub fn integrator(&self) -> &dyn NBodyIntegrator {
        self.integrator.as_ref()
    }

    pub fn is_evolving(&self) -> bool {
        self.evolving
    }

    /// Base step of the massive integrator
    pub fn dt(&self) -> Scalar {
        self.dt
    }

    pub fn particle_dt(&self) -> Scalar {
        self.particle_dt
    }

    pub fn massive_count(&self) -> usize {
        self.massive.len()
    }

    pub fn massless_count(&self) -> usize {
        self.massless.len()
    }

    pub fn body_count(&self) -> usize {
        self.slots.len()
    }

    pub fn massive_bodies(&self) -> &MassiveBodies {
        &self.massive
    }

    pub fn massless_bodies(&self) -> &MasslessBodies {
        &self.massless
    }

    /// Ids in registration order
    pub fn body_ids(&self) -> Vec<BodyId> {
        let mut ids: Vec<BodyId> = self.slots.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn slot(&self, id: BodyId) -> Result<Slot> {
        self.slots.get(&id).copied().ok_or(EngineError::UnknownBody(id))
    }

    pub fn contains(&self, id: BodyId) -> bool {
        self.slots.contains_key(&id)
    }

    // ---------------------------------------------------------------------
    // Registration

    /// Registers a body and returns its id.
    ///
    /// Zero-mass bodies go to the massless fast path when it is enabled and the
    /// body has no fixed motion. A full registry grows by [`ENGINE_GROW_BY`];
    /// an integrator that refuses to grow makes the add fail and leaves the
    /// existing bodies untouched.
    pub fn register_body(&mut self, desc: BodyDesc) -> Result<BodyId> {
        let BodyDesc {
            mass,
            initial,
            capture_radius,
            mut motion,
        } = desc;

        let id = BodyId(self.next_body);
        let internal_mass = mass * self.scale.mass_scale();
        let (mut position, mut velocity) = self.initial_state(&initial)?;

        if let Some(motion) = motion.as_mut() {
            let origin = self.center_state(motion.center())?;
            motion.pre_evolve(&self.scale, origin.2);
            let t = self.physical_time();
            position = motion.evolve(t, origin.0);
            velocity = origin.1 + motion.velocity(t);
        }

        let record = BodyRecord {
            mass,
            initial,
            capture_radius,
        };

        if mass == 0.0 && self.optimize_massless && motion.is_none() {
            let index = self.massless.add(id, position, velocity);
            if self.evolving {
                self.massless.pre_evolve(field_sources(&self.massive));
            }
            self.next_body += 1;
            self.slots.insert(
                id,
                Slot {
                    kind: BodyKind::Massless,
                    index,
                },
            );
            self.records.insert(id, record);
            debug!("Registered massless {} at slot {}", id, index);
            return Ok(id);
        }

        let index = self.massive.len();
        if self.massive.is_full() {
            self.grow_all(ENGINE_GROW_BY)?;
        }

        let physics_capture = capture_radius / self.scale.physics_to_world();
        self.integrator.add_body(
            index,
            &BodyInit {
                mass: internal_mass,
                position,
                velocity,
                capture_radius: physics_capture,
            },
        )?;

        let flags = if motion.is_some() {
            BodyFlags::FIXED_MOTION
        } else {
            BodyFlags::NONE
        };
        self.massive
            .push(id, internal_mass, position, flags, physics_capture);
        if let Some(motion) = motion {
            self.fixed.insert(id, motion);
        }

        self.next_body += 1;
        self.slots.insert(
            id,
            Slot {
                kind: BodyKind::Massive,
                index,
            },
        );
        self.records.insert(id, record);

        if self.evolving {
            let mut view = self.massive.view_mut();
            self.integrator.pre_evolve(&mut view)?;
            self.massless.pre_evolve(field_sources(&self.massive));
        }

        debug!(
            "Registered {} at slot {} (mass {:.6e}, fixed = {})",
            id,
            index,
            internal_mass,
            flags.is_fixed()
        );
        Ok(id)
    }

    /// Physics-space position and velocity for an initial condition
    fn initial_state(&self, initial: &InitialCondition) -> Result<(Vector, Vector)> {
        match *initial {
            InitialCondition::Cartesian { position, velocity } => Ok((
                position * self.scale.physics_per_user_length(),
                velocity * self.scale.velocity_scale(),
            )),
            InitialCondition::Orbit { center, elements } => {
                let (origin, origin_velocity, mu) = self.center_state(Some(center))?;
                let (r, v) = elements
                    .scaled(self.scale.physics_per_user_length())
                    .state_vectors(mu)?;
                Ok((origin + r, origin_velocity + v))
            }
        }
    }

    /// Position, velocity and internal mass of an optional centre body
    fn center_state(&self, center: Option<BodyId>) -> Result<(Vector, Vector, Scalar)> {
        let Some(center) = center else {
            return Ok((Vector::ZERO, Vector::ZERO, 0.0));
        };
        let slot = self.slot(center)?;
        let mass = match slot.kind {
            BodyKind::Massive => self.massive.mass(slot.index),
            BodyKind::Massless => 0.0,
        };
        Ok((
            slot_position(&self.massive, &self.massless, slot),
            self.velocity(center)?,
            mass,
        ))
    }

    /// Extends the registry and the integrator together. The integrator goes
    /// first so a refusal leaves both unchanged.
    fn grow_all(&mut self, by: usize) -> Result<()> {
        if let Err(err) = self.integrator.grow(by) {
            error!(
                "Cannot grow {} past {} bodies: {}",
                self.integrator.name(),
                self.massive.capacity(),
                err
            );
            return Err(err);
        }
        self.massive.grow(by);
        debug!("Registry grown to {} slots", self.massive.capacity());
        Ok(())
    }

    /// Removes a body, shifting later slots down. Prefer
    /// [`deactivate_body`](Self::deactivate_body) while evolving.
    pub fn remove_body(&mut self, id: BodyId) -> Result<()> {
        let slot = self.slot(id)?;
        let moved = match slot.kind {
            BodyKind::Massive => {
                self.integrator.remove_body_at(slot.index)?;
                self.fixed.remove(&id);
                self.massive.remove(slot.index)
            }
            BodyKind::Massless => self.massless.remove(slot.index),
        };

        for (offset, moved_id) in moved.into_iter().enumerate() {
            if let Some(moved_slot) = self.slots.get_mut(&moved_id) {
                moved_slot.index = slot.index + offset;
            }
        }
        self.slots.remove(&id);
        self.records.remove(&id);
        debug!("Removed {} from slot {}", id, slot.index);
        Ok(())
    }

    /// Marks a body inactive in place; it neither feels nor sources force.
    pub fn deactivate_body(&mut self, id: BodyId) -> Result<()> {
        self.set_active(id, false)
    }

    pub fn reactivate_body(&mut self, id: BodyId) -> Result<()> {
        self.set_active(id, true)
    }

    fn set_active(&mut self, id: BodyId, active: bool) -> Result<()> {
        let slot = self.slot(id)?;
        match (slot.kind, active) {
            (BodyKind::Massive, true) => self.massive.remove_flag(slot.index, BodyFlags::INACTIVE),
            (BodyKind::Massive, false) => self.massive.insert_flag(slot.index, BodyFlags::INACTIVE),
            (BodyKind::Massless, _) => self.massless.set_active(slot.index, active),
        }
        Ok(())
    }

    pub fn is_active(&self, id: BodyId) -> Result<bool> {
        let slot = self.slot(id)?;
        Ok(match slot.kind {
            BodyKind::Massive => !self.massive.flag(slot.index).is_inactive(),
            BodyKind::Massless => self.massless.is_active(slot.index),
        })
    }

    // ---------------------------------------------------------------------
    // Configuration

    /// Swaps the integrator, carrying every body's state across.
    pub fn set_integrator(&mut self, name: &str, registry: &IntegratorRegistry) -> Result<()> {
        if self.evolving {
            return Err(EngineError::IntegratorLocked);
        }
        let integrator = registry
            .create(name, self.force.clone())
            .map_err(|_| EngineError::UnknownIntegrator(name.to_string()))?;
        self.replace_integrator(integrator)
    }

    /// Rebuilds the integrator and evolvers around a different force law.
    pub fn set_force_law(&mut self, kind: ForceLawKind, registry: &IntegratorRegistry) -> Result<()> {
        if self.evolving {
            return Err(EngineError::IntegratorLocked);
        }
        let force = kind.build();
        let integrator = registry
            .create(self.integrator.name(), force.clone())
            .map_err(|_| EngineError::UnknownIntegrator(self.integrator.name().to_string()))?;
        self.replace_integrator(integrator)?;

        self.massless.set_force(force.clone());
        for swarm in self.swarms.values_mut() {
            swarm.set_force(force.clone());
        }
        self.force = force;
        info!("Force law set to {}", kind);
        Ok(())
    }

    fn replace_integrator(&mut self, integrator: Box<dyn NBodyIntegrator>) -> Result<()> {
        if let Some(limit) = integrator.body_limit() {
            if self.massive.len() > limit {
                return Err(EngineError::BodyLimit {
                    integrator: integrator.name(),
                    limit,
                });
            }
        }
        let velocities = self.massive_velocities()?;
        let previous = std::mem::replace(&mut self.integrator, integrator);
        if let Err(err) = self.reseed_integrator(&velocities) {
            warn!("Keeping {}: {}", previous.name(), err);
            self.integrator = previous;
            return Err(err);
        }
        info!("Integrator set to {}", self.integrator.name());
        Ok(())
    }

    fn massive_velocities(&self) -> Result<Vec<Vector>> {
        (0..self.massive.len())
            .map(|i| self.integrator.velocity(i))
            .collect()
    }

    /// Re-runs setup and re-adds every registry body with `velocities`.
    fn reseed_integrator(&mut self, velocities: &[Vector]) -> Result<()> {
        let capacity = integrator_capacity(self.integrator.as_ref(), self.massive.capacity());
        self.integrator.setup(capacity, self.dt)?;
        for (i, velocity) in velocities.iter().enumerate() {
            self.integrator.add_body(
                i,
                &BodyInit {
                    mass: self.massive.mass(i),
                    position: self.massive.position(i),
                    velocity: *velocity,
                    capture_radius: self.massive.capture_radius(i),
                },
            )?;
        }
        Ok(())
    }

    /// Applies a new unit configuration.
    ///
    /// Every body keeps its user-space state: internal masses, positions,
    /// velocities and capture radii are re-derived from the new scale. Orbit
    /// bodies that have not started evolving are re-seeded from their elements
    /// and closed-form bodies recompute their constants. An identical scale is
    /// a no-op.
    pub fn set_scale(&mut self, scale: ScaleState) -> Result<()> {
        if scale == self.scale {
            debug!("Scale unchanged");
            return Ok(());
        }
        let old = self.scale;
        let length_ratio = scale.physics_per_user_length() / old.physics_per_user_length();
        let velocity_ratio = scale.velocity_scale() / old.velocity_scale();
        let mut velocities = self.massive_velocities()?;
        self.scale = scale;

        for i in 0..self.massive.len() {
            let id = self.massive.ids()[i];
            let Some(record) = self.records.get(&id).copied() else {
                continue;
            };
            self.massive.set_mass(i, record.mass * scale.mass_scale());
            self.massive.set_position(i, self.massive.position(i) * length_ratio);
            self.massive
                .set_capture_radius(i, record.capture_radius / scale.physics_to_world());
            velocities[i] *= velocity_ratio;
        }
        for i in 0..self.massless.len() {
            self.massless.set_position(i, self.massless.position(i) * length_ratio);
            self.massless.set_velocity(i, self.massless.velocity(i) * velocity_ratio);
        }

        if !self.evolving {
            for id in self.body_ids() {
                let Some(record) = self.records.get(&id).copied() else {
                    continue;
                };
                if !matches!(record.initial, InitialCondition::Orbit { .. }) || self.fixed.contains_key(&id) {
                    continue;
                }
                let (position, velocity) = self.initial_state(&record.initial)?;
                let slot = self.slot(id)?;
                match slot.kind {
                    BodyKind::Massive => {
                        self.massive.set_position(slot.index, position);
                        velocities[slot.index] = velocity;
                    }
                    BodyKind::Massless => {
                        self.massless.set_position(slot.index, position);
                        self.massless.set_velocity(slot.index, velocity);
                    }
                }
            }
        }

        self.reseed_integrator(&velocities)?;
        self.prepare_fixed_bodies()?;
        self.update_fixed_bodies();

        if self.evolving {
            let mut view = self.massive.view_mut();
            self.integrator.pre_evolve(&mut view)?;
            self.massless.pre_evolve(field_sources(&self.massive));
        }

        info!(
            "Scale set: mass scale {:.6e}, velocity scale {:.6e}",
            scale.mass_scale(),
            scale.velocity_scale()
        );
        Ok(())
    }

    /// Queues a new ratio of physical to world time, applied at the end of
    /// the next tick.
    pub fn set_time_zoom(&mut self, zoom: Scalar) -> Result<()> {
        if !(zoom > 0.0) || !zoom.is_finite() {
            return Err(EngineError::ZeroScale { name: "time zoom" });
        }
        self.pending_zoom = Some(zoom);
        Ok(())
    }

    pub fn time_zoom(&self) -> Scalar {
        self.time_zoom
    }

    // ---------------------------------------------------------------------
    // Evolution

    /// Seeds accelerations and closed-form constants and starts evolving.
    ///
    /// A failure leaves the engine not evolving.
    pub fn start(&mut self) -> Result<()> {
        if self.evolving {
            return Err(EngineError::AlreadyEvolving);
        }
        self.prepare_fixed_bodies()?;
        self.update_fixed_bodies();

        let mut view = self.massive.view_mut();
        if let Err(err) = self.integrator.pre_evolve(&mut view) {
            error!("{} failed to start: {}", self.integrator.name(), err);
            return Err(err);
        }
        self.massless.pre_evolve(field_sources(&self.massive));
        self.evolving = true;

        info!(
            "Evolving {} massive, {} massless bodies and {} swarms",
            self.massive.len(),
            self.massless.len(),
            self.swarms.len()
        );
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if !self.evolving {
            return Err(EngineError::NotEvolving);
        }
        self.evolving = false;
        Ok(())
    }

    fn prepare_fixed_bodies(&mut self) -> Result<()> {
        let ids: Vec<BodyId> = self.fixed.keys().copied().collect();
        for id in ids {
            let center = self.fixed.get(&id).and_then(|motion| motion.center());
            let (_, _, center_mass) = self.center_state(center)?;
            if let Some(motion) = self.fixed.get_mut(&id) {
                motion.pre_evolve(&self.scale, center_mass);
            }
        }
        Ok(())
    }

    /// Moves every closed-form body to the current physical time.
    fn update_fixed_bodies(&mut self) {
        let t = self.physical_time();
        for (id, motion) in self.fixed.iter_mut() {
            let Some(&Slot {
                kind: BodyKind::Massive,
                index,
            }) = self.slots.get(id)
            else {
                continue;
            };
            let origin = motion
                .center()
                .and_then(|center| self.slots.get(&center))
                .map_or(Vector::ZERO, |slot| slot_position(&self.massive, &self.massless, *slot));
            let position = motion.evolve(t, origin);
            self.massive.set_position(index, position);
        }
    }

    /// Fails once the massive integrator has halted
    fn check_integrator(&self) -> Result<()> {
        match self.integrator.halted() {
            Some(reason) => Err(EngineError::Regularization(format!(
                "{} halted: {reason}",
                self.integrator.name()
            ))),
            None => Ok(()),
        }
    }

    /// Physical time `evolver` still owes the world clock
    fn deficit(&self, evolver: usize) -> Scalar {
        (self.world_time * self.time_zoom - self.evolved[evolver]).max(0.0)
    }

    /// Advances the world clock by `world_dt` and brings every evolver up to
    /// it. Returns the physical time the massive bodies advanced.
    pub fn step(&mut self, world_dt: Scalar) -> Result<Scalar> {
        if !self.evolving {
            return Err(EngineError::NotEvolving);
        }
        self.check_integrator()?;
        self.world_time += world_dt.max(0.0);

        let mut massive_evolved = 0.0;
        let massive_dt = self.deficit(MASSIVE);
        if massive_dt > EVOLVE_THRESHOLD {
            let mut view = self.massive.view_mut();
            massive_evolved = self.integrator.evolve(massive_dt, &mut view);
            self.evolved[MASSIVE] += massive_evolved;
            self.check_integrator()?;
        }

        self.update_fixed_bodies();

        let particle_dt = self.deficit(PARTICLES);
        if self.swarms.is_empty() {
            self.evolved[PARTICLES] += particle_dt;
        } else if particle_dt > EVOLVE_THRESHOLD {
            let sources = field_sources(&self.massive);
            let ctx = SwarmContext {
                physics_to_world: self.scale.physics_to_world(),
                source_velocity: Vector::ZERO,
            };
            // idle swarms report exactly `particle_dt`; live ones share a step and overshoot alike
            let evolved = self
                .swarms
                .values_mut()
                .map(|swarm| swarm.evolve(particle_dt, sources, &ctx))
                .fold(particle_dt, Scalar::max);
            self.evolved[PARTICLES] += evolved;
        }

        let massless_dt = self.deficit(MASSLESS);
        if self.massless.is_empty() {
            self.evolved[MASSLESS] += massless_dt;
        } else if massless_dt > EVOLVE_THRESHOLD {
            self.evolved[MASSLESS] += self
                .massless
                .evolve(massless_dt, field_sources(&self.massive));
        }

        let physics_to_world = self.scale.physics_to_world();
        for swarm in self.swarms.values_mut() {
            swarm.write_back(physics_to_world);
        }

        if let Some(zoom) = self.pending_zoom.take() {
            self.total_physical_time += self.evolved[MASSIVE];
            self.evolved = [0.0; 3];
            self.world_time = 0.0;
            self.time_zoom = zoom;
            debug!("Time zoom {} applied at t = {:.6}", zoom, self.total_physical_time);
        }

        trace!(
            "Step: world {:.6}, physical {:.6}",
            self.world_time,
            self.physical_time()
        );
        Ok(massive_evolved)
    }

    /// Total physical time evolved by the massive bodies
    pub fn physical_time(&self) -> Scalar {
        self.total_physical_time + self.evolved[MASSIVE]
    }

    /// World time since the last time-zoom change
    pub fn world_time(&self) -> Scalar {
        self.world_time
    }

    // ---------------------------------------------------------------------
    // Body state

    /// Physics-space position
    pub fn position(&self, id: BodyId) -> Result<Vector> {
        Ok(slot_position(&self.massive, &self.massless, self.slot(id)?))
    }

    pub fn world_position(&self, id: BodyId) -> Result<Vector> {
        Ok(self.position(id)? * self.scale.physics_to_world())
    }

    /// Physics-space velocity
    pub fn velocity(&self, id: BodyId) -> Result<Vector> {
        let slot = self.slot(id)?;
        match slot.kind {
            BodyKind::Massless => Ok(self.massless.velocity(slot.index)),
            BodyKind::Massive => match self.fixed.get(&id) {
                Some(motion) => {
                    let center_velocity = match motion.center() {
                        Some(center) => self.velocity(center)?,
                        None => Vector::ZERO,
                    };
                    Ok(center_velocity + motion.velocity(self.physical_time()))
                }
                None => self.integrator.velocity(slot.index),
            },
        }
    }

    /// Velocity in user units
    pub fn scaled_velocity(&self, id: BodyId) -> Result<Vector> {
        Ok(self.velocity(id)? / self.scale.velocity_scale())
    }

    pub fn acceleration(&self, id: BodyId) -> Result<Vector> {
        let slot = self.slot(id)?;
        Ok(match slot.kind {
            BodyKind::Massive => self.integrator.acceleration(slot.index),
            BodyKind::Massless => self.massless.acceleration(slot.index),
        })
    }

    /// Internal (mass-scaled) mass; zero for test bodies
    pub fn mass(&self, id: BodyId) -> Result<Scalar> {
        let slot = self.slot(id)?;
        Ok(match slot.kind {
            BodyKind::Massive => self.massive.mass(slot.index),
            BodyKind::Massless => 0.0,
        })
    }

    /// Sets a massive body's user-unit mass. Test bodies keep zero mass.
    pub fn update_mass(&mut self, id: BodyId, mass: Scalar) -> Result<()> {
        let slot = self.slot(id)?;
        if slot.kind == BodyKind::Massless {
            warn!("Cannot change the mass of massless {}", id);
            return Ok(());
        }
        self.massive.set_mass(slot.index, mass * self.scale.mass_scale());
        if let Some(record) = self.records.get_mut(&id) {
            record.mass = mass;
        }
        Ok(())
    }

    /// Moves a body to a user-space position and velocity.
    pub fn set_position_velocity(&mut self, id: BodyId, position: Vector, velocity: Vector) -> Result<()> {
        let slot = self.slot(id)?;
        let position = position * self.scale.physics_per_user_length();
        let velocity = velocity * self.scale.velocity_scale();
        self.set_physics_state(slot, position, velocity)
    }

    fn set_physics_state(&mut self, slot: Slot, position: Vector, velocity: Vector) -> Result<()> {
        match slot.kind {
            BodyKind::Massive => {
                self.integrator.set_velocity(slot.index, velocity)?;
                self.massive.set_position(slot.index, position);
            }
            BodyKind::Massless => {
                self.massless.set_velocity(slot.index, velocity);
                self.massless.set_position(slot.index, position);
            }
        }
        Ok(())
    }

    fn set_physics_velocity(&mut self, slot: Slot, velocity: Vector) -> Result<()> {
        match slot.kind {
            BodyKind::Massive => self.integrator.set_velocity(slot.index, velocity),
            BodyKind::Massless => {
                self.massless.set_velocity(slot.index, velocity);
                Ok(())
            }
        }
    }

    /// Velocity a body would have after `impulse`, without applying it.
    ///
    /// A massive body changes by `impulse / mass`; a test body takes the
    /// impulse as a velocity change.
    pub fn velocity_for_impulse(&self, id: BodyId, impulse: Vector) -> Result<Vector> {
        let velocity = self.velocity(id)?;
        let mass = self.mass(id)?;
        Ok(if mass > 0.0 {
            velocity + impulse / mass
        } else {
            velocity + impulse
        })
    }

    pub fn apply_impulse(&mut self, id: BodyId, impulse: Vector) -> Result<()> {
        let velocity = self.velocity_for_impulse(id, impulse)?;
        let slot = self.slot(id)?;
        self.set_physics_velocity(slot, velocity)
    }

    /// Resolves a reported contact between `a` and `b` under `policy`.
    ///
    /// `a` survives absorbing and explosive collisions; `b` is deactivated.
    pub fn collide(&mut self, a: BodyId, b: BodyId, policy: &CollisionPolicy) -> Result<CollisionReport> {
        let (slot_a, slot_b) = (self.slot(a)?, self.slot(b)?);
        let impact = Impact {
            mass: [self.mass(a)?, self.mass(b)?],
            velocity: [self.velocity(a)?, self.velocity(b)?],
        };
        let resolution = if a == b {
            Resolution::Unchanged
        } else {
            collision::resolve(policy, &impact, self.scale.velocity_scale())
        };
        debug!("Collision {} / {} ({}): {:?}", a, b, policy.name(), resolution);

        let mut ejecta = None;
        match resolution {
            Resolution::Unchanged => {}
            Resolution::Bounced { velocity } => {
                self.set_physics_velocity(slot_a, velocity[0])?;
                self.set_physics_velocity(slot_b, velocity[1])?;
            }
            Resolution::Absorbed { mass, velocity } => {
                self.absorb(a, b, mass, velocity)?;
            }
            Resolution::Exploded {
                mass,
                velocity,
                ejecta: debris,
            } => {
                let contact = self.position(b)?;
                self.absorb(a, b, mass, velocity)?;

                let source = ExplosionSource {
                    mass,
                    position: self.position(a)?,
                    velocity,
                    size: 2.0 * self.massive.capture_radius(slot_a.index),
                };
                let rng = SharedRng::from_seed(self.rng.random());
                let initializer = ExplosionInitializer::new(debris.params, source, contact, rng);
                let emitter = BurstEmitter::new(debris.particles, contact * self.scale.physics_to_world());
                ejecta = Some(self.add_swarm(Box::new(emitter), Some(Box::new(initializer)), Vector::ZERO));
            }
        }

        Ok(CollisionReport { resolution, ejecta })
    }

    fn absorb(&mut self, survivor: BodyId, absorbed: BodyId, mass: Scalar, velocity: Vector) -> Result<()> {
        let slot = self.slot(survivor)?;
        self.set_physics_velocity(slot, velocity)?;
        if slot.kind == BodyKind::Massive {
            self.massive.set_mass(slot.index, mass);
            if let Some(record) = self.records.get_mut(&survivor) {
                record.mass = mass / self.scale.mass_scale();
            }
        }
        self.deactivate_body(absorbed)
    }

    // ---------------------------------------------------------------------
    // Queries

    /// Current total energy of the massive bodies
    pub fn energy(&self) -> Scalar {
        self.integrator.energy(
            self.massive.masses(),
            self.massive.positions(),
            self.massive.flags(),
        )
    }

    pub fn initial_energy(&self) -> Scalar {
        self.integrator.initial_energy()
    }

    /// Energy change since start, relative to the initial energy when it is non-zero
    pub fn energy_drift(&self) -> Scalar {
        let initial = self.initial_energy();
        let change = self.energy() - initial;
        if initial != 0.0 { change / initial.abs() } else { change }
    }

    /// Mass-weighted mean world position of the active massive bodies
    pub fn world_center_of_mass(&self) -> Vector {
        let (weighted, total) = self.weighted_sum(|i| self.massive.position(i));
        if total > 0.0 {
            weighted / total * self.scale.physics_to_world()
        } else {
            Vector::ZERO
        }
    }

    /// Velocity of the centre of mass in world units per physical time
    pub fn world_center_of_mass_velocity(&self) -> Result<Vector> {
        let velocities = self.massive_velocities()?;
        let (weighted, total) = self.weighted_sum(|i| velocities[i]);
        Ok(if total > 0.0 {
            weighted / total * self.scale.physics_to_world()
        } else {
            Vector::ZERO
        })
    }

    fn weighted_sum(&self, value: impl Fn(usize) -> Vector) -> (Vector, Scalar) {
        let mut weighted = Vector::ZERO;
        let mut total = 0.0;
        for i in 0..self.massive.len() {
            if self.massive.flag(i).is_inactive() {
                continue;
            }
            let m = self.massive.mass(i);
            weighted += value(i) * m;
            total += m;
        }
        (weighted, total)
    }

    /// Orbit of `id` around `center`, in physics units. Assumes Newtonian gravity.
    pub fn orbit_data(&self, id: BodyId, center: BodyId) -> Result<OrbitData> {
        let r = self.position(id)? - self.position(center)?;
        let v = self.velocity(id)? - self.velocity(center)?;
        OrbitData::from_state(r, v, self.mass(center)?)
    }

    /// Pairs of active massive bodies whose capture spheres overlap, heavier
    /// body first.
    pub fn contacts(&self) -> Vec<(BodyId, BodyId)> {
        let bodies = &self.massive;
        let mut pairs = Vec::new();
        for i in 0..bodies.len() {
            if bodies.flag(i).is_inactive() {
                continue;
            }
            for j in (i + 1)..bodies.len() {
                if bodies.flag(j).is_inactive() {
                    continue;
                }
                let reach = bodies.capture_radius(i) + bodies.capture_radius(j);
                if reach <= 0.0 || bodies.position(i).distance_squared(bodies.position(j)) >= reach * reach {
                    continue;
                }
                let (a, b) = if bodies.mass(j) > bodies.mass(i) { (j, i) } else { (i, j) };
                pairs.push((bodies.ids()[a], bodies.ids()[b]));
            }
        }
        pairs
    }

    // ---------------------------------------------------------------------
    // Particle swarms

    /// Starts mirroring `emitter`. `initial_velocity` is added to emitted
    /// velocities when there is no initializer.
    pub fn add_swarm(
        &mut self,
        emitter: Box<dyn ParticleEmitter>,
        initializer: Option<Box<dyn ParticleInitializer>>,
        initial_velocity: Vector,
    ) -> SwarmId {
        let id = SwarmId(self.next_swarm);
        self.next_swarm += 1;
        let swarm = ParticleSwarm::new(
            emitter,
            initializer,
            initial_velocity,
            self.particle_dt,
            self.force.clone(),
        );
        self.swarms.insert(id, swarm);
        debug!("Added {}", id);
        id
    }

    pub fn remove_swarm(&mut self, id: SwarmId) -> Result<ParticleSwarm> {
        self.swarms.remove(&id).ok_or(EngineError::UnknownSwarm(id))
    }

    pub fn swarm(&self, id: SwarmId) -> Result<&ParticleSwarm> {
        self.swarms.get(&id).ok_or(EngineError::UnknownSwarm(id))
    }

    pub fn swarm_ids(&self) -> Vec<SwarmId> {
        self.swarms.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::BodyView;
    use crate::physics::integrators::Leapfrog;
    use crate::physics::integrators::registry::IntegratorEntry;
    use crate::physics::kepler::KeplerOrbit;
    use crate::physics::units::UnitSystem;
    use approx::assert_relative_eq;

    fn engine_with(integrator: &str) -> Engine {
        let options = EngineOptions {
            integrator: integrator.to_string(),
            seed: Some(7),
            ..EngineOptions::default()
        };
        Engine::new(&options, ScaleState::default(), &IntegratorRegistry::default()).unwrap()
    }

    fn check_slots(engine: &Engine) {
        for id in engine.body_ids() {
            let slot = engine.slot(id).unwrap();
            match slot.kind {
                BodyKind::Massive => assert_eq!(engine.massive.ids()[slot.index], id),
                BodyKind::Massless => assert_eq!(engine.massless.ids()[slot.index], id),
            }
        }
    }

    #[test]
    fn test_registry_grows_and_remaps_after_removal() {
        let mut engine = engine_with("leapfrog");
        let ids: Vec<BodyId> = (0..25)
            .map(|i| {
                let x = i as Scalar;
                engine
                    .register_body(BodyDesc::new(1.0 + x, Vector::new(x, 0.0, 0.0), Vector::ZERO))
                    .unwrap()
            })
            .collect();
        assert_eq!(engine.massive_count(), 25);
        assert!(engine.massive.capacity() >= 25);

        for id in [ids[3], ids[0], ids[24], ids[10]] {
            engine.remove_body(id).unwrap();
        }
        assert_eq!(engine.massive_count(), 21);
        check_slots(&engine);

        let id = ids[11];
        let slot = engine.slot(id).unwrap();
        assert_eq!(engine.massive.mass(slot.index), 12.0);
        assert_eq!(engine.position(id).unwrap(), Vector::new(11.0, 0.0, 0.0));
        assert!(matches!(engine.remove_body(ids[3]), Err(EngineError::UnknownBody(_))));
    }

    #[test]
    fn test_zero_mass_uses_fast_path() {
        let mut engine = engine_with("leapfrog");
        engine.register_body(BodyDesc::new(1.0, Vector::ZERO, Vector::ZERO)).unwrap();
        let test = engine
            .register_body(BodyDesc::new(0.0, Vector::X, Vector::Y))
            .unwrap();
        assert_eq!(engine.slot(test).unwrap().kind, BodyKind::Massless);
        assert_eq!(engine.massless_count(), 1);
        assert_eq!(engine.massive_count(), 1);
    }

    #[test]
    fn test_azt_refuses_fourth_body() {
        let mut engine = engine_with("azt");
        let bodies = [
            (Vector::new(0.970_004_36, -0.243_087_53, 0.0), Vector::new(0.466_203_685, 0.432_365_73, 0.0)),
            (Vector::new(-0.970_004_36, 0.243_087_53, 0.0), Vector::new(0.466_203_685, 0.432_365_73, 0.0)),
            (Vector::ZERO, Vector::new(-0.932_407_37, -0.864_731_46, 0.0)),
        ];
        for (position, velocity) in bodies {
            engine.register_body(BodyDesc::new(1.0, position, velocity)).unwrap();
        }

        let fourth = engine.register_body(BodyDesc::new(1.0, Vector::splat(5.0), Vector::ZERO));
        assert!(fourth.is_err());
        assert_eq!(engine.massive_count(), 3);

        engine.start().unwrap();
        for _ in 0..30 {
            engine.step(1.0 / 60.0).unwrap();
        }
        for id in engine.body_ids() {
            assert!(engine.position(id).unwrap().is_finite());
        }
    }

    #[test]
    fn test_integrator_locked_while_evolving() {
        let mut engine = engine_with("leapfrog");
        engine.register_body(BodyDesc::new(1.0, Vector::ZERO, Vector::ZERO)).unwrap();
        engine.start().unwrap();
        let registry = IntegratorRegistry::default();
        assert_eq!(engine.set_integrator("hermite", &registry), Err(EngineError::IntegratorLocked));

        engine.stop().unwrap();
        engine.set_integrator("hermite", &registry).unwrap();
        assert_eq!(engine.integrator_name(), "hermite");
        assert!(matches!(
            engine.set_integrator("nope", &registry),
            Err(EngineError::UnknownIntegrator(_))
        ));
    }

    #[test]
    fn test_step_requires_start() {
        let mut engine = engine_with("leapfrog");
        assert_eq!(engine.step(0.1), Err(EngineError::NotEvolving));
        engine.start().unwrap();
        assert_eq!(engine.start(), Err(EngineError::AlreadyEvolving));
    }

    #[test]
    fn test_clocks_track_world_time() {
        let mut engine = engine_with("leapfrog");
        engine.register_body(BodyDesc::new(1.0, Vector::ZERO, Vector::ZERO)).unwrap();
        engine
            .register_body(BodyDesc::new(0.001, Vector::X, Vector::new(0.0, 1.0, 0.0)))
            .unwrap();
        engine.start().unwrap();

        for _ in 0..120 {
            engine.step(1.0 / 60.0).unwrap();
        }
        // overshoot never exceeds one step
        let lag = engine.physical_time() - engine.world_time();
        assert!(lag >= -EVOLVE_THRESHOLD && lag < engine.dt() + 1e-9);
    }

    #[test]
    fn test_time_zoom_keeps_physical_time_continuous() {
        let mut engine = engine_with("leapfrog");
        engine.register_body(BodyDesc::new(1.0, Vector::ZERO, Vector::ZERO)).unwrap();
        engine.start().unwrap();
        for _ in 0..60 {
            engine.step(1.0 / 60.0).unwrap();
        }
        let before = engine.physical_time();

        engine.set_time_zoom(2.0).unwrap();
        assert_eq!(engine.time_zoom(), 1.0);
        engine.step(1.0 / 60.0).unwrap();
        assert_eq!(engine.time_zoom(), 2.0);
        assert!(engine.physical_time() >= before);

        let zoomed_start = engine.physical_time();
        for _ in 0..60 {
            engine.step(1.0 / 60.0).unwrap();
        }
        assert!((engine.physical_time() - zoomed_start - 2.0).abs() < 2.0 * engine.dt());
        assert!(engine.set_time_zoom(0.0).is_err());
    }

    #[test]
    fn test_impulse_scales_by_mass() {
        let mut engine = engine_with("leapfrog");
        let heavy = engine.register_body(BodyDesc::new(4.0, Vector::ZERO, Vector::ZERO)).unwrap();
        let test = engine
            .register_body(BodyDesc::new(0.0, Vector::new(10.0, 0.0, 0.0), Vector::ZERO))
            .unwrap();

        let impulse = Vector::new(2.0, 0.0, 0.0);
        assert_eq!(engine.velocity_for_impulse(heavy, impulse).unwrap(), Vector::new(0.5, 0.0, 0.0));
        assert_eq!(engine.velocity(heavy).unwrap(), Vector::ZERO);

        engine.apply_impulse(heavy, impulse).unwrap();
        engine.apply_impulse(test, impulse).unwrap();
        assert_eq!(engine.velocity(heavy).unwrap(), Vector::new(0.5, 0.0, 0.0));
        assert_eq!(engine.velocity(test).unwrap(), impulse);
    }

    #[test]
    fn test_absorb_conserves_momentum_and_deactivates() {
        let mut engine = engine_with("leapfrog");
        let a = engine
            .register_body(BodyDesc::new(3.0, Vector::ZERO, Vector::new(1.0, 0.0, 0.0)))
            .unwrap();
        let b = engine
            .register_body(BodyDesc::new(1.0, Vector::new(0.1, 0.0, 0.0), Vector::new(-1.0, 2.0, 0.0)))
            .unwrap();
        let before = engine.velocity(a).unwrap() * 3.0 + engine.velocity(b).unwrap();

        let report = engine.collide(a, b, &CollisionPolicy::Absorb).unwrap();
        assert!(matches!(report.resolution, Resolution::Absorbed { .. }));
        assert!(report.ejecta.is_none());

        let after = engine.velocity(a).unwrap() * engine.mass(a).unwrap();
        assert_relative_eq!(after.x, before.x, epsilon = 1e-12);
        assert_relative_eq!(after.y, before.y, epsilon = 1e-12);
        assert!(!engine.is_active(b).unwrap());
        assert_eq!(engine.mass(a).unwrap(), 4.0);
    }

    #[test]
    fn test_contacts_put_heavier_body_first() {
        let mut engine = engine_with("leapfrog");
        let light = engine
            .register_body(BodyDesc::new(1.0, Vector::ZERO, Vector::ZERO).with_capture_radius(0.1))
            .unwrap();
        let heavy = engine
            .register_body(BodyDesc::new(5.0, Vector::new(0.15, 0.0, 0.0), Vector::ZERO).with_capture_radius(0.1))
            .unwrap();
        let far = engine
            .register_body(BodyDesc::new(5.0, Vector::new(3.0, 0.0, 0.0), Vector::ZERO).with_capture_radius(0.1))
            .unwrap();
        let moon = engine
            .register_body(BodyDesc::new(1.0, Vector::new(3.01, 0.0, 0.0), Vector::ZERO))
            .unwrap();

        assert_eq!(engine.contacts(), vec![(heavy, light), (far, moon)]);

        engine.deactivate_body(light).unwrap();
        assert_eq!(engine.contacts(), vec![(far, moon)]);
    }

    #[test]
    fn test_explosion_creates_ejecta_swarm() {
        let mut engine = engine_with("leapfrog");
        let a = engine
            .register_body(BodyDesc::new(10.0, Vector::ZERO, Vector::ZERO).with_capture_radius(0.5))
            .unwrap();
        let b = engine
            .register_body(BodyDesc::new(1.0, Vector::new(0.6, 0.0, 0.0), Vector::ZERO))
            .unwrap();
        engine.start().unwrap();

        let policy = CollisionPolicy::Explode {
            ejecta: collision::Ejecta {
                particles: 16,
                ..collision::Ejecta::default()
            },
        };
        let report = engine.collide(a, b, &policy).unwrap();
        let swarm = report.ejecta.unwrap();
        engine.step(1.0 / 60.0).unwrap();
        assert_eq!(engine.swarm(swarm).unwrap().particle_count(), 16);
        assert!(engine.remove_swarm(swarm).is_ok());
        assert!(engine.swarm(swarm).is_err());
    }

    #[test]
    fn test_massless_fast_path_uses_massive_step() {
        let engine = engine_with("leapfrog");
        assert_ne!(engine.dt(), engine.particle_dt());
        assert_eq!(engine.massless_bodies().dt(), engine.dt());
    }

    #[test]
    fn test_retired_swarm_does_not_hold_back_particle_clock() {
        let mut engine = engine_with("leapfrog");
        engine
            .register_body(BodyDesc::new(1.0, Vector::ZERO, Vector::ZERO).with_capture_radius(2.0))
            .unwrap();
        engine.start().unwrap();

        // the live swarm sorts first so the retired one evolves last
        let mut far = BurstEmitter::new(2, Vector::ZERO);
        far.set_position(0, Vector::new(50.0, 0.0, 0.0));
        far.set_position(1, Vector::new(0.0, 50.0, 0.0));
        let live = engine.add_swarm(Box::new(far), None, Vector::ZERO);
        let doomed = engine.add_swarm(
            Box::new(BurstEmitter::new(2, Vector::new(0.5, 0.0, 0.0))),
            None,
            Vector::ZERO,
        );

        let p = engine.particle_dt();
        engine.step(1.2 * p).unwrap();
        assert!(engine.swarm(doomed).unwrap().all_inactive());
        assert!(!engine.swarm(live).unwrap().all_inactive());
        assert_relative_eq!(engine.evolved[PARTICLES], 2.0 * p, epsilon = 1e-12);

        // the live swarm takes one full step for the 0.4 p deficit
        engine.step(1.2 * p).unwrap();
        assert_relative_eq!(engine.evolved[PARTICLES], 3.0 * p, epsilon = 1e-12);
    }

    /// Leapfrog that gives up after its first evolve
    struct Stalling {
        inner: Leapfrog,
        halt: Option<String>,
    }

    impl NBodyIntegrator for Stalling {
        fn name(&self) -> &'static str {
            "stalling"
        }
        fn setup(&mut self, capacity: usize, dt: Scalar) -> Result<()> {
            self.inner.setup(capacity, dt)
        }
        fn add_body(&mut self, index: usize, body: &BodyInit) -> Result<()> {
            self.inner.add_body(index, body)
        }
        fn remove_body_at(&mut self, index: usize) -> Result<()> {
            self.inner.remove_body_at(index)
        }
        fn grow(&mut self, by: usize) -> Result<()> {
            self.inner.grow(by)
        }
        fn pre_evolve(&mut self, bodies: &mut BodyView<'_>) -> Result<()> {
            self.halt = None;
            self.inner.pre_evolve(bodies)
        }
        fn evolve(&mut self, duration: Scalar, bodies: &mut BodyView<'_>) -> Scalar {
            if self.halt.is_some() {
                return 0.0;
            }
            self.halt = Some("test stall".to_string());
            self.inner.evolve(duration, bodies)
        }
        fn velocity(&self, index: usize) -> Result<Vector> {
            self.inner.velocity(index)
        }
        fn set_velocity(&mut self, index: usize, velocity: Vector) -> Result<()> {
            self.inner.set_velocity(index, velocity)
        }
        fn acceleration(&self, index: usize) -> Vector {
            self.inner.acceleration(index)
        }
        fn energy(&self, mass: &[Scalar], position: &[Vector], flags: &[BodyFlags]) -> Scalar {
            self.inner.energy(mass, position, flags)
        }
        fn initial_energy(&self) -> Scalar {
            self.inner.initial_energy()
        }
        fn halted(&self) -> Option<&str> {
            self.halt.as_deref()
        }
    }

    fn build_stalling(force: Option<SharedForceLaw>) -> Box<dyn NBodyIntegrator> {
        Box::new(Stalling {
            inner: Leapfrog::new(force),
            halt: None,
        })
    }

    #[test]
    fn test_step_fails_once_integrator_halts() {
        let registry = IntegratorRegistry::new().with_integrator(IntegratorEntry {
            name: "stalling",
            aliases: &[],
            description: "test",
            construct: build_stalling,
        });
        let options = EngineOptions {
            integrator: "stalling".to_string(),
            seed: Some(7),
            ..EngineOptions::default()
        };
        let mut engine = Engine::new(&options, ScaleState::default(), &registry).unwrap();
        engine.register_body(BodyDesc::new(1.0, Vector::ZERO, Vector::ZERO)).unwrap();
        engine
            .register_body(BodyDesc::new(0.001, Vector::X, Vector::new(0.0, 1.0, 0.0)))
            .unwrap();
        engine.start().unwrap();

        assert!(matches!(engine.step(1.0 / 60.0), Err(EngineError::Regularization(_))));
        let (world, physical) = (engine.world_time(), engine.physical_time());

        // later calls keep failing and leave the clocks alone
        assert!(matches!(engine.step(1.0 / 60.0), Err(EngineError::Regularization(_))));
        assert_eq!(engine.world_time(), world);
        assert_eq!(engine.physical_time(), physical);
    }

    #[test]
    fn test_identical_scale_is_noop() {
        let mut engine = engine_with("leapfrog");
        let scale = ScaleState::derive(UnitSystem::Solar, 10.0, 2.0, 1.0, 1.0).unwrap();
        engine.set_scale(scale).unwrap();
        let id = engine
            .register_body(BodyDesc::new(1.0, Vector::X, Vector::Y))
            .unwrap();
        let mass = engine.mass(id).unwrap();
        let velocity = engine.velocity(id).unwrap();

        engine.set_scale(scale).unwrap();
        assert_eq!(engine.scale().mass_scale(), scale.mass_scale());
        assert_eq!(engine.mass(id).unwrap(), mass);
        assert_eq!(engine.velocity(id).unwrap(), velocity);
    }

    #[test]
    fn test_rescale_keeps_user_state() {
        let mut engine = engine_with("leapfrog");
        let id = engine
            .register_body(BodyDesc::new(2.0, Vector::new(3.0, 0.0, 0.0), Vector::new(0.0, 1.5, 0.0)))
            .unwrap();
        let scale = ScaleState::derive(UnitSystem::Dimensionless, 4.0, 1.0, 5.0, 2.0).unwrap();
        engine.set_scale(scale).unwrap();

        assert_eq!(engine.mass(id).unwrap(), 10.0);
        assert_eq!(engine.position(id).unwrap(), Vector::new(6.0, 0.0, 0.0));
        assert_eq!(engine.scaled_velocity(id).unwrap(), Vector::new(0.0, 1.5, 0.0));
    }

    #[test]
    fn test_orbit_initial_condition() {
        let mut engine = engine_with("leapfrog");
        let sun = engine
            .register_body(BodyDesc::new(1.0, Vector::new(1.0, 1.0, 0.0), Vector::ZERO))
            .unwrap();
        let planet = engine
            .register_body(BodyDesc::orbiting(1e-6, sun, OrbitElements::circular(2.0)))
            .unwrap();

        let data = engine.orbit_data(planet, sun).unwrap();
        assert!((data.semi_major_axis - 2.0).abs() < 1e-9);
        assert!(data.eccentricity < 1e-9);
        assert!(matches!(
            engine.register_body(BodyDesc::orbiting(1.0, BodyId(99), OrbitElements::circular(1.0))),
            Err(EngineError::UnknownBody(_))
        ));
    }

    #[test]
    fn test_fixed_body_follows_kepler() {
        let mut engine = engine_with("leapfrog");
        let sun = engine.register_body(BodyDesc::new(1.0, Vector::ZERO, Vector::ZERO)).unwrap();
        let moon = engine
            .register_body(
                BodyDesc::new(0.0, Vector::ZERO, Vector::ZERO)
                    .with_fixed_motion(Box::new(KeplerOrbit::new(OrbitElements::circular(1.0), sun))),
            )
            .unwrap();
        assert_eq!(engine.slot(moon).unwrap().kind, BodyKind::Massive);
        assert!(engine.massive.flag(engine.slot(moon).unwrap().index).is_fixed());

        engine.start().unwrap();
        assert!((engine.position(moon).unwrap().length() - 1.0).abs() < 1e-9);
        for _ in 0..60 {
            engine.step(1.0 / 60.0).unwrap();
        }
        let position = engine.position(moon).unwrap() - engine.position(sun).unwrap();
        assert!((position.length() - 1.0).abs() < 1e-3);
        assert!(position.distance(Vector::X) > 0.1);
        assert!((engine.velocity(moon).unwrap().length() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_center_of_mass_skips_inactive() {
        let mut engine = engine_with("leapfrog");
        engine
            .register_body(BodyDesc::new(1.0, Vector::new(-1.0, 0.0, 0.0), Vector::new(0.0, 1.0, 0.0)))
            .unwrap();
        let b = engine
            .register_body(BodyDesc::new(3.0, Vector::new(1.0, 0.0, 0.0), Vector::ZERO))
            .unwrap();
        assert_eq!(engine.world_center_of_mass(), Vector::new(0.5, 0.0, 0.0));
        assert_eq!(engine.world_center_of_mass_velocity().unwrap(), Vector::new(0.0, 0.25, 0.0));

        engine.deactivate_body(b).unwrap();
        assert_eq!(engine.world_center_of_mass(), Vector::new(-1.0, 0.0, 0.0));
        engine.reactivate_body(b).unwrap();
        assert!(engine.is_active(b).unwrap());
    }
}
