//! Particle swarms evolved in the field of the massive bodies
//!
//! A swarm mirrors the particles of an external emitter in physics-space
//! arrays. Emitters create particles, expire them and recycle their slots on
//! their own schedule; the swarm notices this by comparing each slot's
//! generation seed with the one it saw last tick.
//!
//! * A slot whose index is beyond last tick's count is a new particle.
//! * A live slot whose seed changed to a seed seen elsewhere was shuffled down
//!   by the emitter, so its physics state is copied from the old slot.
//! * A live slot whose seed changed to an unknown seed was recycled into a new
//!   particle and is re-seeded.
//!
//! Particles are never sources of gravity. A particle that comes within a
//! massive body's capture radius is deactivated and the emitter is asked to
//! retire it.

pub mod initializers;

use crate::physics::force::{SharedForceLaw, pair_coefficient};
use crate::physics::massless::FieldSources;
use crate::physics::math::{Scalar, Vector, finite_vector};
use bevy::log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

pub use initializers::{DustBall, ExplosionInitializer, ExplosionParams, ExplosionSource};

/// Softening added to r³ (or r for a custom law)
pub const PARTICLE_EPSILON: Scalar = 1e-4;

/// Emitter durations above this are reported as a configuration warning.
pub const MAX_SENSIBLE_DURATION: Scalar = 9999.0;

/// Handle for a registered swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwarmId(pub(crate) u64);

impl fmt::Display for SwarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "swarm#{}", self.0)
    }
}

/// Coordinate space the emitter reports particle positions in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulationSpace {
    #[default]
    World,
    Local,
}

/// One particle as currently reported by an emitter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmittedParticle {
    /// World-space position
    pub position: Vector,
    /// Emission velocity (physics units)
    pub velocity: Vector,
    /// Changes whenever the emitter reuses the slot for a new particle
    pub seed: u32,
}

/// External particle system whose particles are moved by the engine.
///
/// Live particles always occupy slots `0..particle_count()`.
pub trait ParticleEmitter: Send + Sync {
    fn particle_count(&self) -> usize;

    fn max_particles(&self) -> usize;

    fn particle(&self, index: usize) -> EmittedParticle;

    /// Number of particles emitted in bursts. Equal to
    /// [`max_particles`](Self::max_particles) for a one-shot swarm.
    fn burst_total(&self) -> usize;

    /// Expire the particle at `index`; it has been captured.
    fn retire(&mut self, index: usize);

    /// Receives the evolved world-space position of the particle at `index`.
    fn set_position(&mut self, index: usize, position: Vector);

    fn simulation_space(&self) -> SimulationSpace {
        SimulationSpace::World
    }

    /// Configured lifetime of the emitter
    fn duration(&self) -> Scalar {
        0.0
    }
}

/// Supplies physics-space initial conditions for newly created particles.
pub trait ParticleInitializer: Send + Sync {
    /// Fills `position[i]` and `velocity[i]` for every `i` in `range`.
    fn init_particles(&mut self, range: Range<usize>, position: &mut [Vector], velocity: &mut [Vector]);
}

/// Per-tick inputs a swarm needs besides the massive-body arrays
#[derive(Debug, Clone, Copy)]
pub struct SwarmContext {
    pub physics_to_world: Scalar,
    /// Added to emitter velocities when no initializer is present
    pub source_velocity: Vector,
}

/// One-shot emitter that releases all of its particles at once.
///
/// Used for explosion ejecta and by headless runs; particles live until they
/// are captured.
#[derive(Debug, Clone)]
pub struct BurstEmitter {
    position: Vec<Vector>,
    alive: Vec<bool>,
}

impl BurstEmitter {
    pub fn new(count: usize, world_position: Vector) -> Self {
        Self {
            position: vec![world_position; count],
            alive: vec![true; count],
        }
    }

    pub fn position(&self, index: usize) -> Vector {
        self.position[index]
    }

    pub fn alive_count(&self) -> usize {
        self.alive.iter().filter(|alive| **alive).count()
    }
}

impl ParticleEmitter for BurstEmitter {
    fn particle_count(&self) -> usize {
        self.position.len()
    }

    fn max_particles(&self) -> usize {
        self.position.len()
    }

    fn particle(&self, index: usize) -> EmittedParticle {
        EmittedParticle {
            position: self.position[index],
            velocity: Vector::ZERO,
            seed: index as u32,
        }
    }

    fn burst_total(&self) -> usize {
        self.position.len()
    }

    fn retire(&mut self, index: usize) {
        self.alive[index] = false;
    }

    fn set_position(&mut self, index: usize, position: Vector) {
        self.position[index] = position;
    }
}

/// Physics-side mirror of one emitter
pub struct ParticleSwarm {
    emitter: Box<dyn ParticleEmitter>,
    initializer: Option<Box<dyn ParticleInitializer>>,
    initial_velocity: Vector,
    dt: Scalar,
    force: Option<SharedForceLaw>,
    position: Vec<Vector>,
    velocity: Vec<Vector>,
    acceleration: Vec<Vector>,
    seed: Vec<u32>,
    inactive: Vec<bool>,
    slot_by_seed: HashMap<u32, usize>,
    particle_count: usize,
    last_particle_count: usize,
    inactive_count: usize,
    one_shot: bool,
    all_inactive: bool,
}

impl ParticleSwarm {
    /// Mirrors `emitter`. Configuration problems are logged, not rejected.
    pub fn new(
        emitter: Box<dyn ParticleEmitter>,
        initializer: Option<Box<dyn ParticleInitializer>>,
        initial_velocity: Vector,
        dt: Scalar,
        force: Option<SharedForceLaw>,
    ) -> Self {
        if emitter.simulation_space() == SimulationSpace::Local {
            warn!("Particle simulation space must be world; local positions will be misread");
        }
        if emitter.duration() > MAX_SENSIBLE_DURATION {
            warn!(
                "Particle emitter duration {} exceeds {}; early particles may never be visible",
                emitter.duration(),
                MAX_SENSIBLE_DURATION
            );
        }

        let max = emitter.max_particles();
        let one_shot = emitter.burst_total() == max;
        debug!("New particle swarm: max = {}, one-shot = {}", max, one_shot);

        Self {
            emitter,
            initializer,
            initial_velocity,
            dt,
            force,
            position: vec![Vector::ZERO; max],
            velocity: vec![Vector::ZERO; max],
            acceleration: vec![Vector::ZERO; max],
            seed: vec![0; max],
            inactive: vec![false; max],
            slot_by_seed: HashMap::new(),
            particle_count: 0,
            last_particle_count: 0,
            inactive_count: 0,
            one_shot,
            all_inactive: false,
        }
    }

    pub fn is_one_shot(&self) -> bool {
        self.one_shot
    }

    /// True once every particle of a finished one-shot swarm is inactive
    pub fn all_inactive(&self) -> bool {
        self.all_inactive
    }

    pub fn particle_count(&self) -> usize {
        self.particle_count
    }

    pub fn inactive_count(&self) -> usize {
        self.inactive_count
    }

    pub fn is_active(&self, index: usize) -> bool {
        !self.inactive[index]
    }

    pub fn position(&self, index: usize) -> Vector {
        self.position[index]
    }

    pub fn velocity(&self, index: usize) -> Vector {
        self.velocity[index]
    }

    pub fn emitter(&self) -> &dyn ParticleEmitter {
        self.emitter.as_ref()
    }

    pub fn set_force(&mut self, force: Option<SharedForceLaw>) {
        self.force = force;
    }

    fn seed_range(&mut self, range: Range<usize>, ctx: &SwarmContext) {
        if let Some(initializer) = self.initializer.as_mut() {
            initializer.init_particles(range.clone(), &mut self.position, &mut self.velocity);
        } else {
            let base_velocity = ctx.source_velocity + self.initial_velocity;
            for i in range.clone() {
                let particle = self.emitter.particle(i);
                self.position[i] = finite_vector(particle.position / ctx.physics_to_world);
                self.velocity[i] = finite_vector(base_velocity + particle.velocity);
            }
        }
        for i in range {
            self.inactive[i] = false;
        }
    }

    fn seed_accelerations(&mut self, range: Range<usize>, sources: FieldSources<'_>) {
        for i in range {
            self.acceleration[i] =
                sources.acceleration_at(self.position[i], self.force.as_ref(), PARTICLE_EPSILON);
        }
    }

    /// Detects created, shuffled and recycled particles since the last tick.
    fn handle_lifecycle(&mut self, sources: FieldSources<'_>, ctx: &SwarmContext) {
        let max = self.position.len();
        self.particle_count = self.emitter.particle_count().min(max);
        let count = self.particle_count;

        if self.last_particle_count < count {
            let created = self.last_particle_count..count;
            self.seed_range(created.clone(), ctx);
            self.seed_accelerations(created.clone(), sources);
            for i in created {
                let seed = self.emitter.particle(i).seed;
                self.seed[i] = seed;
                self.slot_by_seed.insert(seed, i);
            }
            self.last_particle_count = count;
        }

        if self.one_shot {
            return;
        }

        for i in 0..count {
            let seed = self.emitter.particle(i).seed;
            if self.seed[i] == seed {
                continue;
            }
            if self.slot_by_seed.get(&self.seed[i]) == Some(&i) {
                self.slot_by_seed.remove(&self.seed[i]);
            }
            if let Some(&old) = self.slot_by_seed.get(&seed) {
                self.position[i] = self.position[old];
                self.velocity[i] = self.velocity[old];
                self.acceleration[i] = self.acceleration[old];
                debug!("Particle shuffled from slot {} to {}", old, i);
            } else {
                self.seed_range(i..i + 1, ctx);
                self.seed_accelerations(i..i + 1, sources);
                debug!("Particle slot {} recycled", i);
            }
            self.slot_by_seed.insert(seed, i);
            self.seed[i] = seed;
            self.inactive[i] = false;
        }
    }

    /// Runs the lifecycle check, then leapfrog steps until at least `duration`
    /// is covered. Returns the time evolved.
    pub fn evolve(&mut self, duration: Scalar, sources: FieldSources<'_>, ctx: &SwarmContext) -> Scalar {
        if self.all_inactive {
            return duration;
        }
        self.handle_lifecycle(sources, ctx);
        if sources.is_empty() && self.particle_count == 0 {
            return duration;
        }

        let dt = self.dt;
        let half_dt = dt / 2.0;
        let count = self.particle_count;
        let law = self.force.as_ref().map(|law| law.as_ref());
        let mut time = 0.0;

        while time < duration {
            time += dt;
            for i in 0..count {
                if !self.inactive[i] {
                    self.velocity[i] += self.acceleration[i] * half_dt;
                    self.position[i] += self.velocity[i] * dt;
                }
            }

            self.acceleration[..count].fill(Vector::ZERO);
            for i in 0..sources.mass.len() {
                if sources.flags[i].is_inactive() {
                    continue;
                }
                for j in 0..count {
                    if self.inactive[j] {
                        continue;
                    }
                    let rji = self.position[j] - sources.position[i];
                    let r2 = rji.length_squared();
                    if r2 < sources.capture_radius2[i] {
                        self.inactive[j] = true;
                        self.inactive_count += 1;
                        self.emitter.retire(j);
                        continue;
                    }
                    let c = pair_coefficient(law, r2, PARTICLE_EPSILON);
                    self.acceleration[j] -= rji * (sources.mass[i] * c);
                }
            }

            for i in 0..count {
                if !self.inactive[i] {
                    self.velocity[i] += self.acceleration[i] * half_dt;
                }
            }
        }

        time
    }

    /// Pushes world positions back to the emitter and retires a finished
    /// one-shot swarm.
    pub fn write_back(&mut self, physics_to_world: Scalar) {
        if self.all_inactive {
            return;
        }
        for i in 0..self.last_particle_count {
            self.emitter.set_position(i, self.position[i] * physics_to_world);
        }

        let burst_done = self.particle_count >= self.emitter.burst_total();
        if self.one_shot && burst_done && self.inactive_count >= self.particle_count {
            self.all_inactive = true;
            debug!("All {} particles of one-shot swarm inactive", self.particle_count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::BodyFlags;

    const CTX: SwarmContext = SwarmContext {
        physics_to_world: 1.0,
        source_velocity: Vector::ZERO,
    };

    /// Emitter with explicit slots so tests can recycle and shuffle particles
    struct ScriptedEmitter {
        particles: Vec<EmittedParticle>,
        count: usize,
        max: usize,
        burst: usize,
        retired: Vec<usize>,
    }

    impl ScriptedEmitter {
        fn new(max: usize, burst: usize) -> Self {
            Self {
                particles: vec![
                    EmittedParticle {
                        position: Vector::ZERO,
                        velocity: Vector::ZERO,
                        seed: 0,
                    };
                    max
                ],
                count: 0,
                max,
                burst,
                retired: Vec::new(),
            }
        }
    }

    impl ParticleEmitter for ScriptedEmitter {
        fn particle_count(&self) -> usize {
            self.count
        }
        fn max_particles(&self) -> usize {
            self.max
        }
        fn particle(&self, index: usize) -> EmittedParticle {
            self.particles[index]
        }
        fn burst_total(&self) -> usize {
            self.burst
        }
        fn retire(&mut self, index: usize) {
            self.retired.push(index);
        }
        fn set_position(&mut self, index: usize, position: Vector) {
            self.particles[index].position = position;
        }
    }

    fn sun<'a>(mass: &'a [Scalar], position: &'a [Vector], flags: &'a [BodyFlags], r2: &'a [Scalar]) -> FieldSources<'a> {
        FieldSources {
            mass,
            position,
            flags,
            capture_radius2: r2,
        }
    }

    #[test]
    fn test_burst_particles_fall_in_and_are_captured() {
        let mut emitter = BurstEmitter::new(4, Vector::ZERO);
        for i in 0..4 {
            emitter.set_position(i, Vector::new(1.0 + i as Scalar * 0.1, 0.0, 0.0));
        }
        let mut swarm = ParticleSwarm::new(Box::new(emitter), None, Vector::ZERO, 0.001, None);
        assert!(swarm.is_one_shot());

        let (mass, position, flags, r2) = ([1.0], [Vector::ZERO], [BodyFlags::NONE], [0.25]);
        let sources = sun(&mass, &position, &flags, &r2);

        for _ in 0..200 {
            swarm.evolve(0.01, sources, &CTX);
            swarm.write_back(1.0);
        }

        assert_eq!(swarm.inactive_count(), 4);
        assert!(swarm.all_inactive());
        assert_eq!(swarm.evolve(0.5, sources, &CTX), 0.5);
    }

    #[test]
    fn test_new_particles_take_emitter_state() {
        let mut emitter = ScriptedEmitter::new(4, 0);
        emitter.count = 2;
        emitter.particles[0] = EmittedParticle {
            position: Vector::new(10.0, 0.0, 0.0),
            velocity: Vector::new(0.0, 0.3, 0.0),
            seed: 11,
        };
        emitter.particles[1] = EmittedParticle {
            position: Vector::new(0.0, 10.0, 0.0),
            velocity: Vector::ZERO,
            seed: 12,
        };
        let mut swarm = ParticleSwarm::new(Box::new(emitter), None, Vector::new(0.0, 0.0, 1.0), 0.01, None);
        assert!(!swarm.is_one_shot());

        let ctx = SwarmContext {
            physics_to_world: 2.0,
            source_velocity: Vector::new(1.0, 0.0, 0.0),
        };
        let sources = sun(&[], &[], &[], &[]);
        swarm.evolve(0.01, sources, &ctx);

        assert_eq!(swarm.particle_count(), 2);
        // world 10 / physics_to_world 2, plus one step of drift
        assert!((swarm.position(0).x - 5.01).abs() < 1e-9);
        assert_eq!(swarm.velocity(0), Vector::new(1.0, 0.3, 1.0));
    }

    #[test]
    fn test_recycled_slot_is_reseeded() {
        let mut emitter = ScriptedEmitter::new(2, 0);
        emitter.count = 1;
        emitter.particles[0] = EmittedParticle {
            position: Vector::new(5.0, 0.0, 0.0),
            velocity: Vector::new(1.0, 0.0, 0.0),
            seed: 1,
        };
        let mut swarm = ParticleSwarm::new(Box::new(emitter), None, Vector::ZERO, 0.1, None);
        let sources = sun(&[], &[], &[], &[]);
        swarm.evolve(1.0, sources, &CTX);
        assert!(swarm.position(0).x > 5.9);

        // The emitter reuses slot 0 for a new particle at the origin.
        let mut recycled = ScriptedEmitter::new(2, 0);
        recycled.count = 1;
        recycled.particles[0] = EmittedParticle {
            position: Vector::ZERO,
            velocity: Vector::ZERO,
            seed: 2,
        };
        swarm.emitter = Box::new(recycled);
        swarm.evolve(0.1, sources, &CTX);
        assert_eq!(swarm.position(0), Vector::ZERO);
    }

    #[test]
    fn test_shuffled_slot_keeps_physics_state() {
        let mut emitter = ScriptedEmitter::new(3, 0);
        emitter.count = 2;
        emitter.particles[0] = EmittedParticle {
            position: Vector::new(1.0, 0.0, 0.0),
            velocity: Vector::ZERO,
            seed: 1,
        };
        emitter.particles[1] = EmittedParticle {
            position: Vector::new(7.0, 0.0, 0.0),
            velocity: Vector::new(0.0, 2.0, 0.0),
            seed: 2,
        };
        let mut swarm = ParticleSwarm::new(Box::new(emitter), None, Vector::ZERO, 0.1, None);
        let sources = sun(&[], &[], &[], &[]);
        swarm.evolve(0.1, sources, &CTX);
        let moved_position = swarm.position(1);

        // particle 0 expires; the emitter moves particle 1 down into slot 0
        let mut shuffled = ScriptedEmitter::new(3, 0);
        shuffled.count = 1;
        shuffled.particles[0] = EmittedParticle {
            position: Vector::new(99.0, 0.0, 0.0),
            velocity: Vector::ZERO,
            seed: 2,
        };
        swarm.emitter = Box::new(shuffled);
        swarm.evolve(0.1, sources, &CTX);

        assert!(swarm.position(0).distance(moved_position + Vector::new(0.0, 0.2, 0.0)) < 1e-9);
    }

    #[test]
    fn test_initializer_overrides_emitter() {
        struct Fixed;
        impl ParticleInitializer for Fixed {
            fn init_particles(&mut self, range: Range<usize>, position: &mut [Vector], velocity: &mut [Vector]) {
                for i in range {
                    position[i] = Vector::new(3.0, 0.0, 0.0);
                    velocity[i] = Vector::ZERO;
                }
            }
        }

        let mut emitter = ScriptedEmitter::new(1, 1);
        emitter.count = 1;
        let mut swarm = ParticleSwarm::new(Box::new(emitter), Some(Box::new(Fixed)), Vector::X, 0.01, None);
        let sources = sun(&[], &[], &[], &[]);
        swarm.evolve(0.01, sources, &CTX);
        assert_eq!(swarm.position(0), Vector::new(3.0, 0.0, 0.0));
    }
}
