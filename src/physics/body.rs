//! Body identities, flags and the massive-body registry arrays

use crate::physics::math::{Scalar, Vector, finite_or_zero, finite_vector};
use std::fmt;

/// Stable handle for a registered body.
///
/// Unlike an array slot, a `BodyId` survives shuffle removals of other bodies;
/// the engine maps it to the current slot on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub(crate) u64);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

/// Which evolver owns a body's dynamic state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKind {
    Massive,
    Massless,
}

/// Current location of a body inside the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub kind: BodyKind,
    pub index: usize,
}

/// Per-body flag bits shared with the integrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BodyFlags(u8);

impl BodyFlags {
    pub const NONE: BodyFlags = BodyFlags(0);
    /// Skipped as both source and subject of force
    pub const INACTIVE: BodyFlags = BodyFlags(1);
    /// Moved by a closed-form rule, still a source of force
    pub const FIXED_MOTION: BodyFlags = BodyFlags(2);

    pub fn contains(self, other: BodyFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn intersects(self, other: BodyFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: BodyFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: BodyFlags) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_inactive(self) -> bool {
        self.contains(BodyFlags::INACTIVE)
    }

    pub fn is_fixed(self) -> bool {
        self.contains(BodyFlags::FIXED_MOTION)
    }

    /// Neither inactive nor fixed: the integrator owns this body's motion
    pub fn is_free(self) -> bool {
        !self.intersects(BodyFlags::INACTIVE.union(BodyFlags::FIXED_MOTION))
    }

    pub const fn union(self, other: BodyFlags) -> BodyFlags {
        BodyFlags(self.0 | other.0)
    }
}

/// Mutable view of the registry arrays handed to an integrator for one call.
pub struct BodyView<'a> {
    pub mass: &'a [Scalar],
    pub position: &'a mut [Vector],
    pub flags: &'a [BodyFlags],
}

impl BodyView<'_> {
    pub fn len(&self) -> usize {
        self.mass.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mass.is_empty()
    }
}

/// Parallel arrays of massive-body state, indexed by slot.
///
/// Capacity is tracked explicitly so the engine can grow the registry and the
/// active integrator's own arrays in the same step.
#[derive(Debug, Default)]
pub struct MassiveBodies {
    mass: Vec<Scalar>,
    position: Vec<Vector>,
    flags: Vec<BodyFlags>,
    capture_radius2: Vec<Scalar>,
    ids: Vec<BodyId>,
    capacity: usize,
}

impl MassiveBodies {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            mass: Vec::with_capacity(capacity),
            position: Vec::with_capacity(capacity),
            flags: Vec::with_capacity(capacity),
            capture_radius2: Vec::with_capacity(capacity),
            ids: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.mass.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mass.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn grow(&mut self, by: usize) {
        self.capacity += by;
        let additional = self.capacity - self.len();
        self.mass.reserve(additional);
        self.position.reserve(additional);
        self.flags.reserve(additional);
        self.capture_radius2.reserve(additional);
        self.ids.reserve(additional);
    }

    /// Appends a body and returns its slot index. Caller ensures capacity.
    pub fn push(
        &mut self,
        id: BodyId,
        mass: Scalar,
        position: Vector,
        flags: BodyFlags,
        capture_radius: Scalar,
    ) -> usize {
        self.mass.push(finite_or_zero(mass));
        self.position.push(finite_vector(position));
        self.flags.push(flags);
        self.capture_radius2.push(capture_radius * capture_radius);
        self.ids.push(id);
        self.len() - 1
    }

    /// Removes `index` by shifting the tail down one slot.
    ///
    /// Returns the ids of every body whose slot changed, in their new order
    /// starting at `index`.
    pub fn remove(&mut self, index: usize) -> Vec<BodyId> {
        self.mass.remove(index);
        self.position.remove(index);
        self.flags.remove(index);
        self.capture_radius2.remove(index);
        self.ids.remove(index);
        self.ids[index..].to_vec()
    }

    pub fn view_mut(&mut self) -> BodyView<'_> {
        BodyView {
            mass: &self.mass,
            position: &mut self.position,
            flags: &self.flags,
        }
    }

    pub fn masses(&self) -> &[Scalar] {
        &self.mass
    }

    pub fn positions(&self) -> &[Vector] {
        &self.position
    }

    pub fn flags(&self) -> &[BodyFlags] {
        &self.flags
    }

    pub fn capture_radii_squared(&self) -> &[Scalar] {
        &self.capture_radius2
    }

    pub fn ids(&self) -> &[BodyId] {
        &self.ids
    }

    pub fn mass(&self, index: usize) -> Scalar {
        self.mass[index]
    }

    pub fn set_mass(&mut self, index: usize, mass: Scalar) {
        self.mass[index] = finite_or_zero(mass);
    }

    pub fn position(&self, index: usize) -> Vector {
        self.position[index]
    }

    pub fn set_position(&mut self, index: usize, position: Vector) {
        self.position[index] = finite_vector(position);
    }

    pub fn capture_radius(&self, index: usize) -> Scalar {
        libm::sqrt(self.capture_radius2[index])
    }

    pub fn set_capture_radius(&mut self, index: usize, capture_radius: Scalar) {
        self.capture_radius2[index] = capture_radius * capture_radius;
    }

    pub fn flag(&self, index: usize) -> BodyFlags {
        self.flags[index]
    }

    pub fn insert_flag(&mut self, index: usize, flag: BodyFlags) {
        self.flags[index].insert(flag);
    }

    pub fn remove_flag(&mut self, index: usize, flag: BodyFlags) {
        self.flags[index].remove(flag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_operations() {
        let mut flags = BodyFlags::NONE;
        assert!(flags.is_free());

        flags.insert(BodyFlags::FIXED_MOTION);
        assert!(flags.is_fixed());
        assert!(!flags.is_inactive());
        assert!(!flags.is_free());

        flags.insert(BodyFlags::INACTIVE);
        flags.remove(BodyFlags::FIXED_MOTION);
        assert!(flags.is_inactive());
        assert!(!flags.is_fixed());

        flags.remove(BodyFlags::INACTIVE);
        assert!(flags.is_empty());
    }

    #[test]
    fn test_remove_shifts_tail() {
        let mut bodies = MassiveBodies::with_capacity(4);
        for i in 0..4 {
            bodies.push(
                BodyId(i),
                i as Scalar + 1.0,
                Vector::splat(i as Scalar),
                BodyFlags::NONE,
                0.5,
            );
        }

        let moved = bodies.remove(1);
        assert_eq!(moved, vec![BodyId(2), BodyId(3)]);
        assert_eq!(bodies.masses(), &[1.0, 3.0, 4.0]);
        assert_eq!(bodies.position(1), Vector::splat(2.0));
        assert_eq!(bodies.capture_radii_squared()[0], 0.25);
    }

    #[test]
    fn test_non_finite_inputs_are_zeroed() {
        let mut bodies = MassiveBodies::with_capacity(1);
        bodies.push(
            BodyId(0),
            Scalar::NAN,
            Vector::new(Scalar::INFINITY, 1.0, 2.0),
            BodyFlags::NONE,
            0.0,
        );
        assert_eq!(bodies.mass(0), 0.0);
        assert_eq!(bodies.position(0), Vector::new(0.0, 1.0, 2.0));
    }

    #[test]
    fn test_grow_extends_capacity() {
        let mut bodies = MassiveBodies::with_capacity(1);
        bodies.push(BodyId(0), 1.0, Vector::ZERO, BodyFlags::NONE, 0.0);
        assert!(bodies.is_full());
        bodies.grow(10);
        assert_eq!(bodies.capacity(), 11);
        assert!(!bodies.is_full());
    }
}
