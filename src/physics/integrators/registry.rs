//! Registry pattern for selecting an integrator by name
//!
//! Integrators carry per-body state, so the registry stores constructors rather
//! than instances. Each entry describes itself with a canonical name and a set of
//! aliases; the registry builds its lookup table from that metadata and hands
//! out a fresh, empty integrator on every `create`.

use super::{AztTriple, Hermite, Leapfrog, NBodyIntegrator};
use crate::physics::force::SharedForceLaw;
use bevy::prelude::*;
use std::collections::{HashMap, HashSet};

/// Builds an empty integrator using the given force law (`None` is Newtonian).
pub type IntegratorConstructor = fn(Option<SharedForceLaw>) -> Box<dyn NBodyIntegrator>;

/// Self-description of one selectable integrator
#[derive(Clone, Copy)]
pub struct IntegratorEntry {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub description: &'static str,
    pub construct: IntegratorConstructor,
}

impl IntegratorEntry {
    pub const LEAPFROG: IntegratorEntry = IntegratorEntry {
        name: "leapfrog",
        aliases: &["lf", "kdk"],
        description: "fixed-step symplectic kick-drift-kick",
        construct: build_leapfrog,
    };

    pub const HERMITE: IntegratorEntry = IntegratorEntry {
        name: "hermite",
        aliases: &["hermite4", "hermite8"],
        description: "adaptive 4th-order predictor-corrector",
        construct: build_hermite,
    };

    /// The regularized scheme is Newtonian by construction and ignores the law.
    pub const AZT: IntegratorEntry = IntegratorEntry {
        name: "azt",
        aliases: &["aztriple", "regularized"],
        description: "regularized three-body (exactly three bodies)",
        construct: build_azt,
    };
}

fn build_leapfrog(force: Option<SharedForceLaw>) -> Box<dyn NBodyIntegrator> {
    Box::new(Leapfrog::new(force))
}

fn build_hermite(force: Option<SharedForceLaw>) -> Box<dyn NBodyIntegrator> {
    Box::new(Hermite::new(force))
}

fn build_azt(_force: Option<SharedForceLaw>) -> Box<dyn NBodyIntegrator> {
    Box::new(AztTriple::new())
}

/// Registry for runtime integrator selection
#[derive(Resource)]
pub struct IntegratorRegistry {
    /// Maps names (canonical and aliases) to entries
    integrators: HashMap<String, IntegratorEntry>,
}

impl IntegratorRegistry {
    /// Create an empty registry without any pre-registered integrators.
    pub fn new() -> Self {
        Self {
            integrators: HashMap::new(),
        }
    }

    /// Register the built-in integrators.
    ///
    /// Returns self for method chaining.
    pub fn with_standard_integrators(mut self) -> Self {
        self.register_integrator(IntegratorEntry::LEAPFROG);
        self.register_integrator(IntegratorEntry::HERMITE);
        self.register_integrator(IntegratorEntry::AZT);
        self
    }

    pub fn with_integrator(mut self, entry: IntegratorEntry) -> Self {
        self.register_integrator(entry);
        self
    }

    pub fn register_integrator(&mut self, entry: IntegratorEntry) {
        self.integrators.insert(entry.name.to_string(), entry);
        for alias in entry.aliases {
            self.integrators.insert(alias.to_string(), entry);
        }
    }

    /// Canonical name for `name` if it is registered (directly or as alias)
    pub fn resolve(&self, name: &str) -> Option<&'static str> {
        self.integrators.get(name).map(|entry| entry.name)
    }

    pub fn create(
        &self,
        name: &str,
        force: Option<SharedForceLaw>,
    ) -> Result<Box<dyn NBodyIntegrator>, String> {
        self.integrators
            .get(name)
            .map(|entry| (entry.construct)(force))
            .ok_or_else(|| {
                let available = self.list_available();
                let aliases = self.list_aliases();
                let alias_names: Vec<String> = aliases.iter().map(|(a, _)| a.clone()).collect();
                format!(
                    "Unknown integrator: '{}'. Available integrators: {}. Aliases: {}",
                    name,
                    available.join(", "),
                    alias_names.join(", ")
                )
            })
    }

    pub fn describe(&self, name: &str) -> Option<&'static str> {
        self.integrators.get(name).map(|entry| entry.description)
    }

    pub fn list_available(&self) -> Vec<String> {
        let canonical: HashSet<&str> = self.integrators.values().map(|entry| entry.name).collect();
        let mut names: Vec<String> = canonical.into_iter().map(str::to_string).collect();
        names.sort();
        names
    }

    pub fn list_aliases(&self) -> Vec<(String, String)> {
        let mut aliases: Vec<(String, String)> = self
            .integrators
            .iter()
            .filter(|(key, entry)| key.as_str() != entry.name)
            .map(|(key, entry)| (key.clone(), entry.name.to_string()))
            .collect();

        aliases.sort_by(|a, b| a.0.cmp(&b.0));
        aliases
    }
}

impl Default for IntegratorRegistry {
    fn default() -> Self {
        Self::new().with_standard_integrators()
    }
}
