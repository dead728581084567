//! Error types for the gravitas engine

use crate::physics::body::BodyId;
use crate::physics::particles::SwarmId;
use thiserror::Error;

/// Errors raised by the engine and its integrators.
///
/// Configuration errors (`ZeroScale`, `IntegratorLocked`, `BodyLimit`) leave the
/// engine in a non-evolving state. Everything else rejects the single call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("{name} must be strictly positive")]
    ZeroScale { name: &'static str },

    #[error("cannot change the integrator while the engine is evolving")]
    IntegratorLocked,

    #[error("{integrator} is limited to {limit} bodies")]
    BodyLimit {
        integrator: &'static str,
        limit: usize,
    },

    #[error("{integrator} cannot grow its arrays")]
    GrowthRefused { integrator: &'static str },

    #[error("{operation} is not supported by {integrator}")]
    Unsupported {
        integrator: &'static str,
        operation: &'static str,
    },

    #[error("unknown body {0:?}")]
    UnknownBody(BodyId),

    #[error("unknown particle swarm {0:?}")]
    UnknownSwarm(SwarmId),

    #[error("unknown integrator '{0}'")]
    UnknownIntegrator(String),

    #[error("unknown force law '{0}'")]
    UnknownForceLaw(String),

    #[error("the engine is already evolving")]
    AlreadyEvolving,

    #[error("the engine has not been started")]
    NotEvolving,

    #[error("regularization failed: {0}")]
    Regularization(String),

    #[error("invalid orbit: {0}")]
    InvalidOrbit(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, EngineError>;
