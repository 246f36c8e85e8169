use std::fmt;

use crate::floating_type_mod::FT;

/// Fatal simulation errors. Recoverable per-particle conditions (an
/// infeasible local redistribution system) are absorbed where they occur
/// and never surface through this type.
#[derive(Debug, Clone)]
pub enum SimError {
    /// Malformed or missing configuration fields.
    Config(String),
    /// The initial state cannot produce a meaningful run.
    Init(String),
    /// The boundary element solve failed.
    Solver(String),
    /// A particle's accumulated strain exceeded the hard elongation limit.
    ElongationExceeded(FT),
    /// A particle position or strength component went non-finite.
    NumericalBlowup(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Config(msg) => write!(f, "configuration error: {}", msg),
            SimError::Init(msg) => write!(f, "initialization error: {}", msg),
            SimError::Solver(msg) => write!(f, "BEM solver error: {}", msg),
            SimError::ElongationExceeded(e) => write!(
                f,
                "elongation threshold exceeded ({:.3} > 1.5), reduce the time step size",
                e
            ),
            SimError::NumericalBlowup(msg) => write!(f, "numerical blow-up: {}", msg),
        }
    }
}

impl std::error::Error for SimError {}
