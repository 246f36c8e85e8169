/*!
Core library for the vpm3d solver: a Lagrangian vortex particle method
coupled to a boundary element method for 3D incompressible viscous flow.
*/

pub mod concurrency;
pub mod config;
pub mod error;
pub mod features;
pub mod output;
pub mod sim;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
    pub use std::f64::consts::{FRAC_1_PI, PI, TAU};
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
    pub use std::f32::consts::{FRAC_1_PI, PI, TAU};
}

use floating_type_mod::FT;

use nalgebra::{SMatrix, SVector};

pub type V3 = SVector<FT, 3>;
pub type M3 = SMatrix<FT, 3, 3>;

pub fn vec3f(x: FT, y: FT, z: FT) -> V3 {
    [x, y, z].into()
}

pub use error::SimError;
pub use sim::*;
