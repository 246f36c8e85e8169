pub mod bem;
pub mod body;
pub mod collections;
pub mod convection;
pub mod diffusion;
pub mod kernels;
pub mod merge;
pub mod neighborhood;
pub mod nnls;
pub mod particles;
pub mod reflect;
pub mod shed;
pub mod simulation;
pub mod split;
pub mod status;
pub mod surfaces;
pub mod velocities;
pub mod vrm;

pub use bem::{solve_bem, Bem, MAX_BEM_PANELS};
pub use body::Body;
pub use collections::Collection;
pub use convection::Convection;
pub use diffusion::Diffusion;
pub use kernels::CoreKind;
pub use merge::merge_operation;
pub use particles::{ElementKind, MotionKind, ParticleVec, Points};
pub use reflect::{clear_inner_layer, reflect_interior};
pub use shed::shed_from_surfaces;
pub use simulation::{SimState, Simulation};
pub use split::split_elongated;
pub use surfaces::{ElementPacket, Surfaces};
pub use vrm::Vrm;
