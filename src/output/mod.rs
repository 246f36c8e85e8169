mod vtk;

pub use vtk::{write_vtk_files, VtkSeries};
