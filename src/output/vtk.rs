use std::fs::File;
use std::io::Write;

use vtkio::model::*;

use crate::floating_type_mod::FT;
use crate::sim::collections::Collection;
use crate::sim::particles::Points;
use crate::sim::surfaces::Surfaces;

/// ParaView-style series index over the files of one run. Finalized when
/// dropped.
pub struct VtkSeries {
    file: Option<File>,
    any_written: bool,
}

impl VtkSeries {
    pub fn new(basename: &str) -> Self {
        let name = format!("{}.vtk.series", basename);
        let file = match File::create(&name) {
            Ok(mut f) => {
                let _ = f.write_all(b"{\n\"file-series-version\": \"1.0\",\n\"files\": [");
                Some(f)
            }
            Err(e) => {
                println!("could not create {}: {}", name, e);
                None
            }
        };
        VtkSeries {
            file,
            any_written: false,
        }
    }

    pub fn add(&mut self, filename: &str, time: FT) {
        let Some(f) = &mut self.file else { return };
        let sep = if self.any_written { "," } else { "" };
        let _ = write!(f, "{}\n{{ \"name\": \"{}\", \"time\": {} }}", sep, filename, time);
        self.any_written = true;
    }
}

impl Drop for VtkSeries {
    fn drop(&mut self) {
        if let Some(f) = &mut self.file {
            let _ = f.write_all(b"\n]\n}");
        }
    }
}

/// Write one .vtu file per non-empty collection in the list, appending the
/// file names to `files`. Particles become vertex cells with point data;
/// surfaces become triangle cells with per-cell sheet strengths.
pub fn write_vtk_files(colls: &[Collection], stepnum: usize, _time: FT, files: &mut Vec<String>) {
    let mut file_idx = 0;
    for coll in colls {
        if coll.get_n() == 0 {
            continue;
        }
        let name = match coll {
            Collection::Points(pts) => write_vtu_points(pts, file_idx, stepnum),
            Collection::Surfaces(surf) => write_vtu_panels(surf, file_idx, stepnum),
        };
        if let Some(name) = name {
            files.push(name);
            file_idx += 1;
        }
    }
}

fn flatten_positions(pos: &[crate::V3]) -> Vec<f32> {
    let mut out = Vec::with_capacity(3 * pos.len());
    for p in pos {
        out.push(p.x as f32);
        out.push(p.y as f32);
        out.push(p.z as f32);
    }
    out
}

/// Point elements as an unstructured grid of vertex cells.
fn write_vtu_points(pts: &Points, file_idx: usize, frameno: usize) -> Option<String> {
    let n = pts.get_n();
    assert!(n > 0, "inside write_vtu_points with no points");

    let has_strengths = !pts.is_inert();
    let has_radii = !pts.is_inert();
    let prefix = if pts.is_inert() { "fldpt" } else { "part" };
    let vtkfn = format!("{}_{:02}_{:05}.vtu", prefix, file_idx, frameno);

    let connectivity: Vec<u64> = (0..n as u64).collect();
    let offsets: Vec<u64> = (1..=n as u64).collect();

    let mut point_attrs: Vec<Attribute> = Vec::new();

    if has_strengths {
        let mut circ: Vec<f32> = Vec::with_capacity(3 * n);
        for s in &pts.pv.strength {
            circ.extend_from_slice(&[s.x as f32, s.y as f32, s.z as f32]);
        }
        let mut da = DataArray::scalars("circulation", 3);
        da.data = circ.into();
        point_attrs.push(Attribute::DataArray(da));
    }

    if has_radii {
        let rad: Vec<f32> = pts.pv.radius.iter().map(|&r| r as f32).collect();
        let mut da = DataArray::scalars("radius", 1);
        da.data = rad.into();
        point_attrs.push(Attribute::DataArray(da));
    }

    let mut vel: Vec<f32> = Vec::with_capacity(3 * n);
    for v in &pts.pv.velocity {
        vel.extend_from_slice(&[v.x as f32, v.y as f32, v.z as f32]);
    }
    let mut da = DataArray::scalars("velocity", 3);
    da.data = vel.into();
    point_attrs.push(Attribute::DataArray(da));

    let vtk = Vtk {
        version: Version::new((1, 0)),
        byte_order: ByteOrder::LittleEndian,
        title: String::from("vortex particles"),
        file_path: None,
        data: DataSet::UnstructuredGrid {
            meta: None,
            pieces: vec![Piece::Inline(Box::new(UnstructuredGridPiece {
                points: flatten_positions(&pts.pv.position).into(),
                cells: Cells {
                    cell_verts: VertexNumbers::XML { connectivity, offsets },
                    types: vec![CellType::Vertex; n],
                },
                data: Attributes {
                    point: point_attrs,
                    cell: Vec::new(),
                },
            }))],
        },
    };

    match vtk.export(&vtkfn) {
        Ok(()) => {
            println!("Wrote {} points to {}", n, vtkfn);
            Some(vtkfn)
        }
        Err(e) => {
            println!("failed writing {}: {}", vtkfn, e);
            None
        }
    }
}

/// Panel elements as an unstructured grid of triangles with the world-frame
/// vortex sheet strength as cell data.
fn write_vtu_panels(surf: &Surfaces, file_idx: usize, frameno: usize) -> Option<String> {
    let npan = surf.get_npanels();
    assert!(npan > 0, "inside write_vtu_panels with no panels");

    let vtkfn = format!("panel_{:02}_{:05}.vtu", file_idx, frameno);

    let mut connectivity: Vec<u64> = Vec::with_capacity(3 * npan);
    for tri in surf.get_idx() {
        connectivity.extend_from_slice(&[tri[0] as u64, tri[1] as u64, tri[2] as u64]);
    }
    let offsets: Vec<u64> = (1..=npan as u64).map(|i| 3 * i).collect();

    let mut cell_attrs: Vec<Attribute> = Vec::new();
    if !surf.is_inert() {
        let mut str: Vec<f32> = Vec::with_capacity(3 * npan);
        for i in 0..npan {
            // sheet strength density in the world frame
            let [g1, g2] = surf.get_vort_str()[i];
            let w = surf.get_x1()[i] * g1 + surf.get_x2()[i] * g2;
            str.extend_from_slice(&[w.x as f32, w.y as f32, w.z as f32]);
        }
        let mut da = DataArray::scalars("vortex sheet strength", 3);
        da.data = str.into();
        cell_attrs.push(Attribute::DataArray(da));
    }

    let vtk = Vtk {
        version: Version::new((1, 0)),
        byte_order: ByteOrder::LittleEndian,
        title: String::from("panels"),
        file_path: None,
        data: DataSet::UnstructuredGrid {
            meta: None,
            pieces: vec![Piece::Inline(Box::new(UnstructuredGridPiece {
                points: flatten_positions(surf.get_nodes()).into(),
                cells: Cells {
                    cell_verts: VertexNumbers::XML { connectivity, offsets },
                    types: vec![CellType::Triangle; npan],
                },
                data: Attributes {
                    point: Vec::new(),
                    cell: cell_attrs,
                },
            }))],
        },
    };

    match vtk.export(&vtkfn) {
        Ok(()) => {
            println!("Wrote {} panels to {}", npan, vtkfn);
            Some(vtkfn)
        }
        Err(e) => {
            println!("failed writing {}: {}", vtkfn, e);
            None
        }
    }
}
