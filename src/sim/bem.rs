use nalgebra::{DMatrix, DVector, Dyn, LU};

use crate::error::SimError;
use crate::floating_type_mod::{FRAC_1_PI, FT};
use crate::sim::collections::Collection;
use crate::sim::kernels::{kernel_2v_0p, CoreKind};
use crate::sim::particles::ElementKind;
use crate::sim::surfaces::Surfaces;
use crate::sim::velocities::{eval_vel, gather_panel_sources, gather_particle_sources, PanelSources};
use crate::V3;

/// Hard cap on the dense BEM system; beyond this the factorization will
/// not fit in memory.
pub const MAX_BEM_PANELS: usize = 21000;

/// Boundary element state: the LU factorization of the panel-self-influence
/// matrix, reused across steps until the geometry moves.
pub struct Bem {
    lu: Option<LU<f64, Dyn, Dyn>>,
    npanels: usize,
    geometry_dirty: bool,
}

impl Bem {
    pub fn new() -> Self {
        Bem {
            lu: None,
            npanels: 0,
            geometry_dirty: true,
        }
    }

    pub fn reset(&mut self) {
        self.lu = None;
        self.npanels = 0;
        self.geometry_dirty = true;
    }

    /// Call after any panel geometry moves; the next solve reassembles.
    pub fn mark_geometry_dirty(&mut self) {
        self.geometry_dirty = true;
    }
}

impl Default for Bem {
    fn default() -> Self {
        Self::new()
    }
}

fn reactive_panel_count(bdry: &[Collection]) -> usize {
    bdry.iter()
        .map(|c| match c {
            Collection::Surfaces(s) if s.get_elemt() == ElementKind::Reactive => s.get_npanels(),
            _ => 0,
        })
        .sum()
}

/// Solve for the panel sheet strengths so that the interior-side tangential
/// velocity at every panel centroid matches the body's motion there.
pub fn solve_bem(
    time: FT,
    fs: V3,
    vort: &[Collection],
    bdry: &mut [Collection],
    bem: &mut Bem,
    core: CoreKind,
) -> Result<(), SimError> {
    let np = reactive_panel_count(bdry);
    if np == 0 {
        return Ok(());
    }
    if np > MAX_BEM_PANELS {
        return Err(SimError::Solver(format!(
            "BEM system of {} panels exceeds the {}-panel capacity",
            np, MAX_BEM_PANELS
        )));
    }

    // immutable pass: assemble (if needed) and build the right-hand side
    {
        let surfs: Vec<&Surfaces> = bdry
            .iter()
            .filter_map(|c| match c {
                Collection::Surfaces(s) if s.get_elemt() == ElementKind::Reactive => Some(s),
                _ => None,
            })
            .collect();

        if bem.lu.is_none() || bem.geometry_dirty || bem.npanels != np {
            let a = assemble_influence_matrix(&surfs, np, core);
            let lu = a.lu();
            if lu.determinant().abs() < f64::MIN_POSITIVE {
                return Err(SimError::Solver("singular panel influence matrix".to_string()));
            }
            bem.lu = Some(lu);
            bem.npanels = np;
            bem.geometry_dirty = false;
        }

        let rhs = assemble_rhs(time, fs, vort, &surfs, np, core);
        let lu = bem.lu.as_ref().unwrap();
        let gamma = lu
            .solve(&rhs)
            .ok_or_else(|| SimError::Solver("BEM back-substitution failed".to_string()))?;

        if gamma.iter().any(|g| !g.is_finite()) {
            return Err(SimError::Solver("non-finite panel strengths".to_string()));
        }

        // scatter the solution back into the surfaces
        let mut offset = 0;
        for coll in bdry.iter_mut() {
            let Collection::Surfaces(s) = coll else { continue };
            if s.get_elemt() != ElementKind::Reactive {
                continue;
            }
            for i in 0..s.get_npanels() {
                s.set_vort_str(i, gamma[2 * (offset + i)] as FT, gamma[2 * (offset + i) + 1] as FT);
            }
            offset += s.get_npanels();
        }
    }

    Ok(())
}

/// Dense 2N x 2N tangential-velocity influence matrix. The diagonal block
/// is the analytic sheet jump; off-diagonal blocks use the panel quadrature
/// kernels with unit gamma1/gamma2 strengths.
fn assemble_influence_matrix(surfs: &[&Surfaces], np: usize, core: CoreKind) -> DMatrix<f64> {
    let frac_1_4pi = (0.25 * FRAC_1_PI) as f64;

    // flatten panel data across surfaces
    let mut nodes = Vec::with_capacity(np);
    let mut centers = Vec::with_capacity(np);
    let mut x1 = Vec::with_capacity(np);
    let mut x2 = Vec::with_capacity(np);
    let mut area = Vec::with_capacity(np);
    for s in surfs {
        for i in 0..s.get_npanels() {
            nodes.push(s.panel_nodes(i));
            centers.push(s.get_center()[i]);
            x1.push(s.get_x1()[i]);
            x2.push(s.get_x2()[i]);
            area.push(s.get_area()[i]);
        }
    }

    let mut a = DMatrix::<f64>::zeros(2 * np, 2 * np);
    for i in 0..np {
        for j in 0..np {
            if i == j {
                // interior side of the panel's own sheet: -(1/2) gamma x n
                a[(2 * i, 2 * j + 1)] = -0.5;
                a[(2 * i + 1, 2 * j)] = 0.5;
                continue;
            }
            let [n0, n1, n2] = nodes[j];
            for (comp, basis) in [(0usize, x1[j]), (1usize, x2[j])] {
                let w = basis * area[j];
                let v = kernel_2v_0p(core, n0, n1, n2, w, centers[i]);
                a[(2 * i, 2 * j + comp)] = (v.dot(&x1[i])) as f64 * frac_1_4pi;
                a[(2 * i + 1, 2 * j + comp)] = (v.dot(&x2[i])) as f64 * frac_1_4pi;
            }
        }
    }
    a
}

fn assemble_rhs(
    time: FT,
    fs: V3,
    vort: &[Collection],
    surfs: &[&Surfaces],
    np: usize,
    core: CoreKind,
) -> DVector<f64> {
    let parts = gather_particle_sources(vort);
    let no_panels: PanelSources = gather_panel_sources(&[]);

    let mut rhs = DVector::<f64>::zeros(2 * np);
    let mut row = 0;
    for s in surfs {
        let body_vel = s.body_vel(time);
        for i in 0..s.get_npanels() {
            let c = s.get_center()[i];
            let u_ext = fs + eval_vel(core, &parts, &no_panels, c, 0.);
            let b = body_vel - u_ext;
            rhs[row] = b.dot(&s.get_x1()[i]) as f64;
            rhs[row + 1] = b.dot(&s.get_x2()[i]) as f64;
            row += 2;
        }
    }
    rhs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::particles::MotionKind;
    use crate::sim::surfaces::ElementPacket;
    use crate::vec3f;

    fn octahedron() -> Surfaces {
        let x = vec![
            1., 0., 0., -1., 0., 0., 0., 1., 0., 0., -1., 0., 0., 0., 1., 0., 0., -1.,
        ];
        let idx = vec![
            0, 2, 4, 2, 1, 4, 1, 3, 4, 3, 0, 4, //
            2, 0, 5, 1, 2, 5, 3, 1, 5, 0, 3, 5,
        ];
        Surfaces::new(
            &ElementPacket { x, idx, val: vec![] },
            ElementKind::Reactive,
            MotionKind::Fixed,
            None,
        )
    }

    #[test]
    fn zero_flow_gives_zero_strengths() {
        let mut bdry = vec![Collection::Surfaces(octahedron())];
        let mut bem = Bem::new();
        solve_bem(
            0.,
            V3::zeros(),
            &[],
            &mut bdry,
            &mut bem,
            CoreKind::CompactExponential,
        )
        .unwrap();

        let Collection::Surfaces(s) = &bdry[0] else { unreachable!() };
        for vs in s.get_vort_str() {
            assert!(vs[0].abs() < 1e-10);
            assert!(vs[1].abs() < 1e-10);
        }
    }

    #[test]
    fn freestream_produces_bounded_symmetric_sheet() {
        let mut bdry = vec![Collection::Surfaces(octahedron())];
        let mut bem = Bem::new();
        solve_bem(
            0.,
            vec3f(1., 0., 0.),
            &[],
            &mut bdry,
            &mut bem,
            CoreKind::CompactExponential,
        )
        .unwrap();

        let Collection::Surfaces(s) = &bdry[0] else { unreachable!() };
        let mut max_str = 0. as FT;
        for i in 0..s.get_npanels() {
            max_str = FT::max(max_str, s.panel_world_strength(i).norm());
        }
        assert!(max_str > 0.1, "sheet should react to the freestream");

        // symmetric body in symmetric flow carries no net circulation
        let total = s.get_total_circ();
        assert!(total.norm() < 1e-4 * max_str, "net circulation {:?}", total);
    }

    #[test]
    fn factorization_is_reused_between_solves() {
        let mut bdry = vec![Collection::Surfaces(octahedron())];
        let mut bem = Bem::new();
        solve_bem(0., vec3f(1., 0., 0.), &[], &mut bdry, &mut bem, CoreKind::RosenheadMoore).unwrap();
        assert!(bem.lu.is_some());
        assert_eq!(bem.npanels, 8);
        assert!(!bem.geometry_dirty);

        // a second solve with different flow must succeed on the cached LU
        solve_bem(0., vec3f(0., 1., 0.), &[], &mut bdry, &mut bem, CoreKind::RosenheadMoore).unwrap();
        let Collection::Surfaces(s) = &bdry[0] else { unreachable!() };
        assert!(s.get_vort_str().iter().any(|vs| vs[0].abs() + vs[1].abs() > 0.));
    }
}
