use serde::{Deserialize, Serialize};

use crate::floating_type_mod::FT;
use crate::{M3, V3};

/// Core regularization for the induced-velocity kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoreKind {
    RosenheadMoore,
    CompactExponential,
}

impl Default for CoreKind {
    fn default() -> Self {
        CoreKind::CompactExponential
    }
}

//
// core functions - Rosenhead-Moore algebraic
//

#[inline(always)]
fn core_rm_st(distsq: FT, sr: FT, tr: FT) -> FT {
    let r2 = distsq + sr * sr + tr * tr;
    1. / (r2 * r2.sqrt())
}

#[inline(always)]
fn core_rm_s(distsq: FT, sr: FT) -> FT {
    let r2 = distsq + sr * sr;
    1. / (r2 * r2.sqrt())
}

#[inline(always)]
fn core_rm_st_grad(distsq: FT, sr: FT, tr: FT) -> (FT, FT) {
    let r2 = distsq + sr * sr + tr * tr;
    let r3 = 1. / (r2 * r2.sqrt());
    (r3, -3. * r3 / r2)
}

#[inline(always)]
fn core_rm_s_grad(distsq: FT, sr: FT) -> (FT, FT) {
    let r2 = distsq + sr * sr;
    let r3 = 1. / (r2 * r2.sqrt());
    (r3, -3. * r3 / r2)
}

//
// core functions - compact exponential
//

#[inline(always)]
fn core_exp_impl(distsq: FT, corefac: FT) -> FT {
    let dist = distsq.sqrt();
    let d3 = distsq * dist;
    let reld3 = d3 * corefac;
    if reld3 > 16. {
        1. / d3
    } else if reld3 < 0.001 {
        corefac
    } else {
        (1. - (-reld3).exp()) / d3
    }
}

#[inline(always)]
fn core_exp_st(distsq: FT, sr: FT, tr: FT) -> FT {
    core_exp_impl(distsq, 1. / (sr * sr * sr + tr * tr * tr))
}

#[inline(always)]
fn core_exp_s(distsq: FT, sr: FT) -> FT {
    core_exp_impl(distsq, 1. / (sr * sr * sr))
}

#[inline(always)]
fn core_exp_impl_grad(distsq: FT, corefac: FT) -> (FT, FT) {
    let dist = distsq.sqrt();
    let d3 = distsq * dist;
    let reld3 = d3 * corefac;
    if reld3 > 16. {
        (1. / d3, -3. / (d3 * distsq))
    } else if reld3 < 0.001 {
        (corefac, -1.5 * dist * corefac * corefac)
    } else {
        let expreld3 = (-reld3).exp();
        let r3 = (1. - expreld3) / d3;
        (r3, 3. * (corefac * expreld3 - r3) / distsq)
    }
}

#[inline(always)]
fn core_exp_st_grad(distsq: FT, sr: FT, tr: FT) -> (FT, FT) {
    core_exp_impl_grad(distsq, 1. / (sr * sr * sr + tr * tr * tr))
}

#[inline(always)]
fn core_exp_s_grad(distsq: FT, sr: FT) -> (FT, FT) {
    core_exp_impl_grad(distsq, 1. / (sr * sr * sr))
}

#[inline(always)]
pub fn core_st(core: CoreKind, distsq: FT, sr: FT, tr: FT) -> FT {
    match core {
        CoreKind::RosenheadMoore => core_rm_st(distsq, sr, tr),
        CoreKind::CompactExponential => core_exp_st(distsq, sr, tr),
    }
}

#[inline(always)]
pub fn core_s(core: CoreKind, distsq: FT, sr: FT) -> FT {
    match core {
        CoreKind::RosenheadMoore => core_rm_s(distsq, sr),
        CoreKind::CompactExponential => core_exp_s(distsq, sr),
    }
}

#[inline(always)]
pub fn core_st_grad(core: CoreKind, distsq: FT, sr: FT, tr: FT) -> (FT, FT) {
    match core {
        CoreKind::RosenheadMoore => core_rm_st_grad(distsq, sr, tr),
        CoreKind::CompactExponential => core_exp_st_grad(distsq, sr, tr),
    }
}

#[inline(always)]
pub fn core_s_grad(core: CoreKind, distsq: FT, sr: FT) -> (FT, FT) {
    match core {
        CoreKind::RosenheadMoore => core_rm_s_grad(distsq, sr),
        CoreKind::CompactExponential => core_exp_s_grad(distsq, sr),
    }
}

//
// velocity influence functions
//
// naming: kernel_NS_MT, N source dimensions (0=point, 2=panel), S source
// type (v=vortex), M target dimensions, T target type ('p' singular point,
// 'b' blob with core radius, trailing 'g' adds velocity gradients)
//
// all influences omit the 1/(4 pi) Biot-Savart factor; the summation layer
// applies it once per target
//

/// Thick-cored particle on thick-cored point.
#[inline(always)]
pub fn kernel_0v_0b(core: CoreKind, sx: V3, sr: FT, ss: V3, tx: V3, tr: FT) -> V3 {
    let d = tx - sx;
    let r3 = core_st(core, d.norm_squared(), sr, tr);
    ss.cross(&d) * r3
}

/// Thick-cored particle on singular point.
#[inline(always)]
pub fn kernel_0v_0p(core: CoreKind, sx: V3, sr: FT, ss: V3, tx: V3) -> V3 {
    let d = tx - sx;
    let r3 = core_s(core, d.norm_squared(), sr);
    ss.cross(&d) * r3
}

#[inline(always)]
fn grad_terms(d: V3, ss: V3, r3: FT, bbb: FT) -> M3 {
    let sxd = ss.cross(&d);
    let dxxw = sxd.x * bbb;
    let dyxw = sxd.y * bbb;
    let dzxw = sxd.z * bbb;

    // columns are d/dx, d/dy, d/dz of (u,v,w)
    M3::from_columns(&[
        V3::new(d.x * dxxw, d.x * dyxw + ss.z * r3, d.x * dzxw - ss.y * r3),
        V3::new(d.y * dxxw - ss.z * r3, d.y * dyxw, d.y * dzxw + ss.x * r3),
        V3::new(d.z * dxxw + ss.y * r3, d.z * dyxw - ss.x * r3, d.z * dzxw),
    ])
}

/// Thick-cored particle on thick-cored point, with velocity gradients.
#[inline(always)]
pub fn kernel_0v_0bg(core: CoreKind, sx: V3, sr: FT, ss: V3, tx: V3, tr: FT) -> (V3, M3) {
    let d = tx - sx;
    let (r3, bbb) = core_st_grad(core, d.norm_squared(), sr, tr);
    (ss.cross(&d) * r3, grad_terms(d, ss, r3, bbb))
}

/// Thick-cored particle on singular point, with velocity gradients.
#[inline(always)]
pub fn kernel_0v_0pg(core: CoreKind, sx: V3, sr: FT, ss: V3, tx: V3) -> (V3, M3) {
    let d = tx - sx;
    let (r3, bbb) = core_s_grad(core, d.norm_squared(), sr);
    (ss.cross(&d) * r3, grad_terms(d, ss, r3, bbb))
}

// quadrature points for the triangle kernels: centroid plus three
// edge-biased points, equal weights
#[inline(always)]
fn tri_quad_points(n0: V3, n1: V3, n2: V3) -> [V3; 4] {
    [
        (n0 + n1 + n2) / 3.,
        (n0 * 4. + n1 + n2) / 6.,
        (n0 + n1 * 4. + n2) / 6.,
        (n0 + n1 + n2 * 4.) / 6.,
    ]
}

/// Vortex panel on singular point via 4-point quadrature. `ss` is the
/// whole-panel strength (sheet strength in world frame times area).
#[inline(always)]
pub fn kernel_2v_0p(core: CoreKind, n0: V3, n1: V3, n2: V3, ss: V3, tx: V3) -> V3 {
    let sq = ss * 0.25;
    let mut vel = V3::zeros();
    for qp in tri_quad_points(n0, n1, n2) {
        vel += kernel_0v_0p(core, qp, 0., sq, tx);
    }
    vel
}

/// Vortex panel on thick-cored point.
#[inline(always)]
pub fn kernel_2v_0b(core: CoreKind, n0: V3, n1: V3, n2: V3, ss: V3, tx: V3, tr: FT) -> V3 {
    let sq = ss * 0.25;
    let mut vel = V3::zeros();
    for qp in tri_quad_points(n0, n1, n2) {
        vel += kernel_0v_0b(core, qp, 0., sq, tx, tr);
    }
    vel
}

/// Vortex panel on thick-cored point, with velocity gradients.
#[inline(always)]
pub fn kernel_2v_0bg(core: CoreKind, n0: V3, n1: V3, n2: V3, ss: V3, tx: V3, tr: FT) -> (V3, M3) {
    let sq = ss * 0.25;
    let mut vel = V3::zeros();
    let mut grad = M3::zeros();
    for qp in tri_quad_points(n0, n1, n2) {
        let (v, g) = kernel_0v_0bg(core, qp, 0., sq, tx, tr);
        vel += v;
        grad += g;
    }
    (vel, grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3f;

    #[test]
    fn cores_agree_in_far_field() {
        // at 20 core radii the regularizations are both effectively 1/d^3
        let distsq = 4.0;
        let rm = core_s(CoreKind::RosenheadMoore, distsq, 0.1);
        let ex = core_s(CoreKind::CompactExponential, distsq, 0.1);
        let singular = 1. / (distsq * distsq.sqrt());
        assert!((rm - singular).abs() / singular < 0.01, "rm={} sing={}", rm, singular);
        assert!((ex - singular).abs() / singular < 0.01, "exp={} sing={}", ex, singular);
    }

    #[test]
    fn induced_velocity_is_perpendicular() {
        for core in [CoreKind::RosenheadMoore, CoreKind::CompactExponential] {
            let sx = vec3f(0., 0., 0.);
            let ss = vec3f(0., 0., 1.);
            let tx = vec3f(1., 0., 0.);
            let vel = kernel_0v_0b(core, sx, 0.1, ss, tx, 0.1);
            // s cross d points along -y for s=+z, d=+x
            assert!(vel.x.abs() < 1e-7);
            assert!(vel.z.abs() < 1e-7);
            assert!(vel.y < 0.);
        }
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let core = CoreKind::CompactExponential;
        let sx = vec3f(0., 0., 0.);
        let ss = vec3f(0.3, -0.2, 1.);
        let sr = 0.2;
        let tx = vec3f(0.7, 0.4, -0.3);
        let tr = 0.2;

        let (_, grad) = kernel_0v_0bg(core, sx, sr, ss, tx, tr);

        let h = 1e-3 as FT;
        for dim in 0..3 {
            let mut dx = V3::zeros();
            dx[dim] = h;
            let vp = kernel_0v_0b(core, sx, sr, ss, tx + dx, tr);
            let vm = kernel_0v_0b(core, sx, sr, ss, tx - dx, tr);
            let fd = (vp - vm) / (2. * h);
            for row in 0..3 {
                let analytic = grad[(row, dim)];
                let numeric = fd[row];
                assert!(
                    (analytic - numeric).abs() < 2e-2 * (1. + numeric.abs()),
                    "d/dx{} row {}: analytic {} vs fd {}",
                    dim,
                    row,
                    analytic,
                    numeric
                );
            }
        }
    }

    #[test]
    fn panel_quadrature_approaches_point_vortex_far_away() {
        let core = CoreKind::RosenheadMoore;
        let n0 = vec3f(0., 0., 0.);
        let n1 = vec3f(0.1, 0., 0.);
        let n2 = vec3f(0., 0.1, 0.);
        let ss = vec3f(0., 0., 0.5);
        let tx = vec3f(3., 1., 2.);

        let vq = kernel_2v_0p(core, n0, n1, n2, ss, tx);
        let centroid = (n0 + n1 + n2) / 3.;
        let vp = kernel_0v_0p(core, centroid, 0., ss, tx);
        assert!((vq - vp).norm() / vp.norm() < 1e-3);
    }
}
