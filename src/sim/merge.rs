use crate::floating_type_mod::FT;
use crate::sim::collections::Collection;
use crate::sim::neighborhood::CellGrid;
use crate::sim::particles::Points;

/// Maximum number of passes toward the pair-merge fixed point.
const MAX_PASSES: usize = 4;

/// Merge near-coincident particles of similar size across all active
/// particle collections. Returns the number of particles removed.
pub fn merge_operation(
    vort: &mut [Collection],
    particle_overlap: FT,
    merge_thresh: FT,
    adaptive_radii: bool,
) -> usize {
    assert!(merge_thresh > 0. && merge_thresh <= 0.5);

    let mut total = 0;
    for coll in vort.iter_mut() {
        if let Collection::Points(pts) = coll {
            if pts.is_inert() {
                continue;
            }
            total += merge_points(pts, particle_overlap, merge_thresh, adaptive_radii);
        }
    }
    total
}

fn merge_points(pts: &mut Points, _particle_overlap: FT, merge_thresh: FT, adaptive_radii: bool) -> usize {
    // radii outside this ratio shouldn't combine; with uniform radii the
    // gate only needs to absorb roundoff
    let ratio_gate = if adaptive_radii { 1.5 } else { 1.001 };

    let mut total_merged = 0;

    for _pass in 0..MAX_PASSES {
        let n = pts.get_n();
        if n < 2 {
            break;
        }

        let rmax = pts.pv.radius.iter().cloned().fold(0., FT::max);
        if rmax <= 0. {
            break;
        }
        let grid = CellGrid::new(&pts.pv.position, 2. * rmax);

        // candidate pairs, each counted once, ordered for determinism
        let mut pairs: Vec<(usize, usize)> = Vec::new();
        for i in 0..n {
            let xi = pts.pv.position[i];
            let ri = pts.pv.radius[i];
            grid.for_neighbors(xi, |j| {
                if j <= i {
                    return;
                }
                let rj = pts.pv.radius[j];
                let ratio = ri / rj;
                if ratio > ratio_gate || ratio < 1. / ratio_gate {
                    return;
                }
                let sep = (pts.pv.position[j] - xi).norm();
                if sep / (0.5 * (ri + rj)) < merge_thresh {
                    pairs.push((i, j));
                }
            });
        }
        pairs.sort_unstable();

        let mut used = vec![false; n];
        let mut kill = vec![false; n];
        let mut merged_this_pass = 0;

        for (i, j) in pairs {
            if used[i] || used[j] {
                continue;
            }
            used[i] = true;
            used[j] = true;
            kill[j] = true;
            merged_this_pass += 1;

            let (si, sj) = (pts.pv.strength[i], pts.pv.strength[j]);
            let (mut wi, mut wj) = (si.norm(), sj.norm());
            if wi + wj < FT::EPSILON {
                wi = 0.5;
                wj = 0.5;
            }
            let wsum = wi + wj;

            let (xi, xj) = (pts.pv.position[i], pts.pv.position[j]);
            let xm = (xi * wi + xj * wj) / wsum;

            pts.pv.position[i] = xm;
            pts.pv.strength[i] = si + sj;
            pts.pv.velocity[i] = (pts.pv.velocity[i] * wi + pts.pv.velocity[j] * wj) / wsum;
            pts.pv.elong[i] = FT::max(pts.pv.elong[i], pts.pv.elong[j]);

            if adaptive_radii {
                // conserve the second moment of vorticity about the merged center
                let (ri, rj) = (pts.pv.radius[i], pts.pv.radius[j]);
                let mi = ri * ri + (xi - xm).norm_squared();
                let mj = rj * rj + (xj - xm).norm_squared();
                pts.pv.radius[i] = ((wi * mi + wj * mj) / wsum).sqrt();
            }
        }

        if merged_this_pass == 0 {
            break;
        }
        total_merged += merged_this_pass;

        // delete by swapping to the end, then truncate every array in lockstep
        let mut new_n = n;
        let mut i = 0;
        while i < new_n {
            if kill[i] {
                new_n -= 1;
                pts.pv.swap(i, new_n);
                kill.swap(i, new_n);
            } else {
                i += 1;
            }
        }
        pts.pv.truncate(new_n);
    }

    if total_merged > 0 {
        println!("    merged {} particles, {} remain", total_merged, pts.get_n());
    }
    total_merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::particles::{ElementKind, MotionKind};
    use crate::vec3f;

    fn points_from(batch: &[FT]) -> Points {
        Points::new(batch, ElementKind::Active, MotionKind::Lagrangian, None, 0.1)
    }

    #[test]
    fn close_pair_merges_and_conserves_strength_and_impulse() {
        // two overlapping particles with aligned strengths
        let mut pts = points_from(&[
            0., 0., 0., 0., 0., 2., 0.1, //
            0.01, 0., 0., 0., 0., 1., 0.1,
        ]);
        let circ_before = pts.get_total_circ();
        let imp_before = pts.get_total_impulse();

        let removed = merge_points(&mut pts, 1.5, 0.2, false);
        assert_eq!(removed, 1);
        assert_eq!(pts.get_n(), 1);

        assert!((pts.get_total_circ() - circ_before).norm() < 1e-6);
        // strengths are parallel, so the weighted centroid keeps x cross s
        assert!((pts.get_total_impulse() - imp_before).norm() < 1e-6);
    }

    #[test]
    fn distant_particles_are_left_alone() {
        let mut pts = points_from(&[
            0., 0., 0., 0., 0., 1., 0.1, //
            1., 0., 0., 0., 0., 1., 0.1,
        ]);
        let removed = merge_points(&mut pts, 1.5, 0.2, false);
        assert_eq!(removed, 0);
        assert_eq!(pts.get_n(), 2);
    }

    #[test]
    fn pass_count_is_non_increasing_in_particle_count() {
        // a tight cluster of four; every pass can only shrink the set
        let mut pts = points_from(&[
            0., 0., 0., 0., 0., 1., 0.1, //
            0.005, 0., 0., 0., 0., 1., 0.1, //
            0., 0.005, 0., 0., 0., 1., 0.1, //
            0.005, 0.005, 0., 0., 0., 1., 0.1,
        ]);
        let n0 = pts.get_n();
        let removed = merge_points(&mut pts, 1.5, 0.2, false);
        assert!(pts.get_n() <= n0);
        assert_eq!(pts.get_n() + removed, n0);
        assert!((pts.get_total_circ() - vec3f(0., 0., 4.)).norm() < 1e-6);
    }

    #[test]
    fn dissimilar_radii_do_not_merge_when_adaptive() {
        let mut pts = points_from(&[
            0., 0., 0., 0., 0., 1., 0.05, //
            0.01, 0., 0., 0., 0., 1., 0.2,
        ]);
        let removed = merge_points(&mut pts, 1.5, 0.4, true);
        assert_eq!(removed, 0);
    }
}
