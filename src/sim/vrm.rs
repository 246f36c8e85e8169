use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::floating_type_mod::FT;
use crate::sim::neighborhood::build_point_tree;
use crate::sim::nnls::nnls;
use crate::V3;

/// Candidate search radius in units of the diffusion length. Covers the
/// first shell of the nominal lattice (spacing sqrt(8) h_nu).
const CANDIDATE_RANGE: FT = 3.0;

/// Moment residual above which a candidate set is treated as infeasible.
const ACCEPT_TOL: f64 = 1e-3;

/// Floor on any core radius, in units of the diffusion length.
const MIN_RADIUS_SCALE: FT = 1.0;

/// The Vorticity Redistribution Method: one time step of Laplacian
/// diffusion, expressed as a non-negative redistribution of each parent
/// particle's strength onto its neighbors. Weights are found by matching
/// the discrete moments of the heat kernel up to second order.
pub struct Vrm {
    /// parents weaker than this are skipped entirely
    ignore_thresh: FT,
    /// parents weaker than this may grow instead of spawning neighbors
    adapt_thresh: FT,
    /// maximum spatial gradient of radius between neighbors
    radgrad: FT,
    /// thresholds scale with the strongest particle when set
    relative: bool,
    adaptive_radii: bool,
}

struct ParentSolve {
    parent: usize,
    candidates: Vec<usize>,
    weights: Option<Vec<f64>>,
}

impl Default for Vrm {
    fn default() -> Self {
        Vrm {
            ignore_thresh: 1e-4,
            adapt_thresh: 1e-3,
            radgrad: 0.05,
            relative: true,
            adaptive_radii: false,
        }
    }
}

impl Vrm {
    pub fn new(ignore_thresh: FT, adapt_thresh: FT, radgrad: FT, relative: bool) -> Self {
        Vrm {
            ignore_thresh,
            adapt_thresh,
            radgrad,
            relative,
            adaptive_radii: false,
        }
    }

    pub fn set_adaptive_radii(&mut self, amr: bool) {
        self.adaptive_radii = amr;
    }

    pub fn get_adaptive_radii(&self) -> bool {
        self.adaptive_radii
    }

    pub fn get_relative(&self) -> bool {
        self.relative
    }

    pub fn get_ignore(&self) -> FT {
        self.ignore_thresh
    }

    /// Diffuse strength among the given particles, possibly appending new
    /// ones. The primary arrays grow in lockstep; the caller is responsible
    /// for resizing its auxiliary arrays to the returned count.
    pub fn diffuse_all(
        &self,
        position: &mut Vec<V3>,
        strength: &mut Vec<V3>,
        radius: &mut Vec<FT>,
        h_nu: FT,
        particle_overlap: FT,
    ) -> usize {
        assert!(h_nu > 0.);
        let n0 = position.len();
        assert!(strength.len() == n0);
        assert!(radius.len() == n0);
        if n0 == 0 {
            return 0;
        }

        let ips = (8.0 as FT).sqrt() * h_nu;
        let vdelta = particle_overlap * ips;
        let search_rad = CANDIDATE_RANGE * h_nu;

        let max_str = strength.iter().map(|s| s.norm()).fold(0., FT::max);
        let thresh_scale = if self.relative { max_str } else { 1.0 };
        let ignore_cut = self.ignore_thresh * thresh_scale;
        let adapt_cut = self.adapt_thresh * thresh_scale;

        let parents: Vec<usize> = (0..n0).filter(|&i| strength[i].norm() > ignore_cut).collect();
        if parents.is_empty() {
            return n0;
        }

        let tree = build_point_tree(position);

        // solve every parent's moment system against the initial cloud
        let mut solves: Vec<ParentSolve> = {
            let pos: &[V3] = position;
            parents
                .par_iter()
                .map(|&i| {
                    let candidates = gather_candidates(&tree, pos[i], search_rad);
                    let weights = solve_moment_system(pos, pos[i], &candidates, h_nu);
                    ParentSolve {
                        parent: i,
                        candidates,
                        weights,
                    }
                })
                .collect()
        };

        // second chance for infeasible parents: grow the parent or spawn
        // zero-strength particles at empty lattice positions, then retry
        let mut num_spawned = 0usize;
        let mut num_grown = 0usize;
        let mut num_failed = 0usize;

        for s in solves.iter_mut().filter(|s| s.weights.is_none()) {
            let i = s.parent;

            if self.adaptive_radii && strength[i].norm() < adapt_cut {
                radius[i] *= 1.26;
                num_grown += 1;
                continue;
            }

            // probe the six axis-aligned lattice offsets around the parent
            for dim in 0..3 {
                for sign in [-1., 1.] {
                    let mut probe = position[i];
                    probe[dim] += sign * ips;

                    let occupied = s
                        .candidates
                        .iter()
                        .copied()
                        .chain(n0..position.len())
                        .any(|j| (position[j] - probe).norm_squared() < (0.45 * ips) * (0.45 * ips));
                    if !occupied {
                        position.push(probe);
                        strength.push(V3::zeros());
                        radius.push(vdelta);
                        num_spawned += 1;
                    }
                }
            }

            // regather by brute force over the grown tail plus old candidates
            let mut candidates = s.candidates.clone();
            for j in n0..position.len() {
                if (position[j] - position[i]).norm_squared() < search_rad * search_rad
                    && !candidates.contains(&j)
                {
                    candidates.push(j);
                }
            }

            s.weights = solve_moment_system(position, position[i], &candidates, h_nu);
            s.candidates = candidates;

            if s.weights.is_none() {
                num_failed += 1;
                println!(
                    "    vrm: infeasible moment system for particle {} (|s|={:.3e}), leaving strength in place",
                    i,
                    strength[i].norm()
                );
            }
        }

        // apply phase: deltas are computed against pre-step strengths, so
        // parents commute; accumulate into a separate buffer
        let mut ds = vec![V3::zeros(); position.len()];
        for s in &solves {
            let Some(weights) = &s.weights else { continue };
            let sp = strength[s.parent];

            let wsum: f64 = weights.iter().sum();
            assert!(wsum > 0.);
            for (&j, &w) in s.candidates.iter().zip(weights.iter()) {
                ds[j] += sp * ((w / wsum) as FT);
            }
            ds[s.parent] -= sp;
        }
        for (sj, dj) in strength.iter_mut().zip(ds.iter()) {
            *sj += dj;
        }

        // enforce the radius gradient limit over the same candidate sets;
        // no core may shrink below the diffusion length
        if self.adaptive_radii {
            for s in &solves {
                let ri = radius[s.parent];
                let xi = position[s.parent];
                for &j in &s.candidates {
                    let limit = (1. + self.radgrad * (position[j] - xi).norm() / ips) * ri;
                    if radius[j] > limit {
                        radius[j] = FT::max(limit, MIN_RADIUS_SCALE * h_nu);
                    }
                }
            }
        }

        if num_spawned + num_grown + num_failed > 0 {
            println!(
                "    vrm: {} parents, spawned {}, grew {}, skipped {}",
                parents.len(),
                num_spawned,
                num_grown,
                num_failed
            );
        }

        position.len()
    }
}

fn gather_candidates(tree: &crate::sim::neighborhood::PointTree, center: V3, search_rad: FT) -> Vec<usize> {
    let mut candidates: Vec<usize> = tree
        .locate_within_distance([center.x, center.y, center.z], search_rad * search_rad)
        .map(|e| e.data)
        .collect();
    candidates.sort_unstable();
    candidates
}

/// Build and solve the 10-row moment system for one parent. Rows enforce
/// the zeroth, first, and second moments of one diffusion step of a unit
/// Gaussian of width h_nu; columns are the candidate neighbors in units of
/// h_nu around the parent. Returns None when no acceptable non-negative
/// solution exists.
fn solve_moment_system(position: &[V3], xp: V3, candidates: &[usize], h_nu: FT) -> Option<Vec<f64>> {
    if candidates.len() < 4 {
        return None;
    }

    let ncols = candidates.len();
    let mut a = DMatrix::<f64>::zeros(10, ncols);
    for (c, &j) in candidates.iter().enumerate() {
        let xi = (position[j] - xp) / h_nu;
        let (x, y, z) = (xi.x as f64, xi.y as f64, xi.z as f64);
        a[(0, c)] = 1.;
        a[(1, c)] = x;
        a[(2, c)] = y;
        a[(3, c)] = z;
        a[(4, c)] = x * x;
        a[(5, c)] = y * y;
        a[(6, c)] = z * z;
        a[(7, c)] = x * y;
        a[(8, c)] = x * z;
        a[(9, c)] = y * z;
    }

    // the heat kernel spreads variance by 2 nu dt = 2 h_nu^2 per axis
    let b = DVector::from_vec(vec![1., 0., 0., 0., 2., 2., 2., 0., 0., 0.]);

    let (w, resid) = nnls(&a, &b);
    if resid > ACCEPT_TOL {
        return None;
    }
    Some(w.iter().cloned().collect())
}
