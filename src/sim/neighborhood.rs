use rstar::{primitives::GeomWithData, RTree};

use crate::floating_type_mod::FT;
use crate::V3;

pub type PointTreeElem = GeomWithData<[FT; 3], usize>;
pub type PointTree = RTree<PointTreeElem>;

/// Bulk-load an R*-tree over particle positions; used where query radii
/// differ per particle (adaptive radii in the VRM).
pub fn build_point_tree(positions: &[V3]) -> PointTree {
    let elems: Vec<_> = positions
        .iter()
        .enumerate()
        .map(|(idx, p)| PointTreeElem::new([p.x, p.y, p.z], idx))
        .collect();
    RTree::bulk_load(elems)
}

/// Uniform spatial hash over particle positions. Used for the merge pair
/// search, where the interaction radius is one global constant.
pub struct CellGrid {
    cells_min: [i32; 3],
    size: [usize; 3],
    cell_size: FT,
    cells: Vec<Vec<u32>>,
}

impl CellGrid {
    pub fn new(positions: &[V3], cell_size: FT) -> Self {
        assert!(cell_size > 0.);

        let mut domain_min = positions.first().cloned().unwrap_or_else(V3::zeros);
        let mut domain_max = domain_min;
        for p in positions {
            for d in 0..3 {
                domain_min[d] = FT::min(domain_min[d], p[d]);
                domain_max[d] = FT::max(domain_max[d], p[d]);
            }
        }

        let mut cells_min = [0i32; 3];
        let mut size = [1usize; 3];
        for d in 0..3 {
            cells_min[d] = (domain_min[d] / cell_size).floor() as i32 - 1;
            let cmax = (domain_max[d] / cell_size).floor() as i32 + 2;
            size[d] = (cmax - cells_min[d]) as usize;
        }

        let mut grid = CellGrid {
            cells_min,
            size,
            cell_size,
            cells: vec![Vec::new(); size[0] * size[1] * size[2]],
        };

        for (i, p) in positions.iter().enumerate() {
            let idx = grid.pos_to_idx(grid.cell_of(*p)).expect("position outside own grid");
            grid.cells[idx].push(i as u32);
        }

        grid
    }

    fn cell_of(&self, p: V3) -> [i32; 3] {
        [
            (p.x / self.cell_size).floor() as i32,
            (p.y / self.cell_size).floor() as i32,
            (p.z / self.cell_size).floor() as i32,
        ]
    }

    fn pos_to_idx(&self, cell: [i32; 3]) -> Option<usize> {
        let mut idx = 0usize;
        let mut multiplier = 1usize;
        for d in 0..3 {
            let c = cell[d] - self.cells_min[d];
            if c < 0 || c as usize >= self.size[d] {
                return None;
            }
            idx += multiplier * c as usize;
            multiplier *= self.size[d];
        }
        Some(idx)
    }

    /// Visit every stored index in the 27-cell block around `p`.
    pub fn for_neighbors(&self, p: V3, mut f: impl FnMut(usize)) {
        let home = self.cell_of(p);
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let cell = [home[0] + dx, home[1] + dy, home[2] + dz];
                    if let Some(idx) = self.pos_to_idx(cell) {
                        for &j in &self.cells[idx] {
                            f(j as usize);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3f;

    #[test]
    fn grid_finds_all_close_pairs() {
        let positions = vec![
            vec3f(0., 0., 0.),
            vec3f(0.05, 0., 0.),
            vec3f(1., 1., 1.),
            vec3f(-0.04, 0.02, 0.01),
        ];
        let grid = CellGrid::new(&positions, 0.1);

        let mut found = Vec::new();
        grid.for_neighbors(positions[0], |j| found.push(j));
        found.sort();
        // everything within one cell of the origin, which excludes (1,1,1)
        assert_eq!(found, vec![0, 1, 3]);
    }

    #[test]
    fn rstar_radius_query_matches_brute_force() {
        let positions: Vec<V3> = (0..50)
            .map(|i| {
                let t = i as FT;
                vec3f((t * 0.37).sin(), (t * 0.61).cos(), (t * 0.13).sin() * 0.5)
            })
            .collect();
        let tree = build_point_tree(&positions);

        let center = vec3f(0.2, 0.1, 0.);
        let radius = 0.5 as FT;
        let mut from_tree: Vec<usize> = tree
            .locate_within_distance([center.x, center.y, center.z], radius * radius)
            .map(|e| e.data)
            .collect();
        from_tree.sort();

        let mut brute: Vec<usize> = positions
            .iter()
            .enumerate()
            .filter(|(_, p)| (*p - center).norm_squared() < radius * radius)
            .map(|(i, _)| i)
            .collect();
        brute.sort();

        assert_eq!(from_tree, brute);
    }
}
