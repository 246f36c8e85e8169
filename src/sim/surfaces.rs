use std::sync::Arc;

use crate::floating_type_mod::FT;
use crate::sim::body::Body;
use crate::sim::particles::{ElementKind, MotionKind};
use crate::V3;

/// Fundamental geometry handed from a boundary feature to the solver:
/// flat node coordinates, triangle connectivity, per-panel boundary values.
#[derive(Clone, Default)]
pub struct ElementPacket {
    pub x: Vec<FT>,
    pub idx: Vec<u32>,
    pub val: Vec<FT>,
}

/// A collection of triangle panels over one or more closed surfaces.
/// Panels carry a 2-component vortex sheet strength in the local tangent
/// basis; reactive surfaces get theirs from the BEM solve.
pub struct Surfaces {
    nodes: Vec<V3>,
    idx: Vec<[u32; 3]>,

    // per-panel orthonormal basis and geometry, rebuilt after any motion
    x1: Vec<V3>,
    x2: Vec<V3>,
    norm: Vec<V3>,
    area: Vec<FT>,
    center: Vec<V3>,

    // the BEM unknowns, expressed in the (x1, x2) basis
    vort_str: Vec<[FT; 2]>,

    // prescribed normal boundary condition per panel (usually zero)
    bc: Vec<FT>,

    elemt: ElementKind,
    movet: MotionKind,
    body: Option<Arc<Body>>,
}

impl Surfaces {
    pub fn new(geom: &ElementPacket, elemt: ElementKind, movet: MotionKind, body: Option<Arc<Body>>) -> Self {
        let mut surf = Surfaces {
            nodes: Vec::new(),
            idx: Vec::new(),
            x1: Vec::new(),
            x2: Vec::new(),
            norm: Vec::new(),
            area: Vec::new(),
            center: Vec::new(),
            vort_str: Vec::new(),
            bc: Vec::new(),
            elemt,
            movet,
            body,
        };
        surf.add_new(geom);
        surf
    }

    /// Append more geometry to this collection.
    pub fn add_new(&mut self, geom: &ElementPacket) {
        assert!(geom.x.len() % 3 == 0, "node vector not a multiple of 3");
        assert!(geom.idx.len() % 3 == 0, "index vector not a multiple of 3");

        let node_offset = self.nodes.len() as u32;
        for chunk in geom.x.chunks_exact(3) {
            self.nodes.push([chunk[0], chunk[1], chunk[2]].into());
        }

        let npan_before = self.idx.len();
        for tri in geom.idx.chunks_exact(3) {
            self.idx
                .push([tri[0] + node_offset, tri[1] + node_offset, tri[2] + node_offset]);
        }
        let npan_added = self.idx.len() - npan_before;

        self.vort_str.extend((0..npan_added).map(|_| [0., 0.]));
        if geom.val.len() == npan_added {
            self.bc.extend_from_slice(&geom.val);
        } else {
            self.bc.extend((0..npan_added).map(|_| 0.));
        }

        self.recompute_geometry();
    }

    /// Rebuild panel bases, areas and centroids from the node positions.
    pub fn recompute_geometry(&mut self) {
        let npan = self.idx.len();
        self.x1.resize(npan, V3::zeros());
        self.x2.resize(npan, V3::zeros());
        self.norm.resize(npan, V3::zeros());
        self.area.resize(npan, 0.);
        self.center.resize(npan, V3::zeros());

        for (i, tri) in self.idx.iter().enumerate() {
            let n0 = self.nodes[tri[0] as usize];
            let n1 = self.nodes[tri[1] as usize];
            let n2 = self.nodes[tri[2] as usize];

            let e1 = n1 - n0;
            let e2 = n2 - n0;
            let cr = e1.cross(&e2);
            let twice_area = cr.norm();
            assert!(twice_area > 0., "degenerate panel {}", i);

            self.norm[i] = cr / twice_area;
            self.area[i] = 0.5 * twice_area;
            self.x1[i] = e1 / e1.norm();
            self.x2[i] = self.norm[i].cross(&self.x1[i]);
            self.center[i] = (n0 + n1 + n2) / 3.;
        }
    }

    pub fn get_n(&self) -> usize {
        self.nodes.len()
    }

    pub fn get_npanels(&self) -> usize {
        self.idx.len()
    }

    pub fn is_inert(&self) -> bool {
        self.elemt == ElementKind::Inert
    }

    pub fn get_elemt(&self) -> ElementKind {
        self.elemt
    }

    pub fn get_movet(&self) -> MotionKind {
        self.movet
    }

    pub fn get_body_ptr(&self) -> Option<Arc<Body>> {
        self.body.clone()
    }

    pub fn get_nodes(&self) -> &[V3] {
        &self.nodes
    }

    pub fn get_idx(&self) -> &[[u32; 3]] {
        &self.idx
    }

    pub fn get_x1(&self) -> &[V3] {
        &self.x1
    }

    pub fn get_x2(&self) -> &[V3] {
        &self.x2
    }

    pub fn get_norm(&self) -> &[V3] {
        &self.norm
    }

    pub fn get_area(&self) -> &[FT] {
        &self.area
    }

    pub fn get_center(&self) -> &[V3] {
        &self.center
    }

    pub fn get_vort_str(&self) -> &[[FT; 2]] {
        &self.vort_str
    }

    pub fn set_vort_str(&mut self, i: usize, g1: FT, g2: FT) {
        self.vort_str[i] = [g1, g2];
    }

    /// Panel corner positions, for the quadrature kernels.
    pub fn panel_nodes(&self, i: usize) -> [V3; 3] {
        let tri = self.idx[i];
        [
            self.nodes[tri[0] as usize],
            self.nodes[tri[1] as usize],
            self.nodes[tri[2] as usize],
        ]
    }

    /// Whole-panel strength in the world frame: sheet strength rotated out
    /// of the tangent basis and scaled by panel area.
    pub fn panel_world_strength(&self, i: usize) -> V3 {
        let [g1, g2] = self.vort_str[i];
        (self.x1[i] * g1 + self.x2[i] * g2) * self.area[i]
    }

    /// For each panel, one particle at the centroid displaced along the
    /// outward normal, carrying the panel's circulation. Returned in the
    /// flat 7-tuple format expected by `Points::add_new`.
    pub fn represent_as_particles(&self, offset_distance: FT, vdelta: FT) -> Vec<FT> {
        let mut out = Vec::with_capacity(7 * self.get_npanels());
        for i in 0..self.get_npanels() {
            let pos = self.center[i] + self.norm[i] * offset_distance;
            let s = self.panel_world_strength(i);
            out.extend_from_slice(&[pos.x, pos.y, pos.z, s.x, s.y, s.z, vdelta]);
        }
        out
    }

    pub fn get_total_circ(&self) -> V3 {
        (0..self.get_npanels()).fold(V3::zeros(), |acc, i| acc + self.panel_world_strength(i))
    }

    /// Circulation bound in the body itself (rotation). Bodies only
    /// translate here, so this is always zero; kept for the accounting sum.
    pub fn get_body_circ(&self) -> V3 {
        V3::zeros()
    }

    pub fn get_total_impulse(&self) -> V3 {
        (0..self.get_npanels()).fold(V3::zeros(), |acc, i| {
            acc + self.center[i].cross(&self.panel_world_strength(i))
        })
    }

    pub fn get_max_bc_value(&self) -> FT {
        self.bc.iter().map(|v| v.abs()).fold(0., FT::max)
    }

    /// Velocity of the surface at a panel centroid due to body motion.
    pub fn body_vel(&self, time: FT) -> V3 {
        match (&self.body, self.movet) {
            (Some(b), MotionKind::Bodybound) => b.get_vel(time),
            _ => V3::zeros(),
        }
    }

    /// Translate with the bound body over one (sub)step.
    pub fn move_with_body(&mut self, time: FT, dt: FT) -> bool {
        let vel = self.body_vel(time);
        if vel.norm_squared() == 0. || dt == 0. {
            return false;
        }
        for node in &mut self.nodes {
            *node += vel * dt;
        }
        self.recompute_geometry();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_panel() -> Surfaces {
        // unit right triangle in the xy-plane, normal along +z
        let geom = ElementPacket {
            x: vec![0., 0., 0., 1., 0., 0., 0., 1., 0.],
            idx: vec![0, 1, 2],
            val: vec![],
        };
        Surfaces::new(&geom, ElementKind::Reactive, MotionKind::Fixed, None)
    }

    #[test]
    fn panel_basis_is_orthonormal() {
        let surf = one_panel();
        assert_eq!(surf.get_npanels(), 1);
        let (x1, x2, n) = (surf.get_x1()[0], surf.get_x2()[0], surf.get_norm()[0]);
        assert!((x1.norm() - 1.).abs() < 1e-6);
        assert!((x2.norm() - 1.).abs() < 1e-6);
        assert!(x1.dot(&x2).abs() < 1e-6);
        assert!((x1.cross(&x2) - n).norm() < 1e-6);
        assert!((surf.get_area()[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn represent_as_particles_carries_circulation() {
        let mut surf = one_panel();
        surf.set_vort_str(0, 2., 0.);
        let batch = surf.represent_as_particles(0.1, 0.05);
        assert_eq!(batch.len(), 7);
        // particle sits above the centroid along +z
        assert!((batch[2] - 0.1).abs() < 1e-6);
        // strength = gamma1 * x1 * area = 2 * (1,0,0) * 0.5
        assert!((batch[3] - 1.0).abs() < 1e-6);
        assert_eq!(batch[6], 0.05);
        assert!((surf.get_total_circ() - crate::vec3f(1., 0., 0.)).norm() < 1e-6);
    }
}
