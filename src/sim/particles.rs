use std::sync::Arc;

use crate::floating_type_mod::FT;
use crate::sim::body::Body;
use crate::{M3, V3};

/// What a collection's elements represent to the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// Carries vorticity, participates in diffusion and convection.
    Active,
    /// Carries unknown strengths solved by the BEM.
    Reactive,
    /// Tracers and field points, no strength.
    Inert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionKind {
    Lagrangian,
    Bodybound,
    Fixed,
}

macro_rules! decl_particle_vec {
    (pub struct $struct_name:ident { $(pub $field_name:ident: Vec<$field_type:ty> | $default_value:expr),*$(,)? }) => {
        pub struct $struct_name {
            $(
                pub $field_name: Vec<$field_type>,
            )*
        }

        impl $struct_name {
            pub fn default(len: usize) -> Self {
                Self {
                    $(
                        $field_name: (0..len).map(|_| $default_value).collect::<Vec<$field_type>>(),
                    )*
                }
            }

            pub fn swap(&mut self, i: usize, j: usize) {
                $(
                    self.$field_name.swap(i, j);
                )*
            }

            pub fn truncate(&mut self, len: usize) {
                $(
                    self.$field_name.truncate(len);
                )*
            }

            pub fn extend(&mut self, num_elements: usize) {
                $(
                    self.$field_name.extend((0..num_elements).map::<$field_type, _>(|_| $default_value));
                )*
            }
        }
    }
}

decl_particle_vec! {
    pub struct ParticleVec {
        // primary state, extended by the VRM and by splitting
        pub position: Vec<V3> | V3::zeros(),
        pub strength: Vec<V3> | V3::zeros(),
        pub radius: Vec<FT> | 0.,

        // auxiliary state, resized by the owner after the primary arrays grow
        pub elong: Vec<FT> | 1.,
        pub velocity: Vec<V3> | V3::zeros(),
        pub velgrad: Vec<M3> | M3::zeros(),
    }
}

/// A collection of point elements: vortex particles or inert field points.
pub struct Points {
    pub pv: ParticleVec,
    elemt: ElementKind,
    movet: MotionKind,
    body: Option<Arc<Body>>,
    max_str: FT,
}

impl Points {
    /// Build from a flat value vector. Active/reactive points take 7-tuples
    /// (x,y,z, sx,sy,sz, r); inert points take plain coordinate triples.
    /// A zero input radius is replaced by `vdelta`.
    pub fn new(invec: &[FT], elemt: ElementKind, movet: MotionKind, body: Option<Arc<Body>>, vdelta: FT) -> Self {
        let mut pts = Points {
            pv: ParticleVec::default(0),
            elemt,
            movet,
            body,
            max_str: 0.,
        };
        pts.add_new(invec, vdelta);
        pts
    }

    pub fn get_n(&self) -> usize {
        self.pv.position.len()
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

    /// Append new elements, growing every array in lockstep.
    pub fn add_new(&mut self, invec: &[FT], vdelta: FT) {
        if invec.is_empty() {
            return;
        }

        if self.elemt == ElementKind::Inert {
            assert!(invec.len() % 3 == 0, "input vector not a multiple of 3");
            for chunk in invec.chunks_exact(3) {
                self.pv.position.push([chunk[0], chunk[1], chunk[2]].into());
                self.pv.strength.push(V3::zeros());
                self.pv.radius.push(0.);
            }
        } else {
            assert!(invec.len() % 7 == 0, "input vector not a multiple of 7");
            for chunk in invec.chunks_exact(7) {
                self.pv.position.push([chunk[0], chunk[1], chunk[2]].into());
                self.pv.strength.push([chunk[3], chunk[4], chunk[5]].into());
                let r = if chunk[6] == 0. { vdelta } else { chunk[6] };
                assert!(r > 0., "core radius must be positive");
                self.pv.radius.push(r);
            }
        }

        let n = self.pv.position.len();
        self.resize(n);
    }

    /// Truncate or zero-extend the auxiliary arrays to match a new element
    /// count chosen by the VRM or the splitter.
    pub fn resize(&mut self, new_n: usize) {
        assert!(self.pv.position.len() == new_n);
        assert!(self.pv.strength.len() == new_n);
        assert!(self.pv.radius.len() == new_n);

        self.pv.elong.resize(new_n, 1.);
        self.pv.velocity.resize(new_n, V3::zeros());
        self.pv.velgrad.resize(new_n, M3::zeros());
    }

    /// Cache max |s| for relative-threshold decisions downstream.
    pub fn update_max_str(&mut self) {
        self.max_str = self
            .pv
            .strength
            .iter()
            .map(|s| s.norm())
            .fold(0., FT::max);
    }

    pub fn get_max_str(&self) -> FT {
        self.max_str
    }

    pub fn get_max_elong(&self) -> FT {
        self.pv.elong.iter().cloned().fold(0., FT::max)
    }

    pub fn get_total_circ(&self) -> V3 {
        self.pv.strength.iter().fold(V3::zeros(), |acc, s| acc + s)
    }

    /// Total impulse contribution, sum of x_i cross s_i.
    pub fn get_total_impulse(&self) -> V3 {
        self.pv
            .position
            .iter()
            .zip(self.pv.strength.iter())
            .fold(V3::zeros(), |acc, (x, s)| acc + x.cross(s))
    }

    pub fn all_finite(&self) -> bool {
        self.pv.position.iter().all(|x| x.iter().all(|c| c.is_finite()))
            && self.pv.strength.iter().all(|s| s.iter().all(|c| c.is_finite()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_new_assigns_vdelta_for_zero_radius() {
        let invec = [0., 0., 0., 1., 0., 0., 0., 1., 1., 1., 0., 1., 0., 0.5];
        let pts = Points::new(&invec, ElementKind::Active, MotionKind::Lagrangian, None, 0.25);
        assert_eq!(pts.get_n(), 2);
        assert_eq!(pts.pv.radius[0], 0.25);
        assert_eq!(pts.pv.radius[1], 0.5);
        assert_eq!(pts.pv.elong.len(), 2);
        assert_eq!(pts.pv.velocity.len(), 2);
    }

    #[test]
    fn impulse_of_single_particle() {
        let invec = [1., 0., 0., 0., 1., 0., 0.1];
        let pts = Points::new(&invec, ElementKind::Active, MotionKind::Lagrangian, None, 0.1);
        let imp = pts.get_total_impulse();
        // x cross s = (1,0,0) x (0,1,0) = (0,0,1)
        assert!((imp - crate::vec3f(0., 0., 1.)).norm() < 1e-6);
    }

    #[test]
    fn inert_points_take_triples() {
        let invec = [0., 0., 0., 1., 2., 3.];
        let mut pts = Points::new(&invec, ElementKind::Inert, MotionKind::Fixed, None, 0.1);
        assert_eq!(pts.get_n(), 2);
        pts.update_max_str();
        assert_eq!(pts.get_max_str(), 0.);
    }
}
