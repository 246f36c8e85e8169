use crate::floating_type_mod::FT;
use crate::sim::particles::{ElementKind, MotionKind, Points};
use crate::sim::surfaces::Surfaces;
use crate::V3;

/// Polymorphic element container. The set of variants is closed, so
/// dispatch is a plain match.
pub enum Collection {
    Points(Points),
    Surfaces(Surfaces),
}

impl Collection {
    pub fn get_n(&self) -> usize {
        match self {
            Collection::Points(p) => p.get_n(),
            Collection::Surfaces(s) => s.get_n(),
        }
    }

    pub fn is_inert(&self) -> bool {
        match self {
            Collection::Points(p) => p.is_inert(),
            Collection::Surfaces(s) => s.is_inert(),
        }
    }

    pub fn get_elemt(&self) -> ElementKind {
        match self {
            Collection::Points(p) => p.get_elemt(),
            Collection::Surfaces(s) => s.get_elemt(),
        }
    }

    pub fn get_movet(&self) -> MotionKind {
        match self {
            Collection::Points(p) => p.get_movet(),
            Collection::Surfaces(s) => s.get_movet(),
        }
    }

    pub fn get_total_circ(&self) -> V3 {
        match self {
            Collection::Points(p) => p.get_total_circ(),
            Collection::Surfaces(s) => s.get_total_circ(),
        }
    }

    pub fn get_total_impulse(&self) -> V3 {
        match self {
            Collection::Points(p) => p.get_total_impulse(),
            Collection::Surfaces(s) => s.get_total_impulse(),
        }
    }

    pub fn update_max_str(&mut self) {
        if let Collection::Points(p) = self {
            p.update_max_str();
        }
    }

    pub fn get_max_elong(&self) -> FT {
        match self {
            Collection::Points(p) => p.get_max_elong(),
            Collection::Surfaces(_) => 0.,
        }
    }
}
