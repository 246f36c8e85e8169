use crate::floating_type_mod::FT;
use crate::sim::collections::Collection;
use crate::sim::particles::{ElementKind, MotionKind, Points};

/// Emit one particle per reactive panel at the given standoff above the
/// surface, carrying the panel's current sheet circulation. New particles
/// join the primary particle collection, which is created on demand.
pub fn shed_from_surfaces(bdry: &[Collection], vort: &mut Vec<Collection>, offset_distance: FT, vdelta: FT) -> usize {
    let mut num_shed = 0;

    for coll in bdry.iter() {
        let Collection::Surfaces(surf) = coll else { continue };
        if surf.get_elemt() != ElementKind::Reactive {
            continue;
        }

        let new_pts = surf.represent_as_particles(offset_distance, vdelta);
        num_shed += new_pts.len() / 7;

        match vort.last_mut() {
            Some(Collection::Points(pts)) => pts.add_new(&new_pts, vdelta),
            _ => vort.push(Collection::Points(Points::new(
                &new_pts,
                ElementKind::Active,
                MotionKind::Lagrangian,
                None,
                vdelta,
            ))),
        }
    }

    num_shed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::surfaces::{ElementPacket, Surfaces};
    use crate::V3;

    #[test]
    fn shed_transfers_panel_circulation_to_particles() {
        let geom = ElementPacket {
            x: vec![0., 0., 0., 1., 0., 0., 0., 1., 0.],
            idx: vec![0, 1, 2],
            val: vec![],
        };
        let mut surf = Surfaces::new(&geom, ElementKind::Reactive, MotionKind::Fixed, None);
        surf.set_vort_str(0, 1., 2.);
        let panel_circ = surf.get_total_circ();
        let bdry = vec![Collection::Surfaces(surf)];

        let mut vort: Vec<Collection> = Vec::new();
        let n = shed_from_surfaces(&bdry, &mut vort, 0.01, 0.05);
        assert_eq!(n, 1);
        assert_eq!(vort.len(), 1);

        let Collection::Points(pts) = &vort[0] else { unreachable!() };
        assert_eq!(pts.get_n(), 1);
        assert!((pts.get_total_circ() - panel_circ).norm() < 1e-6);
        // particle sits above the surface
        assert!(pts.pv.position[0].z > 0.);

        // shedding again appends to the existing collection
        let n2 = shed_from_surfaces(&bdry, &mut vort, 0.01, 0.05);
        assert_eq!(n2, 1);
        let Collection::Points(pts) = &vort[0] else { unreachable!() };
        assert_eq!(pts.get_n(), 2);
        let total: V3 = pts.get_total_circ();
        assert!((total - panel_circ * 2.).norm() < 1e-6);
    }
}
