use crate::floating_type_mod::FT;
use crate::sim::particles::Points;
use crate::{M3, V3};

/// Split particles whose accumulated elongation exceeds `elong_thresh`
/// into two, offset along the dominant stretch axis of the local velocity
/// gradient. Appends to the primary arrays; the caller resizes the rest.
/// Returns the number of particles split.
pub fn split_elongated(pts: &mut Points, adaptive_radii: bool, elong_thresh: FT) -> usize {
    let n = pts.get_n();
    let mut num_split = 0;

    for i in 0..n {
        if pts.pv.elong[i] <= elong_thresh {
            continue;
        }

        let dir = principal_stretch_axis(&pts.pv.velgrad[i], pts.pv.strength[i]);
        let r = pts.pv.radius[i];
        let offset = dir * (0.5 * r);

        let child_str = pts.pv.strength[i] * 0.5;
        let child_rad = if adaptive_radii {
            // halving the strength halves the carried volume
            r * (0.5 as FT).powf(1. / 3.)
        } else {
            r
        };

        let pos = pts.pv.position[i];

        // first child replaces the parent, second child is appended
        pts.pv.position[i] = pos - offset;
        pts.pv.strength[i] = child_str;
        pts.pv.radius[i] = child_rad;
        pts.pv.elong[i] = 1.;

        pts.pv.position.push(pos + offset);
        pts.pv.strength.push(child_str);
        pts.pv.radius.push(child_rad);

        num_split += 1;
    }

    if num_split > 0 {
        println!("    split {} elongated particles", num_split);
    }
    num_split
}

/// Most extensional eigenvector of the symmetric part of the velocity
/// gradient. Falls back to the strength direction when the gradient
/// carries no information.
fn principal_stretch_axis(velgrad: &M3, strength: V3) -> V3 {
    let sym = (velgrad + velgrad.transpose()) * 0.5;

    if sym.norm() < FT::EPSILON {
        return if strength.norm_squared() > 0. {
            strength.normalize()
        } else {
            V3::x()
        };
    }

    let eig = sym.symmetric_eigen();
    let mut imax = 0;
    for k in 1..3 {
        if eig.eigenvalues[k] > eig.eigenvalues[imax] {
            imax = k;
        }
    }
    eig.eigenvectors.column(imax).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::particles::{ElementKind, MotionKind};
    use crate::vec3f;

    #[test]
    fn elongated_particle_splits_in_two() {
        let batch = [0., 0., 0., 0., 0., 1., 0.1];
        let mut pts = Points::new(&batch, ElementKind::Active, MotionKind::Lagrangian, None, 0.1);
        pts.pv.elong[0] = 1.4;
        // pure stretch along x
        pts.pv.velgrad[0] = M3::from_diagonal(&vec3f(1., -0.5, -0.5));

        let nsplit = split_elongated(&mut pts, false, 1.2);
        assert_eq!(nsplit, 1);
        assert_eq!(pts.pv.position.len(), 2);

        pts.resize(pts.pv.position.len());
        assert_eq!(pts.get_n(), 2);

        // children straddle the origin along x, half strength each
        assert!(pts.pv.position[0].x * pts.pv.position[1].x < 0.);
        assert!((pts.pv.position[0].x + pts.pv.position[1].x).abs() < 1e-7);
        assert!((pts.pv.position[0].x.abs() - 0.05).abs() < 1e-6);
        assert!(pts.pv.position[0].y.abs() < 1e-6 && pts.pv.position[0].z.abs() < 1e-6);
        assert!((pts.get_total_circ() - vec3f(0., 0., 1.)).norm() < 1e-6);
        assert_eq!(pts.pv.elong[0], 1.);
        assert_eq!(pts.pv.elong[1], 1.);
    }

    #[test]
    fn relaxed_particles_are_untouched() {
        let batch = [0., 0., 0., 0., 0., 1., 0.1];
        let mut pts = Points::new(&batch, ElementKind::Active, MotionKind::Lagrangian, None, 0.1);
        let nsplit = split_elongated(&mut pts, false, 1.2);
        assert_eq!(nsplit, 0);
        assert_eq!(pts.get_n(), 1);
    }
}
