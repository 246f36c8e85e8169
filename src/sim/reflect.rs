use std::sync::atomic::{AtomicUsize, Ordering};

use crate::concurrency::par_iter_mut2;
use crate::floating_type_mod::FT;
use crate::sim::collections::Collection;
use crate::sim::surfaces::Surfaces;
use crate::V3;

/// Closest point on triangle (a, b, c) to p.
pub fn closest_point_on_triangle(p: V3, a: V3, b: V3, c: V3) -> V3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0. && d2 <= 0. {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0. && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0. && d1 >= 0. && d3 <= 0. {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0. && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0. && d2 >= 0. && d6 <= 0. {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0. && (d4 - d3) >= 0. && (d5 - d6) >= 0. {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1. / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Signed distance from p to a closed panel surface: negative inside.
/// Also returns the closest surface point and the outward normal there.
pub fn signed_distance(surf: &Surfaces, p: V3) -> (FT, V3, V3) {
    let mut best_d2 = FT::INFINITY;
    let mut best_point = V3::zeros();
    let mut best_norm = V3::zeros();

    for i in 0..surf.get_npanels() {
        let [a, b, c] = surf.panel_nodes(i);
        let cp = closest_point_on_triangle(p, a, b, c);
        let d2 = (p - cp).norm_squared();
        if d2 < best_d2 {
            best_d2 = d2;
            best_point = cp;
            best_norm = surf.get_norm()[i];
        }
    }

    let dist = best_d2.sqrt();
    let sign = if (p - best_point).dot(&best_norm) >= 0. { 1. } else { -1. };
    (sign * dist, best_point, best_norm)
}

/// Mirror every interior particle to the exterior at the same perpendicular
/// distance, preserving strength. Returns the number reflected.
pub fn reflect_interior(bdry: &[Collection], vort: &mut [Collection]) -> usize {
    let num_reflected = AtomicUsize::new(0);

    for coll in vort.iter_mut() {
        let Collection::Points(pts) = coll else { continue };
        if pts.is_inert() {
            continue;
        }

        for b in bdry.iter() {
            let Collection::Surfaces(surf) = b else { continue };
            if surf.get_npanels() == 0 {
                continue;
            }

            let counter = &num_reflected;
            crate::concurrency::par_iter_mut1(&mut pts.pv.position, |_, pos| {
                let (d, cp, norm) = signed_distance(surf, *pos);
                if d < 0. {
                    *pos = cp + norm * (-d);
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    }

    num_reflected.load(Ordering::Relaxed)
}

/// Enforce a minimum exterior standoff from every surface.
///
/// Mode 1 ("push"): particles closer than `cutoff` are moved out along the
/// surface normal to exactly `cutoff`, preserving strength.
/// Mode 0 ("trim"): same, but particles weaker than
/// `strength_frac * max |s|` are removed outright.
///
/// Returns the number of particles moved or removed.
pub fn clear_inner_layer(
    mode: u8,
    bdry: &[Collection],
    targets: &mut [Collection],
    strength_frac: FT,
    cutoff: FT,
) -> usize {
    assert!(mode <= 1);

    let surfaces: Vec<&Surfaces> = bdry
        .iter()
        .filter_map(|c| match c {
            Collection::Surfaces(s) if s.get_npanels() > 0 => Some(s),
            _ => None,
        })
        .collect();
    if surfaces.is_empty() {
        return 0;
    }

    let num_affected = AtomicUsize::new(0);

    for coll in targets.iter_mut() {
        let Collection::Points(pts) = coll else { continue };

        pts.update_max_str();
        let trim_below = strength_frac * pts.get_max_str();

        let n = pts.get_n();
        let mut kill = vec![false; n];

        {
            let counter = &num_affected;
            let strength = &pts.pv.strength;
            let surfaces = &surfaces;
            par_iter_mut2(&mut pts.pv.position, &mut kill, |i, pos, killed| {
                for surf in surfaces.iter() {
                    let (d, cp, norm) = signed_distance(surf, *pos);
                    if d >= cutoff {
                        continue;
                    }
                    if mode == 0 && strength[i].norm() < trim_below {
                        *killed = true;
                    } else {
                        *pos = cp + norm * cutoff;
                    }
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            });
        }

        // compact removed particles, all arrays in lockstep
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

    num_affected.load(Ordering::Relaxed)
}
