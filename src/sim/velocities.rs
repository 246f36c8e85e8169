use crate::concurrency::par_iter_mut2;
use crate::floating_type_mod::{FRAC_1_PI, FT};
use crate::sim::collections::Collection;
use crate::sim::kernels::{kernel_0v_0b, kernel_0v_0bg, kernel_2v_0b, kernel_2v_0bg, CoreKind};
use crate::sim::particles::Points;
use crate::{M3, V3};

const FRAC_1_4PI: FT = 0.25 * FRAC_1_PI;

/// Flat snapshot of every vortex particle source, taken before a velocity
/// evaluation so sources and targets may live in the same collection list.
pub struct ParticleSources {
    pos: Vec<V3>,
    rad: Vec<FT>,
    str: Vec<V3>,
}

/// Flat snapshot of every panel source with its whole-panel strength.
pub struct PanelSources {
    nodes: Vec<[V3; 3]>,
    str: Vec<V3>,
}

pub fn gather_particle_sources(colls: &[Collection]) -> ParticleSources {
    let mut src = ParticleSources {
        pos: Vec::new(),
        rad: Vec::new(),
        str: Vec::new(),
    };
    for coll in colls {
        let Collection::Points(pts) = coll else { continue };
        if pts.is_inert() {
            continue;
        }
        src.pos.extend_from_slice(&pts.pv.position);
        src.rad.extend_from_slice(&pts.pv.radius);
        src.str.extend_from_slice(&pts.pv.strength);
    }
    src
}

pub fn gather_panel_sources(colls: &[Collection]) -> PanelSources {
    let mut src = PanelSources {
        nodes: Vec::new(),
        str: Vec::new(),
    };
    for coll in colls {
        let Collection::Surfaces(surf) = coll else { continue };
        for i in 0..surf.get_npanels() {
            src.nodes.push(surf.panel_nodes(i));
            src.str.push(surf.panel_world_strength(i));
        }
    }
    src
}

/// Induced velocity at one target point (without freestream).
pub fn eval_vel(core: CoreKind, parts: &ParticleSources, panels: &PanelSources, tx: V3, tr: FT) -> V3 {
    let mut vel = V3::zeros();
    for k in 0..parts.pos.len() {
        vel += kernel_0v_0b(core, parts.pos[k], parts.rad[k], parts.str[k], tx, tr);
    }
    for k in 0..panels.nodes.len() {
        let [n0, n1, n2] = panels.nodes[k];
        vel += kernel_2v_0b(core, n0, n1, n2, panels.str[k], tx, tr);
    }
    vel * FRAC_1_4PI
}

/// Induced velocity and velocity gradient at one target point.
pub fn eval_vel_grad(core: CoreKind, parts: &ParticleSources, panels: &PanelSources, tx: V3, tr: FT) -> (V3, M3) {
    let mut vel = V3::zeros();
    let mut grad = M3::zeros();
    for k in 0..parts.pos.len() {
        let (v, g) = kernel_0v_0bg(core, parts.pos[k], parts.rad[k], parts.str[k], tx, tr);
        vel += v;
        grad += g;
    }
    for k in 0..panels.nodes.len() {
        let [n0, n1, n2] = panels.nodes[k];
        let (v, g) = kernel_2v_0bg(core, n0, n1, n2, panels.str[k], tx, tr);
        vel += v;
        grad += g;
    }
    (vel * FRAC_1_4PI, grad * FRAC_1_4PI)
}

/// Fill one Points collection's velocity (and gradient) arrays from the
/// freestream plus the given sources. Parallel over targets.
pub fn find_vels_points(
    core: CoreKind,
    fs: V3,
    parts: &ParticleSources,
    panels: &PanelSources,
    pts: &mut Points,
    with_grads: bool,
) {
    let position = &pts.pv.position;
    let radius = &pts.pv.radius;
    par_iter_mut2(&mut pts.pv.velocity, &mut pts.pv.velgrad, |i, vel, grad| {
        if with_grads {
            let (v, g) = eval_vel_grad(core, parts, panels, position[i], radius[i]);
            *vel = fs + v;
            *grad = g;
        } else {
            *vel = fs + eval_vel(core, parts, panels, position[i], radius[i]);
            *grad = M3::zeros();
        }
    });
}

/// Evaluate velocities on every Points collection in `targets`. Gradients
/// are computed for active collections, which need them for stretching.
pub fn find_vels(
    core: CoreKind,
    fs: V3,
    parts: &ParticleSources,
    panels: &PanelSources,
    targets: &mut [Collection],
) {
    for coll in targets.iter_mut() {
        if let Collection::Points(pts) = coll {
            let with_grads = !pts.is_inert();
            find_vels_points(core, fs, parts, panels, pts, with_grads);
        }
    }
}
