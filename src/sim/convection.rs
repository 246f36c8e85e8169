use crate::concurrency::par_iter_mut3;
use crate::error::SimError;
use crate::floating_type_mod::FT;
use crate::sim::bem::{solve_bem, Bem};
use crate::sim::collections::Collection;
use crate::sim::kernels::CoreKind;
use crate::sim::particles::MotionKind;
use crate::sim::velocities::{find_vels, gather_panel_sources, gather_particle_sources};
use crate::{M3, V3};

/// Convection of all elements by the induced velocity field plus the
/// freestream and body motion. First- and second-order forward
/// integration; each stage re-solves the BEM so panel strengths are
/// current when velocities are sampled.
pub struct Convection {
    core: CoreKind,
}

struct SavedState {
    position: Vec<V3>,
    strength: Vec<V3>,
    elong: Vec<FT>,
}

impl Convection {
    pub fn new(core: CoreKind) -> Self {
        Convection { core }
    }

    pub fn get_core_func(&self) -> CoreKind {
        self.core
    }

    /// Update velocities (and gradients on active particles) everywhere,
    /// without moving anything. Used at output time and by the first step.
    pub fn update_all_vels(
        &self,
        time: FT,
        fs: V3,
        vort: &mut Vec<Collection>,
        bdry: &mut [Collection],
        fldpt: &mut [Collection],
        bem: &mut Bem,
    ) -> Result<(), SimError> {
        solve_bem(time, fs, vort, bdry, bem, self.core)?;
        let parts = gather_particle_sources(vort);
        let panels = gather_panel_sources(bdry);
        find_vels(self.core, fs, &parts, &panels, vort);
        find_vels(self.core, fs, &parts, &panels, fldpt);
        Ok(())
    }

    /// Forward Euler.
    pub fn advect_1st(
        &self,
        time: FT,
        dt: FT,
        fs: V3,
        vort: &mut Vec<Collection>,
        bdry: &mut [Collection],
        fldpt: &mut [Collection],
        bem: &mut Bem,
    ) -> Result<(), SimError> {
        self.update_all_vels(time, fs, vort, bdry, fldpt, bem)?;
        if dt == 0. {
            return Ok(());
        }

        apply_motion(vort, dt);
        apply_motion(fldpt, dt);
        move_boundaries(time, dt, bdry, bem);
        Ok(())
    }

    /// Midpoint second-order integration, the default.
    pub fn advect_2nd(
        &self,
        time: FT,
        dt: FT,
        fs: V3,
        vort: &mut Vec<Collection>,
        bdry: &mut [Collection],
        fldpt: &mut [Collection],
        bem: &mut Bem,
    ) -> Result<(), SimError> {
        if dt == 0. {
            return self.update_all_vels(time, fs, vort, bdry, fldpt, bem);
        }

        // stage 1: velocities at the current state
        self.update_all_vels(time, fs, vort, bdry, fldpt, bem)?;

        let saved_vort = save_state(vort);
        let saved_fld = save_state(fldpt);

        // move to the midpoint
        apply_motion(vort, 0.5 * dt);
        apply_motion(fldpt, 0.5 * dt);
        move_boundaries(time, 0.5 * dt, bdry, bem);

        // stage 2: velocities at the midpoint state
        self.update_all_vels(time + 0.5 * dt, fs, vort, bdry, fldpt, bem)?;

        // full step from the saved state with midpoint derivatives
        restore_and_step(vort, &saved_vort, dt);
        restore_and_step(fldpt, &saved_fld, dt);
        move_boundaries(time + 0.5 * dt, 0.5 * dt, bdry, bem);
        Ok(())
    }
}

/// Advance particle positions, apply vorticity stretching, and track
/// elongation, all from each particle's own sampled velocity field.
fn apply_motion(colls: &mut [Collection], dt: FT) {
    for coll in colls.iter_mut() {
        let Collection::Points(pts) = coll else { continue };
        if pts.get_movet() != MotionKind::Lagrangian {
            continue;
        }

        let velocity = &pts.pv.velocity;
        let velgrad = &pts.pv.velgrad;
        let inert = pts.is_inert();
        par_iter_mut3(
            &mut pts.pv.position,
            &mut pts.pv.strength,
            &mut pts.pv.elong,
            |i, pos, str, elong| {
                *pos += velocity[i] * dt;
                if inert {
                    return;
                }
                let factor = stretch_factor(*str, &velgrad[i], dt);
                *str += velgrad[i] * *str * dt;
                *elong = FT::max(1., *elong * factor);
            },
        );
    }
}

/// Re-apply the saved pre-step state and take one full step with the
/// currently stored (midpoint) velocities and gradients.
fn restore_and_step(colls: &mut [Collection], saved: &[Option<SavedState>], dt: FT) {
    for (coll, state) in colls.iter_mut().zip(saved.iter()) {
        let (Collection::Points(pts), Some(state)) = (coll, state) else {
            continue;
        };
        if pts.get_movet() != MotionKind::Lagrangian {
            continue;
        }

        let velocity = &pts.pv.velocity;
        let velgrad = &pts.pv.velgrad;
        let inert = pts.is_inert();
        let (sp, ss, se) = (&state.position, &state.strength, &state.elong);
        par_iter_mut3(
            &mut pts.pv.position,
            &mut pts.pv.strength,
            &mut pts.pv.elong,
            |i, pos, str, elong| {
                *pos = sp[i] + velocity[i] * dt;
                if inert {
                    return;
                }
                // midpoint stretching acts on the midpoint strength but is
                // applied from the pre-step value
                let ds = velgrad[i] * *str;
                *str = ss[i] + ds * dt;
                *elong = FT::max(1., se[i] * stretch_factor(ss[i], &velgrad[i], dt));
            },
        );
    }
}

/// Stretch factor of the unit strength direction under (I + dt J).
fn stretch_factor(str: V3, velgrad: &M3, dt: FT) -> FT {
    let smag = str.norm();
    if smag < FT::EPSILON {
        return 1.;
    }
    let shat = str / smag;
    (shat + velgrad * shat * dt).norm()
}

fn save_state(colls: &[Collection]) -> Vec<Option<SavedState>> {
    colls
        .iter()
        .map(|coll| match coll {
            Collection::Points(pts) if pts.get_movet() == MotionKind::Lagrangian => Some(SavedState {
                position: pts.pv.position.clone(),
                strength: pts.pv.strength.clone(),
                elong: pts.pv.elong.clone(),
            }),
            _ => None,
        })
        .collect()
}

fn move_boundaries(time: FT, dt: FT, bdry: &mut [Collection], bem: &mut Bem) {
    let mut any_moved = false;
    for coll in bdry.iter_mut() {
        if let Collection::Surfaces(surf) = coll {
            any_moved |= surf.move_with_body(time, dt);
        }
    }
    if any_moved {
        bem.mark_geometry_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::particles::{ElementKind, Points};
    use crate::vec3f;

    #[test]
    fn euler_advects_with_the_freestream() {
        let batch = [0., 0., 0., 0., 0., 1., 0.1];
        let pts = Points::new(&batch, ElementKind::Active, MotionKind::Lagrangian, None, 0.1);
        let mut vort = vec![Collection::Points(pts)];
        let mut bdry: Vec<Collection> = Vec::new();
        let mut fldpt: Vec<Collection> = Vec::new();
        let mut bem = Bem::new();

        let conv = Convection::new(CoreKind::CompactExponential);
        conv.advect_1st(0., 0.1, vec3f(1., 0., 0.), &mut vort, &mut bdry, &mut fldpt, &mut bem)
            .unwrap();

        let Collection::Points(p) = &vort[0] else { unreachable!() };
        assert!((p.pv.position[0] - vec3f(0.1, 0., 0.)).norm() < 1e-6);
        // an isolated particle induces nothing on itself
        assert!((p.pv.strength[0] - vec3f(0., 0., 1.)).norm() < 1e-6);
    }

    #[test]
    fn rk2_matches_euler_in_a_uniform_stream() {
        let batch = [0., 0., 0., 0., 0., 1., 0.1];
        let make = || {
            vec![Collection::Points(Points::new(
                &batch,
                ElementKind::Active,
                MotionKind::Lagrangian,
                None,
                0.1,
            ))]
        };
        let mut bdry: Vec<Collection> = Vec::new();
        let mut fldpt: Vec<Collection> = Vec::new();

        let conv = Convection::new(CoreKind::CompactExponential);

        let mut v1 = make();
        let mut bem1 = Bem::new();
        conv.advect_1st(0., 0.2, vec3f(0.3, -0.2, 0.1), &mut v1, &mut bdry, &mut fldpt, &mut bem1)
            .unwrap();

        let mut v2 = make();
        let mut bem2 = Bem::new();
        conv.advect_2nd(0., 0.2, vec3f(0.3, -0.2, 0.1), &mut v2, &mut bdry, &mut fldpt, &mut bem2)
            .unwrap();

        let Collection::Points(p1) = &v1[0] else { unreachable!() };
        let Collection::Points(p2) = &v2[0] else { unreachable!() };
        assert!((p1.pv.position[0] - p2.pv.position[0]).norm() < 1e-6);
    }

    #[test]
    fn fixed_field_points_do_not_move() {
        let batch = [1., 2., 3.];
        let pts = Points::new(&batch, ElementKind::Inert, MotionKind::Fixed, None, 0.1);
        let mut fldpt = vec![Collection::Points(pts)];
        let mut vort: Vec<Collection> = Vec::new();
        let mut bdry: Vec<Collection> = Vec::new();
        let mut bem = Bem::new();

        let conv = Convection::new(CoreKind::CompactExponential);
        conv.advect_1st(0., 0.5, vec3f(1., 1., 1.), &mut vort, &mut bdry, &mut fldpt, &mut bem)
            .unwrap();

        let Collection::Points(p) = &fldpt[0] else { unreachable!() };
        assert!((p.pv.position[0] - vec3f(1., 2., 3.)).norm() < 1e-6);
    }
}
