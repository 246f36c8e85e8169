use crate::error::SimError;
use crate::floating_type_mod::{FT, PI};
use crate::sim::bem::{solve_bem, Bem};
use crate::sim::collections::Collection;
use crate::sim::kernels::CoreKind;
use crate::sim::merge::merge_operation;
use crate::sim::reflect::{clear_inner_layer, reflect_interior};
use crate::sim::shed::shed_from_surfaces;
use crate::sim::vrm::Vrm;
use crate::V3;

/// One step of diffusion: strength exchange from bodies to particles and
/// among particles, with the housekeeping that keeps the particle field
/// healthy near surfaces.
pub struct Diffusion {
    vrm: Vrm,

    h_nu: FT,
    core_func: CoreKind,

    is_inviscid: bool,
    adaptive_radii: bool,

    // nominal separation normalized by h_nu
    nom_sep_scaled: FT,

    // particle core size is nominal separation times this
    particle_overlap: FT,

    // merge aggressivity
    merge_thresh: FT,

    // true: shed *at* the boundary, diffuse those particles, then push out;
    // false: diffuse, push out, then shed at the correct standoff
    shed_before_diffuse: bool,
}

impl Default for Diffusion {
    fn default() -> Self {
        Diffusion {
            vrm: Vrm::default(),
            h_nu: 0.1,
            core_func: CoreKind::default(),
            is_inviscid: false,
            adaptive_radii: false,
            nom_sep_scaled: (8.0 as FT).sqrt(),
            particle_overlap: 1.5,
            merge_thresh: 0.2,
            shed_before_diffuse: true,
        }
    }
}

impl Diffusion {
    pub fn set_diffuse(&mut self, do_diffuse: bool) {
        self.is_inviscid = !do_diffuse;
    }

    pub fn get_diffuse(&self) -> bool {
        !self.is_inviscid
    }

    pub fn set_amr(&mut self, do_amr: bool) {
        self.adaptive_radii = do_amr;
        if do_amr {
            self.set_diffuse(true);
        }
    }

    pub fn get_amr(&self) -> bool {
        self.adaptive_radii
    }

    pub fn set_vrm(&mut self, vrm: Vrm) {
        self.vrm = vrm;
    }

    pub fn get_nom_sep_scaled(&self) -> FT {
        self.nom_sep_scaled
    }

    pub fn get_nom_sep(&self, hnu: FT) -> FT {
        self.nom_sep_scaled * hnu
    }

    pub fn get_particle_overlap(&self) -> FT {
        self.particle_overlap
    }

    pub fn get_core_func(&self) -> CoreKind {
        self.core_func
    }

    /// Take a full diffusion step. The stage order is fixed; nothing may be
    /// reordered across the BEM-solve / shed / redistribution boundary.
    pub fn step(
        &mut self,
        time: FT,
        dt: FT,
        re: FT,
        vdelta: FT,
        fs: V3,
        vort: &mut Vec<Collection>,
        bdry: &mut Vec<Collection>,
        bem: &mut Bem,
    ) -> Result<(), SimError> {
        if self.is_inviscid {
            return Ok(());
        }

        println!("  inside diffusion step with dt={}", dt);

        assert!(re != 0., "cannot divide by zero Reynolds number");
        self.h_nu = (dt / re).sqrt();
        let ips = self.get_nom_sep(self.h_nu);

        self.vrm.set_adaptive_radii(self.adaptive_radii);

        // push away particles inside or too close to the body, then bring
        // the panel strengths up to date with the cleaned cloud
        let d_inner = ips / (2. * PI).sqrt();
        clear_inner_layer(1, bdry, vort, 0., d_inner);
        solve_bem(time, fs, vort, bdry, bem, self.core_func)?;

        // generate particles at boundary surfaces so the newly shed
        // circulation takes part in this step's redistribution
        if self.shed_before_diffuse {
            shed_from_surfaces(bdry, vort, 0.01 * self.h_nu, vdelta);
        }

        // diffuse strength among existing particles
        for coll in vort.iter_mut() {
            let Collection::Points(pts) = coll else { continue };
            if pts.is_inert() {
                continue;
            }
            pts.update_max_str();
            if pts.get_max_str() == 0. {
                continue;
            }

            println!("    computing diffusion among {} particles", pts.get_n());
            let new_n = {
                let pv = &mut pts.pv;
                self.vrm.diffuse_all(
                    &mut pv.position,
                    &mut pv.strength,
                    &mut pv.radius,
                    self.h_nu,
                    self.particle_overlap,
                )
            };
            pts.resize(new_n);
        }

        // redistribution works in free space; fold any interior particles
        // back out
        reflect_interior(bdry, vort);

        // clean up potentially-dense areas
        merge_operation(vort, self.particle_overlap, self.merge_thresh, self.adaptive_radii);

        // remove the innermost layer, which the panel strengths themselves
        // will represent
        clear_inner_layer(1, bdry, vort, 0., vdelta / self.particle_overlap);

        // generate particles above boundary surfaces at the centroid of one
        // step of diffusion from a flat plate
        if !self.shed_before_diffuse {
            shed_from_surfaces(bdry, vort, self.h_nu * (4. / PI).sqrt(), vdelta);
        }

        // merge again if the cleanup did any work
        if !bdry.is_empty() {
            merge_operation(vort, self.particle_overlap, self.merge_thresh, self.adaptive_radii);
        }

        // now is a fine time to reset the cached max strengths
        for coll in vort.iter_mut() {
            coll.update_max_str();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::particles::{ElementKind, MotionKind, Points};
    use crate::vec3f;

    /// A free cloud with no boundaries: diffusion must conserve total
    /// circulation to solver tolerance.
    #[test]
    fn free_space_diffusion_conserves_circulation() {
        let re = 100.;
        let dt = 0.01;
        let h_nu = ((dt / re) as FT).sqrt();
        let ips = (8.0 as FT).sqrt() * h_nu;
        let vdelta = 1.5 * ips;

        // small lattice cloud with a smooth strength bump
        let mut batch: Vec<FT> = Vec::new();
        for i in -3i32..=3 {
            for j in -3i32..=3 {
                for k in -3i32..=3 {
                    let x = i as FT * ips;
                    let y = j as FT * ips;
                    let z = k as FT * ips;
                    let r2 = x * x + y * y + z * z;
                    let w = (-r2 / (4. * ips * ips)).exp();
                    batch.extend_from_slice(&[x, y, z, w, 0., 0., vdelta]);
                }
            }
        }
        let pts = Points::new(&batch, ElementKind::Active, MotionKind::Lagrangian, None, vdelta);
        let mut vort = vec![Collection::Points(pts)];
        let mut bdry: Vec<Collection> = Vec::new();
        let mut bem = Bem::new();

        let circ_before = vort[0].get_total_circ();

        let mut diff = Diffusion::default();
        for _ in 0..3 {
            diff.step(0., dt, re, vdelta, V3::zeros(), &mut vort, &mut bdry, &mut bem)
                .unwrap();
        }

        let circ_after: V3 = vort.iter().fold(V3::zeros(), |a, c| a + c.get_total_circ());
        assert!(
            (circ_after - circ_before).norm() < 1e-5 * circ_before.norm().max(1.),
            "circulation drifted {:?} -> {:?}",
            circ_before,
            circ_after
        );
    }

    #[test]
    fn inviscid_step_is_a_no_op() {
        let batch = [0., 0., 0., 1., 0., 0., 0.1];
        let pts = Points::new(&batch, ElementKind::Active, MotionKind::Lagrangian, None, 0.1);
        let mut vort = vec![Collection::Points(pts)];
        let mut bdry: Vec<Collection> = Vec::new();
        let mut bem = Bem::new();

        let mut diff = Diffusion::default();
        diff.set_diffuse(false);
        diff.step(0., 0.01, 100., 0.1, vec3f(1., 0., 0.), &mut vort, &mut bdry, &mut bem)
            .unwrap();

        let Collection::Points(p) = &vort[0] else { unreachable!() };
        assert_eq!(p.get_n(), 1);
        assert!((p.pv.strength[0] - vec3f(1., 0., 0.)).norm() < 1e-7);
    }
}
