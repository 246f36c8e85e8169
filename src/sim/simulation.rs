use std::sync::Arc;
use std::thread::JoinHandle;

use crate::error::SimError;
use crate::floating_type_mod::FT;
use crate::output::write_vtk_files;
use crate::sim::bem::{solve_bem, Bem, MAX_BEM_PANELS};
use crate::sim::body::Body;
use crate::sim::collections::Collection;
use crate::sim::convection::Convection;
use crate::sim::diffusion::Diffusion;
use crate::sim::kernels::CoreKind;
use crate::sim::particles::{ElementKind, MotionKind, Points};
use crate::sim::reflect::clear_inner_layer;
use crate::sim::split::split_elongated;
use crate::sim::status::StatusFile;
use crate::sim::surfaces::{ElementPacket, Surfaces};
use crate::sim::vrm::Vrm;
use crate::V3;

/// Hard limit on accumulated particle strain; beyond this the time step is
/// too large for the flow being computed.
const MAX_ELONGATION: FT = 1.5;

/// Elongation at which a particle is split in two.
const SPLIT_ELONGATION: FT = 1.2;

/// The complete mutable state of a run. Owned by `Simulation` and moved
/// wholesale into a worker thread for asynchronous stepping.
pub struct SimState {
    // primary simulation params
    re: FT,
    dt: FT,
    fs: V3,

    // rigid bodies with prescribed motion
    bodies: Vec<Arc<Body>>,

    // active Lagrangian elements
    pub vort: Vec<Collection>,
    // reactive elements, the BEM surfaces
    pub bdry: Vec<Collection>,
    // inert tracers and field points
    pub fldpt: Vec<Collection>,

    bem: Bem,
    diff: Diffusion,
    conv: Convection,
    sf: StatusFile,

    description: String,
    time: FT,
    nstep: usize,
    output_dt: FT,
    end_time: FT,
    use_end_time: bool,
    max_steps: usize,
    use_max_steps: bool,

    // for the impulse-derivative force estimate
    last_impulse: V3,
    last_time: FT,

    sim_is_initialized: bool,
}

impl SimState {
    fn new() -> Self {
        SimState {
            re: 100.,
            dt: 0.01,
            fs: V3::zeros(),
            bodies: Vec::new(),
            vort: Vec::new(),
            bdry: Vec::new(),
            fldpt: Vec::new(),
            bem: Bem::new(),
            diff: Diffusion::default(),
            conv: Convection::new(CoreKind::default()),
            sf: StatusFile::new(),
            description: String::new(),
            time: 0.,
            nstep: 0,
            output_dt: 0.,
            end_time: 100.,
            use_end_time: false,
            max_steps: 100,
            use_max_steps: false,
            last_impulse: V3::zeros(),
            last_time: 0.,
            sim_is_initialized: false,
        }
    }

    // ---- derived parameters ----

    pub fn get_hnu(&self) -> FT {
        (self.dt / self.re).sqrt()
    }

    pub fn get_ips(&self) -> FT {
        self.diff.get_nom_sep_scaled() * self.get_hnu()
    }

    pub fn get_vdelta(&self) -> FT {
        self.diff.get_particle_overlap() * self.get_ips()
    }

    // ---- runtime status ----

    pub fn get_nparts(&self) -> usize {
        self.vort.iter().map(|c| c.get_n()).sum()
    }

    pub fn get_nfldpts(&self) -> usize {
        self.fldpt.iter().map(|c| c.get_n()).sum()
    }

    pub fn get_npanels(&self) -> usize {
        self.bdry
            .iter()
            .map(|c| match c {
                Collection::Surfaces(s) => s.get_npanels(),
                _ => 0,
            })
            .sum()
    }

    // ---- element ingestion ----

    /// Receive a flat batch of particle 7-tuples.
    pub fn add_particles(&mut self, invec: &[FT]) {
        if invec.is_empty() {
            return;
        }
        assert!(invec.len() % 7 == 0, "input vector not a multiple of 7");

        let vdelta = self.get_vdelta();
        match self.vort.last_mut() {
            Some(Collection::Points(pts)) => pts.add_new(invec, vdelta),
            _ => self.vort.push(Collection::Points(Points::new(
                invec,
                ElementKind::Active,
                MotionKind::Lagrangian,
                None,
                vdelta,
            ))),
        }
    }

    /// Receive a flat batch of tracer coordinate triples.
    pub fn add_fldpts(&mut self, invec: &[FT], moves: bool) {
        if invec.is_empty() {
            return;
        }
        assert!(invec.len() % 3 == 0, "input vector not a multiple of 3");

        let move_type = if moves { MotionKind::Lagrangian } else { MotionKind::Fixed };

        // keep lagrangian tracers together, fixed rakes separate
        if move_type == MotionKind::Lagrangian {
            for coll in self.fldpt.iter_mut() {
                if let Collection::Points(pts) = coll {
                    if pts.get_movet() == MotionKind::Lagrangian {
                        pts.add_new(invec, 0.);
                        return;
                    }
                }
            }
        }
        self.fldpt.push(Collection::Points(Points::new(
            invec,
            ElementKind::Inert,
            move_type,
            None,
            0.,
        )));
    }

    /// Receive boundary geometry, merging into a collection with the same
    /// movement type and body where one exists.
    pub fn add_boundary(&mut self, body: Option<Arc<Body>>, geom: ElementPacket) {
        if geom.idx.is_empty() {
            return;
        }

        let move_type = if body.is_some() { MotionKind::Bodybound } else { MotionKind::Fixed };

        let imatch = self.bdry.iter().position(|coll| {
            let Collection::Surfaces(s) = coll else { return false };
            if s.get_elemt() != ElementKind::Reactive || s.get_movet() != move_type {
                return false;
            }
            match (s.get_body_ptr(), &body) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(&a, b),
                _ => false,
            }
        });

        match imatch {
            Some(i) => {
                if let Collection::Surfaces(s) = &mut self.bdry[i] {
                    s.add_new(&geom);
                }
            }
            None => self.bdry.push(Collection::Surfaces(Surfaces::new(
                &geom,
                ElementKind::Reactive,
                move_type,
                body,
            ))),
        }
        self.bem.mark_geometry_dirty();
    }

    pub fn add_body(&mut self, body: Arc<Body>) {
        println!("  added new body ({}), now have {}", body.get_name(), self.bodies.len() + 1);
        self.bodies.push(body);
    }

    /// Body lookup by name, creating a stationary "ground" body when no
    /// match exists.
    pub fn get_pointer_to_body(&mut self, name: &str) -> Arc<Body> {
        if let Some(b) = self.bodies.iter().find(|b| b.get_name() == name) {
            return b.clone();
        }
        println!("  no body matching ({}) found, creating (ground)", name);
        let ground = Arc::new(Body::new("ground"));
        self.add_body(ground.clone());
        ground
    }

    // ---- the step sequence ----

    /// The first step is special: solve the BEM and find velocities at
    /// t = 0, but do not advect.
    pub fn first_step(&mut self) -> Result<(), SimError> {
        println!("\nTaking step {} at t={}", self.nstep, self.time);
        self.conv
            .advect_2nd(self.time, 0., self.fs, &mut self.vort, &mut self.bdry, &mut self.fldpt, &mut self.bem)?;
        self.dump_stats_to_status()?;
        Ok(())
    }

    /// The vortex method proper: diffusion and convection with operator
    /// splitting, then particle-field housekeeping.
    pub fn step(&mut self) -> Result<(), SimError> {
        println!(
            "\nTaking step {} at t={} with n={}",
            self.nstep,
            self.time,
            self.get_nparts()
        );

        let vdelta = self.get_vdelta();
        self.diff.step(
            self.time,
            self.dt,
            self.re,
            vdelta,
            self.fs,
            &mut self.vort,
            &mut self.bdry,
            &mut self.bem,
        )?;

        // advect with no diffusion (updates BEM strengths per stage)
        self.conv.advect_2nd(
            self.time,
            self.dt,
            self.fs,
            &mut self.vort,
            &mut self.bdry,
            &mut self.fldpt,
            &mut self.bem,
        )?;

        // push field points out of objects every few steps
        let ips = self.get_ips();
        if self.nstep % 5 == 0 {
            clear_inner_layer(1, &self.bdry, &mut self.fldpt, 0., 0.5 * ips);
        }

        // step complete, now split any elongated particles
        for coll in self.vort.iter_mut() {
            let Collection::Points(pts) = coll else { continue };
            if pts.is_inert() {
                continue;
            }
            split_elongated(pts, self.diff.get_amr(), SPLIT_ELONGATION);
            let n = pts.pv.position.len();
            pts.resize(n);
        }

        self.time += self.dt;
        self.nstep += 1;

        self.dump_stats_to_status()?;
        self.check_simulation()
    }

    // ---- checks ----

    /// Conditions that prevent a run from starting.
    pub fn check_initialization(&self) -> Result<(), SimError> {
        if self.get_npanels() == 0 && self.get_nparts() == 0 {
            return Err(SimError::Init(
                "no flow features and no bodies; add one or both and rerun".to_string(),
            ));
        }

        if self.get_npanels() > 0 && self.get_nparts() == 0 {
            let zero_freestream = self.fs.norm_squared() < FT::EPSILON;
            let no_body_movement = !self.bodies.iter().any(|b| b.moves());
            let all_zero_bcs = !self.bdry.iter().any(|c| match c {
                Collection::Surfaces(s) => s.get_max_bc_value().abs() > FT::EPSILON,
                _ => false,
            });

            if zero_freestream && no_body_movement && all_zero_bcs {
                return Err(SimError::Init(
                    "no flow features, zero freestream, no movement, and no driven boundaries".to_string(),
                ));
            }

            if !self.diff.get_diffuse() {
                return Err(SimError::Init(
                    "a solid body without diffusion will not shed vorticity; turn on viscosity or add a flow feature"
                        .to_string(),
                ));
            }
        }

        if self.get_npanels() > MAX_BEM_PANELS {
            return Err(SimError::Init(format!(
                "boundary features have too many panels ({}); reduce Reynolds number or increase the time step",
                self.get_npanels()
            )));
        }

        self.check_simulation()
    }

    /// Dynamic conditions that stop a run.
    pub fn check_simulation(&self) -> Result<(), SimError> {
        let mut max_elong: FT = 0.;
        for coll in &self.vort {
            max_elong = FT::max(max_elong, coll.get_max_elong());
        }
        if max_elong > MAX_ELONGATION {
            return Err(SimError::ElongationExceeded(max_elong));
        }

        for coll in &self.vort {
            if let Collection::Points(pts) = coll {
                if !pts.all_finite() {
                    return Err(SimError::NumericalBlowup(
                        "non-finite particle position or strength".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Check step count and time against the stopping criteria.
    pub fn test_vs_stop(&self) -> bool {
        if self.use_max_steps && self.nstep >= self.max_steps {
            println!("Stopping at step {}", self.max_steps);
            return true;
        }
        if self.use_end_time && self.end_time <= self.time + 0.5 * self.dt {
            println!("Stopping at time {}", self.end_time);
            return true;
        }
        false
    }

    // ---- output ----

    /// Total system circulation: particles plus panel sheets plus bodies.
    pub fn calculate_total_circ(&self) -> V3 {
        let mut circ = V3::zeros();
        for coll in &self.vort {
            circ += coll.get_total_circ();
        }
        for coll in &self.bdry {
            circ += coll.get_total_circ();
            if let Collection::Surfaces(s) = coll {
                circ += s.get_body_circ();
            }
        }
        circ
    }

    pub fn calculate_total_impulse(&self) -> V3 {
        let mut impulse = V3::zeros();
        for coll in &self.vort {
            impulse += coll.get_total_impulse();
        }
        for coll in &self.bdry {
            impulse += coll.get_total_impulse();
        }
        impulse
    }

    /// Total force on the system via the impulse derivative.
    fn calculate_simple_forces(&mut self) -> V3 {
        if self.time < 0.1 * self.dt {
            self.last_time = -self.dt;
            self.last_impulse = V3::zeros();
        }

        let this_impulse = self.calculate_total_impulse();
        let forces = (this_impulse - self.last_impulse) / (self.time - self.last_time);

        self.last_time = self.time;
        self.last_impulse = this_impulse;
        forces
    }

    /// Close out the step with a line in the status file.
    fn dump_stats_to_status(&mut self) -> Result<(), SimError> {
        if !self.sf.is_active() {
            return Ok(());
        }

        // panel strengths must be current before summing circulation
        solve_bem(
            self.time,
            self.fs,
            &self.vort,
            &mut self.bdry,
            &mut self.bem,
            self.conv.get_core_func(),
        )?;

        let circ = self.calculate_total_circ();
        let force = self.calculate_simple_forces();

        self.sf.append_value(self.time);
        self.sf.append_value(self.get_nparts());
        for i in 0..3 {
            self.sf.append_value(circ[i]);
        }
        for i in 0..3 {
            self.sf.append_value(force[i]);
        }
        self.sf.write_line();
        Ok(())
    }

    /// Write one set of vtu files for particles, field points, and panels.
    pub fn write_vtk(&mut self, index: Option<usize>) -> Result<Vec<String>, SimError> {
        // bring strengths and velocities up to date before writing
        self.conv.update_all_vels(
            self.time,
            self.fs,
            &mut self.vort,
            &mut self.bdry,
            &mut self.fldpt,
            &mut self.bem,
        )?;

        let stepnum = index.unwrap_or(self.nstep);
        let mut files = Vec::new();
        write_vtk_files(&self.vort, stepnum, self.time, &mut files);
        write_vtk_files(&self.fldpt, stepnum, self.time, &mut files);
        write_vtk_files(&self.bdry, stepnum, self.time, &mut files);
        Ok(files)
    }

    pub fn reset(&mut self) {
        self.time = 0.;
        self.nstep = 0;
        self.vort.clear();
        self.bdry.clear();
        self.fldpt.clear();
        self.bem.reset();
        self.sf.reset_sim();
        self.sim_is_initialized = false;
    }
}

/// A 3D vortex particle simulation. Stepping can run synchronously or as
/// an asynchronous task that a front end polls for completion; the run is
/// cancelled only between steps.
pub struct Simulation {
    state: Option<Box<SimState>>,
    handle: Option<JoinHandle<(Box<SimState>, Result<(), SimError>)>>,
    step_has_started: bool,
    step_is_finished: bool,
    last_error: Option<SimError>,
}

impl Simulation {
    pub fn new() -> Self {
        Simulation {
            state: Some(Box::new(SimState::new())),
            handle: None,
            step_has_started: false,
            step_is_finished: false,
            last_error: None,
        }
    }

    fn state(&self) -> &SimState {
        self.state.as_ref().expect("simulation state is away in a step task")
    }

    fn state_mut(&mut self) -> &mut SimState {
        self.state.as_mut().expect("simulation state is away in a step task")
    }

    // ---- setters used by configuration ----

    pub fn set_re(&mut self, re: FT) {
        self.state_mut().re = re;
    }

    pub fn set_dt(&mut self, dt: FT) {
        self.state_mut().dt = dt;
    }

    pub fn set_fs(&mut self, fs: V3) {
        self.state_mut().fs = fs;
    }

    pub fn set_description(&mut self, desc: impl Into<String>) {
        self.state_mut().description = desc.into();
    }

    pub fn set_end_time(&mut self, end_time: FT) {
        let s = self.state_mut();
        s.end_time = end_time;
        s.use_end_time = true;
    }

    pub fn set_max_steps(&mut self, max_steps: usize) {
        let s = self.state_mut();
        s.max_steps = max_steps;
        s.use_max_steps = true;
    }

    pub fn set_output_dt(&mut self, output_dt: FT) {
        self.state_mut().output_dt = output_dt;
    }

    pub fn set_diffuse(&mut self, do_diffuse: bool) {
        self.state_mut().diff.set_diffuse(do_diffuse);
    }

    pub fn set_amr(&mut self, do_amr: bool) {
        self.state_mut().diff.set_amr(do_amr);
    }

    pub fn set_vrm(&mut self, vrm: Vrm) {
        self.state_mut().diff.set_vrm(vrm);
    }

    pub fn set_status_file_name(&mut self, name: &str) {
        self.state_mut().sf.set_filename(name);
    }

    // ---- getters ----

    pub fn get_re(&self) -> FT {
        self.state().re
    }

    pub fn get_dt(&self) -> FT {
        self.state().dt
    }

    pub fn get_fs(&self) -> V3 {
        self.state().fs
    }

    pub fn get_time(&self) -> FT {
        self.state().time
    }

    pub fn get_nstep(&self) -> usize {
        self.state().nstep
    }

    pub fn get_output_dt(&self) -> FT {
        self.state().output_dt
    }

    pub fn get_hnu(&self) -> FT {
        self.state().get_hnu()
    }

    pub fn get_ips(&self) -> FT {
        self.state().get_ips()
    }

    pub fn get_vdelta(&self) -> FT {
        self.state().get_vdelta()
    }

    pub fn get_nparts(&self) -> usize {
        self.state().get_nparts()
    }

    pub fn get_nfldpts(&self) -> usize {
        self.state().get_nfldpts()
    }

    pub fn get_npanels(&self) -> usize {
        self.state().get_npanels()
    }

    pub fn get_description(&self) -> String {
        self.state().description.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.state().sim_is_initialized
    }

    pub fn set_initialized(&mut self) {
        self.state_mut().sim_is_initialized = true;
    }

    // ---- element ingestion pass-throughs ----

    pub fn add_particles(&mut self, invec: &[FT]) {
        self.state_mut().add_particles(invec);
    }

    pub fn add_fldpts(&mut self, invec: &[FT], moves: bool) {
        self.state_mut().add_fldpts(invec, moves);
    }

    pub fn add_boundary(&mut self, body: Option<Arc<Body>>, geom: ElementPacket) {
        self.state_mut().add_boundary(body, geom);
    }

    pub fn add_body(&mut self, body: Arc<Body>) {
        self.state_mut().add_body(body);
    }

    pub fn get_pointer_to_body(&mut self, name: &str) -> Arc<Body> {
        self.state_mut().get_pointer_to_body(name)
    }

    // ---- stepping ----

    pub fn first_step(&mut self) -> Result<(), SimError> {
        self.state_mut().first_step()
    }

    pub fn step(&mut self) -> Result<(), SimError> {
        let result = self.state_mut().step();
        self.step_is_finished = result.is_ok();
        result
    }

    /// Launch one step as a background task; poll with
    /// `test_for_new_results`.
    pub fn async_step(&mut self) {
        assert!(self.handle.is_none(), "a step is already in flight");
        let mut state = self.state.take().expect("simulation state is away in a step task");
        self.step_has_started = true;
        self.handle = Some(std::thread::spawn(move || {
            let result = state.step();
            (state, result)
        }));
    }

    /// Query the step task. Returns true when no step is in flight and the
    /// state is resident (safe to inspect or start a new step).
    pub fn test_for_new_results(&mut self) -> bool {
        if !self.step_has_started {
            return true;
        }

        let finished = self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true);
        if !finished {
            return false;
        }

        if let Some(handle) = self.handle.take() {
            let (state, result) = handle.join().expect("step task panicked");
            self.state = Some(state);
            if let Err(e) = result {
                println!("step failed: {}", e);
                self.last_error = Some(e);
            }
            self.step_is_finished = true;
            self.step_has_started = false;
        }
        true
    }

    pub fn take_last_error(&mut self) -> Option<SimError> {
        self.last_error.take()
    }

    /// True once at least one step has completed.
    pub fn step_is_finished(&self) -> bool {
        self.step_is_finished
    }

    // ---- checks, stopping, output pass-throughs ----

    pub fn check_initialization(&self) -> Result<(), SimError> {
        self.state().check_initialization()
    }

    pub fn check_simulation(&self) -> Result<(), SimError> {
        self.state().check_simulation()
    }

    pub fn test_vs_stop(&self) -> bool {
        self.state().test_vs_stop()
    }

    pub fn write_vtk(&mut self, index: Option<usize>) -> Result<Vec<String>, SimError> {
        self.state_mut().write_vtk(index)
    }

    pub fn calculate_total_circ(&self) -> V3 {
        self.state().calculate_total_circ()
    }

    pub fn calculate_total_impulse(&self) -> V3 {
        self.state().calculate_total_impulse()
    }

    pub fn reset(&mut self) {
        // must wait for a step in flight
        if let Some(handle) = self.handle.take() {
            let (state, _) = handle.join().expect("step task panicked");
            self.state = Some(state);
        }
        self.step_has_started = false;
        self.step_is_finished = false;
        self.state_mut().reset();
    }

    /// Mutable access to the inner state, for tests and embedders.
    pub fn state_for_inspection(&mut self) -> &mut SimState {
        self.state_mut()
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3f;

    #[test]
    fn derived_parameters_follow_the_definitions() {
        let mut sim = Simulation::new();
        sim.set_re(100.);
        sim.set_dt(0.01);
        let hnu = (0.01 as FT / 100.).sqrt();
        assert!((sim.get_hnu() - hnu).abs() < 1e-8);
        assert!((sim.get_ips() - (8.0 as FT).sqrt() * hnu).abs() < 1e-7);
        assert!((sim.get_vdelta() - 1.5 * sim.get_ips()).abs() < 1e-7);
    }

    #[test]
    fn empty_simulation_fails_the_init_check() {
        let sim = Simulation::new();
        assert!(matches!(sim.check_initialization(), Err(SimError::Init(_))));
    }

    #[test]
    fn stop_tests_honor_both_criteria() {
        let mut sim = Simulation::new();
        sim.set_dt(0.1);
        sim.set_max_steps(0);
        assert!(sim.test_vs_stop());

        let mut sim2 = Simulation::new();
        sim2.set_dt(0.1);
        sim2.set_end_time(0.04);
        // t + dt/2 = 0.05 >= 0.04
        assert!(sim2.test_vs_stop());

        let mut sim3 = Simulation::new();
        sim3.set_dt(0.1);
        sim3.set_end_time(10.);
        assert!(!sim3.test_vs_stop());
    }

    #[test]
    fn async_step_round_trips_the_state() {
        let mut sim = Simulation::new();
        sim.set_re(100.);
        sim.set_dt(0.01);
        sim.set_fs(vec3f(1., 0., 0.));
        sim.set_diffuse(false);
        sim.add_particles(&[0., 0., 0., 0., 0., 1., 0.]);

        sim.async_step();
        // spin until the worker hands the state back
        let mut guard = 0;
        while !sim.test_for_new_results() {
            std::thread::sleep(std::time::Duration::from_millis(1));
            guard += 1;
            assert!(guard < 10000, "step task never finished");
        }
        assert!(sim.take_last_error().is_none());
        assert_eq!(sim.get_nstep(), 1);
        assert!((sim.get_time() - 0.01).abs() < 1e-7);
    }

    #[test]
    fn elongation_violation_is_fatal() {
        let mut sim = Simulation::new();
        sim.add_particles(&[0., 0., 0., 0., 0., 1., 0.]);
        {
            let state = sim.state_for_inspection();
            let Collection::Points(pts) = &mut state.vort[0] else {
                unreachable!()
            };
            pts.pv.elong[0] = 2.0;
        }
        assert!(matches!(
            sim.check_simulation(),
            Err(SimError::ElongationExceeded(_))
        ));
    }
}
