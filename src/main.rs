use clap::{App, Arg};

use vpm3d::config::{apply_config, read_config};
use vpm3d::floating_type_mod::FT;
use vpm3d::sim::simulation::Simulation;

fn main() {
    std::process::exit(run());
}

/// Batch driver: load a configuration document, build the simulation, and
/// march it to the stopping condition. Exit code 0 on clean completion,
/// 1 on a simulation error, -1 on a usage error.
fn run() -> i32 {
    println!("\nvpm3d batch");

    let matches = App::new("vpm3d")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name("CONFIG")
                .help("Path to the simulation configuration document")
                .required(true)
                .index(1),
        )
        .get_matches_safe();

    let matches = match matches {
        Ok(m) => m,
        Err(e) => {
            println!("{}", e.message);
            return -1;
        }
    };
    let infile = matches.value_of("CONFIG").unwrap();

    let doc = match read_config(infile) {
        Ok(doc) => doc,
        Err(e) => {
            println!("\nERROR: {}", e);
            return -1;
        }
    };

    let mut sim = Simulation::new();
    apply_config(&doc, &mut sim);

    println!("\nInitializing simulation");
    let ips = sim.get_ips();

    // initialize particle distributions
    for ff in &doc.flowfeatures {
        sim.add_particles(&ff.init_particles(ips));
    }

    // initialize solid objects
    for bf in &doc.boundaries {
        let body = bf.body_name().map(|name| sim.get_pointer_to_body(name));
        let geom = bf.init_elements(ips);
        sim.add_boundary(body, geom);
    }

    // initialize measurement features
    for mf in &doc.measurements {
        sim.add_fldpts(&mf.init_particles(0.1 * ips), mf.moves());
    }

    sim.set_initialized();

    if let Err(e) = sim.check_initialization() {
        println!("\nERROR: {}", e);
        return 1;
    }

    // the first step solves the boundary and evaluates velocities at t=0
    if let Err(e) = sim.first_step() {
        println!("\nERROR: {}", e);
        return 1;
    }

    let output_dt = sim.get_output_dt();
    let mut next_output: FT = 0.;
    let mut series = None;
    if output_dt > 0. {
        let mut s = vpm3d::output::VtkSeries::new("vpm3d");
        match sim.write_vtk(None) {
            Ok(files) => {
                if let Some(first) = files.first() {
                    s.add(first, sim.get_time());
                }
            }
            Err(e) => {
                println!("\nERROR: {}", e);
                return 1;
            }
        }
        series = Some(s);
        next_output = output_dt;
    }

    //
    // main loop
    //
    loop {
        // the last step may have left conditions that stop the run
        if let Err(e) = sim.check_simulation() {
            println!("\nERROR: {}", e);
            return 1;
        }

        // generate new particles from emitters
        let ips = sim.get_ips();
        for ff in &doc.flowfeatures {
            sim.add_particles(&ff.step_particles(ips));
        }
        for mf in &doc.measurements {
            sim.add_fldpts(&mf.step_particles(0.1 * ips), mf.moves());
        }

        // begin a new dynamic step: diffusion and convection
        if let Err(e) = sim.step() {
            println!("\nERROR: {}", e);
            return 1;
        }

        // export data files at this step?
        if output_dt > 0. && sim.get_time() + 0.5 * sim.get_dt() >= next_output {
            match sim.write_vtk(None) {
                Ok(files) => {
                    if let (Some(s), Some(first)) = (series.as_mut(), files.first()) {
                        s.add(first, sim.get_time());
                    }
                }
                Err(e) => {
                    println!("\nERROR: {}", e);
                    return 1;
                }
            }
            next_output += output_dt;
        }

        // check vs. stopping conditions
        if sim.test_vs_stop() {
            break;
        }
    }

    println!("Quitting");
    0
}
