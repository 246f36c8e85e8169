//! Circulation-conservation properties of the per-step pipeline, driven
//! through the public simulation API.

use vpm3d::config::{apply_config, ConfigDoc};
use vpm3d::sim::simulation::Simulation;
use vpm3d::V3;

fn build_sim(doc_json: &str) -> (ConfigDoc, Simulation) {
    let doc: ConfigDoc = serde_json::from_str(doc_json).expect("test document must parse");
    let mut sim = Simulation::new();
    apply_config(&doc, &mut sim);

    let ips = sim.get_ips();
    for ff in &doc.flowfeatures {
        sim.add_particles(&ff.init_particles(ips));
    }
    for bf in &doc.boundaries {
        let body = bf.body_name().map(|n| sim.get_pointer_to_body(n));
        sim.add_boundary(body, bf.init_elements(ips));
    }
    sim.set_initialized();
    (doc, sim)
}

/// A free vortex blob with no boundaries: total circulation is invariant
/// under full viscous steps. The blob is weak so the self-induced motion
/// does not obscure the diffusion bookkeeping.
#[test]
fn blob_diffusion_conserves_circulation() {
    let (_doc, mut sim) = build_sim(
        r#"{
            "flowparams": { "Re": 100.0, "Uinf": [0.0, 0.0, 0.0] },
            "simparams": { "nominalDt": 0.01, "viscous": "vrm" },
            "flowfeatures": [
                { "type": "vortex blob", "center": [0,0,0], "strength": [0.001, 0, 0],
                  "radius": 0.15, "softness": 0.1 }
            ]
        }"#,
    );
    sim.check_initialization().unwrap();
    assert!(sim.get_nparts() > 500, "blob seeded {} particles", sim.get_nparts());

    let circ0 = sim.calculate_total_circ();
    assert!((circ0.x - 0.001).abs() < 1e-6, "blob total {:?}", circ0);

    for _ in 0..3 {
        sim.step().unwrap();
    }

    let circ: V3 = sim.calculate_total_circ();
    assert!(
        (circ.x - 0.001).abs() < 1e-6,
        "x circulation drifted to {}",
        circ.x
    );
    assert!(circ.y.abs() < 1e-6, "y circulation appeared: {}", circ.y);
    assert!(circ.z.abs() < 1e-6, "z circulation appeared: {}", circ.z);
    assert!(sim.get_nparts() > 0);
}

/// With a sphere in a freestream, the combined particle-plus-panel
/// circulation stays near zero: shedding only moves circulation between
/// the two reservoirs, and the symmetric geometry cancels the rest.
#[test]
fn sphere_shed_step_keeps_total_circulation_small() {
    let (_doc, mut sim) = build_sim(
        r#"{
            "flowparams": { "Re": 1000.0, "Uinf": [1.0, 0.0, 0.0] },
            "simparams": { "nominalDt": 0.1, "viscous": "vrm" },
            "boundaries": [
                { "type": "sphere", "center": [0,0,0], "radius": 1.0 }
            ]
        }"#,
    );
    sim.check_initialization().unwrap();
    assert!(sim.get_npanels() > 100);

    sim.first_step().unwrap();
    sim.step().unwrap();

    let circ = sim.calculate_total_circ();
    assert!(circ.norm() < 0.05, "net circulation {:?}", circ);
    assert!(sim.get_nparts() > 0, "shedding created no particles");
}
