//! End-to-end inviscid check: a vortex ring must translate itself along
//! its own axis while keeping its circulation.

use vpm3d::config::{apply_config, ConfigDoc};
use vpm3d::floating_type_mod::FT;
use vpm3d::sim::collections::Collection;
use vpm3d::sim::simulation::Simulation;
use vpm3d::V3;

fn ring_centroid(sim: &mut Simulation) -> V3 {
    let state = sim.state_for_inspection();
    let Collection::Points(pts) = &state.vort[0] else {
        panic!("expected a particle collection");
    };
    let n = pts.get_n() as FT;
    pts.pv.position.iter().fold(V3::zeros(), |a, p| a + p) / n
}

#[test]
fn thick_ring_self_advects_along_its_axis() {
    let doc: ConfigDoc = serde_json::from_str(
        r#"{
            "flowparams": { "Re": 50.0, "Uinf": [0.0, 0.0, 0.0] },
            "simparams": { "nominalDt": 0.1, "viscous": "none" },
            "flowfeatures": [
                { "type": "thick ring", "center": [0,0,0], "normal": [0,0,1],
                  "major radius": 1.0, "minor radius": 0.1, "circulation": 1.0 }
            ]
        }"#,
    )
    .unwrap();

    let mut sim = Simulation::new();
    apply_config(&doc, &mut sim);
    let ips = sim.get_ips();
    for ff in &doc.flowfeatures {
        sim.add_particles(&ff.init_particles(ips));
    }
    sim.set_initialized();
    sim.check_initialization().unwrap();

    let n0 = sim.get_nparts();
    assert!(n0 > 30, "ring seeded only {} particles", n0);

    let start = ring_centroid(&mut sim);
    let circ0 = sim.calculate_total_circ();

    for _ in 0..10 {
        sim.step().unwrap();
    }

    let end = ring_centroid(&mut sim);
    let delta = end - start;

    // the ring pushes itself along +z
    assert!(delta.z > 0.1, "ring moved only {} along its axis", delta.z);
    // and stays centered on that axis
    assert!(delta.x.abs() < 1e-3, "ring drifted {} in x", delta.x);
    assert!(delta.y.abs() < 1e-3, "ring drifted {} in y", delta.y);

    // inviscid transport preserves the (near-zero) net circulation of a
    // closed ring
    let circ = sim.calculate_total_circ();
    assert!((circ - circ0).norm() < 5e-3, "circulation changed {:?} -> {:?}", circ0, circ);

    // no particle went non-finite and none stretched past the limit
    sim.check_simulation().unwrap();
}
