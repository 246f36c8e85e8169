use serde::Deserialize;

use crate::error::SimError;
use crate::features::{BoundaryFeature, FlowFeature, MeasureFeature};
use crate::floating_type_mod::FT;
use crate::sim::body::Body;
use crate::sim::simulation::Simulation;
use crate::sim::vrm::Vrm;
use crate::vec3f;

/// The whole simulation document.
#[derive(Debug, Deserialize)]
pub struct ConfigDoc {
    #[serde(default)]
    pub description: Option<String>,
    pub flowparams: FlowParams,
    pub simparams: SimParams,
    #[serde(default)]
    pub flowfeatures: Vec<FlowFeature>,
    #[serde(default)]
    pub bodies: Vec<BodyDesc>,
    #[serde(default)]
    pub boundaries: Vec<BoundaryFeature>,
    #[serde(default)]
    pub measurements: Vec<MeasureFeature>,
}

#[derive(Debug, Deserialize)]
pub struct FlowParams {
    #[serde(rename = "Re")]
    pub re: FT,
    #[serde(rename = "Uinf", default)]
    pub uinf: Uinf,
}

/// Freestream as either a full vector or a single x-component.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Uinf {
    Vector([FT; 3]),
    Scalar(FT),
}

impl Default for Uinf {
    fn default() -> Self {
        Uinf::Vector([0., 0., 0.])
    }
}

#[derive(Debug, Deserialize)]
pub struct SimParams {
    #[serde(rename = "nominalDt")]
    pub nominal_dt: FT,
    #[serde(rename = "outputDt", default)]
    pub output_dt: FT,
    #[serde(rename = "maxSteps", default)]
    pub max_steps: Option<usize>,
    #[serde(rename = "endTime", default)]
    pub end_time: Option<FT>,
    #[serde(default = "default_viscous")]
    pub viscous: String,
    #[serde(rename = "adaptiveSize", default)]
    pub adaptive_size: bool,
    #[serde(rename = "VRM", default)]
    pub vrm: VrmParams,
    #[serde(rename = "statusFile", default)]
    pub status_file: Option<String>,
}

fn default_viscous() -> String {
    "vrm".to_string()
}

#[derive(Debug, Deserialize)]
pub struct VrmParams {
    #[serde(default = "default_ignore")]
    pub ignore: FT,
    #[serde(default = "default_adapt")]
    pub adapt: FT,
    #[serde(default = "default_radgrad")]
    pub radgrad: FT,
    #[serde(default = "default_true")]
    pub relative: bool,
    #[serde(default)]
    pub simplex: bool,
}

fn default_ignore() -> FT {
    1e-4
}

fn default_adapt() -> FT {
    1e-3
}

fn default_radgrad() -> FT {
    0.05
}

fn default_true() -> bool {
    true
}

impl Default for VrmParams {
    fn default() -> Self {
        VrmParams {
            ignore: default_ignore(),
            adapt: default_adapt(),
            radgrad: default_radgrad(),
            relative: true,
            simplex: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BodyDesc {
    pub name: String,
    #[serde(default)]
    pub translation: Option<[FT; 3]>,
}

/// Read and parse the configuration document.
pub fn read_config(path: &str) -> Result<ConfigDoc, SimError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| SimError::Config(format!("cannot read {}: {}", path, e)))?;
    serde_json::from_str(&text).map_err(|e| SimError::Config(format!("cannot parse {}: {}", path, e)))
}

/// Apply the scalar parameters and bodies to a fresh simulation. Features
/// are applied by the caller, which needs the derived ips first.
pub fn apply_config(doc: &ConfigDoc, sim: &mut Simulation) {
    if let Some(desc) = &doc.description {
        sim.set_description(desc.clone());
    }

    sim.set_re(doc.flowparams.re);
    println!("  setting re= {}", doc.flowparams.re);

    let fs = match doc.flowparams.uinf {
        Uinf::Vector(v) => vec3f(v[0], v[1], v[2]),
        Uinf::Scalar(u) => vec3f(u, 0., 0.),
    };
    sim.set_fs(fs);
    println!("  setting freestream to {} {} {}", fs.x, fs.y, fs.z);

    sim.set_dt(doc.simparams.nominal_dt);
    println!("  setting dt= {}", doc.simparams.nominal_dt);
    sim.set_output_dt(doc.simparams.output_dt);

    if let Some(ms) = doc.simparams.max_steps {
        sim.set_max_steps(ms);
        println!("  setting max_steps= {}", ms);
    }
    if let Some(et) = doc.simparams.end_time {
        sim.set_end_time(et);
        println!("  setting end_time= {}", et);
    }

    let viscous = doc.simparams.viscous == "vrm";
    sim.set_diffuse(viscous);
    println!("  setting is_viscous= {}", viscous);

    if doc.simparams.adaptive_size {
        sim.set_amr(true);
        println!("  enabling amr");
    }

    let vp = &doc.simparams.vrm;
    if vp.simplex {
        println!("  simplex solver not built in, using NNLS");
    }
    sim.set_vrm(Vrm::new(vp.ignore, vp.adapt, vp.radgrad, vp.relative));

    if let Some(sf) = &doc.simparams.status_file {
        sim.set_status_file_name(sf);
    }

    for bd in &doc.bodies {
        let body = match bd.translation {
            Some(v) => Body::with_translation(bd.name.clone(), vec3f(v[0], v[1], v[2])),
            None => Body::new(bd.name.clone()),
        };
        sim.add_body(std::sync::Arc::new(body));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_complete_document() {
        let doc = r#"{
            "description": "thick ring at Re 1000",
            "flowparams": { "Re": 1000.0, "Uinf": [0.0, 0.0, 0.0] },
            "simparams": {
                "nominalDt": 0.05,
                "outputDt": 0.5,
                "maxSteps": 40,
                "viscous": "none",
                "VRM": { "ignore": 1e-5, "relative": false }
            },
            "flowfeatures": [
                { "type": "thick ring", "center": [0,0,0], "normal": [0,0,1],
                  "major radius": 1.0, "minor radius": 0.1, "circulation": 1.0 }
            ]
        }"#;
        let cfg: ConfigDoc = serde_json::from_str(doc).unwrap();
        assert_eq!(cfg.flowparams.re, 1000.);
        assert_eq!(cfg.simparams.max_steps, Some(40));
        assert_eq!(cfg.simparams.end_time, None);
        assert_eq!(cfg.simparams.viscous, "none");
        assert_eq!(cfg.simparams.vrm.ignore, 1e-5);
        assert!(!cfg.simparams.vrm.relative);
        // unset fields take their defaults
        assert_eq!(cfg.simparams.vrm.adapt, 1e-3);
        assert_eq!(cfg.flowfeatures.len(), 1);
        assert!(cfg.boundaries.is_empty());
    }

    #[test]
    fn scalar_uinf_is_accepted() {
        let doc = r#"{
            "flowparams": { "Re": 100.0, "Uinf": 1.0 },
            "simparams": { "nominalDt": 0.01 }
        }"#;
        let cfg: ConfigDoc = serde_json::from_str(doc).unwrap();
        match cfg.flowparams.uinf {
            Uinf::Scalar(u) => assert_eq!(u, 1.),
            _ => panic!("expected scalar freestream"),
        }
        // viscous defaults to vrm
        assert_eq!(cfg.simparams.viscous, "vrm");
    }

    #[test]
    fn malformed_documents_are_config_errors() {
        let err = read_config("/definitely/not/a/file.json").unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }

    #[test]
    fn applies_to_a_simulation() {
        let doc = r#"{
            "flowparams": { "Re": 500.0, "Uinf": [1.0, 0.0, 0.0] },
            "simparams": { "nominalDt": 0.02, "endTime": 2.0, "viscous": "vrm" },
            "bodies": [ { "name": "mover", "translation": [0.5, 0.0, 0.0] } ]
        }"#;
        let cfg: ConfigDoc = serde_json::from_str(doc).unwrap();
        let mut sim = Simulation::new();
        apply_config(&cfg, &mut sim);
        assert_eq!(sim.get_re(), 500.);
        assert_eq!(sim.get_dt(), 0.02);
        assert!((sim.get_fs() - vec3f(1., 0., 0.)).norm() < 1e-7);
        let body = sim.get_pointer_to_body("mover");
        assert!(body.moves());
    }
}
