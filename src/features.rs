use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::floating_type_mod::{FT, PI, TAU};
use crate::sim::surfaces::ElementPacket;
use crate::{vec3f, V3};

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

/// An orthonormal basis around a (not necessarily unit) direction.
fn branchless_onb(normal: V3) -> (V3, V3) {
    let n = normal.normalize();
    let sign = (1.0 as FT).copysign(n.z);
    let a = -1. / (sign + n.z);
    let b = n.x * n.y * a;
    let b1 = vec3f(1. + sign * n.x * n.x * a, sign * b, -sign * n.x);
    let b2 = vec3f(b, sign + n.y * n.y * a, -n.y);
    (b1, b2)
}

/// Initial and per-step generators of vortex particles. Every generator
/// returns the flat 7-tuple batch format; radii are left zero so the store
/// assigns the simulation's vdelta on ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FlowFeature {
    #[serde(rename = "single particle")]
    SingleParticle {
        center: [FT; 3],
        strength: [FT; 3],
        #[serde(default = "default_true")]
        enabled: bool,
    },

    #[serde(rename = "vortex blob")]
    VortexBlob {
        center: [FT; 3],
        strength: [FT; 3],
        radius: FT,
        softness: FT,
        #[serde(default = "default_true")]
        enabled: bool,
    },

    #[serde(rename = "block of random")]
    BlockOfRandom {
        center: [FT; 3],
        size: [FT; 3],
        #[serde(rename = "max strength")]
        max_strength: FT,
        num: usize,
        #[serde(default = "default_true")]
        enabled: bool,
    },

    #[serde(rename = "particle emitter")]
    ParticleEmitter {
        center: [FT; 3],
        strength: [FT; 3],
        #[serde(default = "default_true")]
        enabled: bool,
    },

    #[serde(rename = "singular ring")]
    SingularRing {
        center: [FT; 3],
        normal: [FT; 3],
        #[serde(rename = "major radius")]
        major_radius: FT,
        circulation: FT,
        #[serde(default = "default_true")]
        enabled: bool,
    },

    #[serde(rename = "thick ring")]
    ThickRing {
        center: [FT; 3],
        normal: [FT; 3],
        #[serde(rename = "major radius")]
        major_radius: FT,
        #[serde(rename = "minor radius")]
        minor_radius: FT,
        circulation: FT,
        #[serde(default = "default_true")]
        enabled: bool,
    },
}

impl FlowFeature {
    pub fn is_enabled(&self) -> bool {
        match self {
            FlowFeature::SingleParticle { enabled, .. }
            | FlowFeature::VortexBlob { enabled, .. }
            | FlowFeature::BlockOfRandom { enabled, .. }
            | FlowFeature::ParticleEmitter { enabled, .. }
            | FlowFeature::SingularRing { enabled, .. }
            | FlowFeature::ThickRing { enabled, .. } => *enabled,
        }
    }

    /// Particles generated when the simulation is initialized.
    pub fn init_particles(&self, ips: FT) -> Vec<FT> {
        if !self.is_enabled() {
            return Vec::new();
        }

        match self {
            FlowFeature::SingleParticle { center, strength, .. } => {
                vec![center[0], center[1], center[2], strength[0], strength[1], strength[2], 0.]
            }

            FlowFeature::VortexBlob {
                center,
                strength,
                radius,
                softness,
                ..
            } => init_vortex_blob(center, strength, *radius, *softness, ips),

            FlowFeature::BlockOfRandom {
                center,
                size,
                max_strength,
                num,
                ..
            } => {
                let mut rng = rand::thread_rng();
                let mut x = Vec::with_capacity(7 * num);
                for _ in 0..*num {
                    for d in 0..3 {
                        x.push(center[d] + size[d] * rng.gen_range(-0.5..0.5));
                    }
                    for _ in 0..3 {
                        x.push(max_strength * rng.gen_range(-0.5..0.5) / *num as FT);
                    }
                    x.push(0.);
                }
                x
            }

            FlowFeature::ParticleEmitter { .. } => Vec::new(),

            FlowFeature::SingularRing {
                center,
                normal,
                major_radius,
                circulation,
                ..
            } => init_singular_ring(center, normal, *major_radius, *circulation, ips),

            FlowFeature::ThickRing {
                center,
                normal,
                major_radius,
                minor_radius,
                circulation,
                ..
            } => init_thick_ring(center, normal, *major_radius, *minor_radius, *circulation, ips),
        }
    }

    /// Particles generated before every step.
    pub fn step_particles(&self, _ips: FT) -> Vec<FT> {
        match self {
            FlowFeature::ParticleEmitter {
                center,
                strength,
                enabled,
            } if *enabled => {
                vec![center[0], center[1], center[2], strength[0], strength[1], strength[2], 0.]
            }
            _ => Vec::new(),
        }
    }
}

/// A ball of particles on the nominal lattice with a cosine-softened edge,
/// normalized so the whole blob carries exactly the requested strength.
fn init_vortex_blob(center: &[FT; 3], strength: &[FT; 3], rad: FT, softness: FT, ips: FT) -> Vec<FT> {
    let mut x: Vec<FT> = Vec::new();

    let irad = (1. + (rad + 0.5 * softness) / ips) as i32;
    let mut tot_wgt: FT = 0.;

    for i in -irad..=irad {
        for j in -irad..=irad {
            for k in -irad..=irad {
                let dr = ((i * i + j * j + k * k) as FT).sqrt() * ips;
                if dr >= rad + 0.5 * softness {
                    continue;
                }

                x.push(center[0] + ips * i as FT);
                x.push(center[1] + ips * j as FT);
                x.push(center[2] + ips * k as FT);

                let mut this_wgt: FT = 1.;
                if dr > rad - 0.5 * softness {
                    this_wgt = 0.5 - 0.5 * (PI * (dr - rad) / softness).sin();
                }
                tot_wgt += this_wgt;
                x.push(strength[0] * this_wgt);
                x.push(strength[1] * this_wgt);
                x.push(strength[2] * this_wgt);

                x.push(0.);
            }
        }
    }

    // normalize all particle strengths so the whole blob has exactly the
    // right total
    if tot_wgt > 0. {
        let str_scale = 1. / tot_wgt;
        for chunk in x.chunks_exact_mut(7) {
            chunk[3] *= str_scale;
            chunk[4] *= str_scale;
            chunk[5] *= str_scale;
        }
    }

    x
}

/// One row of particles around the ring, strengths tangential.
fn init_singular_ring(center: &[FT; 3], normal: &[FT; 3], majrad: FT, circ: FT, ips: FT) -> Vec<FT> {
    let ndiam = (1. + TAU * majrad / ips) as usize;
    let this_ips = TAU * majrad / ndiam as FT;

    let (b1, b2) = branchless_onb(vec3f(normal[0], normal[1], normal[2]));
    let c = vec3f(center[0], center[1], center[2]);

    let mut x: Vec<FT> = Vec::with_capacity(7 * ndiam);
    for i in 0..ndiam {
        let theta = TAU * i as FT / ndiam as FT;
        let (st, ct) = theta.sin_cos();

        let pos = c + (b1 * ct + b2 * st) * majrad;
        let tangent = (b2 * ct - b1 * st) * (this_ips * circ);
        x.extend_from_slice(&[pos.x, pos.y, pos.z, tangent.x, tangent.y, tangent.z, 0.]);
    }
    x
}

/// A disk of particle layers revolved around the ring axis; strengths are
/// scaled by the local major-radius fraction so circulation is uniform.
fn init_thick_ring(center: &[FT; 3], normal: &[FT; 3], majrad: FT, minrad: FT, circ: FT, ips: FT) -> Vec<FT> {
    // the disk at one azimuthal station: local (x, y) and a length scale,
    // +x pointing away from the ring center, +y along the ring normal
    let mut disk: Vec<FT> = vec![0., 0., 1.];
    let nlayers = (1. + minrad / ips) as usize;
    let mut nthisdisk = 1;
    for l in 1..nlayers {
        let thisrad = l as FT * ips;
        let nthislayer = (1. + TAU * thisrad / ips) as usize;
        for i in 0..nthislayer {
            let phi = TAU * i as FT / nthislayer as FT;
            disk.push(thisrad * phi.cos());
            disk.push(thisrad * phi.sin());
            disk.push((majrad + thisrad * phi.cos()) / majrad);
        }
        nthisdisk += nthislayer;
    }

    let ndiam = (1. + TAU * majrad / ips) as usize;
    let this_ips = TAU * majrad / ndiam as FT;

    let norm = vec3f(normal[0], normal[1], normal[2]).normalize();
    let (b1, b2) = branchless_onb(norm);
    let c = vec3f(center[0], center[1], center[2]);

    let mut x: Vec<FT> = Vec::with_capacity(7 * ndiam * nthisdisk);
    for i in 0..ndiam {
        let theta = TAU * i as FT / ndiam as FT;
        let (st, ct) = theta.sin_cos();

        for j in 0..nthisdisk {
            let dx = disk[3 * j];
            let dy = disk[3 * j + 1];
            let dl = disk[3 * j + 2];

            let pos = c + (b1 * ct + b2 * st) * (majrad + dx) + norm * dy;
            let sscale = dl * this_ips * circ / nthisdisk as FT;
            let tangent = (b2 * ct - b1 * st) * sscale;

            x.extend_from_slice(&[pos.x, pos.y, pos.z, tangent.x, tangent.y, tangent.z, 0.]);
        }
    }
    x
}

/// Solid boundary descriptors: triangulated closed surfaces handed to the
/// BEM, optionally bound to a named rigid body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BoundaryFeature {
    #[serde(rename = "sphere")]
    Sphere {
        center: [FT; 3],
        radius: FT,
        #[serde(default)]
        body: Option<String>,
        #[serde(default = "default_true")]
        enabled: bool,
    },
}

impl BoundaryFeature {
    pub fn is_enabled(&self) -> bool {
        match self {
            BoundaryFeature::Sphere { enabled, .. } => *enabled,
        }
    }

    pub fn body_name(&self) -> Option<&str> {
        match self {
            BoundaryFeature::Sphere { body, .. } => body.as_deref(),
        }
    }

    /// Triangulate at a panel size comparable to the particle spacing.
    pub fn init_elements(&self, ips: FT) -> ElementPacket {
        if !self.is_enabled() {
            return ElementPacket::default();
        }
        match self {
            BoundaryFeature::Sphere { center, radius, .. } => {
                icosphere(vec3f(center[0], center[1], center[2]), *radius, ips)
            }
        }
    }
}

/// Icosphere: subdivide an icosahedron until the edge length comes down to
/// the requested size, then project onto the sphere.
fn icosphere(center: V3, radius: FT, target_edge: FT) -> ElementPacket {
    let phi = (1. + (5.0 as FT).sqrt()) / 2.;

    let mut verts: Vec<V3> = vec![
        vec3f(-1., phi, 0.),
        vec3f(1., phi, 0.),
        vec3f(-1., -phi, 0.),
        vec3f(1., -phi, 0.),
        vec3f(0., -1., phi),
        vec3f(0., 1., phi),
        vec3f(0., -1., -phi),
        vec3f(0., 1., -phi),
        vec3f(phi, 0., -1.),
        vec3f(phi, 0., 1.),
        vec3f(-phi, 0., -1.),
        vec3f(-phi, 0., 1.),
    ];
    for v in &mut verts {
        *v = v.normalize();
    }

    let mut tris: Vec<[u32; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    // subdivide while the edge length is above target, capped to keep the
    // dense BEM system tractable
    for _ in 0..2 {
        let edge = (verts[tris[0][0] as usize] - verts[tris[0][1] as usize]).norm() * radius;
        if edge <= target_edge {
            break;
        }

        let mut midpoint_cache: std::collections::HashMap<(u32, u32), u32> = std::collections::HashMap::new();
        let mut new_tris = Vec::with_capacity(4 * tris.len());
        for tri in &tris {
            let mut mids = [0u32; 3];
            for e in 0..3 {
                let a = tri[e];
                let b = tri[(e + 1) % 3];
                let key = (a.min(b), a.max(b));
                mids[e] = *midpoint_cache.entry(key).or_insert_with(|| {
                    let m = ((verts[a as usize] + verts[b as usize]) * 0.5).normalize();
                    verts.push(m);
                    (verts.len() - 1) as u32
                });
            }
            new_tris.push([tri[0], mids[0], mids[2]]);
            new_tris.push([tri[1], mids[1], mids[0]]);
            new_tris.push([tri[2], mids[2], mids[1]]);
            new_tris.push([mids[0], mids[1], mids[2]]);
        }
        tris = new_tris;
    }

    let mut x = Vec::with_capacity(3 * verts.len());
    for v in &verts {
        let p = center + v * radius;
        x.extend_from_slice(&[p.x, p.y, p.z]);
    }
    let mut idx = Vec::with_capacity(3 * tris.len());
    for tri in &tris {
        idx.extend_from_slice(&[tri[0], tri[1], tri[2]]);
    }

    ElementPacket { x, idx, val: vec![] }
}

/// Measurement descriptors: inert tracer points in the fldpt lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MeasureFeature {
    #[serde(rename = "single point")]
    SinglePoint {
        center: [FT; 3],
        #[serde(default = "default_false")]
        moves: bool,
        #[serde(default = "default_true")]
        enabled: bool,
    },

    #[serde(rename = "grid of points")]
    GridOfPoints {
        center: [FT; 3],
        size: [FT; 3],
        dx: FT,
        #[serde(default = "default_true")]
        enabled: bool,
    },
}

impl MeasureFeature {
    pub fn is_enabled(&self) -> bool {
        match self {
            MeasureFeature::SinglePoint { enabled, .. } | MeasureFeature::GridOfPoints { enabled, .. } => *enabled,
        }
    }

    pub fn moves(&self) -> bool {
        match self {
            MeasureFeature::SinglePoint { moves, .. } => *moves,
            MeasureFeature::GridOfPoints { .. } => false,
        }
    }

    pub fn init_particles(&self, _ips: FT) -> Vec<FT> {
        if !self.is_enabled() {
            return Vec::new();
        }
        match self {
            MeasureFeature::SinglePoint { center, .. } => vec![center[0], center[1], center[2]],
            MeasureFeature::GridOfPoints { center, size, dx, .. } => {
                assert!(*dx > 0.);
                let mut x = Vec::new();
                let half = [size[0] * 0.5, size[1] * 0.5, size[2] * 0.5];
                let counts: Vec<i32> = (0..3).map(|d| (half[d] / dx).floor() as i32).collect();
                for i in -counts[0]..=counts[0] {
                    for j in -counts[1]..=counts[1] {
                        for k in -counts[2]..=counts[2] {
                            x.push(center[0] + i as FT * dx);
                            x.push(center[1] + j as FT * dx);
                            x.push(center[2] + k as FT * dx);
                        }
                    }
                }
                x
            }
        }
    }

    pub fn step_particles(&self, _ips: FT) -> Vec<FT> {
        Vec::new()
    }
}
