// geometry.rs — sphere tessellation and the inverted panorama surface

use crate::dispose::Disposable;
use crate::error::GeometryError;
use crate::material::{MeshBasicMaterial, MeshMaterials, Side};
use crate::texture::TextureLoader;

use glam::Vec3;
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GEOMETRY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(u64);

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct SphereParams {
    pub radius: f32,
    pub width_segments: u32,
    pub height_segments: u32,
}

impl Default for SphereParams {
    fn default() -> Self {
        Self {
            radius: 500.0,
            width_segments: 60,
            height_segments: 40,
        }
    }
}

impl SphereParams {
    pub fn validate(&self) -> Result<(), GeometryError> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(GeometryError::InvalidRadius(self.radius));
        }
        if self.width_segments < 3 {
            return Err(GeometryError::TooFewSegments { axis: "width", count: self.width_segments });
        }
        if self.height_segments < 3 {
            return Err(GeometryError::TooFewSegments { axis: "height", count: self.height_segments });
        }
        Ok(())
    }
}

/// Index range drawn with one entry of a multi-material mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryGroup {
    pub start: u32,
    pub count: u32,
    pub material_index: usize,
}

/// Indexed triangle list. Texture coordinates use v = 0 at the top of the image.
#[derive(Debug, Clone)]
pub struct Geometry {
    id: GeometryId,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    pub groups: Vec<GeometryGroup>,
    disposed: bool,
}

impl Geometry {
    pub fn new(
        positions: Vec<[f32; 3]>,
        normals: Vec<[f32; 3]>,
        uvs: Vec<[f32; 2]>,
        indices: Vec<u32>,
    ) -> Self {
        Self {
            id: GeometryId(NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed)),
            positions,
            normals,
            uvs,
            indices,
            groups: Vec::new(),
            disposed: false,
        }
    }

    pub fn id(&self) -> GeometryId {
        self.id
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| {
            [
                Vec3::from(self.positions[t[0] as usize]),
                Vec3::from(self.positions[t[1] as usize]),
                Vec3::from(self.positions[t[2] as usize]),
            ]
        })
    }

    /// Scales vertices in place; normals follow and a mirrored scale flips the winding.
    pub fn scale(&mut self, s: Vec3) {
        for p in &mut self.positions {
            *p = (Vec3::from(*p) * s).to_array();
        }
        let inv = Vec3::ONE / s;
        for n in &mut self.normals {
            *n = (Vec3::from(*n) * inv).normalize_or_zero().to_array();
        }
    }

    /// Nearest hit of a ray against counter-clockwise (front) faces only.
    pub fn raycast_front(&self, origin: Vec3, dir: Vec3) -> Option<f32> {
        const EPS: f32 = 1e-7;
        let mut best: Option<f32> = None;
        for [a, b, c] in self.triangles() {
            let e1 = b - a;
            let e2 = c - a;
            let p = dir.cross(e2);
            let det = e1.dot(p);
            // det > 0 means the ray looks at the front side of a CCW triangle.
            if det <= EPS {
                continue;
            }
            let inv = 1.0 / det;
            let s = origin - a;
            let u = s.dot(p) * inv;
            if !(0.0..=1.0).contains(&u) {
                continue;
            }
            let q = s.cross(e1);
            let v = dir.dot(q) * inv;
            if v < 0.0 || u + v > 1.0 {
                continue;
            }
            let t = e2.dot(q) * inv;
            if t > EPS && best.map_or(true, |b| t < b) {
                best = Some(t);
            }
        }
        best
    }
}

impl Disposable for Geometry {
    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.positions = Vec::new();
        self.normals = Vec::new();
        self.uvs = Vec::new();
        self.indices = Vec::new();
        self.groups = Vec::new();
        self.disposed = true;
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// UV sphere with outward-facing CCW triangles. Pole rows emit one triangle per segment.
pub fn build_sphere(params: &SphereParams) -> Result<Geometry, GeometryError> {
    params.validate()?;

    let radius = params.radius;
    let ws = params.width_segments as usize;
    let hs = params.height_segments as usize;
    let row = ws + 1;

    let mut positions = Vec::with_capacity((hs + 1) * row);
    let mut normals = Vec::with_capacity((hs + 1) * row);
    let mut uvs = Vec::with_capacity((hs + 1) * row);
    let mut indices = Vec::with_capacity(ws * (hs - 1) * 6);

    for iy in 0..=hs {
        let v = iy as f32 / hs as f32;
        // centre the pole texels between their neighbours
        let u_offset = if iy == 0 {
            0.5 / ws as f32
        } else if iy == hs {
            -0.5 / ws as f32
        } else {
            0.0
        };

        let theta = v * std::f32::consts::PI;
        for ix in 0..=ws {
            let u = ix as f32 / ws as f32;
            let phi = u * 2.0 * std::f32::consts::PI;

            let p = Vec3::new(
                -radius * phi.cos() * theta.sin(),
                radius * theta.cos(),
                radius * phi.sin() * theta.sin(),
            );
            positions.push(p.to_array());
            normals.push(p.normalize_or_zero().to_array());
            uvs.push([u + u_offset, v]);
        }
    }

    for iy in 0..hs {
        for ix in 0..ws {
            let a = (iy * row + ix + 1) as u32;
            let b = (iy * row + ix) as u32;
            let c = ((iy + 1) * row + ix) as u32;
            let d = ((iy + 1) * row + ix + 1) as u32;

            if iy != 0 {
                indices.extend_from_slice(&[a, b, d]);
            }
            if iy != hs - 1 {
                indices.extend_from_slice(&[b, c, d]);
            }
        }
    }

    Ok(Geometry::new(positions, normals, uvs, indices))
}

/// Geometry plus its material(s).
#[derive(Debug, Clone)]
pub struct Mesh {
    pub geometry: Geometry,
    pub material: MeshMaterials,
}

impl Mesh {
    pub fn new(geometry: Geometry, material: MeshBasicMaterial) -> Self {
        Self { geometry, material: MeshMaterials::Single(material) }
    }

    pub fn with_materials(geometry: Geometry, materials: Vec<MeshBasicMaterial>) -> Self {
        Self { geometry, material: MeshMaterials::Multi(materials) }
    }
}

impl Disposable for Mesh {
    fn dispose(&mut self) {
        self.geometry.dispose();
        for m in self.material.iter_mut() {
            m.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.geometry.is_disposed() && self.material.iter().all(|m| m.is_disposed())
    }
}

/// Sphere viewed from the inside: mirrored on X so the image reads correctly,
/// with a double-sided material. The texture keeps loading after this returns.
pub fn build_panorama_surface(
    loader: &TextureLoader,
    texture_path: impl AsRef<Path>,
    params: &SphereParams,
) -> Result<Mesh, GeometryError> {
    let mut geometry = build_sphere(params)?;
    geometry.scale(Vec3::new(-1.0, 1.0, 1.0));

    let texture = loader.load(texture_path);
    Ok(Mesh::new(geometry, MeshBasicMaterial::new(Some(texture), Side::Double)))
}
