//! Heightfield / normal-map extraction.
//!
//! [`HeightfieldExtractor`] is the contract the batch pipeline talks to:
//! per-kind parameter arrays go in, a layered heightfield and a normal map
//! come out. [`CpuExtractor`] is a straightforward ray-casting implementation
//! of that contract.
//!
//! Rays are orthographic along +z, one per pixel, through `(col + 0.5, row + 0.5)`.
//! Each pixel stores up to `layer_count` occupied intervals as `(entry, exit)`
//! depths, nearest first; the normal map holds the outward normal at the
//! first entry.

use bytemuck::{Pod, Zeroable};
use log::debug;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use ndarray::{Array3, ArrayD, ArrayView2, IxDyn};
use rayon::prelude::*;

use crate::encoder::EncodedBatch;
use crate::error::ExtractError;
use crate::primitive::PrimitiveKind;
use crate::{DEFAULT_LAYER_COUNT, DEFAULT_MAX_HEIGHT, DEFAULT_RESOLUTION};

/// Unit surface normal, laid out like a packed `float3`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Normal {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Normal {
    /// Normal written where a ray hits nothing: facing the viewer.
    pub const BACKGROUND: Normal = Normal {
        x: 0.0,
        y: 0.0,
        z: -1.0,
    };

    fn from_vector(v: &Vector3<f64>) -> Self {
        Self {
            x: v.x as f32,
            y: v.y as f32,
            z: v.z as f32,
        }
    }
}

/// Fixed per-batch extractor settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractorConfig {
    /// `(width, height)` in pixels.
    pub resolution: (u32, u32),
    pub layer_count: usize,
    pub max_height: f32,
}

impl ExtractorConfig {
    pub fn square(side: u32, layer_count: usize, max_height: f32) -> Self {
        Self {
            resolution: (side, side),
            layer_count,
            max_height,
        }
    }

    /// Heightfield values per pixel: an entry and an exit per layer.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.layer_count * 2
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self::square(DEFAULT_RESOLUTION, DEFAULT_LAYER_COUNT, DEFAULT_MAX_HEIGHT)
    }
}

/// Raw extractor output, before postprocessing.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Layered depths; the CPU extractor emits `(height, width, layer_count, 2)`.
    pub heightfield: ArrayD<f32>,
    /// `(height, width, 1)`; the trailing axis is a redundant layer axis.
    pub normal_map: Array3<Normal>,
}

pub trait HeightfieldExtractor {
    fn add_spheres(&mut self, spheres: ArrayView2<'_, f32>) -> Result<(), ExtractError>;

    fn add_cylinders(&mut self, cylinders: ArrayView2<'_, f32>) -> Result<(), ExtractError>;

    fn add_cuboids(&mut self, cuboids: ArrayView2<'_, f32>) -> Result<(), ExtractError>;

    fn extract(&mut self, background: f32) -> Result<Extraction, ExtractError>;

    /// Hand over every non-empty kind of `batch`. Empty kinds are skipped,
    /// never passed as zero-row arrays.
    fn add_batch(&mut self, batch: &EncodedBatch) -> Result<(), ExtractError> {
        for kind in batch.non_empty_kinds() {
            let rows = batch.get(kind).view();
            debug!("Adding {} {} rows", rows.nrows(), kind);
            match kind {
                PrimitiveKind::Sphere => self.add_spheres(rows)?,
                PrimitiveKind::Cylinder => self.add_cylinders(rows)?,
                PrimitiveKind::Cube => self.add_cuboids(rows)?,
            }
        }
        Ok(())
    }
}

const PARALLEL_EPS: f64 = 1e-12;

#[derive(Debug, Clone)]
enum Shape {
    Sphere {
        center: Vector3<f64>,
        radius: f64,
    },
    Cylinder {
        center: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
        radius: f64,
        half_length: f64,
    },
    Cuboid {
        center: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
        half_extents: Vector3<f64>,
    },
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    t_in: f64,
    t_out: f64,
    normal: Vector3<f64>,
}

/// Parameter interval `[t0, t1]` where `lo <= o + t * d <= hi`.
#[inline]
fn slab(o: f64, d: f64, lo: f64, hi: f64) -> Option<(f64, f64)> {
    if d.abs() < PARALLEL_EPS {
        return (lo..=hi)
            .contains(&o)
            .then_some((f64::NEG_INFINITY, f64::INFINITY));
    }

    let t1 = (lo - o) / d;
    let t2 = (hi - o) / d;
    Some((t1.min(t2), t1.max(t2)))
}

fn vec3(row: &[f32]) -> Vector3<f64> {
    Vector3::new(row[0] as f64, row[1] as f64, row[2] as f64)
}

/// Row layout stores `[x, y, z, w]`.
fn rotation(row: &[f32]) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(Quaternion::new(
        row[3] as f64,
        row[0] as f64,
        row[1] as f64,
        row[2] as f64,
    ))
}

impl Shape {
    fn from_row(kind: PrimitiveKind, row: &[f32]) -> Self {
        let center = vec3(&row[0..3]);
        match kind {
            PrimitiveKind::Sphere => Shape::Sphere {
                center,
                radius: row[3] as f64,
            },
            PrimitiveKind::Cylinder => Shape::Cylinder {
                center,
                rotation: rotation(&row[3..7]),
                radius: row[7] as f64,
                half_length: row[8] as f64,
            },
            PrimitiveKind::Cube => Shape::Cuboid {
                center,
                rotation: rotation(&row[3..7]),
                half_extents: vec3(&row[7..10]).abs(),
            },
        }
    }

    fn center(&self) -> &Vector3<f64> {
        match self {
            Shape::Sphere { center, .. }
            | Shape::Cylinder { center, .. }
            | Shape::Cuboid { center, .. } => center,
        }
    }

    /// Radius of a sphere around the centre enclosing the whole shape.
    fn reach(&self) -> f64 {
        match self {
            Shape::Sphere { radius, .. } => radius.abs(),
            Shape::Cylinder {
                radius,
                half_length,
                ..
            } => radius.hypot(*half_length),
            Shape::Cuboid { half_extents, .. } => half_extents.norm(),
        }
    }

    /// Intersect the vertical ray through `(x, y)` with this shape.
    fn hit(&self, x: f64, y: f64) -> Option<Hit> {
        match self {
            Shape::Sphere { center, radius } => {
                let r = radius.abs();
                let (dx, dy) = (x - center.x, y - center.y);
                let d2 = dx * dx + dy * dy;
                if r <= 0.0 || d2 > r * r {
                    return None;
                }
                let h = (r * r - d2).sqrt();
                Some(Hit {
                    t_in: center.z - h,
                    t_out: center.z + h,
                    normal: Vector3::new(dx, dy, -h) / r,
                })
            }
            Shape::Cylinder {
                center,
                rotation,
                radius,
                half_length,
            } => {
                let r = radius.abs();
                let hl = half_length.abs();
                let o = rotation.inverse_transform_vector(&Vector3::new(x - center.x, y - center.y, -center.z));
                let d = rotation.inverse_transform_vector(&Vector3::z());

                let a = d.x * d.x + d.y * d.y;
                let c = o.x * o.x + o.y * o.y - r * r;
                let side = if a < PARALLEL_EPS {
                    (c <= 0.0).then_some((f64::NEG_INFINITY, f64::INFINITY))?
                } else {
                    let b = 2.0 * (o.x * d.x + o.y * d.y);
                    let disc = b * b - 4.0 * a * c;
                    if disc < 0.0 {
                        return None;
                    }
                    let sq = disc.sqrt();
                    ((-b - sq) / (2.0 * a), (-b + sq) / (2.0 * a))
                };
                let cap = slab(o.z, d.z, -hl, hl)?;

                let t_in = side.0.max(cap.0);
                let t_out = side.1.min(cap.1);
                if t_in > t_out || !t_in.is_finite() {
                    return None;
                }

                let local_normal = if side.0 >= cap.0 {
                    let p = o + d * t_in;
                    Vector3::new(p.x, p.y, 0.0) / r
                } else {
                    Vector3::new(0.0, 0.0, -d.z.signum())
                };

                Some(Hit {
                    t_in,
                    t_out,
                    normal: rotation.transform_vector(&local_normal),
                })
            }
            Shape::Cuboid {
                center,
                rotation,
                half_extents,
            } => {
                let o = rotation.inverse_transform_vector(&Vector3::new(x - center.x, y - center.y, -center.z));
                let d = rotation.inverse_transform_vector(&Vector3::z());

                let mut t_in = f64::NEG_INFINITY;
                let mut t_out = f64::INFINITY;
                let mut entry_axis = 0;

                for axis in 0..3 {
                    let (t0, t1) = slab(o[axis], d[axis], -half_extents[axis], half_extents[axis])?;
                    if t0 > t_in {
                        t_in = t0;
                        entry_axis = axis;
                    }
                    t_out = t_out.min(t1);
                }

                if t_in > t_out || !t_in.is_finite() {
                    return None;
                }

                let mut local_normal = Vector3::zeros();
                local_normal[entry_axis] = -d[entry_axis].signum();

                Some(Hit {
                    t_in,
                    t_out,
                    normal: rotation.transform_vector(&local_normal),
                })
            }
        }
    }
}

/// Ray-casting extractor running on the CPU, one rayon task per image row.
pub struct CpuExtractor {
    config: ExtractorConfig,
    shapes: Vec<Shape>,
}

impl CpuExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            config,
            shapes: Vec::new(),
        }
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    fn add_rows(&mut self, kind: PrimitiveKind, rows: ArrayView2<'_, f32>) -> Result<(), ExtractError> {
        if rows.nrows() == 0 {
            return Err(ExtractError::EmptyBatch(kind));
        }
        if rows.ncols() != kind.row_width() {
            return Err(ExtractError::RowWidth {
                kind,
                expected: kind.row_width(),
                actual: rows.ncols(),
            });
        }

        self.shapes.reserve(rows.nrows());
        for row in rows.rows() {
            let row = row.to_vec();
            self.shapes.push(Shape::from_row(kind, &row));
        }
        Ok(())
    }

    /// Occupied intervals along the ray through `(x, y)`, merged and sorted.
    fn trace(&self, x: f64, y: f64) -> Vec<Hit> {
        let max_height = self.config.max_height as f64;

        let mut hits: Vec<Hit> = self
            .shapes
            .iter()
            .filter(|shape| {
                let c = shape.center();
                let reach = shape.reach();
                (x - c.x).abs() <= reach && (y - c.y).abs() <= reach
            })
            .filter_map(|shape| shape.hit(x, y))
            .filter(|hit| hit.t_in < max_height)
            .collect();

        hits.sort_by(|a, b| a.t_in.total_cmp(&b.t_in));

        let mut merged: Vec<Hit> = Vec::with_capacity(hits.len());
        for hit in hits {
            match merged.last_mut() {
                Some(last) if hit.t_in <= last.t_out => {
                    last.t_out = last.t_out.max(hit.t_out);
                }
                _ => merged.push(hit),
            }
        }
        merged
    }
}

impl HeightfieldExtractor for CpuExtractor {
    fn add_spheres(&mut self, spheres: ArrayView2<'_, f32>) -> Result<(), ExtractError> {
        self.add_rows(PrimitiveKind::Sphere, spheres)
    }

    fn add_cylinders(&mut self, cylinders: ArrayView2<'_, f32>) -> Result<(), ExtractError> {
        self.add_rows(PrimitiveKind::Cylinder, cylinders)
    }

    fn add_cuboids(&mut self, cuboids: ArrayView2<'_, f32>) -> Result<(), ExtractError> {
        self.add_rows(PrimitiveKind::Cube, cuboids)
    }

    fn extract(&mut self, background: f32) -> Result<Extraction, ExtractError> {
        let (width, height) = (self.config.resolution.0 as usize, self.config.resolution.1 as usize);
        let layers = self.config.layer_count;
        let channels = self.config.channel_count();

        debug!(
            "Extracting {}x{} with {} layers from {} shapes",
            width,
            height,
            layers,
            self.shape_count()
        );

        let mut depths = vec![background; width * height * channels];
        let mut normals = vec![Normal::BACKGROUND; width * height];

        if width > 0 && channels > 0 {
            depths
                .par_chunks_mut(width * channels)
                .zip(normals.par_chunks_mut(width))
                .enumerate()
                .for_each(|(row, (depth_row, normal_row))| {
                    let y = row as f64 + 0.5;
                    for col in 0..width {
                        let x = col as f64 + 0.5;
                        let hits = self.trace(x, y);

                        if let Some(first) = hits.first() {
                            normal_row[col] = Normal::from_vector(&first.normal);
                        }

                        let pixel = &mut depth_row[col * channels..(col + 1) * channels];
                        for (layer, hit) in hits.iter().take(layers).enumerate() {
                            pixel[layer * 2] = hit.t_in as f32;
                            pixel[layer * 2 + 1] = hit.t_out as f32;
                        }
                    }
                });
        }

        let shape = [height, width, layers, 2];
        let heightfield = ArrayD::from_shape_vec(IxDyn(&shape), depths).map_err(|_| ExtractError::Shape {
            what: "heightfield",
            expected: shape.to_vec(),
            actual: Vec::new(),
        })?;
        let normal_map = Array3::from_shape_vec((height, width, 1), normals).map_err(|_| ExtractError::Shape {
            what: "normal map",
            expected: vec![height, width, 1],
            actual: Vec::new(),
        })?;

        Ok(Extraction {
            heightfield,
            normal_map,
        })
    }
}
