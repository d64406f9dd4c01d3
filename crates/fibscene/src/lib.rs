//! fibscene: voxel scene descriptions -> parametric primitive arrays.
//!
//! - Parses the line-oriented scene format (spheres, cylinders, cuboids).
//! - Encodes each primitive into a fixed-width `f32` row for a heightfield extractor.
//! - Ships a CPU reference extractor and the postprocessing that turns its
//!   tensors into image-ready arrays.
//!
//! Scene file layout (one record per line, `#` lines skipped anywhere):
//!   <sphere_count>
//!   <cylinder_count>
//!   <cube_count>
//!   id x y z radius                                    (sphere_count lines)
//!   id x y z euler1 euler2 euler3 radius length        (cylinder_count lines)
//!   id x y z euler1 euler2 euler3 extent1 extent2 extent3  (cube_count lines)
//!
//! Encoded rows (f32, positional):
//!   sphere   : x+0.5 y+0.5 z+0.5 r
//!   cylinder : x+0.5 y+0.5 z+0.5 qx qy qz qw r length*0.5
//!   cuboid   : x+0.5 y+0.5 z+0.5 qx qy qz qw e1 e2 e3
//!
//! Euler angles are radians, intrinsic Z-X-Z; quaternions are scalar-last.

pub mod encoder;
pub mod error;
pub mod extractor;
pub mod lines;
pub mod parser;
pub mod postprocess;
pub mod primitive;

pub use encoder::{encode_scene, euler_zxz_to_quat, EncodedBatch};
pub use error::{ExtractError, ParseError};
pub use extractor::{CpuExtractor, Extraction, ExtractorConfig, HeightfieldExtractor, Normal};
pub use lines::{Line, SceneLines, COMMENT_MARKER};
pub use parser::{PrimitiveParser, SceneDescription};
pub use postprocess::{normal_map_to_rgb8, postprocess_heightfield, postprocess_normal_map};
pub use primitive::{PrimitiveKind, PrimitiveRecord};

/// Square side length of the generated maps.
pub const DEFAULT_RESOLUTION: u32 = 850;

/// Number of (entry, exit) layers the extractor records per pixel.
pub const DEFAULT_LAYER_COUNT: usize = 2;

/// Largest representable height; the postprocessor clamps to it.
pub const DEFAULT_MAX_HEIGHT: f32 = 256.0;

/// Fill value for pixels (and layers) that hit no geometry.
pub const DEFAULT_BACKGROUND: f32 = 0.0;
