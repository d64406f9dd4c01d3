use ndarray::{Array3, ArrayD, Axis};

use crate::error::ExtractError;
use crate::extractor::Normal;

/// Map a signed unit component onto a byte: -1 -> 0, 0 -> 127, 1 -> 255.
/// The scaled value is truncated; out-of-range input saturates and NaN becomes 0.
#[inline]
pub fn normal_component_to_byte(v: f32) -> u8 {
    ((v + 1.0) * 127.5) as u8
}

/// Reshape the raw heightfield to `(side, side, channels)` and clamp
/// everything above `max_height`. Nothing is clamped from below.
pub fn postprocess_heightfield(
    raw: &ArrayD<f32>,
    side: usize,
    channels: usize,
    max_height: f32,
) -> Result<Array3<f32>, ExtractError> {
    let expected = [side, side, channels];
    if raw.len() != side * side * channels {
        return Err(ExtractError::Shape {
            what: "heightfield",
            expected: expected.to_vec(),
            actual: raw.shape().to_vec(),
        });
    }

    // Logical (row-major) order, whatever the source layout.
    let values: Vec<f32> = raw.iter().copied().collect();
    let mut heights = Array3::from_shape_vec(expected, values).map_err(|_| ExtractError::Shape {
        what: "heightfield",
        expected: expected.to_vec(),
        actual: raw.shape().to_vec(),
    })?;

    heights.mapv_inplace(|v| if v > max_height { max_height } else { v });
    Ok(heights)
}

/// Drop the singleton layer axis, unpack `Normal { x, y, z }` into three
/// channels and remap every component to a byte.
pub fn postprocess_normal_map(raw: &Array3<Normal>) -> Result<Array3<u8>, ExtractError> {
    let (height, width, layers) = raw.dim();
    if layers != 1 {
        return Err(ExtractError::Shape {
            what: "normal map",
            expected: vec![height, width, 1],
            actual: vec![height, width, layers],
        });
    }

    let squeezed = raw.index_axis(Axis(2), 0);
    let packed = squeezed.as_standard_layout();
    let normals = packed.as_slice().ok_or_else(|| ExtractError::Shape {
        what: "normal map",
        expected: vec![height, width],
        actual: squeezed.shape().to_vec(),
    })?;

    let components: &[f32] = bytemuck::cast_slice(normals);
    let bytes = components.iter().map(|&v| normal_component_to_byte(v)).collect();

    Array3::from_shape_vec((height, width, 3), bytes).map_err(|_| ExtractError::Shape {
        what: "normal map",
        expected: vec![height, width, 3],
        actual: vec![components.len()],
    })
}

/// Interleaved RGB bytes of a `(height, width, 3)` map plus its `(width, height)`.
pub fn normal_map_to_rgb8(map: &Array3<u8>) -> ((u32, u32), Vec<u8>) {
    let (height, width, _) = map.dim();
    let bytes = map.iter().copied().collect();
    ((width as u32, height as u32), bytes)
}
