use log::debug;
use nalgebra::{UnitQuaternion, Vector3};
use ndarray::{Array2, ArrayViewMut1};

use crate::parser::SceneDescription;
use crate::primitive::{PrimitiveKind, PrimitiveRecord};

/// Shifts a voxel index onto the centre of that voxel.
pub const VOXEL_CENTER_OFFSET: f64 = 0.5;

/// Quaternion `[x, y, z, w]` for the intrinsic Z-X-Z rotation `(e1, e2, e3)`
/// in radians: rotate about z by `e1`, then about the new x by `e2`, then
/// about the new z by `e3`.
pub fn euler_zxz_to_quat(euler: [f64; 3]) -> [f64; 4] {
    let [e1, e2, e3] = euler;

    let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), e1)
        * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), e2)
        * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), e3);

    [q.i, q.j, q.k, q.w]
}

/// Write one record's extractor row into `row` (length `kind.row_width()`).
fn encode_into(record: &PrimitiveRecord, mut row: ArrayViewMut1<'_, f32>) {
    for (axis, coord) in record.position().into_iter().enumerate() {
        row[axis] = (coord + VOXEL_CENTER_OFFSET) as f32;
    }

    let dims = record.dimensions();
    match record.euler() {
        None => {
            row[3] = dims[0] as f32;
        }
        Some(euler) => {
            for (slot, q) in euler_zxz_to_quat(euler).into_iter().enumerate() {
                row[3 + slot] = q as f32;
            }

            if record.kind() == PrimitiveKind::Cylinder {
                row[7] = dims[0] as f32;
                // The extractor takes a half-length.
                row[8] = (dims[1] * 0.5) as f32;
            } else {
                for (slot, extent) in dims.iter().enumerate() {
                    row[7 + slot] = *extent as f32;
                }
            }
        }
    }
}

/// Encode one kind's records into a `(n, kind.row_width())` array.
fn encode_records(scene: &SceneDescription, kind: PrimitiveKind) -> Array2<f32> {
    let records = scene.records(kind);
    let mut out = Array2::<f32>::zeros((records.len(), kind.row_width()));

    for (record, row) in records.iter().zip(out.rows_mut()) {
        encode_into(record, row);
    }

    out
}

/// Per-kind parameter arrays for one scene. Empty kinds have zero rows.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBatch {
    pub spheres: Array2<f32>,
    pub cylinders: Array2<f32>,
    pub cuboids: Array2<f32>,
}

impl EncodedBatch {
    #[inline]
    pub fn get(&self, kind: PrimitiveKind) -> &Array2<f32> {
        match kind {
            PrimitiveKind::Sphere => &self.spheres,
            PrimitiveKind::Cylinder => &self.cylinders,
            PrimitiveKind::Cube => &self.cuboids,
        }
    }

    /// Kinds that have at least one row, in file order.
    pub fn non_empty_kinds(&self) -> impl Iterator<Item = PrimitiveKind> + '_ {
        PrimitiveKind::ALL
            .into_iter()
            .filter(|&kind| self.get(kind).nrows() > 0)
    }
}

pub fn encode_scene(scene: &SceneDescription) -> EncodedBatch {
    let batch = EncodedBatch {
        spheres: encode_records(scene, PrimitiveKind::Sphere),
        cylinders: encode_records(scene, PrimitiveKind::Cylinder),
        cuboids: encode_records(scene, PrimitiveKind::Cube),
    };

    debug!(
        "Encoded batch: spheres {:?}, cylinders {:?}, cuboids {:?}",
        batch.spheres.dim(),
        batch.cylinders.dim(),
        batch.cuboids.dim()
    );

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    fn assert_close(actual: &[f64], expected: &[f64]) {
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{actual:?} != {expected:?}");
        }
    }

    fn norm(q: &[f32]) -> f64 {
        q.iter().map(|&c| (c as f64) * (c as f64)).sum::<f64>().sqrt()
    }

    #[test]
    fn single_sphere_scene_encodes_to_centered_row() {
        let scene = SceneDescription::parse_str("1\n0\n0\n0 2.0 3.0 4.0 5.0\n").unwrap();
        let batch = encode_scene(&scene);

        assert_eq!(batch.spheres.dim(), (1, 4));
        assert_eq!(batch.spheres.row(0).to_vec(), vec![2.5, 3.5, 4.5, 5.0]);
        assert_eq!(batch.cylinders.dim(), (0, 9));
        assert_eq!(batch.cuboids.dim(), (0, 10));
        assert_eq!(
            batch.non_empty_kinds().collect::<Vec<_>>(),
            vec![PrimitiveKind::Sphere]
        );
    }

    #[test]
    fn centre_offset_is_exact_for_every_kind() {
        let text = "1\n1\n1\n0 -3 0 17 1\n1 10 20 30 0.3 0.2 0.1 1 2\n2 0.25 -0.75 99 1 2 3 4 5 6\n";
        let scene = SceneDescription::parse_str(text).unwrap();
        let batch = encode_scene(&scene);

        for kind in PrimitiveKind::ALL {
            let record = &scene.records(kind)[0];
            let row = batch.get(kind).row(0);
            for axis in 0..3 {
                assert_eq!(row[axis], (record.params()[axis] + 0.5) as f32);
            }
        }
    }

    #[test]
    fn zero_angles_give_identity_quaternion() {
        assert_eq!(euler_zxz_to_quat([0.0, 0.0, 0.0]), [0.0, 0.0, 0.0, 1.0]);

        let scene = SceneDescription::parse_str("0\n1\n0\n0 1 2 3 0 0 0 4 10\n").unwrap();
        let batch = encode_scene(&scene);
        assert_eq!(
            batch.cylinders.row(0).to_vec(),
            vec![1.5, 2.5, 3.5, 0.0, 0.0, 0.0, 1.0, 4.0, 5.0]
        );
    }

    #[test]
    fn quaternion_is_scalar_last_and_follows_zxz() {
        let h = FRAC_PI_4.sin();

        // Pure z rotation of 90 degrees.
        assert_close(&euler_zxz_to_quat([FRAC_PI_2, 0.0, 0.0]), &[0.0, 0.0, h, h]);
        // Pure x rotation of 90 degrees.
        assert_close(&euler_zxz_to_quat([0.0, FRAC_PI_2, 0.0]), &[h, 0.0, 0.0, h]);
        // Both z angles add up when the middle angle is zero.
        assert_close(
            &euler_zxz_to_quat([0.3, 0.0, 0.4]),
            &euler_zxz_to_quat([0.7, 0.0, 0.0]),
        );
    }

    #[test]
    fn intrinsic_order_matters() {
        // Rz(pi/2) then Rx'(pi/2): the new x axis is the old y axis.
        let q = euler_zxz_to_quat([FRAC_PI_2, FRAC_PI_2, 0.0]);
        assert_close(&q, &[0.5, 0.5, 0.5, 0.5]);

        let r = euler_zxz_to_quat([0.0, FRAC_PI_2, FRAC_PI_2]);
        assert_close(&r, &[0.5, -0.5, 0.5, 0.5]);
    }

    #[test]
    fn encoded_quaternions_have_unit_norm() {
        let angles = [-7.0, -PI, -1.0, -0.1, 0.0, 0.37, 1.0, 2.5, PI, 12.0];
        let mut cylinders = Vec::new();
        let mut cubes = Vec::new();
        for (i, &a) in angles.iter().enumerate() {
            let b = angles[(i + 3) % angles.len()];
            let c = angles[(i + 7) % angles.len()];
            cylinders.push(format!("{i} 0 0 0 {a} {b} {c} 1 2"));
            cubes.push(format!("{i} 0 0 0 {a} {b} {c} 1 2 3"));
        }
        let text = format!(
            "0\n{}\n{}\n{}\n{}\n",
            cylinders.len(),
            cubes.len(),
            cylinders.join("\n"),
            cubes.join("\n")
        );
        let batch = encode_scene(&SceneDescription::parse_str(&text).unwrap());

        assert_eq!(batch.cylinders.nrows(), angles.len());
        assert_eq!(batch.cuboids.nrows(), angles.len());
        for row in batch.cylinders.rows().into_iter().chain(batch.cuboids.rows()) {
            let q = row.slice(ndarray::s![3..7]).to_vec();
            assert!((norm(&q) - 1.0).abs() < 1e-6, "{q:?}");
        }
    }

    #[test]
    fn pushed_records_encode_like_parsed_ones() {
        let parsed = SceneDescription::parse_str("1\n1\n0\n0 2 3 4 5\n1 1 2 3 0.1 0.2 0.3 4 10\n").unwrap();

        let mut built = SceneDescription::default();
        built.push(PrimitiveRecord::new(PrimitiveKind::Cylinder, 1, vec![1.0, 2.0, 3.0, 0.1, 0.2, 0.3, 4.0, 10.0]).unwrap());
        built.push(PrimitiveRecord::new(PrimitiveKind::Sphere, 0, vec![2.0, 3.0, 4.0, 5.0]).unwrap());

        assert_eq!(encode_scene(&built), encode_scene(&parsed));
    }

    #[test]
    fn cylinder_length_is_halved_and_cube_extents_pass_through() {
        let text = "0\n2\n1\n0 0 0 0 0 0 0 1.5 7\n1 0 0 0 0 0 0 2 0.3\n2 0 0 0 0 0 0 1.5 2.5 3.5\n";
        let batch = encode_scene(&SceneDescription::parse_str(text).unwrap());

        assert_eq!(batch.cylinders[[0, 7]], 1.5);
        assert_eq!(batch.cylinders[[0, 8]], 3.5);
        assert_eq!(batch.cylinders[[1, 8]], (0.3f64 * 0.5) as f32);
        assert_eq!(batch.cuboids.row(0).slice(ndarray::s![7..]).to_vec(), vec![1.5, 2.5, 3.5]);
    }

    #[test]
    fn formatted_records_reencode_identically() {
        let text = "1\n1\n1\n0 1.1 2.2 3.3 0.7\n1 5 6 7 0.12 1.3 -2.2 3 9.75\n2 -1 -2 -3 3.1 0.01 1 0.5 0.25 0.125\n";
        let scene = SceneDescription::parse_str(text).unwrap();
        let first = encode_scene(&scene);

        let formatted: Vec<String> = PrimitiveKind::ALL
            .iter()
            .flat_map(|&k| scene.records(k).iter().map(|r| r.to_line()))
            .collect();
        let reparsed = SceneDescription::parse_str(&format!("1\n1\n1\n{}\n", formatted.join("\n"))).unwrap();

        assert_eq!(encode_scene(&reparsed), first);
    }
}
