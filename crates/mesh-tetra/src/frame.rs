//! Coordinate correction for volumetric mesher output.
//!
//! The volumetric mesher writes points in a frame scaled by the voxel
//! spacing but without the volume's orientation or origin, and measured from
//! the lower corner of the first voxel rather than its center. The correction
//! therefore uses the unit direction matrix as linear part and, as
//! translation, the physical position of index `(-0.5, -0.5, -0.5)`.

use nalgebra::{Matrix3, Matrix4, Point3, Vector3, Vector4};
use rayon::prelude::*;

use crate::types::TetrahedralMesh;
use crate::volume::VolumeGeometry;

/// Index-to-physical placement of the volume handed to the mesher.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialFrame {
    /// Index-to-physical affine (direction times spacing, plus origin).
    pub ijk_to_physical: Matrix4<f64>,
    /// Unit axis directions as columns.
    pub direction: Matrix3<f64>,
}

impl SpatialFrame {
    /// Frame of a volume geometry.
    pub fn from_geometry(geometry: &VolumeGeometry) -> Self {
        Self {
            ijk_to_physical: geometry.ijk_to_physical(),
            direction: geometry.direction,
        }
    }

    /// Physical position of the lower corner of voxel `(0, 0, 0)`.
    pub fn corner_origin(&self) -> Point3<f64> {
        let h = self.ijk_to_physical * Vector4::new(-0.5, -0.5, -0.5, 1.0);
        Point3::new(h.x, h.y, h.z)
    }

    /// Transform from mesher coordinates to physical coordinates.
    pub fn correction(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.direction);
        m.fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&self.corner_origin().coords);
        m
    }

    /// Map a single mesher point.
    pub fn apply_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.correction().transform_point(p)
    }

    /// Move every point of `mesh` into the physical frame and rotate its
    /// vector and normal arrays along.
    pub fn apply(&self, mesh: &mut TetrahedralMesh) {
        let correction = self.correction();
        let rotation = self.direction;

        mesh.points
            .par_iter_mut()
            .for_each(|p| *p = correction.transform_point(p));

        for array in mesh
            .point_data
            .iter_mut()
            .chain(mesh.cell_data.iter_mut())
            .filter(|a| a.kind.is_directional() && a.components == 3)
        {
            array.values.par_chunks_mut(3).for_each(|v| {
                let r = rotation * Vector3::new(v[0], v[1], v[2]);
                v.copy_from_slice(r.as_slice());
            });
        }

        mesh.applied_transform = correction * mesh.applied_transform;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttributeKind, DataArray};
    use approx::assert_relative_eq;

    fn rotated_geometry() -> VolumeGeometry {
        // 90 degrees about z: x -> y, y -> -x
        let direction = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        VolumeGeometry::identity([4, 4, 4])
            .with_spacing(Vector3::new(2.0, 1.0, 0.5))
            .with_origin(Point3::new(5.0, 6.0, 7.0))
            .with_direction(direction)
    }

    #[test]
    fn test_first_voxel_corner() {
        let geometry = VolumeGeometry::identity([3, 3, 3])
            .with_spacing(Vector3::new(2.0, 4.0, 1.0))
            .with_origin(Point3::new(1.0, 1.0, 1.0));
        let frame = SpatialFrame::from_geometry(&geometry);
        assert_relative_eq!(frame.corner_origin(), Point3::new(0.0, -1.0, 0.5));
        assert_relative_eq!(
            frame.apply_point(&Point3::origin()),
            Point3::new(0.0, -1.0, 0.5)
        );
    }

    #[test]
    fn test_correction_is_rigid() {
        let frame = SpatialFrame::from_geometry(&rotated_geometry());
        let a = Point3::new(1.0, 0.0, 0.0);
        let b = Point3::new(0.0, 3.0, 4.0);
        let da = (a - b).norm();
        let db = (frame.apply_point(&a) - frame.apply_point(&b)).norm();
        assert_relative_eq!(da, db, epsilon = 1e-12);
    }

    #[test]
    fn test_apply_rotates_vectors_not_scalars() {
        let frame = SpatialFrame::from_geometry(&rotated_geometry());
        let mut mesh = TetrahedralMesh::new();
        mesh.points.push(Point3::origin());
        mesh.point_data.push(DataArray {
            name: "flow".into(),
            kind: AttributeKind::Vectors,
            data_type: "float".into(),
            components: 3,
            values: vec![1.0, 0.0, 0.0],
        });
        mesh.point_data.push(DataArray {
            name: "weights".into(),
            kind: AttributeKind::Scalars { lookup_table: None },
            data_type: "float".into(),
            components: 3,
            values: vec![1.0, 0.0, 0.0],
        });

        frame.apply(&mut mesh);

        assert_relative_eq!(mesh.points[0], frame.corner_origin(), epsilon = 1e-12);
        assert_relative_eq!(mesh.point_data[0].values[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(mesh.point_data[0].values[1], 1.0, epsilon = 1e-12);
        assert_eq!(mesh.point_data[1].values, vec![1.0, 0.0, 0.0]);
        assert_relative_eq!(mesh.applied_transform, frame.correction(), epsilon = 1e-12);
    }
}
