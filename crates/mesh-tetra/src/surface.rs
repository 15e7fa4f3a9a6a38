//! Closed boundary surfaces of labelmap regions, via Surface Nets.

use fast_surface_nets::{SurfaceNetsBuffer, ndshape::RuntimeShape, surface_nets};
use nalgebra::Vector3;
use tracing::{debug, info, warn};

use crate::colors::BACKGROUND_LABEL;
use crate::error::{TetraError, TetraResult};
use crate::types::PolygonSurface;
use crate::volume::LabelVolume;

const INSIDE: f32 = -1.0;
const OUTSIDE: f32 = 1.0;

/// Extract the boundary of one region as a closed triangle surface in
/// physical coordinates.
///
/// Returns `None` when no voxel carries the label.
pub fn extract_region(volume: &LabelVolume, label: u16) -> Option<PolygonSurface> {
    let (lo, hi) = volume.index_bounds(&[label])?;
    let start = volume.geometry.extent_start;

    // Crop to the region and add one outside voxel on every side so the
    // surface closes where the region touches the volume border.
    let dims = [
        (hi[0] - lo[0] + 3) as usize,
        (hi[1] - lo[1] + 3) as usize,
        (hi[2] - lo[2] + 3) as usize,
    ];
    let mut field = vec![OUTSIDE; dims[0] * dims[1] * dims[2]];
    for z in 1..dims[2] - 1 {
        for y in 1..dims[1] - 1 {
            for x in 1..dims[0] - 1 {
                let local = [
                    (lo[0] - start[0]) as usize + x - 1,
                    (lo[1] - start[1]) as usize + y - 1,
                    (lo[2] - start[2]) as usize + z - 1,
                ];
                if volume.get(local[0], local[1], local[2]) == label {
                    field[x + dims[0] * (y + dims[1] * z)] = INSIDE;
                }
            }
        }
    }

    let shape = RuntimeShape::<u32, 3>::new([dims[0] as u32, dims[1] as u32, dims[2] as u32]);
    let mut buffer = SurfaceNetsBuffer::default();
    surface_nets(
        &field,
        &shape,
        [0, 0, 0],
        [dims[0] as u32 - 1, dims[1] as u32 - 1, dims[2] as u32 - 1],
        &mut buffer,
    );

    debug!(
        label = label,
        positions = buffer.positions.len(),
        indices = buffer.indices.len(),
        "Surface nets complete"
    );

    let mut surface = PolygonSurface::new();
    // Grid position p corresponds to absolute index lo - 1 + p
    surface.points = buffer
        .positions
        .iter()
        .map(|p| {
            let ijk = Vector3::new(
                (lo[0] - 1) as f64 + p[0] as f64,
                (lo[1] - 1) as f64 + p[1] as f64,
                (lo[2] - 1) as f64 + p[2] as f64,
            );
            volume.geometry.index_to_physical(ijk)
        })
        .collect();
    surface.polygons = buffer
        .indices
        .chunks_exact(3)
        .map(|t| vec![t[0], t[1], t[2]])
        .collect();

    Some(surface)
}

/// Extract and append the closed surfaces of the selected regions.
///
/// The background label and labels absent from the volume are an
/// [`TetraError::UnknownRegion`]; labels known from the region table but without voxels are skipped.
pub fn extract_regions(volume: &LabelVolume, labels: &[u16]) -> TetraResult<PolygonSurface> {
    let mut combined = PolygonSurface::new();
    for &label in labels {
        if label == BACKGROUND_LABEL || !volume.has_label(label) {
            return Err(TetraError::UnknownRegion { label });
        }
        match extract_region(volume, label) {
            Some(surface) => combined.append(&surface),
            None => warn!(label = label, "Region has no voxels, skipping"),
        }
    }

    if combined.is_empty() {
        return Err(TetraError::empty_surface(
            "none of the selected regions contains any voxel",
        ));
    }

    info!(
        regions = labels.len(),
        points = combined.point_count(),
        polygons = combined.polygon_count(),
        "Region surfaces extracted"
    );
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{Region, VolumeGeometry};
    use nalgebra::Point3;

    fn cube_volume() -> LabelVolume {
        let mut volume = LabelVolume::zeros(VolumeGeometry::identity([8, 8, 8]))
            .unwrap()
            .with_regions(vec![Region::new(1, "cube"), Region::new(2, "unused")]);
        volume.fill_box([2, 2, 2], [5, 5, 5], 1);
        volume
    }

    #[test]
    fn test_region_surface_encloses_voxels() {
        let volume = cube_volume();
        let surface = extract_region(&volume, 1).unwrap();
        assert!(!surface.is_empty());

        let (min, max) = surface.bounds().unwrap();
        // Boundary sits between inside and outside voxel centers
        assert!(min.x > 1.0 && min.x < 2.0);
        assert!(max.x > 5.0 && max.x < 6.0);
        assert!(surface.polygons.iter().all(|p| p.len() == 3));
    }

    #[test]
    fn test_region_touching_border_is_closed() {
        let mut volume = LabelVolume::zeros(VolumeGeometry::identity([3, 3, 3])).unwrap();
        volume.fill_box([0, 0, 0], [2, 2, 2], 5);
        let surface = extract_region(&volume, 5).unwrap();

        // Every edge of a closed triangle surface is shared by two triangles
        let mut edges = hashbrown::HashMap::new();
        for tri in &surface.polygons {
            for i in 0..3 {
                let (a, b) = (tri[i], tri[(i + 1) % 3]);
                *edges.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        assert!(edges.values().all(|&n| n == 2));
    }

    #[test]
    fn test_physical_placement_uses_geometry() {
        let geometry = VolumeGeometry::identity([4, 4, 4])
            .with_origin(Point3::new(100.0, 0.0, 0.0))
            .with_spacing(Vector3::new(2.0, 2.0, 2.0));
        let mut volume = LabelVolume::zeros(geometry).unwrap();
        volume.fill_box([1, 1, 1], [2, 2, 2], 3);

        let (min, _) = extract_region(&volume, 3).unwrap().bounds().unwrap();
        assert!(min.x > 100.0 && min.x < 102.0);
    }

    #[test]
    fn test_unknown_and_empty_regions() {
        let volume = cube_volume();
        assert!(matches!(
            extract_regions(&volume, &[9]),
            Err(TetraError::UnknownRegion { label: 9 })
        ));
        assert!(matches!(
            extract_regions(&volume, &[2]),
            Err(TetraError::EmptySurface { .. })
        ));
        assert!(extract_regions(&volume, &[1, 2]).is_ok());
    }

    #[test]
    fn test_background_is_not_a_region() {
        let volume = cube_volume();
        assert!(volume.has_label(0));
        assert!(matches!(
            extract_regions(&volume, &[0]),
            Err(TetraError::UnknownRegion { label: 0 })
        ));
        assert!(matches!(
            extract_regions(&volume, &[1, 0]),
            Err(TetraError::UnknownRegion { label: 0 })
        ));
    }
}
