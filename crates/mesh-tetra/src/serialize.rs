//! Staging mesher input into a workspace.
//!
//! The volumetric mesher reads a single multi-label NRRD in which the
//! selected regions are numbered `1..=N` and everything else is background.
//! The volume is padded with background so the mesher has room around
//! regions that touch the border. The surface mesher reads an ASCII PLY.

use std::path::PathBuf;

use nalgebra::Vector3;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{TetraError, TetraResult};
use crate::frame::SpatialFrame;
use crate::nrrd;
use crate::ply;
use crate::surface;
use crate::types::PolygonSurface;
use crate::volume::{LabelVolume, Region, VolumeGeometry};
use crate::workspace::Workspace;

/// Labelmap file handed to the volumetric mesher.
pub const INPUT_LABELMAP_FILE: &str = "input_labelmap.nrrd";

/// Surface file handed to the surface mesher.
pub const INPUT_SURFACE_FILE: &str = "mesh.ply";

/// A labelmap ready to be written for the volumetric mesher.
#[derive(Debug, Clone)]
pub struct PreparedLabelmap {
    /// Merged, padded volume with extent start normalized to zero.
    pub volume: LabelVolume,
    /// Inclusive padded extent, before normalization, in the input's index
    /// space.
    pub padded_extent: ([i64; 3], [i64; 3]),
    /// Background voxels added on each side, per axis.
    pub padding: [usize; 3],
    /// Input label and the merged value it was written as, in selection
    /// order.
    pub label_map: Vec<(u16, u16)>,
    /// Placement of the written volume.
    pub frame: SpatialFrame,
}

/// Background voxels added to each side of an axis:
/// `floor(dim * percent / 100)`.
pub fn padding_voxels(dims: [usize; 3], padding_percent: u32) -> [usize; 3] {
    dims.map(|d| d * padding_percent as usize / 100)
}

/// Merge, pad and normalize the selected regions of a labelmap.
///
/// Duplicate labels are merged once, at their first position.
pub fn prepare_labelmap(
    volume: &LabelVolume,
    labels: &[u16],
    padding_percent: u32,
) -> TetraResult<PreparedLabelmap> {
    volume.geometry.validate()?;

    let mut lookup = vec![0u16; u16::MAX as usize + 1];
    let mut label_map: Vec<(u16, u16)> = Vec::with_capacity(labels.len());
    for &label in labels {
        if label == 0 || !volume.has_label(label) {
            return Err(TetraError::UnknownRegion { label });
        }
        if label_map.iter().any(|(l, _)| *l == label) {
            continue;
        }
        let merged = label_map.len() as u16 + 1;
        lookup[label as usize] = merged;
        label_map.push((label, merged));
    }

    let g = &volume.geometry;
    let pad = padding_voxels(g.dims, padding_percent);
    let dims = [
        g.dims[0] + 2 * pad[0],
        g.dims[1] + 2 * pad[1],
        g.dims[2] + 2 * pad[2],
    ];

    let mut data = vec![0u16; dims[0] * dims[1] * dims[2]];
    let slice_len = dims[0] * dims[1];
    data.par_chunks_mut(slice_len)
        .enumerate()
        .skip(pad[2])
        .take(g.dims[2])
        .for_each(|(z, slice)| {
            let sz = z - pad[2];
            for sy in 0..g.dims[1] {
                let row = (sy + pad[1]) * dims[0] + pad[0];
                for sx in 0..g.dims[0] {
                    slice[row + sx] = lookup[volume.get(sx, sy, sz) as usize];
                }
            }
        });

    let start = [
        g.extent_start[0] - pad[0] as i64,
        g.extent_start[1] - pad[1] as i64,
        g.extent_start[2] - pad[2] as i64,
    ];
    let end = [
        start[0] + dims[0] as i64 - 1,
        start[1] + dims[1] as i64 - 1,
        start[2] + dims[2] as i64 - 1,
    ];

    // Same physical placement, extent starting at zero
    let origin = g.index_to_physical(Vector3::new(
        start[0] as f64,
        start[1] as f64,
        start[2] as f64,
    ));
    let geometry = VolumeGeometry {
        extent_start: [0; 3],
        dims,
        spacing: g.spacing,
        origin,
        direction: g.direction,
    };
    let regions: Vec<Region> = label_map
        .iter()
        .map(|&(source, merged)| {
            let mut region = volume
                .region(source)
                .cloned()
                .unwrap_or_else(|| Region::new(source, format!("Region {}", source)));
            region.label = merged;
            region
        })
        .collect();
    let frame = SpatialFrame::from_geometry(&geometry);
    let merged = LabelVolume::new(geometry, data)?.with_regions(regions);

    debug!(
        padding = ?pad,
        padded_start = ?start,
        padded_end = ?end,
        regions = label_map.len(),
        "Labelmap merged and padded"
    );

    Ok(PreparedLabelmap {
        volume: merged,
        padded_extent: (start, end),
        padding: pad,
        label_map,
        frame,
    })
}

/// Write a prepared labelmap into the workspace.
pub fn stage_labelmap(prepared: &PreparedLabelmap, workspace: &Workspace) -> TetraResult<PathBuf> {
    let path = workspace.file(INPUT_LABELMAP_FILE);
    nrrd::write_labelmap(&prepared.volume, &path)?;
    Ok(path)
}

/// Write a polygon surface into the workspace.
pub fn stage_surface(surface: &PolygonSurface, workspace: &Workspace) -> TetraResult<PathBuf> {
    let path = workspace.file(INPUT_SURFACE_FILE);
    ply::write_ascii(surface, &path)?;
    Ok(path)
}

/// Extract the selected regions' boundaries and write them as one surface.
pub fn stage_region_surfaces(
    volume: &LabelVolume,
    labels: &[u16],
    workspace: &Workspace,
) -> TetraResult<PathBuf> {
    let combined = surface::extract_regions(volume, labels)?;
    info!(
        points = combined.point_count(),
        polygons = combined.polygon_count(),
        "Staging region surfaces"
    );
    stage_surface(&combined, workspace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn two_region_volume() -> LabelVolume {
        let mut volume = LabelVolume::zeros(VolumeGeometry::identity([10, 10, 10]))
            .unwrap()
            .with_regions(vec![
                Region::new(3, "bone").with_color([1.0, 1.0, 0.8]),
                Region::new(7, "muscle"),
                Region::new(9, "skin"),
            ]);
        volume.fill_box([0, 0, 0], [4, 4, 4], 3);
        volume.fill_box([5, 5, 5], [9, 9, 9], 7);
        volume.fill_box([0, 9, 0], [0, 9, 0], 9);
        volume
    }

    #[test]
    fn test_padding_voxels_floor() {
        assert_eq!(padding_voxels([10, 10, 10], 10), [1, 1, 1]);
        assert_eq!(padding_voxels([19, 20, 5], 10), [1, 2, 0]);
        assert_eq!(padding_voxels([100, 1, 7], 0), [0, 0, 0]);
    }

    #[test]
    fn test_merge_remaps_in_selection_order() {
        let prepared = prepare_labelmap(&two_region_volume(), &[7, 3], 0).unwrap();
        assert_eq!(prepared.label_map, vec![(7, 1), (3, 2)]);
        let v = &prepared.volume;
        assert_eq!(v.get(0, 0, 0), 2);
        assert_eq!(v.get(9, 9, 9), 1);
        // Unselected region becomes background
        assert_eq!(v.get(0, 9, 0), 0);
        assert_eq!(v.region(2).map(|r| r.name.as_str()), Some("bone"));
    }

    #[test]
    fn test_padding_and_normalization() {
        let prepared = prepare_labelmap(&two_region_volume(), &[3], 10).unwrap();
        assert_eq!(prepared.padded_extent, ([-1, -1, -1], [10, 10, 10]));
        let g = &prepared.volume.geometry;
        assert_eq!(g.extent_start, [0, 0, 0]);
        assert_eq!(g.dims, [12, 12, 12]);
        assert_relative_eq!(g.origin, Point3::new(-1.0, -1.0, -1.0));
        // Border is background, old (0,0,0) now at (1,1,1)
        assert_eq!(prepared.volume.get(0, 0, 0), 0);
        assert_eq!(prepared.volume.get(1, 1, 1), 1);
    }

    #[test]
    fn test_unknown_label_is_an_error() {
        let err = prepare_labelmap(&two_region_volume(), &[3, 42], 10).unwrap_err();
        assert!(matches!(err, TetraError::UnknownRegion { label: 42 }));
    }

    #[test]
    fn test_duplicates_merged_once() {
        let prepared = prepare_labelmap(&two_region_volume(), &[3, 3, 7], 0).unwrap();
        assert_eq!(prepared.label_map, vec![(3, 1), (7, 2)]);
    }

    #[test]
    fn test_stage_files_land_in_workspace() {
        let base = tempfile::tempdir().unwrap();
        let ws = Workspace::create(base.path()).unwrap();
        let prepared = prepare_labelmap(&two_region_volume(), &[3], 10).unwrap();
        let nrrd_path = stage_labelmap(&prepared, &ws).unwrap();
        assert_eq!(nrrd_path, ws.path().join("input_labelmap.nrrd"));
        assert!(nrrd_path.is_file());

        let ply_path = stage_region_surfaces(&two_region_volume(), &[3, 7], &ws).unwrap();
        assert_eq!(ply_path, ws.path().join("mesh.ply"));
        assert!(ply_path.is_file());
    }
}
