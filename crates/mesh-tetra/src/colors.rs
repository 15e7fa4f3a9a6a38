//! Region color table for volumetric results.

use serde::Serialize;

use crate::types::{AttributeKind, DataArray, TetrahedralMesh};
use crate::volume::Region;

/// Label value of the background (padding and unselected voxels).
pub const BACKGROUND_LABEL: u16 = 0;

/// Opaque grey, so background cells stay visible when they are kept.
pub const BACKGROUND_COLOR: [f64; 4] = [0.6, 0.6, 0.6, 1.0];

/// Colors handed out to regions without one, in order.
const PALETTE: [[f64; 3]; 12] = [
    [0.502, 0.682, 0.502],
    [0.945, 0.839, 0.569],
    [0.694, 0.478, 0.396],
    [0.435, 0.722, 0.824],
    [0.847, 0.396, 0.310],
    [0.867, 0.510, 0.396],
    [0.565, 0.933, 0.565],
    [0.753, 0.408, 0.345],
    [0.863, 0.961, 0.078],
    [0.306, 0.247, 0.000],
    [1.000, 0.980, 0.863],
    [0.902, 0.863, 0.275],
];

/// One color table row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelColor {
    pub label: u16,
    pub name: String,
    pub rgba: [f64; 4],
}

/// Label to name and color mapping, background included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelColorTable {
    entries: Vec<LabelColor>,
}

impl LabelColorTable {
    /// Name of the lookup table array attached to meshes.
    pub const LOOKUP_TABLE_NAME: &'static str = "region_colors";

    /// Build a table from regions (labels as written for the mesher).
    pub fn from_regions(regions: &[Region]) -> Self {
        let mut entries = vec![LabelColor {
            label: BACKGROUND_LABEL,
            name: "Background".to_string(),
            rgba: BACKGROUND_COLOR,
        }];
        let mut next_palette = 0usize;
        for region in regions.iter().filter(|r| r.label != BACKGROUND_LABEL) {
            let rgb = region.color.unwrap_or_else(|| {
                let c = PALETTE[next_palette % PALETTE.len()];
                next_palette += 1;
                c
            });
            entries.push(LabelColor {
                label: region.label,
                name: region.name.clone(),
                rgba: [rgb[0], rgb[1], rgb[2], 1.0],
            });
        }
        entries.sort_by_key(|e| e.label);
        Self { entries }
    }

    pub fn entries(&self) -> &[LabelColor] {
        &self.entries
    }

    pub fn get(&self, label: u16) -> Option<&LabelColor> {
        self.entries.iter().find(|e| e.label == label)
    }

    /// Lookup table indexed by label, unused labels transparent black.
    pub fn to_lookup_array(&self) -> DataArray {
        let size = self.entries.iter().map(|e| e.label as usize).max().unwrap_or(0) + 1;
        let mut values = vec![0.0; size * 4];
        for e in &self.entries {
            let i = e.label as usize * 4;
            values[i..i + 4].copy_from_slice(&e.rgba);
        }
        DataArray {
            name: Self::LOOKUP_TABLE_NAME.to_string(),
            kind: AttributeKind::LookupTable,
            data_type: "float".to_string(),
            components: 4,
            values,
        }
    }

    /// Add the lookup table to the mesh's cell data and point the `labels`
    /// scalars at it.
    pub fn attach_to(&self, mesh: &mut TetrahedralMesh) {
        mesh.cell_data
            .retain(|a| !(a.kind == AttributeKind::LookupTable && a.name == Self::LOOKUP_TABLE_NAME));
        for array in mesh.cell_data.iter_mut() {
            if array.name == TetrahedralMesh::LABEL_ARRAY {
                if let AttributeKind::Scalars { lookup_table } = &mut array.kind {
                    *lookup_table = Some(Self::LOOKUP_TABLE_NAME.to_string());
                }
            }
        }
        mesh.cell_data.push(self.to_lookup_array());
    }
}
