//! Core mesh data types.

use nalgebra::{Matrix4, Point3};
use tracing::warn;

/// VTK cell type identifiers that meshers emit.
///
/// Only the identifiers are interpreted; any other type id is preserved as
/// [`CellKind::Other`] so that round-tripping a grid never loses cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellKind {
    Vertex,
    Line,
    Triangle,
    Polygon,
    Quad,
    Tetra,
    Hexahedron,
    Wedge,
    Pyramid,
    Other(u8),
}

impl CellKind {
    /// Map a VTK cell type id to a kind.
    pub fn from_vtk_id(id: u8) -> Self {
        match id {
            1 => CellKind::Vertex,
            3 => CellKind::Line,
            5 => CellKind::Triangle,
            7 => CellKind::Polygon,
            9 => CellKind::Quad,
            10 => CellKind::Tetra,
            12 => CellKind::Hexahedron,
            13 => CellKind::Wedge,
            14 => CellKind::Pyramid,
            other => CellKind::Other(other),
        }
    }

    /// VTK cell type id.
    pub fn vtk_id(&self) -> u8 {
        match self {
            CellKind::Vertex => 1,
            CellKind::Line => 3,
            CellKind::Triangle => 5,
            CellKind::Polygon => 7,
            CellKind::Quad => 9,
            CellKind::Tetra => 10,
            CellKind::Hexahedron => 12,
            CellKind::Wedge => 13,
            CellKind::Pyramid => 14,
            CellKind::Other(id) => *id,
        }
    }

    /// Human-readable name, used in reports.
    pub fn name(&self) -> String {
        match self {
            CellKind::Vertex => "vertex".into(),
            CellKind::Line => "line".into(),
            CellKind::Triangle => "triangle".into(),
            CellKind::Polygon => "polygon".into(),
            CellKind::Quad => "quad".into(),
            CellKind::Tetra => "tetra".into(),
            CellKind::Hexahedron => "hexahedron".into(),
            CellKind::Wedge => "wedge".into(),
            CellKind::Pyramid => "pyramid".into(),
            CellKind::Other(id) => format!("vtk type {}", id),
        }
    }
}

/// A cell of an unstructured grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Cell type.
    pub kind: CellKind,
    /// Indices into the point array.
    pub points: Vec<u32>,
}

impl Cell {
    /// Create a tetrahedron.
    #[inline]
    pub fn tetra(indices: [u32; 4]) -> Self {
        Self {
            kind: CellKind::Tetra,
            points: indices.to_vec(),
        }
    }

    /// Create a triangle.
    #[inline]
    pub fn triangle(indices: [u32; 3]) -> Self {
        Self {
            kind: CellKind::Triangle,
            points: indices.to_vec(),
        }
    }
}

/// Where an attribute array lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeLocation {
    Point,
    Cell,
}

/// The legacy VTK attribute kind an array was declared as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeKind {
    /// `SCALARS name type components` with its `LOOKUP_TABLE` name.
    Scalars { lookup_table: Option<String> },
    /// `COLOR_SCALARS name components` (values in [0, 1]).
    ColorScalars,
    /// `LOOKUP_TABLE name size` (RGBA rows).
    LookupTable,
    /// `VECTORS name type`.
    Vectors,
    /// `NORMALS name type`.
    Normals,
    /// `TEXTURE_COORDINATES name dim type`.
    TextureCoordinates,
    /// `TENSORS name type` (3x3, row-major).
    Tensors,
    /// A named array of a `FIELD` block.
    Field,
}

impl AttributeKind {
    /// Whether the tuples are 3-vectors that rotate with the mesh.
    pub fn is_directional(&self) -> bool {
        matches!(self, AttributeKind::Vectors | AttributeKind::Normals)
    }
}

/// A named attribute array attached to points or cells.
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray {
    /// Array name.
    pub name: String,
    /// Declared kind.
    pub kind: AttributeKind,
    /// Declared VTK value type (`int`, `float`, `double`, ...).
    pub data_type: String,
    /// Components per tuple.
    pub components: usize,
    /// Flat tuple values.
    pub values: Vec<f64>,
}

impl DataArray {
    /// Number of tuples.
    #[inline]
    pub fn tuple_count(&self) -> usize {
        if self.components == 0 {
            0
        } else {
            self.values.len() / self.components
        }
    }

    /// The tuple at `index`.
    #[inline]
    pub fn tuple(&self, index: usize) -> &[f64] {
        let start = index * self.components;
        &self.values[start..start + self.components]
    }

    /// Keep only the tuples whose flag is set.
    pub(crate) fn retain_tuples(&mut self, keep: &[bool]) {
        let components = self.components;
        let mut kept = Vec::with_capacity(self.values.len());
        for (tuple, &k) in self.values.chunks(components.max(1)).zip(keep) {
            if k {
                kept.extend_from_slice(tuple);
            }
        }
        self.values = kept;
    }
}

/// A tetrahedral (or mixed) unstructured grid.
///
/// Points are in the caller's physical frame; `applied_transform` records the
/// matrix that was used to bring the mesher's coordinates there (identity for
/// surface-mesher output).
#[derive(Debug, Clone)]
pub struct TetrahedralMesh {
    /// Point positions.
    pub points: Vec<Point3<f64>>,
    /// Cells in file order.
    pub cells: Vec<Cell>,
    /// Arrays with one tuple per point.
    pub point_data: Vec<DataArray>,
    /// Arrays with one tuple per cell.
    pub cell_data: Vec<DataArray>,
    /// Dataset-level `FIELD` arrays.
    pub field_data: Vec<DataArray>,
    /// Transform already applied to `points`.
    pub applied_transform: Matrix4<f64>,
}

impl Default for TetrahedralMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl TetrahedralMesh {
    /// Name of the region label array written by the volumetric mesher.
    pub const LABEL_ARRAY: &'static str = "labels";

    /// Create a new empty mesh.
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            cells: Vec::new(),
            point_data: Vec::new(),
            cell_data: Vec::new(),
            field_data: Vec::new(),
            applied_transform: Matrix4::identity(),
        }
    }

    /// Number of points.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Number of cells.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of tetrahedral cells.
    pub fn tetra_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| c.kind == CellKind::Tetra)
            .count()
    }

    /// Cell count per kind, ordered by kind.
    pub fn cell_kind_counts(&self) -> Vec<(CellKind, usize)> {
        let mut counts: hashbrown::HashMap<CellKind, usize> = hashbrown::HashMap::new();
        for cell in &self.cells {
            *counts.entry(cell.kind).or_default() += 1;
        }
        let mut counts: Vec<_> = counts.into_iter().collect();
        counts.sort_unstable();
        counts
    }

    /// Check if mesh is empty (no points or cells).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() || self.cells.is_empty()
    }

    /// Compute the axis-aligned bounding box.
    /// Returns (min_corner, max_corner) or None if there are no points.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.points.first()?;
        let mut min = *first;
        let mut max = *first;

        for p in &self.points[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }

        Some((min, max))
    }

    /// Find a point attribute array by name.
    pub fn point_array(&self, name: &str) -> Option<&DataArray> {
        self.point_data.iter().find(|a| a.name == name)
    }

    /// Find a cell attribute array by name.
    pub fn cell_array(&self, name: &str) -> Option<&DataArray> {
        self.cell_data.iter().find(|a| a.name == name)
    }

    /// Per-cell region labels.
    ///
    /// Uses the `labels` cell array when present, otherwise the first
    /// single-component cell scalar array.
    pub fn cell_labels(&self) -> Option<Vec<i64>> {
        let array = self.cell_array(Self::LABEL_ARRAY).or_else(|| {
            self.cell_data.iter().find(|a| {
                matches!(a.kind, AttributeKind::Scalars { .. }) && a.components == 1
            })
        })?;
        if array.components != 1 {
            return None;
        }
        Some(array.values.iter().map(|v| v.round() as i64).collect())
    }

    /// Remove cells whose region label is background (`<= 0`), then drop
    /// points no remaining cell uses. Returns the number of removed cells.
    ///
    /// Meshes without a label array are left untouched.
    pub fn remove_background(&mut self) -> usize {
        let Some(labels) = self.cell_labels() else {
            return 0;
        };
        let keep: Vec<bool> = labels.iter().map(|&l| l > 0).collect();
        let removed = keep.iter().filter(|k| !**k).count();
        if removed == 0 {
            return 0;
        }
        self.retain_cells(&keep);
        self.remove_unused_points();
        removed
    }

    /// Keep the cells whose flag is set, compacting per-cell arrays.
    pub fn retain_cells(&mut self, keep: &[bool]) {
        let old_count = self.cells.len();
        let mut flags = keep.iter();
        self.cells.retain(|_| *flags.next().unwrap_or(&false));
        for array in &mut self.cell_data {
            // Lookup tables are not per-cell
            if array.tuple_count() == old_count && array.kind != AttributeKind::LookupTable {
                array.retain_tuples(keep);
            }
        }
    }

    /// Drop points no cell references, renumbering cells and compacting
    /// per-point arrays. Returns the number of removed points.
    ///
    /// A mesh with a dangling point reference is left untouched.
    pub fn remove_unused_points(&mut self) -> usize {
        if let Some((cell, point)) = self.first_invalid_reference() {
            warn!(cell, point, "Dangling point reference, not compacting points");
            return 0;
        }
        let old_count = self.points.len();
        let mut used = vec![false; old_count];
        for cell in &self.cells {
            for &i in &cell.points {
                used[i as usize] = true;
            }
        }

        let mut remap = vec![u32::MAX; old_count];
        let mut next = 0u32;
        for (i, &u) in used.iter().enumerate() {
            if u {
                remap[i] = next;
                next += 1;
            }
        }
        if next as usize == old_count {
            return 0;
        }

        let mut flags = used.iter();
        self.points.retain(|_| *flags.next().unwrap_or(&false));
        for cell in &mut self.cells {
            for i in &mut cell.points {
                *i = remap[*i as usize];
            }
        }
        for array in &mut self.point_data {
            if array.tuple_count() == old_count && array.kind != AttributeKind::LookupTable {
                array.retain_tuples(&used);
            }
        }
        old_count - next as usize
    }

    /// Iterate cells with their index, checking every point reference.
    pub fn first_invalid_reference(&self) -> Option<(usize, u32)> {
        let n = self.points.len();
        self.cells.iter().enumerate().find_map(|(ci, cell)| {
            cell.points
                .iter()
                .find(|&&pi| pi as usize >= n)
                .map(|&pi| (ci, pi))
        })
    }
}

/// A polygon surface (triangles or general polygons).
#[derive(Debug, Clone, Default)]
pub struct PolygonSurface {
    /// Point positions.
    pub points: Vec<Point3<f64>>,
    /// Polygons as indices into `points`.
    pub polygons: Vec<Vec<u32>>,
}

impl PolygonSurface {
    /// Create a new empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Number of polygons.
    #[inline]
    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    /// Check if surface is empty (no points or polygons).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() || self.polygons.is_empty()
    }

    /// Append another surface, offsetting its indices.
    pub fn append(&mut self, other: &PolygonSurface) {
        let offset = self.points.len() as u32;
        self.points.extend_from_slice(&other.points);
        self.polygons.extend(
            other
                .polygons
                .iter()
                .map(|poly| poly.iter().map(|&i| i + offset).collect()),
        );
    }

    /// Concatenate several surfaces into one.
    pub fn concatenate<'a>(surfaces: impl IntoIterator<Item = &'a PolygonSurface>) -> Self {
        let mut combined = PolygonSurface::new();
        for s in surfaces {
            combined.append(s);
        }
        combined
    }

    /// Compute the axis-aligned bounding box.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = self.points.first()?;
        let mut min = *first;
        let mut max = *first;
        for p in &self.points[1..] {
            min = min.inf(p);
            max = max.sup(p);
        }
        Some((min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_kind_round_trip_ids() {
        for id in [1u8, 3, 5, 7, 9, 10, 12, 13, 14, 42] {
            assert_eq!(CellKind::from_vtk_id(id).vtk_id(), id);
        }
        assert_eq!(CellKind::from_vtk_id(10), CellKind::Tetra);
        assert_eq!(CellKind::from_vtk_id(42), CellKind::Other(42));
    }

    #[test]
    fn test_surface_append_offsets_indices() {
        let mut a = PolygonSurface::new();
        a.points.push(Point3::new(0.0, 0.0, 0.0));
        a.points.push(Point3::new(1.0, 0.0, 0.0));
        a.points.push(Point3::new(0.0, 1.0, 0.0));
        a.polygons.push(vec![0, 1, 2]);

        let combined = PolygonSurface::concatenate([&a, &a]);
        assert_eq!(combined.point_count(), 6);
        assert_eq!(combined.polygons[1], vec![3, 4, 5]);
    }

    #[test]
    fn test_cell_labels_prefers_named_array() {
        let mut mesh = TetrahedralMesh::new();
        mesh.cell_data.push(DataArray {
            name: "quality".into(),
            kind: AttributeKind::Scalars { lookup_table: None },
            data_type: "float".into(),
            components: 1,
            values: vec![0.5, 0.7],
        });
        mesh.cell_data.push(DataArray {
            name: TetrahedralMesh::LABEL_ARRAY.into(),
            kind: AttributeKind::Scalars { lookup_table: None },
            data_type: "int".into(),
            components: 1,
            values: vec![0.0, 2.0],
        });
        assert_eq!(mesh.cell_labels(), Some(vec![0, 2]));
    }

    #[test]
    fn test_cell_kind_counts() {
        let mut mesh = TetrahedralMesh::new();
        mesh.cells = vec![
            Cell::tetra([0, 1, 2, 3]),
            Cell::triangle([0, 1, 2]),
            Cell::tetra([1, 2, 3, 4]),
        ];
        assert_eq!(
            mesh.cell_kind_counts(),
            vec![(CellKind::Triangle, 1), (CellKind::Tetra, 2)]
        );
    }

    #[test]
    fn test_invalid_reference_detection() {
        let mut mesh = TetrahedralMesh::new();
        mesh.points.push(Point3::origin());
        mesh.cells.push(Cell::tetra([0, 0, 0, 3]));
        assert_eq!(mesh.first_invalid_reference(), Some((0, 3)));
    }

    #[test]
    fn test_remove_background_compacts_everything() {
        let mut mesh = TetrahedralMesh::new();
        for i in 0..6 {
            mesh.points.push(Point3::new(i as f64, 0.0, 0.0));
        }
        mesh.cells.push(Cell::tetra([0, 1, 2, 3]));
        mesh.cells.push(Cell::tetra([2, 3, 4, 5]));
        mesh.cell_data.push(DataArray {
            name: TetrahedralMesh::LABEL_ARRAY.into(),
            kind: AttributeKind::Scalars { lookup_table: None },
            data_type: "int".into(),
            components: 1,
            values: vec![0.0, 1.0],
        });
        mesh.cell_data.push(DataArray {
            name: "lut".into(),
            kind: AttributeKind::LookupTable,
            data_type: "float".into(),
            components: 4,
            values: vec![0.0; 8],
        });
        mesh.point_data.push(DataArray {
            name: "id".into(),
            kind: AttributeKind::Scalars { lookup_table: None },
            data_type: "int".into(),
            components: 1,
            values: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
        });

        assert_eq!(mesh.remove_background(), 1);
        assert_eq!(mesh.cell_count(), 1);
        assert_eq!(mesh.cells[0].points, vec![0, 1, 2, 3]);
        assert_eq!(mesh.point_count(), 4);
        assert_eq!(mesh.points[0].x, 2.0);
        assert_eq!(mesh.cell_labels(), Some(vec![1]));
        assert_eq!(mesh.point_array("id").unwrap().values, vec![2.0, 3.0, 4.0, 5.0]);
        // Lookup table untouched
        assert_eq!(mesh.cell_array("lut").unwrap().tuple_count(), 2);
        assert!(mesh.first_invalid_reference().is_none());
    }

    #[test]
    fn test_remove_background_without_labels_is_noop() {
        let mut mesh = TetrahedralMesh::new();
        mesh.points.push(Point3::origin());
        mesh.cells.push(Cell::tetra([0, 0, 0, 0]));
        assert_eq!(mesh.remove_background(), 0);
        assert_eq!(mesh.cell_count(), 1);
    }

    #[test]
    fn test_dangling_reference_leaves_points_alone() {
        let mut mesh = TetrahedralMesh::new();
        for i in 0..5 {
            mesh.points.push(Point3::new(i as f64, 0.0, 0.0));
        }
        mesh.cells.push(Cell::tetra([0, 1, 2, 9]));
        assert_eq!(mesh.remove_unused_points(), 0);
        assert_eq!(mesh.point_count(), 5);
        assert_eq!(mesh.cells[0].points, vec![0, 1, 2, 9]);
    }

    #[test]
    fn test_retain_tuples() {
        let mut array = DataArray {
            name: "v".into(),
            kind: AttributeKind::Vectors,
            data_type: "float".into(),
            components: 3,
            values: vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0],
        };
        array.retain_tuples(&[true, false, true]);
        assert_eq!(array.tuple_count(), 2);
        assert_eq!(array.tuple(1), &[3.0, 3.0, 3.0]);
    }
}
