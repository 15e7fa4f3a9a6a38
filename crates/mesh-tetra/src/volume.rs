//! Labelmap volumes: a voxel grid of region labels with its geometry.

use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

use crate::error::{TetraError, TetraResult};

/// Placement of a voxel grid in physical space.
///
/// Voxel `(i, j, k)` (absolute index, i.e. including `extent_start`) has its
/// center at `origin + direction * diag(spacing) * (i, j, k)`.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeGeometry {
    /// Index of the first voxel along each axis.
    pub extent_start: [i64; 3],
    /// Number of voxels along each axis.
    pub dims: [usize; 3],
    /// Voxel size along each axis.
    pub spacing: Vector3<f64>,
    /// Physical position of index `(0, 0, 0)`.
    pub origin: Point3<f64>,
    /// Unit axis directions as columns.
    pub direction: Matrix3<f64>,
}

impl VolumeGeometry {
    /// Axis-aligned geometry with unit spacing at the origin.
    pub fn identity(dims: [usize; 3]) -> Self {
        Self {
            extent_start: [0; 3],
            dims,
            spacing: Vector3::new(1.0, 1.0, 1.0),
            origin: Point3::origin(),
            direction: Matrix3::identity(),
        }
    }

    /// Set the extent start index.
    pub fn with_extent_start(mut self, start: [i64; 3]) -> Self {
        self.extent_start = start;
        self
    }

    /// Set the voxel spacing.
    pub fn with_spacing(mut self, spacing: Vector3<f64>) -> Self {
        self.spacing = spacing;
        self
    }

    /// Set the origin.
    pub fn with_origin(mut self, origin: Point3<f64>) -> Self {
        self.origin = origin;
        self
    }

    /// Set the axis directions.
    pub fn with_direction(mut self, direction: Matrix3<f64>) -> Self {
        self.direction = direction;
        self
    }

    /// Total voxel count. Dimensions whose product overflows are an
    /// [`TetraError::InvalidVolume`].
    pub fn voxel_count(&self) -> TetraResult<usize> {
        self.dims[0]
            .checked_mul(self.dims[1])
            .and_then(|n| n.checked_mul(self.dims[2]))
            .ok_or_else(|| {
                TetraError::invalid_volume(format!("dimensions {:?} are too large", self.dims))
            })
    }

    /// Last valid index along each axis (inclusive).
    pub fn extent_end(&self) -> [i64; 3] {
        [
            self.extent_start[0] + self.dims[0] as i64 - 1,
            self.extent_start[1] + self.dims[1] as i64 - 1,
            self.extent_start[2] + self.dims[2] as i64 - 1,
        ]
    }

    /// Index-to-physical affine transform.
    pub fn ijk_to_physical(&self) -> Matrix4<f64> {
        let linear = self.direction * Matrix3::from_diagonal(&self.spacing);
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&linear);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.origin.coords);
        m
    }

    /// Physical position of a (possibly fractional) index.
    pub fn index_to_physical(&self, ijk: Vector3<f64>) -> Point3<f64> {
        self.origin + self.direction * self.spacing.component_mul(&ijk)
    }

    /// Physical bounding box of the voxel corners between two inclusive
    /// index corners.
    pub fn physical_bounds(&self, lo: [i64; 3], hi: [i64; 3]) -> (Point3<f64>, Point3<f64>) {
        let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for corner in 0..8 {
            let pick = |axis: usize| {
                if corner & (1 << axis) == 0 {
                    lo[axis] as f64 - 0.5
                } else {
                    hi[axis] as f64 + 0.5
                }
            };
            let p = self.index_to_physical(Vector3::new(pick(0), pick(1), pick(2)));
            min = min.inf(&p);
            max = max.sup(&p);
        }
        (min, max)
    }

    /// Check for degenerate sizes or placement.
    pub fn validate(&self) -> TetraResult<()> {
        if self.dims.contains(&0) {
            return Err(TetraError::invalid_volume(format!(
                "volume has an empty axis: {:?}",
                self.dims
            )));
        }
        self.voxel_count()?;
        if self.spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(TetraError::invalid_volume(format!(
                "spacing must be positive, got ({}, {}, {})",
                self.spacing.x, self.spacing.y, self.spacing.z
            )));
        }
        if self.direction.determinant().abs() < 1e-12 {
            return Err(TetraError::invalid_volume("direction matrix is singular"));
        }
        Ok(())
    }
}

/// A labeled region (segment) of a labelmap.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Voxel value of the region. Never 0 (background).
    pub label: u16,
    /// Display name.
    pub name: String,
    /// Display color (RGB in [0, 1]).
    pub color: Option<[f64; 3]>,
}

impl Region {
    /// Create a region without a color.
    pub fn new(label: u16, name: impl Into<String>) -> Self {
        Self {
            label,
            name: name.into(),
            color: None,
        }
    }

    /// Set the display color.
    pub fn with_color(mut self, color: [f64; 3]) -> Self {
        self.color = Some(color);
        self
    }
}

/// A voxel grid of `u16` region labels (0 = background).
///
/// Voxels are stored x-fastest: local index `(x, y, z)` is at
/// `x + dims[0] * (y + dims[1] * z)`.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    pub geometry: VolumeGeometry,
    pub data: Vec<u16>,
    pub regions: Vec<Region>,
}

impl LabelVolume {
    /// Create a volume, checking that the data fills the grid.
    pub fn new(geometry: VolumeGeometry, data: Vec<u16>) -> TetraResult<Self> {
        geometry.validate()?;
        let expected = geometry.voxel_count()?;
        if data.len() != expected {
            return Err(TetraError::invalid_volume(format!(
                "expected {} voxels for dimensions {:?}, got {}",
                expected,
                geometry.dims,
                data.len()
            )));
        }
        Ok(Self {
            geometry,
            data,
            regions: Vec::new(),
        })
    }

    /// Create a background-only volume.
    pub fn zeros(geometry: VolumeGeometry) -> TetraResult<Self> {
        geometry.validate()?;
        let n = geometry.voxel_count()?;
        Self::new(geometry, vec![0; n])
    }

    /// Attach the region table.
    pub fn with_regions(mut self, regions: Vec<Region>) -> Self {
        self.regions = regions;
        self
    }

    /// Region table entry for a label.
    pub fn region(&self, label: u16) -> Option<&Region> {
        self.regions.iter().find(|r| r.label == label)
    }

    /// Labels actually present in the voxels, sorted, background excluded.
    pub fn present_labels(&self) -> Vec<u16> {
        let mut seen = hashbrown::HashSet::new();
        for &v in &self.data {
            if v != 0 {
                seen.insert(v);
            }
        }
        let mut labels: Vec<u16> = seen.into_iter().collect();
        labels.sort_unstable();
        labels
    }

    /// Whether `label` is known, either from the region table or the voxels.
    pub fn has_label(&self, label: u16) -> bool {
        self.region(label).is_some() || self.data.contains(&label)
    }

    #[inline]
    pub(crate) fn linear_index(&self, x: usize, y: usize, z: usize) -> usize {
        let [nx, ny, _] = self.geometry.dims;
        x + nx * (y + ny * z)
    }

    /// Label at a local (zero-based) voxel index.
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> u16 {
        self.data[self.linear_index(x, y, z)]
    }

    /// Set the label at a local voxel index.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, z: usize, label: u16) {
        let i = self.linear_index(x, y, z);
        self.data[i] = label;
    }

    /// Fill an inclusive box of absolute indices with a label.
    ///
    /// Indices outside the extent are clipped.
    pub fn fill_box(&mut self, lo: [i64; 3], hi: [i64; 3], label: u16) {
        let start = self.geometry.extent_start;
        let end = self.geometry.extent_end();
        let clip = |axis: usize| {
            let a = lo[axis].max(start[axis]);
            let b = hi[axis].min(end[axis]);
            ((a - start[axis]) as usize, (b - start[axis]) as usize, a <= b)
        };
        let (x0, x1, okx) = clip(0);
        let (y0, y1, oky) = clip(1);
        let (z0, z1, okz) = clip(2);
        if !(okx && oky && okz) {
            return;
        }
        for z in z0..=z1 {
            for y in y0..=y1 {
                for x in x0..=x1 {
                    self.set(x, y, z, label);
                }
            }
        }
    }

    /// Inclusive absolute index bounds of the voxels carrying any of the
    /// given labels.
    pub fn index_bounds(&self, labels: &[u16]) -> Option<([i64; 3], [i64; 3])> {
        let [nx, ny, nz] = self.geometry.dims;
        let start = self.geometry.extent_start;
        let mut lo = [i64::MAX; 3];
        let mut hi = [i64::MIN; 3];
        let mut any = false;
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    if labels.contains(&self.get(x, y, z)) {
                        any = true;
                        let idx = [
                            start[0] + x as i64,
                            start[1] + y as i64,
                            start[2] + z as i64,
                        ];
                        for a in 0..3 {
                            lo[a] = lo[a].min(idx[a]);
                            hi[a] = hi[a].max(idx[a]);
                        }
                    }
                }
            }
        }
        any.then_some((lo, hi))
    }

    /// Physical bounds (voxel corners) of the given labels.
    pub fn physical_bounds_of(&self, labels: &[u16]) -> Option<(Point3<f64>, Point3<f64>)> {
        let (lo, hi) = self.index_bounds(labels)?;
        Some(self.geometry.physical_bounds(lo, hi))
    }
}
