//! NRRD labelmap reading and writing.
//!
//! Only what labelmaps need: three spatial axes, integer voxel types,
//! attached data in `raw` or `ascii` encoding. Written files are always
//! `unsigned short`, little endian, raw, in right-anterior-superior space.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::{Matrix3, Point3, Vector3};
use tracing::info;

use crate::error::{TetraError, TetraResult};
use crate::volume::{LabelVolume, VolumeGeometry};

/// Write a labelmap as NRRD.
///
/// The extent start is folded into `space origin`, so the file describes
/// the same physical placement whatever the volume's start index.
pub fn write_labelmap(volume: &LabelVolume, path: &Path) -> TetraResult<()> {
    let g = &volume.geometry;
    let start = g.extent_start;
    let origin =
        g.index_to_physical(Vector3::new(start[0] as f64, start[1] as f64, start[2] as f64));

    let file = fs::File::create(path).map_err(|e| TetraError::io_write(path, e))?;
    let mut w = BufWriter::new(file);

    let mut header = String::new();
    header.push_str("NRRD0004\n");
    header.push_str("# Complete NRRD file format specification at:\n");
    header.push_str("# http://teem.sourceforge.net/nrrd/format.html\n");
    header.push_str("type: unsigned short\n");
    header.push_str("dimension: 3\n");
    header.push_str("space: right-anterior-superior\n");
    header.push_str(&format!("sizes: {} {} {}\n", g.dims[0], g.dims[1], g.dims[2]));
    let axes: Vec<String> = (0..3)
        .map(|a| {
            let v = g.direction.column(a) * g.spacing[a];
            format!("({},{},{})", v.x, v.y, v.z)
        })
        .collect();
    header.push_str(&format!("space directions: {}\n", axes.join(" ")));
    header.push_str("kinds: domain domain domain\n");
    header.push_str("endian: little\n");
    header.push_str("encoding: raw\n");
    header.push_str(&format!(
        "space origin: ({},{},{})\n\n",
        origin.x, origin.y, origin.z
    ));

    let write = |w: &mut BufWriter<fs::File>| -> std::io::Result<()> {
        w.write_all(header.as_bytes())?;
        let mut bytes = Vec::with_capacity(volume.data.len() * 2);
        for v in &volume.data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        w.write_all(&bytes)?;
        w.flush()
    };
    write(&mut w).map_err(|e| TetraError::io_write(path, e))?;

    info!(
        target: "mesh_tetra::io",
        path = %path.display(),
        dims = ?g.dims,
        "Wrote labelmap NRRD"
    );
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VoxelType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
}

impl VoxelType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "signed char" | "int8" | "int8_t" | "char" => VoxelType::I8,
            "uchar" | "unsigned char" | "uint8" | "uint8_t" => VoxelType::U8,
            "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => {
                VoxelType::I16
            }
            "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => {
                VoxelType::U16
            }
            "int" | "signed int" | "int32" | "int32_t" => VoxelType::I32,
            "uint" | "unsigned int" | "uint32" | "uint32_t" => VoxelType::U32,
            _ => return None,
        })
    }

    fn size(&self) -> usize {
        match self {
            VoxelType::I8 | VoxelType::U8 => 1,
            VoxelType::I16 | VoxelType::U16 => 2,
            VoxelType::I32 | VoxelType::U32 => 4,
        }
    }

    fn decode(&self, bytes: &[u8], little: bool) -> i64 {
        macro_rules! read {
            ($t:ty, $n:expr) => {{
                let mut b = [0u8; $n];
                b.copy_from_slice(bytes);
                if little {
                    <$t>::from_le_bytes(b) as i64
                } else {
                    <$t>::from_be_bytes(b) as i64
                }
            }};
        }
        match self {
            VoxelType::I8 => bytes[0] as i8 as i64,
            VoxelType::U8 => bytes[0] as i64,
            VoxelType::I16 => read!(i16, 2),
            VoxelType::U16 => read!(u16, 2),
            VoxelType::I32 => read!(i32, 4),
            VoxelType::U32 => read!(u32, 4),
        }
    }
}

fn parse_vector(text: &str) -> Option<Vector3<f64>> {
    let inner = text.trim().strip_prefix('(')?.strip_suffix(')')?;
    let parts: Vec<f64> = inner
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    (parts.len() == 3).then(|| Vector3::new(parts[0], parts[1], parts[2]))
}

fn split_vectors(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    for (i, c) in text.char_indices() {
        match c {
            '(' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some(s) = start.take() {
                        out.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Read a three-dimensional integer NRRD as a labelmap.
///
/// Right-anterior-superior and left-posterior-superior spaces are accepted;
/// the latter is converted. Region table is left empty.
pub fn read_labelmap(path: &Path) -> TetraResult<LabelVolume> {
    let bytes = fs::read(path).map_err(|e| TetraError::io_read(path, e))?;

    let (header_len, body_start) = find_header_end(&bytes)
        .ok_or_else(|| TetraError::parse_error(path, "missing blank line after NRRD header"))?;
    let header = String::from_utf8_lossy(&bytes[..header_len]);
    let body = &bytes[body_start..];

    let mut lines = header.lines().enumerate();
    match lines.next() {
        Some((_, magic)) if magic.starts_with("NRRD000") => {}
        _ => return Err(TetraError::parse_error_at(path, 1, "not a NRRD file")),
    }

    let mut voxel_type = None;
    let mut sizes: Option<[usize; 3]> = None;
    let mut directions: Option<Matrix3<f64>> = None;
    let mut spacings: Option<Vector3<f64>> = None;
    let mut origin = Point3::origin();
    let mut encoding = String::from("raw");
    let mut little = true;
    let mut lps = false;

    for (n, line) in lines {
        let line_no = n + 1;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(TetraError::parse_error_at(path, line_no, "expected `field: value`"));
        };
        // Key-value pairs use `:=`
        if value.starts_with('=') {
            continue;
        }
        let value = value.trim();
        match key.trim() {
            "type" => {
                voxel_type = Some(VoxelType::parse(value).ok_or_else(|| {
                    TetraError::parse_error_at(
                        path,
                        line_no,
                        format!("unsupported voxel type `{}`", value),
                    )
                })?)
            }
            "dimension" => {
                if value != "3" {
                    return Err(TetraError::parse_error_at(
                        path,
                        line_no,
                        format!("expected 3 dimensions, got {}", value),
                    ));
                }
            }
            "sizes" => {
                let s: Vec<usize> = value
                    .split_whitespace()
                    .map(|v| v.parse())
                    .collect::<Result<_, _>>()
                    .map_err(|_| TetraError::parse_error_at(path, line_no, "invalid sizes"))?;
                if s.len() != 3 {
                    return Err(TetraError::parse_error_at(path, line_no, "expected 3 sizes"));
                }
                sizes = Some([s[0], s[1], s[2]]);
            }
            "space directions" => {
                let vectors: Option<Vec<Vector3<f64>>> =
                    split_vectors(value).into_iter().map(parse_vector).collect();
                match vectors {
                    Some(v) if v.len() == 3 => {
                        directions = Some(Matrix3::from_columns(&[v[0], v[1], v[2]]))
                    }
                    _ => {
                        return Err(TetraError::parse_error_at(
                            path,
                            line_no,
                            "invalid space directions",
                        ));
                    }
                }
            }
            "spacings" => {
                let s: Vec<f64> = value
                    .split_whitespace()
                    .map(|v| v.parse())
                    .collect::<Result<_, _>>()
                    .map_err(|_| TetraError::parse_error_at(path, line_no, "invalid spacings"))?;
                if s.len() == 3 {
                    spacings = Some(Vector3::new(s[0], s[1], s[2]));
                }
            }
            "space origin" => {
                let v = parse_vector(value).ok_or_else(|| {
                    TetraError::parse_error_at(path, line_no, "invalid space origin")
                })?;
                origin = Point3::from(v);
            }
            "space" => match value {
                "right-anterior-superior" | "RAS" => lps = false,
                "left-posterior-superior" | "LPS" => lps = true,
                other => {
                    return Err(TetraError::parse_error_at(
                        path,
                        line_no,
                        format!("unsupported space `{}`", other),
                    ));
                }
            },
            "encoding" => encoding = value.to_string(),
            "endian" => little = value != "big",
            "data file" | "datafile" => {
                return Err(TetraError::parse_error_at(
                    path,
                    line_no,
                    "detached data files are not supported",
                ));
            }
            _ => {}
        }
    }

    let voxel_type =
        voxel_type.ok_or_else(|| TetraError::parse_error(path, "missing `type` field"))?;
    let dims = sizes.ok_or_else(|| TetraError::parse_error(path, "missing `sizes` field"))?;

    let (mut direction, spacing) = match (directions, spacings) {
        (Some(d), _) => {
            let spacing = Vector3::new(
                d.column(0).norm(),
                d.column(1).norm(),
                d.column(2).norm(),
            );
            if spacing.iter().any(|s| *s <= 0.0) {
                return Err(TetraError::invalid_volume("zero-length space direction"));
            }
            let unit = Matrix3::from_columns(&[
                d.column(0) / spacing.x,
                d.column(1) / spacing.y,
                d.column(2) / spacing.z,
            ]);
            (unit, spacing)
        }
        (None, Some(s)) => (Matrix3::identity(), s),
        (None, None) => (Matrix3::identity(), Vector3::new(1.0, 1.0, 1.0)),
    };
    if lps {
        let flip = Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0));
        direction = flip * direction;
        origin = Point3::new(-origin.x, -origin.y, origin.z);
    }

    let count = dims[0]
        .checked_mul(dims[1])
        .and_then(|n| n.checked_mul(dims[2]))
        .ok_or_else(|| {
            TetraError::parse_error(path, format!("sizes {:?} overflow the voxel count", dims))
        })?;
    let values: Vec<i64> = match encoding.as_str() {
        "raw" => {
            let size = voxel_type.size();
            let byte_count = count.checked_mul(size).ok_or_else(|| {
                TetraError::parse_error(path, format!("sizes {:?} overflow the voxel count", dims))
            })?;
            if body.len() < byte_count {
                return Err(TetraError::parse_error(
                    path,
                    format!(
                        "expected {} bytes of voxel data, found {}",
                        byte_count,
                        body.len()
                    ),
                ));
            }
            body[..byte_count]
                .chunks_exact(size)
                .map(|c| voxel_type.decode(c, little))
                .collect()
        }
        "ascii" | "text" | "txt" => {
            let text = String::from_utf8_lossy(body);
            let values: Vec<i64> = text
                .split_whitespace()
                .map(|t| t.parse::<i64>())
                .collect::<Result<_, _>>()
                .map_err(|e| TetraError::parse_error(path, format!("invalid voxel value: {}", e)))?;
            if values.len() < count {
                return Err(TetraError::parse_error(
                    path,
                    format!("expected {} voxel values, found {}", count, values.len()),
                ));
            }
            values
        }
        other => {
            return Err(TetraError::UnsupportedEncoding {
                path: path.to_path_buf(),
                encoding: other.to_string(),
            });
        }
    };

    let data: Vec<u16> = values
        .into_iter()
        .take(count)
        .map(|v| {
            u16::try_from(v).map_err(|_| {
                TetraError::invalid_volume(format!("label value {} is outside 0..=65535", v))
            })
        })
        .collect::<TetraResult<_>>()?;

    let geometry = VolumeGeometry {
        extent_start: [0; 3],
        dims,
        spacing,
        origin,
        direction,
    };
    LabelVolume::new(geometry, data)
}

fn find_header_end(bytes: &[u8]) -> Option<(usize, usize)> {
    let lf = bytes.windows(2).position(|w| w == b"\n\n");
    let crlf = bytes.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) if b < a => Some((b, b + 4)),
        (Some(a), _) => Some((a, a + 2)),
        (None, Some(b)) => Some((b, b + 4)),
        (None, None) => None,
    }
}
