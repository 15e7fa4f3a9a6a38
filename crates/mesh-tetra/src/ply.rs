//! PLY polygon surface I/O.
//!
//! The surface mesher consumes ASCII PLY: one `vertex` element with float
//! `x`/`y`/`z` and one `face` element with a `vertex_indices` list.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
    ScalarType,
};
use tracing::{debug, info};

use crate::error::{TetraError, TetraResult};
use crate::types::PolygonSurface;

/// Save a surface as ASCII PLY.
pub fn write_ascii(surface: &PolygonSurface, path: &Path) -> TetraResult<()> {
    use ply_rs::writer::Writer;

    if surface.is_empty() {
        return Err(TetraError::empty_surface(format!(
            "{} points, {} polygons",
            surface.point_count(),
            surface.polygon_count()
        )));
    }

    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;

    let mut vertex_def = ElementDef::new("vertex".to_string());
    for axis in ["x", "y", "z"] {
        vertex_def.properties.add(PropertyDef::new(
            axis.to_string(),
            PropertyType::Scalar(ScalarType::Float),
        ));
    }
    vertex_def.count = surface.points.len();
    ply.header.elements.add(vertex_def);

    let mut face_def = ElementDef::new("face".to_string());
    face_def.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::Int),
    ));
    face_def.count = surface.polygons.len();
    ply.header.elements.add(face_def);

    let vertices: Vec<DefaultElement> = surface
        .points
        .iter()
        .map(|p| {
            let mut element = DefaultElement::new();
            element.insert("x".to_string(), Property::Float(p.x as f32));
            element.insert("y".to_string(), Property::Float(p.y as f32));
            element.insert("z".to_string(), Property::Float(p.z as f32));
            element
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertices);

    let faces: Vec<DefaultElement> = surface
        .polygons
        .iter()
        .map(|poly| {
            let mut element = DefaultElement::new();
            element.insert(
                "vertex_indices".to_string(),
                Property::ListInt(poly.iter().map(|&i| i as i32).collect()),
            );
            element
        })
        .collect();
    ply.payload.insert("face".to_string(), faces);

    // Header counts must match the payload
    ply.make_consistent().map_err(|e| {
        TetraError::io_write(
            path,
            std::io::Error::other(format!("PLY consistency error: {:?}", e)),
        )
    })?;

    let file = File::create(path).map_err(|e| TetraError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);
    Writer::new()
        .write_ply(&mut writer, &mut ply)
        .map_err(|e| TetraError::io_write(path, e))?;
    writer.flush().map_err(|e| TetraError::io_write(path, e))?;

    info!(
        target: "mesh_tetra::io",
        points = surface.point_count(),
        polygons = surface.polygon_count(),
        path = %path.display(),
        "Saved surface (PLY ASCII)"
    );
    Ok(())
}

/// Load a polygon surface from a PLY file (ASCII or binary).
///
/// Polygons are kept as read; faces with fewer than three indices are
/// skipped.
pub fn read(path: &Path) -> TetraResult<PolygonSurface> {
    use ply_rs::parser::Parser;

    let file = File::open(path).map_err(|e| TetraError::io_read(path, e))?;
    let mut reader = BufReader::new(file);

    let parser = Parser::<DefaultElement>::new();
    let ply = parser
        .read_ply(&mut reader)
        .map_err(|e| TetraError::parse_error(path, format!("PLY parse error: {}", e)))?;

    let mut surface = PolygonSurface::new();

    if let Some(vertices) = ply.payload.get("vertex") {
        for vertex in vertices {
            let x = property_f64(vertex.get("x"), "x", path)?;
            let y = property_f64(vertex.get("y"), "y", path)?;
            let z = property_f64(vertex.get("z"), "z", path)?;
            surface.points.push(Point3::new(x, y, z));
        }
    }

    if let Some(faces) = ply.payload.get("face") {
        for face in faces {
            let indices = face
                .get("vertex_indices")
                .or_else(|| face.get("vertex_index"));
            let polygon: Vec<u32> = match indices {
                Some(Property::ListInt(v)) => v.iter().map(|&i| i as u32).collect(),
                Some(Property::ListUInt(v)) => v.clone(),
                Some(Property::ListShort(v)) => v.iter().map(|&i| i as u32).collect(),
                Some(Property::ListUShort(v)) => v.iter().map(|&i| i as u32).collect(),
                Some(Property::ListUChar(v)) => v.iter().map(|&i| i as u32).collect(),
                _ => continue,
            };
            if polygon.len() >= 3 {
                surface.polygons.push(polygon);
            }
        }
    }

    let n = surface.points.len() as u32;
    if let Some((ci, &pi)) = surface
        .polygons
        .iter()
        .enumerate()
        .find_map(|(ci, poly)| poly.iter().find(|&&i| i >= n).map(|pi| (ci, pi)))
    {
        return Err(TetraError::invalid_cell_index(ci, pi, n as usize));
    }

    debug!(
        target: "mesh_tetra::io",
        points = surface.point_count(),
        polygons = surface.polygon_count(),
        "PLY loaded"
    );
    Ok(surface)
}

fn property_f64(prop: Option<&Property>, name: &str, path: &Path) -> TetraResult<f64> {
    match prop {
        Some(Property::Float(v)) => Ok(*v as f64),
        Some(Property::Double(v)) => Ok(*v),
        Some(Property::Int(v)) => Ok(*v as f64),
        Some(Property::UInt(v)) => Ok(*v as f64),
        Some(Property::Short(v)) => Ok(*v as f64),
        Some(Property::UShort(v)) => Ok(*v as f64),
        Some(Property::Char(v)) => Ok(*v as f64),
        Some(Property::UChar(v)) => Ok(*v as f64),
        _ => Err(TetraError::parse_error(
            path,
            format!("missing or invalid PLY property: {}", name),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_and_triangle() -> PolygonSurface {
        let mut s = PolygonSurface::new();
        s.points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.5, 0.5, 1.0),
        ];
        s.polygons = vec![vec![0, 1, 2, 3], vec![0, 1, 4]];
        s
    }

    #[test]
    fn test_ascii_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.ply");
        write_ascii(&quad_and_triangle(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("ply\n"));
        assert!(text.contains("format ascii 1.0"));
        assert!(text.contains("element vertex 5"));
        assert!(text.contains("property float x"));
        assert!(text.contains("element face 2"));
        assert!(text.contains("property list uchar int vertex_indices"));
        assert!(text.contains("\n4 0 1 2 3"));
    }

    #[test]
    fn test_written_polygons_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.ply");
        let surface = quad_and_triangle();
        write_ascii(&surface, &path).unwrap();

        let loaded = read(&path).unwrap();
        assert_eq!(loaded.point_count(), 5);
        assert_eq!(loaded.polygons, surface.polygons);
        assert_eq!(loaded.points[4], Point3::new(0.5, 0.5, 1.0));
    }

    #[test]
    fn test_empty_surface_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_ascii(&PolygonSurface::new(), &dir.path().join("e.ply")).unwrap_err();
        assert!(matches!(err, TetraError::EmptySurface { .. }));
    }

    #[test]
    fn test_read_rejects_dangling_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ply");
        std::fs::write(
            &path,
            "ply\nformat ascii 1.0\nelement vertex 3\nproperty float x\nproperty float y\n\
             property float z\nelement face 1\nproperty list uchar int vertex_indices\n\
             end_header\n0 0 0\n1 0 0\n0 1 0\n3 0 1 7\n",
        )
        .unwrap();
        let err = read(&path).unwrap_err();
        assert!(matches!(err, TetraError::InvalidCellIndex { point_index: 7, .. }));
    }
}
