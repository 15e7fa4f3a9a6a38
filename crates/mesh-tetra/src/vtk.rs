//! Legacy VTK unstructured grid I/O (ASCII).
//!
//! Reads what the meshers write: `POINTS`, `CELLS` in the classic layout or
//! the 5.1 `OFFSETS`/`CONNECTIVITY` layout, `CELL_TYPES`, and every
//! attribute kind under `POINT_DATA`/`CELL_DATA`. `METADATA` blocks are
//! skipped. Binary files are rejected.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use nalgebra::Point3;
use tracing::{debug, info};

use crate::error::{TetraError, TetraResult};
use crate::types::{AttributeKind, AttributeLocation, Cell, CellKind, DataArray, TetrahedralMesh};

/// Upper bound on capacity reserved from a count declared in the file.
/// Larger sections grow as their values are actually read.
const MAX_PREALLOC: usize = 1 << 16;

fn reserve<T>(declared: usize) -> Vec<T> {
    Vec::with_capacity(declared.min(MAX_PREALLOC))
}

/// Load an unstructured grid from a legacy VTK file.
pub fn read_unstructured_grid(path: &Path) -> TetraResult<TetrahedralMesh> {
    let text = fs::read_to_string(path).map_err(|e| TetraError::io_read(path, e))?;
    let mesh = parse_unstructured_grid(&text, path)?;
    debug!(
        target: "mesh_tetra::io",
        path = %path.display(),
        points = mesh.point_count(),
        cells = mesh.cell_count(),
        point_arrays = mesh.point_data.len(),
        cell_arrays = mesh.cell_data.len(),
        "VTK grid loaded"
    );
    Ok(mesh)
}

/// Line-aware whitespace tokenizer.
struct Lexer<'a> {
    lines: Vec<&'a str>,
    line: usize,
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(lines: Vec<&'a str>, first_line: usize) -> Self {
        Self {
            lines,
            line: first_line,
            tokens: Vec::new(),
            pos: 0,
        }
    }

    /// 1-based line number of the last token returned.
    fn line_no(&self) -> usize {
        self.line
    }

    fn fill(&mut self) -> bool {
        while self.pos >= self.tokens.len() {
            if self.line >= self.lines.len() {
                return false;
            }
            self.tokens = self.lines[self.line].split_whitespace().collect();
            self.pos = 0;
            self.line += 1;
        }
        true
    }

    fn next(&mut self) -> Option<&'a str> {
        if !self.fill() {
            return None;
        }
        let t = self.tokens[self.pos];
        self.pos += 1;
        Some(t)
    }

    fn peek(&mut self) -> Option<&'a str> {
        if !self.fill() {
            return None;
        }
        Some(self.tokens[self.pos])
    }

    /// Remaining tokens of the current line.
    fn rest_of_line(&mut self) -> Vec<&'a str> {
        let rest = self.tokens[self.pos.min(self.tokens.len())..].to_vec();
        self.pos = self.tokens.len();
        rest
    }

    /// Skip lines up to and including the next blank one.
    fn skip_block(&mut self) {
        self.pos = self.tokens.len();
        while self.line < self.lines.len() {
            let blank = self.lines[self.line].trim().is_empty();
            self.line += 1;
            if blank {
                break;
            }
        }
    }
}

struct Parser<'a, 'p> {
    lex: Lexer<'a>,
    path: &'p Path,
}

impl Parser<'_, '_> {
    fn error(&self, details: impl Into<String>) -> TetraError {
        TetraError::parse_error_at(self.path, self.lex.line_no(), details)
    }

    fn token(&mut self, what: &str) -> TetraResult<String> {
        self.lex
            .next()
            .map(str::to_string)
            .ok_or_else(|| self.error(format!("unexpected end of file, expected {}", what)))
    }

    fn usize(&mut self, what: &str) -> TetraResult<usize> {
        let t = self.token(what)?;
        t.parse()
            .map_err(|_| self.error(format!("expected {}, found `{}`", what, t)))
    }

    fn f64(&mut self, what: &str) -> TetraResult<f64> {
        let t = self.token(what)?;
        t.parse()
            .map_err(|_| self.error(format!("expected {}, found `{}`", what, t)))
    }

    fn values(&mut self, count: usize, what: &str) -> TetraResult<Vec<f64>> {
        let mut values = reserve(count);
        for _ in 0..count {
            values.push(self.f64(what)?);
        }
        Ok(values)
    }

    fn indices(&mut self, count: usize, what: &str) -> TetraResult<Vec<u64>> {
        let mut values = reserve(count);
        for _ in 0..count {
            let t = self.token(what)?;
            let v = t
                .parse::<u64>()
                .map_err(|_| self.error(format!("expected {}, found `{}`", what, t)))?;
            values.push(v);
        }
        Ok(values)
    }

    /// Product of two declared counts; overflow is a parse error.
    fn product(&self, a: usize, b: usize, what: &str) -> TetraResult<usize> {
        a.checked_mul(b)
            .ok_or_else(|| self.error(format!("{} count {} x {} is too large", what, a, b)))
    }

    fn expect_keyword(&mut self, keyword: &str) -> TetraResult<()> {
        let t = self.token(keyword)?;
        if t.eq_ignore_ascii_case(keyword) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}, found `{}`", keyword, t)))
        }
    }
}

/// Decode `%XX` escapes VTK uses for spaces and other bytes in names.
fn decode_name(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = [bytes[i + 1], bytes[i + 2]];
            if let Ok(v) = u8::from_str_radix(&String::from_utf8_lossy(&hex), 16) {
                out.push(v);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn encode_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        if b.is_ascii_graphic() && b != b'%' {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{:02X}", b);
        }
    }
    out
}

/// Parse legacy VTK text. `path` is only used in error messages.
pub fn parse_unstructured_grid(text: &str, path: &Path) -> TetraResult<TetrahedralMesh> {
    let lines: Vec<&str> = text.lines().collect();

    let version = lines.first().map(|l| l.trim()).unwrap_or_default();
    if !version.starts_with("# vtk DataFile Version") {
        return Err(TetraError::parse_error_at(
            path,
            1,
            "missing `# vtk DataFile Version` header",
        ));
    }
    let encoding = lines
        .get(2)
        .map(|l| l.trim())
        .ok_or_else(|| TetraError::parse_error(path, "missing file type line"))?;
    if encoding.eq_ignore_ascii_case("BINARY") {
        return Err(TetraError::UnsupportedEncoding {
            path: path.to_path_buf(),
            encoding: "BINARY".to_string(),
        });
    }
    if !encoding.eq_ignore_ascii_case("ASCII") {
        return Err(TetraError::parse_error_at(
            path,
            3,
            format!("expected ASCII or BINARY, found `{}`", encoding),
        ));
    }

    let mut p = Parser {
        lex: Lexer::new(lines, 3),
        path,
    };
    let mut mesh = TetrahedralMesh::new();

    let mut saw_dataset = false;
    let mut cell_types: Option<Vec<u8>> = None;
    let mut cell_points: Option<Vec<Vec<u32>>> = None;
    let mut location: Option<(AttributeLocation, usize)> = None;

    while let Some(keyword) = p.lex.next() {
        match keyword.to_ascii_uppercase().as_str() {
            "DATASET" => {
                let kind = p.token("dataset type")?;
                if !kind.eq_ignore_ascii_case("UNSTRUCTURED_GRID") {
                    return Err(p.error(format!(
                        "unsupported dataset type `{}`, expected UNSTRUCTURED_GRID",
                        kind
                    )));
                }
                saw_dataset = true;
            }
            "POINTS" => {
                let n = p.usize("point count")?;
                let _data_type = p.token("point data type")?;
                let total = p.product(n, 3, "point coordinate")?;
                let coords = p.values(total, "point coordinate")?;
                mesh.points = coords
                    .chunks_exact(3)
                    .map(|c| Point3::new(c[0], c[1], c[2]))
                    .collect();
            }
            "CELLS" => {
                let first = p.usize("cell count")?;
                let second = p.usize("cell list size")?;
                if p.lex.peek().is_some_and(|t| t.eq_ignore_ascii_case("OFFSETS")) {
                    cell_points = Some(read_offsets_layout(&mut p, first, second)?);
                } else {
                    cell_points = Some(read_classic_layout(&mut p, first, second)?);
                }
            }
            "CELL_TYPES" => {
                let n = p.usize("cell type count")?;
                let mut types = reserve(n);
                for _ in 0..n {
                    let t = p.usize("cell type")?;
                    let t = u8::try_from(t).map_err(|_| p.error(format!("invalid cell type {}", t)))?;
                    types.push(t);
                }
                cell_types = Some(types);
            }
            "POINT_DATA" => {
                let n = p.usize("point data count")?;
                location = Some((AttributeLocation::Point, n));
            }
            "CELL_DATA" => {
                let n = p.usize("cell data count")?;
                location = Some((AttributeLocation::Cell, n));
            }
            "FIELD" => {
                let _name = p.token("field name")?;
                let count = p.usize("field array count")?;
                let arrays = read_field_arrays(&mut p, count)?;
                match location {
                    Some((AttributeLocation::Point, _)) => mesh.point_data.extend(arrays),
                    Some((AttributeLocation::Cell, _)) => mesh.cell_data.extend(arrays),
                    None => mesh.field_data.extend(arrays),
                }
            }
            "METADATA" => p.lex.skip_block(),
            attr @ ("SCALARS" | "COLOR_SCALARS" | "LOOKUP_TABLE" | "VECTORS" | "NORMALS"
            | "TEXTURE_COORDINATES" | "TENSORS" | "TENSORS6") => {
                let Some((loc, n)) = location else {
                    return Err(p.error(format!("{} outside POINT_DATA/CELL_DATA", attr)));
                };
                let array = read_attribute(&mut p, attr, n)?;
                match loc {
                    AttributeLocation::Point => mesh.point_data.push(array),
                    AttributeLocation::Cell => mesh.cell_data.push(array),
                }
            }
            other => {
                return Err(p.error(format!("unexpected keyword `{}`", other)));
            }
        }
    }

    if !saw_dataset {
        return Err(TetraError::parse_error(path, "missing DATASET section"));
    }

    let cell_points = cell_points.unwrap_or_default();
    let cell_types = cell_types.unwrap_or_default();
    if cell_points.len() != cell_types.len() {
        return Err(TetraError::parse_error(
            path,
            format!(
                "{} cells but {} cell types",
                cell_points.len(),
                cell_types.len()
            ),
        ));
    }
    mesh.cells = cell_points
        .into_iter()
        .zip(cell_types)
        .map(|(points, t)| Cell {
            kind: CellKind::from_vtk_id(t),
            points,
        })
        .collect();

    if let Some((ci, pi)) = mesh.first_invalid_reference() {
        return Err(TetraError::invalid_cell_index(ci, pi, mesh.points.len()));
    }
    check_tuple_counts(&mesh, path)?;

    Ok(mesh)
}

fn read_classic_layout(p: &mut Parser, cells: usize, size: usize) -> TetraResult<Vec<Vec<u32>>> {
    let mut out = reserve(cells);
    let mut consumed = 0usize;
    for _ in 0..cells {
        let count = p.usize("cell point count")?;
        let ids = p.indices(count, "point index")?;
        consumed += count + 1;
        out.push(to_u32(p, ids)?);
    }
    if consumed != size {
        return Err(p.error(format!(
            "cell list size is {} but {} values were read",
            size, consumed
        )));
    }
    Ok(out)
}

fn read_offsets_layout(
    p: &mut Parser,
    offset_count: usize,
    connectivity_count: usize,
) -> TetraResult<Vec<Vec<u32>>> {
    p.expect_keyword("OFFSETS")?;
    let _ = p.token("offset type")?;
    let offsets = p.indices(offset_count, "offset")?;
    p.expect_keyword("CONNECTIVITY")?;
    let _ = p.token("connectivity type")?;
    let connectivity = p.indices(connectivity_count, "point index")?;

    let mut out = reserve(offset_count.saturating_sub(1));
    for w in offsets.windows(2) {
        let (a, b) = (w[0] as usize, w[1] as usize);
        if a > b || b > connectivity.len() {
            return Err(p.error(format!("invalid cell offsets {}..{}", a, b)));
        }
        out.push(to_u32(p, connectivity[a..b].to_vec())?);
    }
    Ok(out)
}

fn to_u32(p: &Parser, ids: Vec<u64>) -> TetraResult<Vec<u32>> {
    ids.into_iter()
        .map(|i| u32::try_from(i).map_err(|_| p.error(format!("point index {} too large", i))))
        .collect()
}

fn read_attribute(p: &mut Parser, keyword: &str, n: usize) -> TetraResult<DataArray> {
    let header = p.lex.rest_of_line();
    let arg = |i: usize| header.get(i).copied();
    let name = decode_name(arg(0).ok_or_else(|| missing(p, keyword, "name"))?);

    let (kind, data_type, components, tuples) = match keyword {
        "SCALARS" => {
            let data_type = arg(1).ok_or_else(|| missing(p, keyword, "data type"))?;
            let components = match arg(2) {
                Some(c) => c.parse().map_err(|_| p.error("invalid component count"))?,
                None => 1,
            };
            let lookup_table = if p
                .lex
                .peek()
                .is_some_and(|t| t.eq_ignore_ascii_case("LOOKUP_TABLE"))
            {
                p.lex.next();
                let table = p.lex.rest_of_line();
                table.first().map(|t| decode_name(t))
            } else {
                None
            };
            (
                AttributeKind::Scalars { lookup_table },
                data_type.to_string(),
                components,
                n,
            )
        }
        "COLOR_SCALARS" => {
            let components = arg(1)
                .ok_or_else(|| missing(p, keyword, "component count"))?
                .parse()
                .map_err(|_| p.error("invalid component count"))?;
            (AttributeKind::ColorScalars, "float".to_string(), components, n)
        }
        "LOOKUP_TABLE" => {
            let size = arg(1)
                .ok_or_else(|| missing(p, keyword, "size"))?
                .parse()
                .map_err(|_| p.error("invalid lookup table size"))?;
            (AttributeKind::LookupTable, "float".to_string(), 4, size)
        }
        "VECTORS" | "NORMALS" => {
            let data_type = arg(1).ok_or_else(|| missing(p, keyword, "data type"))?;
            let kind = if keyword == "VECTORS" {
                AttributeKind::Vectors
            } else {
                AttributeKind::Normals
            };
            (kind, data_type.to_string(), 3, n)
        }
        "TEXTURE_COORDINATES" => {
            let dim = arg(1)
                .ok_or_else(|| missing(p, keyword, "dimension"))?
                .parse()
                .map_err(|_| p.error("invalid texture coordinate dimension"))?;
            let data_type = arg(2).ok_or_else(|| missing(p, keyword, "data type"))?;
            (AttributeKind::TextureCoordinates, data_type.to_string(), dim, n)
        }
        "TENSORS" | "TENSORS6" => {
            let data_type = arg(1).ok_or_else(|| missing(p, keyword, "data type"))?;
            let components = if keyword == "TENSORS" { 9 } else { 6 };
            (AttributeKind::Tensors, data_type.to_string(), components, n)
        }
        _ => return Err(p.error(format!("unknown attribute `{}`", keyword))),
    };

    let total = p.product(tuples, components, "attribute value")?;
    let values = p.values(total, "attribute value")?;
    Ok(DataArray {
        name,
        kind,
        data_type,
        components,
        values,
    })
}

fn missing(p: &Parser, keyword: &str, what: &str) -> TetraError {
    p.error(format!("{} is missing its {}", keyword, what))
}

fn read_field_arrays(p: &mut Parser, count: usize) -> TetraResult<Vec<DataArray>> {
    let mut arrays = reserve(count);
    for _ in 0..count {
        let name = decode_name(&p.token("field array name")?);
        if p.lex.peek().is_some_and(|t| t == "NULL_ARRAY") {
            p.lex.next();
            continue;
        }
        let components = p.usize("field array component count")?;
        let tuples = p.usize("field array tuple count")?;
        let data_type = p.token("field array data type")?;
        let total = p.product(components, tuples, "field value")?;
        let values = p.values(total, "field value")?;
        arrays.push(DataArray {
            name,
            kind: AttributeKind::Field,
            data_type,
            components,
            values,
        });
        // Arrays may be followed by their own METADATA block
        if p.lex.peek().is_some_and(|t| t.eq_ignore_ascii_case("METADATA")) {
            p.lex.next();
            p.lex.skip_block();
        }
    }
    Ok(arrays)
}

fn check_tuple_counts(mesh: &TetrahedralMesh, path: &Path) -> TetraResult<()> {
    let groups = [
        ("point", &mesh.point_data, mesh.point_count()),
        ("cell", &mesh.cell_data, mesh.cell_count()),
    ];
    for (where_, arrays, expected) in groups {
        for array in arrays {
            if array.kind == AttributeKind::LookupTable {
                continue;
            }
            if array.tuple_count() != expected {
                return Err(TetraError::parse_error(
                    path,
                    format!(
                        "{} array `{}` has {} tuples, expected {}",
                        where_,
                        array.name,
                        array.tuple_count(),
                        expected
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Write an unstructured grid as legacy VTK (ASCII, classic cell layout).
pub fn write_unstructured_grid(mesh: &TetrahedralMesh, path: &Path) -> TetraResult<()> {
    let text = format_unstructured_grid(mesh);
    fs::write(path, text).map_err(|e| TetraError::io_write(path, e))?;
    info!(
        target: "mesh_tetra::io",
        path = %path.display(),
        points = mesh.point_count(),
        cells = mesh.cell_count(),
        "Saved VTK unstructured grid"
    );
    Ok(())
}

/// Format an unstructured grid as legacy VTK text.
pub fn format_unstructured_grid(mesh: &TetrahedralMesh) -> String {
    let mut s = String::new();
    s.push_str("# vtk DataFile Version 4.2\n");
    s.push_str("mesh-tetra unstructured grid\n");
    s.push_str("ASCII\n");
    s.push_str("DATASET UNSTRUCTURED_GRID\n");

    if !mesh.field_data.is_empty() {
        write_field_block(&mut s, &mesh.field_data);
    }

    let _ = writeln!(s, "POINTS {} double", mesh.points.len());
    for p in &mesh.points {
        let _ = writeln!(s, "{} {} {}", p.x, p.y, p.z);
    }

    let size: usize = mesh.cells.iter().map(|c| c.points.len() + 1).sum();
    let _ = writeln!(s, "CELLS {} {}", mesh.cells.len(), size);
    for cell in &mesh.cells {
        let _ = write!(s, "{}", cell.points.len());
        for i in &cell.points {
            let _ = write!(s, " {}", i);
        }
        s.push('\n');
    }
    let _ = writeln!(s, "CELL_TYPES {}", mesh.cells.len());
    for cell in &mesh.cells {
        let _ = writeln!(s, "{}", cell.kind.vtk_id());
    }

    if !mesh.cell_data.is_empty() {
        let _ = writeln!(s, "CELL_DATA {}", mesh.cells.len());
        write_attributes(&mut s, &mesh.cell_data);
    }
    if !mesh.point_data.is_empty() {
        let _ = writeln!(s, "POINT_DATA {}", mesh.points.len());
        write_attributes(&mut s, &mesh.point_data);
    }
    s
}

fn write_values(s: &mut String, array: &DataArray) {
    let per_line = array.components.max(1);
    for tuple in array.values.chunks(per_line) {
        let line: Vec<String> = tuple.iter().map(|v| v.to_string()).collect();
        s.push_str(&line.join(" "));
        s.push('\n');
    }
}

fn write_attributes(s: &mut String, arrays: &[DataArray]) {
    for array in arrays {
        let name = encode_name(&array.name);
        match &array.kind {
            AttributeKind::Scalars { lookup_table } => {
                let _ = writeln!(s, "SCALARS {} {} {}", name, array.data_type, array.components);
                let table = lookup_table
                    .as_deref()
                    .map(encode_name)
                    .unwrap_or_else(|| "default".to_string());
                let _ = writeln!(s, "LOOKUP_TABLE {}", table);
            }
            AttributeKind::ColorScalars => {
                let _ = writeln!(s, "COLOR_SCALARS {} {}", name, array.components);
            }
            AttributeKind::LookupTable => {
                let _ = writeln!(s, "LOOKUP_TABLE {} {}", name, array.tuple_count());
            }
            AttributeKind::Vectors => {
                let _ = writeln!(s, "VECTORS {} {}", name, array.data_type);
            }
            AttributeKind::Normals => {
                let _ = writeln!(s, "NORMALS {} {}", name, array.data_type);
            }
            AttributeKind::TextureCoordinates => {
                let _ = writeln!(
                    s,
                    "TEXTURE_COORDINATES {} {} {}",
                    name, array.components, array.data_type
                );
            }
            AttributeKind::Tensors => {
                let keyword = if array.components == 6 {
                    "TENSORS6"
                } else {
                    "TENSORS"
                };
                let _ = writeln!(s, "{} {} {}", keyword, name, array.data_type);
            }
            AttributeKind::Field => continue,
        }
        write_values(s, array);
    }

    let fields: Vec<DataArray> = arrays
        .iter()
        .filter(|a| a.kind == AttributeKind::Field)
        .cloned()
        .collect();
    if !fields.is_empty() {
        write_field_block(s, &fields);
    }
}

fn write_field_block(s: &mut String, arrays: &[DataArray]) {
    let _ = writeln!(s, "FIELD FieldData {}", arrays.len());
    for array in arrays {
        let _ = writeln!(
            s,
            "{} {} {} {}",
            encode_name(&array.name),
            array.components,
            array.tuple_count(),
            array.data_type
        );
        write_values(s, array);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_TETS: &str = "# vtk DataFile Version 3.0
written by a mesher
ASCII
DATASET UNSTRUCTURED_GRID
POINTS 5 float
0 0 0
1 0 0
0 1 0
0 0 1
1 1 1
CELLS 2 10
4 0 1 2 3
4 1 2 3 4
CELL_TYPES 2
10
10
CELL_DATA 2
SCALARS labels int 1
LOOKUP_TABLE default
0
1
FIELD extra 1
quality 1 2 double
0.5 0.25
POINT_DATA 5
VECTORS displacement float
1 0 0
0 1 0
0 0 1
1 1 0
0 0 0
NORMALS surface%20normal float
0 0 1
0 0 1
0 0 1
0 0 1
0 0 1
TEXTURE_COORDINATES uv 2 float
0 0
1 0
0 1
1 1
0.5 0.5
TENSORS stress double
1 0 0 0 1 0 0 0 1
1 0 0 0 1 0 0 0 1
1 0 0 0 1 0 0 0 1
1 0 0 0 1 0 0 0 1
1 0 0 0 1 0 0 0 1
COLOR_SCALARS rgb 3
1 0 0
0 1 0
0 0 1
1 1 1
0 0 0
";

    fn path() -> &'static Path {
        Path::new("test.vtk")
    }

    #[test]
    fn test_parse_all_attribute_kinds() {
        let mesh = parse_unstructured_grid(TWO_TETS, path()).unwrap();
        assert_eq!(mesh.point_count(), 5);
        assert_eq!(mesh.cell_count(), 2);
        assert_eq!(mesh.tetra_count(), 2);
        assert_eq!(mesh.cells[1].points, vec![1, 2, 3, 4]);

        assert_eq!(mesh.cell_labels(), Some(vec![0, 1]));
        let quality = mesh.cell_array("quality").unwrap();
        assert_eq!(quality.kind, AttributeKind::Field);
        assert_eq!(quality.values, vec![0.5, 0.25]);

        assert_eq!(mesh.point_data.len(), 5);
        assert_eq!(mesh.point_array("displacement").unwrap().kind, AttributeKind::Vectors);
        assert_eq!(mesh.point_array("surface normal").unwrap().kind, AttributeKind::Normals);
        assert_eq!(mesh.point_array("uv").unwrap().components, 2);
        assert_eq!(mesh.point_array("stress").unwrap().components, 9);
        assert_eq!(mesh.point_array("rgb").unwrap().kind, AttributeKind::ColorScalars);
    }

    #[test]
    fn test_parse_offsets_layout_and_metadata() {
        let text = "# vtk DataFile Version 5.1
vtk output
ASCII
DATASET UNSTRUCTURED_GRID
POINTS 4 float
0 0 0 1 0 0 0 1 0 0 0 1
METADATA
INFORMATION 0

CELLS 3 7
OFFSETS vtktypeint64
0 4 7
CONNECTIVITY vtktypeint64
0 1 2 3
0 1 2
CELL_TYPES 2
10
5
";
        let mesh = parse_unstructured_grid(text, path()).unwrap();
        assert_eq!(mesh.cell_count(), 2);
        assert_eq!(mesh.cells[0].kind, CellKind::Tetra);
        assert_eq!(mesh.cells[1].kind, CellKind::Triangle);
        assert_eq!(mesh.cells[1].points, vec![0, 1, 2]);
    }

    #[test]
    fn test_binary_rejected() {
        let text = "# vtk DataFile Version 3.0\nx\nBINARY\nDATASET UNSTRUCTURED_GRID\n";
        let err = parse_unstructured_grid(text, path()).unwrap_err();
        assert!(matches!(err, TetraError::UnsupportedEncoding { .. }));
    }

    #[test]
    fn test_dangling_index_rejected() {
        let text = "# vtk DataFile Version 3.0
x
ASCII
DATASET UNSTRUCTURED_GRID
POINTS 3 float
0 0 0 1 0 0 0 1 0
CELLS 1 5
4 0 1 2 9
CELL_TYPES 1
10
";
        let err = parse_unstructured_grid(text, path()).unwrap_err();
        assert!(matches!(
            err,
            TetraError::InvalidCellIndex {
                cell_index: 0,
                point_index: 9,
                ..
            }
        ));
    }

    #[test]
    fn test_truncated_file_reports_line() {
        let text = "# vtk DataFile Version 3.0\nx\nASCII\nDATASET UNSTRUCTURED_GRID\nPOINTS 3 float\n0 0 0\n";
        let err = parse_unstructured_grid(text, path()).unwrap_err();
        match err {
            TetraError::ParseError { line, details, .. } => {
                assert!(line.is_some());
                assert!(details.contains("end of file"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_wrong_dataset_rejected() {
        let text = "# vtk DataFile Version 3.0\nx\nASCII\nDATASET POLYDATA\n";
        assert!(parse_unstructured_grid(text, path()).is_err());
    }

    #[test]
    fn test_formatted_grid_parses_back() {
        let original = parse_unstructured_grid(TWO_TETS, path()).unwrap();
        let text = format_unstructured_grid(&original);
        let reparsed = parse_unstructured_grid(&text, path()).unwrap();

        assert_eq!(reparsed.points, original.points);
        assert_eq!(reparsed.cells, original.cells);
        assert_eq!(reparsed.cell_data, original.cell_data);
        let names: Vec<&str> = reparsed.point_data.iter().map(|a| a.name.as_str()).collect();
        assert!(names.contains(&"surface normal"));
        assert_eq!(reparsed.point_data.len(), original.point_data.len());
    }

    #[test]
    fn test_huge_point_count_is_a_parse_error() {
        let text = "# vtk DataFile Version 3.0\nx\nASCII\nDATASET UNSTRUCTURED_GRID\n\
                    POINTS 100000000000000 float\n0 0 0\n";
        let err = parse_unstructured_grid(text, path()).unwrap_err();
        match err {
            TetraError::ParseError { details, .. } => assert!(details.contains("end of file")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_overflowing_counts_are_parse_errors() {
        let text = "# vtk DataFile Version 3.0\nx\nASCII\nDATASET UNSTRUCTURED_GRID\n\
                    POINTS 9000000000000000000 float\n0 0 0\n";
        let err = parse_unstructured_grid(text, path()).unwrap_err();
        match err {
            TetraError::ParseError { details, .. } => assert!(details.contains("too large")),
            other => panic!("unexpected error: {other:?}"),
        }

        let text = "# vtk DataFile Version 3.0\nx\nASCII\nDATASET UNSTRUCTURED_GRID\n\
                    POINTS 1 float\n0 0 0\nPOINT_DATA 18446744073709551615\n\
                    TENSORS t double\n1\n";
        let err = parse_unstructured_grid(text, path()).unwrap_err();
        assert!(matches!(err, TetraError::ParseError { .. }));

        let text = "# vtk DataFile Version 3.0\nx\nASCII\nDATASET UNSTRUCTURED_GRID\n\
                    FIELD f 1\nbig 4294967296 4294967296 double\n1\n";
        let err = parse_unstructured_grid(text, path()).unwrap_err();
        assert!(matches!(err, TetraError::ParseError { .. }));
    }

    #[test]
    fn test_name_escaping() {
        assert_eq!(encode_name("a b%c"), "a%20b%25c");
        assert_eq!(decode_name("a%20b%25c"), "a b%c");
        assert_eq!(decode_name("100%"), "100%");
    }
}
