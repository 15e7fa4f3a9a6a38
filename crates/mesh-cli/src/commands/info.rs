//! mesh-tetra info command - display tetrahedral mesh statistics.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use mesh_tetra::{AttributeKind, DataArray, vtk};
use serde::Serialize;

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct MeshInfo {
    path: String,
    points: usize,
    cells: usize,
    cell_types: Vec<CellTypeCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<BoundsInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<Vec<i64>>,
    point_arrays: Vec<ArrayInfo>,
    cell_arrays: Vec<ArrayInfo>,
    field_arrays: Vec<ArrayInfo>,
}

#[derive(Serialize)]
struct CellTypeCount {
    kind: String,
    vtk_id: u8,
    count: usize,
}

#[derive(Serialize)]
struct BoundsInfo {
    min: [f64; 3],
    max: [f64; 3],
    dimensions: [f64; 3],
}

#[derive(Serialize)]
struct ArrayInfo {
    name: String,
    kind: &'static str,
    components: usize,
    tuples: usize,
}

fn kind_name(kind: &AttributeKind) -> &'static str {
    match kind {
        AttributeKind::Scalars { .. } => "scalars",
        AttributeKind::ColorScalars => "color scalars",
        AttributeKind::LookupTable => "lookup table",
        AttributeKind::Vectors => "vectors",
        AttributeKind::Normals => "normals",
        AttributeKind::TextureCoordinates => "texture coordinates",
        AttributeKind::Tensors => "tensors",
        AttributeKind::Field => "field",
    }
}

fn describe(arrays: &[DataArray]) -> Vec<ArrayInfo> {
    arrays
        .iter()
        .map(|a| ArrayInfo {
            name: a.name.clone(),
            kind: kind_name(&a.kind),
            components: a.components,
            tuples: a.tuple_count(),
        })
        .collect()
}

pub fn run(input: &Path, detailed: bool, cli: &Cli) -> Result<()> {
    let mesh = vtk::read_unstructured_grid(input)
        .with_context(|| format!("Failed to load mesh from {:?}", input))?;

    let bounds = mesh.bounds().map(|(min, max)| {
        let dims = max - min;
        BoundsInfo {
            min: [min.x, min.y, min.z],
            max: [max.x, max.y, max.z],
            dimensions: [dims.x, dims.y, dims.z],
        }
    });
    let labels = mesh.cell_labels().map(|mut labels| {
        labels.sort_unstable();
        labels.dedup();
        labels
    });

    let info = MeshInfo {
        path: input.display().to_string(),
        points: mesh.point_count(),
        cells: mesh.cell_count(),
        cell_types: mesh
            .cell_kind_counts()
            .into_iter()
            .map(|(kind, count)| CellTypeCount {
                kind: kind.name(),
                vtk_id: kind.vtk_id(),
                count,
            })
            .collect(),
        bounds,
        labels,
        point_arrays: describe(&mesh.point_data),
        cell_arrays: describe(&mesh.cell_data),
        field_arrays: describe(&mesh.field_data),
    };

    match cli.format {
        OutputFormat::Json => output::print(&info, cli.format, cli.quiet),
        OutputFormat::Text => {
            if cli.quiet {
                return Ok(());
            }
            println!("{}", "Mesh Information".bold().underline());
            println!("  {}: {}", "File".cyan(), input.display());
            println!("  {}: {}", "Points".cyan(), info.points);
            println!("  {}: {}", "Cells".cyan(), info.cells);
            for t in &info.cell_types {
                println!("    {} ({}): {}", t.kind, t.vtk_id, t.count);
            }
            if let Some(ref b) = info.bounds {
                println!(
                    "  {}: {:.2} x {:.2} x {:.2}",
                    "Dimensions".cyan(),
                    b.dimensions[0],
                    b.dimensions[1],
                    b.dimensions[2]
                );
                println!(
                    "  {}: ({:.2}, {:.2}, {:.2})",
                    "Min bounds".cyan(),
                    b.min[0],
                    b.min[1],
                    b.min[2]
                );
                println!(
                    "  {}: ({:.2}, {:.2}, {:.2})",
                    "Max bounds".cyan(),
                    b.max[0],
                    b.max[1],
                    b.max[2]
                );
            }
            if let Some(labels) = &info.labels {
                let list: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
                println!("  {}: {}", "Region labels".cyan(), list.join(", "));
            }

            let sections = [
                ("Point arrays", &info.point_arrays),
                ("Cell arrays", &info.cell_arrays),
                ("Field arrays", &info.field_arrays),
            ];
            for (title, arrays) in sections {
                if arrays.is_empty() {
                    continue;
                }
                if !detailed {
                    println!("  {}: {}", title.cyan(), arrays.len());
                    continue;
                }
                println!("  {}:", title.cyan());
                for a in arrays.iter() {
                    println!(
                        "    {} ({}, {} component(s), {} tuple(s))",
                        a.name, a.kind, a.components, a.tuples
                    );
                }
            }
        }
    }

    Ok(())
}
