//! Basic mesh generators for structured boxes.

use crate::data::grid::UnstructuredGrid;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellType;

/// Cell-type choices for structured boxes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StructuredCellType {
    Hexahedron,
    /// Each hexahedron split into six tetrahedra around its main diagonal.
    Tetrahedron,
}

fn invalid_geometry(message: impl Into<String>) -> MeshError {
    MeshError::InvalidConfig(message.into())
}

fn box_points(n: [usize; 3], min: [f64; 3], max: [f64; 3]) -> Vec<[f64; 3]> {
    let coord = |d: usize, i: usize| min[d] + (max[d] - min[d]) * i as f64 / n[d] as f64;
    let mut pts = Vec::with_capacity((n[0] + 1) * (n[1] + 1) * (n[2] + 1));
    for k in 0..=n[2] {
        for j in 0..=n[1] {
            for i in 0..=n[0] {
                pts.push([coord(0, i), coord(1, j), coord(2, k)]);
            }
        }
    }
    pts
}

/// Structured box of `divisions[0] x divisions[1] x divisions[2]` cells.
pub fn structured_box(
    divisions: [usize; 3],
    min: [f64; 3],
    max: [f64; 3],
    cell_type: StructuredCellType,
) -> Result<UnstructuredGrid, MeshError> {
    if divisions.contains(&0) {
        return Err(invalid_geometry("box divisions must be non-zero"));
    }
    if (0..3).any(|d| max[d] <= min[d]) {
        return Err(invalid_geometry(format!("degenerate box {min:?}..{max:?}")));
    }
    let [nx, ny, _] = divisions;
    let id = |i: usize, j: usize, k: usize| i + (nx + 1) * (j + (ny + 1) * k);

    let n_hex: usize = divisions.iter().product();
    let mut cells = Vec::with_capacity(match cell_type {
        StructuredCellType::Hexahedron => n_hex,
        StructuredCellType::Tetrahedron => 6 * n_hex,
    });
    for k in 0..divisions[2] {
        for j in 0..divisions[1] {
            for i in 0..divisions[0] {
                let hex = [
                    id(i, j, k),
                    id(i + 1, j, k),
                    id(i + 1, j + 1, k),
                    id(i, j + 1, k),
                    id(i, j, k + 1),
                    id(i + 1, j, k + 1),
                    id(i + 1, j + 1, k + 1),
                    id(i, j + 1, k + 1),
                ];
                match cell_type {
                    StructuredCellType::Hexahedron => cells.push((CellType::Hexahedron, hex.to_vec())),
                    StructuredCellType::Tetrahedron => {
                        for tet in CellType::Hexahedron.simplices(8) {
                            cells.push((CellType::Tetra, tet.iter().map(|&l| hex[l]).collect()));
                        }
                    }
                }
            }
        }
    }
    UnstructuredGrid::from_cells(box_points(divisions, min, max), &cells)
}

/// Hexahedral box.
pub fn hex_box(divisions: [usize; 3], min: [f64; 3], max: [f64; 3]) -> Result<UnstructuredGrid, MeshError> {
    structured_box(divisions, min, max, StructuredCellType::Hexahedron)
}

/// Tetrahedral box, six tetrahedra per hexahedron.
pub fn tet_box(divisions: [usize; 3], min: [f64; 3], max: [f64; 3]) -> Result<UnstructuredGrid, MeshError> {
    structured_box(divisions, min, max, StructuredCellType::Tetrahedron)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_box_counts() {
        let g = hex_box([2, 3, 4], [0.0; 3], [1.0; 3]).unwrap();
        assert_eq!(g.num_cells(), 24);
        assert_eq!(g.num_points(), 3 * 4 * 5);
        g.validate().unwrap();
    }

    #[test]
    fn tet_box_fills_the_volume() {
        let g = tet_box([1, 1, 1], [0.0; 3], [2.0; 3]).unwrap();
        assert_eq!(g.num_cells(), 6);
        let vol: f64 = (0..6)
            .map(|c| {
                let p: Vec<[f64; 3]> = g.cell_points(c).iter().map(|&i| g.point(i)).collect();
                let a = [p[1][0] - p[0][0], p[1][1] - p[0][1], p[1][2] - p[0][2]];
                let b = [p[2][0] - p[0][0], p[2][1] - p[0][1], p[2][2] - p[0][2]];
                let d = [p[3][0] - p[0][0], p[3][1] - p[0][1], p[3][2] - p[0][2]];
                let det = a[0] * (b[1] * d[2] - b[2] * d[1]) - a[1] * (b[0] * d[2] - b[2] * d[0])
                    + a[2] * (b[0] * d[1] - b[1] * d[0]);
                det.abs() / 6.0
            })
            .sum();
        assert!((vol - 8.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_degenerate_boxes() {
        assert!(hex_box([0, 1, 1], [0.0; 3], [1.0; 3]).is_err());
        assert!(hex_box([1, 1, 1], [0.0; 3], [1.0, 0.0, 1.0]).is_err());
    }
}
