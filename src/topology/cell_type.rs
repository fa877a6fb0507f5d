//! Cell type metadata for grid cells.
//!
//! Node orderings follow the VTK linear cell conventions so that
//! meshes produced elsewhere can be fed in without reordering.

/// Linear cell types supported by the redistribution engine.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum CellType {
    /// 0D vertex.
    #[default]
    Vertex,
    /// 1D segment.
    Line,
    /// 2D simplex.
    Triangle,
    /// 2D tensor-product cell, nodes counter-clockwise.
    Quad,
    /// 2D polygon with an arbitrary number (>= 3) of nodes.
    Polygon,
    /// 3D simplex.
    Tetra,
    /// 3D tensor-product cell: nodes 0-3 bottom face, 4-7 top face.
    Hexahedron,
    /// 3D prism: nodes 0-2 bottom triangle, 3-5 top triangle.
    Wedge,
    /// 3D pyramid: nodes 0-3 base, 4 apex.
    Pyramid,
}

impl CellType {
    /// Returns the topological dimension of the cell.
    pub fn dimension(self) -> u8 {
        match self {
            CellType::Vertex => 0,
            CellType::Line => 1,
            CellType::Triangle | CellType::Quad | CellType::Polygon => 2,
            CellType::Tetra | CellType::Hexahedron | CellType::Wedge | CellType::Pyramid => 3,
        }
    }

    /// Fixed node count, or `None` for polygons.
    pub fn node_count(self) -> Option<usize> {
        match self {
            CellType::Vertex => Some(1),
            CellType::Line => Some(2),
            CellType::Triangle => Some(3),
            CellType::Quad => Some(4),
            CellType::Polygon => None,
            CellType::Tetra => Some(4),
            CellType::Hexahedron => Some(8),
            CellType::Wedge => Some(6),
            CellType::Pyramid => Some(5),
        }
    }

    /// Whether `n` nodes is a legal arity for this type.
    pub fn accepts_arity(self, n: usize) -> bool {
        match self.node_count() {
            Some(k) => k == n,
            None => n >= 3,
        }
    }

    /// Stable label.
    pub fn as_str(self) -> &'static str {
        match self {
            CellType::Vertex => "vertex",
            CellType::Line => "line",
            CellType::Triangle => "triangle",
            CellType::Quad => "quad",
            CellType::Polygon => "polygon",
            CellType::Tetra => "tetra",
            CellType::Hexahedron => "hexahedron",
            CellType::Wedge => "wedge",
            CellType::Pyramid => "pyramid",
        }
    }

    /// Stable one-byte wire code.
    pub fn to_wire(self) -> u8 {
        match self {
            CellType::Vertex => 1,
            CellType::Line => 3,
            CellType::Triangle => 5,
            CellType::Polygon => 7,
            CellType::Quad => 9,
            CellType::Tetra => 10,
            CellType::Hexahedron => 12,
            CellType::Wedge => 13,
            CellType::Pyramid => 14,
        }
    }

    /// Inverse of [`CellType::to_wire`].
    pub fn from_wire(code: u8) -> Option<Self> {
        Some(match code {
            1 => CellType::Vertex,
            3 => CellType::Line,
            5 => CellType::Triangle,
            7 => CellType::Polygon,
            9 => CellType::Quad,
            10 => CellType::Tetra,
            12 => CellType::Hexahedron,
            13 => CellType::Wedge,
            14 => CellType::Pyramid,
            _ => return None,
        })
    }

    /// Split a cell's local node indices into simplices of the same dimension.
    ///
    /// Simplices are returned as index lists into `0..nodes`; a simplex cell
    /// yields itself.
    pub fn simplices(self, nodes: usize) -> Vec<Vec<usize>> {
        match self {
            CellType::Vertex => vec![vec![0]],
            CellType::Line => vec![vec![0, 1]],
            CellType::Triangle => vec![vec![0, 1, 2]],
            CellType::Quad => vec![vec![0, 1, 2], vec![0, 2, 3]],
            CellType::Polygon => (1..nodes.saturating_sub(1))
                .map(|i| vec![0, i, i + 1])
                .collect(),
            CellType::Tetra => vec![vec![0, 1, 2, 3]],
            CellType::Hexahedron => vec![
                vec![0, 1, 2, 6],
                vec![0, 2, 3, 6],
                vec![0, 3, 7, 6],
                vec![0, 7, 4, 6],
                vec![0, 4, 5, 6],
                vec![0, 5, 1, 6],
            ],
            CellType::Wedge => vec![vec![0, 1, 2, 3], vec![1, 2, 3, 4], vec![2, 3, 4, 5]],
            CellType::Pyramid => vec![vec![0, 1, 2, 4], vec![0, 2, 3, 4]],
        }
    }

    /// Simplex type for a given dimension.
    pub fn simplex_of_dimension(dim: u8) -> Self {
        match dim {
            0 => CellType::Vertex,
            1 => CellType::Line,
            2 => CellType::Triangle,
            _ => CellType::Tetra,
        }
    }
}
