//! Unstructured grid: points, typed cells and attached field data.

use crate::data::attributes::FieldData;
use crate::geometry::aabb::Aabb;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellType;

/// Points plus cells stored as offsets + connectivity, with point and cell
/// data arrays.
#[derive(Clone, Debug, PartialEq)]
pub struct UnstructuredGrid {
    points: Vec<[f64; 3]>,
    cell_types: Vec<CellType>,
    offsets: Vec<usize>,
    connectivity: Vec<usize>,
    /// Arrays with one tuple per point.
    pub point_data: FieldData,
    /// Arrays with one tuple per cell.
    pub cell_data: FieldData,
}

impl Default for UnstructuredGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl UnstructuredGrid {
    pub fn new() -> Self {
        Self::with_capacity(0, 0, 0)
    }

    /// Pre-size point, cell and connectivity storage.
    pub fn with_capacity(points: usize, cells: usize, connectivity: usize) -> Self {
        let mut offsets = Vec::with_capacity(cells + 1);
        offsets.push(0);
        Self {
            points: Vec::with_capacity(points),
            cell_types: Vec::with_capacity(cells),
            offsets,
            connectivity: Vec::with_capacity(connectivity),
            point_data: FieldData::new(),
            cell_data: FieldData::new(),
        }
    }

    /// Build from raw parts, validating connectivity.
    pub fn from_cells(
        points: Vec<[f64; 3]>,
        cells: &[(CellType, Vec<usize>)],
    ) -> Result<Self, MeshError> {
        let conn: usize = cells.iter().map(|(_, c)| c.len()).sum();
        let mut g = Self::with_capacity(points.len(), cells.len(), conn);
        g.points = points;
        for (ct, nodes) in cells {
            g.push_cell(*ct, nodes)?;
        }
        Ok(g)
    }

    /// Assemble a grid from decoded buffers and validate it.
    pub(crate) fn from_raw_parts(
        points: Vec<[f64; 3]>,
        cell_types: Vec<CellType>,
        offsets: Vec<usize>,
        connectivity: Vec<usize>,
        point_data: FieldData,
        cell_data: FieldData,
    ) -> Result<Self, MeshError> {
        let consistent = offsets.len() == cell_types.len() + 1
            && offsets.first() == Some(&0)
            && offsets.last() == Some(&connectivity.len())
            && offsets.windows(2).all(|w| w[0] <= w[1]);
        if !consistent {
            return Err(MeshError::decode("cell offsets do not match connectivity"));
        }
        for (c, w) in offsets.windows(2).enumerate() {
            let ct = cell_types[c];
            if !ct.accepts_arity(w[1] - w[0]) {
                return Err(MeshError::InvalidCellArity {
                    cell_type: ct.as_str(),
                    got: w[1] - w[0],
                });
            }
        }
        let g = Self {
            points,
            cell_types,
            offsets,
            connectivity,
            point_data,
            cell_data,
        };
        g.validate()?;
        Ok(g)
    }

    /// A grid with the same arrays as `self` and no points or cells.
    pub fn empty_like(&self) -> Self {
        let mut g = Self::new();
        g.point_data = self.point_data.empty_like(0);
        g.cell_data = self.cell_data.empty_like(0);
        g
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cell_types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cell_types.is_empty() && self.points.is_empty()
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    #[inline]
    pub fn point(&self, i: usize) -> [f64; 3] {
        self.points[i]
    }

    pub fn cell_types(&self) -> &[CellType] {
        &self.cell_types
    }

    #[inline]
    pub fn cell_type(&self, c: usize) -> CellType {
        self.cell_types[c]
    }

    #[inline]
    pub fn cell_points(&self, c: usize) -> &[usize] {
        &self.connectivity[self.offsets[c]..self.offsets[c + 1]]
    }

    pub fn connectivity_len(&self) -> usize {
        self.connectivity.len()
    }

    /// Append a point, returning its index. Point data is not touched.
    pub fn push_point(&mut self, p: [f64; 3]) -> usize {
        self.points.push(p);
        self.points.len() - 1
    }

    /// Append a cell, returning its index. Cell data is not touched.
    pub fn push_cell(&mut self, ct: CellType, nodes: &[usize]) -> Result<usize, MeshError> {
        if !ct.accepts_arity(nodes.len()) {
            return Err(MeshError::InvalidCellArity {
                cell_type: ct.as_str(),
                got: nodes.len(),
            });
        }
        let cell = self.cell_types.len();
        if let Some(&bad) = nodes.iter().find(|&&p| p >= self.points.len()) {
            return Err(MeshError::CellPointOutOfRange {
                cell,
                point: bad,
                n_points: self.points.len(),
            });
        }
        self.cell_types.push(ct);
        self.connectivity.extend_from_slice(nodes);
        self.offsets.push(self.connectivity.len());
        Ok(cell)
    }

    /// Bounds of all points, `None` for a grid without points.
    pub fn bounds(&self) -> Option<Aabb> {
        (!self.points.is_empty()).then(|| Aabb::from_points(&self.points))
    }

    pub fn cell_bounds(&self, c: usize) -> Aabb {
        let mut b = Aabb::empty();
        for &p in self.cell_points(c) {
            b.expand(&self.points[p]);
        }
        b
    }

    /// Arithmetic mean of the cell's nodes.
    pub fn cell_centroid(&self, c: usize) -> [f64; 3] {
        let nodes = self.cell_points(c);
        let mut acc = [0.0; 3];
        for &p in nodes {
            for d in 0..3 {
                acc[d] += self.points[p][d];
            }
        }
        let n = nodes.len().max(1) as f64;
        [acc[0] / n, acc[1] / n, acc[2] / n]
    }

    /// Centroids of every cell.
    #[cfg(not(feature = "rayon"))]
    pub fn cell_centroids(&self) -> Vec<[f64; 3]> {
        (0..self.num_cells()).map(|c| self.cell_centroid(c)).collect()
    }

    /// Centroids of every cell.
    #[cfg(feature = "rayon")]
    pub fn cell_centroids(&self) -> Vec<[f64; 3]> {
        use rayon::prelude::*;
        (0..self.num_cells())
            .into_par_iter()
            .map(|c| self.cell_centroid(c))
            .collect()
    }

    /// Check connectivity and array lengths.
    pub fn validate(&self) -> Result<(), MeshError> {
        let n = self.points.len();
        for c in 0..self.num_cells() {
            if let Some(&bad) = self.cell_points(c).iter().find(|&&p| p >= n) {
                return Err(MeshError::CellPointOutOfRange {
                    cell: c,
                    point: bad,
                    n_points: n,
                });
            }
        }
        self.point_data.validate(n)?;
        self.cell_data.validate(self.num_cells())
    }

    /// Release spare capacity in every buffer.
    pub fn shrink_to_fit(&mut self) {
        self.points.shrink_to_fit();
        self.cell_types.shrink_to_fit();
        self.offsets.shrink_to_fit();
        self.connectivity.shrink_to_fit();
        self.point_data.shrink_to_fit();
        self.cell_data.shrink_to_fit();
    }
}
