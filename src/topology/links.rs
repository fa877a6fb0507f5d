//! Point → cell upward adjacency ("links") in CSR form.

use crate::data::grid::UnstructuredGrid;

/// For each point, the cells that reference it.
#[derive(Clone, Debug, Default)]
pub struct CellLinks {
    offsets: Vec<usize>,
    cells: Vec<usize>,
}

impl CellLinks {
    /// Build links for every point of `grid`.
    pub fn build(grid: &UnstructuredGrid) -> Self {
        let n_points = grid.num_points();
        let mut counts = vec![0usize; n_points + 1];
        for c in 0..grid.num_cells() {
            for &p in grid.cell_points(c) {
                counts[p + 1] += 1;
            }
        }
        for i in 0..n_points {
            counts[i + 1] += counts[i];
        }
        let mut fill = counts.clone();
        let mut cells = vec![0usize; counts[n_points]];
        for c in 0..grid.num_cells() {
            for &p in grid.cell_points(c) {
                cells[fill[p]] = c;
                fill[p] += 1;
            }
        }
        // a cell listing the same point twice would appear twice
        let mut links = Self {
            offsets: counts,
            cells,
        };
        links.dedup_rows();
        links
    }

    fn dedup_rows(&mut self) {
        let n = self.offsets.len() - 1;
        let mut out = Vec::with_capacity(self.cells.len());
        let mut offsets = Vec::with_capacity(n + 1);
        offsets.push(0);
        for p in 0..n {
            let row = &self.cells[self.offsets[p]..self.offsets[p + 1]];
            let start = out.len();
            for &c in row {
                if !out[start..].contains(&c) {
                    out.push(c);
                }
            }
            offsets.push(out.len());
        }
        self.offsets = offsets;
        self.cells = out;
    }

    /// Cells using point `p`.
    #[inline]
    pub fn cells_of(&self, p: usize) -> &[usize] {
        &self.cells[self.offsets[p]..self.offsets[p + 1]]
    }

    /// Number of points covered.
    pub fn num_points(&self) -> usize {
        self.offsets.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::cell_type::CellType;

    #[test]
    fn shared_point_lists_both_cells() {
        let mut g = UnstructuredGrid::new();
        for x in 0..3 {
            g.push_point([x as f64, 0.0, 0.0]);
        }
        g.push_cell(CellType::Line, &[0, 1]).unwrap();
        g.push_cell(CellType::Line, &[1, 2]).unwrap();
        let links = CellLinks::build(&g);
        assert_eq!(links.cells_of(0), &[0]);
        assert_eq!(links.cells_of(1), &[0, 1]);
        assert_eq!(links.cells_of(2), &[1]);
        assert_eq!(links.num_points(), 3);
    }
}
