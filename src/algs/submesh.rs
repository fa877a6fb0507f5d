//! Cell-subset extraction.

use crate::data::grid::UnstructuredGrid;
use crate::mesh_error::MeshError;
use hashbrown::HashMap;

/// Bidirectional mapping between parent and sub-grid point indices.
#[derive(Debug, Clone, Default)]
pub struct PointMap {
    pub parent_to_sub: HashMap<usize, usize>,
    pub sub_to_parent: Vec<usize>,
}

/// Extract `cells` (in the given order) into an independent grid.
///
/// Points used by the selected cells are renumbered `0..n` in first-use
/// order and every point and cell array is carried over. An empty selection
/// yields a schema-only grid: same arrays, zero rows.
pub fn extract(grid: &UnstructuredGrid, cells: &[usize]) -> Result<(UnstructuredGrid, PointMap), MeshError> {
    let mut map = PointMap::default();
    let mut conn_len = 0;
    for &c in cells {
        if c >= grid.num_cells() {
            return Err(MeshError::InvalidConfig(format!(
                "cell {c} out of range for grid with {} cells",
                grid.num_cells()
            )));
        }
        let nodes = grid.cell_points(c);
        conn_len += nodes.len();
        for &p in nodes {
            map.parent_to_sub.entry(p).or_insert_with(|| {
                map.sub_to_parent.push(p);
                map.sub_to_parent.len() - 1
            });
        }
    }

    let mut sub = UnstructuredGrid::with_capacity(map.sub_to_parent.len(), cells.len(), conn_len);
    for &p in &map.sub_to_parent {
        sub.push_point(grid.point(p));
    }
    let mut local = Vec::new();
    for &c in cells {
        local.clear();
        local.extend(grid.cell_points(c).iter().map(|p| map.parent_to_sub[p]));
        sub.push_cell(grid.cell_type(c), &local)?;
    }
    sub.point_data = grid.point_data.gather(&map.sub_to_parent);
    sub.cell_data = grid.cell_data.gather(cells);
    Ok((sub, map))
}
