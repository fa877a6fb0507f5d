//! Merge several grids into one, collapsing shared points.
//!
//! Points are identified either by a global point-id array or, without one,
//! by coordinates within a tolerance. Cells may additionally be filtered by a
//! global cell-id array so a cell received twice is kept once.

use crate::data::grid::UnstructuredGrid;
use crate::geometry::locator::PointLocator;
use crate::mesh_error::MeshError;
use hashbrown::{HashMap, HashSet};

/// How points from different grids are recognised as the same point.
#[derive(Clone, Debug, PartialEq)]
pub enum PointKey {
    /// Single-component `i64` point array with global ids.
    GlobalIds(String),
    /// Coordinates within this distance (`0` = exact).
    Tolerance(f64),
}

#[derive(Clone, Debug)]
pub struct MergeOptions {
    /// Capacity hints; totals over the inputs are used when larger.
    pub upper_bound_points: usize,
    pub upper_bound_cells: usize,
    pub key: PointKey,
    /// Drop cells whose id in this cell array was already merged.
    pub cell_id_array: Option<String>,
}

impl MergeOptions {
    pub fn new(key: PointKey) -> Self {
        Self {
            upper_bound_points: 0,
            upper_bound_cells: 0,
            key,
            cell_id_array: None,
        }
    }

    pub fn with_cell_ids(mut self, name: impl Into<String>) -> Self {
        self.cell_id_array = Some(name.into());
        self
    }
}

enum Dedup<'a> {
    Ids { name: &'a str, seen: HashMap<i64, usize> },
    Coords(PointLocator),
}

/// Merge `grids`. The first non-empty grid fixes the array order; every
/// other non-empty grid must carry the same arrays. Grids without points are
/// skipped, whatever arrays they carry.
pub fn merge(grids: &[UnstructuredGrid], opts: &MergeOptions) -> Result<UnstructuredGrid, MeshError> {
    let Some(first) = grids.iter().find(|g| g.num_points() > 0).or(grids.first()) else {
        return Ok(UnstructuredGrid::new());
    };
    for g in grids.iter().filter(|g| g.num_points() > 0) {
        first.point_data.check_same_schema(&g.point_data)?;
        first.cell_data.check_same_schema(&g.cell_data)?;
    }

    let total_points: usize = grids.iter().map(UnstructuredGrid::num_points).sum();
    let total_cells: usize = grids.iter().map(UnstructuredGrid::num_cells).sum();
    let total_conn: usize = grids.iter().map(UnstructuredGrid::connectivity_len).sum();
    let bound = |hint: usize, total: usize| if hint == 0 { total } else { hint.min(total) };
    let cap_points = bound(opts.upper_bound_points, total_points);
    let cap_cells = bound(opts.upper_bound_cells, total_cells);

    let mut out = UnstructuredGrid::with_capacity(cap_points, cap_cells, total_conn);
    out.point_data = first.point_data.empty_like(cap_points);
    out.cell_data = first.cell_data.empty_like(cap_cells);

    let mut dedup = match &opts.key {
        PointKey::GlobalIds(name) => Dedup::Ids {
            name,
            seen: HashMap::with_capacity(cap_points),
        },
        PointKey::Tolerance(tol) => Dedup::Coords(PointLocator::with_capacity(*tol, cap_points)),
    };
    let mut seen_cells: Option<(&str, HashSet<i64>)> = opts
        .cell_id_array
        .as_deref()
        .map(|name| (name, HashSet::with_capacity(cap_cells)));

    let mut remap = Vec::new();
    let mut nodes = Vec::new();
    for g in grids.iter().filter(|g| g.num_points() > 0) {
        remap.clear();
        remap.reserve(g.num_points());
        match &mut dedup {
            Dedup::Ids { name, seen } => {
                let ids = g.point_data.require_i64(name)?;
                for (p, &gid) in ids.iter().enumerate() {
                    let idx = match seen.get(&gid) {
                        Some(&idx) => idx,
                        None => {
                            let idx = out.push_point(g.point(p));
                            out.point_data.push_tuple_from(&g.point_data, p)?;
                            seen.insert(gid, idx);
                            idx
                        }
                    };
                    remap.push(idx);
                }
            }
            Dedup::Coords(locator) => {
                for (p, xyz) in g.points().iter().enumerate() {
                    let (idx, fresh) = locator.insert_unique(*xyz, out.num_points());
                    if fresh {
                        out.push_point(*xyz);
                        out.point_data.push_tuple_from(&g.point_data, p)?;
                    }
                    remap.push(idx);
                }
            }
        }

        let cell_ids = match &seen_cells {
            Some((name, _)) => Some(g.cell_data.require_i64(name)?),
            None => None,
        };
        for c in 0..g.num_cells() {
            if let (Some(ids), Some((_, seen))) = (cell_ids, seen_cells.as_mut()) {
                if !seen.insert(ids[c]) {
                    continue;
                }
            }
            nodes.clear();
            nodes.extend(g.cell_points(c).iter().map(|&p| remap[p]));
            out.push_cell(g.cell_type(c), &nodes)?;
            out.cell_data.push_tuple_from(&g.cell_data, c)?;
        }
    }

    out.shrink_to_fit();
    log::trace!(
        "merged {} grids: {total_points} -> {} points, {total_cells} -> {} cells",
        grids.len(),
        out.num_points(),
        out.num_cells()
    );
    Ok(out)
}
