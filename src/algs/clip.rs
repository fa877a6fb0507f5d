//! Clip a grid against an axis-aligned box.
//!
//! Cells entirely inside (or entirely outside) the box are copied whole.
//! Straddling cells are split into simplices, which are then cut plane by
//! plane against the six faces of the box. A point exactly on a face counts
//! as inside. Edge points are shared between neighbouring pieces and carry
//! point data interpolated from the edge ends; every piece copies its parent
//! cell's data and gets an [`INSIDE_BOX_ARRAY`] flag.

use crate::algs::merge::{MergeOptions, PointKey, merge};
use crate::algs::submesh::extract;
use crate::data::array::DataArray;
use crate::data::attributes::FieldData;
use crate::data::grid::UnstructuredGrid;
use crate::geometry::aabb::Aabb;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellType;
use crate::topology::links::CellLinks;
use hashbrown::HashMap;

/// `1` on cells inside the clip box, `0` outside.
pub const INSIDE_BOX_ARRAY: &str = "InsideBox";

/// The two halves of a clipped grid.
#[derive(Clone, Debug)]
pub struct ClipOutput {
    pub inside: UnstructuredGrid,
    pub outside: UnstructuredGrid,
}

struct Piece {
    ct: CellType,
    nodes: Vec<usize>,
    parent: usize,
}

type Split = (Vec<Vec<usize>>, Vec<Vec<usize>>);

struct Clipper<'g> {
    grid: &'g UnstructuredGrid,
    bbox: Aabb,
    points: Vec<[f64; 3]>,
    point_data: FieldData,
    edges: HashMap<(usize, usize, usize), usize>,
}

impl<'g> Clipper<'g> {
    /// Signed distance to face `plane`, positive inside.
    fn dist(&self, plane: usize, p: usize) -> f64 {
        let axis = plane / 2;
        let x = self.points[p][axis];
        if plane % 2 == 0 {
            x - self.bbox.min[axis]
        } else {
            self.bbox.max[axis] - x
        }
    }

    /// Point where edge `(i, j)` crosses `plane`; `i` inside, `j` outside.
    fn edge_point(&mut self, i: usize, j: usize, plane: usize) -> usize {
        let (di, dj) = (self.dist(plane, i), self.dist(plane, j));
        if di == 0.0 {
            return i;
        }
        let (lo, hi, dlo, dhi) = if i < j { (i, j, di, dj) } else { (j, i, dj, di) };
        if let Some(&p) = self.edges.get(&(lo, hi, plane)) {
            return p;
        }
        let t = dlo / (dlo - dhi);
        let (a, b) = (self.points[lo], self.points[hi]);
        let id = self.points.len();
        self.points.push([
            a[0] + t * (b[0] - a[0]),
            a[1] + t * (b[1] - a[1]),
            a[2] + t * (b[2] - a[2]),
        ]);
        self.point_data.push_lerp_within(lo, hi, t);
        self.edges.insert((lo, hi, plane), id);
        id
    }

    fn wedge(w: [usize; 6]) -> Vec<Vec<usize>> {
        CellType::Wedge
            .simplices(6)
            .into_iter()
            .map(|t| t.into_iter().map(|l| w[l]).collect())
            .collect()
    }

    /// Cut one simplex by one plane into inside and outside simplices.
    fn split(&mut self, s: &[usize], plane: usize) -> Split {
        let (ins, outs): (Vec<usize>, Vec<usize>) =
            s.iter().copied().partition(|&p| self.dist(plane, p) >= 0.0);
        if outs.is_empty() {
            return (vec![s.to_vec()], vec![]);
        }
        if ins.is_empty() {
            return (vec![], vec![s.to_vec()]);
        }
        match (ins.as_slice(), outs.as_slice()) {
            (&[a], &[b]) => {
                let m = self.edge_point(a, b, plane);
                (vec![vec![a, m]], vec![vec![m, b]])
            }
            (&[a], &[b, c]) => {
                let ab = self.edge_point(a, b, plane);
                let ac = self.edge_point(a, c, plane);
                (vec![vec![a, ab, ac]], vec![vec![ab, b, c], vec![ab, c, ac]])
            }
            (&[a, b], &[c]) => {
                let ac = self.edge_point(a, c, plane);
                let bc = self.edge_point(b, c, plane);
                (vec![vec![a, b, bc], vec![a, bc, ac]], vec![vec![ac, bc, c]])
            }
            (&[a], &[b, c, d]) => {
                let ab = self.edge_point(a, b, plane);
                let ac = self.edge_point(a, c, plane);
                let ad = self.edge_point(a, d, plane);
                (vec![vec![a, ab, ac, ad]], Self::wedge([ab, ac, ad, b, c, d]))
            }
            (&[a, b], &[c, d]) => {
                let ac = self.edge_point(a, c, plane);
                let ad = self.edge_point(a, d, plane);
                let bc = self.edge_point(b, c, plane);
                let bd = self.edge_point(b, d, plane);
                (
                    Self::wedge([a, ac, ad, b, bc, bd]),
                    Self::wedge([c, ac, bc, d, ad, bd]),
                )
            }
            (&[a, b, c], &[d]) => {
                let ad = self.edge_point(a, d, plane);
                let bd = self.edge_point(b, d, plane);
                let cd = self.edge_point(c, d, plane);
                (Self::wedge([a, b, c, ad, bd, cd]), vec![vec![ad, bd, cd, d]])
            }
            // vertices and complete simplices are handled above
            _ => (vec![], vec![s.to_vec()]),
        }
    }

    fn classify(&self, c: usize) -> Option<bool> {
        let nodes = self.grid.cell_points(c);
        if (0..6).all(|pl| nodes.iter().all(|&p| self.dist(pl, p) >= 0.0)) {
            return Some(true);
        }
        let outside = (0..6).any(|pl| {
            nodes.iter().all(|&p| self.dist(pl, p) <= 0.0) && nodes.iter().any(|&p| self.dist(pl, p) < 0.0)
        });
        outside.then_some(false)
    }

    fn assemble(&self, pieces: &[Piece], flag: u8) -> Result<UnstructuredGrid, MeshError> {
        let mut local: HashMap<usize, usize> = HashMap::new();
        let mut order = Vec::new();
        for piece in pieces {
            for &p in &piece.nodes {
                local.entry(p).or_insert_with(|| {
                    order.push(p);
                    order.len() - 1
                });
            }
        }
        let conn = pieces.iter().map(|p| p.nodes.len()).sum();
        let mut out = UnstructuredGrid::with_capacity(order.len(), pieces.len(), conn);
        for &p in &order {
            out.push_point(self.points[p]);
        }
        let mut nodes = Vec::new();
        for piece in pieces {
            nodes.clear();
            nodes.extend(piece.nodes.iter().map(|p| local[p]));
            out.push_cell(piece.ct, &nodes)?;
        }
        out.point_data = self.point_data.gather(&order);
        let parents: Vec<usize> = pieces.iter().map(|p| p.parent).collect();
        out.cell_data = self.grid.cell_data.gather(&parents);
        out.cell_data
            .set(DataArray::from_u8(INSIDE_BOX_ARRAY, vec![flag; pieces.len()]));
        Ok(out)
    }
}

fn degenerate(s: &[usize]) -> bool {
    (1..s.len()).any(|i| s[..i].contains(&s[i]))
}

/// Split `grid` into the parts inside and outside `bbox`.
pub fn clip_to_box(grid: &UnstructuredGrid, bbox: &Aabb) -> Result<ClipOutput, MeshError> {
    let mut clipper = Clipper {
        grid,
        bbox: *bbox,
        points: grid.points().to_vec(),
        point_data: grid.point_data.clone(),
        edges: HashMap::new(),
    };
    let mut inside = Vec::new();
    let mut outside = Vec::new();
    let mut straddling = 0usize;

    for c in 0..grid.num_cells() {
        let ct = grid.cell_type(c);
        match clipper.classify(c) {
            Some(true) => inside.push(Piece {
                ct,
                nodes: grid.cell_points(c).to_vec(),
                parent: c,
            }),
            Some(false) => outside.push(Piece {
                ct,
                nodes: grid.cell_points(c).to_vec(),
                parent: c,
            }),
            None => {
                straddling += 1;
                let nodes = grid.cell_points(c);
                let simplex = CellType::simplex_of_dimension(ct.dimension());
                let mut keep: Vec<Vec<usize>> = ct
                    .simplices(nodes.len())
                    .into_iter()
                    .map(|s| s.into_iter().map(|l| nodes[l]).collect())
                    .collect();
                for plane in 0..6 {
                    let mut next = Vec::with_capacity(keep.len());
                    for s in &keep {
                        let (ins, outs) = clipper.split(s, plane);
                        next.extend(ins);
                        outside.extend(outs.into_iter().filter(|s| !degenerate(s)).map(|s| Piece {
                            ct: simplex,
                            nodes: s,
                            parent: c,
                        }));
                    }
                    keep = next;
                }
                inside.extend(keep.into_iter().filter(|s| !degenerate(s)).map(|s| Piece {
                    ct: simplex,
                    nodes: s,
                    parent: c,
                }));
            }
        }
    }
    log::debug!(
        "clip: {} cells -> {} inside, {} outside pieces ({straddling} cut)",
        grid.num_cells(),
        inside.len(),
        outside.len()
    );
    Ok(ClipOutput {
        inside: clipper.assemble(&inside, 1)?,
        outside: clipper.assemble(&outside, 0)?,
    })
}

/// Join the clip halves for a rank that keeps `levels` ghost levels.
///
/// Inside pieces become level 0, outside pieces level `max(parent, 1)`;
/// pieces beyond `levels` are dropped and every point takes the lowest level
/// of the cells using it.
pub fn combine_with_ghosts(
    clipped: ClipOutput,
    levels: u8,
    ghost_levels: &str,
    tolerance: f64,
) -> Result<UnstructuredGrid, MeshError> {
    let ClipOutput { mut inside, outside } = clipped;
    let n_inside = inside.num_cells();
    inside
        .cell_data
        .set(DataArray::from_u8(ghost_levels, vec![0; n_inside]));

    let parent_levels: Vec<u8> = match outside.cell_data.get(ghost_levels).and_then(DataArray::as_u8) {
        Some(l) => l.to_vec(),
        None => vec![0; outside.num_cells()],
    };
    let kept: Vec<usize> = (0..outside.num_cells())
        .filter(|&c| parent_levels[c].max(1) <= levels)
        .collect();
    let (mut outside, _) = extract(&outside, &kept)?;
    let out_levels: Vec<u8> = kept.iter().map(|&c| parent_levels[c].max(1)).collect();
    outside
        .cell_data
        .set(DataArray::from_u8(ghost_levels, out_levels));
    for g in [&mut inside, &mut outside] {
        let n = g.num_points();
        g.point_data.set(DataArray::from_u8(ghost_levels, vec![0; n]));
    }

    let mut grid = merge(&[inside, outside], &MergeOptions::new(PointKey::Tolerance(tolerance)))?;
    let cell_levels = grid
        .cell_data
        .require(ghost_levels)?
        .as_u8()
        .ok_or_else(|| MeshError::ArrayTypeMismatch {
            name: ghost_levels.to_string(),
            expected: "u8",
        })?
        .to_vec();
    let links = CellLinks::build(&grid);
    let point_levels: Vec<u8> = (0..grid.num_points())
        .map(|p| {
            links
                .cells_of(p)
                .iter()
                .map(|&c| cell_levels[c])
                .min()
                .unwrap_or(0)
        })
        .collect();
    grid.point_data
        .set(DataArray::from_u8(ghost_levels, point_levels));
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::meshgen::{hex_box, tet_box};

    fn tet_volume(g: &UnstructuredGrid, c: usize) -> f64 {
        let p: Vec<[f64; 3]> = g.cell_points(c).iter().map(|&i| g.point(i)).collect();
        let e = |k: usize| [p[k][0] - p[0][0], p[k][1] - p[0][1], p[k][2] - p[0][2]];
        let (a, b, d) = (e(1), e(2), e(3));
        (a[0] * (b[1] * d[2] - b[2] * d[1]) - a[1] * (b[0] * d[2] - b[2] * d[0])
            + a[2] * (b[0] * d[1] - b[1] * d[0]))
            .abs()
            / 6.0
    }

    #[test]
    fn straddling_hex_is_cut_with_volume_preserved() {
        let mut g = hex_box([1, 1, 1], [0.0; 3], [1.0; 3]).unwrap();
        g.point_data
            .add(DataArray::from_f64("x", g.points().iter().map(|p| p[0]).collect()))
            .unwrap();
        g.cell_data.add(DataArray::from_i64("cid", vec![77])).unwrap();
        let bbox = Aabb::new([-1.0; 3], [0.25, 2.0, 2.0]);
        let out = clip_to_box(&g, &bbox).unwrap();

        let vin: f64 = (0..out.inside.num_cells()).map(|c| tet_volume(&out.inside, c)).sum();
        let vout: f64 = (0..out.outside.num_cells()).map(|c| tet_volume(&out.outside, c)).sum();
        assert!((vin - 0.25).abs() < 1e-12, "{vin}");
        assert!((vout - 0.75).abs() < 1e-12, "{vout}");
        assert!(out.inside.points().iter().all(|p| p[0] <= 0.25 + 1e-12));

        // interpolated data matches the coordinate it was sampled from
        let x = out.inside.point_data.get("x").unwrap().as_f64().unwrap();
        for (p, v) in out.inside.points().iter().zip(x) {
            assert!((p[0] - v).abs() < 1e-12);
        }
        let flags = out.inside.cell_data.get(INSIDE_BOX_ARRAY).unwrap().as_u8().unwrap();
        assert!(flags.iter().all(|&f| f == 1));
        assert!(out.inside.cell_data.require_i64("cid").unwrap().iter().all(|&c| c == 77));
    }

    #[test]
    fn whole_cells_are_copied() {
        let g = tet_box([2, 1, 1], [0.0; 3], [2.0, 1.0, 1.0]).unwrap();
        let bbox = Aabb::new([0.0; 3], [1.0, 1.0, 1.0]);
        let out = clip_to_box(&g, &bbox).unwrap();
        assert_eq!(out.inside.num_cells(), 6);
        assert_eq!(out.outside.num_cells(), 6);
        assert_eq!(out.inside.num_points(), 8);
    }

    #[test]
    fn ghosts_keep_outside_pieces_as_level_one() {
        let g = hex_box([2, 1, 1], [0.0; 3], [2.0, 1.0, 1.0]).unwrap();
        let bbox = Aabb::new([0.0; 3], [0.5, 1.0, 1.0]);
        let out = clip_to_box(&g, &bbox).unwrap();
        let combined = combine_with_ghosts(out.clone(), 1, "GhostLevels", 1e-9).unwrap();
        let cl = combined.cell_data.get("GhostLevels").unwrap().as_u8().unwrap();
        assert_eq!(cl.iter().filter(|&&l| l == 0).count(), out.inside.num_cells());
        assert_eq!(cl.iter().filter(|&&l| l == 1).count(), out.outside.num_cells());
        let pl = combined.point_data.get("GhostLevels").unwrap().as_u8().unwrap();
        for (p, &l) in combined.points().iter().zip(pl) {
            assert_eq!(l == 0, p[0] <= 0.5 + 1e-12, "point {p:?} level {l}");
        }
        let none = combine_with_ghosts(out, 0, "GhostLevels", 1e-9).unwrap();
        assert!(none.num_cells() > 0);
        assert!(none.points().iter().all(|p| p[0] <= 0.5 + 1e-12));
    }
}
