#![allow(dead_code)]
use mesh_redistribute::algs::submesh::extract;
use mesh_redistribute::prelude::*;
use std::collections::HashMap;

/// Run `f` once per rank of a private `n`-rank world, one thread each, and
/// collect the results by rank.
pub fn run_ranks<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&RayonComm) -> T + Sync,
{
    let comms = RayonComm::world(n);
    std::thread::scope(|s| {
        let handles: Vec<_> = comms.iter().map(|c| s.spawn(|| f(c))).collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    })
}

/// Deal the cells of `grid` out to `n` ranks by index, so every rank's input
/// is scattered over the whole domain.
pub fn scatter(grid: &UnstructuredGrid, rank: usize, n: usize) -> UnstructuredGrid {
    let cells: Vec<usize> = (0..grid.num_cells()).filter(|c| c % n == rank).collect();
    extract(grid, &cells).unwrap().0
}

/// `grid` with `GlobalCellIds` = 0..n.
pub fn with_cell_ids(mut grid: UnstructuredGrid) -> UnstructuredGrid {
    let n = grid.num_cells() as i64;
    grid.cell_data
        .set(DataArray::from_i64(DEFAULT_CELL_IDS, (0..n).collect()));
    grid
}

pub fn cell_levels(grid: &UnstructuredGrid) -> &[u8] {
    grid.cell_data.get(GHOST_LEVELS).unwrap().as_u8().unwrap()
}

pub fn point_levels(grid: &UnstructuredGrid) -> &[u8] {
    grid.point_data.get(GHOST_LEVELS).unwrap().as_u8().unwrap()
}

/// Cells of `grid` at ghost level `level`.
pub fn cells_at(grid: &UnstructuredGrid, level: u8) -> Vec<usize> {
    let levels = cell_levels(grid);
    (0..grid.num_cells()).filter(|&c| levels[c] == level).collect()
}

/// Sorted centroid x-coordinates of the cells at `level`.
pub fn centroid_xs(grid: &UnstructuredGrid, level: u8) -> Vec<f64> {
    let mut xs: Vec<f64> = cells_at(grid, level)
        .into_iter()
        .map(|c| grid.cell_centroid(c)[0])
        .collect();
    xs.sort_by(f64::total_cmp);
    xs
}

/// Hop distance from `seeds` to every cell of `grid` within `max` hops,
/// where cells sharing a point are one hop apart. Cells are keyed by index.
pub fn hop_levels(grid: &UnstructuredGrid, seeds: &[usize], max: u8) -> HashMap<usize, u8> {
    let mut point_cells = vec![Vec::new(); grid.num_points()];
    for c in 0..grid.num_cells() {
        for &p in grid.cell_points(c) {
            point_cells[p].push(c);
        }
    }
    let mut levels: HashMap<usize, u8> = seeds.iter().map(|&c| (c, 0)).collect();
    let mut frontier = seeds.to_vec();
    for level in 1..=max {
        let mut next = Vec::new();
        for c in frontier {
            for &p in grid.cell_points(c) {
                for &nb in &point_cells[p] {
                    if !levels.contains_key(&nb) {
                        levels.insert(nb, level);
                        next.push(nb);
                    }
                }
            }
        }
        frontier = next;
    }
    levels
}

/// Absolute volume of a tetrahedron cell.
pub fn tet_volume(grid: &UnstructuredGrid, c: usize) -> f64 {
    let p: Vec<[f64; 3]> = grid.cell_points(c).iter().map(|&i| grid.point(i)).collect();
    let e = |k: usize| [p[k][0] - p[0][0], p[k][1] - p[0][1], p[k][2] - p[0][2]];
    let (a, b, d) = (e(1), e(2), e(3));
    (a[0] * (b[1] * d[2] - b[2] * d[1]) - a[1] * (b[0] * d[2] - b[2] * d[0])
        + a[2] * (b[0] * d[1] - b[1] * d[0]))
        .abs()
        / 6.0
}

/// Assert vec is a permutation of another vec (order-agnostic).
pub fn assert_permutation<T: Ord + Copy + std::fmt::Debug>(got: &[T], want: &[T]) {
    let mut a = got.to_vec();
    a.sort_unstable();
    let mut b = want.to_vec();
    b.sort_unstable();
    assert_eq!(a, b, "not a permutation\n got={:?}\nwant={:?}", got, want);
}
