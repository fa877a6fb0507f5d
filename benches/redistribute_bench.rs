use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use mesh_redistribute::algs::clip::clip_to_box;
use mesh_redistribute::algs::submesh::extract;
use mesh_redistribute::algs::{MergeOptions, PointKey, merge};
use mesh_redistribute::prelude::*;

/// `n` shuffled pieces of `grid`, seam points duplicated.
fn shuffled_pieces(grid: &UnstructuredGrid, n: usize, seed: u64) -> Vec<UnstructuredGrid> {
    let mut cells: Vec<usize> = (0..grid.num_cells()).collect();
    cells.shuffle(&mut SmallRng::seed_from_u64(seed));
    cells
        .chunks(cells.len().div_ceil(n))
        .map(|chunk| extract(grid, chunk).unwrap().0)
        .collect()
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    for &div in &[8usize, 16] {
        let grid = hex_box([div; 3], [0.0; 3], [1.0; 3]).unwrap();
        let pieces = shuffled_pieces(&grid, 8, 42);
        group.bench_with_input(BenchmarkId::new("tolerance", div), &pieces, |b, pieces| {
            b.iter(|| merge(pieces, &MergeOptions::new(PointKey::Tolerance(1e-9))).unwrap())
        });
    }
    group.finish();
}

fn bench_clip(c: &mut Criterion) {
    let grid = tet_box([12; 3], [0.0; 3], [1.0; 3]).unwrap();
    let bbox = Aabb::new([0.1, 0.2, 0.3], [0.55, 0.65, 0.95]);
    c.bench_function("clip_to_box tet 12^3", |b| b.iter(|| clip_to_box(&grid, &bbox).unwrap()));
}

fn bench_redistribute(c: &mut Criterion) {
    let mut group = c.benchmark_group("redistribute");
    group.sample_size(10);
    let grid = hex_box([16; 3], [0.0; 3], [1.0; 3]).unwrap();
    for &ranks in &[2usize, 4] {
        let pieces = shuffled_pieces(&grid, ranks, 7);
        let cfg = RedistributeConfig {
            ghost_level: 1,
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::new("ghost1", ranks), &pieces, |b, pieces| {
            b.iter(|| {
                let comms = RayonComm::world(ranks);
                std::thread::scope(|s| {
                    let handles: Vec<_> = comms
                        .iter()
                        .zip(pieces)
                        .map(|(comm, piece)| s.spawn(|| redistribute(comm, piece, &cfg).unwrap()))
                        .collect();
                    handles.into_iter().map(|h| h.join().unwrap().num_cells()).sum::<usize>()
                })
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_merge, bench_clip, bench_redistribute);
criterion_main!(benches);
