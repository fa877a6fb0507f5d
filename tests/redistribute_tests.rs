mod util;

use mesh_redistribute::prelude::*;
use std::collections::HashMap;
use util::*;

#[test]
fn scenario_a_single_rank_is_merged_and_owned() {
    let grid = hex_box([2, 2, 2], [0.0; 3], [1.0; 3]).unwrap();
    // split and glue back so the seam points are duplicated
    let mut glued = scatter(&grid, 0, 2);
    let b = scatter(&grid, 1, 2);
    let base = glued.num_points();
    for p in b.points() {
        glued.push_point(*p);
    }
    for c in 0..b.num_cells() {
        let nodes: Vec<usize> = b.cell_points(c).iter().map(|p| p + base).collect();
        glued.push_cell(b.cell_type(c), &nodes).unwrap();
    }
    assert!(glued.num_points() > 27);

    let out = redistribute(&NoComm, &glued, &RedistributeConfig::default()).unwrap();
    assert_eq!(out.num_cells(), 8);
    assert_eq!(out.num_points(), 27);
    assert!(cell_levels(&out).iter().all(|&l| l == 0));
    assert!(point_levels(&out).iter().all(|&l| l == 0));
}

#[test]
fn scenario_b_two_ranks_one_ghost_level() {
    let grid = tet_box([2, 1, 1], [0.0; 3], [1.0; 3]).unwrap();
    let cfg = RedistributeConfig {
        ghost_level: 1,
        ..Default::default()
    };
    let outs = run_ranks(2, |comm| {
        let input = if comm.rank() == 0 {
            grid.clone()
        } else {
            UnstructuredGrid::new()
        };
        redistribute(comm, &input, &cfg).unwrap()
    });

    for (rank, out) in outs.iter().enumerate() {
        assert_eq!(cells_at(out, 0).len(), 6, "rank {rank} owned");
        assert_eq!(cells_at(out, 1).len(), 6, "rank {rank} ghosts");
        assert_eq!(out.num_points(), 12);
        for c in cells_at(out, 0) {
            let x = out.cell_centroid(c)[0];
            assert_eq!(x < 0.5, rank == 0, "rank {rank} owns centroid x={x}");
        }
        let far = if rank == 0 { 1.0 } else { 0.0 };
        for (p, &l) in out.points().iter().zip(point_levels(out)) {
            assert_eq!(l == 1, p[0] == far, "rank {rank} point {p:?}");
        }
        // temporary cell ids are not part of the output
        assert!(out.cell_data.get(DEFAULT_CELL_IDS).is_none());
        assert!(out.point_data.get(DEFAULT_POINT_IDS).is_some());
    }
}

#[test]
fn unique_policy_keeps_every_cell_exactly_once() {
    let grid = with_cell_ids(hex_box([6, 4, 3], [0.0; 3], [3.0, 2.0, 1.5]).unwrap());
    for n in 2..=4 {
        let cfg = RedistributeConfig {
            ghost_level: 1,
            ..Default::default()
        };
        let outs = run_ranks(n, |comm| {
            redistribute(comm, &scatter(&grid, comm.rank(), n), &cfg).unwrap()
        });
        let mut owned = Vec::new();
        for out in &outs {
            let ids = out.cell_data.require_i64(DEFAULT_CELL_IDS).unwrap();
            let mine: Vec<i64> = cells_at(out, 0).iter().map(|&c| ids[c]).collect();
            for c in cells_at(out, 1) {
                assert!(!mine.contains(&ids[c]), "ghost {} also owned", ids[c]);
            }
            owned.extend(mine);
        }
        assert_permutation(&owned, &(0..72).collect::<Vec<i64>>());
    }
}

#[test]
fn ghost_layers_match_point_adjacency_hops() {
    let grid = with_cell_ids(hex_box([4, 4, 2], [0.0; 3], [4.0, 4.0, 2.0]).unwrap());
    let cases = [
        (4, 2, AssignmentPolicy::Unique),
        (3, 3, AssignmentPolicy::Unique),
        (4, 2, AssignmentPolicy::Duplicate),
    ];
    for (n, k, policy) in cases {
        let cfg = RedistributeConfig {
            ghost_level: k,
            policy,
            ..Default::default()
        };
        let outs = run_ranks(n, |comm| {
            redistribute(comm, &scatter(&grid, comm.rank(), n), &cfg).unwrap()
        });
        for (rank, out) in outs.iter().enumerate() {
            let ids = out.cell_data.require_i64(DEFAULT_CELL_IDS).unwrap();
            let got: HashMap<usize, u8> = ids
                .iter()
                .zip(cell_levels(out))
                .map(|(&id, &l)| (id as usize, l))
                .collect();
            assert_eq!(got.len(), out.num_cells(), "rank {rank}: repeated cell");
            let seeds: Vec<usize> = cells_at(out, 0).iter().map(|&c| ids[c] as usize).collect();
            assert!(!seeds.is_empty(), "rank {rank} owns nothing");
            let want = hop_levels(&grid, &seeds, k);
            assert_eq!(got, want, "{n} ranks, {k} levels, {policy:?}, rank {rank}");
        }
    }
}

#[test]
fn global_point_ids_agree_on_coordinates() {
    let grid = tet_box([3, 3, 2], [0.0; 3], [1.0; 3]).unwrap();
    let cfg = RedistributeConfig {
        ghost_level: 2,
        ..Default::default()
    };
    let outs = run_ranks(3, |comm| {
        redistribute(comm, &scatter(&grid, comm.rank(), 3), &cfg).unwrap()
    });

    let mut by_id: HashMap<i64, [f64; 3]> = HashMap::new();
    let mut by_coord: HashMap<[u64; 3], i64> = HashMap::new();
    for out in &outs {
        let ids = out.point_data.require_i64(DEFAULT_POINT_IDS).unwrap();
        for (p, &gid) in out.points().iter().zip(ids) {
            assert_eq!(*by_id.entry(gid).or_insert(*p), *p, "id {gid}");
            let key = p.map(f64::to_bits);
            assert_eq!(*by_coord.entry(key).or_insert(gid), gid, "point {p:?}");
        }
    }
    assert_eq!(by_id.len(), grid.num_points());
}

#[test]
fn redistributing_twice_moves_nothing() {
    let grid = with_cell_ids(hex_box([4, 4, 2], [0.0; 3], [2.0, 2.0, 1.0]).unwrap());
    let cfg = RedistributeConfig {
        ghost_level: 1,
        retain_partition: true,
        ..Default::default()
    };
    let outs = run_ranks(2, |comm| {
        let mut r = Redistributor::new(cfg.clone());
        let first = r.redistribute(comm, &scatter(&grid, comm.rank(), 2)).unwrap();
        assert!(r.partition().is_some());
        // ghosts of the first pass are dropped on input
        let second = r.redistribute(comm, &first).unwrap();
        (first, second)
    });
    for (first, second) in &outs {
        let owned = |g: &UnstructuredGrid| {
            let ids = g.cell_data.require_i64(DEFAULT_CELL_IDS).unwrap();
            let mut v: Vec<i64> = cells_at(g, 0).iter().map(|&c| ids[c]).collect();
            v.sort_unstable();
            v
        };
        assert_eq!(owned(first), owned(second));
        assert_eq!(first.num_cells(), second.num_cells());
    }
}

#[test]
fn ghost_levels_grow_one_hop_at_a_time() {
    let row = hex_box([6, 1, 1], [0.0; 3], [6.0, 1.0, 1.0]).unwrap();
    let cfg = RedistributeConfig {
        ghost_level: 2,
        ..Default::default()
    };
    let outs = run_ranks(2, |comm| {
        redistribute(comm, &scatter(&row, comm.rank(), 2), &cfg).unwrap()
    });
    assert_eq!(centroid_xs(&outs[0], 0), vec![0.5, 1.5, 2.5]);
    assert_eq!(centroid_xs(&outs[0], 1), vec![3.5]);
    assert_eq!(centroid_xs(&outs[0], 2), vec![4.5]);
    assert_eq!(centroid_xs(&outs[1], 1), vec![2.5]);
    assert_eq!(centroid_xs(&outs[1], 2), vec![1.5]);
    for (p, &l) in outs[0].points().iter().zip(point_levels(&outs[0])) {
        let want = match p[0] {
            x if x <= 3.0 => 0,
            x if x == 4.0 => 1,
            _ => 2,
        };
        assert_eq!(l, want, "point {p:?}");
    }
}

#[test]
fn duplicate_policy_shares_boundary_cells() {
    let row = hex_box([6, 1, 1], [0.0; 3], [6.0, 1.0, 1.0]).unwrap();
    let cfg = RedistributeConfig {
        ghost_level: 1,
        policy: AssignmentPolicy::Duplicate,
        ..Default::default()
    };
    let outs = run_ranks(2, |comm| {
        redistribute(comm, &scatter(&row, comm.rank(), 2), &cfg).unwrap()
    });
    assert_eq!(centroid_xs(&outs[0], 0), vec![0.5, 1.5, 2.5, 3.5]);
    assert_eq!(centroid_xs(&outs[0], 1), vec![4.5]);
    assert_eq!(centroid_xs(&outs[1], 0), vec![2.5, 3.5, 4.5, 5.5]);
    assert_eq!(centroid_xs(&outs[1], 1), vec![1.5]);
}

#[test]
fn scenario_c_clipping_cuts_straddling_cells() {
    let mut grid = tet_box([1, 1, 1], [0.0; 3], [1.0; 3]).unwrap();
    let xs = grid.points().iter().map(|p| p[0]).collect();
    grid.point_data.add(DataArray::from_f64("x", xs)).unwrap();
    grid.cell_data
        .add(DataArray::from_i64("material", vec![7; 6]))
        .unwrap();
    let cfg = RedistributeConfig {
        clip_to_boundary: true,
        retain_partition: true,
        ..Default::default()
    };
    let outs = run_ranks(2, |comm| {
        let input = if comm.rank() == 0 {
            grid.clone()
        } else {
            grid.empty_like()
        };
        let mut r = Redistributor::new(cfg.clone());
        let out = r.redistribute(comm, &input).unwrap();
        let bbox = r.partition().unwrap().process_box(comm.rank()).unwrap();
        (out, bbox)
    });

    let mut volume = 0.0;
    for (out, bbox) in &outs {
        assert!(out.point_data.get(DEFAULT_POINT_IDS).is_none());
        let x = out.point_data.get("x").unwrap().as_f64().unwrap();
        for (p, v) in out.points().iter().zip(x) {
            assert!((p[0] - v).abs() < 1e-12, "interpolated x at {p:?} is {v}");
            for d in 0..3 {
                assert!(p[d] >= bbox.min[d] - 1e-12 && p[d] <= bbox.max[d] + 1e-12);
            }
        }
        let inside = out.cell_data.get(INSIDE_BOX).unwrap().as_u8().unwrap();
        assert!(inside.iter().all(|&f| f == 1));
        assert!(out.cell_data.require_i64("material").unwrap().iter().all(|&m| m == 7));
        volume += (0..out.num_cells()).map(|c| tet_volume(out, c)).sum::<f64>();
    }
    assert!((volume - 1.0).abs() < 1e-9, "clipped volume {volume}");
}

#[test]
fn clipping_with_ghosts_keeps_owned_volume() {
    let grid = tet_box([2, 2, 2], [0.0; 3], [1.0; 3]).unwrap();
    let cfg = RedistributeConfig {
        clip_to_boundary: true,
        ghost_level: 1,
        ..Default::default()
    };
    let outs = run_ranks(2, |comm| {
        redistribute(comm, &scatter(&grid, comm.rank(), 2), &cfg).unwrap()
    });
    let mut owned = 0.0;
    for out in &outs {
        owned += cells_at(out, 0).into_iter().map(|c| tet_volume(out, c)).sum::<f64>();
        assert!(!cells_at(out, 1).is_empty());
        assert!(cell_levels(out).iter().all(|&l| l <= 1));
    }
    assert!((owned - 1.0).abs() < 1e-9, "owned volume {owned}");
}

#[test]
fn text_arrays_are_rejected_on_every_rank() {
    let grid = hex_box([2, 1, 1], [0.0; 3], [2.0, 1.0, 1.0]).unwrap();
    let errs = run_ranks(2, |comm| {
        let mut input = scatter(&grid, comm.rank(), 2);
        if comm.rank() == 0 {
            let names = ArrayValues::Text(vec!["a".into()]);
            input.cell_data.add(DataArray::new("label", 1, names).unwrap()).unwrap();
        }
        redistribute(comm, &input, &RedistributeConfig::default()).unwrap_err()
    });
    assert!(matches!(&errs[0], MeshError::UnsupportedArrayType { name, .. } if name == "label"));
    assert!(matches!(errs[1], MeshError::InvalidConfig(_)));
}

#[test]
fn clipping_needs_one_box_per_rank() {
    let grid = hex_box([8, 2, 1], [0.0; 3], [8.0, 2.0, 1.0]).unwrap();
    let cfg = RedistributeConfig {
        clip_to_boundary: true,
        retain_partition: true,
        partitioner: PartitionerConfig {
            region_count_hint: 4,
            assignment: RegionAssignment::RoundRobin,
            ..Default::default()
        },
        ..Default::default()
    };
    let results = run_ranks(2, |comm| {
        let mut r = Redistributor::new(cfg.clone());
        let err = r
            .redistribute(comm, &scatter(&grid, comm.rank(), 2))
            .unwrap_err();
        (err, r.partition().is_none())
    });
    for (err, untouched) in results {
        assert!(matches!(err, MeshError::NonConvexRegion { rank: 0 }), "{err}");
        assert!(untouched);
    }
}

#[test]
fn explicit_assignment_routes_regions() {
    let row = hex_box([4, 1, 1], [0.0; 3], [4.0, 1.0, 1.0]).unwrap();
    let cfg = RedistributeConfig {
        partitioner: PartitionerConfig {
            region_count_hint: 2,
            assignment: RegionAssignment::Explicit(vec![1, 0]),
            ..Default::default()
        },
        ..Default::default()
    };
    let outs = run_ranks(2, |comm| {
        redistribute(comm, &scatter(&row, comm.rank(), 2), &cfg).unwrap()
    });
    assert_eq!(centroid_xs(&outs[0], 0), vec![2.5, 3.5]);
    assert_eq!(centroid_xs(&outs[1], 0), vec![0.5, 1.5]);
}
