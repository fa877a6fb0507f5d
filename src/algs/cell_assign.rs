//! Per-rank cell selection and sub-grid extraction.

use crate::algs::redistribute::AssignmentPolicy;
use crate::algs::submesh::{PointMap, extract};
use crate::data::grid::UnstructuredGrid;
use crate::mesh_error::MeshError;
use crate::partitioning::SpatialPartition;

/// Local cell ids destined for each rank.
///
/// A cell goes to the owner of the region holding its centroid. Under
/// [`AssignmentPolicy::Duplicate`] it also goes to the owner of every region
/// whose closed box meets the cell's bounds.
pub fn cells_per_rank(
    part: &SpatialPartition,
    grid: &UnstructuredGrid,
    policy: AssignmentPolicy,
) -> Vec<Vec<usize>> {
    let mut out = vec![Vec::new(); part.num_processes()];
    let mut ranks = Vec::new();
    for (c, region) in part.cell_regions(grid).into_iter().enumerate() {
        let home = part.owner_of(region);
        match policy {
            AssignmentPolicy::Unique => out[home].push(c),
            AssignmentPolicy::Duplicate => {
                ranks.clear();
                ranks.push(home);
                ranks.extend(
                    part.regions_touching(&grid.cell_bounds(c))
                        .into_iter()
                        .map(|r| part.owner_of(r)),
                );
                ranks.sort_unstable();
                ranks.dedup();
                for &p in &ranks {
                    out[p].push(c);
                }
            }
        }
    }
    out
}

/// One independent sub-grid per rank, with the map from its points back to
/// `grid`'s. Ranks without cells get a schema-only grid.
pub fn split_for_ranks(
    part: &SpatialPartition,
    grid: &UnstructuredGrid,
    policy: AssignmentPolicy,
) -> Result<Vec<(UnstructuredGrid, PointMap)>, MeshError> {
    cells_per_rank(part, grid, policy)
        .iter()
        .map(|cells| extract(grid, cells))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::algs::meshgen::hex_box;
    use crate::partitioning::PartitionerConfig;

    #[test]
    fn single_rank_gets_everything_once() {
        let g = hex_box([3, 2, 1], [0.0; 3], [3.0, 2.0, 1.0]).unwrap();
        let cfg = PartitionerConfig {
            region_count_hint: 3,
            ..Default::default()
        };
        let part = SpatialPartition::build(&NoComm, &g, &cfg).unwrap();
        for policy in [AssignmentPolicy::Unique, AssignmentPolicy::Duplicate] {
            let per = cells_per_rank(&part, &g, policy);
            assert_eq!(per, vec![(0..6).collect::<Vec<_>>()]);
        }
        let subs = split_for_ranks(&part, &g, AssignmentPolicy::Unique).unwrap();
        let (sub, map) = &subs[0];
        assert_eq!(sub.num_points(), g.num_points());
        for (local, &parent) in map.sub_to_parent.iter().enumerate() {
            assert_eq!(sub.points()[local], g.points()[parent]);
            assert_eq!(map.parent_to_sub[&parent], local);
        }
    }
}
