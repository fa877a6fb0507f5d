//! Spatial partitioning: a k-d tree over cell centroids whose leaves are the
//! regions handed out to ranks.
//!
//! The partition is built collectively. Every rank contributes a (possibly
//! thinned) sample of its cell centroids plus its point bounds; the gathered
//! sample is identical on every rank, so each rank builds the same tree
//! without further coordination.

pub mod kdtree;

pub use kdtree::KdTree;

use crate::algs::communicator::Communicator;
use crate::algs::exchange::{all_gather_payload, all_reduce_sum_vec, tags};
use crate::data::grid::UnstructuredGrid;
use crate::geometry::aabb::Aabb;
use crate::mesh_error::MeshError;
use serde::{Deserialize, Serialize};

/// How regions (leaves, in depth-first order) map to ranks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionAssignment {
    /// Rank `p` gets leaves `[p*R/N, (p+1)*R/N)`.
    #[default]
    Contiguous,
    /// Leaf `r` goes to rank `r mod N`.
    RoundRobin,
    /// `table[r]` is the owner of leaf `r`.
    Explicit(Vec<usize>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionerConfig {
    /// Requested region count; the tree has `max(hint, ranks)` leaves.
    pub region_count_hint: usize,
    pub assignment: RegionAssignment,
    /// Centroids contributed per rank; `0` keeps every centroid.
    pub sample_cap: usize,
}

impl Default for PartitionerConfig {
    fn default() -> Self {
        Self {
            region_count_hint: 1,
            assignment: RegionAssignment::Contiguous,
            sample_cap: 0,
        }
    }
}

/// Regions, their owners and global per-region cell counts.
#[derive(Clone, Debug)]
pub struct SpatialPartition {
    tree: KdTree,
    owners: Vec<usize>,
    by_process: Vec<Vec<usize>>,
    cell_counts: Vec<u64>,
    bounds: Aabb,
}

/// Every `stride`-th centroid so that at most `cap` remain.
fn thin(mut sample: Vec<[f64; 3]>, cap: usize) -> Vec<[f64; 3]> {
    if cap == 0 || sample.len() <= cap {
        return sample;
    }
    let stride = sample.len().div_ceil(cap);
    sample = sample.into_iter().step_by(stride).collect();
    sample
}

fn owners_for(assignment: &RegionAssignment, regions: usize, procs: usize) -> Result<Vec<usize>, MeshError> {
    match assignment {
        RegionAssignment::Contiguous => {
            let mut owners = vec![0; regions];
            for p in 0..procs {
                for owner in &mut owners[p * regions / procs..(p + 1) * regions / procs] {
                    *owner = p;
                }
            }
            Ok(owners)
        }
        RegionAssignment::RoundRobin => Ok((0..regions).map(|r| r % procs).collect()),
        RegionAssignment::Explicit(table) => {
            if table.len() != regions {
                return Err(MeshError::InvalidRegionAssignment(format!(
                    "{} entries for {regions} regions",
                    table.len()
                )));
            }
            if let Some((r, &p)) = table.iter().enumerate().find(|&(_, &p)| p >= procs) {
                return Err(MeshError::InvalidRegionAssignment(format!(
                    "region {r} assigned to rank {p}, but only {procs} ranks exist"
                )));
            }
            Ok(table.clone())
        }
    }
}

/// Measure of `b` over the axes on which `domain` has extent.
fn measure(b: &Aabb, domain: &Aabb) -> f64 {
    (0..3)
        .filter(|&d| domain.max[d] > domain.min[d])
        .map(|d| (b.max[d] - b.min[d]).max(0.0))
        .product()
}

impl SpatialPartition {
    /// Collective build. All ranks must call this with the same config.
    pub fn build<C: Communicator>(
        comm: &C,
        grid: &UnstructuredGrid,
        cfg: &PartitionerConfig,
    ) -> Result<Self, MeshError> {
        if cfg.region_count_hint == 0 {
            return Err(MeshError::InvalidRegionCount(0));
        }
        let procs = comm.size();
        let regions = cfg.region_count_hint.max(procs);
        // validated before any communication so every rank fails together
        let owners = owners_for(&cfg.assignment, regions, procs)?;

        let centroids = grid.cell_centroids();
        let local_sample = thin(centroids.clone(), cfg.sample_cap);
        let local_bounds: Vec<[f64; 3]> = grid.bounds().map(|b| vec![b.min, b.max]).unwrap_or_default();

        let mut bounds = Aabb::empty();
        for b in all_gather_payload(comm, tags::PARTITION_SAMPLE, local_bounds)? {
            if let [lo, hi] = b.as_slice() {
                bounds.expand(lo);
                bounds.expand(hi);
            }
        }
        let mut sample: Vec<[f64; 3]> = all_gather_payload(comm, tags::PARTITION_SAMPLE.offset(2), local_sample)?
            .into_iter()
            .flatten()
            .collect();
        log::debug!(
            "[rank {}] partition sample: {} centroids, {regions} regions",
            comm.rank(),
            sample.len()
        );

        let tree = KdTree::build(bounds, &mut sample, regions);

        let mut local_counts = vec![0u64; regions];
        for c in &centroids {
            local_counts[tree.locate(c)] += 1;
        }
        let cell_counts = all_reduce_sum_vec(comm, tags::REGION_COUNTS, local_counts)?;
        if cell_counts.iter().all(|&c| c == 0) {
            return Err(MeshError::EmptyInput);
        }

        let mut by_process = vec![Vec::new(); procs];
        for (r, &p) in owners.iter().enumerate() {
            by_process[p].push(r);
        }
        Ok(Self {
            tree,
            owners,
            by_process,
            cell_counts,
            bounds,
        })
    }

    pub fn num_regions(&self) -> usize {
        self.owners.len()
    }

    pub fn num_processes(&self) -> usize {
        self.by_process.len()
    }

    /// Bounds of all points on all ranks at build time.
    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn regions_for_process(&self, p: usize) -> &[usize] {
        &self.by_process[p]
    }

    /// Leaf containing `xyz` (half-open: faces belong to the lower leaf).
    #[inline]
    pub fn region_containing(&self, xyz: &[f64; 3]) -> usize {
        self.tree.locate(xyz)
    }

    #[inline]
    pub fn owner_of(&self, region: usize) -> usize {
        self.owners[region]
    }

    #[inline]
    pub fn owner_of_point(&self, xyz: &[f64; 3]) -> usize {
        self.owners[self.tree.locate(xyz)]
    }

    pub fn region_bounds(&self, region: usize) -> &Aabb {
        self.tree.region_bounds(region)
    }

    /// Global number of cells whose centroid lies in `region`.
    pub fn cell_count(&self, region: usize) -> u64 {
        self.cell_counts[region]
    }

    /// Regions whose closed box intersects `b`, ascending.
    pub fn regions_touching(&self, b: &Aabb) -> Vec<usize> {
        let mut out = Vec::new();
        self.tree.touching(b, &mut out);
        out.sort_unstable();
        out
    }

    /// Region of every local cell, by centroid.
    pub fn cell_regions(&self, grid: &UnstructuredGrid) -> Vec<usize> {
        grid.cell_centroids()
            .iter()
            .map(|c| self.tree.locate(c))
            .collect()
    }

    /// Local cells whose centroid lies in `region`.
    pub fn cells_in(&self, grid: &UnstructuredGrid, region: usize) -> Vec<usize> {
        (0..grid.num_cells())
            .filter(|&c| self.tree.locate(&grid.cell_centroid(c)) == region)
            .collect()
    }

    /// Local cells touching the closed box of `region` whose centroid lies
    /// elsewhere.
    pub fn boundary_cells_in(&self, grid: &UnstructuredGrid, region: usize) -> Vec<usize> {
        let rb = self.tree.region_bounds(region);
        (0..grid.num_cells())
            .filter(|&c| {
                self.tree.locate(&grid.cell_centroid(c)) != region
                    && grid.cell_bounds(c).intersects_closed(rb)
            })
            .collect()
    }

    /// Combined box of `p`'s regions when they tile one box.
    pub fn process_box(&self, p: usize) -> Option<Aabb> {
        let regions = self.by_process.get(p)?;
        let first = regions.first()?;
        let mut combined = *self.tree.region_bounds(*first);
        let mut sum = 0.0;
        for &r in regions {
            let b = self.tree.region_bounds(r);
            combined = combined.union(b);
            sum += measure(b, &self.bounds);
        }
        let whole = measure(&combined, &self.bounds);
        ((whole - sum).abs() <= 1e-9 * whole.max(f64::MIN_POSITIVE)).then_some(combined)
    }

    /// True when every rank with regions owns a single box.
    pub fn all_process_regions_convex(&self) -> bool {
        self.check_convex().is_ok()
    }

    /// `NonConvexRegion` naming the first rank whose regions are not a box.
    pub fn check_convex(&self) -> Result<(), MeshError> {
        for p in 0..self.num_processes() {
            if !self.by_process[p].is_empty() && self.process_box(p).is_none() {
                return Err(MeshError::NonConvexRegion { rank: p });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::algs::meshgen::hex_box;

    #[test]
    fn single_rank_multi_region() {
        let g = hex_box([4, 2, 1], [0.0; 3], [2.0, 1.0, 0.5]).unwrap();
        let cfg = PartitionerConfig {
            region_count_hint: 4,
            ..Default::default()
        };
        let part = SpatialPartition::build(&NoComm, &g, &cfg).unwrap();
        assert_eq!(part.num_regions(), 4);
        assert_eq!((0..4).map(|r| part.cell_count(r)).sum::<u64>(), 8);
        assert_eq!(part.regions_for_process(0), &[0, 1, 2, 3]);
        assert!(part.all_process_regions_convex());
        let all: usize = (0..4).map(|r| part.cells_in(&g, r).len()).sum();
        assert_eq!(all, 8);
    }

    #[test]
    fn boundary_cells_straddle_the_cut() {
        // centroids at x = 0.5..3.5, so the single cut lands at x = 2
        let g = hex_box([4, 1, 1], [0.0; 3], [4.0, 1.0, 1.0]).unwrap();
        let cfg = PartitionerConfig {
            region_count_hint: 2,
            ..Default::default()
        };
        let part = SpatialPartition::build(&NoComm, &g, &cfg).unwrap();
        assert_eq!(part.cells_in(&g, 0), vec![0, 1]);
        assert_eq!(part.cells_in(&g, 1), vec![2, 3]);
        assert_eq!(part.boundary_cells_in(&g, 0), vec![2]);
        assert_eq!(part.boundary_cells_in(&g, 1), vec![1]);
        assert_eq!(part.cell_regions(&g), vec![0, 0, 1, 1]);
    }

    #[test]
    fn explicit_table_is_validated() {
        let g = hex_box([2, 1, 1], [0.0; 3], [1.0; 3]).unwrap();
        let cfg = PartitionerConfig {
            region_count_hint: 2,
            assignment: RegionAssignment::Explicit(vec![0, 1]),
            ..Default::default()
        };
        let err = SpatialPartition::build(&NoComm, &g, &cfg).unwrap_err();
        assert!(matches!(err, MeshError::InvalidRegionAssignment(_)));
        let zero = PartitionerConfig {
            region_count_hint: 0,
            ..Default::default()
        };
        assert!(SpatialPartition::build(&NoComm, &g, &zero).unwrap_err().is_configuration());
    }

    #[test]
    fn empty_input_is_rejected() {
        let g = UnstructuredGrid::new();
        let err = SpatialPartition::build(&NoComm, &g, &PartitionerConfig::default()).unwrap_err();
        assert!(matches!(err, MeshError::EmptyInput));
    }

    #[test]
    fn contiguous_and_round_robin_tables() {
        assert_eq!(owners_for(&RegionAssignment::Contiguous, 5, 2).unwrap(), vec![0, 0, 1, 1, 1]);
        assert_eq!(owners_for(&RegionAssignment::RoundRobin, 5, 2).unwrap(), vec![0, 1, 0, 1, 0]);
        assert_eq!(thin((0..10).map(|i| [i as f64; 3]).collect(), 4).len(), 4);
    }
}
