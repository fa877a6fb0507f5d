//! The redistribution driver.
//!
//! Every rank calls [`Redistributor::redistribute`] with its local piece of
//! the input. The call is collective: all ranks run the same phases in the
//! same order and exchange zero-length payloads when they have nothing to
//! contribute.
//!
//! Phases: validate, partition, split, exchange, merge, global point ids,
//! ghost levels, clip. Each phase is timed at `debug` level.

use crate::algs::cell_assign::split_for_ranks;
use crate::algs::clip::{clip_to_box, combine_with_ghosts};
use crate::algs::communicator::Communicator;
use crate::algs::exchange::{all_reduce_sum_vec, exchange, tags};
use crate::algs::ghost::{GhostOptions, add_ghost_levels, tag_levels};
use crate::algs::global_ids::{assign_cell_ids, assign_point_ids};
use crate::algs::merge::{MergeOptions, PointKey, merge};
use crate::algs::submesh::extract;
use crate::data::array::DataArray;
use crate::data::grid::UnstructuredGrid;
use crate::mesh_error::MeshError;
use crate::partitioning::{PartitionerConfig, SpatialPartition};
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const DEFAULT_POINT_IDS: &str = "GlobalPointIds";
pub const DEFAULT_CELL_IDS: &str = "GlobalCellIds";
/// `u8` level array on points and cells; `0` = owned.
pub const GHOST_LEVELS: &str = "GhostLevels";
pub use crate::algs::clip::INSIDE_BOX_ARRAY as INSIDE_BOX;

/// Which ranks receive a cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignmentPolicy {
    /// Only the owner of the region holding the centroid.
    #[default]
    Unique,
    /// Additionally the owner of every region the cell's bounds touch.
    Duplicate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedistributeConfig {
    /// Number of ghost-cell rings to add around each rank's cells.
    pub ghost_level: u8,
    pub policy: AssignmentPolicy,
    /// Cut cells at the rank's box; forces [`AssignmentPolicy::Duplicate`].
    pub clip_to_boundary: bool,
    pub global_point_id_array: Option<String>,
    pub global_cell_id_array: Option<String>,
    /// Distance under which points without global ids are merged.
    pub merge_tolerance: f64,
    /// Keep the partition and reuse it on the next call.
    pub retain_partition: bool,
    pub partitioner: PartitionerConfig,
}

impl Default for RedistributeConfig {
    fn default() -> Self {
        Self {
            ghost_level: 0,
            policy: AssignmentPolicy::Unique,
            clip_to_boundary: false,
            global_point_id_array: None,
            global_cell_id_array: None,
            merge_tolerance: 0.0,
            retain_partition: false,
            partitioner: PartitionerConfig::default(),
        }
    }
}

impl RedistributeConfig {
    pub fn point_ids(&self) -> &str {
        self.global_point_id_array.as_deref().unwrap_or(DEFAULT_POINT_IDS)
    }

    pub fn cell_ids(&self) -> &str {
        self.global_cell_id_array.as_deref().unwrap_or(DEFAULT_CELL_IDS)
    }

    /// Policy actually used; clipping needs every cell touching the box.
    pub fn effective_policy(&self) -> AssignmentPolicy {
        if self.clip_to_boundary {
            AssignmentPolicy::Duplicate
        } else {
            self.policy
        }
    }
}

/// Facts about the local input every rank votes on before communicating.
struct Prepared {
    grid: UnstructuredGrid,
    has_point_ids: bool,
    has_cell_ids: bool,
}

/// Local checks, then removal of ghost cells left over from an earlier run.
fn prepare(input: &UnstructuredGrid, cfg: &RedistributeConfig) -> Result<Prepared, MeshError> {
    if !cfg.merge_tolerance.is_finite() || cfg.merge_tolerance < 0.0 {
        return Err(MeshError::InvalidConfig(format!(
            "merge tolerance must be finite and non-negative, got {}",
            cfg.merge_tolerance
        )));
    }
    input.validate()?;
    input.point_data.check_serializable()?;
    input.cell_data.check_serializable()?;
    let has_point_ids = input.point_data.contains(cfg.point_ids());
    if has_point_ids {
        input.point_data.require_i64(cfg.point_ids())?;
    }
    let has_cell_ids = input.cell_data.contains(cfg.cell_ids());
    if has_cell_ids {
        input.cell_data.require_i64(cfg.cell_ids())?;
    }

    let mut grid = match input.cell_data.get(GHOST_LEVELS) {
        None => input.clone(),
        Some(levels) => {
            let levels = levels.as_u8().ok_or_else(|| MeshError::ArrayTypeMismatch {
                name: GHOST_LEVELS.to_string(),
                expected: "u8",
            })?;
            let owned: Vec<usize> = (0..levels.len()).filter(|&c| levels[c] == 0).collect();
            if owned.len() < levels.len() {
                log::debug!("dropping {} input ghost cells", levels.len() - owned.len());
            }
            extract(input, &owned)?.0
        }
    };
    grid.point_data.remove(GHOST_LEVELS);
    grid.cell_data.remove(GHOST_LEVELS);
    Ok(Prepared {
        grid,
        has_point_ids,
        has_cell_ids,
    })
}

/// Run [`prepare`] on every rank and agree on the outcome. A rank whose own
/// input is fine still fails when another rank rejected its input.
fn prepare_collective<C: Communicator>(
    comm: &C,
    input: &UnstructuredGrid,
    cfg: &RedistributeConfig,
) -> Result<Prepared, MeshError> {
    let local = prepare(input, cfg);
    let vote = match &local {
        Err(_) => vec![1, 0, 0, 0],
        Ok(p) if p.grid.num_cells() == 0 => vec![0, 0, 0, 0],
        Ok(p) => vec![0, 1, p.has_point_ids as u64, p.has_cell_ids as u64],
    };
    let totals = all_reduce_sum_vec(comm, tags::VALIDATE, vote)?;
    let &[failed, nonempty, with_points, with_cells] = totals.as_slice() else {
        return Err(MeshError::decode("validation vote has the wrong length"));
    };
    if failed > 0 {
        return match local {
            Err(e) => Err(e),
            Ok(_) => Err(MeshError::InvalidConfig(format!("input rejected on {failed} other rank(s)"))),
        };
    }
    if with_points != 0 && with_points != nonempty {
        return Err(MeshError::InvalidConfig(format!(
            "point id array `{}` present on {with_points} of {nonempty} ranks with cells",
            cfg.point_ids()
        )));
    }
    if with_cells != 0 && with_cells != nonempty {
        return Err(MeshError::InvalidConfig(format!(
            "cell id array `{}` present on {with_cells} of {nonempty} ranks with cells",
            cfg.cell_ids()
        )));
    }
    let mut prepared = local?;
    prepared.has_point_ids = with_points > 0;
    prepared.has_cell_ids = with_cells > 0;
    Ok(prepared)
}

/// Redistributes grids across ranks, optionally keeping the partition
/// between calls.
#[derive(Debug, Default)]
pub struct Redistributor {
    config: RedistributeConfig,
    partition: Option<SpatialPartition>,
}

impl Redistributor {
    pub fn new(config: RedistributeConfig) -> Self {
        Self {
            config,
            partition: None,
        }
    }

    pub fn config(&self) -> &RedistributeConfig {
        &self.config
    }

    /// The retained partition, if any.
    pub fn partition(&self) -> Option<&SpatialPartition> {
        self.partition.as_ref()
    }

    pub fn clear_partition(&mut self) {
        self.partition = None;
    }

    /// Collective. Returns this rank's share of the redistributed grid.
    ///
    /// On error nothing is returned and a retained partition is left as it
    /// was.
    pub fn redistribute<C: Communicator>(
        &mut self,
        comm: &C,
        input: &UnstructuredGrid,
    ) -> Result<UnstructuredGrid, MeshError> {
        let cfg = &self.config;
        let t0 = Instant::now();
        let me = comm.rank();
        if cfg.clip_to_boundary && cfg.policy == AssignmentPolicy::Unique {
            log::warn!("[rank {me}] clipping requires duplicate cell assignment; overriding the unique policy");
        }
        let prepared = prepare_collective(comm, input, cfg)?;
        log::debug!("[rank {me}] validate: {:?}", t0.elapsed());

        if comm.size() == 1 {
            return single_rank(prepared, cfg);
        }

        let mut local = prepared.grid;
        let policy = cfg.effective_policy();
        let generated_cell_ids = !prepared.has_cell_ids && (cfg.ghost_level > 0 || policy == AssignmentPolicy::Duplicate);
        if generated_cell_ids {
            assign_cell_ids(comm, &mut local, cfg.cell_ids())?;
        }

        let ids = IdFlags {
            has_point_ids: prepared.has_point_ids,
            generated_cell_ids,
        };
        let reuse = self
            .partition
            .as_ref()
            .filter(|p| cfg.retain_partition && p.num_processes() == comm.size());
        let t = Instant::now();
        let (out, built) = match reuse {
            Some(part) => (run(comm, cfg, part, local, ids)?, None),
            None => {
                let part = SpatialPartition::build(comm, &local, &cfg.partitioner)?;
                log::debug!(
                    "[rank {me}] partition: {} regions in {:?}",
                    part.num_regions(),
                    t.elapsed()
                );
                let out = run(comm, cfg, &part, local, ids)?;
                (out, Some(part))
            }
        };
        if cfg.retain_partition {
            if let Some(part) = built {
                self.partition = Some(part);
            }
        }
        log::debug!(
            "[rank {me}] redistribute: {} points, {} cells in {:?}",
            out.num_points(),
            out.num_cells(),
            t0.elapsed()
        );
        Ok(out)
    }
}

#[derive(Clone, Copy)]
struct IdFlags {
    has_point_ids: bool,
    generated_cell_ids: bool,
}

fn single_rank(prepared: Prepared, cfg: &RedistributeConfig) -> Result<UnstructuredGrid, MeshError> {
    if prepared.grid.num_cells() == 0 {
        return Err(MeshError::EmptyInput);
    }
    let key = if prepared.has_point_ids {
        PointKey::GlobalIds(cfg.point_ids().to_string())
    } else {
        PointKey::Tolerance(cfg.merge_tolerance)
    };
    let mut out = merge(std::slice::from_ref(&prepared.grid), &MergeOptions::new(key))?;
    tag_levels(&mut out, GHOST_LEVELS, 0);
    Ok(out)
}

/// Phases after partitioning.
fn run<C: Communicator>(
    comm: &C,
    cfg: &RedistributeConfig,
    part: &SpatialPartition,
    local: UnstructuredGrid,
    ids: IdFlags,
) -> Result<UnstructuredGrid, MeshError> {
    let me = comm.rank();
    let policy = cfg.effective_policy();
    if cfg.clip_to_boundary {
        part.check_convex()?;
    }

    let t = Instant::now();
    let subs: Vec<_> = split_for_ranks(part, &local, policy)?
        .into_iter()
        .map(|(sub, _)| sub)
        .collect();
    drop(local);
    let received = exchange(comm, tags::SUBGRIDS, subs)?;
    log::debug!("[rank {me}] exchange: {:?}", t.elapsed());

    let t = Instant::now();
    let key = if ids.has_point_ids {
        PointKey::GlobalIds(cfg.point_ids().to_string())
    } else {
        PointKey::Tolerance(cfg.merge_tolerance)
    };
    let mut opts = MergeOptions::new(key);
    opts.upper_bound_points = received.iter().map(UnstructuredGrid::num_points).sum();
    opts.upper_bound_cells = received.iter().map(UnstructuredGrid::num_cells).sum();
    if policy == AssignmentPolicy::Duplicate {
        opts = opts.with_cell_ids(cfg.cell_ids());
    }
    let mut owned = merge(&received, &opts)?;
    drop(received);
    log::debug!("[rank {me}] merge: {} cells in {:?}", owned.num_cells(), t.elapsed());

    if !ids.has_point_ids {
        let t = Instant::now();
        assign_point_ids(comm, part, &mut owned, cfg.point_ids(), cfg.merge_tolerance)?;
        log::debug!("[rank {me}] point ids: {:?}", t.elapsed());
    }

    let mut out = if cfg.ghost_level > 0 {
        let t = Instant::now();
        ensure_id_arrays(&mut owned, cfg);
        let ghosted = add_ghost_levels(
            comm,
            part,
            &owned,
            &GhostOptions {
                levels: cfg.ghost_level,
                policy,
                point_ids: cfg.point_ids(),
                cell_ids: cfg.cell_ids(),
                ghost_levels: GHOST_LEVELS,
            },
        )?;
        log::debug!("[rank {me}] ghosts: {} cells in {:?}", ghosted.num_cells(), t.elapsed());
        ghosted
    } else {
        tag_levels(&mut owned, GHOST_LEVELS, 0);
        owned
    };

    if cfg.clip_to_boundary {
        let t = Instant::now();
        out.point_data.remove(cfg.point_ids());
        out = match part.process_box(me) {
            Some(bbox) => {
                let clipped = clip_to_box(&out, &bbox)?;
                if cfg.ghost_level > 0 {
                    combine_with_ghosts(clipped, cfg.ghost_level, GHOST_LEVELS, cfg.merge_tolerance)?
                } else {
                    let mut inside = clipped.inside;
                    tag_levels(&mut inside, GHOST_LEVELS, 0);
                    inside
                }
            }
            None => out.empty_like(),
        };
        log::debug!("[rank {me}] clip: {:?}", t.elapsed());
    }

    if ids.generated_cell_ids {
        out.cell_data.remove(cfg.cell_ids());
    }
    Ok(out)
}

/// A rank that received nothing still needs id arrays for the ghost rounds.
fn ensure_id_arrays(grid: &mut UnstructuredGrid, cfg: &RedistributeConfig) {
    if !grid.point_data.contains(cfg.point_ids()) {
        grid.point_data
            .set(DataArray::from_i64(cfg.point_ids(), vec![0; grid.num_points()]));
    }
    if !grid.cell_data.contains(cfg.cell_ids()) {
        grid.cell_data
            .set(DataArray::from_i64(cfg.cell_ids(), vec![0; grid.num_cells()]));
    }
}

/// One-shot [`Redistributor::redistribute`] without a retained partition.
pub fn redistribute<C: Communicator>(
    comm: &C,
    input: &UnstructuredGrid,
    config: &RedistributeConfig,
) -> Result<UnstructuredGrid, MeshError> {
    Redistributor::new(RedistributeConfig {
        retain_partition: false,
        ..config.clone()
    })
    .redistribute(comm, input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::algs::meshgen::hex_box;

    #[test]
    fn single_rank_merges_duplicates_and_tags_level_zero() {
        // two boxes as one grid with the shared face duplicated
        let mut both = hex_box([1, 1, 1], [0.0; 3], [1.0; 3]).unwrap();
        let b = hex_box([1, 1, 1], [1.0, 0.0, 0.0], [2.0, 1.0, 1.0]).unwrap();
        for p in b.points() {
            both.push_point(*p);
        }
        let shifted: Vec<usize> = b.cell_points(0).iter().map(|p| p + 8).collect();
        both.push_cell(b.cell_type(0), &shifted).unwrap();
        assert_eq!(both.num_points(), 16);

        let out = redistribute(&NoComm, &both, &RedistributeConfig::default()).unwrap();
        assert_eq!(out.num_points(), 12);
        assert_eq!(out.num_cells(), 2);
        let levels = out.cell_data.get(GHOST_LEVELS).unwrap().as_u8().unwrap();
        assert_eq!(levels, &[0, 0]);
        assert!(out.point_data.get(GHOST_LEVELS).is_some());
    }

    #[test]
    fn bad_tolerance_is_a_configuration_error() {
        let g = hex_box([1, 1, 1], [0.0; 3], [1.0; 3]).unwrap();
        let cfg = RedistributeConfig {
            merge_tolerance: f64::NAN,
            ..Default::default()
        };
        assert!(redistribute(&NoComm, &g, &cfg).unwrap_err().is_configuration());
    }

    #[test]
    fn input_ghosts_are_dropped() {
        let mut g = hex_box([2, 1, 1], [0.0; 3], [2.0, 1.0, 1.0]).unwrap();
        g.cell_data.add(DataArray::from_u8(GHOST_LEVELS, vec![0, 1])).unwrap();
        let out = redistribute(&NoComm, &g, &RedistributeConfig::default()).unwrap();
        assert_eq!(out.num_cells(), 1);
        assert_eq!(out.num_points(), 8);
    }

    #[test]
    fn no_cells_is_an_error() {
        let g = hex_box([1, 1, 1], [0.0; 3], [1.0; 3]).unwrap().empty_like();
        let err = redistribute(&NoComm, &g, &RedistributeConfig::default()).unwrap_err();
        assert!(matches!(err, MeshError::EmptyInput));
    }

    #[test]
    fn clipping_forces_duplicate() {
        let cfg = RedistributeConfig {
            clip_to_boundary: true,
            ..Default::default()
        };
        assert_eq!(cfg.effective_policy(), AssignmentPolicy::Duplicate);
        assert_eq!(cfg.point_ids(), DEFAULT_POINT_IDS);
        let json = serde_json::to_string(&cfg).unwrap();
        let back: RedistributeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
        let partial: RedistributeConfig = serde_json::from_str(r#"{"ghost_level": 2}"#).unwrap();
        assert_eq!(partial.ghost_level, 2);
        assert_eq!(partial.policy, AssignmentPolicy::Unique);
    }
}
