//! Global point and cell id generation.
//!
//! Point ids are handed out by region owners. A point lying in one of this
//! rank's regions is *interior* and numbered from this rank's slice of an
//! exclusive prefix sum. Any other point is sent, by coordinates, to the
//! owner of its region. The owner answers with the id of its matching
//! interior point; coordinates it does not hold are collected, deduplicated
//! and numbered after all interior ids, so every physical point gets exactly
//! one id.

use crate::algs::communicator::Communicator;
use crate::algs::exchange::{exchange, exclusive_prefix_sum, tags};
use crate::data::array::DataArray;
use crate::data::grid::UnstructuredGrid;
use crate::geometry::locator::PointLocator;
use crate::mesh_error::MeshError;
use crate::partitioning::SpatialPartition;

/// Number local cells `base..base + n` after an exclusive prefix sum of cell
/// counts and store them as `name`. Collective.
pub fn assign_cell_ids<C: Communicator>(
    comm: &C,
    grid: &mut UnstructuredGrid,
    name: &str,
) -> Result<(), MeshError> {
    let n = grid.num_cells() as u64;
    let (base, total) = exclusive_prefix_sum(comm, n)?;
    log::debug!("[rank {}] cell ids {base}..{} of {total}", comm.rank(), base + n);
    let ids = (base as i64..(base + n) as i64).collect();
    grid.cell_data.set(DataArray::from_i64(name, ids));
    Ok(())
}

/// Give every point of `grid` a global id stored as `name`. Collective.
///
/// `tolerance` matches query coordinates against the owner's points.
pub fn assign_point_ids<C: Communicator>(
    comm: &C,
    part: &SpatialPartition,
    grid: &mut UnstructuredGrid,
    name: &str,
    tolerance: f64,
) -> Result<(), MeshError> {
    let me = comm.rank();
    let n_ranks = comm.size();
    let n = grid.num_points();
    let owners: Vec<usize> = grid.points().iter().map(|p| part.owner_of_point(p)).collect();

    // 1) interior points
    let n_interior = owners.iter().filter(|&&o| o == me).count();
    let (base, interior_total) = exclusive_prefix_sum(comm, n_interior as u64)?;
    let mut ids = vec![-1i64; n];
    let mut locator = PointLocator::with_capacity(tolerance, n_interior);
    let mut next = base as i64;
    for p in (0..n).filter(|&p| owners[p] == me) {
        ids[p] = next;
        locator.insert(grid.point(p), next as usize);
        next += 1;
    }

    // 2) coordinate queries to region owners
    let mut queries: Vec<Vec<[f64; 3]>> = vec![Vec::new(); n_ranks];
    let mut asked: Vec<Vec<usize>> = vec![Vec::new(); n_ranks];
    for p in (0..n).filter(|&p| owners[p] != me) {
        queries[owners[p]].push(grid.point(p));
        asked[owners[p]].push(p);
    }
    let incoming = exchange(comm, tags::POINT_ID_QUERY, queries)?;

    // 3) owners number what they could not resolve, then answer
    let mut unresolved = PointLocator::new(tolerance);
    let mut answers: Vec<Vec<i64>> = Vec::with_capacity(n_ranks);
    for coords in &incoming {
        let mut reply = Vec::with_capacity(coords.len());
        for xyz in coords {
            match locator.find(xyz) {
                Some(id) => reply.push(id as i64),
                None => {
                    let slot = unresolved.len();
                    let (slot, _) = unresolved.insert_unique(*xyz, slot);
                    // negative marks a slot in the unresolved list
                    reply.push(-(slot as i64) - 1);
                }
            }
        }
        answers.push(reply);
    }
    let (new_base, new_total) = exclusive_prefix_sum(comm, unresolved.len() as u64)?;
    let first_new = (interior_total + new_base) as i64;
    for reply in &mut answers {
        for id in reply.iter_mut().filter(|id| **id < 0) {
            *id = first_new + (-*id - 1);
        }
    }
    let replies = exchange(comm, tags::POINT_ID_REPLY, answers)?;

    for (owner, reply) in replies.into_iter().enumerate() {
        if reply.len() != asked[owner].len() {
            return Err(MeshError::decode(format!(
                "rank {owner} answered {} of {} point queries",
                reply.len(),
                asked[owner].len()
            )));
        }
        for (&p, id) in asked[owner].iter().zip(reply) {
            ids[p] = id;
        }
    }
    log::debug!(
        "[rank {me}] point ids: {n_interior} interior, {} queried, {} new here; {} ids in total",
        n - n_interior,
        unresolved.len(),
        interior_total + new_total
    );
    grid.point_data.set(DataArray::from_i64(name, ids));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::algs::meshgen::hex_box;
    use crate::partitioning::PartitionerConfig;

    #[test]
    fn single_rank_numbers_every_point() {
        let mut g = hex_box([2, 2, 1], [0.0; 3], [1.0; 3]).unwrap();
        let part = SpatialPartition::build(&NoComm, &g, &PartitionerConfig::default()).unwrap();
        assign_point_ids(&NoComm, &part, &mut g, "GlobalPointIds", 0.0).unwrap();
        let ids = g.point_data.require_i64("GlobalPointIds").unwrap();
        assert_eq!(ids, (0..18).collect::<Vec<i64>>().as_slice());
        assign_cell_ids(&NoComm, &mut g, "GlobalCellIds").unwrap();
        assert_eq!(g.cell_data.require_i64("GlobalCellIds").unwrap(), &[0, 1, 2, 3]);
    }
}
