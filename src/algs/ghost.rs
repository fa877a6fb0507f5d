//! Ghost (halo) cells, one level at a time.
//!
//! Round `k -> k+1` picks a frontier of points (the rank's own points for
//! `k = 0`, otherwise the points first received at level `k`), asks the
//! ranks holding cells on those points for every cell the requester does not
//! know yet, and merges the replies with level `k + 1`.
//!
//! Holders answer only from their owned (level-0) grid. Requests are routed
//! by policy:
//! * duplicate assignment: the owner of the region containing a point holds
//!   every cell using it, so the request goes there (or nowhere, if that is
//!   this rank);
//! * unique assignment: a point directory, kept by the region owner of each
//!   point, maps point id to the ranks owning cells on it. Registration
//!   answers level 1 directly; later levels query the directory.

use crate::algs::communicator::Communicator;
use crate::algs::exchange::{exchange, tags};
use crate::algs::merge::{MergeOptions, PointKey, merge};
use crate::algs::redistribute::AssignmentPolicy;
use crate::algs::submesh::extract;
use crate::algs::wire::{
    WirePayload, ensure_remaining, expect_consumed, kind, put_count, put_hdr, put_slice, take_count, take_hdr, take_vec,
};
use crate::data::array::DataArray;
use crate::data::grid::UnstructuredGrid;
use crate::mesh_error::MeshError;
use crate::partitioning::SpatialPartition;
use crate::topology::links::CellLinks;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use hashbrown::{HashMap, HashSet};

/// `(point id, ids of the cells on that point the requester already has)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointRequests(pub Vec<(i64, Vec<i64>)>);

impl WirePayload for PointRequests {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), MeshError> {
        put_hdr(buf, kind::POINT_REQUESTS);
        put_count(buf, self.0.len());
        for (gid, known) in &self.0 {
            buf.put_i64_le(*gid);
            put_count(buf, known.len());
            put_slice(buf, known);
        }
        Ok(())
    }

    fn decode(mut buf: Bytes) -> Result<Self, MeshError> {
        take_hdr(&mut buf, kind::POINT_REQUESTS)?;
        let n = take_count(&mut buf)?;
        let mut out = Vec::with_capacity(n.min(buf.remaining() / 16));
        for _ in 0..n {
            ensure_remaining(&buf, 8)?;
            let gid = buf.get_i64_le();
            let k = take_count(&mut buf)?;
            out.push((gid, take_vec(&mut buf, k)?));
        }
        expect_consumed(&buf)?;
        Ok(Self(out))
    }
}

/// `(point id, ranks owning cells on it)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HolderLists(pub Vec<(i64, Vec<u32>)>);

impl WirePayload for HolderLists {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), MeshError> {
        put_hdr(buf, kind::HOLDERS);
        put_count(buf, self.0.len());
        for (gid, ranks) in &self.0 {
            buf.put_i64_le(*gid);
            put_count(buf, ranks.len());
            put_slice(buf, ranks);
        }
        Ok(())
    }

    fn decode(mut buf: Bytes) -> Result<Self, MeshError> {
        take_hdr(&mut buf, kind::HOLDERS)?;
        let n = take_count(&mut buf)?;
        let mut out = Vec::with_capacity(n.min(buf.remaining() / 16));
        for _ in 0..n {
            ensure_remaining(&buf, 8)?;
            let gid = buf.get_i64_le();
            let k = take_count(&mut buf)?;
            out.push((gid, take_vec(&mut buf, k)?));
        }
        expect_consumed(&buf)?;
        Ok(Self(out))
    }
}

/// Names and depth for [`add_ghost_levels`].
#[derive(Clone, Copy, Debug)]
pub struct GhostOptions<'a> {
    pub levels: u8,
    pub policy: AssignmentPolicy,
    pub point_ids: &'a str,
    pub cell_ids: &'a str,
    pub ghost_levels: &'a str,
}

/// Replace `name` on points and cells with constant levels.
pub fn tag_levels(grid: &mut UnstructuredGrid, name: &str, level: u8) {
    grid.point_data
        .set(DataArray::from_u8(name, vec![level; grid.num_points()]));
    grid.cell_data
        .set(DataArray::from_u8(name, vec![level; grid.num_cells()]));
}

/// The owned grid plus everything a requester needs to be served from it.
struct Holder<'a> {
    grid: &'a UnstructuredGrid,
    index: HashMap<i64, usize>,
    links: CellLinks,
    cell_ids: &'a [i64],
}

impl<'a> Holder<'a> {
    fn new(grid: &'a UnstructuredGrid, opts: &GhostOptions<'_>) -> Result<Self, MeshError> {
        let gids = grid.point_data.require_i64(opts.point_ids)?;
        Ok(Self {
            index: gids.iter().enumerate().map(|(p, &g)| (g, p)).collect(),
            links: CellLinks::build(grid),
            cell_ids: grid.cell_data.require_i64(opts.cell_ids)?,
            grid,
        })
    }

    /// Owned cells on the requested points the requester lacks, once each.
    fn serve(&self, req: &PointRequests) -> Result<UnstructuredGrid, MeshError> {
        let mut chosen = HashSet::new();
        let mut cells = Vec::new();
        for (gid, known) in &req.0 {
            let Some(&p) = self.index.get(gid) else {
                continue;
            };
            for &c in self.links.cells_of(p) {
                if !known.contains(&self.cell_ids[c]) && chosen.insert(c) {
                    cells.push(c);
                }
            }
        }
        Ok(extract(self.grid, &cells)?.0)
    }
}

/// Register owned points with their directory ranks; returns, for each owned
/// point id shared with other ranks, the other holders. Collective.
fn register<C: Communicator>(
    comm: &C,
    part: &SpatialPartition,
    owned: &UnstructuredGrid,
    gids: &[i64],
) -> Result<(HashMap<i64, Vec<u32>>, HashMap<i64, Vec<u32>>), MeshError> {
    let n = comm.size();
    let mut reg: Vec<Vec<i64>> = vec![Vec::new(); n];
    for (p, &gid) in gids.iter().enumerate() {
        reg[part.owner_of_point(&owned.point(p))].push(gid);
    }
    let incoming = exchange(comm, tags::GHOST_DIRECTORY, reg)?;

    let mut directory: HashMap<i64, Vec<u32>> = HashMap::new();
    for (src, list) in incoming.iter().enumerate() {
        for &gid in list {
            directory.entry(gid).or_default().push(src as u32);
        }
    }
    let replies: Vec<HolderLists> = incoming
        .iter()
        .enumerate()
        .map(|(src, list)| {
            HolderLists(
                list.iter()
                    .filter_map(|gid| {
                        let others: Vec<u32> = directory[gid]
                            .iter()
                            .copied()
                            .filter(|&r| r as usize != src)
                            .collect();
                        (!others.is_empty()).then_some((*gid, others))
                    })
                    .collect(),
            )
        })
        .collect();
    let shared = exchange(comm, tags::GHOST_DIRECTORY_REPLY, replies)?
        .into_iter()
        .flat_map(|h| h.0)
        .collect();
    Ok((directory, shared))
}

/// Ask directory ranks who holds `points` (indices into `grid`). Collective.
fn lookup<C: Communicator>(
    comm: &C,
    part: &SpatialPartition,
    directory: &HashMap<i64, Vec<u32>>,
    grid: &UnstructuredGrid,
    gids: &[i64],
    points: &[usize],
) -> Result<HashMap<i64, Vec<u32>>, MeshError> {
    let mut queries: Vec<Vec<i64>> = vec![Vec::new(); comm.size()];
    for &p in points {
        queries[part.owner_of_point(&grid.point(p))].push(gids[p]);
    }
    let incoming = exchange(comm, tags::GHOST_LOOKUP, queries)?;
    let replies: Vec<HolderLists> = incoming
        .into_iter()
        .map(|list| {
            HolderLists(
                list.into_iter()
                    .filter_map(|gid| directory.get(&gid).map(|h| (gid, h.clone())))
                    .collect(),
            )
        })
        .collect();
    Ok(exchange(comm, tags::GHOST_LOOKUP_REPLY, replies)?
        .into_iter()
        .flat_map(|h| h.0)
        .collect())
}

/// Grow `owned` by `opts.levels` rings of ghost cells and tag every point and
/// cell with its level. `owned` must carry point and cell id arrays.
/// Collective: every rank runs every round.
pub fn add_ghost_levels<C: Communicator>(
    comm: &C,
    part: &SpatialPartition,
    owned: &UnstructuredGrid,
    opts: &GhostOptions<'_>,
) -> Result<UnstructuredGrid, MeshError> {
    let me = comm.rank();
    let n_ranks = comm.size();
    let holder = Holder::new(owned, opts)?;
    let mut acc = owned.clone();
    tag_levels(&mut acc, opts.ghost_levels, 0);
    if opts.levels == 0 {
        return Ok(acc);
    }

    let owned_gids = owned.point_data.require_i64(opts.point_ids)?;
    let (directory, shared) = match opts.policy {
        AssignmentPolicy::Unique => register(comm, part, owned, owned_gids)?,
        AssignmentPolicy::Duplicate => Default::default(),
    };
    let merge_opts = MergeOptions::new(PointKey::GlobalIds(opts.point_ids.to_string()))
        .with_cell_ids(opts.cell_ids);

    for k in 0..opts.levels {
        let gids = acc.point_data.require_i64(opts.point_ids)?.to_vec();
        let point_levels = acc
            .point_data
            .get(opts.ghost_levels)
            .and_then(DataArray::as_u8)
            .ok_or_else(|| MeshError::MissingArray(opts.ghost_levels.to_string()))?
            .to_vec();
        let acc_cell_ids = acc.cell_data.require_i64(opts.cell_ids)?;
        let links = CellLinks::build(&acc);

        let frontier: Vec<usize> = (0..acc.num_points())
            .filter(|&p| point_levels[p] == k)
            .filter(|&p| match opts.policy {
                AssignmentPolicy::Duplicate => part.owner_of_point(&acc.point(p)) != me,
                AssignmentPolicy::Unique => true,
            })
            .collect();

        let holders: HashMap<i64, Vec<u32>> = match opts.policy {
            AssignmentPolicy::Duplicate => HashMap::new(),
            AssignmentPolicy::Unique if k == 0 => shared.clone(),
            AssignmentPolicy::Unique => lookup(comm, part, &directory, &acc, &gids, &frontier)?,
        };

        let mut requests: Vec<PointRequests> = vec![PointRequests::default(); n_ranks];
        for &p in &frontier {
            let known: Vec<i64> = links.cells_of(p).iter().map(|&c| acc_cell_ids[c]).collect();
            match opts.policy {
                AssignmentPolicy::Duplicate => {
                    let owner = part.owner_of_point(&acc.point(p));
                    requests[owner].0.push((gids[p], known));
                }
                AssignmentPolicy::Unique => {
                    let Some(ranks) = holders.get(&gids[p]) else {
                        continue;
                    };
                    for &r in ranks.iter().filter(|&&r| r as usize != me) {
                        requests[r as usize].0.push((gids[p], known.clone()));
                    }
                }
            }
        }

        let incoming = exchange(comm, tags::GHOST_REQUEST, requests)?;
        let replies = incoming
            .iter()
            .map(|req| holder.serve(req))
            .collect::<Result<Vec<_>, _>>()?;
        let received = exchange(comm, tags::GHOST_REPLY, replies)?;

        let mut parts = Vec::with_capacity(n_ranks + 1);
        parts.push(acc);
        for mut g in received.into_iter().filter(|g| g.num_cells() > 0) {
            tag_levels(&mut g, opts.ghost_levels, k + 1);
            parts.push(g);
        }
        let before = parts[0].num_cells();
        acc = merge(&parts, &merge_opts)?;
        log::debug!(
            "[rank {me}] ghost level {}: {} frontier points, {} new cells",
            k + 1,
            frontier.len(),
            acc.num_cells() - before
        );
    }

    // points this rank owns stay level 0 whatever cell brought them
    let gids = acc.point_data.require_i64(opts.point_ids)?.to_vec();
    if let Some(levels) = acc
        .point_data
        .get_mut(opts.ghost_levels)
        .and_then(DataArray::as_u8_mut)
    {
        for (lvl, gid) in levels.iter_mut().zip(&gids) {
            if holder.index.contains_key(gid) {
                *lvl = 0;
            }
        }
    }
    Ok(acc)
}
