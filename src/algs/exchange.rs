//! Ring pairwise exchange: the one collective every redistribution phase
//! uses to move data between ranks.
//!
//! For `offset = 1..N` rank `P` sends to `(P + offset) mod N` and receives
//! from `(P - offset) mod N`. Each round first swaps a [`WireCount`] size
//! header (tag `t`), then the payload itself (tag `t + 1`): post the receive,
//! send and wait, wait on the receive. Zero-length payloads still travel so
//! every rank sees exactly one message per directed pair and round. The self
//! slot is passed through without touching the transport.
//!
//! Every posted handle is drained before an error is returned.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{WireCount, WirePayload};
use crate::mesh_error::MeshError;
use bytes::Bytes;
use std::mem::size_of;

/// Base tags of the redistribution phases. Each phase uses `base` for size
/// headers and `base + 1` for payloads.
pub mod tags {
    use crate::algs::communicator::CommTag;

    pub const VALIDATE: CommTag = CommTag::new(0x5000);
    pub const PARTITION_SAMPLE: CommTag = CommTag::new(0x5010);
    pub const REGION_COUNTS: CommTag = CommTag::new(0x5020);
    pub const SUBGRIDS: CommTag = CommTag::new(0x5030);
    pub const POINT_ID_QUERY: CommTag = CommTag::new(0x5060);
    pub const POINT_ID_REPLY: CommTag = CommTag::new(0x5070);
    pub const GHOST_DIRECTORY: CommTag = CommTag::new(0x50a0);
    pub const GHOST_DIRECTORY_REPLY: CommTag = CommTag::new(0x50b0);
    pub const GHOST_REQUEST: CommTag = CommTag::new(0x50c0);
    pub const GHOST_REPLY: CommTag = CommTag::new(0x50d0);
    pub const GHOST_LOOKUP: CommTag = CommTag::new(0x50e0);
    pub const GHOST_LOOKUP_REPLY: CommTag = CommTag::new(0x50f0);
}

fn wrong_len(neighbor: usize, what: &str, expected: usize, got: usize) -> MeshError {
    MeshError::CommError {
        neighbor,
        source: format!("expected {expected} bytes for {what}, got {got}").into(),
    }
}

/// Send `outgoing[p]` to every rank `p` and return what every rank sent
/// here, indexed by source. `outgoing[rank]` is returned in place.
pub fn exchange_bytes<C>(comm: &C, tag: CommTag, outgoing: Vec<Bytes>) -> Result<Vec<Bytes>, MeshError>
where
    C: Communicator,
{
    let n = comm.size();
    let me = comm.rank();
    if outgoing.len() != n {
        return Err(MeshError::InvalidConfig(format!(
            "exchange needs one payload per rank: {} payloads for {n} ranks",
            outgoing.len()
        )));
    }
    let size_tag = tag.as_u16();
    let data_tag = tag.offset(1).as_u16();

    let mut received: Vec<Bytes> = vec![Bytes::new(); n];
    received[me] = outgoing[me].clone();
    let mut maybe_err: Option<MeshError> = None;

    for offset in 1..n {
        let dst = (me + offset) % n;
        let src = (me + n - offset) % n;
        let payload = &outgoing[dst];

        // 1) size header
        let mut cnt = WireCount::new(0);
        let recv_h = comm.irecv(src, size_tag, bytemuck::bytes_of_mut(&mut cnt));
        let header = WireCount::new(payload.len());
        comm.isend(dst, size_tag, bytemuck::bytes_of(&header)).wait();
        let expected = match recv_h.wait() {
            Some(data) if data.len() == size_of::<WireCount>() => {
                bytemuck::bytes_of_mut(&mut cnt).copy_from_slice(&data);
                Some(cnt.get())
            }
            Some(data) => {
                maybe_err.get_or_insert(wrong_len(src, "size header", size_of::<WireCount>(), data.len()));
                None
            }
            None => {
                maybe_err.get_or_insert(MeshError::CommError {
                    neighbor: src,
                    source: format!("failed to receive size header from rank {src}").into(),
                });
                None
            }
        };

        // 2) payload; the send goes out even when the header from `src` failed
        let recv_h = expected.map(|len| {
            let mut buf = vec![0u8; len];
            (len, comm.irecv(src, data_tag, &mut buf))
        });
        comm.isend(dst, data_tag, payload).wait();
        if let Some((len, h)) = recv_h {
            match h.wait() {
                Some(data) if data.len() == len => received[src] = Bytes::from(data),
                Some(data) => {
                    maybe_err.get_or_insert(MeshError::BufferSizeMismatch {
                        neighbor: src,
                        expected: len,
                        got: data.len(),
                    });
                }
                None => {
                    maybe_err.get_or_insert(MeshError::CommError {
                        neighbor: src,
                        source: format!("failed to receive payload from rank {src}").into(),
                    });
                }
            }
        }
    }

    if let Some(err) = maybe_err {
        return Err(err);
    }
    log::trace!(
        "[rank {me}] exchange tag {:#x}: sent {} B, received {} B",
        size_tag,
        outgoing.iter().map(Bytes::len).sum::<usize>(),
        received.iter().map(Bytes::len).sum::<usize>()
    );
    Ok(received)
}

/// Typed exchange: one payload per destination rank, one result per source.
/// The local payload is moved through without encoding.
pub fn exchange<C, T>(comm: &C, tag: CommTag, outgoing: Vec<T>) -> Result<Vec<T>, MeshError>
where
    C: Communicator,
    T: WirePayload,
{
    let me = comm.rank();
    if outgoing.len() != comm.size() {
        return Err(MeshError::InvalidConfig(format!(
            "exchange needs one payload per rank: {} payloads for {} ranks",
            outgoing.len(),
            comm.size()
        )));
    }
    let mut bytes = Vec::with_capacity(outgoing.len());
    for (p, item) in outgoing.iter().enumerate() {
        bytes.push(if p == me { Bytes::new() } else { item.to_bytes()? });
    }
    let mut mine = outgoing.into_iter().nth(me);
    let arena = exchange_bytes(comm, tag, bytes)?;
    arena
        .into_iter()
        .enumerate()
        .map(|(p, buf)| {
            if p == me {
                mine.take()
                    .ok_or_else(|| MeshError::decode("local payload consumed twice"))
            } else {
                T::decode(buf)
            }
        })
        .collect()
}

/// Send the same payload to every rank; returns every rank's payload by rank.
pub fn all_gather_payload<C, T>(comm: &C, tag: CommTag, item: T) -> Result<Vec<T>, MeshError>
where
    C: Communicator,
    T: WirePayload,
{
    let me = comm.rank();
    let encoded = item.to_bytes()?;
    let outgoing = (0..comm.size())
        .map(|p| if p == me { Bytes::new() } else { encoded.clone() })
        .collect();
    let mut mine = Some(item);
    exchange_bytes(comm, tag, outgoing)?
        .into_iter()
        .enumerate()
        .map(|(p, buf)| {
            if p == me {
                mine.take()
                    .ok_or_else(|| MeshError::decode("local payload consumed twice"))
            } else {
                T::decode(buf)
            }
        })
        .collect()
}

/// Every rank's `value`, indexed by rank.
///
/// Goes through [`Communicator::allgather`]; values travel little-endian.
pub fn all_gather_u64<C: Communicator>(comm: &C, value: u64) -> Result<Vec<u64>, MeshError> {
    let mut recv = vec![0u8; size_of::<u64>() * comm.size()];
    comm.allgather(&value.to_le_bytes(), &mut recv)?;
    Ok(recv
        .chunks_exact(size_of::<u64>())
        .map(|c| u64::from_le(bytemuck::pod_read_unaligned(c)))
        .collect())
}

/// `(sum of values on lower ranks, sum over all ranks)`.
pub fn exclusive_prefix_sum<C: Communicator>(comm: &C, value: u64) -> Result<(u64, u64), MeshError> {
    let all = all_gather_u64(comm, value)?;
    let base = all[..comm.rank()].iter().sum();
    Ok((base, all.iter().sum()))
}

pub fn all_reduce_sum<C: Communicator>(comm: &C, value: u64) -> Result<u64, MeshError> {
    Ok(all_gather_u64(comm, value)?.into_iter().sum())
}

/// Element-wise sum of equally long vectors across ranks.
pub fn all_reduce_sum_vec<C: Communicator>(
    comm: &C,
    tag: CommTag,
    values: Vec<u64>,
) -> Result<Vec<u64>, MeshError> {
    let len = values.len();
    let mut out = vec![0u64; len];
    for v in all_gather_payload(comm, tag, values)? {
        if v.len() != len {
            return Err(MeshError::decode(format!(
                "reduction length {} differs from local {len}",
                v.len()
            )));
        }
        for (o, x) in out.iter_mut().zip(v) {
            *o += x;
        }
    }
    Ok(out)
}
