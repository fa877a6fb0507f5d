//! Fixed, versioned, little-endian wire types for redistribution exchanges.
//!
//! Fixed-size records are `bytemuck::Pod` structs whose multi-byte fields are
//! stored pre-LE (`.to_le()`) and decoded with `.from_le()`. Variable payloads
//! (sub-grids, id lists, requests) are framed by a [`WireHdr`] and written
//! with `bytes::BufMut`, then read back with `bytes::Buf`.

use crate::data::array::{ArrayValues, DataArray, ScalarType};
use crate::data::attributes::FieldData;
use crate::data::grid::UnstructuredGrid;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellType;
use bytemuck::{Pod, Zeroable};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use static_assertions::const_assert_eq;
use std::mem::{align_of, size_of};

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Payload kinds carried in [`WireHdr::kind`].
pub mod kind {
    pub const GRID: u16 = 1;
    pub const RECORDS: u16 = 2;
    pub const POINT_REQUESTS: u16 = 3;
    pub const HOLDERS: u16 = 4;
}

// ===== Common records ======================================================

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,  // = WIRE_VERSION.to_le()
    pub kind_le: u16,     // see `kind`
    pub reserved_le: u32, // keep zero
}

impl WireHdr {
    pub fn new(kind: u16) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
}

/// Byte or record count; also the per-round size header of the exchange.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u64,
}
impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.n_le) as usize
    }
}

/// Shape of a serialized grid.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireGridCounts {
    pub n_points_le: u64,
    pub n_cells_le: u64,
    pub n_conn_le: u64,
    pub n_point_arrays_le: u32,
    pub n_cell_arrays_le: u32,
}

impl WireGridCounts {
    fn of(g: &UnstructuredGrid) -> Self {
        Self {
            n_points_le: (g.num_points() as u64).to_le(),
            n_cells_le: (g.num_cells() as u64).to_le(),
            n_conn_le: (g.connectivity_len() as u64).to_le(),
            n_point_arrays_le: (g.point_data.len() as u32).to_le(),
            n_cell_arrays_le: (g.cell_data.len() as u32).to_le(),
        }
    }
}

/// Header preceding each serialized array's values.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireArrayHdr {
    pub n_values_le: u64,
    pub components_le: u32,
    pub name_len_le: u16,
    pub scalar: u8,
    pub _pad: u8,
}

// ===== Compile-time sanity checks =========================================

const_assert_eq!(size_of::<WireHdr>(), 8);
const_assert_eq!(size_of::<WireCount>(), 8);
const_assert_eq!(size_of::<WireGridCounts>(), 32);
const_assert_eq!(size_of::<WireArrayHdr>(), 16);
const_assert_eq!(align_of::<WireGridCounts>(), 8);

// ===== Framing helpers =====================================================

/// Append a Pod record.
pub fn put_record<T: Pod>(buf: &mut BytesMut, rec: &T) {
    buf.put_slice(bytemuck::bytes_of(rec));
}

/// Read a Pod record, failing on a short buffer.
pub fn take_record<T: Pod>(buf: &mut Bytes) -> Result<T, MeshError> {
    ensure_remaining(buf, size_of::<T>())?;
    let rec = bytemuck::pod_read_unaligned(&buf[..size_of::<T>()]);
    buf.advance(size_of::<T>());
    Ok(rec)
}

pub fn ensure_remaining(buf: &Bytes, n: usize) -> Result<(), MeshError> {
    if buf.remaining() < n {
        return Err(MeshError::decode(format!(
            "need {n} bytes, {} remaining",
            buf.remaining()
        )));
    }
    Ok(())
}

/// Write the frame header for `kind`.
pub fn put_hdr(buf: &mut BytesMut, kind: u16) {
    put_record(buf, &WireHdr::new(kind));
}

/// Read and check the frame header.
pub fn take_hdr(buf: &mut Bytes, expected_kind: u16) -> Result<(), MeshError> {
    let hdr: WireHdr = take_record(buf)?;
    if hdr.version() != WIRE_VERSION {
        return Err(MeshError::WireVersion {
            expected: WIRE_VERSION,
            got: hdr.version(),
        });
    }
    if hdr.kind() != expected_kind {
        return Err(MeshError::decode(format!(
            "expected payload kind {expected_kind}, got {}",
            hdr.kind()
        )));
    }
    Ok(())
}

pub fn put_count(buf: &mut BytesMut, n: usize) {
    put_record(buf, &WireCount::new(n));
}

pub fn take_count(buf: &mut Bytes) -> Result<usize, MeshError> {
    Ok(take_record::<WireCount>(buf)?.get())
}

/// Fail when bytes are left over after decoding.
pub fn expect_consumed(buf: &Bytes) -> Result<(), MeshError> {
    if buf.has_remaining() {
        return Err(MeshError::decode(format!(
            "{} trailing bytes",
            buf.remaining()
        )));
    }
    Ok(())
}

// ===== Scalars =============================================================

/// Fixed-width value with a little-endian encoding.
pub trait WireScalar: Sized + Copy {
    const SIZE: usize;
    fn put(self, buf: &mut BytesMut);
    fn take(buf: &mut Bytes) -> Self;
}

macro_rules! wire_scalar {
    ($t:ty, $put:ident, $get:ident) => {
        impl WireScalar for $t {
            const SIZE: usize = size_of::<$t>();
            #[inline]
            fn put(self, buf: &mut BytesMut) {
                buf.$put(self);
            }
            #[inline]
            fn take(buf: &mut Bytes) -> Self {
                buf.$get()
            }
        }
    };
}

wire_scalar!(f64, put_f64_le, get_f64_le);
wire_scalar!(f32, put_f32_le, get_f32_le);
wire_scalar!(i64, put_i64_le, get_i64_le);
wire_scalar!(i32, put_i32_le, get_i32_le);
wire_scalar!(u64, put_u64_le, get_u64_le);
wire_scalar!(u32, put_u32_le, get_u32_le);
wire_scalar!(u8, put_u8, get_u8);

impl WireScalar for [f64; 3] {
    const SIZE: usize = 24;
    fn put(self, buf: &mut BytesMut) {
        for x in self {
            buf.put_f64_le(x);
        }
    }
    fn take(buf: &mut Bytes) -> Self {
        [buf.get_f64_le(), buf.get_f64_le(), buf.get_f64_le()]
    }
}

pub fn put_slice<T: WireScalar>(buf: &mut BytesMut, v: &[T]) {
    buf.reserve(v.len() * T::SIZE);
    for &x in v {
        x.put(buf);
    }
}

/// Read `n` values, checking the buffer length first.
pub fn take_vec<T: WireScalar>(buf: &mut Bytes, n: usize) -> Result<Vec<T>, MeshError> {
    let bytes = n
        .checked_mul(T::SIZE)
        .ok_or_else(|| MeshError::decode("value count overflows"))?;
    ensure_remaining(buf, bytes)?;
    Ok((0..n).map(|_| T::take(buf)).collect())
}

// ===== Payload trait ======================================================

/// Anything the exchange primitive can carry.
pub trait WirePayload: Sized {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), MeshError>;
    fn decode(buf: Bytes) -> Result<Self, MeshError>;

    /// Encode into a fresh frozen buffer.
    fn to_bytes(&self) -> Result<Bytes, MeshError> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// Flat lists of fixed-width values.
impl<T: WireScalar> WirePayload for Vec<T> {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), MeshError> {
        put_hdr(buf, kind::RECORDS);
        put_count(buf, self.len());
        put_slice(buf, self);
        Ok(())
    }

    fn decode(mut buf: Bytes) -> Result<Self, MeshError> {
        take_hdr(&mut buf, kind::RECORDS)?;
        let n = take_count(&mut buf)?;
        let v = take_vec(&mut buf, n)?;
        expect_consumed(&buf)?;
        Ok(v)
    }
}

// ===== Grids ===============================================================

fn put_field_data(buf: &mut BytesMut, fd: &FieldData) {
    for a in fd.iter() {
        let name = a.name().as_bytes();
        put_record(
            buf,
            &WireArrayHdr {
                n_values_le: (a.values().len() as u64).to_le(),
                components_le: (a.components() as u32).to_le(),
                name_len_le: (name.len() as u16).to_le(),
                scalar: a.scalar_type().to_wire(),
                _pad: 0,
            },
        );
        buf.put_slice(name);
        match a.values() {
            ArrayValues::F64(v) => put_slice(buf, v),
            ArrayValues::F32(v) => put_slice(buf, v),
            ArrayValues::I64(v) => put_slice(buf, v),
            ArrayValues::I32(v) => put_slice(buf, v),
            ArrayValues::U64(v) => put_slice(buf, v),
            ArrayValues::U32(v) => put_slice(buf, v),
            ArrayValues::U8(v) => put_slice(buf, v),
            // rejected by `check_serializable` before encoding
            ArrayValues::Text(_) => {}
        }
    }
}

fn take_field_data(buf: &mut Bytes, n_arrays: usize) -> Result<FieldData, MeshError> {
    let mut fd = FieldData::new();
    for _ in 0..n_arrays {
        let hdr: WireArrayHdr = take_record(buf)?;
        let name_len = u16::from_le(hdr.name_len_le) as usize;
        ensure_remaining(buf, name_len)?;
        let name = String::from_utf8(buf.split_to(name_len).to_vec())
            .map_err(|_| MeshError::decode("array name is not UTF-8"))?;
        let n = u64::from_le(hdr.n_values_le) as usize;
        let scalar = ScalarType::from_wire(hdr.scalar).ok_or_else(|| {
            MeshError::decode(format!("unknown scalar code {} for `{name}`", hdr.scalar))
        })?;
        let values = match scalar {
            ScalarType::F64 => ArrayValues::F64(take_vec(buf, n)?),
            ScalarType::F32 => ArrayValues::F32(take_vec(buf, n)?),
            ScalarType::I64 => ArrayValues::I64(take_vec(buf, n)?),
            ScalarType::I32 => ArrayValues::I32(take_vec(buf, n)?),
            ScalarType::U64 => ArrayValues::U64(take_vec(buf, n)?),
            ScalarType::U32 => ArrayValues::U32(take_vec(buf, n)?),
            ScalarType::U8 => ArrayValues::U8(take_vec(buf, n)?),
            ScalarType::Text => return Err(MeshError::decode("text arrays are not decodable")),
        };
        let components = u32::from_le(hdr.components_le) as usize;
        fd.add(DataArray::new(name, components, values)?)?;
    }
    Ok(fd)
}

/// Layout: header, counts, points, type codes, offsets, connectivity, point
/// arrays, cell arrays.
impl WirePayload for UnstructuredGrid {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), MeshError> {
        self.point_data.check_serializable()?;
        self.cell_data.check_serializable()?;
        put_hdr(buf, kind::GRID);
        put_record(buf, &WireGridCounts::of(self));
        put_slice(buf, self.points());
        for &ct in self.cell_types() {
            buf.put_u8(ct.to_wire());
        }
        let mut end = 0u64;
        for c in 0..self.num_cells() {
            end += self.cell_points(c).len() as u64;
            buf.put_u64_le(end);
        }
        for c in 0..self.num_cells() {
            for &p in self.cell_points(c) {
                buf.put_u64_le(p as u64);
            }
        }
        put_field_data(buf, &self.point_data);
        put_field_data(buf, &self.cell_data);
        Ok(())
    }

    fn decode(mut buf: Bytes) -> Result<Self, MeshError> {
        take_hdr(&mut buf, kind::GRID)?;
        let counts: WireGridCounts = take_record(&mut buf)?;
        let n_points = u64::from_le(counts.n_points_le) as usize;
        let n_cells = u64::from_le(counts.n_cells_le) as usize;
        let n_conn = u64::from_le(counts.n_conn_le) as usize;

        let points: Vec<[f64; 3]> = take_vec(&mut buf, n_points)?;
        let codes: Vec<u8> = take_vec(&mut buf, n_cells)?;
        let cell_types = codes
            .into_iter()
            .map(|c| {
                CellType::from_wire(c)
                    .ok_or_else(|| MeshError::decode(format!("unknown cell type code {c}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut offsets = Vec::with_capacity(n_cells + 1);
        offsets.push(0usize);
        offsets.extend(take_vec::<u64>(&mut buf, n_cells)?.into_iter().map(|o| o as usize));
        let connectivity: Vec<usize> = take_vec::<u64>(&mut buf, n_conn)?
            .into_iter()
            .map(|p| p as usize)
            .collect();
        let point_data = take_field_data(&mut buf, u32::from_le(counts.n_point_arrays_le) as usize)?;
        let cell_data = take_field_data(&mut buf, u32::from_le(counts.n_cell_arrays_le) as usize)?;
        expect_consumed(&buf)?;
        UnstructuredGrid::from_raw_parts(
            points,
            cell_types,
            offsets,
            connectivity,
            point_data,
            cell_data,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged_triangle() -> UnstructuredGrid {
        let mut g = UnstructuredGrid::from_cells(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            &[(CellType::Triangle, vec![0, 1, 2])],
        )
        .unwrap();
        g.point_data
            .add(DataArray::new("vel", 3, ArrayValues::F32(vec![1.0; 9])).unwrap())
            .unwrap();
        g.cell_data.add(DataArray::from_i64("id", vec![42])).unwrap();
        g
    }

    #[test]
    fn grid_survives_the_wire() {
        let g = tagged_triangle();
        let bytes = g.to_bytes().unwrap();
        let back = UnstructuredGrid::decode(bytes).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn text_arrays_are_rejected() {
        let mut g = tagged_triangle();
        g.cell_data
            .add(DataArray::new("label", 1, ArrayValues::Text(vec!["a".into()])).unwrap())
            .unwrap();
        let err = g.to_bytes().unwrap_err();
        assert!(matches!(err, MeshError::UnsupportedArrayType { ref name, .. } if name == "label"));
    }

    #[test]
    fn truncated_and_foreign_payloads_fail() {
        let bytes = tagged_triangle().to_bytes().unwrap();
        let short = bytes.slice(..bytes.len() - 3);
        assert!(matches!(
            UnstructuredGrid::decode(short),
            Err(MeshError::WireDecode(_))
        ));
        let ids = vec![1u64, 2, 3].to_bytes().unwrap();
        assert!(UnstructuredGrid::decode(ids).is_err());
    }

    #[test]
    fn version_guard() {
        let hdr = WireHdr::new(kind::GRID);
        assert_eq!(hdr.version(), WIRE_VERSION);
        let mut buf = BytesMut::new();
        put_record(
            &mut buf,
            &WireHdr {
                version_le: 9u16.to_le(),
                ..hdr
            },
        );
        let err = take_hdr(&mut buf.freeze(), kind::GRID).unwrap_err();
        assert!(matches!(err, MeshError::WireVersion { got: 9, .. }));
    }

    #[test]
    fn coordinate_lists() {
        let pts = vec![[0.5, -1.0, 2.0], [3.0, 4.0, 5.0]];
        let back = Vec::<[f64; 3]>::decode(pts.to_bytes().unwrap()).unwrap();
        assert_eq!(back, pts);
    }
}
