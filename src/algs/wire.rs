//! Fixed, versioned, little-endian wire types for the ghost synchronization.
//!
//! A message body is a concatenation of `#[repr(C)]` Pod records. Bodies are
//! zlib-compressed before they leave the rank; decoding never assumes the
//! received buffer is aligned.

use crate::data::index_set::IndexSet;
use bytemuck::{Pod, Zeroable};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use static_assertions::const_assert_eq;
use std::io::{Read, Write};
use std::mem::size_of;

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Message kinds.
pub const KIND_REQUEST: u16 = 1;
pub const KIND_REPLY: u16 = 2;
pub const KIND_INDEX_SET: u16 = 3;

/// All multi-byte integers in these structs are **little-endian** on the wire.

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    /// Pass number of the exchange this message belongs to.
    pub epoch_le: u32,
}

impl WireHdr {
    pub fn new(kind: u16, epoch: u32) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            epoch_le: epoch.to_le(),
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn epoch(&self) -> u32 {
        u32::from_le(self.epoch_le)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32,
}

impl WireCount {
    /// Fails if `n` does not fit the 32-bit field.
    pub fn new(n: usize) -> Result<Self, String> {
        let n = u32::try_from(n).map_err(|_| format!("count {n} exceeds the 32-bit wire field"))?;
        Ok(Self { n_le: n.to_le() })
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// Forest address of a cell: coarse tree plus level and coordinates.
/// Unused coordinates of lower-dimensional meshes are zero.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCellAddr {
    pub tree_le: u32,
    pub level_le: u32,
    pub coords_le: [u32; 3],
}

impl WireCellAddr {
    pub fn new(tree: u32, level: u8, coords: &[u32]) -> Self {
        let mut c = [0u32; 3];
        for (dst, &src) in c.iter_mut().zip(coords) {
            *dst = src.to_le();
        }
        Self {
            tree_le: tree.to_le(),
            level_le: u32::from(level).to_le(),
            coords_le: c,
        }
    }
    pub fn tree(&self) -> u32 {
        u32::from_le(self.tree_le)
    }
    pub fn level(&self) -> u32 {
        u32::from_le(self.level_le)
    }
    pub fn coord(&self, axis: usize) -> u32 {
        u32::from_le(self.coords_le[axis])
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireU64 {
    pub v_le: u64,
}

impl WireU64 {
    pub fn of(v: u64) -> Self {
        Self { v_le: v.to_le() }
    }
    pub fn get(&self) -> u64 {
        u64::from_le(self.v_le)
    }
}

/// Half-open index range `[start, end)`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireRange {
    pub start_le: u64,
    pub end_le: u64,
}

// ===== Compile-time sanity checks =========================================

const_assert_eq!(size_of::<WireHdr>(), 8);
const_assert_eq!(size_of::<WireCount>(), 4);
const_assert_eq!(size_of::<WireCellAddr>(), 20);
const_assert_eq!(size_of::<WireU64>(), 8);
const_assert_eq!(size_of::<WireRange>(), 16);

// ===== Encoding ===========================================================

/// Append-only record writer.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: Pod>(&mut self, rec: &T) -> &mut Self {
        self.buf.extend_from_slice(bytemuck::bytes_of(rec));
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Sequential reader over an unaligned byte buffer.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn take<T: Pod>(&mut self) -> Result<T, String> {
        let n = size_of::<T>();
        let bytes = self
            .buf
            .get(self.pos..self.pos + n)
            .ok_or_else(|| format!("truncated record at byte {} (need {n})", self.pos))?;
        self.pos += n;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    pub fn expect_end(&self) -> Result<(), String> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(format!("{} trailing bytes", self.buf.len() - self.pos))
        }
    }
}

/// Read and check a header of the expected kind and epoch.
pub fn take_header(r: &mut WireReader<'_>, kind: u16, epoch: u32) -> Result<WireHdr, String> {
    let hdr: WireHdr = r.take()?;
    if hdr.version() != WIRE_VERSION {
        return Err(format!("wire version {} != {WIRE_VERSION}", hdr.version()));
    }
    if hdr.kind() != kind {
        return Err(format!("message kind {} where {kind} was expected", hdr.kind()));
    }
    if hdr.epoch() != epoch {
        return Err(format!("message from pass {} during pass {epoch}", hdr.epoch()));
    }
    Ok(hdr)
}

/// Encode an index set as a 64-bit range count followed by its ranges.
pub fn encode_index_set(set: &IndexSet) -> Vec<u8> {
    let mut w = WireWriter::new();
    w.put(&WireHdr::new(KIND_INDEX_SET, 0))
        .put(&WireU64::of(set.size()))
        .put(&WireU64::of(set.n_intervals() as u64));
    for r in set.ranges() {
        w.put(&WireRange {
            start_le: r.start.to_le(),
            end_le: r.end.to_le(),
        });
    }
    w.finish()
}

pub fn decode_index_set(bytes: &[u8]) -> Result<IndexSet, String> {
    let mut r = WireReader::new(bytes);
    take_header(&mut r, KIND_INDEX_SET, 0)?;
    let size = r.take::<WireU64>()?.get();
    let n = r.take::<WireU64>()?.get();
    let mut set = IndexSet::new(size);
    for _ in 0..n {
        let rec: WireRange = r.take()?;
        set.add_range(u64::from_le(rec.start_le), u64::from_le(rec.end_le));
    }
    r.expect_end()?;
    Ok(set)
}

/// zlib-compress a message body.
pub fn compress(body: &[u8], level: u32) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::with_capacity(body.len() / 2), Compression::new(level));
    // writes into a Vec cannot fail
    let _ = enc.write_all(body);
    enc.finish().unwrap_or_default()
}

pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    ZlibDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| format!("corrupt compressed payload: {e}"))?;
    Ok(out)
}
