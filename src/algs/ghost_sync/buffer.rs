//! Message payload of the ghost synchronization.

use crate::algs::wire::{
    WireCellAddr, WireCount, WireHdr, WireReader, WireU64, WireWriter, compress, decompress,
    take_header,
};
use crate::data::DofIndex;
use crate::dof_error::DofError;
use crate::topology::forest::{MAX_REFINEMENT_LEVEL, TreeCell};

/// Cells addressed by forest position, optionally with their DoF indices.
///
/// Requests carry only addresses. Replies carry, per cell in the same order,
/// a run `[n, i_0, …, i_{n-1}]` in `dof_numbers_and_indices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellDataBuffer<const D: usize> {
    pub tree_index: Vec<u32>,
    pub quadrants: Vec<TreeCell<D>>,
    pub dof_numbers_and_indices: Vec<DofIndex>,
}

impl<const D: usize> Default for CellDataBuffer<D> {
    fn default() -> Self {
        Self {
            tree_index: Vec::new(),
            quadrants: Vec::new(),
            dof_numbers_and_indices: Vec::new(),
        }
    }
}

impl<const D: usize> CellDataBuffer<D> {
    pub fn len(&self) -> usize {
        self.tree_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree_index.is_empty()
    }

    pub fn push_cell(&mut self, tree: u32, quadrant: TreeCell<D>) {
        self.tree_index.push(tree);
        self.quadrants.push(quadrant);
    }

    pub fn push_indices(&mut self, indices: &[DofIndex]) {
        self.dof_numbers_and_indices.push(indices.len() as DofIndex);
        self.dof_numbers_and_indices.extend_from_slice(indices);
    }

    pub fn cells(&self) -> impl Iterator<Item = (u32, TreeCell<D>)> + '_ {
        self.tree_index.iter().copied().zip(self.quadrants.iter().copied())
    }

    /// Split the flat index array into one slice per cell.
    pub fn indices_per_cell(&self, from: usize) -> Result<Vec<&[DofIndex]>, DofError> {
        let mut out = Vec::with_capacity(self.len());
        let mut rest = &self.dof_numbers_and_indices[..];
        for _ in 0..self.len() {
            let malformed = || DofError::Wire {
                neighbor: from,
                reason: "index runs shorter than the cell list".into(),
            };
            let (&n, tail) = rest.split_first().ok_or_else(malformed)?;
            let n = n as usize;
            if tail.len() < n {
                return Err(malformed());
            }
            out.push(&tail[..n]);
            rest = &tail[n..];
        }
        if !rest.is_empty() {
            return Err(DofError::Wire {
                neighbor: from,
                reason: format!("{} index words past the last cell", rest.len()),
            });
        }
        Ok(out)
    }

    /// Serialize and compress; `to` names the receiver in errors.
    pub fn pack(
        &self,
        kind: u16,
        epoch: u32,
        compression: u32,
        to: usize,
    ) -> Result<Vec<u8>, DofError> {
        let wire = |reason: String| DofError::Wire {
            neighbor: to,
            reason,
        };
        let n_cells = WireCount::new(self.len()).map_err(wire)?;
        let n_words = WireCount::new(self.dof_numbers_and_indices.len()).map_err(wire)?;
        let mut w = WireWriter::new();
        w.put(&WireHdr::new(kind, epoch)).put(&n_cells);
        for (tree, q) in self.cells() {
            w.put(&WireCellAddr::new(tree, q.level, &q.coords));
        }
        w.put(&n_words);
        for &i in &self.dof_numbers_and_indices {
            w.put(&WireU64::of(i));
        }
        Ok(compress(&w.finish(), compression))
    }

    /// A message without cells, sent in place of one that could not be packed.
    pub fn pack_empty(kind: u16, epoch: u32, compression: u32) -> Vec<u8> {
        let none = WireCount { n_le: 0 };
        let mut w = WireWriter::new();
        w.put(&WireHdr::new(kind, epoch)).put(&none).put(&none);
        compress(&w.finish(), compression)
    }

    /// Inverse of [`pack`](Self::pack); `from` names the sender in errors.
    pub fn unpack(bytes: &[u8], kind: u16, epoch: u32, from: usize) -> Result<Self, DofError> {
        let wire = |reason: String| DofError::Wire {
            neighbor: from,
            reason,
        };
        let body = decompress(bytes).map_err(wire)?;
        let mut r = WireReader::new(&body);
        take_header(&mut r, kind, epoch).map_err(wire)?;
        let n_cells = r.take::<WireCount>().map_err(wire)?.get();
        let mut buf = Self::default();
        for _ in 0..n_cells {
            let a: WireCellAddr = r.take().map_err(wire)?;
            if a.level() > u32::from(MAX_REFINEMENT_LEVEL) {
                return Err(wire(format!("cell level {} out of range", a.level())));
            }
            let mut coords = [0u32; D];
            for (axis, c) in coords.iter_mut().enumerate() {
                *c = a.coord(axis);
            }
            buf.push_cell(
                a.tree(),
                TreeCell {
                    level: a.level() as u8,
                    coords,
                },
            );
        }
        let n_words = r.take::<WireCount>().map_err(wire)?.get();
        buf.dof_numbers_and_indices.reserve(n_words);
        for _ in 0..n_words {
            buf.dof_numbers_and_indices
                .push(r.take::<WireU64>().map_err(wire)?.get());
        }
        r.expect_end().map_err(wire)?;
        Ok(buf)
    }
}
