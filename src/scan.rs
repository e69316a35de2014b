//! 3D zig-zag scan order.
//!
//! Coefficients are visited plane by plane in increasing total frequency
//! `i + j + k`. Inside a plane the traversal direction flips with the
//! plane's parity, which is the 3D counterpart of JPEG's zig-zag.

use ndarray::{Array3, ArrayView3};

use crate::enums::Stage;
use crate::error::{CodecError, Result};
use crate::partition::validate_block_size;

/// Precomputed scan permutation for one block size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanOrder {
    size: usize,
    /// Scan position to row-major block index.
    order: Vec<usize>,
    /// Row-major block index to scan position.
    inverse: Vec<usize>,
}

impl ScanOrder {
    pub fn new(size: usize) -> Result<Self> {
        validate_block_size(size)?;
        let n = size;
        let mut coords: Vec<(usize, usize, usize)> = (0..n * n * n)
            .map(|idx| (idx / (n * n), (idx / n) % n, idx % n))
            .collect();
        coords.sort_by_key(|&(i, j, k)| {
            let plane = i + j + k;
            if plane % 2 == 0 {
                (plane, i, j)
            } else {
                (plane, n - 1 - i, n - 1 - j)
            }
        });

        let order: Vec<usize> = coords
            .into_iter()
            .map(|(i, j, k)| (i * n + j) * n + k)
            .collect();
        let mut inverse = vec![0; order.len()];
        for (position, &idx) in order.iter().enumerate() {
            inverse[idx] = position;
        }
        Ok(Self {
            size,
            order,
            inverse,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Row-major block index visited at each scan position.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Scan a row-major block slice into `out`.
    pub fn scan_into(&self, natural: &[i32], out: &mut [i32]) -> Result<()> {
        self.check_len(natural.len())?;
        self.check_len(out.len())?;
        for (slot, &idx) in out.iter_mut().zip(&self.order) {
            *slot = natural[idx];
        }
        Ok(())
    }

    /// Undo [`ScanOrder::scan_into`].
    pub fn unscan_into(&self, sequence: &[i32], out: &mut [i32]) -> Result<()> {
        self.check_len(sequence.len())?;
        self.check_len(out.len())?;
        for (slot, &position) in out.iter_mut().zip(&self.inverse) {
            *slot = sequence[position];
        }
        Ok(())
    }

    pub fn scan(&self, block: &ArrayView3<'_, i32>) -> Result<Vec<i32>> {
        let n = self.size;
        if block.dim() != (n, n, n) {
            return Err(CodecError::shape(
                Stage::Scan,
                format!("block has shape {:?}, expected ({n}, {n}, {n})", block.dim()),
            ));
        }
        let standard = block.as_standard_layout();
        let natural = standard.as_slice().unwrap_or_default();
        let mut sequence = vec![0; self.len()];
        self.scan_into(natural, &mut sequence)?;
        Ok(sequence)
    }

    pub fn unscan(&self, sequence: &[i32]) -> Result<Array3<i32>> {
        let n = self.size;
        let mut natural = vec![0; self.len()];
        self.unscan_into(sequence, &mut natural)?;
        Array3::from_shape_vec((n, n, n), natural)
            .map_err(|e| CodecError::shape(Stage::Scan, e.to_string()))
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.len() {
            return Err(CodecError::shape(
                Stage::Scan,
                format!("sequence has {len} values, block size {} needs {}", self.size, self.len()),
            ));
        }
        Ok(())
    }
}
