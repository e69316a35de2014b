//! Separable 3D DCT.
//!
//! Orthonormal DCT-II along X, then Y, then Z. The inverse applies DCT-III
//! along Z, then Y, then X. Because every 1D pass is orthonormal the 3D
//! transform preserves energy, so a quantization error in the frequency
//! domain maps to the same squared error in the spatial domain.
//!
//! Block sizes are small (at most 64), so the direct O(n²) product with a
//! precomputed basis beats an FFT-based transform.

use ndarray::{Array2, Array3, ArrayView3, Axis};

use crate::enums::Stage;
use crate::error::{CodecError, Result};
use crate::partition::validate_block_size;

/// 3D DCT for one block size.
#[derive(Clone, Debug)]
pub struct Dct3 {
    size: usize,
    /// `basis[[k, i]]` is the weight of sample `i` in coefficient `k`.
    basis: Array2<f32>,
}

impl Dct3 {
    pub fn new(size: usize) -> Result<Self> {
        validate_block_size(size)?;
        let n = size as f64;
        let basis = Array2::from_shape_fn((size, size), |(k, i)| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            let angle = std::f64::consts::PI * (2 * i + 1) as f64 * k as f64 / (2.0 * n);
            (scale * angle.cos()) as f32
        });
        Ok(Self { size, basis })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn check(&self, dim: (usize, usize, usize)) -> Result<()> {
        let n = self.size;
        if dim != (n, n, n) {
            return Err(CodecError::shape(
                Stage::Transform,
                format!("block has shape {dim:?}, expected ({n}, {n}, {n})"),
            ));
        }
        Ok(())
    }

    pub fn forward(&self, block: &ArrayView3<'_, f32>) -> Result<Array3<f32>> {
        let mut coefficients = block.to_owned();
        self.forward_in_place(&mut coefficients)?;
        Ok(coefficients)
    }

    pub fn inverse(&self, coefficients: &ArrayView3<'_, f32>) -> Result<Array3<f32>> {
        let mut block = coefficients.to_owned();
        self.inverse_in_place(&mut block)?;
        Ok(block)
    }

    pub fn forward_in_place(&self, block: &mut Array3<f32>) -> Result<()> {
        self.check(block.dim())?;
        let mut scratch = vec![0.0f32; self.size];
        for axis in 0..3 {
            self.apply(block, Axis(axis), &mut scratch, false);
        }
        Ok(())
    }

    pub fn inverse_in_place(&self, block: &mut Array3<f32>) -> Result<()> {
        self.check(block.dim())?;
        let mut scratch = vec![0.0f32; self.size];
        for axis in (0..3).rev() {
            self.apply(block, Axis(axis), &mut scratch, true);
        }
        Ok(())
    }

    /// Run the 1D transform over every lane along `axis`.
    fn apply(&self, block: &mut Array3<f32>, axis: Axis, scratch: &mut [f32], inverse: bool) {
        for mut lane in block.lanes_mut(axis) {
            for (s, &v) in scratch.iter_mut().zip(lane.iter()) {
                *s = v;
            }
            for (out_idx, out) in lane.iter_mut().enumerate() {
                let mut sum = 0.0f32;
                if inverse {
                    for (k, &c) in scratch.iter().enumerate() {
                        sum += self.basis[[k, out_idx]] * c;
                    }
                } else {
                    for (i, &x) in scratch.iter().enumerate() {
                        sum += self.basis[[out_idx, i]] * x;
                    }
                }
                *out = sum;
            }
        }
    }
}
