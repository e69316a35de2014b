//! Block partitioning of a volume into equal cubes.
//!
//! Blocks are numbered in row-major order of their grid coordinates with X
//! slowest and Z fastest: `index = (gx * GY + gy) * GZ + gz`. The same
//! order is used by [`partition`], [`reassemble`] and the codec.

use ndarray::{Array3, ArrayView3, s};

use crate::enums::{PaddingMode, Stage};
use crate::error::{CodecError, Result};

pub const MAX_BLOCK_SIZE: usize = 64;

/// Geometry of a block tiling: original shape, padding and grid shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockGrid {
    block_size: usize,
    shape: [usize; 3],
    padding: [usize; 3],
    grid: [usize; 3],
}

impl BlockGrid {
    pub fn new(shape: (usize, usize, usize), block_size: usize) -> Result<Self> {
        validate_block_size(block_size)?;
        let shape = [shape.0, shape.1, shape.2];
        if shape.contains(&0) {
            return Err(CodecError::shape(
                Stage::Partition,
                format!("volume dimensions must be non-zero, got {shape:?}"),
            ));
        }
        let padding = shape.map(|dim| (block_size - dim % block_size) % block_size);
        let grid = shape.map(|dim| dim.div_ceil(block_size));
        let padded_len = grid
            .iter()
            .try_fold(block_size.pow(3), |acc, &g| acc.checked_mul(g));
        if padded_len.is_none_or(|len| len > isize::MAX as usize / size_of::<f32>()) {
            return Err(CodecError::shape(
                Stage::Partition,
                format!("volume {shape:?} is too large to tile"),
            ));
        }
        Ok(Self {
            block_size,
            shape,
            padding,
            grid,
        })
    }

    /// Rebuild a grid from recorded parts, checking that the padding is the
    /// one the shape and block size imply.
    pub fn from_parts(
        shape: (usize, usize, usize),
        block_size: usize,
        padding: (usize, usize, usize),
    ) -> Result<Self> {
        let grid = Self::new(shape, block_size)?;
        let padding = [padding.0, padding.1, padding.2];
        if grid.padding != padding {
            return Err(CodecError::shape(
                Stage::Parse,
                format!(
                    "recorded padding {padding:?} does not match shape {:?} with block size {block_size} (expected {:?})",
                    grid.shape, grid.padding
                ),
            ));
        }
        Ok(grid)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Samples per block.
    pub fn block_len(&self) -> usize {
        self.block_size.pow(3)
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.shape[0], self.shape[1], self.shape[2])
    }

    pub fn padding(&self) -> (usize, usize, usize) {
        (self.padding[0], self.padding[1], self.padding[2])
    }

    pub fn grid_shape(&self) -> (usize, usize, usize) {
        (self.grid[0], self.grid[1], self.grid[2])
    }

    pub fn padded_shape(&self) -> (usize, usize, usize) {
        let n = self.block_size;
        (self.grid[0] * n, self.grid[1] * n, self.grid[2] * n)
    }

    pub fn block_count(&self) -> usize {
        self.grid.iter().product()
    }

    /// Sample coordinate of the first voxel of block `index`.
    pub fn origin(&self, index: usize) -> [usize; 3] {
        let [_, gy, gz] = self.grid;
        let n = self.block_size;
        [(index / (gy * gz)) * n, ((index / gz) % gy) * n, (index % gz) * n]
    }

    /// Extent of block `index` that lies inside the original volume.
    fn extent(&self, origin: [usize; 3]) -> [usize; 3] {
        [0, 1, 2].map(|axis| (self.shape[axis] - origin[axis]).min(self.block_size))
    }

    /// Copy block `index` out of `volume`, filling the part that lies beyond
    /// the volume according to `mode`.
    pub fn extract(
        &self,
        volume: &ArrayView3<'_, f32>,
        index: usize,
        mode: PaddingMode,
    ) -> Array3<f32> {
        let n = self.block_size;
        let [ox, oy, oz] = self.origin(index);
        let [ex, ey, ez] = self.extent([ox, oy, oz]);

        let mut block = Array3::<f32>::zeros((n, n, n));
        block
            .slice_mut(s![..ex, ..ey, ..ez])
            .assign(&volume.slice(s![ox..ox + ex, oy..oy + ey, oz..oz + ez]));

        if mode == PaddingMode::Edge {
            // Z first, then Y, then X: each pass copies an already complete plane.
            if ez < n {
                let edge = block.slice(s![.., .., ez - 1..ez]).to_owned();
                block.slice_mut(s![.., .., ez..]).assign(&edge);
            }
            if ey < n {
                let edge = block.slice(s![.., ey - 1..ey, ..]).to_owned();
                block.slice_mut(s![.., ey.., ..]).assign(&edge);
            }
            if ex < n {
                let edge = block.slice(s![ex - 1..ex, .., ..]).to_owned();
                block.slice_mut(s![ex.., .., ..]).assign(&edge);
            }
        }
        block
    }

    /// Write the in-volume part of `block` into `volume` at block `index`.
    pub fn place(&self, volume: &mut Array3<f32>, index: usize, block: &ArrayView3<'_, f32>) {
        let [ox, oy, oz] = self.origin(index);
        let [ex, ey, ez] = self.extent([ox, oy, oz]);
        volume
            .slice_mut(s![ox..ox + ex, oy..oy + ey, oz..oz + ez])
            .assign(&block.slice(s![..ex, ..ey, ..ez]));
    }
}

pub(crate) fn validate_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 || block_size > MAX_BLOCK_SIZE {
        return Err(CodecError::shape(
            Stage::Validate,
            format!("block size must be in 1..={MAX_BLOCK_SIZE}, got {block_size}"),
        ));
    }
    Ok(())
}

/// A volume split into blocks, in grid order.
#[derive(Clone, Debug)]
pub struct Partition {
    pub grid: BlockGrid,
    pub blocks: Vec<Array3<f32>>,
}

pub fn partition(
    volume: &ArrayView3<'_, f32>,
    block_size: usize,
    mode: PaddingMode,
) -> Result<Partition> {
    let grid = BlockGrid::new(volume.dim(), block_size)?;
    let blocks = (0..grid.block_count())
        .map(|index| grid.extract(volume, index, mode))
        .collect();
    Ok(Partition { grid, blocks })
}

/// Stitch blocks back together and crop the padding recorded in `grid`.
pub fn reassemble(blocks: &[Array3<f32>], grid: &BlockGrid) -> Result<Array3<f32>> {
    if blocks.len() != grid.block_count() {
        return Err(CodecError::shape(
            Stage::Reassemble,
            format!(
                "grid {:?} needs {} blocks, got {}",
                grid.grid_shape(),
                grid.block_count(),
                blocks.len()
            ),
        ));
    }
    let n = grid.block_size();
    let mut volume = Array3::<f32>::zeros(grid.shape());
    for (index, block) in blocks.iter().enumerate() {
        if block.dim() != (n, n, n) {
            return Err(CodecError::shape(
                Stage::Reassemble,
                format!("block {index} has shape {:?}, expected ({n}, {n}, {n})", block.dim()),
            ));
        }
        grid.place(&mut volume, index, &block.view());
    }
    Ok(volume)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(shape: (usize, usize, usize)) -> Array3<f32> {
        Array3::from_shape_fn(shape, |(x, y, z)| (x * 100 + y * 10 + z) as f32)
    }

    #[test]
    fn padding_rounds_up_to_block_multiple() {
        let grid = BlockGrid::new((9, 9, 9), 8).unwrap();
        assert_eq!(grid.padding(), (7, 7, 7));
        assert_eq!(grid.grid_shape(), (2, 2, 2));
        assert_eq!(grid.padded_shape(), (16, 16, 16));

        let grid = BlockGrid::new((16, 3, 8), 8).unwrap();
        assert_eq!(grid.padding(), (0, 5, 0));
        assert_eq!(grid.block_count(), 2);
    }

    #[test]
    fn block_order_is_z_fastest() {
        let grid = BlockGrid::new((8, 16, 24), 8).unwrap();
        assert_eq!(grid.origin(0), [0, 0, 0]);
        assert_eq!(grid.origin(1), [0, 0, 8]);
        assert_eq!(grid.origin(3), [0, 8, 0]);
        assert_eq!(grid.origin(5), [0, 8, 16]);
    }

    #[test]
    fn invalid_block_sizes_are_rejected() {
        assert!(matches!(
            BlockGrid::new((4, 4, 4), 0),
            Err(CodecError::Shape { .. })
        ));
        assert!(matches!(
            BlockGrid::new((4, 4, 4), MAX_BLOCK_SIZE + 1),
            Err(CodecError::Shape { .. })
        ));
    }

    #[test]
    fn inconsistent_recorded_padding_is_rejected() {
        assert!(BlockGrid::from_parts((9, 9, 9), 8, (7, 7, 7)).is_ok());
        assert!(matches!(
            BlockGrid::from_parts((9, 9, 9), 8, (7, 0, 7)),
            Err(CodecError::Shape { .. })
        ));
    }

    #[test]
    fn edge_padding_replicates_last_sample() {
        let volume = ramp((3, 2, 1));
        let parts = partition(&volume.view(), 4, PaddingMode::Edge).unwrap();
        let block = &parts.blocks[0];
        assert_eq!(block[[3, 3, 3]], volume[[2, 1, 0]]);
        assert_eq!(block[[0, 3, 2]], volume[[0, 1, 0]]);
        assert_eq!(block[[2, 0, 3]], volume[[2, 0, 0]]);
    }

    #[test]
    fn zero_padding_fills_with_zero() {
        let volume = ramp((3, 3, 3)) + 1.0;
        let parts = partition(&volume.view(), 4, PaddingMode::Zero).unwrap();
        let block = &parts.blocks[0];
        assert_eq!(block[[2, 2, 2]], volume[[2, 2, 2]]);
        assert_eq!(block[[3, 0, 0]], 0.0);
        assert_eq!(block[[0, 0, 3]], 0.0);
    }

    #[test]
    fn partition_then_reassemble_is_identity() {
        for shape in [(9, 9, 9), (1, 1, 1), (8, 8, 8), (5, 17, 3)] {
            for block_size in [1, 2, 4, 8] {
                for mode in [PaddingMode::Edge, PaddingMode::Zero] {
                    let volume = ramp(shape);
                    let parts = partition(&volume.view(), block_size, mode).unwrap();
                    let back = reassemble(&parts.blocks, &parts.grid).unwrap();
                    assert_eq!(back, volume);
                }
            }
        }
    }

    #[test]
    fn reassemble_rejects_wrong_block_count() {
        let volume = ramp((9, 9, 9));
        let mut parts = partition(&volume.view(), 8, PaddingMode::Edge).unwrap();
        parts.blocks.pop();
        assert!(matches!(
            reassemble(&parts.blocks, &parts.grid),
            Err(CodecError::Shape { .. })
        ));
    }
}
