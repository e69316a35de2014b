//! End-to-end encode and decode.

use std::fmt;

use ndarray::Array3;
use tracing::debug;
use web_time::Instant;

use crate::container::{self, Header};
use crate::entropy;
use crate::enums::{PaddingMode, Stage};
use crate::error::{CodecError, Result};
use crate::partition::{BlockGrid, reassemble, validate_block_size};
use crate::pool::BlockPool;
use crate::quantize::{Quantizer, validate_quality};
use crate::scan::ScanOrder;
use crate::transform::Dct3;
use crate::volume::Volume;

pub const DEFAULT_BLOCK_SIZE: usize = 8;
pub const DEFAULT_QUALITY: u8 = 60;

/// Encoder settings. Decoding takes block size, quality and padding from
/// the stream header; only `threads` applies there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecConfig {
    pub block_size: usize,
    pub quality: u8,
    pub padding: PaddingMode,
    /// Worker threads; `None` uses the global rayon pool.
    pub threads: Option<usize>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            quality: DEFAULT_QUALITY,
            padding: PaddingMode::default(),
            threads: None,
        }
    }
}

impl CodecConfig {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_padding(mut self, padding: PaddingMode) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_block_size(self.block_size)?;
        validate_quality(self.quality)?;
        if self.threads == Some(0) {
            return Err(CodecError::range("thread count must be at least 1"));
        }
        Ok(())
    }
}

/// Size of a volume before and after encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompressionStats {
    pub raw_bytes: u64,
    pub compressed_bytes: u64,
}

impl CompressionStats {
    pub fn from_header(header: &Header) -> Self {
        Self {
            raw_bytes: header.raw_size(),
            compressed_bytes: header.total_len(),
        }
    }

    /// Raw size divided by compressed size.
    pub fn ratio(&self) -> f64 {
        if self.compressed_bytes == 0 {
            return 0.0;
        }
        self.raw_bytes as f64 / self.compressed_bytes as f64
    }
}

impl fmt::Display for CompressionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} bytes ({:.2}x)",
            self.raw_bytes,
            self.compressed_bytes,
            self.ratio()
        )
    }
}

/// Per-block-size precomputed state.
#[derive(Debug)]
struct BlockTools {
    dct: Dct3,
    scan: ScanOrder,
    quantizer: Quantizer,
}

impl BlockTools {
    fn new(block_size: usize) -> Result<Self> {
        Ok(Self {
            dct: Dct3::new(block_size)?,
            scan: ScanOrder::new(block_size)?,
            quantizer: Quantizer::new(block_size)?,
        })
    }
}

/// Reusable codec. Transform basis, scan order and quantization tables are
/// built once and shared by every call.
#[derive(Debug)]
pub struct Codec {
    config: CodecConfig,
    tools: BlockTools,
    pool: BlockPool,
}

impl Codec {
    pub fn new(config: CodecConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            tools: BlockTools::new(config.block_size)?,
            pool: BlockPool::new(config.threads),
            config,
        })
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn encode(&self, volume: &Volume) -> Result<Vec<u8>> {
        self.encode_with_stats(volume).map(|(bytes, _)| bytes)
    }

    pub fn encode_with_stats(&self, volume: &Volume) -> Result<(Vec<u8>, CompressionStats)> {
        let started = Instant::now();
        let CodecConfig {
            block_size,
            quality,
            padding,
            ..
        } = self.config;

        let map = volume.intensity_map()?;
        let working = volume.to_working(&map);
        let grid = BlockGrid::new(volume.dim(), block_size)?;
        debug!(
            shape = ?volume.dim(),
            dtype = volume.dtype().name(),
            grid = ?grid.grid_shape(),
            padding = ?grid.padding(),
            block_size,
            quality,
            "encode: validated and partitioned"
        );

        let table = self.tools.quantizer.table(quality)?;
        let block_len = grid.block_len();
        let mut scanned = vec![0i32; grid.block_count() * block_len];
        let view = working.view();
        let tools = &self.tools;
        self.pool.fill_slots(&mut scanned, block_len, |index, slot| {
            let mut block = grid.extract(&view, index, padding);
            tools.dct.forward_in_place(&mut block)?;
            let quantized = table.quantize(&block.view())?;
            let natural = quantized.as_standard_layout();
            tools.scan.scan_into(natural.as_slice().unwrap_or_default(), slot)
        })?;
        drop(working);
        debug!(
            blocks = grid.block_count(),
            threads = self.pool.threads(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "encode: blocks transformed, quantized and scanned"
        );

        let payload = entropy::encode(&scanned, block_len)?;
        let header = Header::for_grid(&grid, volume.dtype(), padding, quality, map)?;
        let bytes = container::write(&header, &payload);
        let stats = CompressionStats {
            raw_bytes: volume.byte_size() as u64,
            compressed_bytes: bytes.len() as u64,
        };
        debug!(
            payload_bytes = payload.len(),
            %stats,
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "encode: framed"
        );
        Ok((bytes, stats))
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Volume> {
        let started = Instant::now();
        let (header, payload) = container::read(bytes)?;
        let grid = header.grid()?;
        debug!(
            shape = ?grid.shape(),
            dtype = header.dtype.name(),
            block_size = grid.block_size(),
            quality = header.quality,
            payload_bytes = payload.len(),
            "decode: header parsed"
        );

        let owned;
        let tools = if grid.block_size() == self.tools.dct.size() {
            &self.tools
        } else {
            owned = BlockTools::new(grid.block_size())?;
            &owned
        };
        let table = tools.quantizer.table(header.quality)?;
        let block_len = grid.block_len();

        let scanned = entropy::decode(payload, block_len, grid.block_count())?;
        debug!(
            blocks = grid.block_count(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "decode: entropy decoded"
        );

        let blocks: Vec<Array3<f32>> = self.pool.map_blocks(grid.block_count(), |index| {
            let sequence = &scanned[index * block_len..(index + 1) * block_len];
            let quantized = tools.scan.unscan(sequence)?;
            let mut block = table.dequantize(&quantized.view())?;
            tools.dct.inverse_in_place(&mut block)?;
            Ok(block)
        })?;
        drop(scanned);

        let working = reassemble(&blocks, &grid)?;
        drop(blocks);
        let volume = Volume::from_working(&working, header.dtype, &header.intensity)?;
        if volume.dim() != header.dim() {
            return Err(CodecError::shape(
                Stage::Reassemble,
                format!(
                    "decoded shape {:?} differs from header shape {:?}",
                    volume.dim(),
                    header.dim()
                ),
            ));
        }
        debug!(
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "decode: reassembled and cropped"
        );
        Ok(volume)
    }

    /// Header and size figures of a stream, without decoding it.
    pub fn inspect(bytes: &[u8]) -> Result<(Header, CompressionStats)> {
        let header = Header::inspect(bytes)?;
        let stats = CompressionStats::from_header(&header);
        Ok((header, stats))
    }
}

/// Encode with the default configuration.
pub fn encode(volume: &Volume) -> Result<Vec<u8>> {
    Codec::new(CodecConfig::default())?.encode(volume)
}

/// Decode any stream produced by [`encode`] or [`Codec::encode`].
pub fn decode(bytes: &[u8]) -> Result<Volume> {
    Codec::new(CodecConfig::default())?.decode(bytes)
}
