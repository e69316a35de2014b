//! Quality-scaled quantization of DCT coefficients.
//!
//! AC steps grow linearly with the total frequency index `i + j + k` from 16
//! at the lowest AC frequency to 112 at the highest, then are scaled by the
//! usual JPEG quality curve. Quality 100 gives a step of 1 everywhere.
//!
//! The DC step is fixed at 1 for every quality, so block means survive
//! quantization to within half a unit and constant volumes decode exactly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ndarray::{Array3, ArrayView3, Zip};

use crate::enums::Stage;
use crate::error::{CodecError, Result};
use crate::partition::validate_block_size;

pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

/// Largest magnitude a quantized coefficient may take.
pub const MAX_QUANTIZED: i32 = (1 << 30) - 1;

const DC_STEP: f32 = 1.0;
const AC_BASE_MIN: f32 = 16.0;
const AC_BASE_SPAN: f32 = 96.0;

pub fn validate_quality(quality: u8) -> Result<()> {
    if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
        return Err(CodecError::range(format!(
            "quality must be in {MIN_QUALITY}..={MAX_QUALITY}, got {quality}"
        )));
    }
    Ok(())
}

/// JPEG quality scaling, in percent.
fn quality_scale(quality: u8) -> f32 {
    let q = quality as f32;
    if quality < 50 { 5000.0 / q } else { 200.0 - 2.0 * q }
}

/// Step sizes for one block size and quality.
#[derive(Clone, Debug, PartialEq)]
pub struct QuantizationTable {
    quality: u8,
    steps: Array3<f32>,
}

impl QuantizationTable {
    pub fn new(block_size: usize, quality: u8) -> Result<Self> {
        validate_block_size(block_size)?;
        validate_quality(quality)?;
        let scale = quality_scale(quality);
        let max_freq = (3 * (block_size - 1)).max(1) as f32;
        let steps = Array3::from_shape_fn((block_size, block_size, block_size), |(i, j, k)| {
            let freq = i + j + k;
            if freq == 0 {
                return DC_STEP;
            }
            let base = AC_BASE_MIN + AC_BASE_SPAN * freq as f32 / max_freq;
            ((base * scale + 50.0) / 100.0).floor().max(1.0)
        });
        Ok(Self { quality, steps })
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn steps(&self) -> &Array3<f32> {
        &self.steps
    }

    fn check(&self, dim: (usize, usize, usize)) -> Result<()> {
        if dim != self.steps.dim() {
            return Err(CodecError::shape(
                Stage::Quantize,
                format!(
                    "block has shape {dim:?}, quantization table has {:?}",
                    self.steps.dim()
                ),
            ));
        }
        Ok(())
    }

    pub fn quantize(&self, coefficients: &ArrayView3<'_, f32>) -> Result<Array3<i32>> {
        self.check(coefficients.dim())?;
        Ok(Zip::from(coefficients)
            .and(&self.steps)
            .map_collect(|&c, &step| quantize_one(c, step)))
    }

    pub fn dequantize(&self, quantized: &ArrayView3<'_, i32>) -> Result<Array3<f32>> {
        self.check(quantized.dim())?;
        Ok(Zip::from(quantized)
            .and(&self.steps)
            .map_collect(|&q, &step| q as f32 * step))
    }
}

#[inline]
fn quantize_one(coefficient: f32, step: f32) -> i32 {
    let q = (coefficient / step).round() as i64;
    q.clamp(-(MAX_QUANTIZED as i64), MAX_QUANTIZED as i64) as i32
}

/// Quantizer for one block size, memoizing a table per quality value.
#[derive(Debug)]
pub struct Quantizer {
    block_size: usize,
    tables: Mutex<HashMap<u8, Arc<QuantizationTable>>>,
}

impl Quantizer {
    pub fn new(block_size: usize) -> Result<Self> {
        validate_block_size(block_size)?;
        Ok(Self {
            block_size,
            tables: Mutex::new(HashMap::new()),
        })
    }

    pub fn table(&self, quality: u8) -> Result<Arc<QuantizationTable>> {
        let mut tables = self
            .tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(table) = tables.get(&quality) {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(QuantizationTable::new(self.block_size, quality)?);
        tables.insert(quality, Arc::clone(&table));
        Ok(table)
    }

    pub fn quantize(&self, coefficients: &ArrayView3<'_, f32>, quality: u8) -> Result<Array3<i32>> {
        self.table(quality)?.quantize(coefficients)
    }

    pub fn dequantize(&self, quantized: &ArrayView3<'_, i32>, quality: u8) -> Result<Array3<f32>> {
        self.table(quality)?.dequantize(quantized)
    }
}
