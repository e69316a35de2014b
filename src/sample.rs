//! Casting between sample types and the `f32` working domain.

use bytemuck::Pod;
use half::f16;
use ndarray::{Array3, ArrayView3, Zip};

use crate::enums::DType;
use crate::error::{CodecError, Result};
use crate::volume::VolumeData;

/// Working-domain span used for float volumes: the data range is stretched
/// over as many steps as a 16-bit integer has.
const FLOAT_WORKING_SPAN: f64 = 65535.0;

/// A voxel sample type the codec knows how to cast.
pub trait Sample: Copy + Pod + Send + Sync + 'static {
    const DTYPE: DType;

    fn to_f64(self) -> f64;

    /// Convert back from the working domain, rounding and clipping to
    /// `[lo, hi]`.
    fn from_f64(value: f64, lo: f64, hi: f64) -> Self;

    fn into_data(array: Array3<Self>) -> VolumeData;

    fn view_of(data: &VolumeData) -> Option<ArrayView3<'_, Self>>;
}

macro_rules! wrap_variant {
    ($variant:ident) => {
        #[inline]
        fn into_data(array: Array3<Self>) -> VolumeData {
            VolumeData::$variant(array)
        }

        #[inline]
        fn view_of(data: &VolumeData) -> Option<ArrayView3<'_, Self>> {
            match data {
                VolumeData::$variant(array) => Some(array.view()),
                _ => None,
            }
        }
    };
}

macro_rules! integer_sample {
    ($ty:ty, $dtype:expr, $variant:ident) => {
        impl Sample for $ty {
            const DTYPE: DType = $dtype;

            wrap_variant!($variant);

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64, lo: f64, hi: f64) -> Self {
                value.round().clamp(lo, hi) as $ty
            }
        }
    };
}

integer_sample!(u8, DType::U8, U8);
integer_sample!(i8, DType::I8, I8);
integer_sample!(u16, DType::U16, U16);
integer_sample!(i16, DType::I16, I16);

impl Sample for f16 {
    const DTYPE: DType = DType::F16;

    wrap_variant!(F16);

    #[inline]
    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }

    #[inline]
    fn from_f64(value: f64, lo: f64, hi: f64) -> Self {
        f16::from_f64(value.clamp(lo, hi))
    }
}

impl Sample for f32 {
    const DTYPE: DType = DType::F32;

    wrap_variant!(F32);

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(value: f64, lo: f64, hi: f64) -> Self {
        value.clamp(lo, hi) as f32
    }
}

/// Linear map between samples and the working domain:
/// `w = (v - intercept) / slope`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntensityMap {
    pub intercept: f64,
    pub slope: f64,
}

impl IntensityMap {
    /// Integer types are centered on their representable midpoint.
    pub fn for_integer(dtype: DType) -> Self {
        let intercept = match dtype {
            DType::U8 => 128.0,
            DType::U16 => 32768.0,
            _ => 0.0,
        };
        Self {
            intercept,
            slope: 1.0,
        }
    }

    /// Float types are centered on the data midrange and scaled so the
    /// data range spans the 16-bit working range.
    pub fn for_float_range(min: f64, max: f64) -> Self {
        let range = max - min;
        let slope = if range > 0.0 {
            range / FLOAT_WORKING_SPAN
        } else {
            1.0
        };
        Self {
            intercept: min + range / 2.0,
            slope,
        }
    }

    pub fn fit<T: Sample>(data: &ArrayView3<'_, T>) -> Result<Self> {
        if !T::DTYPE.is_float() {
            return Ok(Self::for_integer(T::DTYPE));
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in data.iter() {
            let v = v.to_f64();
            if !v.is_finite() {
                return Err(CodecError::range("non-finite samples cannot be encoded"));
            }
            min = min.min(v);
            max = max.max(v);
        }
        Ok(Self::for_float_range(min, max))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.intercept.is_finite() || !self.slope.is_finite() || self.slope <= 0.0 {
            return Err(CodecError::range(format!(
                "invalid intensity map (intercept {}, slope {})",
                self.intercept, self.slope
            )));
        }
        Ok(())
    }

    /// Valid output range for `dtype` after decoding.
    pub fn bounds(&self, dtype: DType) -> (f64, f64) {
        match dtype {
            DType::U8 => (u8::MIN as f64, u8::MAX as f64),
            DType::I8 => (i8::MIN as f64, i8::MAX as f64),
            DType::U16 => (u16::MIN as f64, u16::MAX as f64),
            DType::I16 => (i16::MIN as f64, i16::MAX as f64),
            DType::F16 | DType::F32 => {
                let half_span = self.slope * FLOAT_WORKING_SPAN / 2.0;
                (self.intercept - half_span, self.intercept + half_span)
            }
        }
    }

    pub fn to_working<T: Sample>(&self, data: &ArrayView3<'_, T>) -> Array3<f32> {
        let (intercept, slope) = (self.intercept, self.slope);
        data.map(|&v| ((v.to_f64() - intercept) / slope) as f32)
    }

    pub fn from_working<T: Sample>(&self, working: &Array3<f32>) -> Array3<T> {
        let (lo, hi) = self.bounds(T::DTYPE);
        let (intercept, slope) = (self.intercept, self.slope);
        Zip::from(working).par_map_collect(|&w| T::from_f64(w as f64 * slope + intercept, lo, hi))
    }
}
