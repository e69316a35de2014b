use half::f16;
use ndarray::{Array3, ArrayView3};

use crate::enums::{DType, Stage};
use crate::error::{CodecError, Result};
use crate::sample::{IntensityMap, Sample};

/// Voxel storage, one variant per supported sample type.
#[derive(Clone, Debug, PartialEq)]
pub enum VolumeData {
    U8(Array3<u8>),
    I8(Array3<i8>),
    U16(Array3<u16>),
    I16(Array3<i16>),
    F16(Array3<f16>),
    F32(Array3<f32>),
}

/// Dispatch `$body` over the typed array inside a [`VolumeData`].
macro_rules! with_typed {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            VolumeData::U8($arr) => $body,
            VolumeData::I8($arr) => $body,
            VolumeData::U16($arr) => $body,
            VolumeData::I16($arr) => $body,
            VolumeData::F16($arr) => $body,
            VolumeData::F32($arr) => $body,
        }
    };
}

/// A dense 3D voxel array with shape (X, Y, Z).
///
/// Axis 0 is X, axis 1 is Y and axis 2 is Z. All three dimensions are
/// non-zero and the sample type is fixed for the lifetime of the volume.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    data: VolumeData,
}

impl Volume {
    pub fn new(data: VolumeData) -> Result<Self> {
        let (x, y, z) = with_typed!(&data, arr => arr.dim());
        if x == 0 || y == 0 || z == 0 {
            return Err(CodecError::shape(
                Stage::Validate,
                format!("volume dimensions must be non-zero, got ({x}, {y}, {z})"),
            ));
        }
        Ok(Self { data })
    }

    /// Build a volume from native-endian raw sample bytes.
    pub fn from_raw_bytes(dtype: DType, shape: (usize, usize, usize), bytes: &[u8]) -> Result<Self> {
        let expected = [shape.0, shape.1, shape.2]
            .iter()
            .try_fold(dtype.size(), |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| {
                CodecError::shape(
                    Stage::Validate,
                    format!("{shape:?} volume of {} overflows the address space", dtype.name()),
                )
            })?;
        if bytes.len() != expected {
            return Err(CodecError::shape(
                Stage::Validate,
                format!(
                    "{} bytes do not hold a {:?} volume of {} ({expected} bytes expected)",
                    bytes.len(),
                    shape,
                    dtype.name()
                ),
            ));
        }
        let data = match dtype {
            DType::U8 => Self::data_from_bytes::<u8>(shape, bytes)?,
            DType::I8 => Self::data_from_bytes::<i8>(shape, bytes)?,
            DType::U16 => Self::data_from_bytes::<u16>(shape, bytes)?,
            DType::I16 => Self::data_from_bytes::<i16>(shape, bytes)?,
            DType::F16 => Self::data_from_bytes::<f16>(shape, bytes)?,
            DType::F32 => Self::data_from_bytes::<f32>(shape, bytes)?,
        };
        Self::new(data)
    }

    fn data_from_bytes<T: Sample>(
        shape: (usize, usize, usize),
        bytes: &[u8],
    ) -> Result<VolumeData> {
        let samples: Vec<T> = bytemuck::pod_collect_to_vec(bytes);
        Array3::from_shape_vec(shape, samples)
            .map(T::into_data)
            .map_err(|e| CodecError::shape(Stage::Validate, e.to_string()))
    }

    /// Native-endian raw sample bytes in standard (Z fastest) order.
    pub fn to_raw_bytes(&self) -> Vec<u8> {
        with_typed!(&self.data, arr => {
            let standard = arr.as_standard_layout();
            bytemuck::cast_slice(standard.as_slice().unwrap_or_default()).to_vec()
        })
    }

    /// Get the dimensions of the volume (X, Y, Z)
    pub fn dim(&self) -> (usize, usize, usize) {
        with_typed!(&self.data, arr => arr.dim())
    }

    pub fn dtype(&self) -> DType {
        match &self.data {
            VolumeData::U8(_) => DType::U8,
            VolumeData::I8(_) => DType::I8,
            VolumeData::U16(_) => DType::U16,
            VolumeData::I16(_) => DType::I16,
            VolumeData::F16(_) => DType::F16,
            VolumeData::F32(_) => DType::F32,
        }
    }

    pub fn len(&self) -> usize {
        let (x, y, z) = self.dim();
        x * y * z
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the raw samples in bytes.
    pub fn byte_size(&self) -> usize {
        self.len() * self.dtype().size()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &VolumeData {
        &self.data
    }

    pub fn into_data(self) -> VolumeData {
        self.data
    }

    /// Typed view of the samples if the volume holds `T`.
    pub fn view<T: Sample>(&self) -> Option<ArrayView3<'_, T>> {
        T::view_of(&self.data)
    }

    /// Fit the intensity map for this volume's samples.
    pub(crate) fn intensity_map(&self) -> Result<IntensityMap> {
        with_typed!(&self.data, arr => IntensityMap::fit(&arr.view()))
    }

    /// Map samples into the `f32` working domain.
    pub(crate) fn to_working(&self, map: &IntensityMap) -> Array3<f32> {
        with_typed!(&self.data, arr => map.to_working(&arr.view()))
    }

    /// Map a working-domain array back into a volume of `dtype`.
    pub(crate) fn from_working(
        working: &Array3<f32>,
        dtype: DType,
        map: &IntensityMap,
    ) -> Result<Self> {
        let data = match dtype {
            DType::U8 => u8::into_data(map.from_working(working)),
            DType::I8 => i8::into_data(map.from_working(working)),
            DType::U16 => u16::into_data(map.from_working(working)),
            DType::I16 => i16::into_data(map.from_working(working)),
            DType::F16 => f16::into_data(map.from_working(working)),
            DType::F32 => f32::into_data(map.from_working(working)),
        };
        Self::new(data)
    }
}

macro_rules! volume_from_array {
    ($ty:ty) => {
        impl TryFrom<Array3<$ty>> for Volume {
            type Error = CodecError;

            fn try_from(data: Array3<$ty>) -> Result<Self> {
                Volume::new(<$ty as Sample>::into_data(data))
            }
        }
    };
}

volume_from_array!(u8);
volume_from_array!(i8);
volume_from_array!(u16);
volume_from_array!(i16);
volume_from_array!(f16);
volume_from_array!(f32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dimension_is_rejected() {
        let err = Volume::try_from(Array3::<u8>::zeros((0, 4, 4))).unwrap_err();
        assert!(matches!(err, CodecError::Shape { .. }));
    }

    #[test]
    fn raw_bytes_round_trip() {
        let samples: Vec<u16> = (0..24).map(|v| v * 1000).collect();
        let bytes: Vec<u8> = bytemuck::cast_slice(&samples).to_vec();
        let volume = Volume::from_raw_bytes(DType::U16, (2, 3, 4), &bytes).unwrap();
        assert_eq!(volume.dim(), (2, 3, 4));
        assert_eq!(volume.dtype(), DType::U16);
        assert_eq!(volume.byte_size(), 48);
        assert_eq!(volume.view::<u16>().unwrap()[[1, 2, 3]], 23_000);
        assert_eq!(volume.to_raw_bytes(), bytes);
    }

    #[test]
    fn raw_bytes_length_mismatch_is_shape_error() {
        let err = Volume::from_raw_bytes(DType::F32, (2, 2, 2), &[0u8; 31]).unwrap_err();
        assert!(matches!(err, CodecError::Shape { .. }));
    }

    #[test]
    fn oversized_raw_shape_is_shape_error() {
        let err = Volume::from_raw_bytes(DType::U16, (usize::MAX / 2, 3, 1), &[0u8; 4]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Shape {
                stage: Stage::Validate,
                ..
            }
        ));
    }

    #[test]
    fn typed_view_checks_dtype() {
        let volume = Volume::try_from(Array3::<i16>::zeros((2, 2, 2))).unwrap();
        assert!(volume.view::<i16>().is_some());
        assert!(volume.view::<u16>().is_none());
    }
}
