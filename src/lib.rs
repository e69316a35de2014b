//! # jvol
//!
//! JPEG-style lossy compression for 3D medical image volumes.
//!
//! JPEG's 8×8 image blocks become N×N×N cubes of voxels. A volume is
//! processed in these steps:
//!  - mapped into an `f32` working domain (intercept and slope are stored)
//!  - padded and split into equal blocks
//!  - transformed block by block with a separable orthonormal 3D DCT
//!  - quantized with a step table scaled by a quality in `1..=100`
//!  - serialized in a 3D zig-zag order
//!  - entropy coded (DC prediction, zero runs and canonical Huffman codes)
//!
//! Decoding mirrors these steps and crops the padding, returning a volume of
//! the original shape and sample type.
//!
//! Reading and writing medical image formats (DICOM, NIfTI, ...) is left to
//! the caller: the crate takes a dense [`ndarray::Array3`] (or raw bytes plus
//! shape and dtype) and returns a byte buffer, or the other way round.
//! Per-block work runs in parallel using rayon.
//!
//! # Examples
//!
//! ## Compressing a volume
//!
//! ```
//! # use jvol::{Codec, CodecConfig, Volume};
//! # use ndarray::Array3;
//! let samples = Array3::from_shape_fn((32, 32, 20), |(x, y, z)| (x * y + z) as u16);
//! let volume = Volume::try_from(samples).expect("dimensions should be non-zero");
//!
//! let codec = Codec::new(CodecConfig::default().with_quality(80))
//!     .expect("configuration should be valid");
//! let (bytes, stats) = codec
//!     .encode_with_stats(&volume)
//!     .expect("volume should encode");
//! println!("{stats}");
//!
//! let decoded = codec.decode(&bytes).expect("stream should decode");
//! assert_eq!(decoded.dim(), (32, 32, 20));
//! ```
//!
//! ## Working with raw buffers
//!
//! ```
//! # use jvol::{DType, Volume};
//! let raw = vec![0u8; 4 * 4 * 4 * 2];
//! let volume = Volume::from_raw_bytes(DType::I16, (4, 4, 4), &raw)
//!     .expect("buffer should match shape and dtype");
//! let bytes = jvol::encode(&volume).expect("volume should encode");
//! let decoded = jvol::decode(&bytes).expect("stream should decode");
//! assert_eq!(decoded.to_raw_bytes(), raw);
//! ```

pub mod codec;
pub mod container;
pub mod entropy;
pub mod enums;
pub mod error;
pub mod partition;
pub mod pool;
pub mod quantize;
pub mod sample;
pub mod scan;
pub mod transform;
pub mod volume;

pub use codec::{Codec, CodecConfig, CompressionStats, decode, encode};
pub use container::Header;
pub use enums::{DType, PaddingMode, Stage};
pub use error::{CodecError, Result};
pub use sample::{IntensityMap, Sample};
pub use volume::{Volume, VolumeData};
