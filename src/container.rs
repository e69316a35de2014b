//! Bitstream framing: a fixed 68-byte header followed by the entropy-coded
//! payload.
//!
//! ```text
//! offset size field
//!      0    4 magic "JVOL"
//!      4    2 format version
//!      6    1 dtype tag
//!      7    1 padding mode
//!      8    2 block size
//!     10    1 quality
//!     11    1 reserved
//!     12   12 original shape, 3 x u32
//!     24   12 padding, 3 x u32
//!     36    8 intercept, f64
//!     44    8 slope, f64
//!     52    8 xxh3-64 checksum
//!     60    8 payload length, u64
//! ```
//!
//! All fields are little-endian. The checksum covers every header byte
//! except its own field, followed by the payload.

use xxhash_rust::xxh3::Xxh3;

use crate::enums::{DType, PaddingMode, Stage};
use crate::error::{CodecError, Result};
use crate::partition::BlockGrid;
use crate::quantize::validate_quality;
use crate::sample::IntensityMap;

pub const MAGIC: &[u8; 4] = b"JVOL";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 68;

/// Decoded header fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    pub dtype: DType,
    pub padding_mode: PaddingMode,
    pub block_size: u16,
    pub quality: u8,
    pub shape: [u32; 3],
    pub padding: [u32; 3],
    pub intensity: IntensityMap,
    pub checksum: u64,
    pub payload_len: u64,
}

impl Header {
    /// Header for a volume tiled by `grid`; checksum and payload length are
    /// filled in by [`write`].
    pub fn for_grid(
        grid: &BlockGrid,
        dtype: DType,
        padding_mode: PaddingMode,
        quality: u8,
        intensity: IntensityMap,
    ) -> Result<Self> {
        let to_u32 = |dim: usize| {
            u32::try_from(dim).map_err(|_| {
                CodecError::shape(
                    Stage::Frame,
                    format!("dimension {dim} does not fit the header"),
                )
            })
        };
        let (x, y, z) = grid.shape();
        let (px, py, pz) = grid.padding();
        let block_size = u16::try_from(grid.block_size()).map_err(|_| {
            CodecError::shape(Stage::Frame, "block size does not fit the header")
        })?;
        Ok(Self {
            dtype,
            padding_mode,
            block_size,
            quality,
            shape: [to_u32(x)?, to_u32(y)?, to_u32(z)?],
            padding: [to_u32(px)?, to_u32(py)?, to_u32(pz)?],
            intensity,
            checksum: 0,
            payload_len: 0,
        })
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        let [x, y, z] = self.shape.map(|d| d as usize);
        (x, y, z)
    }

    /// Block tiling described by the header, checked for consistency.
    pub fn grid(&self) -> Result<BlockGrid> {
        let [px, py, pz] = self.padding.map(|p| p as usize);
        BlockGrid::from_parts(self.dim(), self.block_size as usize, (px, py, pz))
    }

    /// Size of the decoded samples in bytes.
    pub fn raw_size(&self) -> u64 {
        self.shape.iter().map(|&d| d as u64).product::<u64>() * self.dtype.size() as u64
    }

    /// Size of the whole bitstream in bytes.
    pub fn total_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.payload_len
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[6] = self.dtype.tag();
        buf[7] = self.padding_mode.tag();
        buf[8..10].copy_from_slice(&self.block_size.to_le_bytes());
        buf[10] = self.quality;
        // buf[11] reserved, stays zero
        for (axis, dim) in self.shape.iter().enumerate() {
            buf[12 + 4 * axis..16 + 4 * axis].copy_from_slice(&dim.to_le_bytes());
        }
        for (axis, pad) in self.padding.iter().enumerate() {
            buf[24 + 4 * axis..28 + 4 * axis].copy_from_slice(&pad.to_le_bytes());
        }
        buf[36..44].copy_from_slice(&self.intensity.intercept.to_le_bytes());
        buf[44..52].copy_from_slice(&self.intensity.slope.to_le_bytes());
        buf[52..60].copy_from_slice(&self.checksum.to_le_bytes());
        buf[60..68].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    /// Parse and validate a header.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        if &buf[0..4] != MAGIC {
            return Err(CodecError::format("invalid magic bytes, not a jvol stream"));
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != FORMAT_VERSION {
            return Err(CodecError::format(format!(
                "unsupported format version {version}, expected {FORMAT_VERSION}"
            )));
        }
        let u32_at = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let u64_at = |at: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[at..at + 8]);
            u64::from_le_bytes(bytes)
        };

        let header = Self {
            dtype: DType::from_tag(buf[6])?,
            padding_mode: PaddingMode::from_tag(buf[7])?,
            block_size: u16::from_le_bytes([buf[8], buf[9]]),
            quality: buf[10],
            shape: [u32_at(12), u32_at(16), u32_at(20)],
            padding: [u32_at(24), u32_at(28), u32_at(32)],
            intensity: IntensityMap {
                intercept: f64::from_bits(u64_at(36)),
                slope: f64::from_bits(u64_at(44)),
            },
            checksum: u64_at(52),
            payload_len: u64_at(60),
        };
        header.validate()?;
        Ok(header)
    }

    pub fn validate(&self) -> Result<()> {
        validate_quality(self.quality)?;
        self.intensity.validate()?;
        self.grid()?;
        Ok(())
    }

    /// Read only the header of a bitstream, without touching the payload.
    pub fn inspect(bytes: &[u8]) -> Result<Self> {
        let buf: &[u8; HEADER_SIZE] = bytes
            .get(..HEADER_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                CodecError::format(format!(
                    "stream of {} bytes is shorter than the {HEADER_SIZE}-byte header",
                    bytes.len()
                ))
            })?;
        Self::from_bytes(buf)
    }
}

const CHECKSUM_FIELD: std::ops::Range<usize> = 52..60;

/// xxh3-64 over the serialized header, minus the checksum field, and the payload.
pub fn checksum(header: &[u8; HEADER_SIZE], payload: &[u8]) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(&header[..CHECKSUM_FIELD.start]);
    hasher.update(&header[CHECKSUM_FIELD.end..]);
    hasher.update(payload);
    hasher.digest()
}

/// Frame `payload` behind `header`, filling in checksum and payload length.
pub fn write(header: &Header, payload: &[u8]) -> Vec<u8> {
    let header = Header {
        payload_len: payload.len() as u64,
        ..header.clone()
    };
    let mut head = header.to_bytes();
    let sum = checksum(&head, payload);
    head[CHECKSUM_FIELD].copy_from_slice(&sum.to_le_bytes());

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&head);
    out.extend_from_slice(payload);
    out
}

/// Split a bitstream into its header and verified payload.
pub fn read(bytes: &[u8]) -> Result<(Header, &[u8])> {
    let header = Header::inspect(bytes)?;
    let available = (bytes.len() - HEADER_SIZE) as u64;
    if available < header.payload_len {
        return Err(CodecError::corrupt(
            Stage::Parse,
            format!(
                "payload truncated: header declares {} bytes, {available} present",
                header.payload_len
            ),
        ));
    }
    if available > header.payload_len {
        return Err(CodecError::format(format!(
            "{} trailing bytes after the declared payload",
            available - header.payload_len
        )));
    }
    let (head, payload) = bytes.split_at(HEADER_SIZE);
    let head: &[u8; HEADER_SIZE] = head
        .try_into()
        .map_err(|_| CodecError::format("header slice has the wrong length"))?;
    let actual = checksum(head, payload);
    if actual != header.checksum {
        return Err(CodecError::corrupt(
            Stage::Parse,
            format!(
                "checksum mismatch: stored {:#018x}, computed {actual:#018x}",
                header.checksum
            ),
        ));
    }
    Ok((header, payload))
}
