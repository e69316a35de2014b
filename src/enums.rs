use crate::error::{CodecError, Result};

/// Sample type of a volume.
///
/// The discriminant is the tag stored in the bitstream header and must never
/// change for an existing variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DType {
    U8 = 0,
    I8 = 1,
    U16 = 2,
    I16 = 3,
    F16 = 4,
    F32 = 5,
}

impl DType {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(DType::U8),
            1 => Ok(DType::I8),
            2 => Ok(DType::U16),
            3 => Ok(DType::I16),
            4 => Ok(DType::F16),
            5 => Ok(DType::F32),
            other => Err(CodecError::range(format!("unknown dtype tag {other}"))),
        }
    }

    /// Bytes per sample.
    pub fn size(self) -> usize {
        match self {
            DType::U8 | DType::I8 => 1,
            DType::U16 | DType::I16 | DType::F16 => 2,
            DType::F32 => 4,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::F32)
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::U8 => "u8",
            DType::I8 => "i8",
            DType::U16 => "u16",
            DType::I16 => "i16",
            DType::F16 => "f16",
            DType::F32 => "f32",
        }
    }
}

/// How the boundary of a volume is filled up to a whole number of blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum PaddingMode {
    /// Zero in the working domain (after the intensity map).
    Zero = 0,
    /// Replicate the last sample along each axis.
    #[default]
    Edge = 1,
}

impl PaddingMode {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(PaddingMode::Zero),
            1 => Ok(PaddingMode::Edge),
            other => Err(CodecError::range(format!("unknown padding mode {other}"))),
        }
    }
}

/// Pipeline stage, carried by errors so callers can tell where a call failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Partition,
    Transform,
    Quantize,
    Scan,
    Entropy,
    Frame,
    Parse,
    Reassemble,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Validate => "validate",
            Stage::Partition => "partition",
            Stage::Transform => "transform",
            Stage::Quantize => "quantize",
            Stage::Scan => "scan",
            Stage::Entropy => "entropy",
            Stage::Frame => "frame",
            Stage::Parse => "parse",
            Stage::Reassemble => "reassemble",
        };
        f.write_str(name)
    }
}
