//! Error types for encode and decode.

use thiserror::Error;

use crate::enums::Stage;

pub type Result<T> = core::result::Result<T, CodecError>;

#[derive(Debug, Error)]
pub enum CodecError {
    /// Malformed or mismatched dimensions or block sizes.
    #[error("shape error during {stage}: {message}")]
    Shape { stage: Stage, message: String },

    /// Unrecognized, unsupported or truncated bitstream header.
    #[error("format error: {message}")]
    Format { message: String },

    /// Payload inconsistent with the lengths declared for it.
    #[error("corrupt stream during {stage}{}: {message}", block_suffix(.block))]
    CorruptStream {
        stage: Stage,
        block: Option<usize>,
        message: String,
    },

    /// Quality, dtype or sample value outside supported bounds.
    #[error("range error: {message}")]
    Range { message: String },
}

fn block_suffix(block: &Option<usize>) -> String {
    match block {
        Some(index) => format!(" (block {index})"),
        None => String::new(),
    }
}

impl CodecError {
    pub fn shape(stage: Stage, message: impl Into<String>) -> Self {
        CodecError::Shape {
            stage,
            message: message.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        CodecError::Format {
            message: message.into(),
        }
    }

    pub fn corrupt(stage: Stage, message: impl Into<String>) -> Self {
        CodecError::CorruptStream {
            stage,
            block: None,
            message: message.into(),
        }
    }

    pub fn corrupt_at(stage: Stage, block: usize, message: impl Into<String>) -> Self {
        CodecError::CorruptStream {
            stage,
            block: Some(block),
            message: message.into(),
        }
    }

    pub fn range(message: impl Into<String>) -> Self {
        CodecError::Range {
            message: message.into(),
        }
    }

    /// Attach a block index to a corrupt-stream error that has none yet.
    pub(crate) fn in_block(self, index: usize) -> Self {
        match self {
            CodecError::CorruptStream {
                stage,
                block: None,
                message,
            } => CodecError::CorruptStream {
                stage,
                block: Some(index),
                message,
            },
            other => other,
        }
    }

    /// Stable short name, usable as a metrics label.
    pub fn category(&self) -> &'static str {
        match self {
            CodecError::Shape { .. } => "shape",
            CodecError::Format { .. } => "format",
            CodecError::CorruptStream { .. } => "corrupt_stream",
            CodecError::Range { .. } => "range",
        }
    }
}
