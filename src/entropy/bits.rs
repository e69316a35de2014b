//! MSB-first bit I/O.

use crate::enums::Stage;
use crate::error::{CodecError, Result};

/// Bit writer packing the most significant bit first.
#[derive(Debug, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    bit_buf: u64,
    bit_count: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Write the low `n` bits of `value`, `n <= 32`.
    #[inline]
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32);
        if n == 0 {
            return;
        }
        let mask = (1u64 << n) - 1;
        self.bit_buf = (self.bit_buf << n) | (value as u64 & mask);
        self.bit_count += n;
        while self.bit_count >= 8 {
            self.bit_count -= 8;
            self.data.push((self.bit_buf >> self.bit_count) as u8);
        }
        self.bit_buf &= (1u64 << self.bit_count) - 1;
    }

    /// Flush remaining bits, padding the last byte with zeros.
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            self.data.push((self.bit_buf << (8 - self.bit_count)) as u8);
        }
        self.data
    }

    /// Length in bytes, counting a partial trailing byte.
    pub(crate) fn len(&self) -> usize {
        self.data.len() + usize::from(self.bit_count > 0)
    }
}

/// Bit reader matching [`BitWriter`].
///
/// Never buffers a whole unread byte: after every read fewer than 8 bits
/// are held back, so [`BitReader::finish`] can check the padding.
#[derive(Debug)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buf: u64,
    bit_count: u32,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_buf: 0,
            bit_count: 0,
        }
    }

    #[inline]
    fn fill(&mut self, n: u32) -> Result<()> {
        while self.bit_count < n {
            let Some(&byte) = self.data.get(self.pos) else {
                return Err(CodecError::corrupt(
                    Stage::Entropy,
                    format!("unexpected end of entropy stream after {} bytes", self.pos),
                ));
            };
            self.bit_buf = (self.bit_buf << 8) | byte as u64;
            self.bit_count += 8;
            self.pos += 1;
        }
        Ok(())
    }

    /// Read `n` bits, `n <= 32`.
    #[inline]
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        debug_assert!(n <= 32);
        if n == 0 {
            return Ok(0);
        }
        self.fill(n)?;
        self.bit_count -= n;
        let value = (self.bit_buf >> self.bit_count) & ((1u64 << n) - 1);
        self.bit_buf &= (1u64 << self.bit_count) - 1;
        Ok(value as u32)
    }

    #[inline]
    pub fn read_bit(&mut self) -> Result<u32> {
        self.read_bits(1)
    }

    /// Check that the input is used up and the final padding bits are zero.
    pub fn finish(self) -> Result<()> {
        if self.pos != self.data.len() {
            return Err(CodecError::corrupt(
                Stage::Entropy,
                format!(
                    "{} undecoded bytes after the last block",
                    self.data.len() - self.pos
                ),
            ));
        }
        if self.bit_buf != 0 {
            return Err(CodecError::corrupt(
                Stage::Entropy,
                "non-zero padding after the last block",
            ));
        }
        Ok(())
    }
}
