//! Lossless coding of scanned coefficient sequences.
//!
//! The coding follows baseline JPEG. Each block's DC value is coded as the
//! difference from the previous block's DC. AC values are coded as
//! `(run, size)` symbols where `run` counts preceding zeros (0..=15) and
//! `size` is the magnitude category. Two special AC symbols exist:
//! [`EOB`] ends a block whose remaining coefficients are zero and [`ZRL`]
//! stands for sixteen zeros. Both alphabets get their own canonical Huffman
//! table derived from the symbol frequencies of the data.
//!
//! Segment layout:
//!
//! ```text
//! u32 LE   block count
//! table    DC huffman table
//! table    AC huffman table
//! bits     MSB-first bitstream, zero-padded to a whole byte
//! ```

pub mod bits;
pub mod huffman;

use tracing::trace;

use crate::enums::Stage;
use crate::error::{CodecError, Result};
use crate::quantize::MAX_QUANTIZED;

use bits::{BitReader, BitWriter};
use huffman::{HuffmanDecoder, HuffmanEncoder, HuffmanTable};

/// DC categories 0..=31 cover every difference of two quantized values.
pub const DC_ALPHABET: usize = 32;
/// AC symbols are `run << 5 | size`.
pub const AC_ALPHABET: usize = 512;
/// End of block.
pub const EOB: u16 = 0x000;
/// Sixteen zeros.
pub const ZRL: u16 = 15 << 5;

const MAX_AC_SIZE: u8 = 30;
const MAX_RUN: usize = 15;

/// Magnitude category: bits needed for `|value|`.
#[inline]
fn category(value: i64) -> u8 {
    (64 - value.unsigned_abs().leading_zeros()) as u8
}

/// Extra bits following a category symbol, one's complement for negatives.
#[inline]
fn extra_bits(value: i64, size: u8) -> u32 {
    if value >= 0 {
        value as u32
    } else {
        (value + (1i64 << size) - 1) as u32
    }
}

#[inline]
fn extend(raw: u32, size: u8) -> i64 {
    if size == 0 {
        return 0;
    }
    if raw < 1 << (size - 1) {
        raw as i64 - (1i64 << size) + 1
    } else {
        raw as i64
    }
}

/// One coded event: a symbol from the DC or AC alphabet plus extra bits.
#[derive(Clone, Copy, Debug)]
struct Token {
    dc: bool,
    symbol: u16,
    size: u8,
    extra: u32,
}

fn tokenize(values: &[i32], block_len: usize) -> Result<Vec<Token>> {
    let mut tokens = Vec::with_capacity(values.len() / 4);
    let mut previous_dc = 0i64;
    for (index, block) in values.chunks_exact(block_len).enumerate() {
        if let Some(v) = block.iter().find(|v| v.unsigned_abs() > MAX_QUANTIZED as u32) {
            return Err(CodecError::range(format!(
                "block {index}: coefficient {v} exceeds the codable magnitude {MAX_QUANTIZED}"
            )));
        }

        let dc = block[0] as i64;
        let diff = dc - previous_dc;
        previous_dc = dc;
        let size = category(diff);
        tokens.push(Token {
            dc: true,
            symbol: size as u16,
            size,
            extra: extra_bits(diff, size),
        });

        let mut run = 0usize;
        for &v in &block[1..] {
            if v == 0 {
                run += 1;
                continue;
            }
            while run > MAX_RUN {
                tokens.push(Token {
                    dc: false,
                    symbol: ZRL,
                    size: 0,
                    extra: 0,
                });
                run -= MAX_RUN + 1;
            }
            let size = category(v as i64);
            tokens.push(Token {
                dc: false,
                symbol: ((run as u16) << 5) | size as u16,
                size,
                extra: extra_bits(v as i64, size),
            });
            run = 0;
        }
        if run > 0 {
            tokens.push(Token {
                dc: false,
                symbol: EOB,
                size: 0,
                extra: 0,
            });
        }
    }
    Ok(tokens)
}

/// Entropy-code `values`, a concatenation of scanned blocks of `block_len`.
pub fn encode(values: &[i32], block_len: usize) -> Result<Vec<u8>> {
    if block_len == 0 || values.len() % block_len != 0 {
        return Err(CodecError::shape(
            Stage::Entropy,
            format!(
                "{} values do not form whole blocks of {block_len}",
                values.len()
            ),
        ));
    }
    let block_count = u32::try_from(values.len() / block_len).map_err(|_| {
        CodecError::range(format!(
            "{} blocks exceed the stream limit",
            values.len() / block_len
        ))
    })?;

    let tokens = tokenize(values, block_len)?;
    let mut dc_freqs = vec![0u32; DC_ALPHABET];
    let mut ac_freqs = vec![0u32; AC_ALPHABET];
    for token in &tokens {
        let freqs = if token.dc { &mut dc_freqs } else { &mut ac_freqs };
        freqs[token.symbol as usize] = freqs[token.symbol as usize].saturating_add(1);
    }
    let dc_table = HuffmanTable::from_frequencies(&dc_freqs);
    let ac_table = HuffmanTable::from_frequencies(&ac_freqs);
    trace!(
        dc_symbols = dc_table.symbol_count(),
        ac_symbols = ac_table.symbol_count(),
        tokens = tokens.len(),
        "built huffman tables"
    );

    let dc_encoder = dc_table.encoder();
    let ac_encoder = ac_table.encoder();
    let mut writer = BitWriter::with_capacity(tokens.len());
    for token in &tokens {
        let encoder: &HuffmanEncoder = if token.dc { &dc_encoder } else { &ac_encoder };
        encoder.write(&mut writer, token.symbol as usize)?;
        writer.write_bits(token.extra, token.size as u32);
    }

    let mut out = Vec::with_capacity(
        4 + dc_table.encoded_len() + ac_table.encoded_len() + writer.len(),
    );
    out.extend_from_slice(&block_count.to_le_bytes());
    dc_table.write(&mut out);
    ac_table.write(&mut out);
    out.extend_from_slice(&writer.finish());
    Ok(out)
}

/// Decode a segment written by [`encode`] into `expected_blocks` blocks of
/// `block_len` values.
pub fn decode(data: &[u8], block_len: usize, expected_blocks: usize) -> Result<Vec<i32>> {
    if block_len == 0 {
        return Err(CodecError::shape(Stage::Entropy, "block length must be non-zero"));
    }
    let count_bytes: [u8; 4] = data
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| CodecError::corrupt(Stage::Entropy, "missing block count"))?;
    let block_count = u32::from_le_bytes(count_bytes) as usize;
    if block_count != expected_blocks {
        return Err(CodecError::shape(
            Stage::Entropy,
            format!("stream holds {block_count} blocks, the grid needs {expected_blocks}"),
        ));
    }

    let mut offset = 4;
    let (dc_table, used) = HuffmanTable::read(&data[offset..], DC_ALPHABET)?;
    offset += used;
    let (ac_table, used) = HuffmanTable::read(&data[offset..], AC_ALPHABET)?;
    offset += used;
    trace!(
        dc_symbols = dc_table.symbol_count(),
        ac_symbols = ac_table.symbol_count(),
        "read huffman tables"
    );

    // Every block costs at least one bit.
    let available_bits = (data.len() - offset).saturating_mul(8);
    if block_count > available_bits {
        return Err(CodecError::corrupt(
            Stage::Entropy,
            format!("{block_count} blocks cannot fit in {available_bits} bits"),
        ));
    }

    let dc_decoder = dc_table.decoder();
    let ac_decoder = ac_table.decoder();
    let mut reader = BitReader::new(&data[offset..]);
    let mut values = vec![0i32; block_count * block_len];
    let mut previous_dc = 0i64;
    for (index, block) in values.chunks_exact_mut(block_len).enumerate() {
        previous_dc = decode_block(&mut reader, &dc_decoder, &ac_decoder, previous_dc, block)
            .map_err(|e| e.in_block(index))?;
    }
    reader.finish()?;
    Ok(values)
}

fn decode_block(
    reader: &mut BitReader<'_>,
    dc_decoder: &HuffmanDecoder,
    ac_decoder: &HuffmanDecoder,
    previous_dc: i64,
    block: &mut [i32],
) -> Result<i64> {
    let corrupt = |message: String| CodecError::corrupt(Stage::Entropy, message);

    let size = dc_decoder.decode(reader)? as u8;
    if size as usize >= DC_ALPHABET {
        return Err(corrupt(format!("invalid DC category {size}")));
    }
    let diff = extend(reader.read_bits(size as u32)?, size);
    let dc = previous_dc + diff;
    if dc.unsigned_abs() > MAX_QUANTIZED as u64 {
        return Err(corrupt(format!("DC value {dc} out of range")));
    }
    block[0] = dc as i32;

    let len = block.len();
    let mut pos = 1;
    while pos < len {
        let symbol = ac_decoder.decode(reader)?;
        let run = (symbol >> 5) as usize;
        let size = (symbol & 0x1F) as u8;
        match (run, size) {
            (0, 0) => return Ok(dc),
            (MAX_RUN, 0) => {
                pos += MAX_RUN + 1;
                if pos >= len {
                    return Err(corrupt("zero run overruns the block".to_string()));
                }
            }
            (_, 0) => return Err(corrupt(format!("invalid AC symbol {symbol:#x}"))),
            (_, size) if size > MAX_AC_SIZE => {
                return Err(corrupt(format!("invalid AC category {size}")));
            }
            (run, size) => {
                pos += run;
                if pos >= len {
                    return Err(corrupt("coefficient run overruns the block".to_string()));
                }
                block[pos] = extend(reader.read_bits(size as u32)?, size) as i32;
                pos += 1;
            }
        }
    }
    Ok(dc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_and_extra_bits() {
        assert_eq!(category(0), 0);
        assert_eq!(category(1), 1);
        assert_eq!(category(-1), 1);
        assert_eq!(category(255), 8);
        assert_eq!(category(-256), 9);
        for v in [-1000i64, -3, -1, 1, 2, 7, 1000] {
            let size = category(v);
            assert_eq!(extend(extra_bits(v, size), size), v);
        }
    }

    #[test]
    fn all_zero_blocks() {
        let values = vec![0i32; 64 * 5];
        let bytes = encode(&values, 64).unwrap();
        assert_eq!(decode(&bytes, 64, 5).unwrap(), values);
    }

    #[test]
    fn blocks_without_zeros() {
        let values: Vec<i32> = (0..27 * 3).map(|i| (i % 13) - 6).map(|v| if v == 0 { 9 } else { v }).collect();
        let bytes = encode(&values, 27).unwrap();
        assert_eq!(decode(&bytes, 27, 3).unwrap(), values);
    }

    #[test]
    fn long_zero_runs_use_zrl() {
        let mut values = vec![0i32; 512];
        values[0] = -40;
        values[40] = 3;
        values[300] = -MAX_QUANTIZED;
        values[511] = MAX_QUANTIZED;
        let bytes = encode(&values, 512).unwrap();
        assert_eq!(decode(&bytes, 512, 1).unwrap(), values);
    }

    #[test]
    fn extreme_dc_differences() {
        let values = vec![MAX_QUANTIZED, -MAX_QUANTIZED, MAX_QUANTIZED, 0];
        let bytes = encode(&values, 1).unwrap();
        assert_eq!(decode(&bytes, 1, 4).unwrap(), values);
    }

    #[test]
    fn out_of_range_value_is_rejected() {
        let values = vec![0, MAX_QUANTIZED + 1];
        assert!(matches!(encode(&values, 2), Err(CodecError::Range { .. })));
    }

    #[test]
    fn partial_block_is_shape_error() {
        assert!(matches!(
            encode(&[1, 2, 3], 2),
            Err(CodecError::Shape { .. })
        ));
    }

    #[test]
    fn block_count_mismatch_is_shape_error() {
        let bytes = encode(&[1, 0, 0, 0], 2).unwrap();
        assert!(matches!(
            decode(&bytes, 2, 3),
            Err(CodecError::Shape { .. })
        ));
    }

    #[test]
    fn truncated_stream_is_corrupt() {
        let values: Vec<i32> = (0..64 * 4).map(|i| ((i * 7919) % 23) - 11).collect();
        let bytes = encode(&values, 64).unwrap();
        for cut in [1, bytes.len() / 2, bytes.len() - 1] {
            assert!(matches!(
                decode(&bytes[..cut], 64, 4),
                Err(CodecError::CorruptStream { .. })
            ));
        }
    }

    #[test]
    fn trailing_bytes_are_corrupt() {
        let mut bytes = encode(&[5, 0, 0, 1], 4).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode(&bytes, 4, 1),
            Err(CodecError::CorruptStream { .. })
        ));
    }

    /// Assemble a segment from explicit code lengths and raw bits.
    fn segment(blocks: u32, dc: &[(usize, u8)], ac: &[(usize, u8)], bits: &[(u32, u32)]) -> Vec<u8> {
        let lengths = |alphabet: usize, codes: &[(usize, u8)]| {
            let mut lengths = vec![0u8; alphabet];
            for &(symbol, len) in codes {
                lengths[symbol] = len;
            }
            HuffmanTable::from_lengths(&lengths)
        };
        let mut out = blocks.to_le_bytes().to_vec();
        lengths(DC_ALPHABET, dc).write(&mut out);
        lengths(AC_ALPHABET, ac).write(&mut out);
        let mut writer = BitWriter::new();
        for &(value, n) in bits {
            writer.write_bits(value, n);
        }
        out.extend_from_slice(&writer.finish());
        out
    }

    #[test]
    fn unassigned_code_is_corrupt_in_block() {
        // DC table holds only "00"; the stream starts with ones.
        let bytes = segment(1, &[(0, 2)], &[(EOB as usize, 1)], &[(0xFFFF, 16)]);
        assert!(matches!(
            decode(&bytes, 4, 1),
            Err(CodecError::CorruptStream { block: Some(0), .. })
        ));
    }

    #[test]
    fn zero_size_symbol_other_than_eob_and_zrl_is_corrupt() {
        // DC category 0, then AC symbol (run 1, size 0).
        let bytes = segment(1, &[(0, 1)], &[(0x20, 1)], &[(0, 1), (0, 1)]);
        assert!(matches!(
            decode(&bytes, 8, 1),
            Err(CodecError::CorruptStream { block: Some(0), .. })
        ));
    }

    #[test]
    fn runs_past_block_end_are_corrupt() {
        let run15_size1 = (15 << 5) | 1;
        // Two (15, 1) symbols reach position 33; a third would land at 48.
        let bits = [(0, 1), (0, 1), (1, 1), (0, 1), (1, 1), (0, 1)];
        let bytes = segment(1, &[(0, 1)], &[(run15_size1, 1)], &bits);
        assert!(matches!(
            decode(&bytes, 40, 1),
            Err(CodecError::CorruptStream { block: Some(0), .. })
        ));

        // EOB ends block 0, then a zero run overruns block 1.
        let bits = [(0, 1), (0, 1), (0, 1), (1, 1)];
        let bytes = segment(2, &[(0, 1)], &[(EOB as usize, 1), (ZRL as usize, 1)], &bits);
        assert!(matches!(
            decode(&bytes, 8, 2),
            Err(CodecError::CorruptStream { block: Some(1), .. })
        ));
    }
}
