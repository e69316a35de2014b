//! Canonical Huffman codes built from symbol frequencies.
//!
//! Code lengths are limited to [`MAX_CODE_LEN`] with the JPEG (Annex K.2)
//! adjustment. Tables are stored as the number of codes per length followed
//! by the symbols in canonical order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::enums::Stage;
use crate::error::{CodecError, Result};

use super::bits::{BitReader, BitWriter};

pub const MAX_CODE_LEN: usize = 16;

/// Optimal code lengths for `freqs`, limited to [`MAX_CODE_LEN`] bits.
///
/// Symbols with zero frequency get length 0. A lone symbol gets a 1-bit code.
pub fn code_lengths(freqs: &[u32]) -> Vec<u8> {
    let mut lengths = vec![0u8; freqs.len()];
    let mut live: Vec<(usize, u32)> = freqs
        .iter()
        .enumerate()
        .filter(|&(_, &f)| f > 0)
        .map(|(symbol, &f)| (symbol, f))
        .collect();

    match live.len() {
        0 => return lengths,
        1 => {
            lengths[live[0].0] = 1;
            return lengths;
        }
        _ => {}
    }

    let m = live.len();
    let mut parent = vec![usize::MAX; 2 * m - 1];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = live
        .iter()
        .enumerate()
        .map(|(node, &(_, f))| Reverse((f as u64, node)))
        .collect();
    let mut next = m;
    while let (Some(Reverse((wa, a))), Some(Reverse((wb, b)))) = (heap.pop(), heap.pop()) {
        parent[a] = next;
        parent[b] = next;
        heap.push(Reverse((wa + wb, next)));
        next += 1;
    }

    // Count leaves per depth.
    let mut bits = vec![0u32; m + 1];
    let mut max_depth = 0;
    for leaf in 0..m {
        let mut depth = 0;
        let mut node = leaf;
        while parent[node] != usize::MAX {
            node = parent[node];
            depth += 1;
        }
        bits[depth] += 1;
        max_depth = max_depth.max(depth);
    }

    // Fold codes longer than MAX_CODE_LEN back into the tree.
    let mut depth = max_depth;
    while depth > MAX_CODE_LEN {
        while bits[depth] > 0 {
            let mut j = depth - 2;
            while bits[j] == 0 {
                j -= 1;
            }
            bits[depth] -= 2;
            bits[depth - 1] += 1;
            bits[j + 1] += 2;
            bits[j] -= 1;
        }
        depth -= 1;
    }

    // Shortest codes go to the most frequent symbols.
    live.sort_by_key(|&(symbol, f)| (Reverse(f), symbol));
    let mut symbols = live.iter();
    for (len, &count) in bits.iter().enumerate().take(MAX_CODE_LEN + 1) {
        for _ in 0..count {
            if let Some(&(symbol, _)) = symbols.next() {
                lengths[symbol] = len as u8;
            }
        }
    }
    lengths
}

/// A canonical Huffman table over an alphabet of `alphabet` symbols.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HuffmanTable {
    alphabet: usize,
    /// `counts[len]` codes of length `len`; index 0 unused.
    counts: [u16; MAX_CODE_LEN + 1],
    /// Symbols ordered by (code length, symbol).
    symbols: Vec<u16>,
}

impl HuffmanTable {
    pub fn from_frequencies(freqs: &[u32]) -> Self {
        Self::from_lengths(&code_lengths(freqs))
    }

    /// Build from per-symbol code lengths (`0` = unused).
    pub fn from_lengths(lengths: &[u8]) -> Self {
        let mut counts = [0u16; MAX_CODE_LEN + 1];
        let mut ordered: Vec<(u8, u16)> = Vec::new();
        for (symbol, &len) in lengths.iter().enumerate() {
            if len > 0 {
                counts[len as usize] += 1;
                ordered.push((len, symbol as u16));
            }
        }
        ordered.sort_unstable();
        Self {
            alphabet: lengths.len(),
            counts,
            symbols: ordered.into_iter().map(|(_, symbol)| symbol).collect(),
        }
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Serialized size in bytes.
    pub fn encoded_len(&self) -> usize {
        2 * MAX_CODE_LEN + 2 * self.symbols.len()
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        for &count in &self.counts[1..] {
            out.extend_from_slice(&count.to_le_bytes());
        }
        for &symbol in &self.symbols {
            out.extend_from_slice(&symbol.to_le_bytes());
        }
    }

    /// Parse a table from the front of `data`, returning it and the number
    /// of bytes consumed.
    pub fn read(data: &[u8], alphabet: usize) -> Result<(Self, usize)> {
        let corrupt = |message: String| CodecError::corrupt(Stage::Entropy, message);
        let header = data
            .get(..2 * MAX_CODE_LEN)
            .ok_or_else(|| corrupt("truncated huffman table".to_string()))?;

        let mut counts = [0u16; MAX_CODE_LEN + 1];
        let mut total = 0usize;
        let mut kraft = 0u64;
        for (len, chunk) in header.chunks_exact(2).enumerate() {
            let count = u16::from_le_bytes([chunk[0], chunk[1]]);
            counts[len + 1] = count;
            total += count as usize;
            kraft += (count as u64) << (MAX_CODE_LEN - (len + 1));
        }
        if total > alphabet {
            return Err(corrupt(format!(
                "huffman table declares {total} symbols for an alphabet of {alphabet}"
            )));
        }
        if kraft > 1 << MAX_CODE_LEN {
            return Err(corrupt("huffman code lengths overflow the code space".to_string()));
        }

        let body = data
            .get(2 * MAX_CODE_LEN..2 * MAX_CODE_LEN + 2 * total)
            .ok_or_else(|| corrupt("truncated huffman symbols".to_string()))?;
        let mut seen = vec![false; alphabet];
        let mut symbols = Vec::with_capacity(total);
        for chunk in body.chunks_exact(2) {
            let symbol = u16::from_le_bytes([chunk[0], chunk[1]]);
            let slot = seen
                .get_mut(symbol as usize)
                .ok_or_else(|| corrupt(format!("huffman symbol {symbol} out of range")))?;
            if *slot {
                return Err(corrupt(format!("huffman symbol {symbol} listed twice")));
            }
            *slot = true;
            symbols.push(symbol);
        }

        let table = Self {
            alphabet,
            counts,
            symbols,
        };
        Ok((table, 2 * MAX_CODE_LEN + 2 * total))
    }

    pub fn encoder(&self) -> HuffmanEncoder {
        let mut codes = vec![(0u32, 0u8); self.alphabet];
        let mut code = 0u32;
        let mut symbols = self.symbols.iter();
        for len in 1..=MAX_CODE_LEN {
            for _ in 0..self.counts[len] {
                if let Some(&symbol) = symbols.next() {
                    codes[symbol as usize] = (code, len as u8);
                }
                code += 1;
            }
            code <<= 1;
        }
        HuffmanEncoder { codes }
    }

    pub fn decoder(&self) -> HuffmanDecoder {
        let mut min_code = [0i32; MAX_CODE_LEN + 1];
        let mut max_code = [-1i32; MAX_CODE_LEN + 1];
        let mut val_ptr = [0usize; MAX_CODE_LEN + 1];
        let mut code = 0i32;
        let mut index = 0usize;
        for len in 1..=MAX_CODE_LEN {
            let count = self.counts[len] as usize;
            if count > 0 {
                val_ptr[len] = index;
                min_code[len] = code;
                code += count as i32;
                max_code[len] = code - 1;
                index += count;
            }
            code <<= 1;
        }
        HuffmanDecoder {
            min_code,
            max_code,
            val_ptr,
            symbols: self.symbols.clone(),
        }
    }
}

/// Symbol to (code, length) lookup.
#[derive(Clone, Debug)]
pub struct HuffmanEncoder {
    codes: Vec<(u32, u8)>,
}

impl HuffmanEncoder {
    /// Code and length for `symbol`; length 0 means the symbol has no code.
    #[inline]
    pub fn get(&self, symbol: usize) -> (u32, u8) {
        self.codes.get(symbol).copied().unwrap_or((0, 0))
    }

    pub fn write(&self, writer: &mut BitWriter, symbol: usize) -> Result<()> {
        let (code, len) = self.get(symbol);
        if len == 0 {
            return Err(CodecError::range(format!(
                "symbol {symbol} has no huffman code"
            )));
        }
        writer.write_bits(code, len as u32);
        Ok(())
    }
}

/// Bit-serial canonical decoder.
#[derive(Clone, Debug)]
pub struct HuffmanDecoder {
    min_code: [i32; MAX_CODE_LEN + 1],
    max_code: [i32; MAX_CODE_LEN + 1],
    val_ptr: [usize; MAX_CODE_LEN + 1],
    symbols: Vec<u16>,
}

impl HuffmanDecoder {
    pub fn decode(&self, reader: &mut BitReader<'_>) -> Result<u16> {
        let mut code = 0i32;
        for len in 1..=MAX_CODE_LEN {
            code = (code << 1) | reader.read_bit()? as i32;
            if code <= self.max_code[len] {
                let index = self.val_ptr[len] + (code - self.min_code[len]) as usize;
                return self.symbols.get(index).copied().ok_or_else(|| {
                    CodecError::corrupt(Stage::Entropy, "huffman code outside table")
                });
            }
        }
        Err(CodecError::corrupt(Stage::Entropy, "invalid huffman code"))
    }
}
