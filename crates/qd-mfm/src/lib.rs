//! Modified Frequency Modulation: the line code the S-10's drive head reads
//! and writes, plus bit-accurate sync-word search over the raw cell stream.
//!
//! `encode`/`decode` convert between logical payload bytes and MFM cells.
//! `search_bits`/`sync` locate the framing sync word, which can legitimately
//! start at any of the 8 bit offsets within a byte — unlike the source this
//! is built on, a found offset of zero is never confused with "not found".

use std::fmt;

use qd_bitbuf::{get_bit, set_bit, shift_left};

/// The MFM encoding of seven `0x00` bytes followed by the `0xA5` delimiter,
/// after the bit-mirroring stage: `94 4A` repeated seven times, then `44 91`.
pub const SYNC_WORD: [u8; 16] = [
    0x94, 0x4A, 0x94, 0x4A, 0x94, 0x4A, 0x94, 0x4A, 0x94, 0x4A, 0x94, 0x4A, 0x94, 0x4A, 0x44, 0x91,
];

#[derive(Debug)]
pub enum MfmError {
    SyncNotFound,
}

impl fmt::Display for MfmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MfmError::SyncNotFound => write!(f, "MFM sync word not found"),
        }
    }
}

impl std::error::Error for MfmError {}

/// Encode `data` to MFM cells. Output is always exactly `2 * data.len()` bytes.
#[must_use]
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut output = vec![0u8; data.len() * 2];
    let mut last_data_bit = 0u8;
    let mut bit_offset = 0usize;

    for &byte in data {
        for shift in (0..8).rev() {
            let data_bit = (byte >> shift) & 1;
            let (clock, cell) = if data_bit == 1 {
                (false, true)
            } else if last_data_bit == 0 {
                (true, false)
            } else {
                (false, false)
            };
            set_bit(&mut output, bit_offset, clock);
            set_bit(&mut output, bit_offset + 1, cell);
            bit_offset += 2;
            last_data_bit = data_bit;
        }
    }

    output
}

/// Decode MFM cells back to payload bytes. Lossy for clock-bit violations:
/// a clock/data pair of `(1, 1)` or `(1, 0)` both decode to data bit `0`.
/// Walks until input is exhausted and returns `ceil(consumed_bits / 16)` bytes.
#[must_use]
pub fn decode(data: &[u8]) -> Vec<u8> {
    let input_bits = data.len() * 8;
    if input_bits == 0 {
        return Vec::new();
    }

    let mut output = Vec::new();
    let mut cur_byte = 0u8;
    let mut bit_mask = 0x80u8;
    let mut bit_offset = 0usize;

    loop {
        if bit_offset >= input_bits {
            break;
        }
        let c1 = get_bit(data, bit_offset);
        bit_offset += 1;
        let c2 = if bit_offset < input_bits { get_bit(data, bit_offset) } else { 0 };
        bit_offset += 1;

        if c1 == 0 && c2 == 1 {
            cur_byte |= bit_mask;
        }
        bit_mask >>= 1;
        if bit_mask == 0 {
            output.push(cur_byte);
            cur_byte = 0;
            bit_mask = 0x80;
        }

        if bit_offset >= input_bits {
            break;
        }
    }

    if bit_mask != 0x80 {
        output.push(cur_byte);
    }

    output
}

/// Eight bit-rotated copies of `word`, one per bit offset `0..8`, each the
/// same length as `word`. Copy `i`'s byte `j` combines the low `8-i` bits of
/// `word[j]` with the high `i` bits of `word[j-1]` (zero for `j == 0`).
fn rotated_copies(word: &[u8]) -> Vec<Vec<u8>> {
    let mut copies = vec![vec![0u8; word.len()]; 8];
    for (i, copy) in copies.iter_mut().enumerate() {
        let mut prev = 0u8;
        for (j, &b) in word.iter().enumerate() {
            copy[j] = prev | (b >> i);
            prev = if i == 0 { 0 } else { b << (8 - i) };
        }
    }
    copies
}

/// Find `word` in `data` at any bit offset. Returns the absolute bit offset
/// of the first match, or `None` if `word` does not occur — a match at bit
/// offset zero is a valid `Some(0)`, never confused with "not found".
#[must_use]
pub fn search_bits(data: &[u8], word: &[u8]) -> Option<u64> {
    let wlen = word.len();
    if wlen == 0 || data.len() < wlen {
        log::debug!("search_bits: input shorter than sync word, not found");
        return None;
    }

    let rotated = rotated_copies(word);

    for search_index in 0..=(data.len() - wlen) {
        for (i, rw) in rotated.iter().enumerate() {
            let middle_matches = (1..wlen).all(|j| rw[j] == data[search_index + j]);
            if !middle_matches {
                continue;
            }
            let first_mask = 0xFFu8 >> i;
            let first_ok = (rw[0] ^ data[search_index]) & first_mask == 0;
            if !first_ok {
                continue;
            }
            let last_mask = ((0xFFu32 << (8 - i)) & 0xFF) as u8;
            let last_ok = (rw[wlen - 1] ^ data[search_index + wlen - 1]) & last_mask == 0;
            if !last_ok {
                continue;
            }
            return Some((search_index as u64) * 8 + i as u64);
        }
    }

    None
}

/// Drop to bit `n` of `data`: remove the leading `n/8` bytes, then shift the
/// remainder left by `n % 8` bits (zero-filling the vacated tail).
fn offset(data: &[u8], n: u64) -> Vec<u8> {
    let byte_drop = (n / 8) as usize;
    let bit_rem = (n % 8) as u32;
    let mut tail = data[byte_drop.min(data.len())..].to_vec();
    shift_left(&mut tail, bit_rem);
    tail
}

/// Locate the `block`-th occurrence of the sync word and return the tail of
/// `data` starting there. Between occurrences, one extra bit is skipped past
/// the sync word's final `1` cell; the returned tail is not advanced past
/// the last occurrence found. `block == 0` returns `data` unchanged.
pub fn sync(data: &[u8], block: u32) -> Result<Vec<u8>, MfmError> {
    let mut tail = data.to_vec();

    for i in 0..block {
        let bit_offset = search_bits(&tail, &SYNC_WORD).ok_or_else(|| {
            log::warn!("sync: sync word not found");
            MfmError::SyncNotFound
        })?;
        tail = offset(&tail, bit_offset);
        if i + 1 < block {
            tail = offset(&tail, 1);
        }
    }

    Ok(tail)
}
