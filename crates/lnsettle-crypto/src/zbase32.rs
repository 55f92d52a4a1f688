//! z-base-32, the human-oriented base-32 encoding used by lnd payment
//! requests.
//!
//! Eight 5-bit symbols carry five bytes. Input is case-insensitive and
//! carries no padding; a final partial block yields the number of whole
//! bytes its symbols cover.

use crate::error::CodecError;

/// Symbol alphabet, ordered by value.
pub const ALPHABET: &[u8; 32] = b"ybndrfg8ejkmcpqxot1uwisza345h769";

const INVALID: u8 = 0xFF;

/// Bytes produced by a block of `n` symbols, for `n` in `0..=8`.
const TAIL_BYTES: [usize; 9] = [0, 1, 1, 2, 2, 3, 4, 4, 5];

const DECODE_MAP: [u8; 256] = build_decode_map();

const fn build_decode_map() -> [u8; 256] {
    let mut map = [INVALID; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        let symbol = ALPHABET[i];
        map[symbol as usize] = i as u8;
        map[symbol.to_ascii_uppercase() as usize] = i as u8;
        i += 1;
    }
    map
}

/// Buffer size needed to decode `n` symbols (whole blocks).
pub fn decoded_len(n: usize) -> usize {
    n.div_ceil(8) * 5
}

/// Number of bytes `n` symbols decode to, following the partial-block table.
pub fn decoded_len_exact(n: usize) -> usize {
    n / 8 * 5 + TAIL_BYTES[n % 8]
}

fn symbol_value(symbol: char) -> Option<u8> {
    if !symbol.is_ascii() {
        return None;
    }
    match DECODE_MAP[symbol as usize] {
        INVALID => None,
        value => Some(value),
    }
}

/// Decode a z-base-32 string.
pub fn decode(src: &str) -> Result<Vec<u8>, CodecError> {
    let values = src
        .chars()
        .enumerate()
        .map(|(position, symbol)| {
            symbol_value(symbol).ok_or(CodecError::InvalidSymbol { symbol, position })
        })
        .collect::<Result<Vec<u8>, CodecError>>()?;

    let mut out = Vec::with_capacity(decoded_len(values.len()));
    for chunk in values.chunks(8) {
        let mut b = [0u8; 8];
        b[..chunk.len()].copy_from_slice(chunk);

        let block = [
            b[0] << 3 | b[1] >> 2,
            b[1] << 6 | b[2] << 1 | b[3] >> 4,
            b[3] << 4 | b[4] >> 1,
            b[4] << 7 | b[5] << 2 | b[6] >> 3,
            b[6] << 5 | b[7],
        ];
        out.extend_from_slice(&block[..TAIL_BYTES[chunk.len()]]);
    }
    Ok(out)
}

/// Encode bytes as z-base-32 without padding.
pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
        buffer &= (1 << bits) - 1;
    }
    if bits > 0 {
        out.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}
