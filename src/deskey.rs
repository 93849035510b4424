//! Conversion between NT hash segments and DES keys.
//!
//! DES keys are 8 bytes long, but only the upper 7 bits of each byte are used; the lowest bit is a
//! parity bit. NTLMv1 spreads each 7-byte segment of the NT hash over the 56 key bits. Once a DES
//! key has been recovered, the corresponding NT hash segment is obtained by dropping the parity
//! bits again.


use std::fmt;


/// An error that may occur while reading a recovered key or hash fragment.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum KeyError {
    /// The value has a different number of hex characters than expected.
    UnexpectedLength { expected: usize, obtained: usize },

    /// The value contains a character that is not a hex digit.
    InvalidHexEncoding { character: char, index: usize },
}
impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedLength { expected, obtained }
                => write!(f, "expected {} hex characters, obtained {}", expected, obtained),
            Self::InvalidHexEncoding { character, index }
                => write!(f, "invalid hex character {:?} at position {}", character, index),
        }
    }
}
impl std::error::Error for KeyError {
}


/// Sets the lowest bit of `byte` so that the byte has an odd number of set bits.
fn with_odd_parity(byte: u8) -> u8 {
    let upper = byte & 0xFE;
    if upper.count_ones() % 2 == 0 {
        upper | 0x01
    } else {
        upper
    }
}


/// Expands a 7-byte NT hash segment into the 8-byte DES key NTLMv1 encrypts with.
pub fn nt_segment_to_des_key(segment: [u8; 7]) -> [u8; 8] {
    let mut bits = [0u8; 8];
    bits[1..].copy_from_slice(&segment);
    let bits = u64::from_be_bytes(bits);

    let mut key = [0u8; 8];
    for (i, k) in key.iter_mut().enumerate() {
        let seven = ((bits >> (49 - 7*i)) & 0x7F) as u8;
        *k = with_odd_parity(seven << 1);
    }
    key
}


/// Collapses an 8-byte DES key into the 7-byte NT hash segment it was derived from.
///
/// Parity bits are ignored, so keys with or without valid parity give the same result.
pub fn des_key_to_nt_segment(key: [u8; 8]) -> [u8; 7] {
    let bits = key.iter()
        .fold(0u64, |acc, k| (acc << 7) | u64::from(k >> 1));

    let mut segment = [0u8; 7];
    segment.copy_from_slice(&bits.to_be_bytes()[1..]);
    segment
}


/// Joins the two segments recovered from DES keys and the final two bytes into an NT hash.
pub fn assemble_nt_hash(key1: [u8; 8], key2: [u8; 8], tail: [u8; 2]) -> [u8; 16] {
    let mut nt_hash = [0u8; 16];
    nt_hash[0..7].copy_from_slice(&des_key_to_nt_segment(key1));
    nt_hash[7..14].copy_from_slice(&des_key_to_nt_segment(key2));
    nt_hash[14..16].copy_from_slice(&tail);
    nt_hash
}


fn decode_fixed<const N: usize>(value: &str) -> Result<[u8; N], KeyError> {
    if value.len() != 2 * N {
        return Err(KeyError::UnexpectedLength { expected: 2 * N, obtained: value.len() });
    }
    let mut buf = [0u8; N];
    hex::decode_to_slice(value, &mut buf)
        .map_err(|e| match e {
            hex::FromHexError::InvalidHexCharacter { c, index }
                => KeyError::InvalidHexEncoding { character: c, index },
            _ => KeyError::UnexpectedLength { expected: 2 * N, obtained: value.len() },
        })?;
    Ok(buf)
}

/// Reads a recovered DES key given as 16 hex characters.
pub fn parse_des_key(value: &str) -> Result<[u8; 8], KeyError> {
    decode_fixed(value)
}

/// Reads the last two bytes of an NT hash given as 4 hex characters.
pub fn parse_ct3_tail(value: &str) -> Result<[u8; 2], KeyError> {
    decode_fixed(value)
}
