// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register value decoding
//!
//! A Modbus register is a 16-bit word. Wider values span consecutive
//! registers and are packed into a big-endian byte buffer before being
//! reinterpreted, with one exception: `uint32le` keeps each word big-endian
//! but stores the low word first, as several inverter vendors do for their
//! energy counters.
//!
//! | Encoding   | Words | Interpretation                         |
//! |------------|-------|----------------------------------------|
//! | `int16`    | 1     | signed 16-bit                          |
//! | `uint16`   | 1     | unsigned 16-bit                        |
//! | `int32`    | 2     | signed 32-bit, high word first         |
//! | `uint32`   | 2     | unsigned 32-bit, high word first       |
//! | `uint32le` | 2     | unsigned 32-bit, low word first        |
//! | `float32`  | 2     | IEEE 754 single precision, high first  |
//! | `uint64`   | 4     | unsigned 64-bit, high word first       |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;

/// Numeric interpretation of a register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Encoding {
    Int16,
    Uint16,
    Int32,
    Uint32,
    Uint32le,
    Float32,
    Uint64,
}

impl Encoding {
    /// Every supported encoding, in display order.
    pub const ALL: [Encoding; 7] = [
        Encoding::Int16,
        Encoding::Uint16,
        Encoding::Int32,
        Encoding::Uint32,
        Encoding::Uint32le,
        Encoding::Float32,
        Encoding::Uint64,
    ];

    /// Number of 16-bit registers a value of this encoding occupies.
    pub fn word_count(self) -> usize {
        match self {
            Encoding::Int16 | Encoding::Uint16 => 1,
            Encoding::Int32 | Encoding::Uint32 | Encoding::Uint32le | Encoding::Float32 => 2,
            Encoding::Uint64 => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Int16 => "int16",
            Encoding::Uint16 => "uint16",
            Encoding::Int32 => "int32",
            Encoding::Uint32 => "uint32",
            Encoding::Uint32le => "uint32le",
            Encoding::Float32 => "float32",
            Encoding::Uint64 => "uint64",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = DiscoveryError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        Encoding::ALL
            .into_iter()
            .find(|encoding| encoding.as_str() == tag.trim())
            .ok_or_else(|| DiscoveryError::UnsupportedEncoding {
                tag: tag.to_string(),
            })
    }
}

impl TryFrom<String> for Encoding {
    type Error = DiscoveryError;

    fn try_from(tag: String) -> Result<Self, Self::Error> {
        tag.parse()
    }
}

/// Pack the words into a byte buffer in the order the encoding expects.
fn pack_words(words: &[u16], encoding: Encoding) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    if encoding == Encoding::Uint32le {
        for word in words.iter().rev() {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
    } else {
        for word in words {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
    }
    bytes
}

fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Decode a register block into a scaled value.
///
/// Only the first `encoding.word_count()` words are used; a catalog entry
/// may describe a wider block than the value itself.
///
/// # Errors
///
/// Returns [`DiscoveryError::ShortRead`] when fewer words than the encoding
/// needs were supplied.
pub fn decode(words: &[u16], encoding: Encoding, scale: f64) -> Result<f64, DiscoveryError> {
    let needed = encoding.word_count();
    if words.len() < needed {
        return Err(DiscoveryError::ShortRead {
            encoding: encoding.to_string(),
            expected: needed,
            got: words.len(),
        });
    }

    let bytes = pack_words(&words[..needed], encoding);
    let raw = match encoding {
        Encoding::Int16 => f64::from(i16::from_be_bytes(fixed(&bytes))),
        Encoding::Uint16 => f64::from(u16::from_be_bytes(fixed(&bytes))),
        Encoding::Int32 => f64::from(i32::from_be_bytes(fixed(&bytes))),
        Encoding::Uint32 | Encoding::Uint32le => f64::from(u32::from_be_bytes(fixed(&bytes))),
        Encoding::Float32 => f64::from(f32::from_be_bytes(fixed(&bytes))),
        // Precision above 2^53 is lost here; counters never get that large.
        Encoding::Uint64 => u64::from_be_bytes(fixed(&bytes)) as f64,
    };

    Ok(raw * scale)
}

/// Decode using an encoding tag as written in a catalog.
///
/// # Errors
///
/// Fails with [`DiscoveryError::UnsupportedEncoding`] for unknown tags.
pub fn decode_tagged(words: &[u16], tag: &str, scale: f64) -> Result<f64, DiscoveryError> {
    let encoding: Encoding = tag.parse()?;
    decode(words, encoding, scale)
}

/// Encode a scaled value into registers, the inverse of [`decode`].
///
/// Integer encodings round to the nearest raw step and saturate at the
/// bounds of the target type.
pub fn encode(value: f64, encoding: Encoding, scale: f64) -> Vec<u16> {
    let raw = if scale == 0.0 { value } else { value / scale };
    let bytes: Vec<u8> = match encoding {
        Encoding::Int16 => (raw.round() as i16).to_be_bytes().to_vec(),
        Encoding::Uint16 => (raw.round() as u16).to_be_bytes().to_vec(),
        Encoding::Int32 => (raw.round() as i32).to_be_bytes().to_vec(),
        Encoding::Uint32 | Encoding::Uint32le => (raw.round() as u32).to_be_bytes().to_vec(),
        Encoding::Float32 => (raw as f32).to_be_bytes().to_vec(),
        Encoding::Uint64 => (raw.round() as u64).to_be_bytes().to_vec(),
    };

    let mut words: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    if encoding == Encoding::Uint32le {
        words.reverse();
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_int16_negative() {
        assert_eq!(decode(&[0xFFFF], Encoding::Int16, 1.0).unwrap(), -1.0);
        assert_eq!(decode(&[0xFC18], Encoding::Int16, 1.0).unwrap(), -1000.0);
    }

    #[test]
    fn test_decode_uint16_scaled() {
        let value = decode(&[2301], Encoding::Uint16, 0.1).unwrap();
        assert!((value - 230.1).abs() < 1e-9);
    }

    #[test]
    fn test_decode_int32_high_word_first() {
        // -2 as i32 is 0xFFFF_FFFE
        assert_eq!(decode(&[0xFFFF, 0xFFFE], Encoding::Int32, 1.0).unwrap(), -2.0);
        assert_eq!(
            decode(&[0x0001, 0x0000], Encoding::Uint32, 1.0).unwrap(),
            65536.0
        );
    }

    #[test]
    fn test_decode_uint32le_swaps_word_order() {
        // Same words as above, low word first this time
        assert_eq!(
            decode(&[0x0000, 0x0001], Encoding::Uint32le, 1.0).unwrap(),
            65536.0
        );
        assert_eq!(decode(&[0x0001, 0x0000], Encoding::Uint32le, 1.0).unwrap(), 1.0);
    }

    #[test]
    fn test_decode_float32() {
        let bits = 1234.5f32.to_bits();
        let words = [(bits >> 16) as u16, (bits & 0xFFFF) as u16];
        assert_eq!(decode(&words, Encoding::Float32, 1.0).unwrap(), 1234.5);
    }

    #[test]
    fn test_decode_uint64() {
        let words = [0x0000, 0x0001, 0x0000, 0x0002];
        assert_eq!(
            decode(&words, Encoding::Uint64, 1.0).unwrap(),
            ((1u64 << 32) + 2) as f64
        );
    }

    #[test]
    fn test_decode_ignores_extra_words() {
        assert_eq!(decode(&[7, 99, 99], Encoding::Uint16, 1.0).unwrap(), 7.0);
    }

    #[test]
    fn test_decode_short_read() {
        let err = decode(&[1], Encoding::Uint32, 1.0).unwrap_err();
        assert!(matches!(
            err,
            DiscoveryError::ShortRead {
                expected: 2,
                got: 1,
                ..
            }
        ));
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_encode_then_decode_every_encoding() {
        let cases = [
            (Encoding::Int16, -1480.0, 1.0),
            (Encoding::Uint16, 501.2, 0.1),
            (Encoding::Int32, -250_000.0, 1.0),
            (Encoding::Uint32, 3_000_000.0, 1.0),
            (Encoding::Uint32le, 12345.6, 0.1),
            (Encoding::Float32, 49.98, 1.0),
            (Encoding::Uint64, 98_765_432.1, 0.1),
        ];
        for (encoding, value, scale) in cases {
            let words = encode(value, encoding, scale);
            assert_eq!(words.len(), encoding.word_count(), "{encoding}");
            let decoded = decode(&words, encoding, scale).unwrap();
            assert!(
                (decoded - value).abs() < 1e-3,
                "{encoding}: {decoded} != {value}"
            );
        }
    }

    #[test]
    fn test_unknown_tag_is_configuration_error() {
        let err = decode_tagged(&[1, 2], "int24", 1.0).unwrap_err();
        assert!(matches!(err, DiscoveryError::UnsupportedEncoding { ref tag } if tag == "int24"));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_tags_parse() {
        for encoding in Encoding::ALL {
            assert_eq!(encoding.as_str().parse::<Encoding>().unwrap(), encoding);
        }
        assert_eq!(decode_tagged(&[42], "uint16", 2.0).unwrap(), 84.0);
    }
}
