use crate::*;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A string of binary digits
///
/// All key material, one-time passwords and encrypted votes are bit strings.
/// Serialized as its `'0'`/`'1'` text.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BitString {
    bits: Vec<bool>,
}

impl BitString {
    pub fn new(bits: Vec<bool>) -> Self {
        BitString { bits }
    }

    pub fn zeros(len: usize) -> Self {
        BitString {
            bits: vec![false; len],
        }
    }

    /// Take the first `len` bits of `bytes`, most significant bit first.
    pub fn from_bytes(bytes: &[u8], len: usize) -> Result<Self, ValidationError> {
        if bytes.len() * 8 < len {
            return Err(ValidationError::NotEnoughBytes {
                bits: len,
                bytes: bytes.len(),
            });
        }
        let bits = (0..len)
            .map(|i| bytes[i / 8] & (0x80 >> (i % 8)) != 0)
            .collect();
        Ok(BitString { bits })
    }

    /// Encode `value` as a big-endian bit string of exactly `len` bits.
    pub fn from_u64(value: u64, len: usize) -> Result<Self, ValidationError> {
        if len < 64 && value >> len != 0 {
            return Err(ValidationError::ValueOverflow { value, bits: len });
        }
        let bits = (0..len)
            .rev()
            .map(|shift| shift < 64 && (value >> shift) & 1 == 1)
            .collect();
        Ok(BitString { bits })
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    /// Pack into bytes, most significant bit first. The last byte is zero-padded.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; (self.bits.len() + 7) / 8];
        for (i, bit) in self.bits.iter().enumerate() {
            if *bit {
                bytes[i / 8] |= 0x80 >> (i % 8);
            }
        }
        bytes
    }

    /// Interpret as a big-endian unsigned integer. `None` if longer than 64 bits.
    pub fn to_u64(&self) -> Option<u64> {
        if self.bits.len() > 64 {
            return None;
        }
        Some(
            self.bits
                .iter()
                .fold(0u64, |acc, bit| (acc << 1) | (*bit as u64)),
        )
    }

    /// Copy of this bit string with the bit at `index` inverted
    pub fn with_flipped_bit(&self, index: usize) -> Result<Self, ValidationError> {
        let mut bits = self.bits.clone();
        let bit = bits.get_mut(index).ok_or(ValidationError::BitIndexOutOfRange {
            index,
            len: self.bits.len(),
        })?;
        *bit = !*bit;
        Ok(BitString { bits })
    }

    /// Require an exact width
    pub fn expect_len(&self, expected: usize) -> Result<(), ValidationError> {
        if self.bits.len() != expected {
            return Err(ValidationError::WrongLength {
                expected,
                actual: self.bits.len(),
            });
        }
        Ok(())
    }
}

/// Bitwise XOR of two equal-length bit strings.
///
/// Mismatched lengths are rejected. Operands are never padded or truncated.
pub fn xor(a: &BitString, b: &BitString) -> Result<BitString, ValidationError> {
    if a.len() != b.len() {
        return Err(ValidationError::LengthMismatch(a.len(), b.len()));
    }
    if a.is_empty() {
        return Err(ValidationError::EmptyBitString);
    }
    let bits = a.bits.iter().zip(b.bits.iter()).map(|(x, y)| x ^ y).collect();
    Ok(BitString { bits })
}

/// One-time-pad encryption
pub fn encrypt(plaintext: &BitString, key: &BitString) -> Result<BitString, ValidationError> {
    xor(plaintext, key)
}

/// One-time-pad decryption
pub fn decrypt(ciphertext: &BitString, key: &BitString) -> Result<BitString, ValidationError> {
    xor(ciphertext, key)
}

impl FromStr for BitString {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::EmptyBitString);
        }
        let bits = s
            .chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(ValidationError::InvalidBit(other)),
            })
            .collect::<Result<Vec<bool>, _>>()?;
        Ok(BitString { bits })
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for bit in &self.bits {
            f.write_str(if *bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl fmt::Debug for BitString {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BitString({})", self)
    }
}

impl Serialize for BitString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BitString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BitString::from_str(&s).map_err(de::Error::custom)
    }
}
