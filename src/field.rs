use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Serialize, Deserialize};
use serde_big_array::BigArray;

pub const FIELD_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FieldType {
    Nonce,
    Head,
    In,
    Out,
    SignIn,
    SignOut,
    PublicKey0,
    PublicKey1,
    HeadTest,
    Remark,
    Snapshot,
    Reserve2,
    Reserve3,
    Reserve4,
    Reserve5,
    Reserve6,
    // unrecognized tag, kept verbatim so the block still round-trips
    Unknown(u8),
}

impl FieldType {
    pub fn as_byte(&self) -> u8 {
        match self {
            FieldType::Nonce => 0x00,
            FieldType::Head => 0x01,
            FieldType::In => 0x02,
            FieldType::Out => 0x03,
            FieldType::SignIn => 0x04,
            FieldType::SignOut => 0x05,
            FieldType::PublicKey0 => 0x06,
            FieldType::PublicKey1 => 0x07,
            FieldType::HeadTest => 0x08,
            FieldType::Remark => 0x09,
            FieldType::Snapshot => 0x0A,
            FieldType::Reserve2 => 0x0B,
            FieldType::Reserve3 => 0x0C,
            FieldType::Reserve4 => 0x0D,
            FieldType::Reserve5 => 0x0E,
            FieldType::Reserve6 => 0x0F,
            FieldType::Unknown(tag) => *tag,
        }
    }

    pub fn from_byte(tag: u8) -> Self {
        match tag {
            0x00 => FieldType::Nonce,
            0x01 => FieldType::Head,
            0x02 => FieldType::In,
            0x03 => FieldType::Out,
            0x04 => FieldType::SignIn,
            0x05 => FieldType::SignOut,
            0x06 => FieldType::PublicKey0,
            0x07 => FieldType::PublicKey1,
            0x08 => FieldType::HeadTest,
            0x09 => FieldType::Remark,
            0x0A => FieldType::Snapshot,
            0x0B => FieldType::Reserve2,
            0x0C => FieldType::Reserve3,
            0x0D => FieldType::Reserve4,
            0x0E => FieldType::Reserve5,
            0x0F => FieldType::Reserve6,
            other => FieldType::Unknown(other),
        }
    }

    pub fn enumerated() -> [FieldType; 16] {
        core::array::from_fn(|i| FieldType::from_byte(i as u8))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Field {
    pub kind: FieldType,
    #[serde(with = "BigArray")]
    data: [u8; FIELD_SIZE],
    // memoized checksum, 0 = not yet computed
    #[serde(skip)]
    sum: AtomicU64,
}

impl Field {
    pub fn new(kind: FieldType, data: [u8; FIELD_SIZE]) -> Self {
        Self { kind, data, sum: AtomicU64::new(0) }
    }

    pub fn zero(kind: FieldType) -> Self {
        Self::new(kind, [0u8; FIELD_SIZE])
    }

    pub fn data(&self) -> &[u8; FIELD_SIZE] {
        &self.data
    }

    pub fn set_data(&mut self, data: [u8; FIELD_SIZE]) {
        self.data = data;
        self.sum.store(0, Ordering::Relaxed);
    }

    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|b| *b == 0)
    }

    // sum of the four little-endian u64 words, cached after first use
    pub fn sum(&self) -> u64 {
        let cached = self.sum.load(Ordering::Relaxed);
        if cached != 0 {
            return cached;
        }
        let mut sum = 0u64;
        for word in 0..4 {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&self.data[word * 8..(word + 1) * 8]);
            sum = sum.wrapping_add(u64::from_le_bytes(bytes));
        }
        self.sum.store(sum, Ordering::Relaxed);
        sum
    }

    // LE amount in the high 8 bytes of an IN/OUT field
    pub fn amount(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[24..32]);
        u64::from_le_bytes(bytes)
    }
}

impl Clone for Field {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            data: self.data,
            sum: AtomicU64::new(self.sum.load(Ordering::Relaxed)),
        }
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.data == other.data
    }
}

impl Eq for Field {}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn tag_roundtrip() {
        for kind in FieldType::enumerated() {
            assert_eq!(FieldType::from_byte(kind.as_byte()), kind);
        }
    }

    #[test]
    fn unknown_tag() {
        let kind = FieldType::from_byte(0x42);
        assert_eq!(kind, FieldType::Unknown(0x42));
        assert_eq!(kind.as_byte(), 0x42);
    }

    #[test]
    fn sum_memoized() {
        let mut data = [0u8; FIELD_SIZE];
        data[0] = 1;
        data[8] = 2;
        let field = Field::new(FieldType::Remark, data);
        assert_eq!(field.sum(), 3);
        assert_eq!(field.sum(), 3);
    }

    #[test]
    fn sum_invalidated_on_mutation() {
        let mut data = [0u8; FIELD_SIZE];
        data[0] = 1;
        let mut field = Field::new(FieldType::Remark, data);
        let before = field.sum();
        data[0] = 7;
        field.set_data(data);
        assert_ne!(field.sum(), before);
        assert_eq!(field.sum(), 7);
    }

    #[test]
    fn zero_field_recomputes() {
        // the 0 sentinel means an all-zero field never caches: a known wart,
        // harmless because populated fields are never all-zero
        let field = Field::zero(FieldType::Reserve2);
        assert_eq!(field.sum(), 0);
        assert_eq!(field.sum(), 0);
    }

    #[test]
    fn wrapping_sum() {
        let field = Field::new(FieldType::Nonce, [0xFF; FIELD_SIZE]);
        assert_eq!(field.sum(), u64::MAX.wrapping_mul(4));
    }
}
