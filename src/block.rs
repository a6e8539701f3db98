use sha2::Sha256;
use digest::Digest;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::field::{Field, FieldType, FIELD_SIZE};

pub const BLOCK_FIELDS: usize = 16;
// 16 type-tag bytes followed by 16 consecutive 32-byte payloads
pub const ENCODED_BLOCK_SIZE: usize = BLOCK_FIELDS + BLOCK_FIELDS * FIELD_SIZE;

pub const DEFAULT_TTL: u8 = 5;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("encoded block must be {ENCODED_BLOCK_SIZE} bytes, got {0}")]
    BadLength(usize),
    #[error("no free field slot left")]
    Full,
}

// reference to a prior block plus the amount drawn from or sent to it,
// only alive while a new block is built
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    pub kind: FieldType,
    pub hash_low: [u8; 32],
    pub amount: u64,
}

impl Address {
    pub fn new(kind: FieldType, hash_low: [u8; 32], amount: u64) -> Self {
        Self { kind, hash_low, amount }
    }

    // low 24 bytes: the significant part of hash_low; high 8: LE amount
    pub fn to_field(&self) -> Field {
        let mut data = [0u8; FIELD_SIZE];
        data[..24].copy_from_slice(&self.hash_low[8..]);
        data[24..].copy_from_slice(&self.amount.to_le_bytes());
        Field::new(self.kind, data)
    }

    pub fn from_field(field: &Field) -> Self {
        let mut hash_low = [0u8; 32];
        hash_low[8..].copy_from_slice(&field.data()[..24]);
        Self { kind: field.kind, hash_low, amount: field.amount() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub fields: Vec<Field>,
}

impl Block {
    pub fn new(timestamp: u64) -> Self {
        let mut head = [0u8; FIELD_SIZE];
        head[..8].copy_from_slice(&timestamp.to_le_bytes());
        let mut fields = vec![Field::zero(FieldType::Nonce); BLOCK_FIELDS];
        fields[0] = Field::new(FieldType::Head, head);
        Self { fields }
    }

    pub fn timestamp(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.fields[0].data()[..8]);
        u64::from_le_bytes(bytes)
    }

    // slots past the header are free while still zeroed nonce padding
    pub fn push(&mut self, field: Field) -> Result<usize, Error> {
        let slot = self.fields
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, f)| f.kind == FieldType::Nonce && f.is_zero())
            .map(|(i, _)| i)
            .ok_or(Error::Full)?;
        self.fields[slot] = field;
        Ok(slot)
    }

    pub fn fields_of(&self, kind: FieldType) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(move |f| f.kind == kind)
    }

    pub fn inputs(&self) -> Vec<Address> {
        self.fields_of(FieldType::In).map(Address::from_field).collect()
    }

    pub fn outputs(&self) -> Vec<Address> {
        self.fields_of(FieldType::Out).map(Address::from_field).collect()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ENCODED_BLOCK_SIZE);
        for field in &self.fields {
            bytes.push(field.kind.as_byte());
        }
        for field in &self.fields {
            bytes.extend_from_slice(field.data());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != ENCODED_BLOCK_SIZE {
            return Err(Error::BadLength(bytes.len()));
        }
        let mut fields = Vec::with_capacity(BLOCK_FIELDS);
        for slot in 0..BLOCK_FIELDS {
            let kind = FieldType::from_byte(bytes[slot]);
            let mut data = [0u8; FIELD_SIZE];
            let at = BLOCK_FIELDS + slot * FIELD_SIZE;
            data.copy_from_slice(&bytes[at..at + FIELD_SIZE]);
            fields.push(Field::new(kind, data));
        }
        Ok(Self { fields })
    }

    pub fn hash(&self) -> [u8; 32] {
        Sha256::digest(self.to_bytes()).into()
    }

    // content hash with the high 8 bytes cleared; IN/OUT fields embed
    // the remaining 24 significant bytes
    pub fn hash_low(&self) -> [u8; 32] {
        let mut hash = self.hash();
        hash[..8].fill(0);
        hash
    }

    // what every signer commits to: the wire form with signature payloads
    // zeroed, so signatures verify without knowing which slots they landed in
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut unsigned = self.clone();
        for field in unsigned.fields.iter_mut() {
            if matches!(field.kind, FieldType::SignIn | FieldType::SignOut) {
                field.set_data([0u8; FIELD_SIZE]);
            }
        }
        unsigned.hash()
    }
}

// flood-relay envelope; the consensus core only ever touches the ttl
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wrapper {
    pub block: Block,
    pub ttl: u8,
}

impl Wrapper {
    pub fn new(block: Block) -> Self {
        Self { block, ttl: DEFAULT_TTL }
    }
}
