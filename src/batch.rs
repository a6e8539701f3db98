use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::block::{Address, Block, BLOCK_FIELDS};
use crate::field::{Field, FieldType, FIELD_SIZE};
use crate::wallet::{KeyId, Keypair};

// slots a block always pays for: header, the single output, and the
// default key's SIGN_OUT pair
const BASE_COST: usize = 1 + 1 + 2;
// a newly appearing key pays its pubkey field plus a SIGN_IN pair
const NEW_KEY_COST: usize = 3;

// one partition of the payment: an unsigned block plus the inputs whose
// keys still have to sign it
#[derive(Debug)]
pub struct TxBlock<'a> {
    pub block: Block,
    pub inputs: Vec<(Address, &'a Keypair)>,
    pub amount: u64,
}

#[derive(Debug)]
pub struct Batcher {
    to: [u8; 32],
    remark: Option<Field>,
    def_id: KeyId,
}

impl Batcher {
    pub fn new(def_id: KeyId, to: [u8; 32], remark: Option<[u8; FIELD_SIZE]>) -> Self {
        Self {
            to,
            remark: remark.map(|data| Field::new(FieldType::Remark, data)),
            def_id,
        }
    }

    fn base(&self) -> usize {
        BASE_COST + self.remark.is_some() as usize
    }

    // greedy and order-preserving: inputs are walked as given, an input is
    // committed only while the running slot total stays below 16, and a
    // rejected input reopens accounting in a fresh block. the default key
    // is pre-seeded into the dedup set so it never pays NEW_KEY_COST.
    pub fn run<'a>(
        &self,
        inputs: Vec<(Address, &'a Keypair)>,
        timestamp: u64,
    ) -> Vec<TxBlock<'a>> {
        let mut out = Vec::new();
        let mut queue: VecDeque<(Address, &'a Keypair)> = inputs.into();
        let mut keys: HashSet<KeyId> = HashSet::from([self.def_id]);
        let mut cost = self.base();
        let mut current: Vec<(Address, &'a Keypair)> = Vec::new();
        let mut amount = 0u64;
        while let Some((addr, key)) = queue.pop_front() {
            let fresh = !keys.contains(&key.id());
            let next = cost + 1 + if fresh { NEW_KEY_COST } else { 0 };
            if next < BLOCK_FIELDS {
                cost = next;
                if fresh {
                    keys.insert(key.id());
                }
                amount += addr.amount;
                current.push((addr, key));
            } else {
                out.push(self.seal(std::mem::take(&mut current), amount, timestamp));
                queue.push_front((addr, key));
                keys = HashSet::from([self.def_id]);
                cost = self.base();
                amount = 0;
            }
        }
        if !current.is_empty() {
            out.push(self.seal(current, amount, timestamp));
        }
        debug!(blocks = out.len(), "partitioned payment");
        out
    }

    fn seal<'a>(
        &self,
        inputs: Vec<(Address, &'a Keypair)>,
        amount: u64,
        timestamp: u64,
    ) -> TxBlock<'a> {
        let mut block = Block::new(timestamp);
        for (addr, _) in &inputs {
            assert!(block.push(addr.to_field()).is_ok());
        }
        let send = Address::new(FieldType::Out, self.to, amount);
        assert!(block.push(send.to_field()).is_ok());
        if let Some(remark) = &self.remark {
            assert!(block.push(remark.clone()).is_ok());
        }
        TxBlock { block, inputs, amount }
    }
}
