use std::collections::HashMap;

use thiserror::Error;
use tracing::{info, warn};

use crate::block::{Block, BLOCK_FIELDS};
use crate::field::FieldType;
use crate::sign::{pubkeys, sign_pairs};
use crate::store::Store;
use crate::wallet::verify;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum Invalid {
    #[error("bad field count or header slot")]
    BadHeader,
    #[error("no output signature")]
    MissingOutSig,
    #[error("output signature does not verify")]
    BadOutSig,
    #[error("input {0} is not authorized")]
    BadInSig(usize),
}

// closed outcome set: callers must handle every variant, and only the two
// Imported ones may ever be broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum ImportResult {
    ImportedBest,
    ImportedNotBest,
    Exist,
    NoParent,
    Invalid(Invalid),
}

impl ImportResult {
    pub fn admitted(&self) -> bool {
        matches!(self, ImportResult::ImportedBest | ImportResult::ImportedNotBest)
    }
}

pub fn difficulty(hash: &[u8; 32]) -> u128 {
    let mut high = [0u8; 16];
    high.copy_from_slice(&hash[..16]);
    u128::MAX / u128::from_be_bytes(high).saturating_add(1)
}

#[derive(Debug, Clone, Copy)]
struct Info {
    cumulative: u128,
}

#[derive(Debug)]
pub struct Pipeline<S> {
    store: S,
    info: HashMap<[u8; 32], Info>,
    best: Option<([u8; 32], u128)>,
}

impl<S: Store> Pipeline<S> {
    pub fn new(store: S) -> Self {
        Self { store, info: HashMap::default(), best: None }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn best(&self) -> Option<[u8; 32]> {
        self.best.map(|(hash, _)| hash)
    }

    pub fn import(&mut self, block: &Block) -> ImportResult {
        if block.fields.len() != BLOCK_FIELDS
            || !matches!(block.fields[0].kind, FieldType::Head | FieldType::HeadTest)
        {
            return ImportResult::Invalid(Invalid::BadHeader);
        }
        let hash = block.hash();
        let hash_low = block.hash_low();
        if self.store.contains(&hash_low) {
            return ImportResult::Exist;
        }
        // unresolved inputs are a soft failure: the block is not stored, so
        // a re-import once the parent arrives starts clean
        let inputs = block.inputs();
        let mut parents = Vec::with_capacity(inputs.len());
        for addr in &inputs {
            match self.store.block_by_hash(&addr.hash_low) {
                Some(parent) => parents.push(parent),
                None => {
                    warn!(
                        block = %hex::encode(&hash_low[8..16]),
                        parent = %hex::encode(&addr.hash_low[8..16]),
                        "orphan: referenced input unknown"
                    );
                    return ImportResult::NoParent;
                }
            }
        }
        let msg = block.signing_hash();
        let out_sigs = sign_pairs(block, FieldType::SignOut);
        if out_sigs.is_empty() {
            return ImportResult::Invalid(Invalid::MissingOutSig);
        }
        let own_keys = pubkeys(block);
        if !out_sigs
            .iter()
            .any(|sig| own_keys.iter().any(|id| verify(id, &msg, sig)))
        {
            return ImportResult::Invalid(Invalid::BadOutSig);
        }
        // an input is authorized by any signature in the block that verifies
        // under a key embedded in the referenced block; the owner's SIGN_OUT
        // covers inputs it funded itself
        let mut all_sigs = sign_pairs(block, FieldType::SignIn);
        all_sigs.extend(out_sigs);
        for (i, parent) in parents.iter().enumerate() {
            let parent_keys = pubkeys(parent);
            let authorized = all_sigs
                .iter()
                .any(|sig| parent_keys.iter().any(|id| verify(id, &msg, sig)));
            if !authorized {
                return ImportResult::Invalid(Invalid::BadInSig(i));
            }
        }
        let inherited = inputs
            .iter()
            .filter_map(|addr| self.info.get(&addr.hash_low))
            .map(|info| info.cumulative)
            .max()
            .unwrap_or(0);
        let cumulative = inherited.saturating_add(difficulty(&hash));
        self.store.insert(block.clone());
        self.info.insert(hash_low, Info { cumulative });
        let is_best = match self.best {
            Some((_, best)) => cumulative > best,
            None => true,
        };
        if is_best {
            self.best = Some((hash_low, cumulative));
            info!(block = %hex::encode(&hash_low[8..16]), "imported as new best");
            ImportResult::ImportedBest
        } else {
            info!(block = %hex::encode(&hash_low[8..16]), "imported off the best chain");
            ImportResult::ImportedNotBest
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::batch::{Batcher, TxBlock};
    use crate::block::Address;
    use crate::field::Field;
    use crate::sign;
    use crate::store::MemStore;
    use crate::wallet::Wallet;

    // a parentless block paying the wallet's default key, signed like any
    // other constructed block
    fn coinbase(wallet: &Wallet, timestamp: u64, amount: u64) -> Block {
        let mut block = Block::new(timestamp);
        let to = Address::new(FieldType::Out, [9u8; 32], amount);
        block.push(to.to_field()).unwrap();
        let tx = TxBlock { block, inputs: Vec::new(), amount };
        sign::apply(tx, wallet.def_key())
    }

    fn spend(wallet: &Wallet, from: &Block, amount: u64) -> Block {
        let batcher = Batcher::new(wallet.def_id(), [9u8; 32], None);
        let inputs = vec![(
            Address::new(FieldType::In, from.hash_low(), amount),
            wallet.def_key(),
        )];
        let mut blocks = batcher.run(inputs, from.timestamp() + 1);
        assert_eq!(blocks.len(), 1);
        sign::apply(blocks.remove(0), wallet.def_key())
    }

    #[test]
    fn duplicate_reports_exist() {
        let wallet = Wallet::gen(0);
        let mut pipeline = Pipeline::new(MemStore::default());
        let block = coinbase(&wallet, 1, 50);
        assert_eq!(pipeline.import(&block), ImportResult::ImportedBest);
        assert_eq!(pipeline.import(&block), ImportResult::Exist);
    }

    #[test]
    fn orphan_then_retry() {
        let wallet = Wallet::gen(0);
        let mut pipeline = Pipeline::new(MemStore::default());
        let parent = coinbase(&wallet, 1, 50);
        let child = spend(&wallet, &parent, 50);
        assert_eq!(pipeline.import(&child), ImportResult::NoParent);
        assert_eq!(pipeline.import(&parent), ImportResult::ImportedBest);
        assert!(pipeline.import(&child).admitted());
    }

    #[test]
    fn child_extends_best() {
        let wallet = Wallet::gen(0);
        let mut pipeline = Pipeline::new(MemStore::default());
        let parent = coinbase(&wallet, 1, 50);
        let child = spend(&wallet, &parent, 50);
        assert_eq!(pipeline.import(&parent), ImportResult::ImportedBest);
        // cumulative difficulty grows along the chain
        assert_eq!(pipeline.import(&child), ImportResult::ImportedBest);
        assert_eq!(pipeline.best(), Some(child.hash_low()));
    }

    #[test]
    fn lower_weight_is_not_best() {
        let wallet = Wallet::gen(0);
        let a = coinbase(&wallet, 1, 50);
        let b = coinbase(&wallet, 2, 50);
        let (hi, lo) = if difficulty(&a.hash()) >= difficulty(&b.hash()) {
            (a, b)
        } else {
            (b, a)
        };
        let mut pipeline = Pipeline::new(MemStore::default());
        assert_eq!(pipeline.import(&hi), ImportResult::ImportedBest);
        assert_eq!(pipeline.import(&lo), ImportResult::ImportedNotBest);
        assert_eq!(pipeline.best(), Some(hi.hash_low()));
    }

    #[test]
    fn missing_out_sig() {
        let mut pipeline = Pipeline::new(MemStore::default());
        let mut block = Block::new(1);
        block
            .push(Address::new(FieldType::Out, [9u8; 32], 5).to_field())
            .unwrap();
        assert_eq!(
            pipeline.import(&block),
            ImportResult::Invalid(Invalid::MissingOutSig)
        );
    }

    #[test]
    fn tampered_out_sig() {
        let wallet = Wallet::gen(0);
        let mut pipeline = Pipeline::new(MemStore::default());
        let mut block = coinbase(&wallet, 1, 50);
        // flip a byte of the first signature half
        let slot = block
            .fields
            .iter()
            .position(|f| f.kind == FieldType::SignOut)
            .unwrap();
        let mut data = *block.fields[slot].data();
        data[0] ^= 1;
        block.fields[slot].set_data(data);
        assert_eq!(
            pipeline.import(&block),
            ImportResult::Invalid(Invalid::BadOutSig)
        );
    }

    #[test]
    fn unauthorized_input() {
        let wallet = Wallet::gen(0);
        let thief = Wallet::gen(0);
        let mut pipeline = Pipeline::new(MemStore::default());
        let parent = coinbase(&wallet, 1, 50);
        assert_eq!(pipeline.import(&parent), ImportResult::ImportedBest);
        // the thief signs with its own key, which the funded block never saw
        let theft = spend(&thief, &parent, 50);
        assert_eq!(
            pipeline.import(&theft),
            ImportResult::Invalid(Invalid::BadInSig(0))
        );
    }

    #[test]
    fn bad_header_slot() {
        let wallet = Wallet::gen(0);
        let mut pipeline = Pipeline::new(MemStore::default());
        let mut block = coinbase(&wallet, 1, 50);
        block.fields[0] = Field::zero(FieldType::Reserve2);
        assert_eq!(
            pipeline.import(&block),
            ImportResult::Invalid(Invalid::BadHeader)
        );
    }
}
