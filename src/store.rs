use std::collections::HashMap;

use serde::{Serialize, Deserialize};

use crate::block::Block;

// what the wallet knows about one of its own blocks: enough to spend it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnBlock {
    pub hash_low: [u8; 32],
    pub amount: u64,
    pub timestamp: u64,
    pub key_index: usize,
}

// opaque persistence collaborator; iteration order over own blocks is
// store-defined and selection follows it
pub trait Store {
    fn block_by_hash(&self, hash_low: &[u8; 32]) -> Option<Block>;

    fn contains(&self, hash_low: &[u8; 32]) -> bool {
        self.block_by_hash(hash_low).is_some()
    }

    // visitor returns true to stop early
    fn own_blocks(&self, visit: &mut dyn FnMut(&OwnBlock) -> bool);

    fn insert(&mut self, block: Block);

    fn insert_own(&mut self, own: OwnBlock);
}

#[derive(Debug, Default)]
pub struct MemStore {
    blocks: HashMap<[u8; 32], Block>,
    own: Vec<OwnBlock>,
}

impl Store for MemStore {
    fn block_by_hash(&self, hash_low: &[u8; 32]) -> Option<Block> {
        self.blocks.get(hash_low).cloned()
    }

    fn own_blocks(&self, visit: &mut dyn FnMut(&OwnBlock) -> bool) {
        for own in &self.own {
            if visit(own) {
                break;
            }
        }
    }

    fn insert(&mut self, block: Block) {
        // an admitted block spends the own blocks it references
        for addr in block.inputs() {
            if let Some(own) = self.own.iter_mut().find(|o| o.hash_low == addr.hash_low) {
                own.amount = own.amount.saturating_sub(addr.amount);
            }
        }
        self.blocks.insert(block.hash_low(), block);
    }

    fn insert_own(&mut self, own: OwnBlock) {
        self.own.push(own);
    }
}
