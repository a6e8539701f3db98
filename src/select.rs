use thiserror::Error;
use tracing::{debug, warn};

use crate::block::Address;
use crate::field::FieldType;
use crate::store::Store;
use crate::time;
use crate::wallet::{Keypair, Wallet};

pub const CONFIRMATIONS_COUNT: u64 = 16;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("insufficient funds: {missing} short of {wanted}")]
    InsufficientFunds { wanted: u64, missing: u64 },
}

#[derive(Debug)]
pub struct Selection<'a> {
    pub inputs: Vec<(Address, &'a Keypair)>,
    pub gathered: u64,
}

// a block is spendable only once its creation epoch is two confirmation
// windows behind the current one
pub fn confirmed(timestamp: u64, now: u64) -> bool {
    time::epoch(now) >= time::epoch(timestamp) + 2 * CONFIRMATIONS_COUNT
}

// walks own blocks in store order, drawing each block's full balance except
// for the last one, which draws only the remainder; the accumulator lives
// here and is returned, never shared with the caller mid-iteration
pub fn select<'a, S: Store>(
    store: &S,
    wallet: &'a Wallet,
    amount: u64,
    now: u64,
) -> Result<Selection<'a>, Error> {
    let mut inputs: Vec<(Address, &'a Keypair)> = Vec::new();
    let mut remaining = amount;
    store.own_blocks(&mut |own| {
        if remaining == 0 {
            return true;
        }
        if own.amount == 0 || !confirmed(own.timestamp, now) {
            return false;
        }
        let key = match wallet.key(own.key_index) {
            Some(key) => key,
            None => {
                // the store says we own this block but the wallet has no
                // key for it: inconsistent state, not an ineligible block
                warn!(key_index = own.key_index, "own block references a key the wallet does not hold");
                return false;
            }
        };
        let draw = own.amount.min(remaining);
        remaining -= draw;
        inputs.push((Address::new(FieldType::In, own.hash_low, draw), key));
        remaining == 0
    });
    if remaining > 0 {
        return Err(Error::InsufficientFunds { wanted: amount, missing: remaining });
    }
    debug!(inputs = inputs.len(), amount, "selected spendable blocks");
    Ok(Selection { inputs, gathered: amount - remaining })
}
