use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{amount, batch, block, import, select, sign, store, time, wallet};
use crate::field::FIELD_SIZE;

// propagation collaborator; fire-and-forget, called only after admission
pub trait Sender {
    fn broadcast(&self, wrapper: &block::Wrapper);
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("transaction submission is disabled on this node")]
    Disabled,
    #[error("destination address is malformed")]
    BadDestination,
    #[error("remark does not fit one field")]
    BadRemark,
    #[error(transparent)]
    BadAmount(#[from] amount::Error),
    #[error(transparent)]
    Select(#[from] select::Error),
}

pub struct Node<S, N> {
    pub wallet: wallet::Wallet,
    pipeline: Mutex<import::Pipeline<S>>,
    // payment critical section: one request runs select-through-import
    // to completion before the next may touch the wallet's balance
    construct: Mutex<()>,
    sender: N,
    transactions_enabled: bool,
}

impl<S: store::Store, N: Sender> Node<S, N> {
    pub fn new(wallet: wallet::Wallet, store: S, sender: N, transactions_enabled: bool) -> Self {
        Self {
            wallet,
            pipeline: Mutex::new(import::Pipeline::new(store)),
            construct: Mutex::new(()),
            sender,
            transactions_enabled,
        }
    }

    pub async fn best(&self) -> Option<[u8; 32]> {
        self.pipeline.lock().await.best()
    }

    // builds, signs, admits and broadcasts one payment. per-block outcomes
    // are aggregated, never rolled back as a batch: an admitted sibling
    // stays admitted even if a later partition fails.
    pub async fn transfer(
        &self,
        to: [u8; 32],
        value: f64,
        remark: Option<&str>,
    ) -> Result<Vec<([u8; 32], import::ImportResult)>, TransferError> {
        if !self.transactions_enabled {
            return Err(TransferError::Disabled);
        }
        if to == [0u8; 32] {
            return Err(TransferError::BadDestination);
        }
        let remark = match remark {
            Some(text) => {
                let bytes = text.as_bytes();
                if bytes.is_empty() || bytes.len() > FIELD_SIZE {
                    return Err(TransferError::BadRemark);
                }
                let mut data = [0u8; FIELD_SIZE];
                data[..bytes.len()].copy_from_slice(bytes);
                Some(data)
            }
            None => None,
        };
        let amount = amount::from_xdag(value)?;
        let _construct = self.construct.lock().await;
        let now = time::now();
        let selection = {
            let pipeline = self.pipeline.lock().await;
            select::select(pipeline.store(), &self.wallet, amount, now)?
        };
        let batcher = batch::Batcher::new(self.wallet.def_id(), to, remark);
        let mut results = Vec::new();
        for tx in batcher.run(selection.inputs, now) {
            let signed = sign::apply(tx, self.wallet.def_key());
            let hash_low = signed.hash_low();
            let result = self.pipeline.lock().await.import(&signed);
            if result.admitted() {
                self.sender.broadcast(&block::Wrapper::new(signed));
            } else {
                warn!(
                    block = %hex::encode(&hash_low[8..16]),
                    ?result,
                    "constructed block rejected"
                );
            }
            results.push((hash_low, result));
        }
        Ok(results)
    }

    // foreign blocks skip construction entirely; orphans are tolerated and
    // the ttl stops exhausted blocks from being relayed forever
    pub async fn receive_foreign(&self, mut wrapper: block::Wrapper) -> import::ImportResult {
        let result = self.pipeline.lock().await.import(&wrapper.block);
        if result.admitted() {
            if wrapper.ttl > 1 {
                wrapper.ttl -= 1;
                self.sender.broadcast(&wrapper);
            } else {
                debug!("ttl exhausted, block not relayed");
            }
        }
        result
    }

    // wallet bookkeeping hook: record a newly admitted block as spendable
    pub async fn register_own(&self, own: store::OwnBlock) {
        self.pipeline.lock().await.store_mut().insert_own(own);
    }
}
