use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use thiserror::Error;
use tracing::{info, warn};

use crate::time;

// a fresh seed only qualifies on these height boundaries
pub const SEEDHASH_EPOCH_BLOCKS: u64 = 4096;
// lead window (in epochs) for building cache and dataset before use
pub const SEEDHASH_EPOCH_LAG: u64 = 128;
// how long a superseded buffer keeps serving verifications near the boundary
pub const RETIRE_KEEP_EPOCHS: u64 = 2;

const NO_ACTIVE: usize = usize::MAX;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum Error {
    #[error("no seeded buffer to build")]
    NotSeeded,
    #[error("cache/dataset construction failed")]
    BuildFailed,
}

// opaque cache/dataset/vm handles owned by the proof-of-work layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmHandles {
    pub cache: u64,
    pub dataset: u64,
    pub pool_vm: u64,
    pub block_vm: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Seeded,
    Active,
    Retired,
}

#[derive(Debug, Clone)]
pub struct Memory {
    pub seed: [u8; 32],
    pub seed_height: u64,
    pub seed_time: u64,
    // epoch at which this buffer becomes authoritative; -1 = never seeded
    pub switch_time: i64,
    pub is_switched: bool,
    pub handles: Option<VmHandles>,
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            seed: [0u8; 32],
            seed_height: 0,
            seed_time: 0,
            switch_time: -1,
            is_switched: false,
            handles: None,
        }
    }
}

// two owned buffer slots and an atomically published active index: readers
// see either the fully old or the fully new buffer, never a half-built one
#[derive(Debug)]
pub struct EpochMemory {
    mems: [RwLock<Memory>; 2],
    active: AtomicUsize,
}

impl EpochMemory {
    pub fn new() -> Self {
        Self {
            mems: [RwLock::new(Memory::default()), RwLock::new(Memory::default())],
            active: AtomicUsize::new(NO_ACTIVE),
        }
    }

    fn active_index(&self) -> Option<usize> {
        match self.active.load(Ordering::Acquire) {
            NO_ACTIVE => None,
            idx => Some(idx),
        }
    }

    fn standby_index(&self) -> usize {
        match self.active_index() {
            Some(idx) => 1 - idx,
            None => 0,
        }
    }

    pub fn phase(&self, idx: usize) -> Phase {
        let mem = self.mems[idx].read().expect("epoch memory lock poisoned");
        if mem.switch_time < 0 {
            Phase::Empty
        } else if !mem.is_switched {
            Phase::Seeded
        } else if self.active_index() == Some(idx) {
            Phase::Active
        } else {
            Phase::Retired
        }
    }

    // a seed at a qualifying height claims the standby buffer and schedules
    // its switch one lead window after the seed's epoch
    pub fn observe_seed(&self, seed: [u8; 32], height: u64, seed_time: u64) -> bool {
        if height % SEEDHASH_EPOCH_BLOCKS != 0 {
            return false;
        }
        let idx = self.standby_index();
        let mut mem = self.mems[idx].write().expect("epoch memory lock poisoned");
        *mem = Memory {
            seed,
            seed_height: height,
            seed_time,
            switch_time: (time::epoch(seed_time) + SEEDHASH_EPOCH_LAG) as i64,
            is_switched: false,
            handles: None,
        };
        info!(height, switch_time = mem.switch_time, "randomx seed observed");
        true
    }

    // runs cache/dataset construction for the seeded standby buffer; a
    // failure resets it to empty and never touches the active buffer
    pub fn build<F>(&self, construct: F) -> Result<(), Error>
    where
        F: FnOnce(&[u8; 32]) -> Result<VmHandles, Error>,
    {
        let idx = self.standby_index();
        let mut mem = self.mems[idx].write().expect("epoch memory lock poisoned");
        if mem.switch_time < 0 || mem.is_switched {
            return Err(Error::NotSeeded);
        }
        match construct(&mem.seed) {
            Ok(handles) => {
                mem.handles = Some(handles);
                Ok(())
            }
            Err(e) => {
                warn!(seed_height = mem.seed_height, "randomx build failed");
                *mem = Memory::default();
                Err(e)
            }
        }
    }

    // flips the seeded buffer to active once the chain's epoch reaches its
    // switch time; the previous buffer is retired, not destroyed
    pub fn try_switch(&self, epoch: u64) -> bool {
        let idx = self.standby_index();
        {
            let mut mem = self.mems[idx].write().expect("epoch memory lock poisoned");
            if mem.switch_time < 0 || mem.is_switched || epoch < mem.switch_time as u64 {
                return false;
            }
            mem.is_switched = true;
        }
        // published only after the buffer is fully written
        self.active.store(idx, Ordering::Release);
        info!(buffer = idx, epoch, "randomx memory switched");
        true
    }

    // drops the retired buffer's handles once no verification can still
    // reference the old epoch
    pub fn release_stale(&self, epoch: u64) {
        let active = match self.active_index() {
            Some(idx) => idx,
            None => return,
        };
        let boundary = {
            let mem = self.mems[active].read().expect("epoch memory lock poisoned");
            mem.switch_time as u64 + RETIRE_KEEP_EPOCHS
        };
        if epoch <= boundary {
            return;
        }
        let stale = 1 - active;
        let mut mem = self.mems[stale].write().expect("epoch memory lock poisoned");
        if mem.is_switched {
            *mem = Memory::default();
        }
    }

    pub fn active_handles(&self) -> Option<VmHandles> {
        let idx = self.active_index()?;
        let mem = self.mems[idx].read().expect("epoch memory lock poisoned");
        mem.handles
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    fn epoch_time(epoch: u64) -> u64 {
        epoch << time::EPOCH_SHIFT
    }

    #[test]
    fn qualifying_heights_only() {
        let mem = EpochMemory::new();
        assert!(!mem.observe_seed([1u8; 32], 100, epoch_time(10)));
        assert_eq!(mem.phase(0), Phase::Empty);
        assert!(mem.observe_seed([1u8; 32], SEEDHASH_EPOCH_BLOCKS, epoch_time(10)));
        assert_eq!(mem.phase(0), Phase::Seeded);
    }

    #[test]
    fn switches_exactly_at_switch_time() {
        let mem = EpochMemory::new();
        mem.observe_seed([1u8; 32], SEEDHASH_EPOCH_BLOCKS, epoch_time(10));
        let switch = 10 + SEEDHASH_EPOCH_LAG;
        for epoch in switch - 3..switch {
            assert!(!mem.try_switch(epoch));
            assert_eq!(mem.phase(0), Phase::Seeded);
        }
        assert!(mem.try_switch(switch));
        assert_eq!(mem.phase(0), Phase::Active);
    }

    #[test]
    fn double_buffer_lifecycle() {
        let mem = EpochMemory::new();
        mem.observe_seed([1u8; 32], SEEDHASH_EPOCH_BLOCKS, epoch_time(0));
        mem.build(|_| Ok(VmHandles { cache: 1, ..VmHandles::default() })).unwrap();
        assert!(mem.try_switch(SEEDHASH_EPOCH_LAG));
        assert_eq!(mem.active_handles().unwrap().cache, 1);

        // next epoch's seed lands in the other buffer
        mem.observe_seed([2u8; 32], 2 * SEEDHASH_EPOCH_BLOCKS, epoch_time(100));
        assert_eq!(mem.phase(1), Phase::Seeded);
        assert_eq!(mem.phase(0), Phase::Active);
        mem.build(|_| Ok(VmHandles { cache: 2, ..VmHandles::default() })).unwrap();
        assert!(mem.try_switch(100 + SEEDHASH_EPOCH_LAG));
        assert_eq!(mem.phase(1), Phase::Active);
        assert_eq!(mem.phase(0), Phase::Retired);
        assert_eq!(mem.active_handles().unwrap().cache, 2);

        // retired buffer survives the keep window, then is released
        mem.release_stale(100 + SEEDHASH_EPOCH_LAG + RETIRE_KEEP_EPOCHS);
        assert_eq!(mem.phase(0), Phase::Retired);
        mem.release_stale(100 + SEEDHASH_EPOCH_LAG + RETIRE_KEEP_EPOCHS + 1);
        assert_eq!(mem.phase(0), Phase::Empty);
    }

    #[test]
    fn failed_build_never_corrupts_active() {
        let mem = EpochMemory::new();
        mem.observe_seed([1u8; 32], SEEDHASH_EPOCH_BLOCKS, epoch_time(0));
        mem.build(|_| Ok(VmHandles { cache: 7, ..VmHandles::default() })).unwrap();
        assert!(mem.try_switch(SEEDHASH_EPOCH_LAG));

        mem.observe_seed([2u8; 32], 2 * SEEDHASH_EPOCH_BLOCKS, epoch_time(50));
        assert_eq!(mem.build(|_| Err(Error::BuildFailed)), Err(Error::BuildFailed));
        // the failed buffer drops back to empty, awaiting the next seed
        assert_eq!(mem.phase(1), Phase::Empty);
        assert_eq!(mem.active_handles().unwrap().cache, 7);
        assert_eq!(mem.phase(0), Phase::Active);
    }

    #[test]
    fn build_requires_seed() {
        let mem = EpochMemory::new();
        assert_eq!(mem.build(|_| Ok(VmHandles::default())), Err(Error::NotSeeded));
    }
}
