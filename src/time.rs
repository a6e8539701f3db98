use std::time::{SystemTime, UNIX_EPOCH};

// xdag time: unix ms scaled so the low 10 bits are sub-millisecond ticks.
// one epoch is 2^16 ticks, i.e. 64 seconds.
pub const EPOCH_SHIFT: u32 = 16;

pub fn now() -> u64 {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64;
    from_ms(ms)
}

pub fn from_ms(ms: u64) -> u64 {
    (ms << 10) / 1000
}

pub fn epoch(t: u64) -> u64 {
    t >> EPOCH_SHIFT
}
