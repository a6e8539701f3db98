use thiserror::Error;

// internal amounts are 64-bit fixed point with a 32-bit fractional part
pub const AMOUNT_SHIFT: u32 = 32;
pub const MAX_XDAG: f64 = (1u64 << 32) as f64;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum Error {
    #[error("amount is not a finite number")]
    NotFinite,
    #[error("amount is negative")]
    Negative,
    #[error("amount is zero")]
    Zero,
    #[error("amount overflows the fixed-point range")]
    Overflow,
}

pub fn from_xdag(value: f64) -> Result<u64, Error> {
    if !value.is_finite() {
        return Err(Error::NotFinite);
    }
    if value < 0.0 {
        return Err(Error::Negative);
    }
    if value == 0.0 {
        return Err(Error::Zero);
    }
    if value >= MAX_XDAG {
        return Err(Error::Overflow);
    }
    let whole = value.trunc() as u64;
    let frac = (value.fract() * MAX_XDAG).round() as u64;
    // rounding the fraction can carry into the integer part
    (whole << AMOUNT_SHIFT)
        .checked_add(frac)
        .ok_or(Error::Overflow)
}

pub fn to_xdag(amount: u64) -> f64 {
    (amount >> AMOUNT_SHIFT) as f64
        + (amount & ((1u64 << AMOUNT_SHIFT) - 1)) as f64 / MAX_XDAG
}
