//! The 0..=255 control value and the producer-facing submission interface.

use std::fmt;

/// An 8-bit control value derived from hand position or an LED dial.
///
/// Out-of-range inputs are clamped, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Value(u8);

impl Value {
    pub const MIN: Value = Value(0);
    pub const MAX: Value = Value(u8::MAX);

    pub const fn new(raw: u8) -> Self {
        Value(raw)
    }

    /// Clamp any integer into `0..=255`.
    pub fn clamped(raw: i64) -> Self {
        Value(raw.clamp(0, u8::MAX as i64) as u8)
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl From<u8> for Value {
    fn from(raw: u8) -> Self {
        Value(raw)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entry point the perception side uses to hand values to the relay.
///
/// Implementations must never block the caller.
pub trait Producer: Send + Sync {
    /// Submit a raw reading; anything outside `0..=255` is clamped.
    fn submit(&self, value: i64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamping() {
        assert_eq!(Value::clamped(-20), Value::MIN);
        assert_eq!(Value::clamped(0).get(), 0);
        assert_eq!(Value::clamped(128).get(), 128);
        assert_eq!(Value::clamped(255), Value::MAX);
        assert_eq!(Value::clamped(1_000), Value::MAX);
    }
}
