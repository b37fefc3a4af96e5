//! # LED Pattern Encoder
//!
//! Thermometer encoding of an 8-bit value onto a bank of 8 LEDs. The input
//! range is cut into nine buckets: 0 lights nothing, 1..=31 lights one LED, and
//! every further 32 values light one more, up to all eight for 224..=255. LEDs
//! light from the most significant bit downward.

use std::fmt;

use crate::common::value::Value;

/// Bit pattern written to the LED device; bit 7 is the first LED to light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LedPattern(u8);

impl LedPattern {
    pub const OFF: LedPattern = LedPattern(0);

    pub const fn from_bits(bits: u8) -> Self {
        LedPattern(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn lit_count(self) -> u32 {
        self.0.count_ones()
    }

    /// `O` for a lit LED, `X` for a dark one, most significant bit first.
    pub fn render(self) -> String {
        (0..8)
            .rev()
            .map(|bit| if self.0 & (1 << bit) != 0 { "O" } else { "X" })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for LedPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.render())
    }
}

/// Number of LEDs lit for `value`.
pub fn bucket(value: Value) -> u32 {
    match value.get() {
        0 => 0,
        v => u32::from(v / 32) + 1,
    }
}

/// Map a value to its thermometer pattern.
pub fn encode(value: Value) -> LedPattern {
    let lit = bucket(value);
    // Shifting a u16 keeps the all-eight case (lit == 8) in range.
    LedPattern((0xFF00u16 >> lit) as u8)
}
