// ─────────────────────────────────────────────────────────────────────
// Interflop Cancellation — IEEE-754 Bit Layout
// ─────────────────────────────────────────────────────────────────────
//! Bit-level view of binary32 and binary64 values.
//!
//! The detector only ever needs the stored exponent field, so this module
//! reads it straight out of `to_bits()` instead of going through `log2`.
//! Zero and subnormals carry a raw field of 0 and therefore report the
//! minimal exponent `-BIAS`, lower than any normal value.

use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Sub};

/// A hardware float whose layout is described by its exponent width,
/// mantissa width and bias.
pub trait IeeeFloat:
    Copy
    + Debug
    + PartialEq
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Send
    + Sync
    + 'static
{
    /// Width of the exponent field in bits.
    const EXPONENT_BITS: u32;
    /// Width of the stored mantissa (fraction) in bits.
    const MANTISSA_BITS: u32;
    /// Exponent bias.
    const BIAS: i32;

    /// Raw bit pattern, zero-extended to 64 bits.
    fn raw_bits(self) -> u64;

    /// Exact widening to binary64.
    fn widen(self) -> f64;

    /// Round a binary64 value to this width.
    fn narrow(x: f64) -> Self;

    /// `self * b + c` with a single rounding.
    fn fused_mul_add(self, b: Self, c: Self) -> Self;

    /// Infinity replaced by the largest finite value of the same sign.
    fn saturate(self) -> Self;

    /// Stored (biased) exponent field.
    #[inline(always)]
    fn biased_exponent(self) -> u32 {
        let mask = (1u64 << Self::EXPONENT_BITS) - 1;
        ((self.raw_bits() >> Self::MANTISSA_BITS) & mask) as u32
    }

    /// Unbiased exponent, `floor(log2|x|)` for normal values.
    #[inline(always)]
    fn exponent(self) -> i32 {
        self.biased_exponent() as i32 - Self::BIAS
    }
}

impl IeeeFloat for f32 {
    const EXPONENT_BITS: u32 = 8;
    const MANTISSA_BITS: u32 = 23;
    const BIAS: i32 = 127;

    #[inline(always)]
    fn raw_bits(self) -> u64 {
        u64::from(self.to_bits())
    }

    #[inline(always)]
    fn widen(self) -> f64 {
        f64::from(self)
    }

    #[inline(always)]
    fn narrow(x: f64) -> Self {
        x as f32
    }

    #[inline(always)]
    fn fused_mul_add(self, b: Self, c: Self) -> Self {
        self.mul_add(b, c)
    }

    #[inline(always)]
    fn saturate(self) -> Self {
        if self.is_infinite() {
            f32::MAX.copysign(self)
        } else {
            self
        }
    }
}

impl IeeeFloat for f64 {
    const EXPONENT_BITS: u32 = 11;
    const MANTISSA_BITS: u32 = 52;
    const BIAS: i32 = 1023;

    #[inline(always)]
    fn raw_bits(self) -> u64 {
        self.to_bits()
    }

    #[inline(always)]
    fn widen(self) -> f64 {
        self
    }

    #[inline(always)]
    fn narrow(x: f64) -> Self {
        x
    }

    #[inline(always)]
    fn fused_mul_add(self, b: Self, c: Self) -> Self {
        self.mul_add(b, c)
    }

    #[inline(always)]
    fn saturate(self) -> Self {
        if self.is_infinite() {
            f64::MAX.copysign(self)
        } else {
            self
        }
    }
}

const F64_EXP_SHIFT: u32 = <f64 as IeeeFloat>::MANTISSA_BITS;
const F64_EXP_MAX: i32 = 0x7ff;
const F64_EXP_MASK: u64 = (F64_EXP_MAX as u64) << F64_EXP_SHIFT;

/// Add `offset` to the stored exponent field of `x`, leaving sign and
/// mantissa bits untouched.
///
/// For a normal `x` whose result stays normal this is exact scaling by
/// `2^offset` without a floating-point multiply. Zero, subnormals,
/// infinities and NaN are returned unchanged. A field that would drop to
/// zero or below yields the correctly rounded subnormal `x * 2^offset`,
/// which is a zero carrying the sign of `x` once the value falls below
/// half the smallest subnormal. A field that would reach the
/// infinity/NaN encoding is clamped to the largest finite exponent.
#[inline]
pub fn shift_exponent_field(x: f64, offset: i32) -> f64 {
    let bits = x.to_bits();
    let field = ((bits & F64_EXP_MASK) >> F64_EXP_SHIFT) as i32;
    if field == 0 || field == F64_EXP_MAX {
        return x;
    }
    let shifted = field.saturating_add(offset);
    if shifted <= 0 {
        return scale_into_subnormal(bits, shifted);
    }
    let shifted = shifted.min(F64_EXP_MAX - 1) as u64;
    f64::from_bits((bits & !F64_EXP_MASK) | (shifted << F64_EXP_SHIFT))
}

/// `x * 2^(shifted - 1)` for `x` moved to the smallest normal binade,
/// with a single rounding. `shifted <= 0` is the field the value would
/// need.
#[inline]
fn scale_into_subnormal(bits: u64, shifted: i32) -> f64 {
    // Anything lower is under half the smallest subnormal.
    if shifted < -(F64_EXP_SHIFT as i32) {
        return 0.0_f64.copysign(f64::from_bits(bits));
    }
    let lowest_normal = f64::from_bits((bits & !F64_EXP_MASK) | (1 << F64_EXP_SHIFT));
    let step = f64::from_bits(((shifted - 1 + F64_EXP_MAX / 2) as u64) << F64_EXP_SHIFT);
    lowest_normal * step
}
