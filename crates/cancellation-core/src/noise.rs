// ─────────────────────────────────────────────────────────────────────
// Interflop Cancellation — Noise Synthesis
// ─────────────────────────────────────────────────────────────────────
//! Monte Carlo noise of a chosen binary magnitude.
//!
//! `noise = (u - 0.5) * 2^exp` with `u` uniform in [0, 1). The scaling is
//! done on the exponent field (see `shift_exponent_field`) so that no
//! rounding is introduced on top of the draw.

use cancellation_types::float::shift_exponent_field;

use crate::stream::RandomStream;

/// Draw a noise value with `|noise| <= 2^(exp - 1)`, sign taken from the
/// draw.
#[inline]
pub fn noise_binary64(exp: i32, stream: &mut RandomStream) -> f64 {
    let d_rand = stream.next_f64() - 0.5;
    shift_exponent_field(d_rand, exp)
}
