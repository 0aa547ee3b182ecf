// ─────────────────────────────────────────────────────────────────────
// Interflop Cancellation — Cancellation Detector
// ─────────────────────────────────────────────────────────────────────
//! Detection of catastrophic cancellation in additions and subtractions.
//!
//! The size of a cancellation is the number of leading bits lost with
//! respect to the larger operand:
//!
//! ```text
//! cancellation = max(e(a), e(b)) - e(a ± b)
//! ```
//!
//! When it reaches the configured tolerance the result receives Monte
//! Carlo noise one bit below the last bit that can still be trusted,
//! `e_n = e(z) - (cancellation - 1)`.
//!
//! The stream is reseeded from the context's seed policy on every
//! triggering call. With a fixed seed this makes the injected noise a
//! pure function of the operands: identical cancellations get identical
//! noise, run after run.

use cancellation_types::{CancellationConfig, IeeeFloat};

use crate::noise::noise_binary64;
use crate::stream::RandomStream;

/// Outcome of a triggering check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    /// Number of cancelled bits.
    pub cancellation: i32,
    /// Binary exponent the noise is scaled to.
    pub noise_exponent: i32,
}

/// Decide whether `z = a ± b` lost at least `tolerance` bits.
///
/// Pure; this is the whole cost of the common case.
#[inline(always)]
pub fn detect<F: IeeeFloat>(a: F, b: F, z: F, config: &CancellationConfig) -> Option<Detection> {
    let e_z = z.exponent();
    let cancellation = a.exponent().max(b.exponent()) - e_z;
    if cancellation < config.tolerance {
        return None;
    }
    Some(Detection {
        cancellation,
        noise_exponent: e_z - (cancellation - 1),
    })
}

/// Emit the cancellation warning if the context enables it.
///
/// Must run while no random stream is borrowed: the host's output stream
/// may itself execute instrumented arithmetic.
#[inline]
pub fn report(detection: Detection, config: &CancellationConfig) {
    if config.warning {
        log::info!("cancellation of size {} detected", detection.cancellation);
    }
}

/// Add a detection's noise to `z` in place.
///
/// Binary32 results are widened for the addition and rounded back. A
/// finite result stays finite: noise that would overflow saturates at
/// the largest finite value.
pub fn inject<F: IeeeFloat>(
    z: &mut F,
    detection: Detection,
    config: &CancellationConfig,
    stream: &mut RandomStream,
) {
    stream.reseed(config.seed_policy());
    let finite = z.exponent() <= F::BIAS;
    let noisy = F::narrow(z.widen() + noise_binary64(detection.noise_exponent, stream));
    *z = if finite { noisy.saturate() } else { noisy };
}

/// `detect`, then `report` and `inject` when it triggers.
#[inline]
pub fn cancell<F: IeeeFloat>(
    a: F,
    b: F,
    z: &mut F,
    config: &CancellationConfig,
    stream: &mut RandomStream,
) -> Option<Detection> {
    let detection = detect(a, b, *z, config)?;
    report(detection, config);
    inject(z, detection, config, stream);
    Some(detection)
}
