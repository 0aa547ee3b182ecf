// ─────────────────────────────────────────────────────────────────────
// Interflop Cancellation — Per-Thread Random Streams
// ─────────────────────────────────────────────────────────────────────
//! Pseudo-random streams owned by exactly one thread.
//!
//! Every host thread gets its own `RandomStream` the first time it asks
//! for one. Streams start uninitialized and seed themselves from their
//! policy on the first draw, so threads that never went through
//! `Backend::init` still work.
//!
//! A stream also carries a single save slot for the `push_seed` /
//! `pop_seed` protocol: an external stochastic-arithmetic tool in the
//! same process can take the stream over with a deterministic seed and
//! later hand it back exactly as it was.

use std::cell::RefCell;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use cancellation_types::SeedPolicy;

fn seeded(policy: SeedPolicy) -> ChaCha8Rng {
    match policy {
        SeedPolicy::Fixed(seed) => ChaCha8Rng::seed_from_u64(seed),
        SeedPolicy::Entropy => ChaCha8Rng::from_entropy(),
    }
}

#[derive(Debug, Clone, Default)]
struct StreamState {
    policy: SeedPolicy,
    /// `None` until the first draw or an explicit reseed.
    rng: Option<ChaCha8Rng>,
}

impl StreamState {
    fn fixed(seed: u64) -> Self {
        Self {
            policy: SeedPolicy::Fixed(seed),
            rng: Some(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

/// Uniform generator state for one thread, plus its depth-1 save slot.
#[derive(Debug, Clone, Default)]
pub struct RandomStream {
    live: StreamState,
    saved: Option<StreamState>,
}

impl RandomStream {
    /// Uninitialized stream with the entropy policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream already initialized from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            live: StreamState::fixed(seed),
            saved: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.live.rng.is_some()
    }

    pub fn policy(&self) -> SeedPolicy {
        self.live.policy
    }

    /// Reinitialize the live state from `policy`, discarding its history.
    pub fn reseed(&mut self, policy: SeedPolicy) {
        self.live.policy = policy;
        self.live.rng = Some(seeded(policy));
    }

    /// Draw a uniform double in [0, 1).
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        let policy = self.live.policy;
        self.live
            .rng
            .get_or_insert_with(|| seeded(policy))
            .gen::<f64>()
    }

    /// Snapshot the live stream, then reinitialize it from `seed`.
    ///
    /// A second push before `pop_seed` overwrites the snapshot.
    pub fn push_seed(&mut self, seed: u64) {
        self.saved = Some(self.live.clone());
        self.live = StreamState::fixed(seed);
    }

    /// Restore the stream captured by the last `push_seed`.
    ///
    /// Draws made since the push are forgotten. Without a snapshot this
    /// does nothing.
    pub fn pop_seed(&mut self) {
        match &self.saved {
            Some(saved) => self.live = saved.clone(),
            None => log::debug!("pop_seed called with no saved stream"),
        }
    }
}

thread_local! {
    static THREAD_STREAM: RefCell<RandomStream> = RefCell::new(RandomStream::new());
}

/// Run `f` on the calling thread's stream.
///
/// The stream is created on first use. It is never visible to any other
/// thread, so no lock is involved.
#[inline]
pub fn with_thread_stream<R>(f: impl FnOnce(&mut RandomStream) -> R) -> R {
    THREAD_STREAM.with(|stream| f(&mut stream.borrow_mut()))
}

/// `push_seed` on the calling thread's stream.
pub fn push_seed(seed: u64) {
    with_thread_stream(|s| s.push_seed(seed));
}

/// `pop_seed` on the calling thread's stream.
pub fn pop_seed() {
    with_thread_stream(|s| s.pop_seed());
}
