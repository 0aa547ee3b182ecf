// ─────────────────────────────────────────────────────────────────────
// Interflop Cancellation — Core Engine
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Cancellation detection and Monte Carlo noise injection for
//! instrumented floating-point arithmetic.
//!
//! Every hook runs inline on the instrumented program's own thread, so
//! the hot path (no cancellation) is two exponent reads and a compare.
//!
//! # Invariants
//!
//! 1. **Hooks are total**: every add/sub/mul/div/fma hook writes a
//!    numeric result; arithmetic never reports an error.
//!
//! 2. **No shared mutable state while computing**: the context is read
//!    only once configured, and each thread owns its random stream.
//!    Nothing on the arithmetic path takes a lock.
//!
//! 3. **Only additions and subtractions are perturbed**: mul, div and
//!    fma results are bit-identical to the plain operation.
//!
//! 4. **Reseed on every trigger**: a triggering cancellation reseeds
//!    the thread's stream from the context before drawing, so with a
//!    fixed seed the same cancellation always gets the same noise.

pub mod backend;
pub mod detector;
pub mod diagnostics;
pub mod hooks;
pub mod host;
pub mod noise;
pub mod registry;
pub mod stream;

pub use backend::{Backend, BACKEND_NAME};
pub use detector::{cancell, detect, inject, report, Detection};
pub use hooks::HookTable;
pub use host::{FailureHandler, HostService, HostServices};
pub use noise::noise_binary64;
pub use registry::{BackendDescriptor, BackendRegistry, DEFAULT_ALIAS};
pub use stream::{pop_seed, push_seed, with_thread_stream, RandomStream};
