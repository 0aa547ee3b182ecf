// ─────────────────────────────────────────────────────────────────────
// Interflop Cancellation — Backend Types
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
#![deny(unsafe_code)]
//! Type definitions, configuration, and error hierarchy for the
//! cancellation backend, plus the IEEE-754 bit layout shared by the
//! float32 and float64 hooks.

pub mod config;
pub mod error;
pub mod float;

pub use config::{CancellationConfig, ConfigUpdate, SeedPolicy};
pub use error::{CancellationError, CancellationResult};
pub use float::IeeeFloat;
