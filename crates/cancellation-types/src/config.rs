// ─────────────────────────────────────────────────────────────────────
// Interflop Cancellation — Backend Configuration
// ─────────────────────────────────────────────────────────────────────

use std::ffi::OsString;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::{CancellationError, CancellationResult};

/// Default minimum cancellation size that triggers noise injection.
pub const TOLERANCE_DEFAULT: i32 = 1;

/// Default for the per-cancellation diagnostic.
pub const WARNING_DEFAULT: bool = false;

/// How a random stream is (re)initialized on a reseed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SeedPolicy {
    /// Fresh system entropy on every reseed.
    #[default]
    Entropy,
    /// The exact same seed on every reseed.
    Fixed(u64),
}

/// Process-wide backend context.
///
/// Created once at load time and read by every arithmetic hook. It is
/// only mutated during configuration, before any instrumented arithmetic
/// runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CancellationConfig {
    /// Minimum number of cancelled bits that triggers noise injection.
    /// Always >= 0. Default: 1.
    pub tolerance: i32,

    /// Emit a diagnostic for every triggering cancellation.
    /// Default: false.
    pub warning: bool,

    /// Seed used on reseed events when `use_fixed_seed` is set.
    pub seed: u64,

    /// Reseed from `seed` instead of system entropy.
    pub use_fixed_seed: bool,
}

impl Default for CancellationConfig {
    fn default() -> Self {
        Self {
            tolerance: TOLERANCE_DEFAULT,
            warning: WARNING_DEFAULT,
            seed: 0,
            use_fixed_seed: false,
        }
    }
}

/// Any subset of the three user-facing settings, applied as one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub tolerance: Option<i64>,
    pub warning: Option<bool>,
    pub seed: Option<u64>,
}

/// Backend options as they appear on the host command line.
#[derive(Parser, Debug)]
#[command(
    name = "interflop_cancellation",
    no_binary_name = true,
    disable_help_flag = true,
    disable_version_flag = true,
    args_override_self = true
)]
struct CliOptions {
    /// Select tolerance (TOLERANCE >= 0)
    #[arg(short = 't', long, value_name = "TOLERANCE", allow_hyphen_values = true)]
    tolerance: Option<String>,

    /// Enable warning for cancellations
    #[arg(short = 'w', long)]
    warning: bool,

    /// Fix the random generator seed
    #[arg(short = 's', long, value_name = "SEED", allow_hyphen_values = true)]
    seed: Option<String>,
}

impl CancellationConfig {
    /// Seed policy used by every reseed event.
    pub fn seed_policy(&self) -> SeedPolicy {
        if self.use_fixed_seed {
            SeedPolicy::Fixed(self.seed)
        } else {
            SeedPolicy::Entropy
        }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> CancellationResult<()> {
        if self.tolerance < 0 {
            return Err(CancellationError::Config(format!(
                "tolerance must be >= 0, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// Load from JSON string. Missing fields take their defaults.
    pub fn from_json(json: &str) -> CancellationResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply a structured update.
    ///
    /// The whole update is checked first; if any part is rejected nothing
    /// changes. A seed switches the context to fixed-seed mode.
    pub fn apply(&mut self, update: ConfigUpdate) -> CancellationResult<()> {
        let tolerance = match update.tolerance {
            Some(t) => Some(checked_tolerance(t)?),
            None => None,
        };
        if let Some(t) = tolerance {
            self.tolerance = t;
        }
        if let Some(w) = update.warning {
            self.warning = w;
        }
        if let Some(s) = update.seed {
            self.seed = s;
            self.use_fixed_seed = true;
        }
        Ok(())
    }

    /// Parse backend options (`--tolerance=N`, `--warning`, `--seed=N`
    /// and their short forms). `args` excludes the program name.
    ///
    /// Each value is checked on its own: a rejected value is logged and
    /// discarded while the other options still apply. The first rejected
    /// value is returned as the error.
    pub fn parse_cli<I, T>(&mut self, args: I) -> CancellationResult<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let opts = CliOptions::try_parse_from(args).map_err(|e| {
            let msg = e.to_string().trim_end().to_string();
            log::error!("{msg}");
            CancellationError::Cli(msg)
        })?;

        let mut first_error = None;

        if let Some(raw) = opts.tolerance.as_deref() {
            match parse_tolerance(raw) {
                Ok(t) => self.tolerance = t,
                Err(e) => {
                    log::error!("--tolerance invalid value provided, must be a positive integer.");
                    first_error.get_or_insert(e);
                }
            }
        }

        if opts.warning {
            self.warning = true;
        }

        if let Some(raw) = opts.seed.as_deref() {
            match raw.trim().parse::<u64>() {
                Ok(s) => {
                    self.seed = s;
                    self.use_fixed_seed = true;
                }
                Err(e) => {
                    log::error!("--seed invalid value provided, must be an integer");
                    first_error.get_or_insert(CancellationError::Config(format!(
                        "invalid seed {raw:?}: {e}"
                    )));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn checked_tolerance(t: i64) -> CancellationResult<i32> {
    if t < 0 {
        return Err(CancellationError::Config(format!(
            "tolerance must be >= 0, got {t}"
        )));
    }
    i32::try_from(t)
        .map_err(|_| CancellationError::Config(format!("tolerance {t} is out of range")))
}

fn parse_tolerance(raw: &str) -> CancellationResult<i32> {
    let t = raw
        .trim()
        .parse::<i64>()
        .map_err(|e| CancellationError::Config(format!("invalid tolerance {raw:?}: {e}")))?;
    checked_tolerance(t)
}
