// ─────────────────────────────────────────────────────────────────────
// Interflop Cancellation — Backend Lifecycle
// ─────────────────────────────────────────────────────────────────────
//! Load-time handshake with the instrumentation host.
//!
//! `pre_init` checks that the host provides every service the backend
//! needs and allocates the default context. The host may then configure
//! the context (command line or structured update) before `init` hands
//! back the hook table.

use std::ffi::OsString;
use std::io::Write;

use log::LevelFilter;

use cancellation_types::{CancellationConfig, CancellationResult, ConfigUpdate};

use crate::diagnostics;
use crate::hooks::HookTable;
use crate::host::{FailureHandler, HostServices};
use crate::stream::with_thread_stream;

/// Name used in diagnostics and as the registry key.
pub const BACKEND_NAME: &str = "interflop_cancellation";

/// A loaded cancellation backend: its context and the host's failure
/// callback.
pub struct Backend {
    context: CancellationConfig,
    failure: FailureHandler,
}

impl Backend {
    /// Register the failure handler, verify host services, install the
    /// diagnostic sink on `output` and allocate a default context.
    ///
    /// A missing host service is reported through `failure` and no
    /// backend is returned.
    pub fn pre_init(
        output: Option<Box<dyn Write + Send>>,
        failure: FailureHandler,
        host: &HostServices,
    ) -> CancellationResult<Self> {
        if let Err(e) = host.check() {
            failure(&e.to_string());
            return Err(e);
        }

        if let Some(sink) = output {
            diagnostics::install(sink, LevelFilter::Info);
        }

        Ok(Self {
            context: CancellationConfig::default(),
            failure,
        })
    }

    pub fn context(&self) -> &CancellationConfig {
        &self.context
    }

    /// Apply backend command-line options. See
    /// [`CancellationConfig::parse_cli`].
    pub fn cli<I, T>(&mut self, args: I) -> CancellationResult<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        self.context.parse_cli(args)
    }

    /// Apply a structured update atomically.
    pub fn configure(&mut self, update: ConfigUpdate) -> CancellationResult<()> {
        self.context.apply(update).map_err(|e| {
            log::error!("{e}");
            e
        })
    }

    /// Replace the whole context from a JSON document.
    pub fn configure_json(&mut self, json: &str) -> CancellationResult<()> {
        let context = CancellationConfig::from_json(json).map_err(|e| {
            log::error!("{e}");
            e
        })?;
        self.context = context;
        Ok(())
    }

    /// Report an unrecoverable condition to the host.
    pub fn fail(&self, message: &str) {
        log::error!("{message}");
        (self.failure)(message);
    }

    /// Log the active tolerance, seed the calling thread's stream and
    /// return the hook table.
    ///
    /// Only the calling thread is seeded here; every other thread seeds
    /// its stream on first use.
    pub fn init(&self) -> HookTable {
        log::info!(
            "{BACKEND_NAME}: loaded backend with tolerance = {}",
            self.context.tolerance
        );
        let policy = self.context.seed_policy();
        with_thread_stream(|s| s.reseed(policy));
        HookTable::cancellation()
    }
}
