// ─────────────────────────────────────────────────────────────────────
// Interflop Cancellation — Backend Registry
// ─────────────────────────────────────────────────────────────────────
//! Maps backend names to their loaders.
//!
//! A host that asks for the generic `"default"` backend gets whatever
//! that alias points to; the built-in registry points it at the
//! cancellation backend.

use std::collections::HashMap;
use std::io::Write;

use cancellation_types::{CancellationError, CancellationResult};

use crate::backend::{Backend, BACKEND_NAME};
use crate::host::{FailureHandler, HostServices};

/// Generic name a host uses when it does not pick a backend.
pub const DEFAULT_ALIAS: &str = "default";

pub type PreInitFn = fn(
    Option<Box<dyn Write + Send>>,
    FailureHandler,
    &HostServices,
) -> CancellationResult<Backend>;

/// Everything the host needs to load one backend.
#[derive(Clone, Copy)]
pub struct BackendDescriptor {
    pub name: &'static str,
    pub pre_init: PreInitFn,
}

impl BackendDescriptor {
    pub fn cancellation() -> Self {
        Self {
            name: BACKEND_NAME,
            pre_init: Backend::pre_init,
        }
    }
}

#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<&'static str, BackendDescriptor>,
    aliases: HashMap<&'static str, &'static str>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the cancellation backend, also reachable as
    /// `"default"`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.backends.insert(BACKEND_NAME, BackendDescriptor::cancellation());
        registry.aliases.insert(DEFAULT_ALIAS, BACKEND_NAME);
        registry
    }

    pub fn register(&mut self, descriptor: BackendDescriptor) -> CancellationResult<()> {
        if self.backends.contains_key(descriptor.name) || self.aliases.contains_key(descriptor.name) {
            return Err(CancellationError::Config(format!(
                "backend {} is already registered",
                descriptor.name
            )));
        }
        self.backends.insert(descriptor.name, descriptor);
        Ok(())
    }

    /// Point `alias` at a registered backend, replacing any previous
    /// target.
    pub fn alias(&mut self, alias: &'static str, target: &'static str) -> CancellationResult<()> {
        if !self.backends.contains_key(target) {
            return Err(CancellationError::Config(format!(
                "cannot alias {alias} to unknown backend {target}"
            )));
        }
        self.aliases.insert(alias, target);
        Ok(())
    }

    /// Look up a backend by name or alias.
    pub fn resolve(&self, name: &str) -> Option<&BackendDescriptor> {
        let name = self.aliases.get(name).copied().unwrap_or(name);
        self.backends.get(name)
    }

    /// Resolve and pre-initialize in one step.
    pub fn load(
        &self,
        name: &str,
        output: Option<Box<dyn Write + Send>>,
        failure: FailureHandler,
        host: &HostServices,
    ) -> CancellationResult<Backend> {
        let descriptor = self
            .resolve(name)
            .ok_or_else(|| CancellationError::Config(format!("unknown backend {name}")))?;
        (descriptor.pre_init)(output, failure, host)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.backends.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
