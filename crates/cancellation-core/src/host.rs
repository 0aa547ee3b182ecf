// ─────────────────────────────────────────────────────────────────────
// Interflop Cancellation — Host Services
// ─────────────────────────────────────────────────────────────────────
//! Services the instrumentation host must provide before the backend
//! agrees to load, and the host's failure-reporting callback.

use cancellation_types::{CancellationError, CancellationResult};

/// Host failure callback. Receives a human-readable description of an
/// unrecoverable condition.
pub type FailureHandler = Box<dyn Fn(&str) + Send + Sync>;

/// A standard-library-level service supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostService {
    Malloc,
    Exit,
    Fopen,
    Fprintf,
    Getenv,
    Gettid,
    Sprintf,
    Strcasecmp,
    Strerror,
    Vfprintf,
    Vwarnx,
}

impl HostService {
    /// Every service the backend refuses to run without, in check order.
    pub const REQUIRED: [HostService; 11] = [
        HostService::Malloc,
        HostService::Exit,
        HostService::Fopen,
        HostService::Fprintf,
        HostService::Getenv,
        HostService::Gettid,
        HostService::Sprintf,
        HostService::Strcasecmp,
        HostService::Strerror,
        HostService::Vfprintf,
        HostService::Vwarnx,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HostService::Malloc => "malloc",
            HostService::Exit => "exit",
            HostService::Fopen => "fopen",
            HostService::Fprintf => "fprintf",
            HostService::Getenv => "getenv",
            HostService::Gettid => "gettid",
            HostService::Sprintf => "sprintf",
            HostService::Strcasecmp => "strcasecmp",
            HostService::Strerror => "strerror",
            HostService::Vfprintf => "vfprintf",
            HostService::Vwarnx => "vwarnx",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::REQUIRED.into_iter().find(|s| s.name() == name)
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// Set of services a host has registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostServices {
    provided: u32,
}

impl HostServices {
    /// Nothing provided yet.
    pub const fn none() -> Self {
        Self { provided: 0 }
    }

    /// Everything provided. This is what a Rust host gets through std.
    pub fn all() -> Self {
        let mut services = Self::none();
        for s in HostService::REQUIRED {
            services.provide(s);
        }
        services
    }

    pub fn provide(&mut self, service: HostService) {
        self.provided |= service.bit();
    }

    pub fn withdraw(&mut self, service: HostService) {
        self.provided &= !service.bit();
    }

    pub fn provides(&self, service: HostService) -> bool {
        self.provided & service.bit() != 0
    }

    /// First required service that is missing, if any.
    pub fn check(&self) -> CancellationResult<()> {
        match HostService::REQUIRED.into_iter().find(|s| !self.provides(*s)) {
            Some(missing) => Err(CancellationError::MissingHostService {
                service: missing.name(),
            }),
            None => Ok(()),
        }
    }
}
