// ─────────────────────────────────────────────────────────────────────
// Interflop Cancellation — C ABI Bindings
// (C) 1998-2026 Miroslav Sotek. All rights reserved.
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
// Note: #[deny(unsafe_code)] not applied: every export here crosses the
// C boundary and dereferences host-owned pointers.
//! C-callable wrappers around the cancellation backend.
//!
//! The instrumentation host loads this library, registers its services
//! with `interflop_set_handler`, then drives the lifecycle:
//!
//! ```c
//! void *ctx;
//! interflop_cancellation_pre_init(stderr, host_panic, &ctx);
//! interflop_cancellation_CLI(argc, argv, ctx);
//! struct interflop_backend_interface_t hooks = interflop_cancellation_init(ctx);
//! hooks.interflop_add_double(a, b, &res, ctx);
//! ```
//!
//! # FFI Safety
//!
//! - The context pointer handed out by `pre_init` owns a boxed `Backend`
//!   for the lifetime of the process; the host passes it back verbatim.
//! - Null result or argument pointers are ignored, never dereferenced.
//! - A missing host service reaches the host's panic callback and then
//!   aborts the process; no hook table is ever built in that state.
//! - With the `default-backend` feature the generic `interflop_*`
//!   lifecycle symbols forward to the cancellation ones.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::io::{self, Write};

use parking_lot::Mutex;

use cancellation_core::hooks;
use cancellation_core::{Backend, FailureHandler, HostService, HostServices};
use cancellation_types::{CancellationConfig, ConfigUpdate};

/// Host failure callback. Expected not to return.
pub type PanicFn = unsafe extern "C" fn(msg: *const c_char);

/// `fputs`-compatible writer used for diagnostics when registered.
pub type FputsFn = unsafe extern "C" fn(s: *const c_char, stream: *mut c_void) -> c_int;

pub type BinaryFn<T> = unsafe extern "C" fn(a: T, b: T, res: *mut T, context: *mut c_void);
pub type FmaFn<T> = unsafe extern "C" fn(a: T, b: T, c: T, res: *mut T, context: *mut c_void);
pub type CmpFn<T> = unsafe extern "C" fn(p: c_int, a: T, b: T, res: *mut c_int, context: *mut c_void);
pub type CastFn = unsafe extern "C" fn(a: f64, res: *mut f32, context: *mut c_void);
pub type FunctionFn = unsafe extern "C" fn(info: *mut c_void, context: *mut c_void);
pub type UserCallFn = unsafe extern "C" fn(context: *mut c_void, id: c_int, args: *mut c_void);
pub type FinalizeFn = unsafe extern "C" fn(context: *mut c_void);

// ─── Host services ──────────────────────────────────────────────────

struct HostHandlers {
    services: HostServices,
    fputs: Option<FputsFn>,
}

static HOST: Mutex<HostHandlers> = parking_lot::const_mutex(HostHandlers {
    services: HostServices::none(),
    fputs: None,
});

/// Register (non-null) or unregister (null) a host service by name.
///
/// Names are the C library names (`"malloc"`, `"gettid"`, ...). The
/// `"fputs"` handler additionally routes diagnostics to the stream passed
/// to `pre_init`. Unknown names are ignored.
///
/// # Safety
/// `name` must be null or a valid NUL-terminated string. A non-null
/// `"fputs"` handler must have the `FputsFn` signature.
#[no_mangle]
pub unsafe extern "C" fn interflop_set_handler(name: *const c_char, handler: *mut c_void) {
    if name.is_null() {
        return;
    }
    let name = CStr::from_ptr(name).to_string_lossy();
    let mut host = HOST.lock();

    if name == "fputs" {
        host.fputs = if handler.is_null() {
            None
        } else {
            Some(std::mem::transmute::<*mut c_void, FputsFn>(handler))
        };
        return;
    }

    match HostService::from_name(&name) {
        Some(service) if handler.is_null() => host.services.withdraw(service),
        Some(service) => host.services.provide(service),
        None => log::debug!("ignoring unknown host handler {name}"),
    }
}

fn report_failure(panic: Option<PanicFn>, message: &str) {
    match (panic, CString::new(message.replace('\0', " "))) {
        (Some(panic), Ok(msg)) => unsafe { panic(msg.as_ptr()) },
        _ => eprintln!("{message}"),
    }
}

// ─── Diagnostic stream ──────────────────────────────────────────────

/// Host output stream, written through the host's `fputs`. Falls back to
/// stderr when either is missing.
struct HostStream {
    stream: *mut c_void,
    fputs: Option<FputsFn>,
}

// The stream handle is only ever used behind the diagnostic sink's lock.
unsafe impl Send for HostStream {}

impl Write for HostStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.fputs {
            Some(fputs) if !self.stream.is_null() => {
                let bytes: Vec<u8> = buf.iter().copied().filter(|b| *b != 0).collect();
                let text = CString::new(bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                if unsafe { fputs(text.as_ptr(), self.stream) } < 0 {
                    return Err(io::Error::new(io::ErrorKind::Other, "host fputs failed"));
                }
                Ok(buf.len())
            }
            _ => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.fputs {
            Some(_) if !self.stream.is_null() => Ok(()),
            _ => io::stderr().flush(),
        }
    }
}

// ─── Hooks ──────────────────────────────────────────────────────────

unsafe fn backend_ref<'a>(context: *mut c_void) -> Option<&'a Backend> {
    (context as *const Backend).as_ref()
}

macro_rules! binary_hook {
    ($name:ident, $ty:ty, $op:path) => {
        unsafe extern "C" fn $name(a: $ty, b: $ty, res: *mut $ty, context: *mut c_void) {
            let Some(res) = res.as_mut() else { return };
            match backend_ref(context) {
                Some(backend) => $op(a, b, res, backend.context()),
                None => $op(a, b, res, &CancellationConfig::default()),
            }
        }
    };
}

macro_rules! fma_hook {
    ($name:ident, $ty:ty) => {
        unsafe extern "C" fn $name(a: $ty, b: $ty, c: $ty, res: *mut $ty, context: *mut c_void) {
            let Some(res) = res.as_mut() else { return };
            match backend_ref(context) {
                Some(backend) => hooks::fma(a, b, c, res, backend.context()),
                None => hooks::fma(a, b, c, res, &CancellationConfig::default()),
            }
        }
    };
}

binary_hook!(add_float, f32, hooks::add);
binary_hook!(sub_float, f32, hooks::sub);
binary_hook!(mul_float, f32, hooks::mul);
binary_hook!(div_float, f32, hooks::div);
binary_hook!(add_double, f64, hooks::add);
binary_hook!(sub_double, f64, hooks::sub);
binary_hook!(mul_double, f64, hooks::mul);
binary_hook!(div_double, f64, hooks::div);
fma_hook!(madd_float, f32);
fma_hook!(madd_double, f64);

/// C layout of the hook table. Null slots are left uninstrumented by the
/// host.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct InterflopBackendInterface {
    pub interflop_add_float: Option<BinaryFn<f32>>,
    pub interflop_sub_float: Option<BinaryFn<f32>>,
    pub interflop_mul_float: Option<BinaryFn<f32>>,
    pub interflop_div_float: Option<BinaryFn<f32>>,
    pub interflop_cmp_float: Option<CmpFn<f32>>,
    pub interflop_add_double: Option<BinaryFn<f64>>,
    pub interflop_sub_double: Option<BinaryFn<f64>>,
    pub interflop_mul_double: Option<BinaryFn<f64>>,
    pub interflop_div_double: Option<BinaryFn<f64>>,
    pub interflop_cmp_double: Option<CmpFn<f64>>,
    pub interflop_cast_double_to_float: Option<CastFn>,
    pub interflop_madd_float: Option<FmaFn<f32>>,
    pub interflop_madd_double: Option<FmaFn<f64>>,
    pub interflop_enter_function: Option<FunctionFn>,
    pub interflop_exit_function: Option<FunctionFn>,
    pub interflop_user_call: Option<UserCallFn>,
    pub interflop_finalize: Option<FinalizeFn>,
}

impl InterflopBackendInterface {
    /// Mirror the slots the Rust table fills with their C trampolines.
    fn from_table(table: &hooks::HookTable) -> Self {
        Self {
            interflop_add_float: table.add_float.map(|_| add_float as BinaryFn<f32>),
            interflop_sub_float: table.sub_float.map(|_| sub_float as BinaryFn<f32>),
            interflop_mul_float: table.mul_float.map(|_| mul_float as BinaryFn<f32>),
            interflop_div_float: table.div_float.map(|_| div_float as BinaryFn<f32>),
            interflop_cmp_float: None,
            interflop_add_double: table.add_double.map(|_| add_double as BinaryFn<f64>),
            interflop_sub_double: table.sub_double.map(|_| sub_double as BinaryFn<f64>),
            interflop_mul_double: table.mul_double.map(|_| mul_double as BinaryFn<f64>),
            interflop_div_double: table.div_double.map(|_| div_double as BinaryFn<f64>),
            interflop_cmp_double: None,
            interflop_cast_double_to_float: None,
            interflop_madd_float: table.madd_float.map(|_| madd_float as FmaFn<f32>),
            interflop_madd_double: table.madd_double.map(|_| madd_double as FmaFn<f64>),
            interflop_enter_function: None,
            interflop_exit_function: None,
            interflop_user_call: None,
            interflop_finalize: None,
        }
    }
}

// ─── Lifecycle ──────────────────────────────────────────────────────

/// Verify host services, install diagnostics on `stream` and allocate
/// the context into `*context`.
///
/// # Safety
/// `context` must be null or valid for a pointer write. `stream` is only
/// handed to the registered `fputs`.
#[no_mangle]
pub unsafe extern "C" fn interflop_cancellation_pre_init(
    stream: *mut c_void,
    panic: Option<PanicFn>,
    context: *mut *mut c_void,
) {
    let (services, fputs) = {
        let host = HOST.lock();
        (host.services, host.fputs)
    };
    let failure: FailureHandler = Box::new(move |msg: &str| report_failure(panic, msg));
    let output: Box<dyn Write + Send> = Box::new(HostStream { stream, fputs });

    match Backend::pre_init(Some(output), failure, &services) {
        Ok(backend) => {
            let raw = Box::into_raw(Box::new(backend)) as *mut c_void;
            if let Some(slot) = context.as_mut() {
                *slot = raw;
            }
        }
        // The host has already been told through its panic callback.
        Err(_) => std::process::abort(),
    }
}

/// Log the tolerance, seed the calling thread and return the hook table.
///
/// # Safety
/// `context` must come from `interflop_cancellation_pre_init`.
#[no_mangle]
pub unsafe extern "C" fn interflop_cancellation_init(context: *mut c_void) -> InterflopBackendInterface {
    match backend_ref(context) {
        Some(backend) => InterflopBackendInterface::from_table(&backend.init()),
        None => {
            report_failure(None, "Interflop backend error: init called without a context");
            std::process::abort()
        }
    }
}

/// Parse backend options. `argv[0]` is the backend name and is skipped.
///
/// # Safety
/// `argv` must hold `argc` valid NUL-terminated strings; `context` must
/// come from `interflop_cancellation_pre_init`.
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn interflop_cancellation_CLI(
    argc: c_int,
    argv: *mut *mut c_char,
    context: *mut c_void,
) {
    let Some(backend) = (context as *mut Backend).as_mut() else {
        return;
    };
    if argv.is_null() {
        if argc > 0 {
            backend.fail(
                "Interflop backend error: argv not provided\n\
                 Provide it or use interflop_configure to configure the backend",
            );
        }
        return;
    }

    let args: Vec<String> = (1..argc.max(0) as usize)
        .filter_map(|i| {
            let arg = *argv.add(i);
            (!arg.is_null()).then(|| CStr::from_ptr(arg).to_string_lossy().into_owned())
        })
        .collect();

    // Rejected values are logged and discarded; the rest still applies.
    let _ = backend.cli(args);
}

/// Structured configuration for hosts without a command line. Each
/// `set_*` flag selects whether the matching value is applied.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct InterflopCancellationConf {
    pub seed: u64,
    pub tolerance: i64,
    pub warning: bool,
    pub set_seed: bool,
    pub set_tolerance: bool,
    pub set_warning: bool,
}

impl From<&InterflopCancellationConf> for ConfigUpdate {
    fn from(conf: &InterflopCancellationConf) -> Self {
        Self {
            tolerance: conf.set_tolerance.then_some(conf.tolerance),
            warning: conf.set_warning.then_some(conf.warning),
            seed: conf.set_seed.then_some(conf.seed),
        }
    }
}

/// Apply a structured configuration. Returns 0 on success and -1 when
/// the update is rejected, in which case nothing changed.
///
/// # Safety
/// `conf` must be null or point to a valid `InterflopCancellationConf`;
/// `context` must come from `interflop_cancellation_pre_init`.
#[no_mangle]
pub unsafe extern "C" fn interflop_cancellation_configure(
    conf: *const InterflopCancellationConf,
    context: *mut c_void,
) -> c_int {
    let (Some(conf), Some(backend)) = (conf.as_ref(), (context as *mut Backend).as_mut()) else {
        return -1;
    };
    match backend.configure(ConfigUpdate::from(conf)) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Take over the calling thread's noise stream with `seed`.
#[no_mangle]
pub extern "C" fn interflop_cancellation_push_seed(seed: u64) {
    cancellation_core::push_seed(seed);
}

/// Hand the calling thread's noise stream back as it was before the last
/// push.
#[no_mangle]
pub extern "C" fn interflop_cancellation_pop_seed() {
    cancellation_core::pop_seed();
}

// ─── Generic default-backend symbols ────────────────────────────────

/// # Safety
/// See `interflop_cancellation_pre_init`.
#[cfg(feature = "default-backend")]
#[no_mangle]
pub unsafe extern "C" fn interflop_pre_init(
    stream: *mut c_void,
    panic: Option<PanicFn>,
    context: *mut *mut c_void,
) {
    interflop_cancellation_pre_init(stream, panic, context)
}

/// # Safety
/// See `interflop_cancellation_init`.
#[cfg(feature = "default-backend")]
#[no_mangle]
pub unsafe extern "C" fn interflop_init(context: *mut c_void) -> InterflopBackendInterface {
    interflop_cancellation_init(context)
}

/// # Safety
/// See `interflop_cancellation_CLI`.
#[cfg(feature = "default-backend")]
#[no_mangle]
#[allow(non_snake_case)]
pub unsafe extern "C" fn interflop_CLI(argc: c_int, argv: *mut *mut c_char, context: *mut c_void) {
    interflop_cancellation_CLI(argc, argv, context)
}

/// # Safety
/// See `interflop_cancellation_configure`.
#[cfg(feature = "default-backend")]
#[no_mangle]
pub unsafe extern "C" fn interflop_configure(
    conf: *const InterflopCancellationConf,
    context: *mut c_void,
) -> c_int {
    interflop_cancellation_configure(conf, context)
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::*;

    static PANICS: Mutex<Vec<String>> = parking_lot::const_mutex(Vec::new());

    unsafe extern "C" fn record_panic(msg: *const c_char) {
        PANICS
            .lock()
            .push(CStr::from_ptr(msg).to_string_lossy().into_owned());
    }

    fn register_all_services() {
        for service in HostService::REQUIRED {
            let name = CString::new(service.name()).unwrap();
            // Any non-null pointer marks the service as provided.
            unsafe { interflop_set_handler(name.as_ptr(), record_panic as *mut c_void) };
        }
    }

    fn load() -> *mut c_void {
        register_all_services();
        let mut context: *mut c_void = ptr::null_mut();
        unsafe { interflop_cancellation_pre_init(ptr::null_mut(), Some(record_panic), &mut context) };
        assert!(!context.is_null());
        context
    }

    #[test]
    fn test_pre_init_allocates_default_context() {
        let context = load();
        let backend = unsafe { backend_ref(context) }.unwrap();
        assert_eq!(backend.context(), &CancellationConfig::default());
    }

    #[test]
    fn test_init_table_layout() {
        let context = load();
        let table = unsafe { interflop_cancellation_init(context) };
        assert!(table.interflop_add_float.is_some());
        assert!(table.interflop_div_double.is_some());
        assert!(table.interflop_madd_double.is_some());
        assert!(table.interflop_cmp_float.is_none());
        assert!(table.interflop_cmp_double.is_none());
        assert!(table.interflop_cast_double_to_float.is_none());
        assert!(table.interflop_enter_function.is_none());
        assert!(table.interflop_exit_function.is_none());
        assert!(table.interflop_user_call.is_none());
        assert!(table.interflop_finalize.is_none());
    }

    #[test]
    fn test_c_hooks_compute() {
        let context = load();
        let table = unsafe { interflop_cancellation_init(context) };

        let mut res = 0.0_f64;
        unsafe { (table.interflop_add_double.unwrap())(3.0, 4.0, &mut res, context) };
        assert_eq!(res, 7.0);

        unsafe { (table.interflop_mul_double.unwrap())(1.5, -2.0, &mut res, context) };
        assert_eq!(res, -3.0);

        let mut res32 = 0.0_f32;
        unsafe { (table.interflop_div_float.unwrap())(1.0, 4.0, &mut res32, context) };
        assert_eq!(res32, 0.25);

        let b = 1.0 - 2.0_f64.powi(-52);
        unsafe { (table.interflop_sub_double.unwrap())(1.0, b, &mut res, context) };
        assert!((res - 2.0_f64.powi(-52)).abs() < 2.0_f64.powi(-102));
    }

    #[test]
    fn test_c_hooks_tolerate_null_pointers() {
        let context = load();
        let table = unsafe { interflop_cancellation_init(context) };
        unsafe { (table.interflop_add_double.unwrap())(1.0, 2.0, ptr::null_mut(), context) };

        let mut res = 0.0_f64;
        unsafe { (table.interflop_add_double.unwrap())(1.0, 2.0, &mut res, ptr::null_mut()) };
        assert_eq!(res, 3.0);
    }

    #[test]
    fn test_cli_skips_program_name() {
        let context = load();
        let owned: Vec<CString> = ["interflop_cancellation", "--tolerance=9", "--warning"]
            .iter()
            .map(|s| CString::new(*s).unwrap())
            .collect();
        let mut argv: Vec<*mut c_char> = owned.iter().map(|s| s.as_ptr() as *mut c_char).collect();
        unsafe { interflop_cancellation_CLI(argv.len() as c_int, argv.as_mut_ptr(), context) };

        let backend = unsafe { backend_ref(context) }.unwrap();
        assert_eq!(backend.context().tolerance, 9);
        assert!(backend.context().warning);
    }

    #[test]
    fn test_cli_invalid_tolerance_keeps_previous() {
        let context = load();
        let owned: Vec<CString> = ["interflop_cancellation", "--tolerance=-3"]
            .iter()
            .map(|s| CString::new(*s).unwrap())
            .collect();
        let mut argv: Vec<*mut c_char> = owned.iter().map(|s| s.as_ptr() as *mut c_char).collect();
        unsafe { interflop_cancellation_CLI(argv.len() as c_int, argv.as_mut_ptr(), context) };

        let backend = unsafe { backend_ref(context) }.unwrap();
        assert_eq!(backend.context().tolerance, 1);
    }

    #[test]
    fn test_configure_subset_and_rejection() {
        let context = load();
        let conf = InterflopCancellationConf {
            seed: 5,
            set_seed: true,
            warning: true,
            set_warning: true,
            ..Default::default()
        };
        assert_eq!(unsafe { interflop_cancellation_configure(&conf, context) }, 0);

        let bad = InterflopCancellationConf {
            tolerance: -1,
            set_tolerance: true,
            ..Default::default()
        };
        assert_eq!(unsafe { interflop_cancellation_configure(&bad, context) }, -1);
        assert_eq!(unsafe { interflop_cancellation_configure(ptr::null(), context) }, -1);

        let backend = unsafe { backend_ref(context) }.unwrap();
        assert_eq!(backend.context().tolerance, 1);
        assert!(backend.context().warning);
        assert!(backend.context().use_fixed_seed);
        assert_eq!(backend.context().seed, 5);
    }

    #[test]
    fn test_push_pop_exports() {
        cancellation_core::with_thread_stream(|s| {
            s.reseed(cancellation_types::SeedPolicy::Fixed(4))
        });
        let mut shadow = cancellation_core::with_thread_stream(|s| s.clone());

        interflop_cancellation_push_seed(1000);
        let _ = cancellation_core::with_thread_stream(|s| s.next_f64());
        interflop_cancellation_pop_seed();

        let next = cancellation_core::with_thread_stream(|s| s.next_f64());
        assert_eq!(next, shadow.next_f64());
    }

    #[test]
    fn test_report_failure_reaches_host() {
        report_failure(Some(record_panic), "Interflop backend error: gettid not implemented");
        assert!(PANICS
            .lock()
            .iter()
            .any(|m| m == "Interflop backend error: gettid not implemented"));
    }

    #[test]
    fn test_unknown_handler_is_ignored() {
        let name = CString::new("argp_parse").unwrap();
        unsafe { interflop_set_handler(name.as_ptr(), record_panic as *mut c_void) };
        unsafe { interflop_set_handler(ptr::null(), ptr::null_mut()) };
        register_all_services();
        assert!(HOST.lock().services.check().is_ok());
    }

    #[test]
    fn test_host_stream_falls_back_to_stderr() {
        let mut out = HostStream {
            stream: ptr::null_mut(),
            fputs: None,
        };
        assert!(out.write_all(b"Info [interflop_cancellation]: test\n").is_ok());
        assert!(out.flush().is_ok());
    }

    #[cfg(feature = "default-backend")]
    #[test]
    fn test_default_backend_symbols() {
        register_all_services();
        let mut context: *mut c_void = ptr::null_mut();
        unsafe { interflop_pre_init(ptr::null_mut(), Some(record_panic), &mut context) };
        assert!(!context.is_null());
        let table = unsafe { interflop_init(context) };
        assert!(table.interflop_sub_float.is_some());
    }
}
