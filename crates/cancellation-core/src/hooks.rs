// ─────────────────────────────────────────────────────────────────────
// Interflop Cancellation — Arithmetic Hooks and Hook Table
// ─────────────────────────────────────────────────────────────────────
//! Entry points the host calls once per instrumented operation.
//!
//! Every hook writes its result through `res` and never fails. Only
//! additions and subtractions reach the detector; the calling thread's
//! random stream is looked up only when a cancellation triggers.

use cancellation_types::{CancellationConfig, IeeeFloat};

use crate::detector::{detect, inject, report};
use crate::stream::with_thread_stream;

pub type BinaryHook<F> = fn(F, F, &mut F, &CancellationConfig);
pub type FmaHook<F> = fn(F, F, F, &mut F, &CancellationConfig);
pub type CmpHook<F> = fn(CmpPredicate, F, F, &mut bool, &CancellationConfig);
pub type CastHook = fn(f64, &mut f32, &CancellationConfig);
pub type FunctionHook = fn(&str, &CancellationConfig);
pub type UserCallHook = fn(u32, &CancellationConfig);
pub type FinalizeHook = fn(&CancellationConfig);

/// Floating-point comparison predicates, for hosts that instrument
/// comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpPredicate {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Unordered,
}

#[inline]
fn cancell_in_place<F: IeeeFloat>(a: F, b: F, res: &mut F, ctx: &CancellationConfig) {
    if let Some(detection) = detect(a, b, *res, ctx) {
        report(detection, ctx);
        with_thread_stream(|stream| inject(res, detection, ctx, stream));
    }
}

pub fn add<F: IeeeFloat>(a: F, b: F, res: &mut F, ctx: &CancellationConfig) {
    *res = a + b;
    cancell_in_place(a, b, res, ctx);
}

pub fn sub<F: IeeeFloat>(a: F, b: F, res: &mut F, ctx: &CancellationConfig) {
    *res = a - b;
    cancell_in_place(a, b, res, ctx);
}

pub fn mul<F: IeeeFloat>(a: F, b: F, res: &mut F, _ctx: &CancellationConfig) {
    *res = a * b;
}

pub fn div<F: IeeeFloat>(a: F, b: F, res: &mut F, _ctx: &CancellationConfig) {
    *res = a / b;
}

pub fn fma<F: IeeeFloat>(a: F, b: F, c: F, res: &mut F, _ctx: &CancellationConfig) {
    *res = a.fused_mul_add(b, c);
}

/// Function-pointer table handed to the host. `None` tells the host to
/// leave that operation uninstrumented.
#[derive(Clone, Copy, Default)]
pub struct HookTable {
    pub add_float: Option<BinaryHook<f32>>,
    pub sub_float: Option<BinaryHook<f32>>,
    pub mul_float: Option<BinaryHook<f32>>,
    pub div_float: Option<BinaryHook<f32>>,
    pub cmp_float: Option<CmpHook<f32>>,

    pub add_double: Option<BinaryHook<f64>>,
    pub sub_double: Option<BinaryHook<f64>>,
    pub mul_double: Option<BinaryHook<f64>>,
    pub div_double: Option<BinaryHook<f64>>,
    pub cmp_double: Option<CmpHook<f64>>,

    pub cast_double_to_float: Option<CastHook>,

    pub madd_float: Option<FmaHook<f32>>,
    pub madd_double: Option<FmaHook<f64>>,

    pub enter_function: Option<FunctionHook>,
    pub exit_function: Option<FunctionHook>,
    pub user_call: Option<UserCallHook>,
    pub finalize: Option<FinalizeHook>,
}

impl HookTable {
    /// Table of the cancellation backend.
    pub fn cancellation() -> Self {
        Self {
            add_float: Some(add::<f32>),
            sub_float: Some(sub::<f32>),
            mul_float: Some(mul::<f32>),
            div_float: Some(div::<f32>),
            add_double: Some(add::<f64>),
            sub_double: Some(sub::<f64>),
            mul_double: Some(mul::<f64>),
            div_double: Some(div::<f64>),
            madd_float: Some(fma::<f32>),
            madd_double: Some(fma::<f64>),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{pop_seed, push_seed, RandomStream};
    use cancellation_types::SeedPolicy;

    fn contexts() -> Vec<CancellationConfig> {
        vec![
            CancellationConfig::default(),
            CancellationConfig {
                tolerance: 0,
                warning: true,
                seed: 3,
                use_fixed_seed: true,
            },
            CancellationConfig {
                tolerance: 40,
                ..Default::default()
            },
        ]
    }

    #[test]
    fn test_table_advertises_unsupported_as_none() {
        let table = HookTable::cancellation();
        assert!(table.cmp_float.is_none());
        assert!(table.cmp_double.is_none());
        assert!(table.cast_double_to_float.is_none());
        assert!(table.enter_function.is_none());
        assert!(table.exit_function.is_none());
        assert!(table.user_call.is_none());
        assert!(table.finalize.is_none());
        assert!(table.add_float.is_some() && table.sub_double.is_some());
        assert!(table.madd_float.is_some() && table.madd_double.is_some());
    }

    #[test]
    fn test_add_hook_no_cancellation() {
        let table = HookTable::cancellation();
        let ctx = CancellationConfig::default();
        let mut res = 0.0_f64;
        (table.add_double.unwrap())(3.0, 4.0, &mut res, &ctx);
        assert_eq!(res.to_bits(), 7.0_f64.to_bits());

        let mut res32 = 0.0_f32;
        (table.sub_float.unwrap())(10.0, -6.0, &mut res32, &ctx);
        assert_eq!(res32, 16.0);
    }

    #[test]
    fn test_sub_hook_concrete_cancellation() {
        let ctx = CancellationConfig::default();
        let b = 1.0 - 2.0_f64.powi(-52);
        let mut res = 0.0;
        sub(1.0, b, &mut res, &ctx);
        assert!((res - 2.0_f64.powi(-52)).abs() < 2.0_f64.powi(-102));
    }

    #[test]
    fn test_mul_div_fma_passthrough() {
        let table = HookTable::cancellation();
        let operands = [(1.0_f64, -1.0), (3.0, 1.0 / 3.0), (1e30, 1e-30), (0.1, 0.2)];
        for ctx in contexts() {
            for (a, b) in operands {
                let mut r = 0.0;
                (table.mul_double.unwrap())(a, b, &mut r, &ctx);
                assert_eq!(r.to_bits(), (a * b).to_bits());
                (table.div_double.unwrap())(a, b, &mut r, &ctx);
                assert_eq!(r.to_bits(), (a / b).to_bits());
                (table.madd_double.unwrap())(a, b, -a * b, &mut r, &ctx);
                assert_eq!(r.to_bits(), a.mul_add(b, -a * b).to_bits());

                let (a32, b32) = (a as f32, b as f32);
                let mut r32 = 0.0_f32;
                (table.mul_float.unwrap())(a32, b32, &mut r32, &ctx);
                assert_eq!(r32.to_bits(), (a32 * b32).to_bits());
                (table.div_float.unwrap())(a32, b32, &mut r32, &ctx);
                assert_eq!(r32.to_bits(), (a32 / b32).to_bits());
                (table.madd_float.unwrap())(a32, b32, 1.0, &mut r32, &ctx);
                assert_eq!(r32.to_bits(), a32.mul_add(b32, 1.0).to_bits());
            }
        }
    }

    #[test]
    fn test_hook_uses_thread_stream() {
        let ctx = CancellationConfig {
            seed: 64,
            use_fixed_seed: true,
            ..Default::default()
        };
        let mut res = 0.0;
        add(1.0_f64, -0.75, &mut res, &ctx);
        let policy = with_thread_stream(|s| s.policy());
        assert_eq!(policy, SeedPolicy::Fixed(64));

        let mut fresh = RandomStream::with_seed(64);
        let expected = 0.25 + crate::noise::noise_binary64(-3, &mut fresh);
        assert_eq!(res, expected);
    }

    #[test]
    fn test_fixed_seed_replay_through_hooks() {
        let ctx = CancellationConfig {
            seed: 1,
            use_fixed_seed: true,
            ..Default::default()
        };
        let mut first = 0.0_f32;
        sub(1.0_f32, 0.9, &mut first, &ctx);
        for _ in 0..10 {
            let mut again = 0.0_f32;
            sub(1.0_f32, 0.9, &mut again, &ctx);
            assert_eq!(again.to_bits(), first.to_bits());
        }
    }

    #[test]
    fn test_uninitialized_thread_lazily_seeds() {
        let handle = std::thread::spawn(|| {
            let ctx = CancellationConfig::default();
            let fresh = with_thread_stream(|s| s.is_initialized());
            let mut res = 0.0;
            add(1.0_f64, -0.999, &mut res, &ctx);
            (fresh, with_thread_stream(|s| s.is_initialized()), res)
        });
        let (was_initialized, now_initialized, res) = handle.join().unwrap();
        assert!(!was_initialized);
        assert!(now_initialized);
        assert!(res.is_finite());
        assert!((res - (1.0 - 0.999)).abs() < 2.0_f64.powi(-10 - 9));
    }

    #[test]
    fn test_trigger_reseed_overrides_pushed_seed() {
        let ctx = CancellationConfig {
            seed: 10,
            use_fixed_seed: true,
            ..Default::default()
        };
        let mut before = 0.0;
        add(1.0_f64, -0.75, &mut before, &ctx);

        push_seed(999);
        let mut during = 0.0;
        add(1.0_f64, -0.75, &mut during, &ctx);
        pop_seed();

        let mut after = 0.0;
        add(1.0_f64, -0.75, &mut after, &ctx);
        assert_eq!(before, during);
        assert_eq!(before, after);
    }
}
