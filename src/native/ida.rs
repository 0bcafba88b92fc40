//! IDA status codes, session workspace and statistics.

use std::ffi::{c_int, c_long, c_void};

use sundials_sys as sys;

use crate::Float;

use super::{read_counters, Context, CounterFn, LinearStats, LinearSystem, NVector};

pub const IDA_NORMAL: c_int = 1;
pub const IDA_ONE_STEP: c_int = 2;

pub const IDA_SUCCESS: c_int = 0;
pub const IDA_TSTOP_RETURN: c_int = 1;
pub const IDA_ROOT_RETURN: c_int = 2;
pub const IDA_TOO_MUCH_WORK: c_int = -1;
pub const IDA_TOO_MUCH_ACC: c_int = -2;
pub const IDA_ERR_FAIL: c_int = -3;
pub const IDA_CONV_FAIL: c_int = -4;
pub const IDA_LINIT_FAIL: c_int = -5;
pub const IDA_LSETUP_FAIL: c_int = -6;
pub const IDA_LSOLVE_FAIL: c_int = -7;
pub const IDA_RES_FAIL: c_int = -8;
pub const IDA_REP_RES_ERR: c_int = -9;
pub const IDA_RTFUNC_FAIL: c_int = -10;
pub const IDA_CONSTR_FAIL: c_int = -11;
pub const IDA_FIRST_RES_FAIL: c_int = -12;
pub const IDA_LINESEARCH_FAIL: c_int = -13;
pub const IDA_NO_RECOVERY: c_int = -14;
pub const IDA_MEM_FAIL: c_int = -21;
pub const IDA_ILL_INPUT: c_int = -22;
pub const IDA_NO_MALLOC: c_int = -23;
pub const IDA_BAD_EWT: c_int = -24;
pub const IDA_BAD_K: c_int = -25;
pub const IDA_BAD_T: c_int = -26;
pub const IDA_BAD_DKY: c_int = -27;

/// Library objects a DAE session owns besides its solver memory.
pub struct IdaWorkspace {
    /// Initial values, then the output buffers of `IDASolve`.
    pub y: NVector,
    pub yp: NVector,
    pub linear: Option<LinearSystem>,
    pub ctx: Context,
}

/// Integrator counters and step sizes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IdaStats {
    pub steps: c_long,
    pub res_evals: c_long,
    pub linear_solver_setups: c_long,
    pub error_test_failures: c_long,
    pub nonlinear_conv_failures: c_long,
    pub last_order: c_int,
    pub current_order: c_int,
    pub initial_step_size: Float,
    pub last_step_size: Float,
    pub next_step_size: Float,
    pub internal_time: Float,
}

/// # Safety
/// `mem` must be live IDA memory.
pub unsafe fn get_integrator_stats(mem: *mut c_void, s: &mut IdaStats) -> c_int {
    let flag = sys::IDAGetIntegratorStats(
        mem,
        &mut s.steps,
        &mut s.res_evals,
        &mut s.linear_solver_setups,
        &mut s.error_test_failures,
        &mut s.last_order,
        &mut s.current_order,
        &mut s.initial_step_size,
        &mut s.last_step_size,
        &mut s.next_step_size,
        &mut s.internal_time,
    );
    if flag < 0 {
        return flag;
    }
    sys::IDAGetNumNonlinSolvConvFails(mem, &mut s.nonlinear_conv_failures)
}

/// # Safety
/// `mem` must be live IDA memory.
pub unsafe fn get_linear_stats(mem: *mut c_void, s: &mut LinearStats) -> c_int {
    read_counters(
        mem,
        [
            (sys::IDAGetNumJacEvals as CounterFn, &mut s.jac_evals),
            (sys::IDAGetNumLinResEvals as CounterFn, &mut s.fun_evals),
            (sys::IDAGetNumLinIters as CounterFn, &mut s.lin_iters),
            (sys::IDAGetNumLinConvFails as CounterFn, &mut s.lin_conv_fails),
            (sys::IDAGetNumPrecEvals as CounterFn, &mut s.prec_evals),
            (sys::IDAGetNumPrecSolves as CounterFn, &mut s.prec_solves),
        ],
    )
}
