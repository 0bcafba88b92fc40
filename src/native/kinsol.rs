//! KINSOL status codes, session workspace and statistics.

use std::ffi::{c_int, c_long, c_void};

use sundials_sys as sys;

use crate::Float;

use super::{read_counters, Context, CounterFn, LinearStats, LinearSystem, NVector};

pub const KIN_NONE: c_int = 0;
pub const KIN_LINESEARCH: c_int = 1;
pub const KIN_PICARD: c_int = 2;
pub const KIN_FP: c_int = 3;

pub const KIN_SUCCESS: c_int = 0;
pub const KIN_INITIAL_GUESS_OK: c_int = 1;
pub const KIN_STEP_LT_STPTOL: c_int = 2;
pub const KIN_ILL_INPUT: c_int = -2;
pub const KIN_NO_MALLOC: c_int = -3;
pub const KIN_MEM_FAIL: c_int = -4;
pub const KIN_LINESEARCH_NONCONV: c_int = -5;
pub const KIN_MAXITER_REACHED: c_int = -6;
pub const KIN_MXNEWT_5X_EXCEEDED: c_int = -7;
pub const KIN_LINESEARCH_BCFAIL: c_int = -8;
pub const KIN_LINSOLV_NO_RECOVERY: c_int = -9;
pub const KIN_LINIT_FAIL: c_int = -10;
pub const KIN_LSETUP_FAIL: c_int = -11;
pub const KIN_LSOLVE_FAIL: c_int = -12;
pub const KIN_SYSFUNC_FAIL: c_int = -13;
pub const KIN_FIRST_SYSFUNC_ERR: c_int = -14;
pub const KIN_REPTD_SYSFUNC_ERR: c_int = -15;

/// Library objects a nonlinear-system session owns besides its solver
/// memory.
pub struct KinsolWorkspace {
    /// Initial guess in, last iterate out.
    pub u: NVector,
    pub u_scale: NVector,
    pub f_scale: NVector,
    pub linear: Option<LinearSystem>,
    pub ctx: Context,
}

/// Nonlinear iteration counters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct KinsolStats {
    /// Nonlinear iterations.
    pub iters: c_long,
    /// System function evaluations, excluding difference quotients.
    pub fun_evals: c_long,
    /// Line search backtracks.
    pub backtracks: c_long,
    /// Scaled norm of `F` at the last iterate.
    pub fnorm: Float,
    /// Scaled length of the last step.
    pub step_length: Float,
}

/// # Safety
/// `mem` must be live KINSOL memory.
pub unsafe fn get_stats(mem: *mut c_void, s: &mut KinsolStats) -> c_int {
    let flag = read_counters(
        mem,
        [
            (sys::KINGetNumNonlinSolvIters as CounterFn, &mut s.iters),
            (sys::KINGetNumFuncEvals as CounterFn, &mut s.fun_evals),
            (sys::KINGetNumBacktrackOps as CounterFn, &mut s.backtracks),
        ],
    );
    if flag < 0 {
        return flag;
    }
    let flag = sys::KINGetFuncNorm(mem, &mut s.fnorm);
    if flag < 0 {
        return flag;
    }
    sys::KINGetStepLength(mem, &mut s.step_length)
}

/// # Safety
/// `mem` must be live KINSOL memory.
pub unsafe fn get_linear_stats(mem: *mut c_void, s: &mut LinearStats) -> c_int {
    read_counters(
        mem,
        [
            (sys::KINGetNumJacEvals as CounterFn, &mut s.jac_evals),
            (sys::KINGetNumLinFuncEvals as CounterFn, &mut s.fun_evals),
            (sys::KINGetNumLinIters as CounterFn, &mut s.lin_iters),
            (sys::KINGetNumLinConvFails as CounterFn, &mut s.lin_conv_fails),
            (sys::KINGetNumPrecEvals as CounterFn, &mut s.prec_evals),
            (sys::KINGetNumPrecSolves as CounterFn, &mut s.prec_solves),
        ],
    )
}
