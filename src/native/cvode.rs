//! CVODE status codes, session workspace and statistics.

use std::ffi::{c_int, c_long, c_void};

use sundials_sys as sys;

use crate::Float;

use super::{read_counters, Context, CounterFn, LinearStats, LinearSystem, NVector, NonlinSolver};

pub const CV_ADAMS: c_int = 1;
pub const CV_BDF: c_int = 2;

pub const CV_NORMAL: c_int = 1;
pub const CV_ONE_STEP: c_int = 2;

pub const CV_SUCCESS: c_int = 0;
pub const CV_TSTOP_RETURN: c_int = 1;
pub const CV_ROOT_RETURN: c_int = 2;
pub const CV_TOO_MUCH_WORK: c_int = -1;
pub const CV_TOO_MUCH_ACC: c_int = -2;
pub const CV_ERR_FAILURE: c_int = -3;
pub const CV_CONV_FAILURE: c_int = -4;
pub const CV_LINIT_FAIL: c_int = -5;
pub const CV_LSETUP_FAIL: c_int = -6;
pub const CV_LSOLVE_FAIL: c_int = -7;
pub const CV_RHSFUNC_FAIL: c_int = -8;
pub const CV_FIRST_RHSFUNC_ERR: c_int = -9;
pub const CV_REPTD_RHSFUNC_ERR: c_int = -10;
pub const CV_UNREC_RHSFUNC_ERR: c_int = -11;
pub const CV_RTFUNC_FAIL: c_int = -12;
pub const CV_MEM_FAIL: c_int = -20;
pub const CV_ILL_INPUT: c_int = -22;
pub const CV_NO_MALLOC: c_int = -23;
pub const CV_BAD_K: c_int = -24;
pub const CV_BAD_T: c_int = -25;
pub const CV_BAD_DKY: c_int = -26;
pub const CV_TOO_CLOSE: c_int = -27;

/// Library objects an ODE session owns besides its solver memory.
///
/// `ctx` is declared last so it is dropped after everything made in it.
pub struct CvodeWorkspace {
    /// Initial values, then the output buffer of `CVode` and `CVodeGetDky`.
    pub y: NVector,
    pub linear: Option<LinearSystem>,
    /// Set once the session replaces CVODE's built-in Newton solver.
    pub nonlinear: Option<NonlinSolver>,
    /// Mirrors `CVodeSetMaxNumSteps` for step-by-step solves.
    pub max_num_steps: c_long,
    pub ctx: Context,
}

impl CvodeWorkspace {
    pub fn new(y: NVector, ctx: Context) -> Self {
        CvodeWorkspace {
            y,
            linear: None,
            nonlinear: None,
            max_num_steps: 500,
            ctx,
        }
    }
}

/// Integrator counters and step sizes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CvodeStats {
    pub steps: c_long,
    pub rhs_evals: c_long,
    pub linear_solver_setups: c_long,
    pub error_test_failures: c_long,
    pub nonlinear_conv_failures: c_long,
    /// Method order used on the last step.
    pub last_order: c_int,
    /// Method order to be used on the next step.
    pub current_order: c_int,
    pub initial_step_size: Float,
    pub last_step_size: Float,
    pub next_step_size: Float,
    pub internal_time: Float,
}

/// # Safety
/// `mem` must be live CVODE memory.
pub unsafe fn get_integrator_stats(mem: *mut c_void, s: &mut CvodeStats) -> c_int {
    let flag = sys::CVodeGetIntegratorStats(
        mem,
        &mut s.steps,
        &mut s.rhs_evals,
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
    sys::CVodeGetNumNonlinSolvConvFails(mem, &mut s.nonlinear_conv_failures)
}

/// # Safety
/// `mem` must be live CVODE memory.
pub unsafe fn get_linear_stats(mem: *mut c_void, s: &mut LinearStats) -> c_int {
    read_counters(
        mem,
        [
            (sys::CVodeGetNumJacEvals as CounterFn, &mut s.jac_evals),
            (sys::CVodeGetNumLinRhsEvals as CounterFn, &mut s.fun_evals),
            (sys::CVodeGetNumLinIters as CounterFn, &mut s.lin_iters),
            (sys::CVodeGetNumLinConvFails as CounterFn, &mut s.lin_conv_fails),
            (sys::CVodeGetNumPrecEvals as CounterFn, &mut s.prec_evals),
            (sys::CVodeGetNumPrecSolves as CounterFn, &mut s.prec_solves),
        ],
    )
}
