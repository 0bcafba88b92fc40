//! Nonlinear algebraic systems: `F(u) = 0`.
//!
//! ```no_run
//! use sunbridge::prelude::*;
//!
//! let mut session = Session::<Kinsol>::init(KinsolOptions::default(), &[1.0, 0.5], |u, f| {
//!     f[0] = u[0] * u[0] + u[1] * u[1] - 1.0;
//!     f[1] = u[0] - u[1];
//!     Ok(())
//! })?;
//! let mut u = [1.0, 0.5];
//! session.solve(&mut u, Strategy::LineSearch, &[1.0; 2], &[1.0; 2])?;
//! # Ok::<(), sunbridge::Error>(())
//! ```

use std::ffi::{c_char, c_int, c_void};
use std::fmt;

use bon::Builder;
use sundials_sys as sys;

use crate::{
    dense::DenseMatrix,
    error::{CallbackError, CallbackResult, Error, KinsolError},
    native::{self, kinsol::*, Context, LinearStats, LinearSystem, NVector, PREC_NONE, PREC_RIGHT},
    session::{dispatch, err_handler, lossy, ErrHandler, Family, Recovery, Sealed, Session},
    Float,
};

pub use crate::native::kinsol::KinsolStats;

/// Marker type for nonlinear system sessions.
pub enum Kinsol {}

/// Global strategy of the nonlinear iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Inexact Newton.
    #[default]
    Newton,
    /// Newton with backtracking line search.
    LineSearch,
    /// Newton with a Jacobian fixed for the whole solve.
    Picard,
    /// `u <- G(u)`, where the system function computes `G`.
    FixedPoint,
}

impl Strategy {
    fn flag(self) -> c_int {
        match self {
            Strategy::Newton => KIN_NONE,
            Strategy::LineSearch => KIN_LINESEARCH,
            Strategy::Picard => KIN_PICARD,
            Strategy::FixedPoint => KIN_FP,
        }
    }
}

/// Amount of progress information sent to the info handler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrintLevel {
    #[default]
    Silent,
    Iterations,
    LineSearch,
    LinearSolver,
}

/// How a successful solve ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KinsolResult {
    /// `|| fscale F(u) ||` dropped below the function tolerance.
    Success,
    /// The initial guess already satisfied the tolerance.
    InitialGuessOk,
    /// The scaled step fell below the step tolerance; `u` may be a
    /// stagnation point rather than a root.
    StoppedOnStepTol,
}

/// An informational message from the solver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfoDetails {
    pub module: String,
    pub function: String,
    pub message: String,
}

impl fmt::Display for InfoDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.module, self.function, self.message)
    }
}

/// Arguments to preconditioner callbacks.
#[derive(Clone, Copy, Debug)]
pub struct PrecArgs<'a> {
    pub u: &'a [Float],
    pub u_scale: &'a [Float],
    pub fu: &'a [Float],
    pub f_scale: &'a [Float],
}

pub type SysFn = Box<dyn FnMut(&[Float], &mut [Float]) -> CallbackResult>;
/// `(u, fu, jac)`: fill the zeroed `jac` with `dF/du`.
pub type JacFn = Box<dyn FnMut(&[Float], &[Float], &mut DenseMatrix<'_>) -> CallbackResult>;
pub type PrecSetupFn = Box<dyn FnMut(PrecArgs<'_>) -> CallbackResult>;
/// Overwrite `v` with the solution of `P z = v`.
pub type PrecSolveFn = Box<dyn FnMut(PrecArgs<'_>, &mut [Float]) -> CallbackResult>;
pub type InfoHandler = Box<dyn FnMut(&InfoDetails) -> CallbackResult>;

#[derive(Default)]
pub struct KinsolCallbacks {
    func: Option<SysFn>,
    err_handler: Option<ErrHandler>,
    info_handler: Option<InfoHandler>,
    jac: Option<JacFn>,
    prec_setup: Option<PrecSetupFn>,
    prec_solve: Option<PrecSolveFn>,
}

/// Linear solver for Newton and Picard iterations.
pub enum LinearSolver {
    Dense(Option<JacFn>),
    /// GMRES with Krylov dimension `maxl` (`0` selects 5), optionally right
    /// preconditioned.
    Spgmr {
        maxl: usize,
        prec: Option<(PrecSetupFn, PrecSolveFn)>,
    },
}

impl LinearSolver {
    pub fn dense() -> Self {
        LinearSolver::Dense(None)
    }

    pub fn dense_with_jacobian(
        jac: impl FnMut(&[Float], &[Float], &mut DenseMatrix<'_>) -> CallbackResult + 'static,
    ) -> Self {
        LinearSolver::Dense(Some(Box::new(jac)))
    }

    pub fn spgmr(maxl: usize) -> Self {
        LinearSolver::Spgmr { maxl, prec: None }
    }

    pub fn spgmr_preconditioned(
        maxl: usize,
        setup: impl FnMut(PrecArgs<'_>) -> CallbackResult + 'static,
        solve: impl FnMut(PrecArgs<'_>, &mut [Float]) -> CallbackResult + 'static,
    ) -> Self {
        LinearSolver::Spgmr {
            maxl,
            prec: Some((Box::new(setup), Box::new(solve))),
        }
    }
}

#[derive(Builder, Clone, Debug)]
/// Options for [`Session::<Kinsol>::init`]. Unset values keep the solver's
/// defaults.
pub struct KinsolOptions {
    /// Maximum nonlinear iterations (default 200).
    pub max_iters: Option<i64>,
    /// Iterations between Jacobian updates (default 10).
    pub max_setup_calls: Option<i64>,
    /// Stop when `|| fscale F(u) ||_inf` falls below this.
    pub func_norm_tol: Option<Float>,
    /// Stop when the scaled step falls below this.
    pub scaled_step_tol: Option<Float>,
    pub max_newton_step: Option<Float>,
    #[builder(default)]
    pub print_level: PrintLevel,
}

impl Default for KinsolOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Sealed for Kinsol {}

impl Family for Kinsol {
    const NAME: &'static str = "KINSOL";
    const MEM_FAIL: c_int = KIN_MEM_FAIL;
    type Callbacks = KinsolCallbacks;
    type Workspace = KinsolWorkspace;

    unsafe fn free(mem: *mut *mut c_void) {
        sys::KINFree(mem)
    }

    unsafe fn set_user_data(mem: *mut c_void, user_data: *mut c_void) -> c_int {
        sys::KINSetUserData(mem, user_data)
    }

    unsafe fn set_err_handler_fn(mem: *mut c_void, eh_data: *mut c_void) -> c_int {
        sys::KINSetErrHandlerFn(mem, Some(err_handler::<Kinsol>), eh_data)
    }

    fn error(call: &'static str, flag: c_int) -> Error {
        KinsolError::from_flag(flag).map_or(Error::Native { call, flag }, Error::Kinsol)
    }

    fn err_handler_slot(callbacks: &mut KinsolCallbacks) -> &mut Option<ErrHandler> {
        &mut callbacks.err_handler
    }
}

unsafe extern "C" fn sys_trampoline(u: sys::N_Vector, fval: sys::N_Vector, ud: *mut c_void) -> c_int {
    let (u, fval) = (native::slice(u), native::slice_mut(fval));
    dispatch::<Kinsol>(ud, "system", Recovery::Allowed, |cb| match cb.func.as_mut() {
        Some(f) => f(u, fval),
        None => Err(CallbackError::failed("no system function")),
    })
}

unsafe extern "C" fn jac_trampoline(
    u: sys::N_Vector,
    fu: sys::N_Vector,
    jac: sys::SUNMatrix,
    ud: *mut c_void,
    _tmp1: sys::N_Vector,
    _tmp2: sys::N_Vector,
) -> c_int {
    let (u, fu) = (native::slice(u), native::slice(fu));
    let mut jac = DenseMatrix::from_sunmatrix(jac);
    dispatch::<Kinsol>(ud, "jacobian", Recovery::Allowed, |cb| match cb.jac.as_mut() {
        Some(f) => f(u, fu, &mut jac),
        None => Err(CallbackError::failed("no Jacobian function")),
    })
}

unsafe fn prec_args<'a>(
    u: sys::N_Vector,
    uscale: sys::N_Vector,
    fu: sys::N_Vector,
    fscale: sys::N_Vector,
) -> PrecArgs<'a> {
    PrecArgs {
        u: native::slice(u),
        u_scale: native::slice(uscale),
        fu: native::slice(fu),
        f_scale: native::slice(fscale),
    }
}

unsafe extern "C" fn prec_setup_trampoline(
    u: sys::N_Vector,
    uscale: sys::N_Vector,
    fu: sys::N_Vector,
    fscale: sys::N_Vector,
    ud: *mut c_void,
) -> c_int {
    let args = prec_args(u, uscale, fu, fscale);
    dispatch::<Kinsol>(ud, "preconditioner setup", Recovery::Allowed, |cb| match cb.prec_setup.as_mut() {
        Some(f) => f(args),
        None => Err(CallbackError::failed("no preconditioner setup function")),
    })
}

unsafe extern "C" fn prec_solve_trampoline(
    u: sys::N_Vector,
    uscale: sys::N_Vector,
    fu: sys::N_Vector,
    fscale: sys::N_Vector,
    v: sys::N_Vector,
    ud: *mut c_void,
) -> c_int {
    let args = prec_args(u, uscale, fu, fscale);
    let v = native::slice_mut(v);
    dispatch::<Kinsol>(ud, "preconditioner solve", Recovery::Allowed, |cb| match cb.prec_solve.as_mut() {
        Some(f) => f(args, v),
        None => Err(CallbackError::failed("no preconditioner solve function")),
    })
}

unsafe extern "C" fn info_trampoline(
    module: *const c_char,
    function: *const c_char,
    msg: *mut c_char,
    ud: *mut c_void,
) {
    let details = InfoDetails {
        module: lossy(module),
        function: lossy(function),
        message: lossy(msg),
    };
    dispatch::<Kinsol>(ud, "info handler", Recovery::Forbidden, |cb| match cb.info_handler.as_mut() {
        Some(handler) => handler(&details),
        None => {
            log::debug!("{details}");
            Ok(())
        }
    });
}

impl Session<Kinsol> {
    /// Create a session for the system `func(u, f)`; `u0` fixes the problem
    /// size.
    ///
    /// A dense linear solver with a difference-quotient Jacobian is attached;
    /// [`Strategy::FixedPoint`] ignores it.
    pub fn init(
        options: KinsolOptions,
        u0: &[Float],
        func: impl FnMut(&[Float], &mut [Float]) -> CallbackResult + 'static,
    ) -> Result<Self, Error> {
        let callbacks = KinsolCallbacks {
            func: Some(Box::new(func)),
            ..Default::default()
        };
        let n = u0.len();
        Self::create(
            callbacks,
            n,
            || {
                let ctx = Context::new()?;
                let workspace = KinsolWorkspace {
                    u: NVector::from_slice(u0, &ctx)?,
                    u_scale: NVector::new(n, &ctx)?,
                    f_scale: NVector::new(n, &ctx)?,
                    linear: None,
                    ctx,
                };
                // SAFETY: the context outlives the memory.
                let mem = unsafe { sys::KINCreate(workspace.ctx.as_ptr()) };
                Ok((mem, workspace))
            },
            |s| {
                s.call_with("KINInit", |mem, ws| unsafe { sys::KINInit(mem, Some(sys_trampoline), ws.u.as_ptr()) })?;
                let ud = s.root_id().map_or(std::ptr::null_mut(), |id| id.to_user_data());
                s.call("KINSetInfoHandlerFn", |mem| unsafe {
                    sys::KINSetInfoHandlerFn(mem, Some(info_trampoline), ud)
                })?;
                if let Some(mxiter) = options.max_iters {
                    s.set_max_iters(mxiter)?;
                }
                if let Some(msbset) = options.max_setup_calls {
                    s.set_max_setup_calls(msbset)?;
                }
                if let Some(tol) = options.func_norm_tol {
                    s.set_func_norm_tol(tol)?;
                }
                if let Some(tol) = options.scaled_step_tol {
                    s.set_scaled_step_tol(tol)?;
                }
                if let Some(step) = options.max_newton_step {
                    s.set_max_newton_step(step)?;
                }
                s.set_print_level(options.print_level)?;
                s.set_linear_solver(LinearSolver::dense())
            },
        )
    }

    /// Solve from the initial guess in `u`, leaving the last iterate there.
    ///
    /// `u_scale` and `f_scale` are positive diagonal scalings of `u` and
    /// `F(u)`.
    pub fn solve(
        &mut self,
        u: &mut [Float],
        strategy: Strategy,
        u_scale: &[Float],
        f_scale: &[Float],
    ) -> Result<KinsolResult, Error> {
        self.check_len("u", u.len())?;
        self.check_len("u_scale", u_scale.len())?;
        self.check_len("f_scale", f_scale.len())?;
        let strategy = strategy.flag();
        let flag = self.call_with("KINSol", |mem, ws| {
            ws.u.as_mut_slice().copy_from_slice(u);
            ws.u_scale.as_mut_slice().copy_from_slice(u_scale);
            ws.f_scale.as_mut_slice().copy_from_slice(f_scale);
            unsafe { sys::KINSol(mem, ws.u.as_ptr(), strategy, ws.u_scale.as_ptr(), ws.f_scale.as_ptr()) }
        });
        self.with_parts(|ws, _| u.copy_from_slice(ws.u.as_slice()))?;
        Ok(match flag? {
            KIN_INITIAL_GUESS_OK => KinsolResult::InitialGuessOk,
            KIN_STEP_LT_STPTOL => KinsolResult::StoppedOnStepTol,
            _ => KinsolResult::Success,
        })
    }

    fn attach(&mut self, system: LinearSystem) -> Result<(), Error> {
        self.call_linear("KINSetLinearSolver", |mem, ws| {
            // SAFETY: solver and matrix are live and kept in the workspace
            // on success.
            let flag = unsafe { sys::KINSetLinearSolver(mem, system.solver_ptr(), system.matrix_ptr()) };
            if flag >= 0 {
                ws.linear = Some(system);
            }
            flag
        })?;
        Ok(())
    }

    pub fn set_linear_solver(&mut self, solver: LinearSolver) -> Result<(), Error> {
        match solver {
            LinearSolver::Dense(jac) => {
                let ws = self.workspace()?;
                let system = LinearSystem::dense(&ws.u, &ws.ctx)?;
                self.attach(system)?;
                let jac_fn: sys::KINLsJacFn = jac.is_some().then_some(jac_trampoline as _);
                self.call_linear("KINSetJacFn", |mem, _| unsafe { sys::KINSetJacFn(mem, jac_fn) })?;
                self.with_callbacks(|cb| {
                    cb.jac = jac;
                    cb.prec_setup = None;
                    cb.prec_solve = None;
                })?;
            }
            LinearSolver::Spgmr { maxl, prec } => {
                let maxl = c_int::try_from(maxl).map_err(|_| Error::IllInput(format!("maxl too large: {maxl}")))?;
                let pretype = if prec.is_some() { PREC_RIGHT } else { PREC_NONE };
                let ws = self.workspace()?;
                let system = LinearSystem::spgmr(&ws.u, pretype, maxl, &ws.ctx)?;
                self.attach(system)?;
                if prec.is_some() {
                    self.call_linear("KINSetPreconditioner", |mem, _| unsafe {
                        sys::KINSetPreconditioner(mem, Some(prec_setup_trampoline), Some(prec_solve_trampoline))
                    })?;
                }
                self.with_callbacks(|cb| {
                    let (setup, solve) = prec.map_or((None, None), |(s, v)| (Some(s), Some(v)));
                    cb.prec_setup = setup;
                    cb.prec_solve = solve;
                    cb.jac = None;
                })?;
            }
        }
        Ok(())
    }

    /// Route progress messages to `handler` instead of `log::debug!`.
    pub fn set_info_handler(
        &mut self,
        handler: impl FnMut(&InfoDetails) -> CallbackResult + 'static,
    ) -> Result<(), Error> {
        self.with_callbacks(|cb| cb.info_handler = Some(Box::new(handler)))
    }

    pub fn clear_info_handler(&mut self) -> Result<(), Error> {
        self.with_callbacks(|cb| cb.info_handler = None)
    }

    pub fn set_print_level(&mut self, level: PrintLevel) -> Result<(), Error> {
        let level = level as c_int;
        self.call("KINSetPrintLevel", |mem| unsafe { sys::KINSetPrintLevel(mem, level) })?;
        Ok(())
    }

    pub fn set_max_iters(&mut self, mxiter: i64) -> Result<(), Error> {
        self.call("KINSetNumMaxIters", |mem| unsafe { sys::KINSetNumMaxIters(mem, mxiter as _) })?;
        Ok(())
    }

    pub fn set_max_setup_calls(&mut self, msbset: i64) -> Result<(), Error> {
        self.call("KINSetMaxSetupCalls", |mem| unsafe { sys::KINSetMaxSetupCalls(mem, msbset as _) })?;
        Ok(())
    }

    pub fn set_func_norm_tol(&mut self, tol: Float) -> Result<(), Error> {
        self.call("KINSetFuncNormTol", |mem| unsafe { sys::KINSetFuncNormTol(mem, tol) })?;
        Ok(())
    }

    pub fn set_scaled_step_tol(&mut self, tol: Float) -> Result<(), Error> {
        self.call("KINSetScaledStepTol", |mem| unsafe { sys::KINSetScaledStepTol(mem, tol) })?;
        Ok(())
    }

    pub fn set_max_newton_step(&mut self, step: Float) -> Result<(), Error> {
        self.call("KINSetMaxNewtonStep", |mem| unsafe { sys::KINSetMaxNewtonStep(mem, step) })?;
        Ok(())
    }

    pub fn get_stats(&mut self) -> Result<KinsolStats, Error> {
        let mut stats = KinsolStats::default();
        self.call("KINGetStats", |mem| unsafe { get_stats(mem, &mut stats) })?;
        Ok(stats)
    }

    pub fn get_linear_solver_stats(&mut self) -> Result<LinearStats, Error> {
        let mut stats = LinearStats::default();
        self.call_linear("KINGetLinearStats", |mem, _| unsafe { get_linear_stats(mem, &mut stats) })?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_levels_map_to_native_values() {
        assert_eq!(PrintLevel::Silent as c_int, 0);
        assert_eq!(PrintLevel::LinearSolver as c_int, 3);
        assert!(PrintLevel::Iterations < PrintLevel::LineSearch);
    }

    #[test]
    fn info_handler_sees_iteration_messages() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let options = KinsolOptions::builder().print_level(PrintLevel::Iterations).build();
        let mut s = Session::<Kinsol>::init(options, &[0.0], |u, f| {
            f[0] = u[0] - 2.0;
            Ok(())
        })
        .unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        s.set_info_handler(move |info| {
            sink.borrow_mut().push(info.module.clone());
            Ok(())
        })
        .unwrap();
        let mut u = [0.0];
        s.solve(&mut u, Strategy::Newton, &[1.0], &[1.0]).unwrap();
        assert!((u[0] - 2.0).abs() < 1e-8);
        assert!(seen.borrow().iter().all(|m| m == "KINSOL"));
        assert!(!seen.borrow().is_empty());
    }
}
