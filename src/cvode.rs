//! ODE initial value problems: `y' = f(t, y)`.
//!
//! ```no_run
//! use sunbridge::prelude::*;
//!
//! let options = CvodeOptions::builder().rtol(1e-6).atol(1e-9).build();
//! let mut session = Session::<Cvode>::init(Lmm::Adams, options, 0.0, &[1.0], |_t, y, ydot| {
//!     ydot[0] = -y[0];
//!     Ok(())
//! })?;
//! let mut y = [0.0];
//! let (t, result) = session.solve_normal(1.0, &mut y)?;
//! # Ok::<(), sunbridge::Error>(())
//! ```

use std::ffi::{c_int, c_void};

use bon::Builder;
use sundials_sys as sys;

use crate::{
    dense::DenseMatrix,
    error::{CallbackError, CallbackResult, CvodeError, Error},
    native::{self, cvode::*, Context, CounterFn, LinearStats, LinearSystem, NVector, NonlinSolver, RealFn, PREC_LEFT, PREC_NONE},
    session::{dispatch, err_handler, ErrHandler, Family, Recovery, Sealed, Session},
    tolerance::Tolerance,
    Float,
};

pub use crate::native::cvode::CvodeStats as IntegratorStats;

/// Marker type for ODE sessions.
pub enum Cvode {}

/// Linear multistep method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lmm {
    /// Nonstiff problems; fixed-point iteration until a linear solver is
    /// set.
    Adams,
    /// Stiff problems; needs a linear solver (dense by default).
    Bdf,
}

impl Lmm {
    fn flag(self) -> c_int {
        match self {
            Lmm::Adams => CV_ADAMS,
            Lmm::Bdf => CV_BDF,
        }
    }
}

/// Why a solve call returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverResult {
    /// Reached the requested output time (or took one step).
    Success,
    /// A root function changed sign; see [`Session::get_root_info`].
    RootsFound,
    /// Reached the stop time.
    StopTimeReached,
}

impl SolverResult {
    fn from_flag(flag: c_int) -> Self {
        match flag {
            CV_ROOT_RETURN => SolverResult::RootsFound,
            CV_TSTOP_RETURN => SolverResult::StopTimeReached,
            _ => SolverResult::Success,
        }
    }
}

/// Direction of a zero crossing reported by the root search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootDirection {
    Rising,
    Falling,
    NoRoot,
}

impl RootDirection {
    pub(crate) fn from_flag(flag: c_int) -> Self {
        match flag.signum() {
            1 => RootDirection::Rising,
            -1 => RootDirection::Falling,
            _ => RootDirection::NoRoot,
        }
    }

    pub fn is_root(self) -> bool {
        self != RootDirection::NoRoot
    }
}

/// Arguments to a Jacobian or preconditioner callback.
#[derive(Clone, Copy, Debug)]
pub struct JacobianArgs<'a> {
    pub t: Float,
    pub y: &'a [Float],
    pub fy: &'a [Float],
}

pub type RhsFn = Box<dyn FnMut(Float, &[Float], &mut [Float]) -> CallbackResult>;
pub type RootsFn = Box<dyn FnMut(Float, &[Float], &mut [Float]) -> CallbackResult>;
pub type JacFn = Box<dyn FnMut(JacobianArgs<'_>, &mut DenseMatrix<'_>) -> CallbackResult>;
/// `(args, jok, gamma) -> jcur`: prepare `P ~ I - gamma J`; return whether
/// the Jacobian data was recomputed.
pub type PrecSetupFn = Box<dyn FnMut(JacobianArgs<'_>, bool, Float) -> CallbackResult<bool>>;
/// `(args, r, z, gamma, delta)`: solve `P z = r`.
pub type PrecSolveFn = Box<dyn FnMut(JacobianArgs<'_>, &[Float], &mut [Float], Float, Float) -> CallbackResult>;
/// `(t, y, steps)`, called every `freq` steps.
pub type MonitorFn = Box<dyn FnMut(Float, &[Float], i64) -> CallbackResult>;

/// Closures held by an ODE session.
#[derive(Default)]
pub struct CvodeCallbacks {
    rhs: Option<RhsFn>,
    roots: Option<(usize, RootsFn)>,
    err_handler: Option<ErrHandler>,
    jac: Option<JacFn>,
    prec_setup: Option<PrecSetupFn>,
    prec_solve: Option<PrecSolveFn>,
    monitor: Option<(i64, MonitorFn)>,
}

/// Linear solver for the Newton iteration of [`Lmm::Bdf`].
pub enum LinearSolver {
    /// Dense LU; the Jacobian is approximated by difference quotients
    /// unless one is supplied.
    Dense(Option<JacFn>),
    /// GMRES with Krylov dimension `maxl` (`0` selects 5), optionally left
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
        jac: impl FnMut(JacobianArgs<'_>, &mut DenseMatrix<'_>) -> CallbackResult + 'static,
    ) -> Self {
        LinearSolver::Dense(Some(Box::new(jac)))
    }

    pub fn spgmr(maxl: usize) -> Self {
        LinearSolver::Spgmr { maxl, prec: None }
    }

    pub fn spgmr_preconditioned(
        maxl: usize,
        setup: impl FnMut(JacobianArgs<'_>, bool, Float) -> CallbackResult<bool> + 'static,
        solve: impl FnMut(JacobianArgs<'_>, &[Float], &mut [Float], Float, Float) -> CallbackResult + 'static,
    ) -> Self {
        LinearSolver::Spgmr {
            maxl,
            prec: Some((Box::new(setup), Box::new(solve))),
        }
    }
}

#[derive(Builder, Clone, Debug)]
/// Options for [`Session::<Cvode>::init`].
pub struct CvodeOptions {
    /// Relative tolerance.
    #[builder(default = 1e-4)]
    pub rtol: Float,
    /// Absolute tolerance, scalar or per component.
    #[builder(default = Tolerance::Scalar(1e-8), into)]
    pub atol: Tolerance,
    /// Maximum internal steps per solve call.
    #[builder(default = 500)]
    pub max_num_steps: i64,
    /// Integration never proceeds past this time.
    pub stop_time: Option<Float>,
    /// Initial step size; estimated when `None`.
    pub init_step: Option<Float>,
    pub max_step: Option<Float>,
    pub min_step: Option<Float>,
}

impl Default for CvodeOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Sealed for Cvode {}

impl Family for Cvode {
    const NAME: &'static str = "CVODE";
    const MEM_FAIL: c_int = CV_MEM_FAIL;
    type Callbacks = CvodeCallbacks;
    type Workspace = CvodeWorkspace;

    unsafe fn free(mem: *mut *mut c_void) {
        sys::CVodeFree(mem)
    }

    unsafe fn set_user_data(mem: *mut c_void, user_data: *mut c_void) -> c_int {
        sys::CVodeSetUserData(mem, user_data)
    }

    unsafe fn set_err_handler_fn(mem: *mut c_void, eh_data: *mut c_void) -> c_int {
        sys::CVodeSetErrHandlerFn(mem, Some(err_handler::<Cvode>), eh_data)
    }

    fn error(call: &'static str, flag: c_int) -> Error {
        CvodeError::from_flag(flag).map_or(Error::Native { call, flag }, Error::Cvode)
    }

    fn err_handler_slot(callbacks: &mut CvodeCallbacks) -> &mut Option<ErrHandler> {
        &mut callbacks.err_handler
    }
}

unsafe extern "C" fn rhs_trampoline(t: Float, y: sys::N_Vector, ydot: sys::N_Vector, ud: *mut c_void) -> c_int {
    let (y, ydot) = (native::slice(y), native::slice_mut(ydot));
    dispatch::<Cvode>(ud, "rhs", Recovery::Allowed, |cb| match cb.rhs.as_mut() {
        Some(f) => f(t, y, ydot),
        None => Err(CallbackError::failed("no right-hand side function")),
    })
}

unsafe extern "C" fn roots_trampoline(t: Float, y: sys::N_Vector, gout: *mut Float, ud: *mut c_void) -> c_int {
    let y = native::slice(y);
    dispatch::<Cvode>(ud, "roots", Recovery::Forbidden, |cb| match cb.roots.as_mut() {
        // SAFETY: CVODE hands over room for the `ng` functions registered
        // with `CVodeRootInit`, which is what the slot records.
        Some((ng, g)) => g(t, y, unsafe { native::raw_slice_mut(gout, *ng) }),
        None => Err(CallbackError::failed("no root function")),
    })
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn jac_trampoline(
    t: Float,
    y: sys::N_Vector,
    fy: sys::N_Vector,
    jac: sys::SUNMatrix,
    ud: *mut c_void,
    _tmp1: sys::N_Vector,
    _tmp2: sys::N_Vector,
    _tmp3: sys::N_Vector,
) -> c_int {
    let args = JacobianArgs {
        t,
        y: native::slice(y),
        fy: native::slice(fy),
    };
    let mut jac = DenseMatrix::from_sunmatrix(jac);
    dispatch::<Cvode>(ud, "jacobian", Recovery::Allowed, |cb| match cb.jac.as_mut() {
        Some(f) => f(args, &mut jac),
        None => Err(CallbackError::failed("no Jacobian function")),
    })
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn prec_setup_trampoline(
    t: Float,
    y: sys::N_Vector,
    fy: sys::N_Vector,
    jok: c_int,
    jcur: *mut c_int,
    gamma: Float,
    ud: *mut c_void,
) -> c_int {
    let args = JacobianArgs {
        t,
        y: native::slice(y),
        fy: native::slice(fy),
    };
    let jcur = &mut *jcur;
    dispatch::<Cvode>(ud, "preconditioner setup", Recovery::Allowed, |cb| match cb.prec_setup.as_mut() {
        Some(f) => {
            *jcur = f(args, jok != 0, gamma)? as c_int;
            Ok(())
        }
        None => Err(CallbackError::failed("no preconditioner setup function")),
    })
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn prec_solve_trampoline(
    t: Float,
    y: sys::N_Vector,
    fy: sys::N_Vector,
    r: sys::N_Vector,
    z: sys::N_Vector,
    gamma: Float,
    delta: Float,
    _lr: c_int,
    ud: *mut c_void,
) -> c_int {
    let args = JacobianArgs {
        t,
        y: native::slice(y),
        fy: native::slice(fy),
    };
    let (r, z) = (native::slice(r), native::slice_mut(z));
    dispatch::<Cvode>(ud, "preconditioner solve", Recovery::Allowed, |cb| match cb.prec_solve.as_mut() {
        Some(f) => f(args, r, z, gamma, delta),
        None => Err(CallbackError::failed("no preconditioner solve function")),
    })
}

impl Session<Cvode> {
    /// Create an ODE session for `y' = rhs(t, y)` starting from `(t0, y0)`.
    ///
    /// [`Lmm::Bdf`] sessions get a dense linear solver with a
    /// difference-quotient Jacobian; replace it with
    /// [`set_linear_solver`](Self::set_linear_solver).
    pub fn init(
        lmm: Lmm,
        options: CvodeOptions,
        t0: Float,
        y0: &[Float],
        rhs: impl FnMut(Float, &[Float], &mut [Float]) -> CallbackResult + 'static,
    ) -> Result<Self, Error> {
        let n = y0.len();
        options.atol.check(n).map_err(Error::IllInput)?;
        let callbacks = CvodeCallbacks {
            rhs: Some(Box::new(rhs)),
            ..Default::default()
        };
        Self::create(
            callbacks,
            n,
            || {
                let ctx = Context::new()?;
                let y = NVector::from_slice(y0, &ctx)?;
                // SAFETY: the context is live and outlives the memory, which
                // the session frees before the workspace.
                let mem = unsafe { sys::CVodeCreate(lmm.flag(), ctx.as_ptr()) };
                Ok((mem, CvodeWorkspace::new(y, ctx)))
            },
            |s| {
                s.call_with("CVodeInit", |mem, ws| unsafe {
                    sys::CVodeInit(mem, Some(rhs_trampoline), t0, ws.y.as_ptr())
                })?;
                s.set_tolerances(options.rtol, options.atol.clone())?;
                s.set_max_num_steps(options.max_num_steps)?;
                if let Some(tstop) = options.stop_time {
                    s.set_stop_time(tstop)?;
                }
                if let Some(h0) = options.init_step {
                    s.set_init_step(h0)?;
                }
                if let Some(hmax) = options.max_step {
                    s.set_max_step(hmax)?;
                }
                if let Some(hmin) = options.min_step {
                    s.set_min_step(hmin)?;
                }
                match lmm {
                    Lmm::Bdf => s.set_linear_solver(LinearSolver::dense())?,
                    Lmm::Adams => {
                        let ws = s.workspace()?;
                        let nls = NonlinSolver::fixed_point(&ws.y, &ws.ctx)?;
                        s.set_nonlinear_solver(nls)?;
                    }
                }
                Ok(())
            },
        )
    }

    fn solve(&mut self, tout: Float, y: &mut [Float], itask: c_int) -> Result<(Float, SolverResult), Error> {
        self.check_len("y", y.len())?;
        let monitored = self.with_callbacks(|cb| cb.monitor.is_some())?;
        let result = if monitored && itask == CV_NORMAL {
            self.solve_stepwise(tout)
        } else {
            self.advance(tout, itask)
        };
        let copied = self.with_parts(|ws, _| y.copy_from_slice(ws.y.as_slice()));
        let (t, result) = result?;
        copied?;
        Ok((t, result))
    }

    /// One `CVode` call; in one-step mode the monitor sees the new step.
    fn advance(&mut self, tout: Float, itask: c_int) -> Result<(Float, SolverResult), Error> {
        let mut tret = 0.0;
        let flag = self.call_with("CVode", |mem, ws| unsafe { sys::CVode(mem, tout, ws.y.as_ptr(), &mut tret, itask) })?;
        if itask == CV_ONE_STEP {
            self.run_monitor(tret)?;
        }
        Ok((tret, SolverResult::from_flag(flag)))
    }

    /// Normal-mode solve driven one step at a time so the monitor can run
    /// between steps.
    fn solve_stepwise(&mut self, tout: Float) -> Result<(Float, SolverResult), Error> {
        let tn = self.real("CVodeGetCurrentTime", sys::CVodeGetCurrentTime as RealFn)?;
        let hu = self.real("CVodeGetLastStep", sys::CVodeGetLastStep as RealFn)?;
        if hu != 0.0 && (tn - tout) * hu >= 0.0 {
            self.interpolate(tout)?;
            return Ok((tout, SolverResult::Success));
        }
        let limit = self.workspace()?.max_num_steps;
        let mut taken: i64 = 0;
        loop {
            let (t, result) = self.advance(tout, CV_ONE_STEP)?;
            if result != SolverResult::Success {
                return Ok((t, result));
            }
            if (t - tout) * (tout - tn) >= 0.0 {
                self.interpolate(tout)?;
                return Ok((tout, SolverResult::Success));
            }
            taken += 1;
            if limit > 0 && taken >= limit as i64 {
                return Err(Error::Cvode(CvodeError::TooMuchWork));
            }
        }
    }

    fn interpolate(&mut self, t: Float) -> Result<(), Error> {
        self.call_with("CVodeGetDky", |mem, ws| unsafe { sys::CVodeGetDky(mem, t, 0, ws.y.as_ptr()) })?;
        Ok(())
    }

    fn run_monitor(&mut self, t: Float) -> Result<(), Error> {
        let Some(freq) = self.with_callbacks(|cb| cb.monitor.as_ref().map(|(freq, _)| *freq))? else {
            return Ok(());
        };
        let steps = self.counter("CVodeGetNumSteps", sys::CVodeGetNumSteps as CounterFn)? as i64;
        if steps % freq != 0 {
            return Ok(());
        }
        let outcome = self.with_parts(|ws, cb| match cb.monitor.as_mut() {
            Some((_, monitor)) => monitor(t, ws.y.as_slice(), steps),
            None => Ok(()),
        })?;
        outcome.map_err(CallbackError::into_error)
    }

    /// Integrate to `tout` (interpolating past it), or to the first root or
    /// stop time. Writes the solution into `y` and returns its time.
    pub fn solve_normal(&mut self, tout: Float, y: &mut [Float]) -> Result<(Float, SolverResult), Error> {
        self.solve(tout, y, CV_NORMAL)
    }

    /// Take one internal step towards `tout`.
    pub fn solve_one_step(&mut self, tout: Float, y: &mut [Float]) -> Result<(Float, SolverResult), Error> {
        self.solve(tout, y, CV_ONE_STEP)
    }

    /// Restart from `(t0, y0)` keeping callbacks and options.
    pub fn reinit(&mut self, t0: Float, y0: &[Float]) -> Result<(), Error> {
        self.check_len("y0", y0.len())?;
        self.call_with("CVodeReInit", |mem, ws| unsafe {
            ws.y.as_mut_slice().copy_from_slice(y0);
            sys::CVodeReInit(mem, t0, ws.y.as_ptr())
        })?;
        log::debug!("reinitialised CVODE session at t = {t0}");
        Ok(())
    }

    pub fn set_tolerances(&mut self, rtol: Float, atol: impl Into<Tolerance>) -> Result<(), Error> {
        let atol = atol.into();
        atol.check(self.len).map_err(Error::IllInput)?;
        match atol {
            Tolerance::Scalar(a) => self.call("CVodeSStolerances", |mem| unsafe { sys::CVodeSStolerances(mem, rtol, a) })?,
            Tolerance::Vector(v) => {
                let abstol = NVector::from_slice(&v, &self.workspace()?.ctx)?;
                // CVODE copies the vector, so it can be freed right after.
                self.call("CVodeSVtolerances", |mem| unsafe { sys::CVodeSVtolerances(mem, rtol, abstol.as_ptr()) })?
            }
        };
        Ok(())
    }

    /// Watch `nroots` functions `g(t, y, gout)` for zero crossings.
    pub fn set_roots(
        &mut self,
        nroots: usize,
        g: impl FnMut(Float, &[Float], &mut [Float]) -> CallbackResult + 'static,
    ) -> Result<(), Error> {
        let ng = c_int::try_from(nroots).map_err(|_| Error::IllInput(format!("too many root functions: {nroots}")))?;
        self.install(
            "CVodeRootInit",
            |mem| unsafe { sys::CVodeRootInit(mem, ng, Some(roots_trampoline)) },
            |cb| cb.roots = Some((nroots, Box::new(g))),
        )?;
        self.nroots = nroots;
        Ok(())
    }

    pub fn clear_roots(&mut self) -> Result<(), Error> {
        self.call("CVodeRootInit", |mem| unsafe { sys::CVodeRootInit(mem, 0, None) })?;
        self.nroots = 0;
        self.with_callbacks(|cb| cb.roots = None)
    }

    pub fn nroots(&self) -> usize {
        self.nroots
    }

    /// Directions of the crossings found by the last
    /// [`SolverResult::RootsFound`].
    pub fn get_root_info(&mut self) -> Result<Vec<RootDirection>, Error> {
        let mut flags = vec![0 as c_int; self.nroots];
        self.call("CVodeGetRootInfo", |mem| unsafe { sys::CVodeGetRootInfo(mem, flags.as_mut_ptr()) })?;
        Ok(flags.into_iter().map(RootDirection::from_flag).collect())
    }

    /// Attach `system` and keep it alive for as long as CVODE uses it.
    fn attach(&mut self, system: LinearSystem) -> Result<(), Error> {
        self.call_linear("CVodeSetLinearSolver", |mem, ws| {
            // SAFETY: solver and matrix are live; on success the workspace
            // takes ownership before the previous system is dropped.
            let flag = unsafe { sys::CVodeSetLinearSolver(mem, system.solver_ptr(), system.matrix_ptr()) };
            if flag >= 0 {
                ws.linear = Some(system);
            }
            flag
        })?;
        Ok(())
    }

    fn set_nonlinear_solver(&mut self, nls: NonlinSolver) -> Result<(), Error> {
        self.call_with("CVodeSetNonlinearSolver", |mem, ws| {
            // SAFETY: as in `attach`; CVODE never frees a solver it was given.
            let flag = unsafe { sys::CVodeSetNonlinearSolver(mem, nls.as_ptr()) };
            if flag >= 0 {
                ws.nonlinear = Some(nls);
            }
            flag
        })?;
        Ok(())
    }

    /// Attach a linear solver. An [`Lmm::Adams`] session switches from
    /// fixed-point to Newton iteration so the solver is used.
    pub fn set_linear_solver(&mut self, solver: LinearSolver) -> Result<(), Error> {
        if self.workspace()?.nonlinear.is_some() {
            let ws = self.workspace()?;
            let nls = NonlinSolver::newton(&ws.y, &ws.ctx)?;
            self.set_nonlinear_solver(nls)?;
        }
        match solver {
            LinearSolver::Dense(jac) => {
                let ws = self.workspace()?;
                let system = LinearSystem::dense(&ws.y, &ws.ctx)?;
                self.attach(system)?;
                let jac_fn: sys::CVLsJacFn = jac.is_some().then_some(jac_trampoline as _);
                self.call_linear("CVodeSetJacFn", |mem, _| unsafe { sys::CVodeSetJacFn(mem, jac_fn) })?;
                self.with_callbacks(|cb| {
                    cb.jac = jac;
                    cb.prec_setup = None;
                    cb.prec_solve = None;
                })?;
            }
            LinearSolver::Spgmr { maxl, prec } => {
                let maxl = c_int::try_from(maxl).map_err(|_| Error::IllInput(format!("maxl too large: {maxl}")))?;
                let pretype = if prec.is_some() { PREC_LEFT } else { PREC_NONE };
                let ws = self.workspace()?;
                let system = LinearSystem::spgmr(&ws.y, pretype, maxl, &ws.ctx)?;
                self.attach(system)?;
                if prec.is_some() {
                    self.call_linear("CVodeSetPreconditioner", |mem, _| unsafe {
                        sys::CVodeSetPreconditioner(mem, Some(prec_setup_trampoline), Some(prec_solve_trampoline))
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

    /// Call `monitor(t, y, steps)` every `freq` internal steps.
    ///
    /// While a monitor is set, [`solve_normal`](Self::solve_normal) advances
    /// one internal step at a time.
    pub fn set_monitor_fn(
        &mut self,
        freq: usize,
        monitor: impl FnMut(Float, &[Float], i64) -> CallbackResult + 'static,
    ) -> Result<(), Error> {
        if freq == 0 {
            return Err(Error::IllInput("monitor frequency must be positive".into()));
        }
        self.with_callbacks(|cb| cb.monitor = Some((freq as i64, Box::new(monitor))))
    }

    pub fn clear_monitor_fn(&mut self) -> Result<(), Error> {
        self.with_callbacks(|cb| cb.monitor = None)
    }

    pub fn set_stop_time(&mut self, tstop: Float) -> Result<(), Error> {
        self.call("CVodeSetStopTime", |mem| unsafe { sys::CVodeSetStopTime(mem, tstop) })?;
        Ok(())
    }

    pub fn set_max_num_steps(&mut self, mxsteps: i64) -> Result<(), Error> {
        self.call_with("CVodeSetMaxNumSteps", |mem, ws| {
            let flag = unsafe { sys::CVodeSetMaxNumSteps(mem, mxsteps as _) };
            if flag >= 0 {
                // Zero selects the default; negative values disable the limit.
                ws.max_num_steps = match mxsteps {
                    0 => 500,
                    m => m.max(-1) as _,
                };
            }
            flag
        })?;
        Ok(())
    }

    pub fn set_init_step(&mut self, hin: Float) -> Result<(), Error> {
        self.call("CVodeSetInitStep", |mem| unsafe { sys::CVodeSetInitStep(mem, hin) })?;
        Ok(())
    }

    pub fn set_max_step(&mut self, hmax: Float) -> Result<(), Error> {
        self.call("CVodeSetMaxStep", |mem| unsafe { sys::CVodeSetMaxStep(mem, hmax) })?;
        Ok(())
    }

    pub fn set_min_step(&mut self, hmin: Float) -> Result<(), Error> {
        self.call("CVodeSetMinStep", |mem| unsafe { sys::CVodeSetMinStep(mem, hmin) })?;
        Ok(())
    }

    /// The `k`-th derivative of the interpolated solution at `t`, which must
    /// lie within the last internal step.
    pub fn get_dky(&mut self, t: Float, k: u32, dky: &mut [Float]) -> Result<(), Error> {
        self.check_len("dky", dky.len())?;
        let k = c_int::try_from(k).map_err(|_| Error::Cvode(CvodeError::BadK))?;
        let out = NVector::new(self.len, &self.workspace()?.ctx)?;
        self.call("CVodeGetDky", |mem| unsafe { sys::CVodeGetDky(mem, t, k, out.as_ptr()) })?;
        dky.copy_from_slice(out.as_slice());
        Ok(())
    }

    pub fn get_integrator_stats(&mut self) -> Result<IntegratorStats, Error> {
        let mut stats = IntegratorStats::default();
        self.call("CVodeGetIntegratorStats", |mem| unsafe { get_integrator_stats(mem, &mut stats) })?;
        Ok(stats)
    }

    /// Counters of the attached linear solver; fails with
    /// [`Error::Native`] when none is attached.
    pub fn get_linear_solver_stats(&mut self) -> Result<LinearStats, Error> {
        let mut stats = LinearStats::default();
        self.call_linear("CVodeGetLinearStats", |mem, _| unsafe { get_linear_stats(mem, &mut stats) })?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn root_directions_follow_sign() {
        assert_eq!(RootDirection::from_flag(1), RootDirection::Rising);
        assert_eq!(RootDirection::from_flag(-1), RootDirection::Falling);
        assert!(!RootDirection::from_flag(0).is_root());
    }

    #[test]
    fn options_default_through_builder() {
        let options = CvodeOptions::default();
        assert_relative_eq!(options.rtol, 1e-4);
        assert_eq!(options.max_num_steps, 500);
        assert!(matches!(options.atol, Tolerance::Scalar(a) if a == 1e-8));
    }

    #[test]
    fn bad_tolerance_length_is_rejected_before_creation() {
        let options = CvodeOptions::builder().atol(vec![1e-8; 3]).build();
        let err = Session::<Cvode>::init(Lmm::Adams, options, 0.0, &[1.0, 2.0], |_, _, _| Ok(())).unwrap_err();
        assert!(matches!(err, Error::IllInput(_)));
    }

    #[test]
    fn recoverable_root_failure_is_reported_as_unrecoverable() {
        let mut s = Session::<Cvode>::init(Lmm::Adams, CvodeOptions::default(), 0.0, &[1.0], |_, y, yd| {
            yd[0] = -y[0];
            Ok(())
        })
        .unwrap();
        s.set_roots(1, |_, _, _| Err(CallbackError::Recoverable)).unwrap();
        let mut y = [0.0];
        let err = s.solve_normal(1.0, &mut y).unwrap_err();
        assert!(err.callback_error::<crate::error::RecoverableFailure>().is_some());
    }

    #[test]
    fn rejected_root_registration_keeps_the_previous_roots() {
        let mut s = Session::<Cvode>::init(Lmm::Adams, CvodeOptions::default(), 0.0, &[1.0], |_, y, yd| {
            yd[0] = -y[0];
            Ok(())
        })
        .unwrap();
        s.set_roots(1, |_, y, g| {
            g[0] = y[0] - 0.5;
            Ok(())
        })
        .unwrap();
        let err = s
            .install(
                "CVodeRootInit",
                |_| CV_MEM_FAIL,
                |cb| cb.roots = Some((2, Box::new(|_, _, _| Err(CallbackError::failed("replaced"))))),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Cvode(CvodeError::MemFail)));
        assert_eq!(s.nroots(), 1);

        let mut y = [0.0];
        let (t, result) = s.solve_normal(2.0, &mut y).unwrap();
        assert_eq!(result, SolverResult::RootsFound);
        assert_relative_eq!(t, 2.0_f64.ln(), max_relative = 1e-3);
        assert_eq!(s.get_root_info().unwrap(), vec![RootDirection::Falling]);
    }
    #[test]
    fn adams_switches_to_newton_with_a_linear_solver() {
        let mut s = Session::<Cvode>::init(Lmm::Adams, CvodeOptions::default(), 0.0, &[1.0], |_, y, yd| {
            yd[0] = -y[0];
            Ok(())
        })
        .unwrap();
        assert!(s.get_linear_solver_stats().is_err());

        s.set_linear_solver(LinearSolver::dense()).unwrap();
        let mut y = [0.0];
        s.solve_normal(1.0, &mut y).unwrap();
        assert_relative_eq!(y[0], (-1.0_f64).exp(), max_relative = 1e-3);
        assert!(s.get_linear_solver_stats().unwrap().jac_evals > 0);
    }
}
