//! Differential-algebraic problems: `F(t, y, y') = 0`.

use std::ffi::{c_int, c_void};

use bon::Builder;
use sundials_sys as sys;

use crate::{
    dense::DenseMatrix,
    error::{CallbackError, CallbackResult, Error, IdaError},
    native::{self, ida::*, Context, LinearStats, LinearSystem, NVector},
    session::{dispatch, err_handler, ErrHandler, Family, Recovery, Sealed, Session},
    tolerance::Tolerance,
    Float,
};

pub use crate::cvode::{RootDirection, SolverResult};
pub use crate::native::ida::IdaStats as IntegratorStats;

/// Marker type for DAE sessions.
pub enum Ida {}

/// Arguments to a residual Jacobian callback.
#[derive(Clone, Copy, Debug)]
pub struct JacobianArgs<'a> {
    pub t: Float,
    /// Scaling of `dF/dy'` in the iteration matrix.
    pub cj: Float,
    pub y: &'a [Float],
    pub yp: &'a [Float],
    /// Current residual.
    pub r: &'a [Float],
}

pub type ResFn = Box<dyn FnMut(Float, &[Float], &[Float], &mut [Float]) -> CallbackResult>;
pub type RootsFn = Box<dyn FnMut(Float, &[Float], &[Float], &mut [Float]) -> CallbackResult>;
/// Fill the (zeroed) iteration matrix `dF/dy + cj dF/dy'`.
pub type JacFn = Box<dyn FnMut(JacobianArgs<'_>, &mut DenseMatrix<'_>) -> CallbackResult>;

#[derive(Default)]
pub struct IdaCallbacks {
    res: Option<ResFn>,
    roots: Option<(usize, RootsFn)>,
    err_handler: Option<ErrHandler>,
    jac: Option<JacFn>,
}

#[derive(Builder, Clone, Debug)]
/// Options for [`Session::<Ida>::init`].
pub struct IdaOptions {
    #[builder(default = 1e-4)]
    pub rtol: Float,
    #[builder(default = Tolerance::Scalar(1e-8), into)]
    pub atol: Tolerance,
    #[builder(default = 500)]
    pub max_num_steps: i64,
    pub stop_time: Option<Float>,
    pub init_step: Option<Float>,
    pub max_step: Option<Float>,
}

impl Default for IdaOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Sealed for Ida {}

impl Family for Ida {
    const NAME: &'static str = "IDA";
    const MEM_FAIL: c_int = IDA_MEM_FAIL;
    type Callbacks = IdaCallbacks;
    type Workspace = IdaWorkspace;

    unsafe fn free(mem: *mut *mut c_void) {
        sys::IDAFree(mem)
    }

    unsafe fn set_user_data(mem: *mut c_void, user_data: *mut c_void) -> c_int {
        sys::IDASetUserData(mem, user_data)
    }

    unsafe fn set_err_handler_fn(mem: *mut c_void, eh_data: *mut c_void) -> c_int {
        sys::IDASetErrHandlerFn(mem, Some(err_handler::<Ida>), eh_data)
    }

    fn error(call: &'static str, flag: c_int) -> Error {
        IdaError::from_flag(flag).map_or(Error::Native { call, flag }, Error::Ida)
    }

    fn err_handler_slot(callbacks: &mut IdaCallbacks) -> &mut Option<ErrHandler> {
        &mut callbacks.err_handler
    }
}

unsafe extern "C" fn res_trampoline(
    t: Float,
    y: sys::N_Vector,
    yp: sys::N_Vector,
    r: sys::N_Vector,
    ud: *mut c_void,
) -> c_int {
    let (y, yp, r) = (native::slice(y), native::slice(yp), native::slice_mut(r));
    dispatch::<Ida>(ud, "residual", Recovery::Allowed, |cb| match cb.res.as_mut() {
        Some(f) => f(t, y, yp, r),
        None => Err(CallbackError::failed("no residual function")),
    })
}

unsafe extern "C" fn roots_trampoline(
    t: Float,
    y: sys::N_Vector,
    yp: sys::N_Vector,
    gout: *mut Float,
    ud: *mut c_void,
) -> c_int {
    let (y, yp) = (native::slice(y), native::slice(yp));
    dispatch::<Ida>(ud, "roots", Recovery::Forbidden, |cb| match cb.roots.as_mut() {
        // SAFETY: `gout` has room for the `ng` registered functions.
        Some((ng, g)) => g(t, y, yp, unsafe { native::raw_slice_mut(gout, *ng) }),
        None => Err(CallbackError::failed("no root function")),
    })
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn jac_trampoline(
    t: Float,
    cj: Float,
    y: sys::N_Vector,
    yp: sys::N_Vector,
    r: sys::N_Vector,
    jac: sys::SUNMatrix,
    ud: *mut c_void,
    _tmp1: sys::N_Vector,
    _tmp2: sys::N_Vector,
    _tmp3: sys::N_Vector,
) -> c_int {
    let args = JacobianArgs {
        t,
        cj,
        y: native::slice(y),
        yp: native::slice(yp),
        r: native::slice(r),
    };
    let mut jac = DenseMatrix::from_sunmatrix(jac);
    dispatch::<Ida>(ud, "jacobian", Recovery::Allowed, |cb| match cb.jac.as_mut() {
        Some(f) => f(args, &mut jac),
        None => Err(CallbackError::failed("no Jacobian function")),
    })
}

impl Session<Ida> {
    /// Create a DAE session for `res(t, y, y', r)` from consistent initial
    /// values `(t0, y0, yp0)`. A dense linear solver with a
    /// difference-quotient iteration matrix is attached.
    pub fn init(
        options: IdaOptions,
        t0: Float,
        y0: &[Float],
        yp0: &[Float],
        res: impl FnMut(Float, &[Float], &[Float], &mut [Float]) -> CallbackResult + 'static,
    ) -> Result<Self, Error> {
        let n = y0.len();
        if yp0.len() != n {
            return Err(Error::LengthMismatch {
                what: "yp0",
                expected: n,
                got: yp0.len(),
            });
        }
        options.atol.check(n).map_err(Error::IllInput)?;
        let callbacks = IdaCallbacks {
            res: Some(Box::new(res)),
            ..Default::default()
        };
        Self::create(
            callbacks,
            n,
            || {
                let ctx = Context::new()?;
                let y = NVector::from_slice(y0, &ctx)?;
                let yp = NVector::from_slice(yp0, &ctx)?;
                // SAFETY: the context outlives the memory.
                let mem = unsafe { sys::IDACreate(ctx.as_ptr()) };
                let workspace = IdaWorkspace {
                    y,
                    yp,
                    linear: None,
                    ctx,
                };
                Ok((mem, workspace))
            },
            |s| {
                s.call_with("IDAInit", |mem, ws| unsafe {
                    sys::IDAInit(mem, Some(res_trampoline), t0, ws.y.as_ptr(), ws.yp.as_ptr())
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
                s.set_jacobian(None)
            },
        )
    }

    fn solve(
        &mut self,
        tout: Float,
        y: &mut [Float],
        yp: &mut [Float],
        itask: c_int,
    ) -> Result<(Float, SolverResult), Error> {
        self.check_len("y", y.len())?;
        self.check_len("yp", yp.len())?;
        let mut tret = 0.0;
        let flag = self.call_with("IDASolve", |mem, ws| unsafe {
            sys::IDASolve(mem, tout, &mut tret, ws.y.as_ptr(), ws.yp.as_ptr(), itask)
        });
        self.with_parts(|ws, _| {
            y.copy_from_slice(ws.y.as_slice());
            yp.copy_from_slice(ws.yp.as_slice());
        })?;
        let result = match flag? {
            IDA_ROOT_RETURN => SolverResult::RootsFound,
            IDA_TSTOP_RETURN => SolverResult::StopTimeReached,
            _ => SolverResult::Success,
        };
        Ok((tret, result))
    }

    /// Integrate to `tout`, or to the first root or stop time. Writes `y`
    /// and `y'` and returns the time reached.
    pub fn solve_normal(&mut self, tout: Float, y: &mut [Float], yp: &mut [Float]) -> Result<(Float, SolverResult), Error> {
        self.solve(tout, y, yp, IDA_NORMAL)
    }

    pub fn solve_one_step(
        &mut self,
        tout: Float,
        y: &mut [Float],
        yp: &mut [Float],
    ) -> Result<(Float, SolverResult), Error> {
        self.solve(tout, y, yp, IDA_ONE_STEP)
    }

    pub fn reinit(&mut self, t0: Float, y0: &[Float], yp0: &[Float]) -> Result<(), Error> {
        self.check_len("y0", y0.len())?;
        self.check_len("yp0", yp0.len())?;
        self.call_with("IDAReInit", |mem, ws| {
            ws.y.as_mut_slice().copy_from_slice(y0);
            ws.yp.as_mut_slice().copy_from_slice(yp0);
            unsafe { sys::IDAReInit(mem, t0, ws.y.as_ptr(), ws.yp.as_ptr()) }
        })?;
        log::debug!("reinitialised IDA session at t = {t0}");
        Ok(())
    }

    pub fn set_tolerances(&mut self, rtol: Float, atol: impl Into<Tolerance>) -> Result<(), Error> {
        let atol = atol.into();
        atol.check(self.len).map_err(Error::IllInput)?;
        match atol {
            Tolerance::Scalar(a) => self.call("IDASStolerances", |mem| unsafe { sys::IDASStolerances(mem, rtol, a) })?,
            Tolerance::Vector(v) => {
                let abstol = NVector::from_slice(&v, &self.workspace()?.ctx)?;
                self.call("IDASVtolerances", |mem| unsafe { sys::IDASVtolerances(mem, rtol, abstol.as_ptr()) })?
            }
        };
        Ok(())
    }

    /// Supply the iteration matrix, or fall back to difference quotients
    /// with `None`.
    pub fn set_jacobian(&mut self, jac: Option<JacFn>) -> Result<(), Error> {
        let ws = self.workspace()?;
        if ws.linear.is_none() {
            let system = LinearSystem::dense(&ws.y, &ws.ctx)?;
            self.call_linear("IDASetLinearSolver", |mem, ws| {
                // SAFETY: solver and matrix are live and kept in the
                // workspace on success.
                let flag = unsafe { sys::IDASetLinearSolver(mem, system.solver_ptr(), system.matrix_ptr()) };
                if flag >= 0 {
                    ws.linear = Some(system);
                }
                flag
            })?;
        }
        let jac_fn: sys::IDALsJacFn = jac.is_some().then_some(jac_trampoline as _);
        self.call_linear("IDASetJacFn", |mem, _| unsafe { sys::IDASetJacFn(mem, jac_fn) })?;
        self.with_callbacks(|cb| cb.jac = jac)
    }

    pub fn set_jacobian_fn(
        &mut self,
        jac: impl FnMut(JacobianArgs<'_>, &mut DenseMatrix<'_>) -> CallbackResult + 'static,
    ) -> Result<(), Error> {
        self.set_jacobian(Some(Box::new(jac)))
    }

    /// Watch `nroots` functions `g(t, y, y', gout)` for zero crossings.
    pub fn set_roots(
        &mut self,
        nroots: usize,
        g: impl FnMut(Float, &[Float], &[Float], &mut [Float]) -> CallbackResult + 'static,
    ) -> Result<(), Error> {
        let ng = c_int::try_from(nroots).map_err(|_| Error::IllInput(format!("too many root functions: {nroots}")))?;
        self.install(
            "IDARootInit",
            |mem| unsafe { sys::IDARootInit(mem, ng, Some(roots_trampoline)) },
            |cb| cb.roots = Some((nroots, Box::new(g))),
        )?;
        self.nroots = nroots;
        Ok(())
    }

    pub fn clear_roots(&mut self) -> Result<(), Error> {
        self.call("IDARootInit", |mem| unsafe { sys::IDARootInit(mem, 0, None) })?;
        self.nroots = 0;
        self.with_callbacks(|cb| cb.roots = None)
    }

    pub fn nroots(&self) -> usize {
        self.nroots
    }

    pub fn get_root_info(&mut self) -> Result<Vec<RootDirection>, Error> {
        let mut flags = vec![0 as c_int; self.nroots];
        self.call("IDAGetRootInfo", |mem| unsafe { sys::IDAGetRootInfo(mem, flags.as_mut_ptr()) })?;
        Ok(flags.into_iter().map(RootDirection::from_flag).collect())
    }

    pub fn set_stop_time(&mut self, tstop: Float) -> Result<(), Error> {
        self.call("IDASetStopTime", |mem| unsafe { sys::IDASetStopTime(mem, tstop) })?;
        Ok(())
    }

    pub fn set_max_num_steps(&mut self, mxsteps: i64) -> Result<(), Error> {
        self.call("IDASetMaxNumSteps", |mem| unsafe { sys::IDASetMaxNumSteps(mem, mxsteps as _) })?;
        Ok(())
    }

    pub fn set_init_step(&mut self, hin: Float) -> Result<(), Error> {
        self.call("IDASetInitStep", |mem| unsafe { sys::IDASetInitStep(mem, hin) })?;
        Ok(())
    }

    pub fn set_max_step(&mut self, hmax: Float) -> Result<(), Error> {
        self.call("IDASetMaxStep", |mem| unsafe { sys::IDASetMaxStep(mem, hmax) })?;
        Ok(())
    }

    pub fn get_dky(&mut self, t: Float, k: u32, dky: &mut [Float]) -> Result<(), Error> {
        self.check_len("dky", dky.len())?;
        let k = c_int::try_from(k).map_err(|_| Error::Ida(IdaError::BadK))?;
        let out = NVector::new(self.len, &self.workspace()?.ctx)?;
        self.call("IDAGetDky", |mem| unsafe { sys::IDAGetDky(mem, t, k, out.as_ptr()) })?;
        dky.copy_from_slice(out.as_slice());
        Ok(())
    }

    pub fn get_integrator_stats(&mut self) -> Result<IntegratorStats, Error> {
        let mut stats = IntegratorStats::default();
        self.call("IDAGetIntegratorStats", |mem| unsafe { get_integrator_stats(mem, &mut stats) })?;
        Ok(stats)
    }

    pub fn get_linear_solver_stats(&mut self) -> Result<LinearStats, Error> {
        let mut stats = LinearStats::default();
        self.call_linear("IDAGetLinearStats", |mem, _| unsafe { get_linear_stats(mem, &mut stats) })?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yp0_length_must_match_y0() {
        let err = Session::<Ida>::init(IdaOptions::default(), 0.0, &[1.0, 0.0], &[0.0], |_, _, _, _| Ok(())).unwrap_err();
        assert!(matches!(
            err,
            Error::LengthMismatch {
                what: "yp0",
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn solve_rejects_short_output_vectors() {
        let mut s = Session::<Ida>::init(IdaOptions::default(), 0.0, &[1.0], &[-1.0], |_, y, yp, r| {
            r[0] = yp[0] + y[0];
            Ok(())
        })
        .unwrap();
        let (mut y, mut yp) = ([0.0; 2], [0.0]);
        assert!(matches!(
            s.solve_normal(1.0, &mut y, &mut yp),
            Err(Error::LengthMismatch { what: "y", .. })
        ));
    }
}
