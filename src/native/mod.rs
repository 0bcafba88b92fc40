//! Thin layer over the SUNDIALS C library.
//!
//! The solvers themselves live in SUNDIALS. This module owns the library
//! objects a session needs next to its solver memory (the context, serial
//! vectors, dense matrices and linear solvers) and frees each one on drop.
//! Status constants follow SUNDIALS' own numbering per family.

use std::ffi::{c_int, c_long, c_void};
use std::ptr;

use sundials_sys as sys;

use crate::{error::Error, Float};

pub mod cvode;
pub mod ida;
pub mod kinsol;

/// Preconditioning side for `SUNLinSol_SPGMR`.
pub const PREC_NONE: c_int = sys::SUN_PREC_NONE as c_int;
pub const PREC_LEFT: c_int = sys::SUN_PREC_LEFT as c_int;
pub const PREC_RIGHT: c_int = sys::SUN_PREC_RIGHT as c_int;

/// Getter of one `long` counter, e.g. `CVodeGetNumSteps`.
pub type CounterFn = unsafe extern "C" fn(*mut c_void, *mut c_long) -> c_int;

/// Getter of one real quantity, e.g. `CVodeGetCurrentTime`.
pub type RealFn = unsafe extern "C" fn(*mut c_void, *mut Float) -> c_int;

/// The SUNDIALS context every other object of a session is created in.
pub struct Context(sys::SUNContext);

impl Context {
    pub fn new() -> Result<Self, Error> {
        let mut ctx: sys::SUNContext = ptr::null_mut();
        // SAFETY: `ctx` is a valid out pointer; no communicator is used.
        let flag = unsafe { sys::SUNContext_Create(ptr::null_mut(), &mut ctx) };
        if flag != 0 || ctx.is_null() {
            return Err(Error::Native {
                call: "SUNContext_Create",
                flag,
            });
        }
        Ok(Context(ctx))
    }

    pub fn as_ptr(&self) -> sys::SUNContext {
        self.0
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // SAFETY: created by `SUNContext_Create`; objects made in it are
        // dropped first by their owners.
        unsafe { sys::SUNContext_Free(&mut self.0) };
    }
}

/// A serial `N_Vector`.
pub struct NVector(sys::N_Vector);

impl NVector {
    pub fn new(len: usize, ctx: &Context) -> Result<Self, Error> {
        // SAFETY: the context is live.
        let v = unsafe { sys::N_VNew_Serial(len as sys::sunindextype, ctx.as_ptr()) };
        if v.is_null() {
            return Err(Error::Alloc("N_VNew_Serial"));
        }
        Ok(NVector(v))
    }

    pub fn from_slice(data: &[Float], ctx: &Context) -> Result<Self, Error> {
        let mut v = Self::new(data.len(), ctx)?;
        v.as_mut_slice().copy_from_slice(data);
        Ok(v)
    }

    pub fn as_ptr(&self) -> sys::N_Vector {
        self.0
    }

    pub fn as_slice(&self) -> &[Float] {
        // SAFETY: the vector is live and owned by `self`.
        unsafe { slice(self.0) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [Float] {
        // SAFETY: as above, and `&mut self` makes the borrow unique.
        unsafe { slice_mut(self.0) }
    }
}

impl Drop for NVector {
    fn drop(&mut self) {
        // SAFETY: created by `N_VNew_Serial`, freed once.
        unsafe { sys::N_VDestroy(self.0) };
    }
}

/// A square dense `SUNMatrix`.
pub struct Matrix(sys::SUNMatrix);

impl Matrix {
    pub fn dense(n: usize, ctx: &Context) -> Result<Self, Error> {
        let n = n as sys::sunindextype;
        // SAFETY: the context is live.
        let a = unsafe { sys::SUNDenseMatrix(n, n, ctx.as_ptr()) };
        if a.is_null() {
            return Err(Error::Alloc("SUNDenseMatrix"));
        }
        Ok(Matrix(a))
    }

    pub fn as_ptr(&self) -> sys::SUNMatrix {
        self.0
    }
}

impl Drop for Matrix {
    fn drop(&mut self) {
        // SAFETY: created by `SUNDenseMatrix`, freed once.
        unsafe { sys::SUNMatDestroy(self.0) };
    }
}

/// A `SUNLinearSolver`.
pub struct LinSolver(sys::SUNLinearSolver);

impl LinSolver {
    fn checked(ls: sys::SUNLinearSolver, name: &'static str) -> Result<Self, Error> {
        if ls.is_null() {
            return Err(Error::Alloc(name));
        }
        Ok(LinSolver(ls))
    }

    pub fn as_ptr(&self) -> sys::SUNLinearSolver {
        self.0
    }
}

impl Drop for LinSolver {
    fn drop(&mut self) {
        // SAFETY: created by a `SUNLinSol_*` constructor, freed once.
        unsafe { sys::SUNLinSolFree(self.0) };
    }
}

/// A `SUNNonlinearSolver` attached with `*SetNonlinearSolver`.
///
/// The solver memory does not free it, so it must outlive that memory.
pub struct NonlinSolver(sys::SUNNonlinearSolver);

impl NonlinSolver {
    /// Fixed-point iteration without acceleration.
    pub fn fixed_point(template: &NVector, ctx: &Context) -> Result<Self, Error> {
        // SAFETY: vector and context are live.
        let nls = unsafe { sys::SUNNonlinSol_FixedPoint(template.as_ptr(), 0, ctx.as_ptr()) };
        Self::checked(nls, "SUNNonlinSol_FixedPoint")
    }

    pub fn newton(template: &NVector, ctx: &Context) -> Result<Self, Error> {
        // SAFETY: vector and context are live.
        let nls = unsafe { sys::SUNNonlinSol_Newton(template.as_ptr(), ctx.as_ptr()) };
        Self::checked(nls, "SUNNonlinSol_Newton")
    }

    fn checked(nls: sys::SUNNonlinearSolver, name: &'static str) -> Result<Self, Error> {
        if nls.is_null() {
            return Err(Error::Alloc(name));
        }
        Ok(NonlinSolver(nls))
    }

    pub fn as_ptr(&self) -> sys::SUNNonlinearSolver {
        self.0
    }
}

impl Drop for NonlinSolver {
    fn drop(&mut self) {
        // SAFETY: created by a `SUNNonlinSol_*` constructor, freed once.
        unsafe { sys::SUNNonlinSolFree(self.0) };
    }
}

/// A linear solver together with the matrix it factors, if it has one.
///
/// Attached to solver memory with `*SetLinearSolver`; it must stay alive
/// until it is replaced or the memory is freed.
pub struct LinearSystem {
    solver: LinSolver,
    matrix: Option<Matrix>,
}

impl LinearSystem {
    /// Dense LU on a matrix shaped after `template`.
    pub fn dense(template: &NVector, ctx: &Context) -> Result<Self, Error> {
        let matrix = Matrix::dense(template.as_slice().len(), ctx)?;
        // SAFETY: vector, matrix and context are live and sized alike.
        let ls = unsafe { sys::SUNLinSol_Dense(template.as_ptr(), matrix.as_ptr(), ctx.as_ptr()) };
        Ok(LinearSystem {
            solver: LinSolver::checked(ls, "SUNLinSol_Dense")?,
            matrix: Some(matrix),
        })
    }

    /// Matrix-free GMRES with Krylov dimension `maxl`; `0` keeps the
    /// library default.
    pub fn spgmr(template: &NVector, pretype: c_int, maxl: c_int, ctx: &Context) -> Result<Self, Error> {
        // SAFETY: vector and context are live.
        let ls = unsafe { sys::SUNLinSol_SPGMR(template.as_ptr(), pretype, maxl, ctx.as_ptr()) };
        Ok(LinearSystem {
            solver: LinSolver::checked(ls, "SUNLinSol_SPGMR")?,
            matrix: None,
        })
    }

    pub fn solver_ptr(&self) -> sys::SUNLinearSolver {
        self.solver.as_ptr()
    }

    /// The matrix, or null for matrix-free solvers.
    pub fn matrix_ptr(&self) -> sys::SUNMatrix {
        self.matrix.as_ref().map_or(ptr::null_mut(), Matrix::as_ptr)
    }
}

/// Borrow the data of a serial vector handed to a callback.
///
/// # Safety
/// `v` must be null or a live serial vector that outlives `'a` and is not
/// written through another alias meanwhile.
pub unsafe fn slice<'a>(v: sys::N_Vector) -> &'a [Float] {
    if v.is_null() {
        return &[];
    }
    raw_slice(sys::N_VGetArrayPointer(v), sys::N_VGetLength(v) as usize)
}

/// Mutable counterpart of [`slice`].
///
/// # Safety
/// As for [`slice`], and no other reference to the data may exist.
pub unsafe fn slice_mut<'a>(v: sys::N_Vector) -> &'a mut [Float] {
    if v.is_null() {
        return &mut [];
    }
    raw_slice_mut(sys::N_VGetArrayPointer(v), sys::N_VGetLength(v) as usize)
}

/// # Safety
/// `ptr` must be null or valid for `n` reads during `'a`.
pub unsafe fn raw_slice<'a>(ptr: *const Float, n: usize) -> &'a [Float] {
    if ptr.is_null() || n == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, n)
    }
}

/// # Safety
/// `ptr` must be null or valid for `n` writes during `'a`, unaliased.
pub unsafe fn raw_slice_mut<'a>(ptr: *mut Float, n: usize) -> &'a mut [Float] {
    if ptr.is_null() || n == 0 {
        &mut []
    } else {
        std::slice::from_raw_parts_mut(ptr, n)
    }
}

/// Read several counters, stopping at the first failing getter.
///
/// # Safety
/// `mem` must be live solver memory of the family the getters belong to.
pub unsafe fn read_counters<const N: usize>(mem: *mut c_void, counters: [(CounterFn, &mut c_long); N]) -> c_int {
    for (get, out) in counters {
        let flag = get(mem, out);
        if flag < 0 {
            return flag;
        }
    }
    0
}

/// Counters of the linear solver interface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinearStats {
    /// Jacobian evaluations (user or difference quotient).
    pub jac_evals: c_long,
    /// Function evaluations spent on difference-quotient Jacobians and
    /// Jacobian-vector products.
    pub fun_evals: c_long,
    pub lin_iters: c_long,
    pub lin_conv_fails: c_long,
    pub prec_evals: c_long,
    pub prec_solves: c_long,
}
