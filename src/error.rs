//! Errors for sessions and callbacks

use std::error::Error as StdError;
use std::ffi::c_int;

use thiserror::Error;

use crate::native::{cvode::*, ida::*, kinsol::*};

/// Errors returned by managed session operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An argument was rejected before reaching the solver.
    #[error("illegal input: {0}")]
    IllInput(String),
    /// A vector argument does not match the session's problem size.
    #[error("{what} has length {got}, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    /// The session was destroyed; its native memory is gone.
    #[error("the session has been destroyed")]
    Destroyed,
    /// A callback failed; the boxed error is exactly the one it returned.
    #[error("callback failed: {0}")]
    Callback(#[source] Box<dyn StdError + Send + Sync>),
    #[error(transparent)]
    Cvode(#[from] CvodeError),
    #[error(transparent)]
    Ida(#[from] IdaError),
    #[error(transparent)]
    Kinsol(#[from] KinsolError),
    /// A status code with no known meaning for the entry point.
    #[error("{call} returned unexpected status {flag}")]
    Native { call: &'static str, flag: c_int },
    /// A library constructor returned null.
    #[error("{0} could not allocate")]
    Alloc(&'static str),
}

impl Error {
    /// Borrow the error a callback failed with, if this is one and it has
    /// type `E`.
    pub fn callback_error<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Error::Callback(e) => e.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Take back the error a callback failed with.
    pub fn into_callback_error(self) -> Option<Box<dyn StdError + Send + Sync>> {
        match self {
            Error::Callback(e) => Some(e),
            _ => None,
        }
    }
}

/// What a callback returns when it cannot produce its result.
///
/// Any `E: Error + Send + Sync + 'static` converts with `?`. Use
/// [`CallbackError::Recoverable`] to ask the solver to retry with adjusted
/// internals (a smaller step, a fresh Jacobian); solvers that cannot recover
/// at that point report [`RecoverableFailure`] instead.
#[derive(Debug)]
pub enum CallbackError {
    Recoverable,
    Failed(Box<dyn StdError + Send + Sync>),
}

impl CallbackError {
    /// Wrap anything convertible into a boxed error, including `String` and
    /// `&str` messages.
    pub fn failed(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        CallbackError::Failed(err.into())
    }

    /// The error a session reports for a callback it runs itself, where
    /// there is no solver to retry.
    pub(crate) fn into_error(self) -> Error {
        match self {
            CallbackError::Recoverable => Error::Callback(Box::new(RecoverableFailure)),
            CallbackError::Failed(e) => Error::Callback(e),
        }
    }
}

impl<E: StdError + Send + Sync + 'static> From<E> for CallbackError {
    fn from(err: E) -> Self {
        CallbackError::Failed(Box::new(err))
    }
}

pub type CallbackResult<T = ()> = Result<T, CallbackError>;

/// Stored in place of [`CallbackError::Recoverable`] when it was returned
/// from a callback whose caller has no way to recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a callback reported a recoverable failure where recovery is not possible")]
pub struct RecoverableFailure;

/// Failure statuses of the ODE integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CvodeError {
    #[error("illegal input")]
    IllInput,
    #[error("tout too close to t0 to start integration")]
    TooClose,
    #[error("too much work: mxstep steps taken before reaching tout")]
    TooMuchWork,
    #[error("too much accuracy requested")]
    TooMuchAccuracy,
    #[error("error test failed repeatedly or with |h| = hmin")]
    ErrFailure,
    #[error("corrector convergence failed repeatedly or with |h| = hmin")]
    ConvergenceFailure,
    #[error("linear solver initialisation failed")]
    LinearInitFailure,
    #[error("linear solver setup failed unrecoverably")]
    LinearSetupFailure,
    #[error("linear solve failed unrecoverably")]
    LinearSolveFailure,
    #[error("right-hand side function failed unrecoverably")]
    RhsFuncFailure,
    #[error("right-hand side function failed recoverably at the first call")]
    FirstRhsFuncFailure,
    #[error("right-hand side function failed recoverably too many times")]
    RepeatedRhsFuncFailure,
    #[error("right-hand side function failed after a recoverable failure")]
    UnrecoverableRhsFuncFailure,
    #[error("root function failed")]
    RootFuncFailure,
    #[error("illegal derivative order")]
    BadK,
    #[error("time outside the last step interval")]
    BadT,
    #[error("output vector is missing or of the wrong size")]
    BadDky,
    #[error("solver memory allocation failed")]
    MemFail,
    #[error("solver used before initialisation")]
    NoMalloc,
}

impl CvodeError {
    /// Map a negative status; `None` for success codes and unknown flags.
    pub fn from_flag(flag: c_int) -> Option<Self> {
        Some(match flag {
            CV_TOO_MUCH_WORK => CvodeError::TooMuchWork,
            CV_TOO_MUCH_ACC => CvodeError::TooMuchAccuracy,
            CV_ERR_FAILURE => CvodeError::ErrFailure,
            CV_CONV_FAILURE => CvodeError::ConvergenceFailure,
            CV_LINIT_FAIL => CvodeError::LinearInitFailure,
            CV_LSETUP_FAIL => CvodeError::LinearSetupFailure,
            CV_LSOLVE_FAIL => CvodeError::LinearSolveFailure,
            CV_RHSFUNC_FAIL => CvodeError::RhsFuncFailure,
            CV_FIRST_RHSFUNC_ERR => CvodeError::FirstRhsFuncFailure,
            CV_REPTD_RHSFUNC_ERR => CvodeError::RepeatedRhsFuncFailure,
            CV_UNREC_RHSFUNC_ERR => CvodeError::UnrecoverableRhsFuncFailure,
            CV_RTFUNC_FAIL => CvodeError::RootFuncFailure,
            CV_MEM_FAIL => CvodeError::MemFail,
            CV_ILL_INPUT => CvodeError::IllInput,
            CV_NO_MALLOC => CvodeError::NoMalloc,
            CV_BAD_K => CvodeError::BadK,
            CV_BAD_T => CvodeError::BadT,
            CV_BAD_DKY => CvodeError::BadDky,
            CV_TOO_CLOSE => CvodeError::TooClose,
            _ => return None,
        })
    }
}

/// Failure statuses of the DAE integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdaError {
    #[error("illegal input")]
    IllInput,
    #[error("too much work: mxstep steps taken before reaching tout")]
    TooMuchWork,
    #[error("too much accuracy requested")]
    TooMuchAccuracy,
    #[error("error test failed repeatedly or with |h| = hmin")]
    ErrFailure,
    #[error("corrector convergence failed repeatedly or with |h| = hmin")]
    ConvergenceFailure,
    #[error("linear solver initialisation failed")]
    LinearInitFailure,
    #[error("linear solver setup failed unrecoverably")]
    LinearSetupFailure,
    #[error("linear solve failed unrecoverably")]
    LinearSolveFailure,
    #[error("residual function failed unrecoverably")]
    ResFuncFailure,
    #[error("residual function failed recoverably too many times")]
    RepeatedResFuncFailure,
    #[error("root function failed")]
    RootFuncFailure,
    #[error("inequality constraints could not be met")]
    ConstraintFailure,
    #[error("residual function failed recoverably at the first call")]
    FirstResFuncFailure,
    #[error("line search failed")]
    LinesearchFailure,
    #[error("recoverable failure with no possible recovery")]
    NoRecovery,
    #[error("some error weight is non-positive")]
    BadEwt,
    #[error("illegal derivative order")]
    BadK,
    #[error("time outside the last step interval")]
    BadT,
    #[error("output vector is missing or of the wrong size")]
    BadDky,
    #[error("solver memory allocation failed")]
    MemFail,
    #[error("solver used before initialisation")]
    NoMalloc,
}

impl IdaError {
    pub fn from_flag(flag: c_int) -> Option<Self> {
        Some(match flag {
            IDA_TOO_MUCH_WORK => IdaError::TooMuchWork,
            IDA_TOO_MUCH_ACC => IdaError::TooMuchAccuracy,
            IDA_ERR_FAIL => IdaError::ErrFailure,
            IDA_CONV_FAIL => IdaError::ConvergenceFailure,
            IDA_LINIT_FAIL => IdaError::LinearInitFailure,
            IDA_LSETUP_FAIL => IdaError::LinearSetupFailure,
            IDA_LSOLVE_FAIL => IdaError::LinearSolveFailure,
            IDA_RES_FAIL => IdaError::ResFuncFailure,
            IDA_REP_RES_ERR => IdaError::RepeatedResFuncFailure,
            IDA_RTFUNC_FAIL => IdaError::RootFuncFailure,
            IDA_CONSTR_FAIL => IdaError::ConstraintFailure,
            IDA_FIRST_RES_FAIL => IdaError::FirstResFuncFailure,
            IDA_LINESEARCH_FAIL => IdaError::LinesearchFailure,
            IDA_NO_RECOVERY => IdaError::NoRecovery,
            IDA_MEM_FAIL => IdaError::MemFail,
            IDA_ILL_INPUT => IdaError::IllInput,
            IDA_NO_MALLOC => IdaError::NoMalloc,
            IDA_BAD_EWT => IdaError::BadEwt,
            IDA_BAD_K => IdaError::BadK,
            IDA_BAD_T => IdaError::BadT,
            IDA_BAD_DKY => IdaError::BadDky,
            _ => return None,
        })
    }
}

/// Failure statuses of the nonlinear solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KinsolError {
    #[error("illegal input")]
    IllInput,
    #[error("solver used before initialisation")]
    NoMalloc,
    #[error("solver memory allocation failed")]
    MemFail,
    #[error("line search could not find an acceptable iterate")]
    LineSearchNonConvergence,
    #[error("maximum number of nonlinear iterations reached")]
    MaxIterationsReached,
    #[error("five consecutive steps exceeded the maximum Newton step")]
    MaxNewtonStepExceeded,
    #[error("line search beta condition failed")]
    LineSearchBetaConditionFailure,
    #[error("linear solver failed recoverably with current Jacobian data")]
    LinearSolverNoRecovery,
    #[error("linear solver initialisation failed")]
    LinearSolverInitFailure,
    #[error("linear solver setup failed unrecoverably")]
    LinearSetupFailure,
    #[error("linear solve failed unrecoverably")]
    LinearSolveFailure,
    #[error("system function failed unrecoverably")]
    SystemFunctionFailure,
    #[error("system function failed recoverably at the initial guess")]
    FirstSystemFunctionFailure,
    #[error("system function failed recoverably too many times")]
    RepeatedSystemFunctionFailure,
}

impl KinsolError {
    pub fn from_flag(flag: c_int) -> Option<Self> {
        Some(match flag {
            KIN_ILL_INPUT => KinsolError::IllInput,
            KIN_NO_MALLOC => KinsolError::NoMalloc,
            KIN_MEM_FAIL => KinsolError::MemFail,
            KIN_LINESEARCH_NONCONV => KinsolError::LineSearchNonConvergence,
            KIN_MAXITER_REACHED => KinsolError::MaxIterationsReached,
            KIN_MXNEWT_5X_EXCEEDED => KinsolError::MaxNewtonStepExceeded,
            KIN_LINESEARCH_BCFAIL => KinsolError::LineSearchBetaConditionFailure,
            KIN_LINSOLV_NO_RECOVERY => KinsolError::LinearSolverNoRecovery,
            KIN_LINIT_FAIL => KinsolError::LinearSolverInitFailure,
            KIN_LSETUP_FAIL => KinsolError::LinearSetupFailure,
            KIN_LSOLVE_FAIL => KinsolError::LinearSolveFailure,
            KIN_SYSFUNC_FAIL => KinsolError::SystemFunctionFailure,
            KIN_FIRST_SYSFUNC_ERR => KinsolError::FirstSystemFunctionFailure,
            KIN_REPTD_SYSFUNC_ERR => KinsolError::RepeatedSystemFunctionFailure,
            _ => return None,
        })
    }
}
