//! Safe sessions over the SUNDIALS solvers for ordinary differential
//! equations (CVODE), differential-algebraic equations (IDA) and nonlinear
//! systems (KINSOL).
//!
//! Every solver instance is a [`Session`]: it owns the native memory, keeps
//! the Rust closures the solver calls back into, and carries any error or
//! panic raised by a closure back across the native call that triggered it.
//! Sessions are released exactly once, either by [`Session::destroy`] or on
//! drop.

mod error;
mod native;
mod tolerance;

pub mod cvode;
pub mod dense;
pub mod ida;
pub mod kinsol;
pub mod prelude;
pub mod session;

pub use error::{
    CallbackError, CallbackResult, CvodeError, Error, IdaError, KinsolError, RecoverableFailure,
};
pub use native::LinearStats;
pub use session::{ErrorDetails, Family, RootId, Session};
pub use tolerance::Tolerance;

/// Floating point type shared with the native solvers (SUNDIALS `realtype`).
pub type Float = f64;
