//! Convenient prelude: import the session type, the solver families and
//! their option builders.
//!
//! ```rust
//! use sunbridge::prelude::*;
//! ```

pub use crate::cvode::{Cvode, CvodeOptions, Lmm, RootDirection, SolverResult};
pub use crate::dense::DenseMatrix;
pub use crate::error::{CallbackError, CallbackResult, Error};
pub use crate::ida::{Ida, IdaOptions};
pub use crate::kinsol::{Kinsol, KinsolOptions, KinsolResult, Strategy};
pub use crate::session::Session;
pub use crate::tolerance::Tolerance;
pub use crate::Float;
