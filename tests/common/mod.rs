#![allow(dead_code)]

use sunbridge::prelude::*;
use thiserror::Error;

/// Raised by right-hand sides that divide by a state component.
#[derive(Debug, Error, PartialEq)]
#[error("division by zero at t = {t}")]
pub struct DivideByZero {
    pub t: Float,
}

/// `y' = -y`.
pub fn decay(_t: Float, y: &[Float], ydot: &mut [Float]) -> CallbackResult {
    ydot[0] = -y[0];
    Ok(())
}

/// Harmonic oscillator `y0' = y1, y1' = -y0`; `y(t) = (cos t, -sin t)` from
/// `(1, 0)`.
pub fn oscillator(_t: Float, y: &[Float], ydot: &mut [Float]) -> CallbackResult {
    ydot[0] = y[1];
    ydot[1] = -y[0];
    Ok(())
}

/// Free fall from rest: height, velocity.
pub const GRAVITY: Float = 9.81;

pub fn free_fall(_t: Float, y: &[Float], ydot: &mut [Float]) -> CallbackResult {
    ydot[0] = y[1];
    ydot[1] = -GRAVITY;
    Ok(())
}

/// Stiff relaxation towards `cos t`.
pub const STIFFNESS: Float = 50.0;

pub fn stiff_relaxation(t: Float, y: &[Float], ydot: &mut [Float]) -> CallbackResult {
    ydot[0] = -STIFFNESS * (y[0] - t.cos());
    Ok(())
}

/// Exact solution of [`stiff_relaxation`] from `y(0) = 0`.
pub fn stiff_relaxation_exact(t: Float) -> Float {
    let k2 = STIFFNESS * STIFFNESS;
    let c = k2 / (k2 + 1.0);
    c * (t.cos() + t.sin() / STIFFNESS) - c * (-STIFFNESS * t).exp()
}

/// Robertson chemical kinetics as an index-1 DAE.
pub fn robertson_residual(_t: Float, y: &[Float], yp: &[Float], r: &mut [Float]) -> CallbackResult {
    r[0] = -0.04 * y[0] + 1.0e4 * y[1] * y[2] - yp[0];
    r[1] = 0.04 * y[0] - 1.0e4 * y[1] * y[2] - 3.0e7 * y[1] * y[1] - yp[1];
    r[2] = y[0] + y[1] + y[2] - 1.0;
    Ok(())
}

pub const ROBERTSON_Y0: [Float; 3] = [1.0, 0.0, 0.0];
pub const ROBERTSON_YP0: [Float; 3] = [-0.04, 0.04, 0.0];

/// Reference values at `t = 0.4`.
pub const ROBERTSON_AT_0_4: [Float; 3] = [9.851_721e-1, 3.386_395e-5, 1.479_402e-2];

/// Intersection of the unit circle with the line `u0 = u1`.
pub fn circle_line(u: &[Float], f: &mut [Float]) -> CallbackResult {
    f[0] = u[0] * u[0] + u[1] * u[1] - 1.0;
    f[1] = u[0] - u[1];
    Ok(())
}

pub fn circle_line_jacobian(u: &[Float], _fu: &[Float], jac: &mut DenseMatrix) -> CallbackResult {
    jac[(0, 0)] = 2.0 * u[0];
    jac[(0, 1)] = 2.0 * u[1];
    jac[(1, 0)] = 1.0;
    jac[(1, 1)] = -1.0;
    Ok(())
}

pub fn adams_session(t0: Float, y0: &[Float]) -> Session<Cvode> {
    let options = CvodeOptions::builder().rtol(1e-8).atol(1e-10).max_num_steps(10_000).build();
    Session::<Cvode>::init(Lmm::Adams, options, t0, y0, oscillator).unwrap()
}
