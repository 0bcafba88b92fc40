//! # Example: Robertson chemical kinetics (index-1 DAE)
//!
//! Three species with reaction rates spanning nine orders of magnitude; the
//! third equation is the mass balance. Output every decade from `t = 0.4`.

use sunbridge::ida::JacobianArgs;
use sunbridge::prelude::*;

fn residual(_t: Float, y: &[Float], yp: &[Float], r: &mut [Float]) -> CallbackResult {
    r[0] = -0.04 * y[0] + 1.0e4 * y[1] * y[2] - yp[0];
    r[1] = 0.04 * y[0] - 1.0e4 * y[1] * y[2] - 3.0e7 * y[1] * y[1] - yp[1];
    r[2] = y[0] + y[1] + y[2] - 1.0;
    Ok(())
}

fn jacobian(args: JacobianArgs<'_>, jac: &mut DenseMatrix) -> CallbackResult {
    let (y, cj) = (args.y, args.cj);
    jac[(0, 0)] = -0.04 - cj;
    jac[(0, 1)] = 1.0e4 * y[2];
    jac[(0, 2)] = 1.0e4 * y[1];
    jac[(1, 0)] = 0.04;
    jac[(1, 1)] = -1.0e4 * y[2] - 6.0e7 * y[1] - cj;
    jac[(1, 2)] = -1.0e4 * y[1];
    jac[(2, 0)] = 1.0;
    jac[(2, 1)] = 1.0;
    jac[(2, 2)] = 1.0;
    Ok(())
}

fn main() -> Result<(), Error> {
    let options = IdaOptions::builder()
        .rtol(1e-4)
        .atol([1e-8, 1e-14, 1e-6])
        .max_num_steps(1_000_000)
        .build();
    let mut session = Session::<Ida>::init(options, 0.0, &[1.0, 0.0, 0.0], &[-0.04, 0.04, 0.0], residual)?;
    session.set_jacobian_fn(jacobian)?;
    session.set_roots(2, |_t, y, _yp, g| {
        g[0] = y[0] - 1.0e-4;
        g[1] = y[2] - 0.01;
        Ok(())
    })?;

    let (mut y, mut yp) = ([0.0; 3], [0.0; 3]);
    let mut tout = 0.4;
    println!("{:<12}  {:>14}  {:>14}  {:>14}", "t", "y1", "y2", "y3");
    for _ in 0..12 {
        let (t, result) = session.solve_normal(tout, &mut y, &mut yp)?;
        println!("{t:<12.4e}  {:>14.6e}  {:>14.6e}  {:>14.6e}", y[0], y[1], y[2]);
        match result {
            SolverResult::RootsFound => println!("    roots: {:?}", session.get_root_info()?),
            _ => tout *= 10.0,
        }
    }

    let stats = session.get_integrator_stats()?;
    let lstats = session.get_linear_solver_stats()?;
    println!(
        "steps = {}, residual evals = {}, jacobian evals = {}, error test failures = {}",
        stats.steps, stats.res_evals, lstats.jac_evals, stats.error_test_failures
    );
    Ok(())
}
