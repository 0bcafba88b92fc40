//! # Example: Nonlinear system with every KINSOL strategy
//!
//! Intersects the circle `x^2 + y^2 = 4` with the hyperbola `x y = 1` from
//! the same starting guess, then solves `u = cos(u) / 2` by fixed-point
//! iteration.

use sunbridge::kinsol::{LinearSolver, PrintLevel};
use sunbridge::prelude::*;

fn system(u: &[Float], f: &mut [Float]) -> CallbackResult {
    f[0] = u[0] * u[0] + u[1] * u[1] - 4.0;
    f[1] = u[0] * u[1] - 1.0;
    Ok(())
}

fn main() -> Result<(), Error> {
    let guess = [2.0, 0.25];
    let scale = [1.0; 2];
    for strategy in [Strategy::Newton, Strategy::LineSearch, Strategy::Picard] {
        let options = KinsolOptions::builder().func_norm_tol(1e-10).build();
        let mut session = Session::<Kinsol>::init(options, &guess, system)?;
        session.set_linear_solver(LinearSolver::dense_with_jacobian(|u, _fu, jac| {
            jac[(0, 0)] = 2.0 * u[0];
            jac[(0, 1)] = 2.0 * u[1];
            jac[(1, 0)] = u[1];
            jac[(1, 1)] = u[0];
            Ok(())
        }))?;
        let mut u = guess;
        let result = session.solve(&mut u, strategy, &scale, &scale)?;
        let stats = session.get_stats()?;
        println!(
            "{strategy:<12?} {result:?}: u = ({:.10}, {:.10}), iterations = {}, fnorm = {:e}",
            u[0], u[1], stats.iters, stats.fnorm
        );
    }

    let options = KinsolOptions::builder()
        .func_norm_tol(1e-12)
        .print_level(PrintLevel::Iterations)
        .build();
    let mut session = Session::<Kinsol>::init(options, &[0.0], |u, g| {
        g[0] = u[0].cos() / 2.0;
        Ok(())
    })?;
    session.set_info_handler(|info| {
        println!("    {info}");
        Ok(())
    })?;
    let mut u = [0.0];
    session.solve(&mut u, Strategy::FixedPoint, &[1.0], &[1.0])?;
    println!("fixed point u = {:.12}", u[0]);
    Ok(())
}
