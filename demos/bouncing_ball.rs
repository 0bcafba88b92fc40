//! # Example: Bouncing ball
//!
//! Free fall with a root function on the height. At each impact the session
//! is reinitialised with the velocity reversed and damped.

use sunbridge::prelude::*;

const GRAVITY: Float = 9.81;
const RESTITUTION: Float = 0.8;

fn main() -> Result<(), Error> {
    let options = CvodeOptions::builder().rtol(1e-8).atol(1e-10).build();
    let mut session = Session::<Cvode>::init(Lmm::Adams, options, 0.0, &[10.0, 0.0], |_t, y, ydot| {
        ydot[0] = y[1];
        ydot[1] = -GRAVITY;
        Ok(())
    })?;
    session.set_roots(1, |_t, y, g| {
        g[0] = y[0];
        Ok(())
    })?;

    let tend = 10.0;
    let mut y = [0.0; 2];
    let mut bounces = 0;
    println!("{:<10}  {:>12}  {:>12}", "t", "height", "velocity");
    loop {
        let (t, result) = session.solve_normal(tend, &mut y)?;
        println!("{t:10.5}  {:>12.6}  {:>12.6}", y[0], y[1]);
        match result {
            SolverResult::RootsFound => {
                bounces += 1;
                let v = -RESTITUTION * y[1];
                if v < 1e-3 {
                    break;
                }
                session.reinit(t, &[0.0, v])?;
            }
            _ => break,
        }
    }

    let stats = session.get_integrator_stats()?;
    println!("bounces = {bounces}, steps = {}, rhs evals = {}", stats.steps, stats.rhs_evals);
    Ok(())
}
