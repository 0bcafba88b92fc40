use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_abs_diff_eq;
use sunbridge::cvode::{JacobianArgs, LinearSolver};
use sunbridge::prelude::*;
use sunbridge::CvodeError;

mod common;
use common::{adams_session, free_fall, stiff_relaxation, stiff_relaxation_exact, GRAVITY};

#[test]
fn adams_tracks_the_oscillator() {
    let mut session = adams_session(0.0, &[1.0, 0.0]);
    let mut y = [0.0; 2];
    for tout in [0.5, 1.0, 2.0, 5.0] {
        let (t, result) = session.solve_normal(tout, &mut y).unwrap();
        assert_eq!(result, SolverResult::Success);
        assert_eq!(t, tout);
        assert_abs_diff_eq!(y[0], tout.cos(), epsilon = 1e-6);
        assert_abs_diff_eq!(y[1], -tout.sin(), epsilon = 1e-6);
    }
    let stats = session.get_integrator_stats().unwrap();
    assert!(stats.steps > 0);
    assert!(stats.rhs_evals >= stats.steps);
    assert!(stats.internal_time >= 5.0);
}

#[test]
fn backward_integration() {
    let mut session = adams_session(1.0, &[(1.0 as Float).cos(), -(1.0 as Float).sin()]);
    let mut y = [0.0; 2];
    let (t, _) = session.solve_normal(0.0, &mut y).unwrap();
    assert_eq!(t, 0.0);
    assert_abs_diff_eq!(y[0], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(y[1], 0.0, epsilon = 1e-6);
}

#[test]
fn one_step_mode_advances_monotonically() {
    let mut session = adams_session(0.0, &[1.0, 0.0]);
    let mut y = [0.0; 2];
    let mut last = 0.0;
    for _ in 0..5 {
        let (t, result) = session.solve_one_step(10.0, &mut y).unwrap();
        assert_eq!(result, SolverResult::Success);
        assert!(t > last);
        last = t;
    }
    let mut dy = [0.0; 2];
    session.get_dky(last, 1, &mut dy).unwrap();
    assert_abs_diff_eq!(dy[0], y[1], epsilon = 1e-6);
    assert_abs_diff_eq!(dy[1], -y[0], epsilon = 1e-6);
}

#[test]
fn dense_output_inside_the_last_step() {
    let mut session = adams_session(0.0, &[1.0, 0.0]);
    let mut y = [0.0; 2];
    let (t, _) = session.solve_one_step(10.0, &mut y).unwrap();
    let mid = 0.5 * t;
    let mut ymid = [0.0; 2];
    session.get_dky(mid, 0, &mut ymid).unwrap();
    assert_abs_diff_eq!(ymid[0], mid.cos(), epsilon = 1e-5);
    assert!(matches!(session.get_dky(mid, 3, &mut ymid), Err(Error::Cvode(CvodeError::BadK))));
    assert!(matches!(session.get_dky(t + 1.0, 0, &mut ymid), Err(Error::Cvode(CvodeError::BadT))));
}

#[test]
fn ball_hits_the_ground() {
    let options = CvodeOptions::builder().rtol(1e-8).atol(1e-10).build();
    let mut session = Session::<Cvode>::init(Lmm::Adams, options, 0.0, &[10.0, 0.0], free_fall).unwrap();
    session
        .set_roots(2, |_, y, g| {
            g[0] = y[0];
            g[1] = y[1] + 100.0;
            Ok(())
        })
        .unwrap();
    assert_eq!(session.nroots(), 2);

    let mut y = [0.0; 2];
    let (t, result) = session.solve_normal(5.0, &mut y).unwrap();
    assert_eq!(result, SolverResult::RootsFound);
    let impact = (2.0 * 10.0 / GRAVITY).sqrt();
    assert_abs_diff_eq!(t, impact, epsilon = 1e-6);
    assert_abs_diff_eq!(y[0], 0.0, epsilon = 1e-6);
    let info = session.get_root_info().unwrap();
    assert_eq!(info, vec![RootDirection::Falling, RootDirection::NoRoot]);

    // Bounce and fall again.
    session.reinit(t, &[0.0, -0.5 * y[1]]).unwrap();
    let (t2, result) = session.solve_normal(10.0, &mut y).unwrap();
    assert_eq!(result, SolverResult::RootsFound);
    let v0 = 0.5 * GRAVITY * impact;
    assert_abs_diff_eq!(t2 - t, 2.0 * v0 / GRAVITY, epsilon = 1e-6);
}

#[test]
fn stop_time_is_not_overstepped() {
    let options = CvodeOptions::builder().stop_time(0.75).build();
    let tstop_seen = Rc::new(RefCell::new(Float::NEG_INFINITY));
    let sink = Rc::clone(&tstop_seen);
    let mut session = Session::<Cvode>::init(Lmm::Adams, options, 0.0, &[1.0], move |t, y, ydot| {
        let mut latest = sink.borrow_mut();
        *latest = latest.max(t);
        ydot[0] = -y[0];
        Ok(())
    })
    .unwrap();
    let mut y = [0.0];
    let (t, result) = session.solve_normal(2.0, &mut y).unwrap();
    assert_eq!(result, SolverResult::StopTimeReached);
    assert_eq!(t, 0.75);
    assert!(*tstop_seen.borrow() <= 0.75 + 1e-12);
    assert_abs_diff_eq!(y[0], (-0.75 as Float).exp(), epsilon = 1e-3);

    // The stop time applies once; the next call runs to tout.
    let (t, result) = session.solve_normal(2.0, &mut y).unwrap();
    assert_eq!((t, result), (2.0, SolverResult::Success));
}

#[test]
fn too_much_work_is_reported() {
    let options = CvodeOptions::builder().rtol(1e-10).atol(1e-12).max_num_steps(3).build();
    let mut session = Session::<Cvode>::init(Lmm::Adams, options, 0.0, &[1.0, 0.0], common::oscillator).unwrap();
    let mut y = [0.0; 2];
    let err = session.solve_normal(100.0, &mut y).unwrap_err();
    assert!(matches!(err, Error::Cvode(CvodeError::TooMuchWork)));
}

fn bdf_options() -> CvodeOptions {
    CvodeOptions::builder().rtol(1e-6).atol(1e-9).max_num_steps(100_000).build()
}

#[test]
fn bdf_with_difference_quotient_jacobian() {
    let mut session = Session::<Cvode>::init(Lmm::Bdf, bdf_options(), 0.0, &[0.0], stiff_relaxation).unwrap();
    let mut y = [0.0];
    session.solve_normal(1.0, &mut y).unwrap();
    assert_abs_diff_eq!(y[0], stiff_relaxation_exact(1.0), epsilon = 1e-3);
    let lstats = session.get_linear_solver_stats().unwrap();
    assert!(lstats.jac_evals > 0);
    assert!(lstats.fun_evals > 0);
}

#[test]
fn bdf_with_user_jacobian() {
    let jac_calls = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&jac_calls);
    let mut session = Session::<Cvode>::init(Lmm::Bdf, bdf_options(), 0.0, &[0.0], stiff_relaxation).unwrap();
    session
        .set_linear_solver(LinearSolver::dense_with_jacobian(move |_args: JacobianArgs<'_>, jac| {
            *sink.borrow_mut() += 1;
            jac[(0, 0)] = -common::STIFFNESS;
            Ok(())
        }))
        .unwrap();
    let mut y = [0.0];
    session.solve_normal(1.0, &mut y).unwrap();
    assert_abs_diff_eq!(y[0], stiff_relaxation_exact(1.0), epsilon = 1e-3);
    assert!(*jac_calls.borrow() > 0);
    assert_eq!(session.get_linear_solver_stats().unwrap().fun_evals, 0);
}

#[test]
fn bdf_with_preconditioned_gmres() {
    let setups = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&setups);
    let gamma_now = Rc::new(RefCell::new(0.0));
    let gamma_setup = Rc::clone(&gamma_now);
    let mut session = Session::<Cvode>::init(Lmm::Bdf, bdf_options(), 0.0, &[0.0], stiff_relaxation).unwrap();
    session
        .set_linear_solver(LinearSolver::spgmr_preconditioned(
            5,
            move |_args, _jok, gamma| {
                *sink.borrow_mut() += 1;
                *gamma_setup.borrow_mut() = gamma;
                Ok(true)
            },
            move |_args, r, z, gamma, _delta| {
                // Exact inverse of I - gamma J for this scalar problem.
                z[0] = r[0] / (1.0 + gamma * common::STIFFNESS);
                Ok(())
            },
        ))
        .unwrap();
    let mut y = [0.0];
    session.solve_normal(1.0, &mut y).unwrap();
    assert_abs_diff_eq!(y[0], stiff_relaxation_exact(1.0), epsilon = 1e-3);
    assert!(*setups.borrow() > 0);
    assert!(*gamma_now.borrow() > 0.0);
    let lstats = session.get_linear_solver_stats().unwrap();
    assert!(lstats.prec_solves > 0);
}

#[test]
fn jacobian_failure_is_reraised() {
    let mut session = Session::<Cvode>::init(Lmm::Bdf, bdf_options(), 0.0, &[0.0], stiff_relaxation).unwrap();
    session
        .set_linear_solver(LinearSolver::dense_with_jacobian(|_, _| {
            Err(CallbackError::failed("singular model"))
        }))
        .unwrap();
    let mut y = [0.0];
    let err = session.solve_normal(1.0, &mut y).unwrap_err();
    assert_eq!(err.to_string(), "callback failed: singular model");
}

#[test]
fn monitor_sees_every_nth_step() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let mut session = adams_session(0.0, &[1.0, 0.0]);
    session
        .set_monitor_fn(2, move |t, y, steps| {
            sink.borrow_mut().push((t, y[0], steps));
            Ok(())
        })
        .unwrap();
    let mut y = [0.0; 2];
    session.solve_normal(3.0, &mut y).unwrap();
    let seen = seen.borrow();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|(_, _, steps)| steps % 2 == 0));
    assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));
    for (t, y0, _) in seen.iter() {
        assert_abs_diff_eq!(*y0, t.cos(), epsilon = 1e-6);
    }
    assert!(matches!(session.set_monitor_fn(0, |_, _, _| Ok(())), Err(Error::IllInput(_))));
}

#[test]
fn monitor_failure_stops_integration() {
    let mut session = adams_session(0.0, &[1.0, 0.0]);
    session
        .set_monitor_fn(1, |t, _, _| match t > 1.0 {
            true => Err(CallbackError::failed("enough")),
            false => Ok(()),
        })
        .unwrap();
    let mut y = [0.0; 2];
    let err = session.solve_normal(3.0, &mut y).unwrap_err();
    assert_eq!(err.to_string(), "callback failed: enough");

    session.clear_monitor_fn().unwrap();
    session.solve_normal(3.0, &mut y).unwrap();
}

#[test]
fn reinit_restarts_statistics() {
    let mut session = adams_session(0.0, &[1.0, 0.0]);
    let mut y = [0.0; 2];
    session.solve_normal(1.0, &mut y).unwrap();
    session.reinit(0.0, &[0.0, 1.0]).unwrap();
    assert_eq!(session.get_integrator_stats().unwrap().steps, 0);
    session.solve_normal(1.0, &mut y).unwrap();
    assert_abs_diff_eq!(y[0], (1.0 as Float).sin(), epsilon = 1e-6);
    assert!(matches!(
        session.reinit(0.0, &[1.0]),
        Err(Error::LengthMismatch { what: "y0", .. })
    ));
}

#[test]
fn vector_tolerances() {
    let options = CvodeOptions::builder().rtol(1e-8).atol([1e-10, 1e-10]).build();
    let mut session = Session::<Cvode>::init(Lmm::Adams, options, 0.0, &[1.0, 0.0], common::oscillator).unwrap();
    let mut y = [0.0; 2];
    session.solve_normal(1.0, &mut y).unwrap();
    assert_abs_diff_eq!(y[0], (1.0 as Float).cos(), epsilon = 1e-6);
    assert!(matches!(session.set_tolerances(1e-6, vec![1e-8]), Err(Error::IllInput(_))));
}
