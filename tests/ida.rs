use std::cell::RefCell;
use std::rc::Rc;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use sunbridge::ida::JacobianArgs;
use sunbridge::prelude::*;
use sunbridge::IdaError;

mod common;
use common::{robertson_residual, ROBERTSON_AT_0_4, ROBERTSON_Y0, ROBERTSON_YP0};

/// `y0' = -y0`, `0 = y1 - y0`.
fn coupled_decay(_t: Float, y: &[Float], yp: &[Float], r: &mut [Float]) -> CallbackResult {
    r[0] = yp[0] + y[0];
    r[1] = y[1] - y[0];
    Ok(())
}

fn coupled_decay_session() -> Session<Ida> {
    let options = IdaOptions::builder().rtol(1e-6).atol(1e-8).max_num_steps(50_000).build();
    Session::<Ida>::init(options, 0.0, &[1.0, 1.0], &[-1.0, -1.0], coupled_decay).unwrap()
}

fn robertson_session() -> Session<Ida> {
    let options = IdaOptions::builder()
        .rtol(1e-4)
        .atol([1e-8, 1e-12, 1e-6])
        .max_num_steps(100_000)
        .build();
    Session::<Ida>::init(options, 0.0, &ROBERTSON_Y0, &ROBERTSON_YP0, robertson_residual).unwrap()
}

#[test]
fn robertson_kinetics() {
    let mut session = robertson_session();
    let (mut y, mut yp) = ([0.0; 3], [0.0; 3]);
    let (t, result) = session.solve_normal(0.4, &mut y, &mut yp).unwrap();
    assert_eq!((t, result), (0.4, SolverResult::Success));
    assert_relative_eq!(y[0], ROBERTSON_AT_0_4[0], max_relative = 1e-2);
    assert_relative_eq!(y[1], ROBERTSON_AT_0_4[1], max_relative = 5e-2);
    assert_relative_eq!(y[2], ROBERTSON_AT_0_4[2], max_relative = 5e-2);
    assert_abs_diff_eq!(y.iter().sum::<Float>(), 1.0, epsilon = 1e-6);

    let stats = session.get_integrator_stats().unwrap();
    assert!(stats.steps > 0);
    assert!(stats.res_evals > stats.steps);
    assert!((1..=5).contains(&stats.last_order));
    let lstats = session.get_linear_solver_stats().unwrap();
    assert!(lstats.jac_evals > 0);
}

#[test]
fn algebraic_component_follows_the_differential_one() {
    let mut session = coupled_decay_session();
    let (mut y, mut yp) = ([0.0; 2], [0.0; 2]);
    for tout in [0.25, 0.5, 1.0] {
        session.solve_normal(tout, &mut y, &mut yp).unwrap();
        assert_relative_eq!(y[0], (-tout).exp(), max_relative = 1e-2);
        assert_relative_eq!(y[1], y[0], max_relative = 1e-6);
        assert_relative_eq!(yp[0], -y[0], max_relative = 1e-2);
    }
}

#[test]
fn user_iteration_matrix() {
    let cjs = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&cjs);
    let mut session = coupled_decay_session();
    session
        .set_jacobian_fn(move |args: JacobianArgs<'_>, jac| {
            sink.borrow_mut().push(args.cj);
            jac[(0, 0)] = 1.0 + args.cj;
            jac[(1, 0)] = -1.0;
            jac[(1, 1)] = 1.0;
            Ok(())
        })
        .unwrap();
    let (mut y, mut yp) = ([0.0; 2], [0.0; 2]);
    session.solve_normal(1.0, &mut y, &mut yp).unwrap();
    assert_relative_eq!(y[0], (-1.0 as Float).exp(), max_relative = 1e-2);
    assert!(!cjs.borrow().is_empty());
    assert!(cjs.borrow().iter().all(|cj| *cj > 0.0));
    assert_eq!(session.get_linear_solver_stats().unwrap().fun_evals, 0);

    // Restarting forces a fresh iteration matrix, now by difference quotients.
    session.set_jacobian(None).unwrap();
    session.reinit(1.0, &y.clone(), &yp.clone()).unwrap();
    session.solve_normal(2.0, &mut y, &mut yp).unwrap();
    assert!(session.get_linear_solver_stats().unwrap().fun_evals > 0);
}

#[test]
fn roots_on_a_dae() {
    let mut session = coupled_decay_session();
    session
        .set_roots(1, |_, y, _, g| {
            g[0] = y[1] - 0.5;
            Ok(())
        })
        .unwrap();
    let (mut y, mut yp) = ([0.0; 2], [0.0; 2]);
    let (t, result) = session.solve_normal(2.0, &mut y, &mut yp).unwrap();
    assert_eq!(result, SolverResult::RootsFound);
    assert_abs_diff_eq!(y[1], 0.5, epsilon = 1e-6);
    assert_relative_eq!(t, (2.0 as Float).ln(), max_relative = 1e-2);
    assert_eq!(session.get_root_info().unwrap(), vec![RootDirection::Falling]);

    session.clear_roots().unwrap();
    let (t, result) = session.solve_normal(2.0, &mut y, &mut yp).unwrap();
    assert_eq!((t, result), (2.0, SolverResult::Success));
}

#[test]
fn stop_time_and_one_step() {
    let mut session = coupled_decay_session();
    session.set_stop_time(0.1).unwrap();
    let (mut y, mut yp) = ([0.0; 2], [0.0; 2]);
    let mut last = 0.0;
    loop {
        let (t, result) = session.solve_one_step(1.0, &mut y, &mut yp).unwrap();
        assert!(t > last && t <= 0.1);
        last = t;
        if result == SolverResult::StopTimeReached {
            break;
        }
    }
    assert_eq!(last, 0.1);

    let mut dky = [0.0; 2];
    session.get_dky(last, 0, &mut dky).unwrap();
    assert_abs_diff_eq!(dky[0], y[0], epsilon = 1e-12);
}

#[test]
fn residual_failure_is_reraised() {
    let options = IdaOptions::builder().rtol(1e-6).atol(1e-8).build();
    let mut session = Session::<Ida>::init(options, 0.0, &[1.0, 1.0], &[-1.0, -1.0], |t, y, yp, r| {
        if t > 0.5 {
            return Err(CallbackError::failed("reactor overheated"));
        }
        coupled_decay(t, y, yp, r)
    })
    .unwrap();
    let (mut y, mut yp) = ([0.0; 2], [0.0; 2]);
    let err = session.solve_normal(1.0, &mut y, &mut yp).unwrap_err();
    assert_eq!(err.to_string(), "callback failed: reactor overheated");
}

#[test]
fn too_much_work() {
    let options = IdaOptions::builder().max_num_steps(2).build();
    let mut session = Session::<Ida>::init(options, 0.0, &ROBERTSON_Y0, &ROBERTSON_YP0, robertson_residual).unwrap();
    let (mut y, mut yp) = ([0.0; 3], [0.0; 3]);
    let err = session.solve_normal(40.0, &mut y, &mut yp).unwrap_err();
    assert!(matches!(err, Error::Ida(IdaError::TooMuchWork)));
}

#[test]
fn reinit_restarts_from_new_values() {
    let mut session = coupled_decay_session();
    let (mut y, mut yp) = ([0.0; 2], [0.0; 2]);
    session.solve_normal(1.0, &mut y, &mut yp).unwrap();
    session.reinit(0.0, &[2.0, 2.0], &[-2.0, -2.0]).unwrap();
    session.solve_normal(1.0, &mut y, &mut yp).unwrap();
    assert_relative_eq!(y[0], 2.0 * (-1.0 as Float).exp(), max_relative = 1e-2);
    assert!(matches!(
        session.reinit(0.0, &[2.0, 2.0], &[-2.0]),
        Err(Error::LengthMismatch { what: "yp0", .. })
    ));
}
