//! NCP solver scenarios over ad-hoc differentiable constraint sets.

#![allow(clippy::unwrap_used)]

use ccd_math::{Dual1, Scalar};
use ccd_solver::{ConstrainedProblem, NcpSettings, NcpSolver, UnconstrainedProblem};
use nalgebra::{dvector, DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CscMatrix};

const NUM_VARS: usize = 2;

type GDiff = Box<dyn Fn(&DVector<f64>) -> Vec<Dual1>>;

struct AdHocProblem {
    a: CscMatrix<f64>,
    b: DVector<f64>,
    g_diff: GDiff,
    is_dof_fixed: Vec<bool>,
}

impl AdHocProblem {
    fn new(a: CscMatrix<f64>, b: DVector<f64>, g_diff: GDiff) -> Self {
        Self {
            a,
            b,
            g_diff,
            is_dof_fixed: vec![false; NUM_VARS],
        }
    }
}

impl UnconstrainedProblem for AdHocProblem {
    fn num_vars(&self) -> usize {
        NUM_VARS
    }

    fn starting_point(&self) -> DVector<f64> {
        self.b.clone()
    }

    fn is_dof_fixed(&self) -> &[bool] {
        &self.is_dof_fixed
    }

    fn eval_f(&mut self, x: &DVector<f64>) -> f64 {
        0.5 * (&self.a * x - &self.b).norm_squared()
    }

    fn eval_grad_f(&mut self, x: &DVector<f64>) -> DVector<f64> {
        &self.a * x - &self.b
    }

    fn eval_hessian_f(&mut self, _x: &DVector<f64>) -> CscMatrix<f64> {
        self.a.clone()
    }
}

impl ConstrainedProblem for AdHocProblem {
    fn num_constraints(&mut self) -> usize {
        NUM_VARS
    }

    fn eval_g(&mut self, x: &DVector<f64>) -> DVector<f64> {
        let gx = (self.g_diff)(x);
        DVector::from_iterator(gx.len(), gx.iter().map(|g| g.value))
    }

    fn eval_jac_g(&mut self, x: &DVector<f64>) -> DMatrix<f64> {
        let gx = (self.g_diff)(x);
        let mut jac = DMatrix::zeros(gx.len(), NUM_VARS);
        for (i, gi) in gx.iter().enumerate() {
            jac.set_row(i, &gi.gradient(NUM_VARS).transpose());
        }
        jac
    }

    fn has_collisions(&mut self, _x_i: &DVector<f64>, _x_j: &DVector<f64>) -> bool {
        false
    }
}

fn identity() -> CscMatrix<f64> {
    let mut coo = CooMatrix::new(NUM_VARS, NUM_VARS);
    for i in 0..NUM_VARS {
        coo.push(i, i, 1.0);
    }
    CscMatrix::from(&coo)
}

fn solver() -> NcpSolver {
    NcpSolver::new(NcpSettings {
        max_iterations: 300,
        convergence_tolerance: 1e-8,
        do_line_search: false,
        solve_for_active_cstr: false,
        ..NcpSettings::default()
    })
}

fn check_case(g_diff: GDiff, expected: DVector<f64>) {
    let b = dvector![-1.0, -2.5];
    let mut problem = AdHocProblem::new(identity(), b.clone(), g_diff);
    let results = solver().solve_ncp(&identity(), &b, &mut problem).unwrap();
    assert!(results.success, "solver did not converge");
    assert!(
        (&expected - &results.x).norm_squared() < 1e-6,
        "x = {:?}, expected {:?}",
        results.x,
        expected
    );
}

#[test]
fn ncp_linear_case() {
    check_case(
        Box::new(|x| {
            vec![
                Dual1::variable(0, x[0], NUM_VARS),
                Dual1::variable(1, x[1], NUM_VARS),
            ]
        }),
        dvector![0.0, 0.0],
    );
}

#[test]
fn ncp_quadratic_case() {
    check_case(
        Box::new(|x| {
            let x0 = Dual1::variable(0, x[0], NUM_VARS);
            let x1 = Dual1::variable(1, x[1], NUM_VARS);
            vec![
                Dual1::constant(0.04) - x0.clone() * x0,
                Dual1::constant(0.09) - x1.clone() * x1,
            ]
        }),
        dvector![-0.2, -0.3],
    );
}

#[test]
fn ncp_abs_value_case() {
    check_case(
        Box::new(|x| {
            let x0 = Dual1::variable(0, x[0], NUM_VARS);
            let x1 = Dual1::variable(1, x[1], NUM_VARS);
            vec![
                Dual1::constant(0.2) - x0.abs(),
                Dual1::constant(0.3) - x1.abs(),
            ]
        }),
        dvector![-0.2, -0.3],
    );
}

#[test]
fn ncp_circle_case() {
    check_case(
        Box::new(|x| {
            let x0 = Dual1::variable(0, x[0], NUM_VARS);
            let x1 = Dual1::variable(1, x[1], NUM_VARS);
            let d0 = x0 - Dual1::constant(1.0);
            let d1 = x1 - Dual1::constant(2.5);
            vec![
                Dual1::constant(1.0) - d0.clone() * d0,
                Dual1::constant(1.0) - d1.clone() * d1,
            ]
        }),
        dvector![0.0, 1.5],
    );
}

#[test]
fn ncp_mosek_backend_is_not_implemented() {
    let b = dvector![-1.0, -2.5];
    let mut problem = AdHocProblem::new(
        identity(),
        b.clone(),
        Box::new(|x| {
            vec![
                Dual1::variable(0, x[0], NUM_VARS),
                Dual1::variable(1, x[1], NUM_VARS),
            ]
        }),
    );
    let solver = NcpSolver::new(NcpSettings {
        lcp_solver: ccd_solver::LcpSolverKind::Mosek,
        ..NcpSettings::default()
    });
    let err = solver.solve_ncp(&identity(), &b, &mut problem).unwrap_err();
    assert!(err.is_not_implemented());
}
