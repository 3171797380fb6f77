//! Bound- and leverage-constrained nonlinear minimizer.
//!
//! Projected gradient descent with Armijo backtracking handles the box
//! `0 <= w_i <= upper` and the budget `sum(w) <= max_sum` exactly (every
//! iterate is projected onto that set). Nonlinear inequality constraints
//! `g_j(w) >= 0` are handled with an augmented Lagrangian outer loop.
//! Gradients are central finite differences.

use nalgebra::DVector;

const MAX_OUTER_ITERATIONS: usize = 25;
const FEASIBILITY_TOLERANCE: f64 = 1e-6;
const STATIONARITY_TOLERANCE: f64 = 1e-8;
const ARMIJO_COEFFICIENT: f64 = 1e-4;
const MIN_STEP: f64 = 1e-16;
const MAX_STEP: f64 = 1e6;
const INITIAL_PENALTY: f64 = 10.0;
const MAX_PENALTY: f64 = 1e8;
/// Stand-in for a constraint that evaluates to a non-finite value.
const NON_FINITE_VIOLATION: f64 = 1e6;

pub type Objective<'a> = Box<dyn Fn(&DVector<f64>) -> f64 + 'a>;
/// Inequality constraint, satisfied when the value is `>= 0`.
pub type Constraint<'a> = Box<dyn Fn(&DVector<f64>) -> f64 + 'a>;

pub struct Problem<'a> {
    pub objective: Objective<'a>,
    pub constraints: Vec<Constraint<'a>>,
    /// Per-weight upper bound (lower bound is 0).
    pub upper: f64,
    /// Ceiling on the sum of weights.
    pub max_sum: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SolverSettings {
    /// Budget of projected-gradient iterations across all outer passes.
    pub max_iterations: usize,
    /// Relative objective change treated as convergence.
    pub tolerance: f64,
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub weights: DVector<f64>,
    pub objective: f64,
    pub max_violation: f64,
    pub iterations: usize,
    pub converged: bool,
    pub message: String,
}

enum InnerOutcome {
    Converged,
    BudgetExhausted,
    NonFinite,
}

impl<'a> Problem<'a> {
    /// Largest violation over the nonlinear constraints.
    pub fn max_violation(&self, x: &DVector<f64>) -> f64 {
        self.constraints
            .iter()
            .map(|g| violation(g(x)))
            .fold(0.0, f64::max)
    }

    fn merit(&self, x: &DVector<f64>, multipliers: &[f64], penalty: f64) -> f64 {
        let mut value = (self.objective)(x);
        for (g, &lambda) in self.constraints.iter().zip(multipliers) {
            let c = finite_constraint(g(x));
            if c <= lambda / penalty {
                value += -lambda * c + 0.5 * penalty * c * c;
            } else {
                value += -lambda * lambda / (2.0 * penalty);
            }
        }
        value
    }

    /// Euclidean projection onto `{0 <= w_i <= upper, sum(w) <= max_sum}`.
    pub fn project(&self, x: &DVector<f64>) -> DVector<f64> {
        let upper = self.upper.max(0.0);
        let max_sum = self.max_sum.max(0.0);
        let clipped = x.map(|v| v.clamp(0.0, upper));
        if clipped.sum() <= max_sum {
            return clipped;
        }
        // Shift by tau so the clipped sum meets the budget exactly.
        let mut lo = 0.0;
        let mut hi = x.iter().copied().fold(0.0, f64::max);
        for _ in 0..100 {
            let mid = 0.5 * (lo + hi);
            let s: f64 = x.iter().map(|v| (v - mid).clamp(0.0, upper)).sum();
            if s > max_sum {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        x.map(|v| (v - hi).clamp(0.0, upper))
    }
}

/// Minimize `problem` starting from `x0`. `on_iteration` receives the
/// iteration count, current weights, objective value and constraint violation.
pub fn minimize(
    problem: &Problem,
    x0: &DVector<f64>,
    settings: &SolverSettings,
    mut on_iteration: impl FnMut(usize, &DVector<f64>, f64, f64),
) -> Solution {
    let mut x = problem.project(x0);
    let mut multipliers = vec![0.0; problem.constraints.len()];
    let mut penalty = INITIAL_PENALTY;
    let mut iterations = 0usize;
    let mut previous_violation = f64::INFINITY;

    for _ in 0..MAX_OUTER_ITERATIONS {
        let outcome = minimize_inner(
            problem,
            &mut x,
            &multipliers,
            penalty,
            settings,
            &mut iterations,
            &mut on_iteration,
        );

        match outcome {
            InnerOutcome::Converged => {}
            InnerOutcome::BudgetExhausted => {
                return finish(problem, x, iterations, false, "iteration limit reached");
            }
            InnerOutcome::NonFinite => {
                return finish(problem, x, iterations, false, "objective is not finite");
            }
        }

        let current_violation = problem.max_violation(&x);
        if current_violation <= FEASIBILITY_TOLERANCE {
            return finish(problem, x, iterations, true, "optimization terminated successfully");
        }

        for (g, lambda) in problem.constraints.iter().zip(multipliers.iter_mut()) {
            *lambda = (*lambda - penalty * finite_constraint(g(&x))).max(0.0);
        }
        if current_violation > 0.25 * previous_violation {
            penalty = (penalty * 10.0).min(MAX_PENALTY);
        }
        previous_violation = current_violation;
    }

    finish(problem, x, iterations, false, "inequality constraints incompatible")
}

fn minimize_inner(
    problem: &Problem,
    x: &mut DVector<f64>,
    multipliers: &[f64],
    penalty: f64,
    settings: &SolverSettings,
    iterations: &mut usize,
    on_iteration: &mut impl FnMut(usize, &DVector<f64>, f64, f64),
) -> InnerOutcome {
    let mut step = 1.0;
    loop {
        let f0 = problem.merit(&*x, multipliers, penalty);
        if !f0.is_finite() {
            return InnerOutcome::NonFinite;
        }
        if *iterations >= settings.max_iterations {
            return InnerOutcome::BudgetExhausted;
        }
        *iterations += 1;

        let grad = numerical_gradient(|p| problem.merit(p, multipliers, penalty), &*x);
        if grad.iter().any(|g| !g.is_finite()) {
            return InnerOutcome::NonFinite;
        }

        let projected_step = problem.project(&(&*x - &grad)) - &*x;
        if projected_step.norm() <= STATIONARITY_TOLERANCE {
            return InnerOutcome::Converged;
        }

        // Armijo backtracking along the projection arc.
        let mut accepted = None;
        while step >= MIN_STEP {
            let candidate = problem.project(&(&*x - &grad * step));
            let delta = &candidate - &*x;
            let f1 = problem.merit(&candidate, multipliers, penalty);
            if f1.is_finite() && f1 <= f0 - ARMIJO_COEFFICIENT / step * delta.norm_squared() {
                accepted = Some((candidate, f1));
                break;
            }
            step *= 0.5;
        }

        let Some((candidate, f1)) = accepted else {
            // No descent left at machine precision.
            return InnerOutcome::Converged;
        };

        *x = candidate;
        step = (step * 2.0).min(MAX_STEP);
        on_iteration(
            *iterations,
            &*x,
            (problem.objective)(&*x),
            problem.max_violation(&*x),
        );

        if (f0 - f1).abs() <= settings.tolerance * (1.0 + f0.abs()) {
            return InnerOutcome::Converged;
        }
    }
}

fn numerical_gradient(f: impl Fn(&DVector<f64>) -> f64, x: &DVector<f64>) -> DVector<f64> {
    let mut grad = DVector::zeros(x.len());
    let mut shifted = x.clone();
    for i in 0..x.len() {
        let h = 1e-7 * x[i].abs().max(1.0);
        let original = shifted[i];
        shifted[i] = original + h;
        let f_plus = f(&shifted);
        shifted[i] = original - h;
        let f_minus = f(&shifted);
        shifted[i] = original;
        grad[i] = (f_plus - f_minus) / (2.0 * h);
    }
    grad
}

fn finish(
    problem: &Problem,
    weights: DVector<f64>,
    iterations: usize,
    converged: bool,
    message: &str,
) -> Solution {
    let objective = (problem.objective)(&weights);
    let max_violation = problem.max_violation(&weights);
    Solution {
        converged: converged && objective.is_finite(),
        weights,
        objective,
        max_violation,
        iterations,
        message: message.to_string(),
    }
}

fn finite_constraint(c: f64) -> f64 {
    if c.is_finite() {
        c
    } else {
        -NON_FINITE_VIOLATION
    }
}

fn violation(c: f64) -> f64 {
    (-finite_constraint(c)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SolverSettings {
        SolverSettings {
            max_iterations: 2000,
            tolerance: 1e-12,
        }
    }

    fn no_op(_: usize, _: &DVector<f64>, _: f64, _: f64) {}

    #[test]
    fn test_projection_respects_budget_and_caps() {
        let problem = Problem {
            objective: Box::new(|_: &DVector<f64>| 0.0),
            constraints: Vec::new(),
            upper: 0.6,
            max_sum: 1.0,
        };
        let p = problem.project(&DVector::from_vec(vec![0.9, 0.8, -0.2]));
        assert!(p.iter().all(|&v| (0.0..=0.6 + 1e-12).contains(&v)));
        assert!(p.sum() <= 1.0 + 1e-9);
        assert!((p.sum() - 1.0).abs() < 1e-6);
        assert_eq!(p[2], 0.0);
    }

    #[test]
    fn test_projection_keeps_feasible_points() {
        let problem = Problem {
            objective: Box::new(|_: &DVector<f64>| 0.0),
            constraints: Vec::new(),
            upper: 1.0,
            max_sum: 2.0,
        };
        let x = DVector::from_vec(vec![0.3, 0.4]);
        assert_eq!(problem.project(&x), x);
    }

    #[test]
    fn test_unconstrained_quadratic_minimum() {
        // min (w0 - 0.3)^2 + (w1 - 0.5)^2, interior optimum.
        let problem = Problem {
            objective: Box::new(|w: &DVector<f64>| (w[0] - 0.3).powi(2) + (w[1] - 0.5).powi(2)),
            constraints: Vec::new(),
            upper: 1.0,
            max_sum: 2.0,
        };
        let sol = minimize(&problem, &DVector::from_vec(vec![0.5, 0.5]), &settings(), no_op);
        assert!(sol.converged, "{}", sol.message);
        assert!((sol.weights[0] - 0.3).abs() < 1e-4);
        assert!((sol.weights[1] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_budget_binds() {
        // Maximize w0 + 2 w1 with sum <= 1.5 and caps at 1.0.
        let problem = Problem {
            objective: Box::new(|w: &DVector<f64>| -(w[0] + 2.0 * w[1])),
            constraints: Vec::new(),
            upper: 1.0,
            max_sum: 1.5,
        };
        let sol = minimize(&problem, &DVector::from_vec(vec![0.5, 0.5]), &settings(), no_op);
        assert!(sol.converged, "{}", sol.message);
        assert!((sol.weights[1] - 1.0).abs() < 1e-6);
        assert!((sol.weights[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_nonlinear_constraint() {
        // Maximize w0 subject to w0 <= 0.4 written as 0.4 - w0 >= 0.
        let problem = Problem {
            objective: Box::new(|w: &DVector<f64>| -w[0]),
            constraints: vec![Box::new(|w: &DVector<f64>| 0.4 - w[0])],
            upper: 1.0,
            max_sum: 1.0,
        };
        let sol = minimize(&problem, &DVector::from_vec(vec![0.1]), &settings(), no_op);
        assert!(sol.converged, "{}", sol.message);
        assert!(sol.max_violation <= FEASIBILITY_TOLERANCE);
        assert!((sol.weights[0] - 0.4).abs() < 1e-3);
    }

    #[test]
    fn test_infeasible_constraint_reports_failure() {
        let problem = Problem {
            objective: Box::new(|w: &DVector<f64>| w[0]),
            constraints: vec![Box::new(|w: &DVector<f64>| w[0] - 5.0)],
            upper: 1.0,
            max_sum: 1.0,
        };
        let sol = minimize(&problem, &DVector::from_vec(vec![0.5]), &settings(), no_op);
        assert!(!sol.converged);
    }

    #[test]
    fn test_non_finite_objective_reports_failure() {
        let problem = Problem {
            objective: Box::new(|_: &DVector<f64>| f64::NAN),
            constraints: Vec::new(),
            upper: 1.0,
            max_sum: 1.0,
        };
        let sol = minimize(&problem, &DVector::from_vec(vec![0.5]), &settings(), no_op);
        assert!(!sol.converged);
    }

    #[test]
    fn test_zero_budget_reports_failure() {
        let problem = Problem {
            objective: Box::new(|w: &DVector<f64>| (w[0] - 0.2).powi(2)),
            constraints: Vec::new(),
            upper: 1.0,
            max_sum: 1.0,
        };
        let zero = SolverSettings {
            max_iterations: 0,
            tolerance: 1e-9,
        };
        let sol = minimize(&problem, &DVector::from_vec(vec![0.9]), &zero, no_op);
        assert!(!sol.converged);
        assert_eq!(sol.iterations, 0);
    }
}
