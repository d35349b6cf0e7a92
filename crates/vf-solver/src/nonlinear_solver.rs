//! Newton iteration over an abstract residual.
//!
//! Solves `R(x) = 0` by
//!
//! 1. computing the residual `R_i = R(x_i)`;
//! 2. assembling the linearized system `J(x_i) δ = −R_i` (constraint rows
//!    already applied by the problem);
//! 3. solving it with the configured [`LinearSolver`];
//! 4. updating `x_{i+1} = x_i + δ`.
//!
//! # Convergence Criteria
//!
//! - **Absolute residual**: `‖R‖₂ ≤ atol`
//! - **Relative residual**: `‖R‖₂ ≤ rtol · ‖R₀‖₂`
//! - **Step**: `‖δ‖∞ ≤ stol`
//!
//! A residual growing by more than `divergence_factor` over one step, a
//! failed linear solve or the iteration cap end the iteration early; the
//! best iterate seen so far is returned with a non-converged status. The
//! caller decides whether that is fatal.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{LinearSolver, LinearSystemData};
use crate::error::Result;

/// Nonlinear solver configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonlinearConfig {
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Relative residual tolerance
    pub rtol: f64,
    /// Absolute residual tolerance
    pub atol: f64,
    /// Step tolerance (max norm of the update)
    pub stol: f64,
    /// Residual growth over one step that counts as divergence
    pub divergence_factor: f64,
}

impl Default for NonlinearConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            rtol: 1e-8,
            atol: 1e-10,
            stol: 1e-12,
            divergence_factor: 10.0,
        }
    }
}

/// Convergence status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConvergenceStatus {
    /// Met one of the convergence criteria
    Converged,
    /// Iteration cap reached
    NotConverged,
    /// Residual blew up or the linear solve failed
    Diverged,
}

/// Nonlinear solve results
#[derive(Debug, Clone)]
pub struct NonlinearResults {
    /// Best iterate (the final one when converged)
    pub solution: DVector<f64>,
    /// Number of Newton updates performed
    pub num_iterations: usize,
    /// Residual norm of `solution`
    pub residual_norm: f64,
    /// Convergence status
    pub status: ConvergenceStatus,
    /// Residual norm of every iterate, starting with the initial guess
    pub iteration_history: Vec<f64>,
}

impl NonlinearResults {
    pub fn converged(&self) -> bool {
        self.status == ConvergenceStatus::Converged
    }
}

/// A nonlinear system as seen by [`NonlinearSolver`].
///
/// Both methods are called with the same iterate, residual first, so an
/// implementation may cache work between them.
pub trait NonlinearProblem {
    /// Residual `R(x)`, constraint rows included.
    fn residual(&mut self, x: &DVector<f64>) -> Result<DVector<f64>>;

    /// Linear system `J(x) δ = −R(x)` for the Newton update.
    fn jacobian_system(
        &mut self,
        x: &DVector<f64>,
        residual: &DVector<f64>,
    ) -> Result<LinearSystemData>;
}

/// Newton-Raphson solver
pub struct NonlinearSolver<'a> {
    backend: &'a dyn LinearSolver,
    config: NonlinearConfig,
}

impl<'a> NonlinearSolver<'a> {
    pub fn new(backend: &'a dyn LinearSolver, config: NonlinearConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &NonlinearConfig {
        &self.config
    }

    /// Run Newton from `x0`.
    ///
    /// # Errors
    /// Only errors raised by the problem itself (assembly, topology) are
    /// returned; numerical failure is reported through the status.
    pub fn solve<P: NonlinearProblem>(
        &self,
        problem: &mut P,
        x0: DVector<f64>,
    ) -> Result<NonlinearResults> {
        let cfg = &self.config;
        let mut x = x0;
        let mut r = problem.residual(&x)?;
        let r0 = r.norm();
        let mut history = vec![r0];
        let mut best = (x.clone(), r0);
        let mut status = ConvergenceStatus::NotConverged;
        let mut iterations = 0;

        if r0 <= cfg.atol {
            status = ConvergenceStatus::Converged;
        }

        while status == ConvergenceStatus::NotConverged && iterations < cfg.max_iterations {
            let system = problem.jacobian_system(&x, &r)?;
            let (delta, info) = match self.backend.solve_linear(&system) {
                Ok(solved) => solved,
                Err(e) => {
                    warn!(
                        "[ERROR] Newton iteration {}: linear solve failed: {e}",
                        iterations + 1
                    );
                    status = ConvergenceStatus::Diverged;
                    break;
                }
            };
            if !info.converged {
                warn!(
                    "[ERROR] Newton iteration {}: {} stopped after {} iterations (residual {:.3e})",
                    iterations + 1,
                    info.solver_name,
                    info.iterations,
                    info.residual_norm.unwrap_or(f64::NAN)
                );
            }

            x += &delta;
            iterations += 1;
            let previous = r.norm();
            r = problem.residual(&x)?;
            let r_norm = r.norm();
            history.push(r_norm);
            let step = delta.amax();
            debug!(
                "Newton iteration {iterations}: |R| = {r_norm:.6e}, |dx|inf = {step:.3e}, {} its",
                info.iterations
            );

            if r_norm < best.1 {
                best = (x.clone(), r_norm);
            }
            if r_norm <= cfg.atol || r_norm <= cfg.rtol * r0 || step <= cfg.stol {
                status = ConvergenceStatus::Converged;
            } else if !r_norm.is_finite() || r_norm > cfg.divergence_factor * previous {
                status = ConvergenceStatus::Diverged;
            }
        }

        let (solution, residual_norm) = if status == ConvergenceStatus::Converged {
            let norm = history.last().copied().unwrap_or(r0);
            (x, norm)
        } else {
            best
        };

        Ok(NonlinearResults {
            solution,
            num_iterations: iterations,
            residual_norm,
            status,
            iteration_history: history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeBackend;
    use nalgebra_sparse::{CooMatrix, CsrMatrix};

    fn diagonal(values: &DVector<f64>) -> CsrMatrix<f64> {
        let n = values.len();
        let mut coo = CooMatrix::new(n, n);
        for (i, &v) in values.iter().enumerate() {
            coo.push(i, i, v);
        }
        CsrMatrix::from(&coo)
    }

    /// Componentwise `x³ + x = b`.
    struct Cubic {
        b: DVector<f64>,
        residual_calls: usize,
    }

    impl NonlinearProblem for Cubic {
        fn residual(&mut self, x: &DVector<f64>) -> Result<DVector<f64>> {
            self.residual_calls += 1;
            Ok(x.map(|v| v * v * v + v) - &self.b)
        }

        fn jacobian_system(
            &mut self,
            x: &DVector<f64>,
            residual: &DVector<f64>,
        ) -> Result<LinearSystemData> {
            Ok(LinearSystemData::new(diagonal(&x.map(|v| 3.0 * v * v + 1.0)), -residual))
        }
    }

    /// `x = 1` with a Jacobian a hundred times too small.
    struct Overshoot;

    impl NonlinearProblem for Overshoot {
        fn residual(&mut self, x: &DVector<f64>) -> Result<DVector<f64>> {
            Ok(x.add_scalar(-1.0))
        }

        fn jacobian_system(
            &mut self,
            x: &DVector<f64>,
            residual: &DVector<f64>,
        ) -> Result<LinearSystemData> {
            Ok(LinearSystemData::new(
                diagonal(&DVector::from_element(x.len(), 0.01)),
                -residual,
            ))
        }
    }

    #[test]
    fn config_defaults() {
        let config = NonlinearConfig::default();
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.rtol, 1e-8);
        assert_eq!(config.atol, 1e-10);
        assert_eq!(config.stol, 1e-12);
    }

    #[test]
    fn newton_solves_cubic() {
        let backend = NativeBackend;
        let solver = NonlinearSolver::new(&backend, NonlinearConfig::default());
        let mut problem = Cubic {
            b: DVector::from_vec(vec![2.0, 10.0, -30.0]),
            residual_calls: 0,
        };
        let x0 = DVector::from_vec(vec![1.5, 2.5, -2.5]);
        let results = solver.solve(&mut problem, x0).unwrap();
        assert!(results.converged());
        assert!((results.solution[0] - 1.0).abs() < 1e-8);
        assert!((results.solution[1] - 2.0).abs() < 1e-8);
        assert!((results.solution[2] + 3.0).abs() < 1e-8);
        assert!(results.num_iterations < 20);
        assert_eq!(problem.residual_calls, results.num_iterations + 1);
        assert_eq!(results.iteration_history.len(), results.num_iterations + 1);
    }

    #[test]
    fn converged_start_performs_no_update() {
        let backend = NativeBackend;
        let solver = NonlinearSolver::new(&backend, NonlinearConfig::default());
        let mut problem = Cubic {
            b: DVector::from_vec(vec![2.0]),
            residual_calls: 0,
        };
        let results = solver
            .solve(&mut problem, DVector::from_vec(vec![1.0]))
            .unwrap();
        assert!(results.converged());
        assert_eq!(results.num_iterations, 0);
    }

    #[test]
    fn divergence_keeps_best_iterate() {
        let backend = NativeBackend;
        let solver = NonlinearSolver::new(&backend, NonlinearConfig::default());
        let results = solver.solve(&mut Overshoot, DVector::zeros(2)).unwrap();
        assert_eq!(results.status, ConvergenceStatus::Diverged);
        assert_eq!(results.num_iterations, 1);
        assert_eq!(results.solution, DVector::zeros(2));
        assert!((results.residual_norm - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn iteration_cap_reports_not_converged() {
        let backend = NativeBackend;
        let config = NonlinearConfig {
            max_iterations: 1,
            ..NonlinearConfig::default()
        };
        let solver = NonlinearSolver::new(&backend, config);
        let mut problem = Cubic {
            b: DVector::from_vec(vec![2.0]),
            residual_calls: 0,
        };
        // the first update overshoots to x = 2, so the start stays the best iterate
        let results = solver.solve(&mut problem, DVector::zeros(1)).unwrap();
        assert_eq!(results.status, ConvergenceStatus::NotConverged);
        assert_eq!(results.solution[0], 0.0);
        assert!((results.residual_norm - 2.0).abs() < 1e-12);
    }
}
