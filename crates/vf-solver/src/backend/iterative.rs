//! Jacobi-preconditioned conjugate gradient backend.
//!
//! Matrix-free apart from the CSR operator itself; the sparse matrix-vector
//! product runs row-parallel on rayon. Requires a symmetric positive
//! definite operator.

use super::traits::*;
use nalgebra::DVector;

/// Conjugate Gradient solver for symmetric positive definite systems
#[derive(Debug, Clone)]
pub struct ConjugateGradient {
    max_iterations: usize,
    tolerance: f64,
    abs_tolerance: f64,
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self::new()
    }
}

impl ConjugateGradient {
    pub fn new() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-10,
            abs_tolerance: 1e-14,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_abs_tolerance(mut self, abs_tolerance: f64) -> Self {
        self.abs_tolerance = abs_tolerance;
        self
    }
}

impl LinearSolver for ConjugateGradient {
    fn solve_linear(
        &self,
        system: &LinearSystemData,
    ) -> Result<(DVector<f64>, SolveInfo), BackendError> {
        system.validate()?;
        let a = &system.operator;
        let b = &system.rhs;
        let n = b.len();

        let inv_diag = jacobi(a)?;
        let b_norm = b.norm();

        let mut x = system
            .initial_guess
            .clone()
            .unwrap_or_else(|| DVector::zeros(n));
        let mut r = b - super::spmv(a, &x);
        let mut r_norm = r.norm();
        let target = (self.tolerance * b_norm).max(self.abs_tolerance);

        let mut iteration = 0;
        let mut converged = r_norm <= target;

        if !converged {
            let mut z = r.component_mul(&inv_diag);
            let mut p = z.clone();
            let mut rz = r.dot(&z);

            while iteration < self.max_iterations {
                let ap = super::spmv(a, &p);
                let p_ap = p.dot(&ap);
                if p_ap <= 0.0 || !p_ap.is_finite() {
                    return Err(format!(
                        "CG breakdown at iteration {iteration}: p·Ap = {p_ap:.3e} (operator not SPD?)"
                    )
                    .into());
                }
                let alpha = rz / p_ap;
                x.axpy(alpha, &p, 1.0);
                r.axpy(-alpha, &ap, 1.0);
                iteration += 1;

                r_norm = r.norm();
                if r_norm <= target {
                    converged = true;
                    break;
                }

                z = r.component_mul(&inv_diag);
                let rz_new = r.dot(&z);
                let beta = rz_new / rz;
                rz = rz_new;
                p.axpy(1.0, &z, beta);
            }
        }

        Ok((
            x,
            SolveInfo {
                iterations: iteration,
                residual_norm: Some(r_norm),
                converged,
                solver_name: "jacobi-CG".to_string(),
            },
        ))
    }

    fn name(&self) -> &str {
        "conjugate-gradient"
    }
}

/// Inverse of the operator diagonal.
fn jacobi(a: &nalgebra_sparse::CsrMatrix<f64>) -> Result<DVector<f64>, BackendError> {
    let mut inv = DVector::zeros(a.nrows());
    for (row, slot) in inv.iter_mut().enumerate() {
        let lane = a.row(row);
        let diag = lane
            .col_indices()
            .iter()
            .zip(lane.values())
            .find(|(c, _)| **c == row)
            .map(|(_, v)| *v)
            .unwrap_or(0.0);
        if diag <= 0.0 || !diag.is_finite() {
            return Err(format!("non-positive diagonal {diag:.3e} in row {row}").into());
        }
        *slot = 1.0 / diag;
    }
    Ok(inv)
}
