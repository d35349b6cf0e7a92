//! Numerical backend abstraction layer.
//!
//! This module provides a trait-based interface for the linear solves of
//! the U and V sub-problems, so the assembly layer stays backend-agnostic.
//! The concrete solver is selected once from [`LinearConfig`].
//!
//! # Backends
//!
//! - **Conjugate gradient** (default): Jacobi-preconditioned CG on the CSR
//!   operator. Requires symmetric Dirichlet elimination.
//! - **Sparse Cholesky**: direct factorization from nalgebra-sparse.
//! - **Dense LU**: densified nalgebra LU. Reference for small problems and
//!   the only backend accepting non-symmetric operators.
//!
//! # Architecture
//!
//! ```text
//! Element Kernels (nalgebra SMatrix — small, dense)
//!         │
//!         ▼
//! Assembly (COO triplets → CSR, Dirichlet rows)
//!         │
//!         ▼
//! Backend Trait Layer (LinearSolver)
//!    ┌────┼─────────┐
//!    ▼    ▼         ▼
//!   CG  Cholesky  Dense LU
//! ```

pub mod cholesky;
pub mod iterative;
pub mod native;
pub mod traits;

use std::fmt;
use std::str::FromStr;

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub use cholesky::SparseCholeskyBackend;
pub use iterative::ConjugateGradient;
pub use native::NativeBackend;
pub use traits::*;

/// Sparse matrix-vector product `A x`, rows in parallel.
pub fn spmv(a: &CsrMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let (offsets, cols, vals) = a.csr_data();
    let mut y = DVector::zeros(a.nrows());
    y.as_mut_slice()
        .par_iter_mut()
        .enumerate()
        .for_each(|(row, out)| {
            let mut sum = 0.0;
            for idx in offsets[row]..offsets[row + 1] {
                sum += vals[idx] * x[cols[idx]];
            }
            *out = sum;
        });
    y
}

/// Linear solver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LinearSolverKind {
    #[default]
    ConjugateGradient,
    Cholesky,
    DenseLu,
}

impl FromStr for LinearSolverKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cg" | "conjugate-gradient" => Ok(Self::ConjugateGradient),
            "cholesky" => Ok(Self::Cholesky),
            "dense-lu" | "lu" => Ok(Self::DenseLu),
            other => Err(format!(
                "unknown linear solver '{other}' (expected cg, cholesky or dense-lu)"
            )
            .into()),
        }
    }
}

impl TryFrom<String> for LinearSolverKind {
    type Error = BackendError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<LinearSolverKind> for String {
    fn from(kind: LinearSolverKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for LinearSolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConjugateGradient => "cg",
            Self::Cholesky => "cholesky",
            Self::DenseLu => "dense-lu",
        };
        f.write_str(name)
    }
}

/// `[linear]` configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearConfig {
    pub solver: LinearSolverKind,
    /// Relative residual tolerance of iterative backends
    pub rtol: f64,
    /// Absolute residual tolerance of iterative backends
    pub atol: f64,
    pub max_iterations: usize,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            solver: LinearSolverKind::default(),
            rtol: 1e-10,
            atol: 1e-14,
            max_iterations: 10_000,
        }
    }
}

impl LinearConfig {
    pub fn with_solver(mut self, solver: LinearSolverKind) -> Self {
        self.solver = solver;
        self
    }
}

/// Instantiate the backend described by `config`.
pub fn build_backend(config: &LinearConfig) -> Box<dyn LinearSolver> {
    match config.solver {
        LinearSolverKind::ConjugateGradient => Box::new(
            ConjugateGradient::new()
                .with_max_iterations(config.max_iterations)
                .with_tolerance(config.rtol)
                .with_abs_tolerance(config.atol),
        ),
        LinearSolverKind::Cholesky => Box::new(SparseCholeskyBackend),
        LinearSolverKind::DenseLu => Box::new(NativeBackend),
    }
}

/// Returns the default solver backend (Jacobi-preconditioned CG).
pub fn default_backend() -> Box<dyn LinearSolver> {
    build_backend(&LinearConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    fn spd_system() -> LinearSystemData {
        // tridiagonal, diagonally dominant
        let n = 20;
        let mut coo = CooMatrix::new(n, n);
        for i in 0..n {
            coo.push(i, i, 3.0);
            if i > 0 {
                coo.push(i, i - 1, -1.0);
            }
            if i + 1 < n {
                coo.push(i, i + 1, -1.0);
            }
        }
        let rhs = DVector::from_fn(n, |i, _| 1.0 + i as f64 * 0.1);
        LinearSystemData::new(CsrMatrix::from(&coo), rhs)
    }

    #[test]
    fn spmv_matches_dense_product() {
        let system = spd_system();
        let dense = nalgebra::DMatrix::from(&system.operator);
        let x = DVector::from_fn(system.num_dofs(), |i, _| (i as f64).cos());
        let y = spmv(&system.operator, &x);
        assert!((y - dense * x).amax() < 1e-14);
    }

    #[test]
    fn backends_agree_on_spd_system() {
        let system = spd_system();
        let (reference, _) = NativeBackend.solve_linear(&system).unwrap();
        for kind in [LinearSolverKind::ConjugateGradient, LinearSolverKind::Cholesky] {
            let backend = build_backend(&LinearConfig::default().with_solver(kind));
            let (x, info) = backend.solve_linear(&system).unwrap();
            assert!(info.converged, "{} did not converge", backend.name());
            assert!(
                (&x - &reference).amax() < 1e-9,
                "{} deviates from dense LU",
                backend.name()
            );
        }
    }

    #[test]
    fn solver_kind_parses_config_names() {
        assert_eq!("cg".parse::<LinearSolverKind>().unwrap(), LinearSolverKind::ConjugateGradient);
        assert_eq!("Cholesky".parse::<LinearSolverKind>().unwrap(), LinearSolverKind::Cholesky);
        assert_eq!("dense-lu".parse::<LinearSolverKind>().unwrap(), LinearSolverKind::DenseLu);
        assert!("gmres".parse::<LinearSolverKind>().is_err());
        assert_eq!(LinearSolverKind::DenseLu.to_string(), "dense-lu");
    }

    #[test]
    fn default_backend_is_cg() {
        assert_eq!(default_backend().name(), "conjugate-gradient");
    }
}
