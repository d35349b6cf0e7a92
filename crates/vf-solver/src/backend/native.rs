//! Native dense backend using nalgebra.
//!
//! Densifies the operator and solves with an LU decomposition. It handles
//! non-symmetric operators (row-only Dirichlet edits) and serves as the
//! reference for the sparse backends on small problems.

use super::traits::*;
use nalgebra::{DMatrix, DVector};

/// Dense LU solver backend.
///
/// Suitable for small problems (up to a few thousand DOFs).
/// For larger problems, use the sparse Cholesky or CG backends.
pub struct NativeBackend;

impl LinearSolver for NativeBackend {
    fn solve_linear(
        &self,
        system: &LinearSystemData,
    ) -> Result<(DVector<f64>, SolveInfo), BackendError> {
        system.validate()?;

        let a = DMatrix::from(&system.operator);

        // LU decomposition and solve
        let x = a
            .clone()
            .lu()
            .solve(&system.rhs)
            .ok_or(BackendError("Singular matrix in LU decomposition".into()))?;

        let residual = (&system.rhs - &a * &x).norm();

        Ok((
            x,
            SolveInfo {
                iterations: 1,
                residual_norm: Some(residual),
                converged: true,
                solver_name: "nalgebra-LU".to_string(),
            },
        ))
    }

    fn name(&self) -> &str {
        "native-nalgebra"
    }
}
