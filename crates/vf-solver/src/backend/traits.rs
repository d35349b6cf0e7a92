//! Backend trait definitions for linear solvers.
//!
//! These traits abstract over the concrete numerical method used for the
//! global solves of the U and V sub-problems. Element-level computations
//! remain in nalgebra (small, dense matrices).

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

/// Error type for backend operations.
#[derive(Debug, Clone)]
pub struct BackendError(pub String);

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

impl From<&str> for BackendError {
    fn from(s: &str) -> Self {
        BackendError(s.to_string())
    }
}

/// A linear system ready for solving: A * x = b.
///
/// Produced by the assembly layer, consumed by any `LinearSolver` backend.
/// Dirichlet rows should already be applied to A and b before constructing
/// this struct.
pub struct LinearSystemData {
    /// Operator in CSR format (constraints already applied)
    pub operator: CsrMatrix<f64>,
    /// Right-hand side (constraints already applied)
    pub rhs: DVector<f64>,
    /// Starting point for iterative backends
    pub initial_guess: Option<DVector<f64>>,
}

impl LinearSystemData {
    pub fn new(operator: CsrMatrix<f64>, rhs: DVector<f64>) -> Self {
        Self {
            operator,
            rhs,
            initial_guess: None,
        }
    }

    pub fn with_initial_guess(mut self, guess: DVector<f64>) -> Self {
        self.initial_guess = Some(guess);
        self
    }

    pub fn num_dofs(&self) -> usize {
        self.rhs.len()
    }

    /// Check that operator, rhs and guess agree in size.
    pub fn validate(&self) -> Result<(), BackendError> {
        let n = self.rhs.len();
        if self.operator.nrows() != n || self.operator.ncols() != n {
            return Err(format!(
                "operator is {}x{}, rhs has {} entries",
                self.operator.nrows(),
                self.operator.ncols(),
                n
            )
            .into());
        }
        if let Some(guess) = &self.initial_guess {
            if guess.len() != n {
                return Err(format!("initial guess has {} entries, expected {n}", guess.len()).into());
            }
        }
        Ok(())
    }
}

/// Solver convergence and diagnostic info.
#[derive(Debug, Clone)]
pub struct SolveInfo {
    /// Number of iterations (1 for direct solvers)
    pub iterations: usize,
    /// Final residual norm ||b - A x|| (if available)
    pub residual_norm: Option<f64>,
    /// False when an iterative backend stopped before reaching its tolerance
    pub converged: bool,
    /// Human-readable solver name (e.g., "nalgebra-LU", "jacobi-CG")
    pub solver_name: String,
}

/// Trait for a linear solver backend.
///
/// Implementations solve A * x = b given the assembled system data. A
/// backend that runs out of iterations still returns its last iterate, with
/// `SolveInfo::converged` cleared; errors are reserved for breakdowns.
pub trait LinearSolver: Send + Sync {
    /// Solve A * x = b.
    fn solve_linear(
        &self,
        system: &LinearSystemData,
    ) -> Result<(DVector<f64>, SolveInfo), BackendError>;

    /// Human-readable name of this backend.
    fn name(&self) -> &str;
}
