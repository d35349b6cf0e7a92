//! Damage sub-problem (V-step) for a fixed displacement.
//!
//! For fixed `U` the energy is quadratic in `V`, so one linear solve gives
//! the unconstrained minimizer. The bounds `0 ≤ V ≤ VIrrev` are enforced
//! with a primal-dual active-set loop: nodes whose value (or multiplier)
//! violates a bound are pinned to it through symmetric constraint rows and
//! the system is solved again until the active set stops changing.
//! Boundary markers and the irreversibility constraint are applied first and
//! never released.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{spmv, LinearSolver, LinearSystemData};
use crate::boundary_conditions::{Constraints, DirichletMode};
use crate::error::Result;
use crate::fields::{Fields, NodalField};
use crate::irreversibility::IrreversibilityManager;
use crate::sparse_assembly::GlobalAssembler;

/// V-step settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageConfig {
    /// Cap on active-set updates
    pub max_active_set_iterations: usize,
}

impl Default for DamageConfig {
    fn default() -> Self {
        Self {
            max_active_set_iterations: 20,
        }
    }
}

/// Slack on the bounds before a node changes state.
const BOUND_TOL: f64 = 1e-9;

/// Which bound a node is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Free,
    Lower,
    Upper,
}

/// Outcome of one V-step.
#[derive(Debug, Clone, PartialEq)]
pub struct DamageResults {
    pub active_set_iterations: usize,
    /// False when the active set was still changing at the cap
    pub active_set_converged: bool,
    /// Nodes pinned by irreversibility
    pub irreversible_nodes: usize,
    /// Nodes pinned to a bound at the end
    pub active_nodes: usize,
    pub v_min: f64,
    pub v_max: f64,
}

/// V-step driver.
pub struct DamageSolver<'a, 'm> {
    assembler: &'a GlobalAssembler<'m>,
    backend: &'a dyn LinearSolver,
    config: DamageConfig,
}

impl<'a, 'm> DamageSolver<'a, 'm> {
    pub fn new(
        assembler: &'a GlobalAssembler<'m>,
        backend: &'a dyn LinearSolver,
        config: DamageConfig,
    ) -> Self {
        Self {
            assembler,
            backend,
            config,
        }
    }

    /// Constraint table of `V`: boundary markers (`FIXED` keeps the current
    /// `V`), then irreversibility. Cracked nodes of `fields.v` are zeroed.
    pub fn constraints(&self, fields: &mut Fields) -> Result<(Constraints, usize)> {
        let model = self.assembler.model();
        let mut constraints = Constraints::from_markers(&model.grid, &model.bc_v, &fields.v)?;
        let manager = IrreversibilityManager::new(model.vfprop.irrev_tol);
        let pinned = manager.constrain(&fields.v_irrev, &mut fields.v, &mut constraints)?;
        Ok((constraints, pinned))
    }

    /// Solve for `V` with the current `U`, overwriting `fields.v`.
    pub fn solve(&self, fields: &mut Fields) -> Result<DamageResults> {
        let (base, irreversible_nodes) = self.constraints(fields)?;
        let operator = self.assembler.v_operator(fields)?;
        let rhs = self.assembler.v_rhs(fields)?;
        let n = rhs.len();

        let diagonal = diagonal_of(&operator);
        let upper: Vec<f64> = fields.v_irrev.as_slice().to_vec();
        let mut v = fields.v.as_vector().clone();
        // start from the bounds the current V already touches
        let mut bounds: Vec<Bound> = (0..n)
            .map(|node| {
                if base.is_fixed(node) {
                    Bound::Free
                } else if v[node] <= 0.0 {
                    Bound::Lower
                } else if v[node] >= upper[node] {
                    Bound::Upper
                } else {
                    Bound::Free
                }
            })
            .collect();
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_active_set_iterations {
            iterations += 1;
            let mut constraints = base.clone();
            for (node, bound) in bounds.iter().enumerate() {
                match bound {
                    Bound::Lower => constraints.fix(node, 0.0),
                    Bound::Upper => constraints.fix(node, upper[node]),
                    Bound::Free => {}
                }
            }

            let mut a = operator.clone();
            let mut b = rhs.clone();
            constraints.apply_to_matrix(&mut a, &mut b, DirichletMode::RowColumn)?;
            let mut guess = v.clone();
            constraints.impose(&mut guess);
            let system = LinearSystemData::new(a, b).with_initial_guess(guess);
            match self.backend.solve_linear(&system) {
                Ok((mut solution, info)) => {
                    if !info.converged {
                        warn!(
                            "[ERROR] V-step: {} stopped after {} iterations (residual {:.3e})",
                            info.solver_name,
                            info.iterations,
                            info.residual_norm.unwrap_or(f64::NAN)
                        );
                    }
                    constraints.impose(&mut solution);
                    v = solution;
                }
                Err(e) => {
                    warn!("[ERROR] V-step: linear solve failed, keeping previous V: {e}");
                    break;
                }
            }

            // multiplier of the unconstrained problem, zero on free nodes
            let gradient = spmv(&operator, &v) - &rhs;
            let mut changed = false;
            for node in 0..n {
                if base.is_fixed(node) {
                    continue;
                }
                let trial = v[node] - gradient[node] / diagonal[node];
                let bound = if trial < -BOUND_TOL {
                    Bound::Lower
                } else if trial > upper[node] + BOUND_TOL {
                    Bound::Upper
                } else if bounds[node] == Bound::Lower && trial <= BOUND_TOL {
                    Bound::Lower
                } else if bounds[node] == Bound::Upper && trial >= upper[node] - BOUND_TOL {
                    Bound::Upper
                } else {
                    Bound::Free
                };
                if bound != bounds[node] {
                    bounds[node] = bound;
                    changed = true;
                }
            }
            debug!(
                "V-step active set iteration {iterations}: {} nodes at a bound",
                bounds.iter().filter(|&&b| b != Bound::Free).count()
            );
            if !changed {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                "[ERROR] V-step active set not settled after {iterations} iterations, clipping to [0, VIrrev]"
            );
        }
        clip(&mut v, &upper);
        fields.v = NodalField::from_vector(1, v)?;

        let results = DamageResults {
            active_set_iterations: iterations,
            active_set_converged: converged,
            irreversible_nodes,
            active_nodes: bounds.iter().filter(|&&b| b != Bound::Free).count(),
            v_min: fields.v.min(),
            v_max: fields.v.max(),
        };
        info!("V min / max: {:.6e} / {:.6e}", results.v_min, results.v_max);
        Ok(results)
    }
}

fn diagonal_of(a: &nalgebra_sparse::CsrMatrix<f64>) -> DVector<f64> {
    let mut diagonal = DVector::from_element(a.nrows(), 1.0);
    for (row, slot) in diagonal.iter_mut().enumerate() {
        let lane = a.row(row);
        if let Some(pos) = lane.col_indices().iter().position(|&c| c == row) {
            let d = lane.values()[pos];
            if d > 0.0 {
                *slot = d;
            }
        }
    }
    diagonal
}

fn clip(v: &mut DVector<f64>, upper: &[f64]) {
    for (value, &hi) in v.iter_mut().zip(upper) {
        *value = value.clamp(0.0, hi.max(0.0));
    }
}
