//! Displacement sub-problem (U-step) for a fixed damage field.
//!
//! Newton on `R(U) = K(U) U − F(U)` with constrained rows `R_i = U_i − g_i`.
//! `K` depends on `U` only through the trace-sign pattern of the
//! no-compression split, so the iteration usually stops after one or two
//! updates. The Jacobian is `K(U)` assembled with `pc_eta` when set.

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use tracing::{debug, warn};

use crate::backend::{spmv, LinearSolver, LinearSystemData};
use crate::boundary_conditions::{Constraints, DirichletMode};
use crate::error::Result;
use crate::fields::{Fields, NodalField};
use crate::nonlinear_solver::{NonlinearConfig, NonlinearProblem, NonlinearResults, NonlinearSolver};
use crate::sparse_assembly::GlobalAssembler;

/// Residual and Jacobian of the U problem around the current fields.
struct DisplacementProblem<'a, 'm> {
    assembler: &'a GlobalAssembler<'m>,
    fields: &'a mut Fields,
    constraints: &'a Constraints,
    eta: f64,
    jacobian_eta: f64,
    /// `K(x)` from the last residual, reused when both etas agree
    cached: Option<CsrMatrix<f64>>,
}

impl DisplacementProblem<'_, '_> {
    fn load(&mut self, x: &DVector<f64>) {
        self.fields.u.as_vector_mut().copy_from(x);
    }
}

impl NonlinearProblem for DisplacementProblem<'_, '_> {
    fn residual(&mut self, x: &DVector<f64>) -> Result<DVector<f64>> {
        self.load(x);
        let k = self.assembler.u_operator(self.fields, self.eta)?;
        let f = self.assembler.u_force(self.fields)?;
        let mut r = spmv(&k, x) - f;
        self.constraints.apply_to_residual(&mut r, x);
        self.cached = Some(k);
        Ok(r)
    }

    fn jacobian_system(
        &mut self,
        x: &DVector<f64>,
        residual: &DVector<f64>,
    ) -> Result<LinearSystemData> {
        self.load(x);
        let cached = self.cached.take();
        let mut jacobian = match cached {
            Some(k) if self.jacobian_eta == self.eta => k,
            _ => self.assembler.u_operator(self.fields, self.jacobian_eta)?,
        };

        // constrained update rows: δ_i = g_i − x_i
        let mut delta_bc = Constraints::free(x.len());
        for (dof, value) in self.constraints.iter() {
            delta_bc.fix(dof, value - x[dof]);
        }
        let mut rhs = -residual;
        delta_bc.apply_to_matrix(&mut jacobian, &mut rhs, DirichletMode::RowColumn)?;
        Ok(LinearSystemData::new(jacobian, rhs).with_initial_guess(DVector::zeros(x.len())))
    }
}

/// U-step driver.
pub struct DisplacementSolver<'a, 'm> {
    assembler: &'a GlobalAssembler<'m>,
    backend: &'a dyn LinearSolver,
    config: NonlinearConfig,
}

impl<'a, 'm> DisplacementSolver<'a, 'm> {
    pub fn new(
        assembler: &'a GlobalAssembler<'m>,
        backend: &'a dyn LinearSolver,
        config: NonlinearConfig,
    ) -> Self {
        Self {
            assembler,
            backend,
            config,
        }
    }

    /// Constraint table of `U`: markers resolved against `fields.bc_u`.
    pub fn constraints(&self, fields: &Fields) -> Result<Constraints> {
        let model = self.assembler.model();
        Constraints::from_markers(&model.grid, &model.bc_u, &fields.bc_u)
    }

    /// Solve for `U` with the current `V`, overwriting `fields.u`.
    ///
    /// Divergence is logged and the best iterate kept; only assembly errors
    /// are returned.
    pub fn solve(&self, fields: &mut Fields) -> Result<NonlinearResults> {
        let vfprop = &self.assembler.model().vfprop;
        let constraints = self.constraints(fields)?;
        let mut x0 = fields.u.as_vector().clone();
        constraints.impose(&mut x0);

        let mut problem = DisplacementProblem {
            assembler: self.assembler,
            fields: &mut *fields,
            constraints: &constraints,
            eta: vfprop.eta,
            jacobian_eta: vfprop.jacobian_eta(),
            cached: None,
        };
        let results = NonlinearSolver::new(self.backend, self.config).solve(&mut problem, x0)?;
        fields.u = NodalField::from_vector(3, results.solution.clone())?;

        if results.converged() {
            debug!(
                "U-step converged in {} Newton iterations, |R| = {:.3e}",
                results.num_iterations, results.residual_norm
            );
        } else {
            warn!(
                "[ERROR] U-step {:?} after {} Newton iterations, keeping best iterate (|R| = {:.3e})",
                results.status, results.num_iterations, results.residual_norm
            );
        }
        Ok(results)
    }
}
