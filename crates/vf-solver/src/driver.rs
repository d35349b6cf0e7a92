//! Alternate minimization between the displacement and damage problems.
//!
//! ```text
//! loop:
//!   U-step with the current V
//!   V-step with VIrrev fixed
//!   ΔV = max |V − V_previous|
//!   stop when ΔV ≤ tol or the iteration cap is reached
//! ```
//!
//! Hitting the cap is reported as [`AltMinStatus::MaxIterationsReached`]
//! with a warning; the fields hold the last iterate either way.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::{build_backend, LinearConfig, LinearSolver};
use crate::damage::{DamageConfig, DamageSolver};
use crate::displacement::DisplacementSolver;
use crate::error::Result;
use crate::fields::Fields;
use crate::irreversibility::IrreversibilityManager;
use crate::model::Model;
use crate::nonlinear_solver::NonlinearConfig;
use crate::sparse_assembly::{Energies, GlobalAssembler};

/// `[altmin]` settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AltMinConfig {
    /// Stop when `max |ΔV|` falls to this value
    pub tol: f64,
    pub max_iterations: usize,
}

impl Default for AltMinConfig {
    fn default() -> Self {
        Self {
            tol: 1e-4,
            max_iterations: 1000,
        }
    }
}

/// Numerical settings of every stage of the solver.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub altmin: AltMinConfig,
    pub newton: NonlinearConfig,
    pub damage: DamageConfig,
    pub linear: LinearConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AltMinStatus {
    Converged,
    MaxIterationsReached,
}

/// Summary of one outer solve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub status: AltMinStatus,
    pub iterations: usize,
    /// `max |ΔV|` of the last iteration
    pub delta_v: f64,
    pub elastic_energy: f64,
    pub surface_energy: f64,
    pub pressure_work: f64,
    pub insitu_work: f64,
    /// `Elastic − InsituWork − PressureWork`
    pub total_energy: f64,
    pub crack_volume: f64,
    pub v_min: f64,
    pub v_max: f64,
    /// Newton updates summed over all U-steps
    pub newton_iterations: usize,
}

/// Iteration counts of one outer solve.
#[derive(Debug, Clone, Copy)]
struct Progress {
    status: AltMinStatus,
    iterations: usize,
    newton_iterations: usize,
    delta_v: f64,
}

impl Diagnostics {
    fn new(progress: Progress, energies: &Energies, fields: &Fields) -> Self {
        Self {
            status: progress.status,
            iterations: progress.iterations,
            delta_v: progress.delta_v,
            elastic_energy: energies.elastic,
            surface_energy: energies.surface,
            pressure_work: energies.pressure_work,
            insitu_work: energies.insitu_work,
            total_energy: energies.total(),
            crack_volume: energies.crack_volume,
            v_min: fields.v.min(),
            v_max: fields.v.max(),
            newton_iterations: progress.newton_iterations,
        }
    }
}

/// Outer fixed-point solver.
pub struct AlternateMinimization<'m> {
    assembler: GlobalAssembler<'m>,
    backend: Box<dyn LinearSolver>,
    settings: SolverSettings,
}

impl<'m> AlternateMinimization<'m> {
    pub fn new(model: &'m Model, settings: SolverSettings) -> Self {
        Self {
            assembler: GlobalAssembler::new(model),
            backend: build_backend(&settings.linear),
            settings,
        }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn assembler(&self) -> &GlobalAssembler<'m> {
        &self.assembler
    }

    fn u_solver(&self) -> DisplacementSolver<'_, 'm> {
        DisplacementSolver::new(&self.assembler, self.backend.as_ref(), self.settings.newton)
    }

    fn v_solver(&self) -> DamageSolver<'_, 'm> {
        DamageSolver::new(&self.assembler, self.backend.as_ref(), self.settings.damage)
    }

    /// Model and field checks shared by every entry point.
    fn check(&self, fields: &Fields) -> Result<()> {
        let model = self.assembler.model();
        model.validate()?;
        fields.check_topology(&model.grid)
    }

    /// Alternate U- and V-steps until `V` settles.
    pub fn run(&self, fields: &mut Fields) -> Result<Diagnostics> {
        self.check(fields)?;
        let cfg = self.settings.altmin;
        let u_solver = self.u_solver();
        let v_solver = self.v_solver();

        let mut iterations = 0;
        let mut newton_iterations = 0;
        let (status, delta_v) = loop {
            iterations += 1;
            newton_iterations += u_solver.solve(fields)?.num_iterations;
            let v_previous = fields.v.clone();
            v_solver.solve(fields)?;
            let delta_v = fields.v.max_abs_diff(&v_previous);
            info!("alt-min iteration {iterations}: max |dV| = {delta_v:.6e}");

            if delta_v <= cfg.tol {
                break (AltMinStatus::Converged, delta_v);
            }
            if iterations >= cfg.max_iterations {
                warn!(
                    "[ERROR] alternate minimization stopped after {iterations} iterations (max |dV| = {delta_v:.3e})"
                );
                break (AltMinStatus::MaxIterationsReached, delta_v);
            }
        };

        self.diagnostics(
            fields,
            Progress {
                status,
                iterations,
                newton_iterations,
                delta_v,
            },
        )
    }

    /// One V-step followed by one U-step, for a crack prescribed through
    /// `VIrrev`. The displacement is in equilibrium with the final `V`.
    pub fn fixed_crack_step(&self, fields: &mut Fields) -> Result<Diagnostics> {
        self.check(fields)?;
        let v_previous = fields.v.clone();
        self.v_solver().solve(fields)?;
        let delta_v = fields.v.max_abs_diff(&v_previous);
        let results = self.u_solver().solve(fields)?;
        self.diagnostics(
            fields,
            Progress {
                status: AltMinStatus::Converged,
                iterations: 1,
                newton_iterations: results.num_iterations,
                delta_v,
            },
        )
    }

    /// Multi-step loading. Before step `s`, `load(s, fields)` updates the
    /// loads (prescribed displacement, pressure, temperature); after the step
    /// converges `VIrrev` is committed.
    pub fn run_time_steps<F>(
        &self,
        fields: &mut Fields,
        steps: usize,
        mut load: F,
    ) -> Result<Vec<Diagnostics>>
    where
        F: FnMut(usize, &mut Fields) -> Result<()>,
    {
        self.check(fields)?;
        let mut history = Vec::with_capacity(steps);
        for step in 0..steps {
            load(step, fields)?;
            let diagnostics = self.run(fields)?;
            IrreversibilityManager::commit(&mut fields.v_irrev, &fields.v)?;
            info!(
                "step {step}: elastic {:.6e}, surface {:.6e}, total {:.6e}",
                diagnostics.elastic_energy, diagnostics.surface_energy, diagnostics.total_energy
            );
            history.push(diagnostics);
        }
        Ok(history)
    }

    fn diagnostics(&self, fields: &Fields, progress: Progress) -> Result<Diagnostics> {
        let energies = self.assembler.energies(fields)?;
        let diagnostics = Diagnostics::new(progress, &energies, fields);
        info!(
            "surface energy {:.6e}, elastic energy {:.6e}, pressure work {:.6e}, insitu work {:.6e}, total {:.6e}, crack volume {:.6e}",
            diagnostics.surface_energy,
            diagnostics.elastic_energy,
            diagnostics.pressure_work,
            diagnostics.insitu_work,
            diagnostics.total_energy,
            diagnostics.crack_volume
        );
        Ok(diagnostics)
    }
}
