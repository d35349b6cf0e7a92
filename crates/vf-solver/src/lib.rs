//! Variational phase-field fracture on structured hexahedral grids.
//!
//! The coupled problem for a displacement field `U` and a damage field `V`
//! (1 intact, 0 cracked) is solved by alternate minimization:
//!
//! * [`displacement`]: Newton on the U problem for a fixed `V`;
//! * [`damage`]: bound-constrained linear solve of the V problem for a fixed
//!   `U`, with cracks held by [`irreversibility`];
//! * [`driver`]: the outer loop, energy diagnostics and multi-step loading.
//!
//! Assembly runs in parallel over `z` slabs of the grid ([`grid::Partition`])
//! and produces `nalgebra-sparse` CSR operators solved by one of the
//! [`backend`] linear solvers. Cases are described in TOML ([`config`]).

pub mod backend;
pub mod boundary_conditions;
pub mod config;
pub mod damage;
pub mod displacement;
pub mod driver;
pub mod elements;
pub mod error;
pub mod fields;
pub mod grid;
pub mod irreversibility;
pub mod materials;
pub mod model;
pub mod nonlinear_solver;
pub mod properties;
pub mod scenarios;
pub mod sparse_assembly;

pub use backend::{
    build_backend, default_backend, BackendError, ConjugateGradient, LinearConfig, LinearSolver,
    LinearSolverKind, LinearSystemData, NativeBackend, SolveInfo, SparseCholeskyBackend,
};
pub use boundary_conditions::{
    BcMarker, ComponentBc, Constraints, DirichletMode, Edge, Face, Feature, FieldBc, Vertex,
};
pub use config::{RunMode, SimulationConfig};
pub use damage::{DamageConfig, DamageResults, DamageSolver};
pub use displacement::DisplacementSolver;
pub use driver::{AltMinConfig, AltMinStatus, AlternateMinimization, Diagnostics, SolverSettings};
pub use error::{Result, VfError};
pub use fields::{Fields, NodalField};
pub use grid::{GhostedBlock, Grid, Partition, Subdomain};
pub use irreversibility::IrreversibilityManager;
pub use materials::{Material, MaterialLibrary};
pub use model::Model;
pub use nonlinear_solver::{
    ConvergenceStatus, NonlinearConfig, NonlinearProblem, NonlinearResults, NonlinearSolver,
};
pub use properties::{AtModel, Coupling, Unilateral, VfProp, VoigtStress};
pub use scenarios::{insitu_column, sneddon_volume, PennyCrack, PennyOutcome};
pub use sparse_assembly::{Energies, GlobalAssembler, SparseGlobalSystem};
