//! Reference problems with closed-form answers.
//!
//! * [`PennyCrack`]: a pressurized penny-shaped crack prescribed through
//!   `VIrrev` in a clamped cube, compared against Sneddon's opening volume
//!   `16 (1 − ν²) p a³ / (3 E)`.
//! * [`insitu_column`]: a column loaded by a uniform in-situ stress on its
//!   free faces, where the equilibrium elastic energy is half the traction
//!   work.

use std::f64::consts::PI;

use serde::Serialize;
use tracing::info;

use crate::boundary_conditions::{BcMarker, ComponentBc, Face, FieldBc};
use crate::driver::{AlternateMinimization, Diagnostics, SolverSettings};
use crate::error::{Result, VfError};
use crate::fields::Fields;
use crate::grid::Grid;
use crate::materials::Material;
use crate::model::Model;
use crate::properties::{Coupling, Unilateral, VfProp};

/// Zero `V` and `VIrrev` on a horizontal disk of `radius` around `center`.
///
/// The crack occupies the two node layers that bracket `center[2]`: the first
/// layer at or above it and the one below. Returns the number of nodes
/// cracked.
pub fn seed_penny_crack(grid: &Grid, fields: &mut Fields, center: [f64; 3], radius: f64) -> usize {
    let z = grid.coords(2);
    let upper = z
        .iter()
        .position(|&zk| zk >= center[2])
        .unwrap_or(z.len() - 1)
        .max(1);
    let r2 = radius * radius;
    let mut cracked = 0;
    for k in [upper - 1, upper] {
        for j in 0..grid.ny() {
            for i in 0..grid.nx() {
                let p = grid.node_position(i, j, k);
                let d2 = (p[0] - center[0]).powi(2) + (p[1] - center[1]).powi(2);
                if d2 <= r2 {
                    let node = grid.node_index(i, j, k);
                    fields.v.set(node, 0, 0.0);
                    fields.v_irrev.set(node, 0, 0.0);
                    cracked += 1;
                }
            }
        }
    }
    cracked
}

/// Opening volume of a penny crack of radius `a` under pressure `p` in an
/// infinite medium.
pub fn sneddon_volume(material: &Material, pressure: f64, radius: f64) -> f64 {
    let nu = material.poisson_ratio();
    16.0 * (1.0 - nu * nu) * pressure * radius.powi(3) / (3.0 * material.young_modulus())
}

/// Pressurized penny crack in the unit cube.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PennyCrack {
    /// Nodes per axis
    pub n: usize,
    pub radius: f64,
    pub pressure: f64,
}

impl Default for PennyCrack {
    fn default() -> Self {
        Self {
            n: 11,
            radius: 0.25,
            pressure: 1e-3,
        }
    }
}

/// Result of [`PennyCrack::run`].
#[derive(Debug, Clone, Serialize)]
pub struct PennyOutcome {
    pub diagnostics: Diagnostics,
    pub cracked_nodes: usize,
    pub sneddon_volume: f64,
    /// `Gc π a²`
    pub nominal_surface_energy: f64,
}

impl PennyOutcome {
    pub fn volume_ratio(&self) -> f64 {
        self.diagnostics.crack_volume / self.sneddon_volume
    }

    pub fn surface_ratio(&self) -> f64 {
        self.diagnostics.surface_energy / self.nominal_surface_energy
    }
}

impl PennyCrack {
    pub fn new(n: usize, radius: f64, pressure: f64) -> Self {
        Self {
            n,
            radius,
            pressure,
        }
    }

    pub const CENTER: [f64; 3] = [0.5, 0.5, 0.5];

    pub fn material(&self) -> Material {
        Material::from_young_poisson("matrix", 1.0, 0.2, 1.0)
    }

    pub fn model(&self) -> Result<Model> {
        if self.n < 4 {
            return Err(VfError::Config(format!(
                "penny crack needs at least 4 nodes per axis, got {}",
                self.n
            )));
        }
        if !(self.radius > 0.0 && self.radius < 0.5) {
            return Err(VfError::Config(format!(
                "penny crack radius must lie in (0, 0.5), got {}",
                self.radius
            )));
        }
        let grid = Grid::uniform([self.n; 3], [1.0; 3])?;
        let h = 1.0 / (self.n - 1) as f64;
        let clamped = ComponentBc::faces(BcMarker::Zero);
        let model = Model::new(grid, self.material())
            .with_vfprop(VfProp {
                epsilon: 2.0 * h,
                eta: 1e-3,
                ..VfProp::default()
            })
            .with_policy(Unilateral::None)
            .with_coupling(Coupling {
                has_crack_pressure: true,
                ..Coupling::default()
            })
            .with_bc_u(FieldBc::displacement(clamped, clamped, clamped));
        model.validate()?;
        Ok(model)
    }

    /// Intact fields with the crack seeded and the pressure applied.
    pub fn fields(&self, model: &Model) -> (Fields, usize) {
        let mut fields = Fields::new(&model.grid);
        fields.pressure.fill(self.pressure);
        let cracked = seed_penny_crack(&model.grid, &mut fields, Self::CENTER, self.radius);
        (fields, cracked)
    }

    /// One V-step then one U-step with the default solver settings.
    ///
    /// The damage step runs first so that the reported displacement, crack
    /// volume and energies are in equilibrium with the final `V`. With the
    /// crack held by `VIrrev` and `U = 0` the V-step only relaxes the
    /// diffuse band around the seeded disk.
    pub fn run(&self) -> Result<PennyOutcome> {
        self.run_with(SolverSettings::default())
    }

    pub fn run_with(&self, settings: SolverSettings) -> Result<PennyOutcome> {
        let model = self.model()?;
        let (mut fields, cracked_nodes) = self.fields(&model);
        info!(
            "penny crack: {} nodes per axis, radius {}, pressure {}, {cracked_nodes} cracked nodes",
            self.n, self.radius, self.pressure
        );
        let solver = AlternateMinimization::new(&model, settings);
        let diagnostics = solver.fixed_crack_step(&mut fields)?;
        let gc = self.material().gc;
        Ok(PennyOutcome {
            diagnostics,
            cracked_nodes,
            sneddon_volume: sneddon_volume(&self.material(), self.pressure, self.radius),
            nominal_surface_energy: gc * PI * self.radius * self.radius,
        })
    }
}

/// Unit column with roller supports on `X0`, `Y0` and `Z0` and a uniform
/// vertical in-situ stress `s33` acting on the other faces.
pub fn insitu_column(n: usize, s33: f64) -> Result<Model> {
    let grid = Grid::uniform([n; 3], [1.0; 3])?;
    let x = ComponentBc::default().with_face(Face::X0, BcMarker::Zero);
    let y = ComponentBc::default().with_face(Face::Y0, BcMarker::Zero);
    let z = ComponentBc::default().with_face(Face::Z0, BcMarker::Zero);
    let stress = [0.0, 0.0, s33, 0.0, 0.0, 0.0];
    let model = Model::new(grid, Material::from_young_poisson("rock", 1.0, 0.25, 1.0))
        .with_coupling(Coupling {
            has_insitu: true,
            insitu_min: stress,
            insitu_max: stress,
            ..Coupling::default()
        })
        .with_bc_u(FieldBc::displacement(x, y, z));
    model.validate()?;
    Ok(model)
}
