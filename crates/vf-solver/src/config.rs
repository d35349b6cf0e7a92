//! TOML case files.
//!
//! A case file maps onto [`SimulationConfig`]. Every section except `[grid]`
//! and `[[layers]]` is optional and falls back to the library defaults.
//!
//! ```toml
//! mode = "alt-min"            # or "fixed-crack"
//! layer_splits = [0.5]        # or layer_of_cell = [0, 0, 1, 1]
//!
//! [grid]
//! nx = 11
//! ny = 11
//! nz = 11
//! lx = 1.0                    # or x = [0.0, 0.1, ...]
//! partitions = 4
//!
//! [[layers]]
//! name = "shale"
//! youngs_modulus = 1.0        # or lambda / mu
//! poisson_ratio = 0.2
//! gc = 1.0
//!
//! [vfprop]
//! epsilon = 0.2
//! at = 2
//!
//! [policy]
//! unilateral = "no-compression"
//!
//! [bc.u.z]
//! Z0 = "ZERO"
//! Z1 = "FIXED"
//!
//! [loads]
//! displacement = [0.0, 0.0, 0.01]
//! steps = 4
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::LinearConfig;
use crate::boundary_conditions::{ComponentBc, FieldBc};
use crate::damage::DamageConfig;
use crate::driver::{AltMinConfig, AlternateMinimization, Diagnostics, SolverSettings};
use crate::error::{Result, VfError};
use crate::fields::Fields;
use crate::grid::{Grid, Partition};
use crate::materials::{Material, MaterialLibrary};
use crate::model::Model;
use crate::nonlinear_solver::NonlinearConfig;
use crate::properties::{Coupling, Unilateral, VfProp};
use crate::scenarios::seed_penny_crack;

/// How a case is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Alternate minimization over `loads.steps` increments
    #[default]
    AltMin,
    /// One V-step then one U-step around the prescribed cracks
    FixedCrack,
}

/// Whole case description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub mode: RunMode,
    /// Layer index of each cell layer along `z`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_of_cell: Option<Vec<usize>>,
    /// Heights where a new layer starts, ascending
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_splits: Option<Vec<f64>>,
    pub grid: GridConfig,
    pub layers: Vec<LayerConfig>,
    #[serde(default)]
    pub vfprop: VfProp,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub coupling: Coupling,
    #[serde(default)]
    pub altmin: AltMinConfig,
    #[serde(default)]
    pub newton: NonlinearConfig,
    #[serde(default)]
    pub damage: DamageConfig,
    #[serde(default)]
    pub linear: LinearConfig,
    #[serde(default)]
    pub bc: BcConfig,
    #[serde(default)]
    pub loads: LoadConfig,
    #[serde(default)]
    pub cracks: Vec<CrackConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nx: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ny: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nz: Option<usize>,
    #[serde(default = "unit_length")]
    pub lx: f64,
    #[serde(default = "unit_length")]
    pub ly: f64,
    #[serde(default = "unit_length")]
    pub lz: f64,
    /// Explicit node coordinates; override `nx`/`lx`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<Vec<f64>>,
    /// Number of `z` slabs; defaults to the rayon thread count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partitions: Option<usize>,
}

fn unit_length() -> f64 {
    1.0
}

impl GridConfig {
    /// `n` nodes per axis on `[0, length]`.
    pub fn uniform(n: [usize; 3], length: [f64; 3]) -> Self {
        Self {
            nx: Some(n[0]),
            ny: Some(n[1]),
            nz: Some(n[2]),
            lx: length[0],
            ly: length[1],
            lz: length[2],
            x: None,
            y: None,
            z: None,
            partitions: None,
        }
    }

    pub fn build(&self) -> Result<Grid> {
        Grid::new(
            axis("x", self.nx, self.lx, self.x.as_deref())?,
            axis("y", self.ny, self.ly, self.y.as_deref())?,
            axis("z", self.nz, self.lz, self.z.as_deref())?,
        )
    }
}

fn axis(name: &str, n: Option<usize>, length: f64, explicit: Option<&[f64]>) -> Result<Vec<f64>> {
    match (explicit, n) {
        (Some(coords), Some(n)) if coords.len() != n => Err(VfError::Config(format!(
            "grid.n{name} = {n} but grid.{name} lists {} coordinates",
            coords.len()
        ))),
        (Some(coords), _) => Ok(coords.to_vec()),
        (None, Some(n)) => {
            if n < 2 {
                return Err(VfError::Config(format!(
                    "grid.n{name} must be at least 2, got {n}"
                )));
            }
            if !(length > 0.0 && length.is_finite()) {
                return Err(VfError::Config(format!(
                    "grid.l{name} must be positive, got {length}"
                )));
            }
            Ok((0..n).map(|i| length * i as f64 / (n - 1) as f64).collect())
        }
        (None, None) => Err(VfError::Config(format!(
            "grid needs either n{name} or explicit {name} coordinates"
        ))),
    }
}

/// One material layer. Elastic constants are given either as
/// `youngs_modulus` + `poisson_ratio` or as `lambda` + `mu`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youngs_modulus: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poisson_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lambda: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mu: Option<f64>,
    #[serde(default)]
    pub alpha: f64,
    #[serde(default)]
    pub beta: f64,
    pub gc: f64,
}

impl LayerConfig {
    pub fn material(&self) -> Result<Material> {
        let material = match (self.youngs_modulus, self.poisson_ratio, self.lambda, self.mu) {
            (Some(e), Some(nu), None, None) => {
                Material::from_young_poisson(&self.name, e, nu, self.gc)
            }
            (None, None, Some(lambda), Some(mu)) => Material {
                name: self.name.clone(),
                lambda,
                mu,
                alpha: 0.0,
                beta: 0.0,
                gc: self.gc,
            },
            _ => {
                return Err(VfError::Config(format!(
                    "layer '{}' needs youngs_modulus and poisson_ratio, or lambda and mu",
                    self.name
                )));
            }
        }
        .with_alpha(self.alpha)
        .with_beta(self.beta);
        material.validate()?;
        Ok(material)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub unilateral: Unilateral,
}

/// Marker tables: `[bc.u.x]`, `[bc.u.y]`, `[bc.u.z]` and `[bc.v]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BcConfig {
    pub u: DisplacementBcConfig,
    pub v: ComponentBc,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplacementBcConfig {
    pub x: ComponentBc,
    pub y: ComponentBc,
    pub z: ComponentBc,
}

/// Loads at the end of the loading path. Step `s` of `steps` applies the
/// fraction `(s + 1) / steps` of `displacement`, `pressure` and `theta`;
/// the reference fields are not scaled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Value read by `FIXED` displacement markers, per component
    pub displacement: [f64; 3],
    pub pressure: f64,
    pub pressure_ref: f64,
    pub theta: f64,
    pub theta_ref: f64,
    pub steps: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            displacement: [0.0; 3],
            pressure: 0.0,
            pressure_ref: 0.0,
            theta: 0.0,
            theta_ref: 0.0,
            steps: 1,
        }
    }
}

impl LoadConfig {
    /// Write the loads scaled by `factor` into `fields`.
    pub fn apply(&self, fields: &mut Fields, factor: f64) {
        let nodes = fields.bc_u.num_nodes();
        for node in 0..nodes {
            for (c, &d) in self.displacement.iter().enumerate() {
                fields.bc_u.set(node, c, factor * d);
            }
        }
        fields.pressure.fill(factor * self.pressure);
        fields.pressure_ref.fill(self.pressure_ref);
        fields.theta.fill(factor * self.theta);
        fields.theta_ref.fill(self.theta_ref);
    }
}

/// Horizontal penny crack prescribed through `VIrrev`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrackConfig {
    pub center: [f64; 3],
    pub radius: f64,
}

impl SimulationConfig {
    /// Parse a case and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!("loaded case {}", path.display());
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| VfError::Config(e.to_string()))
    }

    /// Check everything that does not need a solve.
    pub fn validate(&self) -> Result<()> {
        self.build_model()?;
        if self.loads.steps == 0 {
            return Err(VfError::Config("loads.steps must be at least 1".into()));
        }
        if !(self.altmin.tol >= 0.0) || self.altmin.max_iterations == 0 {
            return Err(VfError::Config(format!(
                "altmin needs tol >= 0 and max_iterations >= 1, got {} and {}",
                self.altmin.tol, self.altmin.max_iterations
            )));
        }
        if let Some(crack) = self.cracks.iter().find(|c| !(c.radius > 0.0)) {
            return Err(VfError::Config(format!(
                "crack radius must be positive, got {}",
                crack.radius
            )));
        }
        Ok(())
    }

    /// Layer index of every cell layer.
    pub fn layering(&self, grid: &Grid) -> Result<Vec<usize>> {
        let cell_layers = grid.cell_dims()[2];
        match (&self.layer_of_cell, &self.layer_splits) {
            (Some(_), Some(_)) => Err(VfError::Config(
                "give either layer_of_cell or layer_splits, not both".into(),
            )),
            (Some(layer_of_cell), None) => {
                if layer_of_cell.len() != cell_layers {
                    return Err(VfError::Config(format!(
                        "layer_of_cell has {} entries, grid has {cell_layers} cell layers",
                        layer_of_cell.len()
                    )));
                }
                Ok(layer_of_cell.clone())
            }
            (None, Some(splits)) => {
                if splits.len() + 1 != self.layers.len() {
                    return Err(VfError::Config(format!(
                        "{} layer_splits need {} layers, got {}",
                        splits.len(),
                        splits.len() + 1,
                        self.layers.len()
                    )));
                }
                if splits.windows(2).any(|w| w[1] <= w[0]) {
                    return Err(VfError::Config("layer_splits must be increasing".into()));
                }
                let z = grid.coords(2);
                Ok((0..cell_layers)
                    .map(|ek| {
                        let center = 0.5 * (z[ek] + z[ek + 1]);
                        splits.iter().filter(|&&s| s <= center).count()
                    })
                    .collect())
            }
            (None, None) if self.layers.len() == 1 => Ok(vec![0; cell_layers]),
            (None, None) => Err(VfError::Config(format!(
                "{} layers defined without layer_of_cell or layer_splits",
                self.layers.len()
            ))),
        }
    }

    pub fn build_grid(&self) -> Result<Grid> {
        self.grid.build()
    }

    pub fn build_materials(&self, grid: &Grid) -> Result<MaterialLibrary> {
        let materials = self
            .layers
            .iter()
            .map(LayerConfig::material)
            .collect::<Result<Vec<_>>>()?;
        MaterialLibrary::layered(materials, self.layering(grid)?)
    }

    /// Assemble the immutable model of the case.
    pub fn build_model(&self) -> Result<Model> {
        let grid = self.build_grid()?;
        let materials = self.build_materials(&grid)?;
        let u = &self.bc.u;
        let mut model = Model::new(grid, materials.for_cell_layer(0)?.clone())
            .with_materials(materials)
            .with_vfprop(self.vfprop)
            .with_policy(self.policy.unilateral)
            .with_coupling(self.coupling)
            .with_bc_u(FieldBc::displacement(u.x, u.y, u.z))
            .with_bc_v(FieldBc::scalar(self.bc.v));
        if let Some(parts) = self.grid.partitions {
            model.partition = Partition::new(&model.grid, parts);
        }
        model.validate()?;
        Ok(model)
    }

    pub fn settings(&self) -> SolverSettings {
        SolverSettings {
            altmin: self.altmin,
            newton: self.newton,
            damage: self.damage,
            linear: self.linear.clone(),
        }
    }

    /// Intact fields with the cracks seeded and the full loads applied.
    pub fn initial_fields(&self, model: &Model) -> Fields {
        let mut fields = Fields::new(&model.grid);
        for crack in &self.cracks {
            let cracked = seed_penny_crack(&model.grid, &mut fields, crack.center, crack.radius);
            info!(
                "crack at {:?}, radius {}: {cracked} nodes",
                crack.center, crack.radius
            );
        }
        self.loads.apply(&mut fields, 1.0);
        fields
    }

    /// Build and solve the case. Returns one entry per load step.
    pub fn run(&self) -> Result<Vec<Diagnostics>> {
        let model = self.build_model()?;
        let mut fields = self.initial_fields(&model);
        let solver = AlternateMinimization::new(&model, self.settings());
        match self.mode {
            RunMode::FixedCrack => Ok(vec![solver.fixed_crack_step(&mut fields)?]),
            RunMode::AltMin => {
                let steps = self.loads.steps;
                solver.run_time_steps(&mut fields, steps, |step, fields| {
                    self.loads.apply(fields, (step + 1) as f64 / steps as f64);
                    Ok(())
                })
            }
        }
    }
}
