//! Layered material properties.
//!
//! Every cell takes its material from the layer assigned to its `z` index,
//! which is how stratified geological models are described.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VfError};

/// Isotropic linear elastic material with thermo-poro coupling and toughness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Material name
    #[serde(default)]
    pub name: String,
    /// First Lamé parameter (λ)
    pub lambda: f64,
    /// Shear modulus (μ)
    pub mu: f64,
    /// Linear thermal expansion coefficient (α)
    #[serde(default)]
    pub alpha: f64,
    /// Biot coefficient (β)
    #[serde(default)]
    pub beta: f64,
    /// Fracture toughness (Gc)
    pub gc: f64,
}

impl Material {
    /// Build from Young's modulus and Poisson's ratio.
    pub fn from_young_poisson(name: &str, e: f64, nu: f64, gc: f64) -> Self {
        Self {
            name: name.to_string(),
            lambda: e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu)),
            mu: e / (2.0 * (1.0 + nu)),
            alpha: 0.0,
            beta: 0.0,
            gc,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    /// Bulk modulus K = λ + 2μ/3
    pub fn bulk_modulus(&self) -> f64 {
        self.lambda + 2.0 * self.mu / 3.0
    }

    /// 3K = 3λ + 2μ, the thermal coupling prefactor
    pub fn three_kappa(&self) -> f64 {
        3.0 * self.lambda + 2.0 * self.mu
    }

    pub fn young_modulus(&self) -> f64 {
        self.mu * (3.0 * self.lambda + 2.0 * self.mu) / (self.lambda + self.mu)
    }

    pub fn poisson_ratio(&self) -> f64 {
        self.lambda / (2.0 * (self.lambda + self.mu))
    }

    /// Reject materials whose elastic energy is not positive definite.
    pub fn validate(&self) -> Result<()> {
        let finite = [self.lambda, self.mu, self.alpha, self.beta, self.gc]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(VfError::Config(format!(
                "material '{}' has non-finite properties",
                self.name
            )));
        }
        if self.mu <= 0.0 || self.three_kappa() <= 0.0 {
            return Err(VfError::Config(format!(
                "material '{}' is not positive definite (lambda = {}, mu = {})",
                self.name, self.lambda, self.mu
            )));
        }
        if self.gc < 0.0 {
            return Err(VfError::Config(format!(
                "material '{}' has negative toughness {}",
                self.name, self.gc
            )));
        }
        Ok(())
    }
}

/// Materials indexed by layer, plus the layer assigned to each cell layer
/// along `z`.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialLibrary {
    materials: Vec<Material>,
    layer_of_cell: Vec<usize>,
}

impl MaterialLibrary {
    /// A single material for every cell layer.
    pub fn homogeneous(material: Material, cell_layers: usize) -> Self {
        Self {
            materials: vec![material],
            layer_of_cell: vec![0; cell_layers],
        }
    }

    /// Explicit layering; `layer_of_cell[ek]` indexes `materials`.
    pub fn layered(materials: Vec<Material>, layer_of_cell: Vec<usize>) -> Result<Self> {
        if materials.is_empty() {
            return Err(VfError::Config("no materials defined".into()));
        }
        for material in &materials {
            material.validate()?;
        }
        if let Some((ek, &layer)) = layer_of_cell
            .iter()
            .enumerate()
            .find(|&(_, &layer)| layer >= materials.len())
        {
            return Err(VfError::Config(format!(
                "cell layer {ek} refers to material {layer}, only {} defined",
                materials.len()
            )));
        }
        Ok(Self {
            materials,
            layer_of_cell,
        })
    }

    /// Material of cell layer `ek`; a configuration error when the layering
    /// does not reach `ek`.
    #[inline]
    pub fn for_cell_layer(&self, ek: usize) -> Result<&Material> {
        self.layer_of_cell
            .get(ek)
            .and_then(|&layer| self.materials.get(layer))
            .ok_or_else(|| {
                VfError::Config(format!(
                    "no material for cell layer {ek}, layering covers {} layers",
                    self.layer_of_cell.len()
                ))
            })
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn cell_layers(&self) -> usize {
        self.layer_of_cell.len()
    }
}
