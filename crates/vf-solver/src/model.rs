//! Immutable description of one fracture problem.
//!
//! A [`Model`] bundles everything the assembler and the sub-solvers read but
//! never modify: the grid and its partition, the layered materials, the
//! regularization properties, the unilateral policy, the coupling terms and
//! the boundary markers of `U` and `V`. Field state lives separately in
//! [`crate::fields::Fields`].

use crate::boundary_conditions::{ComponentBc, FieldBc};
use crate::error::{Result, VfError};
use crate::grid::{Grid, Partition};
use crate::materials::{Material, MaterialLibrary};
use crate::properties::{Coupling, Unilateral, VfProp};

#[derive(Debug, Clone)]
pub struct Model {
    pub grid: Grid,
    pub partition: Partition,
    pub materials: MaterialLibrary,
    pub vfprop: VfProp,
    pub policy: Unilateral,
    pub coupling: Coupling,
    /// Markers of the three displacement components
    pub bc_u: FieldBc,
    /// Markers of the damage field
    pub bc_v: FieldBc,
}

impl Model {
    /// Homogeneous model with default properties, free boundaries and a
    /// partition sized for the current rayon pool.
    pub fn new(grid: Grid, material: Material) -> Self {
        let cell_layers = grid.cell_dims()[2];
        Self {
            partition: Partition::for_current_pool(&grid),
            materials: MaterialLibrary::homogeneous(material, cell_layers),
            vfprop: VfProp::default(),
            policy: Unilateral::default(),
            coupling: Coupling::default(),
            bc_u: FieldBc::displacement(
                ComponentBc::default(),
                ComponentBc::default(),
                ComponentBc::default(),
            ),
            bc_v: FieldBc::scalar(ComponentBc::default()),
            grid,
        }
    }

    pub fn with_materials(mut self, materials: MaterialLibrary) -> Self {
        self.materials = materials;
        self
    }

    pub fn with_vfprop(mut self, vfprop: VfProp) -> Self {
        self.vfprop = vfprop;
        self
    }

    pub fn with_policy(mut self, policy: Unilateral) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_coupling(mut self, coupling: Coupling) -> Self {
        self.coupling = coupling;
        self
    }

    pub fn with_bc_u(mut self, bc_u: FieldBc) -> Self {
        self.bc_u = bc_u;
        self
    }

    pub fn with_bc_v(mut self, bc_v: FieldBc) -> Self {
        self.bc_v = bc_v;
        self
    }

    /// Repartition into `parts` slabs along `z`.
    pub fn with_partitions(mut self, parts: usize) -> Self {
        self.partition = Partition::new(&self.grid, parts);
        self
    }

    /// Cross-check the parts against each other.
    pub fn validate(&self) -> Result<()> {
        self.vfprop.validate()?;
        for material in self.materials.materials() {
            material.validate()?;
        }
        let cell_layers = self.grid.cell_dims()[2];
        if self.materials.cell_layers() != cell_layers {
            return Err(VfError::Config(format!(
                "material layering covers {} cell layers, grid has {cell_layers}",
                self.materials.cell_layers()
            )));
        }
        if self.bc_u.ncomp() != 3 {
            return Err(VfError::Config(format!(
                "displacement markers need 3 components, got {}",
                self.bc_u.ncomp()
            )));
        }
        if self.bc_v.ncomp() != 1 {
            return Err(VfError::Config(format!(
                "damage markers need 1 component, got {}",
                self.bc_v.ncomp()
            )));
        }
        Ok(())
    }
}
