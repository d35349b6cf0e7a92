//! Nodal fields and the mutable simulation state.

use nalgebra::DVector;

use crate::error::{Result, VfError};
use crate::grid::Grid;

/// `ncomp` reals per grid node, component-fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct NodalField {
    ncomp: usize,
    values: DVector<f64>,
}

impl NodalField {
    pub fn zeros(grid: &Grid, ncomp: usize) -> Self {
        Self::constant(grid, ncomp, 0.0)
    }

    pub fn constant(grid: &Grid, ncomp: usize, value: f64) -> Self {
        Self {
            ncomp,
            values: DVector::from_element(grid.num_nodes() * ncomp, value),
        }
    }

    /// Wrap an existing vector; its length must be a multiple of `ncomp`.
    pub fn from_vector(ncomp: usize, values: DVector<f64>) -> Result<Self> {
        if ncomp == 0 || values.len() % ncomp != 0 {
            return Err(VfError::Topology(format!(
                "vector of length {} cannot hold {ncomp} components per node",
                values.len()
            )));
        }
        Ok(Self { ncomp, values })
    }

    pub fn ncomp(&self) -> usize {
        self.ncomp
    }

    pub fn num_nodes(&self) -> usize {
        self.values.len() / self.ncomp
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn get(&self, node: usize, c: usize) -> f64 {
        self.values[node * self.ncomp + c]
    }

    #[inline]
    pub fn set(&mut self, node: usize, c: usize, value: f64) {
        self.values[node * self.ncomp + c] = value;
    }

    pub fn fill(&mut self, value: f64) {
        self.values.fill(value);
    }

    pub fn as_slice(&self) -> &[f64] {
        self.values.as_slice()
    }

    pub fn as_vector(&self) -> &DVector<f64> {
        &self.values
    }

    pub fn as_vector_mut(&mut self) -> &mut DVector<f64> {
        &mut self.values
    }

    pub fn min(&self) -> f64 {
        self.values.min()
    }

    pub fn max(&self) -> f64 {
        self.values.max()
    }

    /// `max |self - other|`.
    pub fn max_abs_diff(&self, other: &NodalField) -> f64 {
        self.values
            .iter()
            .zip(other.values.iter())
            .fold(0.0_f64, |acc, (a, b)| acc.max((a - b).abs()))
    }

    /// Error unless this field is laid out on `grid`.
    pub fn check_grid(&self, grid: &Grid) -> Result<()> {
        if self.values.len() != grid.num_nodes() * self.ncomp {
            return Err(VfError::Topology(format!(
                "field has {} entries, grid with {} nodes and {} components needs {}",
                self.values.len(),
                grid.num_nodes(),
                self.ncomp,
                grid.num_nodes() * self.ncomp
            )));
        }
        Ok(())
    }
}

/// Mutable field state of a fracture simulation.
///
/// `u`, `v` and `v_irrev` are owned by the solvers; `pressure`, `theta` and
/// their reference values are written by the flow and heat collaborators
/// between outer steps. `bc_u` holds the prescribed displacement read by
/// `FIXED` markers.
#[derive(Debug, Clone)]
pub struct Fields {
    pub u: NodalField,
    pub v: NodalField,
    pub v_irrev: NodalField,
    pub pressure: NodalField,
    pub pressure_ref: NodalField,
    pub theta: NodalField,
    pub theta_ref: NodalField,
    pub bc_u: NodalField,
}

impl Fields {
    /// Undamaged, unloaded state: `U = 0`, `V = VIrrev = 1`, zero pressure and
    /// temperature.
    pub fn new(grid: &Grid) -> Self {
        Self {
            u: NodalField::zeros(grid, 3),
            v: NodalField::constant(grid, 1, 1.0),
            v_irrev: NodalField::constant(grid, 1, 1.0),
            pressure: NodalField::zeros(grid, 1),
            pressure_ref: NodalField::zeros(grid, 1),
            theta: NodalField::zeros(grid, 1),
            theta_ref: NodalField::zeros(grid, 1),
            bc_u: NodalField::zeros(grid, 3),
        }
    }

    /// Verify every field against the grid and the expected component counts.
    pub fn check_topology(&self, grid: &Grid) -> Result<()> {
        let expected = [
            ("u", &self.u, 3),
            ("v", &self.v, 1),
            ("v_irrev", &self.v_irrev, 1),
            ("pressure", &self.pressure, 1),
            ("pressure_ref", &self.pressure_ref, 1),
            ("theta", &self.theta, 1),
            ("theta_ref", &self.theta_ref, 1),
            ("bc_u", &self.bc_u, 3),
        ];
        for (name, field, ncomp) in expected {
            if field.ncomp() != ncomp {
                return Err(VfError::Topology(format!(
                    "{name} has {} components, expected {ncomp}",
                    field.ncomp()
                )));
            }
            field
                .check_grid(grid)
                .map_err(|e| VfError::Topology(format!("{name}: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_intact() {
        let grid = Grid::uniform([3, 3, 3], [1.0, 1.0, 1.0]).unwrap();
        let fields = Fields::new(&grid);
        assert!(fields.check_topology(&grid).is_ok());
        assert_eq!(fields.u.len(), 81);
        assert_eq!(fields.v.min(), 1.0);
        assert_eq!(fields.v_irrev.max(), 1.0);
    }

    #[test]
    fn topology_mismatch_is_reported() {
        let grid = Grid::uniform([3, 3, 3], [1.0, 1.0, 1.0]).unwrap();
        let other = Grid::uniform([2, 3, 3], [1.0, 1.0, 1.0]).unwrap();
        let mut fields = Fields::new(&grid);
        fields.theta = NodalField::zeros(&other, 1);
        assert!(matches!(
            fields.check_topology(&grid),
            Err(VfError::Topology(_))
        ));
    }

    #[test]
    fn max_abs_diff_is_infinity_norm() {
        let grid = Grid::uniform([2, 2, 2], [1.0, 1.0, 1.0]).unwrap();
        let a = NodalField::constant(&grid, 1, 1.0);
        let mut b = a.clone();
        b.set(3, 0, 0.25);
        b.set(5, 0, 1.5);
        assert!((a.max_abs_diff(&b) - 0.75).abs() < 1e-15);
    }
}
