//! Irreversibility of the damage field.
//!
//! Nodes whose committed damage `VIrrev` has fallen to `irrev_tol` or below
//! are cracked for good: every V-step pins them to zero. The constraint set
//! is rebuilt from `VIrrev` on each call. Once an outer step is accepted,
//! [`IrreversibilityManager::commit`] lowers `VIrrev` to the converged `V`.

use tracing::debug;

use crate::boundary_conditions::Constraints;
use crate::error::{Result, VfError};
use crate::fields::NodalField;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrreversibilityManager {
    irrev_tol: f64,
}

impl IrreversibilityManager {
    pub fn new(irrev_tol: f64) -> Self {
        Self { irrev_tol }
    }

    pub fn tolerance(&self) -> f64 {
        self.irrev_tol
    }

    /// Nodes with `VIrrev ≤ irrev_tol`, ascending.
    pub fn cracked_nodes(&self, v_irrev: &NodalField) -> Vec<usize> {
        let values = v_irrev.as_slice();
        let count = values.iter().filter(|&&w| w <= self.irrev_tol).count();
        let mut nodes = Vec::with_capacity(count);
        nodes.extend(
            values
                .iter()
                .enumerate()
                .filter(|&(_, &w)| w <= self.irrev_tol)
                .map(|(node, _)| node),
        );
        nodes
    }

    /// Pin every cracked node of `v` to zero, both in `constraints` and in
    /// `v` itself. Returns the number of pinned nodes.
    pub fn constrain(
        &self,
        v_irrev: &NodalField,
        v: &mut NodalField,
        constraints: &mut Constraints,
    ) -> Result<usize> {
        if v_irrev.len() != v.len() || constraints.len() != v.len() {
            return Err(VfError::Topology(format!(
                "VIrrev has {} entries, V {} and the V constraints {}",
                v_irrev.len(),
                v.len(),
                constraints.len()
            )));
        }
        let cracked = self.cracked_nodes(v_irrev);
        for &node in &cracked {
            v.set(node, 0, 0.0);
            constraints.fix(node, 0.0);
        }
        debug!("irreversibility: {} nodes pinned to V = 0", cracked.len());
        Ok(cracked.len())
    }

    /// `VIrrev ← min(VIrrev, V)`.
    pub fn commit(v_irrev: &mut NodalField, v: &NodalField) -> Result<()> {
        if v_irrev.len() != v.len() {
            return Err(VfError::Topology(format!(
                "cannot commit V of length {} into VIrrev of length {}",
                v.len(),
                v_irrev.len()
            )));
        }
        for (w, &value) in v_irrev
            .as_vector_mut()
            .iter_mut()
            .zip(v.as_slice())
        {
            *w = w.min(value);
        }
        Ok(())
    }
}
