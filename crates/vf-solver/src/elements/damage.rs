//! Damage kernels: AT1/AT2 surface energy, the V operator and its sources.
//!
//! For fixed `U` the regularized energy is quadratic in `V`:
//!
//! ```text
//! E(V) = ∫ s(V) W(U) + Gc / (4 c_v) ∫ (w(V) / ε + ε |∇V|²) − ∫ p ∇V · U
//! ```
//!
//! with `w(V) = (1 − V)` (AT1) or `(1 − V)²` (AT2). Its stationarity
//! condition gives the operator of [`v_bilinear_form`] and the right-hand
//! side of [`v_surface_source`] plus [`v_crack_pressure_source`].

use nalgebra::{SMatrix, SVector};

use super::mechanics::{elastic_energy_density, ElementState};
use super::{HexElement, NODES, QUAD_POINTS};
use crate::materials::Material;
use crate::properties::{AtModel, Unilateral};

/// V operator of one cell: surface term plus `2 W φ_i φ_j`, with `W` the
/// elastic energy density of the active split.
#[allow(clippy::too_many_arguments)]
pub fn v_bilinear_form(
    e: &HexElement,
    state: &ElementState,
    material: &Material,
    at: AtModel,
    epsilon: f64,
    policy: Unilateral,
    threshold: f64,
    out: &mut SMatrix<f64, NODES, NODES>,
) {
    out.fill(0.0);
    let coef = material.gc / at.cv() * 0.5;
    for g in 0..QUAD_POINTS {
        let w = e.weight[g];
        let density = elastic_energy_density(e, g, state, material, policy, threshold).total();
        let phi = &e.phi[g];
        let dphi = &e.dphi[g];
        for l1 in 0..NODES {
            for l2 in 0..NODES {
                let dot = dphi[l1][0] * dphi[l2][0]
                    + dphi[l1][1] * dphi[l2][1]
                    + dphi[l1][2] * dphi[l2][2];
                let surface = match at {
                    AtModel::At1 => coef * dot * epsilon,
                    AtModel::At2 => coef * (phi[l1] * phi[l2] / epsilon + dot * epsilon),
                };
                out[(l1, l2)] += w * (surface + 2.0 * density * phi[l1] * phi[l2]);
            }
        }
    }
}

/// Surface energy source, added to `out`.
pub fn v_surface_source(
    e: &HexElement,
    material: &Material,
    at: AtModel,
    epsilon: f64,
    out: &mut SVector<f64, NODES>,
) {
    let factor = match at {
        AtModel::At1 => 0.25,
        AtModel::At2 => 0.5,
    };
    let coef = material.gc / at.cv() / epsilon * factor;
    for g in 0..QUAD_POINTS {
        for l in 0..NODES {
            out[l] += e.weight[g] * coef * e.phi[g][l];
        }
    }
}

/// Crack pressure source `∫ p U · ∇φ`, added to `out`.
pub fn v_crack_pressure_source(e: &HexElement, state: &ElementState, out: &mut SVector<f64, NODES>) {
    for g in 0..QUAD_POINTS {
        let p = e.interpolate(g, &state.pressure);
        if p == 0.0 {
            continue;
        }
        let u = e.interpolate_vector(g, &state.u);
        for l in 0..NODES {
            let d = &e.dphi[g][l];
            out[l] += e.weight[g] * p * (u[0] * d[0] + u[1] * d[1] + u[2] * d[2]);
        }
    }
}

/// Regularized surface energy of one cell.
pub fn surface_energy(
    e: &HexElement,
    v: &[f64; NODES],
    material: &Material,
    at: AtModel,
    epsilon: f64,
) -> f64 {
    let coef = material.gc / at.cv() * 0.25;
    let mut energy = 0.0;
    for g in 0..QUAD_POINTS {
        let vg = e.interpolate(g, v);
        let grad = e.gradient(g, v);
        let grad2 = grad[0] * grad[0] + grad[1] * grad[1] + grad[2] * grad[2];
        let damage = match at {
            AtModel::At1 => 1.0 - vg,
            AtModel::At2 => (1.0 - vg) * (1.0 - vg),
        };
        energy += e.weight[g] * coef * (damage / epsilon + grad2 * epsilon);
    }
    energy
}
