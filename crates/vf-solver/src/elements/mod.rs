//! Element kernel library for axis-aligned trilinear hexahedra.
//!
//! Local node `l = (k * 2 + j) * 2 + i` sits at unit coordinates `(i, j, k)`;
//! quadrature is 2×2×2 Gauss–Legendre with points `(1 ± 1/√3) / 2` and equal
//! weights `hx * hy * hz / 8`. Vector fields use local dof `3 * l + c`.
//!
//! Kernels are pure: they take gathered nodal samples and write into caller
//! buffers. Nothing here touches global state.

pub mod damage;
pub mod mechanics;

use crate::boundary_conditions::Face;

pub use damage::{
    surface_energy, v_bilinear_form, v_crack_pressure_source, v_surface_source,
};
pub use mechanics::{
    crack_pressure_force, crack_volume, elastic_energy, elastic_energy_density, face_traction,
    insitu_force, insitu_work, pressure_work, strain, thermo_poro_force, u_bilinear_form,
    Degradation, ElementState, EnergyDensity,
};

/// Corner nodes of a hexahedron.
pub const NODES: usize = 8;
/// Quadrature points of the 2×2×2 rule.
pub const QUAD_POINTS: usize = 8;
/// Displacement dofs of one element.
pub const U_DOFS: usize = 3 * NODES;

const GAUSS_1D: [f64; 2] = [
    0.5 - 0.288_675_134_594_812_9,
    0.5 + 0.288_675_134_594_812_9,
];

/// Shape data of one cell, rebuilt for every visited cell.
#[derive(Debug, Clone)]
pub struct HexElement {
    /// Cell size `(hx, hy, hz)`
    pub h: [f64; 3],
    /// `phi[g][l]`
    pub phi: [[f64; NODES]; QUAD_POINTS],
    /// `dphi[g][l][a]` = ∂φ_l/∂x_a at point g
    pub dphi: [[[f64; 3]; NODES]; QUAD_POINTS],
    pub weight: [f64; QUAD_POINTS],
    /// Quadrature points in unit cell coordinates
    pub points: [[f64; 3]; QUAD_POINTS],
}

/// 1D linear shape function of local node `n ∈ {0, 1}` at `t ∈ [0, 1]`.
#[inline]
fn lin(n: usize, t: f64) -> f64 {
    if n == 0 { 1.0 - t } else { t }
}

#[inline]
fn dlin(n: usize) -> f64 {
    if n == 0 { -1.0 } else { 1.0 }
}

impl HexElement {
    pub fn new(h: [f64; 3]) -> Self {
        let mut phi = [[0.0; NODES]; QUAD_POINTS];
        let mut dphi = [[[0.0; 3]; NODES]; QUAD_POINTS];
        let mut points = [[0.0; 3]; QUAD_POINTS];
        let w = h[0] * h[1] * h[2] / QUAD_POINTS as f64;

        for gk in 0..2 {
            for gj in 0..2 {
                for gi in 0..2 {
                    let g = (gk * 2 + gj) * 2 + gi;
                    let p = [GAUSS_1D[gi], GAUSS_1D[gj], GAUSS_1D[gk]];
                    points[g] = p;
                    for l in 0..NODES {
                        let n = [l & 1, (l >> 1) & 1, l >> 2];
                        let s = [lin(n[0], p[0]), lin(n[1], p[1]), lin(n[2], p[2])];
                        phi[g][l] = s[0] * s[1] * s[2];
                        dphi[g][l] = [
                            dlin(n[0]) / h[0] * s[1] * s[2],
                            s[0] * dlin(n[1]) / h[1] * s[2],
                            s[0] * s[1] * dlin(n[2]) / h[2],
                        ];
                    }
                }
            }
        }

        Self {
            h,
            phi,
            dphi,
            weight: [w; QUAD_POINTS],
            points,
        }
    }

    pub fn volume(&self) -> f64 {
        self.h[0] * self.h[1] * self.h[2]
    }

    /// Value of a scalar nodal field at point `g`.
    #[inline]
    pub fn interpolate(&self, g: usize, values: &[f64; NODES]) -> f64 {
        (0..NODES).map(|l| self.phi[g][l] * values[l]).sum()
    }

    /// Gradient of a scalar nodal field at point `g`.
    #[inline]
    pub fn gradient(&self, g: usize, values: &[f64; NODES]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for l in 0..NODES {
            for (a, slot) in out.iter_mut().enumerate() {
                *slot += self.dphi[g][l][a] * values[l];
            }
        }
        out
    }

    /// Value of a vector nodal field at point `g`.
    #[inline]
    pub fn interpolate_vector(&self, g: usize, values: &[[f64; 3]; NODES]) -> [f64; 3] {
        let mut out = [0.0; 3];
        for l in 0..NODES {
            for (c, slot) in out.iter_mut().enumerate() {
                *slot += self.phi[g][l] * values[l][c];
            }
        }
        out
    }

    /// `grad[c][a]` = ∂u_c/∂x_a at point `g`.
    #[inline]
    pub fn vector_gradient(&self, g: usize, values: &[[f64; 3]; NODES]) -> [[f64; 3]; 3] {
        let mut out = [[0.0; 3]; 3];
        for l in 0..NODES {
            for (c, row) in out.iter_mut().enumerate() {
                for (a, slot) in row.iter_mut().enumerate() {
                    *slot += values[l][c] * self.dphi[g][l][a];
                }
            }
        }
        out
    }

    /// 2×2 quadrature on one face of the cell.
    pub fn face_quadrature(&self, face: Face) -> FaceQuadrature {
        let axis = face.axis();
        let fixed = if face.is_high() { 1.0 } else { 0.0 };
        let (a1, a2) = match axis {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };
        let area = self.h[a1] * self.h[a2];

        let mut points = [[0.0; 3]; 4];
        let mut phi = [[0.0; NODES]; 4];
        for q2 in 0..2 {
            for q1 in 0..2 {
                let q = q2 * 2 + q1;
                let mut p = [0.0; 3];
                p[axis] = fixed;
                p[a1] = GAUSS_1D[q1];
                p[a2] = GAUSS_1D[q2];
                points[q] = p;
                for l in 0..NODES {
                    let n = [l & 1, (l >> 1) & 1, l >> 2];
                    phi[q][l] = lin(n[0], p[0]) * lin(n[1], p[1]) * lin(n[2], p[2]);
                }
            }
        }

        FaceQuadrature {
            face,
            points,
            phi,
            weight: [area / 4.0; 4],
        }
    }
}

/// Quadrature rule on one face of a [`HexElement`].
#[derive(Debug, Clone)]
pub struct FaceQuadrature {
    pub face: Face,
    /// Points in unit cell coordinates
    pub points: [[f64; 3]; 4],
    /// `phi[q][l]`; vanishes for nodes off the face
    pub phi: [[f64; NODES]; 4],
    pub weight: [f64; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_functions_partition_of_unity() {
        let e = HexElement::new([0.3, 0.5, 2.0]);
        for g in 0..QUAD_POINTS {
            let sum: f64 = e.phi[g].iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "sum of phi = {sum} at point {g}");
            for a in 0..3 {
                let dsum: f64 = (0..NODES).map(|l| e.dphi[g][l][a]).sum();
                assert!(dsum.abs() < 1e-12, "sum of dphi[{a}] = {dsum} at point {g}");
            }
        }
    }

    #[test]
    fn weights_integrate_volume() {
        let e = HexElement::new([0.3, 0.5, 2.0]);
        let vol: f64 = e.weight.iter().sum();
        assert!((vol - 0.3).abs() < 1e-12);
    }

    #[test]
    fn gradient_of_linear_field_is_exact() {
        let h = [0.5, 2.0, 0.25];
        let e = HexElement::new(h);
        // f = 1 + 2x - y + 3z sampled at the corners
        let mut f = [0.0; NODES];
        for l in 0..NODES {
            let x = (l & 1) as f64 * h[0];
            let y = ((l >> 1) & 1) as f64 * h[1];
            let z = (l >> 2) as f64 * h[2];
            f[l] = 1.0 + 2.0 * x - y + 3.0 * z;
        }
        for g in 0..QUAD_POINTS {
            let grad = e.gradient(g, &f);
            assert!((grad[0] - 2.0).abs() < 1e-12);
            assert!((grad[1] + 1.0).abs() < 1e-12);
            assert!((grad[2] - 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn face_quadrature_integrates_area() {
        let e = HexElement::new([0.5, 2.0, 0.25]);
        let fq = e.face_quadrature(Face::Y1);
        let area: f64 = fq.weight.iter().sum();
        assert!((area - 0.125).abs() < 1e-12);
        for q in 0..4 {
            let sum: f64 = fq.phi[q].iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);
            // nodes with j = 0 are off the Y1 face
            for l in 0..NODES {
                if (l >> 1) & 1 == 0 {
                    assert!(fq.phi[q][l].abs() < 1e-15);
                }
            }
        }
    }
}
