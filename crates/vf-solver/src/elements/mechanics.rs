//! Displacement kernels: strain, elastic energy, the U bilinear form and the
//! external force terms.
//!
//! The stiffness is degraded by `s(V) = V² + η`. Under the no-compression
//! split the volumetric part keeps the intact stiffness `K (1 + η)` wherever
//! `tr ε < threshold`, with the sign taken from the current displacement
//! iterate.

use nalgebra::{SMatrix, SVector};

use super::{FaceQuadrature, HexElement, NODES, QUAD_POINTS, U_DOFS};
use crate::boundary_conditions::Face;
use crate::materials::Material;
use crate::properties::{Unilateral, VoigtStress};

/// Nodal samples of one cell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElementState {
    pub u: [[f64; 3]; NODES],
    pub v: [f64; NODES],
    /// θ − θref
    pub dtheta: [f64; NODES],
    /// p − pref, drives the Biot term
    pub dpore: [f64; NODES],
    /// p, acts on crack faces
    pub pressure: [f64; NODES],
}

/// How the elastic energy is degraded by damage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Degradation {
    pub policy: Unilateral,
    pub threshold: f64,
    pub eta: f64,
}

/// Spherical and deviatoric parts of the elastic energy density.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnergyDensity {
    pub spherical: f64,
    pub deviatoric: f64,
}

impl EnergyDensity {
    pub fn total(&self) -> f64 {
        self.spherical + self.deviatoric
    }
}

/// Symmetric small strain at quadrature point `g`.
pub fn strain(e: &HexElement, g: usize, u: &[[f64; 3]; NODES]) -> [[f64; 3]; 3] {
    let grad = e.vector_gradient(g, u);
    let mut eps = [[0.0; 3]; 3];
    for a in 0..3 {
        for b in 0..3 {
            eps[a][b] = 0.5 * (grad[a][b] + grad[b][a]);
        }
    }
    eps
}

#[inline]
fn trace(eps: &[[f64; 3]; 3]) -> f64 {
    eps[0][0] + eps[1][1] + eps[2][2]
}

/// `dev ε : dev ε`; unaffected by an isotropic inelastic strain.
#[inline]
fn deviatoric_square(eps: &[[f64; 3]; 3]) -> f64 {
    let mean = trace(eps) / 3.0;
    let mut sum = 0.0;
    for a in 0..3 {
        for b in 0..3 {
            let d = if a == b { eps[a][b] - mean } else { eps[a][b] };
            sum += d * d;
        }
    }
    sum
}

/// Undegraded elastic energy density at point `g`, on the inelastic strain
/// `ε − α (θ − θref) I`.
///
/// With [`Unilateral::NoCompression`] the spherical part is dropped whenever
/// the total volumetric strain is below `threshold`.
pub fn elastic_energy_density(
    e: &HexElement,
    g: usize,
    state: &ElementState,
    material: &Material,
    policy: Unilateral,
    threshold: f64,
) -> EnergyDensity {
    let eps = strain(e, g, &state.u);
    let tr = trace(&eps);
    let tr_el = tr - 3.0 * material.alpha * e.interpolate(g, &state.dtheta);
    let spherical = 0.5 * material.bulk_modulus() * tr_el * tr_el;
    let deviatoric = material.mu * deviatoric_square(&eps);

    match policy {
        Unilateral::None => EnergyDensity {
            spherical,
            deviatoric,
        },
        Unilateral::NoCompression => EnergyDensity {
            spherical: if tr >= threshold { spherical } else { 0.0 },
            deviatoric,
        },
    }
}

/// Coefficients of `∂φ1_c1 ∂φ2_c2`, `∂φ1_c2 ∂φ2_c1` and `δ_c1c2 ∇φ1·∇φ2`.
fn stiffness_coefficients(material: &Material, s: f64, compressed: bool, deg: Degradation) -> [f64; 3] {
    let dd = match deg.policy {
        Unilateral::None => material.lambda * s,
        Unilateral::NoCompression => {
            let spherical = if compressed {
                material.bulk_modulus() * (1.0 + deg.eta)
            } else {
                material.bulk_modulus() * s
            };
            spherical - 2.0 * material.mu * s / 3.0
        }
    };
    [dd, material.mu * s, material.mu * s]
}

/// Degraded U stiffness of one cell, linearized at `state.u`.
pub fn u_bilinear_form(
    e: &HexElement,
    state: &ElementState,
    material: &Material,
    deg: Degradation,
    out: &mut SMatrix<f64, U_DOFS, U_DOFS>,
) {
    out.fill(0.0);
    for g in 0..QUAD_POINTS {
        let vg = e.interpolate(g, &state.v);
        let s = vg * vg + deg.eta;
        let compressed = trace(&strain(e, g, &state.u)) < deg.threshold;
        let [dd, cross, lap] = stiffness_coefficients(material, s, compressed, deg);
        let w = e.weight[g];
        let dphi = &e.dphi[g];

        for l1 in 0..NODES {
            for l2 in 0..NODES {
                let dot = dphi[l1][0] * dphi[l2][0]
                    + dphi[l1][1] * dphi[l2][1]
                    + dphi[l1][2] * dphi[l2][2];
                for c1 in 0..3 {
                    for c2 in 0..3 {
                        let mut value = dd * dphi[l1][c1] * dphi[l2][c2]
                            + cross * dphi[l1][c2] * dphi[l2][c1];
                        if c1 == c2 {
                            value += lap * dot;
                        }
                        out[(3 * l1 + c1, 3 * l2 + c2)] += w * value;
                    }
                }
            }
        }
    }
}

/// Thermal expansion and Biot pressure loads, added to `out`.
pub fn thermo_poro_force(
    e: &HexElement,
    state: &ElementState,
    material: &Material,
    deg: Degradation,
    out: &mut SVector<f64, U_DOFS>,
) {
    let coef_alpha = material.three_kappa() * material.alpha;
    for g in 0..QUAD_POINTS {
        let theta = e.interpolate(g, &state.dtheta);
        let p = e.interpolate(g, &state.dpore);
        let vg = e.interpolate(g, &state.v);
        let s = vg * vg + deg.eta;

        let compressed = deg.policy == Unilateral::NoCompression
            && trace(&strain(e, g, &state.u)) < deg.threshold;
        let f = if compressed {
            coef_alpha * theta * (1.0 + deg.eta) + material.beta * p
        } else {
            coef_alpha * theta * s + material.beta * p * vg
        };
        if f == 0.0 {
            continue;
        }
        let w = e.weight[g];
        for l in 0..NODES {
            for c in 0..3 {
                out[3 * l + c] += w * e.dphi[g][l][c] * f;
            }
        }
    }
}

/// Pressure acting on the diffuse crack faces, `∫ p ∂_c V φ`, added to `out`.
pub fn crack_pressure_force(e: &HexElement, state: &ElementState, out: &mut SVector<f64, U_DOFS>) {
    for g in 0..QUAD_POINTS {
        let p = e.interpolate(g, &state.pressure);
        if p == 0.0 {
            continue;
        }
        let grad_v = e.gradient(g, &state.v);
        let w = e.weight[g];
        for l in 0..NODES {
            for c in 0..3 {
                out[3 * l + c] += w * p * grad_v[c] * e.phi[g][l];
            }
        }
    }
}

/// Traction `σ · n` of a Voigt stress on `face` (outward normal).
pub fn face_traction(face: Face, s: &VoigtStress) -> [f64; 3] {
    let sign = if face.is_high() { 1.0 } else { -1.0 };
    let column = match face.axis() {
        0 => [s[0], s[5], s[4]],
        1 => [s[5], s[1], s[3]],
        _ => [s[4], s[3], s[2]],
    };
    [sign * column[0], sign * column[1], sign * column[2]]
}

/// In-situ traction on one boundary face of the cell, added to `out`.
///
/// `stress[q]` is the in-situ stress at face point `q`; only components with
/// `free[c]` set receive a load.
pub fn insitu_force(
    fq: &FaceQuadrature,
    stress: &[VoigtStress; 4],
    free: [bool; 3],
    out: &mut SVector<f64, U_DOFS>,
) {
    for q in 0..4 {
        let t = face_traction(fq.face, &stress[q]);
        for l in 0..NODES {
            let phi = fq.phi[q][l];
            if phi == 0.0 {
                continue;
            }
            for c in 0..3 {
                if free[c] {
                    out[3 * l + c] += fq.weight[q] * phi * t[c];
                }
            }
        }
    }
}

/// Work of the in-situ traction on one boundary face of the cell.
pub fn insitu_work(
    fq: &FaceQuadrature,
    stress: &[VoigtStress; 4],
    free: [bool; 3],
    u: &[[f64; 3]; NODES],
) -> f64 {
    let mut work = 0.0;
    for q in 0..4 {
        let t = face_traction(fq.face, &stress[q]);
        for c in 0..3 {
            if !free[c] {
                continue;
            }
            let uq: f64 = (0..NODES).map(|l| fq.phi[q][l] * u[l][c]).sum();
            work += fq.weight[q] * uq * t[c];
        }
    }
    work
}

/// Degraded elastic energy of one cell, consistent with [`u_bilinear_form`]
/// and [`thermo_poro_force`].
pub fn elastic_energy(
    e: &HexElement,
    state: &ElementState,
    material: &Material,
    deg: Degradation,
) -> f64 {
    let kappa = material.bulk_modulus();
    let mut energy = 0.0;
    for g in 0..QUAD_POINTS {
        let eps = strain(e, g, &state.u);
        let tr = trace(&eps);
        let tr_el = tr - 3.0 * material.alpha * e.interpolate(g, &state.dtheta);
        let p = e.interpolate(g, &state.dpore);
        let vg = e.interpolate(g, &state.v);
        let s = vg * vg + deg.eta;

        let compressed = deg.policy == Unilateral::NoCompression && tr < deg.threshold;
        let (k_s, v_p) = if compressed {
            (kappa * (1.0 + deg.eta), 1.0)
        } else {
            (kappa * s, vg)
        };
        let density = 0.5 * k_s * tr_el * tr_el + s * material.mu * deviatoric_square(&eps)
            - material.beta * p * v_p * tr;
        energy += e.weight[g] * density;
    }
    energy
}

/// Work of the crack pressure, `∫ p ∇V · U`.
pub fn pressure_work(e: &HexElement, state: &ElementState) -> f64 {
    let mut work = 0.0;
    for g in 0..QUAD_POINTS {
        let p = e.interpolate(g, &state.pressure);
        let grad_v = e.gradient(g, &state.v);
        let u = e.interpolate_vector(g, &state.u);
        work += e.weight[g] * p * (grad_v[0] * u[0] + grad_v[1] * u[1] + grad_v[2] * u[2]);
    }
    work
}

/// Regularized crack opening volume, `∫ U · ∇V`.
pub fn crack_volume(e: &HexElement, state: &ElementState) -> f64 {
    let mut volume = 0.0;
    for g in 0..QUAD_POINTS {
        let grad_v = e.gradient(g, &state.v);
        let u = e.interpolate_vector(g, &state.u);
        volume += e.weight[g] * (grad_v[0] * u[0] + grad_v[1] * u[1] + grad_v[2] * u[2]);
    }
    volume
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rock() -> Material {
        Material::from_young_poisson("rock", 1.0, 0.25, 1.0)
    }

    fn none(eta: f64) -> Degradation {
        Degradation {
            policy: Unilateral::None,
            threshold: 0.0,
            eta,
        }
    }

    fn split(eta: f64) -> Degradation {
        Degradation {
            policy: Unilateral::NoCompression,
            threshold: 0.0,
            eta,
        }
    }

    /// Nodal displacement of the homogeneous field `u = grad · x`.
    fn affine(h: [f64; 3], grad: [[f64; 3]; 3]) -> [[f64; 3]; NODES] {
        let mut u = [[0.0; 3]; NODES];
        for (l, ul) in u.iter_mut().enumerate() {
            let x = [
                (l & 1) as f64 * h[0],
                ((l >> 1) & 1) as f64 * h[1],
                (l >> 2) as f64 * h[2],
            ];
            for c in 0..3 {
                ul[c] = (0..3).map(|a| grad[c][a] * x[a]).sum();
            }
        }
        u
    }

    fn uniaxial(strain_xx: f64) -> ElementState {
        let h = [1.0, 1.0, 1.0];
        ElementState {
            u: affine(h, [[strain_xx, 0.0, 0.0], [0.0; 3], [0.0; 3]]),
            v: [1.0; NODES],
            ..Default::default()
        }
    }

    #[test]
    fn unilateral_density_in_tension_keeps_spherical_part() {
        let e = HexElement::new([1.0, 1.0, 1.0]);
        let m = rock();
        let state = uniaxial(1e-3);
        let full = elastic_energy_density(&e, 0, &state, &m, Unilateral::None, 0.0);
        let split = elastic_energy_density(&e, 0, &state, &m, Unilateral::NoCompression, 0.0);

        let expected_spherical = 0.5 * m.bulk_modulus() * 1e-6;
        assert!((split.spherical - expected_spherical).abs() < 1e-15);
        assert!((split.total() - full.total()).abs() < 1e-15);
        // W = (λ/2 + μ) ε²
        assert!((full.total() - (0.5 * m.lambda + m.mu) * 1e-6).abs() < 1e-15);
    }

    #[test]
    fn unilateral_density_in_compression_drops_spherical_part() {
        let e = HexElement::new([1.0, 1.0, 1.0]);
        let m = rock();
        let state = uniaxial(-1e-3);
        let split = elastic_energy_density(&e, 3, &state, &m, Unilateral::NoCompression, 0.0);
        let full = elastic_energy_density(&e, 3, &state, &m, Unilateral::None, 0.0);

        assert_eq!(split.spherical, 0.0);
        assert!(full.spherical > 0.0);
        assert!((split.deviatoric - full.deviatoric).abs() < 1e-15);
        assert!(split.deviatoric > 0.0);
    }

    #[test]
    fn positive_threshold_treats_small_expansion_as_compression() {
        let h = [1.0, 1.0, 1.0];
        let e = HexElement::new(h);
        let m = rock();
        let a = 1e-3;
        // tr ε = 3e-3, below the 1e-2 threshold
        let mut state = ElementState {
            u: affine(h, [[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]]),
            v: [0.0; NODES],
            ..Default::default()
        };
        let eta = 1e-6;
        let threshold = 1e-2;
        let below = Degradation {
            policy: Unilateral::NoCompression,
            threshold,
            eta,
        };

        let density = elastic_energy_density(&e, 0, &state, &m, Unilateral::NoCompression, threshold);
        assert_eq!(density.spherical, 0.0);
        let expected = 0.5 * m.bulk_modulus() * (1.0 + eta) * 9.0 * a * a;
        let energy = elastic_energy(&e, &state, &m, below);
        assert!(
            (energy - expected).abs() < 1e-12 * expected,
            "energy {energy}, expected {expected}"
        );

        // same strain under the default threshold is tension and fully degraded
        let at_zero = elastic_energy(&e, &state, &m, split(eta));
        assert!((at_zero - 0.5 * m.bulk_modulus() * eta * 9.0 * a * a).abs() < 1e-12 * expected);

        // and the bulk stiffness stays intact in the bilinear form
        let mut k_below = SMatrix::<f64, U_DOFS, U_DOFS>::zeros();
        u_bilinear_form(&e, &state, &m, below, &mut k_below);
        let mut u = SVector::<f64, U_DOFS>::zeros();
        for l in 0..NODES {
            for c in 0..3 {
                u[3 * l + c] = state.u[l][c];
            }
        }
        assert!((0.5 * u.dot(&(k_below * u)) - expected).abs() < 1e-12 * expected);

        state.v = [1.0; NODES];
        let intact = elastic_energy(&e, &state, &m, below);
        assert!((intact - expected).abs() < 1e-12 * expected);
    }

    #[test]
    fn stiffness_is_symmetric_and_kills_rigid_modes() {
        let h = [0.5, 1.0, 2.0];
        let e = HexElement::new(h);
        let m = rock();
        let mut state = ElementState {
            v: [1.0, 0.8, 0.6, 0.4, 0.9, 0.7, 0.5, 0.3],
            ..Default::default()
        };
        state.u = affine(h, [[0.0, 1e-3, 0.0], [0.0, -1e-3, 0.0], [2e-3, 0.0, 1e-3]]);

        for deg in [none(1e-3), split(1e-3)] {
            let mut k = SMatrix::<f64, U_DOFS, U_DOFS>::zeros();
            u_bilinear_form(&e, &state, &m, deg, &mut k);
            let asym = (k - k.transpose()).abs().max();
            assert!(asym < 1e-14, "asymmetry {asym}");

            // translation and infinitesimal rotation about z
            let mut t = SVector::<f64, U_DOFS>::zeros();
            let mut r = SVector::<f64, U_DOFS>::zeros();
            for l in 0..NODES {
                let x = (l & 1) as f64 * h[0];
                let y = ((l >> 1) & 1) as f64 * h[1];
                t[3 * l] = 1.0;
                r[3 * l] = -y;
                r[3 * l + 1] = x;
            }
            assert!((k * t).norm() < 1e-12);
            assert!((k * r).norm() < 1e-12);
        }
    }

    #[test]
    fn bilinear_form_matches_energy_for_intact_cell() {
        let h = [1.0, 0.5, 0.25];
        let e = HexElement::new(h);
        let m = rock();
        let state = ElementState {
            u: affine(h, [[1e-3, 2e-4, 0.0], [0.0, -5e-4, 1e-4], [3e-4, 0.0, 2e-4]]),
            v: [1.0; NODES],
            ..Default::default()
        };
        let deg = none(0.0);
        let mut k = SMatrix::<f64, U_DOFS, U_DOFS>::zeros();
        u_bilinear_form(&e, &state, &m, deg, &mut k);
        let mut u = SVector::<f64, U_DOFS>::zeros();
        for l in 0..NODES {
            for c in 0..3 {
                u[3 * l + c] = state.u[l][c];
            }
        }
        let quadratic = 0.5 * u.dot(&(k * u));
        let energy = elastic_energy(&e, &state, &m, deg);
        assert!(energy > 0.0);
        assert!((quadratic - energy).abs() < 1e-10 * energy);
    }

    #[test]
    fn compressed_cell_keeps_intact_bulk_stiffness() {
        let h = [1.0, 1.0, 1.0];
        let e = HexElement::new(h);
        let m = rock();
        let mut state = ElementState {
            u: affine(h, [[-1e-3, 0.0, 0.0], [0.0, -1e-3, 0.0], [0.0, 0.0, -1e-3]]),
            v: [0.0; NODES],
            ..Default::default()
        };
        let eta = 1e-6;
        let cracked_compressed = elastic_energy(&e, &state, &m, split(eta));
        state.v = [1.0; NODES];
        let intact = elastic_energy(&e, &state, &m, split(eta));
        // pure volumetric compression: the crack does not soften it
        assert!((cracked_compressed - intact).abs() < 1e-6 * intact);

        state.u = affine(h, [[1e-3, 0.0, 0.0], [0.0, 1e-3, 0.0], [0.0, 0.0, 1e-3]]);
        state.v = [0.0; NODES];
        let cracked_tension = elastic_energy(&e, &state, &m, split(eta));
        assert!(cracked_tension < 1e-5 * intact);
    }

    #[test]
    fn crack_pressure_force_balances_pressure_work() {
        let h = [1.0, 1.0, 1.0];
        let e = HexElement::new(h);
        let mut state = ElementState {
            u: affine(h, [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 1e-2]]),
            v: [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0],
            ..Default::default()
        };
        state.pressure = [2.0; NODES];
        let mut f = SVector::<f64, U_DOFS>::zeros();
        crack_pressure_force(&e, &state, &mut f);
        let mut u = SVector::<f64, U_DOFS>::zeros();
        for l in 0..NODES {
            for c in 0..3 {
                u[3 * l + c] = state.u[l][c];
            }
        }
        let work = pressure_work(&e, &state);
        assert!((f.dot(&u) - work).abs() < 1e-15);
        assert!((crack_volume(&e, &state) - work / 2.0).abs() < 1e-15);
        // u_z = 0.01 z, dV/dz = 1: ∫ 0.01 z dz over the unit cube
        assert!((crack_volume(&e, &state) - 0.005).abs() < 1e-14);
    }

    #[test]
    fn traction_signs_follow_outward_normal() {
        let s = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(face_traction(Face::X1, &s), [1.0, 6.0, 5.0]);
        assert_eq!(face_traction(Face::Y0, &s), [-6.0, -2.0, -4.0]);
        assert_eq!(face_traction(Face::Z1, &s), [5.0, 4.0, 3.0]);
    }

    #[test]
    fn insitu_force_integrates_to_total_traction() {
        let e = HexElement::new([2.0, 1.0, 0.5]);
        let fq = e.face_quadrature(Face::Z1);
        let stress = [[0.0, 0.0, -3.0, 0.0, 0.0, 0.0]; 4];
        let mut f = SVector::<f64, U_DOFS>::zeros();
        insitu_force(&fq, &stress, [true; 3], &mut f);
        let fz: f64 = (0..NODES).map(|l| f[3 * l + 2]).sum();
        assert!((fz + 3.0 * 2.0).abs() < 1e-12);
        // only the top nodes are loaded
        for l in 0..4 {
            assert_eq!(f[3 * l + 2], 0.0);
        }

        let mut masked = SVector::<f64, U_DOFS>::zeros();
        insitu_force(&fq, &stress, [true, true, false], &mut masked);
        assert_eq!(masked.norm(), 0.0);
    }

    #[test]
    fn thermal_force_vanishes_for_free_expansion() {
        let h = [1.0, 1.0, 1.0];
        let e = HexElement::new(h);
        let m = rock().with_alpha(1e-2);
        let theta = 2.0;
        let a = m.alpha * theta;
        let state = ElementState {
            u: affine(h, [[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]]),
            v: [1.0; NODES],
            dtheta: [theta; NODES],
            ..Default::default()
        };
        let deg = none(0.0);
        let mut k = SMatrix::<f64, U_DOFS, U_DOFS>::zeros();
        u_bilinear_form(&e, &state, &m, deg, &mut k);
        let mut f = SVector::<f64, U_DOFS>::zeros();
        thermo_poro_force(&e, &state, &m, deg, &mut f);
        let mut u = SVector::<f64, U_DOFS>::zeros();
        for l in 0..NODES {
            for c in 0..3 {
                u[3 * l + c] = state.u[l][c];
            }
        }
        assert!((k * u - f).norm() < 1e-12);
        assert!(elastic_energy(&e, &state, &m, deg).abs() < 1e-15);
    }
}
