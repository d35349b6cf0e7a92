//! Sparse global assembly on the structured grid.
//!
//! Every subdomain of the partition is assembled in parallel:
//!
//! 1. halo exchange: each needed field is copied into a [`GhostedBlock`]
//!    covering the owned node layers plus one ghost layer;
//! 2. the owned cells are visited with three nested loops, their corner
//!    samples gathered from the blocks and handed to the element kernels;
//! 3. element contributions are emitted as global COO triplets.
//!
//! Triplets are merged in subdomain order and converted to CSR (duplicates
//! summed), so a given partition always yields bit-identical operators.
//! Scalar reductions follow the same order.

use nalgebra::{DVector, SMatrix, SVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use serde::Serialize;

use crate::boundary_conditions::{BcMarker, Constraints, DirichletMode, Face};
use crate::elements::{
    crack_pressure_force, crack_volume, elastic_energy, insitu_force, insitu_work,
    pressure_work, surface_energy, thermo_poro_force, u_bilinear_form, v_bilinear_form,
    v_crack_pressure_source, v_surface_source, Degradation, ElementState, HexElement, NODES,
    U_DOFS,
};
use crate::error::{Result, VfError};
use crate::fields::Fields;
use crate::grid::{GhostedBlock, Grid, Subdomain};
use crate::model::Model;
use crate::properties::VoigtStress;

/// Assembled operator and right-hand side, constraints applied.
#[derive(Debug, Clone)]
pub struct SparseGlobalSystem {
    /// Global operator in CSR format
    pub operator: CsrMatrix<f64>,
    /// Global right-hand side
    pub rhs: DVector<f64>,
    /// Number of degrees of freedom
    pub num_dofs: usize,
}

/// Energies of the current state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Energies {
    pub elastic: f64,
    pub surface: f64,
    pub pressure_work: f64,
    pub insitu_work: f64,
    pub crack_volume: f64,
}

impl Energies {
    fn accumulate(&mut self, other: &Energies) {
        self.elastic += other.elastic;
        self.surface += other.surface;
        self.pressure_work += other.pressure_work;
        self.insitu_work += other.insitu_work;
        self.crack_volume += other.crack_volume;
    }

    /// `Elastic − InsituWork − PressureWork`
    pub fn total(&self) -> f64 {
        self.elastic - self.insitu_work - self.pressure_work
    }
}

type Triplets = Vec<(usize, usize, f64)>;
type Entries = Vec<(usize, f64)>;

/// Ghosted copies of the fields one subdomain reads.
struct SubdomainView<'a> {
    sub: &'a Subdomain,
    u: GhostedBlock,
    v: GhostedBlock,
    pressure: GhostedBlock,
    pressure_ref: GhostedBlock,
    theta: GhostedBlock,
    theta_ref: GhostedBlock,
}

impl<'a> SubdomainView<'a> {
    fn exchange(fields: &Fields, grid: &Grid, sub: &'a Subdomain) -> Result<Self> {
        Ok(Self {
            sub,
            u: GhostedBlock::exchange(&fields.u, grid, sub)?,
            v: GhostedBlock::exchange(&fields.v, grid, sub)?,
            pressure: GhostedBlock::exchange(&fields.pressure, grid, sub)?,
            pressure_ref: GhostedBlock::exchange(&fields.pressure_ref, grid, sub)?,
            theta: GhostedBlock::exchange(&fields.theta, grid, sub)?,
            theta_ref: GhostedBlock::exchange(&fields.theta_ref, grid, sub)?,
        })
    }

    fn state(&self, ei: usize, ej: usize, ek: usize) -> ElementState {
        let pressure = self.pressure.gather_scalar(ei, ej, ek);
        let pressure_ref = self.pressure_ref.gather_scalar(ei, ej, ek);
        let theta = self.theta.gather_scalar(ei, ej, ek);
        let theta_ref = self.theta_ref.gather_scalar(ei, ej, ek);
        let mut dpore = [0.0; NODES];
        let mut dtheta = [0.0; NODES];
        for l in 0..NODES {
            dpore[l] = pressure[l] - pressure_ref[l];
            dtheta[l] = theta[l] - theta_ref[l];
        }
        ElementState {
            u: self.u.gather_vector(ei, ej, ek),
            v: self.v.gather_scalar(ei, ej, ek),
            dtheta,
            dpore,
            pressure,
        }
    }

    /// Owned cells in `(ek, ej, ei)` lexicographic order.
    fn cells(&self, grid: &Grid) -> impl Iterator<Item = (usize, usize, usize)> {
        let [cx, cy, _] = grid.cell_dims();
        self.sub
            .cells_z
            .clone()
            .flat_map(move |ek| (0..cy).flat_map(move |ej| (0..cx).map(move |ei| (ei, ej, ek))))
    }
}

/// Element-by-element assembler for the U and V sub-problems.
pub struct GlobalAssembler<'m> {
    model: &'m Model,
}

impl<'m> GlobalAssembler<'m> {
    pub fn new(model: &'m Model) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Model {
        self.model
    }

    pub fn num_u_dofs(&self) -> usize {
        3 * self.model.grid.num_nodes()
    }

    pub fn num_v_dofs(&self) -> usize {
        self.model.grid.num_nodes()
    }

    /// Degradation with residual stiffness `eta`.
    pub fn degradation(&self, eta: f64) -> Degradation {
        Degradation {
            policy: self.model.policy,
            threshold: self.model.vfprop.unilateral_threshold,
            eta,
        }
    }

    /// Run `visit` on every subdomain in parallel, results in subdomain order.
    fn per_subdomain<T, F>(&self, fields: &Fields, visit: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&SubdomainView<'_>) -> Result<T> + Sync,
    {
        fields.check_topology(&self.model.grid)?;
        self.model
            .partition
            .subdomains()
            .par_iter()
            .map(|sub| {
                let view = SubdomainView::exchange(fields, &self.model.grid, sub)?;
                visit(&view)
            })
            .collect()
    }

    /// U operator `K(U)` with residual stiffness `eta`, no constraints.
    pub fn u_operator(&self, fields: &Fields, eta: f64) -> Result<CsrMatrix<f64>> {
        let grid = &self.model.grid;
        let deg = self.degradation(eta);
        let parts = self.per_subdomain(fields, |view| {
            let mut triplets = Triplets::new();
            let mut ke = SMatrix::<f64, U_DOFS, U_DOFS>::zeros();
            for (ei, ej, ek) in view.cells(grid) {
                let e = HexElement::new(grid.cell_size(ei, ej, ek));
                let state = view.state(ei, ej, ek);
                let material = self.model.materials.for_cell_layer(ek)?;
                u_bilinear_form(&e, &state, material, deg, &mut ke);
                let dofs = u_dofs(&grid.cell_nodes(ei, ej, ek));
                scatter_matrix(&dofs, &ke, &mut triplets);
            }
            Ok(triplets)
        })?;
        to_csr(self.num_u_dofs(), parts)
    }

    /// External force of the U problem: thermo-poro, crack pressure and
    /// in-situ tractions.
    pub fn u_force(&self, fields: &Fields) -> Result<DVector<f64>> {
        let grid = &self.model.grid;
        let coupling = &self.model.coupling;
        let deg = self.degradation(self.model.vfprop.eta);
        let parts = self.per_subdomain(fields, |view| {
            let mut entries = Entries::new();
            let mut fe = SVector::<f64, U_DOFS>::zeros();
            for (ei, ej, ek) in view.cells(grid) {
                let e = HexElement::new(grid.cell_size(ei, ej, ek));
                let state = view.state(ei, ej, ek);
                let material = self.model.materials.for_cell_layer(ek)?;
                fe.fill(0.0);
                thermo_poro_force(&e, &state, material, deg, &mut fe);
                if coupling.has_crack_pressure {
                    crack_pressure_force(&e, &state, &mut fe);
                }
                if coupling.has_insitu {
                    for (face, free) in self.boundary_faces(ei, ej, ek) {
                        let fq = e.face_quadrature(face);
                        let stress = self.face_stress(ei, ej, ek, &fq.points, e.h[2]);
                        insitu_force(&fq, &stress, free, &mut fe);
                    }
                }
                let dofs = u_dofs(&grid.cell_nodes(ei, ej, ek));
                scatter_vector(&dofs, fe.as_slice(), &mut entries);
            }
            Ok(entries)
        })?;
        Ok(to_vector(self.num_u_dofs(), parts))
    }

    /// U system `K(U) x = F` with Dirichlet rows applied.
    pub fn u_system(
        &self,
        fields: &Fields,
        eta: f64,
        constraints: &Constraints,
        mode: DirichletMode,
    ) -> Result<SparseGlobalSystem> {
        let mut operator = self.u_operator(fields, eta)?;
        let mut rhs = self.u_force(fields)?;
        constraints.apply_to_matrix(&mut operator, &mut rhs, mode)?;
        Ok(SparseGlobalSystem {
            num_dofs: rhs.len(),
            operator,
            rhs,
        })
    }

    /// V operator: AT surface term plus the elastic coupling of the current U.
    pub fn v_operator(&self, fields: &Fields) -> Result<CsrMatrix<f64>> {
        let grid = &self.model.grid;
        let vfprop = &self.model.vfprop;
        let policy = self.model.policy;
        let parts = self.per_subdomain(fields, |view| {
            let mut triplets = Triplets::new();
            let mut ke = SMatrix::<f64, NODES, NODES>::zeros();
            for (ei, ej, ek) in view.cells(grid) {
                let e = HexElement::new(grid.cell_size(ei, ej, ek));
                let state = view.state(ei, ej, ek);
                let material = self.model.materials.for_cell_layer(ek)?;
                v_bilinear_form(
                    &e,
                    &state,
                    material,
                    vfprop.at,
                    vfprop.epsilon,
                    policy,
                    vfprop.unilateral_threshold,
                    &mut ke,
                );
                scatter_matrix(&grid.cell_nodes(ei, ej, ek), &ke, &mut triplets);
            }
            Ok(triplets)
        })?;
        to_csr(self.num_v_dofs(), parts)
    }

    /// V right-hand side: surface source plus crack-pressure source.
    pub fn v_rhs(&self, fields: &Fields) -> Result<DVector<f64>> {
        let grid = &self.model.grid;
        let vfprop = &self.model.vfprop;
        let has_crack_pressure = self.model.coupling.has_crack_pressure;
        let parts = self.per_subdomain(fields, |view| {
            let mut entries = Entries::new();
            let mut fe = SVector::<f64, NODES>::zeros();
            for (ei, ej, ek) in view.cells(grid) {
                let e = HexElement::new(grid.cell_size(ei, ej, ek));
                let material = self.model.materials.for_cell_layer(ek)?;
                fe.fill(0.0);
                v_surface_source(&e, material, vfprop.at, vfprop.epsilon, &mut fe);
                if has_crack_pressure {
                    let state = view.state(ei, ej, ek);
                    v_crack_pressure_source(&e, &state, &mut fe);
                }
                scatter_vector(&grid.cell_nodes(ei, ej, ek), fe.as_slice(), &mut entries);
            }
            Ok(entries)
        })?;
        Ok(to_vector(self.num_v_dofs(), parts))
    }

    /// V system with Dirichlet rows applied.
    pub fn v_system(
        &self,
        fields: &Fields,
        constraints: &Constraints,
        mode: DirichletMode,
    ) -> Result<SparseGlobalSystem> {
        let mut operator = self.v_operator(fields)?;
        let mut rhs = self.v_rhs(fields)?;
        constraints.apply_to_matrix(&mut operator, &mut rhs, mode)?;
        Ok(SparseGlobalSystem {
            num_dofs: rhs.len(),
            operator,
            rhs,
        })
    }

    /// Energies of the current fields, reduced in subdomain order.
    pub fn energies(&self, fields: &Fields) -> Result<Energies> {
        let grid = &self.model.grid;
        let vfprop = &self.model.vfprop;
        let coupling = &self.model.coupling;
        let deg = self.degradation(vfprop.eta);
        let parts = self.per_subdomain(fields, |view| {
            let mut sum = Energies::default();
            for (ei, ej, ek) in view.cells(grid) {
                let e = HexElement::new(grid.cell_size(ei, ej, ek));
                let state = view.state(ei, ej, ek);
                let material = self.model.materials.for_cell_layer(ek)?;
                sum.elastic += elastic_energy(&e, &state, material, deg);
                sum.surface += surface_energy(&e, &state.v, material, vfprop.at, vfprop.epsilon);
                sum.crack_volume += crack_volume(&e, &state);
                if coupling.has_crack_pressure {
                    sum.pressure_work += pressure_work(&e, &state);
                }
                if coupling.has_insitu {
                    for (face, free) in self.boundary_faces(ei, ej, ek) {
                        let fq = e.face_quadrature(face);
                        let stress = self.face_stress(ei, ej, ek, &fq.points, e.h[2]);
                        sum.insitu_work += insitu_work(&fq, &stress, free, &state.u);
                    }
                }
            }
            Ok(sum)
        })?;
        let mut total = Energies::default();
        for part in &parts {
            total.accumulate(part);
        }
        Ok(total)
    }

    /// Boundary faces of a cell that carry at least one unconstrained
    /// displacement component, with the per-component free mask.
    fn boundary_faces(&self, ei: usize, ej: usize, ek: usize) -> Vec<(Face, [bool; 3])> {
        let cells = self.model.grid.cell_dims();
        let index = [ei, ej, ek];
        Face::ALL
            .iter()
            .copied()
            .filter(|face| {
                let axis = face.axis();
                if face.is_high() {
                    index[axis] + 1 == cells[axis]
                } else {
                    index[axis] == 0
                }
            })
            .filter_map(|face| {
                let free = [0, 1, 2].map(|c| self.model.bc_u.component(c).face(face) == BcMarker::None);
                free.iter().any(|&f| f).then_some((face, free))
            })
            .collect()
    }

    /// In-situ stress at the face quadrature points of a cell.
    fn face_stress(
        &self,
        ei: usize,
        ej: usize,
        ek: usize,
        points: &[[f64; 3]; 4],
        hz: f64,
    ) -> [VoigtStress; 4] {
        let (lo, hi) = self.model.grid.bounding_box();
        let z0 = self.model.grid.cell_origin(ei, ej, ek)[2];
        (*points).map(|p| self.model.coupling.insitu_at(z0 + p[2] * hz, lo[2], hi[2]))
    }
}

fn u_dofs(nodes: &[usize; NODES]) -> [usize; U_DOFS] {
    let mut dofs = [0; U_DOFS];
    for (l, &node) in nodes.iter().enumerate() {
        for c in 0..3 {
            dofs[3 * l + c] = 3 * node + c;
        }
    }
    dofs
}

fn scatter_matrix<const N: usize>(
    dofs: &[usize; N],
    ke: &SMatrix<f64, N, N>,
    triplets: &mut Triplets,
) {
    for (a, &row) in dofs.iter().enumerate() {
        for (b, &col) in dofs.iter().enumerate() {
            triplets.push((row, col, ke[(a, b)]));
        }
    }
}

fn scatter_vector(dofs: &[usize], fe: &[f64], entries: &mut Entries) {
    for (&dof, &value) in dofs.iter().zip(fe) {
        if value != 0.0 {
            entries.push((dof, value));
        }
    }
}

/// Merge per-subdomain triplets in order and compress; duplicates are summed.
fn to_csr(n: usize, parts: Vec<Triplets>) -> Result<CsrMatrix<f64>> {
    let nnz: usize = parts.iter().map(Vec::len).sum();
    let mut rows = Vec::with_capacity(nnz);
    let mut cols = Vec::with_capacity(nnz);
    let mut vals = Vec::with_capacity(nnz);
    for (r, c, v) in parts.into_iter().flatten() {
        rows.push(r);
        cols.push(c);
        vals.push(v);
    }
    let coo = CooMatrix::try_from_triplets(n, n, rows, cols, vals)
        .map_err(|e| VfError::Sparse(e.to_string()))?;
    Ok(CsrMatrix::from(&coo))
}

fn to_vector(n: usize, parts: Vec<Entries>) -> DVector<f64> {
    let mut out = DVector::zeros(n);
    for (dof, value) in parts.into_iter().flatten() {
        out[dof] += value;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary_conditions::{ComponentBc, FieldBc};
    use crate::fields::NodalField;
    use crate::grid::Grid;
    use crate::materials::Material;
    use crate::properties::{Coupling, Unilateral};

    fn model(parts: usize) -> Model {
        let grid = Grid::new(
            vec![0.0, 0.3, 0.7, 1.0],
            vec![0.0, 0.5, 1.0],
            vec![0.0, 0.2, 0.45, 0.7, 1.0],
        )
        .unwrap();
        Model::new(grid, Material::from_young_poisson("rock", 2.0, 0.3, 1.0).with_beta(0.5))
            .with_policy(Unilateral::NoCompression)
            .with_partitions(parts)
    }

    fn loaded_fields(grid: &Grid) -> Fields {
        let mut fields = Fields::new(grid);
        for n in 0..grid.num_nodes() {
            let s = n as f64;
            fields.u.set(n, 0, 0.01 * (0.3 * s).sin());
            fields.u.set(n, 1, 0.01 * (0.7 * s).cos());
            fields.u.set(n, 2, -0.02 * (0.1 * s).sin());
            fields.v.set(n, 0, 0.5 + 0.5 * (0.2 * s).cos().abs());
            fields.pressure.set(n, 0, 0.1 * (n % 3) as f64);
        }
        fields
    }

    fn dense(a: &CsrMatrix<f64>) -> nalgebra::DMatrix<f64> {
        nalgebra::DMatrix::from(a)
    }

    #[test]
    fn assembly_is_idempotent() {
        let model = model(3);
        let fields = loaded_fields(&model.grid);
        let assembler = GlobalAssembler::new(&model);
        let a1 = assembler.u_operator(&fields, 1e-5).unwrap();
        let a2 = assembler.u_operator(&fields, 1e-5).unwrap();
        assert_eq!(a1.values(), a2.values());
        assert_eq!(a1.col_indices(), a2.col_indices());
        let b1 = assembler.v_rhs(&fields).unwrap();
        let b2 = assembler.v_rhs(&fields).unwrap();
        assert_eq!(b1, b2);
    }

    #[test]
    fn partition_independence() {
        let single = model(1);
        let split = model(3);
        assert_eq!(split.partition.len(), 3);
        let fields = loaded_fields(&single.grid);
        let a = GlobalAssembler::new(&single);
        let b = GlobalAssembler::new(&split);

        let du = dense(&a.u_operator(&fields, 1e-5).unwrap())
            - dense(&b.u_operator(&fields, 1e-5).unwrap());
        assert!(du.amax() < 1e-12);
        let dv = dense(&a.v_operator(&fields).unwrap()) - dense(&b.v_operator(&fields).unwrap());
        assert!(dv.amax() < 1e-12);
        let df = a.u_force(&fields).unwrap() - b.u_force(&fields).unwrap();
        assert!(df.amax() < 1e-12);

        let ea = a.energies(&fields).unwrap();
        let eb = b.energies(&fields).unwrap();
        assert!((ea.elastic - eb.elastic).abs() < 1e-12);
        assert!((ea.surface - eb.surface).abs() < 1e-12);
    }

    #[test]
    fn u_operator_is_symmetric_and_energy_consistent() {
        let model = model(2);
        let mut fields = loaded_fields(&model.grid);
        fields.pressure.fill(0.0);
        let assembler = GlobalAssembler::new(&model);
        let k = dense(&assembler.u_operator(&fields, model.vfprop.eta).unwrap());
        assert!((&k - k.transpose()).amax() < 1e-12);

        let u = fields.u.as_vector();
        let quadratic = 0.5 * u.dot(&(&k * u));
        let elastic = assembler.energies(&fields).unwrap().elastic;
        assert!(
            (quadratic - elastic).abs() < 1e-10 * elastic.abs().max(1.0),
            "½ uᵀKu = {quadratic}, elastic energy = {elastic}"
        );
    }

    #[test]
    fn mismatched_field_is_a_topology_error() {
        let model = model(1);
        let mut fields = Fields::new(&model.grid);
        fields.v = NodalField::zeros(&Grid::uniform([2, 2, 2], [1.0; 3]).unwrap(), 1);
        let err = GlobalAssembler::new(&model).v_rhs(&fields).unwrap_err();
        assert!(matches!(err, VfError::Topology(_)));
    }

    #[test]
    fn short_layering_is_a_config_error() {
        let rock = Material::from_young_poisson("rock", 1.0, 0.2, 1.0);
        let model = model(2).with_materials(crate::materials::MaterialLibrary::homogeneous(rock, 1));
        let fields = Fields::new(&model.grid);
        let assembler = GlobalAssembler::new(&model);
        assert!(matches!(assembler.u_operator(&fields, 1e-5), Err(VfError::Config(_))));
        assert!(matches!(assembler.energies(&fields), Err(VfError::Config(_))));
    }

    #[test]
    fn insitu_load_skips_constrained_faces() {
        let coupling = Coupling {
            has_insitu: true,
            insitu_min: [1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            insitu_max: [1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            ..Coupling::default()
        };
        let x_fixed = ComponentBc::default().with_face(Face::X0, BcMarker::Zero);
        let model = model(2)
            .with_coupling(coupling)
            .with_bc_u(FieldBc::displacement(x_fixed, ComponentBc::default(), ComponentBc::default()));
        let fields = Fields::new(&model.grid);
        let f = GlobalAssembler::new(&model).u_force(&fields).unwrap();

        // total x load = area of the X1 face only
        let fx: f64 = (0..model.grid.num_nodes()).map(|n| f[3 * n]).sum();
        assert!((fx - 1.0).abs() < 1e-12, "fx = {fx}");
        let fy: f64 = (0..model.grid.num_nodes()).map(|n| f[3 * n + 1]).sum();
        assert!(fy.abs() < 1e-12);
    }
}
