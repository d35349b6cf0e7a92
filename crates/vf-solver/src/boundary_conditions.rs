//! Boundary condition catalog for structured grids.
//!
//! Each field component carries one [`BcMarker`] per topological feature of
//! the box: 6 faces, 12 edges and 8 vertices. Markers are resolved into a
//! per-dof table of prescribed values ([`Constraints`]) by walking the
//! features in a fixed order (faces, then edges, then vertices). A node shared
//! by several features takes the value of the last feature that constrains
//! it.
//!
//! The table is then used to edit assembled residuals, right-hand sides and
//! operators:
//! - residual rows become `x_i - g_i`
//! - right-hand-side rows become `g_i`
//! - operator rows become identity rows, optionally with the column
//!   eliminated into the right-hand side to keep the operator symmetric

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VfError};
use crate::fields::NodalField;
use crate::grid::Grid;

/// Boundary marker of one feature and component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BcMarker {
    /// Unconstrained
    #[default]
    None,
    /// Prescribed 0
    Zero,
    /// Prescribed value taken from a field
    Fixed,
    /// Prescribed 1
    One,
}

impl FromStr for BcMarker {
    type Err = VfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(BcMarker::None),
            "ZERO" => Ok(BcMarker::Zero),
            "FIXED" => Ok(BcMarker::Fixed),
            "ONE" => Ok(BcMarker::One),
            _ => Err(VfError::UnknownMarker(s.to_string())),
        }
    }
}

impl TryFrom<String> for BcMarker {
    type Error = VfError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BcMarker> for String {
    fn from(marker: BcMarker) -> String {
        marker.to_string()
    }
}

impl fmt::Display for BcMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BcMarker::None => "NONE",
            BcMarker::Zero => "ZERO",
            BcMarker::Fixed => "FIXED",
            BcMarker::One => "ONE",
        };
        write!(f, "{name}")
    }
}

/// Position along one axis covered by a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    Low,
    High,
    All,
}

impl Span {
    fn range(self, n: usize) -> std::ops::Range<usize> {
        match self {
            Span::Low => 0..1,
            Span::High => n - 1..n,
            Span::All => 0..n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    X0,
    X1,
    Y0,
    Y1,
    Z0,
    Z1,
}

impl Face {
    pub const ALL: [Face; 6] = [Face::X0, Face::X1, Face::Y0, Face::Y1, Face::Z0, Face::Z1];

    /// Axis normal to the face.
    pub fn axis(self) -> usize {
        match self {
            Face::X0 | Face::X1 => 0,
            Face::Y0 | Face::Y1 => 1,
            Face::Z0 | Face::Z1 => 2,
        }
    }

    /// True for the face at the upper end of its axis.
    pub fn is_high(self) -> bool {
        matches!(self, Face::X1 | Face::Y1 | Face::Z1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    X0Z0,
    X1Z0,
    Y0Z0,
    Y1Z0,
    X0Z1,
    X1Z1,
    Y0Z1,
    Y1Z1,
    X0Y0,
    X0Y1,
    X1Y0,
    X1Y1,
}

impl Edge {
    pub const ALL: [Edge; 12] = [
        Edge::X0Z0,
        Edge::X1Z0,
        Edge::Y0Z0,
        Edge::Y1Z0,
        Edge::X0Z1,
        Edge::X1Z1,
        Edge::Y0Z1,
        Edge::Y1Z1,
        Edge::X0Y0,
        Edge::X0Y1,
        Edge::X1Y0,
        Edge::X1Y1,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vertex {
    X0Y0Z0,
    X1Y0Z0,
    X0Y1Z0,
    X1Y1Z0,
    X0Y0Z1,
    X1Y0Z1,
    X0Y1Z1,
    X1Y1Z1,
}

impl Vertex {
    pub const ALL: [Vertex; 8] = [
        Vertex::X0Y0Z0,
        Vertex::X1Y0Z0,
        Vertex::X0Y1Z0,
        Vertex::X1Y1Z0,
        Vertex::X0Y0Z1,
        Vertex::X1Y0Z1,
        Vertex::X0Y1Z1,
        Vertex::X1Y1Z1,
    ];
}

/// Number of topological features of a box.
pub const FEATURE_COUNT: usize = 26;

/// A face, edge or vertex of the grid's bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Face(Face),
    Edge(Edge),
    Vertex(Vertex),
}

impl Feature {
    /// All features in application order: faces, edges, vertices.
    pub fn all() -> impl Iterator<Item = Feature> {
        Face::ALL
            .into_iter()
            .map(Feature::Face)
            .chain(Edge::ALL.into_iter().map(Feature::Edge))
            .chain(Vertex::ALL.into_iter().map(Feature::Vertex))
    }

    /// Position in [`Feature::all`].
    pub fn index(self) -> usize {
        match self {
            Feature::Face(f) => f as usize,
            Feature::Edge(e) => 6 + e as usize,
            Feature::Vertex(v) => 18 + v as usize,
        }
    }

    pub fn name(self) -> String {
        match self {
            Feature::Face(f) => format!("{f:?}"),
            Feature::Edge(e) => format!("{e:?}"),
            Feature::Vertex(v) => format!("{v:?}"),
        }
    }

    /// Per-axis span, derived from the `X0`/`Y1`/... tokens of the name.
    fn spans(self) -> [Span; 3] {
        let name = self.name();
        let bytes = name.as_bytes();
        let mut spans = [Span::All; 3];
        for pair in bytes.chunks(2) {
            let axis = match pair[0] {
                b'X' => 0,
                b'Y' => 1,
                _ => 2,
            };
            spans[axis] = if pair[1] == b'0' { Span::Low } else { Span::High };
        }
        spans
    }
}

impl FromStr for Feature {
    type Err = VfError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        Feature::all()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| VfError::Config(format!("unknown boundary feature '{s}'")))
    }
}

/// Markers of one field component on all 26 features.
///
/// In configuration files this is a table from feature name to marker; the
/// keys `all`, `faces`, `edges` and `vertices` set whole groups and are
/// applied before individual features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, BcMarker>", into = "BTreeMap<String, BcMarker>")]
pub struct ComponentBc {
    markers: [BcMarker; FEATURE_COUNT],
}

impl Default for ComponentBc {
    fn default() -> Self {
        Self::all(BcMarker::None)
    }
}

impl ComponentBc {
    /// Same marker on every feature.
    pub fn all(marker: BcMarker) -> Self {
        Self {
            markers: [marker; FEATURE_COUNT],
        }
    }

    /// `marker` on the 6 faces; edges and vertices stay `NONE`.
    pub fn faces(marker: BcMarker) -> Self {
        let mut bc = Self::default();
        for face in Face::ALL {
            bc.set(Feature::Face(face), marker);
        }
        bc
    }

    pub fn set(&mut self, feature: Feature, marker: BcMarker) -> &mut Self {
        self.markers[feature.index()] = marker;
        self
    }

    pub fn with(mut self, feature: Feature, marker: BcMarker) -> Self {
        self.set(feature, marker);
        self
    }

    pub fn with_face(self, face: Face, marker: BcMarker) -> Self {
        self.with(Feature::Face(face), marker)
    }

    pub fn marker(&self, feature: Feature) -> BcMarker {
        self.markers[feature.index()]
    }

    pub fn face(&self, face: Face) -> BcMarker {
        self.marker(Feature::Face(face))
    }

    pub fn is_free(&self) -> bool {
        self.markers.iter().all(|m| *m == BcMarker::None)
    }
}

impl TryFrom<BTreeMap<String, BcMarker>> for ComponentBc {
    type Error = VfError;

    fn try_from(table: BTreeMap<String, BcMarker>) -> Result<Self> {
        let mut bc = ComponentBc::default();
        let groups: [(&str, fn(&Feature) -> bool); 4] = [
            ("all", |_| true),
            ("faces", |f| matches!(f, Feature::Face(_))),
            ("edges", |f| matches!(f, Feature::Edge(_))),
            ("vertices", |f| matches!(f, Feature::Vertex(_))),
        ];
        for (key, belongs) in groups {
            if let Some(&marker) = table.get(key) {
                for feature in Feature::all().filter(|f| belongs(f)) {
                    bc.set(feature, marker);
                }
            }
        }
        for (key, &marker) in &table {
            if groups.iter().any(|(group, _)| *group == key.as_str()) {
                continue;
            }
            let feature: Feature = key.parse()?;
            bc.set(feature, marker);
        }
        Ok(bc)
    }
}

impl From<ComponentBc> for BTreeMap<String, BcMarker> {
    fn from(bc: ComponentBc) -> Self {
        Feature::all()
            .filter(|f| bc.marker(*f) != BcMarker::None)
            .map(|f| (f.name(), bc.marker(f)))
            .collect()
    }
}

/// Boundary markers of every component of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBc {
    components: Vec<ComponentBc>,
}

impl FieldBc {
    pub fn new(components: Vec<ComponentBc>) -> Self {
        Self { components }
    }

    pub fn displacement(x: ComponentBc, y: ComponentBc, z: ComponentBc) -> Self {
        Self::new(vec![x, y, z])
    }

    pub fn scalar(bc: ComponentBc) -> Self {
        Self::new(vec![bc])
    }

    pub fn ncomp(&self) -> usize {
        self.components.len()
    }

    pub fn component(&self, c: usize) -> &ComponentBc {
        &self.components[c]
    }
}

/// How Dirichlet rows are imposed on an assembled operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirichletMode {
    /// Identity row; columns untouched.
    Row,
    /// Identity row and zeroed column, with `A_ji g_i` moved to the
    /// right-hand side. Keeps a symmetric operator symmetric.
    RowColumn,
}

/// Prescribed value per dof, `None` for free dofs.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraints {
    values: Vec<Option<f64>>,
}

impl Constraints {
    pub fn free(ndofs: usize) -> Self {
        Self {
            values: vec![None; ndofs],
        }
    }

    /// Resolve the markers of `bc` on `grid`. `FIXED` markers read the
    /// matching component of `fixed_values`.
    pub fn from_markers(grid: &Grid, bc: &FieldBc, fixed_values: &NodalField) -> Result<Self> {
        fixed_values.check_grid(grid)?;
        if fixed_values.ncomp() != bc.ncomp() {
            return Err(VfError::Topology(format!(
                "boundary markers for {} components, prescribed field has {}",
                bc.ncomp(),
                fixed_values.ncomp()
            )));
        }
        let ncomp = bc.ncomp();
        let dims = grid.dims();
        let mut constraints = Self::free(grid.num_nodes() * ncomp);

        for feature in Feature::all() {
            let spans = feature.spans();
            for c in 0..ncomp {
                let marker = bc.component(c).marker(feature);
                if marker == BcMarker::None {
                    continue;
                }
                for k in spans[2].range(dims[2]) {
                    for j in spans[1].range(dims[1]) {
                        for i in spans[0].range(dims[0]) {
                            let node = grid.node_index(i, j, k);
                            let value = match marker {
                                BcMarker::Zero => 0.0,
                                BcMarker::One => 1.0,
                                BcMarker::Fixed => fixed_values.get(node, c),
                                BcMarker::None => continue,
                            };
                            constraints.values[node * ncomp + c] = Some(value);
                        }
                    }
                }
            }
        }
        Ok(constraints)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Prescribe `value` on `dof`, replacing any previous value.
    pub fn fix(&mut self, dof: usize, value: f64) {
        self.values[dof] = Some(value);
    }

    pub fn value(&self, dof: usize) -> Option<f64> {
        self.values[dof]
    }

    pub fn is_fixed(&self, dof: usize) -> bool {
        self.values[dof].is_some()
    }

    pub fn num_fixed(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// `(dof, value)` of every constrained dof, ascending.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(dof, v)| v.map(|v| (dof, v)))
    }

    /// Overwrite prescribed entries of `x` with their values.
    pub fn impose(&self, x: &mut DVector<f64>) {
        for (dof, value) in self.iter() {
            x[dof] = value;
        }
    }

    /// Constrained residual rows become `x_i - g_i`.
    pub fn apply_to_residual(&self, residual: &mut DVector<f64>, x: &DVector<f64>) {
        for (dof, value) in self.iter() {
            residual[dof] = x[dof] - value;
        }
    }

    /// Constrained right-hand-side rows become `g_i`.
    pub fn apply_to_rhs(&self, rhs: &mut DVector<f64>) {
        self.impose(rhs);
    }

    /// Replace constrained rows of `matrix` by identity rows and set the
    /// matching `rhs` entries to the prescribed values.
    ///
    /// Every constrained row must have a stored diagonal entry.
    pub fn apply_to_matrix(
        &self,
        matrix: &mut CsrMatrix<f64>,
        rhs: &mut DVector<f64>,
        mode: DirichletMode,
    ) -> Result<()> {
        if matrix.nrows() != self.len() || rhs.len() != self.len() {
            return Err(VfError::Topology(format!(
                "operator of size {}x{} and rhs of length {} do not match {} dofs",
                matrix.nrows(),
                matrix.ncols(),
                rhs.len(),
                self.len()
            )));
        }
        let (offsets, cols, vals) = matrix.csr_data_mut();
        for row in 0..self.values.len() {
            let range = offsets[row]..offsets[row + 1];
            match self.values[row] {
                Some(value) => {
                    let mut has_diagonal = false;
                    for idx in range {
                        if cols[idx] == row {
                            vals[idx] = 1.0;
                            has_diagonal = true;
                        } else {
                            vals[idx] = 0.0;
                        }
                    }
                    if !has_diagonal {
                        return Err(VfError::Topology(format!(
                            "constrained row {row} has no stored diagonal"
                        )));
                    }
                    rhs[row] = value;
                }
                None if mode == DirichletMode::RowColumn => {
                    for idx in range {
                        if let Some(value) = self.values[cols[idx]] {
                            rhs[row] -= vals[idx] * value;
                            vals[idx] = 0.0;
                        }
                    }
                }
                None => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    fn grid3() -> Grid {
        Grid::uniform([3, 3, 3], [1.0, 1.0, 1.0]).unwrap()
    }

    #[test]
    fn markers_parse_case_insensitively() {
        assert_eq!("zero".parse::<BcMarker>().unwrap(), BcMarker::Zero);
        assert_eq!("FIXED".parse::<BcMarker>().unwrap(), BcMarker::Fixed);
        assert!(matches!(
            "CLAMPED".parse::<BcMarker>(),
            Err(VfError::UnknownMarker(_))
        ));
    }

    #[test]
    fn feature_table_is_complete() {
        let features: Vec<_> = Feature::all().collect();
        assert_eq!(features.len(), FEATURE_COUNT);
        for (i, f) in features.iter().enumerate() {
            assert_eq!(f.index(), i);
            assert_eq!(f.name().parse::<Feature>().unwrap(), *f);
        }
        assert_eq!(
            Feature::Edge(Edge::X1Z0).spans(),
            [Span::High, Span::All, Span::Low]
        );
        assert_eq!(
            Feature::Vertex(Vertex::X0Y1Z1).spans(),
            [Span::Low, Span::High, Span::High]
        );
    }

    #[test]
    fn face_marker_constrains_face_nodes() {
        let grid = grid3();
        let bc = FieldBc::scalar(ComponentBc::default().with_face(Face::Y1, BcMarker::One));
        let fixed = NodalField::zeros(&grid, 1);
        let constraints = Constraints::from_markers(&grid, &bc, &fixed).unwrap();
        assert_eq!(constraints.num_fixed(), 9);
        for k in 0..3 {
            for i in 0..3 {
                assert_eq!(constraints.value(grid.node_index(i, 2, k)), Some(1.0));
            }
        }
        assert_eq!(constraints.value(grid.node_index(1, 1, 1)), None);
    }

    #[test]
    fn edges_and_vertices_override_faces() {
        let grid = grid3();
        let mut fixed = NodalField::zeros(&grid, 3);
        fixed.set(grid.node_index(0, 0, 0), 1, 0.5);
        let y = ComponentBc::faces(BcMarker::Zero)
            .with(Feature::Edge(Edge::X0Y0), BcMarker::One)
            .with(Feature::Vertex(Vertex::X0Y0Z0), BcMarker::Fixed);
        let bc = FieldBc::displacement(ComponentBc::default(), y, ComponentBc::default());
        let constraints = Constraints::from_markers(&grid, &bc, &fixed).unwrap();

        let dof = |i, j, k| grid.node_index(i, j, k) * 3 + 1;
        assert_eq!(constraints.value(dof(0, 0, 0)), Some(0.5));
        assert_eq!(constraints.value(dof(0, 0, 1)), Some(1.0));
        assert_eq!(constraints.value(dof(0, 0, 2)), Some(1.0));
        assert_eq!(constraints.value(dof(1, 0, 1)), Some(0.0));
        assert_eq!(constraints.value(dof(1, 1, 1)), None);
        // x component untouched
        assert_eq!(constraints.value(grid.node_index(0, 0, 1) * 3), None);
    }

    #[test]
    fn component_table_from_config_keys() {
        let mut table = BTreeMap::new();
        table.insert("faces".to_string(), BcMarker::Zero);
        table.insert("z1".to_string(), BcMarker::None);
        table.insert("X1Y1Z1".to_string(), BcMarker::One);
        let bc = ComponentBc::try_from(table).unwrap();
        assert_eq!(bc.face(Face::X0), BcMarker::Zero);
        assert_eq!(bc.face(Face::Z1), BcMarker::None);
        assert_eq!(bc.marker(Feature::Vertex(Vertex::X1Y1Z1)), BcMarker::One);
        assert_eq!(bc.marker(Feature::Edge(Edge::X0Z0)), BcMarker::None);

        let mut bad = BTreeMap::new();
        bad.insert("W0".to_string(), BcMarker::Zero);
        assert!(ComponentBc::try_from(bad).is_err());
    }

    fn tridiagonal() -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(3, 3);
        for i in 0..3 {
            coo.push(i, i, 2.0);
            if i > 0 {
                coo.push(i, i - 1, -1.0);
                coo.push(i - 1, i, -1.0);
            }
        }
        CsrMatrix::from(&coo)
    }

    #[test]
    fn row_column_elimination_keeps_symmetry() {
        let mut a = tridiagonal();
        let mut rhs = DVector::from_vec(vec![1.0, 1.0, 1.0]);
        let mut constraints = Constraints::free(3);
        constraints.fix(0, 2.0);
        constraints
            .apply_to_matrix(&mut a, &mut rhs, DirichletMode::RowColumn)
            .unwrap();

        let dense = nalgebra::DMatrix::from(&a);
        assert_eq!(dense, dense.transpose());
        assert_eq!(dense[(0, 0)], 1.0);
        assert_eq!(dense[(1, 0)], 0.0);
        assert_eq!(rhs[0], 2.0);
        // row 1 had -1 * g_0 moved to the rhs
        assert_eq!(rhs[1], 3.0);
        assert_eq!(rhs[2], 1.0);
    }

    #[test]
    fn row_mode_leaves_columns() {
        let mut a = tridiagonal();
        let mut rhs = DVector::from_vec(vec![1.0, 1.0, 1.0]);
        let mut constraints = Constraints::free(3);
        constraints.fix(2, -1.0);
        constraints
            .apply_to_matrix(&mut a, &mut rhs, DirichletMode::Row)
            .unwrap();
        let dense = nalgebra::DMatrix::from(&a);
        assert_eq!(dense[(2, 1)], 0.0);
        assert_eq!(dense[(1, 2)], -1.0);
        assert_eq!(rhs[2], -1.0);
        assert_eq!(rhs[1], 1.0);
    }

    #[test]
    fn residual_rows_measure_distance_to_prescribed_value() {
        let mut constraints = Constraints::free(2);
        constraints.fix(1, 0.25);
        let x = DVector::from_vec(vec![3.0, 1.0]);
        let mut r = DVector::from_vec(vec![7.0, 7.0]);
        constraints.apply_to_residual(&mut r, &x);
        assert_eq!(r[0], 7.0);
        assert_eq!(r[1], 0.75);
    }
}
