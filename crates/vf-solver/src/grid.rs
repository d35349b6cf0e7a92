//! Structured tensor-product grid, static slab partition and ghosted views.
//!
//! Nodes are numbered `n = (k * ny + j) * nx + i`. Cell `(ei, ej, ek)` spans
//! nodes `ei..=ei+1`, `ej..=ej+1`, `ek..=ek+1`.
//!
//! The grid is split once into contiguous slabs of cell layers along `z`.
//! Each [`Subdomain`] owns a disjoint range of cell layers and reads nodal
//! data through a [`GhostedBlock`]: a copy of its owned node layers plus a
//! halo of neighbouring layers, refreshed by [`GhostedBlock::exchange`]
//! before every assembly pass.
//!
//! ```text
//!   z
//!   ^   rank 1   | cells 3..6 |  ghost nodes 2..=7
//!   |   ---------+------------+------------------
//!   |   rank 0   | cells 0..3 |  ghost nodes 0..=4
//! ```

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VfError};
use crate::fields::NodalField;

/// Width of the ghost region, in node layers, on each side of a slab.
pub const HALO_WIDTH: usize = 1;

/// Structured 3D lattice with explicit per-axis coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
}

impl Grid {
    /// Build a grid from explicit coordinate vectors.
    ///
    /// Every axis needs at least two strictly increasing, finite coordinates.
    pub fn new(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Result<Self> {
        for (name, axis) in [("x", &x), ("y", &y), ("z", &z)] {
            if axis.len() < 2 {
                return Err(VfError::Config(format!(
                    "axis {name} needs at least 2 nodes, got {}",
                    axis.len()
                )));
            }
            if axis.iter().any(|c| !c.is_finite()) {
                return Err(VfError::Config(format!("axis {name} has non-finite coordinates")));
            }
            if axis.windows(2).any(|w| w[1] <= w[0]) {
                return Err(VfError::Config(format!(
                    "axis {name} coordinates must be strictly increasing"
                )));
            }
        }
        Ok(Self { x, y, z })
    }

    /// Uniform grid of `n[a]` nodes spanning `[0, length[a]]` on each axis.
    pub fn uniform(n: [usize; 3], length: [f64; 3]) -> Result<Self> {
        let axis = |count: usize, l: f64| -> Vec<f64> {
            if count < 2 {
                return vec![0.0; count];
            }
            (0..count)
                .map(|i| l * i as f64 / (count - 1) as f64)
                .collect()
        };
        Self::new(
            axis(n[0], length[0]),
            axis(n[1], length[1]),
            axis(n[2], length[2]),
        )
    }

    pub fn nx(&self) -> usize {
        self.x.len()
    }

    pub fn ny(&self) -> usize {
        self.y.len()
    }

    pub fn nz(&self) -> usize {
        self.z.len()
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.nx(), self.ny(), self.nz()]
    }

    pub fn cell_dims(&self) -> [usize; 3] {
        [self.nx() - 1, self.ny() - 1, self.nz() - 1]
    }

    pub fn num_nodes(&self) -> usize {
        self.nx() * self.ny() * self.nz()
    }

    pub fn num_cells(&self) -> usize {
        let [cx, cy, cz] = self.cell_dims();
        cx * cy * cz
    }

    /// Coordinates along axis 0, 1 or 2.
    pub fn coords(&self, axis: usize) -> &[f64] {
        match axis {
            0 => &self.x,
            1 => &self.y,
            _ => &self.z,
        }
    }

    #[inline]
    pub fn node_index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.ny() + j) * self.nx() + i
    }

    pub fn node_position(&self, i: usize, j: usize, k: usize) -> [f64; 3] {
        [self.x[i], self.y[j], self.z[k]]
    }

    /// Physical size `(hx, hy, hz)` of cell `(ei, ej, ek)`.
    pub fn cell_size(&self, ei: usize, ej: usize, ek: usize) -> [f64; 3] {
        [
            self.x[ei + 1] - self.x[ei],
            self.y[ej + 1] - self.y[ej],
            self.z[ek + 1] - self.z[ek],
        ]
    }

    /// Lower corner of cell `(ei, ej, ek)`.
    pub fn cell_origin(&self, ei: usize, ej: usize, ek: usize) -> [f64; 3] {
        [self.x[ei], self.y[ej], self.z[ek]]
    }

    /// `(min, max)` corners of the domain.
    pub fn bounding_box(&self) -> ([f64; 3], [f64; 3]) {
        let first = |a: &[f64]| a[0];
        let last = |a: &[f64]| a[a.len() - 1];
        (
            [first(&self.x), first(&self.y), first(&self.z)],
            [last(&self.x), last(&self.y), last(&self.z)],
        )
    }

    /// Global node indices of the 8 corners of a cell, in local element order
    /// `l = (k * 2 + j) * 2 + i`.
    pub fn cell_nodes(&self, ei: usize, ej: usize, ek: usize) -> [usize; 8] {
        let mut nodes = [0usize; 8];
        for k in 0..2 {
            for j in 0..2 {
                for i in 0..2 {
                    nodes[(k * 2 + j) * 2 + i] = self.node_index(ei + i, ej + j, ek + k);
                }
            }
        }
        nodes
    }
}

/// One slab of the static partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subdomain {
    pub rank: usize,
    /// Owned cell layers along `z`.
    pub cells_z: Range<usize>,
    /// Owned node layers along `z` (disjoint across subdomains).
    pub nodes_z: Range<usize>,
}

impl Subdomain {
    pub fn num_cell_layers(&self) -> usize {
        self.cells_z.len()
    }
}

/// Static split of the grid into `z` slabs.
#[derive(Debug, Clone)]
pub struct Partition {
    subdomains: Vec<Subdomain>,
}

impl Partition {
    /// Split into `parts` slabs; clamped to `1..=number of cell layers`.
    pub fn new(grid: &Grid, parts: usize) -> Self {
        let layers = grid.nz() - 1;
        let parts = parts.clamp(1, layers);
        let base = layers / parts;
        let extra = layers % parts;

        let mut subdomains = Vec::with_capacity(parts);
        let mut start = 0;
        for rank in 0..parts {
            let len = base + usize::from(rank < extra);
            let end = start + len;
            let node_end = if end == layers { grid.nz() } else { end };
            subdomains.push(Subdomain {
                rank,
                cells_z: start..end,
                nodes_z: start..node_end,
            });
            start = end;
        }
        Self { subdomains }
    }

    /// One slab per rayon worker.
    pub fn for_current_pool(grid: &Grid) -> Self {
        Self::new(grid, rayon::current_num_threads())
    }

    pub fn single(grid: &Grid) -> Self {
        Self::new(grid, 1)
    }

    pub fn subdomains(&self) -> &[Subdomain] {
        &self.subdomains
    }

    pub fn len(&self) -> usize {
        self.subdomains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subdomains.is_empty()
    }
}

/// Read-only copy of a nodal field restricted to a subdomain's owned node
/// layers plus [`HALO_WIDTH`] ghost layers on each side.
#[derive(Debug, Clone)]
pub struct GhostedBlock {
    nx: usize,
    ny: usize,
    ncomp: usize,
    owned: Range<usize>,
    layers: Range<usize>,
    data: Vec<f64>,
}

impl GhostedBlock {
    /// Halo exchange: copy the owned and ghost layers of `field` for `sub`.
    pub fn exchange(field: &NodalField, grid: &Grid, sub: &Subdomain) -> Result<Self> {
        field.check_grid(grid)?;
        let lo = sub.nodes_z.start.saturating_sub(HALO_WIDTH);
        let hi = (sub.nodes_z.end + HALO_WIDTH).min(grid.nz());
        let layer_len = grid.nx() * grid.ny() * field.ncomp();
        let values = field.as_slice();
        let data = values[lo * layer_len..hi * layer_len].to_vec();
        Ok(Self {
            nx: grid.nx(),
            ny: grid.ny(),
            ncomp: field.ncomp(),
            owned: sub.nodes_z.clone(),
            layers: lo..hi,
            data,
        })
    }

    pub fn ncomp(&self) -> usize {
        self.ncomp
    }

    pub fn owned_layers(&self) -> Range<usize> {
        self.owned.clone()
    }

    pub fn ghosted_layers(&self) -> Range<usize> {
        self.layers.clone()
    }

    /// Component `c` at global node `(i, j, k)`.
    ///
    /// Panics when `(i, j, k)` lies outside the ghosted region.
    #[inline]
    pub fn at(&self, i: usize, j: usize, k: usize, c: usize) -> f64 {
        assert!(
            self.layers.contains(&k) && i < self.nx && j < self.ny && c < self.ncomp,
            "node ({i}, {j}, {k}) component {c} outside ghosted layers {:?}",
            self.layers
        );
        let local = ((k - self.layers.start) * self.ny + j) * self.nx + i;
        self.data[local * self.ncomp + c]
    }

    /// Scalar samples at the 8 corners of a cell.
    pub fn gather_scalar(&self, ei: usize, ej: usize, ek: usize) -> [f64; 8] {
        let mut out = [0.0; 8];
        for k in 0..2 {
            for j in 0..2 {
                for i in 0..2 {
                    out[(k * 2 + j) * 2 + i] = self.at(ei + i, ej + j, ek + k, 0);
                }
            }
        }
        out
    }

    /// Vector samples at the 8 corners of a cell.
    pub fn gather_vector(&self, ei: usize, ej: usize, ek: usize) -> [[f64; 3]; 8] {
        let mut out = [[0.0; 3]; 8];
        for k in 0..2 {
            for j in 0..2 {
                for i in 0..2 {
                    let l = (k * 2 + j) * 2 + i;
                    for (c, slot) in out[l].iter_mut().enumerate() {
                        *slot = self.at(ei + i, ej + j, ek + k, c);
                    }
                }
            }
        }
        out
    }
}
