// SPDX-License-Identifier: AGPL-3.0-only

//! Decomposition configuration.
//!
//! Collects everything the layer consumes from the outside: box edge
//! lengths and periodicity flags, the interaction cutoff, the process-grid
//! dimensions, and the particle-store layout. Derived quantities (sub-box
//! edges, inner cell counts) are computed here so the grid code never
//! re-derives geometry ad hoc.

use serde::{Deserialize, Serialize};

use crate::decomp::store::Layout;
use crate::error::DecompError;

/// Static per-run decomposition parameters.
///
/// The grid is fixed for the lifetime of a run; a geometry change (e.g.
/// a barostat rescaling the box) goes through
/// [`GhostExchange::set_geometry`](crate::GhostExchange::set_geometry),
/// which re-validates and rebuilds from a new config.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[must_use]
pub struct DecompConfig {
    /// Worker processes per axis; product must equal the communicator size.
    pub node_grid: [usize; 3],
    /// Box edge lengths.
    pub box_edge: [f64; 3],
    /// Per-axis periodicity. Only fully periodic boxes are supported.
    pub periodic: [bool; 3],
    /// Interaction cutoff radius; drives the cell size.
    pub cutoff: f64,
    /// Halo thickness in cell layers. Exactly 1 is supported.
    pub halo: usize,
    /// Memory layout of the vectorized particle store.
    pub layout: Layout,
}

impl DecompConfig {
    /// Config with a single-layer halo and SoA layout.
    pub fn new(node_grid: [usize; 3], box_edge: [f64; 3], cutoff: f64) -> Self {
        Self {
            node_grid,
            box_edge,
            periodic: [true; 3],
            cutoff,
            halo: 1,
            layout: Layout::Soa,
        }
    }

    /// Same config with the AoS store layout.
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Per-process sub-box edge lengths.
    #[must_use]
    pub fn sub_edge(&self) -> [f64; 3] {
        [
            self.box_edge[0] / self.node_grid[0] as f64,
            self.box_edge[1] / self.node_grid[1] as f64,
            self.box_edge[2] / self.node_grid[2] as f64,
        ]
    }

    /// Inner (real) cell counts per axis: the largest lattice whose cell
    /// size still covers the cutoff.
    ///
    /// `floor(sub_edge / cutoff)` guarantees cell size >= cutoff, so one
    /// halo layer is sufficient for all pair interactions.
    pub fn cells_per_node(&self) -> Result<[usize; 3], DecompError> {
        let sub = self.sub_edge();
        let mut cells = [0usize; 3];
        for axis in 0..3 {
            let n = (sub[axis] / self.cutoff).floor() as usize;
            if n == 0 {
                return Err(DecompError::CutoffTooLarge {
                    axis,
                    sub_edge: sub[axis],
                    cutoff: self.cutoff,
                });
            }
            cells[axis] = n;
        }
        Ok(cells)
    }

    /// Check everything that can fail before any grid is built.
    pub fn validate(&self) -> Result<(), DecompError> {
        if self.halo != 1 {
            return Err(DecompError::UnsupportedHalo { layers: self.halo });
        }
        for axis in 0..3 {
            if self.node_grid[axis] == 0 {
                return Err(DecompError::BadConfig(format!(
                    "node grid is zero on axis {axis}"
                )));
            }
            if !(self.box_edge[axis] > 0.0) || !self.box_edge[axis].is_finite() {
                return Err(DecompError::BadConfig(format!(
                    "box edge {} on axis {axis} is not a positive finite length",
                    self.box_edge[axis]
                )));
            }
            if !self.periodic[axis] {
                return Err(DecompError::NonPeriodicAxis { axis });
            }
        }
        if !(self.cutoff > 0.0) || !self.cutoff.is_finite() {
            return Err(DecompError::BadConfig(format!(
                "cutoff {} is not a positive finite radius",
                self.cutoff
            )));
        }
        self.cells_per_node().map(|_| ())
    }
}
