// SPDX-License-Identifier: AGPL-3.0-only

//! Vectorized particle store: contiguous per-cell position and force
//! arrays in one of two layouts.
//!
//! SoA keeps six component arrays (`p_x..f_z`) for stride-1 vectorized
//! force loops; AoS keeps `[x, y, z, pad]` records with a pad lane so a
//! record spans a full SIMD width. Cell `c` owns the contiguous index
//! range `[range[c], range[c+1])`; ranges cover the store exactly with no
//! gaps or overlap.
//!
//! The store is owned by the force/neighbor machinery; the decomposition
//! references it only by cell index and range.

use serde::{Deserialize, Serialize};

/// Memory layout of the particle field arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    /// Struct-of-arrays: one f64 array per component.
    Soa,
    /// Array-of-structs: `[x, y, z, pad]` records.
    Aos,
}

#[derive(Clone, Debug)]
enum FieldData {
    Soa {
        p_x: Vec<f64>,
        p_y: Vec<f64>,
        p_z: Vec<f64>,
        f_x: Vec<f64>,
        f_y: Vec<f64>,
        f_z: Vec<f64>,
    },
    Aos {
        pos: Vec<[f64; 4]>,
        force: Vec<[f64; 4]>,
    },
}

/// Which field bundle an operation touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    /// Positions: overwritten on ghosts every step.
    Positions,
    /// Forces: zeroed at step start, accumulated, folded back to owners.
    Forces,
}

/// Per-cell contiguous particle storage.
#[derive(Clone, Debug)]
pub struct ParticleStore {
    layout: Layout,
    /// Prefix ranges, length `n_cells + 1`; cell c owns `range[c]..range[c+1]`.
    range: Vec<usize>,
    data: FieldData,
}

impl ParticleStore {
    /// Empty store with `n_cells` empty cells.
    pub fn new(layout: Layout, n_cells: usize) -> Self {
        let data = match layout {
            Layout::Soa => FieldData::Soa {
                p_x: Vec::new(),
                p_y: Vec::new(),
                p_z: Vec::new(),
                f_x: Vec::new(),
                f_y: Vec::new(),
                f_z: Vec::new(),
            },
            Layout::Aos => FieldData::Aos {
                pos: Vec::new(),
                force: Vec::new(),
            },
        };
        Self {
            layout,
            range: vec![0; n_cells + 1],
            data,
        }
    }

    /// Store populated from per-cell position lists; forces start at zero.
    pub fn from_cells(layout: Layout, cells: &[Vec<[f64; 3]>]) -> Self {
        let mut store = Self::new(layout, cells.len());
        let counts: Vec<usize> = cells.iter().map(Vec::len).collect();
        store.rebuild(&counts);
        let mut i = 0;
        for cell in cells {
            for &p in cell {
                store.set_position(i, p);
                i += 1;
            }
        }
        store
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Total particles, ghosts included.
    pub fn len(&self) -> usize {
        *self.range.last().expect("range prefix is never empty")
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn n_cells(&self) -> usize {
        self.range.len() - 1
    }

    /// Index range owned by cell `c`.
    pub fn cell_range(&self, c: usize) -> std::ops::Range<usize> {
        self.range[c]..self.range[c + 1]
    }

    pub fn cell_count(&self, c: usize) -> usize {
        self.range[c + 1] - self.range[c]
    }

    /// The raw prefix array (length `n_cells + 1`).
    pub fn cell_ranges(&self) -> &[usize] {
        &self.range
    }

    /// Re-bucket the store with new counts for the listed cells, keeping
    /// surviving per-cell prefixes and zero-filling growth. Used by the
    /// ghost-size synchronization after each direction.
    pub fn set_cell_counts_for(&mut self, cells: &[usize], counts: &[usize]) {
        debug_assert_eq!(cells.len(), counts.len());
        let mut new_counts: Vec<usize> = (0..self.n_cells()).map(|c| self.cell_count(c)).collect();
        for (&c, &n) in cells.iter().zip(counts) {
            new_counts[c] = n;
        }
        self.rebuild(&new_counts);
    }

    fn rebuild(&mut self, counts: &[usize]) {
        debug_assert_eq!(counts.len(), self.n_cells());
        let mut new_range = Vec::with_capacity(counts.len() + 1);
        let mut total = 0usize;
        new_range.push(0);
        for &n in counts {
            total += n;
            new_range.push(total);
        }

        match &mut self.data {
            FieldData::Soa {
                p_x,
                p_y,
                p_z,
                f_x,
                f_y,
                f_z,
            } => {
                for arr in [p_x, p_y, p_z, f_x, f_y, f_z] {
                    let mut fresh = vec![0.0; total];
                    for c in 0..counts.len() {
                        let old = self.range[c]..self.range[c + 1];
                        let keep = counts[c].min(old.len());
                        let dst = new_range[c];
                        fresh[dst..dst + keep].copy_from_slice(&arr[old.start..old.start + keep]);
                    }
                    *arr = fresh;
                }
            }
            FieldData::Aos { pos, force } => {
                for arr in [pos, force] {
                    let mut fresh = vec![[0.0; 4]; total];
                    for c in 0..counts.len() {
                        let old = self.range[c]..self.range[c + 1];
                        let keep = counts[c].min(old.len());
                        let dst = new_range[c];
                        fresh[dst..dst + keep].copy_from_slice(&arr[old.start..old.start + keep]);
                    }
                    *arr = fresh;
                }
            }
        }
        self.range = new_range;
    }

    /// Set all force components to zero (step start).
    pub fn zero_forces(&mut self) {
        match &mut self.data {
            FieldData::Soa { f_x, f_y, f_z, .. } => {
                for arr in [f_x, f_y, f_z] {
                    arr.iter_mut().for_each(|f| *f = 0.0);
                }
            }
            FieldData::Aos { force, .. } => {
                force.iter_mut().for_each(|f| *f = [0.0; 4]);
            }
        }
    }

    pub fn position(&self, i: usize) -> [f64; 3] {
        match &self.data {
            FieldData::Soa { p_x, p_y, p_z, .. } => [p_x[i], p_y[i], p_z[i]],
            FieldData::Aos { pos, .. } => [pos[i][0], pos[i][1], pos[i][2]],
        }
    }

    pub fn set_position(&mut self, i: usize, p: [f64; 3]) {
        match &mut self.data {
            FieldData::Soa { p_x, p_y, p_z, .. } => {
                p_x[i] = p[0];
                p_y[i] = p[1];
                p_z[i] = p[2];
            }
            FieldData::Aos { pos, .. } => {
                pos[i][0] = p[0];
                pos[i][1] = p[1];
                pos[i][2] = p[2];
            }
        }
    }

    pub fn force(&self, i: usize) -> [f64; 3] {
        match &self.data {
            FieldData::Soa { f_x, f_y, f_z, .. } => [f_x[i], f_y[i], f_z[i]],
            FieldData::Aos { force, .. } => [force[i][0], force[i][1], force[i][2]],
        }
    }

    pub fn set_force(&mut self, i: usize, f: [f64; 3]) {
        match &mut self.data {
            FieldData::Soa { f_x, f_y, f_z, .. } => {
                f_x[i] = f[0];
                f_y[i] = f[1];
                f_z[i] = f[2];
            }
            FieldData::Aos { force, .. } => {
                force[i][0] = f[0];
                force[i][1] = f[1];
                force[i][2] = f[2];
            }
        }
    }

    pub fn add_force(&mut self, i: usize, f: [f64; 3]) {
        match &mut self.data {
            FieldData::Soa { f_x, f_y, f_z, .. } => {
                f_x[i] += f[0];
                f_y[i] += f[1];
                f_z[i] += f[2];
            }
            FieldData::Aos { force, .. } => {
                force[i][0] += f[0];
                force[i][1] += f[1];
                force[i][2] += f[2];
            }
        }
    }

    /// SoA component views for one field. Panics on an AoS store; kernel
    /// selection ties the caller to the store layout.
    pub(crate) fn soa_views(&self, field: Field) -> [&[f64]; 3] {
        match (&self.data, field) {
            (FieldData::Soa { p_x, p_y, p_z, .. }, Field::Positions) => [p_x, p_y, p_z],
            (FieldData::Soa { f_x, f_y, f_z, .. }, Field::Forces) => [f_x, f_y, f_z],
            (FieldData::Aos { .. }, _) => panic!("SoA view requested from an AoS store"),
        }
    }

    pub(crate) fn soa_views_mut(&mut self, field: Field) -> [&mut [f64]; 3] {
        match (&mut self.data, field) {
            (FieldData::Soa { p_x, p_y, p_z, .. }, Field::Positions) => [p_x, p_y, p_z],
            (FieldData::Soa { f_x, f_y, f_z, .. }, Field::Forces) => [f_x, f_y, f_z],
            (FieldData::Aos { .. }, _) => panic!("SoA view requested from an AoS store"),
        }
    }

    /// AoS record view for one field. Panics on an SoA store.
    pub(crate) fn aos_view(&self, field: Field) -> &[[f64; 4]] {
        match (&self.data, field) {
            (FieldData::Aos { pos, .. }, Field::Positions) => pos,
            (FieldData::Aos { force, .. }, Field::Forces) => force,
            (FieldData::Soa { .. }, _) => panic!("AoS view requested from an SoA store"),
        }
    }

    pub(crate) fn aos_view_mut(&mut self, field: Field) -> &mut [[f64; 4]] {
        match (&mut self.data, field) {
            (FieldData::Aos { pos, .. }, Field::Positions) => pos,
            (FieldData::Aos { force, .. }, Field::Forces) => force,
            (FieldData::Soa { .. }, _) => panic!("AoS view requested from an SoA store"),
        }
    }
}
