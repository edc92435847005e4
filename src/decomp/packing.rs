// SPDX-License-Identifier: AGPL-3.0-only

//! Pack/unpack kernels bridging the cell-bucketed particle store and the
//! flat f64 wire buffers.
//!
//! Each layout has its own kernel with its own buffer shape:
//!
//! | layout | lane width | buffer shape                            |
//! |--------|-----------:|-----------------------------------------|
//! | SoA    |          3 | `[all x][all y][all z]` over the cell list |
//! | AoS    |          4 | `[x, y, z, pad]` records in cell order   |
//!
//! A pack over cell list `L` followed by an unpack in `Insert` mode over a
//! list with identical per-cell counts reproduces the packed components
//! exactly; the periodic shift is applied at pack time only, so the
//! reverse (force) path folds raw values.

use crate::decomp::store::{Field, Layout, ParticleStore};

/// What an unpack does with incoming lanes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnpackMode {
    /// Overwrite the destination (ghost positions).
    Insert,
    /// Accumulate into the destination (real forces).
    Add,
}

/// Layout-specific transfer between store and wire buffer.
///
/// `pack`/`unpack` return the number of f64 lanes consumed, which both
/// ends can derive from the shared per-cell counts. Buffers must be sized
/// to at least `lane_width * total count` over the cell list.
pub trait PackingKernel: Send + Sync {
    /// f64 lanes per particle on the wire.
    fn lane_width(&self) -> usize;

    /// Pack `field` of all particles in `cells` into `buf`, adding
    /// `shift` to positions. Returns lanes written.
    fn pack(
        &self,
        store: &ParticleStore,
        cells: &[usize],
        field: Field,
        shift: [f64; 3],
        buf: &mut [f64],
    ) -> usize;

    /// Unpack `buf` into `field` of all particles in `cells`. Returns
    /// lanes read.
    fn unpack(
        &self,
        store: &mut ParticleStore,
        cells: &[usize],
        field: Field,
        mode: UnpackMode,
        buf: &[f64],
    ) -> usize;

    /// Periodic-intra shortcut: copy positions from `reals` to `ghosts`
    /// cell by cell with `shift` applied, no wire buffer.
    fn copy_intra(
        &self,
        store: &mut ParticleStore,
        reals: &[usize],
        ghosts: &[usize],
        shift: [f64; 3],
    );

    /// Periodic-intra reverse: accumulate ghost forces into the paired
    /// real cells, never shifted.
    fn fold_forces_intra(&self, store: &mut ParticleStore, reals: &[usize], ghosts: &[usize]);
}

/// Kernel for the chosen layout.
pub fn kernel_for(layout: Layout) -> Box<dyn PackingKernel> {
    match layout {
        Layout::Soa => Box::new(SoaKernel),
        Layout::Aos => Box::new(AosKernel),
    }
}

fn total_count(store: &ParticleStore, cells: &[usize]) -> usize {
    cells.iter().map(|&c| store.cell_count(c)).sum()
}

/// Component-blocked kernel for [`Layout::Soa`] stores.
pub struct SoaKernel;

impl PackingKernel for SoaKernel {
    fn lane_width(&self) -> usize {
        3
    }

    fn pack(
        &self,
        store: &ParticleStore,
        cells: &[usize],
        field: Field,
        shift: [f64; 3],
        buf: &mut [f64],
    ) -> usize {
        let n = total_count(store, cells);
        debug_assert!(
            buf.len() >= 3 * n,
            "pack buffer holds {} lanes, need {}",
            buf.len(),
            3 * n
        );
        let views = store.soa_views(field);
        for dim in 0..3 {
            let src = views[dim];
            let s = shift[dim];
            let base = dim * n;
            let mut out = base;
            for &c in cells {
                for i in store.cell_range(c) {
                    buf[out] = src[i] + s;
                    out += 1;
                }
            }
        }
        3 * n
    }

    fn unpack(
        &self,
        store: &mut ParticleStore,
        cells: &[usize],
        field: Field,
        mode: UnpackMode,
        buf: &[f64],
    ) -> usize {
        let n = total_count(store, cells);
        debug_assert!(
            buf.len() >= 3 * n,
            "unpack buffer holds {} lanes, need {}",
            buf.len(),
            3 * n
        );
        let ranges: Vec<std::ops::Range<usize>> =
            cells.iter().map(|&c| store.cell_range(c)).collect();
        let views = store.soa_views_mut(field);
        let mut dim = 0;
        for dst in views {
            let base = dim * n;
            let mut inp = base;
            for r in &ranges {
                for i in r.clone() {
                    match mode {
                        UnpackMode::Insert => dst[i] = buf[inp],
                        UnpackMode::Add => dst[i] += buf[inp],
                    }
                    inp += 1;
                }
            }
            dim += 1;
        }
        3 * n
    }

    fn copy_intra(
        &self,
        store: &mut ParticleStore,
        reals: &[usize],
        ghosts: &[usize],
        shift: [f64; 3],
    ) {
        let pairs = intra_pairs(store, reals, ghosts);
        let views = store.soa_views_mut(Field::Positions);
        let mut dim = 0;
        for arr in views {
            let s = shift[dim];
            for &(src, dst) in &pairs {
                arr[dst] = arr[src] + s;
            }
            dim += 1;
        }
    }

    fn fold_forces_intra(&self, store: &mut ParticleStore, reals: &[usize], ghosts: &[usize]) {
        let pairs = intra_pairs(store, reals, ghosts);
        let views = store.soa_views_mut(Field::Forces);
        for arr in views {
            for &(real, ghost) in &pairs {
                arr[real] += arr[ghost];
            }
        }
    }
}

/// Record-blocked kernel for [`Layout::Aos`] stores. The pad lane travels
/// on the wire so a record stays one aligned unit end to end.
pub struct AosKernel;

impl PackingKernel for AosKernel {
    fn lane_width(&self) -> usize {
        4
    }

    fn pack(
        &self,
        store: &ParticleStore,
        cells: &[usize],
        field: Field,
        shift: [f64; 3],
        buf: &mut [f64],
    ) -> usize {
        let n = total_count(store, cells);
        debug_assert!(
            buf.len() >= 4 * n,
            "pack buffer holds {} lanes, need {}",
            buf.len(),
            4 * n
        );
        let src = store.aos_view(field);
        let mut out = 0;
        for &c in cells {
            for i in store.cell_range(c) {
                let r = src[i];
                buf[out] = r[0] + shift[0];
                buf[out + 1] = r[1] + shift[1];
                buf[out + 2] = r[2] + shift[2];
                buf[out + 3] = r[3];
                out += 4;
            }
        }
        out
    }

    fn unpack(
        &self,
        store: &mut ParticleStore,
        cells: &[usize],
        field: Field,
        mode: UnpackMode,
        buf: &[f64],
    ) -> usize {
        let n = total_count(store, cells);
        debug_assert!(
            buf.len() >= 4 * n,
            "unpack buffer holds {} lanes, need {}",
            buf.len(),
            4 * n
        );
        let ranges: Vec<std::ops::Range<usize>> =
            cells.iter().map(|&c| store.cell_range(c)).collect();
        let dst = store.aos_view_mut(field);
        let mut inp = 0;
        for r in &ranges {
            for i in r.clone() {
                match mode {
                    UnpackMode::Insert => {
                        dst[i][0] = buf[inp];
                        dst[i][1] = buf[inp + 1];
                        dst[i][2] = buf[inp + 2];
                        dst[i][3] = buf[inp + 3];
                    }
                    UnpackMode::Add => {
                        dst[i][0] += buf[inp];
                        dst[i][1] += buf[inp + 1];
                        dst[i][2] += buf[inp + 2];
                    }
                }
                inp += 4;
            }
        }
        inp
    }

    fn copy_intra(
        &self,
        store: &mut ParticleStore,
        reals: &[usize],
        ghosts: &[usize],
        shift: [f64; 3],
    ) {
        let pairs = intra_pairs(store, reals, ghosts);
        let pos = store.aos_view_mut(Field::Positions);
        for &(src, dst) in &pairs {
            let r = pos[src];
            pos[dst] = [r[0] + shift[0], r[1] + shift[1], r[2] + shift[2], r[3]];
        }
    }

    fn fold_forces_intra(&self, store: &mut ParticleStore, reals: &[usize], ghosts: &[usize]) {
        let pairs = intra_pairs(store, reals, ghosts);
        let force = store.aos_view_mut(Field::Forces);
        for &(real, ghost) in &pairs {
            let g = force[ghost];
            force[real][0] += g[0];
            force[real][1] += g[1];
            force[real][2] += g[2];
        }
    }
}

/// Particle index pairs (real, ghost) for a matched cell-list pair. The
/// size synchronization guarantees equal per-cell counts beforehand.
fn intra_pairs(store: &ParticleStore, reals: &[usize], ghosts: &[usize]) -> Vec<(usize, usize)> {
    debug_assert_eq!(reals.len(), ghosts.len());
    let mut pairs = Vec::new();
    for (&rc, &gc) in reals.iter().zip(ghosts) {
        debug_assert_eq!(
            store.cell_count(rc),
            store.cell_count(gc),
            "intra cell pair ({rc}, {gc}) counts differ"
        );
        for (ri, gi) in store.cell_range(rc).zip(store.cell_range(gc)) {
            pairs.push((ri, gi));
        }
    }
    pairs
}

/// Exact lane count a direction's buffers need.
pub(crate) fn lanes_needed(store: &ParticleStore, cells: &[usize], lane_width: usize) -> usize {
    lane_width * total_count(store, cells)
}
