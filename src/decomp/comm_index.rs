// SPDX-License-Identifier: AGPL-3.0-only

//! Communication cell index: per direction, the parallel lists of real
//! cells to expose and ghost cells to receive into, plus the deduplicated
//! unique-cell set.
//!
//! List k of `reals` pairs with list k of `ghosts` at the matching spatial
//! offset; the exchange relies on that pairing both for the zero-copy
//! periodic-intra path and for deriving payload lengths on both ends
//! without any wire framing.
//!
//! Perpendicular extents grow with the axis stage: an axis processed
//! earlier contributes its full frame (halo included) to the boundary
//! slabs of later axes. That is what routes corner/edge data through
//! face-only exchanges.

use super::cell_grid::CellGrid;
use super::node_grid::ProcessGrid;

/// Parallel real/ghost cell lists for one direction, plus the particle
/// totals filled in from the store by buffer preparation.
#[derive(Clone, Debug, Default)]
pub struct DirCells {
    /// Real cells exposed in this direction, fixed enumeration order.
    pub reals: Vec<usize>,
    /// Ghost cells received into (opposite face), same order and length.
    pub ghosts: Vec<usize>,
    /// Total particles currently in `reals` (send payload size).
    pub num_reals: usize,
    /// Total particles currently in `ghosts` (receive payload size).
    pub num_ghosts: usize,
}

/// The six per-direction lists and the unique-cell set.
#[derive(Clone, Debug)]
pub struct CommCellIndex {
    pub dirs: [DirCells; 6],
    /// All local cells minus ghost cells that are periodic self-images on
    /// a periodic-intra axis; a physical location appears exactly once.
    pub unique_cells: Vec<usize>,
}

impl CommCellIndex {
    /// Enumerate the boundary slabs for all six directions and compute the
    /// unique-cell set. Idempotent; rebuilt on any geometry change.
    pub fn build(grid: &CellGrid, nodes: &ProcessGrid) -> Self {
        let mut dirs: [DirCells; 6] = Default::default();

        for coord in 0..3 {
            // Perpendicular extents: full frame for axes already staged,
            // inner-only for axes still to come.
            let mut lb = [0usize; 3];
            let mut rb = [0usize; 3];
            for offset in 1..=2 {
                let other = (coord + offset) % 3;
                if other < coord {
                    lb[other] = 0;
                    rb[other] = grid.frame_size(other);
                } else {
                    lb[other] = 1;
                    rb[other] = 1 + grid.inner_size(other);
                }
            }

            for lr in 0..2 {
                let dir = 2 * coord + lr;
                let inner_end = 1 + grid.inner_size(coord);

                // Boundary layer of real cells on this face.
                if lr == 0 {
                    lb[coord] = 1;
                    rb[coord] = 2;
                } else {
                    lb[coord] = inner_end - 1;
                    rb[coord] = inner_end;
                }
                dirs[dir].reals = collect_slab(grid, lb, rb);

                // Halo layer on the opposite face: what arrives from the
                // neighbor opposite to the send direction.
                if lr == 0 {
                    lb[coord] = inner_end;
                    rb[coord] = inner_end + 1;
                } else {
                    lb[coord] = 0;
                    rb[coord] = 1;
                }
                dirs[dir].ghosts = collect_slab(grid, lb, rb);

                debug_assert_eq!(dirs[dir].reals.len(), dirs[dir].ghosts.len());
            }
        }

        let unique_cells = unique_cells(grid, nodes, &dirs);

        Self { dirs, unique_cells }
    }
}

/// Cells of the axis-aligned slab `[lb, rb)`, enumerated z-outer, y, x.
/// Both lists of a direction use the same perpendicular extents and order,
/// so offsets pair up.
fn collect_slab(grid: &CellGrid, lb: [usize; 3], rb: [usize; 3]) -> Vec<usize> {
    let mut cells =
        Vec::with_capacity((rb[0] - lb[0]) * (rb[1] - lb[1]) * (rb[2] - lb[2]));
    for z in lb[2]..rb[2] {
        for y in lb[1]..rb[1] {
            for x in lb[0]..rb[0] {
                cells.push(grid.index(x, y, z));
            }
        }
    }
    cells
}

/// Mark redundant every ghost cell appearing in a periodic-intra axis's
/// ghost lists; retain everything not marked. Marking is additive across
/// axes and can never touch a real cell (real cells are not in any ghost
/// list).
fn unique_cells(grid: &CellGrid, nodes: &ProcessGrid, dirs: &[DirCells; 6]) -> Vec<usize> {
    let mut redundant = vec![false; grid.n_local_cells()];
    for axis in 0..3 {
        if !nodes.is_periodic_intra(axis) {
            continue;
        }
        for lr in 0..2 {
            for &cell in &dirs[2 * axis + lr].ghosts {
                redundant[cell] = true;
            }
        }
    }
    (0..grid.n_local_cells())
        .filter(|&c| !redundant[c])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(node_grid: [usize; 3], comm_size: usize) -> (CellGrid, ProcessGrid) {
        let nodes = ProcessGrid::new(node_grid, [8.0; 3], 0, comm_size).unwrap();
        let grid = CellGrid::new([2, 2, 2], nodes.my_left(), nodes.sub_edge());
        (grid, nodes)
    }

    #[test]
    fn pairing_invariant_all_directions() {
        let (grid, nodes) = setup([1, 1, 1], 1);
        let idx = CommCellIndex::build(&grid, &nodes);
        for dir in 0..6 {
            assert_eq!(
                idx.dirs[dir].reals.len(),
                idx.dirs[dir].ghosts.len(),
                "direction {dir}"
            );
        }
    }

    #[test]
    fn slab_sizes_grow_with_stage() {
        // inner 2^3, frame 4^3: x slabs are 1x2x2, y slabs 4x1x2 (x done),
        // z slabs 4x4x1 (x and y done).
        let (grid, nodes) = setup([1, 1, 1], 1);
        let idx = CommCellIndex::build(&grid, &nodes);
        assert_eq!(idx.dirs[0].reals.len(), 4);
        assert_eq!(idx.dirs[2].reals.len(), 8);
        assert_eq!(idx.dirs[4].reals.len(), 16);
    }

    #[test]
    fn ghost_lists_hold_only_ghost_cells() {
        let (grid, nodes) = setup([1, 1, 1], 1);
        let idx = CommCellIndex::build(&grid, &nodes);
        let ghost_set: std::collections::HashSet<_> =
            grid.ghost_cells().iter().copied().collect();
        for dir in 0..6 {
            for &c in &idx.dirs[dir].ghosts {
                assert!(ghost_set.contains(&c), "direction {dir} ghost list holds cell {c}");
            }
        }
        // The first staged axis exposes inner cells only; later axes also
        // forward halo cells filled by earlier stages.
        for dir in 0..2 {
            for &c in &idx.dirs[dir].reals {
                assert!(!ghost_set.contains(&c), "x-direction real list holds ghost {c}");
            }
        }
    }

    #[test]
    fn unique_equals_reals_on_single_process() {
        // 1x1x1: all three axes are periodic-intra, every ghost cell is a
        // self-image of some real cell, so unique == real cells.
        let (grid, nodes) = setup([1, 1, 1], 1);
        let idx = CommCellIndex::build(&grid, &nodes);
        assert_eq!(idx.unique_cells, grid.real_cells());
    }

    #[test]
    fn unique_keeps_interrank_face_ghosts() {
        // 2x1x1: x is inter-rank, its face ghosts hold remote data and
        // stay unique; y/z self-images are excluded.
        let (grid, nodes) = setup([2, 1, 1], 2);
        let idx = CommCellIndex::build(&grid, &nodes);
        // real cells (2*2*2) + x-only ghost cells (2 faces * 2*2)
        assert_eq!(idx.unique_cells.len(), 8 + 8);
        for &c in grid.real_cells() {
            assert!(idx.unique_cells.contains(&c), "real cell {c} must stay unique");
        }
    }
}
