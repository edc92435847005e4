// SPDX-License-Identifier: AGPL-3.0-only

//! Cell grid with a one-cell ghost frame around the owned sub-box.
//!
//! Cells are addressed by integer 3-D position inside the frame grid and
//! linearized as `x + fx*(y + fy*z)`. Inner cells (real) hold owned
//! particles; frame cells (ghost) only ever receive copies.

/// Local cell lattice: inner grid plus one halo layer per face.
#[derive(Clone, Debug)]
pub struct CellGrid {
    inner: [usize; 3],
    frame: [usize; 3],
    cell_size: [f64; 3],
    my_left: [f64; 3],
    real_cells: Vec<usize>,
    ghost_cells: Vec<usize>,
}

impl CellGrid {
    /// Build the lattice for `inner` real cells per axis over the sub-box
    /// starting at `my_left` with edge lengths `sub_edge`.
    pub fn new(inner: [usize; 3], my_left: [f64; 3], sub_edge: [f64; 3]) -> Self {
        let frame = [inner[0] + 2, inner[1] + 2, inner[2] + 2];
        let cell_size = [
            sub_edge[0] / inner[0] as f64,
            sub_edge[1] / inner[1] as f64,
            sub_edge[2] / inner[2] as f64,
        ];

        let mut grid = Self {
            inner,
            frame,
            cell_size,
            my_left,
            real_cells: Vec::new(),
            ghost_cells: Vec::new(),
        };
        grid.mark_cells();

        log::debug!(
            "cell grid: inner {}x{}x{}, frame {}x{}x{}, {} real + {} ghost cells",
            inner[0], inner[1], inner[2],
            frame[0], frame[1], frame[2],
            grid.real_cells.len(),
            grid.ghost_cells.len(),
        );
        grid
    }

    /// Classify every frame cell as real or ghost, ascending index order.
    fn mark_cells(&mut self) {
        let n_real = self.inner.iter().product();
        let n_local = self.n_local_cells();
        self.real_cells = Vec::with_capacity(n_real);
        self.ghost_cells = Vec::with_capacity(n_local - n_real);
        for z in 0..self.frame[2] {
            for y in 0..self.frame[1] {
                for x in 0..self.frame[0] {
                    let idx = self.index(x, y, z);
                    if self.is_inner(x, y, z) {
                        self.real_cells.push(idx);
                    } else {
                        self.ghost_cells.push(idx);
                    }
                }
            }
        }
    }

    /// Linear index of frame-grid position `(x, y, z)`.
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < self.frame[0] && y < self.frame[1] && z < self.frame[2]);
        x + self.frame[0] * (y + self.frame[1] * z)
    }

    /// True if the frame-grid position lies in the inner (real) grid.
    pub fn is_inner(&self, x: usize, y: usize, z: usize) -> bool {
        (1..=self.inner[0]).contains(&x)
            && (1..=self.inner[1]).contains(&y)
            && (1..=self.inner[2]).contains(&z)
    }

    /// Inner cell counts per axis.
    pub fn inner_size(&self, axis: usize) -> usize {
        self.inner[axis]
    }

    /// Frame (inner + halo) cell counts per axis.
    pub fn frame_size(&self, axis: usize) -> usize {
        self.frame[axis]
    }

    /// Total number of local cells, halo included.
    pub fn n_local_cells(&self) -> usize {
        self.frame.iter().product()
    }

    /// Number of real (inner) cells.
    pub fn n_real_cells(&self) -> usize {
        self.real_cells.len()
    }

    /// Indices of real cells, ascending.
    pub fn real_cells(&self) -> &[usize] {
        &self.real_cells
    }

    /// Indices of ghost cells, ascending.
    pub fn ghost_cells(&self) -> &[usize] {
        &self.ghost_cells
    }

    /// Edge lengths of one cell.
    pub fn cell_size(&self) -> [f64; 3] {
        self.cell_size
    }

    /// Map a position in the local frame (halo coordinates included) to
    /// its cell index. Positions outside the frame are clipped to it.
    pub fn cell_of_position(&self, pos: [f64; 3]) -> usize {
        let mut c = [0usize; 3];
        for axis in 0..3 {
            let rel = (pos[axis] - self.my_left[axis]) / self.cell_size[axis];
            // halo layer occupies frame coordinate 0, inner starts at 1
            let shifted = rel + 1.0;
            c[axis] = if shifted < 0.0 {
                0
            } else {
                (shifted as usize).min(self.frame[axis] - 1)
            };
        }
        self.index(c[0], c[1], c[2])
    }
}
