// SPDX-License-Identifier: AGPL-3.0-only

//! Process grid: maps the periodic box onto a 3-D grid of worker ranks.
//!
//! Pure and deterministic; no communication happens here. Directions are
//! encoded as `dir = 2*axis + lr` with `lr = 0` toward the lower box face
//! and `lr = 1` toward the upper face, an encoding shared by the cell
//! index and the exchange.

use crate::error::DecompError;

/// One rank's placement in the process grid, with precomputed neighbor
/// ranks and periodic boundary shifts for all six directions.
#[derive(Clone, Debug)]
pub struct ProcessGrid {
    size: [usize; 3],
    position: [usize; 3],
    rank: usize,
    neighbors: [usize; 6],
    /// +1 on the lower box face, -1 on the upper, 0 in the interior.
    /// Multiplied by the box edge this is the coordinate shift a ghost
    /// copy picks up when it crosses the periodic boundary.
    boundary: [i32; 6],
    box_edge: [f64; 3],
    sub_edge: [f64; 3],
    my_left: [f64; 3],
    my_right: [f64; 3],
}

impl ProcessGrid {
    /// Build the grid for `rank` of `comm_size`. Fatal if the grid volume
    /// does not match the communicator size.
    ///
    /// Rank layout is column-major: `rank = p0 + s0*(p1 + s1*p2)`.
    pub fn new(
        size: [usize; 3],
        box_edge: [f64; 3],
        rank: usize,
        comm_size: usize,
    ) -> Result<Self, DecompError> {
        let volume: usize = size.iter().product();
        if volume != comm_size {
            return Err(DecompError::GridCommMismatch {
                grid: size,
                comm_size,
            });
        }
        debug_assert!(rank < comm_size);

        let position = [
            rank % size[0],
            (rank / size[0]) % size[1],
            rank / (size[0] * size[1]),
        ];

        let rank_of = |p: [usize; 3]| p[0] + size[0] * (p[1] + size[1] * p[2]);

        let mut neighbors = [0usize; 6];
        let mut boundary = [0i32; 6];
        for axis in 0..3 {
            let mut lower = position;
            lower[axis] = (position[axis] + size[axis] - 1) % size[axis];
            let mut upper = position;
            upper[axis] = (position[axis] + 1) % size[axis];
            neighbors[2 * axis] = rank_of(lower);
            neighbors[2 * axis + 1] = rank_of(upper);
            if position[axis] == 0 {
                boundary[2 * axis] = 1;
            }
            if position[axis] == size[axis] - 1 {
                boundary[2 * axis + 1] = -1;
            }
        }

        let mut sub_edge = [0.0; 3];
        let mut my_left = [0.0; 3];
        let mut my_right = [0.0; 3];
        for axis in 0..3 {
            sub_edge[axis] = box_edge[axis] / size[axis] as f64;
            my_left[axis] = position[axis] as f64 * sub_edge[axis];
            my_right[axis] = my_left[axis] + sub_edge[axis];
        }

        log::info!(
            "process grid {}x{}x{}: rank {rank} at ({}, {}, {}), sub-box [{:.3}, {:.3}) x [{:.3}, {:.3}) x [{:.3}, {:.3})",
            size[0], size[1], size[2],
            position[0], position[1], position[2],
            my_left[0], my_right[0], my_left[1], my_right[1], my_left[2], my_right[2],
        );
        log::debug!(
            "neighbors: x {}<->{}, y {}<->{}, z {}<->{}",
            neighbors[0], neighbors[1], neighbors[2], neighbors[3], neighbors[4], neighbors[5],
        );

        Ok(Self {
            size,
            position,
            rank,
            neighbors,
            boundary,
            box_edge,
            sub_edge,
            my_left,
            my_right,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size_along(&self, axis: usize) -> usize {
        self.size[axis]
    }

    pub fn position_along(&self, axis: usize) -> usize {
        self.position[axis]
    }

    /// True when both logical neighbors on `axis` are this same rank, so
    /// "communication" degenerates to a local shifted copy.
    pub fn is_periodic_intra(&self, axis: usize) -> bool {
        self.size[axis] == 1
    }

    /// Neighbor rank in direction `dir = 2*axis + lr`.
    pub fn neighbor(&self, dir: usize) -> usize {
        self.neighbors[dir]
    }

    /// Coordinate shift a position picks up when copied outward in `dir`.
    /// Zero for interior boundaries; +/- the box edge across the wrap.
    pub fn shift(&self, dir: usize) -> [f64; 3] {
        let axis = dir / 2;
        let mut s = [0.0; 3];
        s[axis] = f64::from(self.boundary[dir]) * self.box_edge[axis];
        s
    }

    /// Lower corner of the owned sub-box.
    pub fn my_left(&self) -> [f64; 3] {
        self.my_left
    }

    /// Upper corner of the owned sub-box.
    pub fn my_right(&self) -> [f64; 3] {
        self.my_right
    }

    /// Per-process sub-box edge lengths.
    pub fn sub_edge(&self) -> [f64; 3] {
        self.sub_edge
    }
}
