// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for decomposition and ghost-exchange operations.
//!
//! A proper enum instead of `Result<_, String>` so callers can match on
//! failure modes. Every communication-side variant names the offending
//! axis, direction, and rank. An MD trajectory cannot continue on a stale
//! halo, so all of these are fatal to the run.

use std::fmt;

use crate::decomp::store::Layout;

/// Failure modes of the decomposition layer.
#[derive(Debug)]
pub enum DecompError {
    /// Process-grid volume does not match the communicator size.
    GridCommMismatch {
        /// Requested process grid.
        grid: [usize; 3],
        /// Number of ranks in the communicator.
        comm_size: usize,
    },

    /// Halo thickness other than one cell layer was requested.
    UnsupportedHalo {
        /// Requested number of halo layers.
        layers: usize,
    },

    /// Non-periodic axis; the decomposition supports periodic boxes only.
    NonPeriodicAxis {
        /// Offending axis (0 = x, 1 = y, 2 = z).
        axis: usize,
    },

    /// Interaction cutoff does not fit a single cell along the sub-box.
    CutoffTooLarge {
        /// Offending axis.
        axis: usize,
        /// Per-process sub-box edge on that axis.
        sub_edge: f64,
        /// Requested cutoff radius.
        cutoff: f64,
    },

    /// Malformed configuration value (non-positive edge, zero grid, ...).
    BadConfig(String),

    /// Particle store built with a different layout than the exchange.
    LayoutMismatch {
        /// Layout the exchange was configured with.
        expected: Layout,
        /// Layout of the store handed to it.
        got: Layout,
    },

    /// Send/receive cell structure mismatch detected during an exchange.
    CommCellMismatch {
        /// Direction index (2*axis + lr).
        dir: usize,
        /// Number of real cells on the send side.
        reals: usize,
        /// Number of ghost cells on the receive side.
        ghosts: usize,
    },

    /// Point-to-point exchange failed; no retry, no partial resync.
    Comm {
        /// Axis being synchronized when the failure occurred.
        axis: usize,
        /// Direction index (2*axis + lr).
        dir: usize,
        /// Rank reporting the failure.
        rank: usize,
        /// Transport-level description.
        message: String,
    },
}

impl fmt::Display for DecompError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GridCommMismatch { grid, comm_size } => write!(
                f,
                "process grid {}x{}x{} does not match communicator size {comm_size}",
                grid[0], grid[1], grid[2]
            ),
            Self::UnsupportedHalo { layers } => {
                write!(f, "halo thickness {layers} not supported (exactly 1 cell layer)")
            }
            Self::NonPeriodicAxis { axis } => {
                write!(f, "axis {axis} is not periodic; decomposition requires a periodic box")
            }
            Self::CutoffTooLarge { axis, sub_edge, cutoff } => write!(
                f,
                "cutoff {cutoff} exceeds sub-box edge {sub_edge} on axis {axis}; no cell fits"
            ),
            Self::BadConfig(msg) => write!(f, "invalid decomposition config: {msg}"),
            Self::LayoutMismatch { expected, got } => write!(
                f,
                "particle store uses {got:?} layout but the exchange is configured for {expected:?}"
            ),
            Self::CommCellMismatch { dir, reals, ghosts } => write!(
                f,
                "send/recv cell structure mismatch in direction {dir}: {reals} reals vs {ghosts} ghosts"
            ),
            Self::Comm { axis, dir, rank, message } => write!(
                f,
                "ghost exchange failed on axis {axis}, direction {dir}, rank {rank}: {message}"
            ),
        }
    }
}

impl std::error::Error for DecompError {}
