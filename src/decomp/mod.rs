// SPDX-License-Identifier: AGPL-3.0-only

//! Domain decomposition: process grid, halo cell grid, communication cell
//! index, packing kernels, and the six-direction ghost exchange.
//!
//! Ownership: this layer owns only index metadata and communication
//! scratch buffers. The vectorized particle store is owned by a sibling
//! (the force/neighbor-list machinery) and is referenced here through
//! `(begin, end)` cell ranges, never through particle memory of its own.

pub mod cell_grid;
pub mod comm_index;
pub mod exchange;
pub mod node_grid;
pub mod packing;
pub mod store;

pub use cell_grid::CellGrid;
pub use comm_index::{CommCellIndex, DirCells};
pub use exchange::{GhostExchange, GridObserver, IntraPath};
pub use node_grid::ProcessGrid;
pub use packing::{kernel_for, AosKernel, PackingKernel, SoaKernel, UnpackMode};
pub use store::{Field, Layout, ParticleStore};
