// SPDX-License-Identifier: AGPL-3.0-only

//! haloForge: spatial decomposition and ghost-particle synchronization
//!
//! The inter-process layer of an SPMD soft-matter MD engine: partitions a
//! periodic 3-D box among worker processes, maintains a cutoff-sized cell
//! list with a one-cell halo per process, and keeps each process's view of
//! neighboring boundary particles ("ghosts") synchronized every step.
//!
//! ## Per-step control flow
//!
//! ```text
//! integrator step:
//!   update_ghosts()          real → ghost positions, axis order x,y,z
//!   <force evaluation>       (external, consumes synchronized positions)
//!   collect_ghost_forces()   ghost → real forces,    axis order z,y,x
//! ```
//!
//! The staged axis order is load-bearing: later axes forward data that
//! just arrived as ghosts from earlier axes, which is what fills
//! diagonal/corner ghost cells through face-only communication.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `config` | Box/grid/cutoff configuration and derived cell counts |
//! | `comm` | Communicator trait; serial world; MPI backend (`mpi` feature) |
//! | `decomp` | Process grid, cell grid, packing kernels, ghost exchange |
//! | `error` | Typed failure modes (grid mismatch, halo, communication) |
//! | `tolerances` | Centralized float tolerances for validation tests |

pub mod comm;
pub mod config;
pub mod decomp;
pub mod error;
pub mod tolerances;

pub use comm::{CommFailure, Communicator, SerialComm};
pub use config::DecompConfig;
pub use decomp::exchange::{GhostExchange, GridObserver, IntraPath};
pub use decomp::store::{Layout, ParticleStore};
pub use error::DecompError;
