// SPDX-License-Identifier: AGPL-3.0-only

//! Inter-process communication backends.
//!
//! The ghost exchange is written against the [`Communicator`] trait so the
//! same protocol code runs over MPI in production and over an in-process
//! channel world in tests. The trait deliberately exposes only what the
//! exchange needs: rank identity and a *paired* blocking send/receive.
//!
//! `send_first` implements the even/odd rank rule: on a Cartesian grid the
//! two ends of every paired exchange have node positions of opposite
//! parity along the exchanged axis, so one side sends while the other
//! receives and mutual blocking sends cannot occur. Other decompositions
//! must re-verify that property or switch to non-blocking sends.

use std::fmt;

/// Transport-level failure. The exchange wraps this into
/// [`DecompError::Comm`](crate::DecompError::Comm) with axis/direction/rank
/// context; it is always fatal to the run.
#[derive(Debug)]
pub struct CommFailure {
    /// Transport description of what went wrong.
    pub message: String,
}

impl CommFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CommFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Paired point-to-point communication between grid neighbors.
pub trait Communicator {
    /// This process's rank in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of cooperating processes.
    fn size(&self) -> usize;

    /// Blocking paired exchange of field data. Sends `send` to rank `to`
    /// and fills `recv` from rank `from`; `send_first` selects which half
    /// runs first (even/odd rule). Both sides block until transfer
    /// completes; there is no timeout.
    fn send_recv(
        &self,
        send: &[f64],
        to: usize,
        recv: &mut [f64],
        from: usize,
        send_first: bool,
    ) -> Result<(), CommFailure>;

    /// Blocking paired exchange of per-cell particle counts.
    fn send_recv_counts(
        &self,
        send: &[u64],
        to: usize,
        recv: &mut [u64],
        from: usize,
        send_first: bool,
    ) -> Result<(), CommFailure>;
}

/// The one-process world. Every neighbor is this process itself, so an
/// exchange is a buffer copy. This is also the loopback transport for the
/// staged (non-zero-copy) periodic-intra path.
#[derive(Debug, Default)]
pub struct SerialComm;

impl SerialComm {
    fn copy<T: Copy>(send: &[T], to: usize, recv: &mut [T], from: usize) -> Result<(), CommFailure> {
        if to != 0 || from != 0 {
            return Err(CommFailure::new(format!(
                "serial world has only rank 0, got to={to} from={from}"
            )));
        }
        if send.len() != recv.len() {
            return Err(CommFailure::new(format!(
                "self-exchange length mismatch: send {} vs recv {}",
                send.len(),
                recv.len()
            )));
        }
        recv.copy_from_slice(send);
        Ok(())
    }
}

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send_recv(
        &self,
        send: &[f64],
        to: usize,
        recv: &mut [f64],
        from: usize,
        _send_first: bool,
    ) -> Result<(), CommFailure> {
        Self::copy(send, to, recv, from)
    }

    fn send_recv_counts(
        &self,
        send: &[u64],
        to: usize,
        recv: &mut [u64],
        from: usize,
        _send_first: bool,
    ) -> Result<(), CommFailure> {
        Self::copy(send, to, recv, from)
    }
}

/// MPI world communicator backend (rsmpi).
///
/// The caller must initialize MPI before construction:
///
/// ```ignore
/// let _universe = mpi::initialize().expect("MPI init failed");
/// let comm = MpiComm::world();
/// ```
///
/// rsmpi inherits MPI's default error handler, which aborts the job on any
/// communication failure; a stale halo is never an acceptable fallback, so
/// that is the required behavior here.
#[cfg(feature = "mpi")]
pub struct MpiComm {
    world: mpi::topology::SimpleCommunicator,
}

#[cfg(feature = "mpi")]
impl MpiComm {
    /// Wrap the MPI world communicator. Panics if MPI is uninitialized.
    pub fn world() -> Self {
        use mpi::traits::Communicator as _;
        let world = mpi::topology::SimpleCommunicator::world();
        log::info!("MPI world: rank {} of {}", world.rank(), world.size());
        Self { world }
    }
}

#[cfg(feature = "mpi")]
impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        use mpi::traits::Communicator as _;
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        use mpi::traits::Communicator as _;
        self.world.size() as usize
    }

    fn send_recv(
        &self,
        send: &[f64],
        to: usize,
        recv: &mut [f64],
        from: usize,
        send_first: bool,
    ) -> Result<(), CommFailure> {
        use mpi::traits::{Communicator as _, Destination, Source};
        let dst = self.world.process_at_rank(to as i32);
        let src = self.world.process_at_rank(from as i32);
        if send_first {
            dst.send(send);
            src.receive_into(recv);
        } else {
            src.receive_into(recv);
            dst.send(send);
        }
        Ok(())
    }

    fn send_recv_counts(
        &self,
        send: &[u64],
        to: usize,
        recv: &mut [u64],
        from: usize,
        send_first: bool,
    ) -> Result<(), CommFailure> {
        use mpi::traits::{Communicator as _, Destination, Source};
        let dst = self.world.process_at_rank(to as i32);
        let src = self.world.process_at_rank(from as i32);
        if send_first {
            dst.send(send);
            src.receive_into(recv);
        } else {
            src.receive_into(recv);
            dst.send(send);
        }
        Ok(())
    }
}
