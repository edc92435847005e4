// SPDX-License-Identifier: AGPL-3.0-only

//! Integration tests: multi-process ghost exchange over an in-process
//! channel world.
//!
//! Each rank runs on its own thread with a [`Communicator`] backed by
//! per-ordered-pair mpsc channels. Sends are buffered, so the transport
//! itself cannot deadlock; instead every payload carries the sender's
//! `send_first` choice and the receiver fails the exchange when both
//! partners chose the same order. On a rendezvous transport that
//! situation is two mutual blocking sends, so any regression in the
//! parity rule fails these tests instead of hanging only under MPI.

use std::sync::mpsc;
use std::thread;

use haloforge::decomp::ProcessGrid;
use haloforge::{CommFailure, Communicator, DecompConfig, GhostExchange, ParticleStore};

struct ChannelComm {
    rank: usize,
    size: usize,
    f_tx: Vec<mpsc::Sender<(bool, Vec<f64>)>>,
    f_rx: Vec<mpsc::Receiver<(bool, Vec<f64>)>>,
    u_tx: Vec<mpsc::Sender<(bool, Vec<u64>)>>,
    u_rx: Vec<mpsc::Receiver<(bool, Vec<u64>)>>,
}

/// One communicator per rank, with a dedicated channel for every ordered
/// rank pair (self pairs included, for periodic-intra staged paths).
fn channel_world(n: usize) -> Vec<ChannelComm> {
    let mut f_tx: Vec<Vec<mpsc::Sender<(bool, Vec<f64>)>>> = (0..n).map(|_| Vec::new()).collect();
    let mut f_rx: Vec<Vec<mpsc::Receiver<(bool, Vec<f64>)>>> =
        (0..n).map(|_| Vec::new()).collect();
    let mut u_tx: Vec<Vec<mpsc::Sender<(bool, Vec<u64>)>>> = (0..n).map(|_| Vec::new()).collect();
    let mut u_rx: Vec<Vec<mpsc::Receiver<(bool, Vec<u64>)>>> =
        (0..n).map(|_| Vec::new()).collect();
    for from in 0..n {
        for to in 0..n {
            let (tx, rx) = mpsc::channel();
            f_tx[from].push(tx);
            f_rx[to].push(rx);
            let (tx, rx) = mpsc::channel();
            u_tx[from].push(tx);
            u_rx[to].push(rx);
        }
    }
    // rx lists were pushed in `from` order, one per source rank
    let mut world = Vec::with_capacity(n);
    for (rank, (((f_tx, f_rx), u_tx), u_rx)) in f_tx
        .into_iter()
        .zip(f_rx)
        .zip(u_tx)
        .zip(u_rx)
        .enumerate()
    {
        world.push(ChannelComm {
            rank,
            size: n,
            f_tx,
            f_rx,
            u_tx,
            u_rx,
        });
    }
    world
}

/// Receive one payload, checking that a remote partner chose the opposite
/// send order. Self-exchanges necessarily see their own order and are
/// exempt.
fn recv_into<T: Copy>(
    rx: &mpsc::Receiver<(bool, Vec<T>)>,
    recv: &mut [T],
    my_send_first: bool,
    remote: bool,
) -> Result<(), CommFailure> {
    let (peer_send_first, data) = rx
        .recv()
        .map_err(|e| CommFailure::new(format!("channel closed: {e}")))?;
    if remote && peer_send_first == my_send_first {
        return Err(CommFailure::new(format!(
            "both partners chose send_first = {my_send_first}; mutual blocking sends"
        )));
    }
    if data.len() != recv.len() {
        return Err(CommFailure::new(format!(
            "payload length mismatch: got {}, expected {}",
            data.len(),
            recv.len()
        )));
    }
    recv.copy_from_slice(&data);
    Ok(())
}

impl Communicator for ChannelComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send_recv(
        &self,
        send: &[f64],
        to: usize,
        recv: &mut [f64],
        from: usize,
        send_first: bool,
    ) -> Result<(), CommFailure> {
        self.f_tx[to]
            .send((send_first, send.to_vec()))
            .map_err(|e| CommFailure::new(format!("send to {to} failed: {e}")))?;
        recv_into(&self.f_rx[from], recv, send_first, from != self.rank)
    }

    fn send_recv_counts(
        &self,
        send: &[u64],
        to: usize,
        recv: &mut [u64],
        from: usize,
        send_first: bool,
    ) -> Result<(), CommFailure> {
        self.u_tx[to]
            .send((send_first, send.to_vec()))
            .map_err(|e| CommFailure::new(format!("send to {to} failed: {e}")))?;
        recv_into(&self.u_rx[from], recv, send_first, from != self.rank)
    }
}

/// Run `body` once per rank on its own thread and collect the results.
fn run_world<R, F>(config: DecompConfig, n: usize, body: F) -> Vec<R>
where
    R: Send + 'static,
    F: Fn(usize, &mut GhostExchange<ChannelComm>, &mut ParticleStore) -> R + Send + Sync + 'static,
{
    let _ = env_logger::builder().is_test(true).try_init();
    let body = std::sync::Arc::new(body);
    let mut handles = Vec::with_capacity(n);
    for comm in channel_world(n) {
        let config = config.clone();
        let body = body.clone();
        handles.push(thread::spawn(move || {
            let rank = comm.rank();
            let mut ex = GhostExchange::new(config, comm).expect("exchange setup");
            let mut store = ex.new_store();
            body(rank, &mut ex, &mut store)
        }));
    }
    handles
        .into_iter()
        .map(|h| h.join().expect("rank thread panicked"))
        .collect()
}

fn place(store: &mut ParticleStore, cell: usize, pos: [f64; 3]) {
    let n = store.cell_count(cell);
    store.set_cell_counts_for(&[cell], &[n + 1]);
    store.set_position(store.cell_range(cell).start + n, pos);
}

#[test]
fn corner_ghost_crosses_three_ranks() {
    // 2x2x2 world, box 8^3, cutoff 1.0: rank 0's corner particle must
    // appear on the diagonally opposite rank 7 as a fully shifted image,
    // having traveled through face exchanges only.
    let config = DecompConfig::new([2, 2, 2], [8.0; 3], 1.0);
    let results = run_world(config, 8, |rank, ex, store| {
        if rank == 0 {
            let c = ex.cell_grid().cell_of_position([0.5, 0.5, 0.5]);
            place(store, c, [0.5, 0.5, 0.5]);
        }
        ex.synchronize_ghost_sizes(store).unwrap();
        ex.update_ghosts(store).unwrap();

        let corner = ex.cell_grid().index(5, 5, 5);
        let count = store.cell_count(corner);
        let pos = if count > 0 {
            Some(store.position(store.cell_range(corner).start))
        } else {
            None
        };
        (rank, count, pos)
    });

    for (rank, count, pos) in results {
        if rank == 7 {
            assert_eq!(count, 1, "rank 7 corner halo cell must hold the image");
            assert_eq!(pos, Some([8.5, 8.5, 8.5]));
        }
    }
}

#[test]
fn single_axis_sync_leaves_corners_unfilled() {
    // size synchronization alone allocates the corner slot, but position
    // data only arrives once all three axes are staged
    let config = DecompConfig::new([2, 2, 2], [8.0; 3], 1.0);
    let results = run_world(config, 8, |rank, ex, store| {
        if rank == 0 {
            let c = ex.cell_grid().cell_of_position([0.5, 0.5, 0.5]);
            place(store, c, [0.5, 0.5, 0.5]);
        }
        ex.synchronize_ghost_sizes(store).unwrap();
        ex.sync_positions_axis(store, 0).unwrap();

        let corner = ex.cell_grid().index(5, 5, 5);
        let count = store.cell_count(corner);
        let pos = if count > 0 {
            Some(store.position(store.cell_range(corner).start))
        } else {
            None
        };
        (rank, count, pos)
    });

    for (rank, count, pos) in results {
        if rank == 7 {
            assert_eq!(count, 1, "size sync must still propagate occupancy");
            assert_eq!(pos, Some([0.0, 0.0, 0.0]), "position must not have arrived");
        }
    }
}

#[test]
fn face_neighbor_ghosts_and_force_fold_two_ranks() {
    // 2x1x1 world, box (8,4,4): rank 0's upper-x boundary particle shows
    // up on rank 1 unshifted (interior boundary); a force applied to that
    // ghost folds back onto the rank 0 owner.
    let config = DecompConfig::new([2, 1, 1], [8.0, 4.0, 4.0], 1.0);
    let results = run_world(config, 2, |rank, ex, store| {
        if rank == 0 {
            let c = ex.cell_grid().cell_of_position([3.9, 1.0, 1.0]);
            place(store, c, [3.9, 1.0, 1.0]);
        }
        ex.synchronize_ghost_sizes(store).unwrap();
        ex.update_ghosts(store).unwrap();

        let ghost_pos = if rank == 1 {
            // lower-x halo layer, interior boundary: no periodic shift
            let c = ex.cell_grid().cell_of_position([3.9, 1.0, 1.0]);
            assert_eq!(store.cell_count(c), 1, "rank 1 must hold the face ghost");
            let i = store.cell_range(c).start;
            let pos = store.position(i);
            store.zero_forces();
            store.set_force(i, [1.0, 2.0, 3.0]);
            Some(pos)
        } else {
            store.zero_forces();
            None
        };

        ex.collect_ghost_forces(store).unwrap();

        let owner_force = if rank == 0 {
            let c = ex.cell_grid().cell_of_position([3.9, 1.0, 1.0]);
            Some(store.force(store.cell_range(c).start))
        } else {
            None
        };
        (rank, ghost_pos, owner_force)
    });

    for (rank, ghost_pos, owner_force) in results {
        match rank {
            0 => assert_eq!(owner_force, Some([1.0, 2.0, 3.0])),
            1 => assert_eq!(ghost_pos, Some([3.9, 1.0, 1.0])),
            _ => unreachable!(),
        }
    }
}

#[test]
fn wrap_neighbor_ghosts_carry_box_shift() {
    // same 2x1x1 world: a particle near rank 0's lower-x face reaches
    // rank 1 through the periodic wrap and picks up +8 in x
    let config = DecompConfig::new([2, 1, 1], [8.0, 4.0, 4.0], 1.0);
    let results = run_world(config, 2, |rank, ex, store| {
        if rank == 0 {
            let c = ex.cell_grid().cell_of_position([0.5, 1.0, 1.0]);
            place(store, c, [0.5, 1.0, 1.0]);
        }
        ex.synchronize_ghost_sizes(store).unwrap();
        ex.update_ghosts(store).unwrap();

        if rank == 1 {
            let c = ex.cell_grid().cell_of_position([8.5, 1.0, 1.0]);
            assert_eq!(store.cell_count(c), 1, "wrap image missing on rank 1");
            Some(store.position(store.cell_range(c).start))
        } else {
            None
        }
    });

    assert_eq!(results[1], Some([8.5, 1.0, 1.0]));
}

#[test]
fn exchange_partners_take_opposite_send_roles() {
    // the paired blocking exchange sends first on even axis positions and
    // receives first on odd ones; on every even-sized axis the two ends of
    // a pair must land on opposite parity or both would send first and a
    // rendezvous transport would deadlock
    for (grid, comm_size) in [([2, 1, 1], 2), ([4, 1, 1], 4), ([2, 2, 2], 8)] {
        for rank in 0..comm_size {
            let g = ProcessGrid::new(grid, [8.0; 3], rank, comm_size).unwrap();
            for axis in 0..3 {
                if g.is_periodic_intra(axis) {
                    continue;
                }
                for lr in 0..2 {
                    let peer = g.neighbor(2 * axis + lr);
                    let p = ProcessGrid::new(grid, [8.0; 3], peer, comm_size).unwrap();
                    assert_ne!(
                        g.position_along(axis) % 2,
                        p.position_along(axis) % 2,
                        "ranks {rank} and {peer} share parity on axis {axis} of grid {grid:?}"
                    );
                }
            }
        }
    }
}

#[test]
fn unique_cells_exclude_only_intra_axis_images() {
    // 2x1x1: per rank, x-face ghosts hold remote data and stay in the
    // unique set; y/z ghost layers are periodic self-images and drop out
    let config = DecompConfig::new([2, 1, 1], [8.0, 4.0, 4.0], 2.0);
    let results = run_world(config, 2, |_, ex, _| {
        // inner 2x2x2 per rank: 8 reals + 2 x-faces of 2x2 ghosts
        ex.unique_cells().len()
    });
    assert_eq!(results, vec![16, 16]);
}
