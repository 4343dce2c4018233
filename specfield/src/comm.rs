//! Process-mesh communicators.
//!
//! The engine depends on a small collective contract: a world communicator
//! with rank and size, a Cartesian communicator over a process mesh, a
//! sub-communicator selecting one mesh dimension, and `all_to_all`,
//! `barrier` and `all_reduce_sum` collectives. Execution is SPMD: every rank
//! posts the same collectives in the same order, and a collective blocks
//! until every member of its group has entered it.
//!
//! This realization keeps ranks in one process, one FIFO byte channel per
//! ordered rank pair. Because posting order is identical on every rank and
//! each pair's channel is FIFO, collective matching is deterministic without
//! message tags. A failed peer aborts the whole group, which mirrors the
//! fatality of a failed collective in a message-passing runtime.

use super::error::{Error, Result};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Per-rank handle to the world group.
#[derive(Debug)]
pub struct Communicator {
    rank: usize,
    size: usize,
    txs: Vec<Sender<Vec<u8>>>,
    rxs: Vec<Mutex<Receiver<Vec<u8>>>>,
}

/// Shared handle to a rank's world communicator.
pub type Comm = Arc<Communicator>;

/// Creates a world of `size` ranks and returns one handle per rank.
///
/// Each handle is meant to be moved onto the thread that plays its rank.
pub fn universe(size: usize) -> Vec<Comm> {
    assert!(size > 0, "empty universe");
    let mut txs: Vec<Vec<Sender<Vec<u8>>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
    let mut rxs: Vec<Vec<Mutex<Receiver<Vec<u8>>>>> =
        (0..size).map(|_| Vec::with_capacity(size)).collect();
    for from in 0..size {
        for to in 0..size {
            let (tx, rx) = channel();
            txs[from].push(tx);
            rxs[to].push(Mutex::new(rx));
        }
    }
    txs.into_iter()
        .zip(rxs)
        .enumerate()
        .map(|(rank, (txs, rxs))| Arc::new(Communicator { rank, size, txs, rxs }))
        .collect()
}

impl Communicator {
    /// This process's rank in the world group.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks in the world group.
    pub fn size(&self) -> usize {
        self.size
    }

    fn send(&self, to: usize, bytes: Vec<u8>) {
        // A dropped peer is fatal to the group.
        self.txs[to].send(bytes).expect("peer rank has aborted");
    }

    fn recv(&self, from: usize) -> Vec<u8> {
        self.rxs[from]
            .lock()
            .expect("communicator poisoned")
            .recv()
            .expect("peer rank has aborted")
    }

    /// Blocks until every rank of the world group has entered.
    pub fn barrier(self: &Arc<Self>) {
        self.world_group().barrier();
    }

    /// Sums `value` over all ranks of the world group.
    pub fn all_reduce_sum(self: &Arc<Self>, value: f64) -> f64 {
        self.world_group().all_reduce_sum(value)
    }

    fn world_group(self: &Arc<Self>) -> SubComm {
        SubComm {
            comm: Arc::clone(self),
            members: (0..self.size).collect(),
            rank: self.rank,
        }
    }
}

/// Cartesian communicator over an effective process mesh.
pub struct CartComm {
    comm: Comm,
    dims: Vec<usize>,
    coords: Vec<usize>,
}

impl CartComm {
    /// Embeds the world group into a mesh of the given dimensions, assigning
    /// coordinates in row-major rank order.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh does not account for every rank.
    pub fn new(comm: Comm, dims: &[usize]) -> Result<Self> {
        let cells: usize = dims.iter().product();
        if cells != comm.size() {
            return Err(Error::MeshSize {
                size: comm.size(),
                mesh: dims.to_vec(),
            });
        }
        let mut coords = vec![0; dims.len()];
        let mut rest = comm.rank();
        for (c, &d) in coords.iter_mut().zip(dims).rev() {
            *c = rest % d;
            rest /= d;
        }
        Ok(Self {
            comm,
            dims: dims.to_vec(),
            coords,
        })
    }

    /// Mesh dimensions.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// This rank's mesh coordinates.
    pub fn coords(&self) -> &[usize] {
        &self.coords
    }

    /// Sub-communicator spanning the one mesh dimension `dim`, with all other
    /// coordinates held at this rank's values.
    pub fn sub(&self, dim: usize) -> SubComm {
        let members = (0..self.dims[dim])
            .map(|c| {
                let mut coords = self.coords.clone();
                coords[dim] = c;
                self.rank_of(&coords)
            })
            .collect();
        SubComm {
            comm: Arc::clone(&self.comm),
            members,
            rank: self.coords[dim],
        }
    }

    fn rank_of(&self, coords: &[usize]) -> usize {
        coords
            .iter()
            .zip(&self.dims)
            .fold(0, |acc, (&c, &d)| acc * d + c)
    }
}

/// Communicator over a subset of world ranks.
pub struct SubComm {
    comm: Comm,
    members: Vec<usize>,
    rank: usize,
}

impl SubComm {
    /// Number of ranks in this group.
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// This rank's position within the group.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Exchanges one byte payload with every group member (self included)
    /// and returns the payloads received, in group order.
    ///
    /// # Panics
    ///
    /// Panics if `sends` does not hold one payload per member, or if a peer
    /// has aborted.
    pub fn all_to_all(&self, sends: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        assert_eq!(sends.len(), self.members.len());
        for (&to, payload) in self.members.iter().zip(sends) {
            self.comm.send(to, payload);
        }
        self.members
            .iter()
            .map(|&from| self.comm.recv(from))
            .collect()
    }

    /// Blocks until every group member has entered.
    pub fn barrier(&self) {
        self.all_to_all(vec![Vec::new(); self.members.len()]);
    }

    /// Sums `value` over the group.
    pub fn all_reduce_sum(&self, value: f64) -> f64 {
        let payload = value.to_ne_bytes().to_vec();
        self.all_to_all(vec![payload; self.members.len()])
            .into_iter()
            .map(|bytes| f64::from_ne_bytes(bytes.try_into().expect("scalar payload")))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn cart_coords_are_row_major() {
        let world = universe(6);
        let cart = CartComm::new(Arc::clone(&world[5]), &[2, 3]).unwrap();
        assert_eq!(cart.coords(), &[1, 2]);
        let cart = CartComm::new(Arc::clone(&world[3]), &[2, 3]).unwrap();
        assert_eq!(cart.coords(), &[1, 0]);
    }

    #[test]
    fn mesh_size_is_checked() {
        let world = universe(4);
        assert!(CartComm::new(Arc::clone(&world[0]), &[3]).is_err());
    }

    #[test]
    fn all_to_all_round_trip() {
        let world = universe(3);
        let handles: Vec<_> = world
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let cart = CartComm::new(Arc::clone(&comm), &[3]).unwrap();
                    let sub = cart.sub(0);
                    let rank = sub.rank();
                    let sends = (0..3).map(|to| vec![rank as u8, to as u8]).collect();
                    let got = sub.all_to_all(sends);
                    for (from, bytes) in got.iter().enumerate() {
                        assert_eq!(bytes, &[from as u8, rank as u8]);
                    }
                    sub.barrier();
                    sub.all_reduce_sum(rank as f64)
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 3.0);
        }
    }

    #[test]
    fn sub_groups_split_the_mesh() {
        let world = universe(4);
        let handles: Vec<_> = world
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let cart = CartComm::new(Arc::clone(&comm), &[2, 2]).unwrap();
                    // Along each dimension the group sums only its own pair.
                    let row = cart.sub(0).all_reduce_sum(f64::from(u32::try_from(comm.rank()).unwrap()));
                    let col = cart.sub(1).all_reduce_sum(f64::from(u32::try_from(comm.rank()).unwrap()));
                    (comm.rank(), row, col)
                })
            })
            .collect();
        for handle in handles {
            let (rank, row, col) = handle.join().unwrap();
            // Mesh [2, 2]: dimension 0 pairs {0, 2} and {1, 3}; dimension 1
            // pairs {0, 1} and {2, 3}.
            let expected_row = if rank % 2 == 0 { 2.0 } else { 4.0 };
            let expected_col = if rank < 2 { 1.0 } else { 5.0 };
            assert_eq!(row, expected_row);
            assert_eq!(col, expected_col);
        }
    }
}
