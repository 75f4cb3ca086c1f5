use nalgebra::Vector3;

use crate::{
    error::SchemeError,
    grid::{
        Grid,
        GridGeometry,
    },
    layout::Axis,
    scalar::FieldScalar,
};

/// Which axes the problem is decomposed along.
///
/// This is a runtime value; every topology runs from the same binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    X,
    Y,
    Z,
    Xy,
    Yz,
    Xz,
    Xyz,
}

impl Topology {
    pub fn axes(&self) -> &'static [Axis] {
        match self {
            Topology::X => &[Axis::X],
            Topology::Y => &[Axis::Y],
            Topology::Z => &[Axis::Z],
            Topology::Xy => &[Axis::X, Axis::Y],
            Topology::Yz => &[Axis::Y, Axis::Z],
            Topology::Xz => &[Axis::X, Axis::Z],
            Topology::Xyz => &[Axis::X, Axis::Y, Axis::Z],
        }
    }

    pub fn decomposes(&self, axis: Axis) -> bool {
        self.axes().contains(&axis)
    }
}

/// Ranks per axis for a world of `ranks` processes.
///
/// Of all factorizations compatible with the topology the one with the
/// smallest total halo surface wins, which keeps the exchanged volume
/// minimal. Deterministic so that every rank computes the same grid.
pub fn node_grid_for(
    topology: Topology,
    ranks: usize,
    size: &Vector3<usize>,
) -> Result<Vector3<usize>, SchemeError> {
    let axes = topology.axes();

    let mut best: Option<(usize, Vector3<usize>)> = None;
    let mut consider = |candidate: Vector3<usize>| {
        if (0..3).any(|a| size[a] / candidate[a] == 0) {
            return;
        }
        let cost = (candidate.x - 1) * size.y * size.z
            + (candidate.y - 1) * size.x * size.z
            + (candidate.z - 1) * size.x * size.y;
        if best.is_none_or(|(best_cost, _)| cost < best_cost) {
            best = Some((cost, candidate));
        }
    };

    match axes {
        [a] => {
            let mut candidate = Vector3::repeat(1);
            candidate[a.index()] = ranks;
            consider(candidate);
        }
        [a, b] => {
            for p in divisors(ranks) {
                let mut candidate = Vector3::repeat(1);
                candidate[a.index()] = p;
                candidate[b.index()] = ranks / p;
                consider(candidate);
            }
        }
        _ => {
            for p in divisors(ranks) {
                for q in divisors(ranks / p) {
                    let candidate = Vector3::new(p, q, ranks / p / q);
                    consider(candidate);
                }
            }
        }
    }

    best.map(|(_, grid)| grid).ok_or_else(|| {
        SchemeError::topology(format!(
            "{ranks} ranks cannot decompose a {}x{}x{} grid along {topology:?}",
            size.x, size.y, size.z
        ))
    })
}

fn divisors(n: usize) -> impl Iterator<Item = usize> {
    (1..=n).filter(move |d| n % d == 0)
}

/// Subgrid of the rank at `coords` in the node grid.
///
/// Core size is `floor(N / P)` everywhere except the last rank along an
/// axis, which takes the remainder. A one-cell halo sits on every face
/// shared with a neighbor.
pub fn geometry_for(
    node_grid: &Vector3<usize>,
    coords: &Vector3<usize>,
    total_size: &Vector3<usize>,
) -> GridGeometry {
    let base = Vector3::from_fn(|a, _| total_size[a] / node_grid[a]);
    let core_size = Vector3::from_fn(|a, _| {
        if coords[a] + 1 == node_grid[a] {
            total_size[a] - (node_grid[a] - 1) * base[a]
        }
        else {
            base[a]
        }
    });
    let halo_left = coords.map(|c| usize::from(c > 0));
    let halo_right = Vector3::from_fn(|a, _| usize::from(coords[a] + 1 < node_grid[a]));
    let offset = Vector3::from_fn(|a, _| coords[a] * base[a] - halo_left[a]);

    GridGeometry {
        total_size: *total_size,
        core_size,
        offset,
        halo_left,
        halo_right,
    }
}

enum Communicator {
    Serial,
    #[cfg(feature = "mpi")]
    Mpi {
        // the universe finalizes MPI on drop and must outlive the world
        _universe: mpi::environment::Universe,
        world: mpi::topology::SimpleCommunicator,
    },
}

/// Cartesian domain decomposition of the problem across message-passing
/// ranks.
///
/// The serial variant is a single-rank decomposition whose exchange is a
/// no-op, so the solver code is identical either way.
#[derive(derive_more::Debug)]
pub struct Partition {
    total_size: Vector3<usize>,
    node_grid: Vector3<usize>,
    coords: Vector3<usize>,
    #[debug(ignore)]
    comm: Communicator,
}

impl Partition {
    pub fn serial(total_size: Vector3<usize>) -> Self {
        Self {
            total_size,
            node_grid: Vector3::repeat(1),
            coords: Vector3::zeros(),
            comm: Communicator::Serial,
        }
    }

    /// Joins the MPI world and carves out this rank's subgrid.
    #[cfg(feature = "mpi")]
    pub fn distributed(
        topology: Topology,
        total_size: Vector3<usize>,
    ) -> Result<Self, SchemeError> {
        use mpi::traits::Communicator as _;

        let universe = mpi::initialize()
            .ok_or_else(|| SchemeError::topology("MPI was already initialized"))?;
        let world = universe.world();
        let ranks = world.size() as usize;
        let rank = world.rank() as usize;

        let node_grid = node_grid_for(topology, ranks, &total_size)?;
        let coords = Vector3::new(
            rank % node_grid.x,
            rank / node_grid.x % node_grid.y,
            rank / node_grid.x / node_grid.y,
        );

        tracing::info!(
            rank,
            ranks,
            node_grid = ?(node_grid.x, node_grid.y, node_grid.z),
            "joined decomposition"
        );

        Ok(Self {
            total_size,
            node_grid,
            coords,
            comm: Communicator::Mpi {
                _universe: universe,
                world,
            },
        })
    }

    pub fn total_size(&self) -> Vector3<usize> {
        self.total_size
    }

    pub fn node_grid(&self) -> Vector3<usize> {
        self.node_grid
    }

    pub fn coords(&self) -> Vector3<usize> {
        self.coords
    }

    pub fn rank(&self) -> usize {
        self.rank_of(&self.coords)
    }

    pub fn rank_count(&self) -> usize {
        self.node_grid.x * self.node_grid.y * self.node_grid.z
    }

    pub fn is_root(&self) -> bool {
        self.rank() == 0
    }

    pub fn is_distributed(&self) -> bool {
        self.rank_count() > 1
    }

    fn rank_of(&self, coords: &Vector3<usize>) -> usize {
        coords.x + self.node_grid.x * (coords.y + self.node_grid.y * coords.z)
    }

    /// Rank of the neighbor on the given side of an axis, if any.
    pub fn neighbor(&self, axis: Axis, positive: bool) -> Option<usize> {
        let a = axis.index();
        let mut coords = self.coords;
        if positive {
            if coords[a] + 1 >= self.node_grid[a] {
                return None;
            }
            coords[a] += 1;
        }
        else {
            if coords[a] == 0 {
                return None;
            }
            coords[a] -= 1;
        }
        Some(self.rank_of(&coords))
    }

    pub fn grid_geometry(&self) -> GridGeometry {
        geometry_for(&self.node_grid, &self.coords, &self.total_size)
    }

    /// Replicates the owned boundary slices into the neighbors' halos,
    /// axis by axis in x, y, z order. Corner cells propagate through the
    /// sequential axis exchanges.
    pub fn exchange<S: FieldScalar>(&self, grid: &mut Grid<S>) -> Result<(), SchemeError> {
        match &self.comm {
            Communicator::Serial => Ok(()),
            #[cfg(feature = "mpi")]
            Communicator::Mpi { world, .. } => {
                for axis in [Axis::X, Axis::Y, Axis::Z] {
                    if self.node_grid[axis.index()] > 1 {
                        self.exchange_axis(world, grid, axis);
                    }
                }
                Ok(())
            }
        }
    }

    #[cfg(feature = "mpi")]
    fn exchange_axis<S: FieldScalar>(
        &self,
        world: &mpi::topology::SimpleCommunicator,
        grid: &mut Grid<S>,
        axis: Axis,
    ) {
        use mpi::traits::{
            Communicator as _,
            Destination as _,
            Source as _,
        };
        use nalgebra::Point3;

        let a = axis.index();
        let local = grid.local_size();
        let geometry = *grid.geometry();

        let plane = |index: usize| {
            let mut start = Point3::origin();
            let mut end = Point3::from(local);
            start[a] = index;
            end[a] = index + 1;
            (start, end)
        };

        let mut plane_size = local;
        plane_size[a] = 1;
        let words = grid.words_for(&plane_size);

        let left = self.neighbor(axis, false);
        let right = self.neighbor(axis, true);

        let send_left = left.map(|_| {
            let (start, end) = plane(geometry.halo_left[a]);
            let mut buffer = Vec::with_capacity(words);
            grid.pack(start, end, &mut buffer);
            buffer
        });
        let send_right = right.map(|_| {
            let (start, end) = plane(local[a] - geometry.halo_right[a] - 1);
            let mut buffer = Vec::with_capacity(words);
            grid.pack(start, end, &mut buffer);
            buffer
        });

        let mut recv_left = left.map(|_| vec![0.0f64; words]);
        let mut recv_right = right.map(|_| vec![0.0f64; words]);

        mpi::request::scope(|scope| {
            let mut pending = Vec::new();

            if let (Some(rank), Some(buffer)) = (left, recv_left.as_mut()) {
                pending.push(
                    world
                        .process_at_rank(rank as i32)
                        .immediate_receive_into(scope, &mut buffer[..]),
                );
            }
            if let (Some(rank), Some(buffer)) = (right, recv_right.as_mut()) {
                pending.push(
                    world
                        .process_at_rank(rank as i32)
                        .immediate_receive_into(scope, &mut buffer[..]),
                );
            }

            if let (Some(rank), Some(buffer)) = (left, send_left.as_ref()) {
                world.process_at_rank(rank as i32).send(&buffer[..]);
            }
            if let (Some(rank), Some(buffer)) = (right, send_right.as_ref()) {
                world.process_at_rank(rank as i32).send(&buffer[..]);
            }

            for request in pending {
                request.wait();
            }
        });

        if let Some(buffer) = recv_left {
            let (start, end) = plane(0);
            grid.unpack(start, end, &buffer);
        }
        if let Some(buffer) = recv_right {
            let (start, end) = plane(local[a] - 1);
            grid.unpack(start, end, &buffer);
        }
    }

    /// Collects every rank's core cells into one full, non-partitioned
    /// grid on rank 0. Other ranks get `None`.
    pub fn gather_full<S: FieldScalar>(
        &self,
        grid: &Grid<S>,
    ) -> Result<Option<Grid<S>>, SchemeError> {
        match &self.comm {
            Communicator::Serial => Ok(Some(grid.clone())),
            #[cfg(feature = "mpi")]
            Communicator::Mpi { world, .. } => {
                use mpi::traits::{
                    Communicator as _,
                    Destination as _,
                    Source as _,
                };
                use nalgebra::Point3;

                use crate::grid::TimeLayers;

                let geometry = grid.geometry();
                let layers = TimeLayers::from_count(grid.time_layers());

                if self.is_root() {
                    let mut full =
                        Grid::<S>::new(GridGeometry::serial(self.total_size), layers);

                    let mut place = |rank_geometry: &GridGeometry, words: &[f64]| {
                        let start = Point3::from(
                            rank_geometry.offset + rank_geometry.halo_left,
                        );
                        let end = start + rank_geometry.core_size;
                        full.unpack(start, end, words);
                    };

                    let mut own = Vec::new();
                    grid.pack(geometry.core_start(), geometry.core_end(), &mut own);
                    place(geometry, &own);

                    for rank in 1..self.rank_count() {
                        let coords = Vector3::new(
                            rank % self.node_grid.x,
                            rank / self.node_grid.x % self.node_grid.y,
                            rank / self.node_grid.x / self.node_grid.y,
                        );
                        let rank_geometry =
                            geometry_for(&self.node_grid, &coords, &self.total_size);
                        let expected = grid.words_for(&rank_geometry.core_size);

                        let (words, _status) = world
                            .process_at_rank(rank as i32)
                            .receive_vec::<f64>();
                        if words.len() != expected {
                            return Err(SchemeError::topology(format!(
                                "rank {rank} sent {} words, expected {expected}: \
                                 inconsistent partition topology",
                                words.len()
                            )));
                        }
                        place(&rank_geometry, &words);
                    }

                    Ok(Some(full))
                }
                else {
                    let mut words = Vec::new();
                    grid.pack(geometry.core_start(), geometry.core_end(), &mut words);
                    world.process_at_rank(0).send(&words[..]);
                    Ok(None)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{
        Point3,
        Vector3,
    };

    use crate::{
        grid::{
            Grid,
            Layer,
            TimeLayers,
        },
        partition::{
            Partition,
            Topology,
            geometry_for,
            node_grid_for,
        },
    };

    #[test]
    fn it_prefers_cubic_decompositions() {
        let size = Vector3::repeat(64);
        assert_eq!(
            node_grid_for(Topology::Xyz, 8, &size).unwrap(),
            Vector3::new(2, 2, 2)
        );
        assert_eq!(
            node_grid_for(Topology::Xy, 4, &size).unwrap(),
            Vector3::new(2, 2, 1)
        );
        assert_eq!(
            node_grid_for(Topology::Z, 5, &size).unwrap(),
            Vector3::new(1, 1, 5)
        );
    }

    #[test]
    fn it_rejects_oversubscribed_axes() {
        assert!(node_grid_for(Topology::X, 9, &Vector3::new(4, 64, 64)).is_err());
    }

    #[test]
    fn it_gives_the_remainder_to_the_last_rank() {
        let size = Vector3::new(10, 6, 6);
        let node_grid = Vector3::new(3, 1, 1);

        let cores: Vec<_> = (0..3)
            .map(|c| geometry_for(&node_grid, &Vector3::new(c, 0, 0), &size).core_size.x)
            .collect();
        assert_eq!(cores, vec![3, 3, 4]);
        assert_eq!(cores.iter().sum::<usize>(), 10);
    }

    #[test]
    fn it_places_halos_on_shared_faces_only() {
        let size = Vector3::new(10, 6, 6);
        let node_grid = Vector3::new(3, 1, 1);

        let first = geometry_for(&node_grid, &Vector3::new(0, 0, 0), &size);
        assert_eq!(first.halo_left.x, 0);
        assert_eq!(first.halo_right.x, 1);
        assert_eq!(first.offset.x, 0);
        assert_eq!(first.local_size(), Vector3::new(4, 6, 6));

        let middle = geometry_for(&node_grid, &Vector3::new(1, 0, 0), &size);
        assert_eq!(middle.halo_left.x, 1);
        assert_eq!(middle.halo_right.x, 1);
        assert_eq!(middle.offset.x, 2);

        let last = geometry_for(&node_grid, &Vector3::new(2, 0, 0), &size);
        assert_eq!(last.halo_right.x, 0);
        assert_eq!(last.offset.x, 5);
        assert_eq!(last.local_size(), Vector3::new(5, 6, 6));
    }

    #[test]
    fn it_tiles_the_problem_exactly() {
        // every interior cell is owned by exactly one rank
        let size = Vector3::new(13, 7, 9);
        let node_grid = Vector3::new(2, 1, 3);

        let mut owned = vec![0u8; 13 * 7 * 9];
        for cz in 0..3 {
            for cx in 0..2 {
                let geometry =
                    geometry_for(&node_grid, &Vector3::new(cx, 0, cz), &size);
                let start = geometry.offset + geometry.halo_left;
                for z in 0..geometry.core_size.z {
                    for y in 0..geometry.core_size.y {
                        for x in 0..geometry.core_size.x {
                            let gx = start.x + x;
                            let gy = start.y + y;
                            let gz = start.z + z;
                            owned[gx + 13 * (gy + 7 * gz)] += 1;
                        }
                    }
                }
            }
        }
        assert!(owned.iter().all(|&count| count == 1));
    }

    #[test]
    fn a_serial_partition_gathers_its_own_grid() {
        let partition = Partition::serial(Vector3::repeat(4));
        assert!(partition.is_root());
        assert!(!partition.is_distributed());

        let mut grid: Grid<f64> = Grid::new(partition.grid_geometry(), TimeLayers::Two);
        grid.set(Layer::Current, &Point3::new(1, 2, 3), 5.0);
        partition.exchange(&mut grid).unwrap();

        let full = partition.gather_full(&grid).unwrap().unwrap();
        assert_eq!(full.size(), Vector3::repeat(4));
        assert_eq!(full.get(Layer::Current, &Point3::new(1, 2, 3)), 5.0);
    }
}
