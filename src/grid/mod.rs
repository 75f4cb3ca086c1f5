pub mod strider;

use nalgebra::{
    Point3,
    Vector3,
};

use crate::{
    error::SchemeError,
    grid::strider::Strider,
    scalar::FieldScalar,
};

/// How many time layers a grid retains.
///
/// Field grids keep one previous layer; the dispersive auxiliary grids
/// need two so the recurrence can reach back to `n - 1`. Material grids
/// keep none.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeLayers {
    One,
    Two,
    Three,
}

impl TimeLayers {
    pub fn count(&self) -> usize {
        match self {
            TimeLayers::One => 1,
            TimeLayers::Two => 2,
            TimeLayers::Three => 3,
        }
    }

    pub fn from_count(count: usize) -> Self {
        match count {
            1 => TimeLayers::One,
            2 => TimeLayers::Two,
            _ => TimeLayers::Three,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layer {
    Current,
    Previous,
    Previous2,
}

impl Layer {
    fn depth(&self) -> usize {
        match self {
            Layer::Current => 0,
            Layer::Previous => 1,
            Layer::Previous2 => 2,
        }
    }
}

/// Placement of a rank's subgrid inside the full problem.
///
/// `offset` is the global coordinate of local cell (0, 0, 0), which is a
/// halo cell on partitioned faces. Halo widths are zero on faces that
/// coincide with the problem boundary.
#[derive(Clone, Copy, Debug)]
pub struct GridGeometry {
    pub total_size: Vector3<usize>,
    pub core_size: Vector3<usize>,
    pub offset: Vector3<usize>,
    pub halo_left: Vector3<usize>,
    pub halo_right: Vector3<usize>,
}

impl GridGeometry {
    /// Whole problem on a single rank, no halos.
    pub fn serial(size: Vector3<usize>) -> Self {
        Self {
            total_size: size,
            core_size: size,
            offset: Vector3::zeros(),
            halo_left: Vector3::zeros(),
            halo_right: Vector3::zeros(),
        }
    }

    pub fn local_size(&self) -> Vector3<usize> {
        self.core_size + self.halo_left + self.halo_right
    }

    /// Local coordinate of the first owned (non-halo) cell.
    pub fn core_start(&self) -> Point3<usize> {
        Point3::from(self.halo_left)
    }

    pub fn core_end(&self) -> Point3<usize> {
        Point3::from(self.halo_left + self.core_size)
    }
}

/// Dense field storage with one contiguous buffer per time layer.
///
/// Rotating the layers is an index rotation on the grid, not a per-cell
/// operation.
#[derive(Clone, Debug)]
pub struct Grid<S> {
    geometry: GridGeometry,
    strider: Strider,
    layers: Vec<Vec<S>>,
    head: usize,
    dirty: bool,
}

impl<S: FieldScalar> Grid<S> {
    pub fn new(geometry: GridGeometry, time_layers: TimeLayers) -> Self {
        let strider = Strider::new(&geometry.local_size());
        let layers = (0..time_layers.count())
            .map(|_| vec![S::zero(); strider.len()])
            .collect();

        Self {
            geometry,
            strider,
            layers,
            head: 0,
            dirty: false,
        }
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn strider(&self) -> &Strider {
        &self.strider
    }

    /// Size of the full problem, across all ranks.
    pub fn size(&self) -> Vector3<usize> {
        self.geometry.total_size
    }

    /// Size of this rank's subgrid, halos included.
    pub fn local_size(&self) -> Vector3<usize> {
        *self.strider.size()
    }

    /// Size of this rank's owned region, halos excluded.
    pub fn core_size(&self) -> Vector3<usize> {
        self.geometry.core_size
    }

    pub fn time_layers(&self) -> usize {
        self.layers.len()
    }

    fn layer_index(&self, layer: Layer) -> usize {
        let depth = layer.depth();
        assert!(
            depth < self.layers.len(),
            "layer {layer:?} not retained by this grid"
        );
        (self.head + depth) % self.layers.len()
    }

    pub fn layer(&self, layer: Layer) -> &[S] {
        &self.layers[self.layer_index(layer)]
    }

    pub fn layer_mut(&mut self, layer: Layer) -> &mut [S] {
        self.dirty = true;
        let index = self.layer_index(layer);
        &mut self.layers[index]
    }

    pub fn get(&self, layer: Layer, position: &Point3<usize>) -> S {
        let index = self
            .strider
            .index(position)
            .unwrap_or_else(|| panic!("grid access out of bounds: {position}"));
        self.layer(layer)[index]
    }

    pub fn set(&mut self, layer: Layer, position: &Point3<usize>, value: S) {
        let index = self
            .strider
            .index(position)
            .unwrap_or_else(|| panic!("grid access out of bounds: {position}"));
        self.layer_mut(layer)[index] = value;
    }

    pub fn total_position(&self, local: &Point3<usize>) -> Point3<usize> {
        local + self.geometry.offset
    }

    pub fn relative_position(&self, global: &Point3<usize>) -> Option<Point3<usize>> {
        let local = global.coords.zip_map(&self.geometry.offset, |g, o| {
            g.checked_sub(o)
        });
        let local = Point3::new(local.x?, local.y?, local.z?);
        self.strider.is_inside(&local).then_some(local)
    }

    /// First cell of the update loops, shrunk by the halo and, on problem
    /// boundaries, by the component's start offset.
    pub fn computation_start(&self, diff: &Vector3<usize>) -> Point3<usize> {
        let geometry = &self.geometry;
        Point3::from(Vector3::from_fn(|a, _| {
            if geometry.offset[a] == 0 {
                // this rank holds the global boundary on this side
                diff[a]
            }
            else {
                geometry.halo_left[a]
            }
        }))
    }

    /// One-past-last cell of the update loops, mirroring
    /// [`Self::computation_start`].
    pub fn computation_end(&self, diff: &Vector3<usize>) -> Point3<usize> {
        let geometry = &self.geometry;
        let local = self.local_size();
        Point3::from(Vector3::from_fn(|a, _| {
            if geometry.offset[a] + local[a] == geometry.total_size[a] {
                local[a] - diff[a]
            }
            else {
                local[a] - geometry.halo_right[a]
            }
        }))
    }

    /// Rotates time layers: PREVIOUS2 <- PREVIOUS <- CURRENT <- 0.
    ///
    /// Refuses to advance a grid that has not been written since the last
    /// rotation; a double advance would silently drop a time level.
    pub fn advance_layers(&mut self) -> Result<(), SchemeError> {
        if !self.dirty {
            return Err(SchemeError::GridState);
        }

        let count = self.layers.len();
        self.head = (self.head + count - 1) % count;
        let head = self.head;
        self.layers[head].fill(S::zero());
        self.dirty = false;

        Ok(())
    }

    /// Serializes the box `[start, end)` of every retained layer into
    /// `f64` words, layer-major, point order as [`Strider::iter`].
    pub fn pack(&self, start: Point3<usize>, end: Point3<usize>, out: &mut Vec<f64>) {
        let mut words = [0.0; 4];
        for depth in 0..self.layers.len() {
            let layer = &self.layers[(self.head + depth) % self.layers.len()];
            for (index, _) in self.strider.iter(start, end) {
                layer[index].write_words(&mut words[..S::WORDS]);
                out.extend_from_slice(&words[..S::WORDS]);
            }
        }
    }

    /// Inverse of [`Self::pack`]. Returns the number of words consumed.
    pub fn unpack(&mut self, start: Point3<usize>, end: Point3<usize>, words: &[f64]) -> usize {
        self.dirty = true;
        let mut cursor = 0;
        for depth in 0..self.layers.len() {
            let layer_index = (self.head + depth) % self.layers.len();
            for (index, _) in self.strider.iter(start, end) {
                self.layers[layer_index][index] =
                    S::read_words(&words[cursor..cursor + S::WORDS]);
                cursor += S::WORDS;
            }
        }
        cursor
    }

    /// Number of words [`Self::pack`] produces for a box of the given size.
    pub fn words_for(&self, size: &Vector3<usize>) -> usize {
        size.x * size.y * size.z * self.layers.len() * S::WORDS
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
            GridGeometry,
            Layer,
            TimeLayers,
        },
        grid::strider::iter_points,
    };

    fn filled_grid() -> Grid<f64> {
        let mut grid = Grid::new(GridGeometry::serial(Vector3::new(4, 4, 4)), TimeLayers::Three);
        for point in iter_points(Point3::origin(), Point3::new(4, 4, 4)) {
            grid.set(Layer::Current, &point, (point.x + 10 * point.y + 100 * point.z) as f64);
        }
        grid
    }

    #[test]
    fn it_rotates_layers() {
        let mut grid = filled_grid();
        let probe = Point3::new(1, 2, 3);
        let value = grid.get(Layer::Current, &probe);

        grid.advance_layers().unwrap();
        assert_eq!(grid.get(Layer::Previous, &probe), value);
        assert_eq!(grid.get(Layer::Current, &probe), 0.0);

        grid.set(Layer::Current, &probe, -1.0);
        grid.advance_layers().unwrap();
        assert_eq!(grid.get(Layer::Previous2, &probe), value);
        assert_eq!(grid.get(Layer::Previous, &probe), -1.0);
    }

    #[test]
    fn it_rejects_advancing_an_unwritten_grid() {
        let mut grid = filled_grid();
        grid.advance_layers().unwrap();
        assert!(grid.advance_layers().is_err());
    }

    #[test]
    fn it_maps_local_and_global_positions() {
        let geometry = GridGeometry {
            total_size: Vector3::new(10, 10, 10),
            core_size: Vector3::new(5, 10, 10),
            offset: Vector3::new(4, 0, 0),
            halo_left: Vector3::new(1, 0, 0),
            halo_right: Vector3::new(0, 0, 0),
        };
        let grid = Grid::<f64>::new(geometry, TimeLayers::One);

        assert_eq!(grid.local_size(), Vector3::new(6, 10, 10));
        assert_eq!(
            grid.total_position(&Point3::new(1, 2, 3)),
            Point3::new(5, 2, 3)
        );
        assert_eq!(
            grid.relative_position(&Point3::new(5, 2, 3)),
            Some(Point3::new(1, 2, 3))
        );
        assert_eq!(grid.relative_position(&Point3::new(3, 2, 3)), None);
    }

    #[test]
    fn it_shrinks_computation_bounds() {
        // serial grid: both sides are problem boundaries
        let serial = Grid::<f64>::new(GridGeometry::serial(Vector3::new(8, 8, 8)), TimeLayers::One);
        let diff = Vector3::repeat(1);
        assert_eq!(serial.computation_start(&diff), Point3::new(1, 1, 1));
        assert_eq!(serial.computation_end(&diff), Point3::new(7, 7, 7));

        // right-most rank of a 2-way x split of 8 cells
        let geometry = GridGeometry {
            total_size: Vector3::new(8, 8, 8),
            core_size: Vector3::new(4, 8, 8),
            offset: Vector3::new(3, 0, 0),
            halo_left: Vector3::new(1, 0, 0),
            halo_right: Vector3::new(0, 0, 0),
        };
        let right = Grid::<f64>::new(geometry, TimeLayers::One);
        assert_eq!(right.computation_start(&diff), Point3::new(1, 1, 1));
        assert_eq!(right.computation_end(&diff), Point3::new(4, 7, 7));
    }

    #[test]
    fn it_roundtrips_packed_words() {
        let grid = filled_grid();
        let start = Point3::new(1, 0, 0);
        let end = Point3::new(2, 4, 4);

        let mut words = Vec::new();
        grid.pack(start, end, &mut words);
        assert_eq!(words.len(), grid.words_for(&Vector3::new(1, 4, 4)));

        let mut other =
            Grid::<f64>::new(GridGeometry::serial(Vector3::new(4, 4, 4)), TimeLayers::Three);
        other.unpack(start, end, &words);
        assert_eq!(
            other.get(Layer::Current, &Point3::new(1, 2, 3)),
            grid.get(Layer::Current, &Point3::new(1, 2, 3))
        );
    }
}
