use std::{
    fs::File,
    io::{
        BufRead,
        BufReader,
        BufWriter,
        Write,
    },
    path::PathBuf,
};

use colorgrad::Gradient as _;
use nalgebra::{
    Point3,
    Vector3,
};

use crate::{
    error::SchemeError,
    grid::{
        Grid,
        GridGeometry,
        Layer,
        TimeLayers,
    },
    grid::strider::iter_points,
    scalar::FieldScalar,
};

/// Capability for writing grids out of the solver and loading them back.
///
/// The core only ever talks to this trait; which representation a dump
/// takes (text, raster, ...) is the implementation's business.
pub trait GridIo<S: FieldScalar> {
    fn write(
        &self,
        grid: &Grid<S>,
        layer: Layer,
        range: (Point3<usize>, Point3<usize>),
        name: &str,
        step: usize,
    ) -> Result<(), SchemeError>;

    fn read(&self, name: &str, step: usize) -> Result<Grid<S>, SchemeError>;
}

/// One value per line with its coordinates; loadable again.
#[derive(Clone, Debug)]
pub struct TextDumper {
    directory: PathBuf,
}

impl TextDumper {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn path(&self, name: &str, step: usize) -> PathBuf {
        self.directory.join(format!("{name}-{step}.txt"))
    }
}

impl<S: FieldScalar> GridIo<S> for TextDumper {
    fn write(
        &self,
        grid: &Grid<S>,
        layer: Layer,
        range: (Point3<usize>, Point3<usize>),
        name: &str,
        step: usize,
    ) -> Result<(), SchemeError> {
        std::fs::create_dir_all(&self.directory)?;
        let mut writer = BufWriter::new(File::create(self.path(name, step))?);

        let size = grid.local_size();
        writeln!(writer, "{} {} {}", size.x, size.y, size.z)?;

        let mut words = [0.0; 4];
        for position in iter_points(range.0, range.1) {
            let value = grid.get(layer, &position);
            value.write_words(&mut words[..S::WORDS]);
            write!(writer, "{} {} {}", position.x, position.y, position.z)?;
            for word in &words[..S::WORDS] {
                write!(writer, " {word:e}")?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;

        tracing::debug!(name, step, "dumped grid");
        Ok(())
    }

    fn read(&self, name: &str, step: usize) -> Result<Grid<S>, SchemeError> {
        let reader = BufReader::new(File::open(self.path(name, step))?);
        let mut lines = reader.lines();

        let parse = |reason: &str| SchemeError::Io(std::io::Error::other(reason.to_owned()));

        let header = lines.next().ok_or_else(|| parse("empty dump"))??;
        let mut sizes = header.split_whitespace().map(str::parse::<usize>);
        let mut next_size =
            || -> Result<usize, SchemeError> {
                sizes
                    .next()
                    .ok_or_else(|| parse("truncated header"))?
                    .map_err(|_| parse("malformed header"))
            };
        let size = Vector3::new(next_size()?, next_size()?, next_size()?);

        let mut grid = Grid::new(GridGeometry::serial(size), TimeLayers::One);
        for line in lines {
            let line = line?;
            let mut fields = line.split_whitespace();
            let mut coordinate = || -> Result<usize, SchemeError> {
                fields
                    .next()
                    .ok_or_else(|| parse("truncated record"))?
                    .parse()
                    .map_err(|_| parse("malformed coordinate"))
            };
            let position = Point3::new(coordinate()?, coordinate()?, coordinate()?);

            let mut words = [0.0; 4];
            for word in words.iter_mut().take(S::WORDS) {
                *word = fields
                    .next()
                    .ok_or_else(|| parse("truncated record"))?
                    .parse()
                    .map_err(|_| parse("malformed value"))?;
            }
            grid.set(Layer::Current, &position, S::read_words(&words[..S::WORDS]));
        }

        Ok(grid)
    }
}

/// Raw little-endian words with a minimal header; the compact format for
/// large grids.
#[derive(Clone, Debug)]
pub struct BinaryDumper {
    directory: PathBuf,
}

impl BinaryDumper {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn path(&self, name: &str, step: usize) -> PathBuf {
        self.directory.join(format!("{name}-{step}.dat"))
    }
}

impl<S: FieldScalar> GridIo<S> for BinaryDumper {
    fn write(
        &self,
        grid: &Grid<S>,
        layer: Layer,
        range: (Point3<usize>, Point3<usize>),
        name: &str,
        step: usize,
    ) -> Result<(), SchemeError> {
        std::fs::create_dir_all(&self.directory)?;
        let mut writer = BufWriter::new(File::create(self.path(name, step))?);

        let shape = range.1 - range.0;
        for extent in [shape.x, shape.y, shape.z, range.0.x, range.0.y, range.0.z] {
            writer.write_all(&(extent as u64).to_le_bytes())?;
        }
        writer.write_all(&(S::WORDS as u64).to_le_bytes())?;

        let mut words = [0.0; 4];
        for position in iter_points(range.0, range.1) {
            grid.get(layer, &position).write_words(&mut words[..S::WORDS]);
            for word in &words[..S::WORDS] {
                writer.write_all(&word.to_le_bytes())?;
            }
        }
        writer.flush()?;

        tracing::debug!(name, step, "dumped binary grid");
        Ok(())
    }

    fn read(&self, name: &str, step: usize) -> Result<Grid<S>, SchemeError> {
        use std::io::Read as _;

        let mut reader = BufReader::new(File::open(self.path(name, step))?);
        let mut buffer = [0u8; 8];

        let mut header = [0u64; 7];
        for value in header.iter_mut() {
            reader.read_exact(&mut buffer)?;
            *value = u64::from_le_bytes(buffer);
        }
        if header[6] as usize != S::WORDS {
            return Err(SchemeError::Io(std::io::Error::other(
                "dump scalar width does not match this grid's",
            )));
        }

        let shape = Vector3::new(header[0] as usize, header[1] as usize, header[2] as usize);
        let origin = Point3::new(header[3] as usize, header[4] as usize, header[5] as usize);

        let mut grid = Grid::new(
            GridGeometry::serial(shape + origin.coords),
            TimeLayers::One,
        );
        let mut words = [0.0; 4];
        for position in iter_points(origin, origin + shape) {
            for word in words.iter_mut().take(S::WORDS) {
                reader.read_exact(&mut buffer)?;
                *word = f64::from_le_bytes(buffer);
            }
            grid.set(Layer::Current, &position, S::read_words(&words[..S::WORDS]));
        }

        Ok(grid)
    }
}

/// Renders the central z slice of the dumped range to a PNG, magnitudes
/// mapped through a perceptual gradient.
#[derive(Clone, Debug)]
pub struct ImageDumper {
    directory: PathBuf,
}

impl ImageDumper {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

impl<S: FieldScalar> GridIo<S> for ImageDumper {
    fn write(
        &self,
        grid: &Grid<S>,
        layer: Layer,
        range: (Point3<usize>, Point3<usize>),
        name: &str,
        step: usize,
    ) -> Result<(), SchemeError> {
        std::fs::create_dir_all(&self.directory)?;

        let (start, end) = range;
        let z = start.z + (end.z - start.z) / 2;
        let width = end.x - start.x;
        let height = end.y - start.y;

        let magnitude = |x: usize, y: usize| {
            grid.get(layer, &Point3::new(start.x + x, start.y + y, z))
                .magnitude()
        };

        let mut peak = 0.0f64;
        for y in 0..height {
            for x in 0..width {
                peak = peak.max(magnitude(x, y));
            }
        }
        let scale = if peak > 0.0 { 1.0 / peak } else { 0.0 };

        let gradient = colorgrad::preset::viridis();
        let image = image::RgbaImage::from_fn(width as u32, height as u32, |x, y| {
            let t = magnitude(x as usize, y as usize) * scale;
            image::Rgba(gradient.at(t as f32).to_rgba8())
        });

        let path = self.directory.join(format!("{name}-{step}.png"));
        image
            .save(&path)
            .map_err(|error| SchemeError::Io(std::io::Error::other(error)))?;

        tracing::debug!(name, step, path = %path.display(), "dumped slice image");
        Ok(())
    }

    fn read(&self, _name: &str, _step: usize) -> Result<Grid<S>, SchemeError> {
        Err(SchemeError::Io(std::io::Error::other(
            "raster dumps cannot be loaded back",
        )))
    }
}
