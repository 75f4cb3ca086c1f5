use std::path::PathBuf;

use clap::{
    Parser,
    ValueEnum,
};
use color_eyre::eyre::{
    Context,
    Error,
};
use nalgebra::Vector3;
use tracing_subscriber::EnvFilter;
use yee_fdtd::{
    Complex64,
    Partition,
    Scheme,
    SchemeConfig,
    Topology,
    dump::{
        ImageDumper,
        TextDumper,
    },
    scalar::FieldScalar,
};

/// 3D FDTD Maxwell solver with PML, TFSF, Drude media and NTFF.
#[derive(Debug, Parser)]
struct Args {
    /// scenario file (TOML); command-line options override it
    #[clap(long)]
    scenario: Option<PathBuf>,

    /// cubic grid extent in cells
    #[clap(long)]
    size: Option<usize>,

    /// spatial step in meters
    #[clap(long)]
    grid_step: Option<f64>,

    /// source frequency in Hz
    #[clap(long)]
    frequency: Option<f64>,

    /// incident elevation angle
    #[clap(long)]
    theta: Option<f64>,

    /// incident azimuth angle
    #[clap(long)]
    phi: Option<f64>,

    /// number of timesteps
    #[clap(long)]
    steps: Option<usize>,

    #[clap(long)]
    no_pml: bool,

    #[clap(long)]
    no_tfsf: bool,

    #[clap(long)]
    metamaterials: bool,

    /// emit the far-field pattern (runs with complex field values)
    #[clap(long)]
    ntff: bool,

    /// run to the harmonic steady state (requires real field values)
    #[clap(long)]
    amplitude: bool,

    /// amplitude-mode step limit
    #[clap(long)]
    step_limit: Option<usize>,

    /// write grid dumps below this directory
    #[clap(long)]
    dump_dir: Option<PathBuf>,

    /// decomposition topology for distributed runs
    #[clap(long, value_enum, default_value = "xyz")]
    topology: TopologyArg,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TopologyArg {
    X,
    Y,
    Z,
    Xy,
    Yz,
    Xz,
    Xyz,
}

impl From<TopologyArg> for Topology {
    fn from(arg: TopologyArg) -> Topology {
        match arg {
            TopologyArg::X => Topology::X,
            TopologyArg::Y => Topology::Y,
            TopologyArg::Z => Topology::Z,
            TopologyArg::Xy => Topology::Xy,
            TopologyArg::Yz => Topology::Yz,
            TopologyArg::Xz => Topology::Xz,
            TopologyArg::Xyz => Topology::Xyz,
        }
    }
}

impl Args {
    fn into_config(self) -> Result<(SchemeConfig, Self), Error> {
        let mut config = match &self.scenario {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .wrap_err_with(|| format!("reading scenario {}", path.display()))?;
                toml::from_str(&text)
                    .wrap_err_with(|| format!("parsing scenario {}", path.display()))?
            }
            None => SchemeConfig::default(),
        };

        if let Some(size) = self.size {
            config.size = Vector3::repeat(size);
        }
        if let Some(grid_step) = self.grid_step {
            config.grid_step = grid_step;
        }
        if let Some(frequency) = self.frequency {
            config.source_frequency = frequency;
        }
        if let Some(theta) = self.theta {
            config.incident_theta = theta;
        }
        if let Some(phi) = self.phi {
            config.incident_phi = phi;
        }
        if let Some(steps) = self.steps {
            config.total_steps = steps;
        }
        if let Some(limit) = self.step_limit {
            config.amplitude_step_limit = limit;
        }

        if self.no_pml {
            config.use_pml = false;
        }
        if self.no_tfsf {
            config.use_tfsf = false;
        }
        config.use_metamaterials |= self.metamaterials;
        config.use_ntff |= self.ntff;
        config.calculate_amplitude |= self.amplitude;
        config.dump |= self.dump_dir.is_some();

        if config.calculate_amplitude {
            config.use_tfsf = false;
            if config.amplitude_step_limit <= config.total_steps {
                config.amplitude_step_limit = config.total_steps * 10;
            }
        }

        Ok((config, self))
    }
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    color_eyre::install()?;

    let args = Args::parse();
    let (config, args) = args.into_config()?;

    if config.calculate_amplitude {
        run::<f64>(config, &args)
    }
    else {
        run::<Complex64>(config, &args)
    }
}

fn run<S: FieldScalar>(config: SchemeConfig, args: &Args) -> Result<(), Error> {
    let partition = make_partition(&args.topology, config.size)?;
    let mut scheme = Scheme::<S>::new(config, partition)?;

    if let Some(directory) = &args.dump_dir {
        scheme.add_dumper(Box::new(TextDumper::new(directory)));
        scheme.add_dumper(Box::new(ImageDumper::new(directory)));
    }

    scheme.run()?;
    tracing::info!(timesteps = scheme.timestep(), "run finished");
    Ok(())
}

#[cfg(feature = "mpi")]
fn make_partition(
    topology: &TopologyArg,
    size: Vector3<usize>,
) -> Result<Partition, Error> {
    Ok(Partition::distributed((*topology).into(), size)?)
}

#[cfg(not(feature = "mpi"))]
fn make_partition(
    topology: &TopologyArg,
    size: Vector3<usize>,
) -> Result<Partition, Error> {
    let _ = topology;
    Ok(Partition::serial(size))
}
