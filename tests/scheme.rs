use std::f64::consts::FRAC_PI_2;

use nalgebra::{
    Point3,
    Vector3,
};
use yee_fdtd::{
    Complex64,
    Partition,
    Scheme,
    SchemeConfig,
    grid::Layer,
    layout::FieldComponent,
    material::{
        DispersiveRegion,
        Region,
        Scatterer,
    },
    physics::PhysicalConstants,
    scalar::FieldScalar,
};

fn base_config(size: usize) -> SchemeConfig {
    let constants = PhysicalConstants::SI;
    let mut config = SchemeConfig::default();
    config.size = Vector3::repeat(size);
    config.grid_step = 1e-9;
    config.source_frequency = constants.speed_of_light() / (10.0 * config.grid_step);
    config.incident_theta = FRAC_PI_2;
    config.incident_phi = 0.0;
    config
}

fn scheme<S: FieldScalar>(config: SchemeConfig) -> Scheme<S> {
    let partition = Partition::serial(config.size);
    Scheme::new(config, partition).expect("configuration is valid")
}

/// Largest field magnitude over all cells whose sample position satisfies
/// the predicate.
fn component_max<S: FieldScalar>(
    scheme: &Scheme<S>,
    component: FieldComponent,
    predicate: impl Fn(&Point3<f64>) -> bool,
) -> f64 {
    let grid = scheme.field(component);
    let size = scheme.config().size;

    let mut max = 0.0f64;
    for z in 0..size.z {
        for y in 0..size.y {
            for x in 0..size.x {
                let position = Point3::new(x, y, z);
                let sample = scheme.layout().component_position(component, &position);
                if predicate(&sample) {
                    max = max.max(grid.get(Layer::Previous, &position).magnitude());
                }
            }
        }
    }
    max
}

#[test]
fn tfsf_isolation_without_scatterer() {
    // a plane wave injected through the Huygens surface of an empty box
    // must cancel exactly outside it
    let mut config = base_config(26);
    config.use_pml = false;
    config.use_tfsf = true;
    config.tfsf_margin = 7;
    config.total_steps = 50;

    let mut scheme = scheme::<f64>(config);
    scheme.run().unwrap();

    let inside = |r: &Point3<f64>| (0..3).all(|a| 7.0 < r[a] && r[a] < 19.0);

    let interior = component_max(&scheme, FieldComponent::Ey, |r| inside(r));
    assert!(interior > 0.3, "incident wave missing inside: {interior}");

    for component in [FieldComponent::Ey, FieldComponent::Hz, FieldComponent::Ez] {
        let leaked = component_max(&scheme, component, |r| !inside(r));
        assert!(
            leaked < 1e-10,
            "scattered region contaminated: {component:?} = {leaked:e}"
        );
    }
}

#[test]
fn pml_absorbs_outgoing_radiation() {
    // same radiating source with and without the absorber; the outermost
    // shell must be orders of magnitude quieter with it
    let run = |use_pml: bool| {
        let mut config = base_config(24);
        config.source_frequency =
            PhysicalConstants::SI.speed_of_light() / (8.0 * config.grid_step);
        config.use_pml = use_pml;
        config.use_tfsf = false;
        config.pml_size = 8;
        config.total_steps = 120;

        let mut scheme = scheme::<f64>(config);
        scheme.run().unwrap();

        let shell = |r: &Point3<f64>| {
            (0..3).any(|a| (0.5..=1.5).contains(&r[a]) || (21.5..=22.5).contains(&r[a]))
        };
        component_max(&scheme, FieldComponent::Ez, shell)
    };

    let absorbed = run(true);
    let free = run(false);

    assert!(free > 1e-4, "free-space reference too quiet: {free:e}");
    assert!(
        absorbed < 0.1 * free,
        "PML barely attenuates: {absorbed:e} vs {free:e}"
    );
}

#[test]
fn point_source_field_is_mirror_symmetric() {
    // uniform material, centered source: the discrete solution keeps the
    // lattice mirror symmetries
    let mut config = base_config(21);
    config.use_pml = false;
    config.use_tfsf = false;
    config.total_steps = 24;

    let mut scheme = scheme::<f64>(config);
    scheme.run().unwrap();

    let ez = scheme.field(FieldComponent::Ez);
    let ex = scheme.field(FieldComponent::Ex);

    let mut peak = 0.0f64;
    let mut worst = 0.0f64;
    for z in 0..21 {
        for y in 0..21 {
            for x in 0..21 {
                let value = ez.get(Layer::Previous, &Point3::new(x, y, z)).abs();
                peak = peak.max(value);

                let across_x = ez.get(Layer::Previous, &Point3::new(20 - x, y, z)).abs();
                let across_y = ez.get(Layer::Previous, &Point3::new(x, 20 - y, z)).abs();
                worst = worst.max((value - across_x).abs());
                worst = worst.max((value - across_y).abs());

                // Ex samples sit at x + 1/2, their mirror image is 19 - x
                if x < 20 {
                    let value = ex.get(Layer::Previous, &Point3::new(x, y, z)).abs();
                    let across = ex.get(Layer::Previous, &Point3::new(19 - x, y, z)).abs();
                    worst = worst.max((value - across).abs());
                }
            }
        }
    }

    assert!(peak > 0.0);
    assert!(worst <= 1e-12 * peak, "asymmetry {worst:e} at peak {peak:e}");
}

#[test]
fn closed_box_remains_stable() {
    // PEC-terminated box, continuously driven: the leapfrog at half the
    // CFL limit must not blow up
    let mut config = base_config(16);
    config.source_frequency =
        PhysicalConstants::SI.speed_of_light() / (8.0 * config.grid_step);
    config.use_pml = false;
    config.use_tfsf = false;
    config.total_steps = 0;

    let mut scheme = scheme::<f64>(config);

    let mut reference = 0.0;
    let mut peak = 0.0f64;
    for step in 1..=200 {
        scheme.step().unwrap();
        let energy = scheme.total_energy();
        if step == 40 {
            reference = energy;
        }
        if step > 40 {
            peak = peak.max(energy);
        }
    }

    assert!(reference > 0.0);
    assert!(
        peak < 100.0 * reference,
        "driven energy ran away: {peak:e} vs {reference:e}"
    );
}

#[test]
fn dispersive_scatterer_radiates() {
    // a Drude sphere inside the total-field box produces a scattered
    // field outside it
    let mut config = base_config(20);
    config.use_pml = true;
    config.use_tfsf = true;
    config.use_metamaterials = true;
    config.pml_size = 4;
    config.tfsf_margin = 7;
    config.total_steps = 50;
    config.dispersive = Some(DispersiveRegion {
        region: Region::Sphere {
            center: Point3::new(10.0, 10.0, 10.0),
            radius: 2.5,
        },
        gamma_e: 0.0,
        gamma_m: 0.0,
    });

    let mut scheme = scheme::<f64>(config);
    scheme.run().unwrap();

    let outside = |r: &Point3<f64>| {
        (0..3).any(|a| r[a] < 7.0 || r[a] > 13.0)
            // stay clear of the absorber when measuring
            && (0..3).all(|a| (4.0..16.0).contains(&r[a]))
    };
    let scattered = component_max(&scheme, FieldComponent::Ey, outside);

    assert!(
        scattered > 1e-6,
        "no scattered field from the Drude sphere: {scattered:e}"
    );
    assert!(scattered < 10.0);
}

#[test]
fn amplitude_mode_reaches_steady_state() {
    let mut config = base_config(12);
    config.source_frequency =
        PhysicalConstants::SI.speed_of_light() / (8.0 * config.grid_step);
    config.use_pml = true;
    config.use_tfsf = false;
    config.pml_size = 4;
    config.calculate_amplitude = true;
    config.total_steps = 48;
    config.amplitude_step_limit = 600;

    let mut scheme = scheme::<f64>(config);
    scheme.run().unwrap();

    assert!(scheme.timestep() > 48);
    assert!(
        scheme.timestep() < 600,
        "only stopped at the step limit: {}",
        scheme.timestep()
    );
}

#[test]
fn ntff_pattern_from_scattering_run() {
    let mut config = base_config(20);
    config.use_pml = true;
    config.use_tfsf = true;
    config.use_ntff = true;
    config.pml_size = 4;
    config.ntff_margin = 5;
    config.tfsf_margin = 7;
    config.total_steps = 40;
    // keep the scheduled emission quiet; the pattern is requested below
    config.ntff_interval = 1000;
    config.scatterer = Some(Scatterer {
        region: Region::Sphere {
            center: Point3::new(10.0, 10.0, 10.0),
            radius: 2.5,
        },
        relative_permittivity: 2.0,
    });

    let mut scheme = scheme::<Complex64>(config);
    scheme.run().unwrap();

    let pattern = scheme.ntff_pattern().unwrap().expect("serial run gathers on root");
    assert_eq!(pattern.len(), 181);
    assert!(pattern.iter().all(|(_, p)| p.is_finite() && *p >= 0.0));

    let peak = pattern.iter().map(|(_, p)| *p).fold(0.0f64, f64::max);
    assert!(peak > 0.0, "dielectric sphere scatters nothing");
}
