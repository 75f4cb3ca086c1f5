use nalgebra::{
    Point3,
    Vector3,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    grid::{
        Grid,
        GridGeometry,
        Layer,
        TimeLayers,
    },
    layout::{
        FieldComponent,
        YeeLayout,
    },
    physics::PhysicalConstants,
};

/// Axis-aligned shapes a material region can take. Regions are data; the
/// initialization code does not know which shapes a scenario uses.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum Region {
    Sphere { center: Point3<f64>, radius: f64 },
    Box { min: Point3<f64>, max: Point3<f64> },
}

impl Region {
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        match self {
            Region::Sphere { center, radius } => (point - center).norm() < *radius,
            Region::Box { min, max } => {
                (0..3).all(|a| min[a] <= point[a] && point[a] < max[a])
            }
        }
    }
}

/// A dielectric object stamped into the permittivity grid.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Scatterer {
    pub region: Region,
    pub relative_permittivity: f64,
}

/// A Drude-dispersive region. The plasma frequency is derived from the
/// source frequency at initialization.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DispersiveRegion {
    pub region: Region,
    pub gamma_e: f64,
    pub gamma_m: f64,
}

/// PML conductivity grading parameters.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PmlProfile {
    /// polynomial grading order
    pub order: u32,
    /// target reflection error
    pub reflection_error: f64,
}

impl Default for PmlProfile {
    fn default() -> Self {
        Self {
            order: 6,
            reflection_error: 1e-16,
        }
    }
}

/// The read-only material description of the problem.
///
/// Values are an analytic function of the absolute cell position, so every
/// rank computes identical grids; the one-time halo exchange after setup
/// merely re-asserts that.
#[derive(Clone, Debug)]
pub struct MaterialGrids {
    pub eps: Grid<f64>,
    pub mu: Grid<f64>,
    pub sigma_x: Grid<f64>,
    pub sigma_y: Grid<f64>,
    pub sigma_z: Grid<f64>,
    pub omega_pe: Grid<f64>,
    pub omega_pm: Grid<f64>,
    pub gamma_e: Grid<f64>,
    pub gamma_m: Grid<f64>,
}

pub struct MaterialOptions<'a> {
    pub layout: &'a YeeLayout,
    pub constants: PhysicalConstants,
    pub grid_step: f64,
    pub source_frequency: f64,
    pub use_pml: bool,
    pub pml: PmlProfile,
    pub scatterer: Option<Scatterer>,
    pub dispersive: Option<DispersiveRegion>,
}

impl MaterialGrids {
    pub fn new(geometry: GridGeometry, options: &MaterialOptions) -> Self {
        let make = || Grid::<f64>::new(geometry, TimeLayers::One);
        let mut grids = Self {
            eps: make(),
            mu: make(),
            sigma_x: make(),
            sigma_y: make(),
            sigma_z: make(),
            omega_pe: make(),
            omega_pm: make(),
            gamma_e: make(),
            gamma_m: make(),
        };

        let scatterer = options.scatterer;
        fill(&mut grids.eps, |pos_abs| {
            match &scatterer {
                Some(scatterer) => stamp(
                    &pos_abs,
                    &scatterer.region,
                    scatterer.relative_permittivity,
                    1.0,
                ),
                None => 1.0,
            }
        });
        fill(&mut grids.mu, |_| 1.0);

        if options.use_pml {
            let grading = SigmaGrading::new(options);
            let size = options.layout.size();
            let pml = options.layout.left_border_pml();

            fill(&mut grids.sigma_x, |pos_abs| {
                grading.sigma(pos_abs.x, size.x, pml.x)
            });
            fill(&mut grids.sigma_y, |pos_abs| {
                grading.sigma(pos_abs.y, size.y, pml.y)
            });
            fill(&mut grids.sigma_z, |pos_abs| {
                grading.sigma(pos_abs.z, size.z, pml.z)
            });
        }

        if let Some(dispersive) = options.dispersive {
            // the metamaterial response is disabled inside the absorber:
            // PML cells always run the plain recovery
            let layout = options.layout.clone();
            let omega_p =
                2.0f64.sqrt() * 2.0 * std::f64::consts::PI * options.source_frequency;

            let in_drude = move |pos_abs: &Point3<f64>| {
                dispersive.region.contains(pos_abs)
                    && !in_pml_slab(&layout, pos_abs)
            };

            fill(&mut grids.omega_pe, |pos_abs| {
                if in_drude(&pos_abs) { omega_p } else { 0.0 }
            });
            fill(&mut grids.omega_pm, |pos_abs| {
                if in_drude(&pos_abs) { omega_p } else { 0.0 }
            });
            fill(&mut grids.gamma_e, |pos_abs| {
                if in_drude(&pos_abs) { dispersive.gamma_e } else { 0.0 }
            });
            fill(&mut grids.gamma_m, |pos_abs| {
                if in_drude(&pos_abs) { dispersive.gamma_m } else { 0.0 }
            });
        }

        grids
    }

    pub fn grids_mut(&mut self) -> [&mut Grid<f64>; 9] {
        [
            &mut self.eps,
            &mut self.mu,
            &mut self.sigma_x,
            &mut self.sigma_y,
            &mut self.sigma_z,
            &mut self.omega_pe,
            &mut self.omega_pm,
            &mut self.gamma_e,
            &mut self.gamma_m,
        ]
    }
}

fn in_pml_slab(layout: &YeeLayout, pos_abs: &Point3<f64>) -> bool {
    let left = layout.left_border_pml();
    let right = layout.right_border_pml();
    (0..3).any(|a| pos_abs[a] < left[a] as f64 || pos_abs[a] >= right[a] as f64)
}

/// Evaluates the given function of the absolute cell position for every
/// local cell, halos included.
fn fill(grid: &mut Grid<f64>, f: impl Fn(Point3<f64>) -> f64 + Sync) {
    let strider = *grid.strider();
    let offset = grid.geometry().offset;
    let at = |index: usize| {
        let local = strider.point(index).expect("index within strider");
        let pos_abs = local + offset;
        f(pos_abs.map(|c| c as f64))
    };

    #[cfg(feature = "rayon")]
    let values: Vec<f64> = {
        use rayon::prelude::*;
        (0..strider.len()).into_par_iter().map(at).collect()
    };
    #[cfg(not(feature = "rayon"))]
    let values: Vec<f64> = (0..strider.len()).map(at).collect();

    grid.layer_mut(Layer::Current).copy_from_slice(&values);
}

/// Weights a cell between object and ambient value by the fraction of the
/// cell inside the object, linearized over one cell of transition.
fn stamp(pos: &Point3<f64>, region: &Region, inner: f64, ambient: f64) -> f64 {
    match region {
        Region::Sphere { center, radius } => {
            let distance = (pos - center).norm();
            if distance < radius - 0.5 {
                inner
            }
            else if distance > radius + 0.5 {
                ambient
            }
            else {
                let inside = radius + 0.5 - distance;
                inside * inner + (1.0 - inside) * ambient
            }
        }
        Region::Box { .. } => {
            if region.contains(pos) { inner } else { ambient }
        }
    }
}

/// Polynomial PML conductivity profile.
struct SigmaGrading {
    order: u32,
    grid_step: f64,
    boundary_factor: f64,
}

impl SigmaGrading {
    fn new(options: &MaterialOptions) -> Self {
        let m = options.pml.order;
        let pml_size = options.layout.left_border_pml().x;
        let boundary = pml_size as f64 * options.grid_step;
        let sigma_max = -options.pml.reflection_error.ln() * (m as f64 + 1.0)
            / (2.0 * options.constants.impedance() * boundary);
        let boundary_factor =
            sigma_max / (options.grid_step * boundary.powi(m as i32) * (m as f64 + 1.0));

        Self {
            order: m,
            grid_step: options.grid_step,
            boundary_factor,
        }
    }

    /// Conductivity at integer coordinate `i` of an axis with `pml` cells
    /// of absorber on each of its `n`-cell extent.
    fn sigma(&self, i: f64, n: usize, pml: usize) -> f64 {
        let i = i as usize;
        let distance = if i < pml {
            pml - 1 - i
        }
        else if i >= n - pml {
            i - (n - pml)
        }
        else {
            return 0.0;
        };

        let outer = (distance as f64 + 1.0) * self.grid_step;
        let inner = distance as f64 * self.grid_step;
        self.boundary_factor
            * (outer.powi(self.order as i32 + 1) - inner.powi(self.order as i32 + 1))
    }
}

/// Material value at a component's staggered sample position: the mean of
/// the 2^k surrounding material cells over the half-offset axes.
pub fn sample_at(grid: &Grid<f64>, component: FieldComponent, position: &Point3<usize>) -> f64 {
    let offset = component.min_coord_fp();
    let local = grid.local_size();

    let reach = Vector3::from_fn(|a, _| usize::from(offset[a] == 0.5));
    let mut sum = 0.0;
    let mut count = 0.0;
    for dz in 0..=reach.z {
        for dy in 0..=reach.y {
            for dx in 0..=reach.x {
                let neighbor = Point3::new(
                    (position.x + dx).min(local.x - 1),
                    (position.y + dy).min(local.y - 1),
                    (position.z + dz).min(local.z - 1),
                );
                sum += grid.get(Layer::Current, &neighbor);
                count += 1.0;
            }
        }
    }
    sum / count
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use nalgebra::{
        Point3,
        Vector3,
    };

    use crate::{
        grid::{
            GridGeometry,
            Layer,
        },
        layout::{
            FieldComponent,
            YeeLayout,
        },
        material::{
            DispersiveRegion,
            MaterialGrids,
            MaterialOptions,
            PmlProfile,
            Region,
            Scatterer,
            sample_at,
        },
        physics::PhysicalConstants,
    };

    fn options(layout: &YeeLayout) -> MaterialOptions<'_> {
        MaterialOptions {
            layout,
            constants: PhysicalConstants::SI,
            grid_step: 1e-9,
            source_frequency: 1e16,
            use_pml: true,
            pml: PmlProfile::default(),
            scatterer: Some(Scatterer {
                region: Region::Sphere {
                    center: Point3::new(20.0, 20.0, 20.0),
                    radius: 6.0,
                },
                relative_permittivity: 2.0,
            }),
            dispersive: None,
        }
    }

    fn layout() -> YeeLayout {
        YeeLayout::new(Vector3::repeat(40), 8, 12, 10, FRAC_PI_2, 0.0)
    }

    #[test]
    fn it_stamps_the_scatterer() {
        let layout = layout();
        let grids = MaterialGrids::new(GridGeometry::serial(layout.size()), &options(&layout));

        assert_eq!(grids.eps.get(Layer::Current, &Point3::new(20, 20, 20)), 2.0);
        assert_eq!(grids.eps.get(Layer::Current, &Point3::new(2, 2, 2)), 1.0);

        // one cell of linear transition at the surface
        let boundary = grids.eps.get(Layer::Current, &Point3::new(26, 20, 20));
        assert!(boundary > 1.0 && boundary < 2.0);
    }

    #[test]
    fn it_grades_the_pml_conductivity() {
        let layout = layout();
        let grids = MaterialGrids::new(GridGeometry::serial(layout.size()), &options(&layout));

        let sigma = |x| grids.sigma_x.get(Layer::Current, &Point3::new(x, 20, 20));

        assert_eq!(sigma(20), 0.0);
        assert_eq!(sigma(8), 0.0);
        // grows monotonically towards the outer boundary
        assert!(sigma(7) > 0.0);
        for x in 1..8 {
            assert!(sigma(x - 1) > sigma(x));
        }
        // symmetric profile on the two faces
        for d in 0..8 {
            let left = sigma(d);
            let right = sigma(39 - d);
            assert!((left - right).abs() <= 1e-12 * left.max(right));
        }
        // sigma_y is untouched by x distance
        assert_eq!(grids.sigma_y.get(Layer::Current, &Point3::new(1, 20, 20)), 0.0);
    }

    #[test]
    fn it_keeps_the_pml_free_of_drude_response() {
        let layout = layout();
        let mut options = options(&layout);
        options.dispersive = Some(DispersiveRegion {
            region: Region::Box {
                min: Point3::new(4.0, 14.0, 14.0),
                max: Point3::new(26.0, 26.0, 26.0),
            },
            gamma_e: 0.0,
            gamma_m: 0.0,
        });
        let grids = MaterialGrids::new(GridGeometry::serial(layout.size()), &options);

        let omega = 2.0f64.sqrt() * 2.0 * std::f64::consts::PI * options.source_frequency;
        let at = |p| grids.omega_pe.get(Layer::Current, &p);
        assert_eq!(at(Point3::new(20, 20, 20)), omega);
        // inside the configured box but also inside the PML slab
        assert_eq!(at(Point3::new(5, 20, 20)), 0.0);
        assert_eq!(at(Point3::new(30, 20, 20)), 0.0);
    }

    #[test]
    fn it_averages_material_at_staggered_samples() {
        let layout = layout();
        let grids = MaterialGrids::new(GridGeometry::serial(layout.size()), &options(&layout));

        // Ex at (25.5, 20, 20): mean of eps at x = 25 and x = 26
        let expected = 0.5
            * (grids.eps.get(Layer::Current, &Point3::new(25, 20, 20))
                + grids.eps.get(Layer::Current, &Point3::new(26, 20, 20)));
        let sampled = sample_at(&grids.eps, FieldComponent::Ex, &Point3::new(25, 20, 20));
        approx::assert_relative_eq!(sampled, expected, epsilon = 1e-15);
    }
}
