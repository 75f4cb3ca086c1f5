use std::f64::consts::PI;

use nalgebra::Point3;

use crate::{
    amplitude::{
        AmplitudeTracker,
        STABILITY_ACCURACY,
    },
    config::SchemeConfig,
    dump::GridIo,
    error::SchemeError,
    grid::{
        Grid,
        Layer,
        TimeLayers,
    },
    grid::strider::iter_points,
    incident::PlaneWave,
    layout::{
        Axis,
        Direction,
        FieldComponent,
        YeeLayout,
    },
    material::{
        MaterialGrids,
        MaterialOptions,
        sample_at,
    },
    ntff::{
        GatheredFields,
        NtffTransform,
    },
    partition::Partition,
    physics::PhysicalConstants,
    scalar::FieldScalar,
};

/// The three Cartesian grids of one vector field.
#[derive(Clone, Debug)]
pub struct FieldSet<S> {
    pub x: Grid<S>,
    pub y: Grid<S>,
    pub z: Grid<S>,
}

impl<S: FieldScalar> FieldSet<S> {
    fn new(geometry: crate::grid::GridGeometry, layers: TimeLayers) -> Self {
        Self {
            x: Grid::new(geometry, layers),
            y: Grid::new(geometry, layers),
            z: Grid::new(geometry, layers),
        }
    }

    pub fn component(&self, axis: Axis) -> &Grid<S> {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }

    pub fn component_mut(&mut self, axis: Axis) -> &mut Grid<S> {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }

    fn advance(&mut self) -> Result<(), SchemeError> {
        self.x.advance_layers()?;
        self.y.advance_layers()?;
        self.z.advance_layers()?;
        Ok(())
    }
}

/// Per-cell update coefficients of the split-field PML scheme.
struct PmlCoefficients {
    ca: Vec<f64>,
    cb: Vec<f64>,
    rec_ca: Vec<f64>,
    rec_cb: Vec<f64>,
    rec_cc: Vec<f64>,
}

/// Per-cell coefficients of the Drude auxiliary recurrence.
struct DrudeCoefficients {
    b0: Vec<f64>,
    b1: Vec<f64>,
    b2: Vec<f64>,
    a1: Vec<f64>,
    a2: Vec<f64>,
}

struct ComponentCoefficients {
    plain_b: Vec<f64>,
    pml: Option<PmlCoefficients>,
    drude: Option<DrudeCoefficients>,
}

/// All update coefficients, precomputed from the sampled material grids
/// once after initialization. The update formulas are the contract; the
/// inner loops only ever see these tables.
struct Coefficients {
    per_component: [ComponentCoefficients; 6],
}

const COMPONENTS: [FieldComponent; 6] = [
    FieldComponent::Ex,
    FieldComponent::Ey,
    FieldComponent::Ez,
    FieldComponent::Hx,
    FieldComponent::Hy,
    FieldComponent::Hz,
];

fn component_slot(component: FieldComponent) -> usize {
    COMPONENTS
        .iter()
        .position(|c| *c == component)
        .expect("all components are indexed")
}

impl Coefficients {
    fn new(
        config: &SchemeConfig,
        constants: &PhysicalConstants,
        materials: &MaterialGrids,
    ) -> Self {
        let dt = config.time_step(constants);
        let dx = config.grid_step;
        let eps0 = constants.vacuum_permittivity;
        let mu0 = constants.vacuum_permeability;

        let per_component = std::array::from_fn(|slot| {
            let component = COMPONENTS[slot];
            let axis = component.axis();
            let electric = component.is_electric();

            let perm_grid = if electric { &materials.eps } else { &materials.mu };
            let perm0 = if electric { eps0 } else { mu0 };
            let strider = *perm_grid.strider();

            let sigma_of = |axis: Axis| {
                match axis {
                    Axis::X => &materials.sigma_x,
                    Axis::Y => &materials.sigma_y,
                    Axis::Z => &materials.sigma_z,
                }
            };

            let mut plain_b = vec![0.0; strider.len()];
            for index in 0..strider.len() {
                let position = strider.point(index).expect("index within strider");
                let perm = sample_at(perm_grid, component, &position);
                plain_b[index] = dt / (perm * perm0 * dx);
            }

            let pml = config.use_pml.then(|| {
                let mut coefficients = PmlCoefficients {
                    ca: vec![0.0; strider.len()],
                    cb: vec![0.0; strider.len()],
                    rec_ca: vec![0.0; strider.len()],
                    rec_cb: vec![0.0; strider.len()],
                    rec_cc: vec![0.0; strider.len()],
                };

                for index in 0..strider.len() {
                    let position = strider.point(index).expect("index within strider");
                    let perm = sample_at(perm_grid, component, &position);

                    // kappa stretching is disabled, k = 1 throughout
                    let sigma_flux = sample_at(sigma_of(axis.next()), component, &position);
                    let denominator = 2.0 * eps0 + sigma_flux * dt;
                    coefficients.ca[index] = (2.0 * eps0 - sigma_flux * dt) / denominator;
                    coefficients.cb[index] = (2.0 * eps0 * dt / dx) / denominator;

                    let sigma_a = sample_at(sigma_of(axis.next().next()), component, &position);
                    let sigma_b = sample_at(sigma_of(axis), component, &position);
                    let modifier = if config.use_metamaterials {
                        1.0
                    }
                    else {
                        perm * perm0
                    };
                    let denominator = 2.0 * eps0 + sigma_a * dt;
                    coefficients.rec_ca[index] = (2.0 * eps0 - sigma_a * dt) / denominator;
                    coefficients.rec_cb[index] =
                        (2.0 * eps0 + sigma_b * dt) / modifier / denominator;
                    coefficients.rec_cc[index] =
                        (2.0 * eps0 - sigma_b * dt) / modifier / denominator;
                }

                coefficients
            });

            let drude = config.use_metamaterials.then(|| {
                let omega_grid = if electric {
                    &materials.omega_pe
                }
                else {
                    &materials.omega_pm
                };
                let gamma_grid = if electric {
                    &materials.gamma_e
                }
                else {
                    &materials.gamma_m
                };

                let mut coefficients = DrudeCoefficients {
                    b0: vec![0.0; strider.len()],
                    b1: vec![0.0; strider.len()],
                    b2: vec![0.0; strider.len()],
                    a1: vec![0.0; strider.len()],
                    a2: vec![0.0; strider.len()],
                };

                for index in 0..strider.len() {
                    let position = strider.point(index).expect("index within strider");
                    let perm = sample_at(perm_grid, component, &position);
                    let omega = sample_at(omega_grid, component, &position);
                    let gamma = sample_at(gamma_grid, component, &position);

                    let a = 4.0 * perm0 * perm
                        + 2.0 * dt * perm0 * perm * gamma
                        + perm0 * dt * dt * omega * omega;

                    coefficients.b0[index] = (4.0 + 2.0 * dt * gamma) / a;
                    coefficients.b1[index] = -8.0 / a;
                    coefficients.b2[index] = (4.0 - 2.0 * dt * gamma) / a;
                    coefficients.a1[index] =
                        (2.0 * perm0 * dt * dt * omega * omega - 8.0 * perm0 * perm) / a;
                    coefficients.a2[index] = (4.0 * perm0 * perm
                        - 2.0 * dt * perm0 * perm * gamma
                        + perm0 * dt * dt * omega * omega)
                        / a;
                }

                coefficients
            });

            ComponentCoefficients { plain_b, pml, drude }
        });

        Self { per_component }
    }

    fn component(&self, component: FieldComponent) -> &ComponentCoefficients {
        &self.per_component[component_slot(component)]
    }
}

/// The coupled update engine: field state, auxiliary state, and the
/// per-timestep state machine driving them.
#[derive(derive_more::Debug)]
pub struct Scheme<S: FieldScalar> {
    config: SchemeConfig,
    constants: PhysicalConstants,
    layout: YeeLayout,
    partition: Partition,
    materials: MaterialGrids,
    #[debug(ignore)]
    coefficients: Coefficients,

    e: FieldSet<S>,
    h: FieldSet<S>,
    d: Option<FieldSet<S>>,
    b: Option<FieldSet<S>>,
    d1: Option<FieldSet<S>>,
    b1: Option<FieldSet<S>>,
    plane_wave: Option<PlaneWave<S>>,

    #[debug(ignore)]
    dumpers: Vec<Box<dyn GridIo<S>>>,

    time_step: f64,
    wavelength: f64,
    timestep: usize,
}

impl<S: FieldScalar> Scheme<S> {
    pub fn new(config: SchemeConfig, partition: Partition) -> Result<Self, SchemeError> {
        let constants = PhysicalConstants::SI;

        config.validate(S::COMPLEX, partition.is_distributed())?;
        if partition.total_size() != config.size {
            return Err(SchemeError::topology(format!(
                "partition covers {:?}, configuration asks for {:?}",
                partition.total_size(),
                config.size
            )));
        }

        let layout = config.layout();
        let geometry = partition.grid_geometry();
        let time_step = config.time_step(&constants);
        let wavelength = config.wavelength(&constants);

        let mut materials = MaterialGrids::new(
            geometry,
            &MaterialOptions {
                layout: &layout,
                constants,
                grid_step: config.grid_step,
                source_frequency: config.source_frequency,
                use_pml: config.use_pml,
                pml: config.pml_profile,
                scatterer: config.scatterer,
                dispersive: config.use_metamaterials.then_some(config.dispersive).flatten(),
            },
        );
        // materials are identical on every rank by construction; the
        // one-time exchange settles the halos regardless
        for grid in materials.grids_mut() {
            partition.exchange(grid)?;
        }

        let coefficients = Coefficients::new(&config, &constants, &materials);

        let field_layers = TimeLayers::Two;
        let flux_layers = if config.use_metamaterials {
            TimeLayers::Three
        }
        else {
            TimeLayers::Two
        };

        let e = FieldSet::new(geometry, field_layers);
        let h = FieldSet::new(geometry, field_layers);
        let d = config.use_pml.then(|| FieldSet::new(geometry, flux_layers));
        let b = config.use_pml.then(|| FieldSet::new(geometry, flux_layers));
        let d1 = config
            .use_metamaterials
            .then(|| FieldSet::new(geometry, TimeLayers::Three));
        let b1 = config
            .use_metamaterials
            .then(|| FieldSet::new(geometry, TimeLayers::Three));

        let plane_wave = config.use_tfsf.then(|| {
            PlaneWave::new(
                &layout,
                &constants,
                config.grid_step,
                time_step,
                config.source_frequency,
            )
        });

        tracing::debug!(
            size = ?(config.size.x, config.size.y, config.size.z),
            rank = partition.rank(),
            ranks = partition.rank_count(),
            use_pml = config.use_pml,
            use_tfsf = config.use_tfsf,
            use_metamaterials = config.use_metamaterials,
            "scheme initialized"
        );

        Ok(Self {
            config,
            constants,
            layout,
            partition,
            materials,
            coefficients,
            e,
            h,
            d,
            b,
            d1,
            b1,
            plane_wave,
            dumpers: Vec::new(),
            time_step,
            wavelength,
            timestep: 0,
        })
    }

    pub fn add_dumper(&mut self, dumper: Box<dyn GridIo<S>>) {
        self.dumpers.push(dumper);
    }

    pub fn config(&self) -> &SchemeConfig {
        &self.config
    }

    pub fn layout(&self) -> &YeeLayout {
        &self.layout
    }

    pub fn constants(&self) -> &PhysicalConstants {
        &self.constants
    }

    pub fn materials(&self) -> &MaterialGrids {
        &self.materials
    }

    pub fn timestep(&self) -> usize {
        self.timestep
    }

    pub fn time(&self) -> f64 {
        self.timestep as f64 * self.time_step
    }

    pub fn field(&self, component: FieldComponent) -> &Grid<S> {
        let set = if component.is_electric() { &self.e } else { &self.h };
        set.component(component.axis())
    }

    /// Field energy over this rank's owned cells, for diagnostics.
    pub fn total_energy(&self) -> f64 {
        let eps0 = self.constants.vacuum_permittivity;
        let mu0 = self.constants.vacuum_permeability;

        let mut energy = 0.0;
        for component in COMPONENTS {
            let grid = self.field(component);
            let perm_grid = if component.is_electric() {
                &self.materials.eps
            }
            else {
                &self.materials.mu
            };
            let perm0 = if component.is_electric() { eps0 } else { mu0 };

            let geometry = grid.geometry();
            for position in iter_points(geometry.core_start(), geometry.core_end()) {
                let value = grid.get(Layer::Previous, &position).magnitude();
                energy += sample_at(perm_grid, component, &position) * perm0 * value * value;
            }
        }

        0.5 * energy * self.config.grid_step.powi(3)
    }

    /// Runs the configured number of timesteps, then the amplitude phase
    /// if requested.
    pub fn run(&mut self) -> Result<(), SchemeError> {
        tracing::info!(steps = self.config.total_steps, "starting run");

        if self.config.dump {
            let eps = material_as_field::<S>(&self.materials.eps);
            self.dump_grid(&eps, Layer::Current, "Eps")?;
        }

        for _ in 0..self.config.total_steps {
            self.step()?;
            self.emit_scheduled()?;
        }

        if self.config.calculate_amplitude {
            let settled = self.reach_steady_state()?;
            tracing::info!(settled, "steady state reached");
        }

        Ok(())
    }

    /// One full timestep of the leapfrog state machine.
    pub fn step(&mut self) -> Result<(), SchemeError> {
        let t = self.timestep;

        if let Some(wave) = self.plane_wave.as_mut() {
            wave.step_e(t);
        }

        self.update_electric();

        if self.plane_wave.is_none() {
            self.inject_hard_source(t);
        }

        self.e.advance()?;
        if let Some(d) = self.d.as_mut() {
            d.advance()?;
        }
        if let Some(d1) = self.d1.as_mut() {
            d1.advance()?;
        }

        self.partition.exchange(&mut self.e.x)?;
        self.partition.exchange(&mut self.e.y)?;
        self.partition.exchange(&mut self.e.z)?;

        if let Some(wave) = self.plane_wave.as_mut() {
            wave.step_h(t);
        }

        self.update_magnetic();

        self.h.advance()?;
        if let Some(b) = self.b.as_mut() {
            b.advance()?;
        }
        if let Some(b1) = self.b1.as_mut() {
            b1.advance()?;
        }

        self.partition.exchange(&mut self.h.x)?;
        self.partition.exchange(&mut self.h.y)?;
        self.partition.exchange(&mut self.h.z)?;

        self.timestep += 1;
        self.validate_fields()?;

        tracing::trace!(timestep = self.timestep, "step complete");
        Ok(())
    }

    fn update_electric(&mut self) {
        let Self {
            config,
            layout,
            coefficients,
            e,
            h,
            d,
            d1,
            plane_wave,
            ..
        } = self;
        let wave = plane_wave.as_ref().filter(|_| config.use_tfsf);

        for axis in [Axis::X, Axis::Y, Axis::Z] {
            let component = match axis {
                Axis::X => FieldComponent::Ex,
                Axis::Y => FieldComponent::Ey,
                Axis::Z => FieldComponent::Ez,
            };
            let (axis1, axis2) = component.curl_axes();
            let partner1 = h.component(
                component.curl_partner(axis1).expect("transverse axis").axis(),
            );
            let partner2 = h.component(
                component.curl_partner(axis2).expect("transverse axis").axis(),
            );
            let coefficients = coefficients.component(component);

            if let Some(d) = d.as_mut() {
                let flux = d.component_mut(axis);
                let pml = coefficients.pml.as_ref().expect("pml coefficients exist");

                step_flux(layout, component, flux, partner1, partner2, wave, pml);

                if let Some(d1) = d1.as_mut() {
                    let aux = d1.component_mut(axis);
                    let drude = coefficients
                        .drude
                        .as_ref()
                        .expect("drude coefficients exist");
                    step_drude(layout, component, flux, aux, drude);
                    step_recovery(layout, component, e.component_mut(axis), aux, pml);
                }
                else {
                    step_recovery(layout, component, e.component_mut(axis), flux, pml);
                }
            }
            else {
                step_plain(
                    layout,
                    component,
                    e.component_mut(axis),
                    partner1,
                    partner2,
                    wave,
                    &coefficients.plain_b,
                );
            }
        }
    }

    fn update_magnetic(&mut self) {
        let Self {
            config,
            layout,
            coefficients,
            e,
            h,
            b,
            b1,
            plane_wave,
            ..
        } = self;
        let wave = plane_wave.as_ref().filter(|_| config.use_tfsf);

        for axis in [Axis::X, Axis::Y, Axis::Z] {
            let component = match axis {
                Axis::X => FieldComponent::Hx,
                Axis::Y => FieldComponent::Hy,
                Axis::Z => FieldComponent::Hz,
            };
            let (axis1, axis2) = component.curl_axes();
            let partner1 = e.component(
                component.curl_partner(axis1).expect("transverse axis").axis(),
            );
            let partner2 = e.component(
                component.curl_partner(axis2).expect("transverse axis").axis(),
            );
            let coefficients = coefficients.component(component);

            if let Some(b) = b.as_mut() {
                let flux = b.component_mut(axis);
                let pml = coefficients.pml.as_ref().expect("pml coefficients exist");

                step_flux(layout, component, flux, partner1, partner2, wave, pml);

                if let Some(b1) = b1.as_mut() {
                    let aux = b1.component_mut(axis);
                    let drude = coefficients
                        .drude
                        .as_ref()
                        .expect("drude coefficients exist");
                    step_drude(layout, component, flux, aux, drude);
                    step_recovery(layout, component, h.component_mut(axis), aux, pml);
                }
                else {
                    step_recovery(layout, component, h.component_mut(axis), flux, pml);
                }
            }
            else {
                step_plain(
                    layout,
                    component,
                    h.component_mut(axis),
                    partner1,
                    partner2,
                    wave,
                    &coefficients.plain_b,
                );
            }
        }
    }

    /// Harmonic hard source at the grid center, used when no plane wave
    /// is injected.
    fn inject_hard_source(&mut self, timestep: usize) {
        let center = Point3::from(self.layout.size().map(|n| n / 2));
        let Some(local) = self.e.z.relative_position(&center) else {
            return;
        };

        let geometry = *self.e.z.geometry();
        let owned = (0..3).all(|a| {
            local[a] >= geometry.core_start()[a] && local[a] < geometry.core_end()[a]
        });
        if !owned {
            return;
        }

        let phase = 2.0 * PI * self.config.source_frequency * self.time_step * timestep as f64;
        self.e.z.set(Layer::Current, &local, S::harmonic(phase));
    }

    /// Every field cell must stay finite; a NaN or infinity anywhere is
    /// unrecoverable and reported with its global cell coordinate.
    fn validate_fields(&self) -> Result<(), SchemeError> {
        for component in COMPONENTS {
            let grid = self.field(component);
            for (index, value) in grid.layer(Layer::Previous).iter().enumerate() {
                if !value.is_finite() {
                    let local = grid
                        .strider()
                        .point(index)
                        .expect("index within strider");
                    return Err(SchemeError::NonFinite {
                        component,
                        position: grid.total_position(&local),
                    });
                }
            }
        }
        Ok(())
    }

    /// Keeps stepping past the main run until the field envelopes stop
    /// growing, or fails once the step limit is exhausted.
    ///
    /// Call only after the fields carry energy; a quiet grid is trivially
    /// stable.
    pub fn reach_steady_state(&mut self) -> Result<usize, SchemeError> {
        let mut tracker = AmplitudeTracker::new(self.partition.grid_geometry());

        while self.timestep < self.config.amplitude_step_limit {
            self.step()?;

            let accuracy = tracker.observe(
                &self.layout,
                [
                    &self.e.x, &self.e.y, &self.e.z, &self.h.x, &self.h.y, &self.h.z,
                ],
            );
            if accuracy < STABILITY_ACCURACY {
                return Ok(self.timestep);
            }
        }

        Err(SchemeError::Convergence {
            steps: self.config.amplitude_step_limit,
        })
    }

    fn emit_scheduled(&mut self) -> Result<(), SchemeError> {
        let t = self.timestep;

        if self.config.use_ntff && t % self.config.ntff_interval == 0 {
            if let Some(pattern) = self.ntff_pattern()? {
                let (theta, _) = self.layout.incident_angles();
                for (phi, value) in pattern {
                    println!("t={t} theta={theta:.6} phi={phi:.6} pscat/pinc={value:.17e}");
                }
            }
        }

        if self.config.dump && t % self.config.dump_interval == 0 {
            if let Some(full) = self.partition.gather_full(&self.e.z)? {
                self.dump_grid(&full, Layer::Previous, "Ez")?;
            }
        }

        Ok(())
    }

    fn dump_grid(
        &self,
        grid: &Grid<S>,
        layer: Layer,
        name: &str,
    ) -> Result<(), SchemeError> {
        let range = (Point3::origin(), Point3::from(grid.local_size()));
        for dumper in &self.dumpers {
            dumper.write(grid, layer, range, name, self.timestep)?;
        }
        Ok(())
    }

    /// The normalized far-field pattern at the current instant, swept
    /// over azimuth at the incident elevation. `None` away from rank 0.
    pub fn ntff_pattern(&self) -> Result<Option<Vec<(f64, f64)>>, SchemeError> {
        let gathered = [
            self.partition.gather_full(&self.e.x)?,
            self.partition.gather_full(&self.e.y)?,
            self.partition.gather_full(&self.e.z)?,
            self.partition.gather_full(&self.h.x)?,
            self.partition.gather_full(&self.h.y)?,
            self.partition.gather_full(&self.h.z)?,
        ];

        let Some([ex, ey, ez, hx, hy, hz]) = gathered.into_iter().collect::<Option<Vec<_>>>()
            .map(|grids| <[Grid<S>; 6]>::try_from(grids).ok().expect("six grids"))
        else {
            return Ok(None);
        };

        let fields = GatheredFields {
            ex: &ex,
            ey: &ey,
            ez: &ez,
            hx: &hx,
            hy: &hy,
            hz: &hz,
            layer: Layer::Previous,
        };
        let transform = NtffTransform::new(
            &self.layout,
            self.constants,
            self.config.grid_step,
            self.wavelength,
        );
        let (theta, _) = self.layout.incident_angles();
        Ok(Some(transform.pattern(&fields, theta)))
    }
}

/// View of a material grid in the scheme's scalar type, for dumping
/// through the same capability as the fields.
fn material_as_field<S: FieldScalar>(grid: &Grid<f64>) -> Grid<S> {
    let mut out = Grid::<S>::new(*grid.geometry(), TimeLayers::One);
    let values = grid.layer(Layer::Current).to_vec();
    for (target, value) in out.layer_mut(Layer::Current).iter_mut().zip(values) {
        *target = S::from_re(value);
    }
    out
}

/// Post-TFSF curl difference of the component's four partner samples.
fn curl_sum<S: FieldScalar>(
    layout: &YeeLayout,
    component: FieldComponent,
    target: &Grid<S>,
    partner1: &Grid<S>,
    partner2: &Grid<S>,
    wave: Option<&PlaneWave<S>>,
    position: &Point3<usize>,
) -> S {
    let (axis1, axis2) = component.curl_axes();
    let (d1n, d1p) = Direction::along(axis1);
    let (d2n, d2p) = Direction::along(axis2);

    let mut v1p = partner1.get(Layer::Previous, &layout.circuit_element(component, position, d1p));
    let mut v1n = partner1.get(Layer::Previous, &layout.circuit_element(component, position, d1n));
    let mut v2p = partner2.get(Layer::Previous, &layout.circuit_element(component, position, d2p));
    let mut v2n = partner2.get(Layer::Previous, &layout.circuit_element(component, position, d2n));

    if let Some(wave) = wave {
        let pos_abs = target.total_position(position);
        let p1 = component.curl_partner(axis1).expect("transverse axis");
        let p2 = component.curl_partner(axis2).expect("transverse axis");
        tfsf_axis(layout, wave, component, p1, &pos_abs, axis1, &mut v1n, &mut v1p);
        tfsf_axis(layout, wave, component, p2, &pos_abs, axis2, &mut v2n, &mut v2p);
    }

    v1p - v1n - v2p + v2n
}

/// Patches the across-border curl sample with the projected incident
/// field where the stencil straddles the Huygens surface: E updates see
/// their total-field H neighbor stripped of the incident wave, H updates
/// see their scattered-field E neighbor completed with it.
fn tfsf_axis<S: FieldScalar>(
    layout: &YeeLayout,
    wave: &PlaneWave<S>,
    component: FieldComponent,
    partner: FieldComponent,
    pos_abs: &Point3<usize>,
    axis: Axis,
    v_neg: &mut S,
    v_pos: &mut S,
) {
    let (negative, positive) = Direction::along(axis);
    let at_negative_border = layout.needs_tfsf_update(component, pos_abs, negative);
    let at_positive_border = layout.needs_tfsf_update(component, pos_abs, positive);

    if component.is_electric() {
        if at_negative_border {
            let neighbor = layout.circuit_element(component, pos_abs, positive);
            let real = layout.component_position(partner, &neighbor);
            *v_pos -= layout.magnetic_from_incident(partner, wave.approximate_h(layout, &real));
        }
        else if at_positive_border {
            let neighbor = layout.circuit_element(component, pos_abs, negative);
            let real = layout.component_position(partner, &neighbor);
            *v_neg -= layout.magnetic_from_incident(partner, wave.approximate_h(layout, &real));
        }
    }
    else if at_negative_border {
        let neighbor = layout.circuit_element(component, pos_abs, negative);
        let real = layout.component_position(partner, &neighbor);
        *v_neg += layout.electric_from_incident(partner, wave.approximate_e(layout, &real));
    }
    else if at_positive_border {
        let neighbor = layout.circuit_element(component, pos_abs, positive);
        let real = layout.component_position(partner, &neighbor);
        *v_pos += layout.electric_from_incident(partner, wave.approximate_e(layout, &real));
    }
}

/// Plain Yee update of one component.
fn step_plain<S: FieldScalar>(
    layout: &YeeLayout,
    component: FieldComponent,
    field: &mut Grid<S>,
    partner1: &Grid<S>,
    partner2: &Grid<S>,
    wave: Option<&PlaneWave<S>>,
    plain_b: &[f64],
) {
    let start = field.computation_start(&layout.start_diff(component));
    let end = field.computation_end(&layout.end_diff(component));
    let strider = *field.strider();

    for position in iter_points(start, end) {
        let curl = curl_sum(layout, component, field, partner1, partner2, wave, &position);
        let index = strider.index_unchecked(&position);
        let value = field.get(Layer::Previous, &position) + curl * plain_b[index];
        field.set(Layer::Current, &position, value);
    }
}

/// Flux (D or B) update of the split PML scheme.
fn step_flux<S: FieldScalar>(
    layout: &YeeLayout,
    component: FieldComponent,
    flux: &mut Grid<S>,
    partner1: &Grid<S>,
    partner2: &Grid<S>,
    wave: Option<&PlaneWave<S>>,
    pml: &PmlCoefficients,
) {
    let start = flux.computation_start(&layout.start_diff(component));
    let end = flux.computation_end(&layout.end_diff(component));
    let strider = *flux.strider();

    for position in iter_points(start, end) {
        let curl = curl_sum(layout, component, flux, partner1, partner2, wave, &position);
        let index = strider.index_unchecked(&position);
        let value =
            flux.get(Layer::Previous, &position) * pml.ca[index] + curl * pml.cb[index];
        flux.set(Layer::Current, &position, value);
    }
}

/// Drude auxiliary recurrence, flux to auxiliary flux.
///
/// The history terms enter with negative sign; in the non-dispersive
/// limit the recurrence then reduces to `aux = flux / (perm * perm0)`
/// exactly.
fn step_drude<S: FieldScalar>(
    layout: &YeeLayout,
    component: FieldComponent,
    flux: &Grid<S>,
    aux: &mut Grid<S>,
    drude: &DrudeCoefficients,
) {
    let start = aux.computation_start(&layout.start_diff(component));
    let end = aux.computation_end(&layout.end_diff(component));
    let strider = *aux.strider();

    for position in iter_points(start, end) {
        let index = strider.index_unchecked(&position);
        let value = flux.get(Layer::Current, &position) * drude.b0[index]
            + flux.get(Layer::Previous, &position) * drude.b1[index]
            + flux.get(Layer::Previous2, &position) * drude.b2[index]
            - aux.get(Layer::Previous, &position) * drude.a1[index]
            - aux.get(Layer::Previous2, &position) * drude.a2[index];
        aux.set(Layer::Current, &position, value);
    }
}

/// Field recovery from the (auxiliary) flux.
fn step_recovery<S: FieldScalar>(
    layout: &YeeLayout,
    component: FieldComponent,
    field: &mut Grid<S>,
    flux: &Grid<S>,
    pml: &PmlCoefficients,
) {
    let start = field.computation_start(&layout.start_diff(component));
    let end = field.computation_end(&layout.end_diff(component));
    let strider = *field.strider();

    for position in iter_points(start, end) {
        let index = strider.index_unchecked(&position);
        let value = field.get(Layer::Previous, &position) * pml.rec_ca[index]
            + flux.get(Layer::Current, &position) * pml.rec_cb[index]
            - flux.get(Layer::Previous, &position) * pml.rec_cc[index];
        field.set(Layer::Current, &position, value);
    }
}
