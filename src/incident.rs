use std::f64::consts::PI;

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
    layout::YeeLayout,
    physics::PhysicalConstants,
    scalar::FieldScalar,
};

/// The 1D auxiliary lattice carrying the incident plane wave.
///
/// E samples sit at integer positions, H samples half a cell to the
/// right. A hard harmonic source drives index 0; the right end is closed
/// with a first-order absorbing update so the lattice cannot fill up with
/// reflections.
#[derive(Clone, Debug)]
pub struct PlaneWave<S> {
    e_inc: Grid<S>,
    h_inc: Grid<S>,
    len: usize,
    rel_phase_velocity: f64,
    e_coefficient: f64,
    h_coefficient: f64,
    absorb_coefficient: f64,
    source_phase_step: f64,
}

impl<S: FieldScalar> PlaneWave<S> {
    pub fn new(
        layout: &YeeLayout,
        constants: &PhysicalConstants,
        grid_step: f64,
        time_step: f64,
        source_frequency: f64,
    ) -> Self {
        let size = layout.size();
        // long enough for the projection of any stencil point onto the
        // propagation direction, plus the interpolation margin
        let len = size.x + size.y + size.z + 4;

        let courant = constants.speed_of_light() * time_step / grid_step;
        let wavelength = constants.frequency_to_wavelength(source_frequency);
        let (theta, phi) = layout.incident_angles();

        let reference =
            numerical_phase_velocity(constants, grid_step, wavelength, courant, PI / 2.0, 0.0);
        let oblique =
            numerical_phase_velocity(constants, grid_step, wavelength, courant, theta, phi);
        let rel_phase_velocity = reference / oblique;

        // effective Courant number of the stretched 1D lattice fixes the
        // absorbing-boundary coefficient
        let lattice_courant = courant / rel_phase_velocity;
        let absorb_coefficient = (lattice_courant - 1.0) / (lattice_courant + 1.0);

        let geometry = GridGeometry::serial(Vector3::new(len, 1, 1));

        Self {
            e_inc: Grid::new(geometry, TimeLayers::Two),
            h_inc: Grid::new(geometry, TimeLayers::Two),
            len,
            rel_phase_velocity,
            e_coefficient: time_step
                / (rel_phase_velocity * constants.vacuum_permittivity * grid_step),
            h_coefficient: time_step
                / (rel_phase_velocity * constants.vacuum_permeability * grid_step),
            absorb_coefficient,
            source_phase_step: 2.0 * PI * source_frequency * time_step,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn rel_phase_velocity(&self) -> f64 {
        self.rel_phase_velocity
    }

    fn point(i: usize) -> Point3<usize> {
        Point3::new(i, 0, 0)
    }

    /// Advances the incident E field by one step and rolls its layers.
    pub fn step_e(&mut self, timestep: usize) {
        let k = self.e_coefficient;
        for i in 1..self.len - 1 {
            let value = self.e_inc.get(Layer::Previous, &Self::point(i))
                + (self.h_inc.get(Layer::Previous, &Self::point(i - 1))
                    - self.h_inc.get(Layer::Previous, &Self::point(i)))
                    * k;
            self.e_inc.set(Layer::Current, &Self::point(i), value);
        }

        // first-order absorbing update at the right end
        let last = self.len - 1;
        let value = self.e_inc.get(Layer::Previous, &Self::point(last - 1))
            + (self.e_inc.get(Layer::Current, &Self::point(last - 1))
                - self.e_inc.get(Layer::Previous, &Self::point(last)))
                * self.absorb_coefficient;
        self.e_inc.set(Layer::Current, &Self::point(last), value);

        let phase = self.source_phase_step * timestep as f64;
        self.e_inc.set(Layer::Current, &Self::point(0), S::harmonic(phase));

        self.e_inc
            .advance_layers()
            .expect("incident E lattice was just written");
    }

    /// Advances the incident H field by one step and rolls its layers.
    pub fn step_h(&mut self, _timestep: usize) {
        let k = self.h_coefficient;
        for i in 0..self.len - 1 {
            let value = self.h_inc.get(Layer::Previous, &Self::point(i))
                + (self.e_inc.get(Layer::Previous, &Self::point(i))
                    - self.e_inc.get(Layer::Previous, &Self::point(i + 1)))
                    * k;
            self.h_inc.set(Layer::Current, &Self::point(i), value);
        }

        self.h_inc
            .advance_layers()
            .expect("incident H lattice was just written");
    }

    /// Incident E at a real-space coordinate: project onto the
    /// propagation direction and interpolate the 1D lattice.
    pub fn approximate_e(&self, layout: &YeeLayout, real_coord: &Point3<f64>) -> S {
        self.approximate(layout, real_coord, 0.0, &self.e_inc)
    }

    /// Incident H at a real-space coordinate. The half-cell lattice
    /// offset of H is taken out before interpolating.
    pub fn approximate_h(&self, layout: &YeeLayout, real_coord: &Point3<f64>) -> S {
        self.approximate(layout, real_coord, 0.5, &self.h_inc)
    }

    fn approximate(
        &self,
        layout: &YeeLayout,
        real_coord: &Point3<f64>,
        offset: f64,
        lattice: &Grid<S>,
    ) -> S {
        let d = layout.incident_projection(real_coord) - offset;
        debug_assert!(d >= 0.0, "projection {d} outside the incident lattice");
        let d = d.max(0.0);

        let cell = d.floor() as usize;
        let toward = d - cell as f64;

        lattice.get(Layer::Previous, &Self::point(cell)) * (1.0 - toward)
            + lattice.get(Layer::Previous, &Self::point(cell + 1)) * toward
    }
}

/// Phase velocity of the discrete plane wave propagating at (theta, phi)
/// on the 3D lattice, from the numerical dispersion relation solved for
/// the wavenumber by Newton iteration.
pub fn numerical_phase_velocity(
    constants: &PhysicalConstants,
    grid_step: f64,
    wavelength: f64,
    courant: f64,
    theta: f64,
    phi: f64,
) -> f64 {
    let c = constants.speed_of_light();
    let omega = 2.0 * PI * c / wavelength;
    let time_step = courant * grid_step / c;

    let direction = crate::layout::incident_direction(theta, phi);
    let rhs = ((omega * time_step / 2.0).sin() / (c * time_step)).powi(2);

    let residual = |k: f64| -> f64 {
        (0..3)
            .map(|a| ((k * direction[a] * grid_step / 2.0).sin() / grid_step).powi(2))
            .sum::<f64>()
            - rhs
    };
    let derivative = |k: f64| -> f64 {
        (0..3)
            .map(|a| {
                direction[a] / (2.0 * grid_step) * (k * direction[a] * grid_step).sin()
            })
            .sum::<f64>()
    };

    let mut k = 2.0 * PI / wavelength;
    for _ in 0..32 {
        let f = residual(k);
        let df = derivative(k);
        if df.abs() < f64::MIN_POSITIVE {
            break;
        }
        let next = k - f / df;
        if (next - k).abs() <= f64::EPSILON * k.abs() {
            k = next;
            break;
        }
        k = next;
    }

    omega / k
}
