use std::{
    f64::consts::PI,
    ops::Add,
};

use nalgebra::Point3;
use num::complex::Complex64;

use crate::{
    grid::{
        Grid,
        Layer,
    },
    layout::{
        FieldComponent,
        YeeLayout,
    },
    physics::PhysicalConstants,
    scalar::FieldScalar,
};

/// The (theta, phi) spherical components of one of the radiation vectors.
#[derive(Clone, Copy, Debug, Default)]
pub struct NtffPair {
    pub theta: Complex64,
    pub phi: Complex64,
}

impl Add for NtffPair {
    type Output = NtffPair;

    fn add(self, other: NtffPair) -> NtffPair {
        NtffPair {
            theta: self.theta + other.theta,
            phi: self.phi + other.phi,
        }
    }
}

/// Gathered, full-problem field grids the transform integrates over, and
/// the time layer holding the values of the sampled instant.
pub struct GatheredFields<'a, S> {
    pub ex: &'a Grid<S>,
    pub ey: &'a Grid<S>,
    pub ez: &'a Grid<S>,
    pub hx: &'a Grid<S>,
    pub hy: &'a Grid<S>,
    pub hz: &'a Grid<S>,
    pub layer: Layer,
}

/// Near-to-far-field surface integration over the closed NTFF box.
pub struct NtffTransform<'a> {
    layout: &'a YeeLayout,
    constants: PhysicalConstants,
    grid_step: f64,
    wavelength: f64,
}

impl<'a> NtffTransform<'a> {
    pub fn new(
        layout: &'a YeeLayout,
        constants: PhysicalConstants,
        grid_step: f64,
        wavelength: f64,
    ) -> Self {
        Self {
            layout,
            constants,
            grid_step,
            wavelength,
        }
    }

    fn wavenumber(&self) -> f64 {
        2.0 * PI / self.wavelength
    }

    /// Retarded-phase factor for a point of the integration surface.
    fn phase(&self, theta: f64, phi: f64, point: &Point3<f64>) -> Complex64 {
        let center = (self.layout.size().x / 2) as f64;
        let arg = ((point.x - center) * theta.sin() * phi.cos()
            + (point.y - center) * theta.sin() * phi.sin()
            + (point.z - center) * theta.cos())
            * self.grid_step;
        let k = self.wavenumber();
        Complex64::new((k * arg).cos(), (k * arg).sin())
    }

    /// Integrates a pair of tangential components over one box face.
    ///
    /// `normal_axis` fixes the face, `at` its coordinate; `f` maps the two
    /// tangential samples and the trigonometry of the observation angles
    /// to the (theta, phi) integrands.
    fn face<S, F>(
        &self,
        fields: &GatheredFields<'_, S>,
        normal_axis: usize,
        at: usize,
        tangential: (FieldComponent, FieldComponent),
        theta: f64,
        phi: f64,
        f: F,
    ) -> NtffPair
    where
        S: FieldScalar,
        F: Fn(Complex64, Complex64, f64) -> (Complex64, Complex64),
    {
        let left = self.layout.left_border_ntff();
        let right = self.layout.right_border_ntff();

        let sign = if at == right[normal_axis] { 1.0 } else { -1.0 };
        let area = self.grid_step * self.grid_step;

        let (u_axis, v_axis) = match normal_axis {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };

        let grid_of = |component: FieldComponent| {
            match component {
                FieldComponent::Ex => fields.ex,
                FieldComponent::Ey => fields.ey,
                FieldComponent::Ez => fields.ez,
                FieldComponent::Hx => fields.hx,
                FieldComponent::Hy => fields.hy,
                FieldComponent::Hz => fields.hz,
            }
        };

        let mut sum = NtffPair::default();
        for u in 0..(right[u_axis] - left[u_axis]) {
            for v in 0..(right[v_axis] - left[v_axis]) {
                let mut point = Point3::new(0.0, 0.0, 0.0);
                point[normal_axis] = at as f64;
                point[u_axis] = left[u_axis] as f64 + 0.5 + u as f64;
                point[v_axis] = left[v_axis] as f64 + 0.5 + v as f64;

                let first = sample(grid_of(tangential.0), tangential.0, fields.layer, &point);
                let second = sample(grid_of(tangential.1), tangential.1, fields.layer, &point);

                let exponent = self.phase(theta, phi, &point);
                let (d_theta, d_phi) = f(first, second, sign);
                sum.theta += d_theta * exponent * area;
                sum.phi += d_phi * exponent * area;
            }
        }
        sum
    }

    /// Radiation vector N from the tangential magnetic field.
    pub fn vector_n<S: FieldScalar>(
        &self,
        fields: &GatheredFields<'_, S>,
        theta: f64,
        phi: f64,
    ) -> NtffPair {
        use FieldComponent::{
            Hx,
            Hy,
            Hz,
        };

        let left = self.layout.left_border_ntff();
        let right = self.layout.right_border_ntff();
        let (ct, st) = (theta.cos(), theta.sin());
        let (cp, sp) = (phi.cos(), phi.sin());

        let face_x = |at| {
            self.face(fields, 0, at, (Hz, Hy), theta, phi, |hz, hy, sign| {
                (
                    (hz * (ct * sp) + hy * st) * (-sign),
                    hz * cp * (-sign),
                )
            })
        };
        let face_y = |at| {
            self.face(fields, 1, at, (Hz, Hx), theta, phi, |hz, hx, sign| {
                (
                    (hz * (ct * cp) + hx * st) * sign,
                    hz * sp * (-sign),
                )
            })
        };
        let face_z = |at| {
            self.face(fields, 2, at, (Hy, Hx), theta, phi, |hy, hx, sign| {
                (
                    (hy * (-ct * cp) + hx * (ct * sp)) * sign,
                    (hy * sp + hx * cp) * sign,
                )
            })
        };

        face_x(left.x)
            + face_x(right.x)
            + face_y(left.y)
            + face_y(right.y)
            + face_z(left.z)
            + face_z(right.z)
    }

    /// Radiation vector L from the tangential electric field.
    pub fn vector_l<S: FieldScalar>(
        &self,
        fields: &GatheredFields<'_, S>,
        theta: f64,
        phi: f64,
    ) -> NtffPair {
        use FieldComponent::{
            Ex,
            Ey,
            Ez,
        };

        let left = self.layout.left_border_ntff();
        let right = self.layout.right_border_ntff();
        let (ct, st) = (theta.cos(), theta.sin());
        let (cp, sp) = (phi.cos(), phi.sin());

        let face_x = |at| {
            self.face(fields, 0, at, (Ez, Ey), theta, phi, |ez, ey, sign| {
                (
                    (ez * (ct * sp) + ey * st) * (-sign),
                    ez * cp * (-sign),
                )
            })
        };
        let face_y = |at| {
            self.face(fields, 1, at, (Ez, Ex), theta, phi, |ez, ex, sign| {
                (
                    (ez * (ct * cp) + ex * st) * sign,
                    ez * sp * (-sign),
                )
            })
        };
        let face_z = |at| {
            self.face(fields, 2, at, (Ey, Ex), theta, phi, |ey, ex, sign| {
                (
                    (ey * (-ct * cp) + ex * (ct * sp)) * sign,
                    (ey * sp + ex * cp) * sign,
                )
            })
        };

        face_x(left.x)
            + face_x(right.x)
            + face_y(left.y)
            + face_y(right.y)
            + face_z(left.z)
            + face_z(right.z)
    }

    /// Scattered Poynting magnitude radiated towards (theta, phi).
    pub fn poynting_scat<S: FieldScalar>(
        &self,
        fields: &GatheredFields<'_, S>,
        theta: f64,
        phi: f64,
    ) -> f64 {
        let n = self.vector_n(fields, theta, phi);
        let l = self.vector_l(fields, theta, phi);

        let eta = self.constants.impedance();
        let first = -l.phi + n.theta * eta;
        let second = -l.theta - n.phi * eta;

        let k = self.wavenumber();
        k * k / (8.0 * PI * eta) * (first.norm_sqr() + second.norm_sqr())
    }

    /// Poynting magnitude of the unit-amplitude incident plane wave.
    pub fn poynting_inc(&self) -> f64 {
        (self.constants.vacuum_permittivity / self.constants.vacuum_permeability).sqrt()
    }

    /// Normalized scattering pattern swept over azimuth at the incident
    /// elevation, one sample every two degrees plus the closing sample,
    /// as `(phi, P_scat / P_inc)` pairs.
    pub fn pattern<S: FieldScalar>(
        &self,
        fields: &GatheredFields<'_, S>,
        theta: f64,
    ) -> Vec<(f64, f64)> {
        let step = PI / 90.0;
        let samples = 181;
        (0..samples)
            .map(|i| {
                let phi = i as f64 * step;
                (phi, self.poynting_scat(fields, theta, phi) / self.poynting_inc())
            })
            .collect()
    }
}

/// Field value at an arbitrary real coordinate: linear interpolation per
/// axis between the component's surrounding lattice samples. At the NTFF
/// face points this reduces to the mean of the two samples on each
/// half-offset axis.
fn sample<S: FieldScalar>(
    grid: &Grid<S>,
    component: FieldComponent,
    layer: Layer,
    point: &Point3<f64>,
) -> Complex64 {
    let offset = component.min_coord_fp();

    let mut base = Point3::new(0usize, 0, 0);
    let mut frac = [0.0f64; 3];
    for a in 0..3 {
        let t = point[a] - offset[a];
        let floor = t.floor();
        base[a] = floor as usize;
        frac[a] = t - floor;
    }

    let mut value = Complex64::new(0.0, 0.0);
    for corner in 0..8 {
        let mut weight = 1.0;
        let mut index = base;
        for a in 0..3 {
            if corner >> a & 1 == 1 {
                weight *= frac[a];
                index[a] += 1;
            }
            else {
                weight *= 1.0 - frac[a];
            }
        }
        if weight != 0.0 {
            value += grid.get(layer, &index).into_complex() * weight;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use nalgebra::{
        Point3,
        Vector3,
    };
    use num::complex::Complex64;

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
        ntff::{
            GatheredFields,
            NtffTransform,
            sample,
        },
        physics::PhysicalConstants,
    };

    fn empty_fields(size: usize) -> Vec<Grid<Complex64>> {
        (0..6)
            .map(|_| {
                Grid::new(
                    GridGeometry::serial(Vector3::repeat(size)),
                    TimeLayers::Two,
                )
            })
            .collect()
    }

    #[test]
    fn zero_fields_radiate_nothing() {
        let layout = YeeLayout::new(Vector3::repeat(20), 3, 7, 5, FRAC_PI_2, 0.0);
        let grids = empty_fields(20);
        let fields = GatheredFields {
            ex: &grids[0],
            ey: &grids[1],
            ez: &grids[2],
            hx: &grids[3],
            hy: &grids[4],
            hz: &grids[5],
            layer: Layer::Current,
        };

        let transform = NtffTransform::new(&layout, PhysicalConstants::SI, 1e-9, 20e-9);
        let pattern = transform.pattern(&fields, FRAC_PI_2);

        assert_eq!(pattern.len(), 181);
        assert!(pattern.iter().all(|(_, p)| *p == 0.0));
        assert!(transform.poynting_inc() > 0.0);
    }

    #[test]
    fn it_averages_staggered_samples() {
        let mut grid: Grid<Complex64> = Grid::new(
            GridGeometry::serial(Vector3::repeat(8)),
            TimeLayers::Two,
        );
        // Ez samples at z + 1/2: set two neighbors along x around x = 3.5
        grid.set(
            Layer::Current,
            &Point3::new(3, 4, 4),
            Complex64::new(1.0, 0.0),
        );
        grid.set(
            Layer::Current,
            &Point3::new(4, 4, 4),
            Complex64::new(3.0, 0.0),
        );

        // Ez lives at integer x, so x = 3.5 averages the two cells
        let value = sample(&grid, FieldComponent::Ez, Layer::Current, &Point3::new(3.5, 4.0, 4.5));
        approx::assert_relative_eq!(value.re, 2.0, epsilon = 1e-12);
        assert_eq!(value.im, 0.0);
    }
}
