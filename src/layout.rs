use nalgebra::{
    Point3,
    Vector3,
};

use crate::scalar::FieldScalar;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn unit(&self) -> Vector3<usize> {
        let mut e = Vector3::zeros();
        e[self.index()] = 1;
        e
    }

    /// Next axis in cyclic x -> y -> z order.
    pub fn next(&self) -> Axis {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::Z,
            Axis::Z => Axis::X,
        }
    }
}

/// Neighbor naming on the lattice: LEFT/RIGHT along x, DOWN/UP along y,
/// BACK/FRONT along z.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Down,
    Up,
    Back,
    Front,
}

impl Direction {
    pub fn axis(&self) -> Axis {
        match self {
            Direction::Left | Direction::Right => Axis::X,
            Direction::Down | Direction::Up => Axis::Y,
            Direction::Back | Direction::Front => Axis::Z,
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Direction::Right | Direction::Up | Direction::Front)
    }

    /// The (negative, positive) direction pair of an axis.
    pub fn along(axis: Axis) -> (Direction, Direction) {
        match axis {
            Axis::X => (Direction::Left, Direction::Right),
            Axis::Y => (Direction::Down, Direction::Up),
            Axis::Z => (Direction::Back, Direction::Front),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldComponent {
    Ex,
    Ey,
    Ez,
    Hx,
    Hy,
    Hz,
}

impl FieldComponent {
    pub const ELECTRIC: [FieldComponent; 3] =
        [FieldComponent::Ex, FieldComponent::Ey, FieldComponent::Ez];
    pub const MAGNETIC: [FieldComponent; 3] =
        [FieldComponent::Hx, FieldComponent::Hy, FieldComponent::Hz];

    pub fn is_electric(&self) -> bool {
        matches!(
            self,
            FieldComponent::Ex | FieldComponent::Ey | FieldComponent::Ez
        )
    }

    pub fn axis(&self) -> Axis {
        match self {
            FieldComponent::Ex | FieldComponent::Hx => Axis::X,
            FieldComponent::Ey | FieldComponent::Hy => Axis::Y,
            FieldComponent::Ez | FieldComponent::Hz => Axis::Z,
        }
    }

    /// Half-cell offset of the component's (0,0,0) sample from the cell
    /// corner.
    pub fn min_coord_fp(&self) -> Vector3<f64> {
        match self {
            FieldComponent::Ex => Vector3::new(0.5, 0.0, 0.0),
            FieldComponent::Ey => Vector3::new(0.0, 0.5, 0.0),
            FieldComponent::Ez => Vector3::new(0.0, 0.0, 0.5),
            FieldComponent::Hx => Vector3::new(0.0, 0.5, 0.5),
            FieldComponent::Hy => Vector3::new(0.5, 0.0, 0.5),
            FieldComponent::Hz => Vector3::new(0.5, 0.5, 0.0),
        }
    }

    /// The two differentiation axes of the component's curl, ordered so
    /// that the update reads
    /// `dF/dt ~ +d(partner(b))/db - d(partner(c))/dc` for `(b, c)`.
    pub fn curl_axes(&self) -> (Axis, Axis) {
        let a = self.axis();
        if self.is_electric() {
            (a.next(), a.next().next())
        }
        else {
            (a.next().next(), a.next())
        }
    }

    /// Field supplying the curl difference along `axis`, if the axis is
    /// transverse to this component.
    pub fn curl_partner(&self, axis: Axis) -> Option<FieldComponent> {
        use FieldComponent::*;

        let partner = match (self, axis) {
            (Ex, Axis::Y) => Hz,
            (Ex, Axis::Z) => Hy,
            (Ey, Axis::Z) => Hx,
            (Ey, Axis::X) => Hz,
            (Ez, Axis::X) => Hy,
            (Ez, Axis::Y) => Hx,
            (Hx, Axis::Z) => Ey,
            (Hx, Axis::Y) => Ez,
            (Hy, Axis::X) => Ez,
            (Hy, Axis::Z) => Ex,
            (Hz, Axis::Y) => Ex,
            (Hz, Axis::X) => Ey,
            _ => return None,
        };
        Some(partner)
    }
}

/// Geometric description of the staggered lattice and its special regions.
///
/// Everything here is a pure function of the problem geometry; the layout
/// is shared read-only by every component of the solver.
#[derive(Clone, Debug)]
pub struct YeeLayout {
    size: Vector3<usize>,
    pml_size: Vector3<usize>,
    tfsf_left: Vector3<usize>,
    tfsf_right: Vector3<usize>,
    ntff_left: Vector3<usize>,
    ntff_right: Vector3<usize>,
    incident_theta: f64,
    incident_phi: f64,
    zero_inc_coord: Vector3<f64>,
}

impl YeeLayout {
    pub fn new(
        size: Vector3<usize>,
        pml_size: usize,
        tfsf_margin: usize,
        ntff_margin: usize,
        incident_theta: f64,
        incident_phi: f64,
    ) -> Self {
        let tfsf_left = Vector3::repeat(tfsf_margin);
        let tfsf_right = size.map(|n| n - tfsf_margin);

        // origin of the 1D incident lattice: the total-field box corner
        // from which the projection onto the propagation direction is
        // non-negative for every stencil point, one cell of margin
        let direction = incident_direction(incident_theta, incident_phi);
        let zero_inc_coord = Vector3::from_fn(|a, _| {
            if direction[a] >= 0.0 {
                tfsf_left[a] as f64 - 1.0
            }
            else {
                tfsf_right[a] as f64 + 1.0
            }
        });

        Self {
            size,
            pml_size: Vector3::repeat(pml_size),
            tfsf_left,
            tfsf_right,
            ntff_left: Vector3::repeat(ntff_margin),
            ntff_right: size.map(|n| n - ntff_margin),
            incident_theta,
            incident_phi,
            zero_inc_coord,
        }
    }

    pub fn size(&self) -> Vector3<usize> {
        self.size
    }

    pub fn left_border_pml(&self) -> Vector3<usize> {
        self.pml_size
    }

    pub fn right_border_pml(&self) -> Vector3<usize> {
        self.size - self.pml_size
    }

    pub fn left_border_tfsf(&self) -> Vector3<usize> {
        self.tfsf_left
    }

    pub fn right_border_tfsf(&self) -> Vector3<usize> {
        self.tfsf_right
    }

    pub fn left_border_ntff(&self) -> Vector3<usize> {
        self.ntff_left
    }

    pub fn right_border_ntff(&self) -> Vector3<usize> {
        self.ntff_right
    }

    pub fn incident_angles(&self) -> (f64, f64) {
        (self.incident_theta, self.incident_phi)
    }

    /// Unit propagation direction of the incident plane wave.
    pub fn incident_direction(&self) -> Vector3<f64> {
        incident_direction(self.incident_theta, self.incident_phi)
    }

    /// Real-space sample position of a component at an absolute cell index.
    pub fn component_position(
        &self,
        component: FieldComponent,
        pos_abs: &Point3<usize>,
    ) -> Point3<f64> {
        Point3::from(pos_abs.coords.map(|c| c as f64) + component.min_coord_fp())
    }

    /// Update-loop offsets on the problem boundary. One cell on every
    /// side: the outermost shell of samples never updates and acts as the
    /// closed (PEC) outer boundary.
    pub fn start_diff(&self, _component: FieldComponent) -> Vector3<usize> {
        Vector3::repeat(1)
    }

    pub fn end_diff(&self, _component: FieldComponent) -> Vector3<usize> {
        Vector3::repeat(1)
    }

    /// Cell holding the curl sample of `component`'s partner field on the
    /// `direction` side.
    ///
    /// The partner sits half a cell away; whether that maps onto the same
    /// integer index or the adjacent one depends on which of the two grids
    /// is the staggered one along the axis.
    pub fn circuit_element(
        &self,
        component: FieldComponent,
        position: &Point3<usize>,
        direction: Direction,
    ) -> Point3<usize> {
        let axis = direction.axis();
        let partner = component
            .curl_partner(axis)
            .unwrap_or_else(|| panic!("{component:?} has no curl partner along {axis:?}"));

        let partner_staggered =
            partner.min_coord_fp()[axis.index()] > component.min_coord_fp()[axis.index()];

        if partner_staggered {
            if direction.is_positive() {
                *position
            }
            else {
                position - axis.unit()
            }
        }
        else if direction.is_positive() {
            position + axis.unit()
        }
        else {
            *position
        }
    }

    /// Whether the component's curl stencil at `pos_abs` straddles the
    /// Huygens surface on the `direction` side of the total-field box.
    ///
    /// A sample is on the total-field side iff it lies strictly inside the
    /// box on every axis; samples on a border plane belong to the
    /// scattered region.
    pub fn needs_tfsf_update(
        &self,
        component: FieldComponent,
        pos_abs: &Point3<usize>,
        direction: Direction,
    ) -> bool {
        let r = self.component_position(component, pos_abs);
        let axis = direction.axis().index();

        for other in 0..3 {
            if other == axis {
                continue;
            }
            let left = self.tfsf_left[other] as f64;
            let right = self.tfsf_right[other] as f64;
            if !(left < r[other] && r[other] < right) {
                return false;
            }
        }

        let staggered = component.min_coord_fp()[axis] == 0.5;
        let border = if direction.is_positive() {
            let right = self.tfsf_right[axis] as f64;
            if staggered { right - 0.5 } else { right }
        }
        else {
            let left = self.tfsf_left[axis] as f64;
            if staggered { left + 0.5 } else { left }
        };

        r[axis] == border
    }

    /// Whether a component sample lies inside one of the PML slabs.
    pub fn is_in_pml(&self, component: FieldComponent, pos_abs: &Point3<usize>) -> bool {
        let r = self.component_position(component, pos_abs);
        let left = self.left_border_pml();
        let right = self.right_border_pml();

        (0..3).any(|a| r[a] < left[a] as f64 || r[a] >= right[a] as f64)
    }

    /// Signed distance of a real coordinate along the propagation
    /// direction, measured from the incident lattice origin.
    pub fn incident_projection(&self, real_coord: &Point3<f64>) -> f64 {
        (real_coord.coords - self.zero_inc_coord).dot(&self.incident_direction())
    }

    /// Projects the scalar incident E onto a vector component.
    pub fn electric_from_incident<S: FieldScalar>(
        &self,
        component: FieldComponent,
        value: S,
    ) -> S {
        let phi = self.incident_phi;
        match component {
            FieldComponent::Ex => value * (-phi.sin()),
            FieldComponent::Ey => value * phi.cos(),
            FieldComponent::Ez => S::zero(),
            _ => panic!("{component:?} is not an electric component"),
        }
    }

    /// Projects the scalar incident H onto a vector component.
    pub fn magnetic_from_incident<S: FieldScalar>(
        &self,
        component: FieldComponent,
        value: S,
    ) -> S {
        let (theta, phi) = (self.incident_theta, self.incident_phi);
        match component {
            FieldComponent::Hx => value * (-theta.cos() * phi.cos()),
            FieldComponent::Hy => value * (-theta.cos() * phi.sin()),
            FieldComponent::Hz => value * theta.sin(),
            _ => panic!("{component:?} is not a magnetic component"),
        }
    }
}

pub fn incident_direction(theta: f64, phi: f64) -> Vector3<f64> {
    Vector3::new(
        theta.sin() * phi.cos(),
        theta.sin() * phi.sin(),
        theta.cos(),
    )
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use nalgebra::{
        Point3,
        Vector3,
    };

    use crate::layout::{
        Direction,
        FieldComponent,
        YeeLayout,
    };

    fn layout() -> YeeLayout {
        YeeLayout::new(Vector3::repeat(50), 10, 13, 11, FRAC_PI_2, 0.0)
    }

    #[test]
    fn it_places_components_on_the_staggered_lattice() {
        let layout = layout();
        let origin = Point3::origin();
        assert_eq!(
            layout.component_position(FieldComponent::Ex, &origin),
            Point3::new(0.5, 0.0, 0.0)
        );
        assert_eq!(
            layout.component_position(FieldComponent::Hx, &origin),
            Point3::new(0.0, 0.5, 0.5)
        );
        assert_eq!(
            layout.component_position(FieldComponent::Hz, &Point3::new(1, 2, 3)),
            Point3::new(1.5, 2.5, 3.0)
        );
    }

    #[test]
    fn it_finds_curl_neighbors() {
        let layout = layout();
        let pos = Point3::new(4, 5, 6);

        // Ex reads Hz at (i, j +- 1/2, k): the down sample is the cell below
        assert_eq!(
            layout.circuit_element(FieldComponent::Ex, &pos, Direction::Down),
            Point3::new(4, 4, 6)
        );
        assert_eq!(
            layout.circuit_element(FieldComponent::Ex, &pos, Direction::Up),
            pos
        );

        // Hx reads Ez at (i, j, k) and (i, j + 1, k)
        assert_eq!(
            layout.circuit_element(FieldComponent::Hx, &pos, Direction::Down),
            pos
        );
        assert_eq!(
            layout.circuit_element(FieldComponent::Hx, &pos, Direction::Up),
            Point3::new(4, 6, 6)
        );
    }

    #[test]
    fn it_detects_the_huygens_surface() {
        let layout = layout();

        // Ey on the left x border plane, inside on the other axes
        assert!(layout.needs_tfsf_update(FieldComponent::Ey, &Point3::new(13, 20, 20), Direction::Left));
        assert!(layout.needs_tfsf_update(FieldComponent::Ey, &Point3::new(37, 20, 20), Direction::Right));
        // one cell off the border: no straddle
        assert!(!layout.needs_tfsf_update(FieldComponent::Ey, &Point3::new(14, 20, 20), Direction::Left));
        // on the border but on a transverse border plane too: corner, skip
        assert!(!layout.needs_tfsf_update(FieldComponent::Ey, &Point3::new(13, 20, 37), Direction::Left));

        // Hz half a cell inside the left x border
        assert!(layout.needs_tfsf_update(FieldComponent::Hz, &Point3::new(13, 20, 20), Direction::Left));
        assert!(!layout.needs_tfsf_update(FieldComponent::Hz, &Point3::new(12, 20, 20), Direction::Left));
        assert!(layout.needs_tfsf_update(FieldComponent::Hz, &Point3::new(36, 20, 20), Direction::Right));
    }

    #[test]
    fn it_classifies_pml_membership() {
        let layout = layout();
        assert!(layout.is_in_pml(FieldComponent::Ez, &Point3::new(5, 25, 25)));
        assert!(layout.is_in_pml(FieldComponent::Ez, &Point3::new(25, 25, 45)));
        assert!(!layout.is_in_pml(FieldComponent::Ez, &Point3::new(25, 25, 25)));
        // Ex at x = 9.5 is still inside the 10-cell slab
        assert!(layout.is_in_pml(FieldComponent::Ex, &Point3::new(9, 25, 25)));
        assert!(!layout.is_in_pml(FieldComponent::Ex, &Point3::new(10, 25, 25)));
    }

    #[test]
    fn it_projects_incident_fields() {
        let layout = layout();
        // theta = pi/2, phi = 0: E is y-polarized, H is z-polarized
        assert_eq!(layout.electric_from_incident(FieldComponent::Ey, 2.0), 2.0);
        assert_eq!(layout.electric_from_incident(FieldComponent::Ez, 2.0), 0.0);
        assert!(layout.electric_from_incident::<f64>(FieldComponent::Ex, 2.0).abs() < 1e-12);
        assert!((layout.magnetic_from_incident::<f64>(FieldComponent::Hz, 2.0) - 2.0).abs() < 1e-12);
        assert!(layout.magnetic_from_incident::<f64>(FieldComponent::Hx, 2.0).abs() < 1e-12);

        // the projection origin sits one cell before the box corner
        let d = layout.incident_projection(&Point3::new(13.0, 20.0, 20.0));
        assert!((d - 1.0).abs() < 1e-12);
    }
}
