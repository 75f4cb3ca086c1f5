use crate::{
    grid::{
        Grid,
        GridGeometry,
        Layer,
        TimeLayers,
    },
    grid::strider::iter_points,
    layout::{
        FieldComponent,
        YeeLayout,
    },
    scalar::FieldScalar,
};

/// Relative envelope growth below which a cell counts as settled.
pub const STABILITY_ACCURACY: f64 = 1e-6;

/// Per-cell field envelopes used to detect the harmonic steady state.
///
/// Every sample updates the envelope of each non-PML cell with the field
/// magnitude; the run is stable once a whole timestep passes without any
/// envelope growing by more than [`STABILITY_ACCURACY`].
#[derive(Clone, Debug)]
pub struct AmplitudeTracker {
    envelopes: [Grid<f64>; 6],
}

const TRACKED: [FieldComponent; 6] = [
    FieldComponent::Ex,
    FieldComponent::Ey,
    FieldComponent::Ez,
    FieldComponent::Hx,
    FieldComponent::Hy,
    FieldComponent::Hz,
];

impl AmplitudeTracker {
    pub fn new(geometry: GridGeometry) -> Self {
        Self {
            envelopes: std::array::from_fn(|_| Grid::new(geometry, TimeLayers::One)),
        }
    }

    /// Feeds one timestep of freshly computed fields (their PREVIOUS
    /// layer, right after the roll) and returns the largest relative
    /// envelope growth seen outside the PML.
    pub fn observe<S: FieldScalar>(
        &mut self,
        layout: &YeeLayout,
        fields: [&Grid<S>; 6],
    ) -> f64 {
        let mut max_accuracy = 0.0f64;

        for (slot, component) in TRACKED.iter().enumerate() {
            let field = fields[slot];
            let envelope = &mut self.envelopes[slot];

            let start = field.computation_start(&layout.start_diff(*component));
            let end = field.computation_end(&layout.end_diff(*component));

            for position in iter_points(start, end) {
                let pos_abs = field.total_position(&position);
                if layout.is_in_pml(*component, &pos_abs) {
                    continue;
                }

                let value = field.get(Layer::Previous, &position).magnitude();
                let current = envelope.get(Layer::Current, &position);

                if value >= current {
                    let mut accuracy = value - current;
                    if current != 0.0 {
                        accuracy /= current;
                    }
                    else if value != 0.0 {
                        accuracy /= value;
                    }

                    if accuracy > STABILITY_ACCURACY {
                        envelope.set(Layer::Current, &position, value);
                    }
                    max_accuracy = max_accuracy.max(accuracy);
                }
            }
        }

        max_accuracy
    }

    pub fn envelope(&self, component: FieldComponent) -> &Grid<f64> {
        let slot = TRACKED
            .iter()
            .position(|c| *c == component)
            .expect("every field component is tracked");
        &self.envelopes[slot]
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use nalgebra::{
        Point3,
        Vector3,
    };

    use crate::{
        amplitude::{
            AmplitudeTracker,
            STABILITY_ACCURACY,
        },
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
    };

    fn fields(size: usize) -> Vec<Grid<f64>> {
        (0..6)
            .map(|_| {
                Grid::new(
                    GridGeometry::serial(Vector3::repeat(size)),
                    TimeLayers::Two,
                )
            })
            .collect()
    }

    fn refs(grids: &[Grid<f64>]) -> [&Grid<f64>; 6] {
        std::array::from_fn(|i| &grids[i])
    }

    #[test]
    fn a_constant_envelope_is_stable() {
        let layout = YeeLayout::new(Vector3::repeat(12), 0, 4, 0, FRAC_PI_2, 0.0);
        let mut grids = fields(12);
        let probe = Point3::new(6, 6, 6);

        grids[2].set(Layer::Current, &probe, 0.5);
        grids[2].advance_layers().unwrap();

        let mut tracker = AmplitudeTracker::new(GridGeometry::serial(Vector3::repeat(12)));

        // the first sample grows the envelope from zero
        let first = tracker.observe(&layout, refs(&grids));
        assert!(first > STABILITY_ACCURACY);
        assert_eq!(
            tracker.envelope(FieldComponent::Ez).get(Layer::Current, &probe),
            0.5
        );

        // a weaker field does not disturb the envelope
        grids[2].set(Layer::Current, &probe, -0.3);
        grids[2].advance_layers().unwrap();
        let second = tracker.observe(&layout, refs(&grids));
        assert!(second < STABILITY_ACCURACY);

        // the same peak again: settled
        grids[2].set(Layer::Current, &probe, 0.5);
        grids[2].advance_layers().unwrap();
        let third = tracker.observe(&layout, refs(&grids));
        assert!(third < STABILITY_ACCURACY);
    }

    #[test]
    fn pml_cells_are_ignored() {
        let layout = YeeLayout::new(Vector3::repeat(12), 3, 5, 0, FRAC_PI_2, 0.0);
        let mut grids = fields(12);

        // a runaway value inside the absorber must not block stability
        grids[2].set(Layer::Current, &Point3::new(1, 6, 6), 100.0);
        grids[2].advance_layers().unwrap();

        let mut tracker = AmplitudeTracker::new(GridGeometry::serial(Vector3::repeat(12)));
        assert!(tracker.observe(&layout, refs(&grids)) < STABILITY_ACCURACY);
    }
}
