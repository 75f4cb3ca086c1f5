use nalgebra::Vector3;
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    error::SchemeError,
    layout::YeeLayout,
    material::{
        DispersiveRegion,
        PmlProfile,
        Scatterer,
    },
    physics::PhysicalConstants,
};

/// Fraction of the CFL limit the timestep uses.
pub const COURANT_NUMBER: f64 = 0.5;

/// The runtime contract of the solver.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemeConfig {
    pub size: Vector3<usize>,
    /// spatial step in meters
    pub grid_step: f64,
    pub source_frequency: f64,
    /// incident elevation angle theta
    pub incident_theta: f64,
    /// incident azimuth angle phi
    pub incident_phi: f64,
    pub total_steps: usize,

    pub use_pml: bool,
    pub use_tfsf: bool,
    pub use_metamaterials: bool,
    pub use_ntff: bool,
    pub calculate_amplitude: bool,
    pub dump: bool,

    /// PML thickness in cells on every face
    pub pml_size: usize,
    /// distance of the Huygens surface from the grid boundary
    pub tfsf_margin: usize,
    /// distance of the NTFF integration box from the grid boundary
    pub ntff_margin: usize,

    pub amplitude_step_limit: usize,
    pub ntff_interval: usize,
    pub dump_interval: usize,

    pub pml_profile: PmlProfile,
    pub scatterer: Option<Scatterer>,
    pub dispersive: Option<DispersiveRegion>,
}

impl Default for SchemeConfig {
    fn default() -> Self {
        Self {
            size: Vector3::repeat(64),
            grid_step: 1e-9,
            source_frequency: PhysicalConstants::SI.speed_of_light() / 20e-9,
            incident_theta: std::f64::consts::FRAC_PI_2,
            incident_phi: 0.0,
            total_steps: 100,
            use_pml: true,
            use_tfsf: true,
            use_metamaterials: false,
            use_ntff: false,
            calculate_amplitude: false,
            dump: false,
            pml_size: 10,
            tfsf_margin: 15,
            ntff_margin: 13,
            amplitude_step_limit: 0,
            ntff_interval: 100,
            dump_interval: 1000,
            pml_profile: PmlProfile::default(),
            scatterer: None,
            dispersive: None,
        }
    }
}

impl SchemeConfig {
    pub fn time_step(&self, constants: &PhysicalConstants) -> f64 {
        self.grid_step * COURANT_NUMBER / constants.speed_of_light()
    }

    pub fn wavelength(&self, constants: &PhysicalConstants) -> f64 {
        constants.frequency_to_wavelength(self.source_frequency)
    }

    pub fn layout(&self) -> YeeLayout {
        // disabled regions collapse onto the grid boundary
        YeeLayout::new(
            self.size,
            if self.use_pml { self.pml_size } else { 0 },
            if self.use_tfsf { self.tfsf_margin } else { 0 },
            if self.use_ntff { self.ntff_margin } else { 0 },
            self.incident_theta,
            self.incident_phi,
        )
    }

    /// Rejects switch combinations the solver cannot honor.
    ///
    /// `complex` states whether the scheme is instantiated over complex
    /// field values; `distributed` whether more than one rank takes part.
    pub fn validate(&self, complex: bool, distributed: bool) -> Result<(), SchemeError> {
        if self.grid_step <= 0.0 {
            return Err(SchemeError::configuration("grid step must be positive"));
        }
        if self.source_frequency <= 0.0 {
            return Err(SchemeError::configuration(
                "source frequency must be positive",
            ));
        }
        let shortest = self.size.x.min(self.size.y).min(self.size.z);
        if shortest < 4 {
            return Err(SchemeError::configuration(
                "grid must be at least 4 cells along every axis",
            ));
        }

        if self.use_metamaterials && !self.use_pml {
            return Err(SchemeError::configuration(
                "metamaterials without PML are not supported",
            ));
        }
        if self.calculate_amplitude && distributed {
            return Err(SchemeError::configuration(
                "amplitude mode cannot run distributed",
            ));
        }
        if self.calculate_amplitude && complex {
            return Err(SchemeError::configuration(
                "amplitude mode requires real field values",
            ));
        }
        if self.calculate_amplitude && self.amplitude_step_limit <= self.total_steps {
            return Err(SchemeError::configuration(
                "amplitude step limit must exceed the initial step count",
            ));
        }
        if self.use_ntff && !complex {
            return Err(SchemeError::configuration(
                "the NTFF transform requires complex field values",
            ));
        }
        if self.use_ntff && !self.use_tfsf {
            return Err(SchemeError::configuration(
                "the NTFF transform needs the TFSF plane wave",
            ));
        }
        if self.use_ntff && self.ntff_interval == 0 {
            return Err(SchemeError::configuration("NTFF interval must be nonzero"));
        }
        if self.dump && self.dump_interval == 0 {
            return Err(SchemeError::configuration("dump interval must be nonzero"));
        }

        if self.use_pml && 2 * self.pml_size >= shortest {
            return Err(SchemeError::configuration(
                "PML slabs overlap: grid too small for the PML thickness",
            ));
        }
        if self.use_tfsf {
            if 2 * self.tfsf_margin + 2 >= shortest {
                return Err(SchemeError::configuration(
                    "TFSF box is empty: margin too large for the grid",
                ));
            }
            if self.use_pml && self.tfsf_margin <= self.pml_size {
                return Err(SchemeError::configuration(
                    "the Huygens surface must lie inside the PML boundary",
                ));
            }
        }
        if self.use_ntff
            && !(self.pml_size < self.ntff_margin && self.ntff_margin < self.tfsf_margin)
        {
            return Err(SchemeError::configuration(
                "the NTFF box must sit between the TFSF surface and the PML",
            ));
        }

        Ok(())
    }
}
