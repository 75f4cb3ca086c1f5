use nalgebra::Point3;

use crate::layout::FieldComponent;

/// Failures the solver can produce.
///
/// Every variant is fatal for the whole run. In distributed execution the
/// rank that observes the error aborts, which tears down the other ranks
/// with it.
#[derive(Debug, thiserror::Error)]
pub enum SchemeError {
    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("non-finite {component:?} value at cell {position}")]
    NonFinite {
        component: FieldComponent,
        position: Point3<usize>,
    },

    #[error("domain topology mismatch: {reason}")]
    DomainTopology { reason: String },

    #[error("stable state not reached after {steps} steps. Increase number of steps")]
    Convergence { steps: usize },

    #[error("time layers advanced without a completed compute pass")]
    GridState,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SchemeError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn topology(reason: impl Into<String>) -> Self {
        Self::DomainTopology {
            reason: reason.into(),
        }
    }
}
