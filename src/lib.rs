//! Three-dimensional finite-difference time-domain solver for Maxwell's
//! equations on a staggered Yee lattice.
//!
//! The solver couples the plain leapfrog update with split-field PML
//! absorbing boundaries, a total-field/scattered-field plane-wave
//! injector, a Drude dispersive-material update, steady-state amplitude
//! extraction and a near-to-far-field radiation transform. Distributed
//! runs decompose the grid across message-passing ranks (feature `mpi`)
//! with one-cell halo exchange.

pub mod amplitude;
pub mod config;
pub mod dump;
pub mod error;
pub mod grid;
pub mod incident;
pub mod layout;
pub mod material;
pub mod ntff;
pub mod partition;
pub mod physics;
pub mod scalar;
pub mod scheme;

pub use num::complex::Complex64;

pub use crate::{
    config::SchemeConfig,
    error::SchemeError,
    partition::{
        Partition,
        Topology,
    },
    scheme::Scheme,
};
