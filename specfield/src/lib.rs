#![warn(clippy::all, clippy::cargo, clippy::nursery, clippy::pedantic)]
#![warn(missing_docs)]

//! Distributed spectral fields over process meshes.
//!
//! The crate threads multi-dimensional scalar fields through a precomputed
//! chain of data-distribution layouts, moving them between coefficient and
//! grid space one axis at a time: local spectral transforms where the axis
//! is held in full, distributed block transposes where it is split over the
//! process mesh.

pub mod array;
pub mod basis;
pub mod comm;
pub mod config;
mod convert;
pub mod distributor;
pub mod domain;
pub mod error;
pub mod field;
pub mod layout;
mod plan;
pub mod sparse;
pub mod transform;
pub mod transpose;

pub use array::{ArrayMut, ArrayRef, Dtype, DynArray, Scales};
pub use basis::{AxisMeta, Basis, BasisEnum, Chebyshev, Compound, Fourier, Parity, SinCos};
pub use comm::{universe, CartComm, Comm, SubComm};
pub use config::{Config, Library, PlanRigor};
pub use distributor::{Distributor, LayoutSpace, Path};
pub use domain::Domain;
pub use error::{Error, Result};
pub use field::{towards_coeff_space_many, towards_grid_space_many, Field};
pub use layout::{Geometry, Layout};
