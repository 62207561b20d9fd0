//! Grid-accelerated density clustering.
//!
//! `denclue` clusters dense numeric vectors with DENCLUE: points are binned into
//! hyper-cubic grid cells, dense cells are merged with their connected neighbors,
//! and each merged group is validated by a Gaussian-density hill-climb that either
//! accepts it as a cluster or marks its rows as noise.
//!
//! The primary public API is under [`cluster`], which provides:
//! - [`Denclue`], the clustering entry point, and its [`DenclueFit`] result
//! - the building blocks: [`GridIndexer`], [`SpatialIndex`] and [`HyperCube`]

#![forbid(unsafe_code)]

pub mod cluster;
pub mod error;

pub use cluster::{
    AxisDomain, CellKey, ClusterSummary, Clustering, Denclue, DenclueFit, DenclueParams,
    GridIndexer, HyperCube, Label, SpatialIndex, NOISE,
};
pub use error::{Error, Result};
