//! Grid-accelerated density clustering.
//!
//! ## DENCLUE
//!
//! DENCLUE estimates the density of a dataset as a sum of Gaussian influence
//! functions, one per point, and defines clusters by the local maxima of that
//! density (density attractors). Points attracted to a maximum that is at least
//! `ξ` high form a cluster; all other points are noise. Like DBSCAN it finds the
//! number of clusters on its own and labels outliers.
//!
//! Evaluating the density naively costs O(n²). This implementation first bins
//! points into a grid of hyper-cubes of side `2σ`, kept in a B-tree keyed by cell
//! coordinate, merges dense cubes with their connected neighbors, and evaluates the
//! density only inside each merged group.
//!
//! **Parameters**:
//! - `σ` (sigma): kernel width, and half the cube side
//! - `ξ` (xi): minimum attractor density for a cluster
//!
//! **When to use**: Large, low-dimensional numeric datasets with noise, where
//! clusters are compact at the scale of `σ`.
//!
//! ## Usage
//!
//! ```rust
//! use denclue::cluster::{AxisDomain, Clustering, Denclue, Label};
//!
//! let mut data: Vec<Vec<f32>> = (0..20)
//!     .map(|i| vec![0.1 + 0.002 * i as f32, 0.1 + 0.001 * i as f32])
//!     .collect();
//! data.push(vec![5.0, 5.0]);
//!
//! // Hard labels, noise as `NOISE`
//! let labels = Denclue::new(0.3, 0.3).fit_predict(&data).unwrap();
//! assert_eq!(labels[0], labels[1]);
//! assert_eq!(labels[20], denclue::NOISE);
//!
//! // Caller-supplied row ids and column domains
//! let domains = vec![AxisDomain::new(0.0, 10.0); 2];
//! let rows = data.iter().cloned().enumerate().map(|(i, v)| (format!("Row{i}"), v));
//! let fit = Denclue::new(0.3, 0.3).fit(&domains, rows).unwrap();
//! assert_eq!(fit.label(&"Row0".to_string()), Some(Label::Cluster(0)));
//! assert_eq!(fit.noise_count(), 1);
//! ```

mod cell;
mod denclue;
mod grid;
mod hypercube;
mod index;
mod traits;
mod util;

pub use cell::CellKey;
pub use denclue::{ClusterSummary, Denclue, DenclueFit, DenclueParams, Label, NOISE};
pub use grid::{resolve_domains, AxisDomain, GridIndexer};
pub use hypercube::{
    dense_threshold, HyperCube, ATTRACT_RADIUS_FACTOR, CONNECT_RADIUS_FACTOR, NEAR_RADIUS_FACTOR,
};
pub use index::{Iter, SpatialIndex, MAX_DEGREE, MIN_DEGREE};
pub use traits::Clustering;
