//! Uniform grid over the data domain.
//!
//! Each axis is cut into cells of width `2σ` starting at the axis minimum. A
//! value maps to its bucket by direct floor division:
//!
//! ```text
//! bucket_i = floor((value_i - min_i) / 2σ)
//! ```
//!
//! so bucket `j` covers `[min_i + j·2σ, min_i + (j+1)·2σ)`. The last bucket is
//! closed on the right so that `max_i` itself stays inside the grid.

use serde::{Deserialize, Serialize};

use super::cell::CellKey;
use super::util::check_dimensions;
use crate::error::{Error, Result};

/// Closed value range `[min, max]` of one selected column.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisDomain {
    /// Smallest value in the column.
    pub min: f32,
    /// Largest value in the column.
    pub max: f32,
}

impl AxisDomain {
    /// Create a domain. Bounds are checked by [`GridIndexer::new`].
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Width of the domain.
    #[inline]
    pub fn range(&self) -> f32 {
        self.max - self.min
    }

    #[inline]
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Compute per-column domains of an in-memory dataset.
    pub fn from_data(data: &[Vec<f32>]) -> Result<Vec<AxisDomain>> {
        let d = check_dimensions(data)?;
        let mut domains = vec![AxisDomain::new(f32::INFINITY, f32::NEG_INFINITY); d];
        for point in data {
            for (domain, &v) in domains.iter_mut().zip(point.iter()) {
                domain.min = domain.min.min(v);
                domain.max = domain.max.max(v);
            }
        }
        Ok(domains)
    }
}

/// Turn per-column optional domains into the domain list used for gridding.
///
/// Every selected column must carry a domain, and there must be at least one.
pub fn resolve_domains(columns: &[Option<AxisDomain>]) -> Result<Vec<AxisDomain>> {
    if columns.is_empty() {
        return Err(Error::InvalidParameter {
            name: "columns",
            message: "no eligible numeric columns",
        });
    }
    columns
        .iter()
        .enumerate()
        .map(|(axis, domain)| domain.ok_or(Error::MissingDomain { axis }))
        .collect()
}

/// Maps feature vectors to grid cells.
#[derive(Clone, Debug)]
pub struct GridIndexer {
    domains: Vec<AxisDomain>,
    cell_width: f32,
    buckets: Vec<u32>,
}

impl GridIndexer {
    /// Build the grid for `domains` with smoothing parameter `sigma`.
    ///
    /// Cell width is `2 * sigma` on every axis; axis `i` has
    /// `ceil((max_i - min_i) / 2σ)` buckets (at least one).
    pub fn new(domains: Vec<AxisDomain>, sigma: f32) -> Result<Self> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(Error::InvalidParameter {
                name: "sigma",
                message: "must be positive and finite",
            });
        }
        if domains.is_empty() {
            return Err(Error::InvalidParameter {
                name: "columns",
                message: "no eligible numeric columns",
            });
        }

        let cell_width = 2.0 * sigma;
        let mut buckets = Vec::with_capacity(domains.len());
        for (axis, domain) in domains.iter().enumerate() {
            if !(domain.min.is_finite() && domain.max.is_finite()) || domain.min > domain.max {
                return Err(Error::InvalidDomain {
                    axis,
                    min: domain.min,
                    max: domain.max,
                });
            }
            let count = (domain.range() / cell_width).ceil().max(1.0);
            if count > u32::MAX as f32 {
                return Err(Error::InvalidParameter {
                    name: "sigma",
                    message: "too small for the column domain",
                });
            }
            buckets.push(count as u32);
        }

        Ok(Self {
            domains,
            cell_width,
            buckets,
        })
    }

    /// Number of axes.
    #[inline]
    pub fn dims(&self) -> usize {
        self.domains.len()
    }

    /// Full cell width (`2σ`).
    #[inline]
    pub fn cell_width(&self) -> f32 {
        self.cell_width
    }

    /// Bucket count per axis.
    pub fn buckets(&self) -> &[u32] {
        &self.buckets
    }

    pub fn domains(&self) -> &[AxisDomain] {
        &self.domains
    }

    /// Number of cells in the full grid (may be astronomically large).
    pub fn total_cells(&self) -> f64 {
        self.buckets.iter().map(|&b| f64::from(b)).product()
    }

    /// Cell containing `vector`.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if the vector length differs from the grid, and
    /// `OutOfDomain` if any component lies outside its axis domain.
    pub fn cell_key(&self, vector: &[f32]) -> Result<CellKey> {
        if vector.len() != self.dims() {
            return Err(Error::DimensionMismatch {
                expected: self.dims(),
                found: vector.len(),
            });
        }

        let mut key = Vec::with_capacity(self.dims());
        for (axis, (&value, domain)) in vector.iter().zip(self.domains.iter()).enumerate() {
            if !domain.contains(value) {
                return Err(Error::OutOfDomain {
                    axis,
                    value,
                    min: domain.min,
                    max: domain.max,
                });
            }
            let bucket = ((value - domain.min) / self.cell_width).floor() as u32;
            key.push(bucket.min(self.buckets[axis] - 1));
        }
        Ok(CellKey::new(key))
    }
}
