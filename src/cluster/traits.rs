use crate::error::Result;

/// Common interface for hard clustering algorithms (one label per point).
pub trait Clustering {
    /// Fit the model and return one cluster label per input point.
    ///
    /// Algorithms that leave points unassigned label them with [`crate::NOISE`].
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<usize>>;

    /// The configured number of clusters (if applicable).
    ///
    /// For algorithms that discover the number of clusters dynamically (e.g. DENCLUE),
    /// this returns 0.
    fn n_clusters(&self) -> usize;
}
