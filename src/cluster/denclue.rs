//! DENCLUE: DENsity-based CLUstEring, grid-accelerated.
//!
//! # The Algorithm (Hinneburg & Keim, 1998)
//!
//! DENCLUE models the density of a dataset as the sum of Gaussian influence
//! functions centred on every point, and defines clusters by the local maxima
//! (density attractors) of that function. Only attractors whose density reaches
//! `ξ` define clusters; everything else is noise.
//!
//! Evaluating the density over all points is quadratic, so the data is first
//! binned into a grid of hyper-cubes with side `2σ`. Only populated cubes are
//! stored, and density is evaluated within consolidated groups of cubes.
//!
//! ## Core Concepts
//!
//! - **Sigma (σ)**: Gaussian kernel width; also half the cube side.
//! - **Xi (ξ)**: Minimum attractor density for a cluster.
//! - **Dense cube**: A cube with at least `ξ / (2d)` members.
//! - **Connected cubes**: Face-adjacent cubes whose means are within `4σ`.
//!
//! ## Algorithm Steps
//!
//! 1. **Index**: map every row to its cube; cubes live in a B-tree keyed by
//!    cell coordinate. Remember which cubes became dense.
//! 2. **Link**: for every dense cube, record the connected cubes.
//! 3. **Consolidate**: merge each dense cube with everything it is (transitively)
//!    connected to, moving the result from the raw index to a cluster index.
//! 4. **Validate**: hill-climb inside each consolidated cube; accept its rows as a
//!    cluster when the attractor density reaches `ξ`.
//!
//! ## Complexity
//!
//! - **Time**: O(n log c) to index `n` rows into `c` cubes, O(c_dense · c) to
//!   link, and O(m²) per consolidated cube of `m` rows to validate.
//! - **Space**: O(n · d).
//!
//! ## References
//!
//! Hinneburg, A., Keim, D. A. (1998). "An Efficient Approach to Clustering in
//! Large Multimedia Databases with Noise." KDD-98.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cell::CellKey;
use super::grid::{AxisDomain, GridIndexer};
use super::hypercube::{dense_threshold, HyperCube};
use super::index::SpatialIndex;
use super::traits::Clustering;
use crate::error::{Error, Result};

/// Label used by [`Clustering::fit_predict`] for noise points.
pub const NOISE: usize = usize::MAX;

/// DENCLUE parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenclueParams {
    /// Point influence factor: Gaussian kernel width and half the cell side.
    pub sigma: f32,

    /// Minimum density of a density attractor for its cube to be a cluster.
    pub xi: f32,

    /// Fixed member count for a dense cell, replacing the `ξ / (2d)` default.
    ///
    /// Must be at least 2: a cell only becomes dense when a row joins an
    /// existing cell, never on its founding row.
    pub min_dense_members: Option<usize>,
}

impl Default for DenclueParams {
    fn default() -> Self {
        Self {
            sigma: 0.3,
            xi: 0.3,
            min_dense_members: None,
        }
    }
}

impl DenclueParams {
    pub fn new(sigma: f32, xi: f32) -> Self {
        Self {
            sigma,
            xi,
            ..Default::default()
        }
    }

    /// Set sigma (point influence factor).
    pub fn with_sigma(mut self, sigma: f32) -> Self {
        self.sigma = sigma;
        self
    }

    /// Set xi (minimum attractor density).
    pub fn with_xi(mut self, xi: f32) -> Self {
        self.xi = xi;
        self
    }

    /// Use a fixed member count as the dense-cell threshold.
    pub fn with_min_dense_members(mut self, members: usize) -> Self {
        self.min_dense_members = Some(members);
        self
    }

    /// Check that sigma and xi are positive and finite, and that a fixed
    /// dense-cell count is at least 2.
    pub fn validate(&self) -> Result<()> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(Error::InvalidParameter {
                name: "sigma",
                message: "must be positive and finite",
            });
        }
        if !(self.xi.is_finite() && self.xi > 0.0) {
            return Err(Error::InvalidParameter {
                name: "xi",
                message: "must be positive and finite",
            });
        }
        if matches!(self.min_dense_members, Some(members) if members < 2) {
            return Err(Error::InvalidParameter {
                name: "min_dense_members",
                message: "must be at least 2",
            });
        }
        Ok(())
    }

    /// Member count at which a cell of a `dims`-dimensional grid is dense.
    pub fn dense_threshold(&self, dims: usize) -> f32 {
        match self.min_dense_members {
            Some(members) => members as f32,
            None => dense_threshold(self.xi, dims),
        }
    }
}

/// Final label of one row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    /// Index of an accepted cluster, in acceptance order.
    Cluster(usize),
    Noise,
}

impl Label {
    /// Cluster index, or `None` for noise.
    pub fn cluster(self) -> Option<usize> {
        match self {
            Label::Cluster(i) => Some(i),
            Label::Noise => None,
        }
    }

    pub fn is_noise(self) -> bool {
        self == Label::Noise
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Cluster(i) => write!(f, "Cluster_{i}"),
            Label::Noise => f.write_str("Noise"),
        }
    }
}

/// Summary of one accepted cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    /// Cluster index.
    pub index: usize,
    /// Number of rows in the cluster.
    pub count: usize,
    /// Feature vector of the density attractor.
    pub attractor: Vec<f32>,
    /// Density at the attractor.
    pub density: f32,
}

/// Result of a DENCLUE run: one label per input row.
#[derive(Clone, Debug)]
pub struct DenclueFit<R> {
    labels: HashMap<R, Label>,
    clusters: Vec<Vec<R>>,
    noise: Vec<R>,
    summaries: Vec<ClusterSummary>,
}

impl<R: Eq + Hash> DenclueFit<R> {
    /// Label of `row`, or `None` if the row was not part of the input.
    pub fn label(&self, row: &R) -> Option<Label> {
        self.labels.get(row).copied()
    }

    /// Labels for `rows`; rows that were not clustered are noise.
    pub fn labels_for<'a>(&self, rows: impl IntoIterator<Item = &'a R>) -> Vec<Label>
    where
        R: 'a,
    {
        rows.into_iter()
            .map(|row| self.label(row).unwrap_or(Label::Noise))
            .collect()
    }

    /// Rows of each accepted cluster, in input order.
    pub fn clusters(&self) -> &[Vec<R>] {
        &self.clusters
    }

    /// Noise rows, in input order.
    pub fn noise(&self) -> &[R] {
        &self.noise
    }

    pub fn n_clusters(&self) -> usize {
        self.clusters.len()
    }

    pub fn noise_count(&self) -> usize {
        self.noise.len()
    }

    /// Total number of labelled rows.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        self.clusters.iter().map(Vec::len).collect()
    }

    /// Per-cluster attractor and size.
    pub fn summaries(&self) -> &[ClusterSummary] {
        &self.summaries
    }

    /// `(label, count)` rows for a summary table: clusters first, then noise.
    pub fn summary_table(&self) -> Vec<(String, usize)> {
        let mut table: Vec<(String, usize)> = self
            .clusters
            .iter()
            .enumerate()
            .map(|(i, rows)| (Label::Cluster(i).to_string(), rows.len()))
            .collect();
        table.push((Label::Noise.to_string(), self.noise.len()));
        table
    }
}

/// DENCLUE clustering algorithm.
#[derive(Debug, Clone, Default)]
pub struct Denclue {
    params: DenclueParams,
}

impl Denclue {
    /// Create a new DENCLUE clusterer.
    ///
    /// # Arguments
    ///
    /// * `sigma` - Influence factor. Cells are `2σ` wide and the Gaussian kernel
    ///   has width `σ`.
    /// * `xi` - Minimum attractor density for a cluster.
    pub fn new(sigma: f32, xi: f32) -> Self {
        Self::from_params(DenclueParams::new(sigma, xi))
    }

    pub fn from_params(params: DenclueParams) -> Self {
        Self { params }
    }

    /// Set sigma (point influence factor).
    pub fn with_sigma(mut self, sigma: f32) -> Self {
        self.params.sigma = sigma;
        self
    }

    /// Set xi (minimum attractor density).
    pub fn with_xi(mut self, xi: f32) -> Self {
        self.params.xi = xi;
        self
    }

    /// Use a fixed member count (at least 2) as the dense-cell threshold.
    pub fn with_min_dense_members(mut self, members: usize) -> Self {
        self.params.min_dense_members = Some(members);
        self
    }

    pub fn params(&self) -> &DenclueParams {
        &self.params
    }

    /// Cluster `rows` (row id, feature vector) whose columns span `domains`.
    ///
    /// # Errors
    ///
    /// Configuration errors (bad sigma/xi, no columns, bad domains) are returned
    /// before any row is read. `OutOfDomain`, `DimensionMismatch` and duplicate
    /// row ids fail the run while indexing, and `NoDenseCells` is returned when
    /// no cell reaches the density threshold.
    pub fn fit<R, I>(&self, domains: &[AxisDomain], rows: I) -> Result<DenclueFit<R>>
    where
        R: Clone + Eq + Hash,
        I: IntoIterator<Item = (R, Vec<f32>)>,
    {
        self.run(domains, rows, None)
    }

    /// Like [`Denclue::fit`], returning `Error::Cancelled` once `cancel` is set.
    ///
    /// The flag is polled between rows while indexing and between cubes while
    /// linking, merging and validating.
    pub fn fit_cancellable<R, I>(
        &self,
        domains: &[AxisDomain],
        rows: I,
        cancel: &AtomicBool,
    ) -> Result<DenclueFit<R>>
    where
        R: Clone + Eq + Hash,
        I: IntoIterator<Item = (R, Vec<f32>)>,
    {
        self.run(domains, rows, Some(cancel))
    }

    fn run<R, I>(
        &self,
        domains: &[AxisDomain],
        rows: I,
        cancel: Option<&AtomicBool>,
    ) -> Result<DenclueFit<R>>
    where
        R: Clone + Eq + Hash,
        I: IntoIterator<Item = (R, Vec<f32>)>,
    {
        self.params.validate()?;
        let grid = GridIndexer::new(domains.to_vec(), self.params.sigma)?;

        let rows: Vec<(R, Vec<f32>)> = rows.into_iter().collect();
        if rows.is_empty() {
            return Err(Error::EmptyInput);
        }

        let mut assembler = ClusterAssembler::new(&self.params, grid, rows.len(), cancel);
        assembler.index_rows(rows)?;
        assembler.link_neighbors()?;
        assembler.consolidate()?;
        assembler.validate()?;
        Ok(assembler.finish())
    }

    /// Fit on in-memory vectors, returning `None` for noise points.
    ///
    /// Column domains are taken from the data itself.
    pub fn fit_predict_with_noise(&self, data: &[Vec<f32>]) -> Result<Vec<Option<usize>>> {
        self.params.validate()?;
        let domains = AxisDomain::from_data(data)?;
        let fit = self.fit(&domains, data.iter().cloned().enumerate())?;
        Ok((0..data.len())
            .map(|i| fit.label(&i).and_then(Label::cluster))
            .collect())
    }
}

impl Clustering for Denclue {
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<usize>> {
        Ok(self
            .fit_predict_with_noise(data)?
            .into_iter()
            .map(|l| l.unwrap_or(NOISE))
            .collect())
    }

    /// DENCLUE discovers clusters dynamically, so this returns 0.
    fn n_clusters(&self) -> usize {
        0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Empty,
    Indexed,
    NeighborsLinked,
    Consolidated,
    Validated,
}

struct AcceptedCluster<R> {
    rows: HashSet<R>,
    attractor: Vec<f32>,
    density: f32,
}

/// One clustering run.
///
/// Cubes start in the raw index. Consolidation moves every dense cube, together
/// with the cubes it absorbs, into the cluster index; a cube is owned by exactly
/// one index (or by the cube that absorbed it) at any time.
struct ClusterAssembler<'a, R> {
    grid: GridIndexer,
    sigma: f32,
    xi: f32,
    dense_threshold: f32,

    raw: SpatialIndex<HyperCube<R>>,
    clusters: SpatialIndex<HyperCube<R>>,
    /// Every occupied cell, in creation order.
    all_keys: Vec<CellKey>,
    /// Cells that crossed the density threshold, in crossing order.
    dense_keys: Vec<CellKey>,
    /// Merged cell -> cell that absorbed it.
    absorbed_by: HashMap<CellKey, CellKey>,

    rows: Vec<R>,
    accepted: Vec<AcceptedCluster<R>>,
    noise: HashSet<R>,

    stage: Stage,
    cancel: Option<&'a AtomicBool>,
}

impl<'a, R: Clone + Eq + Hash> ClusterAssembler<'a, R> {
    fn new(
        params: &DenclueParams,
        grid: GridIndexer,
        n_rows: usize,
        cancel: Option<&'a AtomicBool>,
    ) -> Self {
        let dims = grid.dims();
        Self {
            dense_threshold: params.dense_threshold(dims),
            sigma: params.sigma,
            xi: params.xi,
            raw: SpatialIndex::for_input(n_rows, dims),
            clusters: SpatialIndex::default(),
            all_keys: Vec::new(),
            dense_keys: Vec::new(),
            absorbed_by: HashMap::new(),
            rows: Vec::with_capacity(n_rows),
            accepted: Vec::new(),
            noise: HashSet::new(),
            stage: Stage::Empty,
            cancel,
            grid,
        }
    }

    fn advance(&mut self, from: Stage, to: Stage) {
        assert_eq!(self.stage, from, "clustering stages must run in order");
        self.stage = to;
    }

    fn check_cancelled(&self) -> Result<()> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    /// Follow merge forwarding to the cell that currently owns `key`'s rows.
    ///
    /// Every cell on the way is re-pointed at the final owner.
    fn owner_of(&mut self, key: &CellKey) -> CellKey {
        let mut owner = key.clone();
        while let Some(next) = self.absorbed_by.get(&owner) {
            owner = next.clone();
        }

        let mut current = key.clone();
        while let Some(next) = self.absorbed_by.get_mut(&current) {
            if *next == owner {
                break;
            }
            current = std::mem::replace(next, owner.clone());
        }
        owner
    }

    fn index_rows(&mut self, rows: Vec<(R, Vec<f32>)>) -> Result<()> {
        self.advance(Stage::Empty, Stage::Indexed);

        let mut seen: HashSet<R> = HashSet::with_capacity(rows.len());
        for (row, vector) in rows {
            self.check_cancelled()?;
            let key = self.grid.cell_key(&vector)?;
            if !seen.insert(row.clone()) {
                return Err(Error::InvalidParameter {
                    name: "rows",
                    message: "row identifiers must be unique",
                });
            }
            self.rows.push(row.clone());

            match self.raw.search_mut(&key) {
                Some(cube) => {
                    if cube.add_member(row, vector, self.dense_threshold) {
                        self.dense_keys.push(key);
                    }
                }
                None => {
                    self.raw
                        .insert(key.clone(), HyperCube::new(key.clone(), row, vector));
                    self.all_keys.push(key);
                }
            }
        }

        debug!(
            rows = self.rows.len(),
            cells = self.all_keys.len(),
            dense = self.dense_keys.len(),
            threshold = self.dense_threshold,
            degree = self.raw.degree(),
            "indexed rows into grid cells"
        );

        if self.dense_keys.is_empty() {
            warn!(
                cells = self.all_keys.len(),
                sigma = self.sigma,
                xi = self.xi,
                "no dense cells; every row would be noise"
            );
            return Err(Error::NoDenseCells {
                cells: self.all_keys.len(),
            });
        }
        Ok(())
    }

    fn link_neighbors(&mut self) -> Result<()> {
        self.advance(Stage::Indexed, Stage::NeighborsLinked);

        let sigma = self.sigma;
        let mut links = 0usize;
        for key in &self.dense_keys {
            self.check_cancelled()?;
            let Some(cube) = self.raw.search(key) else {
                panic!("dense cell {key} missing from the raw index");
            };
            let linked: Vec<CellKey> = self
                .raw
                .values()
                .filter(|other| {
                    other.key() != key && cube.is_neighbor(other) && cube.is_connected(other, sigma)
                })
                .map(|other| other.key().clone())
                .collect();

            links += linked.len();
            if let Some(cube) = self.raw.search_mut(key) {
                for neighbor in linked {
                    cube.add_neighbor(neighbor);
                }
            }
        }

        debug!(dense = self.dense_keys.len(), links, "linked dense cells");
        Ok(())
    }

    fn consolidate(&mut self) -> Result<()> {
        self.advance(Stage::NeighborsLinked, Stage::Consolidated);

        // Only the cluster index needs sizing by dense cells.
        self.clusters = SpatialIndex::for_input(self.dense_keys.len(), self.grid.dims());

        let dense_keys = self.dense_keys.clone();
        for key in &dense_keys {
            self.check_cancelled()?;
            if self.absorbed_by.contains_key(key) {
                continue;
            }
            let Some(mut cube) = self.raw.delete(key) else {
                panic!("dense cell {key} missing from the raw index");
            };

            let mut pending: Vec<CellKey> = cube.neighbors().iter().cloned().collect();
            while let Some(next) = pending.pop() {
                let owner = self.owner_of(&next);
                if &owner == key {
                    continue;
                }
                let absorbed = match self.raw.delete(&owner) {
                    Some(found) => found,
                    None => match self.clusters.delete(&owner) {
                        Some(found) => found,
                        None => panic!("cell {owner} is neither indexed nor merged"),
                    },
                };
                assert_eq!(
                    absorbed.key(),
                    &owner,
                    "cell stored under a key it does not own"
                );
                pending.extend(absorbed.neighbors().iter().cloned());
                cube.merge_neighbor(absorbed);
                self.absorbed_by.insert(owner, key.clone());
            }

            self.clusters.insert(key.clone(), cube);
        }

        debug!(
            merged = self.clusters.len(),
            absorbed = self.absorbed_by.len(),
            unmerged = self.raw.len(),
            "consolidated connected cells"
        );
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.advance(Stage::Consolidated, Stage::Validated);

        for key in &self.dense_keys {
            self.check_cancelled()?;
            if self.absorbed_by.contains_key(key) {
                continue;
            }
            let Some(cube) = self.clusters.search_mut(key) else {
                panic!("consolidated cell {key} missing from the cluster index");
            };

            if cube.cluster_hyper_cube(self.sigma, self.xi) {
                let Some((attractor, density)) = cube.attractor() else {
                    panic!("accepted cell {key} has no density attractor");
                };
                self.accepted.push(AcceptedCluster {
                    rows: cube.cluster_rows().clone(),
                    attractor: attractor.to_vec(),
                    density,
                });
                self.noise.extend(cube.noise_rows().iter().cloned());
            } else {
                self.noise.extend(cube.member_rows().cloned());
            }
        }

        for key in &self.all_keys {
            if let Some(cube) = self.raw.search(key) {
                self.noise.extend(cube.member_rows().cloned());
            }
        }

        debug!(
            candidates = self.clusters.len(),
            accepted = self.accepted.len(),
            noise = self.noise.len(),
            "validated density attractors"
        );
        Ok(())
    }

    /// Label every row: members of an accepted cluster get its index, the rest
    /// are noise.
    fn finish(self) -> DenclueFit<R> {
        assert_eq!(self.stage, Stage::Validated, "clustering finished early");

        let mut owner: HashMap<&R, usize> = HashMap::new();
        for (i, cluster) in self.accepted.iter().enumerate() {
            for row in &cluster.rows {
                let previous = owner.insert(row, i);
                assert!(previous.is_none(), "row assigned to two clusters");
            }
        }

        let mut labels = HashMap::with_capacity(self.rows.len());
        let mut clusters: Vec<Vec<R>> = vec![Vec::new(); self.accepted.len()];
        let mut noise = Vec::new();
        for row in &self.rows {
            let label = match owner.get(row) {
                Some(&i) => {
                    debug_assert!(!self.noise.contains(row));
                    clusters[i].push(row.clone());
                    Label::Cluster(i)
                }
                None => {
                    noise.push(row.clone());
                    Label::Noise
                }
            };
            labels.insert(row.clone(), label);
        }

        let summaries = self
            .accepted
            .iter()
            .zip(clusters.iter())
            .enumerate()
            .map(|(index, (cluster, rows))| ClusterSummary {
                index,
                count: rows.len(),
                attractor: cluster.attractor.clone(),
                density: cluster.density,
            })
            .collect();

        info!(
            rows = self.rows.len(),
            clusters = clusters.len(),
            noise = noise.len(),
            "denclue finished"
        );

        DenclueFit {
            labels,
            clusters,
            noise,
            summaries,
        }
    }
}
