//! Aggregate over all rows that fall into one grid cell.
//!
//! A cube keeps the running sum of its members' vectors, so its mean is always
//! `sum / count`. Membership and the sum only change through [`HyperCube::add_member`]
//! and [`HyperCube::merge_neighbor`], which keep the two consistent.
//!
//! # Validation
//!
//! A consolidated cube is validated by a hill-climb over its members:
//!
//! 1. `near(x)`: members within `k·σ` of the mean (`k = NEAR_RADIUS_FACTOR`).
//! 2. Local density at `x` is the sum of Gaussian influences of `near(x)`:
//!
//!    ```text
//!    f(x) = Σ_{y ∈ near(x)} exp(-d(x, y)² / 2σ²)
//!    ```
//!
//! 3. Members are visited from farthest to nearest to the mean while the density
//!    keeps rising; the last peak is the density attractor. The cube is a cluster
//!    iff the attractor's density reaches `ξ`.
//!
//! The scan stops at the first drop, so the attractor is a local maximum along
//! that ordering, not necessarily the densest member of the cell.

use std::collections::{BTreeSet, HashSet};
use std::hash::Hash;

use super::cell::CellKey;
use super::util::euclidean;

/// Members within `NEAR_RADIUS_FACTOR * σ` of the mean form `near(x)`.
pub const NEAR_RADIUS_FACTOR: f32 = 4.0;

/// Adjacent cubes are connected when their means are within this many `σ`.
pub const CONNECT_RADIUS_FACTOR: f32 = 4.0;

/// A row within `ATTRACT_RADIUS_FACTOR * σ` of some `near(x)` member is a
/// cluster row.
pub const ATTRACT_RADIUS_FACTOR: f32 = 0.5;

/// Member-count threshold for a dense cell: `ξ / (2d)`.
///
/// The threshold is a policy default; [`crate::DenclueParams::with_min_dense_members`]
/// replaces it with a fixed count.
pub fn dense_threshold(xi: f32, dims: usize) -> f32 {
    xi / (2.0 * dims as f32)
}

#[derive(Clone, Debug)]
struct Member<R> {
    row: R,
    vector: Vec<f32>,
}

/// Rows of one grid cell (or of several merged cells).
#[derive(Clone, Debug)]
pub struct HyperCube<R> {
    key: CellKey,
    members: Vec<Member<R>>,
    member_rows: HashSet<R>,
    linear_sum: Vec<f32>,
    dense: bool,
    neighbors: BTreeSet<CellKey>,

    // Validation state, rebuilt by `create_near_x_set`.
    /// `(distance to mean, member index)`, farthest first.
    ordered: Vec<(f32, usize)>,
    /// Entries of `ordered` within k·σ of the mean, farthest first.
    near_x: Vec<(f32, usize)>,
    cluster_rows: HashSet<R>,
    noise_rows: HashSet<R>,
    attractor: Option<(usize, f32)>,
}

impl<R: Clone + Eq + Hash> HyperCube<R> {
    /// Create a cube for `key` holding its first row.
    ///
    /// A cube is never empty. The founding row does not make it dense; density is
    /// assessed as further rows arrive.
    pub fn new(key: CellKey, row: R, vector: Vec<f32>) -> Self {
        let mut member_rows = HashSet::new();
        member_rows.insert(row.clone());
        Self {
            key,
            linear_sum: vector.clone(),
            members: vec![Member { row, vector }],
            member_rows,
            dense: false,
            neighbors: BTreeSet::new(),
            ordered: Vec::new(),
            near_x: Vec::new(),
            cluster_rows: HashSet::new(),
            noise_rows: HashSet::new(),
            attractor: None,
        }
    }

    /// Add a row to the cube.
    ///
    /// Rows already present are ignored. Returns `true` exactly once: on the call
    /// that brings the member count to `dense_threshold` or above.
    pub fn add_member(&mut self, row: R, vector: Vec<f32>, dense_threshold: f32) -> bool {
        debug_assert_eq!(vector.len(), self.linear_sum.len());
        if !self.member_rows.insert(row.clone()) {
            return false;
        }
        for (s, v) in self.linear_sum.iter_mut().zip(vector.iter()) {
            *s += v;
        }
        self.members.push(Member { row, vector });

        if !self.dense && self.members.len() as f32 >= dense_threshold {
            self.dense = true;
            return true;
        }
        false
    }

    /// Absorb another cube's rows, sum and neighbor keys.
    ///
    /// Rows already present are skipped, so the sum always matches membership.
    /// The absorbed cube is consumed; its density flag is carried over.
    pub fn merge_neighbor(&mut self, other: HyperCube<R>) {
        let HyperCube {
            key,
            members,
            neighbors,
            dense,
            ..
        } = other;
        for member in members {
            if !self.member_rows.insert(member.row.clone()) {
                continue;
            }
            for (s, v) in self.linear_sum.iter_mut().zip(member.vector.iter()) {
                *s += v;
            }
            self.members.push(member);
        }
        self.dense |= dense;
        self.neighbors.extend(neighbors);
        self.neighbors.remove(&key);
        self.neighbors.remove(&self.key);
    }

    /// Record `key` as a connected neighbor cell.
    pub fn add_neighbor(&mut self, key: CellKey) {
        if key != self.key {
            self.neighbors.insert(key);
        }
    }

    /// Mean of the member vectors.
    pub fn mean(&self) -> Vec<f32> {
        let n = self.members.len() as f32;
        self.linear_sum.iter().map(|s| s / n).collect()
    }

    /// Whether the two cells are face-adjacent (see [`CellKey::is_adjacent`]).
    pub fn is_neighbor(&self, other: &HyperCube<R>) -> bool {
        self.key.is_adjacent(&other.key)
    }

    /// Whether the two means are within `CONNECT_RADIUS_FACTOR * sigma`.
    pub fn is_connected(&self, other: &HyperCube<R>, sigma: f32) -> bool {
        euclidean(&self.mean(), &other.mean()) <= CONNECT_RADIUS_FACTOR * sigma
    }

    /// Order members by distance to the mean and build `near(x)`.
    ///
    /// Members of `near(x)` become cluster rows. Any earlier validation state is
    /// discarded.
    pub fn create_near_x_set(&mut self, sigma: f32) {
        let mean = self.mean();
        let radius = NEAR_RADIUS_FACTOR * sigma;

        self.cluster_rows.clear();
        self.noise_rows.clear();
        self.attractor = None;

        self.ordered = self
            .members
            .iter()
            .enumerate()
            .map(|(i, m)| (euclidean(&mean, &m.vector), i))
            .collect();
        // Stable: members at equal distance keep insertion order.
        self.ordered.sort_by(|a, b| b.0.total_cmp(&a.0));

        self.near_x = self
            .ordered
            .iter()
            .copied()
            .filter(|&(dist, _)| dist <= radius)
            .collect();
        for &(_, i) in &self.near_x {
            self.cluster_rows.insert(self.members[i].row.clone());
        }
    }

    /// Gaussian density at `vector` over `near(x)`, classifying `row` on the way.
    ///
    /// `row` becomes a cluster row if some `near(x)` member lies within
    /// `ATTRACT_RADIUS_FACTOR * sigma` of `vector`, and a noise row otherwise
    /// (unless it is already a cluster row).
    pub fn local_density_function(&mut self, vector: &[f32], row: R, sigma: f32) -> f32 {
        let (density, attracted) = self.influence(vector, sigma);
        self.classify(row, attracted);
        density
    }

    fn influence(&self, vector: &[f32], sigma: f32) -> (f32, bool) {
        let two_sigma_sq = 2.0 * sigma * sigma;
        let attract = ATTRACT_RADIUS_FACTOR * sigma;
        let mut density = 0.0f32;
        let mut attracted = false;
        for &(_, i) in &self.near_x {
            let dist = euclidean(vector, &self.members[i].vector);
            density += (-(dist * dist) / two_sigma_sq).exp();
            attracted |= dist <= attract;
        }
        (density, attracted)
    }

    fn classify(&mut self, row: R, attracted: bool) {
        if attracted {
            self.noise_rows.remove(&row);
            self.cluster_rows.insert(row);
        } else if !self.cluster_rows.contains(&row) {
            self.noise_rows.insert(row);
        }
    }

    /// Hill-climb from the farthest member towards the mean.
    ///
    /// Stops at the first member whose density is below the best seen so far.
    /// Returns `true` iff that peak density is at least `xi`.
    pub fn find_cluster_density_attractor(&mut self, xi: f32, sigma: f32) -> bool {
        let mut best: Option<(usize, f32)> = None;
        for pos in 0..self.ordered.len() {
            let i = self.ordered[pos].1;
            let (density, attracted) = self.influence(&self.members[i].vector, sigma);
            let row = self.members[i].row.clone();
            self.classify(row, attracted);

            match best {
                Some((_, peak)) if density < peak => break,
                _ => best = Some((i, density)),
            }
        }
        self.attractor = best;
        best.is_some_and(|(_, peak)| peak >= xi)
    }

    /// Build `near(x)` and run the density-attractor check.
    pub fn cluster_hyper_cube(&mut self, sigma: f32, xi: f32) -> bool {
        self.create_near_x_set(sigma);
        self.find_cluster_density_attractor(xi, sigma)
    }

    /// Cell key of the cube (for a merged cube, the key of the absorbing cell).
    pub fn key(&self) -> &CellKey {
        &self.key
    }

    /// Running sum of member vectors.
    pub fn linear_sum(&self) -> &[f32] {
        &self.linear_sum
    }

    /// Member rows in arrival order.
    pub fn member_rows(&self) -> impl Iterator<Item = &R> {
        self.members.iter().map(|m| &m.row)
    }

    pub fn contains_row(&self, row: &R) -> bool {
        self.member_rows.contains(row)
    }

    /// Keys of connected neighbor cells.
    pub fn neighbors(&self) -> &BTreeSet<CellKey> {
        &self.neighbors
    }

    #[inline]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Whether the cube (or any cube merged into it) crossed the density threshold.
    #[inline]
    pub fn is_dense(&self) -> bool {
        self.dense
    }

    /// Rows accepted by the last validation.
    pub fn cluster_rows(&self) -> &HashSet<R> {
        &self.cluster_rows
    }

    /// Rows rejected by the last validation.
    pub fn noise_rows(&self) -> &HashSet<R> {
        &self.noise_rows
    }

    /// Rows in `near(x)`, farthest from the mean first.
    pub fn near_x_rows(&self) -> impl Iterator<Item = &R> {
        self.near_x.iter().map(|&(_, i)| &self.members[i].row)
    }

    /// Density attractor of the last validation: its vector and density.
    pub fn attractor(&self) -> Option<(&[f32], f32)> {
        self.attractor
            .map(|(i, density)| (self.members[i].vector.as_slice(), density))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_from(key: Vec<u32>, points: &[[f32; 2]]) -> HyperCube<usize> {
        let mut cube = HyperCube::new(CellKey::new(key), 0, points[0].to_vec());
        for (i, p) in points.iter().enumerate().skip(1) {
            cube.add_member(i, p.to_vec(), f32::INFINITY);
        }
        cube
    }

    #[test]
    fn add_member_tracks_sum_and_mean() {
        let cube = cube_from(vec![0, 0], &[[0.0, 0.0], [1.0, 2.0], [2.0, 4.0]]);
        assert_eq!(cube.member_count(), 3);
        assert_eq!(cube.linear_sum(), &[3.0, 6.0]);
        assert_eq!(cube.mean(), vec![1.0, 2.0]);
    }

    #[test]
    fn add_member_reports_density_crossing_once() {
        let mut cube = HyperCube::new(CellKey::new(vec![0]), 0usize, vec![0.0]);
        assert!(!cube.is_dense());
        assert!(!cube.add_member(1, vec![0.1], 3.0));
        assert!(cube.add_member(2, vec![0.2], 3.0));
        assert!(!cube.add_member(3, vec![0.3], 3.0));
        assert!(cube.is_dense());
    }

    #[test]
    fn duplicate_rows_are_ignored() {
        let mut cube = HyperCube::new(CellKey::new(vec![0]), 7usize, vec![1.0]);
        assert!(!cube.add_member(7, vec![5.0], 0.0));
        assert_eq!(cube.member_count(), 1);
        assert_eq!(cube.linear_sum(), &[1.0]);
    }

    #[test]
    fn merge_combines_members_and_dedupes() {
        let mut a = cube_from(vec![0, 0], &[[0.0, 0.0], [1.0, 1.0]]);
        let mut b = HyperCube::new(CellKey::new(vec![1, 0]), 1usize, vec![1.0, 1.0]);
        b.add_member(5, vec![4.0, 4.0], f32::INFINITY);
        b.add_neighbor(CellKey::new(vec![2, 0]));
        b.add_neighbor(CellKey::new(vec![0, 0]));

        a.merge_neighbor(b);
        // row 1 was already present
        assert_eq!(a.member_count(), 3);
        assert_eq!(a.linear_sum(), &[5.0, 5.0]);
        assert!(a.contains_row(&5));
        let neighbors: Vec<&CellKey> = a.neighbors().iter().collect();
        assert_eq!(neighbors, vec![&CellKey::new(vec![2, 0])]);
    }

    #[test]
    fn neighbor_and_connection() {
        let a = cube_from(vec![0, 0], &[[0.1, 0.1]]);
        let b = cube_from(vec![1, 0], &[[0.7, 0.1]]);
        let diag = cube_from(vec![1, 1], &[[0.7, 0.7]]);
        assert!(a.is_neighbor(&b));
        assert!(b.is_neighbor(&a));
        assert!(!a.is_neighbor(&diag));

        // means 0.6 apart
        assert!(a.is_connected(&b, 0.2));
        assert!(!a.is_connected(&b, 0.1));
    }

    #[test]
    fn near_x_keeps_equal_distances() {
        let points = [[0.5, 0.5]; 6];
        let mut cube = cube_from(vec![0, 0], &points);
        cube.create_near_x_set(0.3);
        assert_eq!(cube.near_x_rows().count(), 6);
        assert_eq!(cube.cluster_rows().len(), 6);
    }

    #[test]
    fn near_x_excludes_far_members() {
        // mean is (1, 0); the outlier is 3 away, the rest 1 away
        let mut cube = cube_from(
            vec![0, 0],
            &[[0.0, 0.0], [0.0, 0.0], [0.0, 0.0], [4.0, 0.0]],
        );
        cube.create_near_x_set(0.5);
        let near: Vec<&usize> = cube.near_x_rows().collect();
        assert_eq!(near.len(), 3);
        assert!(!near.contains(&&3));
    }

    #[test]
    fn local_density_sums_gaussian_influence() {
        let mut cube = cube_from(vec![0, 0], &[[0.0, 0.0], [0.0, 0.0]]);
        cube.create_near_x_set(1.0);
        let density = cube.local_density_function(&[0.0, 0.0], 0, 1.0);
        assert!((density - 2.0).abs() < 1e-6);

        // one sigma away from both members
        let density = cube.local_density_function(&[1.0, 0.0], 99, 1.0);
        assert!((density - 2.0 * (-0.5f32).exp()).abs() < 1e-6);
        assert!(cube.noise_rows().contains(&99));
        assert!(!cube.cluster_rows().contains(&99));
    }

    #[test]
    fn identical_points_form_a_cluster() {
        let mut cube = cube_from(vec![0, 0], &[[0.2, 0.2]; 10]);
        assert!(cube.cluster_hyper_cube(0.3, 0.3));
        assert_eq!(cube.cluster_rows().len(), 10);
        assert!(cube.noise_rows().is_empty());
        let (attractor, density) = cube.attractor().unwrap();
        assert_eq!(attractor, &[0.2, 0.2]);
        assert!((density - 10.0).abs() < 1e-5);
    }

    #[test]
    fn high_xi_rejects_cube() {
        let mut cube = cube_from(vec![0, 0], &[[0.2, 0.2]; 10]);
        assert!(!cube.cluster_hyper_cube(0.3, 50.0));
    }

    #[test]
    fn rows_are_never_both_cluster_and_noise() {
        let points: Vec<[f32; 2]> = (0..12)
            .map(|i| [0.05 * (i % 4) as f32, 0.4 * (i / 4) as f32])
            .collect();
        let mut cube = cube_from(vec![0, 0], &points);
        cube.cluster_hyper_cube(0.1, 0.1);
        for row in cube.cluster_rows() {
            assert!(!cube.noise_rows().contains(row));
        }
    }

    #[test]
    fn dense_threshold_scales_with_dimension() {
        assert!((dense_threshold(0.3, 2) - 0.075).abs() < 1e-7);
        assert!((dense_threshold(8.0, 4) - 1.0).abs() < 1e-7);
    }
}
