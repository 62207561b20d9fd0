use std::collections::HashSet;

use denclue::cluster::{AxisDomain, CellKey, Denclue, HyperCube, Label};
use denclue::Error;
use proptest::prelude::*;

fn cube(key: Vec<u32>, points: &[Vec<f32>]) -> HyperCube<usize> {
    let mut cube = HyperCube::new(CellKey::new(key), 0, points[0].clone());
    for (i, p) in points.iter().enumerate().skip(1) {
        cube.add_member(i, p.clone(), f32::INFINITY);
    }
    cube
}

proptest! {
    #[test]
    fn prop_every_row_labelled_exactly_once(
        data in prop::collection::vec(prop::collection::vec(0.0f32..10.0, 2), 1..60),
        sigma in 0.1f32..1.5,
        xi in 0.05f32..5.0,
    ) {
        let domains = vec![AxisDomain::new(0.0, 10.0); 2];
        match Denclue::new(sigma, xi).fit(&domains, data.iter().cloned().enumerate()) {
            Ok(fit) => {
                prop_assert_eq!(fit.len(), data.len());

                let clustered: usize = fit.cluster_sizes().iter().sum();
                prop_assert_eq!(clustered + fit.noise_count(), data.len());

                let mut seen = HashSet::new();
                for (i, rows) in fit.clusters().iter().enumerate() {
                    prop_assert!(!rows.is_empty());
                    for row in rows {
                        prop_assert!(seen.insert(*row));
                        prop_assert_eq!(fit.label(row), Some(Label::Cluster(i)));
                    }
                }
                for row in fit.noise() {
                    prop_assert!(seen.insert(*row));
                    prop_assert_eq!(fit.label(row), Some(Label::Noise));
                }
                prop_assert_eq!(seen.len(), data.len());
            }
            Err(Error::NoDenseCells { .. }) => {}
            Err(e) => prop_assert!(false, "unexpected error: {e}"),
        }
    }

    #[test]
    fn prop_is_neighbor_symmetric(
        a in prop::collection::vec(0u32..4, 3),
        b in prop::collection::vec(0u32..4, 3),
    ) {
        let ca = cube(a, &[vec![0.0; 3]]);
        let cb = cube(b, &[vec![0.0; 3]]);
        prop_assert_eq!(ca.is_neighbor(&cb), cb.is_neighbor(&ca));
    }

    #[test]
    fn prop_is_connected_symmetric_and_monotonic_in_sigma(
        pa in prop::collection::vec(prop::collection::vec(-5.0f32..5.0, 2), 1..6),
        pb in prop::collection::vec(prop::collection::vec(-5.0f32..5.0, 2), 1..6),
        sigma in 0.01f32..3.0,
        grow in 0.0f32..3.0,
    ) {
        let ca = cube(vec![0, 0], &pa);
        let cb = cube(vec![1, 0], &pb);
        prop_assert_eq!(ca.is_connected(&cb, sigma), cb.is_connected(&ca, sigma));
        if ca.is_connected(&cb, sigma) {
            prop_assert!(ca.is_connected(&cb, sigma + grow));
        }
    }

    #[test]
    fn prop_merge_is_idempotent_for_existing_rows(
        points in prop::collection::vec(prop::collection::vec(0.0f32..1.0, 2), 1..10),
    ) {
        let mut c = cube(vec![0, 0], &points);
        let sum_before = c.linear_sum().to_vec();
        let rows_before: Vec<usize> = c.member_rows().copied().collect();

        // merging a cube whose rows are already members changes nothing
        let copy = c.clone();
        c.merge_neighbor(copy);

        prop_assert_eq!(c.linear_sum(), sum_before.as_slice());
        prop_assert_eq!(c.member_rows().copied().collect::<Vec<_>>(), rows_before);
        prop_assert!(c.neighbors().is_empty());
    }
}
