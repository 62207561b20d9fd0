use crate::error::{Error, Result};

#[inline]
pub(crate) fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[inline]
pub(crate) fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    squared_euclidean(a, b).sqrt()
}

/// Check that every point has the same, non-zero dimensionality.
///
/// Returns that dimensionality.
pub(crate) fn check_dimensions(data: &[Vec<f32>]) -> Result<usize> {
    let Some(first) = data.first() else {
        return Err(Error::EmptyInput);
    };
    let d = first.len();
    if d == 0 {
        return Err(Error::InvalidParameter {
            name: "dimension",
            message: "must be at least 1",
        });
    }
    for point in data.iter().skip(1) {
        if point.len() != d {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: point.len(),
            });
        }
    }
    Ok(d)
}
