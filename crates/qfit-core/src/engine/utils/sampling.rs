use itertools::Itertools;
use tracing::instrument;

/// Dihedral offsets covering `range` degrees centred on the input angle.
///
/// Yields `ceil(range / step)` offsets `-range/2 + j * step`. A full turn at
/// 30° gives twelve offsets from -180° to 150°.
pub fn dihedral_offsets(range: f64, step: f64) -> Vec<f64> {
    let count = ((range / step) - 1e-9).ceil().max(1.0) as usize;
    (0..count).map(|j| -range / 2.0 + j as f64 * step).collect()
}

/// Every combination of offsets for the bonds of one level.
///
/// Combinations are in lexicographic order with the last bond varying fastest.
#[instrument(level = "trace", skip_all, fields(bonds = ranges.len()))]
pub fn offset_combinations(ranges: &[f64], step: f64) -> Vec<Vec<f64>> {
    if ranges.is_empty() {
        return vec![Vec::new()];
    }
    ranges
        .iter()
        .map(|&range| dihedral_offsets(range, step))
        .multi_cartesian_product()
        .collect()
}
