use nalgebra::{Matrix3, Point3, Vector3};
use ndarray::Array3;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DensityError {
    #[error("invalid density map format: {0}")]
    InvalidFormat(String),
    #[error("unsupported map data mode: {0}")]
    UnsupportedMode(i32),
    #[error("invalid unit cell: {0}")]
    InvalidCell(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Crystallographic unit cell with its orthogonalization matrices.
///
/// Follows the PDB convention: `a` along x, `b` in the xy plane.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitCell {
    pub lengths: [f64; 3],
    pub angles: [f64; 3],
    orthogonalization: Matrix3<f64>,
    fractionalization: Matrix3<f64>,
}

impl UnitCell {
    pub fn new(lengths: [f64; 3], angles: [f64; 3]) -> Result<Self, DensityError> {
        if lengths.iter().any(|&l| !(l > 0.0)) {
            return Err(DensityError::InvalidCell(format!(
                "non-positive cell lengths {:?}",
                lengths
            )));
        }
        let [a, b, c] = lengths;
        let (ca, cb, cg) = (
            angles[0].to_radians().cos(),
            angles[1].to_radians().cos(),
            angles[2].to_radians().cos(),
        );
        let sg = angles[2].to_radians().sin();
        let volume_term = 1.0 - ca * ca - cb * cb - cg * cg + 2.0 * ca * cb * cg;
        if !(volume_term > 0.0) || sg.abs() < 1e-8 {
            return Err(DensityError::InvalidCell(format!(
                "degenerate cell angles {:?}",
                angles
            )));
        }

        #[rustfmt::skip]
        let orthogonalization = Matrix3::new(
            a,   b * cg,  c * cb,
            0.0, b * sg,  c * (ca - cb * cg) / sg,
            0.0, 0.0,     c * volume_term.sqrt() / sg,
        );
        let fractionalization = orthogonalization.try_inverse().ok_or_else(|| {
            DensityError::InvalidCell("orthogonalization matrix is singular".into())
        })?;

        Ok(Self {
            lengths,
            angles,
            orthogonalization,
            fractionalization,
        })
    }

    pub fn orthogonalize(&self, fractional: &Vector3<f64>) -> Vector3<f64> {
        self.orthogonalization * fractional
    }

    pub fn fractionalize(&self, cartesian: &Vector3<f64>) -> Vector3<f64> {
        self.fractionalization * cartesian
    }

    /// Row norms of the fractionalization matrix: fractional change per Å along each axis.
    fn reciprocal_lengths(&self) -> [f64; 3] {
        [0, 1, 2].map(|i| self.fractionalization.row(i).norm())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MapStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub rms: f64,
}

impl MapStatistics {
    fn from_data(data: &Array3<f32>) -> Self {
        if data.is_empty() {
            return Self::default();
        }
        let n = data.len() as f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &v in data.iter() {
            let v = v as f64;
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }
        let mean = sum / n;
        let variance = data.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
        Self {
            min,
            max,
            mean,
            rms: variance.sqrt(),
        }
    }
}

/// Set of grid points, relative to the map's grid start, within some radius of
/// a set of atoms. Points are sorted, which fixes the row order of every
/// vector derived from the region.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Region {
    points: Vec<[i64; 3]>,
}

impl Region {
    pub fn points(&self) -> &[[i64; 3]] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A density map on a regular grid spanning part or all of a unit cell.
///
/// `data` is indexed `[x, y, z]` relative to `start`; grid index `i` along an
/// axis sits at fractional coordinate `(start + i) / sampling`.
#[derive(Debug, Clone)]
pub struct DensityMap {
    cell: UnitCell,
    sampling: [usize; 3],
    start: [i32; 3],
    origin: Vector3<f64>,
    space_group: u32,
    data: Array3<f32>,
    stats: MapStatistics,
}

impl DensityMap {
    pub fn new(
        cell: UnitCell,
        sampling: [usize; 3],
        start: [i32; 3],
        data: Array3<f32>,
    ) -> Result<Self, DensityError> {
        if sampling.contains(&0) {
            return Err(DensityError::InvalidFormat(format!(
                "non-positive grid sampling {:?}",
                sampling
            )));
        }
        if data.is_empty() {
            return Err(DensityError::InvalidFormat("map contains no grid points".into()));
        }
        let stats = MapStatistics::from_data(&data);
        Ok(Self {
            cell,
            sampling,
            start,
            origin: Vector3::zeros(),
            space_group: 1,
            data,
            stats,
        })
    }

    /// Sets the Cartesian origin shift (MRC2014 words 50-52).
    pub fn with_origin(mut self, origin: Vector3<f64>) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_space_group(mut self, space_group: u32) -> Self {
        self.space_group = space_group;
        self
    }

    pub fn cell(&self) -> &UnitCell {
        &self.cell
    }

    pub fn sampling(&self) -> [usize; 3] {
        self.sampling
    }

    pub fn start(&self) -> [i32; 3] {
        self.start
    }

    pub fn origin(&self) -> Vector3<f64> {
        self.origin
    }

    pub fn space_group(&self) -> u32 {
        self.space_group
    }

    pub fn extent(&self) -> [usize; 3] {
        let shape = self.data.shape();
        [shape[0], shape[1], shape[2]]
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn statistics(&self) -> MapStatistics {
        self.stats
    }

    /// Whether the grid spans a whole unit cell, in which case it is periodic.
    pub fn covers_unit_cell(&self) -> bool {
        self.extent()
            .iter()
            .zip(self.sampling.iter())
            .all(|(extent, sampling)| extent >= sampling)
    }

    /// Continuous grid coordinates of a Cartesian point, relative to `start`.
    pub fn cartesian_to_grid(&self, point: &Point3<f64>) -> [f64; 3] {
        let fractional = self.cell.fractionalize(&(point.coords - self.origin));
        [0, 1, 2].map(|i| fractional[i] * self.sampling[i] as f64 - self.start[i] as f64)
    }

    /// Cartesian position of a (possibly out-of-box) grid index relative to `start`.
    pub fn grid_to_cartesian(&self, index: [i64; 3]) -> Point3<f64> {
        let fractional = Vector3::from_fn(|i, _| {
            (self.start[i] as f64 + index[i] as f64) / self.sampling[i] as f64
        });
        Point3::from(self.origin + self.cell.orthogonalize(&fractional))
    }

    fn resolve_index(&self, index: [i64; 3]) -> Option<[usize; 3]> {
        let extent = self.extent();
        let periodic = self.covers_unit_cell();
        let mut resolved = [0usize; 3];
        for axis in 0..3 {
            let mut i = index[axis];
            if periodic {
                let sampling = self.sampling[axis] as i64;
                let absolute = (i + self.start[axis] as i64).rem_euclid(sampling);
                i = (absolute - self.start[axis] as i64).rem_euclid(sampling);
            }
            if i < 0 || i >= extent[axis] as i64 {
                return None;
            }
            resolved[axis] = i as usize;
        }
        Some(resolved)
    }

    /// Density at a grid index; zero outside a non-periodic box.
    pub fn value_at(&self, index: [i64; 3]) -> f64 {
        self.resolve_index(index)
            .map(|[x, y, z]| self.data[[x, y, z]] as f64)
            .unwrap_or(0.0)
    }

    fn sample_point(&self, point: &Point3<f64>) -> f64 {
        let grid = self.cartesian_to_grid(point);
        let base = grid.map(|g| g.floor());
        let t = [0, 1, 2].map(|i| grid[i] - base[i]);
        let base = base.map(|b| b as i64);

        let mut value = 0.0;
        for corner in 0..8 {
            let offset = [corner & 1, (corner >> 1) & 1, (corner >> 2) & 1];
            let mut weight = 1.0;
            for axis in 0..3 {
                weight *= if offset[axis] == 1 { t[axis] } else { 1.0 - t[axis] };
            }
            if weight == 0.0 {
                continue;
            }
            let index = [0, 1, 2].map(|axis| base[axis] + offset[axis] as i64);
            value += weight * self.value_at(index);
        }
        value
    }

    /// Trilinearly interpolated density at each point.
    pub fn sample(&self, points: &[Point3<f64>]) -> Vec<f64> {
        points.iter().map(|p| self.sample_point(p)).collect()
    }

    /// Grid indices within `radius` Å of `coordinate`, with their squared
    /// distances. Indices are unwrapped and may fall outside the box.
    pub fn lattice_within(&self, coordinate: &Point3<f64>, radius: f64) -> Vec<([i64; 3], f64)> {
        let reciprocal = self.cell.reciprocal_lengths();
        let reach = [0, 1, 2].map(|i| (radius * reciprocal[i] * self.sampling[i] as f64).ceil() as i64);
        let radius_sq = radius * radius;
        let centre = self.cartesian_to_grid(coordinate).map(|g| g.round() as i64);

        let mut within = Vec::new();
        for ix in (centre[0] - reach[0])..=(centre[0] + reach[0]) {
            for iy in (centre[1] - reach[1])..=(centre[1] + reach[1]) {
                for iz in (centre[2] - reach[2])..=(centre[2] + reach[2]) {
                    let index = [ix, iy, iz];
                    let distance_sq = (self.grid_to_cartesian(index) - coordinate).norm_squared();
                    if distance_sq <= radius_sq {
                        within.push((index, distance_sq));
                    }
                }
            }
        }
        within
    }

    /// Grid points within `radius` Å of any of the given coordinates.
    ///
    /// For a map that does not cover the unit cell, points outside the box are
    /// left out.
    pub fn region_around(&self, coordinates: &[Point3<f64>], radius: f64) -> Region {
        let periodic = self.covers_unit_cell();
        let extent = self.extent();

        let mut points = BTreeSet::new();
        for coordinate in coordinates {
            for (index, _) in self.lattice_within(coordinate, radius) {
                if periodic || (0..3).all(|a| index[a] >= 0 && index[a] < extent[a] as i64) {
                    points.insert(index);
                }
            }
        }
        Region {
            points: points.into_iter().collect(),
        }
    }

    /// Density values at the grid points of a region.
    pub fn interpolate(&self, region: &Region) -> Vec<f64> {
        region.points().iter().map(|&index| self.value_at(index)).collect()
    }

    /// Cartesian positions of the grid points of a region.
    pub fn region_positions(&self, region: &Region) -> Vec<Point3<f64>> {
        region
            .points()
            .iter()
            .map(|&index| self.grid_to_cartesian(index))
            .collect()
    }

    /// Copy of the map in sigma units, `(ρ - mean) / rms`.
    pub fn normalized(&self) -> DensityMap {
        let MapStatistics { mean, rms, .. } = self.stats;
        let scale = if rms > 0.0 { 1.0 / rms } else { 1.0 };
        let data = self.data.mapv(|v| ((v as f64 - mean) * scale) as f32);
        self.with_data(data)
    }

    /// A map on the same grid with all values zero.
    pub fn zeros_like(&self) -> DensityMap {
        self.with_data(Array3::zeros(self.data.raw_dim()))
    }

    fn with_data(&self, data: Array3<f32>) -> DensityMap {
        let stats = MapStatistics::from_data(&data);
        DensityMap {
            cell: self.cell.clone(),
            sampling: self.sampling,
            start: self.start,
            origin: self.origin,
            space_group: self.space_group,
            data,
            stats,
        }
    }

    /// Adds `values` at the grid points of `region`. Points outside the box of
    /// a non-periodic map are ignored.
    pub fn accumulate(&mut self, region: &Region, values: &[f64]) {
        for (&index, &value) in region.points().iter().zip(values) {
            if let Some([x, y, z]) = self.resolve_index(index) {
                self.data[[x, y, z]] += value as f32;
            }
        }
        self.stats = MapStatistics::from_data(&self.data);
    }
}
