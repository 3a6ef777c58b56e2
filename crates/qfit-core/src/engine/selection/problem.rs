use crate::core::density::map::{DensityMap, Region};
use crate::core::density::model::{AtomicDensityModel, MaskGrid};
use crate::core::models::ligand::Ligand;
use crate::engine::config::ConfigError;
use crate::engine::error::EngineError;
use crate::engine::state::CandidatePool;
use nalgebra::{DMatrix, DVector};
use tracing::{debug, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Least-squares fit of candidate model densities to the observed map.
///
/// Rows are mask grid points, columns are candidates. The solver works on the
/// Gram form `‖Aw − y‖² = wᵀGw − 2cᵀw + yᵀy`.
#[derive(Debug, Clone)]
pub struct SelectionProblem {
    region: Region,
    design: DMatrix<f64>,
    target: DVector<f64>,
    gram: DMatrix<f64>,
    linear: DVector<f64>,
    constant: f64,
}

impl SelectionProblem {
    pub fn from_parts(region: Region, design: DMatrix<f64>, target: DVector<f64>) -> Self {
        let gram = design.transpose() * &design;
        let linear = design.transpose() * &target;
        let constant = target.dot(&target);
        Self {
            region,
            design,
            target,
            gram,
            linear,
            constant,
        }
    }

    /// Builds the problem for a conformer pool.
    ///
    /// The mask covers every grid point within the resolution-dependent radius
    /// of any atom of any candidate. With `scale` on, the observed values are
    /// linearly rescaled to best match the input conformer's model density.
    #[instrument(skip_all, name = "selection_problem", fields(candidates = pool.len()))]
    pub fn from_pool(
        pool: &CandidatePool,
        ligand: &Ligand,
        map: &DensityMap,
        resolution: f64,
        scale: bool,
    ) -> Result<Self, EngineError> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(ConfigError::InvalidValue {
                parameter: "resolution",
                reason: format!("{} is not a positive resolution", resolution),
            }
            .into());
        }

        let model = AtomicDensityModel::from_resolution(resolution);
        let radius = AtomicDensityModel::mask_radius(resolution);
        let all_atoms: Vec<_> = pool
            .candidates()
            .iter()
            .flat_map(|c| c.coordinates.iter().copied())
            .collect();
        let region = map.region_around(&all_atoms, radius);
        if region.is_empty() {
            return Err(EngineError::EmptyMask);
        }
        let grid = MaskGrid::new(map, &region);

        #[cfg(not(feature = "parallel"))]
        let iterator = pool.candidates().iter();

        #[cfg(feature = "parallel")]
        let iterator = pool.candidates().par_iter();

        let columns: Vec<Vec<f64>> = iterator
            .map(|c| grid.render(&model, &c.coordinates, ligand.elements()))
            .collect();
        let design = DMatrix::from_fn(region.len(), columns.len(), |r, c| columns[c][r]);

        let observed = DVector::from_vec(map.interpolate(&region));
        let target = if scale {
            let reference = DVector::from_vec(grid.render(&model, ligand.positions(), ligand.elements()));
            let (factor, offset) = linear_fit(&observed, &reference);
            debug!(factor, offset, "Rescaled observed density.");
            observed.map(|v| factor * v + offset)
        } else {
            observed
        };

        debug!(mask_points = region.len(), "Selection problem assembled.");
        Ok(Self::from_parts(region, design, target))
    }

    pub fn candidate_count(&self) -> usize {
        self.design.ncols()
    }

    pub fn mask_len(&self) -> usize {
        self.design.nrows()
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn target(&self) -> &DVector<f64> {
        &self.target
    }

    pub fn gram(&self) -> &DMatrix<f64> {
        &self.gram
    }

    pub fn linear(&self) -> &DVector<f64> {
        &self.linear
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// Squared residual `‖Aw − y‖²`.
    pub fn objective(&self, weights: &[f64]) -> f64 {
        let w = DVector::from_column_slice(weights);
        (&self.design * w - &self.target).norm_squared()
    }

    /// Model density of a weighted ensemble at every mask point.
    pub fn model_density(&self, weights: &[f64]) -> Vec<f64> {
        let w = DVector::from_column_slice(weights);
        (&self.design * w).iter().copied().collect()
    }
}

/// Least-squares `factor · x + offset ≈ y`; identity when `x` is flat or the
/// slope is not positive.
fn linear_fit(x: &DVector<f64>, y: &DVector<f64>) -> (f64, f64) {
    let n = x.len() as f64;
    if n == 0.0 {
        return (1.0, 0.0);
    }
    let mean_x = x.mean();
    let mean_y = y.mean();
    let covariance: f64 = x.iter().zip(y.iter()).map(|(a, b)| (a - mean_x) * (b - mean_y)).sum();
    let variance: f64 = x.iter().map(|a| (a - mean_x).powi(2)).sum();
    if variance <= f64::EPSILON {
        return (1.0, 0.0);
    }
    let factor = covariance / variance;
    if factor <= 0.0 {
        return (1.0, 0.0);
    }
    (factor, mean_y - factor * mean_x)
}
