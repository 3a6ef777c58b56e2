use super::map::{DensityMap, Region};
use crate::core::models::element::Element;
use nalgebra::Point3;
use std::f64::consts::PI;
use std::fmt;

/// Gaussian width per Å of resolution.
const SIGMA_PER_RESOLUTION: f64 = 0.225;
const MIN_SIGMA: f64 = 0.3;
/// Contributions beyond this many standard deviations are dropped.
const CUTOFF_SIGMAS: f64 = 3.0;

/// Isotropic Gaussian density of an atom, scaled by its atomic number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtomicDensityModel {
    sigma: f64,
    cutoff: f64,
    normalization: f64,
}

impl AtomicDensityModel {
    pub fn from_resolution(resolution: f64) -> Self {
        let sigma = (SIGMA_PER_RESOLUTION * resolution).max(MIN_SIGMA);
        Self {
            sigma,
            cutoff: CUTOFF_SIGMAS * sigma,
            normalization: (2.0 * PI * sigma * sigma).powf(-1.5),
        }
    }

    /// Radius of the mask drawn around atoms when comparing model and map.
    pub fn mask_radius(resolution: f64) -> f64 {
        (0.5 + resolution / 3.0).max(1.0)
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn density(&self, element: Element, distance_sq: f64) -> f64 {
        if distance_sq > self.cutoff * self.cutoff {
            return 0.0;
        }
        element.atomic_number() as f64
            * self.normalization
            * (-distance_sq / (2.0 * self.sigma * self.sigma)).exp()
    }
}

/// A region's grid points, rendered into by walking the lattice around each atom.
pub struct MaskGrid<'a> {
    map: &'a DensityMap,
    region: &'a Region,
}

impl fmt::Debug for MaskGrid<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaskGrid")
            .field("points", &self.region.len())
            .finish()
    }
}

impl<'a> MaskGrid<'a> {
    pub fn new(map: &'a DensityMap, region: &'a Region) -> Self {
        Self { map, region }
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Model density of the given atoms at every mask point, in region order.
    ///
    /// Lattice points near an atom that lie outside the region are skipped.
    pub fn render(
        &self,
        model: &AtomicDensityModel,
        coordinates: &[Point3<f64>],
        elements: &[Element],
    ) -> Vec<f64> {
        let points = self.region.points();
        let mut values = vec![0.0; points.len()];
        if points.is_empty() {
            return values;
        }
        for (position, &element) in coordinates.iter().zip(elements) {
            for (index, distance_sq) in self.map.lattice_within(position, model.cutoff()) {
                if let Ok(row) = points.binary_search(&index) {
                    values[row] += model.density(element, distance_sq);
                }
            }
        }
        values
    }
}
