//! Shared inputs for engine and workflow tests.

use crate::core::density::map::{DensityMap, UnitCell};
use crate::core::models::atom::Atom;
use crate::core::models::element::Element;
use crate::core::models::ligand::Ligand;
use crate::core::models::structure::Structure;
use crate::core::models::topology::BondOrder;
use crate::core::topology::LigandTopology;
use crate::core::utils::geometry::rotate_atoms_about_axis;
use nalgebra::Point3;
use ndarray::Array3;

pub(crate) const BOX_LENGTH: f64 = 20.0;
pub(crate) const BOX_SAMPLING: usize = 40;
const BLOB_SIGMA: f64 = 0.6;

/// All-trans carbon chain with tetrahedral angles, placed near the box centre.
pub(crate) fn alkane(n: usize) -> Ligand {
    let mut structure = Structure::new();
    let ids: Vec<_> = (0..n)
        .map(|i| {
            let y = if i % 2 == 0 { 0.0 } else { 0.89 };
            let position = Point3::new(7.0 + 1.26 * i as f64, 9.5 + y, 10.0);
            let mut atom = Atom::new(&format!("C{}", i + 1), Element::C, position);
            atom.residue_name = "LIG".into();
            atom.chain_id = 'A';
            atom.residue_number = 1;
            structure.add_atom(atom)
        })
        .collect();
    for pair in ids.windows(2) {
        structure.add_bond(pair[0], pair[1], BondOrder::Single);
    }
    Ligand::from_structure(&structure).unwrap()
}

/// Input coordinates with each rotatable bond turned by the given offset.
pub(crate) fn rotated(ligand: &Ligand, topology: &LigandTopology, offsets: &[f64]) -> Vec<Point3<f64>> {
    let mut coordinates = ligand.positions().to_vec();
    for (bond, &offset) in topology.bonds().iter().zip(offsets) {
        let origin = coordinates[bond.parent_atom];
        let axis_end = coordinates[bond.child_atom];
        rotate_atoms_about_axis(&mut coordinates, &origin, &axis_end, &bond.moving_atoms, offset);
    }
    coordinates
}

/// Sum of unit Gaussians at the given positions, on a 20 Å cubic box with 0.5 Å spacing.
pub(crate) fn blob_map(centres: &[Point3<f64>]) -> DensityMap {
    let spacing = BOX_LENGTH / BOX_SAMPLING as f64;
    let denominator = 2.0 * BLOB_SIGMA * BLOB_SIGMA;
    let data = Array3::from_shape_fn((BOX_SAMPLING, BOX_SAMPLING, BOX_SAMPLING), |(x, y, z)| {
        let point = Point3::new(x as f64, y as f64, z as f64) * spacing;
        centres
            .iter()
            .map(|c| (-(point - c).norm_squared() / denominator).exp())
            .sum::<f64>() as f32
    });
    let cell = UnitCell::new([BOX_LENGTH; 3], [90.0; 3]).unwrap();
    DensityMap::new(cell, [BOX_SAMPLING; 3], [0; 3], data).unwrap()
}
