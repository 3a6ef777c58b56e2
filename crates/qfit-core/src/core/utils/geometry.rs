use nalgebra::{Point3, Rotation3, Unit, Vector3};

pub fn rotation_from_axis_angle(axis: &Vector3<f64>, angle_degrees: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Unit::new_normalize(*axis), angle_degrees.to_radians())
}

/// Rotates the selected atoms about the axis running from `origin` to
/// `axis_end`, in place. A degenerate axis leaves the coordinates unchanged.
pub fn rotate_atoms_about_axis(
    coordinates: &mut [Point3<f64>],
    origin: &Point3<f64>,
    axis_end: &Point3<f64>,
    atoms: &[usize],
    angle_degrees: f64,
) {
    let axis = axis_end - origin;
    if axis.norm_squared() < 1e-12 || angle_degrees == 0.0 {
        return;
    }
    let rotation = rotation_from_axis_angle(&axis, angle_degrees);
    for &index in atoms {
        let relative = coordinates[index] - origin;
        coordinates[index] = origin + rotation * relative;
    }
}

/// Signed dihedral angle `a-b-c-d` in degrees, in `(-180, 180]`.
pub fn dihedral_angle(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    d: &Point3<f64>,
) -> f64 {
    let b1 = b - a;
    let b2 = c - b;
    let b3 = d - c;

    let n1 = b1.cross(&b2);
    let n2 = b2.cross(&b3);
    let m1 = n1.cross(&b2.normalize());

    let x = n1.dot(&n2);
    let y = m1.dot(&n2);
    wrap_degrees(y.atan2(x).to_degrees())
}

/// Wraps an angle into `(-180, 180]`.
pub fn wrap_degrees(angle: f64) -> f64 {
    let mut wrapped = angle % 360.0;
    if wrapped <= -180.0 {
        wrapped += 360.0;
    } else if wrapped > 180.0 {
        wrapped -= 360.0;
    }
    wrapped
}

pub fn calculate_rmsd(coords1: &[Point3<f64>], coords2: &[Point3<f64>]) -> Option<f64> {
    if coords1.len() != coords2.len() || coords1.is_empty() {
        return None;
    }
    let n = coords1.len() as f64;
    let squared_dist_sum: f64 = coords1
        .iter()
        .zip(coords2.iter())
        .map(|(p1, p2)| (p1 - p2).norm_squared())
        .sum();
    Some((squared_dist_sum / n).sqrt())
}
